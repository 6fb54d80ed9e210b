//! BATON Test Utilities
//!
//! Centralized test infrastructure for the BATON workspace:
//! - A deterministic manual clock
//! - Fixtures for wiring a fully in-memory engine
//! - Proptest generators for entity types
//! - Builders for messages and metadata

// Re-export the reference store from its source crate
pub use baton_storage::{MemoryStore, SystemClock};

// Re-export core types for convenience
pub use baton_core::{
    AgentResponseAudit, AgentResponseStatus, AgentSession, ContentPart, ContextSnapshot,
    ContinuityConfig, ContinuityError, ContinuityResult, Conversation, ConversationId,
    ConversationState, EntityId, Handoff, HandoffId, HandoffStatus, Message, MessageId,
    MessageMetadata, MessageRole, SequenceNumber, SequenceRange, SessionId, SessionState,
    SnapshotId, SnapshotType, Timestamp, ToolCallAudit, ToolCallRef, ToolCallStatus, TurnId,
    new_entity_id,
};

use baton_continuity::ContinuityFacade;
use baton_storage::Clock;
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

// ============================================================================
// MANUAL CLOCK
// ============================================================================

/// Deterministic clock for tests. Time moves only when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Start at a fixed, readable instant.
    pub fn new() -> Self {
        Self::starting_at(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
    }

    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Advance the clock by whole seconds.
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().unwrap();
        *now += Duration::seconds(secs);
    }

    /// Jump to an exact instant.
    pub fn set(&self, to: Timestamp) {
        *self.now.lock().unwrap() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap()
    }
}

// ============================================================================
// ENGINE FIXTURE
// ============================================================================

/// Default config used by fixtures: generous enough that summaries keep
/// everything a short test produces.
pub fn test_config() -> ContinuityConfig {
    ContinuityConfig {
        summary_excerpt_chars: 240,
        summary_max_messages: 100,
    }
}

/// A fully in-memory engine under a manual clock.
pub struct TestEngine {
    pub facade: ContinuityFacade,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl TestEngine {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new());
        let facade = ContinuityFacade::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            clock.clone(),
            &test_config(),
        )
        .expect("test config is valid");
        Self {
            facade,
            store,
            clock,
        }
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// A user message with text content at a given log position.
pub fn text_message(
    conversation_id: ConversationId,
    sequence_number: SequenceNumber,
    text: &str,
) -> Message {
    Message {
        message_id: new_entity_id(),
        conversation_id,
        role: MessageRole::User,
        content: vec![ContentPart::text(text)],
        sequence_number,
        metadata: MessageMetadata::default(),
        created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    }
}

/// A successful tool-call audit.
pub fn tool_call_audit(call_id: &str, tool_name: &str) -> ToolCallAudit {
    ToolCallAudit {
        call_id: call_id.to_string(),
        tool_name: tool_name.to_string(),
        status: ToolCallStatus::Succeeded,
    }
}

/// An Active session owning a conversation from sequence 1.
pub fn active_session(conversation_id: ConversationId, agent_backend: &str) -> AgentSession {
    AgentSession::new(
        conversation_id,
        agent_backend,
        1,
        None,
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    )
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub fn arb_message_role() -> impl Strategy<Value = MessageRole> {
    prop_oneof![
        Just(MessageRole::User),
        Just(MessageRole::Assistant),
        Just(MessageRole::Tool),
    ]
}

pub fn arb_session_state() -> impl Strategy<Value = SessionState> {
    prop_oneof![
        Just(SessionState::Active),
        Just(SessionState::Paused),
        Just(SessionState::HandedOff),
        Just(SessionState::Completed),
        Just(SessionState::Failed),
    ]
}

pub fn arb_handoff_status() -> impl Strategy<Value = HandoffStatus> {
    prop_oneof![
        Just(HandoffStatus::Initiated),
        Just(HandoffStatus::Accepted),
        Just(HandoffStatus::Completed),
        Just(HandoffStatus::Failed),
        Just(HandoffStatus::Cancelled),
    ]
}

pub fn arb_tool_call_status() -> impl Strategy<Value = ToolCallStatus> {
    prop_oneof![
        Just(ToolCallStatus::Succeeded),
        Just(ToolCallStatus::Failed),
        Just(ToolCallStatus::Pending),
    ]
}

/// Metadata whose audits all carry distinct, non-empty call ids.
pub fn arb_valid_metadata() -> impl Strategy<Value = MessageMetadata> {
    proptest::collection::vec(
        ("[a-z]{2,8}", arb_tool_call_status()),
        0..5,
    )
    .prop_map(|calls| MessageMetadata {
        tool_calls: calls
            .into_iter()
            .enumerate()
            .map(|(i, (name, status))| ToolCallAudit {
                call_id: format!("call_{i}"),
                tool_name: name,
                status,
            })
            .collect(),
        agent_response: None,
        agent_backend: None,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use baton_continuity::AppendMessage;

    #[test]
    fn test_manual_clock_is_deterministic() {
        let clock = ManualClock::new();
        let start = clock.now();
        assert_eq!(clock.now(), start);

        clock.advance_secs(90);
        assert_eq!(clock.now(), start + Duration::seconds(90));
    }

    #[test]
    fn test_engine_fixture_uses_manual_clock() {
        let engine = TestEngine::new();
        let conversation = new_entity_id();

        let before = engine.clock.now();
        engine.clock.advance_secs(5);
        let message = engine
            .facade
            .append_message(AppendMessage::new(
                conversation,
                MessageRole::User,
                vec![ContentPart::text("hello")],
                1,
            ))
            .unwrap();
        assert_eq!(message.created_at, before + Duration::seconds(5));
    }

    #[test]
    fn test_ended_at_carries_manual_time() {
        let engine = TestEngine::new();
        let conversation = new_entity_id();
        let session = engine
            .facade
            .begin_session(conversation, "claude", None)
            .unwrap();

        engine.clock.advance_secs(60);
        let ended = engine
            .facade
            .transition_session(session.session_id, SessionState::Completed)
            .unwrap();
        assert_eq!(ended.ended_at, Some(engine.clock.now()));
        assert_eq!(ended.ended_at, Some(session.started_at + Duration::seconds(60)));
    }

    proptest! {
        #[test]
        fn prop_generated_metadata_always_validates(metadata in arb_valid_metadata()) {
            prop_assert!(metadata.validate().is_ok());
        }
    }
}
