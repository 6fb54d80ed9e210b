//! Core entity structures
//!
//! Entities carry their own lifecycle rules (`AgentSession::transition`,
//! `Handoff::accept`, ...) so invariants like the `ended_at` auto-stamp are
//! explicit domain logic rather than a storage-side trigger. Every mutator
//! takes an injected `now: Timestamp`; entities never read ambient time.

use crate::{
    AgentResponseStatus, ContentHash, ConversationId, ConversationState, HandoffId, HandoffStatus,
    MessageId, MessageRole, SequenceNumber, SessionId, SessionState, SnapshotId, SnapshotType,
    Timestamp, ToolCallStatus, TransitionError, TurnId, ValidationError, compute_content_hash,
    new_entity_id,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// CONVERSATION
// ============================================================================

/// Conversation - the unit of dialogue owning an ordered message history.
/// Created implicitly on first message append; never deleted while referenced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: ConversationId,
    pub state: ConversationState,
    pub created_at: Timestamp,
}

impl Conversation {
    pub fn new(conversation_id: ConversationId, now: Timestamp) -> Self {
        Self {
            conversation_id,
            state: ConversationState::Active,
            created_at: now,
        }
    }
}

// ============================================================================
// MESSAGE
// ============================================================================

/// One part of a message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentPart {
    /// Plain text
    Text { text: String },
    /// Structured payload, opaque to this core
    Structured { data: serde_json::Value },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// Text of this part, if it has any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            ContentPart::Structured { .. } => None,
        }
    }
}

/// Audit record for one tool call referenced by a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallAudit {
    /// Unique within the owning message
    pub call_id: String,
    pub tool_name: String,
    pub status: ToolCallStatus,
}

/// Audit record for the agent response that produced a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponseAudit {
    pub status: AgentResponseStatus,
    pub response_id: Option<String>,
    pub model: Option<String>,
}

/// Metadata embedded in a message. Not a separate aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MessageMetadata {
    pub tool_calls: Vec<ToolCallAudit>,
    pub agent_response: Option<AgentResponseAudit>,
    /// Which backend authored this message, when known
    pub agent_backend: Option<String>,
}

impl MessageMetadata {
    /// Validate embedded audits. Rejected metadata never reaches storage.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = std::collections::HashSet::new();
        for (index, audit) in self.tool_calls.iter().enumerate() {
            if audit.call_id.is_empty() {
                return Err(ValidationError::MissingCallId { index });
            }
            if !seen.insert(audit.call_id.as_str()) {
                return Err(ValidationError::InvalidMetadata {
                    reason: format!("duplicate call_id {} in one message", audit.call_id),
                });
            }
        }
        Ok(())
    }
}

/// Message - one immutable entry in a conversation's append-only log.
/// Corrections are new messages; no update or delete exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub role: MessageRole,
    /// One or more parts
    pub content: Vec<ContentPart>,
    /// Strictly increasing per conversation, starting at 1; supplied by the
    /// caller, never assigned here
    pub sequence_number: SequenceNumber,
    pub metadata: MessageMetadata,
    pub created_at: Timestamp,
}

impl Message {
    /// Concatenated text content, structured parts skipped.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// AGENT SESSION
// ============================================================================

/// AgentSession - a contiguous span of turns owned by one backend within a
/// conversation. At most one session per conversation is Active at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSession {
    pub session_id: SessionId,
    pub conversation_id: ConversationId,
    pub agent_backend: String,
    /// Message sequence at which the session begins
    pub start_sequence: SequenceNumber,
    pub end_sequence: Option<SequenceNumber>,
    /// Ordered turns recorded for this session
    pub turn_ids: Vec<TurnId>,
    /// Weak reference, lookup only
    pub initiated_by_handoff: Option<HandoffId>,
    /// Weak reference, lookup only
    pub terminated_by_handoff: Option<HandoffId>,
    /// Snapshots captured for this session
    pub context_snapshots: Vec<SnapshotId>,
    pub state: SessionState,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
}

impl AgentSession {
    /// Create a new Active session.
    ///
    /// `initiated_by_handoff` is set here or never: the back-reference is
    /// established at creation, not retroactively.
    pub fn new(
        conversation_id: ConversationId,
        agent_backend: &str,
        start_sequence: SequenceNumber,
        initiated_by_handoff: Option<HandoffId>,
        now: Timestamp,
    ) -> Self {
        Self {
            session_id: new_entity_id(),
            conversation_id,
            agent_backend: agent_backend.to_string(),
            start_sequence,
            end_sequence: None,
            turn_ids: Vec::new(),
            initiated_by_handoff,
            terminated_by_handoff: None,
            context_snapshots: Vec::new(),
            state: SessionState::Active,
            started_at: now,
            ended_at: None,
        }
    }

    /// Same as [`AgentSession::new`] but with a caller-chosen id, used when a
    /// handoff reserved the id before the session existed.
    pub fn with_id(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }

    /// Move to `to`, validating against the transition table.
    ///
    /// Entering a terminal state (HandedOff, Completed, Failed) from a
    /// non-terminal one stamps `ended_at` with `now`.
    pub fn transition(&mut self, to: SessionState, now: Timestamp) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(to) {
            return Err(TransitionError::InvalidSessionTransition {
                from: self.state,
                to,
            });
        }
        let entering_terminal = !self.state.is_terminal() && to.is_terminal();
        self.state = to;
        if entering_terminal {
            self.ended_at = Some(now);
        }
        Ok(())
    }

    /// Append a turn. Only Active and Paused sessions record turns; a session
    /// failed mid-turn keeps whatever partial list it accumulated.
    pub fn record_turn(&mut self, turn_id: TurnId) -> Result<(), TransitionError> {
        if !matches!(self.state, SessionState::Active | SessionState::Paused) {
            return Err(TransitionError::SessionNotActive {
                session_id: self.session_id,
                state: self.state,
            });
        }
        self.turn_ids.push(turn_id);
        Ok(())
    }

    /// Undo a handoff initiation: HandedOff back to Active, clearing the
    /// fields the initiation stamped. The only sanctioned exit from a
    /// terminal state, reachable solely through handoff cancellation.
    pub fn revert_handoff(&mut self) -> Result<(), TransitionError> {
        if self.state != SessionState::HandedOff {
            return Err(TransitionError::InvalidSessionTransition {
                from: self.state,
                to: SessionState::Active,
            });
        }
        self.state = SessionState::Active;
        self.ended_at = None;
        self.end_sequence = None;
        self.terminated_by_handoff = None;
        Ok(())
    }

    /// Register a snapshot captured for this session.
    pub fn record_snapshot(&mut self, snapshot_id: SnapshotId) {
        self.context_snapshots.push(snapshot_id);
    }
}

// ============================================================================
// HANDOFF
// ============================================================================

/// Reference to a tool call inside a stored message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallRef {
    pub message_id: MessageId,
    pub call_id: String,
}

/// Handoff - a controlled transfer of conversation ownership from one agent
/// session to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handoff {
    pub handoff_id: HandoffId,
    pub conversation_id: ConversationId,
    pub source_session_id: SessionId,
    /// Set only when status reaches Accepted; Cancelled handoffs never
    /// acquire one
    pub target_session_id: Option<SessionId>,
    /// Last turn the source session completed before handing off
    pub prior_turn_id: TurnId,
    /// Ordered tool-call references that caused the handoff
    pub triggering_tool_calls: Vec<ToolCallRef>,
    pub source_agent: String,
    pub target_agent: String,
    pub reason: Option<String>,
    pub status: HandoffStatus,
    pub initiated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    /// Only set when status is Failed
    pub failure_reason: Option<String>,
}

impl Handoff {
    /// Create a new Initiated handoff.
    pub fn initiate(
        conversation_id: ConversationId,
        source_session_id: SessionId,
        prior_turn_id: TurnId,
        triggering_tool_calls: Vec<ToolCallRef>,
        source_agent: &str,
        target_agent: &str,
        reason: Option<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            handoff_id: new_entity_id(),
            conversation_id,
            source_session_id,
            target_session_id: None,
            prior_turn_id,
            triggering_tool_calls,
            source_agent: source_agent.to_string(),
            target_agent: target_agent.to_string(),
            reason,
            status: HandoffStatus::Initiated,
            initiated_at: now,
            completed_at: None,
            failure_reason: None,
        }
    }

    fn step(&mut self, to: HandoffStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError::InvalidHandoffTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Accept the handoff, reserving the target session id. The session
    /// record itself is materialized at completion.
    pub fn accept(&mut self, target_session_id: SessionId) -> Result<(), TransitionError> {
        self.step(HandoffStatus::Accepted)?;
        self.target_session_id = Some(target_session_id);
        Ok(())
    }

    /// Complete the handoff, stamping `completed_at`.
    pub fn complete(&mut self, now: Timestamp) -> Result<(), TransitionError> {
        self.step(HandoffStatus::Completed)?;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Cancel the handoff. A cancelled handoff never keeps a target session.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.step(HandoffStatus::Cancelled)?;
        self.target_session_id = None;
        Ok(())
    }

    /// Fail the handoff, recording why. The source session is left as-is.
    pub fn fail(&mut self, reason: &str) -> Result<(), TransitionError> {
        self.step(HandoffStatus::Failed)?;
        self.failure_reason = Some(reason.to_string());
        Ok(())
    }
}

// ============================================================================
// CONTEXT SNAPSHOT
// ============================================================================

/// Inclusive range of message sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceRange {
    pub start: SequenceNumber,
    pub end: SequenceNumber,
}

impl SequenceRange {
    pub fn new(start: SequenceNumber, end: SequenceNumber) -> Result<Self, ValidationError> {
        if start < 1 || end < start {
            return Err(ValidationError::InvalidSequenceRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, sequence: SequenceNumber) -> bool {
        sequence >= self.start && sequence <= self.end
    }
}

/// A tool call as it was visible inside a snapshot's range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibleToolCall {
    pub message_id: MessageId,
    pub sequence_number: SequenceNumber,
    pub call_id: String,
    pub tool_name: String,
    pub status: ToolCallStatus,
}

/// ContextSnapshot - an immutable, bounded reconstruction of what a session
/// could see at a point in time. Audit/replay only; never feeds back into
/// log ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub snapshot_id: SnapshotId,
    pub conversation_id: ConversationId,
    pub session_id: SessionId,
    pub sequence_start: SequenceNumber,
    pub sequence_end: SequenceNumber,
    /// Derived by the configured summary strategy; opaque to this core
    pub message_summary: String,
    pub visible_tool_calls: Vec<VisibleToolCall>,
    pub token_estimate: Option<i32>,
    /// SHA-256 over the covered `(sequence_number, message_id)` pairs
    pub log_digest: ContentHash,
    pub captured_at: Timestamp,
    pub snapshot_type: SnapshotType,
}

impl ContextSnapshot {
    /// Canonical digest of the messages a snapshot covers. Ascending
    /// sequence order is assumed, as returned by the log.
    pub fn digest_of(messages: &[Message]) -> ContentHash {
        let mut canonical = String::new();
        for message in messages {
            canonical.push_str(&format!(
                "{}:{}\n",
                message.sequence_number, message.message_id
            ));
        }
        compute_content_hash(canonical.as_bytes())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn make_session() -> AgentSession {
        AgentSession::new(Uuid::now_v7(), "claude", 1, None, Utc::now())
    }

    #[test]
    fn test_metadata_validate_ok() {
        let metadata = MessageMetadata {
            tool_calls: vec![
                ToolCallAudit {
                    call_id: "call_1".to_string(),
                    tool_name: "search".to_string(),
                    status: ToolCallStatus::Succeeded,
                },
                ToolCallAudit {
                    call_id: "call_2".to_string(),
                    tool_name: "search".to_string(),
                    status: ToolCallStatus::Pending,
                },
            ],
            agent_response: None,
            agent_backend: Some("claude".to_string()),
        };
        assert!(metadata.validate().is_ok());
    }

    #[test]
    fn test_metadata_rejects_empty_call_id() {
        let metadata = MessageMetadata {
            tool_calls: vec![ToolCallAudit {
                call_id: String::new(),
                tool_name: "search".to_string(),
                status: ToolCallStatus::Pending,
            }],
            ..Default::default()
        };
        assert_eq!(
            metadata.validate(),
            Err(ValidationError::MissingCallId { index: 0 })
        );
    }

    #[test]
    fn test_metadata_rejects_duplicate_call_ids() {
        let audit = ToolCallAudit {
            call_id: "call_1".to_string(),
            tool_name: "search".to_string(),
            status: ToolCallStatus::Succeeded,
        };
        let metadata = MessageMetadata {
            tool_calls: vec![audit.clone(), audit],
            ..Default::default()
        };
        assert!(matches!(
            metadata.validate(),
            Err(ValidationError::InvalidMetadata { .. })
        ));
    }

    #[test]
    fn test_session_transition_stamps_ended_at() {
        let now = Utc::now();
        let mut session = make_session();
        assert!(session.ended_at.is_none());

        session.transition(SessionState::Completed, now).unwrap();
        assert_eq!(session.state, SessionState::Completed);
        assert_eq!(session.ended_at, Some(now));
    }

    #[test]
    fn test_session_pause_does_not_stamp_ended_at() {
        let mut session = make_session();
        session.transition(SessionState::Paused, Utc::now()).unwrap();
        assert!(session.ended_at.is_none());

        session.transition(SessionState::Active, Utc::now()).unwrap();
        assert_eq!(session.state, SessionState::Active);
    }

    #[test]
    fn test_session_invalid_transition() {
        let mut session = make_session();
        session.transition(SessionState::Failed, Utc::now()).unwrap();

        let err = session
            .transition(SessionState::Active, Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidSessionTransition {
                from: SessionState::Failed,
                to: SessionState::Active,
            }
        );
    }

    #[test]
    fn test_record_turn_requires_active_or_paused() {
        let mut session = make_session();
        session.record_turn(Uuid::now_v7()).unwrap();

        session.transition(SessionState::Paused, Utc::now()).unwrap();
        session.record_turn(Uuid::now_v7()).unwrap();
        assert_eq!(session.turn_ids.len(), 2);

        session.transition(SessionState::Failed, Utc::now()).unwrap();
        assert!(matches!(
            session.record_turn(Uuid::now_v7()),
            Err(TransitionError::SessionNotActive { .. })
        ));
        // Partial list survives the failure
        assert_eq!(session.turn_ids.len(), 2);
    }

    #[test]
    fn test_revert_handoff_clears_termination_fields() {
        let now = Utc::now();
        let mut session = make_session();
        session.transition(SessionState::HandedOff, now).unwrap();
        session.end_sequence = Some(9);
        session.terminated_by_handoff = Some(Uuid::now_v7());

        session.revert_handoff().unwrap();
        assert_eq!(session.state, SessionState::Active);
        assert!(session.ended_at.is_none());
        assert!(session.end_sequence.is_none());
        assert!(session.terminated_by_handoff.is_none());
    }

    #[test]
    fn test_revert_handoff_rejected_outside_handed_off() {
        let mut session = make_session();
        assert!(session.revert_handoff().is_err());

        session.transition(SessionState::Completed, Utc::now()).unwrap();
        assert!(session.revert_handoff().is_err());
    }

    #[test]
    fn test_handoff_accept_complete() {
        let now = Utc::now();
        let mut handoff = Handoff::initiate(
            Uuid::now_v7(),
            Uuid::now_v7(),
            Uuid::now_v7(),
            vec![],
            "claude",
            "codex",
            Some("specialist needed".to_string()),
            now,
        );
        let target = Uuid::now_v7();

        handoff.accept(target).unwrap();
        assert_eq!(handoff.status, HandoffStatus::Accepted);
        assert_eq!(handoff.target_session_id, Some(target));

        handoff.complete(now).unwrap();
        assert_eq!(handoff.status, HandoffStatus::Completed);
        assert_eq!(handoff.completed_at, Some(now));
    }

    #[test]
    fn test_handoff_complete_requires_accepted() {
        let mut handoff = Handoff::initiate(
            Uuid::now_v7(),
            Uuid::now_v7(),
            Uuid::now_v7(),
            vec![],
            "claude",
            "codex",
            None,
            Utc::now(),
        );
        let err = handoff.complete(Utc::now()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidHandoffTransition {
                from: HandoffStatus::Initiated,
                to: HandoffStatus::Completed,
            }
        );
    }

    #[test]
    fn test_handoff_cancel_clears_target() {
        let mut handoff = Handoff::initiate(
            Uuid::now_v7(),
            Uuid::now_v7(),
            Uuid::now_v7(),
            vec![],
            "claude",
            "codex",
            None,
            Utc::now(),
        );
        handoff.accept(Uuid::now_v7()).unwrap();
        handoff.cancel().unwrap();
        assert_eq!(handoff.status, HandoffStatus::Cancelled);
        assert!(handoff.target_session_id.is_none());
    }

    #[test]
    fn test_handoff_fail_records_reason() {
        let mut handoff = Handoff::initiate(
            Uuid::now_v7(),
            Uuid::now_v7(),
            Uuid::now_v7(),
            vec![],
            "claude",
            "codex",
            None,
            Utc::now(),
        );
        handoff.fail("target never came up").unwrap();
        assert_eq!(handoff.status, HandoffStatus::Failed);
        assert_eq!(
            handoff.failure_reason.as_deref(),
            Some("target never came up")
        );
        assert!(handoff.fail("again").is_err());
    }

    #[test]
    fn test_sequence_range_validation() {
        assert!(SequenceRange::new(1, 1).is_ok());
        assert!(SequenceRange::new(3, 9).is_ok());
        assert!(SequenceRange::new(0, 5).is_err());
        assert!(SequenceRange::new(5, 4).is_err());

        let range = SequenceRange::new(2, 4).unwrap();
        assert!(range.contains(2));
        assert!(range.contains(4));
        assert!(!range.contains(5));
    }

    #[test]
    fn test_snapshot_digest_depends_on_order_and_ids() {
        let now = Utc::now();
        let conversation_id = Uuid::now_v7();
        let make = |seq: i64| Message {
            message_id: Uuid::now_v7(),
            conversation_id,
            role: MessageRole::User,
            content: vec![ContentPart::text("hi")],
            sequence_number: seq,
            metadata: MessageMetadata::default(),
            created_at: now,
        };
        let a = make(1);
        let b = make(2);

        let forward = ContextSnapshot::digest_of(&[a.clone(), b.clone()]);
        let reversed = ContextSnapshot::digest_of(&[b, a]);
        assert_ne!(forward, reversed);
        assert_eq!(ContextSnapshot::digest_of(&[]), ContextSnapshot::digest_of(&[]));
    }
}
