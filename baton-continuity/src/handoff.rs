//! Handoff coordination.
//!
//! Transfers conversation ownership from a source session to a target
//! session. Every operation finishes all of its validations before the
//! first repository write, so a failed handoff operation leaves no partial
//! state behind.

use baton_core::{
    AgentSession, ContextSnapshot, ContinuityResult, ConversationId, EntityType, Handoff,
    HandoffId, HandoffStatus, SequenceNumber, SequenceRange, SessionId, SessionState,
    SnapshotType, StorageError, ToolCallRef, TransitionError, TurnId,
};
use baton_storage::{Clock, HandoffRepository, SessionRepository};
use std::sync::Arc;

use crate::log::MessageLog;
use crate::snapshot::SnapshotCapture;

/// Request to initiate a handoff away from a session.
#[derive(Debug, Clone)]
pub struct InitiateHandoff {
    pub source_session_id: SessionId,
    /// Last turn the source session completed before handing off
    pub prior_turn_id: TurnId,
    /// Ordered tool-call references that caused the handoff
    pub triggering_tool_calls: Vec<ToolCallRef>,
    pub target_agent: String,
    pub reason: Option<String>,
}

impl InitiateHandoff {
    pub fn new(source_session_id: SessionId, prior_turn_id: TurnId, target_agent: &str) -> Self {
        Self {
            source_session_id,
            prior_turn_id,
            triggering_tool_calls: Vec::new(),
            target_agent: target_agent.to_string(),
            reason: None,
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRef>) -> Self {
        self.triggering_tool_calls = tool_calls;
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
}

/// Everything an initiation produced, as one unit.
#[derive(Debug, Clone)]
pub struct HandoffInitiation {
    pub handoff: Handoff,
    pub source_session: AgentSession,
    pub snapshot: ContextSnapshot,
}

/// State machine driving handoffs between sessions.
#[derive(Clone)]
pub struct HandoffCoordinator {
    sessions: Arc<dyn SessionRepository>,
    handoffs: Arc<dyn HandoffRepository>,
    log: MessageLog,
    capture: SnapshotCapture,
    clock: Arc<dyn Clock>,
}

impl HandoffCoordinator {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        handoffs: Arc<dyn HandoffRepository>,
        log: MessageLog,
        capture: SnapshotCapture,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions,
            handoffs,
            log,
            capture,
            clock,
        }
    }

    /// Initiate a handoff: the source session moves to HandedOff and a
    /// `HandoffInitiated` snapshot is captured over everything the session
    /// could see. Either all three records land, or none.
    pub fn initiate(&self, request: InitiateHandoff) -> ContinuityResult<HandoffInitiation> {
        let mut source = self.load_session(request.source_session_id)?;
        if !matches!(source.state, SessionState::Active | SessionState::Paused) {
            return Err(TransitionError::SourceSessionNotEligible {
                session_id: source.session_id,
                state: source.state,
            }
            .into());
        }
        let conversation_id = source.conversation_id;

        // Within one conversation handoffs land in prior-turn order: a stale
        // initiate must not replay after a newer handoff has completed.
        let prior_sequence = self
            .log
            .sequence_of_turn(conversation_id, request.prior_turn_id)?;
        if let Some(prior_sequence) = prior_sequence {
            if let Some(completed_sequence) =
                self.max_completed_prior_sequence(conversation_id)?
            {
                if prior_sequence < completed_sequence {
                    return Err(TransitionError::OutOfOrderHandoff {
                        conversation_id,
                        prior_sequence,
                        completed_sequence,
                    }
                    .into());
                }
            }
        }

        let latest = self.log.latest_sequence(conversation_id)?;
        let end = latest
            .unwrap_or(source.start_sequence)
            .max(source.start_sequence);
        let range = SequenceRange::new(source.start_sequence, end)?;

        let now = self.clock.now();
        let handoff = Handoff::initiate(
            conversation_id,
            source.session_id,
            request.prior_turn_id,
            request.triggering_tool_calls,
            &source.agent_backend,
            &request.target_agent,
            request.reason,
            now,
        );
        let snapshot = self.capture.build(
            conversation_id,
            source.session_id,
            range,
            SnapshotType::HandoffInitiated,
        )?;

        source.transition(SessionState::HandedOff, now)?;
        source.end_sequence = Some(range.end);
        source.terminated_by_handoff = Some(handoff.handoff_id);
        source.record_snapshot(snapshot.snapshot_id);

        self.handoffs.save(&handoff)?;
        self.sessions.save(&source)?;
        self.capture.save(&snapshot)?;
        tracing::info!(
            handoff_id = %handoff.handoff_id,
            conversation_id = %conversation_id,
            source_session_id = %source.session_id,
            source_agent = %handoff.source_agent,
            target_agent = %handoff.target_agent,
            "Handoff initiated"
        );
        Ok(HandoffInitiation {
            handoff,
            source_session: source,
            snapshot,
        })
    }

    /// Accept a handoff, reserving the target session id. The session record
    /// is materialized at completion; until then nothing persists for the
    /// target, which is what keeps cancellation clean.
    pub fn accept(
        &self,
        handoff_id: HandoffId,
        target_session_id: SessionId,
    ) -> ContinuityResult<Handoff> {
        let mut handoff = self.load(handoff_id)?;
        handoff.accept(target_session_id)?;
        self.handoffs.save(&handoff)?;
        tracing::info!(
            handoff_id = %handoff_id,
            target_session_id = %target_session_id,
            "Handoff accepted"
        );
        Ok(handoff)
    }

    /// Mark an accepted handoff completed, stamping `completed_at`.
    pub fn complete(&self, handoff_id: HandoffId) -> ContinuityResult<Handoff> {
        let mut handoff = self.load(handoff_id)?;
        handoff.complete(self.clock.now())?;
        self.handoffs.save(&handoff)?;
        tracing::info!(handoff_id = %handoff_id, "Handoff completed");
        Ok(handoff)
    }

    /// Cancel a handoff from Initiated or Accepted. The source session,
    /// moved to HandedOff at initiation, is reverted to Active; no target
    /// session ever persists.
    pub fn cancel(&self, handoff_id: HandoffId) -> ContinuityResult<Handoff> {
        let mut handoff = self.load(handoff_id)?;
        let mut source = self.load_session(handoff.source_session_id)?;

        handoff.cancel()?;
        let revert_source = source.state == SessionState::HandedOff
            && source.terminated_by_handoff == Some(handoff_id);
        if revert_source {
            source.revert_handoff()?;
        }

        self.handoffs.save(&handoff)?;
        if revert_source {
            self.sessions.save(&source)?;
        }
        tracing::info!(
            handoff_id = %handoff_id,
            source_session_id = %source.session_id,
            source_reverted = revert_source,
            "Handoff cancelled"
        );
        Ok(handoff)
    }

    /// Fail a handoff from Initiated or Accepted, recording why. The source
    /// session is left exactly as it is; root cause may need an operator.
    pub fn fail(&self, handoff_id: HandoffId, reason: &str) -> ContinuityResult<Handoff> {
        let mut handoff = self.load(handoff_id)?;
        handoff.fail(reason)?;
        self.handoffs.save(&handoff)?;
        tracing::warn!(handoff_id = %handoff_id, reason, "Handoff failed");
        Ok(handoff)
    }

    /// Highest prior-turn sequence among this conversation's Completed
    /// handoffs. Unresolvable turn ids contribute no ordering information.
    fn max_completed_prior_sequence(
        &self,
        conversation_id: ConversationId,
    ) -> ContinuityResult<Option<SequenceNumber>> {
        let mut max = None;
        for handoff in self.handoffs.find_by_conversation(conversation_id)? {
            if handoff.status != HandoffStatus::Completed {
                continue;
            }
            if let Some(sequence) = self
                .log
                .sequence_of_turn(conversation_id, handoff.prior_turn_id)?
            {
                max = Some(match max {
                    None => sequence,
                    Some(current) => sequence.max(current),
                });
            }
        }
        Ok(max)
    }

    pub(crate) fn load(&self, handoff_id: HandoffId) -> ContinuityResult<Handoff> {
        self.handoffs.find_by_id(handoff_id)?.ok_or_else(|| {
            StorageError::NotFound {
                entity_type: EntityType::Handoff,
                id: handoff_id,
            }
            .into()
        })
    }

    fn load_session(&self, session_id: SessionId) -> ContinuityResult<AgentSession> {
        self.sessions.find_by_id(session_id)?.ok_or_else(|| {
            StorageError::NotFound {
                entity_type: EntityType::Session,
                id: session_id,
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::AppendMessage;
    use crate::session::{SessionTracker, StartSession};
    use crate::snapshot::TruncationSummarizer;
    use baton_core::{
        ContentPart, ContinuityConfig, ContinuityError, Message, MessageRole, new_entity_id,
    };
    use baton_storage::{MemoryStore, SnapshotRepository, SystemClock};

    struct Fixture {
        store: Arc<MemoryStore>,
        log: MessageLog,
        tracker: SessionTracker,
        coordinator: HandoffCoordinator,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let log = MessageLog::new(store.clone(), clock.clone());
        let config = ContinuityConfig {
            summary_excerpt_chars: 200,
            summary_max_messages: 50,
        };
        let capture = SnapshotCapture::new(
            store.clone(),
            store.clone(),
            clock.clone(),
            Arc::new(TruncationSummarizer::from_config(&config)),
        );
        let tracker = SessionTracker::new(store.clone(), clock.clone());
        let coordinator = HandoffCoordinator::new(
            store.clone(),
            store.clone(),
            log.clone(),
            capture,
            clock,
        );
        Fixture {
            store,
            log,
            tracker,
            coordinator,
        }
    }

    fn append_turn(fixture: &Fixture, conversation_id: ConversationId, seq: i64) -> Message {
        fixture
            .log
            .append(AppendMessage::new(
                conversation_id,
                MessageRole::Assistant,
                vec![ContentPart::text(format!("turn {seq}"))],
                seq,
            ))
            .unwrap()
    }

    #[test]
    fn test_initiate_moves_source_to_handed_off_with_snapshot() {
        let fixture = fixture();
        let conversation_id = new_entity_id();
        let turn = append_turn(&fixture, conversation_id, 1);
        append_turn(&fixture, conversation_id, 2);

        let session = fixture
            .tracker
            .start(StartSession::new(conversation_id, "claude", 1))
            .unwrap();

        let initiation = fixture
            .coordinator
            .initiate(
                InitiateHandoff::new(session.session_id, turn.message_id, "codex")
                    .with_reason("needs a different toolchain"),
            )
            .unwrap();

        assert_eq!(initiation.handoff.status, HandoffStatus::Initiated);
        assert_eq!(initiation.source_session.state, SessionState::HandedOff);
        assert!(initiation.source_session.ended_at.is_some());
        assert_eq!(initiation.source_session.end_sequence, Some(2));
        assert_eq!(
            initiation.source_session.terminated_by_handoff,
            Some(initiation.handoff.handoff_id)
        );

        // The snapshot is persisted, typed, and linked to the session.
        let snapshots = SnapshotRepository::find_by_session(
            fixture.store.as_ref(),
            session.session_id,
        )
        .unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].snapshot_type, SnapshotType::HandoffInitiated);
        assert_eq!(snapshots[0].sequence_start, 1);
        assert_eq!(snapshots[0].sequence_end, 2);
        assert_eq!(
            initiation.source_session.context_snapshots,
            vec![snapshots[0].snapshot_id]
        );
    }

    #[test]
    fn test_initiate_from_paused_session() {
        let fixture = fixture();
        let conversation_id = new_entity_id();
        let turn = append_turn(&fixture, conversation_id, 1);
        let session = fixture
            .tracker
            .start(StartSession::new(conversation_id, "claude", 1))
            .unwrap();
        fixture
            .tracker
            .transition(session.session_id, SessionState::Paused)
            .unwrap();

        assert!(fixture
            .coordinator
            .initiate(InitiateHandoff::new(
                session.session_id,
                turn.message_id,
                "codex",
            ))
            .is_ok());
    }

    #[test]
    fn test_initiate_rejects_terminal_source() {
        let fixture = fixture();
        let conversation_id = new_entity_id();
        let turn = append_turn(&fixture, conversation_id, 1);
        let session = fixture
            .tracker
            .start(StartSession::new(conversation_id, "claude", 1))
            .unwrap();
        fixture
            .tracker
            .transition(session.session_id, SessionState::Completed)
            .unwrap();

        let err = fixture
            .coordinator
            .initiate(InitiateHandoff::new(
                session.session_id,
                turn.message_id,
                "codex",
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            ContinuityError::Transition(TransitionError::SourceSessionNotEligible { .. })
        ));
        // Nothing was written.
        assert_eq!(fixture.store.handoff_count(), 0);
        assert_eq!(fixture.store.snapshot_count(), 0);
    }

    #[test]
    fn test_accept_then_complete() {
        let fixture = fixture();
        let conversation_id = new_entity_id();
        let turn = append_turn(&fixture, conversation_id, 1);
        let session = fixture
            .tracker
            .start(StartSession::new(conversation_id, "claude", 1))
            .unwrap();
        let initiation = fixture
            .coordinator
            .initiate(InitiateHandoff::new(
                session.session_id,
                turn.message_id,
                "codex",
            ))
            .unwrap();

        let target_session_id = new_entity_id();
        let accepted = fixture
            .coordinator
            .accept(initiation.handoff.handoff_id, target_session_id)
            .unwrap();
        assert_eq!(accepted.status, HandoffStatus::Accepted);
        assert_eq!(accepted.target_session_id, Some(target_session_id));

        let completed = fixture
            .coordinator
            .complete(initiation.handoff.handoff_id)
            .unwrap();
        assert_eq!(completed.status, HandoffStatus::Completed);
        assert!(completed.completed_at.is_some());

        // Completing twice is detected, never duplicated.
        let err = fixture
            .coordinator
            .complete(initiation.handoff.handoff_id)
            .unwrap_err();
        assert!(matches!(
            err,
            ContinuityError::Transition(TransitionError::InvalidHandoffTransition {
                from: HandoffStatus::Completed,
                to: HandoffStatus::Completed,
            })
        ));
    }

    #[test]
    fn test_cancel_reverts_source_session() {
        let fixture = fixture();
        let conversation_id = new_entity_id();
        let turn = append_turn(&fixture, conversation_id, 1);
        let session = fixture
            .tracker
            .start(StartSession::new(conversation_id, "claude", 1))
            .unwrap();
        let initiation = fixture
            .coordinator
            .initiate(InitiateHandoff::new(
                session.session_id,
                turn.message_id,
                "codex",
            ))
            .unwrap();

        let cancelled = fixture
            .coordinator
            .cancel(initiation.handoff.handoff_id)
            .unwrap();
        assert_eq!(cancelled.status, HandoffStatus::Cancelled);
        assert!(cancelled.target_session_id.is_none());

        let source = fixture
            .tracker
            .load(session.session_id)
            .unwrap();
        assert_eq!(source.state, SessionState::Active);
        assert!(source.ended_at.is_none());
        assert!(source.end_sequence.is_none());
        assert!(source.terminated_by_handoff.is_none());
    }

    #[test]
    fn test_cancel_after_accept_drops_target() {
        let fixture = fixture();
        let conversation_id = new_entity_id();
        let turn = append_turn(&fixture, conversation_id, 1);
        let session = fixture
            .tracker
            .start(StartSession::new(conversation_id, "claude", 1))
            .unwrap();
        let initiation = fixture
            .coordinator
            .initiate(InitiateHandoff::new(
                session.session_id,
                turn.message_id,
                "codex",
            ))
            .unwrap();
        fixture
            .coordinator
            .accept(initiation.handoff.handoff_id, new_entity_id())
            .unwrap();

        let cancelled = fixture
            .coordinator
            .cancel(initiation.handoff.handoff_id)
            .unwrap();
        assert!(cancelled.target_session_id.is_none());
        // Only the source session exists; the target was never materialized.
        assert_eq!(fixture.store.session_count(), 1);
    }

    #[test]
    fn test_fail_leaves_source_as_is() {
        let fixture = fixture();
        let conversation_id = new_entity_id();
        let turn = append_turn(&fixture, conversation_id, 1);
        let session = fixture
            .tracker
            .start(StartSession::new(conversation_id, "claude", 1))
            .unwrap();
        let initiation = fixture
            .coordinator
            .initiate(InitiateHandoff::new(
                session.session_id,
                turn.message_id,
                "codex",
            ))
            .unwrap();

        let failed = fixture
            .coordinator
            .fail(initiation.handoff.handoff_id, "target backend unreachable")
            .unwrap();
        assert_eq!(failed.status, HandoffStatus::Failed);
        assert_eq!(
            failed.failure_reason.as_deref(),
            Some("target backend unreachable")
        );

        let source = fixture.tracker.load(session.session_id).unwrap();
        assert_eq!(source.state, SessionState::HandedOff);
    }

    #[test]
    fn test_out_of_order_handoff_rejected() {
        let fixture = fixture();
        let conversation_id = new_entity_id();
        let early_turn = append_turn(&fixture, conversation_id, 1);
        append_turn(&fixture, conversation_id, 2);
        let late_turn = append_turn(&fixture, conversation_id, 3);

        let first = fixture
            .tracker
            .start(StartSession::new(conversation_id, "claude", 1))
            .unwrap();
        let initiation = fixture
            .coordinator
            .initiate(InitiateHandoff::new(
                first.session_id,
                late_turn.message_id,
                "codex",
            ))
            .unwrap();
        fixture
            .coordinator
            .accept(initiation.handoff.handoff_id, new_entity_id())
            .unwrap();
        fixture
            .coordinator
            .complete(initiation.handoff.handoff_id)
            .unwrap();

        // A later session replaying a handoff anchored before the completed
        // one must be rejected.
        let second = fixture
            .tracker
            .start(StartSession::new(conversation_id, "codex", 4))
            .unwrap();
        let err = fixture
            .coordinator
            .initiate(InitiateHandoff::new(
                second.session_id,
                early_turn.message_id,
                "claude",
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            ContinuityError::Transition(TransitionError::OutOfOrderHandoff {
                prior_sequence: 1,
                completed_sequence: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_unresolvable_prior_turn_skips_ordering_check() {
        let fixture = fixture();
        let conversation_id = new_entity_id();
        append_turn(&fixture, conversation_id, 1);
        let session = fixture
            .tracker
            .start(StartSession::new(conversation_id, "claude", 1))
            .unwrap();

        // A turn that never produced a stored message carries no ordering
        // information; the initiate proceeds.
        assert!(fixture
            .coordinator
            .initiate(InitiateHandoff::new(
                session.session_id,
                new_entity_id(),
                "codex",
            ))
            .is_ok());
    }
}
