//! Conversation continuity facade.
//!
//! The one surface external services depend on. Composes the log, the
//! session tracker, the handoff coordinator, and snapshot capture, and
//! serializes every read-then-write sequence behind a per-conversation
//! exclusive section so callers cannot leave the session/handoff pair in a
//! half-updated state. Pure appends skip the lock; the store's uniqueness
//! constraint is enough.

use baton_core::{
    AgentSession, ContextSnapshot, ContinuityConfig, ContinuityResult, ConversationId, Handoff,
    HandoffId, HandoffStatus, Message, SequenceNumber, SequenceRange, SessionId, SessionState,
    SnapshotType, StorageError, TransitionError, TurnId, new_entity_id,
};
use baton_storage::{
    Clock, HandoffRepository, MessageRepository, SessionRepository, SnapshotRepository,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::handoff::{HandoffCoordinator, HandoffInitiation, InitiateHandoff};
use crate::log::{AppendMessage, MessageLog};
use crate::session::{SessionTracker, StartSession};
use crate::snapshot::{SnapshotCapture, SummaryStrategy, TruncationSummarizer};

// ============================================================================
// PER-CONVERSATION LOCKS
// ============================================================================

/// Process-local exclusive sections, one per conversation. Session and
/// handoff invariants are conversation-scoped, so writers for different
/// conversations never contend.
#[derive(Default)]
struct ConversationLocks {
    inner: Mutex<HashMap<ConversationId, Arc<Mutex<()>>>>,
}

impl ConversationLocks {
    fn for_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> ContinuityResult<Arc<Mutex<()>>> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(map.entry(conversation_id).or_default().clone())
    }
}

// ============================================================================
// READ MODEL
// ============================================================================

/// Everything that happened in a conversation, reconstructed for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTimeline {
    pub conversation_id: ConversationId,
    pub messages: Vec<Message>,
    pub sessions: Vec<AgentSession>,
    pub handoffs: Vec<Handoff>,
    pub snapshots: Vec<ContextSnapshot>,
}

/// A completed handoff together with the session it materialized.
#[derive(Debug, Clone)]
pub struct HandoffCompletion {
    pub handoff: Handoff,
    pub target_session: AgentSession,
}

// ============================================================================
// FACADE
// ============================================================================

/// Composes the continuity engine for external callers.
pub struct ContinuityFacade {
    log: MessageLog,
    tracker: SessionTracker,
    coordinator: HandoffCoordinator,
    capture: SnapshotCapture,
    sessions: Arc<dyn SessionRepository>,
    handoffs: Arc<dyn HandoffRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    locks: ConversationLocks,
}

impl ContinuityFacade {
    /// Wire the engine with the default truncation summarizer.
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        sessions: Arc<dyn SessionRepository>,
        handoffs: Arc<dyn HandoffRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
        clock: Arc<dyn Clock>,
        config: &ContinuityConfig,
    ) -> ContinuityResult<Self> {
        config.validate()?;
        let strategy: Arc<dyn SummaryStrategy> =
            Arc::new(TruncationSummarizer::from_config(config));
        Ok(Self::with_summary_strategy(
            messages, sessions, handoffs, snapshots, clock, strategy,
        ))
    }

    /// Wire the engine with a caller-supplied summarization policy.
    pub fn with_summary_strategy(
        messages: Arc<dyn MessageRepository>,
        sessions: Arc<dyn SessionRepository>,
        handoffs: Arc<dyn HandoffRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
        clock: Arc<dyn Clock>,
        strategy: Arc<dyn SummaryStrategy>,
    ) -> Self {
        let log = MessageLog::new(messages.clone(), clock.clone());
        let capture = SnapshotCapture::new(
            messages,
            snapshots.clone(),
            clock.clone(),
            strategy,
        );
        let tracker = SessionTracker::new(sessions.clone(), clock.clone());
        let coordinator = HandoffCoordinator::new(
            sessions.clone(),
            handoffs.clone(),
            log.clone(),
            capture.clone(),
            clock,
        );
        Self {
            log,
            tracker,
            coordinator,
            capture,
            sessions,
            handoffs,
            snapshots,
            locks: ConversationLocks::default(),
        }
    }

    // ========================================================================
    // MESSAGE LOG
    // ========================================================================

    /// Append one message. No lock: the caller supplies the sequence number
    /// and the store's uniqueness constraint arbitrates collisions.
    pub fn append_message(&self, request: AppendMessage) -> ContinuityResult<Message> {
        self.log.append(request)
    }

    /// All messages of a conversation in ascending sequence order.
    pub fn list_messages(&self, conversation_id: ConversationId) -> ContinuityResult<Vec<Message>> {
        self.log.list(conversation_id)
    }

    // ========================================================================
    // SESSIONS
    // ========================================================================

    /// Start a session for a backend. When `start_sequence` is omitted the
    /// session begins right after the log's current end. If the log already
    /// has history, a `SessionStart` snapshot records what the new session
    /// can see.
    pub fn begin_session(
        &self,
        conversation_id: ConversationId,
        agent_backend: &str,
        start_sequence: Option<SequenceNumber>,
    ) -> ContinuityResult<AgentSession> {
        let lock = self.locks.for_conversation(conversation_id)?;
        let _guard = lock.lock().map_err(|_| StorageError::LockPoisoned)?;

        let latest = self.log.latest_sequence(conversation_id)?;
        let start_sequence =
            start_sequence.unwrap_or_else(|| latest.map_or(1, |sequence| sequence + 1));
        let mut session = self.tracker.start(StartSession::new(
            conversation_id,
            agent_backend,
            start_sequence,
        ))?;

        if let Some(latest) = latest {
            let range = SequenceRange::new(1, latest)?;
            let snapshot = self.capture.capture(
                conversation_id,
                session.session_id,
                range,
                SnapshotType::SessionStart,
            )?;
            session.record_snapshot(snapshot.snapshot_id);
            self.sessions.save(&session)?;
        }
        Ok(session)
    }

    /// Record a turn against a session.
    pub fn record_turn(
        &self,
        session_id: SessionId,
        turn_id: TurnId,
    ) -> ContinuityResult<AgentSession> {
        let conversation_id = self.tracker.load(session_id)?.conversation_id;
        let lock = self.locks.for_conversation(conversation_id)?;
        let _guard = lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        self.tracker.record_turn(session_id, turn_id)
    }

    /// Drive a session through its state machine.
    pub fn transition_session(
        &self,
        session_id: SessionId,
        new_state: SessionState,
    ) -> ContinuityResult<AgentSession> {
        let conversation_id = self.tracker.load(session_id)?.conversation_id;
        let lock = self.locks.for_conversation(conversation_id)?;
        let _guard = lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        self.tracker.transition(session_id, new_state)
    }

    // ========================================================================
    // HANDOFFS
    // ========================================================================

    /// Initiate a handoff plus its snapshot as one transaction-equivalent
    /// unit: either both exist afterwards, or neither.
    pub fn request_handoff(
        &self,
        request: InitiateHandoff,
    ) -> ContinuityResult<HandoffInitiation> {
        let conversation_id = self.tracker.load(request.source_session_id)?.conversation_id;
        let lock = self.locks.for_conversation(conversation_id)?;
        let _guard = lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        self.coordinator.initiate(request)
    }

    /// Accept a handoff on behalf of the target backend. Allocates and
    /// reserves the target session id; the session record appears at
    /// completion.
    pub fn accept_handoff(&self, handoff_id: HandoffId) -> ContinuityResult<Handoff> {
        let conversation_id = self.coordinator.load(handoff_id)?.conversation_id;
        let lock = self.locks.for_conversation(conversation_id)?;
        let _guard = lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        self.coordinator.accept(handoff_id, new_entity_id())
    }

    /// Materialize the target session (linked back to the handoff at
    /// creation) and mark the handoff Completed, atomically from the
    /// caller's perspective.
    pub fn complete_handoff(&self, handoff_id: HandoffId) -> ContinuityResult<HandoffCompletion> {
        let conversation_id = self.coordinator.load(handoff_id)?.conversation_id;
        let lock = self.locks.for_conversation(conversation_id)?;
        let _guard = lock.lock().map_err(|_| StorageError::LockPoisoned)?;

        let handoff = self.coordinator.load(handoff_id)?;
        if !handoff.status.can_transition_to(HandoffStatus::Completed) {
            return Err(TransitionError::InvalidHandoffTransition {
                from: handoff.status,
                to: HandoffStatus::Completed,
            }
            .into());
        }
        // Accepted status guarantees the reservation exists.
        let Some(target_session_id) = handoff.target_session_id else {
            return Err(TransitionError::InvalidHandoffTransition {
                from: handoff.status,
                to: HandoffStatus::Completed,
            }
            .into());
        };

        let start_sequence = self
            .log
            .latest_sequence(conversation_id)?
            .map_or(1, |sequence| sequence + 1);
        let target_session = self.tracker.start(
            StartSession::new(conversation_id, &handoff.target_agent, start_sequence)
                .for_handoff(handoff_id, target_session_id),
        )?;
        let handoff = self.coordinator.complete(handoff_id)?;
        Ok(HandoffCompletion {
            handoff,
            target_session,
        })
    }

    /// Cancel a handoff; the source session is reverted to Active and no
    /// target session persists.
    pub fn cancel_handoff(&self, handoff_id: HandoffId) -> ContinuityResult<Handoff> {
        let conversation_id = self.coordinator.load(handoff_id)?.conversation_id;
        let lock = self.locks.for_conversation(conversation_id)?;
        let _guard = lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        self.coordinator.cancel(handoff_id)
    }

    /// Fail a handoff, leaving the source session untouched.
    pub fn fail_handoff(&self, handoff_id: HandoffId, reason: &str) -> ContinuityResult<Handoff> {
        let conversation_id = self.coordinator.load(handoff_id)?.conversation_id;
        let lock = self.locks.for_conversation(conversation_id)?;
        let _guard = lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        self.coordinator.fail(handoff_id, reason)
    }

    // ========================================================================
    // SNAPSHOTS
    // ========================================================================

    /// Capture a snapshot for a session over an explicit range.
    pub fn capture_snapshot(
        &self,
        session_id: SessionId,
        range: SequenceRange,
        snapshot_type: SnapshotType,
    ) -> ContinuityResult<ContextSnapshot> {
        let conversation_id = self.tracker.load(session_id)?.conversation_id;
        let lock = self.locks.for_conversation(conversation_id)?;
        let _guard = lock.lock().map_err(|_| StorageError::LockPoisoned)?;

        let mut session = self.tracker.load(session_id)?;
        let snapshot =
            self.capture
                .capture(session.conversation_id, session_id, range, snapshot_type)?;
        session.record_snapshot(snapshot.snapshot_id);
        self.sessions.save(&session)?;
        Ok(snapshot)
    }

    /// True when a snapshot still matches the log it claims to describe.
    pub fn verify_snapshot(&self, snapshot: &ContextSnapshot) -> ContinuityResult<bool> {
        self.capture.verify(snapshot)
    }

    // ========================================================================
    // READ PATH
    // ========================================================================

    /// Reconstruct everything that happened in a conversation.
    pub fn timeline(
        &self,
        conversation_id: ConversationId,
    ) -> ContinuityResult<ConversationTimeline> {
        let messages = self.log.list(conversation_id)?;
        let sessions = self.sessions.find_by_conversation(conversation_id)?;
        let handoffs = self.handoffs.find_by_conversation(conversation_id)?;

        let mut snapshots = Vec::new();
        for session in &sessions {
            snapshots.extend(self.snapshots.find_by_session(session.session_id)?);
        }
        snapshots.sort_by_key(|s| (s.captured_at, s.sequence_end));

        Ok(ConversationTimeline {
            conversation_id,
            messages,
            sessions,
            handoffs,
            snapshots,
        })
    }
}
