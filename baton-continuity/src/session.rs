//! Agent session tracking.
//!
//! Sessions model exclusive ownership of conversation turns by one backend.
//! The single-Active-session invariant is what lets the handoff coordinator
//! reason about who currently owns a conversation without races; callers
//! serialize same-conversation operations through the facade.

use baton_core::{
    AgentSession, ConflictError, ContinuityResult, ConversationId, EntityType, HandoffId,
    SequenceNumber, SessionId, SessionState, StorageError, TurnId,
};
use baton_storage::{Clock, SessionRepository};
use std::sync::Arc;

/// Request to start a session.
#[derive(Debug, Clone)]
pub struct StartSession {
    pub conversation_id: ConversationId,
    pub agent_backend: String,
    pub start_sequence: SequenceNumber,
    /// Present only for sessions created to accept a handoff
    pub initiated_by_handoff: Option<HandoffId>,
    /// Present only when a handoff reserved the session id at acceptance
    pub session_id: Option<SessionId>,
}

impl StartSession {
    pub fn new(
        conversation_id: ConversationId,
        agent_backend: &str,
        start_sequence: SequenceNumber,
    ) -> Self {
        Self {
            conversation_id,
            agent_backend: agent_backend.to_string(),
            start_sequence,
            initiated_by_handoff: None,
            session_id: None,
        }
    }

    pub fn for_handoff(mut self, handoff_id: HandoffId, session_id: SessionId) -> Self {
        self.initiated_by_handoff = Some(handoff_id);
        self.session_id = Some(session_id);
        self
    }
}

/// Tracks agent sessions and enforces their state machine.
#[derive(Clone)]
pub struct SessionTracker {
    sessions: Arc<dyn SessionRepository>,
    clock: Arc<dyn Clock>,
}

impl SessionTracker {
    pub fn new(sessions: Arc<dyn SessionRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { sessions, clock }
    }

    /// Start a new Active session.
    ///
    /// Fails with `ConflictingActiveSession` when the conversation already
    /// has one. A session accepting a handoff passes naturally: initiation
    /// already moved the source session out of Active.
    pub fn start(&self, request: StartSession) -> ContinuityResult<AgentSession> {
        if let Some(active) = self
            .sessions
            .find_active_for_conversation(request.conversation_id)?
        {
            return Err(ConflictError::ConflictingActiveSession {
                conversation_id: request.conversation_id,
                session_id: active.session_id,
            }
            .into());
        }

        let mut session = AgentSession::new(
            request.conversation_id,
            &request.agent_backend,
            request.start_sequence,
            request.initiated_by_handoff,
            self.clock.now(),
        );
        if let Some(session_id) = request.session_id {
            session = session.with_id(session_id);
        }
        self.sessions.save(&session)?;
        tracing::debug!(
            session_id = %session.session_id,
            conversation_id = %session.conversation_id,
            agent_backend = %session.agent_backend,
            start_sequence = session.start_sequence,
            "Session started"
        );
        Ok(session)
    }

    /// Append a turn to a session's ordered turn list.
    pub fn record_turn(
        &self,
        session_id: SessionId,
        turn_id: TurnId,
    ) -> ContinuityResult<AgentSession> {
        let mut session = self.load(session_id)?;
        session.record_turn(turn_id)?;
        self.sessions.save(&session)?;
        Ok(session)
    }

    /// Move a session to `new_state`, stamping `ended_at` on entry into a
    /// terminal state.
    pub fn transition(
        &self,
        session_id: SessionId,
        new_state: SessionState,
    ) -> ContinuityResult<AgentSession> {
        let mut session = self.load(session_id)?;
        session.transition(new_state, self.clock.now())?;
        self.sessions.save(&session)?;
        tracing::debug!(
            session_id = %session.session_id,
            state = %session.state,
            "Session transitioned"
        );
        Ok(session)
    }

    pub(crate) fn load(&self, session_id: SessionId) -> ContinuityResult<AgentSession> {
        self.sessions
            .find_by_id(session_id)?
            .ok_or_else(|| {
                StorageError::NotFound {
                    entity_type: EntityType::Session,
                    id: session_id,
                }
                .into()
            })
    }
}
