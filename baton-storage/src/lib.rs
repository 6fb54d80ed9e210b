//! BATON Storage - Repository Ports and In-Memory Reference Store
//!
//! Defines the ports the continuity engine consumes. Persistence technology
//! is an external collaborator; `MemoryStore` is the reference
//! implementation used by tests and embedders that need no durability.

use baton_core::{
    AgentSession, ConflictError, ContextSnapshot, ContinuityResult, Conversation, ConversationId,
    Handoff, HandoffId, Message, MessageId, SequenceNumber, SessionId, SessionState, SnapshotId,
    Timestamp,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

// ============================================================================
// CLOCK
// ============================================================================

/// Time source for all engine timestamps. Injected rather than read from
/// ambient system time so tests control time deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now()
    }
}

// ============================================================================
// REPOSITORY PORTS
// ============================================================================

/// Append-only message storage. The store enforces uniqueness of both the
/// message id and `(conversation_id, sequence_number)`; it never reorders
/// or mutates.
pub trait MessageRepository: Send + Sync {
    /// Durably append one message. Fails with `DuplicateMessageId` or
    /// `DuplicateSequence`, distinguished so callers can tell identity
    /// collision from ordering collision.
    fn append(&self, message: &Message) -> ContinuityResult<()>;

    /// All messages of a conversation in ascending sequence order.
    fn find_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> ContinuityResult<Vec<Message>>;
}

/// Agent session storage. `save` is an upsert keyed by `session_id`.
pub trait SessionRepository: Send + Sync {
    fn save(&self, session: &AgentSession) -> ContinuityResult<()>;

    fn find_by_id(&self, session_id: SessionId) -> ContinuityResult<Option<AgentSession>>;

    /// The conversation's Active session, if any. At most one exists.
    fn find_active_for_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> ContinuityResult<Option<AgentSession>>;

    /// All sessions of a conversation, oldest first. Feeds the timeline
    /// read path.
    fn find_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> ContinuityResult<Vec<AgentSession>>;
}

/// Handoff storage. `save` is an upsert keyed by `handoff_id`.
pub trait HandoffRepository: Send + Sync {
    fn save(&self, handoff: &Handoff) -> ContinuityResult<()>;

    fn find_by_id(&self, handoff_id: HandoffId) -> ContinuityResult<Option<Handoff>>;

    /// All handoffs of a conversation, oldest first.
    fn find_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> ContinuityResult<Vec<Handoff>>;
}

/// Context snapshot storage. Snapshots are immutable; `save` inserts only.
pub trait SnapshotRepository: Send + Sync {
    fn save(&self, snapshot: &ContextSnapshot) -> ContinuityResult<()>;

    /// All snapshots captured for a session, oldest first.
    fn find_by_session(&self, session_id: SessionId) -> ContinuityResult<Vec<ContextSnapshot>>;
}

// ============================================================================
// IN-MEMORY REFERENCE STORE
// ============================================================================

/// In-memory store implementing every repository port.
///
/// The sequence index is a `BTreeMap` per conversation: ascending iteration
/// gives sorted reads, `contains_key` gives the duplicate-sequence check.
#[derive(Debug, Default)]
pub struct MemoryStore {
    conversations: Arc<RwLock<HashMap<ConversationId, Conversation>>>,
    messages: Arc<RwLock<HashMap<MessageId, Message>>>,
    sequence_index: Arc<RwLock<HashMap<ConversationId, BTreeMap<SequenceNumber, MessageId>>>>,
    sessions: Arc<RwLock<HashMap<SessionId, AgentSession>>>,
    handoffs: Arc<RwLock<HashMap<HandoffId, Handoff>>>,
    snapshots: Arc<RwLock<HashMap<SnapshotId, ContextSnapshot>>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The conversation row created by the first append, if any.
    pub fn conversation(&self, id: ConversationId) -> Option<Conversation> {
        self.conversations.read().unwrap().get(&id).cloned()
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        self.conversations.write().unwrap().clear();
        self.messages.write().unwrap().clear();
        self.sequence_index.write().unwrap().clear();
        self.sessions.write().unwrap().clear();
        self.handoffs.write().unwrap().clear();
        self.snapshots.write().unwrap().clear();
    }

    /// Get count of stored messages.
    pub fn message_count(&self) -> usize {
        self.messages.read().unwrap().len()
    }

    /// Get count of stored sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Get count of stored handoffs.
    pub fn handoff_count(&self) -> usize {
        self.handoffs.read().unwrap().len()
    }

    /// Get count of stored snapshots.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.read().unwrap().len()
    }
}

impl MessageRepository for MemoryStore {
    fn append(&self, message: &Message) -> ContinuityResult<()> {
        let mut messages = self.messages.write().unwrap();
        let mut index = self.sequence_index.write().unwrap();

        if messages.contains_key(&message.message_id) {
            return Err(ConflictError::DuplicateMessageId {
                id: message.message_id,
            }
            .into());
        }

        let conversation_index = index.entry(message.conversation_id).or_default();
        if conversation_index.contains_key(&message.sequence_number) {
            return Err(ConflictError::DuplicateSequence {
                conversation_id: message.conversation_id,
                sequence_number: message.sequence_number,
            }
            .into());
        }

        conversation_index.insert(message.sequence_number, message.message_id);
        messages.insert(message.message_id, message.clone());

        // Conversations come into existence with their first message.
        self.conversations
            .write()
            .unwrap()
            .entry(message.conversation_id)
            .or_insert_with(|| Conversation::new(message.conversation_id, message.created_at));

        Ok(())
    }

    fn find_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> ContinuityResult<Vec<Message>> {
        let messages = self.messages.read().unwrap();
        let index = self.sequence_index.read().unwrap();
        let ordered = index
            .get(&conversation_id)
            .map(|conversation_index| {
                conversation_index
                    .values()
                    .filter_map(|id| messages.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(ordered)
    }
}

impl SessionRepository for MemoryStore {
    fn save(&self, session: &AgentSession) -> ContinuityResult<()> {
        self.sessions
            .write()
            .unwrap()
            .insert(session.session_id, session.clone());
        Ok(())
    }

    fn find_by_id(&self, session_id: SessionId) -> ContinuityResult<Option<AgentSession>> {
        Ok(self.sessions.read().unwrap().get(&session_id).cloned())
    }

    fn find_active_for_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> ContinuityResult<Option<AgentSession>> {
        let sessions = self.sessions.read().unwrap();
        Ok(sessions
            .values()
            .find(|s| s.conversation_id == conversation_id && s.state == SessionState::Active)
            .cloned())
    }

    fn find_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> ContinuityResult<Vec<AgentSession>> {
        let sessions = self.sessions.read().unwrap();
        let mut matching: Vec<AgentSession> = sessions
            .values()
            .filter(|s| s.conversation_id == conversation_id)
            .cloned()
            .collect();
        matching.sort_by_key(|s| (s.started_at, s.start_sequence));
        Ok(matching)
    }
}

impl HandoffRepository for MemoryStore {
    fn save(&self, handoff: &Handoff) -> ContinuityResult<()> {
        self.handoffs
            .write()
            .unwrap()
            .insert(handoff.handoff_id, handoff.clone());
        Ok(())
    }

    fn find_by_id(&self, handoff_id: HandoffId) -> ContinuityResult<Option<Handoff>> {
        Ok(self.handoffs.read().unwrap().get(&handoff_id).cloned())
    }

    fn find_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> ContinuityResult<Vec<Handoff>> {
        let handoffs = self.handoffs.read().unwrap();
        let mut matching: Vec<Handoff> = handoffs
            .values()
            .filter(|h| h.conversation_id == conversation_id)
            .cloned()
            .collect();
        matching.sort_by_key(|h| (h.initiated_at, h.handoff_id));
        Ok(matching)
    }
}

impl SnapshotRepository for MemoryStore {
    fn save(&self, snapshot: &ContextSnapshot) -> ContinuityResult<()> {
        self.snapshots
            .write()
            .unwrap()
            .insert(snapshot.snapshot_id, snapshot.clone());
        Ok(())
    }

    fn find_by_session(&self, session_id: SessionId) -> ContinuityResult<Vec<ContextSnapshot>> {
        let snapshots = self.snapshots.read().unwrap();
        let mut matching: Vec<ContextSnapshot> = snapshots
            .values()
            .filter(|s| s.session_id == session_id)
            .cloned()
            .collect();
        matching.sort_by_key(|s| (s.captured_at, s.sequence_end));
        Ok(matching)
    }
}

// ============================================================================
// TESTS
// ============================================================================
