//! BATON Core - Entity Types
//!
//! Pure data structures for the conversation continuity engine. All other
//! crates depend on this. Behavior here is limited to entity-local state
//! transitions; orchestration lives in baton-continuity.

mod config;
mod entities;
mod enums;
mod error;
mod identity;

pub use config::ContinuityConfig;
pub use entities::{
    AgentResponseAudit, AgentSession, ContentPart, ContextSnapshot, Conversation, Handoff,
    Message, MessageMetadata, SequenceRange, ToolCallAudit, ToolCallRef, VisibleToolCall,
};
pub use enums::{
    AgentResponseStatus, ConversationState, EntityType, HandoffStatus, HandoffStatusParseError,
    MessageRole, RoleParseError, SessionState, SessionStateParseError, SnapshotType,
    SnapshotTypeParseError, ToolCallStatus,
};
pub use error::{
    ConfigError, ConflictError, ContinuityError, ContinuityResult, StorageError, TransitionError,
    ValidationError,
};
pub use identity::{
    compute_content_hash, new_entity_id, ContentHash, ConversationId, EntityId, HandoffId,
    MessageId, SequenceNumber, SessionId, SnapshotId, Timestamp, TurnId,
};
