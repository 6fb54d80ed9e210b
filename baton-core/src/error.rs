//! Error types for BATON operations

use crate::{
    ConversationId, EntityId, EntityType, HandoffStatus, SequenceNumber, SessionId, SessionState,
};
use thiserror::Error;

/// Validation errors. Rejected before any write occurs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Tool call audit at index {index} is missing its call_id")]
    MissingCallId { index: usize },

    #[error("Invalid message metadata: {reason}")]
    InvalidMetadata { reason: String },

    #[error("Invalid sequence range [{start}, {end}]")]
    InvalidSequenceRange {
        start: SequenceNumber,
        end: SequenceNumber,
    },

    #[error("Message must have at least one content part")]
    EmptyContent,
}

/// Conflict errors. Surfaced to the caller verbatim; never retried by this core.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConflictError {
    #[error("Message {id} already exists")]
    DuplicateMessageId { id: EntityId },

    #[error("Sequence {sequence_number} is already taken in conversation {conversation_id}")]
    DuplicateSequence {
        conversation_id: ConversationId,
        sequence_number: SequenceNumber,
    },

    #[error("Conversation {conversation_id} already has active session {session_id}")]
    ConflictingActiveSession {
        conversation_id: ConversationId,
        session_id: SessionId,
    },
}

/// State-machine violations. Fatal to the requested operation; recoverable
/// only by the caller choosing a different operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid session transition from {from} to {to}")]
    InvalidSessionTransition { from: SessionState, to: SessionState },

    #[error("Invalid handoff transition from {from} to {to}")]
    InvalidHandoffTransition {
        from: HandoffStatus,
        to: HandoffStatus,
    },

    #[error("Session {session_id} is in state {state} and cannot record turns")]
    SessionNotActive {
        session_id: SessionId,
        state: SessionState,
    },

    #[error("Session {session_id} is in state {state} and cannot source a handoff")]
    SourceSessionNotEligible {
        session_id: SessionId,
        state: SessionState,
    },

    #[error(
        "Handoff prior turn at sequence {prior_sequence} precedes completed handoff at sequence {completed_sequence} in conversation {conversation_id}"
    )]
    OutOfOrderHandoff {
        conversation_id: ConversationId,
        prior_sequence: SequenceNumber,
        completed_sequence: SequenceNumber,
    },
}

/// Storage layer errors. Repository lookups return `Ok(None)` for absence;
/// `NotFound` is raised by engine operations that require the entity.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: EntityId },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all BATON operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContinuityError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Conflict error: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for BATON operations.
pub type ContinuityResult<T> = Result<T, ContinuityError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_conflict_error_display_duplicate_sequence() {
        let err = ConflictError::DuplicateSequence {
            conversation_id: Uuid::nil(),
            sequence_number: 7,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Sequence 7"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_transition_error_display_invalid_session_transition() {
        let err = TransitionError::InvalidSessionTransition {
            from: SessionState::Completed,
            to: SessionState::Active,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Completed"));
        assert!(msg.contains("Active"));
    }

    #[test]
    fn test_validation_error_display_missing_call_id() {
        let err = ValidationError::MissingCallId { index: 2 };
        assert!(format!("{}", err).contains("index 2"));
    }

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            entity_type: EntityType::Handoff,
            id: Uuid::nil(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Entity not found"));
        assert!(msg.contains("Handoff"));
    }

    #[test]
    fn test_continuity_error_from_variants() {
        let validation = ContinuityError::from(ValidationError::MissingCallId { index: 0 });
        assert!(matches!(validation, ContinuityError::Validation(_)));

        let conflict = ContinuityError::from(ConflictError::DuplicateMessageId {
            id: Uuid::nil(),
        });
        assert!(matches!(conflict, ContinuityError::Conflict(_)));

        let transition = ContinuityError::from(TransitionError::SessionNotActive {
            session_id: Uuid::nil(),
            state: SessionState::Failed,
        });
        assert!(matches!(transition, ContinuityError::Transition(_)));

        let storage = ContinuityError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, ContinuityError::Storage(_)));
    }
}
