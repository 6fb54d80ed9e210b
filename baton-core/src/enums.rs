//! Status enums and state-machine tables for BATON entities.
//!
//! Session and handoff lifecycles are validated at runtime through
//! `can_transition_to` because entities are loaded from storage, where the
//! state is data, not a type parameter.
//!
//! # State Transition Diagrams
//!
//! ```text
//! Session: Active ──┬──→ Paused ──→ Active
//!                   ├──→ HandedOff (terminal)
//!                   ├──→ Completed (terminal)
//!                   └──→ Failed    (terminal)
//!
//! Handoff: Initiated ──┬── accept() ──→ Accepted ──┬── complete() → Completed
//!                      ├── cancel() ──→ Cancelled  ├── cancel() ──→ Cancelled
//!                      └── fail() ────→ Failed     └── fail() ────→ Failed
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ENTITY TYPE DISCRIMINATOR
// ============================================================================

/// Entity type discriminator for polymorphic references and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Conversation,
    Message,
    Session,
    Handoff,
    Snapshot,
}

// ============================================================================
// CONVERSATION STATE
// ============================================================================

/// Lifecycle state of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationState {
    /// Conversation is accepting messages and sessions
    Active,
    /// Conversation is retained for audit only
    Archived,
}

// ============================================================================
// MESSAGE ROLE
// ============================================================================

/// Author role of a message in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, RoleParseError> {
        match s.to_lowercase().as_str() {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "tool" => Ok(MessageRole::Tool),
            _ => Err(RoleParseError(s.to_string())),
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for MessageRole {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid message role string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleParseError(pub String);

impl fmt::Display for RoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid message role: {}", self.0)
    }
}

impl std::error::Error for RoleParseError {}

// ============================================================================
// SESSION STATE
// ============================================================================

/// State of an agent session within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Session owns the conversation and may record turns
    Active,
    /// Session retains ownership but is not executing
    Paused,
    /// Session surrendered ownership through a handoff
    HandedOff,
    /// Session finished its work normally
    Completed,
    /// Session was terminated by an error
    Failed,
}

impl SessionState {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            SessionState::Active => "Active",
            SessionState::Paused => "Paused",
            SessionState::HandedOff => "HandedOff",
            SessionState::Completed => "Completed",
            SessionState::Failed => "Failed",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, SessionStateParseError> {
        match s.to_lowercase().as_str() {
            "active" => Ok(SessionState::Active),
            "paused" => Ok(SessionState::Paused),
            "handedoff" | "handed_off" | "handed-off" => Ok(SessionState::HandedOff),
            "completed" | "complete" => Ok(SessionState::Completed),
            "failed" | "failure" => Ok(SessionState::Failed),
            _ => Err(SessionStateParseError(s.to_string())),
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::HandedOff | SessionState::Completed | SessionState::Failed
        )
    }

    /// Check whether the state machine permits moving to `to`.
    pub fn can_transition_to(&self, to: SessionState) -> bool {
        match self {
            SessionState::Active => matches!(
                to,
                SessionState::Paused
                    | SessionState::HandedOff
                    | SessionState::Completed
                    | SessionState::Failed
            ),
            SessionState::Paused => matches!(
                to,
                SessionState::Active
                    | SessionState::HandedOff
                    | SessionState::Completed
                    | SessionState::Failed
            ),
            SessionState::HandedOff | SessionState::Completed | SessionState::Failed => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for SessionState {
    type Err = SessionStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid session state string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStateParseError(pub String);

impl fmt::Display for SessionStateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid session state: {}", self.0)
    }
}

impl std::error::Error for SessionStateParseError {}

// ============================================================================
// HANDOFF STATUS
// ============================================================================

/// Status of a handoff operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandoffStatus {
    /// Handoff has been initiated, waiting for acceptance
    Initiated,
    /// Handoff was accepted; the target session id is reserved
    Accepted,
    /// Handoff has been completed and the target session exists
    Completed,
    /// Handoff failed; the source session is left as-is
    Failed,
    /// Handoff was cancelled and the source session reverted
    Cancelled,
}

impl HandoffStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            HandoffStatus::Initiated => "Initiated",
            HandoffStatus::Accepted => "Accepted",
            HandoffStatus::Completed => "Completed",
            HandoffStatus::Failed => "Failed",
            HandoffStatus::Cancelled => "Cancelled",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, HandoffStatusParseError> {
        match s.to_lowercase().as_str() {
            "initiated" | "pending" => Ok(HandoffStatus::Initiated),
            "accepted" => Ok(HandoffStatus::Accepted),
            "completed" | "complete" => Ok(HandoffStatus::Completed),
            "failed" | "failure" => Ok(HandoffStatus::Failed),
            "cancelled" | "canceled" => Ok(HandoffStatus::Cancelled),
            _ => Err(HandoffStatusParseError(s.to_string())),
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandoffStatus::Completed | HandoffStatus::Failed | HandoffStatus::Cancelled
        )
    }

    /// Check whether the state machine permits moving to `to`.
    pub fn can_transition_to(&self, to: HandoffStatus) -> bool {
        match self {
            HandoffStatus::Initiated => matches!(
                to,
                HandoffStatus::Accepted | HandoffStatus::Cancelled | HandoffStatus::Failed
            ),
            HandoffStatus::Accepted => matches!(
                to,
                HandoffStatus::Completed | HandoffStatus::Cancelled | HandoffStatus::Failed
            ),
            HandoffStatus::Completed | HandoffStatus::Failed | HandoffStatus::Cancelled => false,
        }
    }
}

impl fmt::Display for HandoffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for HandoffStatus {
    type Err = HandoffStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid handoff status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffStatusParseError(pub String);

impl fmt::Display for HandoffStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid handoff status: {}", self.0)
    }
}

impl std::error::Error for HandoffStatusParseError {}

// ============================================================================
// SNAPSHOT TYPE
// ============================================================================

/// Why a context snapshot was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapshotType {
    /// Captured when a session begins
    SessionStart,
    /// Captured when a handoff is initiated
    HandoffInitiated,
    /// Captured when the visible window was truncated
    Truncation,
    /// Captured on explicit request
    Checkpoint,
}

impl SnapshotType {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            SnapshotType::SessionStart => "SessionStart",
            SnapshotType::HandoffInitiated => "HandoffInitiated",
            SnapshotType::Truncation => "Truncation",
            SnapshotType::Checkpoint => "Checkpoint",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, SnapshotTypeParseError> {
        match s.to_lowercase().as_str() {
            "sessionstart" | "session_start" => Ok(SnapshotType::SessionStart),
            "handoffinitiated" | "handoff_initiated" => Ok(SnapshotType::HandoffInitiated),
            "truncation" => Ok(SnapshotType::Truncation),
            "checkpoint" => Ok(SnapshotType::Checkpoint),
            _ => Err(SnapshotTypeParseError(s.to_string())),
        }
    }
}

impl fmt::Display for SnapshotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for SnapshotType {
    type Err = SnapshotTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid snapshot type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotTypeParseError(pub String);

impl fmt::Display for SnapshotTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid snapshot type: {}", self.0)
    }
}

impl std::error::Error for SnapshotTypeParseError {}

// ============================================================================
// AUDIT STATUSES
// ============================================================================

/// Outcome of a tool call recorded in message metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolCallStatus {
    Succeeded,
    Failed,
    Pending,
}

/// Outcome of an agent response recorded in message metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentResponseStatus {
    Completed,
    Incomplete,
    Failed,
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_session_state() -> impl Strategy<Value = SessionState> {
        prop_oneof![
            Just(SessionState::Active),
            Just(SessionState::Paused),
            Just(SessionState::HandedOff),
            Just(SessionState::Completed),
            Just(SessionState::Failed),
        ]
    }

    fn arb_handoff_status() -> impl Strategy<Value = HandoffStatus> {
        prop_oneof![
            Just(HandoffStatus::Initiated),
            Just(HandoffStatus::Accepted),
            Just(HandoffStatus::Completed),
            Just(HandoffStatus::Failed),
            Just(HandoffStatus::Cancelled),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// For any terminal session state S and any target T,
        /// can_transition_to(T) SHALL be false.
        #[test]
        fn prop_terminal_session_states_have_no_exits(
            from in arb_session_state(),
            to in arb_session_state(),
        ) {
            if from.is_terminal() {
                prop_assert!(!from.can_transition_to(to));
            }
        }

        /// For any terminal handoff status S and any target T,
        /// can_transition_to(T) SHALL be false.
        #[test]
        fn prop_terminal_handoff_statuses_have_no_exits(
            from in arb_handoff_status(),
            to in arb_handoff_status(),
        ) {
            if from.is_terminal() {
                prop_assert!(!from.can_transition_to(to));
            }
        }

        /// No state transitions to itself.
        #[test]
        fn prop_no_self_transitions(state in arb_session_state()) {
            prop_assert!(!state.can_transition_to(state));
        }

        /// db string round-trip is the identity.
        #[test]
        fn prop_session_state_db_roundtrip(state in arb_session_state()) {
            prop_assert_eq!(state, SessionState::from_db_str(state.as_db_str()).unwrap());
        }
    }
}
