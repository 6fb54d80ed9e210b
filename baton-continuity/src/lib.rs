//! BATON Continuity - Conversation Continuity Engine
//!
//! Coordinates interchangeable agent backends over a shared conversation:
//! - Append-only message log with strict per-conversation sequencing
//! - Agent session state machine with exclusive conversation ownership
//! - Handoff protocol transferring control between sessions
//! - Context snapshots reconstructing what a session could see
//!
//! External services depend on [`ContinuityFacade`]; the component types are
//! exported for embedders that wire their own repositories.

mod facade;
mod handoff;
mod log;
mod session;
mod snapshot;

pub use facade::{ContinuityFacade, ConversationTimeline, HandoffCompletion};
pub use handoff::{HandoffCoordinator, HandoffInitiation, InitiateHandoff};
pub use log::{AppendMessage, MessageLog};
pub use session::{SessionTracker, StartSession};
pub use snapshot::{
    SnapshotCapture, SummaryStrategy, TruncationSummarizer, estimate_tokens,
};
