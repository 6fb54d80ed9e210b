//! Engine configuration
//!
//! All values are required - no defaults anywhere. Callers construct the
//! config explicitly and `validate()` before wiring the engine.

use crate::{ConfigError, ContinuityResult};
use serde::{Deserialize, Serialize};

/// Configuration for the continuity engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuityConfig {
    /// Max characters the snapshot summarizer keeps from each message
    pub summary_excerpt_chars: i32,
    /// Max messages the snapshot summarizer includes, newest kept
    pub summary_max_messages: i32,
}

impl ContinuityConfig {
    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(ContinuityError::Config) if invalid.
    pub fn validate(&self) -> ContinuityResult<()> {
        if self.summary_excerpt_chars <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "summary_excerpt_chars".to_string(),
                value: self.summary_excerpt_chars.to_string(),
                reason: "summary_excerpt_chars must be greater than 0".to_string(),
            }
            .into());
        }
        if self.summary_max_messages <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "summary_max_messages".to_string(),
                value: self.summary_max_messages.to_string(),
                reason: "summary_max_messages must be greater than 0".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
