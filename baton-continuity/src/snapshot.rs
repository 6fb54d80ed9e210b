//! Context snapshot capture.
//!
//! A snapshot is a bounded, immutable view of the message log plus the tool
//! calls visible inside it. The summarization strategy is policy and
//! pluggable; the snapshot itself is self-describing: its range is explicit
//! and its digest is verifiable against the live log.

use baton_core::{
    ContextSnapshot, ContinuityConfig, ContinuityResult, ConversationId, Message, SequenceRange,
    SessionId, SnapshotType, VisibleToolCall, new_entity_id,
};
use baton_storage::{Clock, MessageRepository, SnapshotRepository};
use std::sync::Arc;

/// Estimate token count for text.
///
/// Uses a chars-to-tokens ratio suitable for English text and code.
/// More accurate than 1:4, less accurate than a real tokenizer.
pub fn estimate_tokens(text: &str) -> i32 {
    if text.is_empty() {
        return 0;
    }
    (text.len() as f32 * 0.75).ceil() as i32
}

/// Summarization policy over the messages a snapshot covers.
pub trait SummaryStrategy: Send + Sync {
    fn summarize(&self, messages: &[Message]) -> String;
}

/// Default strategy: keep the newest messages, one excerpted line each.
#[derive(Debug, Clone)]
pub struct TruncationSummarizer {
    excerpt_chars: usize,
    max_messages: usize,
}

impl TruncationSummarizer {
    pub fn from_config(config: &ContinuityConfig) -> Self {
        Self {
            excerpt_chars: config.summary_excerpt_chars as usize,
            max_messages: config.summary_max_messages as usize,
        }
    }
}

impl SummaryStrategy for TruncationSummarizer {
    fn summarize(&self, messages: &[Message]) -> String {
        let skip = messages.len().saturating_sub(self.max_messages);
        messages[skip..]
            .iter()
            .map(|message| {
                let text = message.text();
                let excerpt: String = text.chars().take(self.excerpt_chars).collect();
                format!("[{}] {}: {}", message.sequence_number, message.role, excerpt)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Captures context snapshots from the message log.
#[derive(Clone)]
pub struct SnapshotCapture {
    messages: Arc<dyn MessageRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    clock: Arc<dyn Clock>,
    strategy: Arc<dyn SummaryStrategy>,
}

impl SnapshotCapture {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
        clock: Arc<dyn Clock>,
        strategy: Arc<dyn SummaryStrategy>,
    ) -> Self {
        Self {
            messages,
            snapshots,
            clock,
            strategy,
        }
    }

    /// Compute a snapshot without persisting it. Used by multi-entity
    /// operations that must finish every validation before the first write.
    pub fn build(
        &self,
        conversation_id: ConversationId,
        session_id: SessionId,
        range: SequenceRange,
        snapshot_type: SnapshotType,
    ) -> ContinuityResult<ContextSnapshot> {
        let covered: Vec<Message> = self
            .messages
            .find_by_conversation(conversation_id)?
            .into_iter()
            .filter(|m| range.contains(m.sequence_number))
            .collect();

        let mut visible_tool_calls = Vec::new();
        for message in &covered {
            for audit in &message.metadata.tool_calls {
                visible_tool_calls.push(VisibleToolCall {
                    message_id: message.message_id,
                    sequence_number: message.sequence_number,
                    call_id: audit.call_id.clone(),
                    tool_name: audit.tool_name.clone(),
                    status: audit.status,
                });
            }
        }

        let full_text = covered
            .iter()
            .map(Message::text)
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ContextSnapshot {
            snapshot_id: new_entity_id(),
            conversation_id,
            session_id,
            sequence_start: range.start,
            sequence_end: range.end,
            message_summary: self.strategy.summarize(&covered),
            visible_tool_calls,
            token_estimate: Some(estimate_tokens(&full_text)),
            log_digest: ContextSnapshot::digest_of(&covered),
            captured_at: self.clock.now(),
            snapshot_type,
        })
    }

    /// Compute and persist a snapshot.
    pub fn capture(
        &self,
        conversation_id: ConversationId,
        session_id: SessionId,
        range: SequenceRange,
        snapshot_type: SnapshotType,
    ) -> ContinuityResult<ContextSnapshot> {
        let snapshot = self.build(conversation_id, session_id, range, snapshot_type)?;
        self.snapshots.save(&snapshot)?;
        tracing::debug!(
            snapshot_id = %snapshot.snapshot_id,
            conversation_id = %conversation_id,
            session_id = %session_id,
            sequence_start = snapshot.sequence_start,
            sequence_end = snapshot.sequence_end,
            snapshot_type = %snapshot.snapshot_type,
            "Context snapshot captured"
        );
        Ok(snapshot)
    }

    /// Persist an already-built snapshot.
    pub(crate) fn save(&self, snapshot: &ContextSnapshot) -> ContinuityResult<()> {
        self.snapshots.save(snapshot)
    }

    /// Recompute the digest over the live log. True when the snapshot still
    /// describes exactly the history it claims.
    pub fn verify(&self, snapshot: &ContextSnapshot) -> ContinuityResult<bool> {
        let range = SequenceRange {
            start: snapshot.sequence_start,
            end: snapshot.sequence_end,
        };
        let covered: Vec<Message> = self
            .messages
            .find_by_conversation(snapshot.conversation_id)?
            .into_iter()
            .filter(|m| range.contains(m.sequence_number))
            .collect();
        Ok(ContextSnapshot::digest_of(&covered) == snapshot.log_digest)
    }
}
