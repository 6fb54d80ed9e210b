//! Append-only message log.
//!
//! The ordering backbone everything else references. Metadata is validated
//! before any write; sequence numbers are supplied by the caller (monotonic
//! assignment belongs to the turn-execution layer, outside this core).

use baton_core::{
    ContentPart, ContinuityResult, ConversationId, Message, MessageId, MessageMetadata,
    MessageRole, SequenceNumber, SequenceRange, TurnId, ValidationError, new_entity_id,
};
use baton_storage::{Clock, MessageRepository};
use std::sync::Arc;

/// Request to append one message to a conversation's log.
#[derive(Debug, Clone)]
pub struct AppendMessage {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub role: MessageRole,
    pub content: Vec<ContentPart>,
    pub sequence_number: SequenceNumber,
    pub metadata: MessageMetadata,
}

impl AppendMessage {
    /// Create a request with a fresh message id and empty metadata.
    pub fn new(
        conversation_id: ConversationId,
        role: MessageRole,
        content: Vec<ContentPart>,
        sequence_number: SequenceNumber,
    ) -> Self {
        Self {
            message_id: new_entity_id(),
            conversation_id,
            role,
            content,
            sequence_number,
            metadata: MessageMetadata::default(),
        }
    }

    /// Use a caller-chosen message id.
    pub fn with_message_id(mut self, message_id: MessageId) -> Self {
        self.message_id = message_id;
        self
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The per-conversation append-only message log.
#[derive(Clone)]
pub struct MessageLog {
    messages: Arc<dyn MessageRepository>,
    clock: Arc<dyn Clock>,
}

impl MessageLog {
    pub fn new(messages: Arc<dyn MessageRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { messages, clock }
    }

    /// Validate and durably append one message.
    ///
    /// Fails with `MissingCallId` / `InvalidMetadata` / `EmptyContent`
    /// before any write, or `DuplicateMessageId` / `DuplicateSequence` from
    /// the store. Never reorders or mutates existing entries.
    pub fn append(&self, request: AppendMessage) -> ContinuityResult<Message> {
        request.metadata.validate()?;
        if request.content.is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }

        let message = Message {
            message_id: request.message_id,
            conversation_id: request.conversation_id,
            role: request.role,
            content: request.content,
            sequence_number: request.sequence_number,
            metadata: request.metadata,
            created_at: self.clock.now(),
        };
        self.messages.append(&message)?;
        tracing::debug!(
            message_id = %message.message_id,
            conversation_id = %message.conversation_id,
            sequence = message.sequence_number,
            role = %message.role,
            "Message appended"
        );
        Ok(message)
    }

    /// All messages of a conversation in ascending sequence order.
    pub fn list(&self, conversation_id: ConversationId) -> ContinuityResult<Vec<Message>> {
        self.messages.find_by_conversation(conversation_id)
    }

    /// Messages whose sequence falls inside the inclusive range.
    pub fn list_range(
        &self,
        conversation_id: ConversationId,
        range: SequenceRange,
    ) -> ContinuityResult<Vec<Message>> {
        Ok(self
            .list(conversation_id)?
            .into_iter()
            .filter(|m| range.contains(m.sequence_number))
            .collect())
    }

    /// Highest sequence number appended so far, if any.
    pub fn latest_sequence(
        &self,
        conversation_id: ConversationId,
    ) -> ContinuityResult<Option<SequenceNumber>> {
        Ok(self
            .list(conversation_id)?
            .last()
            .map(|m| m.sequence_number))
    }

    /// Where a turn occurs in the log. Turn ids are message ids in this
    /// core; `None` when the turn never produced a stored message.
    pub fn sequence_of_turn(
        &self,
        conversation_id: ConversationId,
        turn_id: TurnId,
    ) -> ContinuityResult<Option<SequenceNumber>> {
        Ok(self
            .list(conversation_id)?
            .iter()
            .find(|m| m.message_id == turn_id)
            .map(|m| m.sequence_number))
    }
}
