//! Identity types for BATON entities

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Per-conversation message position, starting at 1.
pub type SequenceNumber = i64;

/// SHA-256 digest for snapshot-to-log verification.
pub type ContentHash = [u8; 32];

pub type ConversationId = EntityId;
pub type MessageId = EntityId;
pub type SessionId = EntityId;
pub type HandoffId = EntityId;
pub type SnapshotId = EntityId;

/// Identifier of one unit of agent work. Turn execution is external to this
/// core; turn ids are resolved against message ids when ordering matters.
pub type TurnId = EntityId;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entity_id_is_v7() {
        let id = new_entity_id();
        assert_eq!(id.get_version_num(), 7);
    }

    #[test]
    fn test_entity_ids_are_sortable() {
        let id1 = new_entity_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = new_entity_id();
        // UUIDv7 should be lexicographically sortable by time
        assert!(id1.to_string() < id2.to_string());
    }

    #[test]
    fn test_content_hash_deterministic() {
        let content = b"turn 7 complete";
        let hash = compute_content_hash(content);
        assert_eq!(hash.len(), 32);
        assert_eq!(hash, compute_content_hash(content));
        assert_ne!(hash, compute_content_hash(b"turn 8 complete"));
    }
}
