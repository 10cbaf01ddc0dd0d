//! Tag schema for dynamically created chat-room queues
//!
//! The chat server creates one SQS queue per chat room at runtime, named
//! after the room and tagged so that teardown tooling can tell them apart
//! from unrelated queues that happen to share the prefix.
//!
//! ## Tag Schema
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `ManagedBy` | Static owner marker (`WebSocketChatSystem`) |

use std::collections::HashMap;

/// Tag key marking a queue as owned by the chat system
pub const TAG_MANAGED_BY: &str = "ManagedBy";

/// Tag value for queues created by the chat system
pub const MANAGED_BY_VALUE: &str = "WebSocketChatSystem";

/// Name prefix for per-room queues
pub const QUEUE_NAME_PREFIX: &str = "chat-room-";

/// Check whether a queue's tags mark it as chat-system owned
pub fn is_managed(tags: &HashMap<String, String>) -> bool {
    tags.get(TAG_MANAGED_BY).map(String::as_str) == Some(MANAGED_BY_VALUE)
}

/// Queue name for a chat room
pub fn room_queue_name(room_id: &str) -> String {
    format!("{QUEUE_NAME_PREFIX}{room_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn managed_queue_is_recognized() {
        let tags = HashMap::from([(TAG_MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string())]);
        assert!(is_managed(&tags));
    }

    #[test]
    fn foreign_queue_is_not_managed() {
        assert!(!is_managed(&HashMap::new()));

        let tags = HashMap::from([(TAG_MANAGED_BY.to_string(), "SomeOtherTeam".to_string())]);
        assert!(!is_managed(&tags));
    }

    #[test]
    fn room_queue_names_carry_prefix() {
        assert_eq!(room_queue_name("lobby"), "chat-room-lobby");
        assert!(room_queue_name("x").starts_with(QUEUE_NAME_PREFIX));
    }
}
