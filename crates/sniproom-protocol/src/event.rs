//! Protocol event types for room communication.
//!
//! Events are internally tagged with an `event` field (not `type`, because
//! the `system-message` payload itself carries a literal `type: join|leave`
//! field). Payload field names are camelCase; these shapes are the wire
//! contract clients rely on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sniproom_core::{Message, RoomId, Snippet, SnippetId};

/// Events sent by clients to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Create a room. Does not join the caller; the creator joins
    /// separately like anyone else.
    #[serde(rename_all = "camelCase")]
    CreateRoom {
        /// Room identifier (client-chosen short string)
        room_id: RoomId,

        /// Optional room password (hashed server-side, never stored plain)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,

        /// Time-to-live in milliseconds; absent or zero means the
        /// server default (6 hours)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_in: Option<i64>,
    },

    /// Join a room under a display username.
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        /// Room to join
        room_id: RoomId,

        /// Display username (must be non-empty after trimming)
        username: String,

        /// Password for protected rooms
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },

    /// Add a snippet to a room. The server resets the snippet's message
    /// thread to empty regardless of the supplied value.
    #[serde(rename_all = "camelCase")]
    AddSnippet {
        /// Target room
        room_id: RoomId,

        /// The snippet to add
        snippet: Snippet,
    },

    /// Delete a snippet from a room. Idempotent.
    #[serde(rename_all = "camelCase")]
    DeleteSnippet {
        /// Target room
        room_id: RoomId,

        /// Snippet to delete
        snippet_id: SnippetId,
    },

    /// Append a message to a snippet's comment thread.
    #[serde(rename_all = "camelCase")]
    AddMessage {
        /// Target room
        room_id: RoomId,

        /// Snippet owning the thread
        snippet_id: SnippetId,

        /// The message to append
        message: Message,
    },
}

/// Join/leave notice kind for `system-message` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Join,
    Leave,
}

/// Events sent by the daemon to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Room creation acknowledged (also sent for a duplicate-id no-op;
    /// first-writer-wins is invisible to the caller)
    #[serde(rename_all = "camelCase")]
    RoomCreated {
        /// Id of the created room
        room_id: RoomId,
    },

    /// Room creation rejected (invalid room id)
    RoomCreatedError {
        /// Human-readable reason
        message: String,
    },

    /// Join rejected; sent to the caller only
    JoinError {
        /// Human-readable reason
        message: String,
    },

    /// Full current snippet list, sent to a joiner only
    LoadSnippets {
        /// Snippets, newest-first
        snippets: Vec<Snippet>,
    },

    /// Current member usernames of the caller's room
    RoomUsers {
        /// Usernames in join order
        users: Vec<String>,
    },

    /// Ephemeral join/leave announcement; never stored in room state
    SystemMessage {
        /// Notice kind
        #[serde(rename = "type")]
        kind: NoticeKind,

        /// Member who joined or left
        username: String,

        /// Notice instant, epoch milliseconds on the wire
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },

    /// A snippet was added to the caller's room
    SnippetAdded {
        /// The stored snippet (message thread always empty)
        snippet: Snippet,
    },

    /// A snippet was deleted from the caller's room
    #[serde(rename_all = "camelCase")]
    SnippetDeleted {
        /// Id of the deleted snippet
        snippet_id: SnippetId,
    },

    /// A message was appended to a snippet thread in the caller's room
    #[serde(rename_all = "camelCase")]
    MessageAdded {
        /// Snippet owning the thread
        snippet_id: SnippetId,

        /// The appended message
        message: Message,
    },
}

impl ServerEvent {
    /// Creates a room-created acknowledgement.
    pub fn room_created(room_id: RoomId) -> Self {
        Self::RoomCreated { room_id }
    }

    /// Creates a room-created-error response.
    pub fn room_created_error(message: &str) -> Self {
        Self::RoomCreatedError {
            message: message.to_string(),
        }
    }

    /// Creates a join-error response.
    pub fn join_error(message: &str) -> Self {
        Self::JoinError {
            message: message.to_string(),
        }
    }

    /// Creates a load-snippets response.
    pub fn load_snippets(snippets: Vec<Snippet>) -> Self {
        Self::LoadSnippets { snippets }
    }

    /// Creates a room-users broadcast.
    pub fn room_users(users: Vec<String>) -> Self {
        Self::RoomUsers { users }
    }

    /// Creates a join/leave system notice.
    pub fn system_message(kind: NoticeKind, username: String, timestamp: DateTime<Utc>) -> Self {
        Self::SystemMessage {
            kind,
            username,
            timestamp,
        }
    }

    /// Creates a snippet-added broadcast.
    pub fn snippet_added(snippet: Snippet) -> Self {
        Self::SnippetAdded { snippet }
    }

    /// Creates a snippet-deleted broadcast.
    pub fn snippet_deleted(snippet_id: SnippetId) -> Self {
        Self::SnippetDeleted { snippet_id }
    }

    /// Creates a message-added broadcast.
    pub fn message_added(snippet_id: SnippetId, message: Message) -> Self {
        Self::MessageAdded {
            snippet_id,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_room_wire_shape() {
        let json = r#"{"event":"create-room","roomId":"r1","password":"abc","expiresIn":3600000}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::CreateRoom {
                room_id,
                password,
                expires_in,
            } => {
                assert_eq!(room_id.as_str(), "r1");
                assert_eq!(password.as_deref(), Some("abc"));
                assert_eq!(expires_in, Some(3_600_000));
            }
            other => panic!("Expected CreateRoom, got {other:?}"),
        }
    }

    #[test]
    fn test_create_room_optional_fields() {
        let json = r#"{"event":"create-room","roomId":"r1"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(
            event,
            ClientEvent::CreateRoom {
                password: None,
                expires_in: None,
                ..
            }
        ));
    }

    #[test]
    fn test_join_room_wire_shape() {
        let json = r#"{"event":"join-room","roomId":"r1","username":"Ann"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::JoinRoom {
                room_id,
                username,
                password,
            } => {
                assert_eq!(room_id.as_str(), "r1");
                assert_eq!(username, "Ann");
                assert!(password.is_none());
            }
            other => panic!("Expected JoinRoom, got {other:?}"),
        }
    }

    #[test]
    fn test_add_message_uses_camel_case_keys() {
        let event = ClientEvent::AddMessage {
            room_id: RoomId::new("r1"),
            snippet_id: SnippetId::new("s1"),
            message: Message {
                id: "m1".to_string(),
                text: "hi".to_string(),
                author: "Ann".to_string(),
                timestamp: None,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "add-message");
        assert_eq!(json["roomId"], "r1");
        assert_eq!(json["snippetId"], "s1");
    }

    #[test]
    fn test_system_message_keeps_literal_type_field() {
        let event = ServerEvent::system_message(
            NoticeKind::Join,
            "Ann".to_string(),
            chrono::DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "system-message");
        assert_eq!(json["type"], "join");
        assert_eq!(json["username"], "Ann");
        assert_eq!(json["timestamp"], 1_700_000_000_000_i64);
    }

    #[test]
    fn test_server_event_tags_are_kebab_case() {
        let cases = [
            (
                ServerEvent::room_created(RoomId::new("r1")),
                "room-created",
            ),
            (
                ServerEvent::room_created_error("Invalid room id"),
                "room-created-error",
            ),
            (ServerEvent::join_error("Room expired"), "join-error"),
            (ServerEvent::load_snippets(Vec::new()), "load-snippets"),
            (ServerEvent::room_users(Vec::new()), "room-users"),
            (
                ServerEvent::snippet_deleted(SnippetId::new("s1")),
                "snippet-deleted",
            ),
        ];
        for (event, tag) in cases {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["event"], tag);
        }
    }

    #[test]
    fn test_server_event_roundtrip() {
        let original = ServerEvent::room_users(vec!["Ann".to_string(), "Bob".to_string()]);
        let json = serde_json::to_string(&original).unwrap();
        let parsed: ServerEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            ServerEvent::RoomUsers { users } => assert_eq!(users, vec!["Ann", "Bob"]),
            other => panic!("Expected RoomUsers, got {other:?}"),
        }
    }
}
