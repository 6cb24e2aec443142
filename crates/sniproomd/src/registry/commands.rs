//! Registry actor commands, errors, and room events.
//!
//! This module defines the message types for communicating with the
//! `RegistryActor`:
//! - `RegistryCommand`: commands sent to the actor
//! - `RegistryError`: rejections surfaced to the originating connection
//! - `RoomEvent`: events published by the registry for the broadcaster
//!
//! All types are designed for async message passing and follow the
//! panic-free policy.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::oneshot;

use sniproom_core::{ConnectionId, Message, RoomId, Snippet, SnippetId};

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Create and join use a oneshot channel for the caller-directed response.
/// In-room mutations are fire-and-forget: validation failures there degrade
/// silently by design, so there is nothing to respond with.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Create a room. First-writer-wins: a duplicate id is a silent no-op
    /// and still acknowledges, so creation is invisible-idempotent to the
    /// caller.
    CreateRoom {
        /// Room identifier (already validated non-empty by the router)
        room_id: RoomId,
        /// Optional plaintext password, hashed by the actor
        password: Option<String>,
        /// Time-to-live in milliseconds; `None` or zero means the default
        expires_in_ms: Option<i64>,
        /// Channel to acknowledge completion
        respond_to: oneshot::Sender<()>,
    },

    /// Join a room under a display username.
    ///
    /// The oneshot carries only the verdict. On success the joiner's
    /// snapshot (snippet list + user list) rides the published `UserJoined`
    /// event, so the broadcaster delivers it in stream order with the
    /// membership change.
    ///
    /// # Errors
    /// - `RegistryError::RoomNotFound` if no such room
    /// - `RegistryError::RoomExpired` if expired (the room is deleted first)
    /// - `RegistryError::InvalidPassword` if the password check fails
    /// - `RegistryError::UsernameRequired` if the username trims to empty
    Join {
        /// Room to join
        room_id: RoomId,
        /// Transport identity of the joining connection
        connection_id: ConnectionId,
        /// Display username (stored as supplied)
        username: String,
        /// Supplied password, if any
        password: Option<String>,
        /// Channel to send the verdict
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Add a snippet to a room. Silent no-op if the room is missing.
    AddSnippet {
        /// Target room
        room_id: RoomId,
        /// The snippet (message thread reset on add)
        snippet: Snippet,
    },

    /// Delete a snippet from a room. Silent no-op if room or snippet
    /// is missing.
    DeleteSnippet {
        /// Target room
        room_id: RoomId,
        /// Snippet to delete
        snippet_id: SnippetId,
    },

    /// Append a message to a snippet's thread. Silent no-op if the room or
    /// snippet is missing; the message is dropped with no feedback.
    AddMessage {
        /// Target room
        room_id: RoomId,
        /// Snippet owning the thread
        snippet_id: SnippetId,
        /// The message to append
        message: Message,
    },

    /// A transport connection closed. Removes its presence from every room
    /// it was registered in and publishes leave notices per affected room.
    Disconnect {
        /// Transport identity of the closed connection
        connection_id: ConnectionId,
    },

    /// Delete all rooms past their expiry instant.
    ///
    /// Fire-and-forget, sent by the sweep task. Deletion carries no
    /// notification to connected clients.
    SweepExpired,
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Rejections surfaced as error events to the originating connection.
///
/// The `Display` strings are the wire contract: they travel verbatim in
/// `join-error` / `room-created-error` payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The room id failed validation (empty string).
    #[error("Invalid room id")]
    InvalidRoomId,

    /// The requested room does not exist.
    #[error("Room does not exist")]
    RoomNotFound,

    /// The room was past its expiry instant (and has been deleted).
    #[error("Room expired")]
    RoomExpired,

    /// The room is protected and the supplied password did not match.
    #[error("Invalid room password")]
    InvalidPassword,

    /// The username was empty after trimming.
    #[error("Username required")]
    UsernameRequired,

    /// The command or response channel was closed before completion.
    ///
    /// This typically indicates the actor was shut down.
    #[error("registry channel closed")]
    ChannelClosed,
}

// ============================================================================
// Room Events
// ============================================================================

/// Events published by the registry for room-scoped fan-out.
///
/// The server's broadcaster task translates these into wire events and
/// delivers them to every connection currently associated with the room.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// A member joined.
    ///
    /// The broadcaster flips the origin connection's room membership while
    /// handling this event, delivers the carried snapshot to the joiner,
    /// and fans the roster plus the join notice out to everyone else in
    /// the room. Riding the snapshot on the event keeps it ordered with
    /// every other mutation the actor publishes.
    UserJoined {
        /// Room the member joined
        room_id: RoomId,
        /// The joining connection (receives the snapshot, not the notice)
        origin: ConnectionId,
        /// Display username of the joiner
        username: String,
        /// Member usernames after the join
        users: Vec<String>,
        /// Snippet list at the join instant, newest-first
        snippets: Vec<Snippet>,
        /// Join instant
        timestamp: DateTime<Utc>,
    },

    /// A member left (transport disconnect).
    UserLeft {
        /// Room the member left
        room_id: RoomId,
        /// Display username of the leaver
        username: String,
        /// Member usernames after the leave
        users: Vec<String>,
        /// Leave instant
        timestamp: DateTime<Utc>,
    },

    /// A snippet was added.
    SnippetAdded {
        /// Room the snippet was added to
        room_id: RoomId,
        /// The stored snippet (thread always empty)
        snippet: Snippet,
    },

    /// A snippet was deleted.
    SnippetDeleted {
        /// Room the snippet was deleted from
        room_id: RoomId,
        /// Id of the deleted snippet
        snippet_id: SnippetId,
    },

    /// A message was appended to a snippet thread.
    MessageAdded {
        /// Room owning the snippet
        room_id: RoomId,
        /// Snippet owning the thread
        snippet_id: SnippetId,
        /// The appended message
        message: Message,
    },
}

impl RoomEvent {
    /// Returns the room this event is scoped to.
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::UserJoined { room_id, .. }
            | Self::UserLeft { room_id, .. }
            | Self::SnippetAdded { room_id, .. }
            | Self::SnippetDeleted { room_id, .. }
            | Self::MessageAdded { room_id, .. } => room_id,
        }
    }
}
