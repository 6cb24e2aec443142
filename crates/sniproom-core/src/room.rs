//! Room domain entity: presence tracking, snippet store, expiry.
//!
//! A `Room` owns all of its state by value. Nothing outside the registry
//! holds a live reference to room internals; presence and snippets reference
//! their room only by the id they were addressed with.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::password::{hash_password, verify_password};
use crate::snippet::{Message, Snippet, SnippetId};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Unique identifier for a room.
///
/// Client-chosen short string. Validated as non-empty by the protocol
/// router, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Creates a new RoomId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque transport-assigned connection identity.
///
/// Assigned by the server's accept loop; never exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a ConnectionId from the server's connection counter.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================================================
// Presence
// ============================================================================

/// A connection's registered membership in a room.
///
/// Deliberately not `Serialize`: the presence list exposed to clients
/// contains usernames only, never connection identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    /// Transport identity of the member
    pub connection_id: ConnectionId,

    /// Display username chosen at join
    pub username: String,
}

// ============================================================================
// Room
// ============================================================================

/// The top-level shared namespace: snippets, presence, and expiry.
///
/// # Invariants
///
/// - At most one `Presence` per connection id.
/// - At most one `Presence` per username (best-effort: a colliding join is a
///   silent no-op here, and the caller proceeds as though it succeeded).
/// - `snippets` is newest-first; each snippet's thread is oldest-first.
#[derive(Debug, Clone)]
pub struct Room {
    /// Room identifier
    pub id: RoomId,

    /// One-way digest of the room password; `None` = unprotected
    pub password_hash: Option<String>,

    /// Absolute expiry instant; the room is expired once `now > expires_at`
    pub expires_at: DateTime<Utc>,

    /// Snippets, newest-first
    snippets: VecDeque<Snippet>,

    /// Connected members, insertion order
    users: Vec<Presence>,
}

impl Room {
    /// Creates a room expiring `ttl_ms` milliseconds from now.
    ///
    /// The password is hashed at creation; the plaintext is not retained.
    pub fn new(id: RoomId, password: Option<&str>, ttl_ms: i64) -> Self {
        Self {
            id,
            password_hash: password.map(hash_password),
            expires_at: Utc::now() + Duration::milliseconds(ttl_ms),
            snippets: VecDeque::new(),
            users: Vec::new(),
        }
    }

    /// Returns true once the room is past its expiry instant.
    ///
    /// Evaluated against the supplied `now`, never cached.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Verifies a supplied password against this room's digest.
    pub fn verify_password(&self, supplied: Option<&str>) -> bool {
        verify_password(self.password_hash.as_deref(), supplied)
    }

    // ------------------------------------------------------------------------
    // Presence
    // ------------------------------------------------------------------------

    /// Registers a member, replacing any prior entry for the same connection.
    ///
    /// Removing the old connection entry first handles a reconnect under the
    /// same transport identity. If another member already holds `username`,
    /// the call is a silent no-op and returns false; the join flow still
    /// reports success to the caller.
    pub fn add_user(&mut self, connection_id: ConnectionId, username: &str) -> bool {
        self.users.retain(|u| u.connection_id != connection_id);

        if self.users.iter().any(|u| u.username == username) {
            return false;
        }

        self.users.push(Presence {
            connection_id,
            username: username.to_string(),
        });
        true
    }

    /// Removes and returns the member with this connection id, if present.
    pub fn remove_user(&mut self, connection_id: ConnectionId) -> Option<Presence> {
        let index = self
            .users
            .iter()
            .position(|u| u.connection_id == connection_id)?;
        Some(self.users.remove(index))
    }

    /// Returns the member usernames in insertion order.
    ///
    /// Usernames only; connection ids never leave the core.
    pub fn usernames(&self) -> Vec<String> {
        self.users.iter().map(|u| u.username.clone()).collect()
    }

    /// Number of connected members.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    // ------------------------------------------------------------------------
    // Snippets
    // ------------------------------------------------------------------------

    /// Adds a snippet at the front (newest-first is the client contract).
    ///
    /// The incoming message thread is discarded: a freshly added snippet
    /// always starts with an empty thread, whatever the caller supplied.
    /// Returns a clone of the stored snippet for broadcasting.
    pub fn add_snippet(&mut self, mut snippet: Snippet) -> Snippet {
        snippet.messages = Vec::new();
        self.snippets.push_front(snippet.clone());
        snippet
    }

    /// Removes a snippet by id. No error if absent.
    pub fn remove_snippet(&mut self, snippet_id: &SnippetId) {
        self.snippets.retain(|s| &s.id != snippet_id);
    }

    /// Appends a message to a snippet's thread.
    ///
    /// Returns false if the snippet does not exist; the message is dropped
    /// and no feedback reaches the sender.
    pub fn append_message(&mut self, snippet_id: &SnippetId, message: Message) -> bool {
        match self.snippets.iter_mut().find(|s| &s.id == snippet_id) {
            Some(snippet) => {
                snippet.messages.push(message);
                true
            }
            None => false,
        }
    }

    /// Returns the current snippet list, newest-first.
    pub fn snippets(&self) -> Vec<Snippet> {
        self.snippets.iter().cloned().collect()
    }
}
