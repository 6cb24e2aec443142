//! Snippet and message value records.
//!
//! Both types are plain data carried on the wire as-is: clients author them,
//! the server stores them per room and rebroadcasts them. Field names on the
//! wire are camelCase to match the protocol payload shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a snippet.
///
/// Client-assigned; unique within a room (process-wide uniqueness is
/// recommended but not enforced).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnippetId(String);

impl SnippetId {
    /// Creates a new SnippetId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnippetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A titled code block with a nested, append-only comment thread.
///
/// Immutable after creation except for its `messages` thread. The server
/// resets `messages` to empty on add regardless of what the caller supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    /// Snippet identifier (client-assigned)
    pub id: SnippetId,

    /// Display title
    pub title: String,

    /// Language tag (free-form, e.g. "JS", "rust")
    pub language: String,

    /// The code body
    pub code: String,

    /// Author username (unauthenticated display string)
    pub author: String,

    /// Creation timestamp, epoch milliseconds on the wire
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,

    /// Comment thread, oldest-first
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// A single comment in a snippet's thread. Append-only; never edited
/// or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message identifier (client-assigned)
    pub id: String,

    /// Message text
    pub text: String,

    /// Author username
    pub author: String,

    /// Send timestamp, epoch milliseconds on the wire
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}
