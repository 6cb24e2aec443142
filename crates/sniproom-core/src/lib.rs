//! sniproom core - Shared domain types for ephemeral snippet rooms
//!
//! This crate provides the room/presence/snippet state model shared between
//! the daemon (sniproomd) and any client tooling.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod password;
pub mod room;
pub mod snippet;

// Re-exports for convenience
pub use password::{hash_password, verify_password};
pub use room::{ConnectionId, Presence, Room, RoomId};
pub use snippet::{Message, Snippet, SnippetId};
