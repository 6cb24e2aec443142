//! sniproom protocol - Wire events for client-server communication
//!
//! This crate defines the bidirectional named events exchanged between
//! clients and the room daemon, framed as newline-delimited JSON.

pub mod event;

pub use event::{ClientEvent, NoticeKind, ServerEvent};
