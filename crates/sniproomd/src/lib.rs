//! sniproom daemon - Room registry and broadcast server
//!
//! This crate provides the core infrastructure for the sniproom daemon:
//! - `registry` - Room registry actor owning all room/presence/snippet state,
//!   plus the periodic expiry sweep
//! - `server` - TCP server routing protocol events and broadcasting room
//!   events to connected clients
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     sniproomd daemon                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │   RoomServer    │────▶│      RegistryActor          │    │
//! │  │  (TCP listener) │     │   (room state owner)        │    │
//! │  └────────┬────────┘     └──────────────┬──────────────┘    │
//! │           │                             │                   │
//! │           │ connections                 │ room events       │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │ConnectionHandler│     │    broadcast::Sender        │    │
//! │  │  (per client)   │     │  (room-scoped fan-out)      │    │
//! │  └─────────────────┘     └─────────────────────────────┘    │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod registry;
pub mod server;
