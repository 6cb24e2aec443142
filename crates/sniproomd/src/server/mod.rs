//! TCP server for the sniproom daemon.
//!
//! The server:
//! - Listens on a TCP socket for client connections
//! - Spawns a ConnectionHandler for each client
//! - Fans registry room events out to the members of the affected room
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   RoomServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryHandle │
//! │   (per client)  │     │                 │
//! └─────────────────┘     └─────────────────┘
//!         │
//!         │ room-scoped broadcast
//!         ▼
//! ┌─────────────────┐
//! │  Room members   │
//! │  (subscribers)  │
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Server errors are logged and allow continued operation

mod connection;

pub use connection::{
    ConnectionError, ConnectionHandler, Subscriber, SubscriberWriter, SubscribersMap,
};

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use sniproom_core::{ConnectionId, RoomId, Snippet};
use sniproom_protocol::{NoticeKind, ServerEvent};

use crate::registry::{RegistryHandle, RoomEvent};

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5000";

/// TCP server for the sniproom daemon.
///
/// Manages client connections and room-scoped event broadcasting.
pub struct RoomServer {
    /// Bound listener
    listener: TcpListener,

    /// Handle to the room registry
    registry: RegistryHandle,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Counter for assigning connection ids
    connection_counter: AtomicU64,

    /// Every live connection, keyed by connection id. Entries start
    /// roomless; the broadcaster assigns the room on join.
    subscribers: SubscribersMap,
}

impl RoomServer {
    /// Binds a new server to the given address.
    ///
    /// Binding up front lets callers pass port 0 and read the assigned
    /// address via `local_addr` before running.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if the address cannot be bound.
    pub async fn bind(
        addr: &str,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(|e| ServerError::Bind {
            addr: addr.to_string(),
            error: e.to_string(),
        })?;

        Ok(Self {
            listener,
            registry,
            cancel_token,
            connection_counter: AtomicU64::new(0),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if the local address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(|e| ServerError::Bind {
            addr: "local".to_string(),
            error: e.to_string(),
        })
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered.
    /// This method does not return until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        match self.local_addr() {
            Ok(addr) => info!(addr = %addr, "Room server listening"),
            Err(_) => info!("Room server listening"),
        }

        // Spawn event broadcaster
        self.spawn_event_broadcaster();

        // Accept connections until cancelled
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let n = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            debug!(peer = %peer, connection = n, "Accepted connection");
                            self.handle_connection(stream, ConnectionId::new(n));
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }
            }
        }

        // Cleanup
        self.subscribers.write().await.clear();
        info!("Server cleanup complete");
        Ok(())
    }

    /// Handles a new client connection by spawning a handler task.
    ///
    /// The connection is registered (roomless) before the handler starts
    /// reading, so a join issued on the very first line already has its
    /// writer on record when the broadcaster processes the join event.
    /// When the handler returns, the registration is removed and the
    /// registry is told to drop its presence, which publishes the leave
    /// notices.
    fn handle_connection(&self, stream: tokio::net::TcpStream, connection_id: ConnectionId) {
        let (reader, writer) = stream.into_split();
        let registry = self.registry.clone();
        let subscribers = Arc::clone(&self.subscribers);

        tokio::spawn(async move {
            let handler = ConnectionHandler::new(reader, writer, registry.clone(), connection_id);

            {
                let mut subs = subscribers.write().await;
                subs.insert(
                    connection_id,
                    Subscriber {
                        writer: handler.writer_handle(),
                        room: None,
                    },
                );
            }

            handler.run().await;

            // Deregister before the registry publishes the leave, so the
            // closed connection is not a broadcast target
            {
                let mut subs = subscribers.write().await;
                if subs.remove(&connection_id).is_some() {
                    debug!(connection = %connection_id, "Removed disconnected connection");
                }
            }

            registry.disconnect(connection_id).await;
        });
    }

    /// Spawns the event broadcaster task.
    ///
    /// Receives room events from the registry and delivers the wire
    /// translation to every member of the affected room.
    fn spawn_event_broadcaster(&self) {
        let mut event_rx = self.registry.subscribe();
        let subscribers = Arc::clone(&self.subscribers);
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Event broadcaster shutting down");
                        break;
                    }

                    result = event_rx.recv() => {
                        match result {
                            Ok(event) => {
                                broadcast_event(&subscribers, &event).await;
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Event broadcaster lagged, skipped events");
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                debug!("Event channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    /// Returns the number of connections currently joined to a room.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .await
            .values()
            .filter(|sub| sub.room.is_some())
            .count()
    }
}

/// Per-connection delivery plan for one room event.
type DeliveryPlan = Vec<(ConnectionId, SubscriberWriter, Vec<ServerEvent>)>;

/// Delivers a room event to the members of its room.
///
/// Joins take their own path because they change membership; everything
/// else is a uniform fan-out to the room.
async fn broadcast_event(subscribers: &SubscribersMap, event: &RoomEvent) {
    match event {
        RoomEvent::UserJoined {
            room_id,
            origin,
            username,
            users,
            snippets,
            timestamp,
        } => {
            deliver_join(
                subscribers,
                room_id,
                *origin,
                username,
                users,
                snippets,
                *timestamp,
            )
            .await;
        }
        other => deliver_room_fanout(subscribers, other).await,
    }
}

/// Delivers a join: installs the joiner and notifies the room.
///
/// Membership flips here, on the event stream. Events the registry
/// published before this join were fanned out before the flip and cannot
/// reach the joiner (its snapshot already reflects them); events published
/// after it are delivered after the snapshot. The joiner can therefore
/// neither miss nor double-receive a room event around its join.
async fn deliver_join(
    subscribers: &SubscribersMap,
    room_id: &RoomId,
    origin: ConnectionId,
    username: &str,
    users: &[String],
    snippets: &[Snippet],
    timestamp: DateTime<Utc>,
) {
    let mut plan: DeliveryPlan = Vec::new();

    {
        let mut subs = subscribers.write().await;

        // The joiner may already be gone (disconnected mid-join); the rest
        // of the room is still notified
        if let Some(joiner) = subs.get_mut(&origin) {
            joiner.room = Some(room_id.clone());
            plan.push((
                origin,
                Arc::clone(&joiner.writer),
                vec![
                    ServerEvent::load_snippets(snippets.to_vec()),
                    ServerEvent::room_users(users.to_vec()),
                ],
            ));
        }

        for (connection_id, sub) in subs.iter() {
            if *connection_id == origin || sub.room.as_ref() != Some(room_id) {
                continue;
            }
            plan.push((
                *connection_id,
                Arc::clone(&sub.writer),
                vec![
                    ServerEvent::room_users(users.to_vec()),
                    ServerEvent::system_message(NoticeKind::Join, username.to_string(), timestamp),
                ],
            ));
        }
    }

    deliver(subscribers, plan).await;
}

/// Delivers a non-join event to every member of its room.
async fn deliver_room_fanout(subscribers: &SubscribersMap, event: &RoomEvent) {
    let room_id = event.room_id().clone();

    // Wire translation, in delivery order
    let events: Vec<ServerEvent> = match event {
        // Handled by deliver_join
        RoomEvent::UserJoined { .. } => return,
        RoomEvent::UserLeft {
            username,
            users,
            timestamp,
            ..
        } => vec![
            ServerEvent::system_message(NoticeKind::Leave, username.clone(), *timestamp),
            ServerEvent::room_users(users.clone()),
        ],
        RoomEvent::SnippetAdded { snippet, .. } => {
            vec![ServerEvent::snippet_added(snippet.clone())]
        }
        RoomEvent::SnippetDeleted { snippet_id, .. } => {
            vec![ServerEvent::snippet_deleted(snippet_id.clone())]
        }
        RoomEvent::MessageAdded {
            snippet_id,
            message,
            ..
        } => {
            vec![ServerEvent::message_added(snippet_id.clone(), message.clone())]
        }
    };

    let mut plan: DeliveryPlan = Vec::new();
    {
        let subs = subscribers.read().await;
        for (connection_id, sub) in subs.iter() {
            if sub.room.as_ref() != Some(&room_id) {
                continue;
            }
            plan.push((*connection_id, Arc::clone(&sub.writer), events.clone()));
        }
    }

    deliver(subscribers, plan).await;
}

/// Writes a delivery plan out, evicting connections whose writes fail.
async fn deliver(subscribers: &SubscribersMap, plan: DeliveryPlan) {
    let mut failed: Vec<ConnectionId> = Vec::new();

    for (connection_id, writer, events) in plan {
        for wire_event in &events {
            if let Err(e) = connection::write_event(&writer, wire_event).await {
                debug!(
                    connection = %connection_id,
                    error = %e,
                    "Failed to deliver event to connection"
                );
                failed.push(connection_id);
                break;
            }
        }
    }

    if !failed.is_empty() {
        let mut subs = subscribers.write().await;
        for connection_id in failed {
            subs.remove(&connection_id);
            debug!(connection = %connection_id, "Removed failed connection");
        }
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}
