//! Connection handler for individual client connections.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Parses newline-delimited JSON events
//! - Routes room commands to the registry
//! - Writes pre-join replies (acknowledgements and errors) directly
//!
//! Room membership is not managed here: the broadcaster task flips a
//! connection into its room while handling the join event the registry
//! publishes, keeping membership ordered with every other room event.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use sniproom_core::{ConnectionId, RoomId};
use sniproom_protocol::{ClientEvent, ServerEvent};

use crate::registry::{RegistryError, RegistryHandle};

/// Type alias for subscriber writer handle
pub type SubscriberWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// A live connection known to the broadcaster.
///
/// Registered at accept time with no room; the broadcaster sets `room`
/// while handling the join event for this connection.
pub struct Subscriber {
    /// Writer for delivering events
    pub writer: SubscriberWriter,

    /// Room this connection is a member of, `None` until joined
    pub room: Option<RoomId>,
}

/// Type alias for the subscribers map
pub type SubscribersMap = Arc<RwLock<HashMap<ConnectionId, Subscriber>>>;

/// Maximum event size (1 MB)
const MAX_EVENT_SIZE: usize = 1_048_576;

/// Write timeout (10 seconds)
pub(crate) const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection handler for a single client.
///
/// Reads client events until EOF and routes them to the registry. The
/// writer is shared with the broadcaster task, which delivers room events
/// through it once the connection joins a room.
///
/// Connections sit idle between events by design, so there is no read
/// timeout; the loop ends on EOF or a transport error.
pub struct ConnectionHandler {
    /// Buffered reader for incoming events
    reader: BufReader<OwnedReadHalf>,

    /// Buffered writer for outgoing events (shared with the broadcaster)
    writer: SubscriberWriter,

    /// Handle to the room registry
    registry: RegistryHandle,

    /// Transport identity of this connection
    connection_id: ConnectionId,

    /// Room this connection has joined, if any
    joined: Option<RoomId>,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        registry: RegistryHandle,
        connection_id: ConnectionId,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: Arc::new(Mutex::new(BufWriter::new(writer))),
            registry,
            connection_id,
            joined: None,
        }
    }

    /// Returns a clone of the shared writer handle.
    ///
    /// The server registers this with the broadcaster before the handler
    /// starts reading, so a join can never outrun the registration.
    pub fn writer_handle(&self) -> SubscriberWriter {
        Arc::clone(&self.writer)
    }

    /// Runs the connection handler.
    ///
    /// Reads and processes events until the client disconnects. Returns
    /// when the connection closes; the caller performs subscriber and
    /// registry cleanup.
    pub async fn run(mut self) {
        debug!(connection = %self.connection_id, "New client connected");

        if let Err(e) = self.process_events().await {
            debug!(
                connection = %self.connection_id,
                error = %e,
                "Connection closed"
            );
        }

        info!(connection = %self.connection_id, "Client disconnected");
    }

    /// Main event processing loop.
    ///
    /// Reads newline-delimited JSON until EOF. Malformed frames are
    /// skipped, not fatal; a well-behaved client stays connected across
    /// another client's bad input regardless.
    async fn process_events(&mut self) -> Result<(), ConnectionError> {
        loop {
            let line = match self.read_line().await? {
                Some(line) => line,
                None => {
                    debug!(connection = %self.connection_id, "Client sent EOF");
                    return Ok(());
                }
            };

            let event: ClientEvent = match serde_json::from_str(&line) {
                Ok(event) => event,
                Err(e) => {
                    debug!(
                        connection = %self.connection_id,
                        error = %e,
                        "Skipping malformed event"
                    );
                    continue;
                }
            };

            self.handle_event(event).await?;
        }
    }

    /// Handles a single client event.
    async fn handle_event(&mut self, event: ClientEvent) -> Result<(), ConnectionError> {
        match event {
            ClientEvent::CreateRoom {
                room_id,
                password,
                expires_in,
            } => {
                self.handle_create_room(room_id, password, expires_in)
                    .await?;
            }

            ClientEvent::JoinRoom {
                room_id,
                username,
                password,
            } => {
                self.handle_join_room(room_id, username, password).await?;
            }

            ClientEvent::AddSnippet { room_id, snippet } => {
                self.registry.add_snippet(room_id, snippet).await;
            }

            ClientEvent::DeleteSnippet {
                room_id,
                snippet_id,
            } => {
                self.registry.delete_snippet(room_id, snippet_id).await;
            }

            ClientEvent::AddMessage {
                room_id,
                snippet_id,
                message,
            } => {
                self.registry.add_message(room_id, snippet_id, message).await;
            }
        }

        Ok(())
    }

    /// Handles a create-room request.
    ///
    /// An empty room id is the only rejection; everything else, including
    /// a duplicate id, acknowledges with `room-created`.
    async fn handle_create_room(
        &mut self,
        room_id: RoomId,
        password: Option<String>,
        expires_in: Option<i64>,
    ) -> Result<(), ConnectionError> {
        if room_id.as_str().is_empty() {
            self.send_event(&ServerEvent::room_created_error(
                &RegistryError::InvalidRoomId.to_string(),
            ))
            .await?;
            return Ok(());
        }

        match self.registry.create_room(room_id.clone(), password, expires_in).await {
            Ok(()) => {
                self.send_event(&ServerEvent::room_created(room_id)).await?;
            }
            Err(e) => {
                warn!(
                    connection = %self.connection_id,
                    error = %e,
                    "create-room failed"
                );
                self.send_event(&ServerEvent::room_created_error(&e.to_string()))
                    .await?;
            }
        }

        Ok(())
    }

    /// Handles a join-room request.
    ///
    /// A connection joins at most one room; a second join while joined is
    /// ignored. On success nothing is written here: the broadcaster
    /// delivers the initial snippet and user lists while handling the join
    /// event, in stream order with the membership change, so no room event
    /// can slip between the snapshot and the live stream.
    async fn handle_join_room(
        &mut self,
        room_id: RoomId,
        username: String,
        password: Option<String>,
    ) -> Result<(), ConnectionError> {
        if self.joined.is_some() {
            debug!(
                connection = %self.connection_id,
                room_id = %room_id,
                "join-room while already joined, ignoring"
            );
            return Ok(());
        }

        match self
            .registry
            .join(room_id.clone(), self.connection_id, username, password)
            .await
        {
            Ok(()) => {
                self.joined = Some(room_id);
            }
            Err(e) => {
                self.send_event(&ServerEvent::join_error(&e.to_string()))
                    .await?;
            }
        }

        Ok(())
    }

    /// Reads a single line from the client. Returns `None` on EOF.
    ///
    /// The read is capped at the event size limit, so a stream that never
    /// sends a newline fails here instead of buffering without bound.
    async fn read_line(&mut self) -> Result<Option<String>, ConnectionError> {
        let mut buf = Vec::new();

        let bytes_read = (&mut self.reader)
            .take(MAX_EVENT_SIZE as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if bytes_read == 0 {
            return Ok(None);
        }

        if buf.len() > MAX_EVENT_SIZE {
            return Err(ConnectionError::EventTooLarge {
                size: buf.len(),
                max: MAX_EVENT_SIZE,
            });
        }

        let line = String::from_utf8(buf).map_err(|e| ConnectionError::Io(e.to_string()))?;
        Ok(Some(line))
    }

    /// Sends an event to this client.
    async fn send_event(&self, event: &ServerEvent) -> Result<(), ConnectionError> {
        write_event(&self.writer, event).await
    }

    /// Returns this connection's transport identity.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }
}

/// Serializes and writes an event to a subscriber writer.
///
/// Shared by the per-connection handler and the broadcaster task.
pub async fn write_event(
    writer: &SubscriberWriter,
    event: &ServerEvent,
) -> Result<(), ConnectionError> {
    let json =
        serde_json::to_string(event).map_err(|e| ConnectionError::Serialize(e.to_string()))?;

    let mut writer = writer.lock().await;

    match timeout(WRITE_TIMEOUT, async {
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Event too large: {size} bytes (max: {max})")]
    EventTooLarge { size: usize, max: usize },
}
