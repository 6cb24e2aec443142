//! Handle for communicating with the registry actor.
//!
//! `RegistryHandle` is the public interface to the registry. It's cheap to
//! clone and can be shared across tasks. All methods are async and
//! panic-free.

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use sniproom_core::{ConnectionId, Message, RoomId, Snippet, SnippetId};

use super::commands::{RegistryCommand, RegistryError, RoomEvent};

/// Handle for sending commands to the registry actor.
///
/// Cloning is cheap (two channel sender clones). All connection tasks and
/// the sweep task hold one.
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender
    sender: mpsc::Sender<RegistryCommand>,

    /// Event sender, kept so subscribers can be created from the handle
    event_sender: broadcast::Sender<RoomEvent>,
}

impl RegistryHandle {
    /// Creates a new handle.
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<RoomEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Creates a room and waits for the acknowledge.
    ///
    /// Always succeeds for a non-empty id: a duplicate id is a silent
    /// no-op on the actor side and still acknowledges.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::ChannelClosed` if the actor is unavailable.
    pub async fn create_room(
        &self,
        room_id: RoomId,
        password: Option<String>,
        expires_in_ms: Option<i64>,
    ) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::CreateRoom {
                room_id,
                password,
                expires_in_ms,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Joins a room and waits for the verdict.
    ///
    /// On success the joiner's initial snippet list and user list ride the
    /// `UserJoined` event the registry publishes, so the broadcaster can
    /// deliver them in stream order with the membership change.
    ///
    /// # Errors
    ///
    /// Returns the registry's rejection, or `ChannelClosed` if the actor
    /// is unavailable.
    pub async fn join(
        &self,
        room_id: RoomId,
        connection_id: ConnectionId,
        username: String,
        password: Option<String>,
    ) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Join {
                room_id,
                connection_id,
                username,
                password,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Adds a snippet to a room. Fire-and-forget.
    pub async fn add_snippet(&self, room_id: RoomId, snippet: Snippet) {
        let result = self
            .sender
            .send(RegistryCommand::AddSnippet { room_id, snippet })
            .await;
        if result.is_err() {
            debug!("Registry unavailable, add-snippet dropped");
        }
    }

    /// Deletes a snippet from a room. Fire-and-forget.
    pub async fn delete_snippet(&self, room_id: RoomId, snippet_id: SnippetId) {
        let result = self
            .sender
            .send(RegistryCommand::DeleteSnippet {
                room_id,
                snippet_id,
            })
            .await;
        if result.is_err() {
            debug!("Registry unavailable, delete-snippet dropped");
        }
    }

    /// Appends a message to a snippet thread. Fire-and-forget.
    pub async fn add_message(&self, room_id: RoomId, snippet_id: SnippetId, message: Message) {
        let result = self
            .sender
            .send(RegistryCommand::AddMessage {
                room_id,
                snippet_id,
                message,
            })
            .await;
        if result.is_err() {
            debug!("Registry unavailable, add-message dropped");
        }
    }

    /// Reports a transport disconnect. Fire-and-forget.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let result = self
            .sender
            .send(RegistryCommand::Disconnect { connection_id })
            .await;
        if result.is_err() {
            debug!("Registry unavailable, disconnect dropped");
        }
    }

    /// Triggers an expiry sweep. Fire-and-forget, used by the sweep task.
    pub async fn sweep_expired(&self) {
        let result = self.sender.send(RegistryCommand::SweepExpired).await;
        if result.is_err() {
            debug!("Registry unavailable, sweep dropped");
        }
    }

    /// Subscribes to the registry's room event stream.
    ///
    /// Each subscriber receives every event from the point of subscription;
    /// room-scoped filtering happens at the broadcaster.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.event_sender.subscribe()
    }

    /// Returns true if the actor is still receiving commands.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::spawn_registry;

    #[tokio::test]
    async fn test_create_and_join_through_handle() {
        let handle = spawn_registry();

        handle
            .create_room(RoomId::new("r1"), Some("abc".to_string()), Some(60_000))
            .await
            .unwrap();

        let mut events = handle.subscribe();
        handle
            .join(
                RoomId::new("r1"),
                ConnectionId::new(1),
                "Ann".to_string(),
                Some("abc".to_string()),
            )
            .await
            .unwrap();

        // The joiner's initial state rides the published event
        match events.recv().await.unwrap() {
            RoomEvent::UserJoined {
                users, snippets, ..
            } => {
                assert_eq!(users, vec!["Ann"]);
                assert!(snippets.is_empty());
            }
            other => panic!("Expected UserJoined, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_rejection_surfaces_through_handle() {
        let handle = spawn_registry();

        let result = handle
            .join(
                RoomId::new("ghost"),
                ConnectionId::new(1),
                "Ann".to_string(),
                None,
            )
            .await;

        assert_eq!(result.unwrap_err(), RegistryError::RoomNotFound);
    }

    #[tokio::test]
    async fn test_subscriber_sees_snippet_events() {
        let handle = spawn_registry();
        handle
            .create_room(RoomId::new("r1"), None, Some(60_000))
            .await
            .unwrap();

        let mut events = handle.subscribe();

        let snippet = Snippet {
            id: SnippetId::new("s1"),
            title: "t".to_string(),
            language: "JS".to_string(),
            code: "x".to_string(),
            author: "Ann".to_string(),
            created_at: None,
            messages: Vec::new(),
        };
        handle.add_snippet(RoomId::new("r1"), snippet).await;

        match events.recv().await.unwrap() {
            RoomEvent::SnippetAdded { room_id, snippet } => {
                assert_eq!(room_id.as_str(), "r1");
                assert_eq!(snippet.id.as_str(), "s1");
            }
            other => panic!("Expected SnippetAdded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_is_connected() {
        let handle = spawn_registry();
        assert!(handle.is_connected());
    }
}
