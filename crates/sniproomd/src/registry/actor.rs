//! Registry actor - owns all room state and processes commands.
//!
//! The RegistryActor is the single owner of room state in the system. It
//! receives commands via an mpsc channel, processes each to completion
//! before the next, and publishes room events via broadcast. Because
//! commands never interleave, every validate-then-mutate-then-publish
//! sequence is atomic without per-room locking.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are logged but don't panic

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use sniproom_core::{ConnectionId, Message, Room, RoomId, Snippet, SnippetId};

use super::commands::{RegistryCommand, RegistryError, RoomEvent};

/// Room time-to-live applied when `expiresIn` is absent or zero: 6 hours.
pub const DEFAULT_ROOM_TTL_MS: i64 = 6 * 60 * 60 * 1000;

/// The registry actor - owns all room state.
///
/// Implements the actor pattern: receives commands via mpsc channel,
/// processes them sequentially, and publishes room events to the
/// broadcaster.
///
/// # Ownership
///
/// The actor exclusively owns the room table and, transitively, every
/// snippet, message, and presence entry. Nothing outside holds a live
/// reference to room internals; results cross the boundary as owned
/// clones.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// All rooms, keyed by room id
    rooms: HashMap<RoomId, Room>,

    /// Event publisher for room-scoped fan-out
    event_publisher: broadcast::Sender<RoomEvent>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving commands
    /// * `event_publisher` - Broadcast channel for publishing room events
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<RoomEvent>,
    ) -> Self {
        Self {
            receiver,
            rooms: HashMap::new(),
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    /// This is the main entry point - call this in a spawned task.
    pub async fn run(mut self) {
        info!("Room registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("Room registry actor stopped (rooms: {})", self.rooms.len());
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::CreateRoom {
                room_id,
                password,
                expires_in_ms,
                respond_to,
            } => {
                self.handle_create_room(room_id, password.as_deref(), expires_in_ms);
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(());
            }
            RegistryCommand::Join {
                room_id,
                connection_id,
                username,
                password,
                respond_to,
            } => {
                let result = self.handle_join(room_id, connection_id, &username, password.as_deref());
                let _ = respond_to.send(result);
            }
            RegistryCommand::AddSnippet { room_id, snippet } => {
                self.handle_add_snippet(room_id, snippet);
            }
            RegistryCommand::DeleteSnippet {
                room_id,
                snippet_id,
            } => {
                self.handle_delete_snippet(room_id, snippet_id);
            }
            RegistryCommand::AddMessage {
                room_id,
                snippet_id,
                message,
            } => {
                self.handle_add_message(room_id, snippet_id, message);
            }
            RegistryCommand::Disconnect { connection_id } => {
                self.handle_disconnect(connection_id);
            }
            RegistryCommand::SweepExpired => {
                self.handle_sweep_expired();
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Handles room creation.
    ///
    /// First-writer-wins: an existing id is left untouched. The acknowledge
    /// is sent by the dispatcher either way, so duplicate creation is
    /// invisible to the caller.
    fn handle_create_room(
        &mut self,
        room_id: RoomId,
        password: Option<&str>,
        expires_in_ms: Option<i64>,
    ) {
        if self.rooms.contains_key(&room_id) {
            debug!(room_id = %room_id, "Room already exists, leaving untouched");
            return;
        }

        // Absent or zero TTL falls back to the default; negative values are
        // kept as supplied and yield an already-expired room.
        let ttl_ms = match expires_in_ms {
            Some(ms) if ms != 0 => ms,
            _ => DEFAULT_ROOM_TTL_MS,
        };

        let room = Room::new(room_id.clone(), password, ttl_ms);
        let protected = room.password_hash.is_some();
        let expires_at = room.expires_at;
        self.rooms.insert(room_id.clone(), room);

        info!(
            room_id = %room_id,
            protected = protected,
            expires_at = %expires_at,
            total_rooms = self.rooms.len(),
            "Room created"
        );
    }

    /// Handles a join request.
    ///
    /// Validation order, first failure wins: room exists, not expired
    /// (expired rooms are deleted before rejecting), password, non-empty
    /// username. Trimming applies only to the emptiness check; the name is
    /// registered exactly as supplied. On success the joiner's presence is
    /// registered (a colliding username is silently skipped while the flow
    /// still looks successful) and a `UserJoined` event carrying the room
    /// snapshot is published for the broadcaster.
    fn handle_join(
        &mut self,
        room_id: RoomId,
        connection_id: ConnectionId,
        username: &str,
        password: Option<&str>,
    ) -> Result<(), RegistryError> {
        let room = match self.rooms.get(&room_id) {
            Some(room) => room,
            None => return Err(RegistryError::RoomNotFound),
        };

        if room.is_expired(Utc::now()) {
            self.rooms.remove(&room_id);
            info!(room_id = %room_id, "Expired room deleted on join attempt");
            return Err(RegistryError::RoomExpired);
        }

        if !room.verify_password(password) {
            debug!(room_id = %room_id, "Join rejected: invalid password");
            return Err(RegistryError::InvalidPassword);
        }

        if username.trim().is_empty() {
            return Err(RegistryError::UsernameRequired);
        }

        // Checks passed; re-borrow mutably to register presence.
        let room = match self.rooms.get_mut(&room_id) {
            Some(room) => room,
            None => return Err(RegistryError::RoomNotFound),
        };

        let registered = room.add_user(connection_id, username);
        if !registered {
            debug!(
                room_id = %room_id,
                username = username,
                "Duplicate username, presence not registered"
            );
        }

        let users = room.usernames();
        let snippets = room.snippets();

        info!(
            room_id = %room_id,
            connection = %connection_id,
            username = username,
            members = users.len(),
            "User joined room"
        );

        // The snapshot rides the event so the broadcaster can install the
        // joiner and deliver it in stream order with later mutations.
        // Ignore send errors (no subscribers yet).
        let _ = self.event_publisher.send(RoomEvent::UserJoined {
            room_id,
            origin: connection_id,
            username: username.to_string(),
            users,
            snippets,
            timestamp: Utc::now(),
        });

        Ok(())
    }

    /// Handles adding a snippet. Missing room is a silent no-op.
    fn handle_add_snippet(&mut self, room_id: RoomId, snippet: Snippet) {
        let room = match self.rooms.get_mut(&room_id) {
            Some(room) => room,
            None => {
                debug!(room_id = %room_id, "add-snippet for unknown room, ignoring");
                return;
            }
        };

        let stored = room.add_snippet(snippet);

        debug!(
            room_id = %room_id,
            snippet_id = %stored.id,
            author = %stored.author,
            "Snippet added"
        );

        let _ = self.event_publisher.send(RoomEvent::SnippetAdded {
            room_id,
            snippet: stored,
        });
    }

    /// Handles deleting a snippet. Missing room or snippet is a silent
    /// no-op, but the broadcast goes out whenever the room exists (delete
    /// is idempotent and the confirmation is what clients act on).
    fn handle_delete_snippet(&mut self, room_id: RoomId, snippet_id: SnippetId) {
        let room = match self.rooms.get_mut(&room_id) {
            Some(room) => room,
            None => {
                debug!(room_id = %room_id, "delete-snippet for unknown room, ignoring");
                return;
            }
        };

        room.remove_snippet(&snippet_id);

        debug!(room_id = %room_id, snippet_id = %snippet_id, "Snippet deleted");

        let _ = self.event_publisher.send(RoomEvent::SnippetDeleted {
            room_id,
            snippet_id,
        });
    }

    /// Handles appending a message to a snippet thread.
    ///
    /// A missing room or snippet drops the message silently - no error
    /// event exists for this path and no broadcast is published.
    fn handle_add_message(&mut self, room_id: RoomId, snippet_id: SnippetId, message: Message) {
        let room = match self.rooms.get_mut(&room_id) {
            Some(room) => room,
            None => {
                debug!(room_id = %room_id, "add-message for unknown room, ignoring");
                return;
            }
        };

        if !room.append_message(&snippet_id, message.clone()) {
            debug!(
                room_id = %room_id,
                snippet_id = %snippet_id,
                "add-message for unknown snippet, dropping"
            );
            return;
        }

        let _ = self.event_publisher.send(RoomEvent::MessageAdded {
            room_id,
            snippet_id,
            message,
        });
    }

    /// Handles a transport disconnect.
    ///
    /// Scans every room for a presence under this connection id - O(rooms),
    /// acceptable at the scale implied by ephemeral rooms - and publishes a
    /// leave notice plus updated user list per affected room.
    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        let now = Utc::now();

        for (room_id, room) in self.rooms.iter_mut() {
            let removed = match room.remove_user(connection_id) {
                Some(presence) => presence,
                None => continue,
            };

            info!(
                room_id = %room_id,
                connection = %connection_id,
                username = %removed.username,
                remaining = room.user_count(),
                "User left room"
            );

            let _ = self.event_publisher.send(RoomEvent::UserLeft {
                room_id: room_id.clone(),
                username: removed.username,
                users: room.usernames(),
                timestamp: now,
            });
        }
    }

    /// Handles the periodic expiry sweep.
    ///
    /// Deletes every room past its expiry instant. No eviction notice is
    /// sent; clients discover room loss via subsequent failed operations.
    fn handle_sweep_expired(&mut self) {
        let now = Utc::now();

        let expired: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, room)| room.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();

        if expired.is_empty() {
            debug!("No expired rooms to sweep");
            return;
        }

        for room_id in expired {
            self.rooms.remove(&room_id);
            info!(room_id = %room_id, "Room expired and deleted");
        }
    }

    // ========================================================================
    // Accessors (for testing)
    // ========================================================================

    /// Returns the number of rooms currently registered.
    #[cfg(test)]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    fn create_actor() -> (RegistryActor, broadcast::Receiver<RoomEvent>) {
        let (_cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = broadcast::channel(16);
        let actor = RegistryActor::new(cmd_rx, event_tx);
        (actor, event_rx)
    }

    fn create_room(actor: &mut RegistryActor, id: &str, password: Option<&str>, ttl_ms: i64) {
        let (tx, _rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::CreateRoom {
            room_id: RoomId::new(id),
            password: password.map(str::to_string),
            expires_in_ms: Some(ttl_ms),
            respond_to: tx,
        });
    }

    fn join(
        actor: &mut RegistryActor,
        id: &str,
        conn: u64,
        username: &str,
        password: Option<&str>,
    ) -> Result<(), RegistryError> {
        actor.handle_join(
            RoomId::new(id),
            ConnectionId::new(conn),
            username,
            password,
        )
    }

    /// Pulls the next event and unwraps it as a join, returning the user
    /// list and snapshot it carries.
    fn recv_join(events: &mut broadcast::Receiver<RoomEvent>) -> (Vec<String>, Vec<Snippet>) {
        match events.try_recv().unwrap() {
            RoomEvent::UserJoined {
                users, snippets, ..
            } => (users, snippets),
            other => panic!("Expected UserJoined, got {other:?}"),
        }
    }

    fn test_snippet(id: &str) -> Snippet {
        Snippet {
            id: SnippetId::new(id),
            title: "t".to_string(),
            language: "JS".to_string(),
            code: "x".to_string(),
            author: "Ann".to_string(),
            created_at: None,
            messages: Vec::new(),
        }
    }

    fn test_message(id: &str) -> Message {
        Message {
            id: id.to_string(),
            text: "hi".to_string(),
            author: "Ann".to_string(),
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_create_room_acknowledges() {
        let (mut actor, _events) = create_actor();

        let (tx, rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::CreateRoom {
            room_id: RoomId::new("r1"),
            password: None,
            expires_in_ms: Some(60_000),
            respond_to: tx,
        });

        assert!(rx.await.is_ok());
        assert_eq!(actor.room_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_first_writer_wins() {
        let (mut actor, _events) = create_actor();

        create_room(&mut actor, "r1", Some("abc"), 60_000);
        // Second create with a different password must not overwrite
        create_room(&mut actor, "r1", None, 60_000);

        assert_eq!(actor.room_count(), 1);
        // The original password gate still holds
        assert!(matches!(
            join(&mut actor, "r1", 1, "Ann", None),
            Err(RegistryError::InvalidPassword)
        ));
    }

    #[tokio::test]
    async fn test_join_unknown_room() {
        let (mut actor, _events) = create_actor();
        assert!(matches!(
            join(&mut actor, "ghost", 1, "Ann", None),
            Err(RegistryError::RoomNotFound)
        ));
    }

    #[tokio::test]
    async fn test_join_expired_room_deletes_it() {
        let (mut actor, _events) = create_actor();
        create_room(&mut actor, "r1", None, -1);

        assert!(matches!(
            join(&mut actor, "r1", 1, "Ann", None),
            Err(RegistryError::RoomExpired)
        ));
        assert_eq!(actor.room_count(), 0);

        // A subsequent join behaves as not-found
        assert!(matches!(
            join(&mut actor, "r1", 1, "Ann", None),
            Err(RegistryError::RoomNotFound)
        ));
    }

    #[tokio::test]
    async fn test_join_password_gate() {
        let (mut actor, mut events) = create_actor();
        create_room(&mut actor, "r1", Some("abc"), 60_000);

        assert!(matches!(
            join(&mut actor, "r1", 1, "Ann", None),
            Err(RegistryError::InvalidPassword)
        ));
        assert!(matches!(
            join(&mut actor, "r1", 1, "Ann", Some("wrong")),
            Err(RegistryError::InvalidPassword)
        ));

        join(&mut actor, "r1", 1, "Ann", Some("abc")).unwrap();
        let (users, snippets) = recv_join(&mut events);
        assert_eq!(users, vec!["Ann"]);
        assert!(snippets.is_empty());
    }

    #[tokio::test]
    async fn test_join_requires_username() {
        let (mut actor, _events) = create_actor();
        create_room(&mut actor, "r1", None, 60_000);

        assert!(matches!(
            join(&mut actor, "r1", 1, "   ", None),
            Err(RegistryError::UsernameRequired)
        ));
    }

    #[tokio::test]
    async fn test_join_keeps_username_verbatim() {
        let (mut actor, mut events) = create_actor();
        create_room(&mut actor, "r1", None, 60_000);

        // Trimming gates the emptiness check only; the registered name is
        // the string as supplied, padding and all
        join(&mut actor, "r1", 1, "  Ann  ", None).unwrap();

        match events.try_recv().unwrap() {
            RoomEvent::UserJoined {
                username, users, ..
            } => {
                assert_eq!(username, "  Ann  ");
                assert_eq!(users, vec!["  Ann  "]);
            }
            other => panic!("Expected UserJoined, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_join_does_not_mutate_state() {
        let (mut actor, mut events) = create_actor();
        create_room(&mut actor, "r1", Some("abc"), 60_000);

        let _ = join(&mut actor, "r1", 1, "Ann", Some("wrong"));
        let _ = join(&mut actor, "r1", 1, "", Some("abc"));

        // No presence registered, no events published
        assert!(events.try_recv().is_err());
        join(&mut actor, "r1", 2, "Bob", Some("abc")).unwrap();
        let (users, _) = recv_join(&mut events);
        assert_eq!(users, vec!["Bob"]);
    }

    #[tokio::test]
    async fn test_duplicate_username_is_success_shaped() {
        let (mut actor, mut events) = create_actor();
        create_room(&mut actor, "r1", None, 60_000);

        join(&mut actor, "r1", 1, "Ann", None).unwrap();
        let _ = events.try_recv();

        // Second joiner with the same name gets a success verdict but is
        // never registered; the join event still goes out with the original
        // roster
        join(&mut actor, "r1", 2, "Ann", None).unwrap();
        let (users, _) = recv_join(&mut events);
        assert_eq!(users, vec!["Ann"]);
    }

    #[tokio::test]
    async fn test_join_publishes_event_with_origin() {
        let (mut actor, mut events) = create_actor();
        create_room(&mut actor, "r1", None, 60_000);

        join(&mut actor, "r1", 7, "Ann", None).unwrap();

        match events.try_recv().unwrap() {
            RoomEvent::UserJoined {
                origin,
                username,
                users,
                snippets,
                ..
            } => {
                assert_eq!(origin, ConnectionId::new(7));
                assert_eq!(username, "Ann");
                assert_eq!(users, vec!["Ann"]);
                assert!(snippets.is_empty());
            }
            other => panic!("Expected UserJoined, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_event_carries_room_snapshot() {
        let (mut actor, mut events) = create_actor();
        create_room(&mut actor, "r1", None, 60_000);

        actor.handle_command(RegistryCommand::AddSnippet {
            room_id: RoomId::new("r1"),
            snippet: test_snippet("s1"),
        });
        let _ = events.try_recv();

        join(&mut actor, "r1", 1, "Ann", None).unwrap();

        let (users, snippets) = recv_join(&mut events);
        assert_eq!(users, vec!["Ann"]);
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].id.as_str(), "s1");
    }

    #[tokio::test]
    async fn test_add_snippet_resets_thread_and_broadcasts() {
        let (mut actor, mut events) = create_actor();
        create_room(&mut actor, "r1", None, 60_000);

        let mut snippet = test_snippet("s1");
        snippet.messages.push(test_message("smuggled"));
        actor.handle_command(RegistryCommand::AddSnippet {
            room_id: RoomId::new("r1"),
            snippet,
        });

        match events.try_recv().unwrap() {
            RoomEvent::SnippetAdded { snippet, .. } => {
                assert_eq!(snippet.id.as_str(), "s1");
                assert!(snippet.messages.is_empty());
            }
            other => panic!("Expected SnippetAdded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_add_snippet_unknown_room_is_silent() {
        let (mut actor, mut events) = create_actor();

        actor.handle_command(RegistryCommand::AddSnippet {
            room_id: RoomId::new("ghost"),
            snippet: test_snippet("s1"),
        });

        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_delete_then_message_drops_silently() {
        let (mut actor, mut events) = create_actor();
        create_room(&mut actor, "r1", None, 60_000);

        actor.handle_command(RegistryCommand::AddSnippet {
            room_id: RoomId::new("r1"),
            snippet: test_snippet("s1"),
        });
        actor.handle_command(RegistryCommand::DeleteSnippet {
            room_id: RoomId::new("r1"),
            snippet_id: SnippetId::new("s1"),
        });
        actor.handle_command(RegistryCommand::AddMessage {
            room_id: RoomId::new("r1"),
            snippet_id: SnippetId::new("s1"),
            message: test_message("m1"),
        });

        // snippet-added and snippet-deleted, then nothing for the message
        assert!(matches!(
            events.try_recv().unwrap(),
            RoomEvent::SnippetAdded { .. }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            RoomEvent::SnippetDeleted { .. }
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_add_message_broadcasts() {
        let (mut actor, mut events) = create_actor();
        create_room(&mut actor, "r1", None, 60_000);

        actor.handle_command(RegistryCommand::AddSnippet {
            room_id: RoomId::new("r1"),
            snippet: test_snippet("s1"),
        });
        let _ = events.try_recv();

        actor.handle_command(RegistryCommand::AddMessage {
            room_id: RoomId::new("r1"),
            snippet_id: SnippetId::new("s1"),
            message: test_message("m1"),
        });

        match events.try_recv().unwrap() {
            RoomEvent::MessageAdded {
                snippet_id,
                message,
                ..
            } => {
                assert_eq!(snippet_id.as_str(), "s1");
                assert_eq!(message.id, "m1");
            }
            other => panic!("Expected MessageAdded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_disconnect_publishes_leave_per_room() {
        let (mut actor, mut events) = create_actor();
        create_room(&mut actor, "r1", None, 60_000);

        join(&mut actor, "r1", 1, "Ann", None).unwrap();
        join(&mut actor, "r1", 2, "Bob", None).unwrap();
        let _ = events.try_recv();
        let _ = events.try_recv();

        actor.handle_command(RegistryCommand::Disconnect {
            connection_id: ConnectionId::new(1),
        });

        match events.try_recv().unwrap() {
            RoomEvent::UserLeft {
                username, users, ..
            } => {
                assert_eq!(username, "Ann");
                assert_eq!(users, vec!["Bob"]);
            }
            other => panic!("Expected UserLeft, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_disconnect_unknown_connection_is_silent() {
        let (mut actor, mut events) = create_actor();
        create_room(&mut actor, "r1", None, 60_000);

        actor.handle_command(RegistryCommand::Disconnect {
            connection_id: ConnectionId::new(99),
        });

        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sweep_deletes_only_expired_rooms() {
        let (mut actor, mut events) = create_actor();
        create_room(&mut actor, "old", None, -1);
        create_room(&mut actor, "fresh", None, 60_000);

        actor.handle_command(RegistryCommand::SweepExpired);

        assert_eq!(actor.room_count(), 1);
        // Sweep is silent: no events
        assert!(events.try_recv().is_err());
        assert!(join(&mut actor, "fresh", 1, "Ann", None).is_ok());
        assert!(matches!(
            join(&mut actor, "old", 2, "Bob", None),
            Err(RegistryError::RoomNotFound)
        ));
    }

    #[tokio::test]
    async fn test_default_ttl_applied_for_absent_or_zero() {
        let (mut actor, _events) = create_actor();

        let (tx, _rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::CreateRoom {
            room_id: RoomId::new("r1"),
            password: None,
            expires_in_ms: None,
            respond_to: tx,
        });
        let (tx, _rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::CreateRoom {
            room_id: RoomId::new("r2"),
            password: None,
            expires_in_ms: Some(0),
            respond_to: tx,
        });

        // Both rooms are live well past any plausible test duration
        assert!(join(&mut actor, "r1", 1, "Ann", None).is_ok());
        assert!(join(&mut actor, "r2", 2, "Bob", None).is_ok());
    }
}
