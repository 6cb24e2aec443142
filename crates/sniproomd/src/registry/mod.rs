//! Room registry for the sniproom daemon.
//!
//! The registry tracks every live room along with its snippets, message
//! threads, and member presence. It is implemented with the actor pattern:
//!
//! - `RegistryActor`: owns all state, processes commands sequentially
//! - `RegistryHandle`: cheap-to-clone handle for sending commands
//! - `RegistryCommand` / `RoomEvent`: the message types
//!
//! Sequential command processing makes every validate-mutate-publish
//! sequence atomic without locks. A background task sweeps expired rooms
//! once a minute.

mod actor;
mod commands;
mod handle;

pub use actor::{RegistryActor, DEFAULT_ROOM_TTL_MS};
pub use commands::{RegistryCommand, RegistryError, RoomEvent};
pub use handle::RegistryHandle;

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::debug;

/// Command channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Event broadcast buffer size
const EVENT_BUFFER: usize = 100;

/// Seconds between expiry sweeps
const SWEEP_INTERVAL_SECS: u64 = 60;

/// Spawns the registry actor and its expiry sweep task, returning a handle.
///
/// The actor runs until every handle is dropped; the sweep task exits when
/// the command channel closes.
pub fn spawn_registry() -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, event_tx.clone());
    tokio::spawn(actor.run());

    spawn_sweep_task(cmd_tx.clone());

    RegistryHandle::new(cmd_tx, event_tx)
}

/// Spawns the periodic expiry sweep.
///
/// Sends a fire-and-forget `SweepExpired` once a minute and exits when the
/// registry channel closes.
fn spawn_sweep_task(sender: mpsc::Sender<RegistryCommand>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        // First tick fires immediately; skip it so a fresh daemon does not
        // sweep before any room can exist.
        interval.tick().await;

        loop {
            interval.tick().await;
            if sender.send(RegistryCommand::SweepExpired).await.is_err() {
                debug!("Registry stopped, ending sweep task");
                break;
            }
        }
    });
}
