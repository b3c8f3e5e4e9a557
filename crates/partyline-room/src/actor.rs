//! Lobby actor: the single Tokio task that owns every room.
//!
//! Connection handlers never touch rooms directly. They send commands
//! through a [`LobbyHandle`], and the actor applies them one at a time,
//! so no room is ever observed half-updated and no lock is needed.
//!
//! Grace timers and the idle-room sweep feed back into the same loop,
//! which means they are serialized with player events too.

use std::time::Duration;

use partyline_protocol::{PlayerId, Request, RoomCode, ServerMessage};
use partyline_reaper::{SweepConfig, SweepScheduler, schedule_once};
use partyline_session::PeerSender;
use partyline_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{GraceTimer, MemoryStore, Room, RoomConfig, RoomError, RoomManager, RoomStore};

/// Capacity of the lobby's command channel. Senders wait when it fills.
const LOBBY_CHANNEL_SIZE: usize = 1024;

/// Commands sent to the lobby actor through its channel.
pub(crate) enum LobbyCommand {
    /// A socket was accepted; start queueing its messages on `sender`.
    Connect {
        connection: ConnectionId,
        sender: PeerSender,
    },

    /// A decoded client request.
    Event {
        connection: ConnectionId,
        request: Request,
    },

    /// The socket closed without an explicit leave.
    Disconnect { connection: ConnectionId },

    /// A grace period ran out. Re-checked before anything is removed.
    GraceExpired {
        room_code: RoomCode,
        player_id: PlayerId,
    },

    /// Copy of one room, for inspection.
    Snapshot {
        room_code: RoomCode,
        reply: oneshot::Sender<Option<Room>>,
    },

    RoomCount { reply: oneshot::Sender<usize> },
}

/// Handle to the running lobby. Cheap to clone.
#[derive(Clone)]
pub struct LobbyHandle {
    sender: mpsc::Sender<LobbyCommand>,
}

impl LobbyHandle {
    /// Registers a connection and returns the queue of messages for it.
    ///
    /// Commands from one handle are processed in the order they were
    /// sent, so events submitted after this call always find the
    /// connection registered.
    pub async fn connect(
        &self,
        connection: ConnectionId,
    ) -> Result<mpsc::UnboundedReceiver<ServerMessage>, RoomError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.send(LobbyCommand::Connect {
            connection,
            sender: tx,
        })
        .await?;
        Ok(rx)
    }

    /// Submits a client request (fire-and-forget; answers arrive on the
    /// connection's queue).
    pub async fn submit(&self, connection: ConnectionId, request: Request) -> Result<(), RoomError> {
        self.send(LobbyCommand::Event {
            connection,
            request,
        })
        .await
    }

    /// Reports that a connection has gone away.
    pub async fn disconnect(&self, connection: ConnectionId) -> Result<(), RoomError> {
        self.send(LobbyCommand::Disconnect { connection }).await
    }

    /// Returns a copy of a room, if it exists.
    pub async fn room(&self, room_code: &RoomCode) -> Result<Option<Room>, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(LobbyCommand::Snapshot {
            room_code: room_code.clone(),
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| RoomError::Unavailable)
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> Result<usize, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(LobbyCommand::RoomCount { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| RoomError::Unavailable)
    }

    /// Whether the lobby actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn send(&self, cmd: LobbyCommand) -> Result<(), RoomError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| RoomError::Unavailable)
    }
}

/// The actor state. Runs inside a Tokio task.
struct LobbyActor<S: RoomStore> {
    rooms: RoomManager<S>,
    sweeper: SweepScheduler,
    receiver: mpsc::Receiver<LobbyCommand>,
    /// Handed to grace timers. Weak, so pending timers never keep the
    /// lobby alive after every handle is gone.
    timers: mpsc::WeakSender<LobbyCommand>,
    reconnect_grace: Duration,
}

impl<S: RoomStore> LobbyActor<S> {
    /// Processes commands until every handle is dropped or a fatal
    /// error occurs.
    async fn run(mut self) -> Result<(), RoomError> {
        tracing::info!(
            sweep_interval_secs = self.rooms.config().sweep_interval.as_secs(),
            room_ttl_secs = self.rooms.config().room_ttl.as_secs(),
            "lobby started"
        );

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if let Err(err) = self.handle(cmd) {
                        tracing::error!(%err, rooms = self.rooms.room_count(), "lobby stopping on fatal error");
                        return Err(err);
                    }
                }
                info = self.sweeper.wait_for_sweep() => {
                    let now = tokio::time::Instant::now().into_std();
                    let reaped = self.rooms.sweep_expired(now);
                    self.sweeper.record_sweep(reaped);
                    tracing::debug!(
                        sweep = info.sweep,
                        reaped,
                        total_reaped = self.sweeper.metrics().total_reaped,
                        rooms = self.rooms.room_count(),
                        "sweep finished"
                    );
                }
            }
        }

        tracing::info!("lobby stopped");
        Ok(())
    }

    fn handle(&mut self, cmd: LobbyCommand) -> Result<(), RoomError> {
        match cmd {
            LobbyCommand::Connect { connection, sender } => {
                if let Err(err) = self.rooms.connect(connection, sender) {
                    tracing::warn!(%connection, %err, "duplicate connect ignored");
                }
            }
            LobbyCommand::Event {
                connection,
                request,
            } => {
                tracing::trace!(%connection, event = request.event.name(), "event received");
                self.rooms.handle_event(connection, request)?;
            }
            LobbyCommand::Disconnect { connection } => {
                for timer in self.rooms.disconnect(connection) {
                    self.arm(timer);
                }
            }
            LobbyCommand::GraceExpired {
                room_code,
                player_id,
            } => {
                self.rooms.expire_grace(&room_code, &player_id);
            }
            LobbyCommand::Snapshot { room_code, reply } => {
                let _ = reply.send(self.rooms.room(&room_code).cloned());
            }
            LobbyCommand::RoomCount { reply } => {
                let _ = reply.send(self.rooms.room_count());
            }
        }
        Ok(())
    }

    /// Arms a one-shot grace timer. There is no cancel: a player who
    /// comes back in time makes the timer's re-check fail instead.
    fn arm(&self, timer: GraceTimer) {
        tracing::debug!(
            room_code = %timer.room_code,
            player_id = %timer.player_id,
            grace_secs = self.reconnect_grace.as_secs(),
            "grace timer armed"
        );
        schedule_once(
            self.reconnect_grace,
            self.timers.clone(),
            LobbyCommand::GraceExpired {
                room_code: timer.room_code,
                player_id: timer.player_id,
            },
        );
    }
}

/// Spawns the lobby actor with an in-memory store.
///
/// The returned join handle resolves when the lobby stops: `Ok` once
/// every [`LobbyHandle`] is dropped, `Err` on a fatal error.
pub fn spawn_lobby(config: RoomConfig) -> (LobbyHandle, JoinHandle<Result<(), RoomError>>) {
    spawn_lobby_with_store(MemoryStore::new(), config)
}

/// Spawns the lobby actor over a caller-supplied store.
pub fn spawn_lobby_with_store<S: RoomStore>(
    store: S,
    config: RoomConfig,
) -> (LobbyHandle, JoinHandle<Result<(), RoomError>>) {
    let (tx, rx) = mpsc::channel(LOBBY_CHANNEL_SIZE);

    let sweeper = SweepScheduler::new(SweepConfig {
        interval: config.sweep_interval,
        ..SweepConfig::default()
    });
    let actor = LobbyActor {
        reconnect_grace: config.reconnect_grace,
        rooms: RoomManager::with_store(store, config),
        sweeper,
        receiver: rx,
        timers: tx.downgrade(),
    };

    let task = tokio::spawn(actor.run());
    (LobbyHandle { sender: tx }, task)
}
