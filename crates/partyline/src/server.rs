//! `PartylineServer` builder and server loop.
//!
//! This is the entry point for running a Partyline server. It ties
//! together all the layers: transport → protocol → lobby actor.

use std::time::Duration;

use partyline_protocol::JsonCodec;
use partyline_room::{LobbyHandle, RoomConfig, RoomError, spawn_lobby};
use partyline_transport::{Transport, WebSocketTransport};
use tokio::task::JoinHandle;

use crate::PartylineError;
use crate::handler::{Liveness, handle_connection};

/// Builder for configuring and starting a Partyline server.
///
/// # Example
///
/// ```rust,ignore
/// use partyline::prelude::*;
///
/// let server = PartylineServer::builder()
///     .bind("0.0.0.0:3001")
///     .room_config(RoomConfig { max_players: 8, ..RoomConfig::default() })
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct PartylineServerBuilder {
    bind_addr: String,
    room_config: RoomConfig,
    idle_timeout: Duration,
    heartbeat_interval: Duration,
}

impl PartylineServerBuilder {
    /// Default time a socket may stay silent before it is dropped.
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Default time between server pings. Kept well under the idle timeout
    /// so a live client's pongs always arrive in time.
    pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:3001".to_string(),
            room_config: RoomConfig::default(),
            idle_timeout: Self::DEFAULT_IDLE_TIMEOUT,
            heartbeat_interval: Self::DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the room rules and reaper timings.
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    /// Sets how long a connection may go without sending anything.
    ///
    /// Pings and pongs count, so a client that only answers the server's
    /// heartbeat is never considered idle.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets how often the server pings each connection.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Binds the listener and starts the lobby actor.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<PartylineServer, PartylineError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let (lobby, lobby_task) = spawn_lobby(self.room_config);

        Ok(PartylineServer {
            transport,
            lobby,
            lobby_task,
            codec: JsonCodec,
            liveness: Liveness {
                idle_timeout: self.idle_timeout,
                heartbeat_interval: self.heartbeat_interval,
            },
        })
    }
}

impl Default for PartylineServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Partyline server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct PartylineServer {
    transport: WebSocketTransport,
    lobby: LobbyHandle,
    lobby_task: JoinHandle<Result<(), RoomError>>,
    codec: JsonCodec,
    liveness: Liveness,
}

impl PartylineServer {
    /// Creates a new builder.
    pub fn builder() -> PartylineServerBuilder {
        PartylineServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle to the lobby, for inspecting rooms from outside.
    pub fn lobby(&self) -> LobbyHandle {
        self.lobby.clone()
    }

    /// Runs the accept loop.
    ///
    /// Spawns a handler task for each accepted socket. Returns only if the
    /// lobby stops, which happens on a fatal room error.
    pub async fn run(mut self) -> Result<(), PartylineError> {
        tracing::info!(
            addr = ?self.transport.local_addr().ok(),
            "Partyline server running"
        );

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let lobby = self.lobby.clone();
                        let codec = self.codec;
                        let liveness = self.liveness;
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, lobby, codec, liveness).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                stopped = &mut self.lobby_task => {
                    let result = match stopped {
                        Ok(result) => result,
                        Err(join_err) => {
                            tracing::error!(error = %join_err, "lobby task panicked");
                            Err(RoomError::Unavailable)
                        }
                    };
                    tracing::info!(ok = result.is_ok(), "lobby stopped, shutting down");
                    return result.map_err(PartylineError::from);
                }
            }
        }
    }
}
