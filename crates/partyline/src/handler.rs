//! Per-connection handler: registration, framing, and the read loop.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register with the lobby → get the outbound message queue
//!   2. Spawn a writer that encodes and sends queued messages, and pings
//!      the peer every heartbeat interval
//!   3. Loop: receive frames → decode `Request` → submit to the lobby
//!   4. On close, error or idle timeout: report the disconnect
//!
//! Any inbound frame counts as a sign of life, including the pong a
//! browser sends back for each server ping. A quiet player who is still
//! connected is therefore never timed out.

use std::sync::Arc;
use std::time::Duration;

use partyline_protocol::{Codec, Request, ServerMessage};
use partyline_room::LobbyHandle;
use partyline_transport::{Connection, ConnectionId, Frame, TransportError, WebSocketConnection};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use crate::PartylineError;

/// Drop guard that reports the disconnect when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the send.
struct DisconnectGuard {
    connection: ConnectionId,
    lobby: LobbyHandle,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let connection = self.connection;
        let lobby = self.lobby.clone();
        tokio::spawn(async move {
            let _ = lobby.disconnect(connection).await;
        });
    }
}

/// Liveness settings for one connection.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Liveness {
    /// How long the peer may send nothing at all before it is dropped.
    pub(crate) idle_timeout: Duration,
    /// How often the server pings the peer.
    pub(crate) heartbeat_interval: Duration,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C>(
    conn: WebSocketConnection,
    lobby: LobbyHandle,
    codec: C,
    liveness: Liveness,
) -> Result<(), PartylineError>
where
    C: Codec + Clone,
{
    let connection = conn.id();
    tracing::debug!(%connection, peer = %conn.peer_addr(), "handling new connection");

    let outbound = lobby.connect(connection).await?;
    let _guard = DisconnectGuard {
        connection,
        lobby: lobby.clone(),
    };

    let conn = Arc::new(conn);
    let writer = tokio::spawn(write_loop(
        Arc::clone(&conn),
        outbound,
        codec.clone(),
        liveness.heartbeat_interval,
    ));

    let result = read_loop(&conn, &lobby, &codec, liveness.idle_timeout).await;

    writer.abort();
    if let Err(e) = conn.close().await {
        tracing::trace!(%connection, error = %e, "close after handler exit failed");
    }
    // _guard drops here → lobby disconnect fires.
    result
}

/// Reads frames until the peer closes, errors, or goes silent.
async fn read_loop<C: Codec>(
    conn: &WebSocketConnection,
    lobby: &LobbyHandle,
    codec: &C,
    idle_timeout: Duration,
) -> Result<(), PartylineError> {
    let connection = conn.id();

    loop {
        let data = match time::timeout(idle_timeout, conn.recv()).await {
            Ok(Ok(Some(Frame::Data(data)))) => data,
            Ok(Ok(Some(Frame::Heartbeat))) => {
                tracing::trace!(%connection, "heartbeat");
                continue;
            }
            Ok(Ok(None)) => {
                tracing::debug!(%connection, "connection closed cleanly");
                return Ok(());
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                tracing::info!(%connection, "connection idle, dropping");
                return Err(TransportError::IdleTimeout(idle_timeout).into());
            }
        };

        let request: Request = match codec.decode(&data) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(%connection, error = %e, "failed to decode request");
                send_error(conn, codec, 400, &e.to_string()).await?;
                continue;
            }
        };

        lobby.submit(connection, request).await?;
    }
}

/// Drains the connection's outbound queue onto the socket and pings the
/// peer on every heartbeat tick.
///
/// Ends when the lobby drops the queue or the socket stops accepting
/// writes.
async fn write_loop<C: Codec>(
    conn: Arc<WebSocketConnection>,
    mut outbound: mpsc::UnboundedReceiver<ServerMessage>,
    codec: C,
    heartbeat_interval: Duration,
) {
    let connection = conn.id();
    let mut heartbeat = time::interval_at(
        time::Instant::now() + heartbeat_interval,
        heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            msg = outbound.recv() => {
                let Some(msg) = msg else { break };
                let bytes = match codec.encode(&msg) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(%connection, error = %e, "failed to encode message");
                        continue;
                    }
                };
                if let Err(e) = conn.send(&bytes).await {
                    tracing::debug!(%connection, error = %e, "send failed, stopping writer");
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if let Err(e) = conn.ping().await {
                    tracing::debug!(%connection, error = %e, "ping failed, stopping writer");
                    break;
                }
            }
        }
    }
}

/// Sends a `ServerMessage::Error` straight to the client.
async fn send_error<C: Codec>(
    conn: &WebSocketConnection,
    codec: &C,
    code: u16,
    message: &str,
) -> Result<(), PartylineError> {
    let msg = ServerMessage::Error {
        code,
        message: message.to_string(),
    };
    let bytes = codec.encode(&msg)?;
    conn.send(&bytes).await?;
    Ok(())
}
