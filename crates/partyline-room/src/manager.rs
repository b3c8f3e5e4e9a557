//! Room manager: the roster rules, the game phase rules, and who hears
//! about each change.
//!
//! Every method here is synchronous and assumes exclusive access. The
//! lobby actor (see [`spawn_lobby`](crate::spawn_lobby)) owns the one
//! instance and feeds it events in arrival order.
//!
//! Requests that make no sense (unknown room, unknown player, a guest
//! trying a host-only action, a taken role) are dropped with a `debug`
//! log and no reply. Late or duplicated events after a room is gone are
//! normal and must not disturb anyone.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use partyline_protocol::{
    Blob, ClientEvent, Player, PlayerId, Recipient, Reply, Request, RoomCode, ServerEvent,
    ServerMessage,
};
use partyline_session::{PeerSender, SessionError, SessionManager};
use partyline_transport::ConnectionId;

use crate::code::{ai_player_id, is_valid_room_code};
use crate::room::{Departure, DepartureOutcome};
use crate::{CodeGenerator, MemoryStore, Phase, Room, RoomConfig, RoomError, RoomStore};

/// A disconnected lobby player whose seat should be released after the
/// grace period, unless they come back first.
///
/// The manager only reports these; arming the timer is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraceTimer {
    pub room_code: RoomCode,
    pub player_id: PlayerId,
}

/// Owns every room and every connection's subscriptions.
pub struct RoomManager<S: RoomStore = MemoryStore> {
    store: S,
    sessions: SessionManager,
    config: RoomConfig,
    codes: CodeGenerator,
}

impl RoomManager<MemoryStore> {
    /// A manager backed by an in-memory store.
    pub fn new(config: RoomConfig) -> Self {
        Self::with_store(MemoryStore::new(), config)
    }
}

impl Default for RoomManager<MemoryStore> {
    fn default() -> Self {
        Self::new(RoomConfig::default())
    }
}

impl<S: RoomStore> RoomManager<S> {
    pub fn with_store(store: S, config: RoomConfig) -> Self {
        let codes = CodeGenerator::from_config(&config);
        Self {
            store,
            sessions: SessionManager::new(),
            config,
            codes,
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn room(&self, code: &RoomCode) -> Option<&Room> {
        self.store.get(code)
    }

    pub fn room_count(&self) -> usize {
        self.store.len()
    }

    // =====================================================================
    // Connections
    // =====================================================================

    /// Registers a new connection and where its messages go.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyOpen`] for a duplicate id.
    pub fn connect(&mut self, connection: ConnectionId, sender: PeerSender) -> Result<(), SessionError> {
        self.sessions.open(connection, sender)
    }

    /// Handles a connection that dropped without leaving.
    ///
    /// Every player bound to it keeps their seat but loses the binding,
    /// and the room hears `player_disconnected`. For rooms still in the
    /// lobby a [`GraceTimer`] is returned.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Vec<GraceTimer> {
        self.sessions.close(connection);

        let mut timers = Vec::new();
        for (code, player_id) in self.bindings_of(connection) {
            let Some(room) = self.store.get_mut(&code) else {
                continue;
            };
            room.unbind(&player_id);
            let in_lobby = room.phase == Phase::Lobby;
            let player_name = room
                .player(&player_id)
                .map(|p| p.name.clone())
                .unwrap_or_default();

            tracing::info!(
                room_code = %code,
                %player_id,
                %connection,
                in_lobby,
                "player disconnected"
            );
            self.broadcast(
                &code,
                ServerEvent::PlayerDisconnected {
                    player_id: player_id.clone(),
                    player_name,
                },
            );
            if in_lobby {
                timers.push(GraceTimer {
                    room_code: code,
                    player_id,
                });
            }
        }
        timers
    }

    // =====================================================================
    // Event dispatch
    // =====================================================================

    /// Applies one client request.
    ///
    /// # Errors
    /// Only fatal errors are returned (see [`RoomError::is_fatal`]).
    /// Join rejections are answered on the reply channel instead.
    pub fn handle_event(&mut self, connection: ConnectionId, request: Request) -> Result<(), RoomError> {
        let Request { ack, event } = request;
        match event {
            ClientEvent::CreateRoom {
                player_id,
                player_name,
                business_type,
            } => {
                self.create_room(connection, ack, player_id, player_name, business_type)?;
            }
            ClientEvent::JoinRoom {
                room_code,
                player_id,
                player_name,
            } => {
                match self.join_room(connection, ack, &room_code, player_id, player_name) {
                    Ok(()) => {}
                    Err(err) if err.is_fatal() => return Err(err),
                    // Already answered with a rejection.
                    Err(err) => tracing::trace!(%connection, %err, "join request refused"),
                }
            }
            ClientEvent::SelectRole {
                room_code,
                player_id,
                role,
            } => self.select_role(&room_code, &player_id, role),
            ClientEvent::SetReady {
                room_code,
                player_id,
                ready,
            } => self.set_ready(&room_code, &player_id, ready),
            ClientEvent::AddAiPlayer {
                room_code,
                role,
                ai_name,
            } => self.add_ai(connection, &room_code, role, ai_name),
            ClientEvent::RemovePlayer {
                room_code,
                player_id,
            } => self.remove_player(connection, &room_code, &player_id),
            ClientEvent::StartGame {
                room_code,
                initial_state,
            } => self.start_game(connection, &room_code, initial_state),
            ClientEvent::SyncGameState {
                room_code,
                game_state,
            } => self.sync_game_state(connection, &room_code, game_state),
            ClientEvent::PlayerAction { room_code, action } => {
                self.player_action(connection, &room_code, action)
            }
            ClientEvent::EndGame { room_code, results } => {
                self.end_game(connection, &room_code, results)
            }
            ClientEvent::LeaveRoom { room_code } => self.leave_room(connection, &room_code),
            ClientEvent::Ping => self.ping(connection, ack),
        }
        Ok(())
    }

    // =====================================================================
    // Roster
    // =====================================================================

    /// Opens a new lobby with the caller as host.
    ///
    /// Any room the connection was already playing in is left first.
    ///
    /// # Errors
    /// [`RoomError::CodeSpaceExhausted`] if no free code could be drawn.
    pub fn create_room(
        &mut self,
        connection: ConnectionId,
        ack: Option<u64>,
        player_id: PlayerId,
        player_name: String,
        business_type: String,
    ) -> Result<RoomCode, RoomError> {
        self.release_connection(connection, None);

        let code = self.codes.generate(|c| self.store.contains(c))?;
        let host = Player::human(player_id.clone(), player_name, connection);
        let room = Room::new(code.clone(), business_type, host);
        let players = room.players.clone();
        self.store.insert(room);
        self.subscribe(connection, &code);

        tracing::info!(room_code = %code, %player_id, %connection, "room created");
        self.reply(
            connection,
            ack,
            Reply::RoomCreated {
                room_code: code.clone(),
                players,
            },
        );
        Ok(code)
    }

    /// Joins a lobby by code, or takes back a seat by player id.
    ///
    /// The code is matched case-insensitively. A player id already on the
    /// roster is re-bound to this connection in any phase, even when the
    /// room is full; only new players are subject to the phase and cap
    /// checks.
    ///
    /// # Errors
    /// [`RoomError::NotFound`], [`RoomError::GameInProgress`] or
    /// [`RoomError::RoomFull`]. The caller has already been sent the
    /// matching rejection when `ack` is set.
    pub fn join_room(
        &mut self,
        connection: ConnectionId,
        ack: Option<u64>,
        room_code: &RoomCode,
        player_id: PlayerId,
        player_name: String,
    ) -> Result<(), RoomError> {
        let code = room_code.normalized();
        let result = self.try_join(connection, ack, &code, player_id, player_name);
        if let Err(err) = &result {
            tracing::debug!(room_code = %code, %connection, %err, "join rejected");
            if let Some(reason) = err.rejection() {
                self.reply(connection, ack, Reply::rejected(reason));
            }
        }
        result
    }

    fn try_join(
        &mut self,
        connection: ConnectionId,
        ack: Option<u64>,
        code: &RoomCode,
        player_id: PlayerId,
        player_name: String,
    ) -> Result<(), RoomError> {
        if !is_valid_room_code(code.as_str(), self.config.code_length) {
            return Err(RoomError::NotFound(code.clone()));
        }
        let room = self
            .store
            .get(code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;
        match room.player(&player_id) {
            Some(existing) if existing.is_ai => {
                return Err(RoomError::PlayerIdTaken {
                    room_code: code.clone(),
                    player_id,
                });
            }
            Some(_) => {}
            None => {
                if !room.phase.is_joinable() {
                    return Err(RoomError::GameInProgress(code.clone()));
                }
                if room.players.len() >= self.config.max_players {
                    return Err(RoomError::RoomFull(code.clone()));
                }
            }
        }

        self.release_connection(connection, Some((code, &player_id)));

        // Releasing an earlier binding in this same room can delete it.
        let room = self
            .store
            .get_mut(code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;

        let joined = if room.rebind(&player_id, connection) {
            tracing::info!(room_code = %code, %player_id, %connection, "player rejoined");
            None
        } else {
            let player = Player::human(player_id.clone(), player_name, connection);
            room.players.push(player.clone());
            tracing::info!(
                room_code = %code,
                %player_id,
                players = room.players.len(),
                "player joined"
            );
            Some(player)
        };
        let players = room.players.clone();
        let business_type = room.business_type.clone();

        self.subscribe(connection, code);
        self.reply(
            connection,
            ack,
            Reply::RoomJoined {
                room_code: code.clone(),
                players: players.clone(),
                business_type,
            },
        );
        self.broadcast(code, ServerEvent::PlayersUpdated { players });
        if let Some(player) = joined {
            self.broadcast(code, ServerEvent::PlayerJoined { player });
        }
        Ok(())
    }

    /// Gives `player_id` a role, unless another player already has it.
    /// Changing role always clears the ready flag.
    pub fn select_role(&mut self, code: &RoomCode, player_id: &PlayerId, role: String) {
        let Some(room) = self.store.get_mut(code) else {
            return ignored("select_role", code, "no such room");
        };
        if room.role_taken(&role, Some(player_id)) {
            return ignored("select_role", code, "role taken");
        }
        let Some(player) = room.player_mut(player_id) else {
            return ignored("select_role", code, "no such player");
        };
        player.role = Some(role);
        player.is_ready = false;
        self.broadcast_roster(code);
    }

    /// Sets the ready flag of a player who has picked a role.
    pub fn set_ready(&mut self, code: &RoomCode, player_id: &PlayerId, ready: bool) {
        let Some(player) = self
            .store
            .get_mut(code)
            .and_then(|room| room.player_mut(player_id))
        else {
            return ignored("set_ready", code, "no such room or player");
        };
        if player.role.is_none() {
            return ignored("set_ready", code, "player has no role");
        }
        player.is_ready = ready;
        self.broadcast_roster(code);
    }

    /// Adds a ready AI player in a free role. Host only, lobby only, and
    /// only while the room has a free seat.
    pub fn add_ai(&mut self, connection: ConnectionId, code: &RoomCode, role: String, ai_name: String) {
        let max_players = self.config.max_players;
        let Some(room) = self.store.get_mut(code) else {
            return ignored("add_ai_player", code, "no such room");
        };
        if !room.is_host_connection(connection) {
            return ignored("add_ai_player", code, "not the host");
        }
        if room.phase != Phase::Lobby || room.players.len() >= max_players {
            return ignored("add_ai_player", code, "room not accepting players");
        }
        if room.role_taken(&role, None) {
            return ignored("add_ai_player", code, "role taken");
        }

        let mut rng = rand::rng();
        let id = loop {
            let id = ai_player_id(&mut rng);
            if room.player(&id).is_none() {
                break id;
            }
        };
        tracing::info!(room_code = %code, player_id = %id, %role, "AI player added");
        room.players.push(Player::ai(id, ai_name, role));
        self.broadcast_roster(code);
    }

    /// Removes a player. Anyone may remove themselves; the host may
    /// remove anyone. The removed player's connection keeps receiving
    /// room events so it sees its own removal.
    pub fn remove_player(&mut self, connection: ConnectionId, code: &RoomCode, target: &PlayerId) {
        let Some(room) = self.store.get(code) else {
            return ignored("remove_player", code, "no such room");
        };
        let Some(requester) = room.player_on(connection) else {
            return ignored("remove_player", code, "requester not in room");
        };
        if &requester.id != target && !requester.is_host {
            return ignored("remove_player", code, "not allowed");
        }
        if self.depart(code, target).is_some() {
            tracing::info!(room_code = %code, player_id = %target, "player removed");
        }
    }

    // =====================================================================
    // Game phase
    // =====================================================================

    /// Starts the game once everyone, AI included, is ready. Host only.
    pub fn start_game(&mut self, connection: ConnectionId, code: &RoomCode, initial_state: Blob) {
        let Some(room) = self.host_room_mut(connection, code, "start_game") else {
            return;
        };
        if !room.phase.can_transition_to(Phase::Playing) {
            return ignored("start_game", code, "not in lobby");
        }
        if !room.all_ready() {
            return ignored("start_game", code, "not everyone is ready");
        }
        room.phase = Phase::Playing;
        room.game_state = Some(initial_state.clone());
        tracing::info!(room_code = %code, players = room.players.len(), "game started");
        self.broadcast(
            code,
            ServerEvent::GameStarted {
                game_state: initial_state,
            },
        );
    }

    /// Stores the host's latest state and echoes it to everyone else.
    pub fn sync_game_state(&mut self, connection: ConnectionId, code: &RoomCode, game_state: Blob) {
        let Some(room) = self.host_room_mut(connection, code, "sync_game_state") else {
            return;
        };
        room.game_state = Some(game_state.clone());
        self.sessions.deliver(
            &Recipient::RoomExcept(code.clone(), connection),
            ServerEvent::GameStateUpdated { game_state }.into(),
        );
    }

    /// Forwards an action to the host only, tagged with the sender's
    /// player id. Dropped while the host is disconnected.
    pub fn player_action(&mut self, connection: ConnectionId, code: &RoomCode, action: Blob) {
        let Some(room) = self.store.get(code) else {
            return ignored("player_action", code, "no such room");
        };
        let Some(host) = room.host_connection else {
            return ignored("player_action", code, "host disconnected");
        };
        let player_id = room.player_on(connection).map(|p| p.id.clone());
        self.sessions.deliver(
            &Recipient::Connection(host),
            ServerEvent::PlayerActionReceived { player_id, action }.into(),
        );
    }

    /// Ends a running game and broadcasts the results. Host only.
    pub fn end_game(&mut self, connection: ConnectionId, code: &RoomCode, results: Blob) {
        let Some(room) = self.host_room_mut(connection, code, "end_game") else {
            return;
        };
        if !room.phase.can_transition_to(Phase::Results) {
            return ignored("end_game", code, "no game running");
        }
        room.phase = Phase::Results;
        tracing::info!(room_code = %code, "game ended");
        self.broadcast(code, ServerEvent::GameEnded { results });
    }

    // =====================================================================
    // Leaving
    // =====================================================================

    /// Explicit leave: the connection's player is removed at once and
    /// the connection stops hearing from the room.
    pub fn leave_room(&mut self, connection: ConnectionId, code: &RoomCode) {
        self.sessions.unsubscribe(connection, code);
        let Some(player_id) = self
            .store
            .get(code)
            .and_then(|room| room.player_on(connection))
            .map(|p| p.id.clone())
        else {
            return ignored("leave_room", code, "connection not in room");
        };
        self.depart_with_notice(code, &player_id);
    }

    /// A grace timer fired. Removes the player only if they are still in
    /// the room, still disconnected, and human.
    ///
    /// Returns `true` if the player was removed.
    pub fn expire_grace(&mut self, code: &RoomCode, player_id: &PlayerId) -> bool {
        let still_gone = self
            .store
            .get(code)
            .and_then(|room| room.player(player_id))
            .is_some_and(|p| p.is_disconnected());
        if !still_gone {
            tracing::debug!(room_code = %code, %player_id, "grace timer stale");
            return false;
        }
        tracing::info!(room_code = %code, %player_id, "grace period expired");
        self.depart_with_notice(code, player_id);
        true
    }

    /// Deletes every room older than the configured TTL, active or not.
    ///
    /// Returns the number of rooms removed.
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        let ttl = self.config.room_ttl;
        let expired: Vec<RoomCode> = self
            .store
            .codes()
            .into_iter()
            .filter(|code| self.store.get(code).is_some_and(|room| room.age(now) > ttl))
            .collect();
        for code in &expired {
            self.delete_room(code, "expired");
        }
        expired.len()
    }

    /// Replies with the server's wall-clock time in milliseconds.
    pub fn ping(&self, connection: ConnectionId, ack: Option<u64>) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        self.reply(connection, ack, Reply::Pong { timestamp });
    }

    // =====================================================================
    // Internals
    // =====================================================================

    /// Every (room, player) currently bound to `connection`.
    fn bindings_of(&self, connection: ConnectionId) -> Vec<(RoomCode, PlayerId)> {
        let mut bindings: Vec<_> = self
            .store
            .codes()
            .into_iter()
            .filter_map(|code| {
                let player_id = self.store.get(&code)?.player_on(connection)?.id.clone();
                Some((code, player_id))
            })
            .collect();
        bindings.sort_by(|a, b| a.0.cmp(&b.0));
        bindings
    }

    /// Leaves every room the connection is bound to, except `keep`, and
    /// drops any other channel subscription it still has.
    fn release_connection(&mut self, connection: ConnectionId, keep: Option<(&RoomCode, &PlayerId)>) {
        for (code, player_id) in self.bindings_of(connection) {
            if keep == Some((&code, &player_id)) {
                continue;
            }
            tracing::debug!(room_code = %code, %player_id, %connection, "releasing earlier binding");
            self.leave_room(connection, &code);
        }
        let stale: Vec<RoomCode> = self
            .sessions
            .get(connection)
            .map(|s| s.channels.iter().cloned().collect())
            .unwrap_or_default();
        for code in stale {
            if keep.map(|(c, _)| c) != Some(&code) {
                self.sessions.unsubscribe(connection, &code);
            }
        }
    }

    /// Removes a player, announces a host change or deletes the room,
    /// and broadcasts the new roster.
    fn depart(&mut self, code: &RoomCode, player_id: &PlayerId) -> Option<Departure> {
        let departure = self.store.get_mut(code)?.remove_player(player_id)?;
        match &departure.outcome {
            DepartureOutcome::Abandoned => {
                self.delete_room(code, "no human players left");
                return Some(departure);
            }
            DepartureOutcome::HostChanged(new_host_id) => {
                tracing::info!(room_code = %code, %new_host_id, "host changed");
                self.broadcast(
                    code,
                    ServerEvent::HostChanged {
                        new_host_id: new_host_id.clone(),
                    },
                );
            }
            DepartureOutcome::Stayed => {}
        }
        self.broadcast_roster(code);
        Some(departure)
    }

    /// [`depart`](Self::depart) followed by a `player_left` notice.
    fn depart_with_notice(&mut self, code: &RoomCode, player_id: &PlayerId) {
        let Some(departure) = self.depart(code, player_id) else {
            return;
        };
        tracing::info!(room_code = %code, %player_id, "player left");
        if departure.outcome != DepartureOutcome::Abandoned {
            self.broadcast(
                code,
                ServerEvent::PlayerLeft {
                    player_id: departure.player.id,
                    player_name: departure.player.name,
                },
            );
        }
    }

    fn delete_room(&mut self, code: &RoomCode, reason: &'static str) {
        if self.store.remove(code).is_some() {
            let listeners = self.sessions.close_channel(code);
            tracing::info!(room_code = %code, reason, listeners, "room deleted");
        }
    }

    /// The room, if `connection` is its host. Logs and returns `None`
    /// otherwise.
    fn host_room_mut(&mut self, connection: ConnectionId, code: &RoomCode, event: &'static str) -> Option<&mut Room> {
        match self.store.get_mut(code) {
            Some(room) if room.is_host_connection(connection) => Some(room),
            Some(_) => {
                ignored(event, code, "not the host");
                None
            }
            None => {
                ignored(event, code, "no such room");
                None
            }
        }
    }

    fn subscribe(&mut self, connection: ConnectionId, code: &RoomCode) {
        if let Err(err) = self.sessions.subscribe(connection, code) {
            tracing::warn!(room_code = %code, %err, "could not subscribe connection");
        }
    }

    fn reply(&self, connection: ConnectionId, ack: Option<u64>, reply: Reply) {
        if let Some(ack) = ack {
            self.sessions.deliver(
                &Recipient::Connection(connection),
                ServerMessage::Reply { ack, reply },
            );
        }
    }

    fn broadcast(&self, code: &RoomCode, event: ServerEvent) {
        self.sessions
            .deliver(&Recipient::Room(code.clone()), event.into());
    }

    fn broadcast_roster(&self, code: &RoomCode) {
        if let Some(room) = self.store.get(code) {
            self.broadcast(
                code,
                ServerEvent::PlayersUpdated {
                    players: room.players.clone(),
                },
            );
        }
    }
}

fn ignored(event: &'static str, code: &RoomCode, why: &'static str) {
    tracing::debug!(event, room_code = %code, why, "event ignored");
}
