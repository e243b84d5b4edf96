//! Connection registry - identity assignment, message routing, teardown
//!
//! These are the connection-facing faces of the session actor: the
//! handshake, the per-message dispatch through the anti-cheat gate, the
//! disconnect teardown, and the heartbeat sweep.

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::ws::protocol::{ClientMsg, PlayerId, PlayerInfo, ServerMsg};

use super::{ConnectError, GameServer};

impl GameServer {
    /// Handshake: reject a session token that already has a live
    /// connection, otherwise assign the next player id, snapshot the world
    /// for the newcomer, and announce them to everyone else.
    pub(crate) fn connect(
        &mut self,
        token: String,
        sender: UnboundedSender<ServerMsg>,
        now: u64,
    ) -> Result<PlayerId, ConnectError> {
        if self.players.token_in_use(&token) {
            warn!("Rejected duplicate session");
            return Err(ConnectError::DuplicateSession);
        }

        let spawn = self.town_spawn();
        let player_id = self.players.create(
            token,
            spawn,
            self.config.magazine_capacity,
            self.config.nonce_retention,
            now,
        );
        self.broadcaster.register(player_id, sender);

        let mut joined: Option<PlayerInfo> = None;
        let mut others: Vec<PlayerInfo> = Vec::new();
        for p in self.players.iter() {
            if p.id == player_id {
                joined = Some(p.info());
            } else {
                others.push(p.info());
            }
        }
        self.broadcaster.to_one(
            player_id,
            ServerMsg::Init {
                id: player_id,
                players: others,
            },
        );
        if let Some(player) = joined {
            self.broadcaster
                .to_others(player_id, ServerMsg::PlayerJoined { player });
        }
        self.broadcaster.to_all(ServerMsg::PlayerCount {
            count: self.players.len(),
        });

        info!(player_id = %player_id, player_count = self.players.len(), "Player connected");
        Ok(player_id)
    }

    /// Tear a player out of every registry. Safe to call twice; explicit
    /// leave, socket error, and heartbeat timeout all funnel through here.
    pub(crate) fn disconnect(&mut self, player_id: PlayerId) {
        let Some(_session) = self.players.remove(player_id) else {
            return;
        };

        // Whichever coordinator owns the player resolves the dependent
        // state: opponent wins a live duel, lobby scores drop the entry
        self.duels
            .disconnect(player_id, &mut self.players, &self.broadcaster);
        self.shootout
            .leave(player_id, &mut self.players, &self.broadcaster);
        self.bullets.remove_owned(player_id);
        self.broadcaster.unregister(player_id);

        self.broadcaster.to_all(ServerMsg::PlayerLeft { id: player_id });
        self.broadcaster.to_all(ServerMsg::PlayerCount {
            count: self.players.len(),
        });

        info!(player_id = %player_id, player_count = self.players.len(), "Player disconnected");
    }

    /// Route one inbound message: liveness, structural validation, the
    /// anti-cheat gate, then the mode-specific handler.
    pub(crate) fn dispatch(&mut self, player_id: PlayerId, msg: ClientMsg, now: u64) {
        let Some(session) = self.players.get_mut(player_id) else {
            debug!(player_id = %player_id, "Message from unknown player");
            return;
        };
        session.last_activity = now;

        if !structurally_valid(&msg) {
            // Protocol violation: logged and dropped, no reply
            warn!(player_id = %player_id, "Malformed message payload");
            return;
        }

        if let Err(reason) = self.gate.admit(session, &msg, now) {
            warn!(player_id = %player_id, %reason, "Message rejected by anti-cheat gate");
            self.broadcaster.to_one(
                player_id,
                ServerMsg::Error {
                    message: reason.to_string(),
                    fatal: false,
                },
            );
            return;
        }

        match msg {
            ClientMsg::Update {
                position,
                rotation,
                is_aiming,
                is_sprinting,
                ..
            } => self.handle_update(player_id, position, rotation, is_aiming, is_sprinting),

            ClientMsg::Shoot { bullet_data, .. } => self.handle_shoot(player_id, bullet_data, now),

            ClientMsg::PlayerHit {
                target_id,
                bullet_id,
                hit_data,
                ..
            } => self.handle_player_hit(player_id, target_id, bullet_id, hit_data, now),

            ClientMsg::Reload => self.handle_reload(player_id),

            ClientMsg::Ping => self.broadcaster.to_one(player_id, ServerMsg::Pong),

            ClientMsg::QuickDrawJoin { arena_index } => {
                self.duels
                    .join(player_id, arena_index, &mut self.players, &self.broadcaster)
            }

            ClientMsg::QuickDrawLeave { arena_index } => {
                self.duels
                    .leave(player_id, arena_index, &mut self.players, &self.broadcaster);
                // Forfeiting an active duel kills the leaver
                self.respawn_defeated(player_id);
            }

            ClientMsg::QuickDrawReady { arena_index } => self.duels.ready(
                player_id,
                arena_index,
                &self.broadcaster,
                &self.config,
                &self.events,
            ),

            ClientMsg::QuickDrawShoot {
                opponent_id,
                arena_index,
                hit_zone,
                ..
            } => self.handle_quick_draw_shoot(player_id, opponent_id, arena_index, hit_zone),

            ClientMsg::ProperShootoutJoin => self.shootout.join(
                player_id,
                &mut self.players,
                &self.broadcaster,
                &self.config,
                &mut self.rng,
            ),

            ClientMsg::ProperShootoutLeave => {
                self.shootout
                    .leave(player_id, &mut self.players, &self.broadcaster)
            }
        }
    }

    /// Heartbeat sweep: reap every connection silent longer than the
    /// timeout. Transport keep-alive pings are the socket task's job.
    pub(crate) fn handle_sweep(&mut self, now: u64) {
        let timeout = self.config.connection_timeout_ms;
        let stale: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|p| now.saturating_sub(p.last_activity) > timeout)
            .map(|p| p.id)
            .collect();

        for player_id in stale {
            warn!(player_id = %player_id, "Connection timed out, reaping");
            self.disconnect(player_id);
        }
    }
}

/// Structural validation ahead of the gate: every float a handler would
/// store or simulate must be finite.
fn structurally_valid(msg: &ClientMsg) -> bool {
    match msg {
        ClientMsg::Update {
            position, rotation, ..
        } => position.is_finite() && rotation.is_finite(),
        ClientMsg::Shoot { bullet_data, .. } => {
            bullet_data.position.is_finite() && bullet_data.direction.is_finite()
        }
        ClientMsg::PlayerHit { hit_data, .. } => hit_data.position.is_finite(),
        _ => true,
    }
}
