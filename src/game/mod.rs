//! Game simulation modules
//!
//! All mutable world state is owned by one `GameServer` actor. Inbound
//! messages, timer wakes, and connection lifecycle all arrive as
//! `ServerEvent`s on a single channel and are handled to completion one at
//! a time, so no handler ever observes a partial mutation.

pub mod anticheat;
pub mod broadcast;
pub mod bullets;
pub mod quickdraw;
mod registry;
pub mod session;
pub mod shootout;


use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::util::time::unix_millis;
use crate::ws::protocol::{
    BulletData, ClientMsg, HitData, HitZone, PlayerId, ServerMsg, Vec3,
};

use anticheat::AntiCheatGate;
use broadcast::Broadcaster;
use bullets::BulletSimulator;
use quickdraw::{DuelCoordinator, DuelPhaseKind};
use session::{PlayerMode, PlayerStore};
use shootout::ShootoutCoordinator;

/// Why a connection handshake was refused
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectError {
    #[error("Session token already in use by a live connection")]
    DuplicateSession,
}

/// Everything that can reach the session actor
pub enum ServerEvent {
    Connect {
        token: String,
        sender: UnboundedSender<ServerMsg>,
        reply: oneshot::Sender<Result<PlayerId, ConnectError>>,
    },
    Message {
        player_id: PlayerId,
        msg: ClientMsg,
    },
    /// Transport-level liveness (WebSocket ping/pong frames)
    Activity {
        player_id: PlayerId,
    },
    Disconnect {
        player_id: PlayerId,
    },
    /// A duel phase timer fired
    DuelPhase {
        duel_id: Uuid,
        kind: DuelPhaseKind,
    },
    /// A reload timer elapsed
    ReloadDone {
        player_id: PlayerId,
    },
    /// A respawn delay elapsed
    RespawnDue {
        player_id: PlayerId,
    },
}

/// Live counters exposed on the health endpoint
#[derive(Debug, Default)]
pub struct Gauges {
    pub players: AtomicUsize,
    pub duels: AtomicUsize,
    pub lobbies: AtomicUsize,
}

/// Cheap handle for talking to the session actor
#[derive(Clone)]
pub struct ServerHandle {
    pub events: UnboundedSender<ServerEvent>,
    pub gauges: Arc<Gauges>,
}

/// The authoritative session server
pub struct GameServer {
    pub(crate) config: Arc<Config>,
    pub(crate) events: UnboundedSender<ServerEvent>,
    pub(crate) players: PlayerStore,
    pub(crate) gate: AntiCheatGate,
    pub(crate) bullets: BulletSimulator,
    pub(crate) duels: DuelCoordinator,
    pub(crate) shootout: ShootoutCoordinator,
    pub(crate) broadcaster: Broadcaster,
    pub(crate) rng: ChaCha8Rng,
    gauges: Arc<Gauges>,
}

impl GameServer {
    /// Build the actor. The returned receiver is passed back into `run`;
    /// the handle is shared with the transport layer.
    pub fn new(config: Arc<Config>) -> (Self, UnboundedReceiver<ServerEvent>, ServerHandle) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let gauges = Arc::new(Gauges::default());
        let handle = ServerHandle {
            events: events.clone(),
            gauges: gauges.clone(),
        };
        let server = Self {
            gate: AntiCheatGate::new(&config),
            bullets: BulletSimulator::new(config.clone()),
            duels: DuelCoordinator::new(config.arena_count),
            shootout: ShootoutCoordinator::new(),
            broadcaster: Broadcaster::new(),
            players: PlayerStore::new(),
            rng: ChaCha8Rng::from_entropy(),
            events,
            config,
            gauges,
        };
        (server, events_rx, handle)
    }

    /// Run the actor: one event at a time, plus the physics tick and the
    /// heartbeat sweep as regular units of work on the same loop.
    pub async fn run(mut self, mut events: UnboundedReceiver<ServerEvent>) {
        let mut tick = interval(Duration::from_millis(self.config.physics_tick_ms.max(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut sweep = interval(Duration::from_millis(self.config.heartbeat_interval_ms.max(1)));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => self.handle_tick(unix_millis()),
                _ = sweep.tick() => self.handle_sweep(unix_millis()),
                ev = events.recv() => match ev {
                    Some(ev) => self.handle_event(ev),
                    None => break,
                },
            }
            self.update_gauges();
        }
    }

    pub(crate) fn handle_event(&mut self, ev: ServerEvent) {
        let now = unix_millis();
        match ev {
            ServerEvent::Connect {
                token,
                sender,
                reply,
            } => {
                let result = self.connect(token, sender, now);
                let _ = reply.send(result);
            }
            ServerEvent::Message { player_id, msg } => self.dispatch(player_id, msg, now),
            ServerEvent::Activity { player_id } => {
                if let Some(session) = self.players.get_mut(player_id) {
                    session.last_activity = now;
                }
            }
            ServerEvent::Disconnect { player_id } => self.disconnect(player_id),
            ServerEvent::DuelPhase { duel_id, kind } => self.duels.phase(
                duel_id,
                kind,
                &self.broadcaster,
                &self.config,
                &self.events,
                &mut self.rng,
            ),
            ServerEvent::ReloadDone { player_id } => self.handle_reload_done(player_id),
            ServerEvent::RespawnDue { player_id } => self.handle_respawn_due(player_id),
        }
    }

    /// Advance the bullet simulation and fan out the results
    pub(crate) fn handle_tick(&mut self, now: u64) {
        let report = self.bullets.tick(now, &mut self.players);

        for impact in &report.impacts {
            self.broadcaster.to_all(ServerMsg::BulletImpact {
                bullet_id: impact.bullet_id,
                hit_type: impact.hit_type,
                target_id: impact.target_id,
                position: impact.position,
                hit_zone: impact.hit_zone,
            });
        }

        for damage in &report.damages {
            self.broadcaster.to_one(
                damage.victim,
                ServerMsg::Hit {
                    source_id: damage.shooter,
                    hit_data: HitData {
                        position: damage.position,
                        hit_zone: damage.hit_zone,
                        damage: None,
                    },
                    health: damage.health_after,
                    hit_zone: damage.hit_zone,
                },
            );
        }

        for damage in report.damages {
            if damage.died {
                self.on_death(damage.victim, Some(damage.shooter));
            }
        }
    }

    // ------------------------------------------------------------------
    // Gameplay message handlers (gate has already admitted the message)
    // ------------------------------------------------------------------

    pub(crate) fn handle_update(
        &mut self,
        player_id: PlayerId,
        position: Vec3,
        rotation: f32,
        is_aiming: bool,
        is_sprinting: bool,
    ) {
        let Some(session) = self.players.get_mut(player_id) else {
            return;
        };

        // Clamp to the bounds of whatever map the player is on; duels use
        // their own arena space and skip the clamp
        let extent = match session.mode {
            PlayerMode::Duel { .. } => None,
            PlayerMode::Shootout { .. } => Some(self.config.shootout_half_extent),
            _ => Some(self.config.town_half_extent),
        };
        let mut accepted = position;
        if let Some(extent) = extent {
            accepted.x = accepted.x.clamp(-extent, extent);
            accepted.z = accepted.z.clamp(-extent, extent);
        }

        session.position = accepted;
        session.rotation = rotation;
        session.is_aiming = is_aiming;
        session.is_sprinting = is_sprinting;
        let info = session.info();

        if accepted != position {
            self.broadcaster.to_one(
                player_id,
                ServerMsg::PositionCorrection { position: accepted },
            );
        }
        self.broadcaster
            .to_others(player_id, ServerMsg::PlayerUpdate { player: info });
    }

    pub(crate) fn handle_shoot(&mut self, player_id: PlayerId, bullet_data: BulletData, now: u64) {
        // Direction validity was established by the gate
        let Some(direction) = bullet_data.direction.normalized() else {
            return;
        };
        let Some(session) = self.players.get_mut(player_id) else {
            return;
        };
        session.ammo = session.ammo.saturating_sub(1);

        let bullet_id = self
            .bullets
            .spawn(player_id, bullet_data.position, direction, now);

        self.broadcaster.to_others(
            player_id,
            ServerMsg::PlayerShoot {
                id: player_id,
                bullet_id,
                bullet_data: BulletData {
                    position: bullet_data.position,
                    direction,
                },
            },
        );
    }

    /// Client-reported hit, accepted only when a matching server-side
    /// bullet is inside the target's hitbox
    pub(crate) fn handle_player_hit(
        &mut self,
        player_id: PlayerId,
        target_id: PlayerId,
        bullet_id: Option<Uuid>,
        hit_data: HitData,
        now: u64,
    ) {
        let attacker_mode = match self.players.get(player_id) {
            Some(s) => s.mode,
            None => return,
        };
        let Some(target) = self.players.get(target_id) else {
            debug!(player_id = %player_id, target_id = %target_id, "Hit claim for unknown target");
            return;
        };
        if !target.alive() || !bullets::same_context(attacker_mode, target.mode) {
            debug!(player_id = %player_id, target_id = %target_id, "Hit claim out of context");
            return;
        }

        let Some(confirmed) = self
            .bullets
            .validate_claim(player_id, bullet_id, target, now)
        else {
            warn!(player_id = %player_id, target_id = %target_id, "Hit claim without matching bullet");
            return;
        };

        let damage = self.bullets.damage_for_zone(hit_data.hit_zone);
        let Some(target) = self.players.get_mut(target_id) else {
            return;
        };
        let (health, died) = target.apply_damage(damage);

        self.broadcaster.to_one(
            target_id,
            ServerMsg::Hit {
                source_id: player_id,
                hit_data: HitData {
                    position: hit_data.position,
                    hit_zone: hit_data.hit_zone,
                    damage: None,
                },
                health,
                hit_zone: hit_data.hit_zone,
            },
        );
        self.broadcaster.to_all(ServerMsg::BulletImpact {
            bullet_id: confirmed,
            hit_type: crate::ws::protocol::HitType::Player,
            target_id: Some(target_id),
            position: hit_data.position,
            hit_zone: Some(hit_data.hit_zone),
        });

        if died {
            self.on_death(target_id, Some(player_id));
        }
    }

    pub(crate) fn handle_reload(&mut self, player_id: PlayerId) {
        let Some(session) = self.players.get_mut(player_id) else {
            return;
        };
        session.reloading = true;
        let info = session.info();
        self.broadcaster
            .to_others(player_id, ServerMsg::PlayerUpdate { player: info });

        let tx = self.events.clone();
        let delay = Duration::from_millis(self.config.reload_duration_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ServerEvent::ReloadDone { player_id });
        });
    }

    /// Reload timer elapsed. Guarded by the still-reloading flag so an
    /// overlapping or cancelled reload cannot double-apply.
    pub(crate) fn handle_reload_done(&mut self, player_id: PlayerId) {
        let Some(session) = self.players.get_mut(player_id) else {
            return;
        };
        if !session.reloading {
            return;
        }
        session.reloading = false;
        session.ammo = session.magazine_capacity;
        self.broadcaster.to_one(
            player_id,
            ServerMsg::ReloadComplete {
                ammo: session.ammo,
            },
        );
    }

    pub(crate) fn handle_quick_draw_shoot(
        &mut self,
        player_id: PlayerId,
        opponent_id: PlayerId,
        arena_index: usize,
        hit_zone: HitZone,
    ) {
        self.duels.shoot(
            player_id,
            opponent_id,
            arena_index,
            hit_zone,
            &mut self.players,
            &self.broadcaster,
            &self.config,
        );
        self.respawn_defeated(opponent_id);
    }

    /// A decided duel leaves its loser dead with no mode, whether they
    /// lost the draw or forfeited; bring them back to town after the
    /// respawn delay.
    pub(crate) fn respawn_defeated(&mut self, player_id: PlayerId) {
        if let Some(session) = self.players.get(player_id) {
            if session.health == 0
                && session.mode == PlayerMode::None
                && !session.pending_respawn
            {
                self.schedule_respawn(player_id);
            }
        }
    }

    /// A player's health reached zero outside the quick-draw shot path
    pub(crate) fn on_death(&mut self, victim: PlayerId, killer: Option<PlayerId>) {
        let mode = match self.players.get(victim) {
            Some(s) => s.mode,
            None => return,
        };
        match mode {
            PlayerMode::Duel { .. } => {
                self.duels
                    .resolve_death(victim, &mut self.players, &self.broadcaster);
            }
            PlayerMode::Shootout { lobby_id } => {
                if let Some(killer) = killer.filter(|&k| k != victim) {
                    self.shootout.record_kill(
                        killer,
                        victim,
                        lobby_id,
                        &mut self.players,
                        &self.broadcaster,
                        &self.config,
                    );
                }
            }
            PlayerMode::None | PlayerMode::Queued { .. } => {}
        }
        self.schedule_respawn(victim);
    }

    pub(crate) fn schedule_respawn(&mut self, player_id: PlayerId) {
        let Some(session) = self.players.get_mut(player_id) else {
            return;
        };
        if session.pending_respawn {
            return;
        }
        session.pending_respawn = true;

        let tx = self.events.clone();
        let delay = Duration::from_millis(self.config.respawn_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ServerEvent::RespawnDue { player_id });
        });
    }

    /// Respawn delay elapsed; a vanished player makes this a no-op
    pub(crate) fn handle_respawn_due(&mut self, player_id: PlayerId) {
        let spawn = {
            let Some(session) = self.players.get(player_id) else {
                return;
            };
            if !session.pending_respawn {
                return;
            }
            match session.mode {
                PlayerMode::Shootout { .. } => {
                    shootout::random_spawn(self.config.shootout_half_extent, &mut self.rng)
                }
                _ => self.town_spawn(),
            }
        };

        let Some(session) = self.players.get_mut(player_id) else {
            return;
        };
        session.restore(spawn);
        let msg = ServerMsg::Respawn {
            position: spawn,
            health: session.health,
            bullets: session.ammo,
        };
        let info = session.info();
        self.broadcaster.to_one(player_id, msg);
        self.broadcaster
            .to_others(player_id, ServerMsg::PlayerUpdate { player: info });
    }

    pub(crate) fn town_spawn(&mut self) -> Vec3 {
        let spread = (self.config.town_half_extent * 0.25).max(1.0);
        Vec3::new(
            self.rng.gen_range(-spread..spread),
            0.0,
            self.rng.gen_range(-spread..spread),
        )
    }

    fn update_gauges(&self) {
        self.gauges
            .players
            .store(self.players.len(), Ordering::Relaxed);
        self.gauges
            .duels
            .store(self.duels.active_duels(), Ordering::Relaxed);
        self.gauges
            .lobbies
            .store(self.shootout.active_lobbies(), Ordering::Relaxed);
    }
}
