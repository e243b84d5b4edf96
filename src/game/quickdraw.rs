//! Quick Draw duels - per-arena queues and the duel state machine

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::ws::protocol::{HitData, HitZone, PlayerId, ServerMsg, SpawnSide, Vec3};

use super::broadcast::Broadcaster;
use super::session::{PlayerMode, PlayerStore};
use super::ServerEvent;

/// Duel lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuelState {
    /// Created; waiting on both ready signals
    Starting,
    /// Both ready; ready cue shown, countdown cue pending
    Ready,
    /// Countdown cue shown; draw signal armed on a randomized timer
    Countdown,
    /// Draw signal fired; shots are live
    Draw,
}

/// Which phase timer fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuelPhaseKind {
    Countdown,
    Draw,
}

/// One active duel in an arena
pub struct Duel {
    pub id: Uuid,
    pub players: [PlayerId; 2],
    pub state: DuelState,
    pub ready: [bool; 2],
    /// Pending phase timer; aborted on early teardown so a stale draw
    /// signal can never fire into a discarded duel
    phase_timer: Option<JoinHandle<()>>,
}

impl Duel {
    fn opponent_of(&self, player: PlayerId) -> Option<PlayerId> {
        if self.players[0] == player {
            Some(self.players[1])
        } else if self.players[1] == player {
            Some(self.players[0])
        } else {
            None
        }
    }
}

/// One arena: a FIFO queue plus at most one active duel
#[derive(Default)]
struct Arena {
    queue: VecDeque<PlayerId>,
    active: Option<Duel>,
}

/// Drives matchmaking and the ready -> countdown -> draw -> ended machine
/// for a fixed number of independent arenas
pub struct DuelCoordinator {
    arenas: Vec<Arena>,
}

impl DuelCoordinator {
    pub fn new(arena_count: usize) -> Self {
        Self {
            arenas: (0..arena_count).map(|_| Arena::default()).collect(),
        }
    }

    pub fn active_duels(&self) -> usize {
        self.arenas.iter().filter(|a| a.active.is_some()).count()
    }

    /// State of the active duel containing `player`, if any
    pub fn duel_state_of(&self, player: PlayerId) -> Option<DuelState> {
        self.arenas
            .iter()
            .filter_map(|a| a.active.as_ref())
            .find(|d| d.opponent_of(player).is_some())
            .map(|d| d.state)
    }

    pub fn queue_len(&self, arena_index: usize) -> usize {
        self.arenas
            .get(arena_index)
            .map(|a| a.queue.len())
            .unwrap_or(0)
    }

    /// Join an arena queue. Rejected while the player is in any mode.
    pub fn join(
        &mut self,
        player: PlayerId,
        arena_index: usize,
        players: &mut PlayerStore,
        broadcaster: &Broadcaster,
    ) {
        if arena_index >= self.arenas.len() {
            debug!(player_id = %player, arena_index, "Join for nonexistent arena");
            return;
        }
        let Some(session) = players.get_mut(player) else {
            return;
        };
        if session.mode != PlayerMode::None {
            broadcaster.to_one(
                player,
                ServerMsg::Error {
                    message: "Already in a game mode".to_string(),
                    fatal: false,
                },
            );
            return;
        }

        session.mode = PlayerMode::Queued { arena: arena_index };
        self.arenas[arena_index].queue.push_back(player);
        broadcaster.to_one(player, ServerMsg::QuickDrawJoin { arena_index });
        info!(player_id = %player, arena_index, "Player queued for quick draw");

        self.try_start(arena_index, players, broadcaster);
    }

    /// Leave the queue, or forfeit an active duel
    pub fn leave(
        &mut self,
        player: PlayerId,
        arena_index: usize,
        players: &mut PlayerStore,
        broadcaster: &Broadcaster,
    ) {
        if arena_index >= self.arenas.len() {
            return;
        }

        let arena = &mut self.arenas[arena_index];
        if let Some(pos) = arena.queue.iter().position(|&p| p == player) {
            arena.queue.remove(pos);
            if let Some(session) = players.get_mut(player) {
                session.mode = PlayerMode::None;
            }
            return;
        }

        let in_duel = arena
            .active
            .as_ref()
            .and_then(|d| d.opponent_of(player))
            .is_some();
        if in_duel {
            let winner = self.arenas[arena_index]
                .active
                .as_ref()
                .and_then(|d| d.opponent_of(player))
                .filter(|&opp| players.contains(opp));
            self.end_duel(arena_index, winner, players, broadcaster);
        }
    }

    /// Ready signal from one duelist
    pub fn ready(
        &mut self,
        player: PlayerId,
        arena_index: usize,
        broadcaster: &Broadcaster,
        config: &Arc<Config>,
        events: &UnboundedSender<ServerEvent>,
    ) {
        if arena_index >= self.arenas.len() {
            return;
        }
        let Some(duel) = self.arenas[arena_index].active.as_mut() else {
            return;
        };
        if duel.state != DuelState::Starting {
            return;
        }
        let Some(slot) = duel.players.iter().position(|&p| p == player) else {
            debug!(player_id = %player, arena_index, "Ready from non-duelist");
            return;
        };
        duel.ready[slot] = true;

        if duel.ready == [true, true] {
            duel.state = DuelState::Ready;
            for &p in &duel.players {
                broadcaster.to_one(p, ServerMsg::QuickDrawReady);
            }
            let duel_id = duel.id;
            let tx = events.clone();
            let delay = Duration::from_millis(config.duel_cue_delay_ms);
            duel.phase_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(ServerEvent::DuelPhase {
                    duel_id,
                    kind: DuelPhaseKind::Countdown,
                });
            }));
        }
    }

    /// A phase timer fired. Stale timers (wrong duel, wrong state) are
    /// discarded without touching anything.
    pub fn phase(
        &mut self,
        duel_id: Uuid,
        kind: DuelPhaseKind,
        broadcaster: &Broadcaster,
        config: &Arc<Config>,
        events: &UnboundedSender<ServerEvent>,
        rng: &mut ChaCha8Rng,
    ) {
        let Some(duel) = self
            .arenas
            .iter_mut()
            .filter_map(|a| a.active.as_mut())
            .find(|d| d.id == duel_id)
        else {
            debug!(duel_id = %duel_id, "Phase timer for ended duel, ignoring");
            return;
        };

        match (kind, duel.state) {
            (DuelPhaseKind::Countdown, DuelState::Ready) => {
                duel.state = DuelState::Countdown;
                for &p in &duel.players {
                    broadcaster.to_one(p, ServerMsg::QuickDrawCountdown);
                }
                // Uniformly random draw moment so it cannot be timed
                let wait = rng.gen_range(config.draw_min_ms..=config.draw_max_ms);
                let tx = events.clone();
                duel.phase_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(wait)).await;
                    let _ = tx.send(ServerEvent::DuelPhase {
                        duel_id,
                        kind: DuelPhaseKind::Draw,
                    });
                }));
            }
            (DuelPhaseKind::Draw, DuelState::Countdown) => {
                duel.state = DuelState::Draw;
                duel.phase_timer = None;
                for &p in &duel.players {
                    broadcaster.to_one(p, ServerMsg::QuickDrawDraw);
                }
                info!(duel_id = %duel_id, "Draw!");
            }
            (kind, state) => {
                debug!(duel_id = %duel_id, ?kind, ?state, "Stale phase timer, ignoring");
            }
        }
    }

    /// A shot during a duel. Only admissible in the draw state against the
    /// correct opponent.
    pub fn shoot(
        &mut self,
        shooter: PlayerId,
        opponent_id: PlayerId,
        arena_index: usize,
        hit_zone: HitZone,
        players: &mut PlayerStore,
        broadcaster: &Broadcaster,
        config: &Arc<Config>,
    ) {
        if arena_index >= self.arenas.len() {
            return;
        }
        let Some(duel) = self.arenas[arena_index].active.as_ref() else {
            return;
        };
        let Some(actual_opponent) = duel.opponent_of(shooter) else {
            debug!(player_id = %shooter, arena_index, "Duel shot from non-duelist");
            return;
        };
        if actual_opponent != opponent_id {
            debug!(player_id = %shooter, "Duel shot against mismatched opponent");
            return;
        }
        if duel.state != DuelState::Draw {
            broadcaster.to_one(
                shooter,
                ServerMsg::Error {
                    message: "Not in draw state".to_string(),
                    fatal: false,
                },
            );
            return;
        }

        let damage = match hit_zone {
            HitZone::Head => config.damage_head,
            HitZone::Body => config.damage_body,
            HitZone::Limbs => config.damage_limbs,
        };

        let Some(target) = players.get_mut(opponent_id) else {
            return;
        };
        let (health, died) = target.apply_damage(damage);
        let position = target.position;
        broadcaster.to_one(
            opponent_id,
            ServerMsg::Hit {
                source_id: shooter,
                hit_data: HitData {
                    position,
                    hit_zone,
                    damage: None,
                },
                health,
                hit_zone,
            },
        );

        if died {
            self.end_duel(arena_index, Some(shooter), players, broadcaster);
        }
    }

    /// A duelist died to a simulated bullet; the opponent takes the win
    pub fn resolve_death(
        &mut self,
        victim: PlayerId,
        players: &mut PlayerStore,
        broadcaster: &Broadcaster,
    ) {
        for arena_index in 0..self.arenas.len() {
            let winner = self.arenas[arena_index]
                .active
                .as_ref()
                .filter(|d| d.opponent_of(victim).is_some())
                .and_then(|d| d.opponent_of(victim))
                .filter(|&opp| players.contains(opp));
            let involved = self.arenas[arena_index]
                .active
                .as_ref()
                .map(|d| d.opponent_of(victim).is_some())
                .unwrap_or(false);
            if involved {
                self.end_duel(arena_index, winner, players, broadcaster);
                return;
            }
        }
    }

    /// Tear a disconnected player out of every queue and any active duel
    pub fn disconnect(
        &mut self,
        player: PlayerId,
        players: &mut PlayerStore,
        broadcaster: &Broadcaster,
    ) {
        for arena in self.arenas.iter_mut() {
            arena.queue.retain(|&p| p != player);
        }

        let involved: Vec<usize> = self
            .arenas
            .iter()
            .enumerate()
            .filter(|(_, a)| {
                a.active
                    .as_ref()
                    .map(|d| d.opponent_of(player).is_some())
                    .unwrap_or(false)
            })
            .map(|(i, _)| i)
            .collect();

        for arena_index in involved {
            let winner = self.arenas[arena_index]
                .active
                .as_ref()
                .and_then(|d| d.opponent_of(player))
                .filter(|&opp| players.contains(opp));
            self.end_duel(arena_index, winner, players, broadcaster);
        }
    }

    /// Dequeue the two longest-waiting players and start a duel, skipping
    /// entries that disconnected while queued
    fn try_start(
        &mut self,
        arena_index: usize,
        players: &mut PlayerStore,
        broadcaster: &Broadcaster,
    ) {
        loop {
            let arena = &mut self.arenas[arena_index];
            if arena.active.is_some() || arena.queue.len() < 2 {
                return;
            }
            let Some(first) = arena.queue.pop_front() else {
                return;
            };
            let Some(second) = arena.queue.pop_front() else {
                return;
            };
            if !players.contains(first) {
                arena.queue.push_front(second);
                continue;
            }
            if !players.contains(second) {
                arena.queue.push_front(first);
                continue;
            }

            let duel_id = Uuid::new_v4();
            let pair = [(first, SpawnSide::Left), (second, SpawnSide::Right)];
            for (player, side) in pair {
                if let Some(session) = players.get_mut(player) {
                    session.mode = PlayerMode::Duel { duel_id };
                    session.restore(arena_spawn(arena_index, side));
                }
            }
            for (player, side) in pair {
                let opponent = if player == first { second } else { first };
                broadcaster.to_one(
                    player,
                    ServerMsg::QuickDrawMatch {
                        opponent_id: opponent,
                        position: side,
                        arena_index,
                    },
                );
            }

            self.arenas[arena_index].active = Some(Duel {
                id: duel_id,
                players: [first, second],
                state: DuelState::Starting,
                ready: [false, false],
                phase_timer: None,
            });

            info!(
                duel_id = %duel_id,
                arena_index,
                player_a = %first,
                player_b = %second,
                "Duel created"
            );
            return;
        }
    }

    /// End the arena's duel: cancel the pending timer, clear both players'
    /// duel membership, force the loser to zero health, notify both, and
    /// let the queue start the next pairing.
    fn end_duel(
        &mut self,
        arena_index: usize,
        winner: Option<PlayerId>,
        players: &mut PlayerStore,
        broadcaster: &Broadcaster,
    ) {
        let Some(mut duel) = self.arenas[arena_index].active.take() else {
            return;
        };
        if let Some(timer) = duel.phase_timer.take() {
            timer.abort();
        }

        for &player in &duel.players {
            if let Some(session) = players.get_mut(player) {
                session.mode = PlayerMode::None;
                if winner.is_some() && winner != Some(player) {
                    session.health = 0;
                }
            }
            broadcaster.to_one(player, ServerMsg::QuickDrawEnd { winner_id: winner });
        }

        info!(
            duel_id = %duel.id,
            arena_index,
            winner = ?winner,
            "Duel ended"
        );

        self.try_start(arena_index, players, broadcaster);
    }
}

fn arena_spawn(arena_index: usize, side: SpawnSide) -> Vec3 {
    // Arenas sit in a row beyond the town boundary, duelists facing off
    let center_x = arena_index as f32 * 120.0;
    let offset = match side {
        SpawnSide::Left => -15.0,
        SpawnSide::Right => 15.0,
    };
    Vec3::new(center_x + offset, 0.0, 150.0)
}
