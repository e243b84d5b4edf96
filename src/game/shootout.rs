//! Proper Shootout - persistent free-for-all lobbies with kill scoring

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::config::Config;
use crate::ws::protocol::{PlayerId, ScoreEntry, ServerMsg, Vec3};

use super::broadcast::Broadcaster;
use super::session::{PlayerMode, PlayerStore};

/// One persistent free-for-all lobby
#[derive(Debug, Default)]
pub struct Lobby {
    pub members: HashSet<PlayerId>,
    pub kills: HashMap<PlayerId, u32>,
}

impl Lobby {
    /// Scoreboard sorted by kills descending, then by player id for a
    /// stable order
    fn scores(&self) -> Vec<ScoreEntry> {
        let mut entries: Vec<ScoreEntry> = self
            .members
            .iter()
            .map(|&player_id| ScoreEntry {
                player_id,
                kills: self.kills.get(&player_id).copied().unwrap_or(0),
            })
            .collect();
        entries.sort_by(|a, b| b.kills.cmp(&a.kills).then(a.player_id.cmp(&b.player_id)));
        entries
    }
}

/// Manages every shootout lobby: join placement, scoring, win detection
pub struct ShootoutCoordinator {
    // BTreeMap so capacity scans fill the oldest lobby first
    lobbies: BTreeMap<u64, Lobby>,
    next_id: u64,
}

impl ShootoutCoordinator {
    pub fn new() -> Self {
        Self {
            lobbies: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn active_lobbies(&self) -> usize {
        self.lobbies.len()
    }

    pub fn lobby(&self, id: u64) -> Option<&Lobby> {
        self.lobbies.get(&id)
    }

    /// Place the player in any lobby with spare capacity, or a fresh one
    pub fn join(
        &mut self,
        player: PlayerId,
        players: &mut PlayerStore,
        broadcaster: &Broadcaster,
        config: &Arc<Config>,
        rng: &mut ChaCha8Rng,
    ) {
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

        let lobby_id = match self
            .lobbies
            .iter()
            .find(|(_, l)| l.members.len() < config.shootout_capacity)
            .map(|(&id, _)| id)
        {
            Some(id) => id,
            None => {
                self.next_id += 1;
                self.lobbies.insert(self.next_id, Lobby::default());
                self.next_id
            }
        };

        let spawn = random_spawn(config.shootout_half_extent, rng);
        session.mode = PlayerMode::Shootout { lobby_id };
        session.restore(spawn);

        let Some(lobby) = self.lobbies.get_mut(&lobby_id) else {
            return;
        };
        lobby.members.insert(player);
        lobby.kills.insert(player, 0);
        let scores = lobby.scores();

        broadcaster.to_one(
            player,
            ServerMsg::ProperShootoutJoin {
                lobby_id,
                position: spawn,
                scores: scores.clone(),
            },
        );
        broadcaster.to_lobby(
            lobby.members.iter().copied(),
            ServerMsg::ProperShootoutPlayerJoin {
                player_id: player,
                scores,
            },
            Some(player),
        );

        info!(player_id = %player, lobby_id, "Player joined shootout");
    }

    /// Remove the player; an emptied lobby is discarded entirely
    pub fn leave(&mut self, player: PlayerId, players: &mut PlayerStore, broadcaster: &Broadcaster) {
        let Some(lobby_id) = self.lobby_of(player) else {
            return;
        };
        if let Some(session) = players.get_mut(player) {
            session.mode = PlayerMode::None;
        }

        let Some(lobby) = self.lobbies.get_mut(&lobby_id) else {
            return;
        };
        lobby.members.remove(&player);
        lobby.kills.remove(&player);

        if lobby.members.is_empty() {
            self.lobbies.remove(&lobby_id);
            info!(lobby_id, "Empty shootout lobby reclaimed");
            return;
        }

        let scores = lobby.scores();
        broadcaster.to_lobby(
            lobby.members.iter().copied(),
            ServerMsg::ProperShootoutPlayerLeave {
                player_id: player,
                scores,
            },
            None,
        );
    }

    /// Credit a kill. Reaching the win threshold ends the match: members
    /// are notified, evicted, and the lobby restarts empty under its id.
    pub fn record_kill(
        &mut self,
        killer: PlayerId,
        victim: PlayerId,
        lobby_id: u64,
        players: &mut PlayerStore,
        broadcaster: &Broadcaster,
        config: &Arc<Config>,
    ) {
        let Some(lobby) = self.lobbies.get_mut(&lobby_id) else {
            return;
        };
        if !lobby.members.contains(&killer) || !lobby.members.contains(&victim) {
            return;
        }

        let kills = lobby.kills.entry(killer).or_insert(0);
        *kills += 1;
        let winner = *kills >= config.shootout_win_score;
        let scores = lobby.scores();

        broadcaster.to_lobby(
            lobby.members.iter().copied(),
            ServerMsg::ProperShootoutKill {
                killer_id: killer,
                victim_id: victim,
                scores: scores.clone(),
            },
            None,
        );

        if winner {
            let members: Vec<PlayerId> = lobby.members.iter().copied().collect();
            broadcaster.to_lobby(
                members.iter().copied(),
                ServerMsg::ProperShootoutEnd {
                    winner_id: killer,
                    scores,
                },
                None,
            );
            for member in members {
                if let Some(session) = players.get_mut(member) {
                    session.mode = PlayerMode::None;
                }
            }
            // Same id, fresh state; evicted members must rejoin
            self.lobbies.insert(lobby_id, Lobby::default());
            info!(lobby_id, winner_id = %killer, "Shootout won, lobby reset");
        }
    }

    /// Lobby currently containing `player`
    pub fn lobby_of(&self, player: PlayerId) -> Option<u64> {
        self.lobbies
            .iter()
            .find(|(_, l)| l.members.contains(&player))
            .map(|(&id, _)| id)
    }
}

impl Default for ShootoutCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Random spawn inside the square shootout map
pub fn random_spawn(half_extent: f32, rng: &mut ChaCha8Rng) -> Vec3 {
    let margin = half_extent * 0.9;
    Vec3::new(
        rng.gen_range(-margin..margin),
        0.0,
        rng.gen_range(-margin..margin),
    )
}
