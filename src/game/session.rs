//! Player sessions and the canonical player store

use std::collections::{HashMap, HashSet, VecDeque};

use uuid::Uuid;

use crate::ws::protocol::{PlayerId, PlayerInfo, Vec3};

/// Which game mode currently owns a player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerMode {
    None,
    Queued { arena: usize },
    Duel { duel_id: Uuid },
    Shootout { lobby_id: u64 },
}

/// Bounded set of consumed single-use nonces.
///
/// Oldest entries are evicted once the bound is exceeded, so a determined
/// replayer is still rejected within the retention window while memory per
/// player stays fixed.
#[derive(Debug)]
pub struct NonceSet {
    seen: HashSet<String>,
    order: VecDeque<String>,
    cap: usize,
}

impl NonceSet {
    pub fn new(cap: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            cap,
        }
    }

    /// Consume a nonce; returns false if it was already used
    pub fn consume(&mut self, nonce: &str) -> bool {
        if self.seen.contains(nonce) {
            return false;
        }
        self.seen.insert(nonce.to_string());
        self.order.push_back(nonce.to_string());
        while self.order.len() > self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }
}

/// Canonical mutable record for one connected player
#[derive(Debug)]
pub struct PlayerSession {
    pub id: PlayerId,
    pub session_token: String,

    pub position: Vec3,
    pub rotation: f32,
    pub health: i32,
    pub ammo: u32,
    pub magazine_capacity: u32,

    /// Server-authoritative reload timer in progress
    pub reloading: bool,
    /// Dead, waiting on the respawn timer
    pub pending_respawn: bool,

    pub is_aiming: bool,
    pub is_sprinting: bool,

    pub mode: PlayerMode,
    pub last_activity: u64,

    // Anti-cheat bookkeeping
    pub last_sequence: u64,
    pub nonces: NonceSet,
    pub last_update_at: u64,
    pub last_shot_at: u64,
}

impl PlayerSession {
    pub fn new(
        id: PlayerId,
        session_token: String,
        spawn: Vec3,
        magazine_capacity: u32,
        nonce_retention: usize,
        now: u64,
    ) -> Self {
        Self {
            id,
            session_token,
            position: spawn,
            rotation: 0.0,
            health: 100,
            ammo: magazine_capacity,
            magazine_capacity,
            reloading: false,
            pending_respawn: false,
            is_aiming: false,
            is_sprinting: false,
            mode: PlayerMode::None,
            last_activity: now,
            last_sequence: 0,
            nonces: NonceSet::new(nonce_retention),
            last_update_at: 0,
            last_shot_at: 0,
        }
    }

    pub fn alive(&self) -> bool {
        self.health > 0 && !self.pending_respawn
    }

    /// Reduce health by `damage`, floored at zero. Returns (new_health, died).
    pub fn apply_damage(&mut self, damage: i32) -> (i32, bool) {
        self.health = (self.health - damage).max(0);
        (self.health, self.health == 0)
    }

    /// Restore to full health and a full magazine at `spawn`
    pub fn restore(&mut self, spawn: Vec3) {
        self.position = spawn;
        self.health = 100;
        self.ammo = self.magazine_capacity;
        self.reloading = false;
        self.pending_respawn = false;
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id,
            position: self.position,
            rotation: self.rotation,
            health: self.health,
            is_aiming: self.is_aiming,
            is_reloading: self.reloading,
            is_sprinting: self.is_sprinting,
        }
    }
}

/// Exclusive owner of all `PlayerSession` records.
///
/// Coordinators hold bare `PlayerId`s and must come back through here for
/// live data; a missing lookup is a normal outcome, never a crash.
#[derive(Debug, Default)]
pub struct PlayerStore {
    players: HashMap<PlayerId, PlayerSession>,
    tokens: HashMap<String, PlayerId>,
    next_id: u64,
}

impl PlayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live connection already holds this session token
    pub fn token_in_use(&self, token: &str) -> bool {
        self.tokens.contains_key(token)
    }

    /// Create a session under a fresh monotonically increasing id
    pub fn create(
        &mut self,
        token: String,
        spawn: Vec3,
        magazine_capacity: u32,
        nonce_retention: usize,
        now: u64,
    ) -> PlayerId {
        self.next_id += 1;
        let id = PlayerId(self.next_id);
        self.tokens.insert(token.clone(), id);
        self.players.insert(
            id,
            PlayerSession::new(id, token, spawn, magazine_capacity, nonce_retention, now),
        );
        id
    }

    pub fn get(&self, id: PlayerId) -> Option<&PlayerSession> {
        self.players.get(&id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut PlayerSession> {
        self.players.get_mut(&id)
    }

    pub fn remove(&mut self, id: PlayerId) -> Option<PlayerSession> {
        let session = self.players.remove(&id)?;
        self.tokens.remove(&session.session_token);
        Some(session)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerSession> {
        self.players.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_set_rejects_reuse_and_evicts_oldest() {
        let mut nonces = NonceSet::new(3);
        assert!(nonces.consume("a"));
        assert!(!nonces.consume("a"));
        assert!(nonces.consume("b"));
        assert!(nonces.consume("c"));
        assert!(nonces.consume("d")); // evicts "a"
        assert_eq!(nonces.len(), 3);
        assert!(nonces.consume("a")); // forgotten after eviction
    }

    #[test]
    fn damage_floors_at_zero() {
        let mut session =
            PlayerSession::new(PlayerId(1), "t".into(), Vec3::default(), 6, 16, 0);
        let (health, died) = session.apply_damage(35);
        assert_eq!(health, 65);
        assert!(!died);
        let (health, died) = session.apply_damage(200);
        assert_eq!(health, 0);
        assert!(died);
    }

    #[test]
    fn store_assigns_increasing_ids_and_tracks_tokens() {
        let mut store = PlayerStore::new();
        let a = store.create("tok-a".into(), Vec3::default(), 6, 16, 0);
        let b = store.create("tok-b".into(), Vec3::default(), 6, 16, 0);
        assert!(b > a);
        assert!(store.token_in_use("tok-a"));
        store.remove(a);
        assert!(!store.token_in_use("tok-a"));
        assert!(store.contains(b));
    }
}
