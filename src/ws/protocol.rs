//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-assigned player identity (monotonically increasing)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 3D position / direction vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit-length copy; `None` for zero-length or non-finite vectors
    pub fn normalized(&self) -> Option<Vec3> {
        if !self.is_finite() {
            return None;
        }
        let len = self.length();
        if len <= f32::EPSILON {
            return None;
        }
        Some(Vec3::new(self.x / len, self.y / len, self.z / len))
    }

    pub fn add_scaled(&self, dir: Vec3, t: f32) -> Vec3 {
        Vec3::new(self.x + dir.x * t, self.y + dir.y * t, self.z + dir.z * t)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Coarse vertical band of the hitbox, used to scale damage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HitZone {
    Head,
    Body,
    Limbs,
}

/// Spawn side assigned to a duelist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpawnSide {
    Left,
    Right,
}

/// What a bullet struck
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HitType {
    Ground,
    Boundary,
    Player,
}

/// Origin and direction of a fired bullet as reported by the client
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BulletData {
    pub position: Vec3,
    pub direction: Vec3,
}

/// Client-reported hit details; the claimed damage is never trusted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitData {
    pub position: Vec3,
    pub hit_zone: HitZone,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<f32>,
}

/// Public view of a connected player
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub position: Vec3,
    pub rotation: f32,
    pub health: i32,
    pub is_aiming: bool,
    pub is_reloading: bool,
    pub is_sprinting: bool,
}

/// One row of a shootout scoreboard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub player_id: PlayerId,
    pub kills: u32,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Position/rotation/stance report
    Update {
        position: Vec3,
        rotation: f32,
        #[serde(default)]
        is_aiming: bool,
        #[serde(default)]
        is_reloading: bool,
        #[serde(default)]
        is_sprinting: bool,
        sequence_number: u64,
    },

    /// Fire a bullet
    Shoot {
        bullet_data: BulletData,
        sequence_number: u64,
        nonce: String,
    },

    /// Claim a hit on another player
    PlayerHit {
        target_id: PlayerId,
        #[serde(default)]
        bullet_id: Option<Uuid>,
        hit_data: HitData,
        nonce: String,
    },

    /// Start reloading
    Reload,

    /// Latency / keep-alive probe
    Ping,

    /// Join a quick-draw arena queue
    QuickDrawJoin { arena_index: usize },

    /// Leave a quick-draw queue or duel
    QuickDrawLeave { arena_index: usize },

    /// Signal readiness in a pending duel
    QuickDrawReady { arena_index: usize },

    /// Shot taken during the draw phase
    QuickDrawShoot {
        opponent_id: PlayerId,
        arena_index: usize,
        hit_zone: HitZone,
        #[serde(default)]
        damage: Option<f32>,
    },

    /// Join the free-for-all shootout
    ProperShootoutJoin,

    /// Leave the shootout lobby
    ProperShootoutLeave,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Welcome message with assigned id and a snapshot of everyone else
    Init {
        id: PlayerId,
        players: Vec<PlayerInfo>,
    },

    PlayerJoined {
        #[serde(flatten)]
        player: PlayerInfo,
    },

    PlayerLeft {
        id: PlayerId,
    },

    PlayerUpdate {
        #[serde(flatten)]
        player: PlayerInfo,
    },

    /// Another player fired
    PlayerShoot {
        id: PlayerId,
        bullet_id: Uuid,
        bullet_data: BulletData,
    },

    /// Authoritative bullet impact
    BulletImpact {
        bullet_id: Uuid,
        hit_type: HitType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<PlayerId>,
        position: Vec3,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hit_zone: Option<HitZone>,
    },

    /// You were hit
    Hit {
        source_id: PlayerId,
        hit_data: HitData,
        health: i32,
        hit_zone: HitZone,
    },

    Respawn {
        position: Vec3,
        health: i32,
        bullets: u32,
    },

    /// Reload timer elapsed, magazine restored
    ReloadComplete {
        ammo: u32,
    },

    PositionCorrection {
        position: Vec3,
    },

    Error {
        message: String,
        fatal: bool,
    },

    Pong,

    QuickDrawJoin {
        arena_index: usize,
    },

    QuickDrawMatch {
        opponent_id: PlayerId,
        position: SpawnSide,
        arena_index: usize,
    },

    QuickDrawReady,

    QuickDrawCountdown,

    QuickDrawDraw,

    QuickDrawEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winner_id: Option<PlayerId>,
    },

    ProperShootoutJoin {
        lobby_id: u64,
        position: Vec3,
        scores: Vec<ScoreEntry>,
    },

    ProperShootoutPlayerJoin {
        player_id: PlayerId,
        scores: Vec<ScoreEntry>,
    },

    ProperShootoutPlayerLeave {
        player_id: PlayerId,
        scores: Vec<ScoreEntry>,
    },

    ProperShootoutKill {
        killer_id: PlayerId,
        victim_id: PlayerId,
        scores: Vec<ScoreEntry>,
    },

    ProperShootoutEnd {
        winner_id: PlayerId,
        scores: Vec<ScoreEntry>,
    },

    PlayerCount {
        count: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_msg_wire_names_are_camel_case() {
        let msg: ClientMsg = serde_json::from_str(
            r#"{"type":"shoot","bulletData":{"position":{"x":1.0,"y":1.5,"z":0.0},"direction":{"x":0.0,"y":0.0,"z":1.0}},"sequenceNumber":7,"nonce":"n-1"}"#,
        )
        .expect("shoot message parses");
        match msg {
            ClientMsg::Shoot {
                sequence_number, ..
            } => assert_eq!(sequence_number, 7),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn server_msg_tags_match_protocol() {
        let json = serde_json::to_string(&ServerMsg::QuickDrawEnd {
            winner_id: Some(PlayerId(3)),
        })
        .unwrap();
        assert!(json.contains(r#""type":"quickDrawEnd""#));
        assert!(json.contains(r#""winnerId":3"#));
    }

    #[test]
    fn unit_variants_round_trip() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::Ping));
        let json = serde_json::to_string(&ServerMsg::QuickDrawDraw).unwrap();
        assert_eq!(json, r#"{"type":"quickDrawDraw"}"#);
    }

    #[test]
    fn normalized_rejects_degenerate_vectors() {
        assert!(Vec3::new(0.0, 0.0, 0.0).normalized().is_none());
        assert!(Vec3::new(f32::NAN, 0.0, 0.0).normalized().is_none());
        let unit = Vec3::new(2.0, 0.0, 0.0).normalized().unwrap();
        assert!((unit.x - 1.0).abs() < 1e-6);
        assert_eq!(unit.y, 0.0);
    }
}
