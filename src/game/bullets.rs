//! Server-side bullet simulation and hit adjudication

use std::sync::Arc;

use uuid::Uuid;

use crate::config::Config;
use crate::ws::protocol::{HitType, HitZone, PlayerId, Vec3};

use super::session::{PlayerMode, PlayerSession, PlayerStore};

/// Combat context a bullet or player belongs to. Bullets only ever damage
/// players in the same context, so cross-context hits are impossible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Town,
    Duel(Uuid),
    Shootout(u64),
}

/// Two players can damage each other only when their contexts agree
pub(crate) fn same_context(a: PlayerMode, b: PlayerMode) -> bool {
    context_of(a) == context_of(b)
}

fn context_of(mode: PlayerMode) -> Context {
    match mode {
        PlayerMode::None | PlayerMode::Queued { .. } => Context::Town,
        PlayerMode::Duel { duel_id } => Context::Duel(duel_id),
        PlayerMode::Shootout { lobby_id } => Context::Shootout(lobby_id),
    }
}

/// In-flight projectile. The simulator owns its lifetime exclusively.
#[derive(Debug, Clone)]
pub struct Bullet {
    pub id: Uuid,
    pub owner: PlayerId,
    pub origin: Vec3,
    /// Unit length, re-normalized at spawn
    pub direction: Vec3,
    pub speed: f32,
    pub max_distance: f32,
    pub spawned_at: u64,
    pub position: Vec3,
    pub traveled: f32,
    pub active: bool,
}

impl Bullet {
    /// Recompute position from time since spawn. Absolute-time math keeps
    /// the flight path identical under tick-rate jitter. Returns true if
    /// the bullet has exceeded its maximum travel distance.
    fn advance(&mut self, now: u64) -> bool {
        let elapsed = now.saturating_sub(self.spawned_at) as f32 / 1000.0;
        let raw = self.speed * elapsed;
        self.traveled = raw.min(self.max_distance);
        self.position = self.origin.add_scaled(self.direction, self.traveled);
        raw > self.max_distance
    }
}

/// Authoritative bullet impact, ready for broadcast
#[derive(Debug, Clone)]
pub struct ImpactEvent {
    pub bullet_id: Uuid,
    pub hit_type: HitType,
    pub position: Vec3,
    pub target_id: Option<PlayerId>,
    pub hit_zone: Option<HitZone>,
}

/// Damage applied to a player this tick
#[derive(Debug, Clone)]
pub struct DamageEvent {
    pub shooter: PlayerId,
    pub victim: PlayerId,
    pub hit_zone: HitZone,
    pub damage: i32,
    pub health_after: i32,
    pub died: bool,
    pub position: Vec3,
}

/// Everything that happened during one simulation tick
#[derive(Debug, Default)]
pub struct TickReport {
    pub impacts: Vec<ImpactEvent>,
    pub damages: Vec<DamageEvent>,
}

/// Advances all in-flight bullets on a fixed tick and adjudicates hits
pub struct BulletSimulator {
    config: Arc<Config>,
    bullets: Vec<Bullet>,
}

impl BulletSimulator {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            bullets: Vec::new(),
        }
    }

    pub fn damage_for_zone(&self, zone: HitZone) -> i32 {
        match zone {
            HitZone::Head => self.config.damage_head,
            HitZone::Body => self.config.damage_body,
            HitZone::Limbs => self.config.damage_limbs,
        }
    }

    /// Spawn a bullet. The direction must already be unit length (the gate
    /// rejects degenerate vectors; `normalized()` handles the rest).
    pub fn spawn(&mut self, owner: PlayerId, origin: Vec3, direction: Vec3, now: u64) -> Uuid {
        let id = Uuid::new_v4();
        self.bullets.push(Bullet {
            id,
            owner,
            origin,
            direction,
            speed: self.config.bullet_speed,
            max_distance: self.config.bullet_max_distance,
            spawned_at: now,
            position: origin,
            traveled: 0.0,
            active: true,
        });
        id
    }

    pub fn active_count(&self) -> usize {
        self.bullets.iter().filter(|b| b.active).count()
    }

    pub fn get(&self, id: Uuid) -> Option<&Bullet> {
        self.bullets.iter().find(|b| b.id == id && b.active)
    }

    /// Drop every bullet owned by a departing player
    pub fn remove_owned(&mut self, owner: PlayerId) {
        self.bullets.retain(|b| b.owner != owner);
    }

    /// Advance every active bullet and resolve expiry, terrain, boundary,
    /// and player collisions, in that order. Inactive bullets are purged
    /// at the end of the tick.
    pub fn tick(&mut self, now: u64, players: &mut PlayerStore) -> TickReport {
        let mut report = TickReport::default();

        for bullet in self.bullets.iter_mut().filter(|b| b.active) {
            let prev = bullet.position;
            let exceeded = bullet.advance(now);

            if exceeded {
                bullet.active = false;
                continue;
            }

            if bullet.position.y <= 0.0 {
                bullet.active = false;
                report.impacts.push(ImpactEvent {
                    bullet_id: bullet.id,
                    hit_type: HitType::Ground,
                    position: Vec3::new(bullet.position.x, 0.0, bullet.position.z),
                    target_id: None,
                    hit_zone: None,
                });
                continue;
            }

            let owner_context = players
                .get(bullet.owner)
                .map(|p| context_of(p.mode))
                .unwrap_or(Context::Town);

            if let Some(extent) = boundary_extent(&self.config, owner_context) {
                if bullet.position.x.abs() > extent || bullet.position.z.abs() > extent {
                    bullet.active = false;
                    report.impacts.push(ImpactEvent {
                        bullet_id: bullet.id,
                        hit_type: HitType::Boundary,
                        position: bullet.position,
                        target_id: None,
                        hit_zone: None,
                    });
                    continue;
                }
            }

            // First player struck along the swept segment ends the bullet
            let mut collision: Option<(PlayerId, Vec3, HitZone)> = None;
            for target in players.iter() {
                if target.id == bullet.owner || !target.alive() {
                    continue;
                }
                if context_of(target.mode) != owner_context {
                    continue;
                }
                if let Some((point, frac)) = segment_hits_cylinder(
                    prev,
                    bullet.position,
                    target.position,
                    self.config.hitbox_radius,
                    self.config.hitbox_height,
                ) {
                    collision = Some((target.id, point, zone_for_fraction(frac)));
                    break;
                }
            }

            if let Some((victim, point, zone)) = collision {
                bullet.active = false;
                let damage = match zone {
                    HitZone::Head => self.config.damage_head,
                    HitZone::Body => self.config.damage_body,
                    HitZone::Limbs => self.config.damage_limbs,
                };
                if let Some(target) = players.get_mut(victim) {
                    let (health_after, died) = target.apply_damage(damage);
                    report.impacts.push(ImpactEvent {
                        bullet_id: bullet.id,
                        hit_type: HitType::Player,
                        position: point,
                        target_id: Some(victim),
                        hit_zone: Some(zone),
                    });
                    report.damages.push(DamageEvent {
                        shooter: bullet.owner,
                        victim,
                        hit_zone: zone,
                        damage,
                        health_after,
                        died,
                        position: point,
                    });
                }
            }
        }

        self.bullets.retain(|b| b.active);
        report
    }

    /// Cross-check a client hit claim against the authoritative bullet set.
    ///
    /// Accepted only if an active bullet owned by the claimant (matching
    /// `bullet_id` when given) is currently inside the target's hitbox.
    /// The matched bullet is consumed so one projectile never pays twice.
    pub fn validate_claim(
        &mut self,
        claimant: PlayerId,
        bullet_id: Option<Uuid>,
        target: &PlayerSession,
        now: u64,
    ) -> Option<Uuid> {
        let radius = self.config.hitbox_radius;
        let height = self.config.hitbox_height;
        for bullet in self.bullets.iter_mut().filter(|b| b.active) {
            if bullet.owner != claimant {
                continue;
            }
            if let Some(id) = bullet_id {
                if bullet.id != id {
                    continue;
                }
            }
            let exceeded = bullet.advance(now);
            if exceeded {
                bullet.active = false;
                continue;
            }
            if point_in_cylinder(bullet.position, target.position, radius, height) {
                bullet.active = false;
                return Some(bullet.id);
            }
        }
        None
    }
}

/// Boundary half-extent for a bullet's context; duels use their own arena
/// bounds and skip the world boundary check entirely.
fn boundary_extent(config: &Config, context: Context) -> Option<f32> {
    match context {
        Context::Duel(_) => None,
        Context::Shootout(_) => Some(config.shootout_half_extent),
        Context::Town => Some(config.town_half_extent),
    }
}

/// Map a vertical hit fraction (0 = feet, 1 = crown) to a hit zone.
/// Top band is the head and is always lethal; bottom band is limbs.
fn zone_for_fraction(frac: f32) -> HitZone {
    if frac >= 0.75 {
        HitZone::Head
    } else if frac <= 0.30 {
        HitZone::Limbs
    } else {
        HitZone::Body
    }
}

/// Sweep the segment `p0 -> p1` against an upright cylinder whose base sits
/// at `base`. Returns the hit point and the vertical fraction of the hit.
fn segment_hits_cylinder(
    p0: Vec3,
    p1: Vec3,
    base: Vec3,
    radius: f32,
    height: f32,
) -> Option<(Vec3, f32)> {
    // Horizontal closest-approach of the segment to the cylinder axis
    let dx = p1.x - p0.x;
    let dz = p1.z - p0.z;
    let fx = p0.x - base.x;
    let fz = p0.z - base.z;

    let dd = dx * dx + dz * dz;
    let t = if dd <= f32::EPSILON {
        0.0
    } else {
        (-(fx * dx + fz * dz) / dd).clamp(0.0, 1.0)
    };

    let cx = fx + dx * t;
    let cz = fz + dz * t;
    if cx * cx + cz * cz > radius * radius {
        return None;
    }

    let hit = Vec3::new(p0.x + dx * t, p0.y + (p1.y - p0.y) * t, p0.z + dz * t);
    if hit.y < base.y || hit.y > base.y + height {
        return None;
    }
    Some((hit, (hit.y - base.y) / height))
}

fn point_in_cylinder(point: Vec3, base: Vec3, radius: f32, height: f32) -> bool {
    let dx = point.x - base.x;
    let dz = point.z - base.z;
    dx * dx + dz * dz <= radius * radius && point.y >= base.y && point.y <= base.y + height
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::PlayerId;

    fn config() -> Arc<Config> {
        Arc::new(Config::from_env().unwrap())
    }

    fn store_with_player(id: u64, position: Vec3) -> (PlayerStore, PlayerId) {
        let mut store = PlayerStore::new();
        let pid = store.create(format!("tok-{}", id), position, 6, 16, 0);
        (store, pid)
    }

    #[test]
    fn bullet_deactivates_past_max_distance_without_impact() {
        let config = config();
        let mut sim = BulletSimulator::new(config.clone());
        let (mut store, _owner) = store_with_player(1, Vec3::new(0.0, 0.0, 0.0));
        let owner = store.create("tok-owner".into(), Vec3::new(0.0, 0.0, -5.0), 6, 16, 0);

        sim.spawn(owner, Vec3::new(0.0, 1.5, 0.0), Vec3::new(0.0, 0.0, 1.0), 0);

        // Far enough in the future that speed * elapsed > max_distance
        let late = (config.bullet_max_distance / config.bullet_speed * 1000.0) as u64 + 500;
        let report = sim.tick(late, &mut store);

        assert!(report.impacts.is_empty());
        assert!(report.damages.is_empty());
        assert_eq!(sim.active_count(), 0);
    }

    #[test]
    fn ground_impact_is_reported() {
        let mut sim = BulletSimulator::new(config());
        let (mut store, owner) = store_with_player(1, Vec3::new(50.0, 0.0, 50.0));

        // Fired downward from two meters up
        sim.spawn(owner, Vec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, -1.0, 0.0), 0);
        let report = sim.tick(100, &mut store);

        assert_eq!(report.impacts.len(), 1);
        assert_eq!(report.impacts[0].hit_type, HitType::Ground);
        assert_eq!(report.impacts[0].position.y, 0.0);
        assert_eq!(sim.active_count(), 0);
    }

    #[test]
    fn boundary_impact_outside_town() {
        let config = config();
        let mut sim = BulletSimulator::new(config.clone());
        let (mut store, owner) = store_with_player(1, Vec3::new(0.0, 0.0, 0.0));

        // Fired from just inside the boundary, heading out
        let start = Vec3::new(config.town_half_extent - 1.0, 1.5, 0.0);
        sim.spawn(owner, start, Vec3::new(1.0, 0.0, 0.0), 0);
        let report = sim.tick(200, &mut store);

        assert_eq!(report.impacts.len(), 1);
        assert_eq!(report.impacts[0].hit_type, HitType::Boundary);
    }

    #[test]
    fn swept_hit_applies_zone_damage_and_kills_on_headshot() {
        let config = config();
        let mut sim = BulletSimulator::new(config.clone());
        let mut store = PlayerStore::new();
        let shooter = store.create("s".into(), Vec3::new(0.0, 0.0, 0.0), 6, 16, 0);
        let victim = store.create("v".into(), Vec3::new(0.0, 0.0, 10.0), 6, 16, 0);

        // Head height on a default 1.8 cylinder is the top quarter
        let head_y = config.hitbox_height * 0.9;
        sim.spawn(
            shooter,
            Vec3::new(0.0, head_y, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            0,
        );
        let report = sim.tick(500, &mut store);

        assert_eq!(report.damages.len(), 1);
        let damage = &report.damages[0];
        assert_eq!(damage.victim, victim);
        assert_eq!(damage.hit_zone, HitZone::Head);
        assert!(damage.died);
        assert_eq!(store.get(victim).unwrap().health, 0);
        assert_eq!(sim.active_count(), 0);
    }

    #[test]
    fn body_and_limb_bands_map_to_reduced_damage() {
        let config = config();
        let mut sim = BulletSimulator::new(config.clone());
        let mut store = PlayerStore::new();
        let shooter = store.create("s".into(), Vec3::new(0.0, 0.0, 0.0), 6, 16, 0);
        let victim = store.create("v".into(), Vec3::new(0.0, 0.0, 10.0), 6, 16, 0);

        let body_y = config.hitbox_height * 0.5;
        sim.spawn(
            shooter,
            Vec3::new(0.0, body_y, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            0,
        );
        let report = sim.tick(500, &mut store);
        assert_eq!(report.damages[0].hit_zone, HitZone::Body);
        assert_eq!(report.damages[0].damage, config.damage_body);
        assert_eq!(
            store.get(victim).unwrap().health,
            100 - config.damage_body
        );
    }

    #[test]
    fn own_bullets_never_hit_their_owner() {
        let mut sim = BulletSimulator::new(config());
        let (mut store, owner) = store_with_player(1, Vec3::new(0.0, 0.0, 2.0));

        sim.spawn(owner, Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 0.0, 1.0), 0);
        let report = sim.tick(100, &mut store);
        assert!(report.damages.is_empty());
    }

    #[test]
    fn cross_context_pairs_are_skipped() {
        let mut sim = BulletSimulator::new(config());
        let mut store = PlayerStore::new();
        let shooter = store.create("s".into(), Vec3::new(0.0, 0.0, 0.0), 6, 16, 0);
        let victim = store.create("v".into(), Vec3::new(0.0, 0.0, 10.0), 6, 16, 0);
        store.get_mut(victim).unwrap().mode = PlayerMode::Duel {
            duel_id: Uuid::new_v4(),
        };

        sim.spawn(shooter, Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 0.0, 1.0), 0);
        let report = sim.tick(500, &mut store);
        assert!(report.damages.is_empty());
    }

    #[test]
    fn hit_claim_requires_matching_bullet_in_hitbox() {
        let config = config();
        let mut sim = BulletSimulator::new(config.clone());
        let mut store = PlayerStore::new();
        let claimant = store.create("c".into(), Vec3::new(0.0, 0.0, 0.0), 6, 16, 0);
        let target = store.create("t".into(), Vec3::new(0.0, 0.0, 8.0), 6, 16, 0);

        // No bullet at all: claim rejected
        let target_session = store.get(target).unwrap();
        assert!(sim
            .validate_claim(claimant, None, target_session, 0)
            .is_none());

        // Bullet mid-flight inside the target's cylinder: claim accepted once
        let id = sim.spawn(claimant, Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 0.0, 1.0), 0);
        let at_target = (8.0 / config.bullet_speed * 1000.0) as u64;
        let target_session = store.get(target).unwrap();
        assert_eq!(
            sim.validate_claim(claimant, Some(id), target_session, at_target),
            Some(id)
        );
        // Consumed: the same bullet cannot pay out twice
        let target_session = store.get(target).unwrap();
        assert!(sim
            .validate_claim(claimant, Some(id), target_session, at_target)
            .is_none());
    }
}
