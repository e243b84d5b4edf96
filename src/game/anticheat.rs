//! Anti-cheat gate - the single validation chokepoint for inbound messages
//!
//! Every handler relies on this running first; nothing downstream
//! re-validates sequence numbers, nonces, or cooldowns.

use crate::config::Config;
use crate::ws::protocol::ClientMsg;

use super::session::PlayerSession;

/// Why a message was refused admission
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("Stale sequence number {seq} (last accepted {last})")]
    StaleSequence { seq: u64, last: u64 },

    #[error("Nonce already used")]
    NonceReused,

    #[error("Position updates too frequent")]
    UpdateThrottled,

    #[error("Weapon on cooldown")]
    WeaponCooldown,

    #[error("Already reloading")]
    AlreadyReloading,

    #[error("Magazine already full")]
    MagazineFull,

    #[error("Out of ammo")]
    OutOfAmmo,

    #[error("Invalid direction vector")]
    BadDirection,

    #[error("Invalid state: {0}")]
    InvalidState(&'static str),
}

/// Stateless validator; all per-player counters live on the session
pub struct AntiCheatGate {
    update_min_interval_ms: u64,
    weapon_cooldown_ms: u64,
}

impl AntiCheatGate {
    pub fn new(config: &Config) -> Self {
        Self {
            update_min_interval_ms: config.update_min_interval_ms,
            weapon_cooldown_ms: config.weapon_cooldown_ms,
        }
    }

    /// Admit or reject a message before any handler runs.
    ///
    /// Checks run in a fixed order: sequence number, nonce, then
    /// type-specific rate limits and state preconditions. Counters are
    /// committed as each check passes, so an early rejection leaves later
    /// counters untouched.
    pub fn admit(
        &self,
        session: &mut PlayerSession,
        msg: &ClientMsg,
        now: u64,
    ) -> Result<(), RejectReason> {
        match msg {
            ClientMsg::Update {
                sequence_number, ..
            } => {
                self.check_sequence(session, *sequence_number)?;
                if now.saturating_sub(session.last_update_at) < self.update_min_interval_ms {
                    return Err(RejectReason::UpdateThrottled);
                }
                session.last_update_at = now;
                Ok(())
            }

            ClientMsg::Shoot {
                bullet_data,
                sequence_number,
                nonce,
            } => {
                self.check_sequence(session, *sequence_number)?;
                self.check_nonce(session, nonce)?;
                if bullet_data.direction.normalized().is_none()
                    || !bullet_data.position.is_finite()
                {
                    return Err(RejectReason::BadDirection);
                }
                if now.saturating_sub(session.last_shot_at) < self.weapon_cooldown_ms {
                    return Err(RejectReason::WeaponCooldown);
                }
                if session.reloading {
                    return Err(RejectReason::InvalidState("shooting while reloading"));
                }
                if session.ammo == 0 {
                    return Err(RejectReason::OutOfAmmo);
                }
                session.last_shot_at = now;
                Ok(())
            }

            ClientMsg::PlayerHit { nonce, .. } => self.check_nonce(session, nonce),

            ClientMsg::Reload => {
                if session.reloading {
                    return Err(RejectReason::AlreadyReloading);
                }
                if session.ammo == session.magazine_capacity {
                    return Err(RejectReason::MagazineFull);
                }
                Ok(())
            }

            // Mode messages carry no counters; state checks belong to the
            // coordinators that own the referenced duel/lobby.
            _ => Ok(()),
        }
    }

    fn check_sequence(&self, session: &mut PlayerSession, seq: u64) -> Result<(), RejectReason> {
        if seq <= session.last_sequence {
            return Err(RejectReason::StaleSequence {
                seq,
                last: session.last_sequence,
            });
        }
        session.last_sequence = seq;
        Ok(())
    }

    fn check_nonce(&self, session: &mut PlayerSession, nonce: &str) -> Result<(), RejectReason> {
        if !session.nonces.consume(nonce) {
            return Err(RejectReason::NonceReused);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::{BulletData, PlayerId, Vec3};

    fn test_session() -> PlayerSession {
        PlayerSession::new(PlayerId(1), "tok".into(), Vec3::default(), 6, 16, 0)
    }

    fn gate() -> AntiCheatGate {
        let config = Config::from_env().unwrap();
        AntiCheatGate::new(&config)
    }

    fn update(seq: u64) -> ClientMsg {
        ClientMsg::Update {
            position: Vec3::new(1.0, 0.0, 1.0),
            rotation: 0.0,
            is_aiming: false,
            is_reloading: false,
            is_sprinting: false,
            sequence_number: seq,
        }
    }

    fn shoot(seq: u64, nonce: &str) -> ClientMsg {
        ClientMsg::Shoot {
            bullet_data: BulletData {
                position: Vec3::new(0.0, 1.5, 0.0),
                direction: Vec3::new(0.0, 0.0, 1.0),
            },
            sequence_number: seq,
            nonce: nonce.into(),
        }
    }

    #[test]
    fn stale_sequence_is_rejected() {
        let gate = gate();
        let mut session = test_session();
        assert!(gate.admit(&mut session, &update(5), 1_000).is_ok());
        assert_eq!(
            gate.admit(&mut session, &update(5), 2_000),
            Err(RejectReason::StaleSequence { seq: 5, last: 5 })
        );
        assert!(gate.admit(&mut session, &update(6), 2_000).is_ok());
    }

    #[test]
    fn update_spacing_is_enforced() {
        let gate = gate();
        let mut session = test_session();
        assert!(gate.admit(&mut session, &update(1), 1_000).is_ok());
        assert_eq!(
            gate.admit(&mut session, &update(2), 1_010),
            Err(RejectReason::UpdateThrottled)
        );
        assert!(gate.admit(&mut session, &update(3), 1_040).is_ok());
    }

    #[test]
    fn nonce_reuse_is_rejected_before_cooldown() {
        let gate = gate();
        let mut session = test_session();
        assert!(gate.admit(&mut session, &shoot(1, "n1"), 1_000).is_ok());
        // Same nonce inside the cooldown window: the nonce check fires first
        assert_eq!(
            gate.admit(&mut session, &shoot(2, "n1"), 1_010),
            Err(RejectReason::NonceReused)
        );
    }

    #[test]
    fn shot_cooldown_is_enforced() {
        let gate = gate();
        let mut session = test_session();
        assert!(gate.admit(&mut session, &shoot(1, "n1"), 1_000).is_ok());
        assert_eq!(
            gate.admit(&mut session, &shoot(2, "n2"), 1_100),
            Err(RejectReason::WeaponCooldown)
        );
        assert!(gate.admit(&mut session, &shoot(3, "n3"), 1_300).is_ok());
    }

    #[test]
    fn shooting_while_reloading_or_empty_is_rejected() {
        let gate = gate();
        let mut session = test_session();
        session.reloading = true;
        assert!(matches!(
            gate.admit(&mut session, &shoot(1, "n1"), 1_000),
            Err(RejectReason::InvalidState(_))
        ));
        session.reloading = false;
        session.ammo = 0;
        assert_eq!(
            gate.admit(&mut session, &shoot(2, "n2"), 2_000),
            Err(RejectReason::OutOfAmmo)
        );
    }

    #[test]
    fn reload_preconditions() {
        let gate = gate();
        let mut session = test_session();
        assert_eq!(
            gate.admit(&mut session, &ClientMsg::Reload, 0),
            Err(RejectReason::MagazineFull)
        );
        session.ammo = 2;
        assert!(gate.admit(&mut session, &ClientMsg::Reload, 0).is_ok());
        session.reloading = true;
        assert_eq!(
            gate.admit(&mut session, &ClientMsg::Reload, 0),
            Err(RejectReason::AlreadyReloading)
        );
    }

    #[test]
    fn degenerate_direction_is_rejected() {
        let gate = gate();
        let mut session = test_session();
        let msg = ClientMsg::Shoot {
            bullet_data: BulletData {
                position: Vec3::new(0.0, 1.5, 0.0),
                direction: Vec3::new(0.0, 0.0, 0.0),
            },
            sequence_number: 1,
            nonce: "n1".into(),
        };
        assert_eq!(
            gate.admit(&mut session, &msg, 1_000),
            Err(RejectReason::BadDirection)
        );
    }
}
