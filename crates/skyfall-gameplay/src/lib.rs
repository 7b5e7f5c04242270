//! # Skyfall Gameplay
//!
//! Enemy AI and combat resolution for Skyfall.
//!
//! This crate provides the headless enemy layer:
//! - Archetype configuration and the TOML-backed registry
//! - The shared enemy state machine (patrol, chase, attack, hurt, dead)
//! - Archetype behaviours: melee, grounded and flying gunners, suicide
//!   flyers and the boss special skill
//! - Line-of-sight sampling against a tile layer
//! - Projectiles with dispersion falloff and area damage
//! - Epoch-checked delayed tasks
//! - The encounter loop and its event bus

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod archetype;
pub mod behavior;
pub mod boss;
pub mod encounter;
pub mod enemy;
pub mod events;
pub mod flying;
pub mod kinematics;
pub mod projectile;
pub mod scheduler;
pub mod target;
pub mod terrain;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::archetype::*;
    pub use crate::behavior::*;
    pub use crate::boss::*;
    pub use crate::encounter::*;
    pub use crate::enemy::*;
    pub use crate::events::*;
    pub use crate::flying::*;
    pub use crate::projectile::*;
    pub use crate::scheduler::*;
    pub use crate::target::*;
    pub use crate::terrain::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use skyfall_common::Vec2;

    #[test]
    fn test_presets_registered() {
        let registry = ArchetypeRegistry::with_presets();
        for kind in BehaviorKind::ALL {
            assert!(registry.get(kind.preset_key()).is_some());
        }
    }

    #[test]
    fn test_encounter_from_prelude() {
        let mut encounter: Encounter<TrainingDummy> =
            Encounter::new(ArchetypeRegistry::with_presets(), EncounterSettings::default());
        let id = encounter
            .spawn_enemy("enemy3", Vec2::new(0.0, -100.0))
            .expect("spawn");
        encounter.tick(16);
        assert_eq!(encounter.enemy(id).map(Enemy::kind), Some(BehaviorKind::RangedFlying));
    }
}
