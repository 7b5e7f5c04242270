//! # Skyfall Common
//!
//! Common types and utilities shared by the Skyfall crates.
//!
//! This crate provides foundational types used across all Skyfall subsystems:
//! - Geometry (`Vec2`, `Rect`) in world space
//! - ID types (`EntityId`, `ProjectileId`)
//! - Game-clock timestamps and cooldown helpers
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod geometry;
pub mod ids;
pub mod time;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::geometry::*;
    pub use crate::ids::*;
    pub use crate::time::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_generation() {
        let id1 = EntityId::new();
        let id2 = EntityId::new();
        assert_ne!(id1, id2);
        assert!(id1.is_valid());
        assert!(!EntityId::NULL.is_valid());
    }

    #[test]
    fn test_vec2_distance() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < f32::EPSILON);
    }
}
