//! The player as seen by enemies.
//!
//! Enemies never own the player. The encounter holds it behind [`Target`]
//! and hands each enemy a read-only [`TargetView`] per tick.

use skyfall_common::{EntityId, Rect, Vec2};

/// Damageable target handle implemented by the host's player.
pub trait Target {
    /// Centre of the target's body.
    fn position(&self) -> Vec2;

    /// Half width and half height of the target's body.
    fn half_extents(&self) -> Vec2;

    /// Applies damage from a source.
    fn take_damage(&mut self, amount: f32, source: EntityId);

    /// Returns false once the target can no longer be hit.
    fn is_alive(&self) -> bool {
        true
    }

    /// Read-only snapshot passed into enemy steps.
    fn view(&self) -> TargetView {
        TargetView {
            position: self.position(),
            half_extents: self.half_extents(),
        }
    }
}

/// Snapshot of the target for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetView {
    /// Body centre.
    pub position: Vec2,
    /// Body half extents.
    pub half_extents: Vec2,
}

impl TargetView {
    /// Body rectangle.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::from_center(self.position, self.half_extents.x, self.half_extents.y)
    }
}

/// A single recorded hit on a [`TrainingDummy`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Damage dealt.
    pub amount: f32,
    /// Who dealt it.
    pub source: EntityId,
}

/// Stationary target that records every hit.
#[derive(Debug, Clone)]
pub struct TrainingDummy {
    position: Vec2,
    half_extents: Vec2,
    health: f32,
    hits: Vec<Hit>,
}

impl TrainingDummy {
    /// Creates a dummy with effectively unlimited health.
    #[must_use]
    pub fn new(position: Vec2) -> Self {
        Self {
            position,
            half_extents: Vec2::new(12.0, 24.0),
            health: f32::INFINITY,
            hits: Vec::new(),
        }
    }

    /// Sets starting health.
    #[must_use]
    pub fn with_health(mut self, health: f32) -> Self {
        self.health = health;
        self
    }

    /// Sets body half extents.
    #[must_use]
    pub fn with_half_extents(mut self, half_width: f32, half_height: f32) -> Self {
        self.half_extents = Vec2::new(half_width, half_height);
        self
    }

    /// Moves the dummy.
    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    /// Remaining health.
    #[must_use]
    pub fn health(&self) -> f32 {
        self.health
    }

    /// Every hit taken so far.
    #[must_use]
    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    /// Sum of all damage taken.
    #[must_use]
    pub fn total_damage(&self) -> f32 {
        self.hits.iter().map(|h| h.amount).sum()
    }
}

impl Target for TrainingDummy {
    fn position(&self) -> Vec2 {
        self.position
    }

    fn half_extents(&self) -> Vec2 {
        self.half_extents
    }

    fn take_damage(&mut self, amount: f32, source: EntityId) {
        self.health -= amount;
        self.hits.push(Hit { amount, source });
    }

    fn is_alive(&self) -> bool {
        self.health > 0.0
    }
}
