//! Projectiles, the projectile sink and dispersion damage falloff.

use serde::{Deserialize, Serialize};
use skyfall_common::{EntityId, Millis, ProjectileId, Rect, Vec2};
use tracing::trace;

// ============================================================================
// Damage Falloff
// ============================================================================

/// Falloff steps as `(numerator, denominator, divisor)`, largest ratio first.
///
/// A projectile whose flight time reached `numerator / denominator` of its
/// lifespan deals `base / divisor`.
const FALLOFF_STEPS: [(u64, u64, f32); 6] = [
    (4, 5, 13.0),
    (1, 2, 11.0),
    (1, 3, 9.0),
    (1, 4, 7.0),
    (1, 5, 5.0),
    (1, 6, 3.0),
];

/// Damage of a dispersion projectile after `elapsed` ms of a `lifespan` ms flight.
///
/// Full damage below one sixth of the lifespan. Past that the divisor of the
/// largest threshold crossed applies. A zero lifespan deals full damage.
#[must_use]
pub fn falloff_damage(base: f32, elapsed: Millis, lifespan: Millis) -> f32 {
    if lifespan == 0 {
        return base;
    }

    FALLOFF_STEPS
        .iter()
        .find(|(num, den, _)| elapsed.saturating_mul(*den) >= lifespan.saturating_mul(*num))
        .map_or(base, |(_, _, divisor)| base / divisor)
}

// ============================================================================
// Projectile
// ============================================================================

/// Who fired a projectile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    /// Fired by an enemy; only the player can be hit.
    Enemy(EntityId),
    /// Fired by the player; only enemies can be hit.
    Player,
}

/// Everything needed to launch a projectile.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileSpec {
    /// Launch position.
    pub position: Vec2,
    /// Velocity in units per second.
    pub velocity: Vec2,
    /// Base damage.
    pub damage: f32,
    /// Shooter.
    pub owner: Owner,
    /// Time before the projectile expires.
    pub lifespan_ms: Millis,
    /// Whether damage decays with flight time.
    pub applies_falloff: bool,
    /// Sprite key for the renderer.
    pub sprite: String,
    /// Collision radius.
    pub radius: f32,
    /// Splash radius applied on impact, if any.
    pub area_radius: Option<f32>,
}

impl ProjectileSpec {
    /// Projectile fired from `from` toward `to` at `speed`.
    #[must_use]
    pub fn aimed(owner: Owner, from: Vec2, to: Vec2, speed: f32, damage: f32) -> Self {
        Self {
            position: from,
            velocity: (to - from).normalized() * speed,
            damage,
            owner,
            lifespan_ms: 2_000,
            applies_falloff: false,
            sprite: String::new(),
            radius: 4.0,
            area_radius: None,
        }
    }

    /// Sets the lifespan.
    #[must_use]
    pub fn with_lifespan(mut self, lifespan_ms: Millis) -> Self {
        self.lifespan_ms = lifespan_ms;
        self
    }

    /// Sets the sprite key.
    #[must_use]
    pub fn with_sprite(mut self, sprite: impl Into<String>) -> Self {
        self.sprite = sprite.into();
        self
    }

    /// Sets the collision radius.
    #[must_use]
    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    /// Marks the projectile as a dispersion shot.
    #[must_use]
    pub fn with_dispersion(mut self, dispersion: bool) -> Self {
        self.applies_falloff = dispersion;
        self
    }

    /// Sets a splash radius.
    #[must_use]
    pub fn with_area(mut self, radius: f32) -> Self {
        self.area_radius = Some(radius);
        self
    }
}

/// A projectile in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    /// Handle.
    pub id: ProjectileId,
    /// Current position.
    pub position: Vec2,
    /// Velocity in units per second.
    pub velocity: Vec2,
    /// Base damage.
    pub damage: f32,
    /// Shooter.
    pub owner: Owner,
    /// Launch time.
    pub created_at: Millis,
    /// Time before expiry.
    pub lifespan_ms: Millis,
    /// Whether damage decays with flight time.
    pub applies_falloff: bool,
    /// Sprite key.
    pub sprite: String,
    /// Collision radius.
    pub radius: f32,
    /// Splash radius applied on impact.
    pub area_radius: Option<f32>,
}

impl Projectile {
    fn from_spec(id: ProjectileId, spec: ProjectileSpec, now: Millis) -> Self {
        Self {
            id,
            position: spec.position,
            velocity: spec.velocity,
            damage: spec.damage,
            owner: spec.owner,
            created_at: now,
            lifespan_ms: spec.lifespan_ms,
            applies_falloff: spec.applies_falloff,
            sprite: spec.sprite,
            radius: spec.radius,
            area_radius: spec.area_radius,
        }
    }

    /// Time in flight.
    #[must_use]
    pub fn elapsed(&self, now: Millis) -> Millis {
        now.saturating_sub(self.created_at)
    }

    /// Damage dealt if the projectile hits at `now`. Enemy shots always
    /// deal their base damage.
    #[must_use]
    pub fn resolved_damage(&self, now: Millis) -> f32 {
        if self.owner == Owner::Player && self.applies_falloff {
            falloff_damage(self.damage, self.elapsed(now), self.lifespan_ms)
        } else {
            self.damage
        }
    }

    /// Returns true once the lifespan has elapsed.
    #[must_use]
    pub fn is_expired(&self, now: Millis) -> bool {
        self.elapsed(now) >= self.lifespan_ms
    }

    /// Collision box.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::from_center(self.position, self.radius, self.radius)
    }

    /// Moves the projectile by `dt_ms` of flight.
    pub fn advance(&mut self, dt_ms: Millis) {
        self.position += self.velocity * (dt_ms as f32 / 1_000.0);
    }
}

// ============================================================================
// Projectile Sink
// ============================================================================

/// Spawns and destroys projectiles on behalf of enemies.
pub trait ProjectileSink {
    /// Launches a projectile at game time `now`.
    fn spawn(&mut self, spec: ProjectileSpec, now: Millis) -> ProjectileId;

    /// Removes a projectile. Returns false if it was already gone.
    fn destroy(&mut self, id: ProjectileId) -> bool;
}

/// In-memory projectile store.
#[derive(Debug, Default)]
pub struct ProjectilePool {
    active: Vec<Projectile>,
    next_id: u64,
    spawned_total: u64,
}

impl ProjectilePool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of projectiles in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Returns true if nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Projectiles launched since creation.
    #[must_use]
    pub fn spawned_total(&self) -> u64 {
        self.spawned_total
    }

    /// Looks up a projectile.
    #[must_use]
    pub fn get(&self, id: ProjectileId) -> Option<&Projectile> {
        self.active.iter().find(|p| p.id == id)
    }

    /// Iterates projectiles in flight.
    pub fn iter(&self) -> impl Iterator<Item = &Projectile> {
        self.active.iter()
    }

    /// Moves every projectile.
    pub fn advance(&mut self, dt_ms: Millis) {
        for projectile in &mut self.active {
            projectile.advance(dt_ms);
        }
    }

    /// Removes projectiles whose lifespan has elapsed, returning how many.
    pub fn remove_expired(&mut self, now: Millis) -> usize {
        let before = self.active.len();
        self.active.retain(|p| !p.is_expired(now));
        before - self.active.len()
    }
}

impl ProjectileSink for ProjectilePool {
    fn spawn(&mut self, spec: ProjectileSpec, now: Millis) -> ProjectileId {
        self.next_id += 1;
        self.spawned_total += 1;
        let id = ProjectileId::new(self.next_id);
        trace!("Spawned projectile {:?} owned by {:?}", id, spec.owner);
        self.active.push(Projectile::from_spec(id, spec, now));
        id
    }

    fn destroy(&mut self, id: ProjectileId) -> bool {
        let before = self.active.len();
        self.active.retain(|p| p.id != id);
        before != self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_falloff_reference_values() {
        assert!(approx(falloff_damage(100.0, 0, 1_000), 100.0));
        assert!(approx(falloff_damage(100.0, 850, 1_000), 100.0 / 13.0));
        assert!(approx(falloff_damage(100.0, 500, 1_000), 100.0 / 11.0));
        assert!(approx(falloff_damage(100.0, 200, 1_000), 20.0));
    }

    #[test]
    fn test_falloff_thresholds() {
        assert!(approx(falloff_damage(90.0, 166, 1_000), 90.0));
        assert!(approx(falloff_damage(90.0, 167, 1_000), 30.0));
        assert!(approx(falloff_damage(70.0, 250, 1_000), 10.0));
        assert!(approx(falloff_damage(90.0, 334, 1_000), 10.0));
        assert!(approx(falloff_damage(130.0, 800, 1_000), 10.0));
        assert!(approx(falloff_damage(130.0, 5_000, 1_000), 10.0));
        assert!(approx(falloff_damage(42.0, 10, 0), 42.0));
    }

    #[test]
    fn test_flat_damage_without_dispersion() {
        let mut pool = ProjectilePool::new();
        let spec = ProjectileSpec::aimed(
            Owner::Enemy(EntityId::new()),
            Vec2::ZERO,
            Vec2::new(10.0, 0.0),
            100.0,
            12.0,
        )
        .with_lifespan(1_000);
        let id = pool.spawn(spec, 0);
        let projectile = pool.get(id).expect("spawned");
        assert!(approx(projectile.resolved_damage(900), 12.0));
    }

    #[test]
    fn test_enemy_shots_ignore_dispersion() {
        let mut pool = ProjectilePool::new();
        let spec = ProjectileSpec::aimed(
            Owner::Enemy(EntityId::new()),
            Vec2::ZERO,
            Vec2::new(10.0, 0.0),
            100.0,
            12.0,
        )
        .with_lifespan(1_000)
        .with_dispersion(true);
        let id = pool.spawn(spec, 0);
        let projectile = pool.get(id).expect("spawned");
        assert!(approx(projectile.resolved_damage(900), 12.0));
    }

    #[test]
    fn test_dispersion_uses_flight_time() {
        let mut pool = ProjectilePool::new();
        let spec = ProjectileSpec::aimed(
            Owner::Player,
            Vec2::ZERO,
            Vec2::new(10.0, 0.0),
            100.0,
            100.0,
        )
        .with_lifespan(1_000)
        .with_dispersion(true);
        let id = pool.spawn(spec, 1_000);
        let projectile = pool.get(id).expect("spawned");
        assert!(approx(projectile.resolved_damage(1_000), 100.0));
        assert!(approx(projectile.resolved_damage(1_500), 100.0 / 11.0));
    }

    #[test]
    fn test_pool_advance_expire_destroy() {
        let mut pool = ProjectilePool::new();
        let spec = ProjectileSpec::aimed(
            Owner::Player,
            Vec2::ZERO,
            Vec2::new(0.0, 5.0),
            200.0,
            1.0,
        )
        .with_lifespan(500);
        let a = pool.spawn(spec.clone(), 0);
        let b = pool.spawn(spec, 0);

        pool.advance(250);
        let moved = pool.get(a).expect("a").position;
        assert!(approx(moved.y, 50.0));

        assert!(pool.destroy(b));
        assert!(!pool.destroy(b));
        assert_eq!(pool.remove_expired(499), 0);
        assert_eq!(pool.remove_expired(500), 1);
        assert!(pool.is_empty());
        assert_eq!(pool.spawned_total(), 2);
    }

    proptest::proptest! {
        #[test]
        fn prop_falloff_never_increases(
            base in 1.0f32..1_000.0,
            lifespan in 1u64..10_000,
            a in 0u64..20_000,
            b in 0u64..20_000,
        ) {
            let (early, late) = if a <= b { (a, b) } else { (b, a) };
            let d_early = falloff_damage(base, early, lifespan);
            let d_late = falloff_damage(base, late, lifespan);
            proptest::prop_assert!(d_late <= d_early);
            proptest::prop_assert!(d_late >= base / 13.0 - 1e-3);
            proptest::prop_assert!(d_early <= base);
        }
    }
}
