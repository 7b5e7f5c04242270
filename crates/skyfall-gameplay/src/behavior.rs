//! Archetype behaviours layered on the shared state machine.
//!
//! Each archetype implements [`ArchetypeBehavior`]; [`Behavior`] is the
//! tagged variant an [`Enemy`](crate::enemy::Enemy) carries. Shared movement
//! (grounded patrol and chase, wall handling) lives in free functions so
//! behaviours can reuse or bypass it.

use skyfall_common::{cooldown_ready, Millis, Vec2};
use tracing::trace;

use crate::archetype::{ArchetypeConfig, BehaviorKind};
use crate::boss::BossBehavior;
use crate::enemy::{
    Animation, EnemyContext, EnemyCore, EnemyEffect, EnemyState, Facing, Sense, WALL_NUDGE,
};
use crate::flying::{FlyingBehavior, SuicideBehavior};
use crate::scheduler::EnemyTask;

/// Minimum time between ledge turns while patrolling.
pub const TURN_COOLDOWN: Millis = 500;

/// Aim angle beyond which ranged attacks use the up or down animation.
pub const AIM_TILT_DEGREES: f32 = 30.0;

/// Whether a pre-step hook took over the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepFlow {
    /// Run the shared scan.
    Continue,
    /// Skip the rest of the tick.
    Handled,
}

/// Strategy hooks an archetype plugs into the state machine.
pub trait ArchetypeBehavior {
    /// Behaviour variant.
    fn kind(&self) -> BehaviorKind;

    /// Runs before the shared scan. Returning `Handled` ends the tick.
    fn pre_step(
        &mut self,
        _core: &mut EnemyCore,
        _sense: &Sense,
        _ctx: &mut EnemyContext<'_>,
    ) -> StepFlow {
        StepFlow::Continue
    }

    /// Whether pursuit and ranged attacks need a clear line of sight.
    fn uses_line_of_sight(&self) -> bool {
        self.kind().uses_line_of_sight()
    }

    /// Attack gate checked each tick while not attacking.
    fn can_attack(&self, core: &EnemyCore, sense: &Sense, now: Millis) -> bool;

    /// Archetype part of an attack, after the shared setup.
    fn execute_attack(&mut self, core: &mut EnemyCore, sense: &Sense, ctx: &mut EnemyContext<'_>);

    /// Movement while patrolling.
    fn patrol(&mut self, core: &mut EnemyCore, ctx: &mut EnemyContext<'_>);

    /// Movement while chasing.
    fn chase(&mut self, core: &mut EnemyCore, sense: &Sense, _ctx: &mut EnemyContext<'_>) {
        ground_chase(core, sense);
    }

    /// Reaction to walking into a wall while patrolling or chasing.
    fn handle_wall_collision(&mut self, core: &mut EnemyCore, ctx: &mut EnemyContext<'_>) {
        turn_at_wall(core, ctx);
    }

    /// Archetype-specific scheduled task. Returns true to re-evaluate
    /// chasing versus patrolling afterward.
    fn on_task(&mut self, core: &mut EnemyCore, task: EnemyTask, _ctx: &mut EnemyContext<'_>) -> bool {
        trace!("Enemy {} ignores {:?}", core.id(), task);
        false
    }

    /// While true, finished attacks and hurt recovery do not resume pursuit.
    fn suspends_pursuit(&self) -> bool {
        false
    }
}

// ============================================================================
// Shared Movement
// ============================================================================

/// Flips away from a wall, nudges clear of it and demotes pursuit.
pub fn turn_at_wall(core: &mut EnemyCore, ctx: &mut EnemyContext<'_>) {
    let blocked = core.heading().unwrap_or(core.facing);
    let away = blocked.flipped();

    core.facing = away;
    core.velocity.x = away.sign() * core.config.speed;
    core.position.x += away.sign() * WALL_NUDGE;
    trace!("Enemy {} turned at wall, now {:?}", core.id, away);

    if core.state == EnemyState::Chasing {
        core.set_state(EnemyState::Patrolling, ctx.events);
        core.request_chase_retry(ctx);
    }
}

/// Walks in the facing direction, turning at ledges and bounds when the
/// archetype is edge aware.
pub fn ground_patrol(core: &mut EnemyCore, ctx: &mut EnemyContext<'_>, last_turn_at: &mut Option<Millis>) {
    if core.config.edge_aware
        && edge_ahead(core, ctx)
        && cooldown_ready(ctx.now, *last_turn_at, TURN_COOLDOWN)
    {
        core.facing = core.facing.flipped();
        *last_turn_at = Some(ctx.now);
        trace!("Enemy {} turned at edge", core.id);
    }
    core.velocity.x = core.facing.sign() * core.config.speed;
    core.play(Animation::Walk);
}

/// Walks toward the player.
pub fn ground_chase(core: &mut EnemyCore, sense: &Sense) {
    core.face_toward(sense.target.position.x);
    if sense.horizontal <= 1.0 {
        core.velocity.x = 0.0;
        core.play(Animation::Idle);
    } else {
        core.velocity.x = core.facing.sign() * core.config.speed;
        core.play(Animation::Walk);
    }
}

/// Map bounds or missing ground just past the leading edge of the body.
fn edge_ahead(core: &EnemyCore, ctx: &EnemyContext<'_>) -> bool {
    let body = core.body();
    let probe_x = match core.facing {
        Facing::Left => body.min_x - 1.0,
        Facing::Right => body.max_x + 1.0,
    };

    if let Some(bounds) = ctx.bounds {
        if probe_x < bounds.min_x || probe_x > bounds.max_x {
            return true;
        }
    }

    ctx.terrain
        .is_some_and(|terrain| !terrain.collides_at(probe_x, body.max_y + 1.0))
}

/// Attack animation for an aim offset, tilted up or down past 30 degrees.
#[must_use]
pub fn aim_animation(offset: Vec2) -> Animation {
    let angle = Vec2::new(offset.x.abs(), offset.y).angle_degrees();
    if angle < -AIM_TILT_DEGREES {
        Animation::AttackUp
    } else if angle > AIM_TILT_DEGREES {
        Animation::AttackDown
    } else {
        Animation::Attack
    }
}

// ============================================================================
// Melee
// ============================================================================

/// Close-range hitbox attacker (Enemy1).
#[derive(Debug, Clone, Default)]
pub struct MeleeBehavior {
    last_turn_at: Option<Millis>,
}

impl ArchetypeBehavior for MeleeBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::Melee
    }

    fn can_attack(&self, core: &EnemyCore, sense: &Sense, now: Millis) -> bool {
        sense.in_attack_range(&core.config)
            && cooldown_ready(now, core.last_attack_at, core.config.attack_cooldown_ms)
            && core.state != EnemyState::Hurt
    }

    fn execute_attack(&mut self, core: &mut EnemyCore, _sense: &Sense, ctx: &mut EnemyContext<'_>) {
        core.schedule(ctx, core.config.attack_duration_ms / 2, EnemyTask::MeleeHitCheck);
    }

    fn patrol(&mut self, core: &mut EnemyCore, ctx: &mut EnemyContext<'_>) {
        ground_patrol(core, ctx, &mut self.last_turn_at);
    }

    fn on_task(&mut self, core: &mut EnemyCore, task: EnemyTask, ctx: &mut EnemyContext<'_>) -> bool {
        if task != EnemyTask::MeleeHitCheck {
            return false;
        }
        // A blow interrupted by hurt-stun never lands.
        if !core.is_attacking || core.attack_damage_dealt || core.state == EnemyState::Hurt {
            return false;
        }
        let (Some(hitbox), Some(target)) = (core.hitbox(), ctx.target) else {
            return false;
        };
        if hitbox.overlaps(&target.bounds()) {
            core.attack_damage_dealt = true;
            ctx.effects.push(EnemyEffect::DamageTarget {
                source: core.id,
                amount: core.config.damage,
            });
        }
        false
    }
}

// ============================================================================
// Ranged Grounded
// ============================================================================

/// Ground unit firing aimed projectiles (Enemy2).
#[derive(Debug, Clone, Default)]
pub struct RangedGroundBehavior {
    last_turn_at: Option<Millis>,
}

impl ArchetypeBehavior for RangedGroundBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::RangedGrounded
    }

    fn can_attack(&self, core: &EnemyCore, sense: &Sense, _now: Millis) -> bool {
        sense.in_attack_range(&core.config)
            && core.state != EnemyState::Hurt
            && sense.line_of_sight
    }

    fn execute_attack(&mut self, core: &mut EnemyCore, sense: &Sense, ctx: &mut EnemyContext<'_>) {
        core.play(aim_animation(sense.offset));
        core.fire_at(ctx, sense.target.position);
    }

    fn patrol(&mut self, core: &mut EnemyCore, ctx: &mut EnemyContext<'_>) {
        ground_patrol(core, ctx, &mut self.last_turn_at);
    }
}

// ============================================================================
// Behaviour Variant
// ============================================================================

/// Behaviour variant carried by an enemy.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Enemy1.
    Melee(MeleeBehavior),
    /// Enemy2.
    RangedGrounded(RangedGroundBehavior),
    /// Enemy3.
    RangedFlying(FlyingBehavior),
    /// Enemy3 attacking variant.
    Suicide(SuicideBehavior),
    /// Boss.
    Boss(BossBehavior),
}

impl Behavior {
    /// Builds the behaviour an archetype asks for.
    #[must_use]
    pub fn for_archetype(config: &ArchetypeConfig, origin: Vec2, now: Millis) -> Self {
        match config.behavior {
            BehaviorKind::Melee => Self::Melee(MeleeBehavior::default()),
            BehaviorKind::RangedGrounded => Self::RangedGrounded(RangedGroundBehavior::default()),
            BehaviorKind::RangedFlying => {
                Self::RangedFlying(FlyingBehavior::new(origin, &config.flight, now))
            }
            BehaviorKind::Suicide => Self::Suicide(SuicideBehavior::new(origin, &config.flight, now)),
            BehaviorKind::Boss => Self::Boss(BossBehavior::new(now)),
        }
    }

    /// Behaviour variant.
    #[must_use]
    pub fn kind(&self) -> BehaviorKind {
        self.as_dyn().kind()
    }

    /// Borrows the behaviour as a trait object.
    #[must_use]
    pub fn as_dyn(&self) -> &dyn ArchetypeBehavior {
        match self {
            Self::Melee(b) => b,
            Self::RangedGrounded(b) => b,
            Self::RangedFlying(b) => b,
            Self::Suicide(b) => b,
            Self::Boss(b) => b,
        }
    }

    /// Mutably borrows the behaviour as a trait object.
    pub fn as_dyn_mut(&mut self) -> &mut dyn ArchetypeBehavior {
        match self {
            Self::Melee(b) => b,
            Self::RangedGrounded(b) => b,
            Self::RangedFlying(b) => b,
            Self::Suicide(b) => b,
            Self::Boss(b) => b,
        }
    }

    /// Boss state, for boss enemies.
    #[must_use]
    pub fn as_boss(&self) -> Option<&BossBehavior> {
        match self {
            Self::Boss(b) => Some(b),
            _ => None,
        }
    }

    /// Flight state, for flyers.
    #[must_use]
    pub fn as_flying(&self) -> Option<&FlyingBehavior> {
        match self {
            Self::RangedFlying(b) => Some(b),
            Self::Suicide(b) => Some(b.flight()),
            _ => None,
        }
    }

    /// Suicide state, for suicide flyers.
    #[must_use]
    pub fn as_suicide(&self) -> Option<&SuicideBehavior> {
        match self {
            Self::Suicide(b) => Some(b),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enemy::{Enemy, Stage};
    use crate::projectile::Owner;
    use crate::target::TargetView;
    use crate::terrain::TileMap;
    use skyfall_common::Rect;

    fn view(x: f32, y: f32) -> Option<TargetView> {
        Some(TargetView {
            position: Vec2::new(x, y),
            half_extents: Vec2::new(12.0, 24.0),
        })
    }

    fn spawn(kind: BehaviorKind, x: f32, y: f32) -> Enemy {
        Enemy::spawn(ArchetypeConfig::preset(kind), Vec2::new(x, y), 0)
    }

    fn run_due(stage: &mut Stage, enemy: &mut Enemy, target: Option<TargetView>) {
        while let Some(task) = stage.scheduler.pop_due(stage.now) {
            enemy.run_task(&task, &mut stage.context(target));
        }
    }

    #[test]
    fn test_aim_animation() {
        assert_eq!(aim_animation(Vec2::new(100.0, 0.0)), Animation::Attack);
        assert_eq!(aim_animation(Vec2::new(-100.0, 20.0)), Animation::Attack);
        assert_eq!(aim_animation(Vec2::new(50.0, -100.0)), Animation::AttackUp);
        assert_eq!(aim_animation(Vec2::new(-50.0, 100.0)), Animation::AttackDown);
    }

    #[test]
    fn test_melee_ignores_line_of_sight() {
        let mut map = TileMap::new(10.0);
        map.set_solid_at_world(25.0, 0.0);
        let mut stage = Stage::new(1);
        stage.terrain = Some(Box::new(map));

        let mut enemy = spawn(BehaviorKind::Melee, 0.0, 0.0);
        enemy.step(&mut stage.context(view(40.0, 0.0)));
        assert_eq!(enemy.state(), EnemyState::Attacking);
    }

    #[test]
    fn test_melee_out_of_vertical_tolerance_patrols() {
        let mut stage = Stage::new(1);
        let mut enemy = spawn(BehaviorKind::Melee, 0.0, 0.0);
        enemy.step(&mut stage.context(view(40.0, 30.0)));
        assert_eq!(enemy.state(), EnemyState::Patrolling);
        assert!(enemy.velocity().x > 0.0);
    }

    #[test]
    fn test_edge_aware_patrol_turns_at_bounds() {
        let mut stage = Stage::new(1);
        stage.bounds = Some(Rect::new(-10.0, -100.0, 1_000.0, 100.0));
        let mut enemy = spawn(BehaviorKind::Melee, 0.0, 0.0);
        enemy.core_mut().facing = Facing::Left;

        enemy.step(&mut stage.context(view(900.0, 0.0)));
        assert_eq!(enemy.facing(), Facing::Right);
        assert!(enemy.velocity().x > 0.0);

        // Turn cooldown holds the new facing even if still at an edge.
        enemy.core_mut().facing = Facing::Left;
        stage.now = 100;
        enemy.step(&mut stage.context(view(900.0, 0.0)));
        assert_eq!(enemy.facing(), Facing::Left);
    }

    #[test]
    fn test_edge_aware_patrol_turns_at_ledge() {
        let mut map = TileMap::new(16.0);
        // Floor under x in [0, 32) only; body bottom at y = 24.
        map.set_solid(0, 1);
        map.set_solid(1, 1);
        let mut stage = Stage::new(1);
        stage.terrain = Some(Box::new(map));

        let mut enemy = spawn(BehaviorKind::Melee, 16.0, 0.0);
        enemy.step(&mut stage.context(view(900.0, 0.0)));
        assert_eq!(enemy.facing(), Facing::Left);
    }

    #[test]
    fn test_ranged_grounded_fires_with_sight() {
        let mut stage = Stage::new(1);
        let mut enemy = spawn(BehaviorKind::RangedGrounded, 0.0, 0.0);
        enemy.step(&mut stage.context(view(100.0, -100.0)));

        assert_eq!(enemy.state(), EnemyState::Attacking);
        assert_eq!(enemy.animation(), Animation::AttackUp);
        assert_eq!(stage.projectiles.len(), 1);
        let projectile = stage.projectiles.iter().next().expect("fired");
        assert_eq!(projectile.owner, Owner::Enemy(enemy.id()));
        assert!(projectile.velocity.x > 0.0 && projectile.velocity.y < 0.0);
    }

    #[test]
    fn test_melee_hit_cancelled_by_hurt() {
        let mut stage = Stage::new(1);
        let mut enemy = spawn(BehaviorKind::Melee, 0.0, 0.0);
        let target = view(40.0, 0.0);

        enemy.step(&mut stage.context(target));
        assert_eq!(enemy.state(), EnemyState::Attacking);

        stage.now = 100;
        enemy.take_damage(5.0, &mut stage.context(target));

        stage.now = 300;
        run_due(&mut stage, &mut enemy, target);
        assert!(stage.effects.is_empty());
        assert_eq!(enemy.state(), EnemyState::Hurt);
    }

    #[test]
    fn test_ranged_grounded_refires_without_cooldown() {
        let mut stage = Stage::new(1);
        let mut enemy = spawn(BehaviorKind::RangedGrounded, 0.0, 0.0);
        let target = view(100.0, 0.0);
        assert!(enemy.core().config().attack_cooldown_ms > 716);

        enemy.step(&mut stage.context(target));
        assert_eq!(stage.projectiles.len(), 1);

        stage.now = 690;
        enemy.step(&mut stage.context(target));
        assert_eq!(stage.projectiles.len(), 1);

        stage.now = 700;
        run_due(&mut stage, &mut enemy, target);
        assert!(!enemy.core().is_attacking());
        assert_eq!(enemy.core().last_attack_at(), Some(700));

        stage.now = 716;
        enemy.step(&mut stage.context(target));
        assert_eq!(enemy.state(), EnemyState::Attacking);
        assert_eq!(stage.projectiles.len(), 2);
    }

    #[test]
    fn test_ranged_grounded_blocked_sight_patrols() {
        let mut map = TileMap::new(10.0);
        map.set_solid_at_world(100.0, 0.0);
        let mut stage = Stage::new(1);
        stage.terrain = Some(Box::new(map));

        let mut enemy = spawn(BehaviorKind::RangedGrounded, 0.0, 0.0);
        enemy.step(&mut stage.context(view(200.0, 0.0)));
        assert_eq!(enemy.state(), EnemyState::Patrolling);
        assert!(stage.projectiles.is_empty());
    }

    #[test]
    fn test_variant_dispatch() {
        for kind in BehaviorKind::ALL {
            let behavior = Behavior::for_archetype(&ArchetypeConfig::preset(kind), Vec2::ZERO, 0);
            assert_eq!(behavior.kind(), kind);
            assert_eq!(behavior.as_boss().is_some(), kind == BehaviorKind::Boss);
            assert_eq!(behavior.as_flying().is_some(), kind.is_flying());
        }
    }
}
