//! Enemy state machine shared by every archetype.
//!
//! An [`Enemy`] is an [`EnemyCore`] (state, health, timers, movement intent)
//! plus a [`Behavior`] variant that decides how it attacks and moves. All
//! collaborators are borrowed per call through [`EnemyContext`]; an enemy
//! never owns the player, the tile layer or the projectile store.

use serde::{Deserialize, Serialize};
use skyfall_common::{EntityId, Millis, ProjectileId, Rect, Vec2};
use tracing::{debug, trace};

use crate::archetype::{AnimationKeys, ArchetypeConfig, BehaviorKind};
use crate::behavior::{ArchetypeBehavior, Behavior, StepFlow};
use crate::events::{EncounterEvent, EventBus};
use crate::projectile::{Owner, ProjectilePool, ProjectileSink, ProjectileSpec};
use crate::scheduler::{EnemyTask, ScheduledTask, Scheduler};
use crate::target::TargetView;
use crate::terrain::{line_obstructed, TerrainQuery};

/// Distance an enemy is pushed away from a wall it walked into.
pub const WALL_NUDGE: f32 = 2.0;

/// Delay before pursuit is retried after a wall collision.
pub const CHASE_RETRY_DELAY: Millis = 1_000;

// ============================================================================
// State
// ============================================================================

/// Finite-state machine state. `Dead` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnemyState {
    /// Wandering without a target.
    Patrolling,
    /// Pursuing the player.
    Chasing,
    /// Inside an attack window or a charge.
    Attacking,
    /// Stunned after taking damage.
    Hurt,
    /// Dying or dead.
    Dead,
}

/// Horizontal facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Facing {
    /// Facing -x.
    Left,
    /// Facing +x.
    #[default]
    Right,
}

impl Facing {
    /// -1 for left, +1 for right.
    #[must_use]
    pub const fn sign(self) -> f32 {
        match self {
            Self::Left => -1.0,
            Self::Right => 1.0,
        }
    }

    /// The opposite facing.
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    /// Facing that points along `dx`. Zero faces right.
    #[must_use]
    pub fn toward(dx: f32) -> Self {
        if dx < 0.0 {
            Self::Left
        } else {
            Self::Right
        }
    }
}

/// Animation the renderer should play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Animation {
    /// Standing still.
    Idle,
    /// Walking or flying.
    Walk,
    /// Horizontal attack.
    Attack,
    /// Upward attack.
    AttackUp,
    /// Downward attack.
    AttackDown,
    /// Hurt reaction.
    Hurt,
    /// Death.
    Death,
    /// Boss special skill.
    Special,
}

impl Animation {
    /// Resolves the archetype's key for this animation.
    #[must_use]
    pub fn key(self, keys: &AnimationKeys) -> &str {
        match self {
            Self::Idle => &keys.idle,
            Self::Walk => &keys.walk,
            Self::Attack => &keys.attack,
            Self::AttackUp => &keys.attack_up,
            Self::AttackDown => &keys.attack_down,
            Self::Hurt => &keys.hurt,
            Self::Death => &keys.death,
            Self::Special => &keys.special,
        }
    }
}

/// Which sides of the body touch solid terrain or the map bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BodyContact {
    /// Solid directly left of the body.
    pub blocked_left: bool,
    /// Solid directly right of the body.
    pub blocked_right: bool,
}

impl BodyContact {
    /// Returns true if the side faced by `facing` is blocked.
    #[must_use]
    pub fn blocked(self, facing: Facing) -> bool {
        match facing {
            Facing::Left => self.blocked_left,
            Facing::Right => self.blocked_right,
        }
    }
}

// ============================================================================
// Context
// ============================================================================

/// Requests an enemy leaves for the encounter to carry out.
#[derive(Debug, Clone, PartialEq)]
pub enum EnemyEffect {
    /// Damage the player.
    DamageTarget {
        /// Attacking enemy.
        source: EntityId,
        /// Damage dealt.
        amount: f32,
    },
    /// Spawn enemies at the given positions.
    SpawnReinforcements {
        /// Summoning enemy.
        source: EntityId,
        /// Archetype key to spawn.
        archetype: String,
        /// Ground contact point (x, bottom y) for each spawn.
        positions: Vec<Vec2>,
    },
}

/// Collaborators borrowed by an enemy for one call.
pub struct EnemyContext<'a> {
    /// Current game time.
    pub now: Millis,
    /// The player, if present and alive.
    pub target: Option<TargetView>,
    /// Tile layer, if any.
    pub terrain: Option<&'a dyn TerrainQuery>,
    /// Map bounds, if any.
    pub bounds: Option<Rect>,
    /// Delayed task queue.
    pub scheduler: &'a mut Scheduler,
    /// Projectile store.
    pub projectiles: &'a mut dyn ProjectileSink,
    /// Effects for the encounter to apply.
    pub effects: &'a mut Vec<EnemyEffect>,
    /// Event bus.
    pub events: &'a EventBus,
    /// Random source.
    pub rng: &'a mut fastrand::Rng,
}

/// World services an encounter lends to its enemies.
pub struct Stage {
    /// Current game time.
    pub now: Millis,
    /// Tile layer.
    pub terrain: Option<Box<dyn TerrainQuery>>,
    /// Map bounds.
    pub bounds: Option<Rect>,
    /// Delayed task queue.
    pub scheduler: Scheduler,
    /// Projectiles in flight.
    pub projectiles: ProjectilePool,
    /// Effects waiting to be applied.
    pub effects: Vec<EnemyEffect>,
    /// Event bus.
    pub events: EventBus,
    /// Random source.
    pub rng: fastrand::Rng,
}

impl Stage {
    /// Creates an empty stage with a seeded random source.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            now: 0,
            terrain: None,
            bounds: None,
            scheduler: Scheduler::new(),
            projectiles: ProjectilePool::new(),
            effects: Vec::new(),
            events: EventBus::default(),
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    /// Borrows the stage as an enemy context.
    pub fn context(&mut self, target: Option<TargetView>) -> EnemyContext<'_> {
        EnemyContext {
            now: self.now,
            target,
            terrain: self.terrain.as_deref(),
            bounds: self.bounds,
            scheduler: &mut self.scheduler,
            projectiles: &mut self.projectiles,
            effects: &mut self.effects,
            events: &self.events,
            rng: &mut self.rng,
        }
    }
}

/// What an enemy perceives of the player this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sense {
    /// Player snapshot.
    pub target: TargetView,
    /// Player position minus enemy position.
    pub offset: Vec2,
    /// Absolute horizontal distance.
    pub horizontal: f32,
    /// Absolute vertical distance.
    pub vertical: f32,
    /// No colliding tile between enemy and player.
    pub line_of_sight: bool,
}

impl Sense {
    /// Observes the player from the enemy's position.
    ///
    /// Line of sight is only sampled when `check_sight` is set; otherwise it
    /// reads as clear.
    #[must_use]
    pub fn observe(
        core: &EnemyCore,
        target: TargetView,
        terrain: Option<&dyn TerrainQuery>,
        check_sight: bool,
    ) -> Self {
        let offset = target.position - core.position;
        let line_of_sight =
            !check_sight || !line_obstructed(terrain, core.position, target.position);
        Self {
            target,
            offset,
            horizontal: offset.x.abs(),
            vertical: offset.y.abs(),
            line_of_sight,
        }
    }

    /// Straight-line distance to the player.
    #[must_use]
    pub fn distance(&self) -> f32 {
        self.offset.length()
    }

    /// Within detection range horizontally and vertical tolerance.
    #[must_use]
    pub fn detected(&self, config: &ArchetypeConfig) -> bool {
        self.horizontal <= config.detection_range && self.vertical <= config.vertical_tolerance
    }

    /// Within attack range horizontally and vertical tolerance.
    #[must_use]
    pub fn in_attack_range(&self, config: &ArchetypeConfig) -> bool {
        self.horizontal <= config.attack_range && self.vertical <= config.vertical_tolerance
    }
}

// ============================================================================
// Enemy Core
// ============================================================================

/// State shared by every archetype.
#[derive(Debug, Clone)]
pub struct EnemyCore {
    pub(crate) id: EntityId,
    pub(crate) config: ArchetypeConfig,
    pub(crate) position: Vec2,
    pub(crate) velocity: Vec2,
    pub(crate) health: f32,
    pub(crate) state: EnemyState,
    pub(crate) facing: Facing,
    pub(crate) last_attack_at: Option<Millis>,
    pub(crate) is_attacking: bool,
    pub(crate) attack_damage_dealt: bool,
    pub(crate) hitbox_enabled: bool,
    hurt_pending: bool,
    pub(crate) animation: Animation,
    pub(crate) contact: BodyContact,
    pub(crate) epoch: u64,
    pub(crate) chase_retry: Option<u64>,
    next_retry_token: u64,
    pub(crate) destroyed: bool,
}

impl EnemyCore {
    /// Creates a patrolling enemy at full health.
    #[must_use]
    pub fn new(config: ArchetypeConfig, position: Vec2) -> Self {
        Self {
            id: EntityId::new(),
            health: config.max_health,
            config,
            position,
            velocity: Vec2::ZERO,
            state: EnemyState::Patrolling,
            facing: Facing::default(),
            last_attack_at: None,
            is_attacking: false,
            attack_damage_dealt: false,
            hitbox_enabled: false,
            hurt_pending: false,
            animation: Animation::Idle,
            contact: BodyContact::default(),
            epoch: 0,
            chase_retry: None,
            next_retry_token: 0,
            destroyed: false,
        }
    }

    /// Entity ID.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Archetype tuning.
    #[must_use]
    pub fn config(&self) -> &ArchetypeConfig {
        &self.config
    }

    /// Body centre.
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Movement intent in units per second.
    #[must_use]
    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    /// Current health.
    #[must_use]
    pub fn health(&self) -> f32 {
        self.health
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> EnemyState {
        self.state
    }

    /// Current facing.
    #[must_use]
    pub fn facing(&self) -> Facing {
        self.facing
    }

    /// Time the last attack finished.
    #[must_use]
    pub fn last_attack_at(&self) -> Option<Millis> {
        self.last_attack_at
    }

    /// Inside an attack window.
    #[must_use]
    pub fn is_attacking(&self) -> bool {
        self.is_attacking
    }

    /// Current animation.
    #[must_use]
    pub fn animation(&self) -> Animation {
        self.animation
    }

    /// Archetype key of the current animation.
    #[must_use]
    pub fn animation_key(&self) -> &str {
        self.animation.key(&self.config.animations)
    }

    /// Liveness generation; bumped on death.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Terrain contact from the last integration step.
    #[must_use]
    pub fn contact(&self) -> BodyContact {
        self.contact
    }

    /// A wall-collision chase retry is pending.
    #[must_use]
    pub fn chase_retry_pending(&self) -> bool {
        self.chase_retry.is_some()
    }

    /// Death animation has completed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Body rectangle.
    #[must_use]
    pub fn body(&self) -> Rect {
        let dims = self.config.body;
        Rect::from_center(self.position, dims.width / 2.0, dims.height / 2.0)
    }

    /// Attack hitbox in front of the body, while enabled.
    #[must_use]
    pub fn hitbox(&self) -> Option<Rect> {
        if !self.hitbox_enabled {
            return None;
        }
        let body = self.config.body;
        let hitbox = self.config.hitbox;
        let reach = (body.width + hitbox.width) / 2.0;
        let center = Vec2::new(self.position.x + self.facing.sign() * reach, self.position.y);
        Some(Rect::from_center(center, hitbox.width / 2.0, hitbox.height / 2.0))
    }

    /// Direction of horizontal travel, if moving.
    #[must_use]
    pub fn heading(&self) -> Option<Facing> {
        if self.velocity.x.abs() > f32::EPSILON {
            Some(Facing::toward(self.velocity.x))
        } else {
            None
        }
    }

    /// Moving toward a blocked side.
    #[must_use]
    pub fn blocked_ahead(&self) -> bool {
        self.heading().is_some_and(|h| self.contact.blocked(h))
    }

    pub(crate) fn set_state(&mut self, to: EnemyState, events: &EventBus) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        debug!("Enemy {} {:?} -> {:?}", self.id, from, to);
        events.publish(EncounterEvent::StateChanged {
            enemy: self.id,
            from,
            to,
        });
    }

    pub(crate) fn play(&mut self, animation: Animation) {
        self.animation = animation;
    }

    pub(crate) fn face_toward(&mut self, x: f32) {
        let dx = x - self.position.x;
        if dx.abs() > f32::EPSILON {
            self.facing = Facing::toward(dx);
        }
    }

    pub(crate) fn schedule(&self, ctx: &mut EnemyContext<'_>, delay: Millis, task: EnemyTask) {
        ctx.scheduler
            .schedule_once(ctx.now, delay, self.id, self.epoch, task);
    }

    /// Fires the archetype projectile from the body centre toward `at`.
    pub(crate) fn fire_at(&self, ctx: &mut EnemyContext<'_>, at: Vec2) -> ProjectileId {
        let settings = &self.config.projectile;
        let spec = ProjectileSpec::aimed(
            Owner::Enemy(self.id),
            self.position,
            at,
            settings.speed,
            self.config.damage,
        )
        .with_lifespan(settings.lifespan_ms)
        .with_sprite(settings.sprite.clone())
        .with_radius(settings.radius);

        let id = ctx.projectiles.spawn(spec, ctx.now);
        ctx.events.publish(EncounterEvent::ProjectileFired {
            enemy: self.id,
            position: self.position,
        });
        id
    }

    /// Enters `Dead` and schedules removal. Invalidates every pending task.
    pub(crate) fn die(&mut self, ctx: &mut EnemyContext<'_>) {
        if self.state == EnemyState::Dead {
            trace!("Enemy {} already dead", self.id);
            return;
        }
        self.set_state(EnemyState::Dead, ctx.events);
        self.velocity = Vec2::ZERO;
        self.hitbox_enabled = false;
        self.is_attacking = false;
        self.chase_retry = None;
        self.play(Animation::Death);
        self.epoch += 1;
        self.schedule(ctx, self.config.death_duration_ms, EnemyTask::DeathFinished);
        debug!("Enemy {} ({}) died", self.id, self.config.key);
        ctx.events.publish(EncounterEvent::EnemyDied { enemy: self.id });
    }

    /// Demotes pursuit and blocks re-promotion until the retry fires.
    pub(crate) fn request_chase_retry(&mut self, ctx: &mut EnemyContext<'_>) {
        self.next_retry_token += 1;
        let token = self.next_retry_token;
        self.chase_retry = Some(token);
        self.schedule(ctx, CHASE_RETRY_DELAY, EnemyTask::ChaseRetry { token });
    }

    /// Picks `Chasing` or `Patrolling` from current distances.
    pub(crate) fn settle(&mut self, ctx: &mut EnemyContext<'_>, check_sight: bool) {
        let chase = ctx.target.is_some_and(|target| {
            let sense = Sense::observe(self, target, ctx.terrain, check_sight);
            self.wants_chase(&sense, check_sight)
        });
        let next = if chase {
            EnemyState::Chasing
        } else {
            EnemyState::Patrolling
        };
        self.set_state(next, ctx.events);
        self.play(Animation::Walk);
    }

    pub(crate) fn wants_chase(&self, sense: &Sense, check_sight: bool) -> bool {
        sense.detected(&self.config)
            && (!check_sight || sense.line_of_sight)
            && self.chase_retry.is_none()
    }
}

// ============================================================================
// Enemy
// ============================================================================

/// An enemy: shared state machine plus its archetype behaviour.
#[derive(Debug, Clone)]
pub struct Enemy {
    core: EnemyCore,
    behavior: Behavior,
}

impl Enemy {
    /// Builds an enemy from an archetype at `position` (body centre).
    #[must_use]
    pub fn spawn(config: ArchetypeConfig, position: Vec2, now: Millis) -> Self {
        let behavior = Behavior::for_archetype(&config, position, now);
        let core = EnemyCore::new(config, position);
        debug!(
            "Spawned {} ({}) at ({:.1}, {:.1})",
            core.id, core.config.key, position.x, position.y
        );
        Self { core, behavior }
    }

    /// Entity ID.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.core.id
    }

    /// Shared state.
    #[must_use]
    pub fn core(&self) -> &EnemyCore {
        &self.core
    }

    pub(crate) fn core_mut(&mut self) -> &mut EnemyCore {
        &mut self.core
    }

    /// Archetype behaviour.
    #[must_use]
    pub fn behavior(&self) -> &Behavior {
        &self.behavior
    }

    /// Behaviour variant.
    #[must_use]
    pub fn kind(&self) -> BehaviorKind {
        self.behavior.kind()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> EnemyState {
        self.core.state
    }

    /// Current health.
    #[must_use]
    pub fn health(&self) -> f32 {
        self.core.health
    }

    /// Body centre.
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.core.position
    }

    /// Movement intent.
    #[must_use]
    pub fn velocity(&self) -> Vec2 {
        self.core.velocity
    }

    /// Current facing.
    #[must_use]
    pub fn facing(&self) -> Facing {
        self.core.facing
    }

    /// Current animation.
    #[must_use]
    pub fn animation(&self) -> Animation {
        self.core.animation
    }

    /// Attack hitbox, while enabled.
    #[must_use]
    pub fn hitbox(&self) -> Option<Rect> {
        self.core.hitbox()
    }

    /// Death animation has completed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.core.destroyed
    }

    fn sense(&self, ctx: &EnemyContext<'_>) -> Option<Sense> {
        let check_sight = self.behavior.as_dyn().uses_line_of_sight();
        ctx.target
            .map(|target| Sense::observe(&self.core, target, ctx.terrain, check_sight))
    }

    /// Runs one tick of the state machine.
    pub fn step(&mut self, ctx: &mut EnemyContext<'_>) {
        if self.core.state == EnemyState::Dead || self.core.destroyed {
            return;
        }
        let Some(sense) = self.sense(ctx) else {
            trace!("Enemy {} has no target", self.core.id);
            return;
        };

        let Self { core, behavior } = self;
        let behavior = behavior.as_dyn_mut();

        if behavior.pre_step(core, &sense, ctx) == StepFlow::Handled {
            return;
        }

        if matches!(core.state, EnemyState::Patrolling | EnemyState::Chasing)
            && core.blocked_ahead()
        {
            behavior.handle_wall_collision(core, ctx);
            return;
        }

        if core.is_attacking {
            return;
        }

        if behavior.can_attack(core, &sense, ctx.now) {
            begin_attack(core, behavior, &sense, ctx);
            return;
        }

        if core.state == EnemyState::Hurt {
            return;
        }

        if core.wants_chase(&sense, behavior.uses_line_of_sight()) {
            core.set_state(EnemyState::Chasing, ctx.events);
            behavior.chase(core, &sense, ctx);
        } else {
            core.set_state(EnemyState::Patrolling, ctx.events);
            behavior.patrol(core, ctx);
        }
    }

    /// Starts an attack on the player. No-op while attacking, hurt, dead or
    /// without a player.
    pub fn attack(&mut self, ctx: &mut EnemyContext<'_>) {
        if self.core.is_attacking
            || matches!(self.core.state, EnemyState::Hurt | EnemyState::Dead)
        {
            trace!("Enemy {} cannot start an attack now", self.core.id);
            return;
        }
        let Some(sense) = self.sense(ctx) else {
            return;
        };
        begin_attack(&mut self.core, self.behavior.as_dyn_mut(), &sense, ctx);
    }

    /// Applies damage. Damage taken while hurt accumulates without
    /// restarting the hurt window.
    pub fn take_damage(&mut self, amount: f32, ctx: &mut EnemyContext<'_>) {
        let core = &mut self.core;
        if core.state == EnemyState::Dead {
            trace!("Ignoring damage to dead enemy {}", core.id);
            return;
        }

        core.health -= amount;
        ctx.events.publish(EncounterEvent::EnemyDamaged {
            enemy: core.id,
            damage: amount,
            health: core.health,
        });

        if core.state != EnemyState::Hurt {
            core.set_state(EnemyState::Hurt, ctx.events);
            core.velocity.x = 0.0;
            core.play(Animation::Hurt);
            if !core.hurt_pending {
                core.hurt_pending = true;
                core.schedule(ctx, core.config.hurt_duration_ms, EnemyTask::HurtRecovered);
            }
        }
    }

    /// Kills the enemy. Removal follows after the death animation.
    pub fn die(&mut self, ctx: &mut EnemyContext<'_>) {
        self.core.die(ctx);
    }

    /// Enters `Chasing` and applies archetype pursuit movement. No-op while
    /// hurt or dead.
    pub fn chase(&mut self, ctx: &mut EnemyContext<'_>) {
        if matches!(self.core.state, EnemyState::Hurt | EnemyState::Dead) {
            trace!("Enemy {} cannot chase now", self.core.id);
            return;
        }
        let Some(sense) = self.sense(ctx) else {
            return;
        };
        self.core.set_state(EnemyState::Chasing, ctx.events);
        self.behavior.as_dyn_mut().chase(&mut self.core, &sense, ctx);
    }

    /// Enters `Patrolling` and applies archetype patrol movement. No-op while
    /// hurt or dead.
    pub fn patrol(&mut self, ctx: &mut EnemyContext<'_>) {
        if matches!(self.core.state, EnemyState::Hurt | EnemyState::Dead) {
            trace!("Enemy {} cannot patrol now", self.core.id);
            return;
        }
        self.core.set_state(EnemyState::Patrolling, ctx.events);
        self.behavior.as_dyn_mut().patrol(&mut self.core, ctx);
    }

    /// Runs a scheduled task. Stale tasks are dropped.
    pub fn run_task(&mut self, task: &ScheduledTask, ctx: &mut EnemyContext<'_>) {
        let Self { core, behavior } = self;
        let behavior = behavior.as_dyn_mut();

        if task.epoch != core.epoch || core.destroyed {
            trace!("Dropping stale {:?} for enemy {}", task.task, core.id);
            return;
        }

        match task.task {
            EnemyTask::FinishAttack => {
                core.hitbox_enabled = false;
                core.last_attack_at = Some(ctx.now);
                core.is_attacking = false;
                if !matches!(core.state, EnemyState::Hurt | EnemyState::Dead)
                    && !behavior.suspends_pursuit()
                {
                    core.settle(ctx, behavior.uses_line_of_sight());
                }
            }
            EnemyTask::HurtRecovered => {
                if !core.hurt_pending {
                    return;
                }
                core.hurt_pending = false;
                if core.health <= 0.0 {
                    core.die(ctx);
                } else if core.state != EnemyState::Hurt {
                    trace!("Enemy {} already left hurt as {:?}", core.id, core.state);
                } else if behavior.suspends_pursuit() {
                    core.set_state(EnemyState::Patrolling, ctx.events);
                } else {
                    core.settle(ctx, behavior.uses_line_of_sight());
                }
            }
            EnemyTask::DeathFinished => {
                debug!("Enemy {} death animation finished", core.id);
                core.destroyed = true;
            }
            EnemyTask::ChaseRetry { token } => {
                if core.chase_retry != Some(token) {
                    trace!("Dropping superseded chase retry for {}", core.id);
                    return;
                }
                core.chase_retry = None;
                if core.state == EnemyState::Patrolling && !behavior.suspends_pursuit() {
                    core.settle(ctx, behavior.uses_line_of_sight());
                }
            }
            other => {
                if behavior.on_task(core, other, ctx)
                    && !matches!(core.state, EnemyState::Hurt | EnemyState::Dead)
                {
                    core.settle(ctx, behavior.uses_line_of_sight());
                }
            }
        }
    }
}

fn begin_attack(
    core: &mut EnemyCore,
    behavior: &mut dyn ArchetypeBehavior,
    sense: &Sense,
    ctx: &mut EnemyContext<'_>,
) {
    core.set_state(EnemyState::Attacking, ctx.events);
    core.is_attacking = true;
    core.attack_damage_dealt = false;
    core.velocity.x = 0.0;
    core.hitbox_enabled = true;
    core.face_toward(sense.target.position.x);
    core.play(Animation::Attack);

    behavior.execute_attack(core, sense, ctx);
    core.schedule(ctx, core.config.attack_duration_ms, EnemyTask::FinishAttack);

    ctx.events.publish(EncounterEvent::AttackStarted {
        enemy: core.id,
        animation: core.animation_key().to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::ArchetypeConfig;
    use crate::terrain::TileMap;

    fn melee_at(x: f32, y: f32) -> Enemy {
        Enemy::spawn(
            ArchetypeConfig::preset(BehaviorKind::Melee),
            Vec2::new(x, y),
            0,
        )
    }

    fn player_at(x: f32, y: f32) -> TargetView {
        TargetView {
            position: Vec2::new(x, y),
            half_extents: Vec2::new(12.0, 24.0),
        }
    }

    fn run_due(stage: &mut Stage, enemy: &mut Enemy, target: Option<TargetView>) {
        while let Some(task) = stage.scheduler.pop_due(stage.now) {
            let mut ctx = stage.context(target);
            enemy.run_task(&task, &mut ctx);
        }
    }

    #[test]
    fn test_facing() {
        assert_eq!(Facing::Left.sign(), -1.0);
        assert_eq!(Facing::Left.flipped(), Facing::Right);
        assert_eq!(Facing::toward(-3.0), Facing::Left);
    }

    #[test]
    fn test_dead_is_terminal() {
        let mut stage = Stage::new(1);
        let mut enemy = melee_at(0.0, 0.0);
        let target = Some(player_at(40.0, 0.0));

        let mut ctx = stage.context(target);
        enemy.die(&mut ctx);
        assert_eq!(enemy.state(), EnemyState::Dead);

        let health = enemy.health();
        enemy.take_damage(50.0, &mut ctx);
        enemy.attack(&mut ctx);
        enemy.chase(&mut ctx);
        enemy.patrol(&mut ctx);
        enemy.step(&mut ctx);

        assert_eq!(enemy.state(), EnemyState::Dead);
        assert_eq!(enemy.health(), health);
        assert!(!enemy.core().is_attacking());
    }

    #[test]
    fn test_attack_while_attacking_is_noop() {
        let mut stage = Stage::new(1);
        let mut enemy = melee_at(0.0, 0.0);
        let mut ctx = stage.context(Some(player_at(40.0, 0.0)));

        enemy.attack(&mut ctx);
        assert!(enemy.core().is_attacking());
        let pending = ctx.scheduler.len();

        enemy.attack(&mut ctx);
        assert_eq!(ctx.scheduler.len(), pending);
        assert_eq!(enemy.state(), EnemyState::Attacking);
    }

    #[test]
    fn test_melee_attack_cycle() {
        let mut stage = Stage::new(1);
        let mut enemy = melee_at(0.0, 0.0);
        let target = Some(player_at(40.0, 10.0));

        stage.now = 16;
        enemy.step(&mut stage.context(target));
        assert_eq!(enemy.state(), EnemyState::Attacking);
        assert!(enemy.hitbox().is_some());

        stage.now = 16 + 300;
        run_due(&mut stage, &mut enemy, target);
        assert_eq!(
            stage.effects,
            vec![EnemyEffect::DamageTarget {
                source: enemy.id(),
                amount: 10.0
            }]
        );

        stage.now = 16 + 600;
        run_due(&mut stage, &mut enemy, target);
        assert!(!enemy.core().is_attacking());
        assert_eq!(enemy.core().last_attack_at(), Some(616));
        assert!(enemy.hitbox().is_none());
        assert_eq!(enemy.state(), EnemyState::Chasing);
        assert_eq!(stage.effects.len(), 1);
    }

    #[test]
    fn test_attack_respects_cooldown() {
        let mut stage = Stage::new(1);
        let mut enemy = melee_at(0.0, 0.0);
        let target = Some(player_at(40.0, 0.0));

        enemy.step(&mut stage.context(target));
        stage.now = 600;
        run_due(&mut stage, &mut enemy, target);

        stage.now = 1_000;
        enemy.step(&mut stage.context(target));
        assert_eq!(enemy.state(), EnemyState::Chasing);

        stage.now = 1_600;
        enemy.step(&mut stage.context(target));
        assert_eq!(enemy.state(), EnemyState::Attacking);
    }

    #[test]
    fn test_hurt_accumulates_and_recovers() {
        let mut stage = Stage::new(1);
        let mut enemy = melee_at(0.0, 0.0);
        let target = Some(player_at(500.0, 0.0));

        enemy.take_damage(10.0, &mut stage.context(target));
        enemy.take_damage(15.0, &mut stage.context(target));
        assert_eq!(enemy.state(), EnemyState::Hurt);
        assert_eq!(enemy.health(), 75.0);
        assert_eq!(stage.scheduler.len(), 1);

        stage.now = 300;
        run_due(&mut stage, &mut enemy, target);
        assert_eq!(enemy.state(), EnemyState::Patrolling);
    }

    #[test]
    fn test_lethal_damage_dies_after_hurt() {
        let mut stage = Stage::new(1);
        let mut enemy = melee_at(0.0, 0.0);

        enemy.take_damage(150.0, &mut stage.context(None));
        assert_eq!(enemy.state(), EnemyState::Hurt);

        stage.now = 300;
        run_due(&mut stage, &mut enemy, None);
        assert_eq!(enemy.state(), EnemyState::Dead);
        assert!(!enemy.is_destroyed());

        stage.now = 300 + 800;
        run_due(&mut stage, &mut enemy, None);
        assert!(enemy.is_destroyed());
    }

    #[test]
    fn test_hurt_stun_holds_with_player_in_range() {
        let mut stage = Stage::new(1);
        let mut enemy = melee_at(0.0, 0.0);
        let target = Some(player_at(100.0, 0.0));

        enemy.take_damage(10.0, &mut stage.context(target));
        for now in [16, 100, 200, 284] {
            stage.now = now;
            enemy.step(&mut stage.context(target));
            assert_eq!(enemy.state(), EnemyState::Hurt);
            assert_eq!(enemy.velocity(), Vec2::ZERO);
        }

        enemy.chase(&mut stage.context(target));
        enemy.patrol(&mut stage.context(target));
        enemy.attack(&mut stage.context(target));
        assert_eq!(enemy.state(), EnemyState::Hurt);
        assert!(!enemy.core().is_attacking());

        stage.now = 300;
        run_due(&mut stage, &mut enemy, target);
        assert_eq!(enemy.state(), EnemyState::Chasing);
    }

    #[test]
    fn test_lethal_hurt_cannot_be_escaped() {
        let mut stage = Stage::new(1);
        let mut enemy = melee_at(0.0, 0.0);
        let target = Some(player_at(40.0, 0.0));

        enemy.take_damage(150.0, &mut stage.context(target));
        enemy.patrol(&mut stage.context(target));
        enemy.chase(&mut stage.context(target));
        enemy.attack(&mut stage.context(target));
        assert_eq!(enemy.health(), -50.0);

        stage.now = 300;
        run_due(&mut stage, &mut enemy, target);
        assert_eq!(enemy.state(), EnemyState::Dead);

        stage.now = 10_000;
        run_due(&mut stage, &mut enemy, target);
        enemy.step(&mut stage.context(target));
        assert!(enemy.is_destroyed());
        assert!(stage.effects.is_empty());
    }

    #[test]
    fn test_death_invalidates_pending_tasks() {
        let mut stage = Stage::new(1);
        let mut enemy = melee_at(0.0, 0.0);
        let target = Some(player_at(40.0, 0.0));

        enemy.attack(&mut stage.context(target));
        enemy.die(&mut stage.context(target));

        stage.now = 1_000;
        run_due(&mut stage, &mut enemy, target);
        assert!(stage.effects.is_empty());
        assert_eq!(enemy.core().last_attack_at(), None);
        assert!(enemy.is_destroyed());
    }

    #[test]
    fn test_step_without_target_is_noop() {
        let mut stage = Stage::new(1);
        let mut enemy = melee_at(0.0, 0.0);
        enemy.step(&mut stage.context(None));
        assert_eq!(enemy.state(), EnemyState::Patrolling);
        assert_eq!(enemy.velocity(), Vec2::ZERO);
    }

    #[test]
    fn test_wall_collision_demotes_and_retries() {
        let mut stage = Stage::new(1);
        let mut enemy = melee_at(0.0, 0.0);
        let target = Some(player_at(150.0, 0.0));

        enemy.step(&mut stage.context(target));
        assert_eq!(enemy.state(), EnemyState::Chasing);
        assert_eq!(enemy.facing(), Facing::Right);

        enemy.core_mut().contact.blocked_right = true;
        stage.now = 16;
        enemy.step(&mut stage.context(target));
        assert_eq!(enemy.state(), EnemyState::Patrolling);
        assert_eq!(enemy.facing(), Facing::Left);
        assert!(enemy.velocity().x < 0.0);
        assert_eq!(enemy.position().x, -WALL_NUDGE);
        assert!(enemy.core().chase_retry_pending());

        enemy.core_mut().contact.blocked_right = false;
        stage.now = 500;
        enemy.step(&mut stage.context(target));
        assert_eq!(enemy.state(), EnemyState::Patrolling);

        stage.now = 16 + CHASE_RETRY_DELAY;
        run_due(&mut stage, &mut enemy, target);
        assert!(!enemy.core().chase_retry_pending());
        assert_eq!(enemy.state(), EnemyState::Chasing);
    }

    #[test]
    fn test_sense_line_of_sight() {
        let mut map = TileMap::new(10.0);
        map.set_solid_at_world(50.0, 0.0);
        let enemy = melee_at(0.0, 0.0);
        let view = player_at(100.0, 0.0);

        let sense = Sense::observe(enemy.core(), view, Some(&map), true);
        assert!(!sense.line_of_sight);
        assert_eq!(sense.horizontal, 100.0);

        let ignoring = Sense::observe(enemy.core(), view, Some(&map), false);
        assert!(ignoring.line_of_sight);
    }

    #[test]
    fn test_state_changes_are_published() {
        let mut stage = Stage::new(1);
        let mut enemy = melee_at(0.0, 0.0);
        enemy.step(&mut stage.context(Some(player_at(40.0, 0.0))));

        let events = stage.events.drain();
        assert!(events.contains(&EncounterEvent::StateChanged {
            enemy: enemy.id(),
            from: EnemyState::Patrolling,
            to: EnemyState::Attacking,
        }));
        assert!(events
            .iter()
            .any(|e| matches!(e, EncounterEvent::AttackStarted { animation, .. } if animation == "enemy1_attack")));
    }
}
