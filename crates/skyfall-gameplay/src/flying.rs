//! Flying archetypes: the waypoint shooter (Enemy3) and the suicide charger.

use skyfall_common::{cooldown_ready, Millis, Vec2};
use tracing::{debug, trace};

use crate::archetype::{BehaviorKind, FlightConfig};
use crate::behavior::{aim_animation, turn_at_wall, ArchetypeBehavior, StepFlow};
use crate::enemy::{Animation, EnemyContext, EnemyCore, EnemyEffect, EnemyState, Sense};
use crate::events::EncounterEvent;

/// Distance at which a patrol waypoint counts as reached.
pub const WAYPOINT_REACHED: f32 = 6.0;

/// Waypoint patrol, sprint windows and cooldown-gated shots.
#[derive(Debug, Clone)]
pub struct FlyingBehavior {
    origin: Vec2,
    waypoint: Option<Vec2>,
    sprinting: bool,
    sprint_ends_at: Millis,
    next_sprint_at: Millis,
    last_bullet_at: Option<Millis>,
}

impl FlyingBehavior {
    /// Creates a flyer patrolling around `origin`.
    #[must_use]
    pub fn new(origin: Vec2, flight: &FlightConfig, now: Millis) -> Self {
        Self {
            origin,
            waypoint: None,
            sprinting: false,
            sprint_ends_at: now,
            next_sprint_at: now + flight.sprint_interval_ms,
            last_bullet_at: None,
        }
    }

    /// Spawn point the patrol circles.
    #[must_use]
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    /// Current patrol waypoint.
    #[must_use]
    pub fn waypoint(&self) -> Option<Vec2> {
        self.waypoint
    }

    /// Inside a sprint window.
    #[must_use]
    pub fn is_sprinting(&self) -> bool {
        self.sprinting
    }

    /// Time of the last shot.
    #[must_use]
    pub fn last_bullet_at(&self) -> Option<Millis> {
        self.last_bullet_at
    }

    /// Opens and closes sprint windows on schedule.
    pub fn update_sprint(&mut self, flight: &FlightConfig, now: Millis) {
        if self.sprinting && now >= self.sprint_ends_at {
            self.sprinting = false;
            self.next_sprint_at = now + flight.sprint_interval_ms;
        } else if !self.sprinting && now >= self.next_sprint_at {
            self.sprinting = true;
            self.sprint_ends_at = now + flight.sprint_duration_ms;
        }
    }

    fn cruise_speed(&self, core: &EnemyCore) -> f32 {
        if self.sprinting {
            core.config.speed * core.config.flight.sprint_multiplier
        } else {
            core.config.speed
        }
    }

    fn pick_waypoint(&self, core: &EnemyCore, rng: &mut fastrand::Rng) -> Vec2 {
        let radius = core.config.flight.patrol_radius;
        let dx = (rng.f32() * 2.0 - 1.0) * radius;
        let dy = (rng.f32() * 2.0 - 1.0) * radius * 0.5;
        self.origin + Vec2::new(dx, dy)
    }
}

/// Sets velocity toward `point` at `speed` and faces it.
pub fn fly_toward(core: &mut EnemyCore, point: Vec2, speed: f32) {
    core.velocity = (point - core.position).normalized() * speed;
    core.face_toward(point.x);
    core.play(Animation::Walk);
}

impl ArchetypeBehavior for FlyingBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::RangedFlying
    }

    fn pre_step(
        &mut self,
        core: &mut EnemyCore,
        _sense: &Sense,
        ctx: &mut EnemyContext<'_>,
    ) -> StepFlow {
        self.update_sprint(&core.config.flight, ctx.now);
        StepFlow::Continue
    }

    fn can_attack(&self, core: &EnemyCore, sense: &Sense, now: Millis) -> bool {
        sense.in_attack_range(&core.config)
            && core.state != EnemyState::Hurt
            && sense.line_of_sight
            && cooldown_ready(now, self.last_bullet_at, core.config.attack_cooldown_ms)
    }

    fn execute_attack(&mut self, core: &mut EnemyCore, sense: &Sense, ctx: &mut EnemyContext<'_>) {
        core.velocity = Vec2::ZERO;
        core.play(aim_animation(sense.offset));
        core.fire_at(ctx, sense.target.position);
        self.last_bullet_at = Some(ctx.now);
    }

    fn patrol(&mut self, core: &mut EnemyCore, ctx: &mut EnemyContext<'_>) {
        let waypoint = match self.waypoint {
            Some(point) if point.distance(core.position) > WAYPOINT_REACHED => point,
            _ => {
                let point = self.pick_waypoint(core, ctx.rng);
                trace!("Enemy {} heading to ({:.1}, {:.1})", core.id, point.x, point.y);
                self.waypoint = Some(point);
                point
            }
        };
        let speed = self.cruise_speed(core);
        fly_toward(core, waypoint, speed);
    }

    fn chase(&mut self, core: &mut EnemyCore, sense: &Sense, _ctx: &mut EnemyContext<'_>) {
        if sense.in_attack_range(&core.config) {
            core.velocity = Vec2::ZERO;
            core.face_toward(sense.target.position.x);
            core.play(Animation::Walk);
        } else {
            let speed = self.cruise_speed(core);
            fly_toward(core, sense.target.position, speed);
        }
    }

    fn handle_wall_collision(&mut self, core: &mut EnemyCore, ctx: &mut EnemyContext<'_>) {
        turn_at_wall(core, ctx);
        self.waypoint = None;
    }
}

// ============================================================================
// Suicide
// ============================================================================

/// Flyer that charges the player and detonates on contact.
#[derive(Debug, Clone)]
pub struct SuicideBehavior {
    flight: FlyingBehavior,
    charging: bool,
}

impl SuicideBehavior {
    /// Creates a charger patrolling around `origin`.
    #[must_use]
    pub fn new(origin: Vec2, flight: &FlightConfig, now: Millis) -> Self {
        Self {
            flight: FlyingBehavior::new(origin, flight, now),
            charging: false,
        }
    }

    /// Patrol and sprint state.
    #[must_use]
    pub fn flight(&self) -> &FlyingBehavior {
        &self.flight
    }

    /// Mid-charge.
    #[must_use]
    pub fn is_charging(&self) -> bool {
        self.charging
    }

    fn abort_charge(&mut self, core: &mut EnemyCore, ctx: &mut EnemyContext<'_>) {
        self.charging = false;
        debug!("Enemy {} aborted its charge", core.id);
        ctx.events
            .publish(EncounterEvent::ChargeAborted { enemy: core.id });
    }
}

impl ArchetypeBehavior for SuicideBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::Suicide
    }

    fn pre_step(
        &mut self,
        core: &mut EnemyCore,
        sense: &Sense,
        ctx: &mut EnemyContext<'_>,
    ) -> StepFlow {
        self.flight.update_sprint(&core.config.flight, ctx.now);
        let charge_speed = core.config.speed * core.config.suicide.charge_multiplier;

        if self.charging {
            if core.state == EnemyState::Hurt {
                core.velocity = Vec2::ZERO;
                self.abort_charge(core, ctx);
                return StepFlow::Handled;
            }

            if !sense.line_of_sight || !sense.detected(&core.config) {
                self.abort_charge(core, ctx);
                core.set_state(EnemyState::Patrolling, ctx.events);
                self.flight.patrol(core, ctx);
                return StepFlow::Handled;
            }

            let reach = core.config.suicide.contact_radius + sense.target.half_extents.x;
            if sense.distance() <= reach {
                self.charging = false;
                let amount = core.config.damage * core.config.suicide.damage_multiplier;
                debug!("Enemy {} detonated for {}", core.id, amount);
                ctx.effects.push(EnemyEffect::DamageTarget {
                    source: core.id,
                    amount,
                });
                core.die(ctx);
                return StepFlow::Handled;
            }

            fly_toward(core, sense.target.position, charge_speed);
            core.play(Animation::Attack);
            return StepFlow::Handled;
        }

        if core.state != EnemyState::Hurt
            && !core.is_attacking
            && sense.in_attack_range(&core.config)
            && sense.line_of_sight
        {
            self.charging = true;
            core.set_state(EnemyState::Attacking, ctx.events);
            ctx.events
                .publish(EncounterEvent::ChargeStarted { enemy: core.id });
            fly_toward(core, sense.target.position, charge_speed);
            core.play(Animation::Attack);
            return StepFlow::Handled;
        }

        StepFlow::Continue
    }

    fn can_attack(&self, _core: &EnemyCore, _sense: &Sense, _now: Millis) -> bool {
        false
    }

    fn execute_attack(&mut self, core: &mut EnemyCore, _sense: &Sense, _ctx: &mut EnemyContext<'_>) {
        core.velocity = Vec2::ZERO;
    }

    fn patrol(&mut self, core: &mut EnemyCore, ctx: &mut EnemyContext<'_>) {
        self.flight.patrol(core, ctx);
    }

    fn chase(&mut self, core: &mut EnemyCore, sense: &Sense, ctx: &mut EnemyContext<'_>) {
        self.flight.chase(core, sense, ctx);
    }

    fn handle_wall_collision(&mut self, core: &mut EnemyCore, ctx: &mut EnemyContext<'_>) {
        self.flight.handle_wall_collision(core, ctx);
    }
}
