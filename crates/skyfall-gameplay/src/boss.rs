//! Boss behaviour and its special skill.
//!
//! The boss fights like a stationary gunner. Every `special.cooldown_ms` it
//! channels a special skill for `special.duration_ms`, then a coin flip
//! either summons reinforcements or drops a row of falling hazards.

use skyfall_common::{cooldown_ready, Millis, Vec2};
use tracing::debug;

use crate::archetype::BehaviorKind;
use crate::behavior::{ArchetypeBehavior, StepFlow};
use crate::enemy::{Animation, EnemyContext, EnemyCore, EnemyEffect, EnemyState, Sense};
use crate::events::{EncounterEvent, SpecialOutcome};
use crate::projectile::{Owner, ProjectileSpec};
use crate::scheduler::EnemyTask;

/// Sprite key used for hazard projectiles.
pub const HAZARD_SPRITE: &str = "hazard";

/// Boss special-skill state.
#[derive(Debug, Clone)]
pub struct BossBehavior {
    is_special: bool,
    last_special_at: Millis,
    specials_used: u32,
}

impl BossBehavior {
    /// Creates a boss whose first special is gated from `spawned_at`.
    #[must_use]
    pub fn new(spawned_at: Millis) -> Self {
        Self {
            is_special: false,
            last_special_at: spawned_at,
            specials_used: 0,
        }
    }

    /// Channelling a special skill.
    #[must_use]
    pub fn is_special(&self) -> bool {
        self.is_special
    }

    /// End of the last special, or the spawn time before the first.
    #[must_use]
    pub fn last_special_at(&self) -> Millis {
        self.last_special_at
    }

    /// Number of specials completed.
    #[must_use]
    pub fn specials_used(&self) -> u32 {
        self.specials_used
    }

    fn can_special(&self, core: &EnemyCore, now: Millis) -> bool {
        !self.is_special
            && core.state != EnemyState::Hurt
            && !core.is_attacking
            && cooldown_ready(now, Some(self.last_special_at), core.config.special.cooldown_ms)
    }

    fn start_special(&mut self, core: &mut EnemyCore, ctx: &mut EnemyContext<'_>) {
        self.is_special = true;
        core.velocity = Vec2::ZERO;
        core.play(Animation::Special);
        core.schedule(ctx, core.config.special.duration_ms, EnemyTask::SpecialFinished);
        debug!("Boss {} started its special", core.id);
        ctx.events
            .publish(EncounterEvent::SpecialStarted { enemy: core.id });
    }

    fn finish_special(&mut self, core: &mut EnemyCore, ctx: &mut EnemyContext<'_>) {
        self.is_special = false;
        self.last_special_at = ctx.now;
        self.specials_used += 1;

        let outcome = if ctx.rng.bool() {
            summon_reinforcements(core, ctx);
            SpecialOutcome::Reinforcements
        } else {
            drop_hazards(core, ctx);
            SpecialOutcome::HazardRain
        };

        debug!("Boss {} special resolved as {:?}", core.id, outcome);
        ctx.events.publish(EncounterEvent::SpecialFinished {
            enemy: core.id,
            outcome,
        });
    }
}

/// Asks the encounter for reinforcements near the boss's feet.
fn summon_reinforcements(core: &EnemyCore, ctx: &mut EnemyContext<'_>) {
    let special = &core.config.special;
    let feet = core.body().max_y;
    let positions = (0..special.reinforcement_count)
        .map(|_| {
            let offset = (ctx.rng.f32() * 2.0 - 1.0) * special.reinforcement_spread;
            Vec2::new(core.position.x + offset, feet)
        })
        .collect();

    ctx.effects.push(EnemyEffect::SpawnReinforcements {
        source: core.id,
        archetype: special.reinforcement_archetype.clone(),
        positions,
    });
}

/// Drops a row of hazards centred on the boss.
fn drop_hazards(core: &EnemyCore, ctx: &mut EnemyContext<'_>) {
    let special = &core.config.special;
    let count = special.hazard_count;
    let y = core.position.y - special.hazard_drop_height;
    let first = -(count.saturating_sub(1) as f32) / 2.0;

    for i in 0..count {
        let x = core.position.x + (first + i as f32) * special.hazard_spacing;
        let spec = ProjectileSpec {
            position: Vec2::new(x, y),
            velocity: Vec2::new(0.0, special.hazard_fall_speed),
            damage: special.hazard_damage,
            owner: Owner::Enemy(core.id),
            lifespan_ms: special.hazard_lifespan_ms,
            applies_falloff: false,
            sprite: HAZARD_SPRITE.to_string(),
            radius: 8.0,
            area_radius: None,
        };
        ctx.projectiles.spawn(spec, ctx.now);
    }
}

impl ArchetypeBehavior for BossBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::Boss
    }

    fn pre_step(
        &mut self,
        core: &mut EnemyCore,
        _sense: &Sense,
        ctx: &mut EnemyContext<'_>,
    ) -> StepFlow {
        if self.is_special {
            core.velocity = Vec2::ZERO;
            if core.state != EnemyState::Hurt {
                core.play(Animation::Special);
            }
            return StepFlow::Handled;
        }

        if self.can_special(core, ctx.now) {
            self.start_special(core, ctx);
            return StepFlow::Handled;
        }

        StepFlow::Continue
    }

    fn can_attack(&self, core: &EnemyCore, sense: &Sense, now: Millis) -> bool {
        !self.is_special
            && sense.in_attack_range(&core.config)
            && cooldown_ready(now, core.last_attack_at, core.config.attack_cooldown_ms)
            && core.state != EnemyState::Hurt
            && sense.line_of_sight
    }

    fn execute_attack(&mut self, core: &mut EnemyCore, sense: &Sense, ctx: &mut EnemyContext<'_>) {
        core.fire_at(ctx, sense.target.position);
    }

    fn patrol(&mut self, core: &mut EnemyCore, _ctx: &mut EnemyContext<'_>) {
        core.velocity.x = 0.0;
        core.play(Animation::Idle);
    }

    fn chase(&mut self, core: &mut EnemyCore, sense: &Sense, _ctx: &mut EnemyContext<'_>) {
        core.face_toward(sense.target.position.x);
        let stance = core.config.attack_range + core.config.special.stance_margin;
        if sense.horizontal <= stance {
            core.velocity.x = 0.0;
            core.play(Animation::Idle);
        } else {
            core.velocity.x = core.facing.sign() * core.config.speed;
            core.play(Animation::Walk);
        }
    }

    fn on_task(&mut self, core: &mut EnemyCore, task: EnemyTask, ctx: &mut EnemyContext<'_>) -> bool {
        if task != EnemyTask::SpecialFinished || !self.is_special {
            return false;
        }
        self.finish_special(core, ctx);
        true
    }

    fn suspends_pursuit(&self) -> bool {
        self.is_special
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::ArchetypeConfig;
    use crate::enemy::{Enemy, Stage};
    use crate::target::TargetView;

    fn view(x: f32, y: f32) -> Option<TargetView> {
        Some(TargetView {
            position: Vec2::new(x, y),
            half_extents: Vec2::new(12.0, 24.0),
        })
    }

    fn boss() -> Enemy {
        Enemy::spawn(ArchetypeConfig::preset(BehaviorKind::Boss), Vec2::ZERO, 0)
    }

    fn is_special(enemy: &Enemy) -> bool {
        enemy.behavior().as_boss().is_some_and(BossBehavior::is_special)
    }

    fn run_due(stage: &mut Stage, enemy: &mut Enemy, target: Option<TargetView>) {
        while let Some(task) = stage.scheduler.pop_due(stage.now) {
            enemy.run_task(&task, &mut stage.context(target));
        }
    }

    #[test]
    fn test_special_gated_from_spawn() {
        let mut stage = Stage::new(3);
        let mut enemy = boss();
        let far = view(2_000.0, 0.0);

        stage.now = 7_999;
        enemy.step(&mut stage.context(far));
        assert!(!is_special(&enemy));

        stage.now = 8_000;
        enemy.step(&mut stage.context(far));
        assert!(is_special(&enemy));
        assert_eq!(enemy.animation(), Animation::Special);
    }

    #[test]
    fn test_no_attack_or_chase_while_special() {
        let mut stage = Stage::new(3);
        let mut enemy = boss();
        stage.now = 8_000;
        enemy.step(&mut stage.context(view(2_000.0, 0.0)));
        assert!(is_special(&enemy));

        let close = view(100.0, 0.0);
        stage.now = 8_100;
        enemy.step(&mut stage.context(close));
        assert!(!enemy.core().is_attacking());
        assert_eq!(enemy.state(), EnemyState::Patrolling);
        assert_eq!(enemy.velocity(), Vec2::ZERO);
        assert!(stage.projectiles.is_empty());
    }

    #[test]
    fn test_special_resumes_by_distance() {
        for (player_x, expected) in [(350.0, EnemyState::Chasing), (2_000.0, EnemyState::Patrolling)] {
            let mut stage = Stage::new(11);
            let mut enemy = boss();
            let target = view(player_x, 0.0);

            stage.now = 8_000;
            enemy.step(&mut stage.context(view(2_000.0, 0.0)));
            assert!(is_special(&enemy));

            stage.now = 9_500;
            run_due(&mut stage, &mut enemy, target);
            assert!(!is_special(&enemy));
            assert_eq!(enemy.state(), expected);
            assert_eq!(
                enemy.behavior().as_boss().map(BossBehavior::last_special_at),
                Some(9_500)
            );
        }
    }

    #[test]
    fn test_special_outcomes() {
        let mut saw_reinforcements = false;
        let mut saw_hazards = false;

        for seed in 0..32 {
            let mut stage = Stage::new(seed);
            let mut enemy = boss();
            stage.now = 8_000;
            enemy.step(&mut stage.context(view(2_000.0, 0.0)));
            stage.now = 9_500;
            run_due(&mut stage, &mut enemy, view(2_000.0, 0.0));

            if let Some(EnemyEffect::SpawnReinforcements {
                archetype,
                positions,
                ..
            }) = stage.effects.first()
            {
                saw_reinforcements = true;
                assert_eq!(archetype, "enemy1");
                assert_eq!(positions.len(), 3);
                assert!(positions.iter().all(|p| p.x.abs() <= 48.0 && p.y == 64.0));
            } else {
                saw_hazards = true;
                assert_eq!(stage.projectiles.len(), 5);
                let xs: Vec<f32> = stage.projectiles.iter().map(|p| p.position.x).collect();
                assert_eq!(xs, vec![-128.0, -64.0, 0.0, 64.0, 128.0]);
                assert!(stage.projectiles.iter().all(|p| p.position.y == -240.0));
            }
        }

        assert!(saw_reinforcements && saw_hazards);
    }

    #[test]
    fn test_hurt_during_special_does_not_resume_pursuit() {
        let mut stage = Stage::new(3);
        let mut enemy = boss();
        let close = view(350.0, 0.0);

        stage.now = 8_000;
        enemy.step(&mut stage.context(close));
        assert!(is_special(&enemy));

        enemy.take_damage(10.0, &mut stage.context(close));
        stage.now = 8_200;
        run_due(&mut stage, &mut enemy, close);
        assert_eq!(enemy.state(), EnemyState::Patrolling);
        assert!(is_special(&enemy));

        stage.now = 9_500;
        run_due(&mut stage, &mut enemy, close);
        assert_eq!(enemy.state(), EnemyState::Chasing);
    }

    #[test]
    fn test_stance_holds_inside_margin() {
        let mut stage = Stage::new(3);
        let mut enemy = boss();

        enemy.step(&mut stage.context(view(330.0, 0.0)));
        assert_eq!(enemy.state(), EnemyState::Chasing);
        assert_eq!(enemy.velocity().x, 0.0);

        stage.now = 16;
        enemy.step(&mut stage.context(view(-420.0, 0.0)));
        assert!(enemy.velocity().x < 0.0);
    }
}
