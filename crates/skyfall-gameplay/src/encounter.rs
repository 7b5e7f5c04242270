//! Encounter orchestration.
//!
//! An [`Encounter`] owns the enemies, the projectile pool, the scheduler and
//! the player handle. Each [`Encounter::tick`]:
//!
//! 1. advances the clock and dispatches due tasks
//! 2. steps every enemy against the current player view
//! 3. applies enemy effects (player damage, reinforcements)
//! 4. integrates motion and refreshes contact flags
//! 5. resolves projectile expiry and impacts
//! 6. removes enemies whose death animation finished

use serde::{Deserialize, Serialize};
use skyfall_common::{EntityId, Millis, ProjectileId, Rect, Vec2};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::archetype::{ArchetypeConfig, ArchetypeRegistry};
use crate::enemy::{Enemy, EnemyEffect, EnemyState, Stage};
use crate::events::EncounterEvent;
use crate::kinematics;
use crate::projectile::{Owner, ProjectilePool, ProjectileSink, ProjectileSpec};
use crate::target::{Target, TargetView};
use crate::terrain::TerrainQuery;

/// Default multiplier applied to area-damage radii.
pub const DEFAULT_AREA_RADIUS_MULTIPLIER: f32 = 2.0;

/// Errors from encounter setup and external commands.
#[derive(Debug, Clone, Error)]
pub enum EncounterError {
    /// Archetype key not in the registry
    #[error("unknown archetype: {0}")]
    UnknownArchetype(String),
    /// Enemy not in the encounter
    #[error("enemy not found: {0}")]
    EnemyNotFound(EntityId),
}

/// Result type for encounter operations.
pub type EncounterResult<T> = Result<T, EncounterError>;

/// Encounter tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncounterSettings {
    /// Area damage reaches `radius * area_radius_multiplier`.
    pub area_radius_multiplier: f32,
    /// Seed for waypoints, coin flips and spawn offsets.
    pub seed: u64,
    /// Map bounds.
    pub bounds: Option<Rect>,
}

impl Default for EncounterSettings {
    fn default() -> Self {
        Self {
            area_radius_multiplier: DEFAULT_AREA_RADIUS_MULTIPLIER,
            seed: 0x5EED,
            bounds: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ImpactKind {
    Player(EntityId),
    Enemy(EntityId),
    Terrain,
}

#[derive(Debug, Clone, Copy)]
struct Impact {
    projectile: ProjectileId,
    position: Vec2,
    owner: Owner,
    damage: f32,
    area_radius: Option<f32>,
    kind: ImpactKind,
}

/// A running fight between enemies and one player.
pub struct Encounter<P: Target> {
    stage: Stage,
    settings: EncounterSettings,
    registry: ArchetypeRegistry,
    enemies: Vec<Enemy>,
    player: Option<P>,
}

impl<P: Target> Encounter<P> {
    /// Creates an empty encounter.
    #[must_use]
    pub fn new(registry: ArchetypeRegistry, settings: EncounterSettings) -> Self {
        let mut stage = Stage::new(settings.seed);
        stage.bounds = settings.bounds;
        Self {
            stage,
            settings,
            registry,
            enemies: Vec::new(),
            player: None,
        }
    }

    /// Sets the tile layer.
    #[must_use]
    pub fn with_terrain(mut self, terrain: impl TerrainQuery + 'static) -> Self {
        self.set_terrain(terrain);
        self
    }

    /// Sets the player.
    #[must_use]
    pub fn with_player(mut self, player: P) -> Self {
        self.set_player(player);
        self
    }

    /// Replaces the tile layer.
    pub fn set_terrain(&mut self, terrain: impl TerrainQuery + 'static) {
        self.stage.terrain = Some(Box::new(terrain));
    }

    /// Replaces the player.
    pub fn set_player(&mut self, player: P) {
        self.player = Some(player);
    }

    /// Removes and returns the player.
    pub fn take_player(&mut self) -> Option<P> {
        self.player.take()
    }

    /// The player, if set.
    #[must_use]
    pub fn player(&self) -> Option<&P> {
        self.player.as_ref()
    }

    /// Mutable player, if set.
    pub fn player_mut(&mut self) -> Option<&mut P> {
        self.player.as_mut()
    }

    /// Current game time.
    #[must_use]
    pub fn now(&self) -> Millis {
        self.stage.now
    }

    /// Encounter tuning.
    #[must_use]
    pub fn settings(&self) -> &EncounterSettings {
        &self.settings
    }

    /// Archetype registry.
    #[must_use]
    pub fn registry(&self) -> &ArchetypeRegistry {
        &self.registry
    }

    /// All enemies, including dying ones.
    #[must_use]
    pub fn enemies(&self) -> &[Enemy] {
        &self.enemies
    }

    /// Looks up an enemy.
    #[must_use]
    pub fn enemy(&self, id: EntityId) -> Option<&Enemy> {
        self.enemies.iter().find(|e| e.id() == id)
    }

    /// Enemies not yet dead.
    #[must_use]
    pub fn live_enemy_count(&self) -> usize {
        self.enemies
            .iter()
            .filter(|e| e.state() != EnemyState::Dead)
            .count()
    }

    /// Projectiles in flight.
    #[must_use]
    pub fn projectiles(&self) -> &ProjectilePool {
        &self.stage.projectiles
    }

    /// Scheduled tasks not yet run.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.stage.scheduler.len()
    }

    /// Takes every event recorded since the last drain.
    pub fn drain_events(&self) -> Vec<EncounterEvent> {
        self.stage.events.drain()
    }

    fn player_view(&self) -> Option<TargetView> {
        self.player
            .as_ref()
            .filter(|p| p.is_alive())
            .map(|p| p.view())
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Spawns an enemy from a registered archetype at `position` (body centre).
    pub fn spawn_enemy(&mut self, key: &str, position: Vec2) -> EncounterResult<EntityId> {
        let config = self
            .registry
            .get(key)
            .cloned()
            .ok_or_else(|| EncounterError::UnknownArchetype(key.to_string()))?;
        Ok(self.spawn_with_config(config, position))
    }

    /// Spawns an enemy from an explicit archetype.
    pub fn spawn_with_config(&mut self, config: ArchetypeConfig, position: Vec2) -> EntityId {
        let archetype = config.key.clone();
        let enemy = Enemy::spawn(config, position, self.stage.now);
        let id = enemy.id();
        self.enemies.push(enemy);
        self.stage.events.publish(EncounterEvent::EnemySpawned {
            enemy: id,
            archetype,
            position,
        });
        id
    }

    /// Launches a player-owned projectile.
    pub fn fire_player_projectile(&mut self, mut spec: ProjectileSpec) -> ProjectileId {
        spec.owner = Owner::Player;
        self.stage.projectiles.spawn(spec, self.stage.now)
    }

    /// Damages one enemy.
    pub fn damage_enemy(&mut self, id: EntityId, amount: f32) -> EncounterResult<()> {
        let target = self.player_view();
        let enemy = self
            .enemies
            .iter_mut()
            .find(|e| e.id() == id)
            .ok_or(EncounterError::EnemyNotFound(id))?;
        enemy.take_damage(amount, &mut self.stage.context(target));
        Ok(())
    }

    /// Damages every living enemy within `radius * area_radius_multiplier`
    /// of `center`. Returns how many were hit.
    pub fn apply_area_damage(&mut self, center: Vec2, radius: f32, damage: f32) -> usize {
        let reach = radius * self.settings.area_radius_multiplier;
        let target = self.player_view();
        let mut ctx = self.stage.context(target);

        let mut hit = 0;
        for enemy in &mut self.enemies {
            if enemy.state() != EnemyState::Dead && enemy.position().distance(center) <= reach {
                enemy.take_damage(damage, &mut ctx);
                hit += 1;
            }
        }

        debug!(
            "Area damage {} at ({:.1}, {:.1}) reach {:.1} hit {}",
            damage, center.x, center.y, reach, hit
        );
        hit
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advances the encounter by `dt_ms`.
    pub fn tick(&mut self, dt_ms: Millis) {
        self.stage.now += dt_ms;
        self.dispatch_due_tasks();
        self.step_enemies();
        self.apply_effects();
        self.integrate(dt_ms);
        self.resolve_projectiles();
        self.remove_destroyed();
    }

    fn dispatch_due_tasks(&mut self) {
        let target = self.player_view();
        while let Some(task) = self.stage.scheduler.pop_due(self.stage.now) {
            let Some(enemy) = self.enemies.iter_mut().find(|e| e.id() == task.enemy) else {
                trace!("Dropping {:?} for removed enemy {}", task.task, task.enemy);
                continue;
            };
            enemy.run_task(&task, &mut self.stage.context(target));
        }
    }

    fn step_enemies(&mut self) {
        let target = self.player_view();
        let mut ctx = self.stage.context(target);
        for enemy in &mut self.enemies {
            enemy.step(&mut ctx);
        }
    }

    fn apply_effects(&mut self) {
        for effect in std::mem::take(&mut self.stage.effects) {
            match effect {
                EnemyEffect::DamageTarget { source, amount } => self.hit_player(source, amount),
                EnemyEffect::SpawnReinforcements {
                    source,
                    archetype,
                    positions,
                } => self.spawn_reinforcements(source, &archetype, &positions),
            }
        }
    }

    fn hit_player(&mut self, source: EntityId, damage: f32) {
        let Some(player) = self.player.as_mut().filter(|p| p.is_alive()) else {
            trace!("No player to receive {} damage from {}", damage, source);
            return;
        };
        player.take_damage(damage, source);
        self.stage
            .events
            .publish(EncounterEvent::PlayerHit { source, damage });
    }

    fn spawn_reinforcements(&mut self, source: EntityId, archetype: &str, feet: &[Vec2]) {
        let Some(config) = self.registry.get(archetype).cloned() else {
            warn!("Enemy {} summoned unknown archetype {}", source, archetype);
            return;
        };

        let half_height = config.body.height / 2.0;
        let spawned: Vec<EntityId> = feet
            .iter()
            .map(|foot| {
                let position = Vec2::new(foot.x, foot.y - half_height);
                self.spawn_with_config(config.clone(), position)
            })
            .collect();

        debug!("Enemy {} summoned {} {}", source, spawned.len(), archetype);
        self.stage
            .events
            .publish(EncounterEvent::ReinforcementsSpawned { source, spawned });
    }

    fn integrate(&mut self, dt_ms: Millis) {
        let terrain = self.stage.terrain.as_deref();
        let bounds = self.stage.bounds;
        for enemy in &mut self.enemies {
            if enemy.state() != EnemyState::Dead {
                kinematics::integrate(enemy.core_mut(), dt_ms, terrain, bounds);
            }
        }
        self.stage.projectiles.advance(dt_ms);
    }

    fn resolve_projectiles(&mut self) {
        let now = self.stage.now;
        let expired = self.stage.projectiles.remove_expired(now);
        if expired > 0 {
            trace!("{} projectiles expired", expired);
        }

        let player_bounds = self.player_view().map(|view| view.bounds());
        let terrain = self.stage.terrain.as_deref();

        let mut impacts = Vec::new();
        for projectile in self.stage.projectiles.iter() {
            let bounds = projectile.bounds();
            let struck = match projectile.owner {
                Owner::Enemy(source) => player_bounds
                    .filter(|player| player.overlaps(&bounds))
                    .map(|_| ImpactKind::Player(source)),
                Owner::Player => self
                    .enemies
                    .iter()
                    .find(|e| e.state() != EnemyState::Dead && e.core().body().overlaps(&bounds))
                    .map(|e| ImpactKind::Enemy(e.id())),
            };
            let struck = struck.or_else(|| {
                terrain
                    .filter(|t| t.collides_at(projectile.position.x, projectile.position.y))
                    .map(|_| ImpactKind::Terrain)
            });

            if let Some(kind) = struck {
                impacts.push(Impact {
                    projectile: projectile.id,
                    position: projectile.position,
                    owner: projectile.owner,
                    damage: projectile.resolved_damage(now),
                    area_radius: projectile.area_radius,
                    kind,
                });
            }
        }

        for impact in impacts {
            self.stage.projectiles.destroy(impact.projectile);

            if let (Owner::Player, Some(radius)) = (impact.owner, impact.area_radius) {
                self.apply_area_damage(impact.position, radius, impact.damage);
                continue;
            }

            match impact.kind {
                ImpactKind::Player(source) => self.hit_player(source, impact.damage),
                ImpactKind::Enemy(id) => {
                    if let Err(e) = self.damage_enemy(id, impact.damage) {
                        trace!("Projectile impact skipped: {}", e);
                    }
                }
                ImpactKind::Terrain => {
                    trace!("Projectile {:?} hit terrain", impact.projectile);
                }
            }
        }
    }

    fn remove_destroyed(&mut self) {
        let events = &self.stage.events;
        self.enemies.retain(|enemy| {
            if enemy.is_destroyed() {
                debug!("Despawning enemy {}", enemy.id());
                events.publish(EncounterEvent::EnemyDespawned { enemy: enemy.id() });
                false
            } else {
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::BehaviorKind;
    use crate::target::TrainingDummy;
    use crate::terrain::TileMap;

    fn encounter() -> Encounter<TrainingDummy> {
        Encounter::new(ArchetypeRegistry::with_presets(), EncounterSettings::default())
    }

    fn run(enc: &mut Encounter<TrainingDummy>, until: Millis) {
        while enc.now() < until {
            enc.tick(16);
        }
    }

    #[test]
    fn test_area_damage_reach() {
        let mut enc = encounter();
        let near = enc.spawn_enemy("enemy1", Vec2::new(90.0, 0.0)).expect("spawn");
        let far = enc.spawn_enemy("enemy1", Vec2::new(110.0, 0.0)).expect("spawn");

        let hit = enc.apply_area_damage(Vec2::ZERO, 50.0, 25.0);
        assert_eq!(hit, 1);
        assert_eq!(enc.enemy(near).map(Enemy::health), Some(75.0));
        assert_eq!(enc.enemy(far).map(Enemy::health), Some(100.0));
        assert_eq!(enc.enemy(near).map(Enemy::state), Some(EnemyState::Hurt));
    }

    #[test]
    fn test_area_multiplier_is_configurable() {
        let settings = EncounterSettings {
            area_radius_multiplier: 1.0,
            ..EncounterSettings::default()
        };
        let mut enc: Encounter<TrainingDummy> =
            Encounter::new(ArchetypeRegistry::with_presets(), settings);
        enc.spawn_enemy("enemy1", Vec2::new(90.0, 0.0)).expect("spawn");
        assert_eq!(enc.apply_area_damage(Vec2::ZERO, 50.0, 25.0), 0);
    }

    #[test]
    fn test_unknown_archetype() {
        let mut enc = encounter();
        let result = enc.spawn_enemy("dragon", Vec2::ZERO);
        assert!(matches!(result, Err(EncounterError::UnknownArchetype(_))));
        assert!(matches!(
            enc.damage_enemy(EntityId::NULL, 5.0),
            Err(EncounterError::EnemyNotFound(_))
        ));
    }

    #[test]
    fn test_melee_scenario() {
        let mut enc = encounter().with_player(TrainingDummy::new(Vec2::new(40.0, 10.0)));
        let id = enc.spawn_enemy("enemy1", Vec2::ZERO).expect("spawn");

        enc.tick(16);
        assert_eq!(enc.enemy(id).map(Enemy::state), Some(EnemyState::Attacking));

        run(&mut enc, 16 + 600);
        let enemy = enc.enemy(id).expect("enemy");
        assert!(!enemy.core().is_attacking());
        assert!(enemy.core().last_attack_at().is_some_and(|t| t >= 616));

        let dummy = enc.player().expect("player");
        assert_eq!(dummy.hits().len(), 1);
        assert_eq!(dummy.hits()[0].amount, 10.0);
        assert_eq!(dummy.hits()[0].source, id);
    }

    #[test]
    fn test_no_player_is_silent() {
        let mut enc = encounter();
        let id = enc.spawn_enemy("enemy2", Vec2::ZERO).expect("spawn");
        run(&mut enc, 1_000);
        assert_eq!(enc.enemy(id).map(Enemy::state), Some(EnemyState::Patrolling));
        assert!(enc.projectiles().is_empty());
    }

    #[test]
    fn test_enemy_projectile_hits_player() {
        let mut enc = encounter().with_player(TrainingDummy::new(Vec2::new(100.0, 0.0)));
        let id = enc.spawn_enemy("enemy2", Vec2::ZERO).expect("spawn");

        run(&mut enc, 640);
        let dummy = enc.player().expect("player");
        assert_eq!(dummy.hits().len(), 1);
        assert_eq!(dummy.hits()[0].amount, 8.0);
        assert_eq!(dummy.hits()[0].source, id);
        assert!(enc.projectiles().is_empty());
    }

    #[test]
    fn test_dispersion_projectile_falloff_on_hit() {
        let mut enc = encounter();
        let id = enc.spawn_enemy("enemy1", Vec2::new(300.0, 0.0)).expect("spawn");

        let shot = ProjectileSpec::aimed(Owner::Player, Vec2::ZERO, Vec2::new(300.0, 0.0), 300.0, 100.0)
            .with_lifespan(1_000)
            .with_dispersion(true);
        enc.fire_player_projectile(shot);

        run(&mut enc, 960);
        let health = enc.enemy(id).map(Enemy::health).expect("enemy");
        assert!((health - (100.0 - 100.0 / 13.0)).abs() < 1e-3);
        assert!(enc.projectiles().is_empty());
    }

    #[test]
    fn test_player_projectile_stops_at_terrain() {
        let mut map = TileMap::new(16.0);
        map.fill_column(5, -4, 4);
        let mut enc = encounter().with_terrain(map);
        let id = enc.spawn_enemy("enemy1", Vec2::new(200.0, 0.0)).expect("spawn");

        let shot = ProjectileSpec::aimed(Owner::Player, Vec2::ZERO, Vec2::new(1.0, 0.0), 300.0, 50.0);
        enc.fire_player_projectile(shot);

        run(&mut enc, 800);
        assert_eq!(enc.enemy(id).map(Enemy::health), Some(100.0));
        assert!(enc.projectiles().is_empty());
    }

    #[test]
    fn test_splash_projectile_uses_area_damage() {
        let mut enc = encounter();
        let a = enc.spawn_enemy("enemy1", Vec2::new(100.0, 0.0)).expect("spawn");
        let b = enc.spawn_enemy("enemy1", Vec2::new(140.0, 0.0)).expect("spawn");

        let shot = ProjectileSpec::aimed(Owner::Player, Vec2::ZERO, Vec2::new(1.0, 0.0), 500.0, 20.0)
            .with_area(30.0);
        enc.fire_player_projectile(shot);

        run(&mut enc, 400);
        assert_eq!(enc.enemy(a).map(Enemy::health), Some(80.0));
        assert_eq!(enc.enemy(b).map(Enemy::health), Some(80.0));
    }

    #[test]
    fn test_dead_enemy_is_removed_after_animation() {
        let mut enc = encounter();
        let id = enc.spawn_enemy("enemy1", Vec2::ZERO).expect("spawn");
        enc.damage_enemy(id, 500.0).expect("damage");

        run(&mut enc, 320);
        assert_eq!(enc.enemy(id).map(Enemy::state), Some(EnemyState::Dead));
        assert_eq!(enc.live_enemy_count(), 0);

        run(&mut enc, 1_200);
        assert!(enc.enemy(id).is_none());
        assert!(enc
            .drain_events()
            .contains(&EncounterEvent::EnemyDespawned { enemy: id }));
    }

    #[test]
    fn test_reinforcements_stand_on_summoner_floor() {
        let mut enc = encounter();
        let boss = enc.spawn_enemy("boss", Vec2::new(0.0, 0.0)).expect("spawn");
        enc.stage.effects.push(EnemyEffect::SpawnReinforcements {
            source: boss,
            archetype: "enemy1".to_string(),
            positions: vec![Vec2::new(-20.0, 64.0), Vec2::new(0.0, 64.0), Vec2::new(20.0, 64.0)],
        });
        enc.apply_effects();

        assert_eq!(enc.enemies().len(), 4);
        let grunts: Vec<&Enemy> = enc
            .enemies()
            .iter()
            .filter(|e| e.kind() == BehaviorKind::Melee)
            .collect();
        assert_eq!(grunts.len(), 3);
        assert!(grunts.iter().all(|e| e.position().y == 40.0));
        assert!(enc
            .drain_events()
            .iter()
            .any(|e| matches!(e, EncounterEvent::ReinforcementsSpawned { spawned, .. } if spawned.len() == 3)));
    }

    #[test]
    fn test_melee_turns_at_pillar() {
        let mut map = TileMap::new(16.0).with_floor_row(2);
        map.fill_column(6, -4, 1);
        let mut enc = encounter()
            .with_terrain(map)
            .with_player(TrainingDummy::new(Vec2::new(160.0, 8.0)));
        // Body bottom rests on the floor top at y = 32.
        let id = enc.spawn_enemy("enemy1", Vec2::new(40.0, 8.0)).expect("spawn");

        run(&mut enc, 2_000);
        let enemy = enc.enemy(id).expect("enemy");
        assert!(enemy.position().x < 80.0);
        assert!(enc.drain_events().iter().any(|e| matches!(
            e,
            EncounterEvent::StateChanged {
                from: EnemyState::Chasing,
                to: EnemyState::Patrolling,
                ..
            }
        )));
    }

    proptest::proptest! {
        #[test]
        fn prop_area_damage_hits_within_reach(distance in 0u32..400, radius in 1u32..150) {
            let reach = radius as f32 * DEFAULT_AREA_RADIUS_MULTIPLIER;
            proptest::prop_assume!((distance as f32 - reach).abs() >= 1.0);

            let mut enc = encounter();
            enc.spawn_enemy("enemy1", Vec2::new(distance as f32, 0.0)).expect("spawn");
            let hit = enc.apply_area_damage(Vec2::ZERO, radius as f32, 1.0);
            proptest::prop_assert_eq!(hit == 1, (distance as f32) < reach);
        }
    }
}
