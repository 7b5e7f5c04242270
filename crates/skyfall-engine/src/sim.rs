//! Headless demo arena.
//!
//! Builds a flat arena with one pillar, places a scripted player in the
//! middle and one enemy of each archetype around it, then runs the encounter
//! on a fixed timestep. The player shoots the nearest enemy on an interval;
//! every few shots explode on impact.

use std::fmt;

use skyfall_common::{Millis, Rect, Vec2};
use skyfall_gameplay::{
    ArchetypeError, ArchetypeRegistry, BehaviorKind, Encounter, EncounterError, EncounterEvent,
    EnemyState, Owner, ProjectileSpec, SpecialOutcome, Target, TileMap, TrainingDummy,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::EngineConfig;

/// Lifespan of player shots.
pub const PLAYER_SHOT_LIFESPAN: Millis = 1_500;

/// Errors from building a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// Archetype lookup failed
    #[error(transparent)]
    Archetype(#[from] ArchetypeError),
    /// Encounter rejected a command
    #[error(transparent)]
    Encounter(#[from] EncounterError),
}

/// Result type for simulation setup.
pub type SimResult<T> = Result<T, SimError>;

// ============================================================================
// Arena
// ============================================================================

/// Demo arena geometry.
#[derive(Debug, Clone)]
pub struct Arena {
    /// Tile layer.
    pub map: TileMap,
    /// Map bounds.
    pub bounds: Rect,
    /// Top edge of the floor.
    pub floor_y: f32,
    /// Left edge of the pillar.
    pub pillar_x: f32,
}

impl Arena {
    /// Builds a floor along the bottom row with a four-tile pillar at three
    /// quarters of the width.
    #[must_use]
    pub fn build(config: &EngineConfig) -> Self {
        let tile = config.tile_size;
        let floor_row = (config.arena_height / tile).floor() as i32 - 1;
        let pillar_tx = (config.arena_width * 0.75 / tile).floor() as i32;

        let mut map = TileMap::new(tile).with_floor_row(floor_row);
        map.fill_column(pillar_tx, floor_row - 4, floor_row - 1);

        Self {
            map,
            bounds: config.arena_bounds(),
            floor_y: floor_row as f32 * tile,
            pillar_x: pillar_tx as f32 * tile,
        }
    }

    /// Centre of the arena floor.
    #[must_use]
    pub fn center_x(&self) -> f32 {
        (self.bounds.min_x + self.bounds.max_x) / 2.0
    }
}

/// Preset spawn offsets: x from the player, height of the feet above the floor.
const LAYOUT: [(BehaviorKind, f32, f32); 5] = [
    (BehaviorKind::Melee, -240.0, 0.0),
    (BehaviorKind::RangedGrounded, 200.0, 0.0),
    (BehaviorKind::RangedFlying, -120.0, 180.0),
    (BehaviorKind::Suicide, 160.0, 200.0),
    (BehaviorKind::Boss, -480.0, 0.0),
];

// ============================================================================
// Summary
// ============================================================================

/// Tallies collected from encounter events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimSummary {
    /// Fixed ticks run
    pub ticks: u64,
    /// Simulated time
    pub elapsed_ms: Millis,
    /// Enemies spawned, reinforcements included
    pub enemies_spawned: u32,
    /// Enemies killed
    pub enemies_killed: u32,
    /// Enemies still in the encounter at the end
    pub enemies_remaining: usize,
    /// Attacks started by enemies
    pub attacks_started: u32,
    /// Projectiles fired by enemies
    pub projectiles_fired: u32,
    /// Shots fired by the player
    pub player_shots: u32,
    /// Damage the player took
    pub player_damage_taken: f32,
    /// Damage enemies took
    pub enemy_damage_taken: f32,
    /// Boss specials that summoned reinforcements
    pub reinforcement_waves: u32,
    /// Boss specials that dropped hazards
    pub hazard_rains: u32,
    /// Suicide charges started
    pub charges: u32,
    /// Whether the player survived
    pub player_alive: bool,
}

impl SimSummary {
    /// Folds one event into the tallies.
    pub fn record(&mut self, event: &EncounterEvent) {
        match event {
            EncounterEvent::EnemySpawned { .. } => self.enemies_spawned += 1,
            EncounterEvent::EnemyDied { .. } => self.enemies_killed += 1,
            EncounterEvent::AttackStarted { .. } => self.attacks_started += 1,
            EncounterEvent::ProjectileFired { .. } => self.projectiles_fired += 1,
            EncounterEvent::PlayerHit { damage, .. } => self.player_damage_taken += damage,
            EncounterEvent::EnemyDamaged { damage, .. } => self.enemy_damage_taken += damage,
            EncounterEvent::ChargeStarted { .. } => self.charges += 1,
            EncounterEvent::SpecialFinished { outcome, .. } => match outcome {
                SpecialOutcome::Reinforcements => self.reinforcement_waves += 1,
                SpecialOutcome::HazardRain => self.hazard_rains += 1,
            },
            _ => {},
        }
    }
}

impl fmt::Display for SimSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Simulated {} ms over {} ticks", self.elapsed_ms, self.ticks)?;
        writeln!(
            f,
            "Enemies: {} spawned, {} killed, {} remaining",
            self.enemies_spawned, self.enemies_killed, self.enemies_remaining
        )?;
        writeln!(
            f,
            "Enemy attacks: {} started, {} projectiles, {} charges",
            self.attacks_started, self.projectiles_fired, self.charges
        )?;
        writeln!(
            f,
            "Boss specials: {} reinforcement waves, {} hazard rains",
            self.reinforcement_waves, self.hazard_rains
        )?;
        writeln!(
            f,
            "Player: {} shots, {:.1} damage dealt, {:.1} damage taken",
            self.player_shots, self.enemy_damage_taken, self.player_damage_taken
        )?;
        write!(
            f,
            "Outcome: player {}",
            if self.player_alive { "survived" } else { "fell" }
        )
    }
}

// ============================================================================
// Simulation
// ============================================================================

/// A configured encounter plus the scripted player.
pub struct Simulation {
    config: EngineConfig,
    encounter: Encounter<TrainingDummy>,
    summary: SimSummary,
    next_shot_at: Millis,
}

impl Simulation {
    /// Builds the arena and spawns the starting enemies.
    pub fn new(config: EngineConfig, registry: ArchetypeRegistry) -> SimResult<Self> {
        let arena = Arena::build(&config);
        let player_position = Vec2::new(arena.center_x(), arena.floor_y - 24.0);
        let player = TrainingDummy::new(player_position).with_health(config.player_health);

        let mut extras: Vec<String> = registry
            .iter()
            .map(|archetype| archetype.key.clone())
            .filter(|key| BehaviorKind::ALL.iter().all(|kind| kind.preset_key() != key.as_str()))
            .collect();
        extras.sort();

        let mut encounter = Encounter::new(registry, config.encounter_settings())
            .with_terrain(arena.map.clone())
            .with_player(player);

        for (kind, dx, lift) in LAYOUT {
            let key = kind.preset_key();
            let height = encounter.registry().require(key)?.body.height;
            let position = Vec2::new(player_position.x + dx, arena.floor_y - lift - height / 2.0);
            encounter.spawn_enemy(key, position)?;
        }

        for (i, key) in extras.iter().enumerate() {
            let archetype = encounter.registry().require(key)?;
            let lift = if archetype.behavior.is_flying() { 180.0 } else { 0.0 };
            let x = (arena.pillar_x + 64.0 + i as f32 * 64.0)
                .min(arena.bounds.max_x - archetype.body.width);
            let position = Vec2::new(x, arena.floor_y - lift - archetype.body.height / 2.0);
            encounter.spawn_enemy(key, position)?;
        }

        let mut sim = Self {
            config,
            encounter,
            summary: SimSummary::default(),
            next_shot_at: 0,
        };
        sim.collect_events();
        info!(
            "Arena ready: {} enemies around the player at ({:.0}, {:.0})",
            sim.encounter.enemies().len(),
            player_position.x,
            player_position.y
        );
        Ok(sim)
    }

    /// The running encounter.
    #[must_use]
    pub fn encounter(&self) -> &Encounter<TrainingDummy> {
        &self.encounter
    }

    /// Tallies so far.
    #[must_use]
    pub fn summary(&self) -> &SimSummary {
        &self.summary
    }

    /// Returns true once the player is dead or every enemy is gone.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        !self.player_alive() || self.encounter.enemies().is_empty()
    }

    fn player_alive(&self) -> bool {
        self.encounter.player().is_some_and(|p| p.health() > 0.0)
    }

    /// Runs one fixed tick.
    pub fn step(&mut self) {
        self.player_fire();
        self.encounter.tick(self.config.tick_ms);
        self.summary.ticks += 1;
        self.collect_events();
    }

    /// Runs until the configured duration elapses or the fight ends.
    pub fn run(mut self) -> SimSummary {
        let ticks = self.config.tick_count();
        info!("Running {} ticks of {} ms", ticks, self.config.tick_ms);

        for _ in 0..ticks {
            if self.is_finished() {
                debug!("Encounter finished at {} ms", self.encounter.now());
                break;
            }
            self.step();
        }

        self.finish()
    }

    fn finish(mut self) -> SimSummary {
        self.summary.elapsed_ms = self.encounter.now();
        self.summary.enemies_remaining = self.encounter.live_enemy_count();
        self.summary.player_alive = self.player_alive();
        self.summary
    }

    fn player_fire(&mut self) {
        let interval = self.config.player_fire_interval_ms;
        let now = self.encounter.now();
        if interval == 0 || now < self.next_shot_at || !self.player_alive() {
            return;
        }
        let Some(from) = self.encounter.player().map(|p| p.position()) else {
            return;
        };
        let Some(target) = self
            .encounter
            .enemies()
            .iter()
            .filter(|e| e.state() != EnemyState::Dead)
            .map(|e| e.position())
            .min_by(|a, b| a.distance(from).total_cmp(&b.distance(from)))
        else {
            return;
        };

        self.next_shot_at = now + interval;
        self.summary.player_shots += 1;

        let mut shot = ProjectileSpec::aimed(
            Owner::Player,
            from,
            target,
            self.config.player_shot_speed,
            self.config.player_shot_damage,
        )
        .with_lifespan(PLAYER_SHOT_LIFESPAN)
        .with_dispersion(true);

        let every = self.config.player_splash_every;
        if every > 0 && self.summary.player_shots % every == 0 {
            shot = shot.with_area(self.config.player_splash_radius);
        }
        self.encounter.fire_player_projectile(shot);
    }

    fn collect_events(&mut self) {
        for event in self.encounter.drain_events() {
            self.summary.record(&event);
            log_event(&event, self.config.log_events);
        }
    }
}

fn log_event(event: &EncounterEvent, verbose: bool) {
    match event {
        EncounterEvent::EnemyDied { enemy } => info!("Enemy {} died", enemy),
        EncounterEvent::SpecialFinished { enemy, outcome } => {
            info!("Boss {} special: {:?}", enemy, outcome);
        },
        EncounterEvent::ReinforcementsSpawned { source, spawned } => {
            info!("Boss {} summoned {} reinforcements", source, spawned.len());
        },
        other if verbose => info!("{:?}", other),
        other => debug!("{:?}", other),
    }
}
