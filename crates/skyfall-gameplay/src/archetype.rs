//! Enemy archetype definitions and loading.
//!
//! This module provides:
//! - `ArchetypeConfig`, the immutable per-archetype tuning record
//! - Built-in presets for every behaviour variant
//! - Loading archetypes from `assets/enemies/*.toml`
//! - An archetype registry keyed by archetype name

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use skyfall_common::Millis;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default asset path for archetype files.
pub const DEFAULT_ARCHETYPE_PATH: &str = "assets/enemies";

/// Errors that can occur while loading or looking up archetypes.
#[derive(Debug, Error)]
pub enum ArchetypeError {
    /// Archetype key not registered.
    #[error("Unknown archetype: {0}")]
    Unknown(String),

    /// Failed to read file.
    #[error("Failed to read archetype file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML.
    #[error("Failed to parse archetype TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error.
    #[error("Archetype validation error: {0}")]
    ValidationError(String),

    /// Duplicate archetype key.
    #[error("Duplicate archetype key: {0}")]
    DuplicateKey(String),
}

/// Result type for archetype operations.
pub type ArchetypeResult<T> = Result<T, ArchetypeError>;

/// Behaviour variant an archetype runs on top of the shared state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorKind {
    /// Close-range hitbox attack.
    Melee,
    /// Ground unit firing aimed projectiles.
    RangedGrounded,
    /// Flying unit with waypoint patrol and cooldown-gated shots.
    RangedFlying,
    /// Flying unit that charges the player and self-destructs.
    Suicide,
    /// Boss with a special-skill cycle.
    Boss,
}

impl BehaviorKind {
    /// Returns true for archetypes that ignore gravity.
    #[must_use]
    pub const fn is_flying(self) -> bool {
        matches!(self, Self::RangedFlying | Self::Suicide)
    }

    /// Returns true for archetypes gated by line of sight.
    #[must_use]
    pub const fn uses_line_of_sight(self) -> bool {
        !matches!(self, Self::Melee)
    }

    /// Key of the built-in preset for this behaviour.
    #[must_use]
    pub const fn preset_key(self) -> &'static str {
        match self {
            Self::Melee => "enemy1",
            Self::RangedGrounded => "enemy2",
            Self::RangedFlying => "enemy3",
            Self::Suicide => "enemy3_attacking",
            Self::Boss => "boss",
        }
    }

    /// All behaviour variants.
    pub const ALL: [Self; 5] = [
        Self::Melee,
        Self::RangedGrounded,
        Self::RangedFlying,
        Self::Suicide,
        Self::Boss,
    ];
}

/// Width and height of a box in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Box width.
    pub width: f32,
    /// Box height.
    pub height: f32,
}

impl Dimensions {
    /// Creates new dimensions.
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Animation keys handed to the renderer binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationKeys {
    /// Standing still.
    pub idle: String,
    /// Walking or flying.
    pub walk: String,
    /// Horizontal attack.
    pub attack: String,
    /// Attack aimed upward.
    pub attack_up: String,
    /// Attack aimed downward.
    pub attack_down: String,
    /// Hurt reaction.
    pub hurt: String,
    /// Death.
    pub death: String,
    /// Boss special skill.
    pub special: String,
}

impl Default for AnimationKeys {
    fn default() -> Self {
        Self {
            idle: "idle".to_string(),
            walk: "walk".to_string(),
            attack: "attack".to_string(),
            attack_up: "attack_up".to_string(),
            attack_down: "attack_down".to_string(),
            hurt: "hurt".to_string(),
            death: "death".to_string(),
            special: "special".to_string(),
        }
    }
}

impl AnimationKeys {
    /// Keys prefixed with an archetype name, e.g. `enemy1_walk`.
    #[must_use]
    pub fn prefixed(prefix: &str) -> Self {
        let key = |suffix: &str| format!("{prefix}_{suffix}");
        Self {
            idle: key("idle"),
            walk: key("walk"),
            attack: key("attack"),
            attack_up: key("attack_up"),
            attack_down: key("attack_down"),
            hurt: key("hurt"),
            death: key("death"),
            special: key("special"),
        }
    }
}

/// Projectile fired by ranged archetypes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectileConfig {
    /// Speed in units per second.
    pub speed: f32,
    /// Lifespan in milliseconds.
    pub lifespan_ms: Millis,
    /// Sprite key for the renderer.
    pub sprite: String,
    /// Collision radius.
    pub radius: f32,
}

impl Default for ProjectileConfig {
    fn default() -> Self {
        Self {
            speed: 240.0,
            lifespan_ms: 2_000,
            sprite: "enemy_bullet".to_string(),
            radius: 4.0,
        }
    }
}

/// Waypoint patrol and sprint tuning for flyers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightConfig {
    /// Radius around the spawn origin for random waypoints.
    pub patrol_radius: f32,
    /// Time between sprint windows.
    pub sprint_interval_ms: Millis,
    /// Length of a sprint window.
    pub sprint_duration_ms: Millis,
    /// Speed multiplier while sprinting.
    pub sprint_multiplier: f32,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            patrol_radius: 120.0,
            sprint_interval_ms: 4_000,
            sprint_duration_ms: 1_000,
            sprint_multiplier: 2.0,
        }
    }
}

/// Charge tuning for the suicide flyer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuicideConfig {
    /// Speed multiplier while charging.
    pub charge_multiplier: f32,
    /// Damage multiplier applied on detonation.
    pub damage_multiplier: f32,
    /// Distance at which the charge detonates.
    pub contact_radius: f32,
}

impl Default for SuicideConfig {
    fn default() -> Self {
        Self {
            charge_multiplier: 2.5,
            damage_multiplier: 3.0,
            contact_radius: 16.0,
        }
    }
}

/// Boss special-skill tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecialConfig {
    /// Cooldown between specials.
    pub cooldown_ms: Millis,
    /// Length of the special channel.
    pub duration_ms: Millis,
    /// Archetype spawned as reinforcements.
    pub reinforcement_archetype: String,
    /// Number of reinforcements.
    pub reinforcement_count: u32,
    /// Max horizontal offset of a reinforcement from the boss.
    pub reinforcement_spread: f32,
    /// Number of hazards in a rain.
    pub hazard_count: u32,
    /// Horizontal spacing between hazards.
    pub hazard_spacing: f32,
    /// Height above the boss where hazards appear.
    pub hazard_drop_height: f32,
    /// Fall speed of hazards.
    pub hazard_fall_speed: f32,
    /// Damage per hazard.
    pub hazard_damage: f32,
    /// Hazard lifespan.
    pub hazard_lifespan_ms: Millis,
    /// Extra horizontal margin past attack range where the boss holds still.
    pub stance_margin: f32,
}

impl Default for SpecialConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 8_000,
            duration_ms: 1_500,
            reinforcement_archetype: BehaviorKind::Melee.preset_key().to_string(),
            reinforcement_count: 3,
            reinforcement_spread: 48.0,
            hazard_count: 5,
            hazard_spacing: 64.0,
            hazard_drop_height: 240.0,
            hazard_fall_speed: 320.0,
            hazard_damage: 15.0,
            hazard_lifespan_ms: 1_200,
            stance_margin: 40.0,
        }
    }
}

/// Immutable tuning for one enemy archetype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeConfig {
    /// Registry key.
    pub key: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Behaviour variant.
    pub behavior: BehaviorKind,
    /// Starting and maximum health.
    pub max_health: f32,
    /// Movement speed in units per second.
    pub speed: f32,
    /// Damage per hit or projectile.
    pub damage: f32,
    /// Horizontal distance at which pursuit begins.
    pub detection_range: f32,
    /// Horizontal distance at which attacks begin.
    pub attack_range: f32,
    /// Minimum time between attacks.
    pub attack_cooldown_ms: Millis,
    /// Length of one attack.
    pub attack_duration_ms: Millis,
    /// Max vertical distance for detection and attacks.
    pub vertical_tolerance: f32,
    /// Length of the hurt reaction.
    #[serde(default = "default_hurt_duration")]
    pub hurt_duration_ms: Millis,
    /// Length of the death animation.
    #[serde(default = "default_death_duration")]
    pub death_duration_ms: Millis,
    /// Body box.
    #[serde(default = "default_body")]
    pub body: Dimensions,
    /// Attack hitbox, placed in front of the body.
    #[serde(default = "default_hitbox")]
    pub hitbox: Dimensions,
    /// Turn at ledges and map bounds while patrolling.
    #[serde(default)]
    pub edge_aware: bool,
    /// Animation keys.
    #[serde(default)]
    pub animations: AnimationKeys,
    /// Projectile settings (ranged archetypes).
    #[serde(default)]
    pub projectile: ProjectileConfig,
    /// Flight settings (flyers).
    #[serde(default)]
    pub flight: FlightConfig,
    /// Charge settings (suicide flyer).
    #[serde(default)]
    pub suicide: SuicideConfig,
    /// Special-skill settings (boss).
    #[serde(default)]
    pub special: SpecialConfig,
}

const fn default_hurt_duration() -> Millis {
    300
}

const fn default_death_duration() -> Millis {
    800
}

const fn default_body() -> Dimensions {
    Dimensions::new(32.0, 48.0)
}

const fn default_hitbox() -> Dimensions {
    Dimensions::new(28.0, 32.0)
}

impl ArchetypeConfig {
    /// Built-in tuning for a behaviour variant.
    #[must_use]
    pub fn preset(kind: BehaviorKind) -> Self {
        let key = kind.preset_key();
        let base = Self {
            key: key.to_string(),
            name: String::new(),
            behavior: kind,
            max_health: 100.0,
            speed: 60.0,
            damage: 10.0,
            detection_range: 200.0,
            attack_range: 50.0,
            attack_cooldown_ms: 1_000,
            attack_duration_ms: 600,
            vertical_tolerance: 20.0,
            hurt_duration_ms: default_hurt_duration(),
            death_duration_ms: default_death_duration(),
            body: default_body(),
            hitbox: default_hitbox(),
            edge_aware: false,
            animations: AnimationKeys::prefixed(key),
            projectile: ProjectileConfig::default(),
            flight: FlightConfig::default(),
            suicide: SuicideConfig::default(),
            special: SpecialConfig::default(),
        };

        match kind {
            BehaviorKind::Melee => Self {
                name: "Grunt".to_string(),
                edge_aware: true,
                ..base
            },
            BehaviorKind::RangedGrounded => Self {
                name: "Gunner".to_string(),
                max_health: 80.0,
                speed: 45.0,
                damage: 8.0,
                detection_range: 320.0,
                attack_range: 260.0,
                attack_duration_ms: 700,
                vertical_tolerance: 120.0,
                edge_aware: true,
                ..base
            },
            BehaviorKind::RangedFlying => Self {
                name: "Drone".to_string(),
                max_health: 60.0,
                speed: 80.0,
                damage: 6.0,
                detection_range: 300.0,
                attack_range: 220.0,
                attack_cooldown_ms: 1_500,
                attack_duration_ms: 400,
                vertical_tolerance: 200.0,
                body: Dimensions::new(28.0, 24.0),
                ..base
            },
            BehaviorKind::Suicide => Self {
                name: "Kamikaze".to_string(),
                max_health: 40.0,
                speed: 90.0,
                damage: 10.0,
                detection_range: 300.0,
                attack_range: 180.0,
                attack_duration_ms: 400,
                vertical_tolerance: 200.0,
                body: Dimensions::new(24.0, 24.0),
                ..base
            },
            BehaviorKind::Boss => Self {
                name: "Warden".to_string(),
                max_health: 1_000.0,
                speed: 40.0,
                damage: 20.0,
                detection_range: 480.0,
                attack_range: 300.0,
                attack_cooldown_ms: 1_200,
                attack_duration_ms: 800,
                vertical_tolerance: 160.0,
                hurt_duration_ms: 200,
                death_duration_ms: 2_000,
                body: Dimensions::new(96.0, 128.0),
                hitbox: Dimensions::new(64.0, 96.0),
                projectile: ProjectileConfig {
                    speed: 300.0,
                    sprite: "boss_bullet".to_string(),
                    radius: 8.0,
                    ..ProjectileConfig::default()
                },
                ..base
            },
        }
    }

    /// Returns the display name, falling back to the key.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.key
        } else {
            &self.name
        }
    }

    /// Validates the archetype.
    pub fn validate(&self) -> ArchetypeResult<()> {
        if self.key.is_empty() {
            return Err(ArchetypeError::ValidationError(
                "Archetype has empty key".to_string(),
            ));
        }

        if self.max_health <= 0.0 {
            return Err(ArchetypeError::ValidationError(format!(
                "Archetype {} has non-positive max_health: {}",
                self.key, self.max_health
            )));
        }

        if self.speed < 0.0 || self.damage < 0.0 {
            return Err(ArchetypeError::ValidationError(format!(
                "Archetype {} has negative speed or damage",
                self.key
            )));
        }

        if self.attack_range < 0.0 || self.detection_range < self.attack_range {
            return Err(ArchetypeError::ValidationError(format!(
                "Archetype {} has invalid ranges: attack {} detection {}",
                self.key, self.attack_range, self.detection_range
            )));
        }

        if self.attack_duration_ms == 0 {
            return Err(ArchetypeError::ValidationError(format!(
                "Archetype {} has zero attack_duration_ms",
                self.key
            )));
        }

        if self.body.width <= 0.0 || self.body.height <= 0.0 {
            return Err(ArchetypeError::ValidationError(format!(
                "Archetype {} has an empty body",
                self.key
            )));
        }

        let ranged = matches!(
            self.behavior,
            BehaviorKind::RangedGrounded | BehaviorKind::RangedFlying | BehaviorKind::Boss
        );
        if ranged && (self.projectile.speed <= 0.0 || self.projectile.lifespan_ms == 0) {
            return Err(ArchetypeError::ValidationError(format!(
                "Archetype {} fires projectiles but has no projectile speed or lifespan",
                self.key
            )));
        }

        if self.behavior == BehaviorKind::Boss && self.special.duration_ms == 0 {
            warn!("Boss archetype {} has an instant special skill", self.key);
        }

        Ok(())
    }
}

/// A collection of archetypes from a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchetypeFile {
    /// File format version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Archetypes in this file.
    pub archetypes: Vec<ArchetypeConfig>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Archetype registry keyed by archetype name.
#[derive(Debug, Clone, Default)]
pub struct ArchetypeRegistry {
    by_key: HashMap<String, ArchetypeConfig>,
}

impl ArchetypeRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in preset.
    #[must_use]
    pub fn with_presets() -> Self {
        let mut registry = Self::new();
        registry.fill_presets();
        registry
    }

    /// Inserts presets for any behaviour whose preset key is not registered.
    pub fn fill_presets(&mut self) {
        for kind in BehaviorKind::ALL {
            self.by_key
                .entry(kind.preset_key().to_string())
                .or_insert_with(|| ArchetypeConfig::preset(kind));
        }
    }

    /// Returns the number of registered archetypes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Returns true if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Registers a validated archetype.
    pub fn register(&mut self, config: ArchetypeConfig) -> ArchetypeResult<()> {
        config.validate()?;
        if self.by_key.contains_key(&config.key) {
            return Err(ArchetypeError::DuplicateKey(config.key));
        }
        self.by_key.insert(config.key.clone(), config);
        Ok(())
    }

    /// Gets an archetype by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ArchetypeConfig> {
        self.by_key.get(key)
    }

    /// Gets an archetype by key or fails with `ArchetypeError::Unknown`.
    pub fn require(&self, key: &str) -> ArchetypeResult<&ArchetypeConfig> {
        self.get(key)
            .ok_or_else(|| ArchetypeError::Unknown(key.to_string()))
    }

    /// Returns an iterator over all archetypes.
    pub fn iter(&self) -> impl Iterator<Item = &ArchetypeConfig> {
        self.by_key.values()
    }

    /// Parses a TOML archetype file and registers its contents.
    pub fn load_str(&mut self, content: &str) -> ArchetypeResult<usize> {
        let file: ArchetypeFile = toml::from_str(content)?;
        let mut count = 0;
        for config in file.archetypes {
            self.register(config)?;
            count += 1;
        }
        Ok(count)
    }

    /// Loads archetypes from a single file.
    pub fn load_file(&mut self, path: &Path) -> ArchetypeResult<usize> {
        let content = fs::read_to_string(path)?;
        self.load_str(&content)
    }

    /// Loads every `*.toml` file in a directory, then fills in missing presets.
    ///
    /// A missing directory is not an error: the registry keeps only presets.
    /// Files that fail to load are skipped with a warning.
    pub fn load_from_dir(path: impl AsRef<Path>) -> ArchetypeResult<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let mut registry = Self::new();

        if path.exists() {
            let mut files: Vec<PathBuf> = fs::read_dir(&path)?
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
                .collect();
            files.sort();

            for file_path in files {
                match registry.load_file(&file_path) {
                    Ok(n) => debug!("Loaded {} archetypes from {:?}", n, file_path),
                    Err(e) => warn!("Failed to load archetype file {:?}: {}", file_path, e),
                }
            }
        } else {
            info!("Archetype path {:?} does not exist, using presets", path);
        }

        let loaded = registry.len();
        registry.fill_presets();

        for config in registry.iter() {
            if config.behavior == BehaviorKind::Boss
                && !registry.by_key.contains_key(&config.special.reinforcement_archetype)
            {
                warn!(
                    "Boss {} reinforces with unknown archetype {}",
                    config.key, config.special.reinforcement_archetype
                );
            }
        }

        info!(
            "Archetype registry ready: {} loaded, {} total",
            loaded,
            registry.len()
        );
        Ok(registry)
    }
}
