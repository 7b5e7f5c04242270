//! Engine configuration.
//!
//! Provides configurable parameters for the simulation clock, combat tuning,
//! the demo arena and the scripted player. Configuration can be loaded from
//! and saved to a TOML file.

use serde::{Deserialize, Serialize};
use skyfall_common::{Millis, Rect};
use skyfall_gameplay::{EncounterSettings, DEFAULT_ARCHETYPE_PATH};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Configuration file name.
pub const CONFIG_FILE: &str = "skyfall.toml";

/// Engine configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === Simulation Settings ===
    /// Fixed timestep in milliseconds
    pub tick_ms: Millis,
    /// Total simulated time in milliseconds
    pub duration_ms: Millis,
    /// RNG seed for waypoints and boss coin flips
    pub seed: u64,

    // === Combat Settings ===
    /// Area damage reaches `radius * area_radius_multiplier`
    pub area_radius_multiplier: f32,

    // === Arena Settings ===
    /// Arena width in world units
    pub arena_width: f32,
    /// Arena height in world units
    pub arena_height: f32,
    /// Tile size in world units
    pub tile_size: f32,

    // === Content Settings ===
    /// Directory holding archetype TOML files
    pub archetype_dir: PathBuf,

    // === Player Settings ===
    /// Starting health of the scripted player
    pub player_health: f32,
    /// Time between player shots (0 = never shoots)
    pub player_fire_interval_ms: Millis,
    /// Damage of one player shot
    pub player_shot_damage: f32,
    /// Speed of player shots
    pub player_shot_speed: f32,
    /// Every n-th shot explodes on impact (0 = never)
    pub player_splash_every: u32,
    /// Base radius of exploding shots
    pub player_splash_radius: f32,

    // === Debug Settings ===
    /// Log every encounter event at info level
    pub log_events: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // Simulation
            tick_ms: 16,
            duration_ms: 30_000,
            seed: 0x5EED,

            // Combat
            area_radius_multiplier: 2.0,

            // Arena
            arena_width: 1280.0,
            arena_height: 480.0,
            tile_size: 16.0,

            // Content
            archetype_dir: PathBuf::from(DEFAULT_ARCHETYPE_PATH),

            // Player
            player_health: 500.0,
            player_fire_interval_ms: 600,
            player_shot_damage: 25.0,
            player_shot_speed: 420.0,
            player_splash_every: 4,
            player_splash_radius: 24.0,

            // Debug
            log_events: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default file location.
    /// Returns default config if file doesn't exist.
    pub fn load() -> Self {
        Self::load_from(Self::config_path())
    }

    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        match fs::File::open(path) {
            Ok(mut file) => {
                let mut contents = String::new();
                if let Err(e) = file.read_to_string(&mut contents) {
                    warn!("Failed to read config file: {e}");
                    return Self::default();
                }

                match toml::from_str(&contents) {
                    Ok(config) => {
                        info!("Loaded config from {}", path.display());
                        config
                    },
                    Err(e) => {
                        warn!("Failed to parse config file: {e}");
                        Self::default()
                    },
                }
            },
            Err(e) => {
                warn!("Failed to open config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to the default file location.
    pub fn save(&self) -> io::Result<()> {
        self.save_to(Self::config_path())
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Default configuration file path, relative to the working directory.
    #[must_use]
    pub fn config_path() -> PathBuf {
        PathBuf::from(CONFIG_FILE)
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        // Simulation
        self.tick_ms = self.tick_ms.clamp(1, 100);
        self.duration_ms = self.duration_ms.min(600_000);

        // Combat
        self.area_radius_multiplier = self.area_radius_multiplier.clamp(0.0, 10.0);

        // Arena
        self.tile_size = self.tile_size.clamp(4.0, 64.0);
        self.arena_width = self.arena_width.clamp(self.tile_size * 40.0, 16_384.0);
        self.arena_height = self.arena_height.clamp(self.tile_size * 20.0, 4_096.0);

        // Player
        self.player_health = self.player_health.max(1.0);
        self.player_shot_damage = self.player_shot_damage.max(0.0);
        self.player_shot_speed = self.player_shot_speed.clamp(1.0, 4_000.0);
        self.player_splash_radius = self.player_splash_radius.max(0.0);
    }

    /// Number of fixed ticks in the configured duration.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.duration_ms / self.tick_ms.max(1)
    }

    /// Arena rectangle, origin at the top-left corner.
    #[must_use]
    pub fn arena_bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.arena_width, self.arena_height)
    }

    /// Encounter tuning derived from this configuration.
    #[must_use]
    pub fn encounter_settings(&self) -> EncounterSettings {
        EncounterSettings {
            area_radius_multiplier: self.area_radius_multiplier,
            seed: self.seed,
            bounds: Some(self.arena_bounds()),
        }
    }
}
