//! # Skyfall
//!
//! Headless encounter driver: runs the enemy AI and combat core in a demo
//! arena and prints what happened.
//!
//! Usage: `skyfall [config.toml]`

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use skyfall_engine::config::EngineConfig;
use skyfall_engine::sim::Simulation;
use skyfall_gameplay::ArchetypeRegistry;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Main entry point.
fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("skyfall=info".parse()?))
        .init();

    info!("Skyfall starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .map_or_else(EngineConfig::config_path, PathBuf::from);
    let mut config = EngineConfig::load_from(&config_path);
    config.validate();

    let registry = ArchetypeRegistry::load_from_dir(&config.archetype_dir).with_context(|| {
        format!(
            "failed to load archetypes from {}",
            config.archetype_dir.display()
        )
    })?;

    let summary = Simulation::new(config, registry)
        .context("failed to build the demo arena")?
        .run();

    println!("{summary}");

    info!("Skyfall shutdown complete");
    Ok(())
}
