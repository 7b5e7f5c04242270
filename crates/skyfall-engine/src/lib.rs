//! Skyfall Engine - headless driver for the enemy AI and combat core.
//!
//! Loads engine configuration, builds a demo arena and runs encounters on a
//! fixed timestep.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod sim;
