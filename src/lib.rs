//! # Helios - PV and battery aware wallbox controller for Home Assistant
//!
//! Every cycle Helios reads the house, solar, battery and vehicle entities
//! from Home Assistant, decides how much current the wallbox may draw and
//! writes the decision back: charger current and mode, carried-over
//! counters, notifications and a status sensor.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration, entity mapping and tunables
//! - `engine`: pure decision pipeline (gates, pause rules, budget, quantizer)
//! - `ha`: entity store abstraction, REST client and in-memory store
//! - `driver`: periodic control loop around the engine
//! - `persistence`: notification flags and last decision across restarts
//! - `logging`: structured logging and tracing
//! - `web`: read-only status API with a live event stream

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod ha;
pub mod logging;
pub mod persistence;
#[cfg(feature = "web")]
pub mod web;


// Re-export commonly used types
pub use config::Config;
pub use driver::WallboxController;
pub use error::{HeliosError, Result};
