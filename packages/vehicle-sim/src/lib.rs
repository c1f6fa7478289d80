//! # vehicle-sim
//!
//! Simulated multicopter flight controller and camera detectors.
//!
//! - [`DroneSim`]: point-mass flight model with arming, takeoff, goto, AUTO, LAND and RTL
//! - [`SimWorld`]: shared simulation state plus the physics loop
//! - [`SimConnector`] / [`SimVehicle`]: the vehicle link traits over a [`SimWorld`]
//! - [`SimDetector`]: obstacle/intruder cameras driven by [`scenarios`]
//!
//! All timing uses the tokio clock, so tests can run with paused time.

pub mod detector;
pub mod drone_sim;
pub mod scenarios;
pub mod world;

pub use detector::SimDetector;
pub use drone_sim::{DroneSim, SimConfig};
pub use scenarios::{ScenarioConfig, ScenarioType};
pub use world::{SimConnector, SimVehicle, SimWorld, ENDPOINT_SCHEME};
