//! # mission-supervisor
//!
//! Supervises a drone through preflight, arming, takeoff, waypoint traversal and
//! a safety return-and-land, while independent monitors watch battery, heartbeat
//! and camera detections.
//!
//! - [`supervisor::MissionSupervisor`]: the phase state machine, sole issuer of commands
//! - [`waiter::BoundedWaiter`]: deadline-bounded, interruptible condition polling
//! - [`geofence::GeofenceEvaluator`]: waypoint / home arrival decisions
//! - [`monitors`]: edge-triggered battery, heartbeat, obstacle and intruder watchers
//! - [`events`] + [`arbiter`]: the merged event channel and its priority arbitration
//! - [`runtime::run_mission`]: connects, spawns monitors, runs the supervisor, cleans up

pub mod arbiter;
pub mod config;
pub mod error;
pub mod events;
pub mod geofence;
pub mod mission;
pub mod monitors;
pub mod outcome;
pub mod runtime;
pub mod supervisor;
pub mod telemetry_log;
pub mod waiter;

pub use arbiter::{Arbiter, Interrupt, StopSignal};
pub use config::{ConfigError, MissionConfig, MissionSettings, MonitorConfig};
pub use error::{PreflightError, WaitError};
pub use events::{Event, EventKind, EventReceiver, EventSender, Priority};
pub use geofence::{DistanceModel, GeofenceEvaluator};
pub use mission::{MissionRequest, PlanCursor, SupervisorStatus};
pub use outcome::OutcomeRecorder;
pub use runtime::{run_mission, RuntimeOptions, Sensors};
pub use supervisor::MissionSupervisor;
pub use waiter::BoundedWaiter;
