//! # mission-types
//!
//! Shared vehicle, mission and outcome structures for the drone mission supervisor.
//!
//! These types are used by:
//! - `supervisor`: the mission state machine, safety monitors and runtime
//! - `packages/vehicle-sim`: the simulated flight controller and camera detectors
//!
//! ## Coordinate Conventions
//!
//! - **Position**: WGS84 latitude/longitude in degrees, altitude in meters relative to home
//! - **Local frame**: north/east offsets in meters around a reference position (see [`geo`])
//!
//! ## Invariants
//! - A [`VehicleState`] is an immutable snapshot; consumers never write it back
//! - A [`MissionPlan`] is read-only once built; traversal order is the vector order
//! - Exactly one [`MissionOutcome`] is produced per supervised run

pub mod geo;
pub mod link;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use link::{DetectionSource, FrameResult, GatewayConnector, GatewayError, TelemetrySource, VehicleGateway};

// ── Position ──────────────────────────────────────────────────────────────────

/// Global position (degrees, meters above home)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

impl Position {
    pub fn new(lat: f64, lon: f64, alt: f64) -> Self {
        Self { lat, lon, alt }
    }

    /// Same horizontal location at a different altitude
    pub fn with_alt(&self, alt: f64) -> Self {
        Self { alt, ..*self }
    }
}

// ── Flight Controller Mode ────────────────────────────────────────────────────

/// Operational mode as reported by the flight controller.
/// Distinct from the supervisor's own [`Phase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleMode {
    Ground,
    Guided,
    Auto,
    Land,
    Rtl,
    #[default]
    Unknown,
}

impl VehicleMode {
    /// Modes in which the vehicle is under autonomous flight control.
    /// Obstacle and intruder detection is only acted on in these modes.
    pub fn is_flight_capable(&self) -> bool {
        matches!(self, Self::Guided | Self::Auto)
    }
}

impl fmt::Display for VehicleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ground => "GROUND",
            Self::Guided => "GUIDED",
            Self::Auto => "AUTO",
            Self::Land => "LAND",
            Self::Rtl => "RTL",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

// ── Vehicle Snapshot ──────────────────────────────────────────────────────────

/// Altitude above which an armed vehicle counts as airborne (meters)
pub const AIRBORNE_ALT_M: f64 = 0.5;

/// Telemetry snapshot, produced fresh by the gateway on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub position: Position,
    /// Horizontal speed, m/s
    pub groundspeed: f64,
    /// Remaining charge 0–100
    pub battery_percent: u8,
    pub mode: VehicleMode,
    pub armed: bool,
    /// GPS fix type (0–1 no fix, 2 = 2D, 3 = 3D, higher = DGPS/RTK)
    pub gps_fix_quality: u8,
    /// Time since the last heartbeat from the flight controller
    pub last_heartbeat_age: Duration,
}

impl VehicleState {
    /// Armed and off the ground; the only state in which a return-to-home makes sense.
    pub fn is_airborne(&self) -> bool {
        self.armed && self.position.alt > AIRBORNE_ALT_M
    }
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            position: Position::default(),
            groundspeed: 0.0,
            battery_percent: 100,
            mode: VehicleMode::Ground,
            armed: false,
            gps_fix_quality: 0,
            last_heartbeat_age: Duration::ZERO,
        }
    }
}

// ── Mission Plan ──────────────────────────────────────────────────────────────

/// A target position plus the radius used to decide arrival.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    /// Arrival radius in meters
    #[serde(default = "default_acceptance_radius")]
    pub acceptance_radius: f64,
}

fn default_acceptance_radius() -> f64 {
    2.0
}

impl Waypoint {
    pub fn new(lat: f64, lon: f64, alt: f64, acceptance_radius: f64) -> Self {
        Self { lat, lon, alt, acceptance_radius }
    }

    pub fn at(position: Position, acceptance_radius: f64) -> Self {
        Self::new(position.lat, position.lon, position.alt, acceptance_radius)
    }

    pub fn position(&self) -> Position {
        Position::new(self.lat, self.lon, self.alt)
    }
}

/// Ordered waypoint sequence. Immutable once built; the traversal cursor
/// lives with the supervisor, not here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionPlan {
    waypoints: Vec<Waypoint>,
}

impl MissionPlan {
    pub fn new(waypoints: Vec<Waypoint>) -> Self {
        Self { waypoints }
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn get(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

impl From<Vec<Waypoint>> for MissionPlan {
    fn from(waypoints: Vec<Waypoint>) -> Self {
        Self::new(waypoints)
    }
}

// ── Supervisor Phase ──────────────────────────────────────────────────────────

/// Mission supervisor state. `Disarmed` is the only terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Idle,
    PreflightCheck,
    Arming,
    TakingOff,
    Executing,
    ReturningHome,
    Landing,
    Disarmed,
    Faulted,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disarmed)
    }

    /// Phases that belong to the safety return path
    pub fn is_return_path(&self) -> bool {
        matches!(self, Self::ReturningHome | Self::Landing)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "Idle",
            Self::PreflightCheck => "PreflightCheck",
            Self::Arming => "Arming",
            Self::TakingOff => "TakingOff",
            Self::Executing => "Executing",
            Self::ReturningHome => "ReturningHome",
            Self::Landing => "Landing",
            Self::Disarmed => "Disarmed",
            Self::Faulted => "Faulted",
        };
        f.write_str(s)
    }
}

// ── Detection ─────────────────────────────────────────────────────────────────

/// Which camera detector a region count came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionKind {
    Obstacle,
    Intruder,
}

impl fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Obstacle => f.write_str("obstacle"),
            Self::Intruder => f.write_str("intruder"),
        }
    }
}

// ── Mission Outcome ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    /// Every waypoint visited, landed
    Completed,
    /// Safety return or stop request, landed
    Aborted,
    /// Run terminated without a confirmed landing
    Failed,
}

/// Why a run ended the way it did. `code()` gives the stable error-taxonomy name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeReason {
    Connection { message: String },
    GpsFix { quality: u8, required: u8 },
    LowBattery { percent: u8, required: u8 },
    Command { operation: String, message: String },
    Telemetry { message: String },
    Timeout { phase: Phase, elapsed_s: f64 },
    BatteryLow { percent: u8 },
    Obstacle { region_count: u32 },
    Intruder { region_count: u32 },
    HeartbeatLost { age_s: f64 },
    Fault { message: String },
    StopRequested,
}

impl OutcomeReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "ConnectionError",
            Self::GpsFix { .. } => "GpsFixError",
            Self::LowBattery { .. } => "LowBatteryError",
            Self::Command { .. } => "CommandError",
            Self::Telemetry { .. } => "TelemetryError",
            Self::Timeout { .. } => "Timeout",
            Self::BatteryLow { .. } => "BatteryLow",
            Self::Obstacle { .. } => "ObstacleDetected",
            Self::Intruder { .. } => "IntruderDetected",
            Self::HeartbeatLost { .. } => "HeartbeatLost",
            Self::Fault { .. } => "Fault",
            Self::StopRequested => "StopRequested",
        }
    }
}

impl fmt::Display for OutcomeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection { message } => write!(f, "vehicle link unavailable: {message}"),
            Self::GpsFix { quality, required } => {
                write!(f, "GPS fix quality {quality} below required {required}")
            }
            Self::LowBattery { percent, required } => {
                write!(f, "battery {percent}% below preflight minimum {required}%")
            }
            Self::Command { operation, message } => write!(f, "{operation} rejected: {message}"),
            Self::Telemetry { message } => write!(f, "telemetry unavailable: {message}"),
            Self::Timeout { phase, elapsed_s } => write!(f, "{phase} timed out after {elapsed_s:.1}s"),
            Self::BatteryLow { percent } => write!(f, "battery low ({percent}%)"),
            Self::Obstacle { region_count } => write!(f, "obstacle detected ({region_count} regions)"),
            Self::Intruder { region_count } => write!(f, "intruder detected ({region_count} regions)"),
            Self::HeartbeatLost { age_s } => write!(f, "heartbeat lost ({age_s:.1}s)"),
            Self::Fault { message } => write!(f, "fault: {message}"),
            Self::StopRequested => f.write_str("stop requested"),
        }
    }
}

/// Time spent in one supervisor phase, relative to run start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub phase: Phase,
    pub entered_at_s: f64,
    pub duration_s: f64,
}

/// Terminal record of one supervised run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionOutcome {
    pub run_id: String,
    pub status: OutcomeStatus,
    pub final_phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<OutcomeReason>,
    pub started_at: DateTime<Utc>,
    pub duration_s: f64,
    pub phases: Vec<PhaseTiming>,
    pub waypoint_count: usize,
    pub waypoints_reached: usize,
    /// Seconds since run start at which each waypoint was reached, in plan order
    pub waypoint_arrivals_s: Vec<f64>,
}

impl MissionOutcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Completed
    }

    /// Timing of the first visit to `phase`
    pub fn phase(&self, phase: Phase) -> Option<&PhaseTiming> {
        self.phases.iter().find(|t| t.phase == phase)
    }

    /// Phases in the order they were entered
    pub fn phase_sequence(&self) -> Vec<Phase> {
        self.phases.iter().map(|t| t.phase).collect()
    }

    pub fn reason_code(&self) -> Option<&'static str> {
        self.reason.as_ref().map(OutcomeReason::code)
    }
}
