//! config.rs — Mission and monitor configuration bundles
//!
//! Loaded from the `[supervisor]`, `[monitors]` and `[mission]` sections of
//! config.toml. Every field has a default; durations are float seconds (`*_s`).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use mission_types::{MissionPlan, Position, Waypoint};

use crate::geofence::DistanceModel;
use crate::mission::MissionRequest;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Seconds → Duration; negative or non-finite values collapse to zero
/// (`validate()` reports them).
fn secs(s: f64) -> Duration {
    Duration::try_from_secs_f64(s).unwrap_or(Duration::ZERO)
}

fn require_positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} must be > 0 (got {value})")))
    }
}

fn require_percent(name: &str, value: u8) -> Result<(), ConfigError> {
    if value <= 100 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} must be 0–100 (got {value})")))
    }
}

// ── Supervisor options ────────────────────────────────────────────────────────

/// Options accepted with a mission start request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    /// Minimum battery percent to pass preflight
    pub preflight_min_battery: u8,
    pub arming_timeout_s: f64,
    pub takeoff_timeout_s: f64,
    pub return_timeout_s: f64,
    pub land_timeout_s: f64,
    /// Sampling interval for bounded waits and the executing loop
    pub poll_interval_s: f64,
    pub re_notify_interval_s: f64,
    /// Events older than this are discarded unhandled. Defaults to `re_notify_interval_s`.
    pub staleness_window_s: Option<f64>,
    /// Minimum GPS fix type to pass preflight
    pub min_gps_fix: u8,
    /// Takeoff completes at `ratio × target altitude`
    pub takeoff_altitude_ratio: f64,
    pub home_arrival_radius_m: f64,
    pub event_queue_capacity: usize,
    pub distance_model: DistanceModel,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            preflight_min_battery: 20,
            arming_timeout_s: 60.0,
            takeoff_timeout_s: 60.0,
            return_timeout_s: 300.0,
            land_timeout_s: 60.0,
            poll_interval_s: 1.0,
            re_notify_interval_s: 10.0,
            staleness_window_s: None,
            min_gps_fix: 2,
            takeoff_altitude_ratio: 0.95,
            home_arrival_radius_m: 1.0,
            event_queue_capacity: 32,
            distance_model: DistanceModel::Planar,
        }
    }
}

impl MissionConfig {
    pub fn arming_timeout(&self) -> Duration {
        secs(self.arming_timeout_s)
    }

    pub fn takeoff_timeout(&self) -> Duration {
        secs(self.takeoff_timeout_s)
    }

    pub fn return_timeout(&self) -> Duration {
        secs(self.return_timeout_s)
    }

    pub fn land_timeout(&self) -> Duration {
        secs(self.land_timeout_s)
    }

    pub fn poll_interval(&self) -> Duration {
        secs(self.poll_interval_s)
    }

    pub fn re_notify_interval(&self) -> Duration {
        secs(self.re_notify_interval_s)
    }

    pub fn staleness_window(&self) -> Duration {
        secs(self.staleness_window_s.unwrap_or(self.re_notify_interval_s))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_percent("preflight_min_battery", self.preflight_min_battery)?;
        require_positive("arming_timeout_s", self.arming_timeout_s)?;
        require_positive("takeoff_timeout_s", self.takeoff_timeout_s)?;
        require_positive("return_timeout_s", self.return_timeout_s)?;
        require_positive("land_timeout_s", self.land_timeout_s)?;
        require_positive("poll_interval_s", self.poll_interval_s)?;
        require_positive("re_notify_interval_s", self.re_notify_interval_s)?;
        if let Some(window) = self.staleness_window_s {
            require_positive("staleness_window_s", window)?;
        }
        require_positive("home_arrival_radius_m", self.home_arrival_radius_m)?;
        if !(self.takeoff_altitude_ratio > 0.0 && self.takeoff_altitude_ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "takeoff_altitude_ratio must be in (0, 1] (got {})",
                self.takeoff_altitude_ratio
            )));
        }
        if self.event_queue_capacity == 0 {
            return Err(ConfigError::Invalid("event_queue_capacity must be ≥ 1".into()));
        }
        Ok(())
    }
}

// ── Monitor options ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// BatteryLow fires when battery drops below this percent
    pub battery_low_percent: u8,
    pub battery_interval_s: f64,
    /// HeartbeatLost fires once heartbeat age reaches this
    pub heartbeat_timeout_s: f64,
    pub heartbeat_interval_s: f64,
    pub obstacle_min_regions: u32,
    pub intruder_min_regions: u32,
    /// Consecutive read failures before a monitor raises one Fault
    pub telemetry_fault_after: u32,
    /// Back-off before restarting a failed detection stream
    pub detector_retry_s: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            battery_low_percent: 20,
            battery_interval_s: 1.0,
            heartbeat_timeout_s: 5.0,
            heartbeat_interval_s: 1.0,
            obstacle_min_regions: 1,
            intruder_min_regions: 1,
            telemetry_fault_after: 3,
            detector_retry_s: 1.0,
        }
    }
}

impl MonitorConfig {
    pub fn battery_interval(&self) -> Duration {
        secs(self.battery_interval_s)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        secs(self.heartbeat_timeout_s)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        secs(self.heartbeat_interval_s)
    }

    pub fn detector_retry(&self) -> Duration {
        secs(self.detector_retry_s)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_percent("battery_low_percent", self.battery_low_percent)?;
        require_positive("battery_interval_s", self.battery_interval_s)?;
        require_positive("heartbeat_timeout_s", self.heartbeat_timeout_s)?;
        require_positive("heartbeat_interval_s", self.heartbeat_interval_s)?;
        require_positive("detector_retry_s", self.detector_retry_s)?;
        if self.telemetry_fault_after == 0 {
            return Err(ConfigError::Invalid("telemetry_fault_after must be ≥ 1".into()));
        }
        Ok(())
    }
}

// ── Mission definition ────────────────────────────────────────────────────────

/// `[mission]` section: what to fly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionSettings {
    pub target_altitude_m: f64,
    pub home: Position,
    pub waypoints: Vec<Waypoint>,
}

impl Default for MissionSettings {
    fn default() -> Self {
        Self {
            target_altitude_m: 10.0,
            home: Position::new(47.397742, 8.545594, 0.0),
            waypoints: Vec::new(),
        }
    }
}

impl MissionSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("target_altitude_m", self.target_altitude_m)?;
        for (i, wp) in self.waypoints.iter().enumerate() {
            if !(wp.acceptance_radius.is_finite() && wp.acceptance_radius > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "waypoint {i}: acceptance_radius must be > 0"
                )));
            }
        }
        Ok(())
    }

    pub fn into_request(self, config: MissionConfig) -> MissionRequest {
        MissionRequest {
            plan: MissionPlan::new(self.waypoints),
            target_altitude_m: self.target_altitude_m,
            home: self.home,
            config,
        }
    }
}
