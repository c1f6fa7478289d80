//! scenarios.rs — Injectable fault scenarios for the vehicle simulator
//!
//! Each scenario exercises one safety path of the mission supervisor.
//! Times are seconds of simulated time since the link was opened.

use serde::{Deserialize, Serialize};

use mission_types::DetectionKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioType {
    /// Multiply battery drain (drives BatteryLow mid-mission)
    BatteryDrain,
    /// Obstacle regions visible in the camera during `obstacle_window`
    Obstacle,
    /// Intruder regions visible in the camera during `intruder_window`
    Intruder,
    /// Flight controller stops sending heartbeats during `link_dropout_window`
    LinkDropout,
    /// GPS never gets better than fix type 1
    NoGpsFix,
    /// Arm command is rejected by the flight controller
    ArmRefused,
    /// Arm command accepted but the vehicle never reports armed
    ArmStuck,
    /// Takeoff command accepted but motors never spool up
    StuckOnGround,
}

/// A closed time window `[start_s, end_s)` with a region count for detectors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DetectionWindow {
    pub start_s: f64,
    pub end_s: f64,
    pub regions: u32,
}

impl DetectionWindow {
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start_s && t < self.end_s
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub active: Vec<ScenarioType>,
    pub battery_drain_multiplier: f64,
    pub obstacle_window: DetectionWindow,
    pub intruder_window: DetectionWindow,
    /// `[start_s, end_s)` during which no heartbeat is produced
    pub link_dropout_window: (f64, f64),
    /// Probability that a frame outside any window reports one spurious region
    pub false_positive_rate: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            active: vec![],
            battery_drain_multiplier: 40.0,
            obstacle_window: DetectionWindow { start_s: 20.0, end_s: 24.0, regions: 2 },
            intruder_window: DetectionWindow { start_s: 20.0, end_s: 24.0, regions: 1 },
            link_dropout_window: (20.0, 40.0),
            false_positive_rate: 0.0,
        }
    }
}

impl ScenarioConfig {
    pub fn has(&self, s: ScenarioType) -> bool {
        self.active.contains(&s)
    }

    pub fn battery_multiplier(&self) -> f64 {
        if self.has(ScenarioType::BatteryDrain) { self.battery_drain_multiplier } else { 1.0 }
    }

    pub fn link_down(&self, t: f64) -> bool {
        self.has(ScenarioType::LinkDropout)
            && t >= self.link_dropout_window.0
            && t < self.link_dropout_window.1
    }

    /// Regions the given detector sees at time `t` (before false positives)
    pub fn regions(&self, kind: DetectionKind, t: f64) -> u32 {
        let (scenario, window) = match kind {
            DetectionKind::Obstacle => (ScenarioType::Obstacle, &self.obstacle_window),
            DetectionKind::Intruder => (ScenarioType::Intruder, &self.intruder_window),
        };
        if self.has(scenario) && window.contains(t) { window.regions } else { 0 }
    }
}

/// Look up a preset by its CLI name
pub fn preset(name: &str) -> Option<ScenarioConfig> {
    let sc = match name {
        "nominal" | "default" => ScenarioConfig::default(),
        "battery_drain" => preset_battery_drain(),
        "obstacle" => preset_obstacle(),
        "intruder" => preset_intruder(),
        "link_loss" => preset_link_loss(),
        "no_gps" => preset_no_gps(),
        "arm_refused" => preset_arm_refused(),
        "stuck_on_ground" => preset_stuck_on_ground(),
        _ => return None,
    };
    Some(sc)
}

pub const PRESET_NAMES: &[&str] = &[
    "nominal",
    "battery_drain",
    "obstacle",
    "intruder",
    "link_loss",
    "no_gps",
    "arm_refused",
    "stuck_on_ground",
];

pub fn preset_battery_drain() -> ScenarioConfig {
    ScenarioConfig {
        active: vec![ScenarioType::BatteryDrain],
        ..Default::default()
    }
}

pub fn preset_obstacle() -> ScenarioConfig {
    ScenarioConfig {
        active: vec![ScenarioType::Obstacle],
        ..Default::default()
    }
}

pub fn preset_intruder() -> ScenarioConfig {
    ScenarioConfig {
        active: vec![ScenarioType::Intruder],
        ..Default::default()
    }
}

pub fn preset_link_loss() -> ScenarioConfig {
    ScenarioConfig {
        active: vec![ScenarioType::LinkDropout],
        ..Default::default()
    }
}

pub fn preset_no_gps() -> ScenarioConfig {
    ScenarioConfig {
        active: vec![ScenarioType::NoGpsFix],
        ..Default::default()
    }
}

pub fn preset_arm_refused() -> ScenarioConfig {
    ScenarioConfig {
        active: vec![ScenarioType::ArmRefused],
        ..Default::default()
    }
}

pub fn preset_stuck_on_ground() -> ScenarioConfig {
    ScenarioConfig {
        active: vec![ScenarioType::StuckOnGround],
        ..Default::default()
    }
}
