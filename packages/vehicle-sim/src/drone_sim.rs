//! drone_sim.rs — Multicopter point-mass simulation
//!
//! Simulates the flight-controller side of the vehicle link:
//! - Arming with a spool-up delay
//! - GUIDED takeoff (vertical climb) and goto (straight-line cruise)
//! - AUTO mission following with a per-waypoint hold
//! - LAND descent with auto-disarm on touchdown, RTL to home
//! - Battery drain while armed, heartbeat production
//!
//! Pure state + `tick(dt)`; the async link wrapper lives in `world.rs`.

use std::time::Duration;

use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use tracing::{debug, info};

use mission_types::geo::{local_delta_m, offset_m};
use mission_types::{GatewayError, MissionPlan, Position, VehicleMode, VehicleState, Waypoint};

use crate::scenarios::{ScenarioConfig, ScenarioType};

// ── Config struct (populated from config.toml) ────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Launch point; altitude is ground level (0)
    pub home: Position,
    pub cruise_speed_mps: f64,
    pub climb_rate_mps: f64,
    pub descent_rate_mps: f64,
    pub battery_start_pct: f64,
    /// Drain while armed, before the scenario multiplier
    pub battery_drain_pct_per_min: f64,
    pub gps_fix_quality: u8,
    /// Delay between an accepted arm command and the vehicle reporting armed
    pub arm_delay_s: f64,
    /// Time AUTO loiters inside a waypoint before moving on
    pub waypoint_hold_s: f64,
    /// Distance at which AUTO / RTL consider a target reached
    pub arrive_radius_m: f64,
    pub update_rate_hz: f64,
    /// Simulation speed multiplier (1.0 = real-time)
    pub time_scale: f64,
    /// 1σ horizontal GPS noise added to snapshots
    pub gps_noise_m: f64,
    pub camera_fps: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            home: Position::new(47.397742, 8.545594, 0.0),
            cruise_speed_mps: 5.0,
            climb_rate_mps: 2.5,
            descent_rate_mps: 1.5,
            battery_start_pct: 100.0,
            battery_drain_pct_per_min: 1.5,
            gps_fix_quality: 3,
            arm_delay_s: 2.0,
            waypoint_hold_s: 2.0,
            arrive_radius_m: 0.3,
            update_rate_hz: 10.0,
            time_scale: 1.0,
            gps_noise_m: 0.0,
            camera_fps: 5.0,
        }
    }
}

// ── Vehicle state ─────────────────────────────────────────────────────────────

pub struct DroneSim {
    pub position: Position,
    pub groundspeed: f64,
    pub mode: VehicleMode,
    pub armed: bool,
    pub battery_pct: f64,
    /// Seconds of simulated time since start
    pub t_elapsed: f64,
    pub last_heartbeat_t: f64,
    pub scenario: ScenarioConfig,

    arm_at: Option<f64>,
    takeoff_alt: Option<f64>,
    guided_target: Option<Position>,
    mission: Vec<Waypoint>,
    mission_index: usize,
    hold_elapsed: f64,
    home: Position,
    cfg: SimConfig,
}

impl DroneSim {
    pub fn new(cfg: SimConfig, scenario: ScenarioConfig) -> Self {
        let home = cfg.home.with_alt(0.0);
        Self {
            position: home,
            groundspeed: 0.0,
            mode: VehicleMode::Ground,
            armed: false,
            battery_pct: cfg.battery_start_pct,
            t_elapsed: 0.0,
            last_heartbeat_t: 0.0,
            scenario,
            arm_at: None,
            takeoff_alt: None,
            guided_target: None,
            mission: Vec::new(),
            mission_index: 0,
            hold_elapsed: 0.0,
            home,
            cfg,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.cfg
    }

    /// Index of the mission item AUTO is currently flying to
    pub fn mission_index(&self) -> usize {
        self.mission_index
    }

    // ── Simulation tick ───────────────────────────────────────────────────────

    /// Advance simulation by dt seconds
    pub fn tick(&mut self, dt: f64) {
        self.t_elapsed += dt;

        if !self.scenario.link_down(self.t_elapsed) {
            self.last_heartbeat_t = self.t_elapsed;
        }

        if let Some(at) = self.arm_at {
            if self.t_elapsed >= at {
                self.arm_at = None;
                self.armed = true;
                info!("🛩  sim: motors armed");
            }
        }

        if self.armed {
            let drain = self.cfg.battery_drain_pct_per_min * self.scenario.battery_multiplier();
            self.battery_pct = (self.battery_pct - drain * dt / 60.0).max(0.0);
        }

        let before = self.position;
        match self.mode {
            VehicleMode::Guided if self.armed => self.tick_guided(dt),
            VehicleMode::Auto if self.armed => self.tick_auto(dt),
            VehicleMode::Land => self.tick_land(dt),
            VehicleMode::Rtl if self.armed => self.tick_rtl(dt),
            _ => {}
        }

        let (north, east) = local_delta_m(&before, &self.position);
        self.groundspeed = if dt > 0.0 { north.hypot(east) / dt } else { 0.0 };
    }

    fn tick_guided(&mut self, dt: f64) {
        if let Some(target_alt) = self.takeoff_alt {
            if !self.scenario.has(ScenarioType::StuckOnGround) {
                self.position.alt = step_toward(self.position.alt, target_alt, self.cfg.climb_rate_mps * dt);
            }
        } else if let Some(target) = self.guided_target {
            self.fly_toward(target, dt);
        }
    }

    fn tick_auto(&mut self, dt: f64) {
        let Some(wp) = self.mission.get(self.mission_index).copied() else {
            return; // mission finished, loiter
        };
        self.fly_toward(wp.position(), dt);

        let (north, east) = local_delta_m(&self.position, &wp.position());
        let arrived = north.hypot(east) <= self.cfg.arrive_radius_m
            && (self.position.alt - wp.alt).abs() <= 0.5;
        if arrived {
            self.hold_elapsed += dt;
            if self.hold_elapsed >= self.cfg.waypoint_hold_s {
                debug!("sim: mission item {} complete", self.mission_index);
                self.mission_index += 1;
                self.hold_elapsed = 0.0;
            }
        }
    }

    fn tick_land(&mut self, dt: f64) {
        if self.position.alt <= 0.0 {
            return;
        }
        self.position.alt = (self.position.alt - self.cfg.descent_rate_mps * dt).max(0.0);
        if self.position.alt <= 0.0 && self.armed {
            self.armed = false;
            info!("🛬 sim: touchdown, motors disarmed");
        }
    }

    fn tick_rtl(&mut self, dt: f64) {
        let over_home = self.home.with_alt(self.position.alt);
        let (north, east) = local_delta_m(&self.position, &over_home);
        if north.hypot(east) > self.cfg.arrive_radius_m {
            self.fly_toward(over_home, dt);
        } else {
            self.tick_land(dt);
        }
    }

    /// Straight-line horizontal cruise plus independent vertical rate
    fn fly_toward(&mut self, target: Position, dt: f64) {
        let (north, east) = local_delta_m(&self.position, &target);
        let dist = north.hypot(east);
        let step = self.cfg.cruise_speed_mps * dt;
        let alt = self.position.alt;
        if dist <= step {
            self.position = target.with_alt(alt);
        } else {
            self.position = offset_m(&self.position, north * step / dist, east * step / dist);
        }
        let rate = if target.alt > alt { self.cfg.climb_rate_mps } else { self.cfg.descent_rate_mps };
        self.position.alt = step_toward(alt, target.alt, rate * dt);
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    pub fn set_mode(&mut self, mode: VehicleMode) -> Result<(), GatewayError> {
        if mode == VehicleMode::Unknown {
            return Err(GatewayError::rejected("set_mode", "UNKNOWN is not a settable mode"));
        }
        if matches!(mode, VehicleMode::Land | VehicleMode::Rtl) {
            self.takeoff_alt = None;
            self.guided_target = None;
        }
        if self.mode != mode {
            info!("sim: mode {} → {}", self.mode, mode);
        }
        self.mode = mode;
        Ok(())
    }

    pub fn arm(&mut self) -> Result<(), GatewayError> {
        if self.scenario.has(ScenarioType::ArmRefused) {
            return Err(GatewayError::rejected("arm", "pre-arm check failed: compass inconsistent"));
        }
        if self.mode != VehicleMode::Guided {
            return Err(GatewayError::rejected("arm", format!("mode {} is not armable", self.mode)));
        }
        if self.armed || self.arm_at.is_some() {
            return Ok(());
        }
        if !self.scenario.has(ScenarioType::ArmStuck) {
            self.arm_at = Some(self.t_elapsed + self.cfg.arm_delay_s);
        }
        Ok(())
    }

    pub fn takeoff(&mut self, target_alt: f64) -> Result<(), GatewayError> {
        if !self.armed {
            return Err(GatewayError::rejected("takeoff", "vehicle not armed"));
        }
        if self.mode != VehicleMode::Guided {
            return Err(GatewayError::rejected("takeoff", format!("requires GUIDED, in {}", self.mode)));
        }
        self.guided_target = None;
        self.takeoff_alt = Some(target_alt);
        Ok(())
    }

    pub fn goto(&mut self, target: Position) -> Result<(), GatewayError> {
        if !self.armed {
            return Err(GatewayError::rejected("goto", "vehicle not armed"));
        }
        if self.mode != VehicleMode::Guided {
            return Err(GatewayError::rejected("goto", format!("requires GUIDED, in {}", self.mode)));
        }
        self.takeoff_alt = None;
        self.guided_target = Some(target);
        Ok(())
    }

    pub fn upload_mission(&mut self, plan: &MissionPlan) -> Result<(), GatewayError> {
        self.mission = plan.waypoints().to_vec();
        self.mission_index = 0;
        self.hold_elapsed = 0.0;
        info!("sim: mission uploaded ({} items)", self.mission.len());
        Ok(())
    }

    // ── Telemetry ─────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> VehicleState {
        let gps_fix_quality = if self.scenario.has(ScenarioType::NoGpsFix) {
            1
        } else {
            self.cfg.gps_fix_quality
        };
        VehicleState {
            position: self.noisy_position(),
            groundspeed: self.groundspeed,
            battery_percent: self.battery_pct.round().clamp(0.0, 100.0) as u8,
            mode: self.mode,
            armed: self.armed,
            gps_fix_quality,
            last_heartbeat_age: Duration::from_secs_f64((self.t_elapsed - self.last_heartbeat_t).max(0.0)),
        }
    }

    fn noisy_position(&self) -> Position {
        if self.cfg.gps_noise_m <= 0.0 {
            return self.position;
        }
        match Normal::new(0.0, self.cfg.gps_noise_m) {
            Ok(noise) => {
                let mut rng = rand::thread_rng();
                let north = noise.sample(&mut rng);
                let east = noise.sample(&mut rng);
                offset_m(&self.position, north, east)
            }
            Err(_) => self.position,
        }
    }
}

fn step_toward(current: f64, target: f64, max_step: f64) -> f64 {
    if (target - current).abs() <= max_step {
        target
    } else {
        current + max_step.copysign(target - current)
    }
}
