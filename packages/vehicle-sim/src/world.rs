//! world.rs — Shared simulation state and the simulated vehicle link
//!
//! A [`SimWorld`] owns one [`DroneSim`] behind a lock. Opening a link through
//! [`SimConnector`] starts the physics loop; [`SimVehicle`] exposes the
//! gateway traits on top of it and camera detectors read the same clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use mission_types::{
    DetectionKind, GatewayConnector, GatewayError, MissionPlan, Position, TelemetrySource,
    VehicleGateway, VehicleMode, VehicleState,
};

use crate::detector::SimDetector;
use crate::drone_sim::{DroneSim, SimConfig};
use crate::scenarios::ScenarioConfig;

pub const ENDPOINT_SCHEME: &str = "sim://";

type SharedSim = Arc<RwLock<DroneSim>>;

// ── World ─────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SimWorld {
    sim: SharedSim,
    physics: Arc<Mutex<Option<JoinHandle<()>>>>,
    update_rate_hz: f64,
    time_scale: f64,
    camera_fps: f64,
}

impl SimWorld {
    pub fn new(cfg: SimConfig, scenario: ScenarioConfig) -> Self {
        let update_rate_hz = cfg.update_rate_hz.max(1.0);
        let time_scale = cfg.time_scale.max(0.01);
        let camera_fps = cfg.camera_fps.max(0.1);
        Self {
            sim: Arc::new(RwLock::new(DroneSim::new(cfg, scenario))),
            physics: Arc::new(Mutex::new(None)),
            update_rate_hz,
            time_scale,
            camera_fps,
        }
    }

    /// Simulated seconds since the physics loop started
    pub async fn sim_time(&self) -> f64 {
        self.sim.read().await.t_elapsed
    }

    pub async fn scenario(&self) -> ScenarioConfig {
        self.sim.read().await.scenario.clone()
    }

    /// Camera detector bound to this world's clock
    pub fn detector(&self, kind: DetectionKind) -> SimDetector {
        SimDetector::new(self.clone(), kind, self.camera_fps, self.time_scale)
    }

    pub fn connector(&self) -> SimConnector {
        SimConnector { world: self.clone() }
    }

    pub fn physics_running(&self) -> bool {
        match self.physics.lock() {
            Ok(guard) => guard.as_ref().is_some_and(|h| !h.is_finished()),
            Err(_) => false,
        }
    }

    fn start_physics(&self) {
        let Ok(mut guard) = self.physics.lock() else {
            warn!("sim: physics handle lock poisoned");
            return;
        };
        if guard.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let sim = self.sim.clone();
        let rate = self.update_rate_hz;
        let scale = self.time_scale;
        *guard = Some(tokio::spawn(async move {
            sim_loop(sim, rate, scale).await;
        }));
    }

    fn stop_physics(&self) {
        if let Ok(mut guard) = self.physics.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
                info!("sim: physics loop stopped");
            }
        }
    }

    pub(crate) async fn read<T>(&self, f: impl FnOnce(&DroneSim) -> T) -> T {
        f(&*self.sim.read().await)
    }

    async fn write<T>(&self, f: impl FnOnce(&mut DroneSim) -> T) -> T {
        f(&mut *self.sim.write().await)
    }
}

// ── Physics loop ──────────────────────────────────────────────────────────────

async fn sim_loop(sim: SharedSim, update_rate_hz: f64, time_scale: f64) {
    let epoch = Duration::from_secs_f64(1.0 / update_rate_hz);
    let mut ticker = interval(epoch);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let dt = epoch.as_secs_f64() * time_scale;
    let mut epoch_counter: u64 = 0;

    info!("⚙  sim loop running at {update_rate_hz} Hz (×{time_scale})");

    loop {
        ticker.tick().await;
        let (t, alt, battery) = {
            let mut s = sim.write().await;
            s.tick(dt);
            (s.t_elapsed, s.position.alt, s.battery_pct)
        };
        epoch_counter += 1;
        if epoch_counter % (update_rate_hz as u64 * 10).max(1) == 0 {
            tracing::debug!("⏱ sim t={t:.1}s alt={alt:.1}m battery={battery:.0}%");
        }
    }
}

// ── Connector ─────────────────────────────────────────────────────────────────

/// Opens links to a [`SimWorld`]. Accepts `sim://<anything>` endpoints only.
#[derive(Clone)]
pub struct SimConnector {
    world: SimWorld,
}

#[async_trait]
impl GatewayConnector for SimConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn VehicleGateway>, GatewayError> {
        if !endpoint.starts_with(ENDPOINT_SCHEME) {
            return Err(GatewayError::Connection(format!(
                "unsupported endpoint '{endpoint}' (expected {ENDPOINT_SCHEME}...)"
            )));
        }
        self.world.start_physics();
        info!("🔗 sim: link open on {endpoint}");
        Ok(Arc::new(SimVehicle::new(self.world.clone())))
    }
}

// ── Vehicle link ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SimVehicle {
    world: SimWorld,
    closed: Arc<AtomicBool>,
}

impl SimVehicle {
    pub fn new(world: SimWorld) -> Self {
        Self { world, closed: Arc::new(AtomicBool::new(false)) }
    }

    fn ensure_open(&self) -> Result<(), GatewayError> {
        if self.closed.load(Ordering::Acquire) {
            Err(GatewayError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TelemetrySource for SimVehicle {
    async fn snapshot(&self) -> Result<VehicleState, GatewayError> {
        self.ensure_open()?;
        Ok(self.world.read(DroneSim::snapshot).await)
    }
}

#[async_trait]
impl VehicleGateway for SimVehicle {
    async fn set_mode(&self, mode: VehicleMode) -> Result<(), GatewayError> {
        self.ensure_open()?;
        self.world.write(|s| s.set_mode(mode)).await
    }

    async fn arm(&self) -> Result<(), GatewayError> {
        self.ensure_open()?;
        self.world.write(DroneSim::arm).await
    }

    async fn takeoff(&self, target_alt: f64) -> Result<(), GatewayError> {
        self.ensure_open()?;
        self.world.write(|s| s.takeoff(target_alt)).await
    }

    async fn goto_location(&self, target: Position) -> Result<(), GatewayError> {
        self.ensure_open()?;
        self.world.write(|s| s.goto(target)).await
    }

    async fn upload_mission(&self, plan: &MissionPlan) -> Result<(), GatewayError> {
        self.ensure_open()?;
        self.world.write(|s| s.upload_mission(plan)).await
    }

    async fn disconnect(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.world.stop_physics();
            info!("🔌 sim: link closed");
        }
    }

    fn telemetry(&self) -> Arc<dyn TelemetrySource> {
        Arc::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn connect_rejects_foreign_endpoints() {
        let world = SimWorld::new(SimConfig::default(), ScenarioConfig::default());
        let err = world.connector().connect("udp:127.0.0.1:14550").await.err();
        assert!(matches!(err, Some(GatewayError::Connection(_))));
        assert!(!world.physics_running());
    }

    #[tokio::test(start_paused = true)]
    async fn physics_advances_with_the_tokio_clock() {
        let world = SimWorld::new(SimConfig::default(), ScenarioConfig::default());
        let link = world.connector().connect("sim://local").await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        let t = world.sim_time().await;
        assert!((t - 3.0).abs() < 0.25, "t = {t}");

        link.set_mode(VehicleMode::Guided).await.unwrap();
        link.arm().await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(link.snapshot().await.unwrap().armed);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_closes_every_handle() {
        let world = SimWorld::new(SimConfig::default(), ScenarioConfig::default());
        let link = world.connector().connect("sim://local").await.unwrap();
        let telemetry = link.telemetry();
        link.disconnect().await;
        assert_eq!(link.arm().await, Err(GatewayError::Closed));
        assert_eq!(telemetry.snapshot().await.err(), Some(GatewayError::Closed));
        assert!(!world.physics_running());
    }
}
