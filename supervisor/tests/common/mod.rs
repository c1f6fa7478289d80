//! Shared fixtures: a scripted vehicle whose telemetry is a pure function of the
//! tokio clock and the commands it has received, plus scripted telemetry and
//! detection sources for monitor tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};

use mission_supervisor::events::{self, EventReceiver, EventSender};
use mission_supervisor::{MissionConfig, MissionRequest, MissionSupervisor, StopSignal};
use mission_types::geo::offset_m;
use mission_types::{
    DetectionSource, FrameResult, GatewayError, MissionOutcome, MissionPlan, Position, TelemetrySource,
    VehicleGateway, VehicleMode, VehicleState, Waypoint,
};

pub const HOME: Position = Position { lat: 47.397742, lon: 8.545594, alt: 0.0 };
pub const TARGET_ALT: f64 = 10.0;

pub fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

/// `n` waypoints 20 m apart heading north from home
pub fn line_plan(n: usize) -> Vec<Waypoint> {
    (1..=n)
        .map(|i| Waypoint::at(offset_m(&HOME, 20.0 * i as f64, 0.0).with_alt(TARGET_ALT), 2.0))
        .collect()
}

pub fn request(plan: Vec<Waypoint>, config: MissionConfig) -> MissionRequest {
    MissionRequest {
        plan: MissionPlan::new(plan),
        target_altitude_m: TARGET_ALT,
        home: HOME,
        config,
    }
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-6, "expected {expected}, got {actual}");
}

// ── Scripted vehicle ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Script {
    pub gps_fix: u8,
    pub battery: u8,
    /// Armed this long after the arm command; `None` never arms
    pub arm_after: Option<Duration>,
    /// At target altitude this long after takeoff; `None` stays on the ground
    pub climb_after: Option<Duration>,
    /// Horizontal positions reached at offsets after AUTO is set
    pub auto_track: Vec<(Duration, Position)>,
    /// At the goto target this long after the goto command; `None` never arrives
    pub goto_after: Option<Duration>,
    /// Whether LAND is reflected in reported mode
    pub land_confirms: bool,
    /// Commands rejected by the flight controller
    pub reject: Vec<&'static str>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            gps_fix: 3,
            battery: 90,
            arm_after: Some(secs(2)),
            climb_after: Some(secs(3)),
            auto_track: Vec::new(),
            goto_after: Some(secs(3)),
            land_confirms: true,
            reject: Vec::new(),
        }
    }
}

impl Script {
    /// Track that reaches each plan waypoint `every` apart after AUTO
    pub fn reaching(plan: &[Waypoint], every: Duration) -> Vec<(Duration, Position)> {
        plan.iter()
            .enumerate()
            .map(|(i, wp)| (every * (i as u32 + 1), wp.position()))
            .collect()
    }
}

struct Record {
    mode: VehicleMode,
    arm_cmd: Option<Instant>,
    takeoff: Option<(Instant, f64)>,
    auto_at: Option<Instant>,
    goto: Option<(Instant, Position)>,
    commands: Vec<String>,
}

struct Inner {
    script: Script,
    record: Mutex<Record>,
}

#[derive(Clone)]
pub struct ScriptedVehicle {
    inner: Arc<Inner>,
}

impl ScriptedVehicle {
    pub fn new(script: Script) -> Self {
        Self {
            inner: Arc::new(Inner {
                script,
                record: Mutex::new(Record {
                    mode: VehicleMode::Ground,
                    arm_cmd: None,
                    takeoff: None,
                    auto_at: None,
                    goto: None,
                    commands: Vec::new(),
                }),
            }),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.inner.record.lock().unwrap().commands.clone()
    }

    fn command(&self, op: &'static str, line: String) -> Result<(), GatewayError> {
        let mut record = self.inner.record.lock().unwrap();
        record.commands.push(line);
        if self.inner.script.reject.contains(&op) {
            return Err(GatewayError::rejected(op, "scripted rejection"));
        }
        Ok(())
    }

    fn state_now(&self) -> VehicleState {
        let now = Instant::now();
        let script = &self.inner.script;
        let record = self.inner.record.lock().unwrap();
        let since = |t: Instant| now.duration_since(t);

        let armed = match (record.arm_cmd, script.arm_after) {
            (Some(at), Some(after)) => since(at) >= after,
            _ => false,
        };

        let alt = match (record.takeoff, script.climb_after) {
            (Some((at, target)), Some(after)) if since(at) >= after => target,
            _ => 0.0,
        };

        let mut position = HOME;
        if let Some(auto_at) = record.auto_at {
            for (offset, reached) in &script.auto_track {
                if since(auto_at) >= *offset {
                    position = *reached;
                }
            }
        }
        if let (Some((at, target)), Some(after)) = (record.goto, script.goto_after) {
            if since(at) >= after {
                position = target;
            }
        }

        VehicleState {
            position: position.with_alt(alt),
            groundspeed: 0.0,
            battery_percent: script.battery,
            mode: record.mode,
            armed,
            gps_fix_quality: script.gps_fix,
            last_heartbeat_age: Duration::ZERO,
        }
    }
}

#[async_trait]
impl TelemetrySource for ScriptedVehicle {
    async fn snapshot(&self) -> Result<VehicleState, GatewayError> {
        Ok(self.state_now())
    }
}

#[async_trait]
impl VehicleGateway for ScriptedVehicle {
    async fn set_mode(&self, mode: VehicleMode) -> Result<(), GatewayError> {
        self.command("set_mode", format!("set_mode {mode}"))?;
        let mut record = self.inner.record.lock().unwrap();
        if mode == VehicleMode::Land && !self.inner.script.land_confirms {
            return Ok(());
        }
        if mode == VehicleMode::Auto {
            record.auto_at = Some(Instant::now());
        }
        record.mode = mode;
        Ok(())
    }

    async fn arm(&self) -> Result<(), GatewayError> {
        self.command("arm", "arm".into())?;
        self.inner.record.lock().unwrap().arm_cmd = Some(Instant::now());
        Ok(())
    }

    async fn takeoff(&self, target_alt: f64) -> Result<(), GatewayError> {
        self.command("takeoff", format!("takeoff {target_alt}"))?;
        self.inner.record.lock().unwrap().takeoff = Some((Instant::now(), target_alt));
        Ok(())
    }

    async fn goto_location(&self, target: Position) -> Result<(), GatewayError> {
        self.command("goto", "goto".into())?;
        self.inner.record.lock().unwrap().goto = Some((Instant::now(), target));
        Ok(())
    }

    async fn upload_mission(&self, plan: &MissionPlan) -> Result<(), GatewayError> {
        self.command("upload", format!("upload {}", plan.len()))
    }

    async fn disconnect(&self) {
        self.inner.record.lock().unwrap().commands.push("disconnect".into());
    }

    fn telemetry(&self) -> Arc<dyn TelemetrySource> {
        Arc::new(self.clone())
    }
}

// ── Supervisor harness ────────────────────────────────────────────────────────

pub struct Harness {
    pub vehicle: ScriptedVehicle,
    pub events: EventSender,
    pub stop: watch::Sender<bool>,
    pub monitor_shutdown: watch::Receiver<bool>,
    pub supervisor: MissionSupervisor,
}

pub fn harness(script: Script, plan: Vec<Waypoint>, config: MissionConfig) -> Harness {
    let vehicle = ScriptedVehicle::new(script);
    let (events, rx): (EventSender, EventReceiver) = events::channel(config.event_queue_capacity);
    let (stop, stop_rx) = watch::channel(false);
    let (shutdown_tx, monitor_shutdown) = watch::channel(false);
    let supervisor = MissionSupervisor::new(
        Arc::new(vehicle.clone()),
        request(plan, config),
        rx,
        StopSignal::new(stop_rx),
    )
    .with_monitor_shutdown(Arc::new(shutdown_tx));
    Harness { vehicle, events, stop, monitor_shutdown, supervisor }
}

/// Run `f` at `at` on the paused clock, concurrently with the supervisor.
pub fn at<F>(at: Duration, f: F)
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        sleep(at).await;
        f();
    });
}

pub fn entered_at(outcome: &MissionOutcome, phase: mission_types::Phase) -> f64 {
    outcome
        .phase(phase)
        .unwrap_or_else(|| panic!("{phase} never entered: {:?}", outcome.phase_sequence()))
        .entered_at_s
}

// ── Scripted monitor inputs ───────────────────────────────────────────────────

/// Returns `states[i]` on the i-th call, repeating the last entry.
pub struct ScriptedTelemetry {
    states: Vec<Result<VehicleState, GatewayError>>,
    calls: AtomicUsize,
}

impl ScriptedTelemetry {
    pub fn new(states: Vec<Result<VehicleState, GatewayError>>) -> Arc<Self> {
        Arc::new(Self { states, calls: AtomicUsize::new(0) })
    }

    pub fn battery(levels: &[u8]) -> Arc<Self> {
        Self::new(
            levels
                .iter()
                .map(|&battery_percent| Ok(VehicleState { battery_percent, ..Default::default() }))
                .collect(),
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetrySource for ScriptedTelemetry {
    async fn snapshot(&self) -> Result<VehicleState, GatewayError> {
        let i = self.calls.fetch_add(1, Ordering::SeqCst);
        self.states[i.min(self.states.len() - 1)].clone()
    }
}

/// Fixed-rate frames from a list; `None` entries are stream errors. After the
/// list runs out every frame reports zero regions.
pub struct ScriptedDetector {
    frames: Vec<Option<u32>>,
    next: usize,
    every: Duration,
    started: Instant,
    pub restarts: Arc<AtomicU32>,
}

impl ScriptedDetector {
    pub fn new(frames: Vec<Option<u32>>, every: Duration) -> Self {
        Self {
            frames,
            next: 0,
            every,
            started: Instant::now(),
            restarts: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl DetectionSource for ScriptedDetector {
    async fn next_frame(&mut self) -> Result<FrameResult, GatewayError> {
        sleep(self.every).await;
        let frame = self.frames.get(self.next).copied().unwrap_or(Some(0));
        self.next += 1;
        match frame {
            Some(region_count) => Ok(FrameResult { region_count, timestamp: self.started.elapsed() }),
            None => Err(GatewayError::Stream("scripted drop".into())),
        }
    }

    async fn restart(&mut self) -> Result<(), GatewayError> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Collect everything currently queued
pub fn drain(rx: &mut EventReceiver) -> Vec<mission_supervisor::EventKind> {
    std::iter::from_fn(|| rx.try_recv()).map(|e| e.kind).collect()
}
