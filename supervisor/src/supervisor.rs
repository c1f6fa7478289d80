//! supervisor.rs — Mission supervisor state machine
//!
//! ```text
//! Idle → PreflightCheck → Arming → TakingOff → Executing → ReturningHome → Landing → Disarmed
//!                  └───────────────┴──────────┴──────────┴──→ Faulted ──→ ReturningHome | Disarmed
//! ```
//!
//! The supervisor is the only holder of the command side of the vehicle link and
//! the only consumer of monitor events. Every bounded wait races its condition
//! against the arbiter, so a qualifying event preempts the phase immediately.
//!
//! Preemption by phase:
//! - Arming / TakingOff / Executing: any event, external stop
//! - ReturningHome / Landing: HeartbeatLost, Fault and Timeout only; stop is ignored
//!
//! At most one return is attempted per run. A fault on the return path ends the run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mission_types::{
    GatewayError, MissionOutcome, MissionPlan, OutcomeReason, OutcomeStatus, Phase, Position,
    TelemetrySource, VehicleGateway, VehicleMode, VehicleState,
};

use crate::arbiter::{Arbiter, Interrupt, StopSignal};
use crate::config::MissionConfig;
use crate::error::{gateway_reason, PreflightError, WaitError};
use crate::events::{EventKind, EventReceiver, Priority};
use crate::geofence::GeofenceEvaluator;
use crate::mission::{MissionRequest, PhaseJournal, PlanCursor, SupervisorStatus};
use crate::waiter::BoundedWaiter;

/// Next step of the drive loop.
#[derive(Debug)]
enum Transition {
    Enter(Phase),
    Fault(OutcomeReason),
    /// Begin the return path. `None` = normal mission completion.
    ReturnHome(Option<OutcomeReason>),
    Complete,
    Terminate(OutcomeReason),
}

pub struct MissionSupervisor {
    gateway: Arc<dyn VehicleGateway>,
    plan: MissionPlan,
    target_altitude_m: f64,
    home: Position,
    config: MissionConfig,
    geofence: GeofenceEvaluator,
    arbiter: Arbiter,
    stop: StopSignal,
    monitor_shutdown: Option<Arc<watch::Sender<bool>>>,
    status: watch::Sender<SupervisorStatus>,

    run_id: String,
    phase: Phase,
    cursor: PlanCursor,
    journal: PhaseJournal,
    arrivals: Vec<f64>,
    /// Reason behind a safety return, reported if the return lands
    abort_reason: Option<OutcomeReason>,
    return_attempted: bool,
    took_off: bool,
}

impl MissionSupervisor {
    pub fn new(
        gateway: Arc<dyn VehicleGateway>,
        request: MissionRequest,
        events: EventReceiver,
        stop: StopSignal,
    ) -> Self {
        let MissionRequest { plan, target_altitude_m, home, config } = request;
        let cursor = PlanCursor::new(plan.len());
        let (status, _) = watch::channel(SupervisorStatus {
            phase: Phase::Idle,
            next_index: 0,
            plan_len: plan.len(),
        });
        Self {
            gateway,
            geofence: GeofenceEvaluator::new(config.distance_model),
            arbiter: Arbiter::new(events, config.staleness_window()),
            plan,
            target_altitude_m,
            home,
            config,
            stop,
            monitor_shutdown: None,
            status,
            run_id: Uuid::new_v4().to_string(),
            phase: Phase::Idle,
            cursor,
            journal: PhaseJournal::start(),
            arrivals: Vec::new(),
            abort_reason: None,
            return_attempted: false,
            took_off: false,
        }
    }

    /// Monitors to stop when the link is presumed dead
    pub fn with_monitor_shutdown(mut self, shutdown: Arc<watch::Sender<bool>>) -> Self {
        self.monitor_shutdown = Some(shutdown);
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Live `{phase, next_index, plan_len}` updates
    pub fn subscribe(&self) -> watch::Receiver<SupervisorStatus> {
        self.status.subscribe()
    }

    // ── Drive loop ────────────────────────────────────────────────────────────

    /// Fly the mission to a terminal state. Always produces exactly one outcome.
    pub async fn run(mut self) -> MissionOutcome {
        let started_at = Utc::now();
        self.journal = PhaseJournal::start();
        self.enter(Phase::Idle);
        info!(
            "🚁 run {} starting: {} waypoints, target altitude {:.1} m",
            self.run_id,
            self.plan.len(),
            self.target_altitude_m
        );

        let mut next = Transition::Enter(Phase::PreflightCheck);
        let (status, reason) = loop {
            debug!("transition: {next:?}");
            next = match next {
                Transition::Enter(phase) => {
                    self.enter(phase);
                    self.run_phase(phase).await
                }
                Transition::Fault(reason) => self.on_fault(reason),
                Transition::ReturnHome(reason) => self.begin_return(reason).await,
                Transition::Complete => break self.completion(),
                Transition::Terminate(reason) => {
                    self.best_effort_land().await;
                    let status = match reason {
                        OutcomeReason::StopRequested => OutcomeStatus::Aborted,
                        _ => OutcomeStatus::Failed,
                    };
                    break (status, Some(reason));
                }
            };
        };

        self.enter(Phase::Disarmed);
        let outcome = self.into_outcome(started_at, status, reason);
        match &outcome.reason {
            Some(reason) => info!(
                "🏁 run {} finished {:?} after {:.1}s: {reason}",
                outcome.run_id, outcome.status, outcome.duration_s
            ),
            None => info!(
                "🏁 run {} finished {:?} after {:.1}s",
                outcome.run_id, outcome.status, outcome.duration_s
            ),
        }
        outcome
    }

    async fn run_phase(&mut self, phase: Phase) -> Transition {
        match phase {
            Phase::PreflightCheck => self.preflight().await,
            Phase::Arming => self.arming().await,
            Phase::TakingOff => self.taking_off().await,
            Phase::Executing => self.executing().await,
            Phase::ReturningHome => self.returning_home().await,
            Phase::Landing => self.landing().await,
            Phase::Idle | Phase::Faulted | Phase::Disarmed => Transition::Terminate(OutcomeReason::Fault {
                message: format!("{phase} has no phase handler"),
            }),
        }
    }

    fn enter(&mut self, phase: Phase) {
        if self.journal.current() != Some(phase) {
            info!("▶ phase {} → {}", self.phase, phase);
        }
        self.phase = phase;
        self.journal.enter(phase);
        self.publish();
    }

    fn publish(&self) {
        self.status.send_replace(SupervisorStatus {
            phase: self.phase,
            next_index: self.cursor.index(),
            plan_len: self.cursor.len(),
        });
    }

    // ── Phases ────────────────────────────────────────────────────────────────

    async fn preflight(&mut self) -> Transition {
        match self.check_preflight().await {
            Ok(()) if self.stop.is_requested() => {
                info!("⏹ stop requested before arming");
                Transition::Terminate(OutcomeReason::StopRequested)
            }
            Ok(()) => Transition::Enter(Phase::Arming),
            Err(e) => {
                warn!("✗ preflight failed: {e}");
                Transition::Fault(e.into())
            }
        }
    }

    async fn check_preflight(&self) -> Result<(), PreflightError> {
        let state = read_with_retry(self.gateway.as_ref()).await?;
        if state.gps_fix_quality < self.config.min_gps_fix {
            return Err(PreflightError::GpsFix {
                quality: state.gps_fix_quality,
                required: self.config.min_gps_fix,
            });
        }
        if state.battery_percent < self.config.preflight_min_battery {
            return Err(PreflightError::LowBattery {
                percent: state.battery_percent,
                required: self.config.preflight_min_battery,
            });
        }
        info!("✓ preflight ok: GPS fix {}, battery {}%", state.gps_fix_quality, state.battery_percent);
        Ok(())
    }

    async fn arming(&mut self) -> Transition {
        if let Some(interrupt) = self.pending_interrupt(Priority::Detection, true) {
            return self.on_interrupt(interrupt);
        }
        if let Err(e) = self.gateway.set_mode(VehicleMode::Guided).await {
            return command_failed(e);
        }
        if let Err(e) = self.gateway.arm().await {
            return command_failed(e);
        }
        let timeout = self.config.arming_timeout();
        match self.wait_for(Phase::Arming, timeout, Priority::Detection, true, |s| s.armed).await {
            Ok(elapsed) => {
                info!("✓ armed after {:.1}s", elapsed.as_secs_f64());
                Transition::Enter(Phase::TakingOff)
            }
            Err(e) => self.wait_failed(e),
        }
    }

    async fn taking_off(&mut self) -> Transition {
        if let Some(interrupt) = self.pending_interrupt(Priority::Detection, true) {
            return self.on_interrupt(interrupt);
        }
        if let Err(e) = self.gateway.takeoff(self.target_altitude_m).await {
            return command_failed(e);
        }
        self.took_off = true;

        let goal = self.target_altitude_m * self.config.takeoff_altitude_ratio;
        let timeout = self.config.takeoff_timeout();
        match self
            .wait_for(Phase::TakingOff, timeout, Priority::Detection, true, move |s| s.position.alt >= goal)
            .await
        {
            Ok(elapsed) => {
                info!("✓ reached {goal:.1} m after {:.1}s", elapsed.as_secs_f64());
                Transition::Enter(Phase::Executing)
            }
            Err(e) => self.wait_failed(e),
        }
    }

    async fn executing(&mut self) -> Transition {
        if let Some(interrupt) = self.pending_interrupt(Priority::Detection, true) {
            return self.on_interrupt(interrupt);
        }
        if let Err(e) = self.gateway.upload_mission(&self.plan).await {
            return command_failed(e);
        }
        if let Err(e) = self.gateway.set_mode(VehicleMode::Auto).await {
            return command_failed(e);
        }
        info!("▶ executing {} waypoints in AUTO", self.plan.len());

        let poll = self.config.poll_interval();
        loop {
            let sampled = tokio::select! {
                biased;
                interrupt = next_interrupt(&mut self.arbiter, &mut self.stop, Priority::Detection, true) => {
                    Err(interrupt)
                }
                state = read_with_retry(self.gateway.as_ref()) => Ok(state),
            };
            let state = match sampled {
                Err(interrupt) => return self.on_interrupt(interrupt),
                Ok(Err(e)) => {
                    warn!("✗ telemetry lost while executing: {e}");
                    return Transition::Fault(gateway_reason(&e));
                }
                Ok(Ok(state)) => state,
            };

            self.check_waypoint(&state);
            if self.cursor.is_complete() {
                info!("✓ all {} waypoints reached", self.plan.len());
                return Transition::ReturnHome(None);
            }

            let interrupted = tokio::select! {
                biased;
                interrupt = next_interrupt(&mut self.arbiter, &mut self.stop, Priority::Detection, true) => {
                    Some(interrupt)
                }
                _ = sleep(poll) => None,
            };
            if let Some(interrupt) = interrupted {
                return self.on_interrupt(interrupt);
            }
        }
    }

    fn check_waypoint(&mut self, state: &VehicleState) {
        let Some(wp) = self.plan.get(self.cursor.index()).copied() else {
            return;
        };
        let distance = self.geofence.distance_m(&state.position, &wp.position());
        if self.geofence.reached(&state.position, &wp.position(), wp.acceptance_radius) {
            let at = self.journal.elapsed_s();
            self.arrivals.push(at);
            self.cursor.advance();
            info!(
                "📍 waypoint {}/{} reached at {at:.1}s ({distance:.2} m)",
                self.cursor.index(),
                self.cursor.len()
            );
            self.publish();
        } else {
            debug!("waypoint {} at {distance:.1} m", self.cursor.index());
        }
    }

    async fn begin_return(&mut self, reason: Option<OutcomeReason>) -> Transition {
        if let Some(reason) = &reason {
            self.abort_reason.get_or_insert_with(|| reason.clone());
        }
        let cause = || {
            reason.clone().unwrap_or(OutcomeReason::Fault {
                message: "vehicle not airborne at mission completion".into(),
            })
        };
        if self.return_attempted {
            warn!("✗ return already attempted, not retrying");
            return Transition::Terminate(cause());
        }
        self.return_attempted = true;

        let state = match read_with_retry(self.gateway.as_ref()).await {
            Ok(state) => state,
            Err(e) => {
                warn!("✗ cannot start return, telemetry unavailable: {e}");
                return Transition::Terminate(reason.clone().unwrap_or_else(|| gateway_reason(&e)));
            }
        };
        if !state.is_airborne() {
            warn!(
                "✗ vehicle not airborne (armed={}, alt={:.1} m), no return possible",
                state.armed, state.position.alt
            );
            return Transition::Terminate(cause());
        }
        Transition::Enter(Phase::ReturningHome)
    }

    async fn returning_home(&mut self) -> Transition {
        if let Err(e) = self.gateway.set_mode(VehicleMode::Guided).await {
            return command_failed(e);
        }
        let target = self.home.with_alt(self.target_altitude_m);
        if let Err(e) = self.gateway.goto_location(target).await {
            return command_failed(e);
        }
        info!("🏠 returning home ({:.6}, {:.6})", self.home.lat, self.home.lon);

        let geofence = self.geofence;
        let home = self.home;
        let radius = self.config.home_arrival_radius_m;
        let timeout = self.config.return_timeout();
        match self
            .wait_for(Phase::ReturningHome, timeout, Priority::Link, false, move |s| {
                geofence.reached(&s.position, &home, radius)
            })
            .await
        {
            Ok(elapsed) => {
                info!("✓ over home after {:.1}s", elapsed.as_secs_f64());
                Transition::Enter(Phase::Landing)
            }
            Err(e) => self.wait_failed(e),
        }
    }

    async fn landing(&mut self) -> Transition {
        if let Err(e) = self.gateway.set_mode(VehicleMode::Land).await {
            return command_failed(e);
        }
        let timeout = self.config.land_timeout();
        match self
            .wait_for(Phase::Landing, timeout, Priority::Link, false, |s| s.mode == VehicleMode::Land)
            .await
        {
            Ok(elapsed) => {
                info!("🛬 LAND confirmed after {:.1}s", elapsed.as_secs_f64());
                Transition::Complete
            }
            Err(e) => self.wait_failed(e),
        }
    }

    // ── Faults and interrupts ─────────────────────────────────────────────────

    fn on_interrupt(&mut self, interrupt: Interrupt) -> Transition {
        let event = match interrupt {
            Interrupt::Stop => {
                info!("⏹ stop requested during {}", self.phase);
                return Transition::ReturnHome(Some(OutcomeReason::StopRequested));
            }
            Interrupt::Event(event) => event,
        };
        info!(
            "⚡ {} preempts {} (raised {:.1}s ago)",
            event.kind,
            self.phase,
            event.age().as_secs_f64()
        );
        match event.kind {
            EventKind::BatteryLow { percent } => {
                Transition::ReturnHome(Some(OutcomeReason::BatteryLow { percent }))
            }
            EventKind::ObstacleDetected { region_count } => {
                Transition::Fault(OutcomeReason::Obstacle { region_count })
            }
            EventKind::IntruderDetected { region_count } => {
                Transition::Fault(OutcomeReason::Intruder { region_count })
            }
            EventKind::HeartbeatLost { age } => {
                self.stop_monitoring();
                Transition::Fault(OutcomeReason::HeartbeatLost { age_s: age.as_secs_f64() })
            }
            EventKind::Timeout { phase } => Transition::Fault(OutcomeReason::Timeout {
                phase,
                elapsed_s: self.journal.phase_elapsed_s(),
            }),
            EventKind::Fault { reason } => Transition::Fault(OutcomeReason::Fault { message: reason }),
        }
    }

    fn on_fault(&mut self, reason: OutcomeReason) -> Transition {
        let from = self.phase;
        self.enter(Phase::Faulted);
        warn!("⚠ fault in {from}: {reason}");

        let recoverable = !matches!(
            reason,
            OutcomeReason::Connection { .. } | OutcomeReason::GpsFix { .. } | OutcomeReason::LowBattery { .. }
        );
        if !recoverable {
            return Transition::Terminate(reason);
        }
        if self.return_attempted {
            warn!("✗ second fault during return, giving up");
            return Transition::Terminate(reason);
        }
        Transition::ReturnHome(Some(reason))
    }

    /// Link presumed dead: silence the monitors and drop anything queued.
    fn stop_monitoring(&mut self) {
        if let Some(shutdown) = &self.monitor_shutdown {
            shutdown.send_replace(true);
        }
        let dropped = self.arbiter.clear();
        warn!("📴 heartbeat lost, monitors stopped ({dropped} pending events dropped)");
    }

    fn wait_failed(&mut self, err: WaitError<Interrupt>) -> Transition {
        match err {
            WaitError::Timeout { phase, elapsed } => {
                warn!("⏱ {phase} timed out after {:.1}s", elapsed.as_secs_f64());
                Transition::Fault(OutcomeReason::Timeout { phase, elapsed_s: elapsed.as_secs_f64() })
            }
            WaitError::Interrupted { signal, .. } => self.on_interrupt(signal),
            WaitError::Gateway { phase, source } => {
                warn!("✗ {phase}: telemetry lost: {source}");
                Transition::Fault(gateway_reason(&source))
            }
        }
    }

    fn pending_interrupt(&mut self, min: Priority, honor_stop: bool) -> Option<Interrupt> {
        if let Some(event) = self.arbiter.try_next_at_least(min) {
            return Some(Interrupt::Event(event));
        }
        (honor_stop && self.stop.is_requested()).then_some(Interrupt::Stop)
    }

    /// Bounded wait on a telemetry condition, preemptible by events at or above `min`.
    async fn wait_for<F>(
        &mut self,
        phase: Phase,
        timeout: Duration,
        min: Priority,
        honor_stop: bool,
        condition: F,
    ) -> Result<Duration, WaitError<Interrupt>>
    where
        F: Fn(&VehicleState) -> bool + Sync,
    {
        let waiter = BoundedWaiter::new(phase, self.config.poll_interval(), timeout);
        let gateway = &self.gateway;
        let condition = &condition;
        waiter
            .wait_until(
                move || async move { read_with_retry(gateway.as_ref()).await.map(|s| condition(&s)) },
                next_interrupt(&mut self.arbiter, &mut self.stop, min, honor_stop),
            )
            .await
    }

    // ── Termination ───────────────────────────────────────────────────────────

    fn completion(&mut self) -> (OutcomeStatus, Option<OutcomeReason>) {
        match self.abort_reason.take() {
            Some(reason) => (OutcomeStatus::Aborted, Some(reason)),
            None => (OutcomeStatus::Completed, None),
        }
    }

    /// One unconfirmed LAND if the run ends with the vehicle still in the air.
    async fn best_effort_land(&mut self) {
        if !self.took_off {
            return;
        }
        let airborne = match self.gateway.snapshot().await {
            Ok(state) => state.is_airborne(),
            Err(_) => true,
        };
        if !airborne {
            return;
        }
        match self.gateway.set_mode(VehicleMode::Land).await {
            Ok(()) => warn!("🛬 run terminating while airborne, LAND commanded"),
            Err(e) => warn!("✗ best-effort LAND failed: {e}"),
        }
    }

    fn into_outcome(
        self,
        started_at: DateTime<Utc>,
        status: OutcomeStatus,
        reason: Option<OutcomeReason>,
    ) -> MissionOutcome {
        MissionOutcome {
            run_id: self.run_id,
            status,
            final_phase: self.phase,
            reason,
            started_at,
            duration_s: self.journal.elapsed_s(),
            phases: self.journal.finish(),
            waypoint_count: self.plan.len(),
            waypoints_reached: self.cursor.index(),
            waypoint_arrivals_s: self.arrivals,
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn command_failed(err: GatewayError) -> Transition {
    warn!("✗ command failed: {err}");
    Transition::Fault(gateway_reason(&err))
}

/// Snapshot with one retry. Commands are never retried.
pub async fn read_with_retry<S>(source: &S) -> Result<VehicleState, GatewayError>
where
    S: TelemetrySource + ?Sized,
{
    match source.snapshot().await {
        Ok(state) => Ok(state),
        Err(first) => {
            warn!("snapshot failed ({first}), retrying once");
            source.snapshot().await
        }
    }
}

async fn next_interrupt(
    arbiter: &mut Arbiter,
    stop: &mut StopSignal,
    min: Priority,
    honor_stop: bool,
) -> Interrupt {
    tokio::select! {
        biased;
        event = arbiter.next_at_least(min) => Interrupt::Event(event),
        _ = stop.requested(), if honor_stop => Interrupt::Stop,
    }
}
