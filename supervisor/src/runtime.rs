//! runtime.rs — Wires one supervised run together
//!
//! connect → spawn monitors (+ telemetry logger) → run supervisor → stop monitors → disconnect
//!
//! The supervisor gets the command side of the link. Monitors and the logger only
//! get the read-only telemetry handle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use mission_types::{
    DetectionKind, DetectionSource, GatewayConnector, MissionOutcome, OutcomeReason, OutcomeStatus,
    Phase, PhaseTiming,
};

use crate::arbiter::StopSignal;
use crate::config::MonitorConfig;
use crate::events;
use crate::mission::MissionRequest;
use crate::monitors::{DetectionMonitor, TelemetryMonitor};
use crate::supervisor::MissionSupervisor;
use crate::telemetry_log::TelemetryLogger;

/// Camera detection sources. Either may be absent.
#[derive(Default)]
pub struct Sensors {
    pub obstacle: Option<Box<dyn DetectionSource>>,
    pub intruder: Option<Box<dyn DetectionSource>>,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Periodic telemetry log line; `None` disables the logger
    pub telemetry_log_interval: Option<Duration>,
}

/// Run one mission end to end. Always returns exactly one outcome.
pub async fn run_mission(
    connector: &dyn GatewayConnector,
    endpoint: &str,
    request: MissionRequest,
    monitors: &MonitorConfig,
    sensors: Sensors,
    stop: StopSignal,
    options: RuntimeOptions,
) -> MissionOutcome {
    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let clock = Instant::now();

    let gateway = match connector.connect(endpoint).await {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("✗ could not connect to {endpoint}: {e}");
            return MissionOutcome {
                run_id,
                status: OutcomeStatus::Failed,
                final_phase: Phase::Faulted,
                reason: Some(OutcomeReason::Connection { message: e.to_string() }),
                started_at,
                duration_s: clock.elapsed().as_secs_f64(),
                phases: vec![PhaseTiming {
                    phase: Phase::Faulted,
                    entered_at_s: 0.0,
                    duration_s: 0.0,
                }],
                waypoint_count: request.plan.len(),
                waypoints_reached: 0,
                waypoint_arrivals_s: Vec::new(),
            };
        }
    };
    info!("🔗 connected to {endpoint}");

    let re_notify = request.config.re_notify_interval();
    let (tx, rx) = events::channel(request.config.event_queue_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let telemetry = gateway.telemetry();

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    tasks.push(tokio::spawn(
        TelemetryMonitor::battery(telemetry.clone(), tx.clone(), monitors, re_notify).run(shutdown_rx.clone()),
    ));
    tasks.push(tokio::spawn(
        TelemetryMonitor::heartbeat(telemetry.clone(), tx.clone(), monitors, re_notify).run(shutdown_rx.clone()),
    ));
    for (kind, source) in [
        (DetectionKind::Obstacle, sensors.obstacle),
        (DetectionKind::Intruder, sensors.intruder),
    ] {
        if let Some(source) = source {
            let monitor = DetectionMonitor::new(kind, source, telemetry.clone(), tx.clone(), monitors, re_notify);
            tasks.push(tokio::spawn(monitor.run(shutdown_rx.clone())));
        }
    }
    drop(tx);

    let supervisor = MissionSupervisor::new(gateway.clone(), request, rx, stop)
        .with_run_id(run_id)
        .with_monitor_shutdown(shutdown_tx.clone());

    if let Some(every) = options.telemetry_log_interval {
        let logger = TelemetryLogger::new(telemetry.clone(), supervisor.subscribe(), every);
        tasks.push(tokio::spawn(logger.run(shutdown_rx.clone())));
    }

    let outcome = supervisor.run().await;

    shutdown_tx.send_replace(true);
    for task in tasks {
        if let Err(e) = task.await {
            warn!("background task ended abnormally: {e}");
        }
    }
    gateway.disconnect().await;
    info!("🔌 disconnected from {endpoint}");

    outcome
}
