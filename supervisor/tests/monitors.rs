//! Monitor behavior on the paused clock: edge triggering, re-notification,
//! failure escalation and the detection mode gate.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;

use common::{drain, secs, ScriptedDetector, ScriptedTelemetry};
use mission_supervisor::events;
use mission_supervisor::monitors::{DetectionMonitor, TelemetryMonitor};
use mission_supervisor::{EventKind, MonitorConfig};
use mission_types::{DetectionKind, GatewayError, VehicleMode, VehicleState};

fn every_ten_seconds() -> MonitorConfig {
    MonitorConfig { battery_interval_s: 10.0, ..Default::default() }
}

/// Spawn, let it run for `span`, then shut it down and wait for it.
async fn run_for<F>(span: Duration, monitor: impl FnOnce(watch::Receiver<bool>) -> F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let (shutdown, rx) = watch::channel(false);
    let task = tokio::spawn(monitor(rx));
    sleep(span).await;
    shutdown.send_replace(true);
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn battery_crossing_emits_exactly_once() {
    let telemetry = ScriptedTelemetry::battery(&[55, 40, 18]);
    let (tx, mut rx) = events::channel(32);
    let monitor = TelemetryMonitor::battery(telemetry.clone(), tx, &every_ten_seconds(), secs(60));

    run_for(Duration::from_secs(25), |sd| monitor.run(sd)).await;

    assert_eq!(telemetry.calls(), 3);
    assert_eq!(drain(&mut rx), vec![EventKind::BatteryLow { percent: 18 }]);
}

#[tokio::test(start_paused = true)]
async fn persistent_low_battery_is_renotified() {
    let telemetry = ScriptedTelemetry::battery(&[15]);
    let (tx, mut rx) = events::channel(32);
    let cfg = MonitorConfig { battery_interval_s: 1.0, ..Default::default() };
    let monitor = TelemetryMonitor::battery(telemetry, tx, &cfg, secs(10));

    run_for(Duration::from_millis(35_500), |sd| monitor.run(sd)).await;

    let got = drain(&mut rx);
    assert_eq!(got.len(), 4, "{got:?}");
    assert!(got.iter().all(|k| *k == EventKind::BatteryLow { percent: 15 }));
}

#[tokio::test(start_paused = true)]
async fn battery_recovery_rearms_the_trigger() {
    let telemetry = ScriptedTelemetry::battery(&[15, 50, 14]);
    let (tx, mut rx) = events::channel(32);
    let cfg = MonitorConfig { battery_interval_s: 1.0, ..Default::default() };
    let monitor = TelemetryMonitor::battery(telemetry, tx, &cfg, secs(60));

    run_for(Duration::from_millis(5_500), |sd| monitor.run(sd)).await;

    assert_eq!(
        drain(&mut rx),
        vec![EventKind::BatteryLow { percent: 15 }, EventKind::BatteryLow { percent: 14 }]
    );
}

#[tokio::test(start_paused = true)]
async fn stale_heartbeat_raises_heartbeat_lost() {
    let fresh = VehicleState::default();
    let stale = VehicleState { last_heartbeat_age: Duration::from_secs(6), ..Default::default() };
    let telemetry = ScriptedTelemetry::new(vec![Ok(fresh.clone()), Ok(fresh), Ok(stale)]);
    let (tx, mut rx) = events::channel(32);
    let monitor = TelemetryMonitor::heartbeat(telemetry, tx, &MonitorConfig::default(), secs(60));

    run_for(Duration::from_millis(4_500), |sd| monitor.run(sd)).await;

    assert_eq!(drain(&mut rx), vec![EventKind::HeartbeatLost { age: Duration::from_secs(6) }]);
}

#[tokio::test(start_paused = true)]
async fn repeated_telemetry_failures_escalate_once() {
    let telemetry = ScriptedTelemetry::new(vec![Err(GatewayError::Telemetry("no data".into()))]);
    let (tx, mut rx) = events::channel(32);
    let cfg = MonitorConfig { battery_interval_s: 1.0, telemetry_fault_after: 3, ..Default::default() };
    let monitor = TelemetryMonitor::battery(telemetry.clone(), tx, &cfg, secs(10));

    run_for(Duration::from_millis(9_500), |sd| monitor.run(sd)).await;

    assert_eq!(telemetry.calls(), 10);
    let got = drain(&mut rx);
    assert_eq!(got.len(), 1, "{got:?}");
    assert!(matches!(&got[0], EventKind::Fault { reason } if reason.contains("3 consecutive")));
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_monitor_promptly() {
    let telemetry = ScriptedTelemetry::battery(&[90]);
    let (tx, _rx) = events::channel(32);
    let monitor = TelemetryMonitor::battery(telemetry.clone(), tx, &every_ten_seconds(), secs(10));

    run_for(Duration::from_secs(1), |sd| monitor.run(sd)).await;
    let calls = telemetry.calls();
    sleep(Duration::from_secs(60)).await;
    assert_eq!(telemetry.calls(), calls);
}

// ── Detection ─────────────────────────────────────────────────────────────────

fn flying(mode: VehicleMode) -> Arc<ScriptedTelemetry> {
    ScriptedTelemetry::new(vec![Ok(VehicleState { mode, ..Default::default() })])
}

#[tokio::test(start_paused = true)]
async fn detections_on_the_ground_are_ignored() {
    let detector = ScriptedDetector::new(vec![Some(3); 10], Duration::from_millis(200));
    let (tx, mut rx) = events::channel(32);
    let monitor = DetectionMonitor::new(
        DetectionKind::Obstacle,
        Box::new(detector),
        flying(VehicleMode::Ground),
        tx,
        &MonitorConfig::default(),
        secs(10),
    );

    run_for(Duration::from_secs(3), |sd| monitor.run(sd)).await;

    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn detection_in_flight_emits_on_rising_edge() {
    // hit, hit, clear, hit
    let frames = vec![Some(2), Some(2), Some(0), Some(1)];
    let detector = ScriptedDetector::new(frames, Duration::from_millis(200));
    let (tx, mut rx) = events::channel(32);
    let monitor = DetectionMonitor::new(
        DetectionKind::Intruder,
        Box::new(detector),
        flying(VehicleMode::Auto),
        tx,
        &MonitorConfig::default(),
        secs(10),
    );

    run_for(Duration::from_secs(2), |sd| monitor.run(sd)).await;

    assert_eq!(
        drain(&mut rx),
        vec![
            EventKind::IntruderDetected { region_count: 2 },
            EventKind::IntruderDetected { region_count: 1 },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn below_min_regions_is_not_a_detection() {
    let detector = ScriptedDetector::new(vec![Some(1); 5], Duration::from_millis(200));
    let (tx, mut rx) = events::channel(32);
    let cfg = MonitorConfig { obstacle_min_regions: 2, ..Default::default() };
    let monitor = DetectionMonitor::new(
        DetectionKind::Obstacle,
        Box::new(detector),
        flying(VehicleMode::Guided),
        tx,
        &cfg,
        secs(10),
    );

    run_for(Duration::from_secs(2), |sd| monitor.run(sd)).await;

    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn stream_errors_restart_and_escalate_once() {
    let detector = ScriptedDetector::new(vec![None, None, None, None], Duration::from_millis(100));
    let restarts = detector.restarts.clone();
    let (tx, mut rx) = events::channel(32);
    let cfg = MonitorConfig { detector_retry_s: 1.0, telemetry_fault_after: 3, ..Default::default() };
    let monitor = DetectionMonitor::new(
        DetectionKind::Obstacle,
        Box::new(detector),
        flying(VehicleMode::Auto),
        tx,
        &cfg,
        secs(10),
    );

    run_for(Duration::from_secs(10), |sd| monitor.run(sd)).await;

    assert_eq!(restarts.load(Ordering::SeqCst), 4);
    let got = drain(&mut rx);
    assert_eq!(got.len(), 1, "{got:?}");
    assert!(matches!(&got[0], EventKind::Fault { reason } if reason.contains("obstacle detector")));
}
