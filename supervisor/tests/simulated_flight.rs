//! Full runs through `run_mission` against the vehicle simulator, paused clock.

mod common;

use common::{line_plan, request, HOME, TARGET_ALT};
use mission_supervisor::{run_mission, MissionConfig, MonitorConfig, RuntimeOptions, Sensors, StopSignal};
use mission_types::geo::offset_m;
use mission_types::{DetectionKind, MissionOutcome, OutcomeStatus, Phase, Waypoint};
use vehicle_sim::scenarios::{self, ScenarioConfig};
use vehicle_sim::{SimConfig, SimWorld};

/// One waypoint far enough out that the vehicle is still cruising when
/// scenario windows open.
fn long_leg() -> Vec<Waypoint> {
    vec![Waypoint::at(offset_m(&HOME, 300.0, 0.0).with_alt(TARGET_ALT), 2.0)]
}

async fn fly(sim: SimConfig, scenario: ScenarioConfig, plan: Vec<Waypoint>, endpoint: &str) -> MissionOutcome {
    let world = SimWorld::new(sim, scenario);
    let sensors = Sensors {
        obstacle: Some(Box::new(world.detector(DetectionKind::Obstacle))),
        intruder: Some(Box::new(world.detector(DetectionKind::Intruder))),
    };
    let outcome = run_mission(
        &world.connector(),
        endpoint,
        request(plan, MissionConfig::default()),
        &MonitorConfig::default(),
        sensors,
        StopSignal::never(),
        RuntimeOptions::default(),
    )
    .await;
    assert!(!world.physics_running(), "link should be closed after the run");
    outcome
}

#[tokio::test(start_paused = true)]
async fn nominal_flight_completes() {
    let outcome = fly(SimConfig::default(), ScenarioConfig::default(), line_plan(2), "sim://test").await;

    assert_eq!(outcome.status, OutcomeStatus::Completed, "{:?}", outcome.reason);
    assert_eq!(outcome.final_phase, Phase::Disarmed);
    assert_eq!(outcome.waypoints_reached, 2);
    assert_eq!(outcome.waypoint_arrivals_s.len(), 2);
    assert!(outcome.waypoint_arrivals_s[0] < outcome.waypoint_arrivals_s[1]);
    assert_eq!(
        outcome.phase_sequence(),
        vec![
            Phase::Idle,
            Phase::PreflightCheck,
            Phase::Arming,
            Phase::TakingOff,
            Phase::Executing,
            Phase::ReturningHome,
            Phase::Landing,
            Phase::Disarmed,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn draining_battery_forces_a_return() {
    let sim = SimConfig { battery_start_pct: 30.0, ..Default::default() };
    let outcome = fly(sim, scenarios::preset_battery_drain(), long_leg(), "sim://test").await;

    assert_eq!(outcome.status, OutcomeStatus::Aborted);
    assert_eq!(outcome.reason_code(), Some("BatteryLow"));
    assert_eq!(outcome.waypoints_reached, 0);
    assert!(outcome.phase(Phase::Faulted).is_none());
    assert!(outcome.phase(Phase::Landing).is_some());
}

#[tokio::test(start_paused = true)]
async fn obstacle_window_aborts_the_mission() {
    let outcome = fly(SimConfig::default(), scenarios::preset_obstacle(), long_leg(), "sim://test").await;

    assert_eq!(outcome.status, OutcomeStatus::Aborted);
    assert_eq!(outcome.reason_code(), Some("ObstacleDetected"));
    assert!(outcome.phase(Phase::Faulted).is_some());
    assert!(outcome.phase(Phase::Landing).is_some());
}

#[tokio::test(start_paused = true)]
async fn link_dropout_is_heartbeat_lost() {
    let outcome = fly(SimConfig::default(), scenarios::preset_link_loss(), long_leg(), "sim://test").await;

    assert_eq!(outcome.reason_code(), Some("HeartbeatLost"));
    assert_eq!(outcome.status, OutcomeStatus::Aborted);
    assert_eq!(outcome.final_phase, Phase::Disarmed);
}

#[tokio::test(start_paused = true)]
async fn no_gps_fix_never_arms() {
    let outcome = fly(SimConfig::default(), scenarios::preset_no_gps(), line_plan(2), "sim://test").await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(outcome.reason_code(), Some("GpsFixError"));
    assert_eq!(
        outcome.phase_sequence(),
        vec![Phase::Idle, Phase::PreflightCheck, Phase::Faulted, Phase::Disarmed]
    );
}

#[tokio::test(start_paused = true)]
async fn refused_arm_fails_on_the_ground() {
    let outcome = fly(SimConfig::default(), scenarios::preset_arm_refused(), line_plan(2), "sim://test").await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(outcome.reason_code(), Some("CommandError"));
    assert!(outcome.phase(Phase::TakingOff).is_none());
}

#[tokio::test(start_paused = true)]
async fn unreachable_endpoint_is_a_connection_failure() {
    let world = SimWorld::new(SimConfig::default(), ScenarioConfig::default());
    let outcome = run_mission(
        &world.connector(),
        "udp://127.0.0.1:14550",
        request(line_plan(3), MissionConfig::default()),
        &MonitorConfig::default(),
        Sensors::default(),
        StopSignal::never(),
        RuntimeOptions::default(),
    )
    .await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(outcome.final_phase, Phase::Faulted);
    assert_eq!(outcome.reason_code(), Some("ConnectionError"));
    assert_eq!(outcome.waypoint_count, 3);
    assert_eq!(outcome.phase_sequence(), vec![Phase::Faulted]);
}
