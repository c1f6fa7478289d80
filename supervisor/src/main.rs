//! main.rs — Mission Supervisor entry point
//!
//! Flies the configured mission against the built-in vehicle simulator:
//!   1. Load config.toml (falls back to the embedded copy)
//!   2. Build the simulated world, link and camera detectors for the chosen scenario
//!   3. Run the mission; Ctrl-C requests a safe stop (return and land)
//!   4. Record the outcome and print it as JSON; exit code 0 only on a completed mission

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{info, warn};

use mission_supervisor::{
    run_mission, ConfigError, MissionConfig, MissionSettings, MonitorConfig, OutcomeRecorder,
    RuntimeOptions, Sensors, StopSignal,
};
use mission_types::DetectionKind;
use vehicle_sim::scenarios::{self, PRESET_NAMES};
use vehicle_sim::{ScenarioConfig, SimConfig, SimWorld};

const EMBEDDED_CONFIG: &str = include_str!("../config.toml");

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mission-supervisor", about = "Drone mission supervisor (simulated vehicle)")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Vehicle endpoint, overrides [vehicle].endpoint
    #[arg(long)]
    endpoint: Option<String>,
    /// Scenario preset, overrides [scenario]
    #[arg(long)]
    scenario: Option<String>,
    /// Append the outcome as a JSON line to this file
    #[arg(long)]
    outcome_log: Option<PathBuf>,
}

// ── Config structs ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FullConfig {
    vehicle: VehicleConfig,
    mission: MissionSettings,
    supervisor: MissionConfig,
    monitors: MonitorConfig,
    simulator: SimConfig,
    scenario: ScenarioConfig,
    output: OutputConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct VehicleConfig {
    endpoint: String,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self { endpoint: "sim://local".into() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct OutputConfig {
    outcome_log: Option<PathBuf>,
    /// 0 disables the periodic telemetry line
    telemetry_log_interval_s: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { outcome_log: None, telemetry_log_interval_s: 5.0 }
    }
}

fn parse_config(text: &str) -> Result<FullConfig, ConfigError> {
    let cfg: FullConfig = toml::from_str(text)?;
    cfg.supervisor.validate()?;
    cfg.monitors.validate()?;
    cfg.mission.validate()?;
    Ok(cfg)
}

fn load_config(path: &str) -> Result<FullConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_config(&text),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("{path} not found, using embedded config.toml");
            parse_config(EMBEDDED_CONFIG)
        }
        Err(e) => Err(e.into()),
    }
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mission_supervisor=info,vehicle_sim=info".into()),
        )
        .init();

    let args = Args::parse();
    let cfg = load_config(&args.config).with_context(|| format!("loading {}", args.config))?;

    let scenario = match &args.scenario {
        Some(name) => scenarios::preset(name)
            .ok_or_else(|| anyhow!("unknown scenario '{name}' (known: {})", PRESET_NAMES.join(", ")))?,
        None => cfg.scenario.clone(),
    };
    let endpoint = args.endpoint.unwrap_or(cfg.vehicle.endpoint);
    let recorder = OutcomeRecorder::new(args.outcome_log.or(cfg.output.outcome_log));

    info!(
        "🚁 Mission Supervisor starting: {} waypoints at {:.0} m, scenario {:?}",
        cfg.mission.waypoints.len(),
        cfg.mission.target_altitude_m,
        scenario.active
    );

    let world = SimWorld::new(cfg.simulator.clone(), scenario);
    let sensors = Sensors {
        obstacle: Some(Box::new(world.detector(DetectionKind::Obstacle))),
        intruder: Some(Box::new(world.detector(DetectionKind::Intruder))),
    };

    // Ctrl-C → safe stop
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⏹ Ctrl-C received, requesting safe stop");
            let _ = stop_tx.send(true);
        }
    });

    let options = RuntimeOptions {
        telemetry_log_interval: Duration::try_from_secs_f64(cfg.output.telemetry_log_interval_s)
            .ok()
            .filter(|d| !d.is_zero()),
    };
    let request = cfg.mission.into_request(cfg.supervisor);
    let outcome = run_mission(
        &world.connector(),
        &endpoint,
        request,
        &cfg.monitors,
        sensors,
        StopSignal::new(stop_rx),
        options,
    )
    .await;

    recorder.record(&outcome).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(if outcome.is_success() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
