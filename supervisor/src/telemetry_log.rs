//! telemetry_log.rs — Periodic telemetry log line (observability only)

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use mission_types::TelemetrySource;

use crate::mission::SupervisorStatus;
use crate::monitors::shutdown_requested;

pub struct TelemetryLogger {
    telemetry: Arc<dyn TelemetrySource>,
    status: watch::Receiver<SupervisorStatus>,
    every: Duration,
    lines: u64,
}

impl TelemetryLogger {
    pub fn new(
        telemetry: Arc<dyn TelemetrySource>,
        status: watch::Receiver<SupervisorStatus>,
        every: Duration,
    ) -> Self {
        Self {
            telemetry,
            status,
            every: every.max(Duration::from_millis(100)),
            lines: 0,
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                _ = ticker.tick() => self.log_once().await,
            }
        }
        debug!("telemetry logger stopped after {} lines", self.lines);
    }

    async fn log_once(&mut self) {
        let status = *self.status.borrow();
        match self.telemetry.snapshot().await {
            Ok(s) => {
                self.lines += 1;
                info!(
                    "📡 {} wp {}/{} | {} armed={} | ({:.6}, {:.6}) alt {:.1} m | {:.1} m/s | batt {}% | gps {} | hb {:.1}s",
                    status.phase,
                    status.next_index,
                    status.plan_len,
                    s.mode,
                    s.armed,
                    s.position.lat,
                    s.position.lon,
                    s.position.alt,
                    s.groundspeed,
                    s.battery_percent,
                    s.gps_fix_quality,
                    s.last_heartbeat_age.as_secs_f64(),
                );
            }
            Err(e) => debug!("telemetry logger: snapshot failed: {e}"),
        }
    }
}
