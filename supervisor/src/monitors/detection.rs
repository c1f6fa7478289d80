//! detection.rs — Camera detection monitor (obstacle and intruder)
//!
//! One implementation, configured per [`DetectionKind`]. A frame counts as a
//! detection when its region count reaches `min_regions`. Detections are only
//! acted on while the vehicle mode is GUIDED or AUTO; outside those modes the
//! trigger is held clear.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use mission_types::{DetectionKind, DetectionSource, FrameResult, GatewayError, TelemetrySource};

use super::{shutdown_requested, EdgeTrigger};
use crate::config::MonitorConfig;
use crate::events::{EventKind, EventSender};

pub struct DetectionMonitor {
    kind: DetectionKind,
    source: Box<dyn DetectionSource>,
    telemetry: Arc<dyn TelemetrySource>,
    events: EventSender,
    min_regions: u32,
    trigger: EdgeTrigger,
    retry: Duration,
    fault_after: u32,
    failures: u32,
}

impl DetectionMonitor {
    pub fn new(
        kind: DetectionKind,
        source: Box<dyn DetectionSource>,
        telemetry: Arc<dyn TelemetrySource>,
        events: EventSender,
        cfg: &MonitorConfig,
        re_notify: Duration,
    ) -> Self {
        let min_regions = match kind {
            DetectionKind::Obstacle => cfg.obstacle_min_regions,
            DetectionKind::Intruder => cfg.intruder_min_regions,
        };
        Self {
            kind,
            source,
            telemetry,
            events,
            min_regions: min_regions.max(1),
            trigger: EdgeTrigger::new(re_notify),
            retry: cfg.detector_retry(),
            fault_after: cfg.telemetry_fault_after.max(1),
            failures: 0,
        }
    }

    fn event_for(&self, region_count: u32) -> EventKind {
        match self.kind {
            DetectionKind::Obstacle => EventKind::ObstacleDetected { region_count },
            DetectionKind::Intruder => EventKind::IntruderDetected { region_count },
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("👁  {} monitor running (≥{} regions)", self.kind, self.min_regions);
        loop {
            let frame = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                frame = self.source.next_frame() => frame,
            };
            match frame {
                Ok(frame) => self.on_frame(frame).await,
                Err(e) => {
                    if !self.on_stream_error(e, &mut shutdown).await {
                        break;
                    }
                }
            }
        }
        debug!("{} monitor stopped", self.kind);
    }

    async fn on_frame(&mut self, frame: FrameResult) {
        self.failures = 0;
        let detected = frame.region_count >= self.min_regions;

        // Mode gate: only read telemetry when there is something to act on
        // or the trigger needs clearing.
        let flying = if detected {
            match self.telemetry.snapshot().await {
                Ok(state) => state.mode.is_flight_capable(),
                Err(e) => {
                    debug!("{} monitor: mode unknown, frame skipped: {e}", self.kind);
                    return;
                }
            }
        } else {
            false
        };

        if self.trigger.observe(detected && flying, Instant::now()) {
            let kind = self.event_for(frame.region_count);
            info!("🚨 {} monitor: {kind} at {:.1}s", self.kind, frame.timestamp.as_secs_f64());
            self.events.emit(kind);
        }
    }

    /// Back off and restart the stream. Returns false if shutdown arrived meanwhile.
    async fn on_stream_error(&mut self, err: GatewayError, shutdown: &mut watch::Receiver<bool>) -> bool {
        self.failures += 1;
        warn!("{} monitor: stream error ({}): {err}", self.kind, self.failures);
        if self.failures == self.fault_after {
            self.events.emit(EventKind::Fault {
                reason: format!("{} detector: {} consecutive stream failures ({err})", self.kind, self.failures),
            });
        }

        tokio::select! {
            biased;
            _ = shutdown_requested(shutdown) => return false,
            _ = sleep(self.retry) => {}
        }
        if let Err(e) = self.source.restart().await {
            warn!("{} monitor: restart failed: {e}", self.kind);
        }
        true
    }
}
