//! telemetry.rs — Telemetry-driven monitors (battery, heartbeat)
//!
//! One sampling loop, parameterised by a [`TelemetryCheck`] that turns a
//! snapshot into an optional event. Repeated snapshot failures raise a single
//! `Fault` per failure streak.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use mission_types::{TelemetrySource, VehicleState};

use super::{shutdown_requested, EdgeTrigger};
use crate::config::MonitorConfig;
use crate::events::{EventKind, EventSender};

/// Condition evaluated against every sampled snapshot.
pub trait TelemetryCheck: Send + 'static {
    fn name(&self) -> &'static str;

    /// `Some(event)` while the alarm condition holds
    fn evaluate(&self, state: &VehicleState) -> Option<EventKind>;
}

/// Battery strictly below threshold
#[derive(Debug, Clone, Copy)]
pub struct BatteryCheck {
    pub threshold_percent: u8,
}

impl TelemetryCheck for BatteryCheck {
    fn name(&self) -> &'static str {
        "battery"
    }

    fn evaluate(&self, state: &VehicleState) -> Option<EventKind> {
        (state.battery_percent < self.threshold_percent)
            .then_some(EventKind::BatteryLow { percent: state.battery_percent })
    }
}

/// Heartbeat age at or beyond timeout
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatCheck {
    pub timeout: Duration,
}

impl TelemetryCheck for HeartbeatCheck {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    fn evaluate(&self, state: &VehicleState) -> Option<EventKind> {
        (state.last_heartbeat_age >= self.timeout)
            .then_some(EventKind::HeartbeatLost { age: state.last_heartbeat_age })
    }
}

pub struct TelemetryMonitor<C> {
    check: C,
    telemetry: Arc<dyn TelemetrySource>,
    events: EventSender,
    sample_interval: Duration,
    trigger: EdgeTrigger,
    fault_after: u32,
    failures: u32,
}

impl<C: TelemetryCheck> TelemetryMonitor<C> {
    pub fn new(
        check: C,
        telemetry: Arc<dyn TelemetrySource>,
        events: EventSender,
        sample_interval: Duration,
        re_notify: Duration,
        fault_after: u32,
    ) -> Self {
        Self {
            check,
            telemetry,
            events,
            sample_interval: sample_interval.max(Duration::from_millis(1)),
            trigger: EdgeTrigger::new(re_notify),
            fault_after: fault_after.max(1),
            failures: 0,
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("👁  {} monitor running every {:?}", self.check.name(), self.sample_interval);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                _ = ticker.tick() => self.sample().await,
            }
        }
        debug!("{} monitor stopped", self.check.name());
    }

    async fn sample(&mut self) {
        let state = match self.telemetry.snapshot().await {
            Ok(state) => {
                self.failures = 0;
                state
            }
            Err(e) => {
                self.failures += 1;
                warn!("{} monitor: snapshot failed ({}): {e}", self.check.name(), self.failures);
                if self.failures == self.fault_after {
                    self.events.emit(EventKind::Fault {
                        reason: format!(
                            "{} monitor: {} consecutive telemetry failures ({e})",
                            self.check.name(),
                            self.failures
                        ),
                    });
                }
                return;
            }
        };

        let alarm = self.check.evaluate(&state);
        if self.trigger.observe(alarm.is_some(), Instant::now()) {
            if let Some(kind) = alarm {
                info!("🚨 {} monitor: {kind}", self.check.name());
                self.events.emit(kind);
            }
        }
    }
}

impl TelemetryMonitor<BatteryCheck> {
    pub fn battery(
        telemetry: Arc<dyn TelemetrySource>,
        events: EventSender,
        cfg: &MonitorConfig,
        re_notify: Duration,
    ) -> Self {
        Self::new(
            BatteryCheck { threshold_percent: cfg.battery_low_percent },
            telemetry,
            events,
            cfg.battery_interval(),
            re_notify,
            cfg.telemetry_fault_after,
        )
    }
}

impl TelemetryMonitor<HeartbeatCheck> {
    pub fn heartbeat(
        telemetry: Arc<dyn TelemetrySource>,
        events: EventSender,
        cfg: &MonitorConfig,
        re_notify: Duration,
    ) -> Self {
        Self::new(
            HeartbeatCheck { timeout: cfg.heartbeat_timeout() },
            telemetry,
            events,
            cfg.heartbeat_interval(),
            re_notify,
            cfg.telemetry_fault_after,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battery_threshold_is_strict() {
        let check = BatteryCheck { threshold_percent: 20 };
        let at = |percent| VehicleState { battery_percent: percent, ..Default::default() };
        assert_eq!(check.evaluate(&at(20)), None);
        assert_eq!(check.evaluate(&at(19)), Some(EventKind::BatteryLow { percent: 19 }));
    }

    #[test]
    fn heartbeat_fires_at_timeout() {
        let check = HeartbeatCheck { timeout: Duration::from_secs(5) };
        let aged = |secs| VehicleState { last_heartbeat_age: Duration::from_secs(secs), ..Default::default() };
        assert_eq!(check.evaluate(&aged(4)), None);
        assert_eq!(
            check.evaluate(&aged(5)),
            Some(EventKind::HeartbeatLost { age: Duration::from_secs(5) })
        );
    }
}
