//! monitors — Independent safety watchers
//!
//! Each monitor runs as its own task, observes one signal and emits edge-triggered
//! events into the merged channel. Monitors never issue vehicle commands. They stop
//! when the shutdown watch flips to `true` or its sender is dropped.

pub mod detection;
pub mod telemetry;

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

pub use detection::DetectionMonitor;
pub use telemetry::{BatteryCheck, HeartbeatCheck, TelemetryCheck, TelemetryMonitor};

/// Edge trigger with a re-notify floor.
///
/// Fires on a false→true transition. While the condition stays true it fires
/// again only once `re_notify` has passed since the last emission.
#[derive(Debug, Clone)]
pub struct EdgeTrigger {
    active: bool,
    last_emit: Option<Instant>,
    re_notify: Duration,
}

impl EdgeTrigger {
    pub fn new(re_notify: Duration) -> Self {
        Self { active: false, last_emit: None, re_notify }
    }

    /// Feed one observation; returns true when an event should be emitted.
    pub fn observe(&mut self, condition: bool, now: Instant) -> bool {
        if !condition {
            self.active = false;
            return false;
        }
        let fire = match (self.active, self.last_emit) {
            (true, Some(last)) => now.saturating_duration_since(last) >= self.re_notify,
            _ => true,
        };
        self.active = true;
        if fire {
            self.last_emit = Some(now);
        }
        fire
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Resolves when the monitor should exit.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
