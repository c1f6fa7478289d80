//! events.rs — Safety events and the merged monitor → supervisor channel
//!
//! Producers never block: [`EventSender::emit`] pushes into a bounded queue and
//! returns. When the queue is full the oldest non-Fault event is evicted. If
//! only Fault events are queued, an incoming non-Fault is dropped instead and
//! an incoming Fault evicts the oldest Fault.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::warn;

use mission_types::Phase;

// ── Event types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    BatteryLow { percent: u8 },
    ObstacleDetected { region_count: u32 },
    IntruderDetected { region_count: u32 },
    HeartbeatLost { age: Duration },
    Timeout { phase: Phase },
    Fault { reason: String },
}

/// Arbitration rank, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Detection = 0,
    Battery = 1,
    Link = 2,
    Fault = 3,
}

impl Priority {
    pub const COUNT: usize = 4;

    pub fn index(self) -> usize {
        self as usize
    }
}

impl EventKind {
    pub fn priority(&self) -> Priority {
        match self {
            Self::ObstacleDetected { .. } | Self::IntruderDetected { .. } => Priority::Detection,
            Self::BatteryLow { .. } => Priority::Battery,
            Self::HeartbeatLost { .. } => Priority::Link,
            Self::Timeout { .. } | Self::Fault { .. } => Priority::Fault,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BatteryLow { percent } => write!(f, "BatteryLow({percent}%)"),
            Self::ObstacleDetected { region_count } => write!(f, "ObstacleDetected({region_count})"),
            Self::IntruderDetected { region_count } => write!(f, "IntruderDetected({region_count})"),
            Self::HeartbeatLost { age } => write!(f, "HeartbeatLost({:.1}s)", age.as_secs_f64()),
            Self::Timeout { phase } => write!(f, "Timeout({phase})"),
            Self::Fault { reason } => write!(f, "Fault({reason})"),
        }
    }
}

/// Immutable fact raised by a monitor, stamped with the monotonic clock.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub raised_at: Instant,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self { kind, raised_at: Instant::now() }
    }

    pub fn priority(&self) -> Priority {
        self.kind.priority()
    }

    fn is_fault(&self) -> bool {
        self.priority() == Priority::Fault
    }

    pub fn age(&self) -> Duration {
        self.raised_at.elapsed()
    }
}

// ── Bounded queue ─────────────────────────────────────────────────────────────

struct Shared {
    queue: Mutex<VecDeque<Event>>,
    notify: Notify,
    capacity: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create the merged event channel.
pub fn channel(capacity: usize) -> (EventSender, EventReceiver) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        notify: Notify::new(),
        capacity: capacity.max(1),
    });
    (EventSender { shared: shared.clone() }, EventReceiver { shared })
}

/// Producer handle. Cheap to clone, one per monitor.
#[derive(Clone)]
pub struct EventSender {
    shared: Arc<Shared>,
}

impl EventSender {
    pub fn emit(&self, kind: EventKind) {
        self.push(Event::new(kind));
    }

    pub fn push(&self, event: Event) {
        {
            let mut queue = self.shared.lock();
            if queue.len() >= self.shared.capacity {
                if let Some(pos) = queue.iter().position(|e| !e.is_fault()) {
                    if let Some(evicted) = queue.remove(pos) {
                        warn!("⚠ event queue full, evicted {}", evicted.kind);
                    }
                } else if event.is_fault() {
                    if let Some(evicted) = queue.pop_front() {
                        warn!("⚠ event queue full of faults, evicted {}", evicted.kind);
                    }
                } else {
                    warn!("⚠ event queue full of faults, dropped incoming {}", event.kind);
                    return;
                }
            }
            queue.push_back(event);
        }
        self.shared.notify.notify_one();
    }
}

/// Consumer handle. Owned by the supervisor's arbiter.
pub struct EventReceiver {
    shared: Arc<Shared>,
}

impl EventReceiver {
    pub fn try_recv(&mut self) -> Option<Event> {
        self.shared.lock().pop_front()
    }

    /// Wait until something may have been queued. Cancel-safe.
    pub async fn ready(&mut self) {
        if !self.shared.lock().is_empty() {
            return;
        }
        self.shared.notify.notified().await;
    }

    pub async fn recv(&mut self) -> Event {
        loop {
            if let Some(event) = self.try_recv() {
                return event;
            }
            self.shared.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
