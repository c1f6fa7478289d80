//! arbiter.rs — Priority arbitration over the merged event channel
//!
//! Order: `Fault > HeartbeatLost > BatteryLow > ObstacleDetected ≈ IntruderDetected`.
//! Same-priority events come out FIFO. Events older than the staleness window
//! are discarded when they reach the front.
//!
//! The supervisor asks for "the next event at or above priority P". Lower
//! priority events stay queued while it waits. What the arbiter holds is pruned
//! of stale events on every drain and capped at the channel capacity with the
//! channel's own overflow rule, so the merged queue stays bounded end to end.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::events::{Event, EventReceiver, Priority};

/// What cut a supervisor wait short.
#[derive(Debug, Clone, PartialEq)]
pub enum Interrupt {
    Event(Event),
    Stop,
}

pub struct Arbiter {
    rx: EventReceiver,
    pending: [VecDeque<Event>; Priority::COUNT],
    staleness: Duration,
    capacity: usize,
}

impl Arbiter {
    pub fn new(rx: EventReceiver, staleness: Duration) -> Self {
        let capacity = rx.capacity();
        Self {
            rx,
            pending: Default::default(),
            staleness,
            capacity,
        }
    }

    fn held(&self) -> usize {
        self.pending.iter().map(VecDeque::len).sum()
    }

    fn drain_channel(&mut self) {
        while let Some(event) = self.rx.try_recv() {
            self.prune_stale();
            if self.held() >= self.capacity && !self.make_room(&event) {
                warn!("⚠ arbiter full of faults, dropped incoming {}", event.kind);
                continue;
            }
            self.pending[event.priority().index()].push_back(event);
        }
        self.prune_stale();
    }

    /// Each rank is FIFO by raise time, so stale events sit at the fronts.
    fn prune_stale(&mut self) {
        let now = Instant::now();
        for queue in &mut self.pending {
            while let Some(front) = queue.front() {
                let age = now.saturating_duration_since(front.raised_at);
                if age <= self.staleness {
                    break;
                }
                debug!("discarding stale {} ({:.1}s old)", front.kind, age.as_secs_f64());
                queue.pop_front();
            }
        }
    }

    /// Evict the oldest non-Fault event; an incoming Fault may evict the oldest
    /// Fault. Returns `false` when `incoming` has to be dropped instead.
    fn make_room(&mut self, incoming: &Event) -> bool {
        let oldest_non_fault = (0..Priority::Fault.index())
            .filter_map(|rank| self.pending[rank].front().map(|e| (rank, e.raised_at)))
            .min_by_key(|&(_, raised_at)| raised_at)
            .map(|(rank, _)| rank);
        let rank = match oldest_non_fault {
            Some(rank) => rank,
            None if incoming.priority() == Priority::Fault => Priority::Fault.index(),
            None => return false,
        };
        if let Some(evicted) = self.pending[rank].pop_front() {
            warn!("⚠ arbiter full, evicted {}", evicted.kind);
        }
        true
    }

    fn pop_at_least(&mut self, min: Priority) -> Option<Event> {
        let now = Instant::now();
        for rank in (min.index()..Priority::COUNT).rev() {
            while let Some(event) = self.pending[rank].pop_front() {
                let age = now.saturating_duration_since(event.raised_at);
                if age > self.staleness {
                    debug!("discarding stale {} ({:.1}s old)", event.kind, age.as_secs_f64());
                    continue;
                }
                return Some(event);
            }
        }
        None
    }

    /// Highest-priority fresh event at or above `min`, if one is pending.
    pub fn try_next_at_least(&mut self, min: Priority) -> Option<Event> {
        self.drain_channel();
        self.pop_at_least(min)
    }

    /// Wait for the next fresh event at or above `min`.
    /// Cancel-safe: events are moved into `self` before any await.
    pub async fn next_at_least(&mut self, min: Priority) -> Event {
        loop {
            if let Some(event) = self.try_next_at_least(min) {
                return event;
            }
            self.rx.ready().await;
        }
    }

    pub fn pending(&self) -> usize {
        self.held() + self.rx.len()
    }

    /// Drop everything queued. Returns how many events were discarded.
    pub fn clear(&mut self) -> usize {
        self.drain_channel();
        let n = self.held();
        self.pending.iter_mut().for_each(VecDeque::clear);
        n
    }
}

// ── External stop ─────────────────────────────────────────────────────────────

/// Caller-side cancellation of a whole run.
#[derive(Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once stop is requested. Stays pending forever if the
    /// sending side is dropped without requesting.
    pub async fn requested(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
