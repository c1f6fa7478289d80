//! mission.rs — Mission start request, plan cursor and phase journal

use serde::Serialize;
use tokio::time::Instant;

use mission_types::{MissionPlan, Phase, PhaseTiming, Position};

use crate::config::MissionConfig;

/// Everything needed to start a supervised run.
#[derive(Debug, Clone)]
pub struct MissionRequest {
    pub plan: MissionPlan,
    /// Takeoff and return altitude, meters above home
    pub target_altitude_m: f64,
    pub home: Position,
    pub config: MissionConfig,
}

// ── Plan cursor ───────────────────────────────────────────────────────────────

/// `next_index` into the plan. Only moves forward and never past `len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanCursor {
    next: usize,
    len: usize,
}

impl PlanCursor {
    pub fn new(len: usize) -> Self {
        Self { next: 0, len }
    }

    pub fn index(&self) -> usize {
        self.next
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_complete(&self) -> bool {
        self.next >= self.len
    }

    /// Step to the next waypoint. No-op once complete.
    pub fn advance(&mut self) -> bool {
        if self.is_complete() {
            return false;
        }
        self.next += 1;
        true
    }
}

// ── Status broadcast ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SupervisorStatus {
    pub phase: Phase,
    pub next_index: usize,
    pub plan_len: usize,
}

// ── Phase journal ─────────────────────────────────────────────────────────────

/// Records when each phase was entered and how long it lasted.
#[derive(Debug)]
pub struct PhaseJournal {
    origin: Instant,
    current: Option<(Phase, Instant)>,
    closed: Vec<PhaseTiming>,
}

impl PhaseJournal {
    pub fn start() -> Self {
        Self { origin: Instant::now(), current: None, closed: Vec::new() }
    }

    /// Seconds since the run started
    pub fn elapsed_s(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    pub fn current(&self) -> Option<Phase> {
        self.current.map(|(phase, _)| phase)
    }

    /// Seconds spent in the open phase so far
    pub fn phase_elapsed_s(&self) -> f64 {
        self.current.map_or(0.0, |(_, since)| since.elapsed().as_secs_f64())
    }

    pub fn enter(&mut self, phase: Phase) {
        let now = Instant::now();
        self.close(now);
        self.current = Some((phase, now));
    }

    fn close(&mut self, now: Instant) {
        if let Some((phase, since)) = self.current.take() {
            self.closed.push(PhaseTiming {
                phase,
                entered_at_s: since.duration_since(self.origin).as_secs_f64(),
                duration_s: now.duration_since(since).as_secs_f64(),
            });
        }
    }

    /// Close the open phase and return all timings in entry order.
    pub fn finish(mut self) -> Vec<PhaseTiming> {
        self.close(Instant::now());
        self.closed
    }
}
