//! waiter.rs — Bounded condition waiter
//!
//! Samples a condition every `interval` until it holds or `timeout` elapses.
//! Every sample and every sleep is raced against an interrupt future, so a
//! preempting event or stop request unwinds the wait immediately.
//!
//! Timing guarantees (tokio clock):
//! - success is reported at the first sample that sees the condition, so at most
//!   one interval after it became true
//! - timeout is reported at the first sample taken at or after the deadline; the
//!   last sleep is clipped to the deadline so this is the deadline itself

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tracing::debug;

use mission_types::{GatewayError, Phase};

use crate::error::WaitError;

#[derive(Debug, Clone, Copy)]
pub struct BoundedWaiter {
    phase: Phase,
    interval: Duration,
    timeout: Duration,
}

impl BoundedWaiter {
    pub fn new(phase: Phase, interval: Duration, timeout: Duration) -> Self {
        Self {
            phase,
            interval: interval.max(Duration::from_millis(1)),
            timeout,
        }
    }

    /// Wait until `probe` yields `true`. Returns the elapsed time on success.
    pub async fn wait_until<P, Fut, I>(
        &self,
        mut probe: P,
        interrupt: I,
    ) -> Result<Duration, WaitError<I::Output>>
    where
        P: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, GatewayError>>,
        I: Future,
        I::Output: std::fmt::Debug,
    {
        let phase = self.phase;
        let start = Instant::now();
        let deadline = saturating_add(start, self.timeout);
        tokio::pin!(interrupt);

        loop {
            let sample = tokio::select! {
                biased;
                signal = &mut interrupt => {
                    return Err(WaitError::Interrupted { phase, signal, elapsed: start.elapsed() });
                }
                sample = probe() => sample,
            };

            match sample {
                Ok(true) => {
                    let elapsed = start.elapsed();
                    debug!("{phase} condition met after {:.1}s", elapsed.as_secs_f64());
                    return Ok(elapsed);
                }
                Ok(false) => {}
                Err(source) => return Err(WaitError::Gateway { phase, source }),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(WaitError::Timeout { phase, elapsed: now - start });
            }

            let wake = saturating_add(now, self.interval).min(deadline);
            tokio::select! {
                biased;
                signal = &mut interrupt => {
                    return Err(WaitError::Interrupted { phase, signal, elapsed: start.elapsed() });
                }
                _ = sleep_until(wake) => {}
            }
        }
    }
}

/// `at + span`, capped at roughly a century out instead of overflowing.
fn saturating_add(at: Instant, span: Duration) -> Instant {
    const CENTURY: Duration = Duration::from_secs(100 * 365 * 24 * 3600);
    at.checked_add(span.min(CENTURY))
        .or_else(|| at.checked_add(Duration::from_secs(24 * 3600)))
        .unwrap_or(at)
}
