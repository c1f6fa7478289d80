//! outcome.rs — Mission outcome recorder
//!
//! Logs every outcome and, when a path is configured, appends it as one JSON
//! line. Write failures are logged and never fail the run.

use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use mission_types::MissionOutcome;

#[derive(Debug, Clone, Default)]
pub struct OutcomeRecorder {
    path: Option<PathBuf>,
}

impl OutcomeRecorder {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Log the outcome and append it to the JSONL file if configured.
    /// Returns whether a line was written.
    pub async fn record(&self, outcome: &MissionOutcome) -> bool {
        let sequence: Vec<String> = outcome.phase_sequence().iter().map(ToString::to_string).collect();
        info!(
            "📋 outcome {}: {:?} in {} after {:.1}s, {}/{} waypoints, reason={} [{}]",
            outcome.run_id,
            outcome.status,
            outcome.final_phase,
            outcome.duration_s,
            outcome.waypoints_reached,
            outcome.waypoint_count,
            outcome.reason_code().unwrap_or("none"),
            sequence.join(" → "),
        );

        let Some(path) = &self.path else {
            return false;
        };

        let line = match serde_json::to_string(outcome) {
            Ok(l) => format!("{l}\n"),
            Err(e) => {
                warn!("Outcome: failed to serialize: {e}");
                return false;
            }
        };

        match OpenOptions::new().create(true).append(true).open(path).await {
            Ok(mut f) => match f.write_all(line.as_bytes()).await {
                Ok(()) => {
                    if let Err(e) = f.flush().await {
                        warn!("Outcome: flush failed: {e}");
                    }
                    true
                }
                Err(e) => {
                    warn!("Outcome: write to {} failed: {e}", path.display());
                    false
                }
            },
            Err(e) => {
                warn!("Outcome: could not open {}: {e}", path.display());
                false
            }
        }
    }
}
