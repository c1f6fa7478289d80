//! error.rs — Supervisor-side error types
//!
//! Every non-success result is matched by the state machine and mapped to a
//! transition; [`OutcomeReason`] is the terminal form recorded in the outcome.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use mission_types::{GatewayError, OutcomeReason, Phase};

/// Preflight check failure. Always fatal: no flight is attempted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PreflightError {
    #[error("GPS fix quality {quality} below required {required}")]
    GpsFix { quality: u8, required: u8 },

    #[error("battery {percent}% below preflight minimum {required}%")]
    LowBattery { percent: u8, required: u8 },

    #[error("preflight telemetry read failed: {0}")]
    Telemetry(#[from] GatewayError),
}

impl From<PreflightError> for OutcomeReason {
    fn from(err: PreflightError) -> Self {
        match err {
            PreflightError::GpsFix { quality, required } => Self::GpsFix { quality, required },
            PreflightError::LowBattery { percent, required } => Self::LowBattery { percent, required },
            PreflightError::Telemetry(e) => Self::Telemetry { message: e.to_string() },
        }
    }
}

/// Why a bounded wait ended without its condition becoming true.
/// `S` is whatever the interrupt future resolved to.
#[derive(Debug, Error)]
pub enum WaitError<S: fmt::Debug> {
    #[error("{phase} timed out after {elapsed:?}")]
    Timeout { phase: Phase, elapsed: Duration },

    #[error("{phase} wait interrupted after {elapsed:?}")]
    Interrupted { phase: Phase, signal: S, elapsed: Duration },

    #[error("{phase} condition could not be sampled: {source}")]
    Gateway { phase: Phase, source: GatewayError },
}

/// Map a rejected or failed gateway call to its outcome reason.
pub fn gateway_reason(err: &GatewayError) -> OutcomeReason {
    match err {
        GatewayError::CommandRejected { operation, reason } => OutcomeReason::Command {
            operation: (*operation).to_string(),
            message: reason.clone(),
        },
        GatewayError::Connection(message) => OutcomeReason::Connection { message: message.clone() },
        other => OutcomeReason::Telemetry { message: other.to_string() },
    }
}
