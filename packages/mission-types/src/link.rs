//! link.rs — Collaborator boundaries: vehicle link and detection sources
//!
//! The supervisor never talks to a flight controller or camera directly; it is
//! handed implementations of these traits at construction. Reads
//! ([`TelemetrySource`]) may be shared by any task. Commands ([`VehicleGateway`])
//! are only ever issued by the supervisor task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::{MissionPlan, Position, VehicleMode, VehicleState};

/// Errors surfaced by the vehicle link and detection sources.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// Endpoint unreachable or handshake failed
    #[error("connection failed: {0}")]
    Connection(String),

    /// Flight controller refused a command
    #[error("{operation} rejected: {reason}")]
    CommandRejected { operation: &'static str, reason: String },

    /// Telemetry could not be read
    #[error("telemetry unavailable: {0}")]
    Telemetry(String),

    /// Detection stream ended or failed; restartable
    #[error("detection stream interrupted: {0}")]
    Stream(String),

    /// Handle used after disconnect
    #[error("link closed")]
    Closed,
}

impl GatewayError {
    pub fn rejected(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::CommandRejected { operation, reason: reason.into() }
    }
}

/// Read-only view of the vehicle. Every call returns a fresh snapshot.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn snapshot(&self) -> Result<VehicleState, GatewayError>;
}

/// Command side of the vehicle link. Held exclusively by the mission supervisor.
#[async_trait]
pub trait VehicleGateway: TelemetrySource {
    async fn set_mode(&self, mode: VehicleMode) -> Result<(), GatewayError>;

    async fn arm(&self) -> Result<(), GatewayError>;

    /// Climb to `target_alt` meters above home (GUIDED, armed)
    async fn takeoff(&self, target_alt: f64) -> Result<(), GatewayError>;

    async fn goto_location(&self, target: Position) -> Result<(), GatewayError>;

    async fn upload_mission(&self, plan: &MissionPlan) -> Result<(), GatewayError>;

    async fn disconnect(&self);

    /// Read-only handle for monitors and loggers
    fn telemetry(&self) -> Arc<dyn TelemetrySource>;
}

/// Opens a vehicle link.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn VehicleGateway>, GatewayError>;
}

/// One processed camera frame, reduced to a count of qualifying regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameResult {
    pub region_count: u32,
    /// Capture time relative to stream start
    pub timestamp: Duration,
}

/// Lazy, infinite stream of detector results.
#[async_trait]
pub trait DetectionSource: Send {
    /// Wait for and return the next frame result
    async fn next_frame(&mut self) -> Result<FrameResult, GatewayError>;

    /// Re-open the stream after a failure
    async fn restart(&mut self) -> Result<(), GatewayError>;
}
