//! geofence.rs — Vehicle-to-target proximity decisions

use serde::{Deserialize, Serialize};

use mission_types::geo::{haversine_distance_m, planar_distance_m};
use mission_types::Position;

/// How horizontal distance is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceModel {
    /// Degrees treated as Euclidean units × fixed scale. Arrival radii in
    /// existing mission files are tuned against this.
    #[default]
    Planar,
    Haversine,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GeofenceEvaluator {
    model: DistanceModel,
}

impl GeofenceEvaluator {
    pub fn new(model: DistanceModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> DistanceModel {
        self.model
    }

    /// Horizontal distance in meters; altitude is ignored
    pub fn distance_m(&self, current: &Position, target: &Position) -> f64 {
        match self.model {
            DistanceModel::Planar => planar_distance_m(current, target),
            DistanceModel::Haversine => haversine_distance_m(current, target),
        }
    }

    /// True iff distance < radius
    pub fn reached(&self, current: &Position, target: &Position, radius: f64) -> bool {
        self.distance_m(current, target) < radius
    }
}
