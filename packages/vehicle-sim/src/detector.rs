//! detector.rs — Simulated camera detectors
//!
//! Produces one [`FrameResult`] per camera frame. Region counts come from the
//! active scenario windows, evaluated against the shared simulation clock, plus
//! optional random single-region false positives.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::{sleep, Instant};
use tracing::debug;

use mission_types::{DetectionKind, DetectionSource, FrameResult, GatewayError};

use crate::world::SimWorld;

pub struct SimDetector {
    world: SimWorld,
    kind: DetectionKind,
    frame_interval: Duration,
    started: Instant,
    frames: u64,
    /// Frames left to fail before the stream recovers
    pending_failures: u32,
}

impl SimDetector {
    pub(crate) fn new(world: SimWorld, kind: DetectionKind, camera_fps: f64, time_scale: f64) -> Self {
        Self {
            world,
            kind,
            frame_interval: Duration::from_secs_f64(1.0 / (camera_fps * time_scale)),
            started: Instant::now(),
            frames: 0,
            pending_failures: 0,
        }
    }

    pub fn kind(&self) -> DetectionKind {
        self.kind
    }

    /// Make the next `n` frames fail with a stream error
    pub fn inject_failures(&mut self, n: u32) {
        self.pending_failures = n;
    }
}

#[async_trait]
impl DetectionSource for SimDetector {
    async fn next_frame(&mut self) -> Result<FrameResult, GatewayError> {
        sleep(self.frame_interval).await;
        self.frames += 1;

        if self.pending_failures > 0 {
            self.pending_failures -= 1;
            return Err(GatewayError::Stream(format!("{} camera frame dropped", self.kind)));
        }

        let (t, scenario_regions, false_positive_rate) = self
            .world
            .read(|s| (s.t_elapsed, s.scenario.regions(self.kind, s.t_elapsed), s.scenario.false_positive_rate))
            .await;

        let spurious = scenario_regions == 0
            && false_positive_rate > 0.0
            && rand::thread_rng().gen_bool(false_positive_rate.min(1.0));
        let region_count = if spurious { 1 } else { scenario_regions };

        if region_count > 0 {
            debug!("📷 {} frame {} at t={t:.1}s: {region_count} regions", self.kind, self.frames);
        }

        Ok(FrameResult { region_count, timestamp: self.started.elapsed() })
    }

    async fn restart(&mut self) -> Result<(), GatewayError> {
        self.started = Instant::now();
        self.frames = 0;
        debug!("📷 {} stream restarted", self.kind);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mission_types::GatewayConnector;

    use super::*;
    use crate::drone_sim::SimConfig;
    use crate::scenarios::{preset_obstacle, ScenarioConfig};

    #[tokio::test(start_paused = true)]
    async fn obstacle_regions_follow_scenario_window() {
        let world = SimWorld::new(SimConfig::default(), preset_obstacle());
        let _link = world.connector().connect("sim://local").await.unwrap();
        let mut camera = world.detector(DetectionKind::Obstacle);

        let mut first_hit = None;
        for _ in 0..150 {
            let frame = camera.next_frame().await.unwrap();
            if frame.region_count > 0 {
                first_hit = Some((frame.region_count, world.sim_time().await));
                break;
            }
        }
        let (regions, t) = first_hit.expect("obstacle never seen");
        assert_eq!(regions, 2);
        assert!((20.0..20.5).contains(&t), "t = {t}");
    }

    #[tokio::test(start_paused = true)]
    async fn intruder_camera_ignores_obstacle_window() {
        let world = SimWorld::new(SimConfig::default(), preset_obstacle());
        let _link = world.connector().connect("sim://local").await.unwrap();
        let mut camera = world.detector(DetectionKind::Intruder);
        for _ in 0..130 {
            assert_eq!(camera.next_frame().await.unwrap().region_count, 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn injected_failures_clear_after_count() {
        let world = SimWorld::new(SimConfig::default(), ScenarioConfig::default());
        let mut camera = world.detector(DetectionKind::Obstacle);
        camera.inject_failures(2);
        assert!(matches!(camera.next_frame().await, Err(GatewayError::Stream(_))));
        assert!(camera.next_frame().await.is_err());
        camera.restart().await.unwrap();
        assert!(camera.next_frame().await.is_ok());
    }
}
