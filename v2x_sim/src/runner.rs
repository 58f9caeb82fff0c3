//! Pipeline runner - drives stepper → detector → tracker → fusion engine.
//!
//! The only suspension points are awaiting the next ground-truth step and,
//! in real-time mode, waiting for the next step slot. Both race against the
//! shutdown signal; once a step has been pulled it is processed to the end.

use crate::exporter::MessageExporter;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use v2x_core::{EngineStats, FusionEngine};
use v2x_env::{DetectionSource, EnvError, GroundTruthStepper, MultiObjectTracker, StepFrame};

/// Runner options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Simulation id of the observing vehicle (e.g. `"veh_0"`)
    pub ego_vehicle: Option<String>,

    /// Stop after this many steps
    pub max_steps: Option<u64>,

    /// Pace steps to wall-clock time
    pub real_time: bool,

    /// Restrict `nearby` to the V2X range around the ego
    pub filter_by_range: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            ego_vehicle: Some("veh_0".to_string()),
            max_steps: None,
            real_time: false,
            filter_by_range: false,
        }
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub steps: u64,
    pub broadcasts: usize,
    /// Stopped by the shutdown signal rather than exhaustion or step limit
    pub interrupted: bool,
    pub stats: EngineStats,
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Ground-truth stepper failed: {0}")]
    Env(#[from] EnvError),

    #[error("Stepper step length must be positive and finite, got {0}")]
    InvalidStepLength(f64),
}

pub struct PipelineRunner {
    engine: FusionEngine,
    stepper: Box<dyn GroundTruthStepper>,
    detector: Box<dyn DetectionSource>,
    tracker: Box<dyn MultiObjectTracker>,
    config: RunnerConfig,
}

impl PipelineRunner {
    pub fn new(
        engine: FusionEngine,
        stepper: Box<dyn GroundTruthStepper>,
        detector: Box<dyn DetectionSource>,
        tracker: Box<dyn MultiObjectTracker>,
        config: RunnerConfig,
    ) -> Result<Self, RunnerError> {
        let dt = stepper.step_length();
        if !(dt.is_finite() && dt > 0.0) {
            return Err(RunnerError::InvalidStepLength(dt));
        }

        let engine_dt = engine.config().step_length;
        if (engine_dt - dt).abs() > f64::EPSILON {
            warn!(
                "Engine step length {}s differs from stepper step length {}s",
                engine_dt, dt
            );
        }

        Ok(Self {
            engine,
            stepper,
            detector,
            tracker,
            config,
        })
    }

    pub fn engine(&self) -> &FusionEngine {
        &self.engine
    }

    /// Reset the engine, the detector and the tracker together so that
    /// auto-computed bounds are refrozen on both sides of the pipeline.
    pub fn reset(&mut self) {
        self.engine.reset();
        self.detector.reset();
        self.tracker.reset();
    }

    /// Run until the stepper is exhausted, the step limit is hit or Ctrl-C.
    pub async fn run(&mut self, exporter: &mut MessageExporter) -> Result<RunReport, RunnerError> {
        self.run_until(ctrl_c(), exporter).await
    }

    /// Run until the stepper is exhausted, the step limit is hit or
    /// `shutdown` resolves.
    pub async fn run_until<F>(
        &mut self,
        shutdown: F,
        exporter: &mut MessageExporter,
    ) -> Result<RunReport, RunnerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut pacer = self.config.real_time.then(|| {
            let mut interval = tokio::time::interval(Duration::from_secs_f64(self.stepper.step_length()));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        let mut steps = 0u64;
        let mut broadcasts = 0usize;
        let mut interrupted = false;

        loop {
            if self.config.max_steps.is_some_and(|max| steps >= max) {
                info!("Step limit of {} reached", steps);
                break;
            }

            if let Some(pacer) = pacer.as_mut() {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        interrupted = true;
                        break;
                    }
                    _ = pacer.tick() => {}
                }
            }

            let next = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    interrupted = true;
                    break;
                }
                next = self.stepper.next_step() => next?,
            };

            let Some(frame) = next else {
                info!("Ground truth exhausted after {} steps", steps);
                break;
            };

            if self.process(frame, exporter) {
                broadcasts += 1;
            }
            steps += 1;
        }

        if interrupted {
            info!("Interrupted after {} steps", steps);
        }

        Ok(RunReport {
            steps,
            broadcasts,
            interrupted,
            stats: self.engine.stats(),
        })
    }

    /// One full step. Returns whether a broadcast was emitted.
    fn process(&mut self, frame: StepFrame, exporter: &mut MessageExporter) -> bool {
        let detections = self.detector.detect(&frame);
        let tracks = self.tracker.update(&detections, self.detector.image_size());
        let fused = self.engine.step(frame.step, &tracks, &frame.vehicles);

        if !self.engine.should_broadcast(frame.step) {
            return false;
        }

        let observer = self
            .config
            .ego_vehicle
            .as_deref()
            .and_then(|id| self.engine.track_for_vehicle(id));
        if observer.is_none() && self.config.ego_vehicle.is_some() {
            debug!("Ego vehicle has no track yet at step {}", frame.step);
        }

        let timestamp = self.engine.timestamp_for(frame.step);
        let msg = match observer {
            Some(observer) if self.config.filter_by_range => {
                self.engine.filtered_broadcast(&fused, observer, timestamp)
            }
            _ => self.engine.create_broadcast(&fused, observer, timestamp),
        };

        info!(
            "📡 V2X broadcast at t={:.1}s: {} vehicles, {} nearby",
            timestamp, msg.total_vehicles, msg.nearby.len()
        );
        exporter.record(msg);
        true
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::SyntheticDetector;
    use crate::oracle::{OracleConfig, TrafficOracle};
    use crate::replay::TraceReplay;
    use crate::tracker::{GreedyIouTracker, TrackerConfig};
    use std::future::pending;
    use v2x_core::FusionConfig;

    fn runner(stepper: Box<dyn GroundTruthStepper>, fusion: FusionConfig, config: RunnerConfig) -> PipelineRunner {
        let detector = SyntheticDetector::new(&fusion).unwrap();
        let tracker = GreedyIouTracker::new(TrackerConfig {
            min_hits: 1,
            ..Default::default()
        });
        PipelineRunner::new(
            FusionEngine::new(fusion).unwrap(),
            stepper,
            Box::new(detector),
            Box::new(tracker),
            config,
        )
        .unwrap()
    }

    fn oracle(duration_s: f64) -> Box<dyn GroundTruthStepper> {
        Box::new(TrafficOracle::new(OracleConfig {
            num_vehicles: 6,
            duration_s,
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn test_end_to_end_with_synthetic_traffic() {
        let mut exporter = MessageExporter::new(std::env::temp_dir());
        let mut runner = runner(oracle(1.0), FusionConfig::default(), RunnerConfig::default());

        let report = runner.run_until(pending(), &mut exporter).await.unwrap();
        assert_eq!(report.steps, 10);
        assert_eq!(report.broadcasts, 2);
        assert!(!report.interrupted);
        assert!(report.stats.geometric_matches > 0);

        // Ego resolved through the sticky mapping
        let ego = runner.engine().track_for_vehicle("veh_0");
        assert!(ego.is_some());
        assert_eq!(exporter.messages()[1].ego_vehicle, ego);
        assert_eq!(exporter.messages()[1].timestamp, runner.engine().timestamp_for(5));
    }

    #[tokio::test]
    async fn test_step_limit() {
        let mut exporter = MessageExporter::new(std::env::temp_dir());
        let config = RunnerConfig {
            max_steps: Some(7),
            ..Default::default()
        };
        let mut runner = runner(oracle(100.0), FusionConfig::default(), config);

        let report = runner.run_until(pending(), &mut exporter).await.unwrap();
        assert_eq!(report.steps, 7);
        assert_eq!(report.broadcasts, 2);
    }

    #[tokio::test]
    async fn test_shutdown_before_first_step() {
        let mut exporter = MessageExporter::new(std::env::temp_dir());
        let mut runner = runner(oracle(100.0), FusionConfig::default(), RunnerConfig::default());

        let report = runner.run_until(async {}, &mut exporter).await.unwrap();
        assert!(report.interrupted);
        assert_eq!(report.steps, 0);
        assert!(exporter.messages().is_empty());
    }

    #[tokio::test]
    async fn test_range_filtered_broadcast_from_trace() {
        let trace = r#"{ "step_length": 0.1, "frames": [
            { "step": 0, "vehicles": [
                { "id": "veh_0", "x": 100.0, "y": 100.0, "speed": 5.0, "angle": 0.0 },
                { "id": "veh_1", "x": 150.0, "y": 100.0, "speed": 5.0, "angle": 0.0 },
                { "id": "truck_2", "x": 900.0, "y": 900.0, "speed": 5.0, "angle": 0.0 } ] }
        ] }"#;
        let fusion = FusionConfig {
            world_bounds: Some([0.0, 0.0, 1000.0, 1000.0]),
            image_size: v2x_env::ImageSize::new(1000, 1000),
            v2x_range_m: 200.0,
            ..Default::default()
        };
        let config = RunnerConfig {
            filter_by_range: true,
            ..Default::default()
        };
        let mut exporter = MessageExporter::new(std::env::temp_dir());
        let mut runner = runner(Box::new(TraceReplay::from_json(trace).unwrap()), fusion, config);

        let report = runner.run_until(pending(), &mut exporter).await.unwrap();
        assert_eq!(report.steps, 1);

        let msg = &exporter.messages()[0];
        assert_eq!(msg.total_vehicles, 3);
        let ego = msg.ego_vehicle.unwrap();
        assert_eq!(runner.engine().sticky().get(ego), Some("veh_0"));
        assert_eq!(msg.nearby.len(), 1);
        assert_eq!(runner.engine().sticky().get(msg.nearby[0].id), Some("veh_1"));
    }

    #[test]
    fn test_rejects_unusable_step_length() {
        for dt in [0.0, -0.1, f64::NAN] {
            let stepper = Box::new(TrafficOracle::new(OracleConfig {
                step_length: dt,
                ..Default::default()
            }));
            let fusion = FusionConfig::default();
            let result = PipelineRunner::new(
                FusionEngine::new(fusion.clone()).unwrap(),
                stepper,
                Box::new(SyntheticDetector::new(&fusion).unwrap()),
                Box::new(GreedyIouTracker::with_defaults()),
                RunnerConfig {
                    real_time: true,
                    ..Default::default()
                },
            );
            assert!(matches!(result, Err(RunnerError::InvalidStepLength(_))));
        }
    }

    #[tokio::test]
    async fn test_reset_refreezes_bounds_across_pipeline() {
        let trace = |x: f64| {
            format!(
                r#"{{ "frames": [ {{ "step": 0, "vehicles": [
                    {{ "id": "veh_0", "x": {x}, "y": 100.0, "speed": 5.0, "angle": 0.0 }},
                    {{ "id": "veh_1", "x": {}, "y": 150.0, "speed": 5.0, "angle": 0.0 }} ] }} ] }}"#,
                x + 80.0
            )
        };
        let mut exporter = MessageExporter::new(std::env::temp_dir());
        let mut first = runner(
            Box::new(TraceReplay::from_json(&trace(0.0)).unwrap()),
            FusionConfig::default(),
            RunnerConfig::default(),
        );
        first.run_until(pending(), &mut exporter).await.unwrap();
        assert_eq!(first.engine().stats().geometric_matches, 2);

        // Same pipeline, traffic far outside the first bounds
        first.reset();
        first.stepper = Box::new(TraceReplay::from_json(&trace(5000.0)).unwrap());
        first.run_until(pending(), &mut exporter).await.unwrap();

        let stats = first.engine().stats();
        assert_eq!(stats.geometric_matches, 2);
        assert_eq!(stats.unmatched, 0);
        assert!(first.engine().track_for_vehicle("veh_0").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_real_time_pacing() {
        let mut exporter = MessageExporter::new(std::env::temp_dir());
        let config = RunnerConfig {
            real_time: true,
            max_steps: Some(5),
            ..Default::default()
        };
        let mut runner = runner(oracle(100.0), FusionConfig::default(), config);

        let started = tokio::time::Instant::now();
        let report = runner.run_until(pending(), &mut exporter).await.unwrap();
        assert_eq!(report.steps, 5);
        // First tick fires immediately, then one per 100 ms
        assert!(started.elapsed() >= Duration::from_millis(400));
    }
}
