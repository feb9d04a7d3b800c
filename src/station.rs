use crate::acquisition::{AcquisitionWorker, AcquisitionWorkerBuilder};
use crate::camera::{SimulatedTransport, TriggerSource};
use crate::capture::{
    CaptureSessionController, FlushReport, SaveTarget, SessionState, SnapshotFormat,
};
use crate::config::GrabcamConfig;
use crate::error::{CameraError, GrabcamError, Result};
use crate::events::EventBus;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// What a headless session should do between start and stop
#[derive(Debug, Clone)]
pub struct HeadlessPlan {
    /// Save one frame here before the burst
    pub snapshot: Option<PathBuf>,
    /// Frames to collect in continuous shooting; 0 skips the burst
    pub burst_frames: usize,
    /// Directory the burst is flushed into
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub snapshot: Option<PathBuf>,
    pub flush: Option<FlushReport>,
    pub frames_delivered: u64,
    pub last_rate: Option<f64>,
}

/// Simulated camera, acquisition worker and session controller wired from
/// one configuration
pub struct Station {
    config: GrabcamConfig,
    controller: CaptureSessionController,
}

impl Station {
    pub fn new(config: GrabcamConfig) -> Result<Self> {
        let transport = Arc::new(SimulatedTransport::new(config.camera.simulated()));
        let worker = AcquisitionWorkerBuilder::new()
            .transport(transport)
            .config(config.acquisition.clone())
            .parameters(config.parameters)
            .event_bus(EventBus::new(config.acquisition.event_bus_capacity))
            .build()?;
        let controller = CaptureSessionController::new(Arc::new(worker), config.capture.clone());

        Ok(Self { config, controller })
    }

    pub fn event_bus(&self) -> EventBus {
        self.worker().event_bus().clone()
    }

    pub fn worker(&self) -> &Arc<AcquisitionWorker> {
        self.controller.worker()
    }

    pub fn controller(&mut self) -> &mut CaptureSessionController {
        &mut self.controller
    }

    /// start → (snapshot) → burst → flush → stop
    pub fn run(&mut self, plan: &HeadlessPlan) -> Result<SessionSummary> {
        self.controller.start()?;
        let outcome = self.run_started(plan);

        if let Err(e) = self.controller.stop() {
            warn!("Failed to stop session cleanly: {}", e);
        }
        outcome
    }

    fn run_started(&mut self, plan: &HeadlessPlan) -> Result<SessionSummary> {
        if self.config.parameters.free_run_enabled {
            self.worker().execute_free_run_update()?;
        }

        let snapshot = match &plan.snapshot {
            Some(path) => self.take_snapshot(path)?,
            None => None,
        };

        let flush = if plan.burst_frames > 0 {
            Some(self.take_burst(plan)?)
        } else {
            None
        };

        let worker = self.worker();
        Ok(SessionSummary {
            snapshot,
            flush,
            frames_delivered: worker.frame_count(),
            last_rate: worker.last_rate(),
        })
    }

    fn take_snapshot(&mut self, path: &Path) -> Result<Option<PathBuf>> {
        let delivered = self.worker().frame_count();
        self.wait_for_frames(|station| station.worker().frame_count() > delivered, 1)?;

        if self.controller.single_shot().is_none() {
            return Err(GrabcamError::component("station", "no frame for snapshot"));
        }

        let format = SnapshotFormat::from_path(path).unwrap_or(self.config.capture.snapshot_format);
        self.controller
            .save(Some(SaveTarget::new(path, format)))
    }

    fn take_burst(&mut self, plan: &HeadlessPlan) -> Result<FlushReport> {
        self.controller
            .toggle_continuous(true, &mut || -> Option<PathBuf> { None })?;
        info!("Collecting {} frames", plan.burst_frames);

        let wanted = plan.burst_frames;
        let collected =
            self.wait_for_frames(|station| station.controller.buffered_frames() >= wanted, wanted);

        let output_dir = plan.output_dir.clone();
        let mut destination = || Some(output_dir.clone());
        if let Err(e) = collected {
            // flush whatever arrived before giving up
            if self.controller.state() == SessionState::ContinuousShooting {
                self.controller.toggle_continuous(false, &mut destination)?;
            }
            return Err(e);
        }

        self.controller
            .toggle_continuous(false, &mut destination)?
            .ok_or_else(|| GrabcamError::component("station", "burst produced no flush"))
    }

    /// Poll until `done`, firing software triggers when the camera needs them.
    ///
    /// Gives up after one retrieve timeout per expected frame, or as soon as
    /// the acquisition run ends.
    fn wait_for_frames<F>(&mut self, mut done: F, expected: usize) -> Result<()>
    where
        F: FnMut(&Self) -> bool,
    {
        let params = self.worker().parameters();
        let triggered = params.trigger_mode && params.trigger_source == TriggerSource::Software;
        let per_frame = self.config.acquisition.retrieve_timeout();
        let deadline = Instant::now() + per_frame * expected.max(1) as u32;

        let mut fired = 0;
        while !done(&*self) {
            if !self.worker().is_running() {
                let failure = self.controller.sync_with_worker();
                return Err(failure.unwrap_or(CameraError::GrabAborted).into());
            }
            if Instant::now() >= deadline {
                return Err(CameraError::GrabTimeout {
                    timeout_ms: per_frame.as_millis() as u64,
                }
                .into());
            }
            if triggered && fired < expected {
                debug!("Firing software trigger {}", fired);
                self.worker().trigger_software()?;
                fired += 1;
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> GrabcamConfig {
        let mut config = GrabcamConfig::default();
        config.camera.resolution = (8, 6);
        config.camera.frame_interval_ms = 5;
        config.acquisition.retrieve_timeout_ms = 2_000;
        config
    }

    #[test]
    fn test_headless_run_snapshot_and_burst() {
        let dir = tempfile::tempdir().unwrap();
        let mut station = Station::new(create_test_config()).unwrap();

        let plan = HeadlessPlan {
            snapshot: Some(dir.path().join("snap")),
            burst_frames: 4,
            output_dir: dir.path().join("bursts"),
        };
        let summary = station.run(&plan).unwrap();

        let snapshot = summary.snapshot.unwrap();
        assert_eq!(snapshot, dir.path().join("snap.png"));
        assert!(snapshot.exists());

        let flush = summary.flush.unwrap();
        assert!(flush.written() >= 4);
        assert!(flush.files.iter().all(|f| f.exists()));
        assert!(summary.frames_delivered >= 5);

        assert_eq!(station.controller().state(), SessionState::Idle);
        assert!(!station.worker().is_running());
    }

    #[test]
    fn test_headless_burst_with_software_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config();
        config.parameters.trigger_mode = true;
        config.parameters.trigger_source = TriggerSource::Software;
        let mut station = Station::new(config).unwrap();

        let plan = HeadlessPlan {
            snapshot: None,
            burst_frames: 3,
            output_dir: dir.path().to_path_buf(),
        };
        let summary = station.run(&plan).unwrap();

        assert_eq!(summary.flush.unwrap().written(), 3);
        assert_eq!(summary.frames_delivered, 3);
    }

    #[test]
    fn test_headless_run_times_out_without_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config();
        // hardware trigger that never fires
        config.parameters.trigger_mode = true;
        config.parameters.trigger_source = TriggerSource::Line1;
        config.acquisition.retrieve_timeout_ms = 50;
        let mut station = Station::new(config).unwrap();

        let plan = HeadlessPlan {
            snapshot: None,
            burst_frames: 2,
            output_dir: dir.path().to_path_buf(),
        };
        assert!(station.run(&plan).is_err());
        assert_eq!(station.controller().state(), SessionState::Idle);
    }
}
