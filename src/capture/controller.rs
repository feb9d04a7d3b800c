use super::encode::{write_frame, SnapshotFormat};
use super::flush::{write_session, BurstSession, FlushReport};
use super::state::{ControlState, SessionState};
use super::store::BufferedFrameStore;
use crate::acquisition::{AcquisitionWorker, FrameSink};
use crate::config::CaptureConfig;
use crate::error::{CameraError, CaptureError, GrabcamError, Result};
use crate::frame::Frame;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Asks the user where a flushed burst should go
pub trait DestinationChooser {
    /// `None` means the user declined to choose
    fn choose_directory(&mut self) -> Option<PathBuf>;
}

impl<F> DestinationChooser for F
where
    F: FnMut() -> Option<PathBuf>,
{
    fn choose_directory(&mut self) -> Option<PathBuf> {
        self()
    }
}

/// Path and encoding picked for a single-shot save
#[derive(Debug, Clone, PartialEq)]
pub struct SaveTarget {
    pub path: PathBuf,
    pub format: SnapshotFormat,
}

impl SaveTarget {
    pub fn new<P: Into<PathBuf>>(path: P, format: SnapshotFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }
}

/// Drives the acquisition worker from user commands and owns the burst buffer
pub struct CaptureSessionController {
    worker: Arc<AcquisitionWorker>,
    config: CaptureConfig,
    store: Arc<BufferedFrameStore>,
    state: SessionState,
    pending_shot: Option<Frame>,
    burst: Option<BurstSession>,
}

impl CaptureSessionController {
    pub fn new(worker: Arc<AcquisitionWorker>, config: CaptureConfig) -> Self {
        Self {
            worker,
            config,
            store: Arc::new(BufferedFrameStore::new()),
            state: SessionState::Idle,
            pending_shot: None,
            burst: None,
        }
    }

    /// Idle → Running
    pub fn start(&mut self) -> Result<()> {
        self.sync_with_worker();
        if self.state.is_acquiring() {
            debug!("Session already {}", self.state);
            return Ok(());
        }

        self.worker.start()?;
        self.state = SessionState::Running;
        info!("Capture session running");
        Ok(())
    }

    /// Running → Idle. Refused while continuous shooting.
    pub fn stop(&mut self) -> Result<()> {
        self.sync_with_worker();
        match self.state {
            SessionState::Idle => {
                debug!("Session already idle");
                Ok(())
            }
            SessionState::ContinuousShooting => Err(self.rejected("stop")),
            SessionState::Running => {
                if let Some(e) = self.worker.stop() {
                    warn!("Acquisition had already ended: {}", e);
                }
                self.state = SessionState::Idle;
                info!("Capture session stopped");
                Ok(())
            }
        }
    }

    /// Capture the worker's latest frame as the pending shot.
    ///
    /// Only taken in Running; a burst in progress leaves the pending shot
    /// untouched.
    pub fn single_shot(&mut self) -> Option<Frame> {
        self.sync_with_worker();
        if self.state != SessionState::Running {
            debug!("Single shot ignored while {}", self.state);
            return None;
        }

        let frame = self.worker.current_frame()?;
        debug!("Single shot captured frame {}", frame.id);
        self.pending_shot = Some(frame.clone());
        Some(frame)
    }

    /// Turn continuous shooting on or off.
    ///
    /// Turning it off flushes the burst and only returns once every file has
    /// been written, so the session is back in Running strictly after the
    /// flush.
    pub fn toggle_continuous(
        &mut self,
        enabled: bool,
        chooser: &mut dyn DestinationChooser,
    ) -> Result<Option<FlushReport>> {
        self.sync_with_worker();
        match (self.state, enabled) {
            (SessionState::Idle, _) => Err(self.rejected("toggle continuous shooting")),
            (SessionState::Running, false) | (SessionState::ContinuousShooting, true) => {
                debug!("Continuous shooting already {}", if enabled { "on" } else { "off" });
                Ok(None)
            }
            (SessionState::Running, true) => {
                self.begin_burst();
                Ok(None)
            }
            (SessionState::ContinuousShooting, false) => {
                let outcome = self.flush(chooser);
                self.state = SessionState::Running;
                outcome.map(Some)
            }
        }
    }

    /// Write the pending shot.
    ///
    /// Without a pending shot this does nothing. A `None` target means the
    /// user cancelled; the shot stays pending. Returns the written path.
    pub fn save(&mut self, target: Option<SaveTarget>) -> Result<Option<PathBuf>> {
        self.sync_with_worker();
        let Some(frame) = self.pending_shot.as_ref() else {
            debug!("No pending single shot to save");
            return Ok(None);
        };
        if !self.state.is_acquiring() {
            return Err(self.rejected("save"));
        }
        let Some(target) = target else {
            debug!("Save cancelled; keeping frame {}", frame.id);
            return Ok(None);
        };

        let path = target.format.with_extension(&target.path);
        write_frame(frame, &path, target.format, self.config.jpeg_quality).map_err(|e| {
            CaptureError::SaveFailed {
                path: path.clone(),
                details: e.to_string(),
            }
        })?;

        info!("Saved frame {} to {}", frame.id, path.display());
        self.pending_shot = None;
        Ok(Some(path))
    }

    /// Notice a run that ended on its own and fall back to Idle.
    ///
    /// Returns the error that ended the run the first time it is observed.
    /// Frames buffered by an interrupted burst are discarded.
    pub fn sync_with_worker(&mut self) -> Option<CameraError> {
        if !self.state.is_acquiring() || self.worker.is_running() {
            return None;
        }

        let failure = self.worker.stop();
        self.worker.set_frame_sink(None);
        self.store.close();

        if self.state == SessionState::ContinuousShooting {
            let lost = self.store.drain();
            if !lost.is_empty() {
                error!(
                    "Discarding {} buffered frames from interrupted burst",
                    lost.len()
                );
            }
            self.burst = None;
        }

        match &failure {
            Some(e) => error!("Acquisition terminated: {}", e),
            None => warn!("Acquisition ended without a reported error"),
        }
        self.state = SessionState::Idle;
        failure
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn controls(&self) -> ControlState {
        ControlState::derive(self.state, self.pending_shot.is_some())
    }

    pub fn pending_shot(&self) -> Option<&Frame> {
        self.pending_shot.as_ref()
    }

    /// Frames waiting in the burst buffer
    pub fn buffered_frames(&self) -> usize {
        self.store.len()
    }

    pub fn worker(&self) -> &Arc<AcquisitionWorker> {
        &self.worker
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    fn begin_burst(&mut self) {
        let burst = BurstSession::begin(&self.config.timestamp_format);
        info!("Continuous shooting started (session {})", burst.label);
        self.burst = Some(burst);

        self.store.open();
        let store = Arc::clone(&self.store);
        let sink: FrameSink = Arc::new(move |frame: &Frame| {
            store.append(frame);
        });
        self.worker.set_frame_sink(Some(sink));
        self.state = SessionState::ContinuousShooting;
    }

    fn flush(&mut self, chooser: &mut dyn DestinationChooser) -> Result<FlushReport> {
        // No append can follow these two calls.
        self.worker.set_frame_sink(None);
        self.store.close();
        let frames = self.store.drain();

        let burst = self
            .burst
            .take()
            .unwrap_or_else(|| BurstSession::begin(&self.config.timestamp_format));
        info!(
            "Continuous shooting stopped with {} buffered frames",
            frames.len()
        );

        if frames.is_empty() {
            return Ok(FlushReport::empty(&burst));
        }

        let Some(base) = chooser.choose_directory() else {
            warn!(
                "No destination chosen; discarding {} frames of session {}",
                frames.len(),
                burst.label
            );
            return Ok(FlushReport::cancelled(&burst, frames.len()));
        };

        let report = write_session(
            &frames,
            &base,
            &burst,
            self.config.save_metadata,
            self.worker.last_rate(),
        )
        .map_err(|e| {
            error!("Flush failed: {}", e);
            e
        })?;
        Ok(report)
    }

    fn rejected(&self, command: &'static str) -> GrabcamError {
        CaptureError::InvalidStateTransition {
            state: self.state.name(),
            command,
        }
        .into()
    }
}
