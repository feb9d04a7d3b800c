use super::device::{CameraDevice, CameraTransport, DeviceInfo};
use super::parameters::{CameraParameters, DeviceCommand, Parameter, ParameterKind, TriggerSource, UserSet};
use crate::error::CameraError;
use crate::frame::{Frame, PixelFormat};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, trace};

/// Exposure range accepted by the simulated sensor
pub const SIMULATED_EXPOSURE_RANGE: (f64, f64) = (1000.0, 500000.0);

/// Shape of the synthetic image stream
#[derive(Debug, Clone)]
pub struct SimulatedCameraConfig {
    pub serial: String,
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// Interval between frames in free-run acquisition
    pub frame_interval: Duration,
}

impl Default for SimulatedCameraConfig {
    fn default() -> Self {
        Self {
            serial: "SIM-0001".to_string(),
            model: "Simulated GigE".to_string(),
            width: 640,
            height: 480,
            pixel_format: PixelFormat::Mono8,
            frame_interval: Duration::from_millis(33),
        }
    }
}

/// Scripted misbehaviour for exercising failure paths
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Enumeration returns nothing
    pub no_devices: bool,
    /// Opening fails with this message
    pub open_failure: Option<String>,
    /// Every grab after this many frames fails with the message
    pub grab_failure_after: Option<(u64, String)>,
    /// No frame is produced after this many frames
    pub stall_after: Option<u64>,
}

/// Transport that hands out [`SimulatedCamera`] instances
pub struct SimulatedTransport {
    config: SimulatedCameraConfig,
    faults: FaultPlan,
    opened: Mutex<Vec<Arc<SimulatedCamera>>>,
}

impl SimulatedTransport {
    pub fn new(config: SimulatedCameraConfig) -> Self {
        Self::with_faults(config, FaultPlan::default())
    }

    pub fn with_faults(config: SimulatedCameraConfig, faults: FaultPlan) -> Self {
        Self {
            config,
            faults,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Most recently opened camera, for inspection
    pub fn last_opened(&self) -> Option<Arc<SimulatedCamera>> {
        self.opened.lock().last().cloned()
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }
}

impl CameraTransport for SimulatedTransport {
    fn enumerate(&self) -> Vec<DeviceInfo> {
        if self.faults.no_devices {
            return Vec::new();
        }
        vec![DeviceInfo {
            serial: self.config.serial.clone(),
            model: self.config.model.clone(),
        }]
    }

    fn open(&self, info: &DeviceInfo) -> Result<Arc<dyn CameraDevice>, CameraError> {
        if let Some(details) = &self.faults.open_failure {
            return Err(CameraError::DeviceOpenFailed {
                device: info.to_string(),
                details: details.clone(),
            });
        }

        let camera = Arc::new(SimulatedCamera::new(
            info.clone(),
            self.config.clone(),
            self.faults.clone(),
        ));
        self.opened.lock().push(Arc::clone(&camera));
        info!("Opened simulated camera {}", info);
        Ok(camera)
    }
}

enum Signal {
    Trigger,
    Abort,
}

enum Poll {
    Ready(Frame),
    /// Nothing yet; wait until the instant, or for a signal when `None`
    Pending(Option<Instant>),
}

struct SimState {
    grabbing: bool,
    closed: bool,
    params: CameraParameters,
    delivered: u64,
    next_due: Option<Instant>,
    pending_triggers: u64,
    /// Free-run rate currently driving the timer, set by `FreeRunUpdate`
    active_free_run_rate: Option<u32>,
    free_run_updates: u64,
    user_sets: HashMap<UserSet, CameraParameters>,
}

/// In-process camera producing a moving gradient
pub struct SimulatedCamera {
    info: DeviceInfo,
    config: SimulatedCameraConfig,
    faults: FaultPlan,
    state: Mutex<SimState>,
    signal_tx: Sender<Signal>,
    signal_rx: Receiver<Signal>,
}

impl SimulatedCamera {
    fn new(info: DeviceInfo, config: SimulatedCameraConfig, faults: FaultPlan) -> Self {
        let (signal_tx, signal_rx) = channel::unbounded();
        Self {
            info,
            config,
            faults,
            state: Mutex::new(SimState {
                grabbing: false,
                closed: false,
                params: CameraParameters::default(),
                delivered: 0,
                next_due: None,
                pending_triggers: 0,
                active_free_run_rate: None,
                free_run_updates: 0,
                user_sets: HashMap::new(),
            }),
            signal_tx,
            signal_rx,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn is_grabbing(&self) -> bool {
        self.state.lock().grabbing
    }

    pub fn delivered(&self) -> u64 {
        self.state.lock().delivered
    }

    pub fn parameters(&self) -> CameraParameters {
        self.state.lock().params
    }

    /// Number of free-run updates that reached an enabled timer
    pub fn free_run_updates(&self) -> u64 {
        self.state.lock().free_run_updates
    }

    fn frame_interval(&self, state: &SimState) -> Duration {
        match state.active_free_run_rate {
            Some(rate) if state.params.free_run_enabled && rate > 0 => {
                Duration::from_secs_f64(1.0 / rate as f64)
            }
            _ => self.config.frame_interval,
        }
    }

    fn produce(&self, state: &mut SimState) -> Frame {
        let SimulatedCameraConfig {
            width,
            height,
            pixel_format,
            ..
        } = self.config;
        let channels = pixel_format.bytes_per_pixel();
        let shift = state.delivered as usize;

        let mut data = Vec::with_capacity(width as usize * height as usize * channels);
        for y in 0..height as usize {
            for x in 0..width as usize {
                let value = ((x + y + shift) % 256) as u8;
                for c in 0..channels {
                    data.push(value.wrapping_add((c * 85) as u8));
                }
            }
        }

        let frame = Frame::new(
            state.delivered,
            SystemTime::now(),
            data,
            width,
            height,
            pixel_format,
        );
        state.delivered += 1;
        trace!("Simulated camera produced frame {}", frame.id);
        frame
    }

    /// Produce a frame if one is ready, otherwise say until when to wait
    fn poll_frame(&self, state: &mut SimState) -> Result<Poll, CameraError> {
        if state.closed || !state.grabbing {
            return Err(CameraError::GrabFailed {
                details: "camera is not grabbing".to_string(),
            });
        }
        if let Some((after, details)) = &self.faults.grab_failure_after {
            if state.delivered >= *after {
                return Err(CameraError::GrabFailed {
                    details: details.clone(),
                });
            }
        }
        if self.faults.stall_after.is_some_and(|n| state.delivered >= n) {
            return Ok(Poll::Pending(None));
        }

        if state.params.trigger_mode {
            if state.pending_triggers > 0 {
                state.pending_triggers -= 1;
                return Ok(Poll::Ready(self.produce(state)));
            }
            return Ok(Poll::Pending(None));
        }

        let now = Instant::now();
        let due = *state.next_due.get_or_insert(now);
        if now >= due {
            state.next_due = Some(now + self.frame_interval(state));
            return Ok(Poll::Ready(self.produce(state)));
        }
        Ok(Poll::Pending(Some(due)))
    }
}

impl CameraDevice for SimulatedCamera {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn start_grabbing(&self) -> Result<(), CameraError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(CameraError::GrabFailed {
                details: "camera is closed".to_string(),
            });
        }
        while self.signal_rx.try_recv().is_ok() {}
        state.grabbing = true;
        state.next_due = None;
        debug!("Simulated camera {} started grabbing", self.info);
        Ok(())
    }

    fn stop_grabbing(&self) {
        let mut state = self.state.lock();
        state.grabbing = false;
        state.pending_triggers = 0;
        debug!("Simulated camera {} stopped grabbing", self.info);
    }

    fn retrieve(&self, timeout: Duration) -> Result<Frame, CameraError> {
        let deadline = Instant::now() + timeout;

        loop {
            let wait_until = match self.poll_frame(&mut self.state.lock())? {
                Poll::Ready(frame) => return Ok(frame),
                Poll::Pending(due) => due,
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(CameraError::GrabTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }

            let until = wait_until.map_or(deadline, |due| due.min(deadline));
            match self
                .signal_rx
                .recv_timeout(until.saturating_duration_since(now))
            {
                Ok(Signal::Abort) => return Err(CameraError::GrabAborted),
                Ok(Signal::Trigger) | Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(CameraError::GrabAborted),
            }
        }
    }

    fn abort_retrieve(&self) {
        let _ = self.signal_tx.send(Signal::Abort);
    }

    fn set_parameter(&self, parameter: Parameter) -> Result<(), CameraError> {
        parameter.validate()?;
        if let Parameter::ExposureTime(value) = parameter {
            let (min, max) = SIMULATED_EXPOSURE_RANGE;
            if !(min..=max).contains(&value) {
                return Err(CameraError::rejected(
                    parameter.kind().to_string(),
                    format!("{} is outside [{}, {}]", value, min, max),
                ));
            }
        }

        let mut state = self.state.lock();
        if state.closed {
            return Err(CameraError::rejected(
                parameter.kind().to_string(),
                "camera is closed",
            ));
        }
        state.params.stage(parameter);
        trace!("Simulated camera set {:?}", parameter);
        Ok(())
    }

    fn read_parameter(&self, kind: ParameterKind) -> Result<Parameter, CameraError> {
        let state = self.state.lock();
        if state.closed {
            return Err(CameraError::DeviceUnavailable);
        }
        Ok(state.params.get(kind))
    }

    fn execute(&self, command: DeviceCommand) -> Result<(), CameraError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(CameraError::DeviceUnavailable);
        }

        match command {
            DeviceCommand::FreeRunUpdate => {
                if state.params.free_run_enabled {
                    state.active_free_run_rate = Some(state.params.free_run_rate);
                    state.free_run_updates += 1;
                }
            }
            DeviceCommand::UserSetSave => {
                let slot = state.params.user_set;
                let params = state.params;
                state.user_sets.insert(slot, params);
            }
            DeviceCommand::UserSetLoad => {
                let slot = state.params.user_set;
                if let Some(saved) = state.user_sets.get(&slot).copied() {
                    state.params = saved;
                }
            }
            DeviceCommand::SoftwareTrigger => {
                if state.params.trigger_mode
                    && state.params.trigger_source == TriggerSource::Software
                {
                    state.pending_triggers += 1;
                    let _ = self.signal_tx.send(Signal::Trigger);
                }
            }
        }
        Ok(())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.grabbing = false;
        state.closed = true;
        info!("Closed simulated camera {}", self.info);
    }
}
