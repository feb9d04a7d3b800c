use super::rate::RateMeter;
use super::status::WorkerStatus;
use crate::camera::{
    CameraDevice, CameraParameters, CameraTransport, DeviceCommand, Parameter, ParameterKind,
    TriggerActivation, TriggerSelector, TriggerSource, UserSet,
};
use crate::config::AcquisitionConfig;
use crate::error::CameraError;
use crate::events::{AcquisitionEvent, EventBus};
use crate::frame::Frame;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info, trace, warn};

/// Callback run on the acquisition thread for every delivered frame
pub type FrameSink = Arc<dyn Fn(&Frame) + Send + Sync>;

/// State shared between the control side and the acquisition thread
struct WorkerShared {
    stop_requested: AtomicBool,
    running: AtomicBool,
    frame_counter: AtomicU64,
    device: Mutex<Option<Arc<dyn CameraDevice>>>,
    latest: Mutex<Option<Frame>>,
    /// Signalled with `latest` held on every delivery and when a run ends
    delivered: Condvar,
    sink: Mutex<Option<FrameSink>>,
    terminal: Mutex<Option<CameraError>>,
    last_rate: Mutex<Option<f64>>,
    bus: EventBus,
}

impl WorkerShared {
    fn open_device(&self) -> Option<Arc<dyn CameraDevice>> {
        self.device.lock().clone()
    }

    fn mark_stopped(&self) {
        let _latest = self.latest.lock();
        self.running.store(false, Ordering::Release);
        self.delivered.notify_all();
    }

    fn deliver(&self, frame: Frame, rate: Option<f64>) {
        let frame = Frame {
            id: self.frame_counter.fetch_add(1, Ordering::Relaxed),
            ..frame
        };
        trace!("Delivering frame {} ({}x{})", frame.id, frame.width, frame.height);

        *self.latest.lock() = Some(frame.clone());
        self.delivered.notify_all();

        // Held for the whole call so that clearing the sink waits out an
        // in-flight append.
        {
            let sink = self.sink.lock();
            if let Some(sink) = sink.as_ref() {
                sink(&frame);
            }
        }

        let frame_id = frame.id;
        self.bus.publish(AcquisitionEvent::Frame(frame));

        if let Some(fps) = rate {
            *self.last_rate.lock() = Some(fps);
            self.bus.publish(AcquisitionEvent::Rate { frame_id, fps });
        }
    }
}

/// Owns the camera for the duration of a run and pulls frames from it on a
/// dedicated thread.
pub struct AcquisitionWorker {
    transport: Arc<dyn CameraTransport>,
    config: AcquisitionConfig,
    params: Mutex<CameraParameters>,
    shared: Arc<WorkerShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl AcquisitionWorker {
    pub fn new(
        transport: Arc<dyn CameraTransport>,
        config: AcquisitionConfig,
        parameters: CameraParameters,
        bus: EventBus,
    ) -> Self {
        info!(
            "Initializing acquisition worker (retrieve timeout {}ms, rate window {})",
            config.retrieve_timeout_ms, config.rate_window
        );

        Self {
            transport,
            config,
            params: Mutex::new(parameters),
            shared: Arc::new(WorkerShared {
                stop_requested: AtomicBool::new(false),
                running: AtomicBool::new(false),
                frame_counter: AtomicU64::new(0),
                device: Mutex::new(None),
                latest: Mutex::new(None),
                delivered: Condvar::new(),
                sink: Mutex::new(None),
                terminal: Mutex::new(None),
                last_rate: Mutex::new(None),
                bus,
            }),
            thread: Mutex::new(None),
        }
    }

    /// Open the first device, apply the staged parameters and start the
    /// acquisition thread. A no-op while a run is active.
    pub fn start(&self) -> Result<(), CameraError> {
        let mut thread_slot = self.thread.lock();
        if self.shared.running.load(Ordering::Acquire) {
            warn!("Acquisition is already running");
            return Ok(());
        }

        // A previous run that ended on its own still has a handle to reap.
        if let Some(finished) = thread_slot.take() {
            if finished.join().is_err() {
                error!("Previous acquisition thread panicked");
            }
        }

        let info = self
            .transport
            .enumerate()
            .into_iter()
            .next()
            .ok_or(CameraError::DeviceUnavailable)?;
        info!("Opening camera {}", info);
        let device = self.transport.open(&info)?;

        let staged = *self.params.lock();
        for parameter in staged.as_parameters() {
            if let Err(e) = device.set_parameter(parameter) {
                warn!("Staged {} not applied at open: {}", parameter.kind(), e);
            }
        }

        if let Err(e) = device.start_grabbing() {
            device.close();
            return Err(e);
        }

        self.shared.stop_requested.store(false, Ordering::Release);
        *self.shared.terminal.lock() = None;
        *self.shared.last_rate.lock() = None;
        *self.shared.device.lock() = Some(Arc::clone(&device));
        self.shared.running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let timeout = self.config.retrieve_timeout();
        let rate_window = self.config.rate_window;
        let spawned = thread::Builder::new()
            .name("grabcam-acquisition".to_string())
            .spawn(move || acquisition_loop(shared, device, timeout, rate_window));

        match spawned {
            Ok(handle) => {
                *thread_slot = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.mark_stopped();
                if let Some(device) = self.shared.device.lock().take() {
                    device.stop_grabbing();
                    device.close();
                }
                Err(CameraError::WorkerSpawn {
                    details: e.to_string(),
                })
            }
        }
    }

    /// Ask the loop to exit and wait until the device has been released.
    ///
    /// Returns the error that ended the run, if the run ended on its own.
    /// Safe to call before `start`, after a failure, and repeatedly.
    pub fn stop(&self) -> Option<CameraError> {
        let handle = self.thread.lock().take();
        let Some(handle) = handle else {
            debug!("Acquisition is not running");
            return self.terminal_status();
        };

        info!("Stopping acquisition");
        self.shared.stop_requested.store(true, Ordering::Release);
        if let Some(device) = self.shared.open_device() {
            device.abort_retrieve();
        }

        if handle.join().is_err() {
            error!("Acquisition thread panicked");
            self.shared.mark_stopped();
        }

        self.terminal_status()
    }

    /// Block up to `timeout` for the next frame the acquisition loop delivers.
    ///
    /// The device is never read from here: the frame has already been
    /// numbered, handed to the sink and published when it is returned.
    pub fn retrieve_next(&self, timeout: Duration) -> Result<Frame, CameraError> {
        let deadline = Instant::now() + timeout;
        let mut latest = self.shared.latest.lock();
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(CameraError::DeviceUnavailable);
        }

        // ids below this were taken before the call
        let next_id = self.shared.frame_counter.load(Ordering::Acquire);
        loop {
            if let Some(frame) = latest.as_ref().filter(|frame| frame.id >= next_id) {
                return Ok(frame.clone());
            }
            if !self.shared.running.load(Ordering::Acquire) {
                return Err(self.terminal_status().unwrap_or(CameraError::GrabAborted));
            }
            if self.shared.delivered.wait_until(&mut latest, deadline).timed_out() {
                return Err(CameraError::GrabTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        }
    }

    /// Install or remove the buffering callback.
    ///
    /// When this returns with `None`, no call of the previous sink is in
    /// flight and none will follow.
    pub fn set_frame_sink(&self, sink: Option<FrameSink>) {
        let enabled = sink.is_some();
        *self.shared.sink.lock() = sink;
        debug!("Frame buffering {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_buffering(&self) -> bool {
        self.shared.sink.lock().is_some()
    }

    /// Most recently delivered frame
    pub fn current_frame(&self) -> Option<Frame> {
        self.shared.latest.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Error that ended the last run, if it did not end on request
    pub fn terminal_status(&self) -> Option<CameraError> {
        self.shared.terminal.lock().clone()
    }

    pub fn frame_count(&self) -> u64 {
        self.shared.frame_counter.load(Ordering::Relaxed)
    }

    pub fn last_rate(&self) -> Option<f64> {
        *self.shared.last_rate.lock()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.shared.bus
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Snapshot of the staged parameters
    pub fn parameters(&self) -> CameraParameters {
        *self.params.lock()
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            running: self.is_running(),
            buffering: self.is_buffering(),
            device: self.shared.open_device().map(|d| d.info().clone()),
            frames_delivered: self.frame_count(),
            last_rate: self.last_rate(),
            terminal: self.terminal_status(),
        }
    }

    pub fn set_exposure(&self, value: f64) -> Result<(), CameraError> {
        self.apply(Parameter::ExposureTime(value))
    }

    pub fn set_trigger_mode(&self, enabled: bool) -> Result<(), CameraError> {
        self.apply(Parameter::TriggerMode(enabled))
    }

    pub fn set_trigger_source(&self, source: TriggerSource) -> Result<(), CameraError> {
        self.apply(Parameter::TriggerSource(source))
    }

    pub fn set_trigger_selector(&self, selector: TriggerSelector) -> Result<(), CameraError> {
        self.apply(Parameter::TriggerSelector(selector))
    }

    pub fn set_trigger_activation(&self, edge: TriggerActivation) -> Result<(), CameraError> {
        self.apply(Parameter::TriggerActivation(edge))
    }

    pub fn set_free_run_enabled(&self, enabled: bool) -> Result<(), CameraError> {
        self.apply(Parameter::FreeRunEnabled(enabled))
    }

    pub fn set_free_run_rate(&self, rate: u32) -> Result<(), CameraError> {
        self.apply(Parameter::FreeRunRate(rate))
    }

    pub fn set_user_set(&self, slot: UserSet) -> Result<(), CameraError> {
        self.apply(Parameter::UserSet(slot))
    }

    /// Push the configured free-run rate into the device timer.
    ///
    /// Does nothing while the free-run timer is disabled or no device is open.
    pub fn execute_free_run_update(&self) -> Result<(), CameraError> {
        if !self.params.lock().free_run_enabled {
            debug!("Free-run timer disabled; update ignored");
            return Ok(());
        }
        match self.shared.open_device() {
            Some(device) => device.execute(DeviceCommand::FreeRunUpdate),
            None => {
                debug!("No open device; free-run update ignored");
                Ok(())
            }
        }
    }

    /// Persist the device's current settings into the selected user set
    pub fn save_user_set(&self) -> Result<(), CameraError> {
        let device = self
            .shared
            .open_device()
            .ok_or(CameraError::DeviceUnavailable)?;
        device.execute(DeviceCommand::UserSetSave)?;
        info!("Saved settings to {:?}", self.params.lock().user_set);
        Ok(())
    }

    /// Restore the selected user set and re-read the device's parameters
    pub fn load_user_set(&self) -> Result<(), CameraError> {
        let device = self
            .shared
            .open_device()
            .ok_or(CameraError::DeviceUnavailable)?;
        device.execute(DeviceCommand::UserSetLoad)?;

        let mut params = self.params.lock();
        for kind in ParameterKind::ALL {
            match device.read_parameter(kind) {
                Ok(value) => params.stage(value),
                Err(e) => warn!("Could not read {} after user set load: {}", kind, e),
            }
        }
        info!("Loaded settings from {:?}", params.user_set);
        Ok(())
    }

    /// Fire one software trigger on the open device
    pub fn trigger_software(&self) -> Result<(), CameraError> {
        let device = self
            .shared
            .open_device()
            .ok_or(CameraError::DeviceUnavailable)?;
        device.execute(DeviceCommand::SoftwareTrigger)
    }

    /// Read a parameter back from the open device
    pub fn read_device_parameter(&self, kind: ParameterKind) -> Result<Parameter, CameraError> {
        let device = self
            .shared
            .open_device()
            .ok_or(CameraError::DeviceUnavailable)?;
        device.read_parameter(kind)
    }

    /// Validate, apply to the open device if any, then stage.
    ///
    /// A rejected value leaves the staged parameters untouched.
    fn apply(&self, parameter: Parameter) -> Result<(), CameraError> {
        parameter.validate()?;

        match self.shared.open_device() {
            Some(device) => {
                device.set_parameter(parameter).map_err(|e| {
                    warn!("Device refused {:?}: {}", parameter, e);
                    e
                })?;
                debug!("Applied {:?}", parameter);
            }
            None => debug!("Staged {:?} for next start", parameter),
        }

        self.params.lock().stage(parameter);
        Ok(())
    }
}

impl Drop for AcquisitionWorker {
    fn drop(&mut self) {
        if self.thread.lock().is_some() {
            self.stop();
        }
    }
}

/// Body of the acquisition thread
fn acquisition_loop(
    shared: Arc<WorkerShared>,
    device: Arc<dyn CameraDevice>,
    timeout: Duration,
    rate_window: usize,
) {
    let mut meter = RateMeter::new(rate_window);
    let mut frames: u64 = 0;

    shared.bus.publish(AcquisitionEvent::Started {
        device: device.info().to_string(),
        timestamp: SystemTime::now(),
    });

    let failure = loop {
        if shared.stop_requested.load(Ordering::Acquire) {
            break None;
        }

        match device.retrieve(timeout) {
            Ok(frame) => {
                let rate = meter.record(Instant::now());
                shared.deliver(frame, rate);
                frames += 1;
            }
            Err(_) if shared.stop_requested.load(Ordering::Acquire) => break None,
            Err(CameraError::GrabAborted) => continue,
            Err(e) => break Some(e),
        }
    };

    shared.device.lock().take();
    device.stop_grabbing();
    device.close();

    match failure {
        Some(error) => {
            *shared.terminal.lock() = Some(error.clone());
            shared.mark_stopped();
            shared.bus.publish(AcquisitionEvent::Terminated {
                error: error.to_string(),
                timestamp: SystemTime::now(),
            });
        }
        None => {
            shared.mark_stopped();
            shared.bus.publish(AcquisitionEvent::Stopped {
                frames,
                timestamp: SystemTime::now(),
            });
        }
    }
}
