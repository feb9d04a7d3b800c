use super::parameters::{DeviceCommand, Parameter, ParameterKind};
use crate::error::CameraError;
use crate::frame::Frame;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Identity of an enumerable camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub serial: String,
    pub model: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.model, self.serial)
    }
}

/// Discovers and opens devices on one transport layer
pub trait CameraTransport: Send + Sync {
    fn enumerate(&self) -> Vec<DeviceInfo>;

    fn open(&self, info: &DeviceInfo) -> Result<Arc<dyn CameraDevice>, CameraError>;
}

/// An opened camera.
///
/// Implementations must be callable from several threads at once: the
/// acquisition thread sits in [`CameraDevice::retrieve`] while the control
/// thread sets parameters or asks for an abort.
pub trait CameraDevice: Send + Sync {
    fn info(&self) -> &DeviceInfo;

    fn start_grabbing(&self) -> Result<(), CameraError>;

    fn stop_grabbing(&self);

    /// Block until the next frame, the timeout, or an abort.
    ///
    /// The returned frame's `id` is ignored by the worker, which numbers
    /// frames itself.
    fn retrieve(&self, timeout: Duration) -> Result<Frame, CameraError>;

    /// Wake a pending [`CameraDevice::retrieve`] with `GrabAborted`
    fn abort_retrieve(&self) {}

    fn set_parameter(&self, parameter: Parameter) -> Result<(), CameraError>;

    fn read_parameter(&self, kind: ParameterKind) -> Result<Parameter, CameraError>;

    fn execute(&self, command: DeviceCommand) -> Result<(), CameraError>;

    fn close(&self);
}
