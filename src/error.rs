use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrabcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Errors raised at the device boundary and by the acquisition worker
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("No camera device could be enumerated")]
    DeviceUnavailable,

    #[error("Failed to open camera {device}: {details}")]
    DeviceOpenFailed { device: String, details: String },

    #[error("No frame arrived within {timeout_ms}ms")]
    GrabTimeout { timeout_ms: u64 },

    #[error("Grab failed: {details}")]
    GrabFailed { details: String },

    #[error("Pending grab was aborted")]
    GrabAborted,

    #[error("Parameter {parameter} rejected: {details}")]
    ParameterRejected { parameter: String, details: String },

    #[error("Failed to spawn acquisition thread: {details}")]
    WorkerSpawn { details: String },
}

impl CameraError {
    pub fn rejected<P: Into<String>, D: Into<String>>(parameter: P, details: D) -> Self {
        Self::ParameterRejected {
            parameter: parameter.into(),
            details: details.into(),
        }
    }
}

/// Errors raised by the capture session controller
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error(
        "Flush to {} stopped after {written} frames; unwritten frames {unwritten:?}: {details}",
        directory.display()
    )]
    FlushIo {
        directory: PathBuf,
        written: usize,
        unwritten: Vec<usize>,
        details: String,
    },

    #[error("Cannot {command} while {state}")]
    InvalidStateTransition {
        state: &'static str,
        command: &'static str,
    },

    #[error("Failed to save {}: {details}", path.display())]
    SaveFailed { path: PathBuf, details: String },
}

impl GrabcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GrabcamError>;
