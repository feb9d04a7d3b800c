pub mod acquisition;
pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod station;

pub use acquisition::{
    AcquisitionWorker, AcquisitionWorkerBuilder, FrameSink, HealthStatus, RateMeter, WorkerStatus,
};
pub use camera::{
    CameraDevice, CameraParameters, CameraTransport, DeviceInfo, Parameter, ParameterKind,
    SimulatedTransport,
};
pub use capture::{
    BufferedFrameStore, CaptureSessionController, ControlState, DestinationChooser, FlushReport,
    SaveTarget, SessionState, SnapshotFormat,
};
pub use config::GrabcamConfig;
pub use error::{CameraError, CaptureError, GrabcamError, Result};
pub use events::{AcquisitionEvent, EventBus};
pub use frame::{Frame, PixelFormat};
pub use station::{HeadlessPlan, SessionSummary, Station};
