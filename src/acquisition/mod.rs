mod builder;
mod rate;
mod status;
mod worker;

pub use builder::AcquisitionWorkerBuilder;
pub use rate::{RateMeter, DEFAULT_RATE_WINDOW};
pub use status::{HealthStatus, WorkerStatus};
pub use worker::{AcquisitionWorker, FrameSink};
