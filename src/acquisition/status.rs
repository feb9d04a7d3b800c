use crate::camera::DeviceInfo;
use crate::error::CameraError;

/// Point-in-time view of the acquisition worker
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    pub running: bool,
    pub buffering: bool,
    pub device: Option<DeviceInfo>,
    pub frames_delivered: u64,
    pub last_rate: Option<f64>,
    pub terminal: Option<CameraError>,
}

/// Health status enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Idle,
    Healthy,
    Failed,
}

impl WorkerStatus {
    pub fn health(&self) -> HealthStatus {
        match (&self.terminal, self.running) {
            (Some(_), false) => HealthStatus::Failed,
            (_, true) => HealthStatus::Healthy,
            (None, false) => HealthStatus::Idle,
        }
    }
}
