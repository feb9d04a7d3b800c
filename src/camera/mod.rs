mod device;
mod parameters;
mod simulated;
#[cfg(test)]
mod tests;

pub use device::{CameraDevice, CameraTransport, DeviceInfo};
pub use parameters::{
    CameraParameters, DeviceCommand, Parameter, ParameterKind, TriggerActivation, TriggerSelector,
    TriggerSource, UserSet, FREE_RUN_RATE_MAX, FREE_RUN_RATE_MIN,
};
pub use simulated::{
    FaultPlan, SimulatedCamera, SimulatedCameraConfig, SimulatedTransport,
    SIMULATED_EXPOSURE_RANGE,
};
