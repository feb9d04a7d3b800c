use super::worker::AcquisitionWorker;
use crate::camera::{CameraParameters, CameraTransport};
use crate::config::AcquisitionConfig;
use crate::error::{GrabcamError, Result};
use crate::events::EventBus;
use std::sync::Arc;

/// Builder for the acquisition worker
pub struct AcquisitionWorkerBuilder {
    transport: Option<Arc<dyn CameraTransport>>,
    config: AcquisitionConfig,
    parameters: CameraParameters,
    bus: Option<EventBus>,
}

impl AcquisitionWorkerBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            config: AcquisitionConfig::default(),
            parameters: CameraParameters::default(),
            bus: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn CameraTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(mut self, config: AcquisitionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn parameters(mut self, parameters: CameraParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Publish on an existing bus instead of a fresh one
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self) -> Result<AcquisitionWorker> {
        let transport = self
            .transport
            .ok_or_else(|| GrabcamError::system("Camera transport must be specified"))?;
        self.parameters.validate()?;

        let bus = self
            .bus
            .unwrap_or_else(|| EventBus::new(self.config.event_bus_capacity));

        Ok(AcquisitionWorker::new(
            transport,
            self.config,
            self.parameters,
            bus,
        ))
    }
}

impl Default for AcquisitionWorkerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
