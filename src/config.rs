use crate::camera::{CameraParameters, SimulatedCameraConfig};
use crate::capture::{is_valid_timestamp_format, SnapshotFormat, DEFAULT_TIMESTAMP_FORMAT};
use crate::frame::PixelFormat;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GrabcamConfig {
    pub camera: CameraConfig,
    pub acquisition: AcquisitionConfig,
    pub parameters: CameraParameters,
    pub capture: CaptureConfig,
}

/// Simulated device description
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Serial number reported by enumeration
    #[serde(default = "default_camera_serial")]
    pub serial: String,

    #[serde(default = "default_camera_model")]
    pub model: String,

    /// Sensor resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    #[serde(default)]
    pub pixel_format: PixelFormat,

    /// Free-run frame interval in milliseconds
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AcquisitionConfig {
    /// Longest wait for one frame before the run is declared failed
    #[serde(default = "default_retrieve_timeout_ms")]
    pub retrieve_timeout_ms: u64,

    /// Number of instantaneous rates averaged into one rate sample
    #[serde(default = "default_rate_window")]
    pub rate_window: usize,

    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Default destination for burst flushes and snapshots
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// chrono format used for burst directory and file names
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,

    #[serde(default)]
    pub snapshot_format: SnapshotFormat,

    /// JPEG quality for snapshots (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Write a session.json next to each flushed burst
    #[serde(default = "default_save_metadata")]
    pub save_metadata: bool,
}

impl CameraConfig {
    pub fn simulated(&self) -> SimulatedCameraConfig {
        SimulatedCameraConfig {
            serial: self.serial.clone(),
            model: self.model.clone(),
            width: self.resolution.0,
            height: self.resolution.1,
            pixel_format: self.pixel_format,
            frame_interval: Duration::from_millis(self.frame_interval_ms),
        }
    }
}

impl AcquisitionConfig {
    pub fn retrieve_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieve_timeout_ms)
    }
}

impl GrabcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("grabcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let defaults = CameraParameters::default();
        let settings = Config::builder()
            .set_default("camera.serial", default_camera_serial())?
            .set_default("camera.model", default_camera_model())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.pixel_format", "Mono8")?
            .set_default("camera.frame_interval_ms", default_frame_interval_ms())?
            .set_default(
                "acquisition.retrieve_timeout_ms",
                default_retrieve_timeout_ms(),
            )?
            .set_default("acquisition.rate_window", default_rate_window() as i64)?
            .set_default(
                "acquisition.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default("parameters.exposure", defaults.exposure)?
            .set_default("parameters.trigger_mode", defaults.trigger_mode)?
            .set_default("parameters.trigger_source", "Line1")?
            .set_default("parameters.trigger_selector", "FrameStart")?
            .set_default("parameters.trigger_activation", "Rising")?
            .set_default("parameters.free_run_enabled", defaults.free_run_enabled)?
            .set_default("parameters.free_run_rate", defaults.free_run_rate)?
            .set_default("parameters.user_set", "UserSet1")?
            .set_default("capture.output_dir", default_output_dir())?
            .set_default("capture.timestamp_format", default_timestamp_format())?
            .set_default("capture.snapshot_format", "Png")?
            .set_default("capture.jpeg_quality", default_jpeg_quality() as i64)?
            .set_default("capture.save_metadata", default_save_metadata())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with GRABCAM_ prefix
            .add_source(Environment::with_prefix("GRABCAM").separator("__"))
            .build()?;

        let config: GrabcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.frame_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Camera frame_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.acquisition.retrieve_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Acquisition retrieve_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.acquisition.rate_window == 0 {
            return Err(ConfigError::Message(
                "Acquisition rate_window must be greater than 0".to_string(),
            ));
        }

        if self.acquisition.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        self.parameters
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return Err(ConfigError::Message(
                "Capture jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if !is_valid_timestamp_format(&self.capture.timestamp_format) {
            return Err(ConfigError::Message(format!(
                "Capture timestamp_format '{}' is not a valid chrono format",
                self.capture.timestamp_format
            )));
        }

        Ok(())
    }
}

impl Default for GrabcamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                serial: default_camera_serial(),
                model: default_camera_model(),
                resolution: default_camera_resolution(),
                pixel_format: PixelFormat::default(),
                frame_interval_ms: default_frame_interval_ms(),
            },
            acquisition: AcquisitionConfig::default(),
            parameters: CameraParameters::default(),
            capture: CaptureConfig {
                output_dir: default_output_dir(),
                timestamp_format: default_timestamp_format(),
                snapshot_format: SnapshotFormat::default(),
                jpeg_quality: default_jpeg_quality(),
                save_metadata: default_save_metadata(),
            },
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            retrieve_timeout_ms: default_retrieve_timeout_ms(),
            rate_window: default_rate_window(),
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

// Default value functions
fn default_camera_serial() -> String {
    "SIM-0001".to_string()
}
fn default_camera_model() -> String {
    "Simulated GigE".to_string()
}
fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_frame_interval_ms() -> u64 {
    33
}

fn default_retrieve_timeout_ms() -> u64 {
    25000
}
fn default_rate_window() -> usize {
    crate::acquisition::DEFAULT_RATE_WINDOW
}
fn default_event_bus_capacity() -> usize {
    256
}

fn default_output_dir() -> String {
    "./captures".to_string()
}
fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}
fn default_jpeg_quality() -> u8 {
    90
}
fn default_save_metadata() -> bool {
    false
}
