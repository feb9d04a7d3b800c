use crate::error::CameraError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest accepted free-run timer rate
pub const FREE_RUN_RATE_MIN: u32 = 1;
/// Largest accepted free-run timer rate
pub const FREE_RUN_RATE_MAX: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerSource {
    Software,
    Line1,
    Line3,
    Action1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerSelector {
    AcquisitionStart,
    FrameStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerActivation {
    Rising,
    Falling,
}

/// Device-persisted parameter bundle slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserSet {
    UserSet1,
    UserSet2,
    UserSet3,
}

/// A single device parameter together with its value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parameter {
    ExposureTime(f64),
    TriggerMode(bool),
    TriggerSource(TriggerSource),
    TriggerSelector(TriggerSelector),
    TriggerActivation(TriggerActivation),
    FreeRunEnabled(bool),
    FreeRunRate(u32),
    UserSet(UserSet),
}

/// Names a parameter without a value, used for reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    ExposureTime,
    TriggerMode,
    TriggerSource,
    TriggerSelector,
    TriggerActivation,
    FreeRunEnabled,
    FreeRunRate,
    UserSet,
}

/// One-shot device commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Push the configured free-run rate into the running timer
    FreeRunUpdate,
    /// Persist current settings into the selected user set
    UserSetSave,
    /// Restore settings from the selected user set
    UserSetLoad,
    SoftwareTrigger,
}

impl ParameterKind {
    /// Every parameter, in the order they are pushed to a freshly opened device
    pub const ALL: [ParameterKind; 8] = [
        ParameterKind::UserSet,
        ParameterKind::ExposureTime,
        ParameterKind::TriggerSelector,
        ParameterKind::TriggerSource,
        ParameterKind::TriggerActivation,
        ParameterKind::TriggerMode,
        ParameterKind::FreeRunRate,
        ParameterKind::FreeRunEnabled,
    ];
}

impl Parameter {
    pub fn kind(&self) -> ParameterKind {
        match self {
            Parameter::ExposureTime(_) => ParameterKind::ExposureTime,
            Parameter::TriggerMode(_) => ParameterKind::TriggerMode,
            Parameter::TriggerSource(_) => ParameterKind::TriggerSource,
            Parameter::TriggerSelector(_) => ParameterKind::TriggerSelector,
            Parameter::TriggerActivation(_) => ParameterKind::TriggerActivation,
            Parameter::FreeRunEnabled(_) => ParameterKind::FreeRunEnabled,
            Parameter::FreeRunRate(_) => ParameterKind::FreeRunRate,
            Parameter::UserSet(_) => ParameterKind::UserSet,
        }
    }

    /// Boundary checks that hold for every device
    pub fn validate(&self) -> Result<(), CameraError> {
        match *self {
            Parameter::ExposureTime(value) if !value.is_finite() || value <= 0.0 => Err(
                CameraError::rejected(self.kind().to_string(), format!("{} is not a positive exposure", value)),
            ),
            Parameter::FreeRunRate(rate) if !(FREE_RUN_RATE_MIN..=FREE_RUN_RATE_MAX).contains(&rate) => {
                Err(CameraError::rejected(
                    self.kind().to_string(),
                    format!(
                        "{} is outside [{}, {}]",
                        rate, FREE_RUN_RATE_MIN, FREE_RUN_RATE_MAX
                    ),
                ))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParameterKind::ExposureTime => "ExposureTime",
            ParameterKind::TriggerMode => "TriggerMode",
            ParameterKind::TriggerSource => "TriggerSource",
            ParameterKind::TriggerSelector => "TriggerSelector",
            ParameterKind::TriggerActivation => "TriggerActivation",
            ParameterKind::FreeRunEnabled => "SyncFreeRunTimerEnable",
            ParameterKind::FreeRunRate => "SyncFreeRunTimerTriggerRate",
            ParameterKind::UserSet => "UserSetSelector",
        };
        f.write_str(name)
    }
}

/// Staged camera configuration applied at open and mirrored while open
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraParameters {
    #[serde(default = "default_exposure")]
    pub exposure: f64,

    #[serde(default)]
    pub trigger_mode: bool,

    #[serde(default = "default_trigger_source")]
    pub trigger_source: TriggerSource,

    #[serde(default = "default_trigger_selector")]
    pub trigger_selector: TriggerSelector,

    #[serde(default = "default_trigger_activation")]
    pub trigger_activation: TriggerActivation,

    #[serde(default)]
    pub free_run_enabled: bool,

    #[serde(default = "default_free_run_rate")]
    pub free_run_rate: u32,

    #[serde(default = "default_user_set")]
    pub user_set: UserSet,
}

impl CameraParameters {
    /// Selector and source go before the mode switch so the trigger is fully
    /// described by the time it is armed.
    pub fn as_parameters(&self) -> [Parameter; 8] {
        ParameterKind::ALL.map(|kind| self.get(kind))
    }

    /// Record a parameter value
    pub fn stage(&mut self, parameter: Parameter) {
        match parameter {
            Parameter::ExposureTime(v) => self.exposure = v,
            Parameter::TriggerMode(v) => self.trigger_mode = v,
            Parameter::TriggerSource(v) => self.trigger_source = v,
            Parameter::TriggerSelector(v) => self.trigger_selector = v,
            Parameter::TriggerActivation(v) => self.trigger_activation = v,
            Parameter::FreeRunEnabled(v) => self.free_run_enabled = v,
            Parameter::FreeRunRate(v) => self.free_run_rate = v,
            Parameter::UserSet(v) => self.user_set = v,
        }
    }

    pub fn get(&self, kind: ParameterKind) -> Parameter {
        match kind {
            ParameterKind::ExposureTime => Parameter::ExposureTime(self.exposure),
            ParameterKind::TriggerMode => Parameter::TriggerMode(self.trigger_mode),
            ParameterKind::TriggerSource => Parameter::TriggerSource(self.trigger_source),
            ParameterKind::TriggerSelector => Parameter::TriggerSelector(self.trigger_selector),
            ParameterKind::TriggerActivation => {
                Parameter::TriggerActivation(self.trigger_activation)
            }
            ParameterKind::FreeRunEnabled => Parameter::FreeRunEnabled(self.free_run_enabled),
            ParameterKind::FreeRunRate => Parameter::FreeRunRate(self.free_run_rate),
            ParameterKind::UserSet => Parameter::UserSet(self.user_set),
        }
    }

    pub fn validate(&self) -> Result<(), CameraError> {
        self.as_parameters().iter().try_for_each(Parameter::validate)
    }
}

impl Default for CameraParameters {
    fn default() -> Self {
        Self {
            exposure: default_exposure(),
            trigger_mode: false,
            trigger_source: default_trigger_source(),
            trigger_selector: default_trigger_selector(),
            trigger_activation: default_trigger_activation(),
            free_run_enabled: false,
            free_run_rate: default_free_run_rate(),
            user_set: default_user_set(),
        }
    }
}

fn default_exposure() -> f64 {
    35000.0
}
fn default_trigger_source() -> TriggerSource {
    TriggerSource::Line1
}
fn default_trigger_selector() -> TriggerSelector {
    TriggerSelector::FrameStart
}
fn default_trigger_activation() -> TriggerActivation {
    TriggerActivation::Rising
}
fn default_free_run_rate() -> u32 {
    30
}
fn default_user_set() -> UserSet {
    UserSet::UserSet1
}
