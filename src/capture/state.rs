use serde::Serialize;
use std::fmt;

/// Where the capture session stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Running,
    ContinuousShooting,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::ContinuousShooting => "continuous shooting",
        }
    }

    pub fn is_acquiring(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which commands a front end should currently offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlState {
    pub start: bool,
    pub stop: bool,
    pub single_shot: bool,
    pub continuous: bool,
    pub save: bool,
}

impl ControlState {
    pub fn derive(state: SessionState, shot_pending: bool) -> Self {
        match state {
            SessionState::Idle => Self {
                start: true,
                stop: false,
                single_shot: false,
                continuous: false,
                save: false,
            },
            SessionState::Running => Self {
                start: false,
                stop: true,
                single_shot: true,
                continuous: true,
                save: shot_pending,
            },
            // Stop and single shot stay off until the burst is flushed.
            SessionState::ContinuousShooting => Self {
                start: false,
                stop: false,
                single_shot: false,
                continuous: true,
                save: shot_pending,
            },
        }
    }
}
