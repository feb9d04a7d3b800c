mod controller;
mod encode;
mod flush;
mod state;
mod store;

pub use controller::{CaptureSessionController, DestinationChooser, SaveTarget};
pub use encode::SnapshotFormat;
pub use flush::{
    is_valid_timestamp_format, BurstSession, FlushReport, SessionMetadata,
    DEFAULT_TIMESTAMP_FORMAT,
};
pub use state::{ControlState, SessionState};
pub use store::{day_key, BufferedFrameStore};
