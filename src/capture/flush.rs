use super::encode::{write_frame, SnapshotFormat};
use crate::error::CaptureError;
use crate::frame::{Frame, PixelFormat};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Format used when the configured one cannot be rendered
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

const METADATA_FILE: &str = "session.json";

pub fn is_valid_timestamp_format(format: &str) -> bool {
    !format.trim().is_empty() && !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// One continuous-shooting session, named by its start time
#[derive(Debug, Clone)]
pub struct BurstSession {
    pub label: String,
    pub started_at: DateTime<Local>,
}

impl BurstSession {
    pub fn begin(timestamp_format: &str) -> Self {
        Self::at(Local::now(), timestamp_format)
    }

    pub fn at(started_at: DateTime<Local>, timestamp_format: &str) -> Self {
        let format = if is_valid_timestamp_format(timestamp_format) {
            timestamp_format
        } else {
            warn!(
                "Invalid timestamp format '{}', falling back to {}",
                timestamp_format, DEFAULT_TIMESTAMP_FORMAT
            );
            DEFAULT_TIMESTAMP_FORMAT
        };

        let mut label = String::new();
        if write!(label, "{}", started_at.format(format)).is_err() {
            label = started_at.format(DEFAULT_TIMESTAMP_FORMAT).to_string();
        }

        Self { label, started_at }
    }
}

/// File name of the frame at `index` inside the session directory
fn frame_file_name(label: &str, index: usize) -> String {
    format!("{}_{}.{}", label, index, SnapshotFormat::Png.extension())
}

/// `label`, or `label-2`, `label-3`, ... when an earlier session in the same
/// second already took the directory
fn free_session_label(base: &Path, label: &str) -> String {
    if !base.join(label).exists() {
        return label.to_string();
    }

    let mut suffix = 2;
    loop {
        let candidate = format!("{}-{}", label, suffix);
        if !base.join(&candidate).exists() {
            warn!(
                "Session directory {} already exists, flushing into {}",
                base.join(label).display(),
                candidate
            );
            return candidate;
        }
        suffix += 1;
    }
}

/// Outcome of flushing a burst
#[derive(Debug, Clone, PartialEq)]
pub struct FlushReport {
    pub session: String,
    /// Session directory, when frames were written
    pub directory: Option<PathBuf>,
    pub files: Vec<PathBuf>,
    /// Frames dropped because no destination was chosen
    pub discarded: usize,
}

impl FlushReport {
    pub(crate) fn empty(session: &BurstSession) -> Self {
        Self {
            session: session.label.clone(),
            directory: None,
            files: Vec::new(),
            discarded: 0,
        }
    }

    pub(crate) fn cancelled(session: &BurstSession, discarded: usize) -> Self {
        Self {
            discarded,
            ..Self::empty(session)
        }
    }

    pub fn written(&self) -> usize {
        self.files.len()
    }

    pub fn is_cancelled(&self) -> bool {
        self.discarded > 0
    }
}

/// Written next to a flushed burst when enabled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session: String,
    pub started_at: DateTime<Local>,
    pub first_frame_at: SystemTime,
    pub last_frame_at: SystemTime,
    pub frame_count: usize,
    pub first_frame_id: u64,
    pub last_frame_id: u64,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub rate_fps: Option<f64>,
}

impl SessionMetadata {
    fn describe(
        label: &str,
        session: &BurstSession,
        frames: &[Frame],
        rate_fps: Option<f64>,
    ) -> Option<Self> {
        let (first, last) = (frames.first()?, frames.last()?);
        Some(Self {
            session: label.to_string(),
            started_at: session.started_at,
            first_frame_at: first.timestamp,
            last_frame_at: last.timestamp,
            frame_count: frames.len(),
            first_frame_id: first.id,
            last_frame_id: last.id,
            width: first.width,
            height: first.height,
            pixel_format: first.format,
            rate_fps,
        })
    }
}

fn save_metadata(metadata: &SessionMetadata, directory: &Path) -> Result<PathBuf, String> {
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| format!("Failed to serialize metadata: {}", e))?;
    let path = directory.join(METADATA_FILE);
    fs::write(&path, json).map_err(|e| format!("Failed to write metadata file: {}", e))?;
    debug!("Saved metadata to {}", path.display());
    Ok(path)
}

/// Write `frames` as `<base>/<label>/<label>_<i>.png`, in order.
///
/// An existing session directory is never written into; the label gets a
/// numeric suffix instead. The first failure stops the write; the error names
/// the indices that were not written.
pub(crate) fn write_session(
    frames: &[Frame],
    base: &Path,
    session: &BurstSession,
    save_session_metadata: bool,
    rate_fps: Option<f64>,
) -> Result<FlushReport, CaptureError> {
    let label = free_session_label(base, &session.label);
    let directory = base.join(&label);
    let unwritten_from = |index: usize| (index..frames.len()).collect::<Vec<_>>();

    fs::create_dir_all(&directory).map_err(|e| CaptureError::FlushIo {
        directory: directory.clone(),
        written: 0,
        unwritten: unwritten_from(0),
        details: e.to_string(),
    })?;

    let mut files = Vec::with_capacity(frames.len());
    for (index, frame) in frames.iter().enumerate() {
        let path = directory.join(frame_file_name(&label, index));
        if let Err(e) = write_frame(frame, &path, SnapshotFormat::Png, 0) {
            return Err(CaptureError::FlushIo {
                directory,
                written: index,
                unwritten: unwritten_from(index),
                details: e.to_string(),
            });
        }
        files.push(path);
    }

    if save_session_metadata {
        if let Some(metadata) = SessionMetadata::describe(&label, session, frames, rate_fps) {
            if let Err(e) = save_metadata(&metadata, &directory) {
                warn!("Failed to save metadata for session {}: {}", label, e);
            }
        }
    } else {
        debug!("Skipping metadata save (disabled in config)");
    }

    info!(
        "Flushed {} frames to {}",
        files.len(),
        directory.display()
    );

    Ok(FlushReport {
        session: label,
        directory: Some(directory),
        files,
        discarded: 0,
    })
}
