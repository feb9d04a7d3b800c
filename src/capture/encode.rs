use crate::frame::{Frame, PixelFormat};
use image::codecs::jpeg::JpegEncoder;
use image::error::{ParameterError, ParameterErrorKind};
use image::{ColorType, ImageError, ImageFormat};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File encodings a single shot can be saved as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SnapshotFormat {
    #[default]
    Png,
    Jpeg,
}

impl SnapshotFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SnapshotFormat::Png => "png",
            SnapshotFormat::Jpeg => "jpg",
        }
    }

    /// Guess the format from a path's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(SnapshotFormat::Png),
            "jpg" | "jpeg" => Some(SnapshotFormat::Jpeg),
            _ => None,
        }
    }

    fn accepts_extension(&self, ext: &str) -> bool {
        match self {
            SnapshotFormat::Png => ext.eq_ignore_ascii_case("png"),
            SnapshotFormat::Jpeg => {
                ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg")
            }
        }
    }

    /// Append the format's extension unless the path already carries it
    pub fn with_extension(&self, path: &Path) -> PathBuf {
        let has_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.accepts_extension(e));

        if has_extension {
            path.to_path_buf()
        } else {
            let mut name = path.as_os_str().to_owned();
            name.push(".");
            name.push(self.extension());
            PathBuf::from(name)
        }
    }
}

fn color_type(format: PixelFormat) -> ColorType {
    match format {
        PixelFormat::Mono8 => ColorType::L8,
        PixelFormat::Bgr8 | PixelFormat::Rgb8 => ColorType::Rgb8,
    }
}

/// Encode one frame to `path`, swapping BGR data into RGB order on the way
pub(crate) fn write_frame(
    frame: &Frame,
    path: &Path,
    format: SnapshotFormat,
    jpeg_quality: u8,
) -> Result<(), ImageError> {
    if !frame.validate_size() {
        return Err(ImageError::Parameter(ParameterError::from_kind(
            ParameterErrorKind::DimensionMismatch,
        )));
    }

    let pixels = frame.encoder_pixels();
    let color = color_type(frame.format);

    match format {
        SnapshotFormat::Png => image::save_buffer_with_format(
            path,
            &pixels,
            frame.width,
            frame.height,
            color,
            ImageFormat::Png,
        )?,
        SnapshotFormat::Jpeg => {
            let mut writer = BufWriter::new(File::create(path)?);
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, jpeg_quality);
            encoder.encode(&pixels, frame.width, frame.height, color)?;
        }
    }

    debug!("Wrote frame {} to {}", frame.id, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    #[test]
    fn test_extension_appended_only_when_missing() {
        let png = SnapshotFormat::Png;
        assert_eq!(png.with_extension(Path::new("/tmp/x")), PathBuf::from("/tmp/x.png"));
        assert_eq!(png.with_extension(Path::new("/tmp/x.PNG")), PathBuf::from("/tmp/x.PNG"));
        assert_eq!(
            png.with_extension(Path::new("/tmp/x.jpg")),
            PathBuf::from("/tmp/x.jpg.png")
        );

        let jpeg = SnapshotFormat::Jpeg;
        assert_eq!(jpeg.with_extension(Path::new("a.jpeg")), PathBuf::from("a.jpeg"));
        assert_eq!(jpeg.with_extension(Path::new("a")), PathBuf::from("a.jpg"));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(SnapshotFormat::from_path(Path::new("a.JPG")), Some(SnapshotFormat::Jpeg));
        assert_eq!(SnapshotFormat::from_path(Path::new("a.png")), Some(SnapshotFormat::Png));
        assert_eq!(SnapshotFormat::from_path(Path::new("a.bmp")), None);
        assert_eq!(SnapshotFormat::from_path(Path::new("a")), None);
    }

    #[test]
    fn test_bgr_frame_written_as_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bgr.png");
        let frame = Frame::new(0, SystemTime::now(), vec![10, 20, 30], 1, 1, PixelFormat::Bgr8);

        write_frame(&frame, &path, SnapshotFormat::Png, 90).unwrap();

        let decoded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(0, 0).0, [30, 20, 10]);
    }

    #[test]
    fn test_mono_jpeg_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.jpg");
        let frame = Frame::new(0, SystemTime::now(), vec![128; 16 * 8], 16, 8, PixelFormat::Mono8);

        write_frame(&frame, &path, SnapshotFormat::Jpeg, 80).unwrap();

        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.png");
        let frame = Frame::new(0, SystemTime::now(), vec![0; 3], 4, 4, PixelFormat::Mono8);

        assert!(write_frame(&frame, &path, SnapshotFormat::Png, 90).is_err());
        assert!(!path.exists());
    }
}
