use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel layouts a camera can deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Single channel, 8 bits per pixel
    Mono8,
    /// Three channels in blue, green, red order
    Bgr8,
    /// Three channels in red, green, blue order
    Rgb8,
}

impl PixelFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Mono8 => 1,
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
        }
    }

    pub fn is_color(&self) -> bool {
        !matches!(self, PixelFormat::Mono8)
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        PixelFormat::Mono8
    }
}

/// One grabbed image.
///
/// Pixel bytes are shared behind an `Arc`, so cloning a frame to hand it to
/// another subscriber never copies pixel data and nothing can mutate it.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Per-worker sequence number, starting at 0
    pub id: u64,
    /// Host time at which the grab completed
    pub timestamp: SystemTime,
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl Frame {
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Validate frame data size against expected size
    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Whether two frames share the same pixel allocation
    pub fn shares_pixels_with(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Pixel bytes in the channel order image encoders expect.
    ///
    /// Mono and RGB data are borrowed as-is; BGR data is swizzled into a new
    /// RGB buffer.
    pub fn encoder_pixels(&self) -> std::borrow::Cow<'_, [u8]> {
        match self.format {
            PixelFormat::Mono8 | PixelFormat::Rgb8 => std::borrow::Cow::Borrowed(&self.data[..]),
            PixelFormat::Bgr8 => {
                let mut rgb = Vec::with_capacity(self.data.len());
                for px in self.data.chunks_exact(3) {
                    rgb.extend_from_slice(&[px[2], px[1], px[0]]);
                }
                std::borrow::Cow::Owned(rgb)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pixel_format_properties() {
        assert_eq!(PixelFormat::Mono8.bytes_per_pixel(), 1);
        assert_eq!(PixelFormat::Bgr8.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Rgb8.bytes_per_pixel(), 3);

        assert!(!PixelFormat::Mono8.is_color());
        assert!(PixelFormat::Bgr8.is_color());
    }

    #[test]
    fn test_frame_size_validation() {
        let valid = Frame::new(1, SystemTime::now(), vec![0u8; 64 * 48], 64, 48, PixelFormat::Mono8);
        assert!(valid.validate_size());

        let invalid = Frame::new(2, SystemTime::now(), vec![0u8; 100], 64, 48, PixelFormat::Bgr8);
        assert!(!invalid.validate_size());
    }

    #[test]
    fn test_clone_shares_pixels() {
        let frame = Frame::new(1, SystemTime::now(), vec![7u8; 16], 4, 4, PixelFormat::Mono8);
        let copy = frame.clone();
        assert!(frame.shares_pixels_with(&copy));
    }

    #[test]
    fn test_encoder_pixels_swaps_bgr() {
        let frame = Frame::new(
            1,
            SystemTime::now(),
            vec![1, 2, 3, 10, 20, 30],
            2,
            1,
            PixelFormat::Bgr8,
        );
        assert_eq!(&frame.encoder_pixels()[..], &[3, 2, 1, 30, 20, 10]);

        let mono = Frame::new(2, SystemTime::now(), vec![5, 6], 2, 1, PixelFormat::Mono8);
        assert_eq!(&mono.encoder_pixels()[..], &[5, 6]);
    }

    #[test]
    fn test_frame_age() {
        let past = SystemTime::now() - Duration::from_millis(100);
        let frame = Frame::new(1, past, vec![0u8; 1], 1, 1, PixelFormat::Mono8);
        assert!(frame.age_ms() >= 100);
    }
}
