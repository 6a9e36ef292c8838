//! Video source abstraction
//!
//! A [`SourceProvider`] opens [`VideoSource`]s by index or path and lists the
//! capture devices it knows about. The pipeline worker owns the opened
//! source exclusively and reads one [`RawFrame`] at a time.

use std::fmt;
use std::path::PathBuf;

use crate::error::{CaptureError, Result};

/// Requested or observed frame dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSize {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl FrameSize {
    /// 1280x720, the size cameras are asked for when nothing else is set
    pub const HD_720: Self = Self::new(1280, 720);

    /// Create a frame size
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Build from signed dimensions, falling back to [`FrameSize::HD_720`]
    /// when either is not positive
    pub fn from_signed_or_default(width: i32, height: i32) -> Self {
        match (u32::try_from(width), u32::try_from(height)) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => Self::new(w, h),
            _ => Self::HD_720,
        }
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self::HD_720
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for FrameSize {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}

/// Which source to open: a device index or a media/device path
///
/// Exactly one of the two is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceSelector {
    /// Capture device by index
    Index(u32),
    /// Device node or media file
    Path(PathBuf),
}

impl Default for SourceSelector {
    fn default() -> Self {
        Self::Index(0)
    }
}

impl fmt::Display for SourceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "device #{index}"),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Settings the worker snapshots before each open
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSettings {
    /// Source to open
    pub selector: SourceSelector,
    /// Resolution hint passed to the source
    pub frame_size: FrameSize,
}

/// Pixel layout of frames produced by a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    /// Packed 24-bit B, G, R
    Bgr24,
    /// Packed 32-bit B, G, R, A
    Bgra32,
    /// Packed 24-bit R, G, B
    Rgb24,
    /// YUV 4:2:2 packed as Y0 U Y1 V
    Yuyv,
    /// YUV 4:2:0, Y plane then interleaved UV plane
    Nv12,
    /// YUV 4:2:0, Y plane then U plane then V plane
    I420,
    /// Motion JPEG, one compressed image per frame
    Mjpeg,
}

impl SourceFormat {
    /// Bytes per pixel for packed formats, `None` for planar or compressed
    pub const fn packed_bytes_per_pixel(self) -> Option<usize> {
        match self {
            Self::Bgr24 | Self::Rgb24 => Some(3),
            Self::Bgra32 => Some(4),
            Self::Yuyv => Some(2),
            Self::Nv12 | Self::I420 | Self::Mjpeg => None,
        }
    }
}

/// One frame as delivered by a source, borrowed until the next read
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per row of the first plane (ignored for MJPEG)
    pub stride: usize,
    /// Pixel layout
    pub format: SourceFormat,
    /// Frame bytes
    pub data: &'a [u8],
}

impl RawFrame<'_> {
    /// Frame dimensions
    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }
}

/// A capture device as reported by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device index
    pub index: u32,
    /// Human-readable name
    pub name: String,
    /// Device node, where the platform has one
    pub path: Option<PathBuf>,
}

impl DeviceInfo {
    /// Selector that opens this device: the path when known, else the index
    pub fn selector(&self) -> SourceSelector {
        match &self.path {
            Some(path) => SourceSelector::Path(path.clone()),
            None => SourceSelector::Index(self.index),
        }
    }
}

/// An open video source
///
/// Owned by exactly one worker at a time; dropping it releases the device.
pub trait VideoSource: Send {
    /// Block until the next frame is available
    fn read(&mut self) -> Result<RawFrame<'_>>;
}

/// Opens video sources and enumerates capture devices
pub trait SourceProvider: Send + Sync {
    /// Open a source, asking for `size` where the backend supports it
    fn open(&self, selector: &SourceSelector, size: FrameSize) -> Result<Box<dyn VideoSource>>;

    /// Capture devices currently present
    fn devices(&self) -> Vec<DeviceInfo>;
}

/// Resolve a camera by its human-readable name
pub fn find_device_by_name(provider: &dyn SourceProvider, name: &str) -> Result<SourceSelector> {
    provider
        .devices()
        .into_iter()
        .find(|device| device.name == name)
        .map(|device| device.selector())
        .ok_or_else(|| CaptureError::DeviceNotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ListOnly(Vec<DeviceInfo>);

    impl SourceProvider for ListOnly {
        fn open(&self, selector: &SourceSelector, _size: FrameSize) -> Result<Box<dyn VideoSource>> {
            Err(CaptureError::device_open(selector, "not supported"))
        }

        fn devices(&self) -> Vec<DeviceInfo> {
            self.0.clone()
        }
    }

    #[test]
    fn test_frame_size_defaults() {
        assert_eq!(FrameSize::default(), FrameSize::new(1280, 720));
        assert_eq!(FrameSize::new(640, 480).to_string(), "640x480");
        assert!(FrameSize::new(0, 480).is_empty());
    }

    #[test]
    fn test_frame_size_from_signed() {
        assert_eq!(FrameSize::from_signed_or_default(640, 480), FrameSize::new(640, 480));
        assert_eq!(FrameSize::from_signed_or_default(0, 480), FrameSize::HD_720);
        assert_eq!(FrameSize::from_signed_or_default(640, -1), FrameSize::HD_720);
    }

    #[test]
    fn test_selector_default_is_first_device() {
        assert_eq!(SourceSelector::default(), SourceSelector::Index(0));
        assert_eq!(SourceSelector::Index(2).to_string(), "device #2");
    }

    #[test]
    fn test_find_device_by_name() {
        let provider = ListOnly(vec![
            DeviceInfo {
                index: 0,
                name: "Integrated Camera".into(),
                path: Some(PathBuf::from("/dev/video0")),
            },
            DeviceInfo {
                index: 1,
                name: "USB Camera".into(),
                path: None,
            },
        ]);

        assert_eq!(
            find_device_by_name(&provider, "Integrated Camera").unwrap(),
            SourceSelector::Path(PathBuf::from("/dev/video0"))
        );
        assert_eq!(
            find_device_by_name(&provider, "USB Camera").unwrap(),
            SourceSelector::Index(1)
        );
        assert!(matches!(
            find_device_by_name(&provider, "Missing"),
            Err(CaptureError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_packed_bytes_per_pixel() {
        assert_eq!(SourceFormat::Bgr24.packed_bytes_per_pixel(), Some(3));
        assert_eq!(SourceFormat::Yuyv.packed_bytes_per_pixel(), Some(2));
        assert_eq!(SourceFormat::Nv12.packed_bytes_per_pixel(), None);
    }
}
