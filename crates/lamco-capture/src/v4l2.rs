//! Video4Linux2 camera backend
//!
//! Opens `/dev/video*` nodes through the `v4l` crate and streams frames
//! from memory-mapped buffers. Format negotiation asks for YUYV at the
//! requested size, then MJPEG when the `mjpeg` feature can decode it, and
//! otherwise keeps whatever the driver reports if the converter understands
//! it.

use std::time::Duration;

use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

use crate::config::PipelineConfig;
use crate::error::{CaptureError, Result};
use crate::source::{DeviceInfo, FrameSize, RawFrame, SourceFormat, SourceProvider, SourceSelector, VideoSource};

const DEFAULT_BUFFER_COUNT: u32 = 4;

/// Formats asked for during negotiation, most preferred first
fn preferred_fourccs() -> Vec<FourCC> {
    let mut fourccs = vec![FourCC::new(b"YUYV")];
    if cfg!(feature = "mjpeg") {
        fourccs.push(FourCC::new(b"MJPG"));
    }
    fourccs
}

/// Map a V4L2 fourcc to a layout the converter handles
fn source_format(fourcc: FourCC) -> Option<SourceFormat> {
    match &fourcc.repr {
        b"YUYV" => Some(SourceFormat::Yuyv),
        b"MJPG" if cfg!(feature = "mjpeg") => Some(SourceFormat::Mjpeg),
        b"NV12" => Some(SourceFormat::Nv12),
        b"YU12" => Some(SourceFormat::I420),
        b"BGR3" => Some(SourceFormat::Bgr24),
        b"RGB3" => Some(SourceFormat::Rgb24),
        b"AR24" | b"XR24" | b"BGR4" => Some(SourceFormat::Bgra32),
        _ => None,
    }
}

/// V4L2 device provider
#[derive(Debug, Clone)]
pub struct V4l2Provider {
    read_timeout: Option<Duration>,
    buffer_count: u32,
}

impl V4l2Provider {
    /// Provider with blocking reads
    pub fn new() -> Self {
        Self {
            read_timeout: None,
            buffer_count: DEFAULT_BUFFER_COUNT,
        }
    }

    /// Provider using the pipeline's read timeout
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new().with_read_timeout(config.read_timeout)
    }

    /// Fail a read after `timeout` without a frame
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Number of mmap buffers per stream
    #[must_use]
    pub fn with_buffer_count(mut self, count: u32) -> Self {
        self.buffer_count = count.max(2);
        self
    }

    fn negotiate(dev: &Device, size: FrameSize) -> std::io::Result<v4l::Format> {
        let mut wanted = dev.format()?;
        wanted.width = size.width;
        wanted.height = size.height;

        for fourcc in preferred_fourccs() {
            wanted.fourcc = fourcc;
            match dev.set_format(&wanted) {
                Ok(actual) if actual.fourcc == fourcc => return Ok(actual),
                Ok(actual) => debug!(wanted = %fourcc, got = %actual.fourcc, "Driver substituted format"),
                Err(e) => debug!(fourcc = %fourcc, error = %e, "Format rejected"),
            }
        }

        dev.format()
    }
}

impl Default for V4l2Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceProvider for V4l2Provider {
    fn open(&self, selector: &SourceSelector, size: FrameSize) -> Result<Box<dyn VideoSource>> {
        let device = match selector {
            SourceSelector::Index(index) => Device::new(*index as usize),
            SourceSelector::Path(path) => Device::with_path(path),
        }
        .map_err(|e| CaptureError::device_open(selector, e))?;

        let format = Self::negotiate(&device, size).map_err(|e| CaptureError::device_open(selector, e))?;
        let source_format = source_format(format.fourcc).ok_or_else(|| {
            CaptureError::device_open(selector, format!("unsupported pixel format {}", format.fourcc))
        })?;

        if format.width != size.width || format.height != size.height {
            warn!(
                requested = %size,
                width = format.width,
                height = format.height,
                "Device chose a different resolution"
            );
        }

        let mut stream = MmapStream::with_buffers(&device, Type::VideoCapture, self.buffer_count)
            .map_err(|e| CaptureError::device_open(selector, e))?;
        if let Some(timeout) = self.read_timeout {
            stream.set_timeout(timeout);
        }

        info!(
            source = %selector,
            width = format.width,
            height = format.height,
            fourcc = %format.fourcc,
            "V4L2 stream started"
        );

        Ok(Box::new(V4l2Source {
            stream,
            _device: device,
            width: format.width,
            height: format.height,
            stride: format.stride as usize,
            format: source_format,
        }))
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        v4l::context::enum_devices()
            .into_iter()
            .map(|node| DeviceInfo {
                index: node.index() as u32,
                name: node.name().unwrap_or_else(|| node.path().display().to_string()),
                path: Some(node.path().to_path_buf()),
            })
            .collect()
    }
}

/// An open V4L2 capture stream
///
/// The stream is declared first so its buffers are unmapped before the
/// device handle closes.
struct V4l2Source {
    stream: MmapStream<'static>,
    _device: Device,
    width: u32,
    height: u32,
    stride: usize,
    format: SourceFormat,
}

impl VideoSource for V4l2Source {
    fn read(&mut self) -> Result<RawFrame<'_>> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CaptureError::read(format!("V4L2 dequeue failed: {e}")))?;

        let used = (meta.bytesused as usize).min(buf.len());
        let data = if used == 0 { buf } else { &buf[..used] };

        Ok(RawFrame {
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: self.format,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_mapping() {
        assert_eq!(source_format(FourCC::new(b"YUYV")), Some(SourceFormat::Yuyv));
        assert_eq!(source_format(FourCC::new(b"YU12")), Some(SourceFormat::I420));
        assert_eq!(source_format(FourCC::new(b"H264")), None);
    }

    #[test]
    fn test_mjpeg_only_with_decoder() {
        let offers_mjpeg = preferred_fourccs().contains(&FourCC::new(b"MJPG"));
        let maps_mjpeg = source_format(FourCC::new(b"MJPG")) == Some(SourceFormat::Mjpeg);

        assert_eq!(preferred_fourccs()[0], FourCC::new(b"YUYV"));
        assert_eq!(offers_mjpeg, cfg!(feature = "mjpeg"));
        assert_eq!(maps_mjpeg, cfg!(feature = "mjpeg"));
    }

    #[test]
    fn test_provider_from_config() {
        let config = PipelineConfig::default();
        let provider = V4l2Provider::from_config(&config).with_buffer_count(1);
        assert_eq!(provider.read_timeout, Some(Duration::from_secs(2)));
        assert_eq!(provider.buffer_count, 2);
    }

    #[test]
    fn test_missing_device_fails_to_open() {
        let provider = V4l2Provider::new();
        let err = provider
            .open(&SourceSelector::Path("/dev/video-does-not-exist".into()), FrameSize::HD_720)
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::DeviceOpen { .. }));
    }
}
