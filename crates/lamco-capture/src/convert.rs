//! Raw frame to BGRA conversion
//!
//! The engine only accepts packed BGRA. [`FrameConverter`] turns whatever a
//! source delivers into that layout, writing into a shared buffer that is
//! reused whenever the previous frame's consumer has let go of it.

use std::sync::Arc;

use lamco_vbsdk::{Image, PixelFormat};
use tracing::trace;

use crate::error::{CaptureError, Result};
use crate::source::{RawFrame, SourceFormat};
use crate::yuv::{self, BgraTarget};

/// Converts [`RawFrame`]s into BGRA [`Image`]s
#[derive(Debug, Default)]
pub struct FrameConverter {
    allocations: u64,
}

impl FrameConverter {
    /// Create a converter
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times a fresh output buffer had to be allocated
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Convert `frame` into `dst`
    ///
    /// `dst` keeps its allocation when nobody else holds a reference to it
    /// and its dimensions match the frame; otherwise it is replaced by a new
    /// image.
    pub fn convert(&mut self, frame: &RawFrame<'_>, dst: &mut Arc<Image>) -> Result<()> {
        if frame.format == SourceFormat::Mjpeg {
            return self.convert_mjpeg(frame.data, dst);
        }

        if frame.width == 0 || frame.height == 0 {
            return Err(CaptureError::conversion(format!(
                "empty frame {}x{}",
                frame.width, frame.height
            )));
        }

        let image = self.target(dst, frame.width, frame.height)?;
        let stride = image.stride();
        let out = BgraTarget {
            data: image.data_mut(),
            stride,
        };

        match frame.format {
            SourceFormat::Bgra32 => copy_packed::<4>(frame, out, |px, o| o.copy_from_slice(px)),
            SourceFormat::Bgr24 => copy_packed::<3>(frame, out, |px, o| {
                o[..3].copy_from_slice(px);
                o[3] = 255;
            }),
            SourceFormat::Rgb24 => copy_packed::<3>(frame, out, |px, o| {
                o[0] = px[2];
                o[1] = px[1];
                o[2] = px[0];
                o[3] = 255;
            }),
            SourceFormat::Yuyv => yuv::yuyv_to_bgra(frame.data, frame.width, frame.height, frame.stride, out),
            SourceFormat::Nv12 => yuv::nv12_to_bgra(frame.data, frame.width, frame.height, frame.stride, out),
            SourceFormat::I420 => yuv::i420_to_bgra(frame.data, frame.width, frame.height, frame.stride, out),
            SourceFormat::Mjpeg => Err(CaptureError::conversion("MJPEG frames must be decoded first")),
        }
    }

    /// Hand out `dst` as a mutable BGRA image of the given size
    fn target<'a>(&mut self, dst: &'a mut Arc<Image>, width: u32, height: u32) -> Result<&'a mut Image> {
        let reusable = Arc::get_mut(dst)
            .is_some_and(|image| image.size() == (width, height) && image.format() == PixelFormat::Bgra32);

        if !reusable {
            trace!(width, height, "Allocating frame buffer");
            *dst = Arc::new(Image::new(width, height, PixelFormat::Bgra32));
            self.allocations += 1;
        }

        Arc::get_mut(dst).ok_or_else(|| CaptureError::conversion("frame buffer is still shared"))
    }

    #[cfg(feature = "mjpeg")]
    fn convert_mjpeg(&mut self, data: &[u8], dst: &mut Arc<Image>) -> Result<()> {
        let decoded = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
            .map_err(|e| CaptureError::conversion(format!("MJPEG decode failed: {e}")))?
            .to_rgb8();
        let (width, height) = decoded.dimensions();

        let frame = RawFrame {
            width,
            height,
            stride: width as usize * 3,
            format: SourceFormat::Rgb24,
            data: decoded.as_raw(),
        };
        self.convert(&frame, dst)
    }

    #[cfg(not(feature = "mjpeg"))]
    fn convert_mjpeg(&mut self, _data: &[u8], _dst: &mut Arc<Image>) -> Result<()> {
        Err(CaptureError::conversion("MJPEG support is disabled (enable the `mjpeg` feature)"))
    }
}

/// Copy a packed format pixel by pixel, `N` source bytes per pixel
fn copy_packed<const N: usize>(frame: &RawFrame<'_>, out: BgraTarget<'_>, pixel: impl Fn(&[u8], &mut [u8])) -> Result<()> {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let row_bytes = width * N;
    let stride = frame.stride.max(row_bytes);

    let needed = stride * (height - 1) + row_bytes;
    if frame.data.len() < needed {
        return Err(CaptureError::conversion(format!(
            "{:?} frame too small: need {needed}, got {}",
            frame.format,
            frame.data.len()
        )));
    }

    for y in 0..height {
        let src_row = &frame.data[y * stride..y * stride + row_bytes];
        let dst_row = &mut out.data[y * out.stride..y * out.stride + width * 4];
        for (px, o) in src_row.chunks_exact(N).zip(dst_row.chunks_exact_mut(4)) {
            pixel(px, o);
        }
    }

    Ok(())
}
