//! Owned image buffers
//!
//! [`Image`] is the currency between the capture side and the engine. The
//! engine wraps an image's memory without copying when processing, and its
//! output is copied into a fresh `Image` so the result never borrows engine
//! memory.

use crate::error::{FilterError, Result};

/// Pixel layout of an [`Image`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 32 bits per pixel, byte order B, G, R, A (the engine's working format)
    Bgra32,
    /// 32 bits per pixel, byte order R, G, B, A
    Rgba32,
    /// 24 bits per pixel, byte order R, G, B
    Rgb24,
}

impl PixelFormat {
    /// Bytes per pixel
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgra32 | Self::Rgba32 => 4,
            Self::Rgb24 => 3,
        }
    }
}

/// An owned, row-addressable image
///
/// Rows may be padded: `stride >= width * bytes_per_pixel`.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Image {
    /// Allocate a zeroed image with tightly packed rows
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let stride = width as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            stride,
            format,
            data: vec![0; stride * height as usize],
        }
    }

    /// Wrap existing pixel data
    ///
    /// Fails if the stride is narrower than a row or the buffer is too
    /// short for `height` rows.
    pub fn from_raw(width: u32, height: u32, stride: usize, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let row_bytes = width as usize * format.bytes_per_pixel();
        if stride < row_bytes {
            return Err(FilterError::UnsupportedFormat(format!(
                "stride {stride} is narrower than a {width}px row"
            )));
        }
        let needed = stride * height as usize;
        if data.len() < needed {
            return Err(FilterError::UnsupportedFormat(format!(
                "buffer holds {} bytes, {width}x{height} needs {needed}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            stride,
            format,
            data,
        })
    }

    /// Copy `height` rows of `stride` bytes out of a borrowed buffer
    pub(crate) fn copy_from(width: u32, height: u32, stride: usize, format: PixelFormat, src: &[u8]) -> Result<Self> {
        let needed = stride * height as usize;
        let data = src
            .get(..needed)
            .ok_or_else(|| FilterError::UnsupportedFormat(format!("locked buffer shorter than {needed} bytes")))?
            .to_vec();
        Self::from_raw(width, height, stride, format, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Bytes per row, including padding
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// True when the image has no pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whole pixel buffer, `stride * height` bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable pixel buffer
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// One row without its padding
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride;
        self.data.get(start..start + self.width as usize * self.format.bytes_per_pixel())
    }

    /// Bytes of the pixel at `(x, y)`
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let offset = x as usize * bpp;
        self.row(y).and_then(|row| row.get(offset..offset + bpp))
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}
