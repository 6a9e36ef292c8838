//! YUV to BGRA conversion
//!
//! Integer BT.601 conversion for the YUV layouts cameras commonly deliver.
//! Every function writes into a caller-provided BGRA buffer so the capture
//! loop can reuse one allocation across frames.
//!
//! | Format | Layout | Chroma |
//! |--------|--------|--------|
//! | YUYV | packed `Y0 U Y1 V` | 4:2:2 |
//! | NV12 | Y plane, interleaved UV plane | 4:2:0 |
//! | I420 | Y plane, U plane, V plane | 4:2:0 |
//!
//! Source strides are the luma row pitch; chroma pitches follow from it the
//! way V4L2 lays out single-buffer planar formats.

use crate::error::{CaptureError, Result};

/// Destination description shared by all converters
#[derive(Debug)]
pub struct BgraTarget<'a> {
    /// BGRA output bytes
    pub data: &'a mut [u8],
    /// Bytes per output row
    pub stride: usize,
}

fn check_dims(name: &str, width: usize, height: usize, even_height: bool) -> Result<()> {
    if width % 2 != 0 || (even_height && height % 2 != 0) {
        return Err(CaptureError::conversion(format!(
            "{name} needs even dimensions, got {width}x{height}"
        )));
    }
    Ok(())
}

fn check_len(name: &str, what: &str, need: usize, have: usize) -> Result<()> {
    if have < need {
        return Err(CaptureError::conversion(format!(
            "{name} {what} too small: need {need}, got {have}"
        )));
    }
    Ok(())
}

#[inline]
fn put(dst: &mut [u8], (r, g, b): (u8, u8, u8)) {
    dst[0] = b;
    dst[1] = g;
    dst[2] = r;
    dst[3] = 255;
}

/// Convert NV12 into `dst`
///
/// `stride` is the Y row pitch; the UV plane starts at `stride * height`
/// and uses the same pitch.
pub fn nv12_to_bgra(src: &[u8], width: u32, height: u32, stride: usize, dst: BgraTarget<'_>) -> Result<()> {
    let (w, h) = (width as usize, height as usize);
    check_dims("NV12", w, h, true)?;
    let stride = stride.max(w);

    let y_size = stride * h;
    check_len("NV12", "source", y_size + stride * (h / 2), src.len())?;
    check_len("NV12", "destination stride", w * 4, dst.stride)?;
    check_len("NV12", "destination", dst.stride * h, dst.data.len())?;

    let (y_plane, uv_plane) = src.split_at(y_size);

    for y in 0..h {
        let y_row = &y_plane[y * stride..];
        let uv_row = &uv_plane[(y / 2) * stride..];
        let out_row = &mut dst.data[y * dst.stride..];

        for x in 0..w {
            let uv = (x / 2) * 2;
            let rgb = yuv_to_rgb(
                i32::from(y_row[x]),
                i32::from(uv_row[uv]),
                i32::from(uv_row[uv + 1]),
            );
            put(&mut out_row[x * 4..x * 4 + 4], rgb);
        }
    }

    Ok(())
}

/// Convert I420 into `dst`
///
/// `stride` is the Y row pitch; U and V rows are half of it.
pub fn i420_to_bgra(src: &[u8], width: u32, height: u32, stride: usize, dst: BgraTarget<'_>) -> Result<()> {
    let (w, h) = (width as usize, height as usize);
    check_dims("I420", w, h, true)?;
    let stride = stride.max(w);
    let chroma_stride = stride / 2;

    let y_size = stride * h;
    let chroma_size = chroma_stride * (h / 2);
    check_len("I420", "source", y_size + chroma_size * 2, src.len())?;
    check_len("I420", "destination stride", w * 4, dst.stride)?;
    check_len("I420", "destination", dst.stride * h, dst.data.len())?;

    let u_plane = &src[y_size..y_size + chroma_size];
    let v_plane = &src[y_size + chroma_size..y_size + chroma_size * 2];

    for y in 0..h {
        let y_row = &src[y * stride..];
        let c_off = (y / 2) * chroma_stride;
        let out_row = &mut dst.data[y * dst.stride..];

        for x in 0..w {
            let rgb = yuv_to_rgb(
                i32::from(y_row[x]),
                i32::from(u_plane[c_off + x / 2]),
                i32::from(v_plane[c_off + x / 2]),
            );
            put(&mut out_row[x * 4..x * 4 + 4], rgb);
        }
    }

    Ok(())
}

/// Convert YUYV (YUY2) into `dst`
pub fn yuyv_to_bgra(src: &[u8], width: u32, height: u32, stride: usize, dst: BgraTarget<'_>) -> Result<()> {
    let (w, h) = (width as usize, height as usize);
    check_dims("YUYV", w, h, false)?;
    let stride = stride.max(w * 2);

    if h > 0 {
        check_len("YUYV", "source", stride * (h - 1) + w * 2, src.len())?;
    }
    check_len("YUYV", "destination stride", w * 4, dst.stride)?;
    check_len("YUYV", "destination", dst.stride * h, dst.data.len())?;

    for y in 0..h {
        let in_row = &src[y * stride..y * stride + w * 2];
        let out_row = &mut dst.data[y * dst.stride..];

        for (pair, px) in in_row.chunks_exact(4).enumerate() {
            let u = i32::from(px[1]);
            let v = i32::from(px[3]);
            let x = pair * 2;

            put(&mut out_row[x * 4..x * 4 + 4], yuv_to_rgb(i32::from(px[0]), u, v));
            put(&mut out_row[x * 4 + 4..x * 4 + 8], yuv_to_rgb(i32::from(px[2]), u, v));
        }
    }

    Ok(())
}

/// Convert a single YUV sample to RGB
///
/// BT.601, limited range:
/// R = 1.164(Y-16) + 1.596(V-128)
/// G = 1.164(Y-16) - 0.813(V-128) - 0.391(U-128)
/// B = 1.164(Y-16) + 2.018(U-128)
#[inline]
pub fn yuv_to_rgb(y: i32, u: i32, v: i32) -> (u8, u8, u8) {
    // Coefficients scaled by 256
    const Y_SCALE: i32 = 298;
    const V_TO_R: i32 = 409;
    const U_TO_G: i32 = 100;
    const V_TO_G: i32 = 208;
    const U_TO_B: i32 = 516;

    let y = y - 16;
    let u = u - 128;
    let v = v - 128;

    let r = (Y_SCALE * y + V_TO_R * v + 128) >> 8;
    let g = (Y_SCALE * y - U_TO_G * u - V_TO_G * v + 128) >> 8;
    let b = (Y_SCALE * y + U_TO_B * u + 128) >> 8;

    (r.clamp(0, 255) as u8, g.clamp(0, 255) as u8, b.clamp(0, 255) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(buf: &mut [u8], stride: usize) -> BgraTarget<'_> {
        BgraTarget { data: buf, stride }
    }

    #[test]
    fn test_yuv_to_rgb() {
        assert_eq!(yuv_to_rgb(16, 128, 128), (0, 0, 0));

        let (r, g, b) = yuv_to_rgb(235, 128, 128);
        assert!(r > 250 && g > 250 && b > 250);

        // Strong V pushes toward red
        let (r, _, b) = yuv_to_rgb(128, 128, 240);
        assert!(r > b);
    }

    #[test]
    fn test_nv12_to_bgra() {
        let nv12 = [16, 16, 16, 16, 128, 128];
        let mut out = [0u8; 16];
        nv12_to_bgra(&nv12, 2, 2, 2, target(&mut out, 8)).unwrap();

        assert!(out[0] < 5 && out[1] < 5 && out[2] < 5);
        assert_eq!(out[3], 255);
        assert_eq!(out[15], 255);
    }

    #[test]
    fn test_nv12_honors_padded_stride() {
        // 2x2 frame, luma pitch 4, padding bytes are 0xEE and must be skipped
        let nv12 = [
            235, 235, 0xEE, 0xEE, // Y row 0
            235, 235, 0xEE, 0xEE, // Y row 1
            128, 128, 0xEE, 0xEE, // UV row
        ];
        let mut out = [0u8; 16];
        nv12_to_bgra(&nv12, 2, 2, 4, target(&mut out, 8)).unwrap();
        assert!(out.chunks(4).all(|px| px[0] > 250 && px[3] == 255));
    }

    #[test]
    fn test_i420_to_bgra() {
        let i420 = [16, 16, 16, 16, 128, 128];
        let mut out = [0u8; 16];
        i420_to_bgra(&i420, 2, 2, 2, target(&mut out, 8)).unwrap();
        assert!(out[0] < 5 && out[1] < 5 && out[2] < 5);
    }

    #[test]
    fn test_yuyv_to_bgra() {
        let yuyv = [
            16, 128, 235, 128, // row 0: black, white
            16, 128, 235, 128, // row 1
        ];
        let mut out = [0u8; 16];
        yuyv_to_bgra(&yuyv, 2, 2, 4, target(&mut out, 8)).unwrap();

        assert!(out[0] < 5);
        assert!(out[4] > 250);
        assert!(out[8] < 5);
    }

    #[test]
    fn test_short_source_is_an_error() {
        let mut out = [0u8; 16];
        let err = nv12_to_bgra(&[16, 16, 16], 2, 2, 2, target(&mut out, 8)).unwrap_err();
        assert!(matches!(err, CaptureError::Conversion(_)));
    }

    #[test]
    fn test_odd_dimensions_are_rejected() {
        let mut out = [0u8; 64];
        assert!(i420_to_bgra(&[0; 64], 3, 2, 3, target(&mut out, 12)).is_err());
        assert!(yuyv_to_bgra(&[0; 64], 3, 1, 6, target(&mut out, 12)).is_err());
    }

    #[test]
    fn test_short_destination_is_an_error() {
        let mut out = [0u8; 8];
        assert!(nv12_to_bgra(&[16, 16, 16, 16, 128, 128], 2, 2, 2, target(&mut out, 8)).is_err());
    }
}
