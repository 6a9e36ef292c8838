//! Capability traits for the external engine
//!
//! The vendor SDK is an abstract factory over a small interface hierarchy.
//! Each interface is mirrored here as a trait so the facade can be driven
//! either by the real library ([`crate::native`]) or by an in-process
//! implementation ([`crate::fake`], behind the `test-util` feature).
//!
//! ```text
//! SdkFactory ──► FrameFactory ──► Frame ──► LockedFrameData
//!      │
//!      └──────► EnginePipeline ──► PipelineConfiguration
//!                      │
//!                      └────────► ReplacementController
//! ```
//!
//! Handles release their engine object when dropped. None of these objects
//! are safe for concurrent use; [`crate::VideoFilter`] serializes every call.
//!
//! Objects created by one implementation can only be passed back to the
//! same implementation. The `native()` hook exposes the underlying SDK
//! pointer; implementations that receive a frame without one treat it as an
//! invalid argument.

use std::ffi::{c_void, CStr};
use std::ptr::NonNull;

use crate::types::{Backend, FrameFormat, FrameLock, PipelineErrorCode, Preset};

/// Outcome of an engine call that can be rejected
pub type EngineResult<T = ()> = std::result::Result<T, PipelineErrorCode>;

/// Entry point returned by the SDK library
pub trait SdkFactory: Send {
    /// Create the frame factory used for wrapping and loading images
    fn create_frame_factory(&self) -> Option<Box<dyn FrameFactory>>;

    /// Create a processing pipeline
    fn create_pipeline(&self) -> Option<Box<dyn EnginePipeline>>;
}

/// Builds engine frames from raw buffers and files
pub trait FrameFactory: Send {
    /// Wrap packed BGRA memory without copying
    ///
    /// The returned frame borrows `data` and must not outlive it.
    fn create_bgra<'a>(&self, data: &'a [u8], stride: usize, width: u32, height: u32) -> Option<Box<dyn Frame + 'a>>;

    /// Wrap NV12 planes without copying
    fn create_nv12<'a>(
        &self,
        y_plane: &'a [u8],
        y_stride: usize,
        uv_plane: &'a [u8],
        uv_stride: usize,
        width: u32,
        height: u32,
    ) -> Option<Box<dyn Frame + 'a>>;

    /// Decode an image file into an engine-owned frame
    fn load_image(&self, utf8_path: &CStr) -> Option<Box<dyn Frame>>;
}

/// An engine image
pub trait Frame: Send {
    /// Pixel layout, `None` if the engine reports something unknown
    fn format(&self) -> Option<FrameFormat>;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Map the frame memory; unmapped when the returned handle drops
    fn lock(&self, mode: FrameLock) -> Option<Box<dyn LockedFrameData + '_>>;

    /// Underlying SDK object, if this frame belongs to the native library
    fn native(&self) -> Option<NonNull<c_void>> {
        None
    }
}

/// Mapped frame memory
pub trait LockedFrameData {
    /// Bytes per row of `plane` (0 for packed formats)
    fn bytes_per_line(&self, plane: usize) -> usize;

    /// Bytes of `plane`, `bytes_per_line * rows` long
    fn plane(&self, plane: usize) -> Option<&[u8]>;
}

/// Backend and preset selection, copied out of and applied back to a pipeline
pub trait PipelineConfiguration: Send {
    fn set_backend(&mut self, backend: Backend);

    /// Current backend, `None` for values this crate does not know
    fn backend(&self) -> Option<Backend>;

    fn set_segmentation_preset(&mut self, preset: Preset);

    fn segmentation_preset(&self) -> Preset;

    fn native(&self) -> Option<NonNull<c_void>> {
        None
    }
}

/// Handle to an active background replacement
pub trait ReplacementController: Send {
    /// Use `image` as the new background; the engine keeps its own reference
    fn set_background_image(&mut self, image: &dyn Frame);

    /// Fall back to the engine's default background
    fn clear_background_image(&mut self);
}

/// The processing pipeline
///
/// Power and level values are passed through unchanged; callers clamp them.
pub trait EnginePipeline: Send {
    fn set_configuration(&mut self, config: &dyn PipelineConfiguration) -> EngineResult;
    fn copy_configuration(&self) -> Option<Box<dyn PipelineConfiguration>>;
    fn copy_default_configuration(&self) -> Option<Box<dyn PipelineConfiguration>>;

    fn enable_blur_background(&mut self, power: f32) -> EngineResult;
    fn disable_background_blur(&mut self);
    /// Blur power if blur is active
    fn blur_background_state(&self) -> Option<f32>;

    fn enable_replace_background(&mut self) -> EngineResult<Box<dyn ReplacementController>>;
    fn disable_replace_background(&mut self);
    fn replace_background_state(&self) -> bool;

    fn enable_denoise_background(&mut self) -> EngineResult;
    fn disable_background_denoise(&mut self);
    fn denoise_background_state(&self) -> bool;
    fn set_denoise_power(&mut self, power: f32);
    fn denoise_power(&self) -> f32;
    fn set_denoise_with_face(&mut self, with_face: bool);
    fn denoise_with_face(&self) -> bool;

    fn enable_beautification(&mut self) -> EngineResult;
    fn disable_beautification(&mut self);
    fn set_beautification_level(&mut self, level: f32);
    fn beautification_level(&self) -> f32;

    fn enable_color_correction(&mut self) -> EngineResult;
    fn enable_color_correction_with_reference(&mut self, reference: &dyn Frame) -> EngineResult;
    fn enable_color_correction_with_lut_file(&mut self, utf8_path: &CStr) -> EngineResult;
    fn disable_color_correction(&mut self);
    fn set_color_correction_power(&mut self, power: f32);

    fn enable_smart_zoom(&mut self) -> EngineResult;
    fn disable_smart_zoom(&mut self);
    fn set_smart_zoom_level(&mut self, level: f32);
    fn smart_zoom_level(&self) -> f32;

    fn enable_low_light_adjustment(&mut self) -> EngineResult;
    fn disable_low_light_adjustment(&mut self);
    fn set_low_light_adjustment_power(&mut self, power: f32);
    fn low_light_adjustment_power(&self) -> f32;

    fn enable_sharpening(&mut self) -> EngineResult;
    fn disable_sharpening(&mut self);
    fn set_sharpening_power(&mut self, power: f32);
    fn sharpening_power(&self) -> f32;

    /// Run every enabled feature over `input`
    fn process(&mut self, input: &dyn Frame) -> EngineResult<Box<dyn Frame>>;
}
