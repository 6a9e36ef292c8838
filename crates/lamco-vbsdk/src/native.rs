//! Engine traits backed by the loaded SDK library
//!
//! Every SDK object is held by an [`Owned`] handle which calls `release`
//! exactly once on drop and keeps the library mapped until then.

use std::ffi::{c_float, c_int, c_void, CStr};
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use libloading::Library;
use tracing::warn;

use crate::abi::{
    FrameFactoryVtable, FrameVtable, LockedFrameDataVtable, PipelineConfigurationVtable, PipelineVtable, RawObject,
    ReplacementControllerVtable, SdkFactoryVtable, Vtable,
};
use crate::engine::{
    EngineResult, EnginePipeline, Frame, FrameFactory, LockedFrameData, PipelineConfiguration, ReplacementController,
    SdkFactory,
};
use crate::types::{Backend, FrameFormat, FrameLock, PipelineErrorCode, Preset};

/// Owning handle to one SDK object
pub(crate) struct Owned<V: Vtable> {
    ptr: NonNull<RawObject<V>>,
    library: Arc<Library>,
}

// SAFETY: SDK objects carry no thread affinity; the facade guarantees that
// at most one thread calls into them at a time.
unsafe impl<V: Vtable> Send for Owned<V> {}

impl<V: Vtable> Owned<V> {
    /// Take ownership of an object returned by the SDK
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to a live SDK object whose vtable has
    /// layout `V`, and the caller must own one reference to it.
    pub(crate) unsafe fn from_raw(ptr: *mut RawObject<V>, library: &Arc<Library>) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self {
            ptr,
            library: Arc::clone(library),
        })
    }

    fn this(&self) -> *mut c_void {
        self.ptr.as_ptr().cast()
    }

    fn vtable(&self) -> &V {
        // SAFETY: the object is live while `self` exists and its vtable lives
        // in the library image, which `self.library` keeps mapped.
        unsafe { &*self.ptr.as_ref().vtable }
    }

    fn library(&self) -> &Arc<Library> {
        &self.library
    }
}

impl<V: Vtable> Drop for Owned<V> {
    fn drop(&mut self) {
        let release = self.vtable().release();
        // SAFETY: we own exactly one reference and give it up here.
        unsafe { release(self.this()) }
    }
}

/// Call a vtable slot on an [`Owned`] handle
macro_rules! vcall {
    ($owned:expr, $slot:ident $(, $arg:expr)* $(,)?) => {{
        let owned = &$owned;
        // SAFETY: `owned` is a live object of the vtable's type and the
        // arguments match the slot signature.
        unsafe { (owned.vtable().$slot)(owned.this() $(, $arg)*) }
    }};
}

/// `ISDKFactory`
pub(crate) struct NativeSdkFactory {
    raw: Owned<SdkFactoryVtable>,
}

impl NativeSdkFactory {
    pub(crate) fn new(raw: Owned<SdkFactoryVtable>) -> Self {
        Self { raw }
    }
}

impl SdkFactory for NativeSdkFactory {
    fn create_frame_factory(&self) -> Option<Box<dyn FrameFactory>> {
        let ptr = vcall!(self.raw, create_frame_factory);
        // SAFETY: `createFrameFactory` returns a new reference or null.
        let raw = unsafe { Owned::from_raw(ptr, self.raw.library()) }?;
        Some(Box::new(NativeFrameFactory { raw }))
    }

    fn create_pipeline(&self) -> Option<Box<dyn EnginePipeline>> {
        let ptr = vcall!(self.raw, create_pipeline);
        // SAFETY: `createPipeline` returns a new reference or null.
        let raw = unsafe { Owned::from_raw(ptr, self.raw.library()) }?;
        Some(Box::new(NativePipeline { raw }))
    }
}

/// `IFrameFactory`
struct NativeFrameFactory {
    raw: Owned<FrameFactoryVtable>,
}

impl NativeFrameFactory {
    fn wrap<'a>(&self, ptr: *mut RawObject<FrameVtable>) -> Option<Box<dyn Frame + 'a>> {
        // SAFETY: every frame factory entry point returns a new reference or null.
        let raw = unsafe { Owned::from_raw(ptr, self.raw.library()) }?;
        Some(Box::new(NativeFrame {
            raw,
            _borrow: PhantomData,
        }))
    }
}

impl FrameFactory for NativeFrameFactory {
    fn create_bgra<'a>(&self, data: &'a [u8], stride: usize, width: u32, height: u32) -> Option<Box<dyn Frame + 'a>> {
        if data.len() < stride.checked_mul(height as usize)? {
            return None;
        }
        // With `make_copy == false` the engine only reads through this
        // pointer; the frame's lifetime is tied to `data`.
        let ptr = vcall!(
            self.raw,
            create_bgra,
            data.as_ptr().cast_mut().cast(),
            u32::try_from(stride).ok()?,
            width,
            height,
            false,
        );
        self.wrap(ptr)
    }

    fn create_nv12<'a>(
        &self,
        y_plane: &'a [u8],
        y_stride: usize,
        uv_plane: &'a [u8],
        uv_stride: usize,
        width: u32,
        height: u32,
    ) -> Option<Box<dyn Frame + 'a>> {
        let uv_rows = (height as usize).div_ceil(2);
        if y_plane.len() < y_stride.checked_mul(height as usize)? || uv_plane.len() < uv_stride.checked_mul(uv_rows)? {
            return None;
        }
        let ptr = vcall!(
            self.raw,
            create_nv12,
            y_plane.as_ptr().cast_mut().cast(),
            u32::try_from(y_stride).ok()?,
            uv_plane.as_ptr().cast_mut().cast(),
            u32::try_from(uv_stride).ok()?,
            width,
            height,
            false,
        );
        self.wrap(ptr)
    }

    fn load_image(&self, utf8_path: &CStr) -> Option<Box<dyn Frame>> {
        let ptr = vcall!(self.raw, load_image, utf8_path.as_ptr());
        self.wrap(ptr)
    }
}

/// `IFrame`, possibly borrowing caller memory for `'a`
struct NativeFrame<'a> {
    raw: Owned<FrameVtable>,
    _borrow: PhantomData<&'a [u8]>,
}

impl Frame for NativeFrame<'_> {
    fn format(&self) -> Option<FrameFormat> {
        FrameFormat::from_raw(vcall!(self.raw, frame_format))
    }

    fn width(&self) -> u32 {
        vcall!(self.raw, width)
    }

    fn height(&self) -> u32 {
        vcall!(self.raw, height)
    }

    fn lock(&self, mode: FrameLock) -> Option<Box<dyn LockedFrameData + '_>> {
        let height = self.height() as usize;
        let rows = match self.format()? {
            FrameFormat::Bgra32 | FrameFormat::Rgba32 => [height, 0],
            FrameFormat::Nv12 => [height, height.div_ceil(2)],
        };
        let ptr = vcall!(self.raw, lock, mode.as_raw());
        // SAFETY: `lock` returns a new reference or null.
        let raw = unsafe { Owned::from_raw(ptr, self.raw.library()) }?;
        Some(Box::new(NativeLockedFrameData {
            raw,
            rows,
            _frame: PhantomData,
        }))
    }

    fn native(&self) -> Option<NonNull<c_void>> {
        Some(self.raw.ptr.cast())
    }
}

/// `ILockedFrameData`; the mapping is only valid while the frame lives
struct NativeLockedFrameData<'f> {
    raw: Owned<LockedFrameDataVtable>,
    rows: [usize; 2],
    _frame: PhantomData<&'f ()>,
}

impl LockedFrameData for NativeLockedFrameData<'_> {
    fn bytes_per_line(&self, plane: usize) -> usize {
        let Ok(index) = c_int::try_from(plane) else {
            return 0;
        };
        vcall!(self.raw, bytes_per_line, index) as usize
    }

    fn plane(&self, plane: usize) -> Option<&[u8]> {
        let rows = *self.rows.get(plane)?;
        let index = c_int::try_from(plane).ok()?;
        let len = self.bytes_per_line(plane).checked_mul(rows)?;
        let data = vcall!(self.raw, data_pointer, index);
        if data.is_null() || len == 0 {
            return None;
        }
        // SAFETY: the engine maps `bytes_per_line * rows` bytes for this plane
        // and keeps them mapped until the lock handle is released.
        Some(unsafe { std::slice::from_raw_parts(data.cast::<u8>(), len) })
    }
}

/// `IPipelineConfiguration`
struct NativeConfiguration {
    raw: Owned<PipelineConfigurationVtable>,
}

impl PipelineConfiguration for NativeConfiguration {
    fn set_backend(&mut self, backend: Backend) {
        vcall!(self.raw, set_backend, backend.as_raw());
    }

    fn backend(&self) -> Option<Backend> {
        Backend::from_raw(vcall!(self.raw, get_backend))
    }

    fn set_segmentation_preset(&mut self, preset: Preset) {
        vcall!(self.raw, set_segmentation_preset, preset.as_raw());
    }

    fn segmentation_preset(&self) -> Preset {
        Preset::from_raw(vcall!(self.raw, get_segmentation_preset))
    }

    fn native(&self) -> Option<NonNull<c_void>> {
        Some(self.raw.ptr.cast())
    }
}

/// `IReplacementController`
struct NativeReplacementController {
    raw: Owned<ReplacementControllerVtable>,
}

impl ReplacementController for NativeReplacementController {
    fn set_background_image(&mut self, image: &dyn Frame) {
        match image.native() {
            Some(frame) => vcall!(self.raw, set_background_image, frame.as_ptr().cast_const()),
            None => warn!("Ignoring background frame that was not created by the SDK"),
        }
    }

    fn clear_background_image(&mut self) {
        vcall!(self.raw, clear_background_image);
    }
}

/// `IPipeline`
struct NativePipeline {
    raw: Owned<PipelineVtable>,
}

impl NativePipeline {
    fn wrap_configuration(&self, ptr: *mut RawObject<PipelineConfigurationVtable>) -> Option<Box<dyn PipelineConfiguration>> {
        // SAFETY: `copyConfiguration` and `copyDefaultConfiguration` return a new reference or null.
        let raw = unsafe { Owned::from_raw(ptr, self.raw.library()) }?;
        Some(Box::new(NativeConfiguration { raw }))
    }
}

impl EnginePipeline for NativePipeline {
    fn set_configuration(&mut self, config: &dyn PipelineConfiguration) -> EngineResult {
        let config = config.native().ok_or(PipelineErrorCode::InvalidArgument)?;
        PipelineErrorCode::check(vcall!(self.raw, set_configuration, config.as_ptr().cast_const()))
    }

    fn copy_configuration(&self) -> Option<Box<dyn PipelineConfiguration>> {
        self.wrap_configuration(vcall!(self.raw, copy_configuration))
    }

    fn copy_default_configuration(&self) -> Option<Box<dyn PipelineConfiguration>> {
        self.wrap_configuration(vcall!(self.raw, copy_default_configuration))
    }

    fn enable_blur_background(&mut self, power: f32) -> EngineResult {
        PipelineErrorCode::check(vcall!(self.raw, enable_blur_background, power))
    }

    fn disable_background_blur(&mut self) {
        vcall!(self.raw, disable_background_blur);
    }

    fn blur_background_state(&self) -> Option<f32> {
        let mut power: c_float = 0.0;
        vcall!(self.raw, get_blur_background_state, ptr::addr_of_mut!(power)).then_some(power)
    }

    fn enable_replace_background(&mut self) -> EngineResult<Box<dyn ReplacementController>> {
        let mut controller: *mut RawObject<ReplacementControllerVtable> = ptr::null_mut();
        PipelineErrorCode::check(vcall!(self.raw, enable_replace_background, ptr::addr_of_mut!(controller)))?;
        // SAFETY: on success the engine hands out a new controller reference.
        let raw = unsafe { Owned::from_raw(controller, self.raw.library()) }
            .ok_or(PipelineErrorCode::ResourceAllocation)?;
        Ok(Box::new(NativeReplacementController { raw }))
    }

    fn disable_replace_background(&mut self) {
        vcall!(self.raw, disable_replace_background);
    }

    fn replace_background_state(&self) -> bool {
        vcall!(self.raw, get_replace_background_state)
    }

    fn enable_denoise_background(&mut self) -> EngineResult {
        PipelineErrorCode::check(vcall!(self.raw, enable_denoise_background))
    }

    fn disable_background_denoise(&mut self) {
        vcall!(self.raw, disable_background_denoise);
    }

    fn denoise_background_state(&self) -> bool {
        vcall!(self.raw, get_denoise_background_state)
    }

    fn set_denoise_power(&mut self, power: f32) {
        vcall!(self.raw, set_denoise_power, power);
    }

    fn denoise_power(&self) -> f32 {
        vcall!(self.raw, get_denoise_power)
    }

    fn set_denoise_with_face(&mut self, with_face: bool) {
        vcall!(self.raw, set_denoise_with_face, with_face);
    }

    fn denoise_with_face(&self) -> bool {
        vcall!(self.raw, get_denoise_with_face)
    }

    fn enable_beautification(&mut self) -> EngineResult {
        PipelineErrorCode::check(vcall!(self.raw, enable_beautification))
    }

    fn disable_beautification(&mut self) {
        vcall!(self.raw, disable_beautification);
    }

    fn set_beautification_level(&mut self, level: f32) {
        vcall!(self.raw, set_beautification_level, level);
    }

    fn beautification_level(&self) -> f32 {
        vcall!(self.raw, get_beautification_level)
    }

    fn enable_color_correction(&mut self) -> EngineResult {
        PipelineErrorCode::check(vcall!(self.raw, enable_color_correction))
    }

    fn enable_color_correction_with_reference(&mut self, reference: &dyn Frame) -> EngineResult {
        let reference = reference.native().ok_or(PipelineErrorCode::InvalidArgument)?;
        PipelineErrorCode::check(vcall!(
            self.raw,
            enable_color_correction_with_reference,
            reference.as_ptr().cast_const()
        ))
    }

    fn enable_color_correction_with_lut_file(&mut self, utf8_path: &CStr) -> EngineResult {
        PipelineErrorCode::check(vcall!(self.raw, enable_color_correction_with_lut_file, utf8_path.as_ptr()))
    }

    fn disable_color_correction(&mut self) {
        vcall!(self.raw, disable_color_correction);
    }

    fn set_color_correction_power(&mut self, power: f32) {
        vcall!(self.raw, set_color_correction_power, power);
    }

    fn enable_smart_zoom(&mut self) -> EngineResult {
        PipelineErrorCode::check(vcall!(self.raw, enable_smart_zoom))
    }

    fn disable_smart_zoom(&mut self) {
        vcall!(self.raw, disable_smart_zoom);
    }

    fn set_smart_zoom_level(&mut self, level: f32) {
        vcall!(self.raw, set_smart_zoom_level, level);
    }

    fn smart_zoom_level(&self) -> f32 {
        vcall!(self.raw, get_smart_zoom_level)
    }

    fn enable_low_light_adjustment(&mut self) -> EngineResult {
        PipelineErrorCode::check(vcall!(self.raw, enable_low_light_adjustment))
    }

    fn disable_low_light_adjustment(&mut self) {
        vcall!(self.raw, disable_low_light_adjustment);
    }

    fn set_low_light_adjustment_power(&mut self, power: f32) {
        vcall!(self.raw, set_low_light_adjustment_power, power);
    }

    fn low_light_adjustment_power(&self) -> f32 {
        vcall!(self.raw, get_low_light_adjustment_power)
    }

    fn enable_sharpening(&mut self) -> EngineResult {
        PipelineErrorCode::check(vcall!(self.raw, enable_sharpening))
    }

    fn disable_sharpening(&mut self) {
        vcall!(self.raw, disable_sharpening);
    }

    fn set_sharpening_power(&mut self, power: f32) {
        vcall!(self.raw, set_sharpening_power, power);
    }

    fn sharpening_power(&self) -> f32 {
        vcall!(self.raw, get_sharpening_power)
    }

    fn process(&mut self, input: &dyn Frame) -> EngineResult<Box<dyn Frame>> {
        let input = input.native().ok_or(PipelineErrorCode::InvalidArgument)?;
        let mut error: c_int = 0;
        let output = vcall!(self.raw, process, input.as_ptr().cast_const(), ptr::addr_of_mut!(error));
        // SAFETY: `process` returns a new frame reference or null.
        match unsafe { Owned::from_raw(output, self.raw.library()) } {
            Some(raw) => Ok(Box::new(NativeFrame {
                raw,
                _borrow: PhantomData,
            })),
            None => Err(PipelineErrorCode::check(error).err().unwrap_or(PipelineErrorCode::Other(0))),
        }
    }
}
