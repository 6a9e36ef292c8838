//! In-process engine for tests and demos
//!
//! [`FakeSdk`] implements every capability trait without the vendor
//! library. It does no segmentation: blur halves every channel, every other
//! feature copies the input through. It records enough to assert on what
//! the facade did: `process` calls, the background applied to the active
//! replacement controller, live object count and the highest number of
//! concurrent engine calls ever observed.
//!
//! ```rust
//! use lamco_vbsdk::fake::FakeSdk;
//! use lamco_vbsdk::VideoFilter;
//!
//! let sdk = FakeSdk::new();
//! let filter = VideoFilter::from_factory(sdk.factory());
//! assert!(filter.is_valid());
//! filter.enable_blur().unwrap();
//! ```

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::ffi::{c_void, CStr};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::{
    EngineResult, EnginePipeline, Frame, FrameFactory, LockedFrameData, PipelineConfiguration, ReplacementController,
    SdkFactory,
};
use crate::types::{Backend, FrameFormat, FrameLock, PipelineErrorCode, Preset};

/// Knobs and recordings shared by every object of one fake SDK
#[derive(Default)]
struct Shared {
    state: Mutex<Recorded>,
    live_objects: AtomicUsize,
    process_calls: AtomicUsize,
    replacement_enables: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[derive(Default)]
struct Recorded {
    rejected_features: HashSet<&'static str>,
    rejected_backends: HashSet<Backend>,
    fail_pipeline: bool,
    fail_frame_factory: bool,
    applied_background: Option<PathBuf>,
    loaded_images: HashMap<usize, PathBuf>,
}

/// Counts live fake objects
struct Live(Arc<Shared>);

impl Live {
    fn new(shared: &Arc<Shared>) -> Self {
        shared.live_objects.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(shared))
    }
}

impl Drop for Live {
    fn drop(&mut self) {
        self.0.live_objects.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Marks one engine call in flight
struct InFlight(Arc<Shared>);

impl InFlight {
    fn enter(shared: &Arc<Shared>) -> Self {
        let now = shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        shared.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(Arc::clone(shared))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Handle to a fake SDK; clones share state
#[derive(Clone, Default)]
pub struct FakeSdk {
    shared: Arc<Shared>,
}

impl FakeSdk {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory to hand to [`crate::VideoFilter::from_factory`]
    pub fn factory(&self) -> Box<dyn SdkFactory> {
        Box::new(FakeFactory {
            live: Live::new(&self.shared),
        })
    }

    /// Make `create_pipeline` return nothing
    pub fn fail_pipeline_creation(&self) {
        self.shared.state.lock().fail_pipeline = true;
    }

    /// Make `create_frame_factory` return nothing
    pub fn fail_frame_factory_creation(&self) {
        self.shared.state.lock().fail_frame_factory = true;
    }

    /// Reject enabling a feature
    ///
    /// Names: `blur`, `denoise`, `replacement`, `beautification`,
    /// `color_correction`, `smart_zoom`, `low_light`, `sharpening`.
    pub fn reject_feature(&self, feature: &'static str) {
        self.shared.state.lock().rejected_features.insert(feature);
    }

    /// Allow a previously rejected feature again
    pub fn allow_feature(&self, feature: &'static str) {
        self.shared.state.lock().rejected_features.remove(feature);
    }

    /// Reject configurations selecting `backend`
    pub fn reject_backend(&self, backend: Backend) {
        self.shared.state.lock().rejected_backends.insert(backend);
    }

    /// Number of `process` calls so far
    pub fn process_calls(&self) -> usize {
        self.shared.process_calls.load(Ordering::SeqCst)
    }

    /// Number of successful `enable_replace_background` calls
    pub fn replacement_enables(&self) -> usize {
        self.shared.replacement_enables.load(Ordering::SeqCst)
    }

    /// File the active replacement controller is showing
    pub fn applied_background(&self) -> Option<PathBuf> {
        self.shared.state.lock().applied_background.clone()
    }

    /// Fake objects not yet released
    pub fn live_objects(&self) -> usize {
        self.shared.live_objects.load(Ordering::SeqCst)
    }

    /// Highest number of pipeline calls that ever overlapped
    pub fn max_concurrent_calls(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }

    fn rejects(shared: &Shared, feature: &'static str) -> EngineResult {
        if shared.state.lock().rejected_features.contains(feature) {
            Err(PipelineErrorCode::EngineInitialization)
        } else {
            Ok(())
        }
    }
}

struct FakeFactory {
    live: Live,
}

impl SdkFactory for FakeFactory {
    fn create_frame_factory(&self) -> Option<Box<dyn FrameFactory>> {
        let shared = &self.live.0;
        if shared.state.lock().fail_frame_factory {
            return None;
        }
        Some(Box::new(FakeFrameFactory {
            live: Live::new(shared),
        }))
    }

    fn create_pipeline(&self) -> Option<Box<dyn EnginePipeline>> {
        let shared = &self.live.0;
        if shared.state.lock().fail_pipeline {
            return None;
        }
        Some(Box::new(FakePipeline::new(shared)))
    }
}

struct FakeFrameFactory {
    live: Live,
}

impl FrameFactory for FakeFrameFactory {
    fn create_bgra<'a>(&self, data: &'a [u8], stride: usize, width: u32, height: u32) -> Option<Box<dyn Frame + 'a>> {
        if data.len() < stride * height as usize {
            return None;
        }
        Some(Box::new(FakeFrame {
            format: FrameFormat::Bgra32,
            width,
            height,
            strides: [stride, 0],
            planes: [Cow::Borrowed(data), Cow::Borrowed(&[])],
            loaded: None,
            live: Live::new(&self.live.0),
        }))
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
        if y_plane.len() < y_stride * height as usize || uv_plane.len() < uv_stride * uv_rows {
            return None;
        }
        Some(Box::new(FakeFrame {
            format: FrameFormat::Nv12,
            width,
            height,
            strides: [y_stride, uv_stride],
            planes: [Cow::Borrowed(y_plane), Cow::Borrowed(uv_plane)],
            loaded: None,
            live: Live::new(&self.live.0),
        }))
    }

    fn load_image(&self, utf8_path: &CStr) -> Option<Box<dyn Frame>> {
        let path = Path::new(utf8_path.to_str().ok()?);
        if !path.is_file() {
            return None;
        }
        let shared = &self.live.0;
        let marker = Box::new(0u8);
        let key = std::ptr::addr_of!(*marker) as usize;
        shared.state.lock().loaded_images.insert(key, path.to_path_buf());

        Some(Box::new(FakeFrame {
            format: FrameFormat::Bgra32,
            width: 1,
            height: 1,
            strides: [4, 0],
            planes: [Cow::Owned(vec![0, 0, 0, 255]), Cow::Borrowed(&[])],
            loaded: Some(marker),
            live: Live::new(shared),
        }))
    }
}

struct FakeFrame<'a> {
    format: FrameFormat,
    width: u32,
    height: u32,
    strides: [usize; 2],
    planes: [Cow<'a, [u8]>; 2],
    /// Identity of a frame loaded from a file
    loaded: Option<Box<u8>>,
    live: Live,
}

impl Frame for FakeFrame<'_> {
    fn format(&self) -> Option<FrameFormat> {
        Some(self.format)
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn lock(&self, _mode: FrameLock) -> Option<Box<dyn LockedFrameData + '_>> {
        Some(Box::new(FakeLocked { frame: self }))
    }

    fn native(&self) -> Option<NonNull<c_void>> {
        self.loaded.as_deref().map(|marker| NonNull::from(marker).cast())
    }
}

impl Drop for FakeFrame<'_> {
    fn drop(&mut self) {
        if let Some(marker) = self.loaded.as_deref() {
            let key = std::ptr::addr_of!(*marker) as usize;
            self.live.0.state.lock().loaded_images.remove(&key);
        }
    }
}

struct FakeLocked<'f> {
    frame: &'f FakeFrame<'f>,
}

impl LockedFrameData for FakeLocked<'_> {
    fn bytes_per_line(&self, plane: usize) -> usize {
        self.frame.strides.get(plane).copied().unwrap_or(0)
    }

    fn plane(&self, plane: usize) -> Option<&[u8]> {
        self.frame.planes.get(plane).map(AsRef::as_ref).filter(|data| !data.is_empty())
    }
}

struct FakeConfiguration {
    backend: Backend,
    preset: Preset,
    _live: Live,
}

impl PipelineConfiguration for FakeConfiguration {
    fn set_backend(&mut self, backend: Backend) {
        self.backend = backend;
    }

    fn backend(&self) -> Option<Backend> {
        Some(self.backend)
    }

    fn set_segmentation_preset(&mut self, preset: Preset) {
        self.preset = preset;
    }

    fn segmentation_preset(&self) -> Preset {
        self.preset
    }
}

struct FakeController {
    live: Live,
}

impl ReplacementController for FakeController {
    fn set_background_image(&mut self, image: &dyn Frame) {
        let mut state = self.live.0.state.lock();
        let path = image
            .native()
            .and_then(|ptr| state.loaded_images.get(&(ptr.as_ptr() as usize)).cloned());
        state.applied_background = path;
    }

    fn clear_background_image(&mut self) {
        self.live.0.state.lock().applied_background = None;
    }
}

struct FakePipeline {
    live: Live,
    backend: Backend,
    preset: Preset,
    blur: Option<f32>,
    replace: bool,
    denoise: bool,
    denoise_power: f32,
    denoise_with_face: bool,
    beautification: bool,
    beautification_level: f32,
    color_correction: bool,
    color_power: f32,
    smart_zoom: bool,
    smart_zoom_level: f32,
    low_light: bool,
    low_light_power: f32,
    sharpening: bool,
    sharpening_power: f32,
}

impl FakePipeline {
    fn new(shared: &Arc<Shared>) -> Self {
        Self {
            live: Live::new(shared),
            backend: Backend::Gpu,
            preset: Preset::Quality,
            blur: None,
            replace: false,
            denoise: false,
            denoise_power: 0.0,
            denoise_with_face: false,
            beautification: false,
            beautification_level: 0.0,
            color_correction: false,
            color_power: 0.0,
            smart_zoom: false,
            smart_zoom_level: 0.0,
            low_light: false,
            low_light_power: 0.0,
            sharpening: false,
            sharpening_power: 0.0,
        }
    }

    fn shared(&self) -> &Shared {
        &self.live.0
    }

    fn enable(&mut self, feature: &'static str, set: impl FnOnce(&mut Self)) -> EngineResult {
        let _call = InFlight::enter(&self.live.0);
        FakeSdk::rejects(&self.live.0, feature)?;
        set(self);
        Ok(())
    }

    fn any_feature(&self) -> bool {
        self.blur.is_some()
            || self.replace
            || self.denoise
            || self.beautification
            || self.color_correction
            || self.smart_zoom
            || self.low_light
            || self.sharpening
    }

    fn configuration(&self) -> Box<dyn PipelineConfiguration> {
        Box::new(FakeConfiguration {
            backend: self.backend,
            preset: self.preset,
            _live: Live::new(&self.live.0),
        })
    }
}

impl EnginePipeline for FakePipeline {
    fn set_configuration(&mut self, config: &dyn PipelineConfiguration) -> EngineResult {
        let _call = InFlight::enter(&self.live.0);
        let backend = config.backend().ok_or(PipelineErrorCode::InvalidArgument)?;
        if self.shared().state.lock().rejected_backends.contains(&backend) {
            return Err(PipelineErrorCode::EngineInitialization);
        }
        self.backend = backend;
        self.preset = config.segmentation_preset();
        Ok(())
    }

    fn copy_configuration(&self) -> Option<Box<dyn PipelineConfiguration>> {
        Some(self.configuration())
    }

    fn copy_default_configuration(&self) -> Option<Box<dyn PipelineConfiguration>> {
        Some(Box::new(FakeConfiguration {
            backend: Backend::Gpu,
            preset: Preset::Quality,
            _live: Live::new(&self.live.0),
        }))
    }

    fn enable_blur_background(&mut self, power: f32) -> EngineResult {
        self.enable("blur", |p| p.blur = Some(power))
    }

    fn disable_background_blur(&mut self) {
        self.blur = None;
    }

    fn blur_background_state(&self) -> Option<f32> {
        self.blur
    }

    fn enable_replace_background(&mut self) -> EngineResult<Box<dyn ReplacementController>> {
        self.enable("replacement", |p| p.replace = true)?;
        self.shared().replacement_enables.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeController {
            live: Live::new(&self.live.0),
        }))
    }

    fn disable_replace_background(&mut self) {
        self.replace = false;
        self.shared().state.lock().applied_background = None;
    }

    fn replace_background_state(&self) -> bool {
        self.replace
    }

    fn enable_denoise_background(&mut self) -> EngineResult {
        self.enable("denoise", |p| p.denoise = true)
    }

    fn disable_background_denoise(&mut self) {
        self.denoise = false;
    }

    fn denoise_background_state(&self) -> bool {
        self.denoise
    }

    fn set_denoise_power(&mut self, power: f32) {
        self.denoise_power = power;
    }

    fn denoise_power(&self) -> f32 {
        self.denoise_power
    }

    fn set_denoise_with_face(&mut self, with_face: bool) {
        self.denoise_with_face = with_face;
    }

    fn denoise_with_face(&self) -> bool {
        self.denoise_with_face
    }

    fn enable_beautification(&mut self) -> EngineResult {
        self.enable("beautification", |p| p.beautification = true)
    }

    fn disable_beautification(&mut self) {
        self.beautification = false;
    }

    fn set_beautification_level(&mut self, level: f32) {
        self.beautification_level = level;
    }

    fn beautification_level(&self) -> f32 {
        self.beautification_level
    }

    fn enable_color_correction(&mut self) -> EngineResult {
        self.enable("color_correction", |p| p.color_correction = true)
    }

    fn enable_color_correction_with_reference(&mut self, reference: &dyn Frame) -> EngineResult {
        if reference.width() == 0 || reference.height() == 0 {
            return Err(PipelineErrorCode::InvalidArgument);
        }
        self.enable("color_correction", |p| p.color_correction = true)
    }

    fn enable_color_correction_with_lut_file(&mut self, utf8_path: &CStr) -> EngineResult {
        let exists = utf8_path.to_str().map(|p| Path::new(p).is_file()).unwrap_or(false);
        if !exists {
            return Err(PipelineErrorCode::InvalidArgument);
        }
        self.enable("color_correction", |p| p.color_correction = true)
    }

    fn disable_color_correction(&mut self) {
        self.color_correction = false;
    }

    fn set_color_correction_power(&mut self, power: f32) {
        self.color_power = power;
    }

    fn enable_smart_zoom(&mut self) -> EngineResult {
        self.enable("smart_zoom", |p| p.smart_zoom = true)
    }

    fn disable_smart_zoom(&mut self) {
        self.smart_zoom = false;
    }

    fn set_smart_zoom_level(&mut self, level: f32) {
        self.smart_zoom_level = level;
    }

    fn smart_zoom_level(&self) -> f32 {
        self.smart_zoom_level
    }

    fn enable_low_light_adjustment(&mut self) -> EngineResult {
        self.enable("low_light", |p| p.low_light = true)
    }

    fn disable_low_light_adjustment(&mut self) {
        self.low_light = false;
    }

    fn set_low_light_adjustment_power(&mut self, power: f32) {
        self.low_light_power = power;
    }

    fn low_light_adjustment_power(&self) -> f32 {
        self.low_light_power
    }

    fn enable_sharpening(&mut self) -> EngineResult {
        self.enable("sharpening", |p| p.sharpening = true)
    }

    fn disable_sharpening(&mut self) {
        self.sharpening = false;
    }

    fn set_sharpening_power(&mut self, power: f32) {
        self.sharpening_power = power;
    }

    fn sharpening_power(&self) -> f32 {
        self.sharpening_power
    }

    fn process(&mut self, input: &dyn Frame) -> EngineResult<Box<dyn Frame>> {
        let _call = InFlight::enter(&self.live.0);
        self.shared().process_calls.fetch_add(1, Ordering::SeqCst);

        if !self.any_feature() {
            return Err(PipelineErrorCode::NoFeaturesEnabled);
        }
        if input.format() != Some(FrameFormat::Bgra32) {
            return Err(PipelineErrorCode::InvalidArgument);
        }

        let locked = input.lock(FrameLock::Read).ok_or(PipelineErrorCode::InvalidArgument)?;
        let stride = locked.bytes_per_line(0);
        let rows = input.height() as usize;
        let mut data = locked
            .plane(0)
            .and_then(|plane| plane.get(..stride * rows))
            .ok_or(PipelineErrorCode::InvalidArgument)?
            .to_vec();
        if self.blur.is_some() {
            data.iter_mut().for_each(|b| *b /= 2);
        }

        Ok(Box::new(FakeFrame {
            format: FrameFormat::Bgra32,
            width: input.width(),
            height: input.height(),
            strides: [stride, 0],
            planes: [Cow::Owned(data), Cow::Borrowed(&[])],
            loaded: None,
            live: Live::new(&self.live.0),
        }))
    }
}
