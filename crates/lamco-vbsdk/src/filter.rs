//! Thread-safe facade over the engine
//!
//! [`VideoFilter`] owns one engine pipeline and one frame factory and
//! serializes every call into them behind a single mutex, including
//! `process`. A feature toggle from a control thread therefore never races a
//! frame being processed on the capture thread.
//!
//! # Feature state
//!
//! Blur, denoise and replacement state is read back from the engine. The
//! engine has no getters for the remaining features, so their enabled flags
//! are cached here and updated in the same critical section as the engine
//! call that changes them.
//!
//! Color correction, color grading and color filter share one engine slot:
//! enabling one replaces whichever was active.
//!
//! # Examples
//!
//! ```rust,no_run
//! use lamco_vbsdk::{Backend, VideoFilter};
//!
//! let filter = VideoFilter::new();
//! if !filter.is_valid() {
//!     eprintln!("SDK unavailable");
//!     return Ok(());
//! }
//!
//! filter.set_backend(Backend::Gpu).or_else(|_| filter.set_backend(Backend::Cpu))?;
//! filter.set_background("backgrounds/beach.jpg")?;
//! filter.enable_replacement()?;
//! # Ok::<(), lamco_vbsdk::FilterError>(())
//! ```

use std::ffi::CString;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, trace, warn};

use crate::engine::{
    EngineResult, EnginePipeline, Frame, FrameFactory, PipelineConfiguration, ReplacementController, SdkFactory,
};
use crate::error::{FilterError, Result};
use crate::image::{Image, PixelFormat};
use crate::loader::SdkLibrary;
use crate::types::{Backend, FrameFormat, FrameLock, Preset};

/// Blur strength used when blur is enabled
pub const DEFAULT_BLUR_POWER: f32 = 0.5;

/// Which feature currently owns the engine's color correction slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorMode {
    Correction,
    Grading,
    Filter,
}

/// Everything guarded by the facade mutex
///
/// Field order is drop order: controller and background frames go before
/// the pipeline and factories that created them.
struct EngineState {
    replacement: Option<Box<dyn ReplacementController>>,
    background: Option<Box<dyn Frame>>,
    pipeline: Box<dyn EnginePipeline>,
    frame_factory: Box<dyn FrameFactory>,
    _factory: Box<dyn SdkFactory>,

    beautification: bool,
    smart_zoom: bool,
    low_light: bool,
    sharpening: bool,
    color_mode: Option<ColorMode>,
}

/// Thread-safe wrapper around the engine
///
/// A facade whose engine failed to initialize is permanently invalid:
/// every operation is a no-op that reports [`FilterError::NotInitialized`],
/// `false`, `None` or a default value.
pub struct VideoFilter {
    engine: std::result::Result<Mutex<EngineState>, FilterError>,
}

impl VideoFilter {
    /// Load the SDK with the platform search order and create the engine
    pub fn new() -> Self {
        match SdkLibrary::load() {
            Ok(library) => Self::with_library(&library),
            Err(e) => {
                warn!("Video filter unavailable: {}", e);
                Self { engine: Err(e) }
            }
        }
    }

    /// Create the engine from an already loaded library
    pub fn with_library(library: &SdkLibrary) -> Self {
        match library.create_factory() {
            Ok(factory) => Self::from_factory(factory),
            Err(e) => {
                warn!("Video filter unavailable: {}", e);
                Self { engine: Err(e) }
            }
        }
    }

    /// Create the engine from any factory implementation
    pub fn from_factory(factory: Box<dyn SdkFactory>) -> Self {
        let engine = Self::init(factory);
        match &engine {
            Ok(_) => info!("Video filter initialized"),
            Err(e) => warn!("Video filter unavailable: {}", e),
        }
        Self {
            engine: engine.map(Mutex::new),
        }
    }

    fn init(factory: Box<dyn SdkFactory>) -> Result<EngineState> {
        let frame_factory = factory
            .create_frame_factory()
            .ok_or(FilterError::FactoryCreation("frame factory"))?;
        let pipeline = factory
            .create_pipeline()
            .ok_or(FilterError::FactoryCreation("pipeline"))?;

        Ok(EngineState {
            replacement: None,
            background: None,
            pipeline,
            frame_factory,
            _factory: factory,
            beautification: false,
            smart_zoom: false,
            low_light: false,
            sharpening: false,
            color_mode: None,
        })
    }

    /// Whether the engine initialized successfully
    pub fn is_valid(&self) -> bool {
        self.engine.is_ok()
    }

    /// Why initialization failed, if it did
    pub fn init_error(&self) -> Option<&FilterError> {
        self.engine.as_ref().err()
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineState>> {
        self.engine
            .as_ref()
            .map(Mutex::lock)
            .map_err(|_| FilterError::NotInitialized)
    }

    /// Run a query, falling back to the default on an invalid facade
    fn query<T: Default>(&self, f: impl FnOnce(&EngineState) -> T) -> T {
        self.lock().map(|state| f(&*state)).unwrap_or_default()
    }

    /// Run an infallible engine call; a no-op on an invalid facade
    fn update(&self, f: impl FnOnce(&mut EngineState)) {
        if let Ok(mut state) = self.lock() {
            f(&mut *state);
        }
    }

    /// Run an engine call that the engine may reject
    fn request(&self, feature: &str, f: impl FnOnce(&mut EngineState) -> EngineResult) -> Result<()> {
        let mut state = self.lock()?;
        f(&mut *state).map_err(|code| {
            warn!("Engine rejected {}: {}", feature, code);
            FilterError::Rejected(code)
        })?;
        debug!("Enabled {}", feature);
        Ok(())
    }

    // =========================================================================
    // Backend and preset
    // =========================================================================

    /// Switch the inference backend
    ///
    /// Fails if the engine rejects the combination, for example when an
    /// enabled feature is not available on that backend.
    pub fn set_backend(&self, backend: Backend) -> Result<()> {
        self.reconfigure("backend", |config| config.set_backend(backend))
    }

    /// Current backend, `None` on an invalid facade
    pub fn backend(&self) -> Option<Backend> {
        self.query(|s| s.pipeline.copy_configuration().and_then(|config| config.backend()))
    }

    /// Switch the segmentation preset
    pub fn set_preset(&self, preset: Preset) -> Result<()> {
        self.reconfigure("preset", |config| config.set_segmentation_preset(preset))
    }

    /// Current preset ([`Preset::Quality`] if unknown)
    pub fn preset(&self) -> Preset {
        self.query(|s| {
            s.pipeline
                .copy_configuration()
                .map(|config| config.segmentation_preset())
                .unwrap_or_default()
        })
    }

    /// Copy the engine configuration, mutate it and apply it back
    fn reconfigure(&self, what: &str, mutate: impl FnOnce(&mut dyn PipelineConfiguration)) -> Result<()> {
        let mut state = self.lock()?;
        let mut config = state
            .pipeline
            .copy_configuration()
            .ok_or(FilterError::FactoryCreation("pipeline configuration"))?;
        mutate(config.as_mut());
        state.pipeline.set_configuration(config.as_ref()).map_err(|code| {
            warn!("Engine rejected {} change: {}", what, code);
            FilterError::Rejected(code)
        })?;
        info!("Applied {} change", what);
        Ok(())
    }

    // =========================================================================
    // Processing
    // =========================================================================

    /// Run the enabled features over a BGRA image
    ///
    /// Returns `None` without touching the engine if `image` is not BGRA.
    /// The input is wrapped without copying; the output is copied out of the
    /// engine before its buffer is unlocked.
    pub fn replace_bg(&self, image: &Image) -> Option<Image> {
        if image.format() != PixelFormat::Bgra32 || image.is_empty() {
            return None;
        }

        let mut guard = self.lock().ok()?;
        let state = &mut *guard;
        let input = state
            .frame_factory
            .create_bgra(image.data(), image.stride(), image.width(), image.height())?;

        let output = match state.pipeline.process(input.as_ref()) {
            Ok(output) => output,
            Err(code) => {
                trace!("process produced no frame: {}", code);
                return None;
            }
        };
        copy_frame(output.as_ref())
    }

    // =========================================================================
    // Blur
    // =========================================================================

    /// Enable background blur at [`DEFAULT_BLUR_POWER`]
    pub fn enable_blur(&self) -> Result<()> {
        self.request("blur", |s| s.pipeline.enable_blur_background(DEFAULT_BLUR_POWER))
    }

    pub fn disable_blur(&self) {
        self.update(|s| s.pipeline.disable_background_blur());
    }

    pub fn is_blur_enabled(&self) -> bool {
        self.query(|s| s.pipeline.blur_background_state().is_some())
    }

    /// Blur power reported by the engine, 0 when blur is off
    pub fn blur_power(&self) -> f32 {
        self.query(|s| s.pipeline.blur_background_state().unwrap_or(0.0))
    }

    // =========================================================================
    // Denoise
    // =========================================================================

    pub fn enable_denoise(&self) -> Result<()> {
        self.request("denoise", |s| s.pipeline.enable_denoise_background())
    }

    pub fn disable_denoise(&self) {
        self.update(|s| s.pipeline.disable_background_denoise());
    }

    pub fn is_denoise_enabled(&self) -> bool {
        self.query(|s| s.pipeline.denoise_background_state())
    }

    pub fn set_denoise_power(&self, power: f32) {
        self.update(|s| s.pipeline.set_denoise_power(power));
    }

    pub fn denoise_power(&self) -> f32 {
        self.query(|s| s.pipeline.denoise_power())
    }

    /// Also denoise the face region, not only the background
    pub fn set_denoise_with_face(&self, with_face: bool) {
        self.update(|s| s.pipeline.set_denoise_with_face(with_face));
    }

    pub fn is_denoise_with_face(&self) -> bool {
        self.query(|s| s.pipeline.denoise_with_face())
    }

    // =========================================================================
    // Background replacement
    // =========================================================================

    /// Enable replacement, applying the stored background if there is one
    ///
    /// Enabling while already enabled is a successful no-op.
    pub fn enable_replacement(&self) -> Result<()> {
        self.request("replacement", |s| {
            if s.replacement.is_some() {
                return Ok(());
            }
            let mut controller = s.pipeline.enable_replace_background()?;
            if let Some(background) = &s.background {
                controller.set_background_image(background.as_ref());
            }
            s.replacement = Some(controller);
            Ok(())
        })
    }

    pub fn disable_replacement(&self) {
        self.update(|s| {
            s.pipeline.disable_replace_background();
            s.replacement = None;
        });
    }

    pub fn is_replacement_enabled(&self) -> bool {
        self.query(|s| s.pipeline.replace_background_state())
    }

    /// Load a background image
    ///
    /// Applied immediately when replacement is active, otherwise kept for
    /// the next [`enable_replacement`](Self::enable_replacement). A failed
    /// load leaves the previous background in place.
    pub fn set_background(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let utf8_path = engine_path(path)?;
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let frame = state.frame_factory.load_image(&utf8_path).ok_or_else(|| {
            warn!("Failed to load background {}", path.display());
            FilterError::ImageLoad(path.to_path_buf())
        })?;
        if let Some(controller) = state.replacement.as_mut() {
            controller.set_background_image(frame.as_ref());
        }
        state.background = Some(frame);
        debug!("Background set to {}", path.display());
        Ok(())
    }

    /// Forget the stored background and revert the active one to the default
    pub fn clear_background(&self) {
        self.update(|s| {
            if let Some(controller) = s.replacement.as_mut() {
                controller.clear_background_image();
            }
            s.background = None;
        });
    }

    /// Whether a background image is stored
    pub fn has_background(&self) -> bool {
        self.query(|s| s.background.is_some())
    }

    // =========================================================================
    // Beautification
    // =========================================================================

    pub fn enable_beautification(&self) -> Result<()> {
        self.request("beautification", |s| {
            s.pipeline.enable_beautification()?;
            s.beautification = true;
            Ok(())
        })
    }

    pub fn disable_beautification(&self) {
        self.update(|s| {
            s.pipeline.disable_beautification();
            s.beautification = false;
        });
    }

    pub fn is_beautification_enabled(&self) -> bool {
        self.query(|s| s.beautification)
    }

    pub fn set_beautification_level(&self, level: f32) {
        self.update(|s| s.pipeline.set_beautification_level(level));
    }

    pub fn beautification_level(&self) -> f32 {
        self.query(|s| s.pipeline.beautification_level())
    }

    // =========================================================================
    // Color correction, grading and LUT filter
    // =========================================================================

    /// Automatic color correction
    pub fn enable_color_correction(&self) -> Result<()> {
        self.request("color correction", |s| {
            s.pipeline.enable_color_correction()?;
            s.color_mode = Some(ColorMode::Correction);
            Ok(())
        })
    }

    pub fn disable_color_correction(&self) {
        self.disable_color_mode(ColorMode::Correction);
    }

    pub fn is_color_correction_enabled(&self) -> bool {
        self.query(|s| s.color_mode == Some(ColorMode::Correction))
    }

    pub fn set_color_correction_power(&self, power: f32) {
        self.update(|s| s.pipeline.set_color_correction_power(power));
    }

    /// Match colors to a reference image
    pub fn enable_color_grading(&self, reference: impl AsRef<Path>) -> Result<()> {
        let reference = reference.as_ref();
        let utf8_path = engine_path(reference)?;
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let frame = state.frame_factory.load_image(&utf8_path).ok_or_else(|| {
            warn!("Failed to load grading reference {}", reference.display());
            FilterError::ImageLoad(reference.to_path_buf())
        })?;
        state
            .pipeline
            .enable_color_correction_with_reference(frame.as_ref())
            .map_err(|code| {
                warn!("Engine rejected color grading: {}", code);
                FilterError::Rejected(code)
            })?;
        state.color_mode = Some(ColorMode::Grading);
        debug!("Color grading enabled with {}", reference.display());
        Ok(())
    }

    pub fn disable_color_grading(&self) {
        self.disable_color_mode(ColorMode::Grading);
    }

    pub fn is_color_grading_enabled(&self) -> bool {
        self.query(|s| s.color_mode == Some(ColorMode::Grading))
    }

    pub fn set_color_grading_power(&self, power: f32) {
        self.set_color_correction_power(power);
    }

    /// Apply a `.cube` LUT file
    pub fn enable_color_filter(&self, lut_file: impl AsRef<Path>) -> Result<()> {
        let lut_file = lut_file.as_ref();
        if !lut_file.is_file() {
            warn!("LUT file {} does not exist", lut_file.display());
            return Err(FilterError::ImageLoad(lut_file.to_path_buf()));
        }
        let utf8_path = engine_path(lut_file)?;
        self.request("color filter", |s| {
            s.pipeline.enable_color_correction_with_lut_file(&utf8_path)?;
            s.color_mode = Some(ColorMode::Filter);
            Ok(())
        })
    }

    pub fn disable_color_filter(&self) {
        self.disable_color_mode(ColorMode::Filter);
    }

    pub fn is_color_filter_enabled(&self) -> bool {
        self.query(|s| s.color_mode == Some(ColorMode::Filter))
    }

    pub fn set_color_filter_power(&self, power: f32) {
        self.set_color_correction_power(power);
    }

    /// Turn off the shared slot only if `mode` is the one holding it
    fn disable_color_mode(&self, mode: ColorMode) {
        self.update(|s| {
            if s.color_mode == Some(mode) {
                s.pipeline.disable_color_correction();
                s.color_mode = None;
            }
        });
    }

    // =========================================================================
    // Smart zoom
    // =========================================================================

    pub fn enable_smart_zoom(&self) -> Result<()> {
        self.request("smart zoom", |s| {
            s.pipeline.enable_smart_zoom()?;
            s.smart_zoom = true;
            Ok(())
        })
    }

    pub fn disable_smart_zoom(&self) {
        self.update(|s| {
            s.pipeline.disable_smart_zoom();
            s.smart_zoom = false;
        });
    }

    pub fn is_smart_zoom_enabled(&self) -> bool {
        self.query(|s| s.smart_zoom)
    }

    pub fn set_smart_zoom_level(&self, level: f32) {
        self.update(|s| s.pipeline.set_smart_zoom_level(level));
    }

    pub fn smart_zoom_level(&self) -> f32 {
        self.query(|s| s.pipeline.smart_zoom_level())
    }

    // =========================================================================
    // Low light adjustment
    // =========================================================================

    pub fn enable_low_light_adjustment(&self) -> Result<()> {
        self.request("low light adjustment", |s| {
            s.pipeline.enable_low_light_adjustment()?;
            s.low_light = true;
            Ok(())
        })
    }

    pub fn disable_low_light_adjustment(&self) {
        self.update(|s| {
            s.pipeline.disable_low_light_adjustment();
            s.low_light = false;
        });
    }

    pub fn is_low_light_adjustment_enabled(&self) -> bool {
        self.query(|s| s.low_light)
    }

    pub fn set_low_light_adjustment_power(&self, power: f32) {
        self.update(|s| s.pipeline.set_low_light_adjustment_power(power));
    }

    pub fn low_light_adjustment_power(&self) -> f32 {
        self.query(|s| s.pipeline.low_light_adjustment_power())
    }

    // =========================================================================
    // Sharpening
    // =========================================================================

    pub fn enable_sharpening(&self) -> Result<()> {
        self.request("sharpening", |s| {
            s.pipeline.enable_sharpening()?;
            s.sharpening = true;
            Ok(())
        })
    }

    pub fn disable_sharpening(&self) {
        self.update(|s| {
            s.pipeline.disable_sharpening();
            s.sharpening = false;
        });
    }

    pub fn is_sharpening_enabled(&self) -> bool {
        self.query(|s| s.sharpening)
    }

    pub fn set_sharpening_power(&self, power: f32) {
        self.update(|s| s.pipeline.set_sharpening_power(power));
    }

    pub fn sharpening_power(&self) -> f32 {
        self.query(|s| s.pipeline.sharpening_power())
    }
}

impl Default for VideoFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VideoFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFilter")
            .field("valid", &self.is_valid())
            .field("init_error", &self.init_error())
            .finish()
    }
}

/// Encode a path the way the engine expects it (UTF-8, NUL terminated)
fn engine_path(path: &Path) -> Result<CString> {
    path.to_str()
        .and_then(|s| CString::new(s).ok())
        .ok_or_else(|| FilterError::InvalidPath(PathBuf::from(path)))
}

/// Copy plane 0 of a packed engine frame into an owned image
fn copy_frame(frame: &dyn Frame) -> Option<Image> {
    let format = match frame.format()? {
        FrameFormat::Bgra32 => PixelFormat::Bgra32,
        FrameFormat::Rgba32 => PixelFormat::Rgba32,
        FrameFormat::Nv12 => return None,
    };
    let locked = frame.lock(FrameLock::Read)?;
    let stride = locked.bytes_per_line(0);
    let data = locked.plane(0)?;
    Image::copy_from(frame.width(), frame.height(), stride, format, data).ok()
}
