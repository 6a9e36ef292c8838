//! Persisted filter settings
//!
//! [`FilterProfile`] is a typed record of everything an application stores
//! between sessions: camera choice and resolution, engine backend and
//! preset, each feature's on/off state and strength, and the resource paths
//! the features load. Storage format is the application's business; this
//! module only applies a profile to a running pipeline and reads one back.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use lamco_capture::{CapturePipeline, ColorCorrectionMode, FilterProfile};
//! # fn demo(pipeline: &CapturePipeline) -> lamco_capture::Result<()> {
//! let profile = FilterProfile {
//!     camera_name: Some("Integrated Camera".into()),
//!     blur: true,
//!     replacement: false,
//!     color_correction: Some(ColorCorrectionMode::Auto),
//!     ..Default::default()
//! };
//! profile.apply(pipeline, pipeline.provider())?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use lamco_vbsdk::{Backend, Preset, VideoFilter};
use tracing::{debug, info, warn};

use crate::error::{CaptureError, Result};
use crate::pipeline::CapturePipeline;
use crate::source::{find_device_by_name, FrameSize, SourceProvider};

/// Directory holding the bundled `.cube` LUT files
pub const COLOR_LUTS_DIR: &str = "color_luts";

/// Number of bundled LUT files, named `Filter 1.cube` to `Filter 20.cube`
pub const COLOR_LUT_COUNT: usize = 20;

/// Background image shipped alongside the application
pub const DEFAULT_BACKGROUND_FILE: &str = "background.jpg";

/// Which use of the shared color-correction slot to restore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorCorrectionMode {
    /// Automatic color correction
    Auto,
    /// LUT file from [`FilterProfile::color_filter_file`]
    Filter,
    /// Reference image from [`FilterProfile::color_grading_reference`]
    Grading,
}

impl ColorCorrectionMode {
    /// Stable identifier for storage
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "color_correction_mode_auto",
            Self::Filter => "color_correction_mode_filter",
            Self::Grading => "color_correction_mode_grading",
        }
    }
}

impl fmt::Display for ColorCorrectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorCorrectionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "color_correction_mode_auto" | "auto" => Ok(Self::Auto),
            "color_correction_mode_filter" | "filter" => Ok(Self::Filter),
            "color_correction_mode_grading" | "grading" => Ok(Self::Grading),
            other => Err(format!("unknown color correction mode '{other}'")),
        }
    }
}

/// Stored filter and camera settings
///
/// Strength fields set to `None` keep whatever the engine currently uses.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterProfile {
    /// Camera to select by display name
    pub camera_name: Option<String>,
    /// Requested resolution; non-positive values mean 1280x720
    pub camera_scale: (i32, i32),
    /// Preferred backend; the other one is tried if this is rejected
    pub backend: Backend,
    /// Processing preset
    pub preset: Option<Preset>,

    pub blur: bool,
    pub replacement: bool,
    /// Background image for replacement
    pub background: Option<PathBuf>,

    pub beautification: bool,
    pub beautification_level: Option<f32>,

    pub denoise: bool,
    pub denoise_level: Option<f32>,
    pub denoise_with_face: bool,

    pub smart_zoom: bool,
    pub zoom_level: Option<f32>,

    pub low_light: bool,
    pub low_light_power: Option<f32>,

    pub sharpening: bool,
    pub sharpening_power: Option<f32>,

    /// Active use of the color slot, if any
    pub color_correction: Option<ColorCorrectionMode>,
    /// Strength of whichever color mode is active
    pub color_power: Option<f32>,
    /// Reference image for grading
    pub color_grading_reference: Option<PathBuf>,
    /// LUT for the color filter: a path, or a bare file name looked up in
    /// [`color_lut_search_paths`]
    pub color_filter_file: Option<PathBuf>,
}

impl Default for FilterProfile {
    fn default() -> Self {
        Self {
            camera_name: None,
            camera_scale: (FrameSize::HD_720.width as i32, FrameSize::HD_720.height as i32),
            backend: Backend::Gpu,
            preset: None,
            blur: false,
            replacement: true,
            background: default_background_path(),
            beautification: false,
            beautification_level: None,
            denoise: false,
            denoise_level: None,
            denoise_with_face: false,
            smart_zoom: false,
            zoom_level: None,
            low_light: false,
            low_light_power: None,
            sharpening: false,
            sharpening_power: None,
            color_correction: None,
            color_power: None,
            color_grading_reference: None,
            color_filter_file: None,
        }
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Enable or disable a feature, logging a rejected enable
fn toggle(name: &str, on: bool, enable: impl FnOnce() -> lamco_vbsdk::Result<()>, disable: impl FnOnce()) {
    if on {
        if let Err(e) = enable() {
            warn!("Could not enable {}: {}", name, e);
        }
    } else {
        disable();
    }
}

impl FilterProfile {
    /// Apply the profile to `pipeline`
    ///
    /// Fails only when the filter is unusable or neither backend is
    /// accepted. Individual feature or resource failures are logged and
    /// the rest of the profile is still applied.
    pub fn apply(&self, pipeline: &CapturePipeline, provider: &dyn SourceProvider) -> Result<()> {
        let filter = pipeline.video_filter();
        if !filter.is_valid() {
            return Err(CaptureError::FilterUnavailable);
        }

        if let Some(preset) = self.preset {
            if filter.preset() != preset {
                if let Err(e) = filter.set_preset(preset) {
                    warn!("Could not apply preset {}: {}", preset, e);
                }
            }
        }

        self.apply_backend(filter)?;

        if let Some(name) = &self.camera_name {
            match find_device_by_name(provider, name) {
                Ok(selector) => pipeline.set_source(selector, pipeline.frame_size()),
                Err(e) => warn!("{}", e),
            }
        }
        pipeline.set_frame_size(self.frame_size());

        toggle("blur", self.blur, || filter.enable_blur(), || filter.disable_blur());
        toggle(
            "replacement",
            self.replacement,
            || filter.enable_replacement(),
            || filter.disable_replacement(),
        );
        toggle(
            "beautification",
            self.beautification,
            || filter.enable_beautification(),
            || filter.disable_beautification(),
        );
        toggle("denoise", self.denoise, || filter.enable_denoise(), || filter.disable_denoise());
        toggle(
            "smart zoom",
            self.smart_zoom,
            || filter.enable_smart_zoom(),
            || filter.disable_smart_zoom(),
        );
        toggle(
            "low light adjustment",
            self.low_light,
            || filter.enable_low_light_adjustment(),
            || filter.disable_low_light_adjustment(),
        );
        toggle(
            "sharpening",
            self.sharpening,
            || filter.enable_sharpening(),
            || filter.disable_sharpening(),
        );

        if let Some(background) = &self.background {
            if let Err(e) = filter.set_background(background) {
                warn!("Keeping previous background: {}", e);
            }
        }

        if let Some(level) = self.beautification_level {
            filter.set_beautification_level(clamp_unit(level));
        }
        if let Some(level) = self.denoise_level {
            filter.set_denoise_power(clamp_unit(level));
        }
        filter.set_denoise_with_face(self.denoise_with_face);
        if let Some(level) = self.zoom_level {
            filter.set_smart_zoom_level(clamp_unit(level));
        }
        if let Some(power) = self.low_light_power {
            filter.set_low_light_adjustment_power(clamp_unit(power));
        }
        if let Some(power) = self.sharpening_power {
            filter.set_sharpening_power(clamp_unit(power));
        }

        self.apply_color_correction(filter);

        info!("Filter profile applied");
        Ok(())
    }

    /// Resolution this profile asks for
    pub fn frame_size(&self) -> FrameSize {
        FrameSize::from_signed_or_default(self.camera_scale.0, self.camera_scale.1)
    }

    fn apply_backend(&self, filter: &VideoFilter) -> Result<()> {
        let preferred = self.backend;
        match filter.set_backend(preferred) {
            Ok(()) => Ok(()),
            Err(first) => {
                let fallback = preferred.fallback();
                warn!("{} backend rejected ({}), trying {}", preferred, first, fallback);
                filter.set_backend(fallback).map_err(|e| {
                    warn!("{} backend rejected too: {}", fallback, e);
                    CaptureError::Filter(e)
                })
            }
        }
    }

    fn apply_color_correction(&self, filter: &VideoFilter) {
        let result = match self.color_correction {
            None => {
                filter.disable_color_correction();
                filter.disable_color_grading();
                filter.disable_color_filter();
                return;
            }
            Some(ColorCorrectionMode::Auto) => filter.enable_color_correction(),
            Some(ColorCorrectionMode::Filter) => {
                let lut = self.color_filter_file.as_deref().and_then(resolve_color_lut);
                match lut {
                    Some(path) => filter.enable_color_filter(path),
                    None => {
                        warn!(
                            "Color filter {:?} not found in {:?}",
                            self.color_filter_file,
                            color_lut_search_paths()
                        );
                        return;
                    }
                }
            }
            Some(ColorCorrectionMode::Grading) => match &self.color_grading_reference {
                Some(reference) if reference.is_file() => filter.enable_color_grading(reference),
                _ => {
                    warn!("Color grading reference {:?} is missing", self.color_grading_reference);
                    return;
                }
            },
        };

        match result {
            Ok(()) => {
                if let Some(power) = self.color_power {
                    filter.set_color_correction_power(clamp_unit(power));
                }
                debug!("Restored {}", self.color_correction.map_or("", ColorCorrectionMode::as_str));
            }
            Err(e) => warn!("Could not restore color correction: {}", e),
        }
    }

    /// Read the profile back from a filter and pipeline
    ///
    /// Resource paths, the camera name and the color power are not
    /// observable through the filter and are carried over from `base`.
    pub fn capture(base: &Self, pipeline: &CapturePipeline) -> Self {
        let filter = pipeline.video_filter();
        let size = pipeline.frame_size();

        let color_correction = if filter.is_color_correction_enabled() {
            Some(ColorCorrectionMode::Auto)
        } else if filter.is_color_filter_enabled() {
            Some(ColorCorrectionMode::Filter)
        } else if filter.is_color_grading_enabled() {
            Some(ColorCorrectionMode::Grading)
        } else {
            None
        };

        Self {
            camera_scale: (size.width as i32, size.height as i32),
            backend: filter.backend().unwrap_or(base.backend),
            preset: Some(filter.preset()),
            blur: filter.is_blur_enabled(),
            replacement: filter.is_replacement_enabled(),
            beautification: filter.is_beautification_enabled(),
            beautification_level: Some(filter.beautification_level()),
            denoise: filter.is_denoise_enabled(),
            denoise_level: Some(filter.denoise_power()),
            denoise_with_face: filter.is_denoise_with_face(),
            smart_zoom: filter.is_smart_zoom_enabled(),
            zoom_level: Some(filter.smart_zoom_level()),
            low_light: filter.is_low_light_adjustment_enabled(),
            low_light_power: Some(filter.low_light_adjustment_power()),
            sharpening: filter.is_sharpening_enabled(),
            sharpening_power: Some(filter.sharpening_power()),
            color_correction,
            ..base.clone()
        }
    }
}

/// Features that only run on the GPU backend with the current filter state
///
/// Denoise needs the GPU everywhere; beautification needs it outside
/// Windows.
pub fn gpu_only_features_enabled(filter: &VideoFilter) -> bool {
    filter.is_denoise_enabled() || (!cfg!(target_os = "windows") && filter.is_beautification_enabled())
}

/// Bundled background image location, if the platform has one
pub fn default_background_path() -> Option<PathBuf> {
    resource_dir().map(|dir| dir.join(DEFAULT_BACKGROUND_FILE))
}

/// Directories searched for LUT files, in order
pub fn color_lut_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if cfg!(target_os = "windows") {
        if let Some(dir) = exe_dir() {
            paths.push(dir.join(COLOR_LUTS_DIR));
        }
        if let Ok(cwd) = std::env::current_dir() {
            let candidate = cwd.join(COLOR_LUTS_DIR);
            if !paths.contains(&candidate) {
                paths.push(candidate);
            }
        }
    } else if let Some(dir) = resource_dir() {
        paths.push(dir.join(COLOR_LUTS_DIR));
    }

    paths
}

/// File names of the bundled LUTs
pub fn color_lut_file_names() -> Vec<String> {
    (1..=COLOR_LUT_COUNT).map(|i| format!("Filter {i}.cube")).collect()
}

/// Locate a LUT by file name in [`color_lut_search_paths`]
pub fn find_color_lut(file_name: &str) -> Option<PathBuf> {
    color_lut_search_paths()
        .into_iter()
        .map(|dir| dir.join(file_name))
        .find(|path| path.is_file())
}

fn resolve_color_lut(file: &Path) -> Option<PathBuf> {
    if file.is_file() {
        return Some(file.to_path_buf());
    }
    file.file_name().and_then(|name| name.to_str()).and_then(find_color_lut)
}

fn exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Platform resource directory
///
/// Windows: executable directory. macOS: `<bundle>/Contents/Resources`.
/// Linux: `$APPDIR/usr/share` inside an AppImage, else `<exe>/../share`.
fn resource_dir() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        return exe_dir();
    }
    if cfg!(target_os = "macos") {
        return exe_dir().and_then(|d| d.parent().map(|c| c.join("Resources")));
    }

    if let Some(appdir) = std::env::var_os("APPDIR") {
        let share = PathBuf::from(appdir).join("usr").join("share");
        if share.is_dir() {
            return Some(share);
        }
    }
    exe_dir().and_then(|d| d.parent().map(|p| p.join("share")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lamco_vbsdk::fake::FakeSdk;

    use super::*;
    use crate::config::PipelineConfig;
    use crate::source::{DeviceInfo, SourceSelector, VideoSource};

    struct Cameras;

    impl SourceProvider for Cameras {
        fn open(&self, selector: &SourceSelector, _size: FrameSize) -> Result<Box<dyn VideoSource>> {
            Err(CaptureError::device_open(selector, "test provider"))
        }

        fn devices(&self) -> Vec<DeviceInfo> {
            vec![
                DeviceInfo {
                    index: 0,
                    name: "Front".into(),
                    path: Some(PathBuf::from("/dev/video0")),
                },
                DeviceInfo {
                    index: 1,
                    name: "Back".into(),
                    path: Some(PathBuf::from("/dev/video2")),
                },
            ]
        }
    }

    fn pipeline_with(sdk: &FakeSdk) -> CapturePipeline {
        CapturePipeline::new(
            PipelineConfig::default(),
            Arc::new(Cameras),
            Arc::new(VideoFilter::from_factory(sdk.factory())),
        )
        .unwrap()
    }

    fn bare() -> FilterProfile {
        FilterProfile {
            background: None,
            replacement: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_filter_is_refused() {
        let sdk = FakeSdk::new();
        sdk.fail_pipeline_creation();
        let pipeline = pipeline_with(&sdk);

        let err = bare().apply(&pipeline, &Cameras).unwrap_err();
        assert!(matches!(err, CaptureError::FilterUnavailable));
    }

    #[test]
    fn test_features_and_clamped_powers() {
        let sdk = FakeSdk::new();
        let pipeline = pipeline_with(&sdk);
        let profile = FilterProfile {
            blur: true,
            sharpening: true,
            sharpening_power: Some(3.5),
            low_light_power: Some(-1.0),
            zoom_level: Some(0.25),
            ..bare()
        };

        profile.apply(&pipeline, &Cameras).unwrap();

        let filter = pipeline.video_filter();
        assert!(filter.is_blur_enabled());
        assert!(filter.is_sharpening_enabled());
        assert!(!filter.is_replacement_enabled());
        assert_eq!(filter.sharpening_power(), 1.0);
        assert_eq!(filter.low_light_adjustment_power(), 0.0);
        assert_eq!(filter.smart_zoom_level(), 0.25);
    }

    #[test]
    fn test_backend_falls_back() {
        let sdk = FakeSdk::new();
        sdk.reject_backend(Backend::Gpu);
        let pipeline = pipeline_with(&sdk);

        bare().apply(&pipeline, &Cameras).unwrap();
        assert_eq!(pipeline.video_filter().backend(), Some(Backend::Cpu));
    }

    #[test]
    fn test_both_backends_rejected_is_an_error() {
        let sdk = FakeSdk::new();
        sdk.reject_backend(Backend::Gpu);
        sdk.reject_backend(Backend::Cpu);
        let pipeline = pipeline_with(&sdk);

        let err = bare().apply(&pipeline, &Cameras).unwrap_err();
        assert!(matches!(err, CaptureError::Filter(_)));
    }

    #[test]
    fn test_camera_and_scale_selection() {
        let sdk = FakeSdk::new();
        let pipeline = pipeline_with(&sdk);
        let profile = FilterProfile {
            camera_name: Some("Back".into()),
            camera_scale: (640, 480),
            ..bare()
        };

        profile.apply(&pipeline, &Cameras).unwrap();
        assert_eq!(pipeline.source_selector(), SourceSelector::Path(PathBuf::from("/dev/video2")));
        assert_eq!(pipeline.frame_size(), FrameSize::new(640, 480));

        // Unknown camera keeps the selection, bad scale falls back to 720p
        let profile = FilterProfile {
            camera_name: Some("Nope".into()),
            camera_scale: (0, -3),
            ..bare()
        };
        profile.apply(&pipeline, &Cameras).unwrap();
        assert_eq!(pipeline.source_selector(), SourceSelector::Path(PathBuf::from("/dev/video2")));
        assert_eq!(pipeline.frame_size(), FrameSize::HD_720);
    }

    #[test]
    fn test_missing_resources_do_not_fail_apply() {
        let sdk = FakeSdk::new();
        let pipeline = pipeline_with(&sdk);
        let profile = FilterProfile {
            replacement: true,
            background: Some(PathBuf::from("/nonexistent/bg.jpg")),
            color_correction: Some(ColorCorrectionMode::Filter),
            color_filter_file: Some(PathBuf::from("Filter 99.cube")),
            ..bare()
        };

        profile.apply(&pipeline, &Cameras).unwrap();
        let filter = pipeline.video_filter();
        assert!(filter.is_replacement_enabled());
        assert!(!filter.has_background());
        assert!(!filter.is_color_filter_enabled());
    }

    #[test]
    fn test_auto_color_correction_and_capture() {
        let sdk = FakeSdk::new();
        let pipeline = pipeline_with(&sdk);
        let profile = FilterProfile {
            color_correction: Some(ColorCorrectionMode::Auto),
            color_power: Some(0.3),
            denoise: true,
            denoise_with_face: true,
            preset: Some(Preset::Speed),
            ..bare()
        };
        profile.apply(&pipeline, &Cameras).unwrap();

        let captured = FilterProfile::capture(&profile, &pipeline);
        assert_eq!(captured.color_correction, Some(ColorCorrectionMode::Auto));
        assert_eq!(captured.preset, Some(Preset::Speed));
        assert!(captured.denoise);
        assert!(captured.denoise_with_face);
        assert_eq!(captured.backend, Backend::Gpu);
        assert!(gpu_only_features_enabled(pipeline.video_filter()));
    }

    #[test]
    fn test_no_color_mode_turns_color_off() {
        let sdk = FakeSdk::new();
        let pipeline = pipeline_with(&sdk);
        let auto = FilterProfile {
            color_correction: Some(ColorCorrectionMode::Auto),
            ..bare()
        };
        auto.apply(&pipeline, &Cameras).unwrap();
        assert!(pipeline.video_filter().is_color_correction_enabled());

        let off = bare();
        assert_eq!(off.color_correction, None);
        off.apply(&pipeline, &Cameras).unwrap();

        let filter = pipeline.video_filter();
        assert!(!filter.is_color_correction_enabled());
        assert!(!filter.is_color_grading_enabled());
        assert!(!filter.is_color_filter_enabled());
        assert_eq!(FilterProfile::capture(&off, &pipeline).color_correction, None);
    }

    #[test]
    fn test_color_mode_names() {
        for mode in [ColorCorrectionMode::Auto, ColorCorrectionMode::Filter, ColorCorrectionMode::Grading] {
            assert_eq!(mode.as_str().parse::<ColorCorrectionMode>(), Ok(mode));
        }
        assert!("sepia".parse::<ColorCorrectionMode>().is_err());
    }

    #[test]
    fn test_lut_file_names() {
        let names = color_lut_file_names();
        assert_eq!(names.len(), COLOR_LUT_COUNT);
        assert_eq!(names[0], "Filter 1.cube");
        assert_eq!(names[19], "Filter 20.cube");
    }
}
