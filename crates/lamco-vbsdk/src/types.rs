//! Engine enumerations shared by the raw ABI and the facade

use std::fmt;
use std::str::FromStr;

/// Processing backend used by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Backend {
    /// CPU inference
    Cpu,
    /// GPU inference (default)
    #[default]
    Gpu,
}

impl Backend {
    pub(crate) fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(Self::Cpu),
            2 => Some(Self::Gpu),
            _ => None,
        }
    }

    pub(crate) fn as_raw(self) -> i32 {
        match self {
            Self::Cpu => 1,
            Self::Gpu => 2,
        }
    }

    /// The other backend, used as a fallback when this one is rejected
    pub fn fallback(self) -> Self {
        match self {
            Self::Cpu => Self::Gpu,
            Self::Gpu => Self::Cpu,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("CPU"),
            Self::Gpu => f.write_str("GPU"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CPU" => Ok(Self::Cpu),
            "GPU" => Ok(Self::Gpu),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

/// Segmentation preset, trading quality for speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Preset {
    /// Best mask quality (default)
    #[default]
    Quality,
    /// Balance between quality and speed
    Balanced,
    /// Faster, lower quality mask
    Speed,
    /// Fastest preset
    Lightning,
}

impl Preset {
    /// All presets, from slowest to fastest
    pub const ALL: [Self; 4] = [Self::Quality, Self::Balanced, Self::Speed, Self::Lightning];

    /// Map an engine preset value; unknown values map to [`Preset::Quality`]
    pub(crate) fn from_raw(raw: i32) -> Self {
        match raw {
            2 => Self::Balanced,
            3 => Self::Speed,
            4 => Self::Lightning,
            _ => Self::Quality,
        }
    }

    pub(crate) fn as_raw(self) -> i32 {
        match self {
            Self::Quality => 1,
            Self::Balanced => 2,
            Self::Speed => 3,
            Self::Lightning => 4,
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Quality => "quality",
            Self::Balanced => "balanced",
            Self::Speed => "speed",
            Self::Lightning => "lightning",
        };
        f.write_str(name)
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown preset '{s}'"))
    }
}

/// Non-success codes returned by engine calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorCode {
    /// An argument was out of range or null
    InvalidArgument,
    /// `process` was called with no feature enabled
    NoFeaturesEnabled,
    /// The inference engine failed to start (backend unavailable)
    EngineInitialization,
    /// The engine ran out of memory or device resources
    ResourceAllocation,
    /// A code this crate does not know about
    Other(i32),
}

impl PipelineErrorCode {
    /// Convert a raw engine result into `Ok(())` or the error code
    pub(crate) fn check(raw: i32) -> Result<(), Self> {
        match raw {
            0 => Ok(()),
            1 => Err(Self::InvalidArgument),
            2 => Err(Self::NoFeaturesEnabled),
            3 => Err(Self::EngineInitialization),
            4 => Err(Self::ResourceAllocation),
            other => Err(Self::Other(other)),
        }
    }
}

impl fmt::Display for PipelineErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => f.write_str("invalid argument"),
            Self::NoFeaturesEnabled => f.write_str("no features enabled"),
            Self::EngineInitialization => f.write_str("engine initialization error"),
            Self::ResourceAllocation => f.write_str("resource allocation error"),
            Self::Other(code) => write!(f, "error code {code}"),
        }
    }
}

/// Pixel layout of an engine frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Packed 32-bit B, G, R, A
    Bgra32,
    /// Packed 32-bit R, G, B, A
    Rgba32,
    /// Y plane followed by interleaved UV plane
    Nv12,
}

impl FrameFormat {
    pub(crate) fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(Self::Bgra32),
            2 => Some(Self::Rgba32),
            3 => Some(Self::Nv12),
            _ => None,
        }
    }

    /// Number of planes this format carries
    pub fn plane_count(self) -> usize {
        match self {
            Self::Bgra32 | Self::Rgba32 => 1,
            Self::Nv12 => 2,
        }
    }
}

/// Access mode requested when locking frame memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLock {
    /// Read-only access
    Read,
    /// Write-only access
    Write,
    /// Read and write access
    ReadWrite,
}

impl FrameLock {
    pub(crate) fn as_raw(self) -> i32 {
        match self {
            Self::Read => 1,
            Self::Write => 2,
            Self::ReadWrite => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_raw_values() {
        assert_eq!(Backend::Cpu.as_raw(), 1);
        assert_eq!(Backend::Gpu.as_raw(), 2);
        assert_eq!(Backend::from_raw(2), Some(Backend::Gpu));
        assert_eq!(Backend::from_raw(7), None);
        assert_eq!(Backend::Gpu.fallback(), Backend::Cpu);
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("gpu".parse::<Backend>(), Ok(Backend::Gpu));
        assert_eq!(" CPU ".parse::<Backend>(), Ok(Backend::Cpu));
        assert!("tpu".parse::<Backend>().is_err());
    }

    #[test]
    fn test_unknown_preset_maps_to_quality() {
        assert_eq!(Preset::from_raw(0), Preset::Quality);
        assert_eq!(Preset::from_raw(99), Preset::Quality);
        for preset in Preset::ALL {
            assert_eq!(Preset::from_raw(preset.as_raw()), preset);
        }
    }

    #[test]
    fn test_preset_parse() {
        assert_eq!("Lightning".parse::<Preset>(), Ok(Preset::Lightning));
        assert!("turbo".parse::<Preset>().is_err());
    }

    #[test]
    fn test_error_code_check() {
        assert_eq!(PipelineErrorCode::check(0), Ok(()));
        assert_eq!(PipelineErrorCode::check(2), Err(PipelineErrorCode::NoFeaturesEnabled));
        assert_eq!(PipelineErrorCode::check(42), Err(PipelineErrorCode::Other(42)));
    }
}
