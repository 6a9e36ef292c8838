//! Frame processing metrics
//!
//! The worker records one [`FrameTiming`] per filtered frame. Entries older
//! than the retention window (one second by default) relative to the newest
//! entry are purged on every insert, so the average reflects the last
//! second of processing.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::source::FrameSize;

/// Default retention window
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(1);

/// Timing of a single processed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    /// Time spent in the filter
    pub duration: Duration,
    /// When the frame finished processing
    pub timestamp: Instant,
    /// Size of the published frame
    pub size: FrameSize,
}

/// Rolling processing statistics plus the camera status flags
#[derive(Debug)]
pub struct Metrics {
    timings: Mutex<VecDeque<FrameTiming>>,
    retention: Duration,
    camera_error: AtomicBool,
    camera_switching: AtomicBool,
}

impl Metrics {
    /// Create a recorder with the default one-second window
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Create a recorder with a custom window
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            timings: Mutex::new(VecDeque::new()),
            retention,
            camera_error: AtomicBool::new(false),
            camera_switching: AtomicBool::new(false),
        }
    }

    /// Record a processed frame
    pub fn on_frame_processed(&self, timing: FrameTiming) {
        let mut timings = self.timings.lock();
        timings.retain(|old| timing.timestamp.saturating_duration_since(old.timestamp) <= self.retention);
        timings.push_back(timing);
    }

    /// Mean filter duration over the retained window, zero when empty
    pub fn average_duration(&self) -> Duration {
        let timings = self.timings.lock();
        let sum: Duration = timings.iter().map(|t| t.duration).sum();
        sum / timings.len().max(1) as u32
    }

    /// Size of the most recently recorded frame
    pub fn last_frame_size(&self) -> Option<FrameSize> {
        self.timings.lock().back().map(|t| t.size)
    }

    pub fn has_camera_error(&self) -> bool {
        self.camera_error.load(Ordering::Acquire)
    }

    pub fn set_camera_error(&self, error: bool) {
        self.camera_error.store(error, Ordering::Release);
    }

    pub fn is_camera_switching(&self) -> bool {
        self.camera_switching.load(Ordering::Acquire)
    }

    pub fn set_camera_switching(&self, switching: bool) {
        self.camera_switching.store(switching, Ordering::Release);
    }

    /// Consistent view of the window and flags
    pub fn snapshot(&self) -> MetricsSnapshot {
        let (frames_in_window, average_duration, last_frame_size) = {
            let timings = self.timings.lock();
            let sum: Duration = timings.iter().map(|t| t.duration).sum();
            (
                timings.len(),
                sum / timings.len().max(1) as u32,
                timings.back().map(|t| t.size),
            )
        };

        MetricsSnapshot {
            frames_in_window,
            average_duration,
            last_frame_size,
            camera_error: self.has_camera_error(),
            camera_switching: self.is_camera_switching(),
        }
    }

    /// What a status line should show right now
    ///
    /// Switching wins over an error, which wins over timings.
    pub fn status(&self) -> MetricsStatus {
        if self.is_camera_switching() {
            MetricsStatus::Switching
        } else if self.has_camera_error() {
            MetricsStatus::CameraError
        } else {
            MetricsStatus::Running {
                average: self.average_duration(),
                last_size: self.last_frame_size(),
            }
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Frames currently inside the retention window
    pub frames_in_window: usize,
    /// Mean filter duration over the window
    pub average_duration: Duration,
    /// Size of the newest frame
    pub last_frame_size: Option<FrameSize>,
    /// Last read or open failed
    pub camera_error: bool,
    /// A source switch is in progress
    pub camera_switching: bool,
}

/// Human-facing pipeline status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsStatus {
    /// A source switch is in progress
    Switching,
    /// The camera failed to open or read
    CameraError,
    /// Frames are flowing
    Running {
        /// Mean filter duration
        average: Duration,
        /// Size of the newest frame
        last_size: Option<FrameSize>,
    },
}

impl fmt::Display for MetricsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Switching => f.write_str("Switch camera"),
            Self::CameraError => f.write_str("Camera error"),
            Self::Running { average, last_size } => {
                let ms = average.as_micros() as f64 / 1000.0;
                write!(f, "{} ms per frame", significant(ms, 3))?;
                if let Some(size) = last_size.filter(|s| !s.is_empty()) {
                    write!(f, ", last frame size: {size}")?;
                }
                Ok(())
            }
        }
    }
}

/// Shortest rendering of `value` with at most `digits` significant digits
///
/// Large and tiny magnitudes switch to exponent notation (`1.23e+03`).
fn significant(value: f64, digits: usize) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{value}");
    }

    let precision = digits.saturating_sub(1);
    let sci = format!("{value:.precision$e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);

    if exp < -4 || exp >= digits as i32 {
        let mantissa = trim_zeros(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exp.abs());
    }

    let decimals = (digits as i32 - 1 - exp).max(0) as usize;
    trim_zeros(&format!("{value:.decimals$}")).to_string()
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(ms: u64, at: Instant, size: FrameSize) -> FrameTiming {
        FrameTiming {
            duration: Duration::from_millis(ms),
            timestamp: at,
            size,
        }
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = Metrics::new();
        assert_eq!(metrics.average_duration(), Duration::ZERO);
        assert_eq!(metrics.last_frame_size(), None);
        assert!(!metrics.has_camera_error());
        assert!(!metrics.is_camera_switching());
    }

    #[test]
    fn test_average_and_last_size() {
        let metrics = Metrics::new();
        let now = Instant::now();

        metrics.on_frame_processed(timing(10, now, FrameSize::new(640, 480)));
        metrics.on_frame_processed(timing(20, now + Duration::from_millis(33), FrameSize::new(1280, 720)));

        assert_eq!(metrics.average_duration(), Duration::from_millis(15));
        assert_eq!(metrics.last_frame_size(), Some(FrameSize::new(1280, 720)));
    }

    #[test]
    fn test_entries_older_than_window_are_purged() {
        let metrics = Metrics::new();
        let start = Instant::now();
        let size = FrameSize::new(640, 480);

        metrics.on_frame_processed(timing(100, start, size));
        metrics.on_frame_processed(timing(50, start + Duration::from_millis(900), size));
        assert_eq!(metrics.snapshot().frames_in_window, 2);

        // 1.5 s after the first entry: only the first falls out
        metrics.on_frame_processed(timing(10, start + Duration::from_millis(1500), size));
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_in_window, 2);
        assert_eq!(snapshot.average_duration, Duration::from_millis(30));
    }

    #[test]
    fn test_entry_exactly_at_window_edge_is_kept() {
        let metrics = Metrics::new();
        let start = Instant::now();
        let size = FrameSize::new(2, 2);

        metrics.on_frame_processed(timing(1, start, size));
        metrics.on_frame_processed(timing(1, start + DEFAULT_RETENTION, size));
        assert_eq!(metrics.snapshot().frames_in_window, 2);
    }

    #[test]
    fn test_flags_are_independent() {
        let metrics = Metrics::new();
        metrics.set_camera_error(true);
        assert!(metrics.has_camera_error());
        assert!(!metrics.is_camera_switching());

        metrics.set_camera_switching(true);
        metrics.set_camera_error(false);
        assert!(metrics.is_camera_switching());
        assert!(!metrics.has_camera_error());
    }

    #[test]
    fn test_status_text() {
        let metrics = Metrics::new();
        metrics.on_frame_processed(timing(12, Instant::now(), FrameSize::new(640, 480)));
        assert_eq!(metrics.status().to_string(), "12 ms per frame, last frame size: 640x480");

        metrics.set_camera_error(true);
        assert_eq!(metrics.status().to_string(), "Camera error");

        metrics.set_camera_switching(true);
        assert_eq!(metrics.status().to_string(), "Switch camera");
    }

    #[test]
    fn test_status_without_frames() {
        let status = MetricsStatus::Running {
            average: Duration::ZERO,
            last_size: None,
        };
        assert_eq!(status.to_string(), "0 ms per frame");
    }

    #[test]
    fn test_significant_digits() {
        assert_eq!(significant(12.345, 3), "12.3");
        assert_eq!(significant(7.0, 3), "7");
        assert_eq!(significant(0.123_456, 3), "0.123");
        assert_eq!(significant(999.6, 3), "1e+03");
        assert_eq!(significant(1234.0, 3), "1.23e+03");
    }
}
