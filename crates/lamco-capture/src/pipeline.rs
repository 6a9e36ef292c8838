//! Capture pipeline
//!
//! [`CapturePipeline`] owns one worker thread that reads frames from a
//! [`VideoSource`], converts them to BGRA, runs them through the shared
//! [`VideoFilter`] and publishes the result to a single observer.
//!
//! # Threads
//!
//! ```text
//!  control thread                         capture worker
//!  ──────────────                         ──────────────
//!  set_device_index ─┐                    loop {
//!  set_media_path    ├─► settings ──┐       swap(open_requested)?
//!  set_frame_size   ─┘   (mutex)    │         └─► snapshot settings, reopen
//!        │                          └────►  read ─► convert ─► replace_bg
//!        └─► open_requested (atomic)         record timing ─► publish
//!                                         }
//! ```
//!
//! Reconfiguration never blocks on the worker: setters update the settings
//! under a short lock and raise a flag that the worker consumes at the top
//! of its next iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use lamco_vbsdk::{Image, PixelFormat, VideoFilter};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::config::PipelineConfig;
use crate::convert::FrameConverter;
use crate::error::{CaptureError, Result};
use crate::metrics::{FrameTiming, Metrics};
use crate::source::{FrameSize, SourceProvider, SourceSelector, SourceSettings, VideoSource};

/// Receiving end of the frame channel
///
/// Holds the most recent published frame; `None` until the first frame.
pub type FrameReceiver = watch::Receiver<Option<Arc<Image>>>;

type FrameSender = watch::Sender<Option<Arc<Image>>>;

/// State shared between the control side and the worker
struct Shared {
    settings: Mutex<SourceSettings>,
    open_requested: AtomicBool,
    stop_requested: AtomicBool,
    filter: Arc<VideoFilter>,
    metrics: Arc<Metrics>,
    observer: Mutex<Option<FrameSender>>,
}

/// Camera capture and processing pipeline
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use lamco_capture::{CapturePipeline, PipelineConfig, SourceProvider};
/// use lamco_vbsdk::VideoFilter;
///
/// # fn provider() -> Arc<dyn SourceProvider> { unimplemented!() }
/// # fn main() -> lamco_capture::Result<()> {
/// let pipeline = CapturePipeline::new(PipelineConfig::default(), provider(), Arc::new(VideoFilter::new()))?;
/// let mut frames = pipeline.frame_receiver();
/// pipeline.start()?;
///
/// pipeline.set_frame_size((640, 480));
/// # Ok(())
/// # }
/// ```
pub struct CapturePipeline {
    shared: Arc<Shared>,
    provider: Arc<dyn SourceProvider>,
    config: PipelineConfig,
    started: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CapturePipeline {
    /// Create a pipeline; nothing is opened until [`CapturePipeline::start`]
    pub fn new(config: PipelineConfig, provider: Arc<dyn SourceProvider>, filter: Arc<VideoFilter>) -> Result<Self> {
        if let Err(issues) = config.validate() {
            return Err(CaptureError::InvalidConfig(issues.join(", ")));
        }

        debug!("Creating CapturePipeline with config: {:?}", config);

        let shared = Arc::new(Shared {
            settings: Mutex::new(SourceSettings {
                selector: config.initial_selector.clone(),
                frame_size: config.initial_frame_size,
            }),
            open_requested: AtomicBool::new(true),
            stop_requested: AtomicBool::new(false),
            filter,
            metrics: Arc::new(Metrics::with_retention(config.metrics_retention)),
            observer: Mutex::new(None),
        });

        Ok(Self {
            shared,
            provider,
            config,
            started: AtomicBool::new(false),
            worker: Mutex::new(None),
        })
    }

    /// Capture from the device with this index
    pub fn set_device_index(&self, index: u32) {
        self.update_settings(|s| s.selector = SourceSelector::Index(index));
    }

    /// Capture from a device node or media file
    pub fn set_media_path(&self, path: impl Into<std::path::PathBuf>) {
        let path = path.into();
        self.update_settings(|s| s.selector = SourceSelector::Path(path));
    }

    /// Ask the source for a different resolution
    pub fn set_frame_size(&self, size: impl Into<FrameSize>) {
        let size = size.into();
        self.update_settings(|s| s.frame_size = size);
    }

    /// Change source and resolution with a single reopen
    pub fn set_source(&self, selector: SourceSelector, size: impl Into<FrameSize>) {
        let size = size.into();
        self.update_settings(|s| {
            s.selector = selector;
            s.frame_size = size;
        });
    }

    /// Last requested resolution
    pub fn frame_size(&self) -> FrameSize {
        self.shared.settings.lock().frame_size
    }

    /// Last requested source
    pub fn source_selector(&self) -> SourceSelector {
        self.shared.settings.lock().selector.clone()
    }

    fn update_settings(&self, apply: impl FnOnce(&mut SourceSettings)) {
        let mut settings = self.shared.settings.lock();
        let before = settings.clone();
        apply(&mut settings);

        if *settings != before {
            debug!(
                source = %settings.selector,
                size = %settings.frame_size,
                "Source settings changed, reopen requested"
            );
            self.shared.open_requested.store(true, Ordering::Release);
        }
    }

    /// Spawn the worker thread
    ///
    /// Later calls are no-ops, including after [`CapturePipeline::shutdown`].
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if self.started.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut ctx = Worker {
            shared: Arc::clone(&self.shared),
            provider: Arc::clone(&self.provider),
            config: self.config.clone(),
            converter: FrameConverter::new(),
            buffer: Arc::new(Image::new(0, 0, PixelFormat::Bgra32)),
            reopen_attempts: 0,
            retry_at: None,
        };

        let handle = thread::Builder::new()
            .name(self.config.worker_name.clone())
            .spawn(move || ctx.run())
            .map_err(CaptureError::ThreadSpawn)?;

        *worker = Some(handle);
        self.started.store(true, Ordering::Release);
        info!("Capture worker '{}' started", self.config.worker_name);
        Ok(())
    }

    /// Subscribe to processed frames
    ///
    /// There is a single observer: calling this again closes the previous
    /// receiver.
    pub fn frame_receiver(&self) -> FrameReceiver {
        let (tx, rx) = watch::channel(None);
        *self.shared.observer.lock() = Some(tx);
        rx
    }

    /// The filter applied to every frame
    pub fn video_filter(&self) -> &Arc<VideoFilter> {
        &self.shared.filter
    }

    /// Processing metrics
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.shared.metrics
    }

    /// The provider sources are opened from
    pub fn provider(&self) -> &dyn SourceProvider {
        self.provider.as_ref()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// True while the worker thread is alive
    pub fn is_running(&self) -> bool {
        self.worker.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the worker and wait for it to release the source
    ///
    /// A read already in progress finishes first.
    pub fn shutdown(&self) {
        self.shared.stop_requested.store(true, Ordering::Release);

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            info!("Shutting down capture worker");
            if handle.join().is_err() {
                warn!("Capture worker panicked");
            }
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        debug!("Dropping CapturePipeline");
        self.shutdown();
    }
}

impl std::fmt::Debug for CapturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePipeline")
            .field("settings", &*self.shared.settings.lock())
            .field("started", &self.started.load(Ordering::Relaxed))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Worker-side state
struct Worker {
    shared: Arc<Shared>,
    provider: Arc<dyn SourceProvider>,
    config: PipelineConfig,
    converter: FrameConverter,
    buffer: Arc<Image>,
    reopen_attempts: u32,
    retry_at: Option<Instant>,
}

impl Worker {
    fn run(&mut self) {
        let mut source: Option<Box<dyn VideoSource>> = None;

        while !self.shared.stop_requested.load(Ordering::Acquire) {
            let requested = self.shared.open_requested.swap(false, Ordering::AcqRel);
            let retry_due = self.retry_at.is_some_and(|at| Instant::now() >= at);

            if requested || retry_due {
                if requested {
                    self.reopen_attempts = 0;
                }
                self.retry_at = None;
                source = self.reopen(source.take());
            }

            let Some(active) = source.as_mut() else {
                thread::sleep(self.config.idle_interval);
                continue;
            };

            self.step(active.as_mut());
        }

        drop(source);
        info!("Capture worker stopped");
    }

    /// Release the current source and open a new one from the settings
    fn reopen(&mut self, current: Option<Box<dyn VideoSource>>) -> Option<Box<dyn VideoSource>> {
        let metrics = &self.shared.metrics;
        metrics.set_camera_switching(true);
        drop(current);

        let settings = self.shared.settings.lock().clone();
        let opened = self.provider.open(&settings.selector, settings.frame_size);

        metrics.set_camera_switching(false);
        metrics.set_camera_error(false);

        match opened {
            Ok(source) => {
                info!(source = %settings.selector, size = %settings.frame_size, "Opened video source");
                Some(source)
            }
            Err(e) => {
                warn!("Failed to open {}: {}", settings.selector, e);
                metrics.set_camera_error(true);

                if self.config.reopen_on_failure && self.reopen_attempts < self.config.max_reopen_attempts {
                    self.reopen_attempts += 1;
                    self.retry_at = Some(Instant::now() + self.config.reopen_backoff);
                    debug!(
                        attempt = self.reopen_attempts,
                        max = self.config.max_reopen_attempts,
                        "Scheduling reopen in {:?}",
                        self.config.reopen_backoff
                    );
                }
                None
            }
        }
    }

    /// One read, convert, filter, publish cycle
    fn step(&mut self, source: &mut dyn VideoSource) {
        let metrics = &self.shared.metrics;

        let frame = match source.read() {
            Ok(frame) => frame,
            Err(e) => {
                if !metrics.has_camera_error() {
                    warn!("Camera read failed: {}", e);
                }
                metrics.set_camera_error(true);
                return;
            }
        };
        metrics.set_camera_error(false);

        if let Err(e) = self.converter.convert(&frame, &mut self.buffer) {
            debug!("Dropping frame: {}", e);
            return;
        }

        let begin = Instant::now();
        let filtered = self.shared.filter.replace_bg(&self.buffer);
        let end = Instant::now();

        let published = match filtered {
            Some(image) => Arc::new(image),
            None => Arc::clone(&self.buffer),
        };

        let (width, height) = published.size();
        metrics.on_frame_processed(FrameTiming {
            duration: end - begin,
            timestamp: end,
            size: FrameSize::new(width, height),
        });
        trace!(width, height, elapsed = ?(end - begin), "Frame processed");

        if let Some(observer) = self.shared.observer.lock().as_ref() {
            observer.send_replace(Some(published));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use lamco_vbsdk::fake::FakeSdk;

    use super::*;
    use crate::source::{DeviceInfo, RawFrame, SourceFormat};

    /// Produces solid grey BGR frames of the requested size
    struct Grey {
        size: FrameSize,
        data: Vec<u8>,
    }

    impl VideoSource for Grey {
        fn read(&mut self) -> Result<RawFrame<'_>> {
            thread::sleep(Duration::from_millis(2));
            Ok(RawFrame {
                width: self.size.width,
                height: self.size.height,
                stride: self.size.width as usize * 3,
                format: SourceFormat::Bgr24,
                data: &self.data,
            })
        }
    }

    #[derive(Default)]
    struct GreyProvider {
        opens: AtomicUsize,
        fail: AtomicBool,
        last: Mutex<Option<(SourceSelector, FrameSize)>>,
    }

    impl SourceProvider for GreyProvider {
        fn open(&self, selector: &SourceSelector, size: FrameSize) -> Result<Box<dyn VideoSource>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            *self.last.lock() = Some((selector.clone(), size));
            if self.fail.load(Ordering::SeqCst) {
                return Err(CaptureError::device_open(selector, "unplugged"));
            }
            Ok(Box::new(Grey {
                size,
                data: vec![0x80; size.width as usize * size.height as usize * 3],
            }))
        }

        fn devices(&self) -> Vec<DeviceInfo> {
            Vec::new()
        }
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig::builder()
            .initial_frame_size(FrameSize::new(8, 4))
            .idle_interval(Duration::from_millis(5))
            .build()
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn blurred_filter(sdk: &FakeSdk) -> Arc<VideoFilter> {
        let filter = VideoFilter::from_factory(sdk.factory());
        filter.enable_blur().unwrap();
        Arc::new(filter)
    }

    /// A facade whose engine never came up; frames pass through
    fn unavailable_filter() -> Arc<VideoFilter> {
        let sdk = FakeSdk::new();
        sdk.fail_pipeline_creation();
        let filter = VideoFilter::from_factory(sdk.factory());
        assert!(!filter.is_valid());
        Arc::new(filter)
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PipelineConfig {
            worker_name: String::new(),
            ..small_config()
        };
        let err = CapturePipeline::new(config, Arc::new(GreyProvider::default()), unavailable_filter())
            .unwrap_err();
        assert!(matches!(err, CaptureError::InvalidConfig(_)));
    }

    #[test]
    fn test_setters_request_reopen_only_on_change() {
        let pipeline = CapturePipeline::new(
            small_config(),
            Arc::new(GreyProvider::default()),
            unavailable_filter(),
        )
        .unwrap();
        pipeline.shared.open_requested.store(false, Ordering::SeqCst);

        pipeline.set_device_index(0);
        pipeline.set_frame_size((8, 4));
        assert!(!pipeline.shared.open_requested.load(Ordering::SeqCst));

        pipeline.set_media_path("/dev/video2");
        assert!(pipeline.shared.open_requested.swap(false, Ordering::SeqCst));
        assert_eq!(pipeline.source_selector(), SourceSelector::Path(PathBuf::from("/dev/video2")));

        pipeline.set_source(SourceSelector::Index(1), FrameSize::new(640, 480));
        assert!(pipeline.shared.open_requested.load(Ordering::SeqCst));
        assert_eq!(pipeline.frame_size(), FrameSize::new(640, 480));
        assert_eq!(pipeline.source_selector(), SourceSelector::Index(1));
    }

    #[test]
    fn test_frames_flow_through_filter() {
        let sdk = FakeSdk::new();
        let provider = Arc::new(GreyProvider::default());
        let pipeline = CapturePipeline::new(small_config(), provider.clone(), blurred_filter(&sdk)).unwrap();

        let mut frames = pipeline.frame_receiver();
        pipeline.start().unwrap();
        pipeline.start().unwrap();

        assert!(wait_until(|| frames.borrow_and_update().is_some()));
        let frame = frames.borrow().clone().unwrap();
        assert_eq!(frame.size(), (8, 4));
        // Blur halves every byte of the 0x80 grey
        assert_eq!(frame.pixel(0, 0), Some(&[0x40, 0x40, 0x40, 0x7F][..]));

        pipeline.shutdown();
        assert_eq!(provider.opens.load(Ordering::SeqCst), 1);
        assert!(!pipeline.is_running());
        assert_eq!(pipeline.metrics().last_frame_size(), Some(FrameSize::new(8, 4)));
    }

    #[test]
    fn test_unfiltered_frame_is_published_when_filter_fails() {
        // No features enabled: the engine refuses to process
        let sdk = FakeSdk::new();
        let filter = Arc::new(VideoFilter::from_factory(sdk.factory()));
        let pipeline = CapturePipeline::new(small_config(), Arc::new(GreyProvider::default()), filter).unwrap();

        let mut frames = pipeline.frame_receiver();
        pipeline.start().unwrap();

        assert!(wait_until(|| frames.borrow_and_update().is_some()));
        let frame = frames.borrow().clone().unwrap();
        assert_eq!(frame.pixel(0, 0), Some(&[0x80, 0x80, 0x80, 0xFF][..]));
        assert_eq!(pipeline.metrics().last_frame_size(), Some(FrameSize::new(8, 4)));
    }

    #[test]
    fn test_resize_reopens_with_new_size() {
        let sdk = FakeSdk::new();
        let provider = Arc::new(GreyProvider::default());
        let pipeline = CapturePipeline::new(small_config(), provider.clone(), blurred_filter(&sdk)).unwrap();

        let mut frames = pipeline.frame_receiver();
        pipeline.start().unwrap();
        assert!(wait_until(|| frames.borrow_and_update().is_some()));

        pipeline.set_frame_size((16, 8));
        assert!(wait_until(|| {
            frames
                .borrow_and_update()
                .as_ref()
                .is_some_and(|f| f.size() == (16, 8))
        }));
        assert_eq!(provider.opens.load(Ordering::SeqCst), 2);
        assert_eq!(*provider.last.lock(), Some((SourceSelector::Index(0), FrameSize::new(16, 8))));
    }

    #[test]
    fn test_open_failure_sets_error_and_retries() {
        let provider = Arc::new(GreyProvider::default());
        provider.fail.store(true, Ordering::SeqCst);

        let config = PipelineConfig {
            reopen_on_failure: true,
            max_reopen_attempts: 2,
            reopen_backoff: Duration::from_millis(10),
            ..small_config()
        };
        let pipeline = CapturePipeline::new(config, provider.clone(), unavailable_filter()).unwrap();
        pipeline.start().unwrap();

        assert!(wait_until(|| provider.opens.load(Ordering::SeqCst) == 3));
        assert!(pipeline.metrics().has_camera_error());

        // Attempts are bounded
        thread::sleep(Duration::from_millis(100));
        assert_eq!(provider.opens.load(Ordering::SeqCst), 3);

        // A settings change resets the budget and succeeds once the device is back
        provider.fail.store(false, Ordering::SeqCst);
        pipeline.set_device_index(1);
        assert!(wait_until(|| !pipeline.metrics().has_camera_error()
            && pipeline.metrics().last_frame_size().is_some()));
    }

    #[test]
    fn test_new_receiver_replaces_previous() {
        let pipeline = CapturePipeline::new(
            small_config(),
            Arc::new(GreyProvider::default()),
            unavailable_filter(),
        )
        .unwrap();

        let first = pipeline.frame_receiver();
        let _second = pipeline.frame_receiver();
        assert!(first.has_changed().is_err());
    }

    #[test]
    fn test_shutdown_without_start() {
        let pipeline = CapturePipeline::new(
            small_config(),
            Arc::new(GreyProvider::default()),
            unavailable_filter(),
        )
        .unwrap();
        pipeline.shutdown();
        pipeline.shutdown();
        assert!(!pipeline.is_running());
    }
}
