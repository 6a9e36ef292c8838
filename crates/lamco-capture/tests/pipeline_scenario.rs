//! End-to-end pipeline scenarios against scripted sources and the fake engine

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use lamco_capture::{
    CaptureError, CapturePipeline, DeviceInfo, FrameSize, PipelineConfig, RawFrame, Result, SourceFormat,
    SourceProvider, SourceSelector, VideoSource,
};
use lamco_vbsdk::fake::FakeSdk;
use lamco_vbsdk::{Backend, Preset, VideoFilter};
use parking_lot::Mutex;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

/// A facade whose engine never came up; frames pass through
fn unavailable_filter() -> Arc<VideoFilter> {
    let sdk = FakeSdk::new();
    sdk.fail_pipeline_creation();
    let filter = VideoFilter::from_factory(sdk.factory());
    assert!(!filter.is_valid());
    Arc::new(filter)
}

// ============================================================================
// Scripted source: every read waits for the test to say what happens
// ============================================================================

enum Step {
    Frame,
    Fail,
}

struct Scripted {
    size: FrameSize,
    data: Vec<u8>,
    script: Arc<Mutex<Receiver<Step>>>,
    reads: Arc<AtomicUsize>,
}

impl VideoSource for Scripted {
    fn read(&mut self) -> Result<RawFrame<'_>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().recv();
        match step {
            Ok(Step::Frame) => Ok(RawFrame {
                width: self.size.width,
                height: self.size.height,
                stride: self.size.width as usize * 3,
                format: SourceFormat::Bgr24,
                data: &self.data,
            }),
            Ok(Step::Fail) => Err(CaptureError::Read("scripted failure".into())),
            Err(_) => {
                thread::sleep(Duration::from_millis(1));
                Err(CaptureError::Read("script finished".into()))
            }
        }
    }
}

struct ScriptedProvider {
    opens: Mutex<Vec<(SourceSelector, FrameSize)>>,
    script: Arc<Mutex<Receiver<Step>>>,
    reads: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    fn new() -> (Arc<Self>, SyncSender<Step>) {
        // Rendezvous: a send returns once the worker has taken the step
        let (tx, rx) = sync_channel(0);
        let provider = Arc::new(Self {
            opens: Mutex::new(Vec::new()),
            script: Arc::new(Mutex::new(rx)),
            reads: Arc::new(AtomicUsize::new(0)),
        });
        (provider, tx)
    }

    fn opens(&self) -> Vec<(SourceSelector, FrameSize)> {
        self.opens.lock().clone()
    }

    /// Reads started so far, including one still waiting for its step
    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl SourceProvider for ScriptedProvider {
    fn open(&self, selector: &SourceSelector, size: FrameSize) -> Result<Box<dyn VideoSource>> {
        self.opens.lock().push((selector.clone(), size));
        Ok(Box::new(Scripted {
            size,
            data: vec![0x60; size.width as usize * size.height as usize * 3],
            script: Arc::clone(&self.script),
            reads: Arc::clone(&self.reads),
        }))
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        vec![DeviceInfo {
            index: 0,
            name: "Scripted Camera".into(),
            path: None,
        }]
    }
}

#[test]
fn test_resize_then_failure_streak() {
    init_tracing();

    let sdk = FakeSdk::new();
    let filter = VideoFilter::from_factory(sdk.factory());
    filter.enable_blur().unwrap();

    let (provider, script) = ScriptedProvider::new();
    let pipeline = CapturePipeline::new(PipelineConfig::default(), provider.clone(), Arc::new(filter)).unwrap();
    assert_eq!(pipeline.frame_size(), FrameSize::new(1280, 720));
    assert_eq!(pipeline.source_selector(), SourceSelector::Index(0));

    let mut frames = pipeline.frame_receiver();
    pipeline.start().unwrap();

    script.send(Step::Frame).unwrap();
    assert!(wait_until(|| frames.borrow_and_update().is_some()));
    assert_eq!(provider.opens(), vec![(SourceSelector::Index(0), FrameSize::new(1280, 720))]);

    // Resize: the next open must use the new size
    pipeline.set_frame_size((640, 480));
    script.send(Step::Frame).unwrap();
    script.send(Step::Frame).unwrap();
    assert!(wait_until(|| {
        frames
            .borrow_and_update()
            .as_ref()
            .is_some_and(|f| f.size() == (640, 480))
    }));
    let opens = provider.opens();
    assert_eq!(opens.len(), 2);
    assert_eq!(opens[1], (SourceSelector::Index(0), FrameSize::new(640, 480)));

    let metrics = Arc::clone(pipeline.metrics());
    assert!(wait_until(|| metrics.last_frame_size() == Some(FrameSize::new(640, 480))));
    let before = metrics.snapshot();
    assert!(!before.camera_error);

    // Five consecutive read failures
    for i in 0..5 {
        script.send(Step::Fail).unwrap();
        if i > 0 {
            // The previous failure has been fully handled by now
            assert!(metrics.has_camera_error(), "error flag cleared during streak at step {i}");
        }
    }
    assert!(wait_until(|| metrics.has_camera_error()));

    let during = metrics.snapshot();
    assert_eq!(during.frames_in_window, before.frames_in_window);
    assert_eq!(during.average_duration, before.average_duration);
    assert_eq!(during.last_frame_size, Some(FrameSize::new(640, 480)));
    assert_eq!(metrics.status().to_string(), "Camera error");

    // Recovery
    script.send(Step::Frame).unwrap();
    assert!(wait_until(|| !metrics.has_camera_error()));

    drop(script);
    pipeline.shutdown();
    assert_eq!(provider.opens().len(), 2);
}

#[test]
fn test_setter_burst_opens_only_final_settings() {
    init_tracing();

    let (provider, script) = ScriptedProvider::new();
    let config = PipelineConfig::builder()
        .initial_frame_size(FrameSize::new(8, 4))
        .build();
    let pipeline = CapturePipeline::new(config, provider.clone(), unavailable_filter()).unwrap();
    let mut frames = pipeline.frame_receiver();
    pipeline.start().unwrap();

    script.send(Step::Frame).unwrap();
    assert!(wait_until(|| frames.borrow_and_update().is_some()));

    // The second read has started, so the worker is past its reopen check
    assert!(wait_until(|| provider.reads() == 2));

    pipeline.set_device_index(3);
    pipeline.set_media_path("/dev/video7");
    pipeline.set_frame_size((640, 480));
    pipeline.set_frame_size((16, 8));
    pipeline.set_device_index(5);
    assert_eq!(provider.opens().len(), 1);

    // Finish the pending read on the old source
    script.send(Step::Frame).unwrap();
    assert!(wait_until(|| provider.opens().len() == 2));

    script.send(Step::Frame).unwrap();
    assert!(wait_until(|| {
        frames
            .borrow_and_update()
            .as_ref()
            .is_some_and(|f| f.size() == (16, 8))
    }));

    assert_eq!(
        provider.opens(),
        vec![
            (SourceSelector::Index(0), FrameSize::new(8, 4)),
            (SourceSelector::Index(5), FrameSize::new(16, 8)),
        ]
    );

    drop(script);
    pipeline.shutdown();
    assert_eq!(provider.opens().len(), 2);
}

// ============================================================================
// Free-running source for stress scenarios
// ============================================================================

struct Solid {
    size: FrameSize,
    data: Vec<u8>,
}

impl VideoSource for Solid {
    fn read(&mut self) -> Result<RawFrame<'_>> {
        thread::sleep(Duration::from_micros(200));
        Ok(RawFrame {
            width: self.size.width,
            height: self.size.height,
            stride: self.size.width as usize * 4,
            format: SourceFormat::Bgra32,
            data: &self.data,
        })
    }
}

#[derive(Default)]
struct SolidProvider {
    last_open: Mutex<Option<FrameSize>>,
}

impl SourceProvider for SolidProvider {
    fn open(&self, _selector: &SourceSelector, size: FrameSize) -> Result<Box<dyn VideoSource>> {
        *self.last_open.lock() = Some(size);
        Ok(Box::new(Solid {
            size,
            data: vec![0xC8; size.width as usize * size.height as usize * 4],
        }))
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        Vec::new()
    }
}

fn small() -> PipelineConfig {
    PipelineConfig::builder()
        .initial_frame_size(FrameSize::new(32, 16))
        .build()
}

#[test]
fn test_feature_toggles_race_with_processing() {
    init_tracing();

    let sdk = FakeSdk::new();
    let filter = Arc::new(VideoFilter::from_factory(sdk.factory()));
    filter.enable_blur().unwrap();

    let background = std::env::temp_dir().join(format!("lamco-capture-stress-{}.png", std::process::id()));
    std::fs::write(&background, b"not really a png").unwrap();

    let pipeline = Arc::new(CapturePipeline::new(small(), Arc::new(SolidProvider::default()), Arc::clone(&filter)).unwrap());
    let mut frames = pipeline.frame_receiver();
    pipeline.start().unwrap();
    assert!(wait_until(|| frames.borrow_and_update().is_some()));

    let stop = Arc::new(AtomicBool::new(false));
    let mut togglers = Vec::new();

    for worker in 0..4 {
        let filter = Arc::clone(&filter);
        let background = background.clone();
        togglers.push(thread::spawn(move || {
            for i in 0..300 {
                match (worker + i) % 6 {
                    0 => {
                        let _ = filter.enable_denoise();
                        filter.set_denoise_power(0.3);
                    }
                    1 => filter.disable_denoise(),
                    2 => {
                        let _ = filter.enable_replacement();
                        let _ = filter.set_background(&background);
                    }
                    3 => filter.disable_replacement(),
                    4 => {
                        let _ = filter.set_preset(Preset::ALL[i % Preset::ALL.len()]);
                        let _ = filter.set_backend(Backend::Gpu);
                    }
                    _ => {
                        let _ = filter.enable_color_correction();
                        filter.disable_color_correction();
                    }
                }
            }
        }));
    }

    // Reconfigure the source while the togglers run
    let resizer = {
        let pipeline = Arc::clone(&pipeline);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut n = 0u32;
            while !stop.load(Ordering::Relaxed) {
                pipeline.set_frame_size((16 + (n % 4) * 8, 16));
                n += 1;
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    for t in togglers {
        t.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    resizer.join().unwrap();

    assert!(sdk.process_calls() > 0);
    assert_eq!(sdk.max_concurrent_calls(), 1);
    assert!(filter.is_blur_enabled());

    pipeline.shutdown();
    let _ = std::fs::remove_file(&background);
}

#[test]
fn test_rapid_resizes_settle_on_last_value() {
    init_tracing();

    let provider = Arc::new(SolidProvider::default());
    let pipeline = CapturePipeline::new(small(), provider.clone(), unavailable_filter()).unwrap();
    pipeline.start().unwrap();

    for width in (8..64).step_by(8) {
        pipeline.set_frame_size((width, 8));
    }
    pipeline.set_frame_size((96, 48));

    assert!(wait_until(|| *provider.last_open.lock() == Some(FrameSize::new(96, 48))));
    assert!(wait_until(|| pipeline.metrics().last_frame_size() == Some(FrameSize::new(96, 48))));

    pipeline.shutdown();
    assert!(!pipeline.is_running());
}

#[test]
fn test_drop_joins_worker() {
    let provider = Arc::new(SolidProvider::default());
    let pipeline = CapturePipeline::new(small(), provider.clone(), unavailable_filter()).unwrap();
    pipeline.start().unwrap();
    assert!(wait_until(|| provider.last_open.lock().is_some()));

    drop(pipeline);
    // Only the test still holds the provider once the worker is gone
    assert_eq!(Arc::strong_count(&provider), 1);
}
