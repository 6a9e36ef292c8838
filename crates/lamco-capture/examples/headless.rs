//! Headless capture example
//!
//! Runs the capture pipeline for a few seconds and prints the metrics
//! status line once per second, the way an on-screen overlay would show it.
//!
//! With the `v4l2` feature on Linux this reads from the first camera;
//! without it, or without a camera, it uses a generated color-bar
//! pattern. Set `LAMCO_VBSDK_PATH` if the SDK library is not next to the
//! executable.
//!
//! ```text
//! cargo run -p lamco-capture --example headless --features v4l2
//! ```

use std::sync::Arc;
use std::time::Duration;

use lamco_capture::{
    CapturePipeline, DeviceInfo, FilterProfile, FrameSize, PipelineConfig, RawFrame, SourceFormat, SourceProvider,
    SourceSelector, VideoSource,
};
use lamco_vbsdk::VideoFilter;

/// Vertical color bars, BGR
struct ColorBars {
    size: FrameSize,
    data: Vec<u8>,
}

impl ColorBars {
    fn new(size: FrameSize) -> Self {
        const BARS: [[u8; 3]; 4] = [[255, 255, 255], [0, 255, 255], [255, 255, 0], [0, 0, 255]];
        let mut data = Vec::with_capacity(size.width as usize * size.height as usize * 3);
        for _ in 0..size.height {
            for x in 0..size.width {
                let bar = (x as usize * BARS.len()) / size.width as usize;
                data.extend_from_slice(&BARS[bar]);
            }
        }
        Self { size, data }
    }
}

impl VideoSource for ColorBars {
    fn read(&mut self) -> lamco_capture::Result<RawFrame<'_>> {
        std::thread::sleep(Duration::from_millis(33));
        Ok(RawFrame {
            width: self.size.width,
            height: self.size.height,
            stride: self.size.width as usize * 3,
            format: SourceFormat::Bgr24,
            data: &self.data,
        })
    }
}

struct PatternProvider;

impl SourceProvider for PatternProvider {
    fn open(&self, _selector: &SourceSelector, size: FrameSize) -> lamco_capture::Result<Box<dyn VideoSource>> {
        Ok(Box::new(ColorBars::new(size)))
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        vec![DeviceInfo {
            index: 0,
            name: "Color Bars".into(),
            path: None,
        }]
    }
}

#[cfg(all(feature = "v4l2", target_os = "linux"))]
fn provider(config: &PipelineConfig) -> Arc<dyn SourceProvider> {
    let v4l2 = lamco_capture::V4l2Provider::from_config(config);
    if v4l2.devices().is_empty() {
        println!("No V4L2 devices, using color bars");
        return Arc::new(PatternProvider);
    }
    Arc::new(v4l2)
}

#[cfg(not(all(feature = "v4l2", target_os = "linux")))]
fn provider(_config: &PipelineConfig) -> Arc<dyn SourceProvider> {
    Arc::new(PatternProvider)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let config = PipelineConfig::builder()
        .reopen_on_failure(true)
        .build();
    let provider = provider(&config);

    println!("Capture devices:");
    for device in provider.devices() {
        println!("  #{} {} ({:?})", device.index, device.name, device.path);
    }
    println!();

    let filter = Arc::new(VideoFilter::new());
    if let Some(err) = filter.init_error() {
        println!("SDK unavailable, frames pass through unfiltered: {err}");
    }

    let pipeline = CapturePipeline::new(config, Arc::clone(&provider), filter)?;

    if pipeline.video_filter().is_valid() {
        let profile = FilterProfile {
            blur: true,
            replacement: false,
            camera_scale: (640, 480),
            ..Default::default()
        };
        profile.apply(&pipeline, provider.as_ref())?;
    } else {
        pipeline.set_frame_size((640, 480));
    }

    let frames = pipeline.frame_receiver();
    pipeline.start()?;

    for _ in 0..5 {
        std::thread::sleep(Duration::from_secs(1));
        let latest = frames.borrow().as_ref().map(|f| f.size());
        println!("{} (latest frame: {:?})", pipeline.metrics().status(), latest);
    }

    pipeline.shutdown();
    Ok(())
}
