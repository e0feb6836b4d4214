use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use camfilter::capture::{
    DeviceHandle, EllipseSegmenter, FrameSink, StaticFaceDetector, TestPatternSource,
};
use camfilter::config::DeliveryMode;
use camfilter::core::{Frame, PixelFormat};
use camfilter::{CaptureController, CaptureResult, FilterSettings, PipelineConfig, STATUS_OK};
use clap::Parser;
use tracing::info;

/// Run a synthetic camera through the capture controller and filter chain.
#[derive(Parser, Debug)]
#[command(name = "filterctl")]
#[command(about = "Drive the camera filter pipeline with a synthetic test pattern")]
struct Args {
    /// Device handle to bind
    #[arg(long, default_value = "test:0")]
    device: String,

    /// How long to capture: 30s, 2m, or plain seconds
    #[arg(short, long, default_value = "3s")]
    duration: String,

    /// Pixelate detected faces
    #[arg(long)]
    pixelate: bool,

    /// Blur the background behind the segmented subject
    #[arg(long)]
    blur: bool,

    /// Where filtering runs: queued (processing thread) or inline (producer thread)
    #[arg(long, value_enum)]
    delivery: Option<DeliveryMode>,

    /// Start unfiltered and enable the requested filters after this many milliseconds
    #[arg(long)]
    toggle_after_ms: Option<u64>,

    /// JSON pipeline config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the last delivered frame to this PNG file
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

/// Last delivered frame, copied out of the pipeline.
struct Snapshot {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

#[derive(Default)]
struct RecordingSink {
    frames: AtomicU64,
    keep_last: bool,
    last: Mutex<Option<Snapshot>>,
}

impl FrameSink for RecordingSink {
    fn consume(&self, frame: &Frame) -> CaptureResult<()> {
        self.frames.fetch_add(1, Ordering::Relaxed);
        if self.keep_last {
            let snapshot = Snapshot {
                data: frame.data().to_vec(),
                width: frame.width(),
                height: frame.height(),
                format: frame.format(),
            };
            if let Ok(mut last) = self.last.lock() {
                *last = Some(snapshot);
            }
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let seconds = parse_duration(&args.duration)?;

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(delivery) = args.delivery {
        config.delivery = delivery;
    }

    let sink = Arc::new(RecordingSink {
        keep_last: args.snapshot.is_some(),
        ..RecordingSink::default()
    });
    let controller = CaptureController::builder()
        .with_config(config)
        .with_source(TestPatternSource::new())
        .with_sink(Arc::clone(&sink) as Arc<dyn FrameSink>)
        .with_face_detector(StaticFaceDetector::new())
        .with_segmenter(EllipseSegmenter::default())
        .build()?;

    let requested = FilterSettings {
        pixelate_faces: args.pixelate,
        blur_background: args.blur,
    };
    if args.toggle_after_ms.is_none() {
        controller.set_filters(requested);
    }

    let device = DeviceHandle::new(args.device.as_str());
    check(controller.init(&device), "init")?;
    check(controller.start_capture(), "start_capture")?;
    print_settings(&controller);

    let started = Instant::now();
    let total = Duration::from_secs(seconds);
    if let Some(ms) = args.toggle_after_ms {
        let delay = Duration::from_millis(ms).min(total);
        thread::sleep(delay);
        info!(?requested, "Enabling filters");
        controller.set_filters(requested);
    }
    thread::sleep(total.saturating_sub(started.elapsed()));

    print_settings(&controller);
    check(controller.stop_capture(), "stop_capture")?;
    let stats = controller.stats();
    controller.destroy();

    let delivered = sink.frames.load(Ordering::Relaxed);
    println!("Delivered {} frames in {:.1}s", delivered, started.elapsed().as_secs_f64());
    println!("Stats: {}", stats);

    if let Some(path) = &args.snapshot {
        write_snapshot(&sink, path)?;
        println!("Snapshot written to {}", path.display());
    }
    Ok(())
}

fn check(status: i32, operation: &str) -> Result<()> {
    if status == STATUS_OK {
        Ok(())
    } else {
        Err(anyhow!("{} failed with status {}", operation, status))
    }
}

fn print_settings(controller: &CaptureController) {
    let s = controller.get_capture_settings();
    println!(
        "Capture: {}x{} @ {} fps, {} (filtering {})",
        s.width,
        s.height,
        s.frame_rate,
        s.pixel_format,
        if controller.is_filtering_active() { "on" } else { "off" }
    );
}

fn write_snapshot(sink: &RecordingSink, path: &Path) -> Result<()> {
    let last = sink
        .last
        .lock()
        .map_err(|_| anyhow!("snapshot lock poisoned"))?
        .take()
        .ok_or_else(|| anyhow!("no frame was delivered"))?;

    match last.format {
        PixelFormat::Rgba | PixelFormat::Bgra => {
            let mut data = last.data;
            if last.format == PixelFormat::Bgra {
                for px in data.chunks_exact_mut(4) {
                    px.swap(0, 2);
                }
            }
            let len = last.width as usize * last.height as usize * 4;
            data.truncate(len);
            let img = image::RgbaImage::from_raw(last.width, last.height, data)
                .ok_or_else(|| anyhow!("snapshot buffer too small"))?;
            img.save(path).with_context(|| format!("writing {}", path.display()))?;
        }
        PixelFormat::Nv21 => {
            // Luma plane only.
            let mut data = last.data;
            data.truncate(last.width as usize * last.height as usize);
            let img = image::GrayImage::from_raw(last.width, last.height, data)
                .ok_or_else(|| anyhow!("snapshot buffer too small"))?;
            img.save(path).with_context(|| format!("writing {}", path.display()))?;
        }
    }
    Ok(())
}

/// Parse duration string like "30s", "2m" into seconds
fn parse_duration(duration: &str) -> Result<u64> {
    if let Ok(seconds) = duration.parse::<u64>() {
        return Ok(seconds);
    }

    let (num_str, multiplier) = if let Some(num) = duration.strip_suffix('s') {
        (num, 1)
    } else if let Some(num) = duration.strip_suffix('m') {
        (num, 60)
    } else {
        return Err(anyhow!(
            "Invalid duration format: {}. Use 's' for seconds, 'm' for minutes",
            duration
        ));
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| anyhow!("Invalid number in duration: {}", num_str))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| anyhow!("Duration too large: {}", duration))
}
