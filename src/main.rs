//! Demo host: a synthetic camera thread feeding the preview, rendered for a
//! fixed number of frames on the GPU (or the headless device without one)

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use clap::Parser;
use edge_preview::{EdgePreview, FrameSink, GpuDevice, HeadlessDevice, PreviewConfig, WgpuDevice};

/// Run the edge preview against a moving-square test pattern
#[derive(Debug, Parser)]
#[command(name = "edge-preview", version)]
struct Args {
    /// Number of frames to produce and draw
    #[arg(long, default_value_t = 120)]
    frames: u32,

    /// Camera frame width in pixels
    #[arg(long, default_value_t = 320)]
    width: u32,

    /// Camera frame height in pixels
    #[arg(long, default_value_t = 240)]
    height: u32,

    /// Padding bytes at the end of each camera row
    #[arg(long, default_value_t = 16)]
    stride_padding: usize,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip the GPU and record draws with the headless device
    #[arg(long)]
    headless: bool,

    /// Save the latest filtered frame as PNG
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Save the rendered output as PNG (GPU only)
    #[arg(long)]
    render_out: Option<PathBuf>,
}

const BACKGROUND: u8 = 40;
const SQUARE: u8 = 200;
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Luma plane with a bright square that slides across a dark background
fn test_pattern(args: &Args, index: u32) -> Vec<u8> {
    let (width, height) = (args.width as usize, args.height as usize);
    let stride = width + args.stride_padding;
    let side = (width.min(height) / 4).max(1);
    let x0 = (index as usize * 3) % width.saturating_sub(side).max(1);
    let y0 = (height - side.min(height)) / 2;

    let mut plane = vec![0u8; stride * height];
    for (y, row) in plane.chunks_exact_mut(stride).enumerate() {
        for (x, pixel) in row[..width].iter_mut().enumerate() {
            let inside = (x0..x0 + side).contains(&x) && (y0..y0 + side).contains(&y);
            *pixel = if inside { SQUARE } else { BACKGROUND };
        }
    }
    plane
}

fn spawn_camera(sink: FrameSink, args: &Args) -> thread::JoinHandle<u32> {
    let planes: Vec<Vec<u8>> = (0..args.frames).map(|i| test_pattern(args, i)).collect();
    let (width, height) = (args.width, args.height);
    let stride = args.width as usize + args.stride_padding;

    thread::spawn(move || {
        let mut accepted = 0;
        for plane in &planes {
            if sink.is_closed() {
                break;
            }
            if sink.on_frame_available(plane, width, height, stride) {
                accepted += 1;
            }
            thread::sleep(FRAME_INTERVAL / 2);
        }
        accepted
    })
}

/// Init, create the surface, draw `args.frames` frames while the camera runs
fn drive<D: GpuDevice>(preview: &mut EdgePreview<D>, device: D, args: &Args) {
    preview.on_init(device);
    preview.on_surface_created();
    preview.on_surface_resized(args.width, args.height);

    let camera = preview.frame_sink().map(|sink| spawn_camera(sink, args));

    for _ in 0..args.frames {
        let rate = preview.on_draw_frame();
        tracing::trace!(rate, "draw");
        thread::sleep(FRAME_INTERVAL);
    }

    if let Some(camera) = camera {
        match camera.join() {
            Ok(accepted) => tracing::info!(accepted, "camera finished"),
            Err(_) => tracing::error!("camera thread panicked"),
        }
    }
    // Show whatever the camera produced last
    preview.on_draw_frame();

    if let Some(stats) = preview.stats() {
        tracing::info!(
            published = stats.frames.published,
            taken = stats.frames.taken,
            dropped = stats.frames.dropped,
            rejected = stats.frames.rejected,
            fps = stats.rate,
            "preview stats"
        );
    }
}

fn save_snapshot<D: GpuDevice>(preview: &EdgePreview<D>, path: &Path) -> edge_preview::Result<()> {
    match preview.snapshot() {
        Some(image) => {
            image.save(path)?;
            tracing::info!(path = %path.display(), "filtered frame saved");
        }
        None => tracing::warn!("no filtered frame to save"),
    }
    Ok(())
}

fn save_render(preview: &EdgePreview<WgpuDevice>, path: &Path) -> edge_preview::Result<()> {
    let Some(session) = preview.session() else {
        return Ok(());
    };
    match session.device().read_target()? {
        Some((width, height, rgba)) => match image::RgbaImage::from_raw(width, height, rgba) {
            Some(image) => {
                image.save(path)?;
                tracing::info!(path = %path.display(), width, height, "render output saved");
            }
            None => tracing::warn!("render target readback had the wrong size"),
        },
        None => tracing::warn!("nothing rendered yet"),
    }
    Ok(())
}

fn main() -> edge_preview::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("edge_preview=info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => PreviewConfig::load(path)?,
        None => PreviewConfig::default(),
    };

    if !args.headless {
        match pollster::block_on(WgpuDevice::new(&config.gpu)) {
            Ok(device) => {
                let mut preview = EdgePreview::new(config);
                drive(&mut preview, device, &args);
                if let Some(path) = &args.snapshot {
                    save_snapshot(&preview, path)?;
                }
                if let Some(path) = &args.render_out {
                    save_render(&preview, path)?;
                }
                preview.on_destroy();
                return Ok(());
            }
            Err(err) => tracing::warn!(%err, "GPU unavailable, using headless device"),
        }
    }

    if args.render_out.is_some() {
        tracing::warn!("--render-out needs a GPU device; ignored");
    }
    let mut preview = EdgePreview::new(config);
    drive(&mut preview, HeadlessDevice::new(), &args);
    if let Some(session) = preview.session() {
        tracing::info!(
            frames = session.device().frames().len(),
            uploads = session.device().uploads(),
            "headless device summary"
        );
    }
    if let Some(path) = &args.snapshot {
        save_snapshot(&preview, path)?;
    }
    preview.on_destroy();
    Ok(())
}
