#![warn(unused_extern_crates)]
use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use emolay::assets::install_all_markers;
use emolay::screenshot::save_screenshot;
use emolay::{
    AssetStore, BundledStore, DetectedFace, DirStore, OverlayView, RendererOptions,
    SharedSurface, Style, channel_listener,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, debug, info, span, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct CmdArgs {
    /// Camera frame to draw the overlay for
    #[arg(long, value_name = "PNG")]
    frame: PathBuf,

    /// Detected faces for the frame, as a JSON array
    #[arg(long, value_name = "JSON")]
    faces: PathBuf,

    /// Local marker storage, checked before packaged resources
    #[arg(long, value_name = "DIR")]
    assets: Option<PathBuf>,

    /// Packaged marker resources
    #[arg(long, value_name = "DIR")]
    resources: Option<PathBuf>,

    /// Install packaged markers into storage at this display density first
    #[arg(long, requires_all = ["assets", "resources"])]
    density: Option<f32>,

    /// Style file (colors, text sizes, font path)
    #[arg(long, value_name = "JSON")]
    style: Option<PathBuf>,

    /// Font for labels, overrides the style's font
    #[arg(long, value_name = "TTF")]
    font: Option<PathBuf>,

    /// Faces were detected on a mirrored preview
    #[arg(long)]
    mirror: bool,

    #[arg(long, default_value = "2")]
    thickness: i32,

    #[arg(long)]
    no_points: bool,

    #[arg(long)]
    no_appearance: bool,

    #[arg(long)]
    no_emoji: bool,

    #[arg(short, long, default_value = "screenshots")]
    output_dir: PathBuf,

    /// Also save the frame without overlay
    #[arg(long)]
    raw: bool,

    /// Max time (ms) to wait for the capture
    #[arg(long, default_value = "2000")]
    timeout_ms: u64,
}

fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env();
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_env_filter(filter)
        .init();

    let args = CmdArgs::parse();

    let frame = image::open(&args.frame)
        .with_context(|| format!("Failed to read frame {:?}", args.frame))?
        .into_rgba8();
    let faces: Vec<DetectedFace> = serde_json::from_str(
        &std::fs::read_to_string(&args.faces)
            .with_context(|| format!("Failed to read faces {:?}", args.faces))?,
    )?;
    debug!("Loaded {} faces", faces.len());

    let mut style = match &args.style {
        Some(path) => Style::load(path)?,
        None => Style::default(),
    };
    if let Some(font) = &args.font {
        style.load_font(font)?;
    }
    if style.font.is_none() {
        warn!("No font configured, emotion labels will be skipped");
    }

    let packaged: Arc<dyn AssetStore> = match &args.resources {
        Some(dir) => Arc::new(BundledStore::from_dir(dir)?),
        None => Arc::new(BundledStore::new()),
    };
    let storage: Arc<dyn AssetStore> = match &args.assets {
        Some(dir) => {
            let store = DirStore::new(dir);
            if let Some(density) = args.density {
                let installed = install_all_markers(&store, packaged.as_ref(), density)?;
                info!("Installed {installed} markers into {dir:?}");
            }
            Arc::new(store)
        }
        None => Arc::new(BundledStore::new()),
    };

    let (width, height) = frame.dimensions();
    let mut view = OverlayView::new(storage, packaged, style, RendererOptions::default());

    view.set_geometry(width as i32, height as i32, width as i32, height as i32)?;
    view.set_draw_thickness(args.thickness)?;
    view.set_draw_points(!args.no_points);
    view.set_draw_appearance_markers(!args.no_appearance);
    view.set_draw_emoji_markers(!args.no_emoji);

    let (listener, captures) = channel_listener();
    view.set_capture_listener(Some(listener));
    view.update_faces(faces, args.mirror);
    view.start(Box::new(SharedSurface::new(width, height)))?;

    let capture = {
        let span = span!(Level::DEBUG, "capture");
        let _guard = span.enter();

        view.request_capture()?;
        captures
            .recv_timeout(Duration::from_millis(args.timeout_ms))
            .context("Timed out waiting for the overlay capture")?
    };

    view.teardown()?;

    let saved = save_screenshot(&args.output_dir, &Local::now(), &frame, &capture, args.raw)?;
    info!("Screenshot at {:?}", saved.composed);
    if let Some(raw) = saved.raw {
        info!("Raw frame at {raw:?}");
    }

    Ok(())
}
