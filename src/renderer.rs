use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use image::RgbaImage;
use tracing::{Level, debug, span, trace, warn};

use crate::assets::MarkerCache;
use crate::config::{FrameSettings, RendererOptions, Style, ViewConfig};
use crate::draw::FacePainter;
use crate::error::{OverlayError, Result};
use crate::faces::FaceFrameBuffer;
use crate::surface::{CanvasGuard, Surface};

/// Receives the still image of a satisfied capture request. Called from the
/// render thread after the surface has been released.
pub trait CaptureListener: Send + Sync {
    fn on_capture_ready(&self, image: RgbaImage);
}

impl<F> CaptureListener for F
where
    F: Fn(RgbaImage) + Send + Sync,
{
    fn on_capture_ready(&self, image: RgbaImage) {
        self(image)
    }
}

/// Listener that forwards captures into a channel.
pub fn channel_listener() -> (Arc<dyn CaptureListener>, flume::Receiver<RgbaImage>) {
    let (tx, rx) = flume::unbounded();
    let listener = move |img: RgbaImage| {
        if tx.send(img).is_err() {
            warn!("Capture receiver dropped, discarding capture");
        }
    };

    (Arc::new(listener), rx)
}

/// Listener shared by the host and the render loop; swapping it takes effect
/// for the next delivered capture.
pub type ListenerSlot = Arc<RwLock<Option<Arc<dyn CaptureListener>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Running,
    StopRequested,
    Stopped,
}

/// Everything the render thread shares with the host.
#[derive(Clone)]
pub struct RenderContext {
    pub faces: Arc<FaceFrameBuffer>,
    pub config: Arc<ViewConfig>,
    pub style: Arc<Style>,
    pub listener: ListenerSlot,
    pub options: RendererOptions,
}

#[derive(Default)]
struct Signals {
    stop: AtomicBool,
    capture: AtomicBool,
    iterations: AtomicU64,
}

/// What a joined render loop hands back: its surface, for a replacement
/// loop, and its marker cache, for reuse or teardown.
pub struct Stopped {
    pub surface: Box<dyn Surface>,
    pub cache: MarkerCache,
    pub iterations: u64,
}

/// Handle to a running render thread. A stopped loop is never resumed;
/// spawn a new one with the surface returned from [`RenderLoop::stop`].
pub struct RenderLoop {
    signals: Arc<Signals>,
    handle: JoinHandle<(Box<dyn Surface>, MarkerCache)>,
}

impl RenderLoop {
    pub fn spawn(surface: Box<dyn Surface>, cache: MarkerCache, ctx: RenderContext) -> Result<RenderLoop> {
        let signals = Arc::new(Signals::default());
        let worker = Worker {
            surface,
            cache,
            ctx,
            signals: Arc::clone(&signals),
        };

        let handle = thread::Builder::new()
            .name("overlay-render".to_string())
            .spawn(move || worker.run())
            .map_err(OverlayError::Spawn)?;

        Ok(RenderLoop { signals, handle })
    }

    pub fn state(&self) -> RenderState {
        if self.handle.is_finished() {
            RenderState::Stopped
        } else if self.signals.stop.load(Ordering::Acquire) {
            RenderState::StopRequested
        } else {
            RenderState::Running
        }
    }

    /// Asks for the next drawn frame to also be delivered as a still image.
    /// Returns `false` when a capture was already pending; the two are
    /// served by one image.
    pub fn request_capture(&self) -> bool {
        !self.signals.capture.swap(true, Ordering::AcqRel)
    }

    pub fn iterations(&self) -> u64 {
        self.signals.iterations.load(Ordering::Acquire)
    }

    /// Flags the loop to exit after its current iteration without waiting.
    pub fn request_stop(&self) {
        self.signals.stop.store(true, Ordering::Release);
    }

    /// Stops the loop and waits for the thread to exit. Once this returns no
    /// draw call touches the returned cache, so it is safe to tear down. A
    /// capture still pending is dropped.
    pub fn stop(self) -> Result<Stopped> {
        self.request_stop();

        let (surface, cache) = self
            .handle
            .join()
            .map_err(|_| OverlayError::RenderThreadPanicked)?;

        if self.signals.capture.load(Ordering::Acquire) {
            debug!("Dropping capture request pending at stop");
        }

        Ok(Stopped {
            surface,
            cache,
            iterations: self.signals.iterations.load(Ordering::Acquire),
        })
    }
}

struct Worker {
    surface: Box<dyn Surface>,
    cache: MarkerCache,
    ctx: RenderContext,
    signals: Arc<Signals>,
}

impl Worker {
    fn run(mut self) -> (Box<dyn Surface>, MarkerCache) {
        debug!("Render loop started");

        while !self.signals.stop.load(Ordering::Acquire) {
            let start = Instant::now();
            self.iterate();
            self.signals.iterations.fetch_add(1, Ordering::AcqRel);

            if let Some(rest) = self.ctx.options.frame_interval.checked_sub(start.elapsed()) {
                thread::sleep(rest);
            }
        }

        debug!(
            "Render loop stopped after {} iterations",
            self.signals.iterations.load(Ordering::Acquire)
        );

        let Worker { surface, cache, .. } = self;
        (surface, cache)
    }

    fn iterate(&mut self) {
        let span = span!(Level::TRACE, "render_iter");
        let _guard = span.enter();

        let settings = self.ctx.config.frame_settings();
        let dimensions_ready = !self.ctx.config.is_dimensions_needed();
        let mut capture = None;

        {
            let Some(mut canvas) = CanvasGuard::acquire(self.surface.as_mut()) else {
                trace!("Surface unavailable, skipping frame");
                return;
            };

            if self.signals.capture.swap(false, Ordering::AcqRel) {
                let (width, height) = canvas.canvas().dimensions();
                capture = Some(RgbaImage::new(width, height));
            }

            canvas.clear();
            if dimensions_ready {
                draw_frame(
                    canvas.canvas(),
                    capture.as_mut(),
                    &settings,
                    &self.ctx,
                    &mut self.cache,
                );
            }
            // Canvas posted here, before the capture goes out
        }

        if let Some(img) = capture {
            self.deliver(img);
        }
    }

    fn deliver(&self, img: RgbaImage) {
        let listener = self
            .ctx
            .listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match listener {
            Some(listener) => {
                debug!("Delivering {}x{} capture", img.width(), img.height());
                listener.on_capture_ready(img);
            }
            None => warn!("Capture ready without a listener, dropping it"),
        }
    }
}

/// Paints the latest faces onto `canvas`, and unmirrored onto `capture` when
/// a capture is being taken.
///
/// The mirror flag is re-read before every face after the first, so a toggle
/// landing mid-frame applies to the faces not yet drawn.
fn draw_frame(
    canvas: &mut RgbaImage,
    mut capture: Option<&mut RgbaImage>,
    settings: &FrameSettings,
    ctx: &RenderContext,
    cache: &mut MarkerCache,
) {
    let snapshot = ctx.faces.snapshot();
    if snapshot.is_empty() {
        return;
    }

    let painter = FacePainter {
        settings,
        style: &ctx.style,
    };
    let multi_face = snapshot.is_multi_face();

    for (idx, face) in snapshot.faces.iter().enumerate() {
        let mirrored = if idx == 0 {
            snapshot.mirrored
        } else {
            ctx.faces.is_mirrored()
        };

        painter.draw_face(canvas, face, mirrored, multi_face, cache);

        if let Some(capture) = capture.as_deref_mut() {
            painter.draw_face(capture, face, false, multi_face, cache);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetStore, BundledStore};
    use crate::face::DetectedFace;
    use crate::shapes::point::PointF32;
    use crate::surface::SharedSurface;
    use image::Rgba;
    use std::time::Duration;

    fn context() -> RenderContext {
        RenderContext {
            faces: Arc::new(FaceFrameBuffer::new(5)),
            config: Arc::new(ViewConfig::new()),
            style: Arc::new(Style::default()),
            listener: Arc::new(RwLock::new(None)),
            options: RendererOptions {
                frame_interval: Duration::from_millis(2),
                max_faces: 5,
            },
        }
    }

    fn cache() -> MarkerCache {
        MarkerCache::new(Arc::new(BundledStore::new()), Arc::new(BundledStore::new()))
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let start = Instant::now();
        while !cond() {
            assert!(start.elapsed() < Duration::from_secs(5), "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_state_machine() {
        let surface = SharedSurface::new(8, 8);
        let render = RenderLoop::spawn(Box::new(surface.clone()), cache(), context()).unwrap();
        assert_eq!(render.state(), RenderState::Running);

        wait_for(|| surface.frames_posted() > 0);

        render.request_stop();
        assert_ne!(render.state(), RenderState::Running);
        wait_for(|| render.state() == RenderState::Stopped);

        let stopped = render.stop().unwrap();
        assert!(stopped.iterations > 0);
    }

    #[test]
    fn test_capture_requests_coalesce() {
        let surface = SharedSurface::new(8, 8);
        // Keep the loop from locking a canvas so neither request is served yet
        surface.set_available(false);

        let ctx = context();
        let (listener, captures) = channel_listener();
        *ctx.listener.write().unwrap() = Some(listener);

        let render = RenderLoop::spawn(Box::new(surface.clone()), cache(), ctx).unwrap();
        assert!(render.request_capture());
        assert!(!render.request_capture());

        surface.set_available(true);
        let img = captures.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(img.dimensions(), (8, 8));

        let served_at = render.iterations();
        wait_for(|| render.iterations() > served_at + 3);
        assert!(captures.try_recv().is_err());

        render.stop().unwrap();
    }

    #[test]
    fn test_unavailable_surface_is_retried() {
        let surface = SharedSurface::new(8, 8);
        surface.set_available(false);

        let render = RenderLoop::spawn(Box::new(surface.clone()), cache(), context()).unwrap();
        wait_for(|| render.iterations() > 3);
        assert_eq!(surface.frames_posted(), 0);

        surface.set_available(true);
        wait_for(|| surface.frames_posted() > 0);

        render.stop().unwrap();
    }

    #[test]
    fn test_capture_pending_at_stop_is_dropped() {
        let surface = SharedSurface::new(8, 8);
        surface.set_available(false);

        let ctx = context();
        let (listener, captures) = channel_listener();
        *ctx.listener.write().unwrap() = Some(listener);

        let render = RenderLoop::spawn(Box::new(surface.clone()), cache(), ctx).unwrap();
        assert!(render.request_capture());
        render.stop().unwrap();

        surface.set_available(true);
        thread::sleep(Duration::from_millis(20));
        assert!(captures.try_recv().is_err());
        assert_eq!(surface.frames_posted(), 0);
    }

    // Flips the mirror flag during the first face's marker lookup, then keeps
    // further frames from being posted.
    struct MirrorOnLoad {
        faces: Arc<FaceFrameBuffer>,
        surface: SharedSurface,
        fired: AtomicBool,
    }

    impl AssetStore for MirrorOnLoad {
        fn load(&self, _file_name: &str) -> Result<Option<RgbaImage>> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                let snapshot = self.faces.snapshot();
                self.faces.replace(snapshot.faces.to_vec(), true);
                self.surface.set_available(false);
            }
            Ok(None)
        }
    }

    fn face_at(left: f32, top: f32) -> DetectedFace {
        DetectedFace {
            points: vec![
                PointF32::new(left, top),
                PointF32::new(left + 20., top + 20.),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_mirror_flag_reread_per_face() {
        let white = Rgba([255, 255, 255, 255]);
        let clear = Rgba([0, 0, 0, 0]);
        let surface = SharedSurface::new(200, 200);

        let ctx = context();
        ctx.config.update_dimensions(200, 200, 100, 100).unwrap();
        ctx.config.set_draw_thickness(1).unwrap();
        // Face 0 covers (40, 40)-(80, 80), face 1 (120, 120)-(160, 160) unmirrored
        ctx.faces
            .replace(vec![face_at(20., 20.), face_at(60., 60.)], false);

        let storage = MirrorOnLoad {
            faces: Arc::clone(&ctx.faces),
            surface: surface.clone(),
            fired: AtomicBool::new(false),
        };
        let cache = MarkerCache::new(Arc::new(storage), Arc::new(BundledStore::new()));

        let render = RenderLoop::spawn(Box::new(surface.clone()), cache, ctx).unwrap();
        wait_for(|| surface.frames_posted() == 1);
        let iterations = render.iterations();
        wait_for(|| render.iterations() > iterations + 2);
        render.stop().unwrap();
        assert_eq!(surface.frames_posted(), 1);

        let frame = surface.front();
        // Face 0 drawn with the snapshot's flag
        assert_eq!(*frame.get_pixel(40, 60), white);
        assert_eq!(*frame.get_pixel(120, 60), clear);
        // Face 1 picked up the flip, mirrored to (40, 120)-(80, 160)
        assert_eq!(*frame.get_pixel(40, 140), white);
        assert_eq!(*frame.get_pixel(120, 140), clear);
    }

    // Resized by the host right after every lock.
    struct ResizeOnLock(SharedSurface);

    impl Surface for ResizeOnLock {
        fn lock_canvas(&mut self) -> Option<RgbaImage> {
            let canvas = self.0.lock_canvas()?;
            self.0.resize(16, 16);
            Some(canvas)
        }

        fn unlock_canvas_and_post(&mut self, canvas: RgbaImage) {
            self.0.unlock_canvas_and_post(canvas);
        }

        fn bounds(&self) -> (u32, u32) {
            self.0.bounds()
        }
    }

    #[test]
    fn test_capture_matches_locked_canvas() {
        let surface = SharedSurface::new(8, 8);
        surface.set_available(false);

        let ctx = context();
        let (listener, captures) = channel_listener();
        *ctx.listener.write().unwrap() = Some(listener);

        let render =
            RenderLoop::spawn(Box::new(ResizeOnLock(surface.clone())), cache(), ctx).unwrap();
        assert!(render.request_capture());
        surface.set_available(true);

        let img = captures.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(img.dimensions(), (8, 8));

        render.stop().unwrap();
    }
}
