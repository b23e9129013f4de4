use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error, warn};

use crate::assets::{AssetStore, MarkerCache};
use crate::config::{RendererOptions, Style, ViewConfig};
use crate::error::{OverlayError, Result};
use crate::face::DetectedFace;
use crate::faces::FaceFrameBuffer;
use crate::renderer::{CaptureListener, ListenerSlot, RenderContext, RenderLoop, RenderState};
use crate::surface::Surface;

/// The host's handle on the overlay: geometry, toggles, the latest faces,
/// and the render loop drawing them.
pub struct OverlayView {
    config: Arc<ViewConfig>,
    faces: Arc<FaceFrameBuffer>,
    style: Arc<Style>,
    listener: ListenerSlot,
    options: RendererOptions,
    storage: Arc<dyn AssetStore>,
    packaged: Arc<dyn AssetStore>,
    // Held here whenever no loop is running
    cache: Option<MarkerCache>,
    render: Option<RenderLoop>,
}

impl OverlayView {
    pub fn new(
        storage: Arc<dyn AssetStore>,
        packaged: Arc<dyn AssetStore>,
        style: Style,
        options: RendererOptions,
    ) -> Self {
        Self {
            config: Arc::new(ViewConfig::new()),
            faces: Arc::new(FaceFrameBuffer::new(options.max_faces)),
            style: Arc::new(style),
            listener: Arc::new(RwLock::new(None)),
            options,
            cache: Some(MarkerCache::new(Arc::clone(&storage), Arc::clone(&packaged))),
            storage,
            packaged,
            render: None,
        }
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn faces(&self) -> &FaceFrameBuffer {
        &self.faces
    }

    pub fn update_faces(&self, faces: Vec<DetectedFace>, mirrored: bool) {
        self.faces.replace(faces, mirrored);
    }

    /// Faces are no longer valid, e.g. detection stopped.
    pub fn clear_faces(&self) {
        self.faces.clear();
    }

    pub fn set_geometry(
        &self,
        surface_width: i32,
        surface_height: i32,
        image_width: i32,
        image_height: i32,
    ) -> Result<()> {
        self.config
            .update_dimensions(surface_width, surface_height, image_width, image_height)
            .inspect_err(|e| error!("Rejected view dimensions: {e}"))
    }

    pub fn is_dimensions_needed(&self) -> bool {
        self.config.is_dimensions_needed()
    }

    pub fn invalidate_dimensions(&self) {
        self.config.invalidate_dimensions();
    }

    pub fn set_draw_thickness(&self, thickness: i32) -> Result<()> {
        self.config
            .set_draw_thickness(thickness)
            .inspect_err(|e| error!("Rejected draw thickness: {e}"))
    }

    pub fn set_draw_points(&self, enabled: bool) {
        self.config.set_draw_points(enabled);
    }

    pub fn draw_points(&self) -> bool {
        self.config.draw_points()
    }

    pub fn set_draw_appearance_markers(&self, enabled: bool) {
        self.config.set_draw_appearance_markers(enabled);
    }

    pub fn draw_appearance_markers(&self) -> bool {
        self.config.draw_appearance_markers()
    }

    pub fn set_draw_emoji_markers(&self, enabled: bool) {
        self.config.set_draw_emoji_markers(enabled);
    }

    pub fn draw_emoji_markers(&self) -> bool {
        self.config.draw_emoji_markers()
    }

    pub fn set_capture_listener(&self, listener: Option<Arc<dyn CaptureListener>>) {
        *self.listener.write().unwrap_or_else(PoisonError::into_inner) = listener;
    }

    pub fn set_capture_fn<F>(&self, f: F)
    where
        F: Fn(image::RgbaImage) + Send + Sync + 'static,
    {
        let listener: Arc<dyn CaptureListener> = Arc::new(f);
        self.set_capture_listener(Some(listener));
    }

    pub fn state(&self) -> RenderState {
        self.render
            .as_ref()
            .map_or(RenderState::Stopped, RenderLoop::state)
    }

    pub fn is_running(&self) -> bool {
        self.state() == RenderState::Running
    }

    /// Asks the render loop to deliver its next frame to the capture
    /// listener.
    pub fn request_capture(&self) -> Result<()> {
        let has_listener = self
            .listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        if !has_listener {
            let e = OverlayError::NoCaptureListener;
            error!("{e}");
            return Err(e);
        }

        match &self.render {
            Some(render) if render.state() == RenderState::Running => {
                if !render.request_capture() {
                    debug!("Capture already pending");
                }
                Ok(())
            }
            _ => {
                let e = OverlayError::RendererNotRunning;
                error!("{e}");
                Err(e)
            }
        }
    }

    /// Starts a fresh render loop drawing onto `surface`.
    pub fn start(&mut self, surface: Box<dyn Surface>) -> Result<()> {
        if let Some(render) = &self.render {
            if render.state() != RenderState::Stopped {
                return Err(OverlayError::AlreadyRunning);
            }
            // Only a panic ends a loop without a stop request
            if let Err(e) = self.stop() {
                warn!("Replacing render loop that ended abnormally: {e}");
            }
        }

        // Lost with a panicked render thread
        let cache = self.cache.take().unwrap_or_else(|| {
            MarkerCache::new(Arc::clone(&self.storage), Arc::clone(&self.packaged))
        });

        let ctx = RenderContext {
            faces: Arc::clone(&self.faces),
            config: Arc::clone(&self.config),
            style: Arc::clone(&self.style),
            listener: Arc::clone(&self.listener),
            options: self.options,
        };

        self.render = Some(RenderLoop::spawn(surface, cache, ctx)?);
        debug!("Overlay render loop started");

        Ok(())
    }

    /// Stops the render loop and waits for it to exit, returning its surface.
    /// `Ok(None)` when nothing was running.
    pub fn stop(&mut self) -> Result<Option<Box<dyn Surface>>> {
        let Some(render) = self.render.take() else {
            return Ok(None);
        };

        match render.stop() {
            Ok(stopped) => {
                debug!("Overlay render loop stopped after {} iterations", stopped.iterations);
                self.cache = Some(stopped.cache);
                Ok(Some(stopped.surface))
            }
            Err(e) => Err(e),
        }
    }

    /// Stops the loop if needed, then releases every cached marker image.
    /// The view can be started again afterwards; markers reload on demand.
    pub fn teardown(&mut self) -> Result<Option<Box<dyn Surface>>> {
        let surface = self.stop()?;

        if let Some(cache) = self.cache.as_mut() {
            cache.teardown();
        }

        Ok(surface)
    }

    pub fn cached_markers(&self) -> usize {
        self.cache.as_ref().map_or(0, MarkerCache::len)
    }
}

impl Drop for OverlayView {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            error!("Failed to stop overlay render loop: {e:?}");
        }
    }
}
