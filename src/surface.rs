use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::{Rgba, RgbaImage};
use tracing::trace;

/// Drawable target of the render loop.
///
/// A canvas taken with [`Surface::lock_canvas`] must be handed back through
/// [`Surface::unlock_canvas_and_post`]; [`CanvasGuard`] does this on every
/// exit path.
pub trait Surface: Send {
    /// `None` while the surface is unavailable, e.g. mid resize or before it
    /// has been created.
    fn lock_canvas(&mut self) -> Option<RgbaImage>;

    fn unlock_canvas_and_post(&mut self, canvas: RgbaImage);

    /// Current surface size in pixels.
    fn bounds(&self) -> (u32, u32);
}

/// Exclusive access to one canvas of a [`Surface`], posted back when dropped.
pub struct CanvasGuard<'a> {
    surface: &'a mut dyn Surface,
    canvas: RgbaImage,
}

impl<'a> CanvasGuard<'a> {
    pub fn acquire(surface: &'a mut dyn Surface) -> Option<CanvasGuard<'a>> {
        let canvas = surface.lock_canvas()?;
        Some(CanvasGuard { surface, canvas })
    }

    pub fn canvas(&mut self) -> &mut RgbaImage {
        &mut self.canvas
    }

    /// Full transparent clear; every frame is a full repaint.
    pub fn clear(&mut self) {
        clear(self.canvas());
    }
}

impl Drop for CanvasGuard<'_> {
    fn drop(&mut self) {
        let canvas = std::mem::take(&mut self.canvas);
        self.surface.unlock_canvas_and_post(canvas);
    }
}

pub fn clear(img: &mut RgbaImage) {
    img.pixels_mut().for_each(|p| *p = Rgba([0, 0, 0, 0]));
}

struct SurfaceState {
    width: u32,
    height: u32,
    available: bool,
    locked: bool,
    back: Option<RgbaImage>,
    front: RgbaImage,
    posted: u64,
}

/// In-memory double-buffered surface. Clones share the same buffers, so the
/// host keeps a handle to read presented frames while the render loop owns
/// another.
#[derive(Clone)]
pub struct SharedSurface {
    state: Arc<Mutex<SurfaceState>>,
}

impl SharedSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(SurfaceState {
                width,
                height,
                available: true,
                locked: false,
                back: None,
                front: RgbaImage::new(width, height),
                posted: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Models surface lifecycle transitions; while unavailable no canvas can
    /// be locked.
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    pub fn resize(&self, width: u32, height: u32) {
        let mut state = self.lock();
        state.width = width;
        state.height = height;
        state.back = None;
        state.front = RgbaImage::new(width, height);
    }

    /// Copy of the last presented frame.
    pub fn front(&self) -> RgbaImage {
        self.lock().front.clone()
    }

    pub fn frames_posted(&self) -> u64 {
        self.lock().posted
    }
}

impl Surface for SharedSurface {
    fn lock_canvas(&mut self) -> Option<RgbaImage> {
        let mut state = self.lock();
        if !state.available || state.locked {
            return None;
        }

        let (width, height) = (state.width, state.height);
        let canvas = match state.back.take() {
            Some(back) if back.dimensions() == (width, height) => back,
            _ => RgbaImage::new(width, height),
        };
        state.locked = true;

        Some(canvas)
    }

    fn unlock_canvas_and_post(&mut self, canvas: RgbaImage) {
        let mut state = self.lock();
        state.locked = false;

        // Resized while locked: the stale canvas is dropped
        if canvas.dimensions() != (state.width, state.height) {
            trace!("Dropping canvas from before resize");
            return;
        }

        let previous = std::mem::replace(&mut state.front, canvas);
        state.back = Some(previous);
        state.posted += 1;
    }

    fn bounds(&self) -> (u32, u32) {
        let state = self.lock();
        (state.width, state.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_posts_on_drop() {
        let host = SharedSurface::new(4, 4);
        let mut surface = host.clone();

        {
            let mut guard = CanvasGuard::acquire(&mut surface).unwrap();
            guard.canvas().put_pixel(1, 1, Rgba([1, 2, 3, 4]));
        }

        assert_eq!(host.frames_posted(), 1);
        assert_eq!(*host.front().get_pixel(1, 1), Rgba([1, 2, 3, 4]));
    }

    #[test]
    fn test_guard_posts_on_unwind() {
        let host = SharedSurface::new(4, 4);
        let mut surface = host.clone();

        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = CanvasGuard::acquire(&mut surface).unwrap();
            panic!("draw failed");
        }));

        assert!(res.is_err());
        assert_eq!(host.frames_posted(), 1);
        // Released, so it can be locked again
        assert!(CanvasGuard::acquire(&mut surface).is_some());
    }

    #[test]
    fn test_unavailable_surface() {
        let host = SharedSurface::new(4, 4);
        let mut surface = host.clone();

        host.set_available(false);
        assert!(CanvasGuard::acquire(&mut surface).is_none());

        host.set_available(true);
        assert!(CanvasGuard::acquire(&mut surface).is_some());
    }

    #[test]
    fn test_single_lock_at_a_time() {
        let mut surface = SharedSurface::new(2, 2);
        let canvas = surface.lock_canvas().unwrap();
        assert!(surface.lock_canvas().is_none());
        surface.unlock_canvas_and_post(canvas);
        assert!(surface.lock_canvas().is_some());
    }

    #[test]
    fn test_resize_while_locked_drops_canvas() {
        let host = SharedSurface::new(2, 2);
        let mut surface = host.clone();

        let canvas = surface.lock_canvas().unwrap();
        host.resize(3, 3);
        surface.unlock_canvas_and_post(canvas);

        assert_eq!(host.frames_posted(), 0);
        assert_eq!(surface.bounds(), (3, 3));
        assert_eq!(surface.lock_canvas().unwrap().dimensions(), (3, 3));
    }

    #[test]
    fn test_clear() {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 9]));
        clear(&mut img);
        assert!(img.pixels().all(|p| *p == Rgba([0, 0, 0, 0])));
    }
}
