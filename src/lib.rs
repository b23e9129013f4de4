//! Face-tracking overlay rendering: draws detected landmarks, a valence
//! colored box, appearance and emoji markers, and the dominant emotion onto a
//! surface from a background render loop, with on-demand captures.

pub mod assets;
pub mod config;
pub mod draw;
pub mod error;
pub mod face;
pub mod faces;
pub mod metrics;
pub mod renderer;
pub mod screenshot;
pub mod shapes;
pub mod surface;
pub mod view;

pub use assets::{AssetStore, BundledStore, DirStore, MarkerCache};
pub use config::{RendererOptions, Style, ViewConfig};
pub use error::{OverlayError, Result};
pub use face::DetectedFace;
pub use renderer::{CaptureListener, RenderLoop, RenderState, channel_listener};
pub use surface::{SharedSurface, Surface};
pub use view::OverlayView;
