use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OverlayError>;

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error(
        "all dimensions must be positive, got surface {surface_width}x{surface_height} and image {image_width}x{image_height}"
    )]
    InvalidDimensions {
        surface_width: i32,
        surface_height: i32,
        image_width: i32,
        image_height: i32,
    },

    #[error("draw thickness must be positive, got {0}")]
    InvalidThickness(i32),

    #[error("marker asset not found: {0}")]
    AssetNotFound(String),

    #[error("unable to decode marker asset {name}: {source}")]
    AssetDecode {
        name: String,
        #[source]
        source: image::ImageError,
    },

    #[error("capture requested without first attaching a capture listener")]
    NoCaptureListener,

    #[error("capture requested without a running render loop")]
    RendererNotRunning,

    #[error("render loop is already running")]
    AlreadyRunning,

    #[error("unable to spawn render thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("render thread panicked")]
    RenderThreadPanicked,

    #[error("invalid color {0:?}, expected #rrggbb or #aarrggbb")]
    InvalidColor(String),

    #[error("invalid font at {0:?}")]
    InvalidFont(PathBuf),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to write image {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("unable to parse style {path:?}: {source}")]
    Style {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
