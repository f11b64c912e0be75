use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OverlayError>;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("link {link}: {field} {reason} (got {value:?})")]
    InvalidGeometry {
        link: usize,
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("failed to load icon {}: {reason}", .path.display())]
    IconLoadFailure { path: PathBuf, reason: String },

    #[error("unsupported media format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to encode {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid overlay spec: {0}")]
    Spec(String),

    #[error("encoder error: {0}")]
    Encoder(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OverlayError {
    pub fn kind(&self) -> &'static str {
        match self {
            OverlayError::InvalidGeometry { .. } => "invalid_geometry",
            OverlayError::IconLoadFailure { .. } => "icon_load_failure",
            OverlayError::UnsupportedFormat(_) => "unsupported_format",
            OverlayError::Decode { .. } => "decode",
            OverlayError::Encode { .. } => "encode",
            OverlayError::Spec(_) => "spec",
            OverlayError::Encoder(_) => "encoder",
            OverlayError::Io(_) => "io",
        }
    }
}
