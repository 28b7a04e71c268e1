//! Error types shared across loading, rendering and the interactive session.
//!
//! Failures are tagged by kind so callers can tell a fatal background load
//! apart from a skipped mesh or an aborted render loop without matching on
//! message text.

use std::path::PathBuf;

use crate::geometry::GeometryError;

/// Failure while loading the session's assets.
#[derive(thiserror::Error, Debug)]
pub enum AssetLoadError {
    #[error("image file not found or unreadable at {}: {source}", path.display())]
    Background {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("could not load {}: {source}", path.display())]
    Mesh {
        path: PathBuf,
        #[source]
        source: GeometryError,
    },

    #[error("the object file at {} is empty or invalid", path.display())]
    EmptyMesh { path: PathBuf },
}

impl AssetLoadError {
    /// Only a missing background terminates the process with a failure.
    /// Mesh failures skip the interactive phase and exit normally.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Background { .. })
    }
}

/// Failure while rendering, compositing or presenting a frame.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("window error: {0}")]
    Window(String),

    #[error("no suitable GPU adapter: {0}")]
    Adapter(String),

    #[error("GPU device error: {0}")]
    Device(String),

    #[error("surface error: {0}")]
    Surface(String),

    #[error("readback failed: {0}")]
    Readback(String),

    #[error("buffer size mismatch: expected {expected:?}, got {actual:?}")]
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

impl RenderError {
    pub fn window(msg: impl Into<String>) -> Self {
        Self::Window(msg.into())
    }

    pub fn surface(msg: impl Into<String>) -> Self {
        Self::Surface(msg.into())
    }

    pub fn readback(msg: impl Into<String>) -> Self {
        Self::Readback(msg.into())
    }
}

/// Tagged result of a session that did not end with the escape key.
#[derive(thiserror::Error, Debug)]
pub enum OverlayError {
    #[error(transparent)]
    AssetLoad(#[from] AssetLoadError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl OverlayError {
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::AssetLoad(e) => e.is_fatal(),
            Self::Render(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_background_failures_are_fatal() {
        let background = AssetLoadError::Background {
            path: PathBuf::from("missing.jpg"),
            source: image::ImageError::IoError(std::io::Error::from(
                std::io::ErrorKind::NotFound,
            )),
        };
        let empty = AssetLoadError::EmptyMesh {
            path: PathBuf::from("empty.stl"),
        };

        assert!(background.is_fatal());
        assert!(!empty.is_fatal());
        assert!(OverlayError::from(background).is_fatal());
        assert!(!OverlayError::from(RenderError::readback("lost")).is_fatal());
    }

    #[test]
    fn empty_mesh_message_names_the_path() {
        let err = AssetLoadError::EmptyMesh {
            path: PathBuf::from("models/part.stl"),
        };
        assert_eq!(
            err.to_string(),
            "the object file at models/part.stl is empty or invalid"
        );
    }
}
