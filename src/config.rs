//! Runtime configuration.
//!
//! Every field has a built-in default, so the app runs with no file at all.
//! An `overlay3d.toml` next to the working directory overrides any subset:
//!
//! ```toml
//! background = "photos/cell.png"
//! mesh = "parts/bracket.glb"
//! renderer = "software"
//!
//! [light]
//! intensity = 2.0
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::render::RendererKind;
use crate::scene::DirectionalLight;

/// File looked up in the working directory by the binary.
pub const CONFIG_FILE: &str = "overlay3d.toml";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSection {
    pub yfov_degrees: f32,
    /// Distance from the origin along +Z.
    pub distance: f32,
    pub znear: f32,
}

impl Default for CameraSection {
    fn default() -> Self {
        Self {
            yfov_degrees: 60.0,
            distance: 5.0,
            znear: 0.05,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightSection {
    pub color: [f32; 3],
    pub intensity: f32,
}

impl Default for LightSection {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0],
            intensity: 3.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub background: PathBuf,
    pub mesh: PathBuf,
    pub title: String,
    /// Applied to the mesh once at load, before any interactive scaling.
    pub mesh_scale: f32,
    /// How long each frame waits for a key.
    pub poll_interval_ms: u64,
    pub renderer: RendererKind,
    /// Linear RGB albedo of the mesh.
    pub mesh_color: [f32; 3],
    pub camera: CameraSection,
    pub light: LightSection,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            background: PathBuf::from("robot_cell.jpg"),
            mesh: PathBuf::from("assembly_stiffener_stp.obj"),
            title: "Image with 3D Object Overlay".to_string(),
            mesh_scale: 0.05,
            poll_interval_ms: 10,
            renderer: RendererKind::Gpu,
            mesh_color: [0.4, 0.4, 0.4],
            camera: CameraSection::default(),
            light: LightSection::default(),
        }
    }
}

impl OverlayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `path`, or returns the defaults when it does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no {} found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn background(mut self, path: impl Into<PathBuf>) -> Self {
        self.background = path.into();
        self
    }

    pub fn mesh(mut self, path: impl Into<PathBuf>) -> Self {
        self.mesh = path.into();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn mesh_scale(mut self, scale: f32) -> Self {
        self.mesh_scale = scale;
        self
    }

    pub fn renderer(mut self, kind: RendererKind) -> Self {
        self.renderer = kind;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn camera(&self) -> Camera {
        Camera::new()
            .at(0.0, 0.0, self.camera.distance)
            .with_fov(self.camera.yfov_degrees)
            .with_znear(self.camera.znear)
    }

    pub fn light(&self) -> DirectionalLight {
        DirectionalLight {
            color: Vec3::from(self.light.color),
            intensity: self.light.intensity,
            ..DirectionalLight::default()
        }
    }

    pub fn base_color(&self) -> Vec3 {
        Vec3::from(self.mesh_color)
    }
}
