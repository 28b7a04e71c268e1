//! # Overlay3d
//!
//! **Pose a 3D mesh over a photograph, one keypress at a time.**
//!
//! Loads a background image and a mesh (OBJ, STL or glTF), renders the mesh with a
//! fixed camera and light, and composites it over the image wherever the
//! render has depth. The keyboard moves, rotates and scales the mesh.
//!
//! ## Quick Start
//!
//! ```no_run
//! use overlay3d::*;
//!
//! fn main() -> Result<(), OverlayError> {
//!     let config = OverlayConfig::new()
//!         .background("robot_cell.jpg")
//!         .mesh("assembly_stiffener_stp.obj");
//!     run(config)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Keys
//!
//! | Key | Effect |
//! |-----|--------|
//! | `w` `s` | translate along Y |
//! | `a` `d` | translate along X |
//! | `u` `i` | rotate about X |
//! | `j` `k` | rotate about Y |
//! | `n` `m` | rotate about Z |
//! | `+` `-` | scale up / down |
//! | Esc | exit |
//!
//! ## Headless
//!
//! [`Session`] runs the same pipeline over any [`SceneRenderer`], so key
//! sequences can be replayed against [`SoftwareRenderer`] without a window or
//! a GPU.

mod app;
mod camera;
pub mod composite;
mod config;
mod display;
mod error;
mod geometry;
mod gpu;
mod input;
mod mesh;
mod mesh_pass;
mod pose;
mod raster;
mod render;
mod scene;
mod session;
mod texture;

pub use app::run;
pub use camera::Camera;
pub use config::{CONFIG_FILE, CameraSection, ConfigError, LightSection, OverlayConfig};
pub use display::Presenter;
pub use error::{AssetLoadError, OverlayError, RenderError};
pub use geometry::{GeometryError, RawGeometry};
pub use gpu::{GpuContext, WindowSurface};
pub use input::{Input, MAX_PENDING_KEYS, key_char};
pub use mesh::{Mesh, Vertex3d};
pub use mesh_pass::GpuRenderer;
pub use pose::{
    Axis, Command, ESCAPE, INITIAL_SCALE, MIN_SCALE, Pose, ROTATION_STEP_DEGREES, SCALE_STEP,
    TRANSLATION_STEP,
};
pub use raster::SoftwareRenderer;
pub use render::{DepthImage, RenderOutput, RendererKind, SceneRenderer};
pub use scene::{DirectionalLight, Scene};
pub use session::{
    Frame, LoadedAssets, Outcome, Session, SessionState, build_scene, load_assets,
    load_background, load_mesh, load_phase,
};
pub use texture::{FrameTexture, to_rgba};

// Re-export glam math types for convenience
pub use glam::{DMat4, DVec3, Mat4, Vec3};
