//! The overlay session: asset loading, the per-frame pipeline and the
//! `LOADING -> INTERACTING -> TERMINATED` state machine.
//!
//! [`load_phase`] runs `LOADING` and reports where the state machine went.
//! From `INTERACTING` a [`Session`] drives one frame at a time:
//!
//! 1. build the model matrix from the current [`Pose`]
//! 2. render color and depth at the background's size
//! 3. derive the alpha mask from depth
//! 4. composite over the background
//!
//! and then [`Session::dispatch`] applies at most one key. The window loop in
//! [`crate::app`] and the headless [`Session::replay`] both use this API, so
//! key sequences can be checked without opening a window.

use std::path::Path;

use image::RgbImage;

use crate::composite::composite_output;
use crate::config::OverlayConfig;
use crate::error::{AssetLoadError, RenderError};
use crate::geometry::RawGeometry;
use crate::pose::{Command, Pose};
use crate::render::{RenderOutput, SceneRenderer};
use crate::scene::Scene;

/// Where the session is in its lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum SessionState {
    #[default]
    Loading,
    Interacting(Pose),
    Terminated,
}

impl SessionState {
    /// Both assets loaded; start from the initial pose.
    pub fn on_loaded(self) -> Self {
        match self {
            SessionState::Loading => SessionState::Interacting(Pose::default()),
            other => other,
        }
    }

    pub fn on_load_failed(self) -> Self {
        match self {
            SessionState::Loading => SessionState::Terminated,
            other => other,
        }
    }

    /// Applies the key observed this frame. `None` means the poll timed out.
    pub fn on_key(self, key: Option<char>) -> Self {
        match self {
            SessionState::Interacting(pose) => match key.and_then(Command::from_key) {
                Some(Command::Exit) => SessionState::Terminated,
                Some(command) => SessionState::Interacting(pose.apply(command)),
                None => SessionState::Interacting(pose),
            },
            other => other,
        }
    }

    /// Window closed or the render loop failed.
    pub fn on_abort(self) -> Self {
        SessionState::Terminated
    }

    pub fn pose(&self) -> Option<Pose> {
        match self {
            SessionState::Interacting(pose) => Some(*pose),
            _ => None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, SessionState::Terminated)
    }
}

/// How a session that did not fail came to an end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Escape was pressed or the window was closed.
    Exited,
}

/// Background and mesh, ready for a session.
#[derive(Clone, Debug)]
pub struct LoadedAssets {
    pub background: RgbImage,
    pub geometry: RawGeometry,
}

/// Everything produced for one frame.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Pose the frame was rendered with.
    pub pose: Pose,
    pub output: RenderOutput,
    pub alpha: Vec<f32>,
    pub composited: RgbImage,
}

/// Loads the background as 8-bit RGB.
pub fn load_background(path: &Path) -> Result<RgbImage, AssetLoadError> {
    let image = image::open(path).map_err(|source| AssetLoadError::Background {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image.to_rgb8())
}

/// Loads the mesh and applies the load-time scale. Empty geometry is an
/// error.
pub fn load_mesh(path: &Path, scale: f32) -> Result<RawGeometry, AssetLoadError> {
    let mut geometry = RawGeometry::load(path).map_err(|source| AssetLoadError::Mesh {
        path: path.to_path_buf(),
        source,
    })?;
    if geometry.is_empty() {
        return Err(AssetLoadError::EmptyMesh {
            path: path.to_path_buf(),
        });
    }
    geometry.scale(scale);
    Ok(geometry)
}

/// The loading phase. The background is read first so a missing image is
/// reported before the mesh is touched.
pub fn load_assets(config: &OverlayConfig) -> Result<LoadedAssets, AssetLoadError> {
    let background = load_background(&config.background)?;
    log::info!(
        "loaded background {} ({}x{})",
        config.background.display(),
        background.width(),
        background.height()
    );

    let geometry = load_mesh(&config.mesh, config.mesh_scale)?;
    log::info!(
        "loaded mesh {} ({} triangles, scaled by {})",
        config.mesh.display(),
        geometry.triangle_count(),
        config.mesh_scale
    );

    Ok(LoadedAssets {
        background,
        geometry,
    })
}

/// Runs the `LOADING` state. Returns the state the machine moved to:
/// `Interacting` at the initial pose alongside the assets, or `Terminated`
/// alongside the reason.
pub fn load_phase(
    config: &OverlayConfig,
) -> (SessionState, Result<LoadedAssets, AssetLoadError>) {
    let state = SessionState::Loading;
    match load_assets(config) {
        Ok(assets) => (state.on_loaded(), Ok(assets)),
        Err(e) => {
            let next = state.on_load_failed();
            log::debug!("loading failed, {:?} -> {:?}", state, next);
            (next, Err(e))
        }
    }
}

/// Assembles the scene from configured camera, light and color.
pub fn build_scene(config: &OverlayConfig, geometry: RawGeometry) -> Scene {
    Scene::new(geometry)
        .with_camera(config.camera())
        .with_light(config.light())
        .with_base_color(config.base_color())
}

/// A running overlay: renderer, background and state.
pub struct Session<R> {
    renderer: R,
    background: RgbImage,
    state: SessionState,
    frames: u64,
}

impl<R: SceneRenderer> Session<R> {
    /// Picks up from `state`, normally the one [`load_phase`] left behind.
    /// The renderer must produce frames the size of the background.
    pub fn new(
        renderer: R,
        background: RgbImage,
        state: SessionState,
    ) -> Result<Self, RenderError> {
        if renderer.size() != background.dimensions() {
            return Err(RenderError::SizeMismatch {
                expected: background.dimensions(),
                actual: renderer.size(),
            });
        }
        Ok(Self {
            renderer,
            background,
            state,
            frames: 0,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn pose(&self) -> Option<Pose> {
        self.state.pose()
    }

    pub fn is_running(&self) -> bool {
        !self.state.is_terminated()
    }

    /// Frames rendered so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Renders and composites one frame at the current pose.
    ///
    /// A render failure terminates the session.
    pub fn render_frame(&mut self) -> Result<Frame, RenderError> {
        let Some(pose) = self.state.pose() else {
            return Err(RenderError::window("session is not interacting"));
        };

        let result = self
            .renderer
            .render(pose.model_matrix())
            .and_then(|output| {
                let (alpha, composited) = composite_output(&output, &self.background)?;
                Ok(Frame {
                    pose,
                    output,
                    alpha,
                    composited,
                })
            });

        match result {
            Ok(frame) => {
                self.frames += 1;
                Ok(frame)
            }
            Err(e) => {
                self.state = self.state.on_abort();
                Err(e)
            }
        }
    }

    /// Applies the key seen this frame, if any.
    pub fn dispatch(&mut self, key: Option<char>) -> SessionState {
        let next = self.state.on_key(key);
        if let (Some(key), SessionState::Interacting(pose)) = (key, next) {
            log::debug!(
                "key {:?}: translation {:?}, scale {:.3}",
                key,
                pose.translation,
                pose.scale
            );
        }
        self.state = next;
        next
    }

    /// Ends the session without a key, e.g. when the window closes.
    pub fn abort(&mut self) {
        self.state = self.state.on_abort();
    }

    /// Runs the loop headless: one frame per entry in `keys`, each followed by
    /// dispatching that entry. Stops early on escape. `on_frame` sees every
    /// composited frame.
    pub fn replay<I>(
        &mut self,
        keys: I,
        mut on_frame: impl FnMut(&Frame),
    ) -> Result<SessionState, RenderError>
    where
        I: IntoIterator<Item = Option<char>>,
    {
        for key in keys {
            if !self.is_running() {
                break;
            }
            let frame = self.render_frame()?;
            on_frame(&frame);
            self.dispatch(key);
        }
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{ESCAPE, INITIAL_SCALE};
    use glam::Mat4;

    /// Records the model matrices it was asked to render.
    struct RecordingRenderer {
        size: (u32, u32),
        models: Vec<Mat4>,
        fail: bool,
    }

    impl RecordingRenderer {
        fn new(width: u32, height: u32) -> Self {
            Self {
                size: (width, height),
                models: Vec::new(),
                fail: false,
            }
        }
    }

    impl SceneRenderer for RecordingRenderer {
        fn size(&self) -> (u32, u32) {
            self.size
        }

        fn name(&self) -> &'static str {
            "recording"
        }

        fn render(&mut self, model: Mat4) -> Result<RenderOutput, RenderError> {
            if self.fail {
                return Err(RenderError::readback("device lost"));
            }
            self.models.push(model);
            Ok(RenderOutput::empty(self.size.0, self.size.1))
        }
    }

    fn interacting() -> SessionState {
        SessionState::Loading.on_loaded()
    }

    fn recording_session(width: u32, height: u32) -> Session<RecordingRenderer> {
        let renderer = RecordingRenderer::new(width, height);
        Session::new(renderer, RgbImage::new(width, height), interacting()).unwrap()
    }

    #[test]
    fn state_machine_transitions() {
        let loading = SessionState::default();
        assert_eq!(loading, SessionState::Loading);
        assert_eq!(loading.on_load_failed(), SessionState::Terminated);

        let interacting = loading.on_loaded();
        assert_eq!(interacting, SessionState::Interacting(Pose::default()));
        assert_eq!(interacting.on_key(None), interacting);
        assert_eq!(interacting.on_key(Some('z')), interacting);
        assert_eq!(interacting.on_key(Some(ESCAPE)), SessionState::Terminated);

        // Terminated is terminal.
        let done = SessionState::Terminated;
        assert_eq!(done.on_loaded(), done);
        assert_eq!(done.on_key(Some('w')), done);
    }

    #[test]
    fn renderer_must_match_background() {
        let err = Session::new(RecordingRenderer::new(4, 4), RgbImage::new(4, 3), interacting())
            .err()
            .unwrap();
        assert!(matches!(err, RenderError::SizeMismatch { .. }));
    }

    #[test]
    fn frame_uses_pose_before_the_key() {
        let mut session = recording_session(4, 3);

        let first = session.render_frame().unwrap();
        assert_eq!(first.pose, Pose::default());
        session.dispatch(Some('d'));

        let second = session.render_frame().unwrap();
        assert!((second.pose.translation.x - 0.1).abs() < 1e-12);

        let models = &session.renderer.models;
        assert_eq!(models.len(), 2);
        assert!(models[0].abs_diff_eq(
            Mat4::from_scale(glam::Vec3::splat(INITIAL_SCALE as f32)),
            1e-7
        ));
        assert!((models[1].w_axis.x - 0.1).abs() < 1e-7);
    }

    #[test]
    fn replay_stops_on_escape() {
        let mut session = recording_session(2, 2);
        let keys = [Some('w'), None, Some(ESCAPE), Some('w'), Some('w')];

        let mut seen = 0;
        let state = session.replay(keys, |_| seen += 1).unwrap();

        assert_eq!(state, SessionState::Terminated);
        assert_eq!(seen, 3);
        assert_eq!(session.frame_count(), 3);
        assert!(!session.is_running());
    }

    #[test]
    fn render_failure_terminates() {
        let mut renderer = RecordingRenderer::new(2, 2);
        renderer.fail = true;
        let mut session = Session::new(renderer, RgbImage::new(2, 2), interacting()).unwrap();

        let err = session.render_frame().unwrap_err();
        assert!(matches!(err, RenderError::Readback(_)));
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[test]
    fn missing_background_is_fatal_and_checked_first() {
        let config = OverlayConfig::new()
            .background("no/such/background.png")
            .mesh("no/such/mesh.stl");
        let err = load_assets(&config).unwrap_err();
        assert!(matches!(err, AssetLoadError::Background { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn failed_load_moves_loading_to_terminated() {
        let config = OverlayConfig::new().background("no/such/background.png");
        let (state, assets) = load_phase(&config);

        assert_eq!(state, SessionState::Terminated);
        assert!(matches!(assets, Err(AssetLoadError::Background { .. })));
    }

    #[test]
    fn session_handed_a_terminated_state_does_not_render() {
        let mut session = Session::new(
            RecordingRenderer::new(2, 2),
            RgbImage::new(2, 2),
            SessionState::Terminated,
        )
        .unwrap();

        assert!(!session.is_running());
        assert!(session.render_frame().is_err());
        assert!(session.renderer.models.is_empty());
    }
}
