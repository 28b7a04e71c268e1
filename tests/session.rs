use std::path::PathBuf;

use image::{Rgb, RgbImage};
use overlay3d::{
    AssetLoadError, ESCAPE, OverlayConfig, Pose, RendererKind, Session, SessionState,
    SoftwareRenderer, build_scene, load_assets, load_phase,
};

const BACKGROUND: Rgb<u8> = Rgb([10, 20, 30]);

/// Scratch directory for one test's asset files, removed on drop.
struct Fixture {
    dir: PathBuf,
}

impl Fixture {
    fn new(test: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("overlay3d-{}-{}", std::process::id(), test));
        std::fs::create_dir_all(&dir).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn background(&self, width: u32, height: u32) -> PathBuf {
        let path = self.path("background.png");
        RgbImage::from_pixel(width, height, BACKGROUND)
            .save(&path)
            .unwrap();
        path
    }

    /// Square in the z = 0 plane facing +Z, `half` units from center to edge.
    fn quad_stl(&self, half: f32) -> PathBuf {
        let (l, h) = (-half, half);
        let facet = |a: (f32, f32), b: (f32, f32), c: (f32, f32)| {
            format!(
                "  facet normal 0 0 1\n    outer loop\n      vertex {} {} 0\n      vertex {} {} 0\n      vertex {} {} 0\n    endloop\n  endfacet\n",
                a.0, a.1, b.0, b.1, c.0, c.1
            )
        };
        let text = format!(
            "solid quad\n{}{}endsolid quad\n",
            facet((l, l), (h, l), (h, h)),
            facet((l, l), (h, h), (l, h))
        );

        let path = self.path("quad.stl");
        std::fs::write(&path, text).unwrap();
        path
    }

    /// Same square as [`Fixture::quad_stl`], as a single OBJ quad face.
    fn quad_obj(&self, half: f32) -> PathBuf {
        let (l, h) = (-half, half);
        let text = format!(
            "o quad\nv {l} {l} 0\nv {h} {l} 0\nv {h} {h} 0\nv {l} {h} 0\nf 1 2 3 4\n"
        );

        let path = self.path("quad.obj");
        std::fs::write(&path, text).unwrap();
        path
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn software_session(config: &OverlayConfig) -> Session<SoftwareRenderer> {
    let (state, assets) = load_phase(config);
    let assets = assets.unwrap();
    let (width, height) = assets.background.dimensions();
    let scene = build_scene(config, assets.geometry);
    let renderer = SoftwareRenderer::new(scene, width, height);
    Session::new(renderer, assets.background, state).unwrap()
}

#[test]
fn loading_starts_interacting_at_the_initial_pose() {
    let fixture = Fixture::new("initial");
    let config = OverlayConfig::new()
        .background(fixture.background(4, 4))
        .mesh(fixture.quad_stl(1.0));

    let (state, assets) = load_phase(&config);

    assert_eq!(state, SessionState::Interacting(Pose::default()));
    assert_eq!(assets.unwrap().geometry.triangle_count(), 2);
}

#[test]
fn covering_mesh_replaces_the_background() {
    let fixture = Fixture::new("cover");
    let config = OverlayConfig::new()
        .background(fixture.background(8, 6))
        .mesh(fixture.quad_stl(500.0))
        .mesh_scale(1.0)
        .renderer(RendererKind::Software);
    let mut session = software_session(&config);

    let frame = session.render_frame().unwrap();

    assert!(frame.alpha.iter().all(|&a| a == 1.0));
    assert_eq!(frame.composited, frame.output.color);
    assert!(frame.composited.pixels().all(|p| *p != BACKGROUND));
}

#[test]
fn obj_mesh_renders_like_stl() {
    let fixture = Fixture::new("obj");
    let background = fixture.background(8, 6);
    let stl = OverlayConfig::new()
        .background(&background)
        .mesh(fixture.quad_stl(20.0))
        .mesh_scale(1.0);
    let obj = stl.clone().mesh(fixture.quad_obj(20.0));

    let from_stl = software_session(&stl).render_frame().unwrap();
    let from_obj = software_session(&obj).render_frame().unwrap();

    assert_eq!(from_obj.alpha, from_stl.alpha);
    assert_eq!(from_obj.composited, from_stl.composited);
}

#[test]
fn translation_uncovers_the_center() {
    let fixture = Fixture::new("move");
    let config = OverlayConfig::new()
        .background(fixture.background(8, 6))
        .mesh(fixture.quad_stl(20.0))
        .mesh_scale(1.0);
    let mut session = software_session(&config);

    let before = session.render_frame().unwrap();
    assert_ne!(*before.composited.get_pixel(4, 3), BACKGROUND);
    assert_ne!(*before.composited.get_pixel(3, 3), BACKGROUND);

    let keys = std::iter::repeat_n(Some('d'), 20);
    let mut last = None;
    session
        .replay(keys, |frame| last = Some(frame.composited.clone()))
        .unwrap();
    let after = session.render_frame().unwrap();

    assert!(last.is_some());
    assert_eq!(*after.composited.get_pixel(3, 3), BACKGROUND);
    assert_eq!(*after.composited.get_pixel(0, 0), BACKGROUND);
    assert!((session.pose().unwrap().translation.x - 2.0).abs() < 1e-9);
}

#[test]
fn fifty_scale_ups_then_escape() {
    let fixture = Fixture::new("scale");
    let config = OverlayConfig::new()
        .background(fixture.background(4, 4))
        .mesh(fixture.quad_stl(1.0));
    let mut session = software_session(&config);

    let keys = std::iter::repeat_n(Some('+'), 50).chain([None]);
    let state = session.replay(keys, |_| {}).unwrap();

    let SessionState::Interacting(pose) = state else {
        panic!("session ended early: {state:?}");
    };
    assert!((pose.scale - 0.10).abs() < 1e-9);

    let state = session.replay([Some(ESCAPE)], |_| {}).unwrap();
    assert_eq!(state, SessionState::Terminated);
    assert_eq!(session.frame_count(), 52);
}

#[test]
fn empty_mesh_is_reported_but_not_fatal() {
    let fixture = Fixture::new("empty");
    let mesh = fixture.path("empty.stl");
    let mut bytes = vec![0u8; 80];
    bytes.extend_from_slice(&0u32.to_le_bytes());
    std::fs::write(&mesh, bytes).unwrap();

    let config = OverlayConfig::new()
        .background(fixture.background(4, 4))
        .mesh(&mesh);
    let (state, assets) = load_phase(&config);
    let err = assets.unwrap_err();

    assert_eq!(state, SessionState::Terminated);
    assert!(matches!(err, AssetLoadError::EmptyMesh { .. }));
    assert!(!err.is_fatal());
}

#[test]
fn missing_mesh_is_not_fatal() {
    let fixture = Fixture::new("missing");
    let config = OverlayConfig::new()
        .background(fixture.background(4, 4))
        .mesh(fixture.path("does-not-exist.obj"));
    let err = load_assets(&config).unwrap_err();

    assert!(matches!(err, AssetLoadError::Mesh { .. }));
    assert!(!err.is_fatal());
}
