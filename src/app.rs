//! The interactive window loop.
//!
//! One window the size of the background shows composited frames. After each
//! frame the loop waits up to the poll interval for a key; whatever key
//! arrived (or none) is applied to the pose and the next frame is drawn.
//! Escape or closing the window ends the session.

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::config::OverlayConfig;
use crate::display::Presenter;
use crate::error::{OverlayError, RenderError};
use crate::gpu::GpuContext;
use crate::input::Input;
use crate::mesh_pass::GpuRenderer;
use crate::raster::SoftwareRenderer;
use crate::render::{RendererKind, SceneRenderer};
use crate::session::{LoadedAssets, Outcome, Session, SessionState, build_scene, load_phase};

/// Loads the assets, opens the window and runs until the user exits.
///
/// A failed load ends the session in `Terminated` before any window is
/// created. Use [`OverlayError::is_fatal`] to tell a missing background from
/// a bad mesh.
pub fn run(config: OverlayConfig) -> Result<Outcome, OverlayError> {
    let (state, assets) = load_phase(&config);
    let assets = assets?;

    let event_loop = EventLoop::new().map_err(|e| RenderError::window(e.to_string()))?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = OverlayApp::new(config, assets, state);
    event_loop
        .run_app(&mut app)
        .map_err(|e| RenderError::window(e.to_string()))?;

    app.result.unwrap_or(Ok(Outcome::Exited))
}

struct OverlayApp {
    phase: Phase,
    result: Option<Result<Outcome, OverlayError>>,
}

enum Phase {
    Pending {
        config: OverlayConfig,
        assets: LoadedAssets,
        state: SessionState,
    },
    Running(Box<Running>),
    Done,
}

struct Running {
    window: Arc<Window>,
    gpu: GpuContext,
    presenter: Presenter,
    session: Session<Box<dyn SceneRenderer>>,
    input: Input,
    poll_interval: Duration,
    /// When the current key wait gives up.
    deadline: Instant,
    /// A frame is on screen and the loop is waiting for a key.
    awaiting_key: bool,
    last_frame: Option<RgbImage>,
}

impl OverlayApp {
    fn new(config: OverlayConfig, assets: LoadedAssets, state: SessionState) -> Self {
        Self {
            phase: Phase::Pending {
                config,
                assets,
                state,
            },
            result: None,
        }
    }

    fn finish(&mut self, event_loop: &ActiveEventLoop, result: Result<Outcome, OverlayError>) {
        if let Ok(outcome) = &result {
            log::info!("session ended: {:?}", outcome);
        }
        self.result = Some(result);
        self.phase = Phase::Done;
        event_loop.exit();
    }
}

impl Running {
    fn start(
        event_loop: &ActiveEventLoop,
        config: OverlayConfig,
        assets: LoadedAssets,
        state: SessionState,
    ) -> Result<Self, RenderError> {
        let LoadedAssets {
            background,
            geometry,
        } = assets;
        let (width, height) = background.dimensions();

        let window_attrs = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(width, height));
        let window = Arc::new(
            event_loop
                .create_window(window_attrs)
                .map_err(|e| RenderError::window(e.to_string()))?,
        );

        let (gpu, surface) = GpuContext::for_window(window.clone())?;
        let scene = build_scene(&config, geometry);

        let renderer: Box<dyn SceneRenderer> = match config.renderer {
            RendererKind::Gpu => Box::new(GpuRenderer::new(&gpu, &scene, width, height)),
            RendererKind::Software => Box::new(SoftwareRenderer::new(scene, width, height)),
        };
        log::info!("rendering with the {} renderer", renderer.name());

        let session = Session::new(renderer, background, state)?;
        let presenter = Presenter::new(&gpu, surface, width, height);

        window.request_redraw();

        Ok(Self {
            window,
            gpu,
            presenter,
            session,
            input: Input::new(),
            poll_interval: config.poll_interval(),
            deadline: Instant::now(),
            awaiting_key: false,
            last_frame: None,
        })
    }

    /// Draws the next frame, or repaints the current one while waiting for a
    /// key.
    fn redraw(&mut self) -> Result<(), RenderError> {
        if self.awaiting_key {
            if let Some(frame) = &self.last_frame {
                self.presenter.present(&self.gpu, frame)?;
            }
            return Ok(());
        }

        let frame = self.session.render_frame()?;
        self.presenter.present(&self.gpu, &frame.composited)?;
        self.last_frame = Some(frame.composited);

        self.awaiting_key = true;
        self.deadline = Instant::now() + self.poll_interval;
        Ok(())
    }

    /// Ends the key wait once a key arrived or the deadline passed. Returns
    /// `true` when the key ended the session.
    fn poll_key(&mut self, event_loop: &ActiveEventLoop) -> bool {
        if !self.awaiting_key {
            return false;
        }
        if !self.input.has_key() && Instant::now() < self.deadline {
            event_loop.set_control_flow(ControlFlow::WaitUntil(self.deadline));
            return false;
        }

        let state = self.session.dispatch(self.input.take_key());
        if state.is_terminated() {
            return true;
        }

        self.awaiting_key = false;
        event_loop.set_control_flow(ControlFlow::Wait);
        self.window.request_redraw();
        false
    }
}

impl ApplicationHandler for OverlayApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !matches!(self.phase, Phase::Pending { .. }) {
            return;
        }
        let Phase::Pending {
            config,
            assets,
            state,
        } = std::mem::replace(&mut self.phase, Phase::Done)
        else {
            return;
        };

        match Running::start(event_loop, config, assets, state) {
            Ok(running) => self.phase = Phase::Running(Box::new(running)),
            Err(e) => self.finish(event_loop, Err(e.into())),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Phase::Running(running) = &mut self.phase else {
            return;
        };

        running.input.handle_event(&event);

        let finished = match event {
            WindowEvent::CloseRequested => {
                running.session.abort();
                Some(Ok(Outcome::Exited))
            }
            WindowEvent::Resized(size) => {
                running
                    .presenter
                    .resize(&running.gpu, size.width, size.height);
                None
            }
            WindowEvent::RedrawRequested => running.redraw().err().map(|e| Err(e.into())),
            _ => None,
        };

        if let Some(result) = finished {
            self.finish(event_loop, result);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Phase::Running(running) = &mut self.phase else {
            return;
        };

        if running.poll_key(event_loop) {
            self.finish(event_loop, Ok(Outcome::Exited));
        }
    }
}
