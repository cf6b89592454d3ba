//! vista - scene viewer entry point.
//!
//! Opens a window, renders a small demo scene and exposes the runtime
//! switches: M cycles MSAA, V toggles vsync, Escape quits. Drag with the left
//! mouse button to orbit and scroll to zoom.

mod orbit;

use anyhow::{Context, Result};
use glam::{Quat, Vec3};
use tracing::{debug, error, info, warn};

use vista_core::{FrameTimer, RendererConfig};
use vista_platform::{
    ActiveEventLoop, ApplicationHandler, ControlFlow, EditorAction, EventLoop, InputState,
    MouseButton, MouseScrollDelta, PhysicalKey, Window, WindowEvent, WindowId,
};
use vista_renderer::{DrawListAssembler, VulkanRenderer};
use vista_scene::{Camera, PrimitiveType, RenderPipeline, Scene, SceneObject, Transform};

use crate::orbit::OrbitController;

const WINDOW_TITLE: &str = "vista";
// Pixels per scroll line for touchpads reporting pixel deltas.
const PIXELS_PER_LINE: f32 = 40.0;

struct Viewer {
    window: Window,
    renderer: VulkanRenderer,
    assembler: DrawListAssembler,
}

struct App {
    config: RendererConfig,
    viewer: Option<Viewer>,
    scene: Scene,
    camera: Camera,
    orbit: OrbitController,
    input: InputState,
    timer: FrameTimer,
    vsync: bool,
    /// Set when startup fails; reported after the event loop exits.
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: RendererConfig, scene: Scene) -> Self {
        Self {
            vsync: config.vsync,
            config,
            viewer: None,
            scene,
            camera: Camera::new(),
            orbit: OrbitController::default(),
            input: InputState::new(),
            timer: FrameTimer::new(),
            fatal: None,
        }
    }

    fn bootstrap(&mut self, event_loop: &ActiveEventLoop) -> Result<Viewer> {
        let window = Window::new(event_loop, self.config.width, self.config.height, WINDOW_TITLE)
            .context("failed to create window")?;

        let mut config = self.config.clone();
        config.width = window.width();
        config.height = window.height();
        let mut renderer =
            VulkanRenderer::with_window(&window, &config).context("failed to create renderer")?;

        let lighting = &self.scene.lighting;
        renderer.update_scene_constants(
            lighting.ambient_colour,
            lighting.light_direction,
            lighting.light_colour,
        )?;

        self.camera.set_aspect(window.aspect_ratio());
        let assembler = DrawListAssembler::new(*renderer.descriptor_layout());
        Ok(Viewer {
            window,
            renderer,
            assembler,
        })
    }

    fn handle_action(&mut self, action: EditorAction, event_loop: &ActiveEventLoop) {
        match action {
            EditorAction::Quit => {
                info!("Escape pressed, shutting down");
                event_loop.exit();
            }
            EditorAction::ToggleVsync => {
                self.vsync = !self.vsync;
                info!("Vsync {}", if self.vsync { "on" } else { "off" });
            }
            EditorAction::CycleMsaa => {
                let Some(viewer) = self.viewer.as_mut() else {
                    return;
                };
                let renderer = &mut viewer.renderer;
                let next = renderer
                    .supported_sample_counts()
                    .next_after(renderer.msaa_state().samples());
                match renderer.set_msaa(next.is_multisampled(), next.count()) {
                    Ok(()) => info!("MSAA set to {}", next),
                    Err(e) => error!("Failed to switch MSAA to {}: {}", next, e),
                }
            }
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };
        viewer.window.resize(width, height);
        if viewer.window.is_minimized() {
            return;
        }
        self.camera.set_aspect(viewer.window.aspect_ratio());
        recreate_surface(viewer);
    }

    fn update_camera(&mut self) {
        if self.input.is_mouse_pressed(MouseButton::Left) {
            let (dx, dy) = self.input.mouse_delta();
            self.orbit.drag(dx, dy);
        }
        let scroll = self.input.scroll_delta();
        if scroll != 0.0 {
            self.orbit.zoom(scroll);
        }
        self.orbit.apply(&mut self.camera);
    }

    fn render(&mut self) {
        self.update_camera();
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };
        if viewer.window.is_minimized() {
            return;
        }

        let renderer = &mut viewer.renderer;
        if let Err(e) =
            renderer.update_camera(self.camera.view_matrix(), self.camera.projection_matrix())
        {
            error!("Failed to update camera: {}", e);
        }

        match renderer.begin_frame() {
            Ok(()) => {}
            Err(e) if e.is_surface_out_of_date() => {
                debug!("Surface out of date at acquire");
                recreate_surface(viewer);
                return;
            }
            Err(e) => {
                error!("Failed to begin frame: {}", e);
                return;
            }
        }

        let items = viewer.assembler.assemble(&self.scene);
        if let Err(e) = renderer.submit_draw_list(items) {
            error!("Failed to record draw list: {}", e);
        }

        match renderer.end_frame(self.vsync) {
            Ok(status) if status.needs_recreate() => recreate_surface(viewer),
            Ok(_) => {}
            Err(e) => error!("Frame failed: {}", e),
        }

        self.timer.tick();
        if let Some(fps) = self.timer.take_report() {
            debug!(
                "{:.1} fps, {} frames, MSAA {}",
                fps,
                self.timer.total_frames(),
                viewer.renderer.msaa_state().samples()
            );
        }
    }
}

fn recreate_surface(viewer: &mut Viewer) {
    let (width, height) = (viewer.window.width(), viewer.window.height());
    match viewer.renderer.on_resize(width, height) {
        Ok(true) => debug!("Surface recreated at {}x{}", width, height),
        Ok(false) => {}
        Err(e) => error!("Failed to recreate surface: {}", e),
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }
        match self.bootstrap(event_loop) {
            Ok(viewer) => {
                info!("Initialization complete, entering main loop");
                self.viewer = Some(viewer);
            }
            Err(e) => {
                error!("{:#}", e);
                self.fatal = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => self.resize(size.width, size.height),
            WindowEvent::Focused(false) => self.input.release_all(),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        if let Some(action) = self.input.on_key_pressed(key) {
                            self.handle_action(action, event_loop);
                        }
                    } else {
                        self.input.on_key_released(key);
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(button) = MouseButton::from_winit(button) {
                    if state.is_pressed() {
                        self.input.on_mouse_pressed(button);
                    } else {
                        self.input.on_mouse_released(button);
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input.on_mouse_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::CursorLeft { .. } => self.input.on_mouse_left(),
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / PIXELS_PER_LINE,
                };
                self.input.on_scroll(lines);
            }
            WindowEvent::RedrawRequested => {
                self.render();
                self.input.begin_frame();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(viewer) = &self.viewer {
            viewer.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut viewer) = self.viewer.take()
            && let Err(e) = viewer.renderer.shutdown()
        {
            warn!("Renderer shutdown failed: {}", e);
        }
    }
}

fn demo_scene() -> Result<Scene> {
    let mut scene = Scene::new();
    scene.add(
        SceneObject::sky("sky", None)
            .with_transform(Transform::new().with_scale(Vec3::splat(500.0))),
    )?;
    scene.add(
        SceneObject::height_field("terrain", None).with_transform(
            Transform::new()
                .with_position(Vec3::new(0.0, -1.0, 0.0))
                .with_scale(Vec3::new(40.0, 4.0, 40.0)),
        ),
    )?;
    scene.add(
        SceneObject::primitive("cube", PrimitiveType::Cube)
            .with_transform(Transform::new().with_position(Vec3::new(-2.5, 0.5, 0.0))),
    )?;
    scene.add(
        SceneObject::primitive("sphere", PrimitiveType::Sphere)
            .with_transform(Transform::new().with_position(Vec3::new(0.0, 0.5, 0.0)))
            .with_pipeline(RenderPipeline::Triplanar),
    )?;
    scene.add(
        SceneObject::primitive("cylinder", PrimitiveType::Cylinder).with_transform(
            Transform::new()
                .with_position(Vec3::new(2.5, 0.5, 0.0))
                .with_rotation(Quat::from_rotation_z(0.3)),
        ),
    )?;
    Ok(scene)
}

fn main() -> Result<()> {
    vista_core::init_logging();
    info!("Starting vista");

    let config = RendererConfig::from_env().context("invalid configuration")?;
    info!(
        "Config: {}x{}, {} frames in flight, MSAA {}x, vsync {}, {:?} failures",
        config.width,
        config.height,
        config.frames_in_flight,
        config.msaa_samples,
        config.vsync,
        config.failure_policy
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, demo_scene()?);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
