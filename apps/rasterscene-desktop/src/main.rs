use anyhow::Result;
use clap::Parser;
use glam::{Mat4, Vec2, Vec3};
use rasterscene_input::{Action, InputState, Key, MouseButtons};
use rasterscene_render_wgpu::WgpuBackend;
use rasterscene_scene::{Mesh, ObjectDesc, Scene, SceneConfig, Viewport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

const DEFAULT_SHADER: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/mesh.wgsl");
const DEFAULT_TRANSPARENT_SHADER: &str =
    concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/transparent.wgsl");

#[derive(Parser)]
#[command(name = "rasterscene-desktop", about = "Rasterscene desktop viewer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Scene configuration (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// WGSL program used for the mesh
    #[arg(long, default_value = DEFAULT_SHADER)]
    shader: PathBuf,

    #[arg(long)]
    diffuse: Option<PathBuf>,
    #[arg(long)]
    normal: Option<PathBuf>,
    #[arg(long)]
    specular: Option<PathBuf>,
    #[arg(long)]
    glossiness: Option<PathBuf>,

    /// WGSL program for the blended quad in front of the mesh
    #[arg(long, default_value = DEFAULT_TRANSPARENT_SHADER)]
    transparent_shader: PathBuf,

    /// Diffuse map (with alpha) of the blended quad
    #[arg(long)]
    transparent_diffuse: Option<PathBuf>,
}

fn key_from_code(code: KeyCode) -> Option<Key> {
    Some(match code {
        KeyCode::KeyW => Key::W,
        KeyCode::KeyA => Key::A,
        KeyCode::KeyS => Key::S,
        KeyCode::KeyD => Key::D,
        KeyCode::KeyQ => Key::Q,
        KeyCode::KeyE => Key::E,
        KeyCode::F2 => Key::F2,
        KeyCode::F3 => Key::F3,
        KeyCode::Escape => Key::Escape,
        _ => return None,
    })
}

struct App {
    cli: Cli,
    config: SceneConfig,
    window: Option<Arc<Window>>,
    scene: Option<Scene<WgpuBackend>>,
    input: InputState,
    last_frame: Instant,
}

impl App {
    fn new(cli: Cli, config: SceneConfig) -> Self {
        Self {
            cli,
            config,
            window: None,
            scene: None,
            input: InputState::new(),
            last_frame: Instant::now(),
        }
    }

    fn build_scene(&self, window: Arc<Window>) -> Result<Scene<WgpuBackend>> {
        let size = window.inner_size();
        let backend = WgpuBackend::new(window, size.width, size.height)?;
        let mut scene = Scene::new(
            backend,
            &self.config,
            Viewport::new(size.width, size.height),
        )?;

        let mut desc = ObjectDesc::new("mesh", Mesh::cube(10.0), &self.cli.shader);
        desc.diffuse_map = self.cli.diffuse.clone();
        desc.normal_map = self.cli.normal.clone();
        desc.specular_map = self.cli.specular.clone();
        desc.glossiness_map = self.cli.glossiness.clone();
        scene.spawn(desc)?;

        // Spawned last so it blends over the opaque mesh.
        let mut fire = ObjectDesc::new("fire", Mesh::quad(8.0), &self.cli.transparent_shader)
            .placed_at(Mat4::from_translation(Vec3::new(0.0, 0.0, -12.0)));
        fire.diffuse_map = self.cli.transparent_diffuse.clone();
        scene.spawn(fire)?;
        Ok(scene)
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: Key, pressed: bool) {
        if !pressed {
            self.input.release(key);
            return;
        }
        if self.input.is_down(key) {
            return;
        }
        self.input.press(key);

        let Some(scene) = self.scene.as_mut() else {
            return;
        };
        match Action::from_key(key) {
            Some(Action::ToggleRotation) => scene.toggle_rotation(),
            Some(Action::ToggleFiltering) => {
                scene.toggle_filtering_method();
            }
            Some(Action::Quit) => event_loop.exit(),
            None => {}
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes()
            .with_title("rasterscene")
            .with_inner_size(PhysicalSize::new(640u32, 480));
        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                tracing::error!("failed to create window: {err}");
                event_loop.exit();
                return;
            }
        };

        match self.build_scene(window.clone()) {
            Ok(scene) => {
                self.scene = Some(scene);
                self.window = Some(window);
                self.last_frame = Instant::now();
                tracing::info!(
                    "WASD/QE: move | RMB: look | LMB: yaw + dolly | F2: rotate | F3: filtering"
                );
            }
            Err(err) => {
                tracing::error!("failed to initialize scene: {err:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(scene) = self.scene.as_mut() {
                    scene.resize(size.width, size.height);
                }
            }
            WindowEvent::Focused(false) => self.input.clear(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        ..
                    },
                ..
            } => {
                if let Some(key) = key_from_code(code) {
                    self.handle_key(event_loop, key, state == ElementState::Pressed);
                }
            }
            WindowEvent::MouseInput { button, state, .. } => {
                let button = match button {
                    MouseButton::Left => MouseButtons::LEFT,
                    MouseButton::Right => MouseButtons::RIGHT,
                    _ => return,
                };
                self.input
                    .set_button(button, state == ElementState::Pressed);
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let dt = (now - self.last_frame).as_secs_f32().min(0.1);
                self.last_frame = now;

                if let Some(scene) = self.scene.as_mut() {
                    scene.update(dt, &self.input);
                    scene.render();
                }
                self.input.end_frame();

                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.input
                .add_mouse_delta(Vec2::new(delta.0 as f32, delta.1 as f32));
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = match &cli.config {
        Some(path) => SceneConfig::load(path)?,
        None => SceneConfig::default(),
    };

    tracing::info!("rasterscene-desktop starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(cli, config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
