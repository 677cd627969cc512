use anyhow::{Context, Result, anyhow};
use clap::Parser;
use glam::Vec2;
use pixelcraft_render::{Renderer, RendererConfig, SpriteKey, TtfFontSource};
use pixelcraft_render_wgpu::{ComputeKernel, CopyPass, VoxelModel, WgpuBackend, load_compute_pipeline};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

#[derive(Parser)]
#[command(name = "pixelcraft-desktop", about = "Pixelcraft windowed demo")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Asset directory holding the sprite sheet and font
    #[arg(long, default_value = "./assets")]
    assets: PathBuf,

    /// Renderer config (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Voxel model to preload, relative to the asset directory, without extension
    #[arg(long)]
    model: Option<String>,

    /// Compute shader to preload, relative to the asset directory (e.g. shaders/automata.comp)
    #[arg(long)]
    shader: Option<String>,
}

const PLAYER_SPEED: f32 = 60.0;
const WORLD_TILES: i32 = 32;

fn tile(x: i32, y: i32) -> SpriteKey {
    // Checkerboard of two grass tints.
    let shade = if (x + y) % 2 == 0 { 30 } else { 40 };
    SpriteKey::new([shade, 20, 0, 0], 0, 0, 16)
}

fn player() -> SpriteKey {
    SpriteKey::new([0, 555, 500, 0], 16, 0, 16)
}

fn npc(i: usize) -> SpriteKey {
    const TINTS: [u16; 3] = [5, 550, 505];
    SpriteKey::new([0, TINTS[i % TINTS.len()], 555, 0], 32, 0, 16)
}

/// Game-side state, independent of the window.
struct AppState {
    player: Vec2,
    npcs: Vec<Vec2>,
    keys_held: HashSet<KeyCode>,
    last_frame: Instant,
    status: String,
}

impl AppState {
    fn new() -> Self {
        Self {
            player: Vec2::new(128.0, 72.0),
            npcs: vec![
                Vec2::new(64.0, 48.0),
                Vec2::new(200.0, 100.0),
                Vec2::new(300.0, 40.0),
            ],
            keys_held: HashSet::new(),
            last_frame: Instant::now(),
            status: String::new(),
        }
    }

    fn update(&mut self, dt: f32) {
        let mut dir = Vec2::ZERO;
        if self.keys_held.contains(&KeyCode::ArrowLeft) {
            dir.x -= 1.0;
        }
        if self.keys_held.contains(&KeyCode::ArrowRight) {
            dir.x += 1.0;
        }
        if self.keys_held.contains(&KeyCode::ArrowUp) {
            dir.y -= 1.0;
        }
        if self.keys_held.contains(&KeyCode::ArrowDown) {
            dir.y += 1.0;
        }
        let bound = (WORLD_TILES * 16) as f32;
        self.player = (self.player + dir.normalize_or_zero() * PLAYER_SPEED * dt)
            .clamp(Vec2::ZERO, Vec2::splat(bound));
    }

    fn handle_key(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.keys_held.insert(key);
        } else {
            self.keys_held.remove(&key);
        }
    }

    /// The player's tile coordinates. Text textures are never evicted, so the
    /// label only changes when the player crosses into another tile.
    fn tile_label(&self) -> String {
        let tile = (self.player / 16.0).floor().as_ivec2();
        format!("{},{}", tile.x, tile.y)
    }

    fn draw<F: pixelcraft_render::FontSource>(&self, renderer: &mut Renderer<WgpuBackend, F>) {
        renderer.clear();
        renderer.set_camera_anchor(player(), self.player.x, self.player.y);

        // Only the tiles around the player; the rest would be clipped anyway.
        let center = (self.player / 16.0).floor().as_ivec2();
        for ty in (center.y - 6).max(0)..=(center.y + 6).min(WORLD_TILES) {
            for tx in (center.x - 9).max(0)..=(center.x + 9).min(WORLD_TILES) {
                renderer.draw_sprite(tile(tx, ty), tx as f32 * 16.0 + 8.0, ty as f32 * 16.0 + 8.0);
            }
        }
        for (i, pos) in self.npcs.iter().enumerate() {
            renderer.draw_sprite(npc(i), pos.x, pos.y);
        }
        renderer.draw_sprite(player(), self.player.x, self.player.y);

        renderer.draw_text(&self.tile_label(), self.player.x, self.player.y - 14.0, 555, 6);
        if !self.status.is_empty() {
            let camera = renderer.camera();
            renderer.draw_text(&self.status, camera.x + 128.0, camera.y + 136.0, 444, 6);
        }
    }
}

struct GpuApp {
    cli: Cli,
    state: AppState,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer<WgpuBackend, TtfFontSource>>,
    model: Option<VoxelModel>,
    kernel: Option<ComputeKernel>,
    startup_error: Option<anyhow::Error>,
}

impl GpuApp {
    fn new(cli: Cli) -> Self {
        Self {
            cli,
            state: AppState::new(),
            window: None,
            renderer: None,
            model: None,
            kernel: None,
            startup_error: None,
        }
    }

    fn load_config(&self) -> Result<RendererConfig> {
        let config = match &self.cli.config {
            Some(path) => RendererConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => RendererConfig::default(),
        };
        Ok(config.with_asset_root(&self.cli.assets))
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let config = self.load_config()?;
        let viewport = config.viewport;

        let attrs = Window::default_attributes()
            .with_title("Pixelcraft")
            .with_inner_size(PhysicalSize::new(viewport.width * 4, viewport.height * 4));
        let window = Arc::new(event_loop.create_window(attrs)?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| anyhow!("no compatible GPU adapter"))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("pixelcraft_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))?;

        let size = window.inner_size();
        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or(caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow!("surface reports no formats"))?;
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        tracing::info!(
            "GPU initialized with {} backend",
            adapter.get_info().backend.to_str()
        );

        let backend = WgpuBackend::new(
            device,
            queue,
            surface,
            surface_config,
            viewport,
            config.clear_color,
        );
        self.preload(&backend)?;
        let renderer = Renderer::load(backend, config)?;

        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn preload(&mut self, backend: &WgpuBackend) -> Result<()> {
        let mut status = Vec::new();
        if let Some(name) = &self.cli.model {
            let mut pass = CopyPass::begin(backend.device(), "model_upload");
            let model = VoxelModel::load(&mut pass, self.cli.assets.join(name))
                .with_context(|| format!("failed to load model {name}"))?;
            pass.finish(backend.queue())?;
            status.push(format!("{name}: {} verts", model.vertex_count()));
            self.model = Some(model);
        }
        if let Some(name) = &self.cli.shader {
            let kernel = load_compute_pipeline(backend.device(), self.cli.assets.join(name))
                .with_context(|| format!("failed to load shader {name}"))?;
            let [x, y, z] = kernel.threads();
            status.push(format!("{name}: {x}x{y}x{z}"));
            self.kernel = Some(kernel);
        }
        self.state.status = status.join("  ");
        Ok(())
    }

    fn redraw(&mut self) {
        let now = Instant::now();
        let dt = (now - self.state.last_frame).as_secs_f32().min(0.1);
        self.state.last_frame = now;
        self.state.update(dt);

        let Some(renderer) = &mut self.renderer else {
            return;
        };
        self.state.draw(renderer);
        if let Err(e) = renderer.present() {
            tracing::error!("present failed: {e}");
        }
    }
}

impl ApplicationHandler for GpuApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.startup_error.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            tracing::error!("startup failed: {e:#}");
            self.startup_error = Some(e);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(model) = &mut self.model {
                    model.free();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(renderer) = &mut self.renderer {
                    renderer
                        .backend_mut()
                        .resize(new_size.width, new_size.height);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: key_state,
                        ..
                    },
                ..
            } => {
                if key == KeyCode::Escape {
                    event_loop.exit();
                    return;
                }
                self.state
                    .handle_key(key, key_state == ElementState::Pressed);
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
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
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = GpuApp::new(cli);
    event_loop.run_app(&mut app)?;

    if let Some(e) = app.startup_error.take() {
        return Err(e);
    }
    if let Some(renderer) = &app.renderer {
        let stats = renderer.stats();
        tracing::info!(
            "exiting with {} sprite textures and {} text textures cached",
            stats.sprite_textures,
            stats.text_textures
        );
    }
    if let Some(kernel) = &app.kernel {
        let [x, y, z] = kernel.workgroups([256, 144, 1]);
        tracing::debug!("compute kernel would dispatch {x}x{y}x{z} workgroups per viewport");
    }
    Ok(())
}
