use anyhow::Context;
use clap::{Parser, Subcommand};
use pixelcraft_assets::{ObjMesh, ShaderMetadata, ShaderStage, deduplicate};
use pixelcraft_common::Rgba;
use pixelcraft_render::{
    Bitmap, FontSource, RecordingBackend, Renderer, RendererConfig, SpriteKey, SpriteSheet,
    TextError, TtfFontSource,
};
use pixelcraft_render_wgpu::ShaderFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pixelcraft-cli", about = "CLI tool for pixelcraft assets")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Asset directory holding the sprite sheet, font, shaders and models
    #[arg(long, default_value = "./assets")]
    assets: PathBuf,

    /// Renderer config (JSON); defaults apply to anything it omits
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Decode a packed 64-bit sprite descriptor
    Sprite {
        /// Descriptor as decimal or 0x-prefixed hex
        descriptor: String,
    },
    /// Validate a shader's JSON metadata
    ShaderMeta {
        /// Resource name relative to the asset directory, e.g. shaders/automata.comp
        name: String,
    },
    /// Parse a voxel model and report deduplication stats
    Model {
        /// Model name relative to the asset directory, without extension
        name: String,
    },
    /// Compose one demo frame with the recording backend and list its draws
    Frame {
        /// Use a generated sheet and skip text instead of reading assets
        #[arg(long)]
        synthetic: bool,
        /// Player position
        #[arg(long, default_value = "100")]
        x: f32,
        #[arg(long, default_value = "80")]
        y: f32,
    },
}

fn parse_descriptor(text: &str) -> anyhow::Result<SpriteKey> {
    let bits = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    }
    .with_context(|| format!("`{text}` is not a 64-bit integer"))?;
    Ok(SpriteKey(bits))
}

fn load_config(cli: &Cli) -> anyhow::Result<RendererConfig> {
    let config = match &cli.config {
        Some(path) => RendererConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RendererConfig::default(),
    };
    Ok(config.with_asset_root(&cli.assets))
}

/// Font source for dry runs without a font file: every open fails, so text
/// draws are skipped.
struct NoFonts;

impl FontSource for NoFonts {
    type Font = ();

    fn open(&self, _px: u32) -> Result<(), TextError> {
        Err(TextError::Font("no font loaded".into()))
    }

    fn rasterize(&self, _font: &(), _text: &str, _color: Rgba) -> Result<Bitmap, TextError> {
        Err(TextError::Font("no font loaded".into()))
    }
}

/// 128x128 sheet of 16x16 tiles, each filled with a different palette index.
fn synthetic_sheet() -> anyhow::Result<SpriteSheet> {
    let indices = (0..128u32)
        .flat_map(|y| (0..128u32).map(move |x| ((x / 16 + y / 16) % 4) as u8))
        .collect();
    Ok(SpriteSheet::from_indices(128, 128, indices)?)
}

fn demo_frame<F: FontSource>(renderer: &mut Renderer<RecordingBackend, F>, x: f32, y: f32) {
    let grass = SpriteKey::new([30, 40, 0, 0], 0, 0, 16);
    let player = SpriteKey::new([0, 555, 500, 0], 16, 0, 16);
    let npc = SpriteKey::new([0, 5, 550, 0], 32, 0, 16);

    renderer.clear();
    renderer.set_camera_anchor(player, x, y);
    for ty in 0..4 {
        for tx in 0..6 {
            renderer.draw_sprite(grass, tx as f32 * 16.0 + 60.0, ty as f32 * 16.0 + 60.0);
        }
    }
    renderer.draw_sprite(npc, x + 24.0, y - 8.0);
    renderer.draw_sprite(player, x, y);
    renderer.draw_text("HELLO", x, y - 20.0, 555, 8);
}

fn print_frame<F: FontSource>(renderer: &mut Renderer<RecordingBackend, F>) -> anyhow::Result<()> {
    renderer.present()?;
    print!("{}", renderer.backend().describe_frame());
    let camera = renderer.camera();
    let stats = renderer.stats();
    println!("camera: ({:.1}, {:.1})", camera.x, camera.y);
    println!(
        "caches: {} surfaces, {} sprite textures, {} fonts, {} text textures, {} failed",
        stats.surfaces, stats.sprite_textures, stats.fonts, stats.text_textures, stats.failed
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match &cli.command {
        Commands::Info => {
            println!("pixelcraft-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("assets: {}", pixelcraft_assets::crate_info());
            println!("render: {}", pixelcraft_render::crate_info());
            println!("render-wgpu: {}", pixelcraft_render_wgpu::crate_info());
            let config = load_config(&cli)?;
            println!("config: {}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Sprite { descriptor } => {
            let key = parse_descriptor(descriptor)?;
            println!("{key}");
            println!("  raw:    {:#018x}", key.0);
            println!("  region: {:#08x}", key.region().0);
            println!("  origin: ({}, {})  size: {}", key.x(), key.y(), key.size());
            for (i, color) in key.palette().iter().enumerate() {
                println!(
                    "  color {i}: {:03} -> rgba({}, {}, {}, {})",
                    key.color_field(i),
                    color.r,
                    color.g,
                    color.b,
                    color.a
                );
            }
        }
        Commands::ShaderMeta { name } => {
            let path = cli.assets.join(name);
            let stage = ShaderStage::from_name(name);
            let meta = ShaderMetadata::load(&path, stage)
                .with_context(|| format!("invalid metadata for {name}"))?;
            println!("{name}: {stage} shader, {} schema", meta.stage_kind());
            println!("{}", serde_json::to_string_pretty(&meta)?);
            if let Some(format) = ShaderFormat::select(ShaderFormat::supported()) {
                println!(
                    "binary: {} ({format}, entry `{}`)",
                    format.binary_path(&path).display(),
                    format.entry_point()
                );
            }
        }
        Commands::Model { name } => {
            let mut path = cli.assets.join(name).into_os_string();
            path.push(".model");
            let path = PathBuf::from(path);
            let obj = ObjMesh::load(&path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            let mesh = deduplicate(&obj)?;
            println!("{name}:");
            println!(
                "  source: {} positions, {} normals, {} texcoords, {} corners",
                obj.positions.len(),
                obj.normals.len(),
                obj.texcoords.len(),
                obj.indices.len()
            );
            println!(
                "  deduplicated: {} vertices, {} indices ({} triangles)",
                mesh.vertices.len(),
                mesh.indices.len(),
                mesh.indices.len() / 3
            );
        }
        Commands::Frame { synthetic, x, y } => {
            let config = load_config(&cli)?;
            tracing::info!(synthetic = *synthetic, x = *x, y = *y, "composing demo frame");
            if *synthetic {
                let mut renderer =
                    Renderer::new(RecordingBackend::new(), config, synthetic_sheet()?, NoFonts);
                demo_frame(&mut renderer, *x, *y);
                print_frame(&mut renderer)?;
            } else {
                let sheet = SpriteSheet::load(&config.sprite_sheet).with_context(|| {
                    format!("failed to load sheet {}", config.sprite_sheet.display())
                })?;
                let fonts = TtfFontSource::load(&config.font)
                    .with_context(|| format!("failed to load font {}", config.font.display()))?;
                let mut renderer = Renderer::new(RecordingBackend::new(), config, sheet, fonts);
                demo_frame(&mut renderer, *x, *y);
                print_frame(&mut renderer)?;
            }
        }
    }

    Ok(())
}
