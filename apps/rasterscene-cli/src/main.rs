use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::{Mat4, Vec3};
use rasterscene_input::InputState;
use rasterscene_render::{ProgramDesc, RecordingBackend};
use rasterscene_scene::{Mesh, ObjectDesc, Scene, SceneConfig, TransformStrategy, Viewport};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEMO_PROGRAM: &str = "demo/mesh.wgsl";
const DEMO_TRANSPARENT_PROGRAM: &str = "demo/transparent.wgsl";

#[derive(Parser)]
#[command(name = "rasterscene-cli", about = "Headless rasterscene driver")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Scene configuration (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions
    Info,
    /// Step a demo scene and print the last frame's draw log
    Run {
        /// Number of frames to step
        #[arg(short, long, default_value = "3")]
        frames: u32,
        /// Seconds per frame
        #[arg(long, default_value = "0.016")]
        dt: f32,
        /// Start with auto-rotation enabled
        #[arg(long)]
        rotate: bool,
        /// Toggle the filtering tier this many times before the first frame
        #[arg(long, default_value = "0")]
        toggle_filtering: u32,
        /// Transform vertices on the CPU instead of in the vertex stage
        #[arg(long)]
        bake: bool,
    },
    /// Print the initial camera matrices
    Camera,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let mut config = match &cli.config {
        Some(path) => SceneConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SceneConfig::default(),
    };

    match cli.command {
        Commands::Info => {
            println!("rasterscene-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("render: {}", rasterscene_render::crate_info());
            println!("vertex stride: {} bytes", rasterscene_common::Vertex::STRIDE);
            println!("filtering: {}", config.filtering);
        }
        Commands::Run {
            frames,
            dt,
            rotate,
            toggle_filtering,
            bake,
        } => {
            if bake {
                config.transform_strategy = TransformStrategy::CpuBake;
            }
            let mut scene = demo_scene(&config)?;
            if rotate {
                scene.toggle_rotation();
            }
            for _ in 0..toggle_filtering {
                scene.toggle_filtering_method();
            }

            let input = InputState::new();
            for frame in 1..=frames {
                scene.update(dt, &input);
                scene.render();
                tracing::debug!(frame, "frame rendered");
            }

            println!("filtering method: {}", scene.filtering().label());
            for object in scene.objects() {
                println!(
                    "{}: rotating={} angle={:.3} drawable={}",
                    object.name(),
                    object.is_rotating(),
                    object.angle(),
                    object.is_drawable()
                );
            }
            print!("{}", scene.backend().journal().summary());
        }
        Commands::Camera => {
            let scene = demo_scene(&config)?;
            let camera = scene.camera();
            println!("origin: {}", camera.origin());
            println!("view:");
            print_matrix(camera.view_matrix());
            println!("projection:");
            print_matrix(camera.projection_matrix());
        }
    }

    Ok(())
}

/// Three objects on the recording backend: a cube at the origin, a quad
/// behind it and a blended quad in front, drawn last.
fn demo_scene(config: &SceneConfig) -> anyhow::Result<Scene<RecordingBackend>> {
    let backend = RecordingBackend::new()
        .with_program(DEMO_PROGRAM, ProgramDesc::standard())
        .with_program(DEMO_TRANSPARENT_PROGRAM, ProgramDesc::transparent());
    let mut scene = Scene::new(backend, config, Viewport::new(640, 480))?;
    scene.spawn(
        ObjectDesc::new("cube", Mesh::cube(5.0), DEMO_PROGRAM)
            .with_diffuse_map("demo/diffuse.png")
            .with_normal_map("demo/normal.png"),
    )?;
    scene.spawn(
        ObjectDesc::new("backdrop", Mesh::quad(20.0), DEMO_PROGRAM)
            .placed_at(Mat4::from_translation(Vec3::new(0.0, 0.0, 20.0))),
    )?;
    scene.spawn(
        ObjectDesc::new("fire", Mesh::quad(4.0), DEMO_TRANSPARENT_PROGRAM)
            .with_diffuse_map("demo/fire_diffuse.png")
            .placed_at(Mat4::from_translation(Vec3::new(0.0, 0.0, -8.0))),
    )?;
    Ok(scene)
}

fn print_matrix(m: Mat4) {
    for row in m.to_cols_array_2d() {
        println!(
            "  [{:>9.4} {:>9.4} {:>9.4} {:>9.4}]",
            row[0], row[1], row[2], row[3]
        );
    }
}
