use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use phonoscope_core::render::Point;
use phonoscope_core::visualizers::register_builtin;
use phonoscope_core::{
    generate_layers, AppConfig, Orchestrator, Runtime, TransformReader, VisualizationRegistry,
};
use tracing_subscriber::EnvFilter;

/// Frame period used when driving the scheduler headless.
const FRAME_MS: f64 = 1_000.0 / 60.0;

fn main() -> phonoscope_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::List { config } => run_list(config.as_deref()),
        Commands::Layers { word, depth } => {
            run_layers(&word, depth);
            Ok(())
        }
        Commands::Render {
            word,
            style,
            frames,
            zoom,
            config,
        } => run_render(&word, &style, frames, zoom, config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> phonoscope_core::Result<AppConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading configuration");
            AppConfig::load(path)
        }
        None => Ok(AppConfig::default()),
    }
}

fn builtin_registry(config: AppConfig) -> VisualizationRegistry {
    let mut registry = VisualizationRegistry::new(Runtime::new(config));
    register_builtin(&mut registry);
    registry
}

fn run_list(config: Option<&Path>) -> phonoscope_core::Result<()> {
    let registry = builtin_registry(load_config(config)?);
    for instance in registry.list_all() {
        let descriptor = instance.descriptor();
        println!(
            "{:<14} {:<22} {}",
            descriptor.key,
            descriptor.label(),
            descriptor.surface_id
        );
    }
    Ok(())
}

fn run_layers(word: &str, depth: usize) {
    let layers = generate_layers(word, depth);
    if layers.is_empty() {
        tracing::warn!("nothing to spell out");
        return;
    }
    for (index, text) in layers.texts().iter().enumerate() {
        println!("{index}: {text}");
    }
}

fn run_render(
    word: &str,
    style: &str,
    frames: u32,
    zoom: i32,
    config: Option<&Path>,
) -> phonoscope_core::Result<()> {
    let mut config = load_config(config)?;
    config.seed.get_or_insert(0);
    tracing::info!(word, style, frames, "starting headless render");

    let mut orchestrator = Orchestrator::attach(builtin_registry(config));
    let runtime = orchestrator.registry().runtime().clone();
    orchestrator.set_word(word);
    let Some(handle) = orchestrator.select(style)? else {
        tracing::warn!(style, "visualization did not start");
        return Ok(());
    };

    let surface_id = orchestrator
        .registry()
        .get(style)
        .map(|instance| instance.surface_id().to_string())
        .unwrap_or_default();
    let center = runtime
        .document
        .borrow()
        .canvas_by_id(&surface_id)
        .map(|canvas| canvas.size().center())
        .unwrap_or(Point::new(0.0, 0.0));

    let (notches, delta) = wheel_steps(zoom);
    for frame in 0..frames {
        // Wheel steps are spread over the first frames, one per frame.
        if frame < notches {
            orchestrator.on_wheel(&surface_id, center, delta);
        }
        runtime.scheduler.tick(FRAME_MS);
    }

    let document = runtime.document.borrow();
    let commands = document
        .canvas_by_id(&surface_id)
        .map_or(0, |canvas| canvas.context().commands().len());
    let transform = TransformReader::read(&document, &surface_id);
    println!("style:      {style}");
    println!("word:       {word}");
    println!("run:        {}", handle.generation());
    println!("animating:  {}", handle.is_pending());
    println!("commands:   {commands}");
    println!(
        "transform:  scale {:.3}, offset ({:.1}, {:.1})",
        transform.scale, transform.offset_x, transform.offset_y
    );
    println!("caption:    {}", runtime.typewriter.revealed_text());
    Ok(())
}

/// Number of wheel notches and the wheel delta of each. Positive steps zoom
/// in, which the orchestrator reads as a negative delta.
fn wheel_steps(zoom: i32) -> (u32, f64) {
    (zoom.unsigned_abs(), -f64::from(zoom.signum()))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Phonetic layer visualiser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the registered visualization styles.
    List {
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the phonetic layers of a word.
    Layers {
        word: String,
        /// Number of layers to generate, the word itself included.
        #[arg(short, long, default_value_t = 3)]
        depth: usize,
    },
    /// Render a word headless and print a summary of the run.
    Render {
        word: String,
        /// Key of the visualization style, see `list`.
        #[arg(short, long)]
        style: String,
        /// Frames to run after the render starts.
        #[arg(short, long, default_value_t = 120)]
        frames: u32,
        /// Wheel steps about the surface center; negative zooms out.
        #[arg(short, long, default_value_t = 0, allow_hyphen_values = true)]
        zoom: i32,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
