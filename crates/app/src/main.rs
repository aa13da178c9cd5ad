use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use clicktrack_core::{
    ClickTrackError, ClickTrackGenerator, GeneratorConfig, RandomPicker, ReplayDecoder,
};
use tracing_subscriber::EnvFilter;

const SOUNDS_DIR: &str = "ClickSounds";
const OUTPUT_DIR: &str = "Generated";

#[tokio::main]
async fn main() -> clicktrack_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate {
            replay,
            sounds,
            output,
            config,
            ffmpeg,
            seed,
        } => run_generate(replay, sounds, output, config, ffmpeg, seed).await,
        Commands::Stats { replay } => run_stats(&replay),
        Commands::Export { replay, output } => run_export(&replay, &output),
    };

    if let Err(err) = &result {
        tracing::error!(error = %err, "generation failed");
    }
    result
}

async fn run_generate(
    replay: PathBuf,
    sounds: Option<PathBuf>,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    ffmpeg: Option<PathBuf>,
    seed: Option<u64>,
) -> clicktrack_core::Result<()> {
    let mut config = match config {
        Some(path) => GeneratorConfig::from_toml_file(path)?,
        None => GeneratorConfig::default(),
    };
    if let Some(ffmpeg) = ffmpeg {
        config.render.ffmpeg_binary = ffmpeg;
    }

    let sounds = resolve_sounds_dir(sounds, &replay)?;
    let output = resolve_output(output, &replay);
    tracing::info!(?replay, ?sounds, ?output, "starting generation");

    let mut generator = ClickTrackGenerator::new(config);
    if let Some(seed) = seed {
        generator = generator.with_picker(RandomPicker::seeded(seed));
    }

    let report = generator.generate(&replay, &sounds, &output).await?;
    tracing::info!(
        actions = report.actions,
        placements = report.placements,
        strategy = %report.render.strategy,
        fell_back = report.render.fell_back,
        chunks_omitted = report.render.chunks_omitted,
        "generation complete"
    );
    println!("Saved to: {}", output.display());
    Ok(())
}

fn run_stats(replay: &Path) -> clicktrack_core::Result<()> {
    let decoder = ReplayDecoder::open(replay)?;
    let stats = decoder.statistics()?;

    println!("TPS:       {}", stats.tps);
    println!("Duration:  {:.2}s ({} ticks)", stats.duration_seconds, stats.total_ticks);
    for (label, player) in [("Player 1", &stats.player1), ("Player 2", &stats.player2)] {
        println!(
            "{label}:  {} clicks, {} releases, {} inputs, {} physics frames",
            player.presses, player.releases, player.total_inputs, player.physics_frames
        );
    }
    Ok(())
}

fn run_export(replay: &Path, output: &Path) -> clicktrack_core::Result<()> {
    let decoder = ReplayDecoder::open(replay)?;
    decoder.export_json(output)?;
    tracing::info!(?replay, ?output, "exported replay");
    Ok(())
}

/// Uses `./ClickSounds`, then `ClickSounds` next to the replay.
fn resolve_sounds_dir(explicit: Option<PathBuf>, replay: &Path) -> clicktrack_core::Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }

    let current = std::env::current_dir()?.join(SOUNDS_DIR);
    let beside_replay = replay
        .parent()
        .map(|parent| parent.join(SOUNDS_DIR))
        .unwrap_or_else(|| PathBuf::from(SOUNDS_DIR));

    [current.clone(), beside_replay]
        .into_iter()
        .find(|dir| dir.is_dir())
        .ok_or(ClickTrackError::SourceNotFound {
            what: "sounds folder",
            path: current,
        })
}

fn resolve_output(explicit: Option<PathBuf>, replay: &Path) -> PathBuf {
    match explicit {
        Some(path) if path.extension().is_none() => path.with_extension("mp3"),
        Some(path) => path,
        None => {
            let stem = replay
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("replay");
            let timestamp = chrono::Local::now().format("%Y-%m-%dT%H-%M-%S");
            PathBuf::from(OUTPUT_DIR).join(format!("{stem}_{timestamp}.mp3"))
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Rebuild mouse click audio from a replay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render a click track for a `.re3` replay or JSON macro.
    Generate {
        /// Replay or macro file.
        replay: PathBuf,
        /// Folder with mouseDownHard / mouseDownSoft / mouseUp sounds.
        #[arg(short, long)]
        sounds: Option<PathBuf>,
        /// Output audio file. Defaults to Generated/<name>_<timestamp>.mp3.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// TOML file overriding the generator defaults.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Mixer binary to use instead of `ffmpeg`.
        #[arg(long)]
        ffmpeg: Option<PathBuf>,
        /// Seed for reproducible sound variation choices.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print statistics of a `.re3` replay.
    Stats {
        replay: PathBuf,
    },
    /// Dump a `.re3` replay as JSON.
    Export {
        replay: PathBuf,
        output: PathBuf,
    },
}
