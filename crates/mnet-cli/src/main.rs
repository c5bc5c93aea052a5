//! mnet - build, inspect, and play MelodyNet models
//!
//! Subcommands:
//! - `mnet init --out model.json` - Build a fresh network and save it
//! - `mnet play --model model.json --songs songs.json` - Harmonize a song
//! - `mnet inspect` - Show model sizes or the fixed weights of a chord
//! - `mnet config` - Print the effective configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mnet")]
#[command(about = "Hybrid melody network: chords for a melody")]
#[command(version)]
struct Cli {
    /// Config file (default: ./melodynet.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a freshly initialized network and save it
    Init {
        /// Where to write the model
        #[arg(short, long)]
        out: PathBuf,

        /// Override the configured initialization seed
        #[arg(long)]
        seed: Option<u64>,

        /// Chord-to-notes table (JSON object); defaults to the built-in table
        #[arg(long)]
        chords: Option<PathBuf>,
    },

    /// Play a song through a saved model
    Play {
        /// Saved model
        #[arg(short, long)]
        model: PathBuf,

        /// Song library (JSON array of symbol arrays)
        #[arg(short, long)]
        songs: PathBuf,

        /// Index of the song to play
        #[arg(long, default_value = "0")]
        song: usize,

        /// Also render the result as a MIDI file
        #[arg(long)]
        midi: Option<PathBuf>,

        /// Compute device
        #[arg(long, default_value = "cpu")]
        device: String,

        /// State decay; defaults to the model's own
        #[arg(long)]
        decay: Option<f32>,

        /// Chord-to-notes table used to voice MIDI chords
        #[arg(long)]
        chords: Option<PathBuf>,
    },

    /// Describe a model, or the fixed weights feeding from one chord
    Inspect {
        /// Saved model; a fresh one is built from config when omitted
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Chord label, e.g. "Cmaj"
        #[arg(long)]
        chord: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = commands::load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.telemetry.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init { out, seed, chords } => {
            commands::init(&config, &out, seed, chords.as_deref())?;
        }
        Commands::Play {
            model,
            songs,
            song,
            midi,
            device,
            decay,
            chords,
        } => {
            commands::play(
                &config,
                commands::PlayArgs {
                    model: &model,
                    songs: &songs,
                    song,
                    midi: midi.as_deref(),
                    device: &device,
                    decay,
                    chords: chords.as_deref(),
                },
            )?;
        }
        Commands::Inspect { model, chord } => {
            commands::inspect(&config, model.as_deref(), chord.as_deref())?;
        }
        Commands::Config => {
            print!("{}", config.to_toml());
        }
    }

    Ok(())
}
