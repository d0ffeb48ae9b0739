//! scalescope - key detection and live preview for Standard MIDI Files
//!
//! Subcommands:
//! - `scalescope analyze <FILE>...` - Detect key, tempo, and duration
//! - `scalescope scan <DIR>...` - Batch-analyze every MIDI file under a directory
//! - `scalescope play <FILE>` - Stream a file to a MIDI output port
//! - `scalescope ports` - List MIDI output ports
//! - `scalescope config` - Print the effective configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scaleconf::ScalescopeConfig;

mod commands;
mod telemetry;

#[derive(Parser)]
#[command(name = "scalescope")]
#[command(about = "Key detection and live preview for Standard MIDI Files")]
#[command(version)]
struct Cli {
    /// Config file (replaces ./scalescope.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one or more MIDI files
    Analyze {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyze every MIDI file under the given directories
    Scan {
        #[arg(required = true)]
        dirs: Vec<PathBuf>,

        /// Only look at the top level of each directory
        #[arg(long)]
        no_recursive: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Play a MIDI file to an output port
    Play {
        file: PathBuf,

        /// Substring of the output port name
        #[arg(short, long)]
        port: Option<String>,

        /// Host tempo in BPM, replacing the file's tempo
        #[arg(short, long)]
        tempo: Option<f64>,
    },

    /// List MIDI output ports
    Ports,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = ScalescopeConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    telemetry::init(&config.telemetry.log_level);
    tracing::debug!(files = ?sources.files, env = ?sources.env_overrides, "configuration loaded");

    match cli.command {
        Commands::Analyze { files, json } => {
            commands::analyze(&config, &files, json).await?;
        }
        Commands::Scan {
            dirs,
            no_recursive,
            json,
        } => {
            commands::scan(&config, &dirs, !no_recursive, json).await?;
        }
        Commands::Play { file, port, tempo } => {
            commands::play(&config, &file, port.as_deref(), tempo).await?;
        }
        Commands::Ports => {
            commands::ports(&config)?;
        }
        Commands::Config => {
            commands::show_config(&config, &sources);
        }
    }

    Ok(())
}
