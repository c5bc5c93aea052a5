//! Configuration loading for MelodyNet.
//!
//! Configuration is split into three sections:
//!
//! - **Model** (`ModelConfig`): hyperparameters baked into a network when it
//!   is built - hidden width, fixed-weight scales, state decay, training rates.
//! - **Playback** (`PlaybackConfig`): how emitted (note, chord) pairs are
//!   rendered to MIDI.
//! - **Telemetry** (`TelemetryConfig`): log filtering.
//!
//! # Usage
//!
//! ```rust,no_run
//! use melodyconf::MelodyConfig;
//!
//! let config = MelodyConfig::load().expect("Failed to load config");
//! println!("hidden1: {}", config.model.hidden1_size);
//! println!("decay: {}", config.model.state_units_decay);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/melodynet/config.toml` (system)
//! 2. `~/.config/melodynet/config.toml` (user)
//! 3. `./melodynet.toml` (local override, or the `--config` path)
//! 4. Environment variables (`MELODYNET_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [model]
//! hidden1_size = 64
//! chord_weights = 1.0
//! melody_weights = 10.0
//! state_units_decay = 0.5
//! model_name = "hidden1_64_melody_10"
//!
//! [playback]
//! bpm = 60
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;
pub mod model;
pub mod runtime;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use model::ModelConfig;
pub use runtime::{PlaybackConfig, TelemetryConfig, MAX_TICKS_PER_BEAT, MIN_BPM};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Complete MelodyNet configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MelodyConfig {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl MelodyConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration, letting `config_path` replace the local override.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    ///
    /// The merged result is validated before it is returned.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = MelodyConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::overlay_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);
        config.model.validate()?;
        config.playback.validate()?;

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Built by hand for stable key order and a header comment
        let mut output = String::new();

        output.push_str("# MelodyNet Configuration\n\n");

        output.push_str("[model]\n");
        output.push_str(&format!("hidden1_size = {}\n", self.model.hidden1_size));
        output.push_str(&format!("learning_rate = {:?}\n", self.model.learning_rate));
        output.push_str(&format!("weight_decay = {:?}\n", self.model.weight_decay));
        output.push_str(&format!("chord_weights = {:?}\n", self.model.chord_weights));
        output.push_str(&format!("melody_weights = {:?}\n", self.model.melody_weights));
        output.push_str(&format!(
            "state_units_decay = {:?}\n",
            self.model.state_units_decay
        ));
        output.push_str(&format!("model_name = {}\n", toml_string(&self.model.model_name)));
        output.push_str(&format!("seed = {}\n", self.model.seed));

        output.push_str("\n[playback]\n");
        output.push_str(&format!("ticks_per_beat = {}\n", self.playback.ticks_per_beat));
        output.push_str(&format!("bpm = {}\n", self.playback.bpm));
        output.push_str(&format!("velocity = {}\n", self.playback.velocity));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = {}\n", toml_string(&self.telemetry.log_level)));

        output
    }
}

/// Quote and escape a TOML basic string.
fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}
