//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, MelodyConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/melodynet/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("melodynet/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("melodynet.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and overlay the keys it sets onto `config`.
pub fn overlay_file(config: &mut MelodyConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    overlay_toml(config, &contents, path)
}

/// Overlay keys present in `contents` onto `config`. Absent keys keep their
/// current value, so later files only need to mention what they change.
pub(crate) fn overlay_toml(
    config: &mut MelodyConfig,
    contents: &str,
    path: &Path,
) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let section = |name: &str| table.get(name).and_then(|v| v.as_table());

    if let Some(model) = section("model") {
        let reader = TableReader { table: model, path };
        if let Some(v) = reader.integer("hidden1_size")? {
            config.model.hidden1_size = reader.narrow("hidden1_size", v)?;
        }
        if let Some(v) = reader.float("learning_rate")? {
            config.model.learning_rate = v;
        }
        if let Some(v) = reader.float("weight_decay")? {
            config.model.weight_decay = v;
        }
        if let Some(v) = reader.float("chord_weights")? {
            config.model.chord_weights = v;
        }
        if let Some(v) = reader.float("melody_weights")? {
            config.model.melody_weights = v;
        }
        if let Some(v) = reader.float("state_units_decay")? {
            config.model.state_units_decay = v;
        }
        if let Some(v) = reader.string("model_name")? {
            config.model.model_name = v;
        }
        if let Some(v) = reader.integer("seed")? {
            config.model.seed = v;
        }
    }

    if let Some(playback) = section("playback") {
        let reader = TableReader {
            table: playback,
            path,
        };
        if let Some(v) = reader.integer("ticks_per_beat")? {
            config.playback.ticks_per_beat = reader.narrow("ticks_per_beat", v)?;
        }
        if let Some(v) = reader.integer("bpm")? {
            config.playback.bpm = reader.narrow("bpm", v)?;
        }
        if let Some(v) = reader.integer("velocity")? {
            config.playback.velocity = reader.narrow("velocity", v)?;
        }
    }

    if let Some(telemetry) = section("telemetry") {
        let reader = TableReader {
            table: telemetry,
            path,
        };
        if let Some(v) = reader.string("log_level")? {
            config.telemetry.log_level = v;
        }
    }

    Ok(())
}

/// Typed access to one TOML section, reporting type errors against the file.
struct TableReader<'a> {
    table: &'a toml::Table,
    path: &'a Path,
}

impl TableReader<'_> {
    fn type_error(&self, key: &str, expected: &str) -> ConfigError {
        ConfigError::Parse {
            path: self.path.to_path_buf(),
            message: format!("`{}` must be {}", key, expected),
        }
    }

    fn integer(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        match self.table.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_integer()
                .filter(|n| *n >= 0)
                .map(|n| Some(n as u64))
                .ok_or_else(|| self.type_error(key, "a non-negative integer")),
        }
    }

    /// Convert an integer read from the file to the field's width.
    fn narrow<T: TryFrom<u64>>(&self, key: &str, value: u64) -> Result<T, ConfigError> {
        T::try_from(value).map_err(|_| ConfigError::Parse {
            path: self.path.to_path_buf(),
            message: format!("`{}` = {} is out of range", key, value),
        })
    }

    fn float(&self, key: &str) -> Result<Option<f64>, ConfigError> {
        match self.table.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_float()
                .or_else(|| v.as_integer().map(|n| n as f64))
                .map(Some)
                .ok_or_else(|| self.type_error(key, "a number")),
        }
    }

    fn string(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match self.table.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| self.type_error(key, "a string")),
        }
    }
}

/// Apply environment variable overrides to config.
///
/// Unparseable numeric values are ignored rather than failing the load.
pub fn apply_env_overrides(config: &mut MelodyConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

pub(crate) fn apply_overrides_from(
    config: &mut MelodyConfig,
    sources: &mut ConfigSources,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let mut record = |key: &str| sources.env_overrides.push(key.to_string());

    if let Some(v) = lookup("MELODYNET_HIDDEN1_SIZE").and_then(|v| v.parse().ok()) {
        config.model.hidden1_size = v;
        record("MELODYNET_HIDDEN1_SIZE");
    }
    if let Some(v) = lookup("MELODYNET_LEARNING_RATE").and_then(|v| v.parse().ok()) {
        config.model.learning_rate = v;
        record("MELODYNET_LEARNING_RATE");
    }
    if let Some(v) = lookup("MELODYNET_WEIGHT_DECAY").and_then(|v| v.parse().ok()) {
        config.model.weight_decay = v;
        record("MELODYNET_WEIGHT_DECAY");
    }
    if let Some(v) = lookup("MELODYNET_CHORD_WEIGHTS").and_then(|v| v.parse().ok()) {
        config.model.chord_weights = v;
        record("MELODYNET_CHORD_WEIGHTS");
    }
    if let Some(v) = lookup("MELODYNET_MELODY_WEIGHTS").and_then(|v| v.parse().ok()) {
        config.model.melody_weights = v;
        record("MELODYNET_MELODY_WEIGHTS");
    }
    if let Some(v) = lookup("MELODYNET_DECAY").and_then(|v| v.parse().ok()) {
        config.model.state_units_decay = v;
        record("MELODYNET_DECAY");
    }
    if let Some(v) = lookup("MELODYNET_MODEL_NAME") {
        config.model.model_name = v;
        record("MELODYNET_MODEL_NAME");
    }
    if let Some(v) = lookup("MELODYNET_SEED").and_then(|v| v.parse().ok()) {
        config.model.seed = v;
        record("MELODYNET_SEED");
    }
    if let Some(v) = lookup("MELODYNET_BPM").and_then(|v| v.parse().ok()) {
        config.playback.bpm = v;
        record("MELODYNET_BPM");
    }

    if let Some(v) = lookup("MELODYNET_LOG_LEVEL") {
        config.telemetry.log_level = v;
        record("MELODYNET_LOG_LEVEL");
    }
    // RUST_LOG wins over everything else for log filtering
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        record("RUST_LOG");
    }
}
