//! Saving and loading trained networks.
//!
//! A saved model is one JSON document holding the model config, the
//! learnable tensors, and the frozen matrices. Frozen weights are stored
//! rather than rebuilt so a model keeps working if the chord table changes.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use melodyconf::ModelConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, LoadError, Result};
use crate::network::{FrozenParams, HybridNetwork, LearnableParams};
use crate::weights::FixedWeights;
use crate::{HIDDEN2_SIZE, INPUT_SIZE, OUTPUT_SIZE};

/// Bump when the saved layout changes.
pub const FORMAT_VERSION: u32 = 1;

/// Where tensors live after loading. Only the CPU is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
}

impl FromStr for Device {
    type Err = LoadError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            _ => Err(LoadError::UnsupportedDevice(s.to_string())),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Sizes {
    input: usize,
    hidden1: usize,
    hidden2: usize,
    output: usize,
}

#[derive(Serialize, Deserialize)]
struct SavedModel {
    format_version: u32,
    config: ModelConfig,
    sizes: Sizes,
    learnable: LearnableParams,
    frozen: FixedWeights,
}

/// Reads and writes models on disk.
pub struct ModelStore;

impl ModelStore {
    pub fn save(network: &HybridNetwork, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let frozen = network.frozen();
        let saved = SavedModel {
            format_version: FORMAT_VERSION,
            config: network.config().clone(),
            sizes: Sizes {
                input: INPUT_SIZE,
                hidden1: network.hidden1_size(),
                hidden2: HIDDEN2_SIZE,
                output: OUTPUT_SIZE,
            },
            learnable: network.learnable().clone(),
            frozen: FixedWeights {
                chord_identity: frozen.chord_identity().clone(),
                chord_to_melody: frozen.chord_to_melody().clone(),
            },
        };

        let json = serde_json::to_string(&saved).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        std::fs::write(path, json).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), model = %network.config().model_name, "saved model");
        Ok(())
    }

    /// Load a model onto `device`, checking version, every tensor shape, and
    /// the fixed-weight invariants.
    pub fn load(path: impl AsRef<Path>, device: Device) -> Result<HybridNetwork> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let saved: SavedModel = serde_json::from_str(&contents).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if saved.format_version != FORMAT_VERSION {
            return Err(LoadError::Version {
                found: saved.format_version,
                expected: FORMAT_VERSION,
            }
            .into());
        }

        let expected = Sizes {
            input: INPUT_SIZE,
            hidden1: saved.config.hidden1_size,
            hidden2: HIDDEN2_SIZE,
            output: OUTPUT_SIZE,
        };
        if saved.sizes != expected {
            return Err(LoadError::Shape {
                tensor: "sizes",
                expected: vec![expected.input, expected.hidden1, expected.hidden2, expected.output],
                actual: vec![
                    saved.sizes.input,
                    saved.sizes.hidden1,
                    saved.sizes.hidden2,
                    saved.sizes.output,
                ],
            }
            .into());
        }

        let frozen = FrozenParams::from_fixed(saved.frozen)?;
        let network = HybridNetwork::from_parts(saved.config, saved.learnable, frozen)?;
        info!(
            path = %path.display(),
            model = %network.config().model_name,
            %device,
            "loaded model"
        );
        Ok(network)
    }
}
