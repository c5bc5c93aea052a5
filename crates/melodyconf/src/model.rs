//! Model hyperparameters - fixed once a network is built.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Hyperparameters of the hybrid melody network.
///
/// `learning_rate` and `weight_decay` only matter to the trainer. The two
/// fixed-weight scales and `hidden1_size` shape the network at construction;
/// `state_units_decay` drives the recurrence at inference time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Width of the first (fully learnable) hidden layer.
    /// Default: 64
    #[serde(default = "ModelConfig::default_hidden1_size")]
    pub hidden1_size: usize,

    /// SGD step size.
    /// Default: 0.01
    #[serde(default = "ModelConfig::default_learning_rate")]
    pub learning_rate: f64,

    /// L2 penalty applied to learnable parameters during a training step.
    /// Default: 0.0001
    #[serde(default = "ModelConfig::default_weight_decay")]
    pub weight_decay: f64,

    /// Diagonal value of the frozen chord-identity matrix.
    /// Default: 1.0
    #[serde(default = "ModelConfig::default_chord_weights")]
    pub chord_weights: f64,

    /// Row sum of the frozen chord-to-melody matrix.
    /// Default: 10.0
    #[serde(default = "ModelConfig::default_melody_weights")]
    pub melody_weights: f64,

    /// How much of the previous state survives each timestep, in [0, 1).
    /// Default: 0.5
    #[serde(default = "ModelConfig::default_state_units_decay")]
    pub state_units_decay: f64,

    /// Label only; used in log lines and file names.
    #[serde(default = "ModelConfig::default_model_name")]
    pub model_name: String,

    /// Seed for learnable weight initialization.
    #[serde(default)]
    pub seed: u64,
}

impl ModelConfig {
    fn default_hidden1_size() -> usize {
        64
    }

    fn default_learning_rate() -> f64 {
        0.01
    }

    fn default_weight_decay() -> f64 {
        0.0001
    }

    fn default_chord_weights() -> f64 {
        1.0
    }

    fn default_melody_weights() -> f64 {
        10.0
    }

    fn default_state_units_decay() -> f64 {
        0.5
    }

    fn default_model_name() -> String {
        "hnn".to_string()
    }

    /// Check ranges that the network and recurrence rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hidden1_size == 0 {
            return Err(ConfigError::Invalid {
                field: "hidden1_size",
                message: "must be greater than zero".to_string(),
            });
        }

        if !(0.0..1.0).contains(&self.state_units_decay) {
            return Err(ConfigError::Invalid {
                field: "state_units_decay",
                message: format!("{} is outside [0, 1)", self.state_units_decay),
            });
        }

        let finite = [
            ("learning_rate", self.learning_rate),
            ("weight_decay", self.weight_decay),
            ("chord_weights", self.chord_weights),
            ("melody_weights", self.melody_weights),
        ];
        for (field, value) in finite {
            if !value.is_finite() {
                return Err(ConfigError::Invalid {
                    field,
                    message: format!("{} is not a finite number", value),
                });
            }
        }

        for (field, value) in [
            ("learning_rate", self.learning_rate),
            ("weight_decay", self.weight_decay),
        ] {
            if value < 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    message: format!("{} must be non-negative", value),
                });
            }
        }

        Ok(())
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden1_size: Self::default_hidden1_size(),
            learning_rate: Self::default_learning_rate(),
            weight_decay: Self::default_weight_decay(),
            chord_weights: Self::default_chord_weights(),
            melody_weights: Self::default_melody_weights(),
            state_units_decay: Self::default_state_units_decay(),
            model_name: Self::default_model_name(),
            seed: 0,
        }
    }
}
