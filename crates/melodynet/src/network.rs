//! The hybrid network: learnable feature layer, mixed chord layer, fixed output.
//!
//! ```text
//! input (245) = state (145) | chord (84) | meter (16)
//!   Layer A   relu(W1 x + b1)                                   -> hidden1 (H)
//!   Layer B   relu(W2 h1 + b2 + Wx chord + I_fixed chord)       -> hidden2 (84)
//!   Layer C   M_fixed h2                                        -> logits (145)
//! ```
//!
//! Learnable and frozen parameters live in separate types. Only
//! `LearnableParams` is ever handed out mutably, and only inside the crate.

use melodyconf::ModelConfig;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::chord_table::ChordNoteTable;
use crate::error::{Error, LoadError, Result};
use crate::weights::FixedWeights;
use crate::{CHORD_OFFSET, CHORD_SIZE, HIDDEN2_SIZE, INPUT_SIZE, OUTPUT_SIZE};

/// Relative slack when checking stored fixed weights.
const WEIGHT_TOLERANCE: f32 = 1e-4;

/// Parameters an optimizer may update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnableParams {
    /// Layer A weights, `H x INPUT_SIZE`.
    pub hidden1_weight: Array2<f32>,
    pub hidden1_bias: Array1<f32>,
    /// Layer B hidden1 path, `HIDDEN2_SIZE x H`.
    pub hidden2_weight: Array2<f32>,
    pub hidden2_bias: Array1<f32>,
    /// Layer B chord path beside the frozen diagonal, `HIDDEN2_SIZE x CHORD_SIZE`.
    /// Its diagonal stays zero.
    pub chord_cross: Array2<f32>,
}

impl LearnableParams {
    /// All-zero parameters; the network output then depends on the fixed path only.
    pub fn zeros(hidden1_size: usize) -> Self {
        Self {
            hidden1_weight: Array2::zeros((hidden1_size, INPUT_SIZE)),
            hidden1_bias: Array1::zeros(hidden1_size),
            hidden2_weight: Array2::zeros((HIDDEN2_SIZE, hidden1_size)),
            hidden2_bias: Array1::zeros(HIDDEN2_SIZE),
            chord_cross: Array2::zeros((HIDDEN2_SIZE, CHORD_SIZE)),
        }
    }

    /// Uniform initialization in `[-1/sqrt(fan_in), 1/sqrt(fan_in)]`, seeded.
    pub fn init(hidden1_size: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let uniform = |fan_in: usize| {
            let bound = 1.0 / (fan_in as f32).sqrt();
            move |rng: &mut StdRng| rng.gen_range(-bound..=bound)
        };

        let sample1 = uniform(INPUT_SIZE);
        let hidden1_weight =
            Array2::from_shape_simple_fn((hidden1_size, INPUT_SIZE), || sample1(&mut rng));
        let hidden1_bias = Array1::from_shape_simple_fn(hidden1_size, || sample1(&mut rng));

        let sample2 = uniform(hidden1_size);
        let hidden2_weight =
            Array2::from_shape_simple_fn((HIDDEN2_SIZE, hidden1_size), || sample2(&mut rng));
        let hidden2_bias = Array1::from_shape_simple_fn(HIDDEN2_SIZE, || sample2(&mut rng));

        let sample_cross = uniform(CHORD_SIZE);
        let mut chord_cross =
            Array2::from_shape_simple_fn((HIDDEN2_SIZE, CHORD_SIZE), || sample_cross(&mut rng));
        chord_cross.diag_mut().fill(0.0);

        Self {
            hidden1_weight,
            hidden1_bias,
            hidden2_weight,
            hidden2_bias,
            chord_cross,
        }
    }

    pub fn hidden1_size(&self) -> usize {
        self.hidden1_bias.len()
    }

    /// Verify every tensor against the declared partition sizes.
    pub(crate) fn check_shapes(&self, hidden1_size: usize) -> std::result::Result<(), LoadError> {
        check_shape("hidden1.weight", self.hidden1_weight.shape(), &[hidden1_size, INPUT_SIZE])?;
        check_shape("hidden1.bias", self.hidden1_bias.shape(), &[hidden1_size])?;
        check_shape("hidden2.weight", self.hidden2_weight.shape(), &[HIDDEN2_SIZE, hidden1_size])?;
        check_shape("hidden2.bias", self.hidden2_bias.shape(), &[HIDDEN2_SIZE])?;
        check_shape("chord_cross", self.chord_cross.shape(), &[HIDDEN2_SIZE, CHORD_SIZE])?;
        // The frozen identity owns the diagonal
        let diagonal = self.chord_cross.diag();
        if let Some((i, w)) = diagonal.iter().enumerate().find(|(_, w)| **w != 0.0) {
            return Err(LoadError::Invariant {
                tensor: "chord_cross",
                message: format!("diagonal entry {} is {}, expected 0", i, w),
            });
        }
        Ok(())
    }
}

/// Parameters fixed at construction from the chord table. Read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct FrozenParams {
    fixed: FixedWeights,
}

impl FrozenParams {
    pub fn build(table: &ChordNoteTable, chord_weights: f32, melody_weights: f32) -> Result<Self> {
        Ok(Self {
            fixed: FixedWeights::build(table, chord_weights, melody_weights)?,
        })
    }

    /// Wrap already-built matrices, e.g. from a saved model.
    pub(crate) fn from_fixed(fixed: FixedWeights) -> std::result::Result<Self, LoadError> {
        check_shape(
            "chord_identity",
            fixed.chord_identity.shape(),
            &[HIDDEN2_SIZE, CHORD_SIZE],
        )?;
        check_shape(
            "chord_to_melody",
            fixed.chord_to_melody.shape(),
            &[OUTPUT_SIZE, HIDDEN2_SIZE],
        )?;
        Ok(Self { fixed })
    }

    /// Check the values against the scales they were built with: an exact
    /// `chord_weights` diagonal and chord-to-melody rows summing to `melody_weights`.
    pub(crate) fn check_values(&self, chord_weights: f32, melody_weights: f32) -> Result<()> {
        for ((i, j), &w) in self.fixed.chord_identity.indexed_iter() {
            let want = if i == j { chord_weights } else { 0.0 };
            if (w - want).abs() > WEIGHT_TOLERANCE * want.abs().max(1.0) {
                return Err(LoadError::Invariant {
                    tensor: "chord_identity",
                    message: format!("entry ({}, {}) is {}, expected {}", i, j, w, want),
                }
                .into());
            }
        }

        let tolerance = WEIGHT_TOLERANCE * melody_weights.abs().max(1.0);
        for (i, row) in self.fixed.chord_to_melody.rows().into_iter().enumerate() {
            let sum = row.sum();
            if !(sum.is_finite() && sum > 0.0) {
                return Err(Error::DegenerateNormalization {
                    what: format!("chord-to-melody row {}", i),
                    sum,
                });
            }
            if (sum - melody_weights).abs() > tolerance {
                return Err(LoadError::Invariant {
                    tensor: "chord_to_melody",
                    message: format!("row {} sums to {}, expected {}", i, sum, melody_weights),
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn chord_identity(&self) -> &Array2<f32> {
        &self.fixed.chord_identity
    }

    pub fn chord_to_melody(&self) -> &Array2<f32> {
        &self.fixed.chord_to_melody
    }
}

fn check_shape(
    tensor: &'static str,
    actual: &[usize],
    expected: &[usize],
) -> std::result::Result<(), LoadError> {
    if actual == expected {
        Ok(())
    } else {
        Err(LoadError::Shape {
            tensor,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}

/// Intermediate activations of one batched forward pass.
#[derive(Debug, Clone)]
pub(crate) struct ForwardTrace {
    pub pre_hidden1: Array2<f32>,
    pub hidden1: Array2<f32>,
    pub pre_hidden2: Array2<f32>,
    pub hidden2: Array2<f32>,
    pub logits: Array2<f32>,
}

/// The hybrid melody network. Forward passes are pure.
#[derive(Debug, Clone)]
pub struct HybridNetwork {
    config: ModelConfig,
    learnable: LearnableParams,
    frozen: FrozenParams,
}

impl HybridNetwork {
    /// Build a fresh network: fixed weights from `table`, learnable weights
    /// from `config.seed`.
    pub fn new(config: &ModelConfig, table: &ChordNoteTable) -> Result<Self> {
        config.validate()?;
        let frozen = FrozenParams::build(
            table,
            config.chord_weights as f32,
            config.melody_weights as f32,
        )?;
        let learnable = LearnableParams::init(config.hidden1_size, config.seed);

        info!(
            model = %config.model_name,
            hidden1 = config.hidden1_size,
            seed = config.seed,
            "initialized hybrid network"
        );

        Ok(Self {
            config: config.clone(),
            learnable,
            frozen,
        })
    }

    /// Assemble a network from existing parameters, checking every shape and
    /// the fixed-weight invariants against `config`.
    pub fn from_parts(
        config: ModelConfig,
        learnable: LearnableParams,
        frozen: FrozenParams,
    ) -> Result<Self> {
        config.validate()?;
        learnable.check_shapes(config.hidden1_size)?;
        frozen.check_values(config.chord_weights as f32, config.melody_weights as f32)?;
        Ok(Self {
            config,
            learnable,
            frozen,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn hidden1_size(&self) -> usize {
        self.config.hidden1_size
    }

    pub fn learnable(&self) -> &LearnableParams {
        &self.learnable
    }

    pub(crate) fn learnable_mut(&mut self) -> &mut LearnableParams {
        &mut self.learnable
    }

    pub fn frozen(&self) -> &FrozenParams {
        &self.frozen
    }

    /// Logits for a single input vector of width `INPUT_SIZE`.
    pub fn forward(&self, input: ArrayView1<'_, f32>) -> Result<Array1<f32>> {
        let logits = self.forward_batch(input.insert_axis(Axis(0)))?;
        Ok(logits.index_axis_move(Axis(0), 0))
    }

    /// Logits for a batch of inputs, one row per sample.
    pub fn forward_batch(&self, inputs: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        Ok(self.forward_trace(inputs)?.logits)
    }

    pub(crate) fn forward_trace(&self, inputs: ArrayView2<'_, f32>) -> Result<ForwardTrace> {
        if inputs.ncols() != INPUT_SIZE {
            return Err(Error::ShapeMismatch {
                what: "network input",
                expected: INPUT_SIZE,
                actual: inputs.ncols(),
            });
        }
        let params = &self.learnable;

        let pre_hidden1 = inputs.dot(&params.hidden1_weight.t()) + &params.hidden1_bias;
        let hidden1 = pre_hidden1.mapv(relu);

        let chord = inputs.slice(s![.., CHORD_OFFSET..CHORD_OFFSET + CHORD_SIZE]);
        let pre_hidden2 = hidden1.dot(&params.hidden2_weight.t())
            + &params.hidden2_bias
            + chord.dot(&params.chord_cross.t())
            + chord.dot(&self.frozen.chord_identity().t());
        let hidden2 = pre_hidden2.mapv(relu);

        let logits = hidden2.dot(&self.frozen.chord_to_melody().t());

        Ok(ForwardTrace {
            pre_hidden1,
            hidden1,
            pre_hidden2,
            hidden2,
            logits,
        })
    }
}

fn relu(x: f32) -> f32 {
    x.max(0.0)
}
