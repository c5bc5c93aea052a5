//! Plain SGD over the learnable parameters.
//!
//! Loss is mean cross-entropy of the logits against target melody classes.
//! Weight decay is L2, folded into the gradient; there is no momentum.
//! Frozen matrices take part in the backward pass but are never written.

use melodyconf::ModelConfig;
use ndarray::{s, Array, Array1, Array2, ArrayView2, Axis, Dimension};
use tracing::debug;

use crate::error::{Error, Result};
use crate::network::HybridNetwork;
use crate::recurrence::{encode_input, softmax, StateVector};
use crate::vocab::{MelodyClass, MelodySymbol};
use crate::{CHORD_OFFSET, CHORD_SIZE, INPUT_SIZE, OUTPUT_SIZE};

/// One supervised sample: a full network input and the melody class it should predict.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub input: Array1<f32>,
    pub target: MelodyClass,
}

impl TrainingExample {
    pub fn new(input: Array1<f32>, target: MelodyClass) -> Self {
        Self { input, target }
    }

    /// Encode `symbol` at `timestep` the same way the recurrence does.
    pub fn at_timestep(
        state: &StateVector,
        symbol: &str,
        timestep: usize,
        target: MelodyClass,
    ) -> Self {
        let input = encode_input(state, MelodySymbol::parse(symbol), timestep);
        Self { input, target }
    }
}

struct Gradients {
    hidden1_weight: Array2<f32>,
    hidden1_bias: Array1<f32>,
    hidden2_weight: Array2<f32>,
    hidden2_bias: Array1<f32>,
    chord_cross: Array2<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sgd {
    pub learning_rate: f32,
    pub weight_decay: f32,
}

impl Sgd {
    pub fn new(learning_rate: f32, weight_decay: f32) -> Self {
        Self {
            learning_rate,
            weight_decay,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(config.learning_rate as f32, config.weight_decay as f32)
    }

    /// One update from a set of examples. Returns the loss before the update.
    pub fn step(&self, network: &mut HybridNetwork, examples: &[TrainingExample]) -> Result<f32> {
        let (inputs, targets) = stack(examples)?;
        self.step_batch(network, inputs.view(), &targets)
    }

    /// One update from a batch of input rows and their target class indices.
    pub fn step_batch(
        &self,
        network: &mut HybridNetwork,
        inputs: ArrayView2<'_, f32>,
        targets: &[usize],
    ) -> Result<f32> {
        let (loss, grads) = gradients(network, inputs, targets)?;

        let (lr, wd) = (self.learning_rate, self.weight_decay);
        let params = network.learnable_mut();
        descend(&mut params.hidden1_weight, &grads.hidden1_weight, lr, wd);
        descend(&mut params.hidden1_bias, &grads.hidden1_bias, lr, wd);
        descend(&mut params.hidden2_weight, &grads.hidden2_weight, lr, wd);
        descend(&mut params.hidden2_bias, &grads.hidden2_bias, lr, wd);
        descend(&mut params.chord_cross, &grads.chord_cross, lr, wd);

        debug!(loss, batch = targets.len(), "sgd step");
        Ok(loss)
    }
}

/// Mean cross-entropy of the network on a batch, without updating anything.
pub fn cross_entropy(
    network: &HybridNetwork,
    inputs: ArrayView2<'_, f32>,
    targets: &[usize],
) -> Result<f32> {
    check_targets(inputs, targets)?;
    let logits = network.forward_batch(inputs)?;
    let probs = softmax_rows(&logits);
    Ok(mean_nll(&probs, targets))
}

fn stack(examples: &[TrainingExample]) -> Result<(Array2<f32>, Vec<usize>)> {
    let mut inputs = Array2::zeros((examples.len(), INPUT_SIZE));
    for (mut row, example) in inputs.rows_mut().into_iter().zip(examples) {
        if example.input.len() != INPUT_SIZE {
            return Err(Error::ShapeMismatch {
                what: "training input",
                expected: INPUT_SIZE,
                actual: example.input.len(),
            });
        }
        row.assign(&example.input);
    }
    let targets = examples.iter().map(|e| e.target.index()).collect();
    Ok((inputs, targets))
}

fn check_targets(inputs: ArrayView2<'_, f32>, targets: &[usize]) -> Result<()> {
    if inputs.nrows() == 0 || targets.len() != inputs.nrows() {
        return Err(Error::ShapeMismatch {
            what: "training targets",
            expected: inputs.nrows().max(1),
            actual: targets.len(),
        });
    }
    if let Some(&bad) = targets.iter().find(|&&t| t >= OUTPUT_SIZE) {
        return Err(Error::ShapeMismatch {
            what: "target class",
            expected: OUTPUT_SIZE,
            actual: bad,
        });
    }
    Ok(())
}

fn softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut probs = logits.clone();
    for mut row in probs.rows_mut() {
        let p = softmax(row.view());
        row.assign(&p);
    }
    probs
}

fn mean_nll(probs: &Array2<f32>, targets: &[usize]) -> f32 {
    let total: f32 = targets
        .iter()
        .enumerate()
        .map(|(b, &t)| -probs[[b, t]].max(f32::MIN_POSITIVE).ln())
        .sum();
    total / targets.len() as f32
}

fn gradients(
    network: &HybridNetwork,
    inputs: ArrayView2<'_, f32>,
    targets: &[usize],
) -> Result<(f32, Gradients)> {
    check_targets(inputs, targets)?;
    let trace = network.forward_trace(inputs)?;
    let params = network.learnable();
    let batch = inputs.nrows() as f32;

    let probs = softmax_rows(&trace.logits);
    let loss = mean_nll(&probs, targets);

    let mut d_logits = probs;
    for (b, &t) in targets.iter().enumerate() {
        d_logits[[b, t]] -= 1.0;
    }
    d_logits /= batch;

    let d_hidden2 = d_logits.dot(network.frozen().chord_to_melody());
    let d_pre2 = d_hidden2 * trace.pre_hidden2.mapv(relu_grad);

    let chord = inputs.slice(s![.., CHORD_OFFSET..CHORD_OFFSET + CHORD_SIZE]);
    let hidden2_weight = d_pre2.t().dot(&trace.hidden1);
    let hidden2_bias = d_pre2.sum_axis(Axis(0));
    let mut chord_cross = d_pre2.t().dot(&chord);
    // Frozen identity owns the diagonal
    chord_cross.diag_mut().fill(0.0);

    let d_hidden1 = d_pre2.dot(&params.hidden2_weight);
    let d_pre1 = d_hidden1 * trace.pre_hidden1.mapv(relu_grad);
    let hidden1_weight = d_pre1.t().dot(&inputs);
    let hidden1_bias = d_pre1.sum_axis(Axis(0));

    Ok((
        loss,
        Gradients {
            hidden1_weight,
            hidden1_bias,
            hidden2_weight,
            hidden2_bias,
            chord_cross,
        },
    ))
}

fn relu_grad(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else {
        0.0
    }
}

fn descend<D: Dimension>(param: &mut Array<f32, D>, grad: &Array<f32, D>, lr: f32, wd: f32) {
    param.zip_mut_with(grad, |w, &g| *w -= lr * (g + wd * *w));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord_table::ChordNoteTable;
    use crate::vocab::ChordClass;
    use crate::{METER_OFFSET, STATE_SIZE};

    fn network() -> HybridNetwork {
        let config = ModelConfig {
            hidden1_size: 16,
            seed: 21,
            ..Default::default()
        };
        HybridNetwork::new(&config, &ChordNoteTable::standard()).unwrap()
    }

    fn c_major_example() -> (Array2<f32>, Vec<usize>, usize) {
        let cmaj = ChordClass::parse("Cmaj").unwrap().index();
        let mut input = Array2::zeros((1, INPUT_SIZE));
        input
            .slice_mut(s![0, ..STATE_SIZE])
            .fill(1.0 / STATE_SIZE as f32);
        input[[0, CHORD_OFFSET + cmaj]] = 1.0;
        input[[0, METER_OFFSET]] = 1.0;
        let target = MelodyClass::all()
            .find(|c| c.label() == "C")
            .unwrap()
            .index();
        (input, vec![target], cmaj)
    }

    #[test]
    fn step_leaves_frozen_weights_bit_identical() {
        let mut net = network();
        let frozen_before = net.frozen().clone();
        let learnable_before = net.learnable().clone();
        let (inputs, targets, _) = c_major_example();

        Sgd::new(0.1, 0.01)
            .step_batch(&mut net, inputs.view(), &targets)
            .unwrap();

        assert_eq!(net.frozen(), &frozen_before);
        assert_ne!(net.learnable(), &learnable_before);
        assert_ne!(net.learnable().hidden2_bias, learnable_before.hidden2_bias);
    }

    #[test]
    fn chord_cross_diagonal_stays_zero() {
        let mut net = network();
        let (inputs, targets, _) = c_major_example();
        let sgd = Sgd::new(0.5, 0.0);
        for _ in 0..5 {
            sgd.step_batch(&mut net, inputs.view(), &targets).unwrap();
        }
        assert!(net.learnable().chord_cross.diag().iter().all(|&w| w == 0.0));
    }

    #[test]
    fn repeated_steps_reduce_loss() {
        let mut net = network();
        let (inputs, targets, _) = c_major_example();
        let sgd = Sgd::new(0.05, 0.0);

        let initial = cross_entropy(&net, inputs.view(), &targets).unwrap();
        for _ in 0..20 {
            sgd.step_batch(&mut net, inputs.view(), &targets).unwrap();
        }
        let trained = cross_entropy(&net, inputs.view(), &targets).unwrap();
        assert!(trained < initial, "{} !< {}", trained, initial);
    }

    #[test]
    fn zero_learning_rate_is_a_no_op() {
        let mut net = network();
        let before = net.learnable().clone();
        let (inputs, targets, _) = c_major_example();
        let loss = Sgd::new(0.0, 0.5)
            .step_batch(&mut net, inputs.view(), &targets)
            .unwrap();
        assert_eq!(net.learnable(), &before);
        assert!(loss > 0.0);
    }

    #[test]
    fn analytic_gradient_matches_finite_difference() {
        // Probe parameters that only move the Cmaj pre-activation, which the
        // frozen identity keeps well above zero.
        let net = network();
        let (inputs, targets, cmaj) = c_major_example();
        let (_, grads) = gradients(&net, inputs.view(), &targets).unwrap();
        let eps = 1e-2;

        let loss_with = |edit: &dyn Fn(&mut HybridNetwork)| {
            let mut probe = net.clone();
            edit(&mut probe);
            cross_entropy(&probe, inputs.view(), &targets).unwrap()
        };

        let numeric = (loss_with(&|n: &mut HybridNetwork| n.learnable_mut().hidden2_bias[cmaj] += eps)
            - loss_with(&|n: &mut HybridNetwork| n.learnable_mut().hidden2_bias[cmaj] -= eps))
            / (2.0 * eps);
        assert!(
            (numeric - grads.hidden2_bias[cmaj]).abs() < 2e-3,
            "numeric {} analytic {}",
            numeric,
            grads.hidden2_bias[cmaj]
        );

        let trace = net.forward_trace(inputs.view()).unwrap();
        let unit = argmax_positive(trace.hidden1.row(0).to_owned());
        if let Some(j) = unit {
            let numeric = (loss_with(&|n: &mut HybridNetwork| n.learnable_mut().hidden2_weight[[cmaj, j]] += eps)
                - loss_with(&|n: &mut HybridNetwork| n.learnable_mut().hidden2_weight[[cmaj, j]] -= eps))
                / (2.0 * eps);
            assert!((numeric - grads.hidden2_weight[[cmaj, j]]).abs() < 2e-3);
        }
    }

    fn argmax_positive(values: Array1<f32>) -> Option<usize> {
        let best = crate::recurrence::argmax(values.view());
        (values[best] > 0.0).then_some(best)
    }

    #[test]
    fn examples_encode_like_the_recurrence() {
        let state = StateVector::zeros();
        let target = MelodyClass::from_index(40).unwrap();
        let example = TrainingExample::at_timestep(&state, "D4", 1, target);
        assert_eq!(example.input, encode_input(&state, MelodySymbol::parse("D4"), 1));

        let mut net = network();
        let loss = Sgd::from_config(net.config())
            .step(&mut net, &[example.clone(), example])
            .unwrap();
        assert!(loss.is_finite());
    }

    #[test]
    fn bad_targets_are_rejected() {
        let mut net = network();
        let (inputs, _, _) = c_major_example();
        let sgd = Sgd::new(0.1, 0.0);
        assert!(matches!(
            sgd.step_batch(&mut net, inputs.view(), &[]),
            Err(Error::ShapeMismatch { what: "training targets", .. })
        ));
        assert!(matches!(
            sgd.step_batch(&mut net, inputs.view(), &[145]),
            Err(Error::ShapeMismatch { what: "target class", .. })
        ));
        assert!(matches!(
            sgd.step(&mut net, &[]),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
