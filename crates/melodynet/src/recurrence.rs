//! Driving a trained network over a song, one melody symbol per timestep.
//!
//! Each step encodes the previous state distribution, the current note's
//! pitch class, and a two-phase meter into one input vector, runs a forward
//! pass, folds the softmax of the logits into the state with exponential
//! decay, and decodes the argmax as a chord.

use std::fmt;

use melodyconf::ConfigError;
use ndarray::{s, Array1, ArrayView1};
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::network::HybridNetwork;
use crate::playback::PlaybackSink;
use crate::source::SongSource;
use crate::vocab::{ChordClass, MelodySymbol, MeterClass};
use crate::{CHORD_OFFSET, INPUT_SIZE, METER_OFFSET, STATE_SIZE};

/// Probability distribution over melody classes carried between timesteps.
///
/// Starts at all zeros; after the first step it is non-negative and sums to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct StateVector(Array1<f32>);

impl StateVector {
    pub fn zeros() -> Self {
        Self(Array1::zeros(STATE_SIZE))
    }

    pub fn view(&self) -> ArrayView1<'_, f32> {
        self.0.view()
    }

    pub fn sum(&self) -> f32 {
        self.0.sum()
    }

    /// `softmax(logits) + decay * state`, renormalized to sum 1.
    pub fn update(&self, logits: ArrayView1<'_, f32>, decay: f32) -> Result<Self> {
        if logits.len() != STATE_SIZE {
            return Err(Error::ShapeMismatch {
                what: "state logits",
                expected: STATE_SIZE,
                actual: logits.len(),
            });
        }
        let mut next = softmax(logits);
        next.scaled_add(decay, &self.0);

        let sum = next.sum();
        if !(sum.is_finite() && sum > 0.0) {
            return Err(Error::DegenerateNormalization {
                what: "state vector".to_string(),
                sum,
            });
        }
        next /= sum;
        Ok(Self(next))
    }
}

impl Default for StateVector {
    fn default() -> Self {
        Self::zeros()
    }
}

/// What one timestep produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Emission {
    pub timestep: usize,
    /// The input symbol in sharp spelling, `None` when it was not a note.
    pub melody: Option<String>,
    /// Decoded chord; `None` when the argmax fell outside the chord range.
    pub chord: Option<ChordClass>,
    /// Raw argmax over the output logits.
    pub predicted_index: usize,
}

impl fmt::Display for Emission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let melody = self.melody.as_deref().unwrap_or("-");
        match self.chord {
            Some(chord) => write!(f, "note: {}, chord: {}", melody, chord),
            None => write!(f, "note: {}, chord: - (class {})", melody, self.predicted_index),
        }
    }
}

/// Build the network input for one timestep.
///
/// The state fills the state partition, the note's pitch class is one-hot in
/// the first 12 entries of the chord partition, and the meter phase is
/// one-hot in the meter partition. Everything else is zero; an unrecognized
/// symbol leaves the pitch slots empty.
pub fn encode_input(
    state: &StateVector,
    symbol: Option<MelodySymbol>,
    timestep: usize,
) -> Array1<f32> {
    let mut input = Array1::zeros(INPUT_SIZE);
    input.slice_mut(s![..STATE_SIZE]).assign(&state.0);
    if let Some(symbol) = symbol {
        input[CHORD_OFFSET + symbol.pitch.index()] = 1.0;
    }
    input[METER_OFFSET + MeterClass::for_timestep(timestep).index()] = 1.0;
    input
}

/// Numerically stable softmax.
pub fn softmax(logits: ArrayView1<'_, f32>) -> Array1<f32> {
    let max = logits.fold(f32::NEG_INFINITY, |acc, &z| acc.max(z));
    let mut exps = logits.mapv(|z| (z - max).exp());
    let sum = exps.sum();
    exps /= sum;
    exps
}

/// Index of the largest value; ties go to the lowest index.
pub fn argmax(values: ArrayView1<'_, f32>) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Stateful driver over one song.
pub struct Recurrence<'a> {
    network: &'a HybridNetwork,
    decay: f32,
    state: StateVector,
    timestep: usize,
}

impl<'a> Recurrence<'a> {
    /// Driver using the network's configured `state_units_decay`.
    pub fn new(network: &'a HybridNetwork) -> Self {
        Self {
            network,
            decay: network.config().state_units_decay as f32,
            state: StateVector::zeros(),
            timestep: 0,
        }
    }

    /// Driver with an explicit decay in `[0, 1)`.
    pub fn with_decay(network: &'a HybridNetwork, decay: f32) -> Result<Self> {
        if !(0.0..1.0).contains(&decay) {
            return Err(Error::Config(ConfigError::Invalid {
                field: "state_units_decay",
                message: format!("must be in [0, 1), got {}", decay),
            }));
        }
        Ok(Self {
            decay,
            ..Self::new(network)
        })
    }

    pub fn state(&self) -> &StateVector {
        &self.state
    }

    pub fn timestep(&self) -> usize {
        self.timestep
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }

    /// Advance by one melody symbol.
    pub fn step(&mut self, symbol: &str) -> Result<Emission> {
        let parsed = MelodySymbol::parse(symbol);
        if parsed.is_none() {
            debug!(timestep = self.timestep, symbol, "not a note, encoding as silence");
        }

        let input = encode_input(&self.state, parsed, self.timestep);
        let logits = self.network.forward(input.view())?;
        self.state = self.state.update(logits.view(), self.decay)?;

        let predicted_index = argmax(logits.view());
        let emission = Emission {
            timestep: self.timestep,
            melody: parsed.map(MelodySymbol::label),
            chord: ChordClass::from_index(predicted_index),
            predicted_index,
        };
        trace!(
            timestep = self.timestep,
            predicted_index,
            state_sum = self.state.sum(),
            "step"
        );

        self.timestep += 1;
        Ok(emission)
    }

    /// Step through every symbol, handing each emission to `sink`.
    /// Returns the number of timesteps played.
    pub fn run<I, S, P>(&mut self, symbols: I, sink: &mut P) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        P: PlaybackSink + ?Sized,
    {
        let start = self.timestep;
        for symbol in symbols {
            let emission = self.step(symbol.as_ref())?;
            sink.play(&emission);
        }
        Ok(self.timestep - start)
    }
}

/// Play song `index` from `source` through a fresh recurrence.
pub fn play_song<S, P>(
    network: &HybridNetwork,
    source: &S,
    index: usize,
    decay: f32,
    sink: &mut P,
) -> Result<usize>
where
    S: SongSource + ?Sized,
    P: PlaybackSink + ?Sized,
{
    let song = source.song(index)?;
    let mut recurrence = Recurrence::with_decay(network, decay)?;
    let steps = recurrence.run(&song, sink)?;
    info!(song = index, steps, decay, "played song");
    Ok(steps)
}
