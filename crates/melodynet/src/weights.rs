//! Fixed (non-trainable) weight construction from chord/note membership.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chord_table::ChordNoteTable;
use crate::error::{ConfigurationError, Error, Result};
use crate::vocab::{ChordClass, MelodyClass};
use crate::{CHORD_SIZE, OUTPUT_SIZE};

/// The two frozen matrices derived from the vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedWeights {
    /// `CHORD_SIZE x CHORD_SIZE`, `chord_weights` on the diagonal, zero elsewhere.
    pub chord_identity: Array2<f32>,
    /// `OUTPUT_SIZE x CHORD_SIZE`, every row sums to `melody_weights`.
    pub chord_to_melody: Array2<f32>,
}

impl FixedWeights {
    pub fn build(table: &ChordNoteTable, chord_weights: f32, melody_weights: f32) -> Result<Self> {
        let chord_identity = chord_identity(chord_weights);
        let chord_to_melody = chord_to_melody(table, melody_weights)?;
        debug!(chord_weights, melody_weights, "built fixed weights");
        Ok(Self {
            chord_identity,
            chord_to_melody,
        })
    }
}

/// Diagonal chord -> hidden2 matrix: chord `i` drives hidden2 neuron `i` only.
pub fn chord_identity(chord_weights: f32) -> Array2<f32> {
    Array2::from_diag_elem(CHORD_SIZE, chord_weights)
}

/// Chord -> melody compatibility matrix.
///
/// Entry `(note, chord)` is 1 when the note's pitch class is a chord tone;
/// rest is reachable from every chord. Rows are then normalized to sum to 1
/// and scaled by `melody_weights`.
pub fn chord_to_melody(table: &ChordNoteTable, melody_weights: f32) -> Result<Array2<f32>> {
    let masks = ChordClass::all()
        .map(|chord| table.pitch_mask(chord))
        .collect::<std::result::Result<Vec<u16>, _>>()?;
    // Every chord is present, so any surplus entry is a label outside the vocabulary
    if table.len() != CHORD_SIZE {
        return Err(ConfigurationError::VocabularySize {
            expected: CHORD_SIZE,
            actual: table.len(),
        }
        .into());
    }

    let mut matrix = Array2::<f32>::zeros((OUTPUT_SIZE, CHORD_SIZE));
    matrix.row_mut(MelodyClass::Rest.index()).fill(1.0);

    for class in MelodyClass::all() {
        let Some(pitch) = class.pitch() else {
            continue;
        };
        let bit = 1u16 << pitch.index();
        for (j, mask) in masks.iter().enumerate() {
            if mask & bit != 0 {
                matrix[[class.index(), j]] = 1.0;
            }
        }
    }

    for (i, mut row) in matrix.rows_mut().into_iter().enumerate() {
        let sum = row.sum();
        if !(sum.is_finite() && sum > 0.0) {
            let label = MelodyClass::from_index(i).map_or("?", MelodyClass::label);
            return Err(Error::DegenerateNormalization {
                what: format!("chord-to-melody row {} ({})", i, label),
                sum,
            });
        }
        row.mapv_inplace(|w| w / sum * melody_weights);
    }

    Ok(matrix)
}
