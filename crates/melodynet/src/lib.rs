//! MelodyNet: a hybrid neural network that harmonizes a melody.
//!
//! A learnable feature layer feeds a chord layer whose chord path is pinned
//! by a frozen identity matrix, and a frozen chord-to-melody matrix maps
//! chord activations back onto melody classes. Driving the network over a
//! song threads a decaying probability state from one timestep to the next
//! and emits a chord per melody note.

pub mod chord_table;
pub mod error;
pub mod midi;
pub mod network;
pub mod playback;
pub mod recurrence;
pub mod source;
pub mod store;
pub mod train;
pub mod vocab;
pub mod weights;

pub use chord_table::ChordNoteTable;
pub use error::{ConfigurationError, Error, LoadError, Result, SourceError};
pub use midi::MidiSink;
pub use network::{FrozenParams, HybridNetwork, LearnableParams};
pub use playback::{LogSink, NullSink, PlaybackSink, RecordingSink};
pub use recurrence::{play_song, Emission, Recurrence, StateVector};
pub use source::{InMemorySongs, JsonSongLibrary, SongSource};
pub use store::{Device, ModelStore};
pub use train::{Sgd, TrainingExample};
pub use vocab::{
    ChordClass, ChordQuality, Lifespan, MelodyClass, MelodySymbol, MeterClass, PitchClass,
};
pub use weights::FixedWeights;

/// Width of the recurrent state partition: one entry per melody class.
pub const STATE_SIZE: usize = MelodyClass::COUNT;
/// Width of the chord partition.
pub const CHORD_SIZE: usize = ChordClass::COUNT;
/// Width of the meter partition.
pub const METER_SIZE: usize = MeterClass::COUNT;
/// Full input width: state, then chord, then meter.
pub const INPUT_SIZE: usize = STATE_SIZE + CHORD_SIZE + METER_SIZE;

pub const HIDDEN2_SIZE: usize = ChordClass::COUNT;
pub const OUTPUT_SIZE: usize = MelodyClass::COUNT;

pub const CHORD_OFFSET: usize = STATE_SIZE;
pub const METER_OFFSET: usize = STATE_SIZE + CHORD_SIZE;

/// Width of the per-note pitch one-hot the recurrence writes at the start of
/// the chord partition.
pub const PITCH_ENCODING_SIZE: usize = PitchClass::COUNT;
