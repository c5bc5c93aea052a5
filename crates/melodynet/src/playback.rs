use tracing::info;

use crate::recurrence::Emission;

/// Consumer of decoded timesteps. Rendering (audio, MIDI, logs) is up to the sink.
pub trait PlaybackSink {
    fn play(&mut self, emission: &Emission);
}

impl<S: PlaybackSink + ?Sized> PlaybackSink for &mut S {
    fn play(&mut self, emission: &Emission) {
        (**self).play(emission);
    }
}

impl<S: PlaybackSink + ?Sized> PlaybackSink for Box<S> {
    fn play(&mut self, emission: &Emission) {
        (**self).play(emission);
    }
}

/// Feed both sinks, in order.
impl<A: PlaybackSink, B: PlaybackSink> PlaybackSink for (A, B) {
    fn play(&mut self, emission: &Emission) {
        self.0.play(emission);
        self.1.play(emission);
    }
}

/// Keeps every emission; handy for tests and for post-processing a run.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub emissions: Vec<Emission>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chord labels in emission order, `None` where the prediction had no chord class.
    pub fn chord_labels(&self) -> Vec<Option<String>> {
        self.emissions
            .iter()
            .map(|e| e.chord.map(|c| c.label()))
            .collect()
    }
}

impl PlaybackSink for RecordingSink {
    fn play(&mut self, emission: &Emission) {
        self.emissions.push(emission.clone());
    }
}

/// Logs each timestep at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl PlaybackSink for LogSink {
    fn play(&mut self, emission: &Emission) {
        info!(timestep = emission.timestep, "{}", emission);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PlaybackSink for NullSink {
    fn play(&mut self, _emission: &Emission) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::ChordClass;

    fn emission(timestep: usize, chord: &str) -> Emission {
        Emission {
            timestep,
            melody: Some("C4".to_string()),
            chord: ChordClass::parse(chord),
            predicted_index: ChordClass::parse(chord).map_or(100, |c| c.index()),
        }
    }

    #[test]
    fn recording_sink_keeps_order() {
        let mut sink = RecordingSink::new();
        sink.play(&emission(0, "Cmaj"));
        sink.play(&emission(1, "none"));
        assert_eq!(
            sink.chord_labels(),
            vec![Some("Cmaj".to_string()), None]
        );
    }

    #[test]
    fn tuple_sink_feeds_both() {
        let mut left = RecordingSink::new();
        let mut right = RecordingSink::new();
        {
            let mut both = (&mut left, &mut right);
            both.play(&emission(0, "Dmin"));
        }
        assert_eq!(left.emissions.len(), 1);
        assert_eq!(right.emissions, left.emissions);
    }

    #[test]
    fn boxed_sinks_are_sinks() {
        let mut sinks: Vec<Box<dyn PlaybackSink>> = vec![Box::new(NullSink), Box::new(LogSink)];
        for sink in &mut sinks {
            sink.play(&emission(0, "Emin"));
        }
    }
}
