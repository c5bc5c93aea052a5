use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigurationError;
use crate::vocab::{midi_note, split_octave, ChordClass, PitchClass};

/// Octave the standard table voices chord roots in.
const ROOT_OCTAVE: u8 = 4;

/// Mapping from chord label ("Amaj", "C#min7") to its constituent note names.
///
/// Note names may carry a trailing octave digit ("C#4"); membership checks
/// compare pitch classes only.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChordNoteTable {
    chords: BTreeMap<String, Vec<String>>,
}

impl ChordNoteTable {
    /// Every chord class voiced upward from its root in octave 4.
    pub fn standard() -> Self {
        let chords = ChordClass::all()
            .map(|chord| {
                let root = chord.root.semitones_above_c();
                let notes = chord
                    .quality
                    .intervals()
                    .iter()
                    .map(|interval| {
                        let absolute = root + interval;
                        let pitch = PitchClass::from_semitones_above_c(absolute);
                        format!("{}{}", pitch.name(), ROOT_OCTAVE + absolute / 12)
                    })
                    .collect();
                (chord.label(), notes)
            })
            .collect();
        Self { chords }
    }

    pub fn insert(&mut self, label: impl Into<String>, notes: Vec<String>) {
        self.chords.insert(label.into(), notes);
    }

    pub fn remove(&mut self, label: &str) -> Option<Vec<String>> {
        self.chords.remove(label)
    }

    pub fn get(&self, label: &str) -> Option<&[String]> {
        self.chords.get(label).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.chords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chords.is_empty()
    }

    /// Note names of `chord`, or a configuration error if the table has no
    /// usable entry for it.
    pub fn notes(&self, chord: ChordClass) -> Result<&[String], ConfigurationError> {
        let label = chord.label();
        match self.chords.get(&label) {
            None => Err(ConfigurationError::MissingChord { chord: label }),
            Some(notes) if notes.is_empty() => Err(ConfigurationError::EmptyChord { chord: label }),
            Some(notes) => Ok(notes),
        }
    }

    /// Pitch classes of `chord`, as a 12-bit membership mask.
    pub fn pitch_mask(&self, chord: ChordClass) -> Result<u16, ConfigurationError> {
        let mut mask = 0u16;
        for note in self.notes(chord)? {
            let pitch = parse_note_name(note).ok_or_else(|| ConfigurationError::UnknownNote {
                chord: chord.label(),
                note: note.clone(),
            })?;
            mask |= 1 << pitch.index();
        }
        Ok(mask)
    }

    /// MIDI note numbers for a chord voicing. Names without an octave are
    /// placed in the root octave; notes above the MIDI range are left out.
    pub fn midi_pitches(&self, chord: ChordClass) -> Result<Vec<u8>, ConfigurationError> {
        let mut pitches = Vec::new();
        for note in self.notes(chord)? {
            let (pitch, octave) = match split_octave(note) {
                Some((name, octave)) => (PitchClass::parse(name), octave),
                None => (PitchClass::parse(note), ROOT_OCTAVE),
            };
            let pitch = pitch.ok_or_else(|| ConfigurationError::UnknownNote {
                chord: chord.label(),
                note: note.clone(),
            })?;
            match midi_note(pitch, octave) {
                Some(midi) => pitches.push(midi),
                None => warn!(chord = %chord, note = %note, "chord note above MIDI range"),
            }
        }
        Ok(pitches)
    }
}

/// Pitch class of a chord note name, with or without a trailing octave digit.
fn parse_note_name(note: &str) -> Option<PitchClass> {
    match split_octave(note) {
        Some((name, _)) => PitchClass::parse(name),
        None => PitchClass::parse(note),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chord(label: &str) -> ChordClass {
        ChordClass::parse(label).unwrap()
    }

    #[test]
    fn standard_table_covers_every_chord() {
        let table = ChordNoteTable::standard();
        assert_eq!(table.len(), ChordClass::COUNT);
        for c in ChordClass::all() {
            let notes = table.notes(c).unwrap();
            assert_eq!(notes.len(), c.quality.intervals().len());
        }
    }

    #[test]
    fn c_major_voicing() {
        let table = ChordNoteTable::standard();
        assert_eq!(table.get("Cmaj").unwrap(), ["C4", "E4", "G4"]);
    }

    #[test]
    fn octave_rolls_over_at_c() {
        let table = ChordNoteTable::standard();
        assert_eq!(table.get("Amaj").unwrap(), ["A4", "C#5", "E5"]);
        assert_eq!(table.get("Gdom7").unwrap(), ["G4", "B4", "D5", "F5"]);
        assert_eq!(table.get("Bmin7b5").unwrap(), ["B4", "D5", "F5", "A5"]);
    }

    #[test]
    fn pitch_mask_ignores_octaves() {
        let table = ChordNoteTable::standard();
        let mask = table.pitch_mask(chord("Cmaj")).unwrap();
        let expected = ["C", "E", "G"]
            .iter()
            .map(|n| 1u16 << PitchClass::parse(n).unwrap().index())
            .fold(0, |acc, bit| acc | bit);
        assert_eq!(mask, expected);
    }

    #[test]
    fn bare_names_without_octave_are_accepted() {
        let mut table = ChordNoteTable::standard();
        table.insert("Cmaj", vec!["C".into(), "E".into(), "G".into()]);
        let standard = ChordNoteTable::standard();
        assert_eq!(
            table.pitch_mask(chord("Cmaj")).unwrap(),
            standard.pitch_mask(chord("Cmaj")).unwrap()
        );
        assert_eq!(table.midi_pitches(chord("Cmaj")).unwrap(), vec![60, 64, 67]);
    }

    #[test]
    fn missing_and_empty_entries_are_errors() {
        let mut table = ChordNoteTable::standard();
        table.remove("Dmin");
        assert!(matches!(
            table.notes(chord("Dmin")),
            Err(ConfigurationError::MissingChord { chord }) if chord == "Dmin"
        ));

        table.insert("Emin", vec![]);
        assert!(matches!(
            table.notes(chord("Emin")),
            Err(ConfigurationError::EmptyChord { .. })
        ));
    }

    #[test]
    fn unknown_note_name_is_an_error() {
        let mut table = ChordNoteTable::standard();
        table.insert("Fmaj", vec!["F4".into(), "X4".into()]);
        assert!(matches!(
            table.pitch_mask(chord("Fmaj")),
            Err(ConfigurationError::UnknownNote { note, .. }) if note == "X4"
        ));
    }

    #[test]
    fn voicing_drops_notes_above_midi_range() {
        let mut table = ChordNoteTable::standard();
        table.insert("Gmaj", vec!["G9".into(), "B9".into(), "D9".into()]);
        assert_eq!(table.midi_pitches(chord("Gmaj")).unwrap(), vec![127, 122]);
    }

    #[test]
    fn midi_voicing_of_a_major() {
        let table = ChordNoteTable::standard();
        assert_eq!(table.midi_pitches(chord("Amaj")).unwrap(), vec![69, 73, 76]);
    }

    #[test]
    fn table_deserializes_from_plain_json_object() {
        let json = r#"{"Cmaj": ["C4", "E4", "G4"]}"#;
        let table: ChordNoteTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("Cmaj").unwrap(), ["C4", "E4", "G4"]);
    }
}
