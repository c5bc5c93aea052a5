//! Categorical vocabularies: pitch classes, chords, melody classes, meter.
//!
//! All orderings are fixed and shared with serialized models, so indices
//! must never be reshuffled.

use serde::{Deserialize, Serialize};

/// Canonical chromatic order used by every table in the crate (A = 0).
pub const CHROMATIC_NOTES: [&str; 12] = [
    "A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#",
];

/// Number of octave slots per pitch class in the melody vocabulary.
pub const MELODY_OCTAVES: usize = 6;

/// Number of lifespan variants per (pitch, octave).
pub const LIFESPANS: usize = 2;

/// A pitch class, indexed in `CHROMATIC_NOTES` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PitchClass(u8);

impl PitchClass {
    pub const COUNT: usize = 12;

    pub fn new(index: u8) -> Option<Self> {
        (usize::from(index) < Self::COUNT).then_some(Self(index))
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Sharp spelling, e.g. "A#".
    pub fn name(self) -> &'static str {
        CHROMATIC_NOTES[self.index()]
    }

    /// Semitones above C (C = 0 ... B = 11), for MIDI and octave arithmetic.
    pub fn semitones_above_c(self) -> u8 {
        (self.0 + 9) % 12
    }

    pub fn from_semitones_above_c(semitones: u8) -> Self {
        Self((semitones % 12 + 3) % 12)
    }

    pub fn all() -> impl Iterator<Item = PitchClass> {
        (0..Self::COUNT as u8).map(PitchClass)
    }

    /// Parse a bare pitch name: letter plus optional `#`, `b`, or `-` (natural).
    ///
    /// Flats map onto their sharp equivalents ("Bb" -> A#).
    pub fn parse(name: &str) -> Option<Self> {
        let mut chars = name.chars();
        let base: u8 = match chars.next()? {
            'A' => 0,
            'B' => 2,
            'C' => 3,
            'D' => 5,
            'E' => 7,
            'F' => 8,
            'G' => 10,
            _ => return None,
        };
        let index = match (chars.next(), chars.next()) {
            (None, _) | (Some('-'), None) => base,
            (Some('#'), None) => (base + 1) % 12,
            (Some('b'), None) => (base + 11) % 12,
            _ => return None,
        };
        Some(Self(index))
    }
}

impl std::fmt::Display for PitchClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The seven chord qualities, in the order chords are laid out per root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordQuality {
    Major,
    Minor,
    Diminished,
    Major7,
    Minor7,
    Dominant7,
    HalfDiminished7,
}

impl ChordQuality {
    pub const ALL: [ChordQuality; 7] = [
        ChordQuality::Major,
        ChordQuality::Minor,
        ChordQuality::Diminished,
        ChordQuality::Major7,
        ChordQuality::Minor7,
        ChordQuality::Dominant7,
        ChordQuality::HalfDiminished7,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Suffix used in chord labels ("Amaj", "C#min7b5").
    pub fn suffix(self) -> &'static str {
        match self {
            ChordQuality::Major => "maj",
            ChordQuality::Minor => "min",
            ChordQuality::Diminished => "dim",
            ChordQuality::Major7 => "maj7",
            ChordQuality::Minor7 => "min7",
            ChordQuality::Dominant7 => "dom7",
            ChordQuality::HalfDiminished7 => "min7b5",
        }
    }

    /// Chord tones as semitone offsets from the root.
    pub fn intervals(self) -> &'static [u8] {
        match self {
            ChordQuality::Major => &[0, 4, 7],
            ChordQuality::Minor => &[0, 3, 7],
            ChordQuality::Diminished => &[0, 3, 6],
            ChordQuality::Major7 => &[0, 4, 7, 11],
            ChordQuality::Minor7 => &[0, 3, 7, 10],
            ChordQuality::Dominant7 => &[0, 4, 7, 10],
            ChordQuality::HalfDiminished7 => &[0, 3, 6, 10],
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.suffix() == suffix)
    }
}

/// One of the 84 chord classes: 12 roots x 7 qualities, root-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChordClass {
    pub root: PitchClass,
    pub quality: ChordQuality,
}

impl ChordClass {
    pub const COUNT: usize = PitchClass::COUNT * 7;

    pub fn new(root: PitchClass, quality: ChordQuality) -> Self {
        Self { root, quality }
    }

    pub fn index(self) -> usize {
        self.root.index() * ChordQuality::ALL.len() + self.quality.index()
    }

    /// Inverse of `index`; `None` for indices outside the chord space.
    pub fn from_index(index: usize) -> Option<Self> {
        if index >= Self::COUNT {
            return None;
        }
        let per_root = ChordQuality::ALL.len();
        Some(Self {
            root: PitchClass((index / per_root) as u8),
            quality: ChordQuality::ALL[index % per_root],
        })
    }

    pub fn all() -> impl Iterator<Item = ChordClass> {
        (0..Self::COUNT).filter_map(Self::from_index)
    }

    /// Root name + quality suffix, e.g. "Amaj", "G#min7b5".
    pub fn label(self) -> String {
        format!("{}{}", self.root.name(), self.quality.suffix())
    }

    pub fn parse(label: &str) -> Option<Self> {
        // Two-character roots first so "A#maj" isn't read as "A" + "#maj"
        for root_len in [2, 1] {
            if label.len() <= root_len || !label.is_char_boundary(root_len) {
                continue;
            }
            let (root, suffix) = label.split_at(root_len);
            if let (Some(root), Some(quality)) =
                (PitchClass::parse(root), ChordQuality::from_suffix(suffix))
            {
                return Some(Self { root, quality });
            }
        }
        None
    }
}

impl std::fmt::Display for ChordClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.root.name(), self.quality.suffix())
    }
}

/// Whether a melody note is freshly struck or held over from the previous step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifespan {
    Struck,
    Held,
}

/// One of the 145 melody output classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MelodyClass {
    Rest,
    Note {
        pitch: PitchClass,
        /// Octave slot 0..6 within the modeled range, not an absolute octave
        octave_slot: u8,
        lifespan: Lifespan,
    },
}

impl MelodyClass {
    pub const COUNT: usize = 1 + PitchClass::COUNT * MELODY_OCTAVES * LIFESPANS;

    pub fn index(self) -> usize {
        match self {
            MelodyClass::Rest => 0,
            MelodyClass::Note {
                pitch,
                octave_slot,
                lifespan,
            } => {
                1 + pitch.index() * MELODY_OCTAVES * LIFESPANS
                    + usize::from(octave_slot) * LIFESPANS
                    + lifespan as usize
            }
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        if index == 0 {
            return Some(MelodyClass::Rest);
        }
        if index >= Self::COUNT {
            return None;
        }
        let offset = index - 1;
        let per_pitch = MELODY_OCTAVES * LIFESPANS;
        Some(MelodyClass::Note {
            pitch: PitchClass((offset / per_pitch) as u8),
            octave_slot: ((offset % per_pitch) / LIFESPANS) as u8,
            lifespan: if offset % LIFESPANS == 0 {
                Lifespan::Struck
            } else {
                Lifespan::Held
            },
        })
    }

    pub fn all() -> impl Iterator<Item = MelodyClass> {
        (0..Self::COUNT).filter_map(Self::from_index)
    }

    /// Pitch class of a note class; `None` for rest.
    pub fn pitch(self) -> Option<PitchClass> {
        match self {
            MelodyClass::Rest => None,
            MelodyClass::Note { pitch, .. } => Some(pitch),
        }
    }

    /// "rest" or the bare pitch name; octave and lifespan are not part of the label.
    pub fn label(self) -> &'static str {
        match self {
            MelodyClass::Rest => "rest",
            MelodyClass::Note { pitch, .. } => pitch.name(),
        }
    }
}

/// Position within a bar on the 16th-note grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeterClass(u8);

impl MeterClass {
    pub const COUNT: usize = 16;

    /// Phases the recurrence actually cycles through.
    pub const DRIVEN_PHASES: usize = 2;

    pub fn new(position: u8) -> Option<Self> {
        (usize::from(position) < Self::COUNT).then_some(Self(position))
    }

    /// Two-phase meter used while driving a song: alternates 0, 1, 0, 1...
    pub fn for_timestep(timestep: usize) -> Self {
        Self((timestep % Self::DRIVEN_PHASES) as u8)
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// A recognized melody symbol from a song: pitch class plus octave.
///
/// Symbols look like "C4", "A#3", "Bb2", or "C-4" (explicit natural).
/// Anything else is treated as silence by the recurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MelodySymbol {
    pub pitch: PitchClass,
    pub octave: u8,
}

impl MelodySymbol {
    pub fn parse(symbol: &str) -> Option<Self> {
        let (name, octave) = split_octave(symbol)?;
        Some(Self {
            pitch: PitchClass::parse(name)?,
            octave,
        })
    }

    /// Playback label with sharp spelling, e.g. "C#4".
    pub fn label(self) -> String {
        format!("{}{}", self.pitch.name(), self.octave)
    }

    /// MIDI note number (C4 = 60), or `None` above G9.
    pub fn midi_pitch(self) -> Option<u8> {
        midi_note(self.pitch, self.octave)
    }
}

/// MIDI note number of a pitch class in an octave; `None` past note 127.
pub(crate) fn midi_note(pitch: PitchClass, octave: u8) -> Option<u8> {
    let note = (u16::from(octave) + 1) * 12 + u16::from(pitch.semitones_above_c());
    u8::try_from(note).ok().filter(|n| *n <= 127)
}

/// Split a trailing single octave digit off a note name.
pub(crate) fn split_octave(symbol: &str) -> Option<(&str, u8)> {
    let last = symbol.chars().last()?;
    let octave = last.to_digit(10)? as u8;
    Some((&symbol[..symbol.len() - 1], octave))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_sizes() {
        assert_eq!(MelodyClass::COUNT, 145);
        assert_eq!(ChordClass::COUNT, 84);
        assert_eq!(MeterClass::COUNT, 16);
        assert_eq!(MelodyClass::all().count(), 145);
        assert_eq!(ChordClass::all().count(), 84);
    }

    #[test]
    fn chord_order_is_root_major_starting_at_a() {
        let labels: Vec<_> = ChordClass::all().take(8).map(|c| c.label()).collect();
        assert_eq!(
            labels,
            ["Amaj", "Amin", "Adim", "Amaj7", "Amin7", "Adom7", "Amin7b5", "A#maj"]
        );
        assert_eq!(ChordClass::from_index(83).unwrap().label(), "G#min7b5");
        assert!(ChordClass::from_index(84).is_none());
    }

    #[test]
    fn chord_index_round_trips_through_label() {
        for chord in ChordClass::all() {
            let parsed = ChordClass::parse(&chord.label()).unwrap();
            assert_eq!(parsed, chord);
            assert_eq!(ChordClass::from_index(chord.index()), Some(chord));
        }
    }

    #[test]
    fn chord_parse_rejects_garbage() {
        assert!(ChordClass::parse("Hmaj").is_none());
        assert!(ChordClass::parse("Cmajor").is_none());
        assert!(ChordClass::parse("C").is_none());
        assert!(ChordClass::parse("").is_none());
    }

    #[test]
    fn melody_index_layout() {
        assert_eq!(MelodyClass::from_index(0), Some(MelodyClass::Rest));
        assert_eq!(
            MelodyClass::from_index(1),
            Some(MelodyClass::Note {
                pitch: PitchClass::parse("A").unwrap(),
                octave_slot: 0,
                lifespan: Lifespan::Struck,
            })
        );
        // 12 entries per pitch class: C is the fourth pitch class
        let c = MelodyClass::from_index(1 + 3 * 12).unwrap();
        assert_eq!(c.label(), "C");
        assert_eq!(MelodyClass::from_index(144).unwrap().label(), "G#");
        assert!(MelodyClass::from_index(145).is_none());

        for class in MelodyClass::all() {
            assert_eq!(MelodyClass::from_index(class.index()), Some(class));
        }
    }

    #[test]
    fn pitch_parse_handles_accidentals() {
        assert_eq!(PitchClass::parse("A").unwrap().index(), 0);
        assert_eq!(PitchClass::parse("A#").unwrap().name(), "A#");
        assert_eq!(PitchClass::parse("Bb").unwrap().name(), "A#");
        assert_eq!(PitchClass::parse("Ab").unwrap().name(), "G#");
        assert_eq!(PitchClass::parse("C-").unwrap().name(), "C");
        assert!(PitchClass::parse("H").is_none());
        assert!(PitchClass::parse("C##").is_none());
        assert!(PitchClass::parse("").is_none());
    }

    #[test]
    fn semitone_conversion() {
        let c = PitchClass::parse("C").unwrap();
        assert_eq!(c.semitones_above_c(), 0);
        assert_eq!(PitchClass::parse("A").unwrap().semitones_above_c(), 9);
        for pc in PitchClass::all() {
            assert_eq!(PitchClass::from_semitones_above_c(pc.semitones_above_c()), pc);
        }
    }

    #[test]
    fn pitches_above_g9_have_no_midi_note() {
        assert_eq!(MelodySymbol::parse("G9").unwrap().midi_pitch(), Some(127));
        for high in ["G#9", "A9", "B9"] {
            assert_eq!(MelodySymbol::parse(high).unwrap().midi_pitch(), None, "{}", high);
        }
        assert_eq!(MelodySymbol::parse("C0").unwrap().midi_pitch(), Some(12));
    }

    #[test]
    fn melody_symbol_parsing() {
        let c4 = MelodySymbol::parse("C4").unwrap();
        assert_eq!(c4.label(), "C4");
        assert_eq!(c4.midi_pitch(), Some(60));

        assert_eq!(MelodySymbol::parse("A#3").unwrap().label(), "A#3");
        assert_eq!(MelodySymbol::parse("Db5").unwrap().label(), "C#5");
        assert_eq!(MelodySymbol::parse("E-4").unwrap().label(), "E4");
        assert_eq!(MelodySymbol::parse("A4").unwrap().midi_pitch(), Some(69));

        for junk in ["", "R", "rest", "C", "C#", "X4", "C44x", "4"] {
            assert!(MelodySymbol::parse(junk).is_none(), "{:?} should not parse", junk);
        }
    }

    #[test]
    fn meter_alternates_two_phases() {
        let phases: Vec<_> = (0..5).map(|t| MeterClass::for_timestep(t).index()).collect();
        assert_eq!(phases, [0, 1, 0, 1, 0]);
        assert!(MeterClass::new(15).is_some());
        assert!(MeterClass::new(16).is_none());
    }
}
