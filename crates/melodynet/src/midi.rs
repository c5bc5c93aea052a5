//! Standard MIDI File rendering of a played song.
//!
//! Track 0 carries tempo and a 4/4 time signature. Track 1 is the melody on
//! channel 0, track 2 the block chords on channel 1. Every timestep lasts one
//! beat; each note it starts is released at the end of that beat.

use std::path::Path;

use melodyconf::PlaybackConfig;
use tracing::{debug, warn};

use crate::chord_table::ChordNoteTable;
use crate::error::{Error, Result};
use crate::playback::PlaybackSink;
use crate::recurrence::Emission;
use crate::vocab::MelodySymbol;

const MELODY_CHANNEL: u8 = 0;
const CHORD_CHANNEL: u8 = 1;
/// GM program for the chord track (0 = acoustic grand).
const CHORD_PROGRAM: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimedNote {
    onset_tick: u64,
    offset_tick: u64,
    pitch: u8,
}

/// Collects emissions and renders them as SMF format 1 bytes.
#[derive(Debug, Clone)]
pub struct MidiSink {
    table: ChordNoteTable,
    config: PlaybackConfig,
    melody: Vec<TimedNote>,
    chords: Vec<TimedNote>,
    steps: u64,
}

impl MidiSink {
    /// Fails when `config` holds values a MIDI file cannot carry.
    pub fn new(table: ChordNoteTable, config: &PlaybackConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            table,
            config: config.clone(),
            melody: Vec::new(),
            chords: Vec::new(),
            steps: 0,
        })
    }

    /// Timesteps received so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Render everything played so far.
    pub fn finish(&self) -> Vec<u8> {
        let tracks = [
            self.tempo_track(),
            self.note_track("Melody", &self.melody, MELODY_CHANNEL, None),
            self.note_track("Chords", &self.chords, CHORD_CHANNEL, Some(CHORD_PROGRAM)),
        ];
        build_midi_file(self.config.ticks_per_beat, &tracks)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.finish();
        std::fs::write(path, &bytes).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), steps = self.steps, "wrote midi");
        Ok(())
    }

    fn tempo_track(&self) -> Vec<u8> {
        let usec = self.config.microseconds_per_beat();
        let mut track_data = Vec::new();

        write_vlq(&mut track_data, 0);
        track_data.extend_from_slice(&[
            0xFF,
            0x51,
            0x03,
            (usec >> 16) as u8,
            (usec >> 8) as u8,
            usec as u8,
        ]);
        write_vlq(&mut track_data, 0);
        track_data.extend_from_slice(&[0xFF, 0x58, 0x04, 4, 2, 0x18, 0x08]);

        end_track(&mut track_data);
        track_data
    }

    fn note_track(
        &self,
        name: &str,
        notes: &[TimedNote],
        channel: u8,
        program: Option<u8>,
    ) -> Vec<u8> {
        let mut events: Vec<(u64, Vec<u8>)> = Vec::new();

        let mut name_event = vec![0xFF, 0x03];
        write_vlq(&mut name_event, name.len() as u32);
        name_event.extend_from_slice(name.as_bytes());
        events.push((0, name_event));

        if let Some(program) = program {
            events.push((0, vec![0xC0 | (channel & 0x0F), program]));
        }

        for note in notes {
            events.push((
                note.onset_tick,
                vec![0x90 | (channel & 0x0F), note.pitch, self.config.velocity],
            ));
            events.push((note.offset_tick, vec![0x80 | (channel & 0x0F), note.pitch, 0]));
        }

        // Stable sort keeps the name and program first; note-offs precede note-ons
        events.sort_by(|a, b| {
            a.0.cmp(&b.0).then_with(|| {
                let a_is_off = a.1.first().is_some_and(|s| s & 0xF0 == 0x80);
                let b_is_off = b.1.first().is_some_and(|s| s & 0xF0 == 0x80);
                b_is_off.cmp(&a_is_off)
            })
        });

        let mut track_data = Vec::new();
        let mut last_tick = 0u64;
        for (tick, data) in events {
            let delta = tick.saturating_sub(last_tick);
            write_vlq(&mut track_data, delta as u32);
            track_data.extend_from_slice(&data);
            last_tick = tick;
        }

        end_track(&mut track_data);
        track_data
    }
}

impl PlaybackSink for MidiSink {
    fn play(&mut self, emission: &Emission) {
        let ticks = u64::from(self.config.ticks_per_beat);
        let onset_tick = self.steps * ticks;
        let offset_tick = onset_tick + ticks;

        if let Some(symbol) = emission.melody.as_deref().and_then(MelodySymbol::parse) {
            match symbol.midi_pitch() {
                Some(pitch) => self.melody.push(TimedNote {
                    onset_tick,
                    offset_tick,
                    pitch,
                }),
                None => warn!(
                    timestep = emission.timestep,
                    note = %symbol.label(),
                    "melody note above MIDI range"
                ),
            }
        }

        if let Some(chord) = emission.chord {
            match self.table.midi_pitches(chord) {
                Ok(pitches) => self.chords.extend(pitches.into_iter().map(|pitch| TimedNote {
                    onset_tick,
                    offset_tick,
                    pitch,
                })),
                Err(e) => warn!(timestep = emission.timestep, "chord not voiced: {}", e),
            }
        }

        self.steps += 1;
    }
}

fn end_track(track_data: &mut Vec<u8>) {
    write_vlq(track_data, 0);
    track_data.extend_from_slice(&[0xFF, 0x2F, 0x00]);
}

/// Assemble a complete MIDI file from track data blobs.
fn build_midi_file(ppq: u16, tracks: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();

    buf.extend_from_slice(b"MThd");
    buf.extend_from_slice(&6u32.to_be_bytes());
    buf.extend_from_slice(&1u16.to_be_bytes()); // format 1
    buf.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    buf.extend_from_slice(&ppq.to_be_bytes());

    for track_data in tracks {
        buf.extend_from_slice(b"MTrk");
        buf.extend_from_slice(&(track_data.len() as u32).to_be_bytes());
        buf.extend_from_slice(track_data);
    }

    buf
}

/// Write a variable-length quantity.
fn write_vlq(buf: &mut Vec<u8>, mut value: u32) {
    let mut bytes = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        bytes.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    bytes.reverse();
    buf.extend_from_slice(&bytes);
}
