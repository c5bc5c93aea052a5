//! Whole-pipeline tests: build, train, save, load, and play a song.

use melodyconf::{ModelConfig, PlaybackConfig};
use melodynet::{
    play_song, ChordClass, ChordNoteTable, Device, HybridNetwork, InMemorySongs, JsonSongLibrary,
    MelodyClass, MidiSink, ModelStore, PlaybackSink, Recurrence, RecordingSink, Sgd, SongSource,
    StateVector, TrainingExample,
};
use midly::{MidiMessage, Smf, TrackEventKind};
use pretty_assertions::assert_eq;

fn config() -> ModelConfig {
    ModelConfig {
        hidden1_size: 12,
        seed: 99,
        ..Default::default()
    }
}

fn twinkle() -> Vec<String> {
    ["C4", "C4", "G4", "G4", "A4", "A4", "G4", "rest", "F4", "F4", "E4", "E4"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[test]
fn loaded_model_plays_like_the_saved_one() {
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("hnn.json");

    let net = HybridNetwork::new(&config(), &ChordNoteTable::standard()).unwrap();
    ModelStore::save(&net, &model_path).unwrap();
    let loaded = ModelStore::load(&model_path, "cpu".parse::<Device>().unwrap()).unwrap();

    let songs = InMemorySongs::new(vec![twinkle()]);
    let mut before = RecordingSink::new();
    let mut after = RecordingSink::new();
    play_song(&net, &songs, 0, 0.5, &mut before).unwrap();
    play_song(&loaded, &songs, 0, 0.5, &mut after).unwrap();

    assert_eq!(before.emissions.len(), 12);
    assert_eq!(before.emissions, after.emissions);
}

#[test]
fn library_song_renders_to_midi() {
    let dir = tempfile::tempdir().unwrap();
    let library_path = dir.path().join("songs.json");
    let midi_path = dir.path().join("out.mid");
    std::fs::write(
        &library_path,
        serde_json::to_string(&vec![vec!["E4", "D4"], twinkle().iter().map(String::as_str).collect()])
            .unwrap(),
    )
    .unwrap();

    let library = JsonSongLibrary::open(&library_path).unwrap();
    assert_eq!(library.song_count(), 2);

    let net = HybridNetwork::new(&config(), &ChordNoteTable::standard()).unwrap();
    let mut recording = RecordingSink::new();
    let mut midi =
        MidiSink::new(ChordNoteTable::standard(), &PlaybackConfig::default()).unwrap();
    {
        let mut both = (&mut recording, &mut midi);
        play_song(&net, &library, 1, 0.5, &mut both).unwrap();
    }
    midi.write_to(&midi_path).unwrap();

    let bytes = std::fs::read(&midi_path).unwrap();
    let smf = Smf::parse(&bytes).unwrap();
    let melody_notes = smf.tracks[1]
        .iter()
        .filter(|e| {
            matches!(
                e.kind,
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { vel, .. },
                    ..
                } if vel.as_int() > 0
            )
        })
        .count();
    // "rest" is not a note
    assert_eq!(melody_notes, 11);
    assert_eq!(recording.emissions.len(), 12);
    assert_eq!(recording.emissions[7].melody, None);
}

#[test]
fn stepping_by_hand_matches_play_song() {
    let net = HybridNetwork::new(&config(), &ChordNoteTable::standard()).unwrap();
    let songs = InMemorySongs::new(vec![twinkle()]);

    let mut whole = RecordingSink::new();
    play_song(&net, &songs, 0, 0.25, &mut whole).unwrap();

    let mut recurrence = Recurrence::with_decay(&net, 0.25).unwrap();
    let mut stepped = RecordingSink::new();
    for symbol in twinkle().iter().take(5) {
        let emission = recurrence.step(symbol).unwrap();
        stepped.play(&emission);
    }
    assert_eq!(&whole.emissions[..5], &stepped.emissions[..]);
}

#[test]
fn training_survives_a_save_and_keeps_fixed_weights() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trained.json");

    let mut net = HybridNetwork::new(&config(), &ChordNoteTable::standard()).unwrap();
    let fixed_before = net.frozen().clone();
    let target = MelodyClass::all().find(|c| c.label() == "G").unwrap();
    let examples: Vec<TrainingExample> = ["C4", "E4", "G4"]
        .iter()
        .enumerate()
        .map(|(t, s)| TrainingExample::at_timestep(&StateVector::zeros(), s, t, target))
        .collect();

    let sgd = Sgd::from_config(net.config());
    let first = sgd.step(&mut net, &examples).unwrap();
    for _ in 0..10 {
        sgd.step(&mut net, &examples).unwrap();
    }
    let last = sgd.step(&mut net, &examples).unwrap();
    assert!(last < first, "{} !< {}", last, first);
    assert_eq!(net.frozen(), &fixed_before);

    ModelStore::save(&net, &path).unwrap();
    let loaded = ModelStore::load(&path, Device::Cpu).unwrap();
    assert_eq!(loaded.learnable(), net.learnable());
}

#[test]
fn chord_labels_name_real_chords() {
    let net = HybridNetwork::new(&config(), &ChordNoteTable::standard()).unwrap();
    let mut sink = RecordingSink::new();
    Recurrence::new(&net).run(twinkle(), &mut sink).unwrap();
    for emission in &sink.emissions {
        match emission.chord {
            Some(chord) => {
                assert_eq!(chord.index(), emission.predicted_index);
                assert!(ChordClass::parse(&chord.label()).is_some());
            }
            None => assert!(emission.predicted_index >= ChordClass::COUNT),
        }
    }
}
