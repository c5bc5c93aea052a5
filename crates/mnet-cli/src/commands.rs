//! CLI command implementations

use std::path::Path;

use anyhow::{bail, Context, Result};
use melodyconf::MelodyConfig;
use melodynet::{
    play_song, ChordClass, ChordNoteTable, Device, HybridNetwork, JsonSongLibrary, LogSink,
    MelodyClass, MidiSink, ModelStore, SongSource, CHORD_SIZE, INPUT_SIZE, METER_SIZE,
    OUTPUT_SIZE, STATE_SIZE,
};
use tracing::info;

/// Layered configuration; an explicit `--config` path must exist
pub fn load_config(path: Option<&Path>) -> Result<MelodyConfig> {
    if let Some(path) = path {
        if !path.exists() {
            bail!("Config file {} does not exist", path.display());
        }
    }
    MelodyConfig::load_from(path).context("loading configuration")
}

/// Built-in table unless a JSON chord table is given
fn load_table(path: Option<&Path>) -> Result<ChordNoteTable> {
    let Some(path) = path else {
        return Ok(ChordNoteTable::standard());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading chord table {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("parsing chord table {}", path.display()))
}

/// Build a fresh network from config and save it
pub fn init(
    config: &MelodyConfig,
    out: &Path,
    seed: Option<u64>,
    chords: Option<&Path>,
) -> Result<()> {
    let mut model = config.model.clone();
    if let Some(seed) = seed {
        model.seed = seed;
    }
    let table = load_table(chords)?;
    let network = HybridNetwork::new(&model, &table).context("building network")?;
    ModelStore::save(&network, out)?;
    println!(
        "Saved {} (hidden1 = {}, seed = {}) to {}",
        model.model_name,
        model.hidden1_size,
        model.seed,
        out.display()
    );
    Ok(())
}

pub struct PlayArgs<'a> {
    pub model: &'a Path,
    pub songs: &'a Path,
    pub song: usize,
    pub midi: Option<&'a Path>,
    pub device: &'a str,
    pub decay: Option<f32>,
    pub chords: Option<&'a Path>,
}

/// Harmonize one song, logging each step and optionally writing MIDI
pub fn play(config: &MelodyConfig, args: PlayArgs<'_>) -> Result<()> {
    let device: Device = args.device.parse()?;
    let network = ModelStore::load(args.model, device)
        .with_context(|| format!("loading model {}", args.model.display()))?;
    let library = JsonSongLibrary::open(args.songs)?;
    let decay = args
        .decay
        .unwrap_or(network.config().state_units_decay as f32);

    info!(
        songs = library.song_count(),
        song = args.song,
        decay,
        "playing"
    );

    let steps = match args.midi {
        Some(path) => {
            let midi = MidiSink::new(load_table(args.chords)?, &config.playback)?;
            let mut sinks = (LogSink, midi);
            let steps = play_song(&network, &library, args.song, decay, &mut sinks)?;
            sinks.1.write_to(path)?;
            println!("Wrote {}", path.display());
            steps
        }
        None => play_song(&network, &library, args.song, decay, &mut LogSink)?,
    };

    println!("Played {} steps of song {}", steps, args.song);
    Ok(())
}

/// Print model dimensions, or the melody classes a chord feeds
pub fn inspect(config: &MelodyConfig, model: Option<&Path>, chord: Option<&str>) -> Result<()> {
    let network = match model {
        Some(path) => ModelStore::load(path, Device::Cpu)
            .with_context(|| format!("loading model {}", path.display()))?,
        None => HybridNetwork::new(&config.model, &ChordNoteTable::standard())?,
    };

    match chord {
        Some(label) => print!("{}", describe_chord(&network, label)?),
        None => print!("{}", describe_model(&network)),
    }
    Ok(())
}

fn describe_model(network: &HybridNetwork) -> String {
    let params = network.learnable();
    let learnable = params.hidden1_weight.len()
        + params.hidden1_bias.len()
        + params.hidden2_weight.len()
        + params.hidden2_bias.len()
        + params.chord_cross.len();
    let frozen = network.frozen().chord_identity().len() + network.frozen().chord_to_melody().len();

    let mut out = String::new();
    out.push_str(&format!("model:    {}\n", network.config().model_name));
    out.push_str(&format!(
        "input:    {} (state {} + chord {} + meter {})\n",
        INPUT_SIZE, STATE_SIZE, CHORD_SIZE, METER_SIZE
    ));
    out.push_str(&format!("hidden1:  {}\n", network.hidden1_size()));
    out.push_str(&format!("hidden2:  {}\n", CHORD_SIZE));
    out.push_str(&format!("output:   {}\n", OUTPUT_SIZE));
    out.push_str(&format!("learnable parameters: {}\n", learnable));
    out.push_str(&format!("frozen parameters:    {}\n", frozen));
    out.push_str(&format!(
        "decay: {}  chord_weights: {}  melody_weights: {}\n",
        network.config().state_units_decay,
        network.config().chord_weights,
        network.config().melody_weights
    ));
    out
}

fn describe_chord(network: &HybridNetwork, label: &str) -> Result<String> {
    let Some(chord) = ChordClass::parse(label) else {
        bail!("Unknown chord '{}' (expected e.g. Cmaj, F#min7, Bmin7b5)", label);
    };
    let column = network.frozen().chord_to_melody().column(chord.index());

    // Every octave and lifespan of a pitch shares one weight; report each pitch once
    let mut out = format!("{} (chord index {})\n", chord, chord.index());
    let mut seen = Vec::new();
    for class in MelodyClass::all() {
        let weight = column[class.index()];
        if weight <= 0.0 || seen.contains(&class.label()) {
            continue;
        }
        seen.push(class.label());
        out.push_str(&format!("  {:<5} {:.4}\n", class.label(), weight));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> MelodyConfig {
        let mut config = MelodyConfig::default();
        config.model.hidden1_size = 8;
        config
    }

    #[test]
    fn init_then_play_writes_midi() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("hnn.json");
        let songs = dir.path().join("songs.json");
        let midi = dir.path().join("out.mid");
        std::fs::write(&songs, r#"[["C4", "E4", "G4"]]"#).unwrap();

        let config = small_config();
        init(&config, &model, Some(3), None).unwrap();
        play(
            &config,
            PlayArgs {
                model: &model,
                songs: &songs,
                song: 0,
                midi: Some(&midi),
                device: "cpu",
                decay: None,
                chords: None,
            },
        )
        .unwrap();

        let bytes = std::fs::read(&midi).unwrap();
        assert_eq!(&bytes[..4], b"MThd");
    }

    #[test]
    fn play_rejects_unknown_device() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("hnn.json");
        let songs = dir.path().join("songs.json");
        std::fs::write(&songs, "[[]]").unwrap();
        init(&small_config(), &model, None, None).unwrap();

        let err = play(
            &small_config(),
            PlayArgs {
                model: &model,
                songs: &songs,
                song: 0,
                midi: None,
                device: "cuda",
                decay: None,
                chords: None,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("cuda"));
    }

    #[test]
    fn chord_description_lists_tones_and_rest() {
        let network = HybridNetwork::new(&small_config().model, &ChordNoteTable::standard()).unwrap();
        let text = describe_chord(&network, "Cmaj").unwrap();
        for name in ["rest", "C ", "E ", "G "] {
            assert!(text.contains(name), "{:?} missing from\n{}", name, text);
        }
        assert_eq!(text.lines().count(), 5);
        assert!(describe_chord(&network, "Hmaj").is_err());
    }

    #[test]
    fn model_description_reports_sizes() {
        let network = HybridNetwork::new(&small_config().model, &ChordNoteTable::standard()).unwrap();
        let text = describe_model(&network);
        assert!(text.contains("input:    245 (state 145 + chord 84 + meter 16)"));
        assert!(text.contains("hidden1:  8"));
    }

    #[test]
    fn explicit_config_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load_config(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("nope.toml"), "{}", err);

        let present = dir.path().join("melodynet.toml");
        std::fs::write(&present, "[playback]\nvelocity = 90\n").unwrap();
        assert_eq!(load_config(Some(&present)).unwrap().playback.velocity, 90);
    }

    #[test]
    fn custom_chord_table_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chords.json");
        std::fs::write(&path, r#"{"Cmaj": ["C4", "E4", "G4"]}"#).unwrap();
        let table = load_table(Some(&path)).unwrap();
        assert_eq!(table.len(), 1);
        assert!(load_table(Some(&dir.path().join("missing.json"))).is_err());
    }
}
