//! Where songs come from: ordered lists of melody symbols, one per timestep.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SourceError;

/// A collection of songs addressable by index.
pub trait SongSource {
    fn song_count(&self) -> usize;

    /// Symbols of song `index`, in playback order.
    fn song(&self, index: usize) -> Result<Vec<String>, SourceError>;
}

/// Songs held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InMemorySongs {
    songs: Vec<Vec<String>>,
}

impl InMemorySongs {
    pub fn new(songs: Vec<Vec<String>>) -> Self {
        Self { songs }
    }

    pub fn push(&mut self, song: Vec<String>) {
        self.songs.push(song);
    }
}

impl SongSource for InMemorySongs {
    fn song_count(&self) -> usize {
        self.songs.len()
    }

    fn song(&self, index: usize) -> Result<Vec<String>, SourceError> {
        self.songs
            .get(index)
            .cloned()
            .ok_or(SourceError::NoSuchSong {
                index,
                count: self.songs.len(),
            })
    }
}

/// A JSON file holding either a bare array of songs or `{"songs": [...]}`.
#[derive(Debug, Clone)]
pub struct JsonSongLibrary {
    path: PathBuf,
    songs: InMemorySongs,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LibraryFile {
    Bare(Vec<Vec<String>>),
    Wrapped { songs: Vec<Vec<String>> },
}

impl JsonSongLibrary {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let contents = std::fs::read_to_string(&path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        let file: LibraryFile =
            serde_json::from_str(&contents).map_err(|e| SourceError::Parse {
                path: path.clone(),
                message: e.to_string(),
            })?;
        let songs = match file {
            LibraryFile::Bare(songs) | LibraryFile::Wrapped { songs } => songs,
        };
        debug!(path = %path.display(), songs = songs.len(), "opened song library");
        Ok(Self {
            path,
            songs: InMemorySongs::new(songs),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SongSource for JsonSongLibrary {
    fn song_count(&self) -> usize {
        self.songs.song_count()
    }

    fn song(&self, index: usize) -> Result<Vec<String>, SourceError> {
        self.songs.song(index)
    }
}
