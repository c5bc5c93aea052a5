//! Runtime settings - playback rendering and logging.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Largest metrical division; the top header bit would select SMPTE timing.
pub const MAX_TICKS_PER_BEAT: u16 = 0x7FFF;

/// Slowest tempo whose beat length fits the 24-bit MIDI tempo field.
pub const MIN_BPM: u32 = 4;

/// How emitted (note, chord) pairs are rendered to MIDI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Ticks per quarter note in written MIDI files.
    /// Default: 480
    #[serde(default = "PlaybackConfig::default_ticks_per_beat")]
    pub ticks_per_beat: u16,

    /// Tempo; one timestep lasts one beat.
    /// Default: 60 (one step per second)
    #[serde(default = "PlaybackConfig::default_bpm")]
    pub bpm: u32,

    /// Note-on velocity (1-127).
    /// Default: 80
    #[serde(default = "PlaybackConfig::default_velocity")]
    pub velocity: u8,
}

impl PlaybackConfig {
    fn default_ticks_per_beat() -> u16 {
        480
    }

    fn default_bpm() -> u32 {
        60
    }

    fn default_velocity() -> u8 {
        80
    }

    /// Tempo expressed as microseconds per quarter note.
    pub fn microseconds_per_beat(&self) -> u32 {
        60_000_000 / self.bpm.max(1)
    }

    /// Check the ranges a Standard MIDI File can represent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_TICKS_PER_BEAT).contains(&self.ticks_per_beat) {
            return Err(ConfigError::Invalid {
                field: "ticks_per_beat",
                message: format!("{} is outside 1..={}", self.ticks_per_beat, MAX_TICKS_PER_BEAT),
            });
        }

        if self.bpm < MIN_BPM {
            return Err(ConfigError::Invalid {
                field: "bpm",
                message: format!("{} is below the minimum of {}", self.bpm, MIN_BPM),
            });
        }

        // Velocity 0 is a note-off
        if !(1..=127).contains(&self.velocity) {
            return Err(ConfigError::Invalid {
                field: "velocity",
                message: format!("{} is outside 1..=127", self.velocity),
            });
        }

        Ok(())
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            ticks_per_beat: Self::default_ticks_per_beat(),
            bpm: Self::default_bpm(),
            velocity: Self::default_velocity(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log filter directive (trace, debug, info, warn, error, or an EnvFilter string).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixty_bpm_is_one_second_per_beat() {
        assert_eq!(PlaybackConfig::default().microseconds_per_beat(), 1_000_000);
    }

    #[test]
    fn default_playback_is_valid() {
        assert!(PlaybackConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_bpm_is_rejected() {
        let config = PlaybackConfig {
            bpm: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "bpm", .. })
        ));
    }

    #[test]
    fn slowest_tempo_fits_the_tempo_field() {
        let config = PlaybackConfig {
            bpm: MIN_BPM,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.microseconds_per_beat() <= 0xFF_FFFF);

        let too_slow = PlaybackConfig {
            bpm: MIN_BPM - 1,
            ..Default::default()
        };
        assert!(too_slow.microseconds_per_beat() > 0xFF_FFFF);
        assert!(too_slow.validate().is_err());
    }

    #[test]
    fn ticks_and_velocity_ranges() {
        for ticks in [0, MAX_TICKS_PER_BEAT + 1, u16::MAX] {
            let config = PlaybackConfig {
                ticks_per_beat: ticks,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::Invalid { field: "ticks_per_beat", .. })
            ));
        }

        for velocity in [0, 128] {
            let config = PlaybackConfig {
                velocity,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::Invalid { field: "velocity", .. })
            ));
        }

        let edges = PlaybackConfig {
            ticks_per_beat: MAX_TICKS_PER_BEAT,
            bpm: 60,
            velocity: 127,
        };
        assert!(edges.validate().is_ok());
    }
}
