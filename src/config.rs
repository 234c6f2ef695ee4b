//! Startup configuration, read from a RON file.
//!
//! Every field is optional, so an empty `()` is a valid config. For example:
//!
//! ```text
//! (
//!     bpm: 128,
//!     frame_rate: 60,
//!     export: (velocity: 110, track_name: "Beat"),
//! )
//! ```

use crate::{
    error::{Error, Result},
    events::ExportOptions,
    tempo::Bpm,
};
use serde::Deserialize;
use std::{fs, path::Path};

/// How often the command host polls the clock when it advances time, if not configured
pub const DEFAULT_FRAME_RATE: u32 = 120;

/// Settings for a `Session`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Starting tempo, clamped into range
    pub bpm: Bpm,
    /// Polls per second while advancing time
    pub frame_rate: u32,
    /// Settings for MIDI export
    pub export: ExportOptions,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bpm: Bpm::default(),
            frame_rate: DEFAULT_FRAME_RATE,
            export: ExportOptions::default(),
        }
    }
}

impl Config {
    /// Parse a config from RON text
    pub fn from_ron(text: &str) -> Result<Self> {
        let mut config: Config = ron::from_str(text).map_err(|e| Error::Config(e.to_string()))?;

        config.frame_rate = config.frame_rate.max(1);
        config
            .export
            .validate()
            .map_err(|e| Error::Config(format!("export: {}", e)))?;

        Ok(config)
    }

    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_ron(&text)?;

        tracing::debug!(path = %path.display(), ?config, "loaded config");

        Ok(config)
    }

    /// The time between polls, in seconds
    pub fn frame_duration(&self) -> f64 {
        1. / self.frame_rate.max(1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_default() {
        assert_eq!(Config::from_ron("()").unwrap(), Config::default());
    }

    #[test]
    fn partial_config() {
        let config =
            Config::from_ron("(bpm: 500, export: (velocity: 110, track_name: \"Beat\"))").unwrap();

        assert_eq!(config.bpm.get(), 300);
        assert_eq!(config.frame_rate, DEFAULT_FRAME_RATE);
        assert_eq!(config.export.velocity, 110);
        assert_eq!(config.export.track_name, "Beat");
        assert_eq!(config.export.resolution, 96);
    }

    #[test]
    fn zero_frame_rate_is_bumped() {
        let config = Config::from_ron("(frame_rate: 0)").unwrap();

        assert_eq!(config.frame_rate, 1);
        assert_eq!(config.frame_duration(), 1.);
    }

    #[test]
    fn bad_config() {
        assert!(matches!(
            Config::from_ron("(bpm: \"fast\")"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::load(Path::new("/definitely/not/here.ron")),
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn bad_export_options() {
        for text in &[
            "(export: (velocity: 200))",
            "(export: (velocity: 128))",
            "(export: (resolution: 2))",
            "(export: (resolution: 0))",
            "(export: (resolution: 100))",
        ] {
            assert!(
                matches!(Config::from_ron(text), Err(Error::Config(_))),
                "{}",
                text
            );
        }

        assert_eq!(
            Config::from_ron("(export: (resolution: 480, velocity: 127))")
                .unwrap()
                .export
                .resolution,
            480
        );
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ron");

        fs::write(&path, "(frame_rate: 30)").unwrap();

        assert_eq!(Config::load(&path).unwrap().frame_rate, 30);
    }
}
