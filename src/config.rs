// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use duration_string::DurationString;
use serde::Deserialize;
use tracing::debug;

use crate::samples::DEFAULT_VOLUME_DB;

pub mod error;

pub use self::error::ConfigError;

/// Prefix of the environment variables that override settings.
pub const ENV_PREFIX: &str = "BEATGRID";

const DEFAULT_SAMPLES_DIR: &str = "samples";
const DEFAULT_SAMPLE_LOAD_TIMEOUT: &str = "15s";
const DEFAULT_LOOKAHEAD: &str = "50ms";
const DEFAULT_SESSION_FILE: &str = ".beatgrid-session.json";

/// Settings for beatgrid, layered from an optional YAML file and BEATGRID_*
/// environment variables (the environment wins).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Settings {
    /// The base URL of the hosted backend.
    backend_url: Option<String>,
    /// The public API key of the hosted backend.
    api_key: Option<String>,
    /// The directory holding `<sound>.wav` samples.
    samples_dir: Option<String>,
    /// How long a single sample may take to load.
    sample_load_timeout: Option<String>,
    /// How far ahead of the audio clock the tick thread runs.
    lookahead: Option<String>,
    /// The level, in dB, every track plays at.
    volume: Option<f32>,
    /// Per-track levels in dB, keyed by sound name. These win over `volume`.
    track_volumes: Option<HashMap<String, f32>>,
    /// The output device. Unset means the system default.
    audio_device: Option<String>,
    /// Where the signed in session is kept between runs.
    session_file: Option<String>,
    /// Where password reset emails send the user back to.
    redirect_url: Option<String>,
}

/// Treats blank values the same as missing ones.
fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    DurationString::from_string(value.to_string())
        .map(Duration::from)
        .map_err(|e| ConfigError::Duration {
            field,
            message: e.to_string(),
        })
}

impl Settings {
    /// Loads settings from the given YAML file (if any) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!(path = ?path, "Loading settings file");
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }
        Ok(builder
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize::<Settings>()?)
    }

    /// Parses settings from a YAML string. Does not consult the environment.
    pub fn from_yaml(yaml: &str) -> Result<Settings, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Settings>()?)
    }

    pub fn backend_url(&self) -> Option<&str> {
        non_empty(&self.backend_url)
    }

    pub fn api_key(&self) -> Option<&str> {
        non_empty(&self.api_key)
    }

    pub fn samples_dir(&self) -> PathBuf {
        PathBuf::from(non_empty(&self.samples_dir).unwrap_or(DEFAULT_SAMPLES_DIR))
    }

    pub fn sample_load_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration(
            "sample_load_timeout",
            non_empty(&self.sample_load_timeout).unwrap_or(DEFAULT_SAMPLE_LOAD_TIMEOUT),
        )
    }

    pub fn lookahead(&self) -> Result<Duration, ConfigError> {
        parse_duration(
            "lookahead",
            non_empty(&self.lookahead).unwrap_or(DEFAULT_LOOKAHEAD),
        )
    }

    /// The level in dB the track with the given sound plays at.
    pub fn track_volume(&self, sound: &str) -> f32 {
        self.track_volumes
            .as_ref()
            .and_then(|volumes| volumes.get(sound))
            .or(self.volume.as_ref())
            .copied()
            .unwrap_or(DEFAULT_VOLUME_DB)
    }

    pub fn audio_device(&self) -> Option<&str> {
        non_empty(&self.audio_device)
    }

    pub fn session_file(&self) -> PathBuf {
        PathBuf::from(non_empty(&self.session_file).unwrap_or(DEFAULT_SESSION_FILE))
    }

    pub fn redirect_url(&self) -> Option<&str> {
        non_empty(&self.redirect_url)
    }

    /// Overrides the output device.
    pub fn set_audio_device(&mut self, device: Option<String>) {
        if device.is_some() {
            self.audio_device = device;
        }
    }

    /// Overrides the samples directory.
    pub fn set_samples_dir(&mut self, dir: Option<String>) {
        if dir.is_some() {
            self.samples_dir = dir;
        }
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use serial_test::serial;

    use super::*;

    #[test]
    fn test_defaults() -> Result<(), Box<dyn Error>> {
        let settings = Settings::from_yaml("{}")?;
        assert_eq!(None, settings.backend_url());
        assert_eq!(None, settings.api_key());
        assert_eq!(PathBuf::from("samples"), settings.samples_dir());
        assert_eq!(Duration::from_secs(15), settings.sample_load_timeout()?);
        assert_eq!(Duration::from_millis(50), settings.lookahead()?);
        assert_eq!(-5.0, settings.track_volume("kick"));
        assert_eq!(None, settings.audio_device());
        assert_eq!(PathBuf::from(".beatgrid-session.json"), settings.session_file());
        Ok(())
    }

    #[test]
    fn test_yaml() -> Result<(), Box<dyn Error>> {
        let settings = Settings::from_yaml(
            r#"
            backend_url: https://example.supabase.co
            api_key: public-anon-key
            samples_dir: /opt/drums
            sample_load_timeout: 2s
            lookahead: 20ms
            audio_device: mock-output
            "#,
        )?;
        assert_eq!(Some("https://example.supabase.co"), settings.backend_url());
        assert_eq!(Some("public-anon-key"), settings.api_key());
        assert_eq!(PathBuf::from("/opt/drums"), settings.samples_dir());
        assert_eq!(Duration::from_secs(2), settings.sample_load_timeout()?);
        assert_eq!(Duration::from_millis(20), settings.lookahead()?);
        assert_eq!(Some("mock-output"), settings.audio_device());
        Ok(())
    }

    #[test]
    fn test_volumes() -> Result<(), Box<dyn Error>> {
        let settings = Settings::from_yaml(
            r#"
            volume: -8
            track_volumes:
              snare: -2.5
            "#,
        )?;
        assert_eq!(-8.0, settings.track_volume("kick"));
        assert_eq!(-2.5, settings.track_volume("snare"));
        Ok(())
    }

    #[test]
    fn test_blank_values_are_unset() -> Result<(), Box<dyn Error>> {
        let settings = Settings::from_yaml("backend_url: ''\napi_key: '  '\n")?;
        assert_eq!(None, settings.backend_url());
        assert_eq!(None, settings.api_key());
        Ok(())
    }

    #[test]
    fn test_bad_duration() -> Result<(), Box<dyn Error>> {
        let settings = Settings::from_yaml("lookahead: soon\n")?;
        assert!(matches!(
            settings.lookahead(),
            Err(ConfigError::Duration {
                field: "lookahead",
                ..
            })
        ));
        Ok(())
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("beatgrid.yaml");
        std::fs::write(
            &path,
            "backend_url: https://file.example\napi_key: file-key\n",
        )?;

        std::env::set_var("BEATGRID_API_KEY", "env-key");
        let settings = Settings::load(Some(&path));
        std::env::remove_var("BEATGRID_API_KEY");

        let settings = settings?;
        assert_eq!(Some("https://file.example"), settings.backend_url());
        assert_eq!(Some("env-key"), settings.api_key());
        Ok(())
    }

    #[test]
    fn test_overrides() -> Result<(), Box<dyn Error>> {
        let mut settings = Settings::from_yaml("audio_device: speakers\n")?;
        settings.set_audio_device(None);
        assert_eq!(Some("speakers"), settings.audio_device());
        settings.set_audio_device(Some("mock".to_string()));
        assert_eq!(Some("mock"), settings.audio_device());
        settings.set_samples_dir(Some("/tmp/drums".to_string()));
        assert_eq!(PathBuf::from("/tmp/drums"), settings.samples_dir());
        Ok(())
    }
}
