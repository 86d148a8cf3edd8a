use std::path::{Path, PathBuf};

use serde::Deserialize;

use pianotutor_types::{Calibration, Rgb, TutorSettings, DEFAULT_SERIAL_DEVICE};

use crate::error::{TutorError, TutorResult};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    device: DeviceConfig,
    #[serde(default)]
    calibration: CalibrationConfig,
    #[serde(default)]
    behavior: BehaviorConfig,
}

#[derive(Deserialize, Default)]
struct DeviceConfig {
    path: Option<String>,
}

#[derive(Deserialize, Default)]
struct CalibrationConfig {
    reference_light: Option<i32>,
    coefficient: Option<f64>,
    mistake_color: Option<[u8; 3]>,
    even_color: Option<[u8; 3]>,
    odd_color: Option<[u8; 3]>,
}

#[derive(Deserialize, Default)]
struct BehaviorConfig {
    lit_until_release: Option<bool>,
    flush_delay_ms: Option<u64>,
    handshake_attempts: Option<u32>,
}

pub struct Config {
    device: DeviceConfig,
    calibration: CalibrationConfig,
    behavior: BehaviorConfig,
}

impl Config {
    /// Embedded defaults overlaid with the user's config file, if there is one.
    pub fn load() -> Self {
        let mut config = Self::embedded();

        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => config.merge(user),
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        config
    }

    /// Embedded defaults overlaid with an explicit file. Unlike `load`, a
    /// missing or malformed file is an error.
    pub fn load_from(path: &Path) -> TutorResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| TutorError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
            .map_err(|e| TutorError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Embedded defaults overlaid with `contents`.
    pub fn from_toml_str(contents: &str) -> TutorResult<Self> {
        let user: ConfigFile = toml::from_str(contents)?;
        let mut config = Self::embedded();
        config.merge(user);
        Ok(config)
    }

    fn embedded() -> Self {
        let base: ConfigFile = toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
            log::error!(target: "config", "embedded config.toml is invalid: {}", e);
            ConfigFile::default()
        });
        Self {
            device: base.device,
            calibration: base.calibration,
            behavior: base.behavior,
        }
    }

    fn merge(&mut self, user: ConfigFile) {
        merge_device(&mut self.device, user.device);
        merge_calibration(&mut self.calibration, user.calibration);
        merge_behavior(&mut self.behavior, user.behavior);
    }

    pub fn serial_device(&self) -> String {
        self.device
            .path
            .clone()
            .unwrap_or_else(|| DEFAULT_SERIAL_DEVICE.to_string())
    }

    pub fn calibration(&self) -> Calibration {
        let fallback = Calibration::default();
        let color = |value: Option<[u8; 3]>, index: usize| {
            value.map(Rgb::from).unwrap_or(fallback.colors[index])
        };
        Calibration {
            reference_light: self
                .calibration
                .reference_light
                .unwrap_or(fallback.reference_light),
            coefficient: self
                .calibration
                .coefficient
                .filter(|c| c.is_finite() && *c != 0.0)
                .unwrap_or(fallback.coefficient),
            colors: [
                color(self.calibration.mistake_color, 0),
                color(self.calibration.even_color, 1),
                color(self.calibration.odd_color, 2),
            ],
        }
    }

    pub fn to_settings(&self) -> TutorSettings {
        let fallback = TutorSettings::default();
        TutorSettings {
            serial_device: self.serial_device(),
            calibration: self.calibration(),
            lit_until_release: self
                .behavior
                .lit_until_release
                .unwrap_or(fallback.lit_until_release),
            flush_delay_ms: self
                .behavior
                .flush_delay_ms
                .unwrap_or(fallback.flush_delay_ms),
            handshake_attempts: self.behavior.handshake_attempts.filter(|&n| n > 0),
        }
    }
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pianotutor").join("config.toml"))
}

fn merge_device(base: &mut DeviceConfig, user: DeviceConfig) {
    if user.path.is_some() {
        base.path = user.path;
    }
}

fn merge_calibration(base: &mut CalibrationConfig, user: CalibrationConfig) {
    if user.reference_light.is_some() {
        base.reference_light = user.reference_light;
    }
    if user.coefficient.is_some() {
        base.coefficient = user.coefficient;
    }
    if user.mistake_color.is_some() {
        base.mistake_color = user.mistake_color;
    }
    if user.even_color.is_some() {
        base.even_color = user.even_color;
    }
    if user.odd_color.is_some() {
        base.odd_color = user.odd_color;
    }
}

fn merge_behavior(base: &mut BehaviorConfig, user: BehaviorConfig) {
    if user.lit_until_release.is_some() {
        base.lit_until_release = user.lit_until_release;
    }
    if user.flush_delay_ms.is_some() {
        base.flush_delay_ms = user.flush_delay_ms;
    }
    if user.handshake_attempts.is_some() {
        base.handshake_attempts = user.handshake_attempts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_embedded_config_matches_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.to_settings(), TutorSettings::default());
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_toml_str(
            r#"
            [device]
            path = "/dev/ttyUSB0"

            [calibration]
            reference_light = 12
            odd_color = [1, 2, 3]

            [behavior]
            lit_until_release = true
            handshake_attempts = 40
            "#,
        )
        .unwrap();
        let settings = config.to_settings();
        assert_eq!(settings.serial_device, "/dev/ttyUSB0");
        assert_eq!(settings.calibration.reference_light, 12);
        assert_eq!(settings.calibration.coefficient, -2.0);
        assert_eq!(
            settings.calibration.colors,
            [Rgb::new(16, 0, 0), Rgb::new(16, 0, 16), Rgb::new(1, 2, 3)]
        );
        assert!(settings.lit_until_release);
        assert_eq!(settings.flush_delay_ms, 5);
        assert_eq!(settings.handshake_attempts, Some(40));
    }

    #[test]
    fn test_zero_coefficient_falls_back() {
        let config = Config::from_toml_str("[calibration]\ncoefficient = 0.0\n").unwrap();
        assert_eq!(config.calibration().coefficient, -2.0);
    }

    #[test]
    fn test_malformed_string_is_an_error() {
        let err = Config::from_toml_str("[calibration]\nreference_light = \"left\"\n");
        assert!(matches!(err, Err(TutorError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[behavior]\nflush_delay_ms = 12").unwrap();
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.to_settings().flush_delay_ms, 12);
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load_from(&dir.path().join("nope.toml"));
        assert!(matches!(result, Err(TutorError::Config(_))));
    }
}
