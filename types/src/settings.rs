//! User-adjustable session settings.
//!
//! Values are validated at the parse boundary: a `Temperature` that exists is
//! within range, and a stored test command is never blank.

use std::fmt;

use thiserror::Error;

pub const DEFAULT_MODEL_NAME: &str = "gemini";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("Invalid temperature value '{0}'. Must be a number.")]
    TemperatureNotANumber(String),
    #[error("Invalid temperature value {0}. Must be between 0.0 and 2.0.")]
    TemperatureOutOfRange(f64),
    #[error("Invalid value '{0}' for admin_mode_enabled. Use 'on'/'off', 'true'/'false', etc.")]
    InvalidFlag(String),
    #[error("Unknown setting key: '{0}'")]
    UnknownKey(String),
}

/// Sampling temperature in `[0.0, 2.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Temperature(f64);

impl Temperature {
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 2.0;
    pub const DEFAULT: Temperature = Temperature(0.25);

    pub fn new(value: f64) -> Result<Self, SettingsError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(SettingsError::TemperatureOutOfRange(value))
        }
    }

    pub fn parse(raw: &str) -> Result<Self, SettingsError> {
        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|_| SettingsError::TemperatureNotANumber(raw.to_string()))?;
        Self::new(value)
    }

    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }
}

impl Default for Temperature {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Parse an on/off style flag.
#[must_use]
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" | "enable" => Some(true),
        "false" | "off" | "0" | "no" | "disable" => Some(false),
        _ => None,
    }
}

/// Settings keys in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    ModelName,
    AdminModeEnabled,
    Temperature,
    TestCommand,
}

impl SettingKey {
    pub const ALL: [SettingKey; 4] = [
        SettingKey::ModelName,
        SettingKey::AdminModeEnabled,
        SettingKey::Temperature,
        SettingKey::TestCommand,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SettingKey::ModelName => "model_name",
            SettingKey::AdminModeEnabled => "admin_mode_enabled",
            SettingKey::Temperature => "temperature",
            SettingKey::TestCommand => "test_command",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, SettingsError> {
        let lowered = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == lowered)
            .ok_or_else(|| SettingsError::UnknownKey(raw.to_string()))
    }

    /// Comma-separated list of valid keys, for error messages.
    #[must_use]
    pub fn valid_keys() -> String {
        Self::ALL.map(SettingKey::as_str).join(", ")
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistent per-user settings (one record).
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub model_name: String,
    pub temperature: Temperature,
    pub admin_mode_enabled: bool,
    test_command: Option<String>,
}

impl Settings {
    #[must_use]
    pub fn with_defaults(admin_mode_enabled: bool) -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            temperature: Temperature::DEFAULT,
            admin_mode_enabled,
            test_command: None,
        }
    }

    /// Configured test command, if any.
    #[must_use]
    pub fn test_command(&self) -> Option<&str> {
        self.test_command.as_deref()
    }

    /// Set or clear the test command.
    ///
    /// `none`, `clear`, `null`, and blank input clear it.
    pub fn set_test_command(&mut self, raw: Option<&str>) {
        self.test_command = raw
            .map(str::trim)
            .filter(|cmd| !cmd.is_empty())
            .filter(|cmd| !matches!(cmd.to_ascii_lowercase().as_str(), "none" | "clear" | "null"))
            .map(str::to_string);
    }

    /// Render a single value for display.
    #[must_use]
    pub fn display_value(&self, key: SettingKey) -> String {
        match key {
            SettingKey::ModelName => self.model_name.clone(),
            SettingKey::AdminModeEnabled => {
                if self.admin_mode_enabled { "ON" } else { "OFF" }.to_string()
            }
            SettingKey::Temperature => self.temperature.to_string(),
            SettingKey::TestCommand => self
                .test_command
                .as_ref()
                .map_or_else(|| "Not set".to_string(), |cmd| format!("'{cmd}'")),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::with_defaults(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_bounds_are_inclusive() {
        assert!(Temperature::new(0.0).is_ok());
        assert!(Temperature::new(2.0).is_ok());
        assert_eq!(
            Temperature::new(2.01),
            Err(SettingsError::TemperatureOutOfRange(2.01))
        );
        assert!(Temperature::new(-0.1).is_err());
    }

    #[test]
    fn temperature_parse_rejects_text() {
        assert!(matches!(
            Temperature::parse("warm"),
            Err(SettingsError::TemperatureNotANumber(_))
        ));
        assert_eq!(Temperature::parse(" 0.7 ").map(Temperature::value), Ok(0.7));
    }

    #[test]
    fn parse_flag_accepts_aliases() {
        for raw in ["on", "TRUE", "1", "yes", "enable"] {
            assert_eq!(parse_flag(raw), Some(true), "{raw}");
        }
        for raw in ["off", "False", "0", "no", "disable"] {
            assert_eq!(parse_flag(raw), Some(false), "{raw}");
        }
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn setting_key_parse_is_case_insensitive() {
        assert_eq!(SettingKey::parse("Temperature"), Ok(SettingKey::Temperature));
        assert!(matches!(
            SettingKey::parse("colour"),
            Err(SettingsError::UnknownKey(_))
        ));
        assert_eq!(
            SettingKey::valid_keys(),
            "model_name, admin_mode_enabled, temperature, test_command"
        );
    }

    #[test]
    fn test_command_clear_words() {
        let mut settings = Settings::default();
        settings.set_test_command(Some("pytest -q"));
        assert_eq!(settings.test_command(), Some("pytest -q"));

        for clear in ["none", "CLEAR", "null", "   "] {
            settings.set_test_command(Some("pytest"));
            settings.set_test_command(Some(clear));
            assert_eq!(settings.test_command(), None, "{clear}");
        }

        settings.set_test_command(Some("cargo test"));
        settings.set_test_command(None);
        assert_eq!(settings.test_command(), None);
    }

    #[test]
    fn defaults_match_first_run_values() {
        let settings = Settings::with_defaults(true);
        assert_eq!(settings.model_name, "gemini");
        assert_eq!(settings.temperature.value(), 0.25);
        assert!(settings.admin_mode_enabled);
        assert_eq!(settings.test_command(), None);
    }

    #[test]
    fn display_values() {
        let mut settings = Settings::default();
        assert_eq!(settings.display_value(SettingKey::AdminModeEnabled), "OFF");
        assert_eq!(settings.display_value(SettingKey::Temperature), "0.25");
        assert_eq!(settings.display_value(SettingKey::TestCommand), "Not set");
        settings.set_test_command(Some("make test"));
        assert_eq!(
            settings.display_value(SettingKey::TestCommand),
            "'make test'"
        );
    }
}
