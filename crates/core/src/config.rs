//! Engine configuration
//!
//! Settings can be created programmatically, loaded from `WSI_ANNOTATIONS_*`
//! environment variables, or read from a flat `key = value` TOML file.

use std::fs;
use std::path::Path;

/// Prefix of the environment variables read by [`EngineConfig::from_env`]
pub const ENV_PREFIX: &str = "WSI_ANNOTATIONS_";

/// Tunables of the annotation engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Maximum number of undoable operations
    pub history_size: usize,
    /// Press/release pairs shorter than this are clicks, not drags
    pub click_threshold_ms: u64,
    /// Initial brush radius in screen pixels
    pub brush_radius: f64,
    /// Smallest brush radius reachable by scrolling
    pub brush_min_radius: f64,
    /// Largest brush radius reachable by scrolling
    pub brush_max_radius: f64,
    /// Extra search margin (image pixels) when looking for objects to erase
    pub remove_search_offset: f64,
    /// Number of edits between two unsaved-work snapshots
    pub unsaved_snapshot_threshold: u32,
    /// Rounds added to the `n²` cap when merging brush contours
    pub unify_extra_rounds: usize,
    /// Tolerance (image pixels) used to simplify brush contours
    pub simplify_tolerance: f64,
    /// Number of hues on the preset color wheel
    pub color_steps: usize,
    /// Format used when import/export options leave it unspecified
    pub default_format: String,
    /// Name of the viewing session; unsaved work is only recovered for the same name
    pub session_name: Option<String>,
    /// Stroke width in screen pixels at zoom 1
    pub stroke_width: f64,
    /// Hit test tolerance in image pixels
    pub hit_tolerance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_size: 50,
            click_threshold_ms: 100,
            brush_radius: 20.0,
            brush_min_radius: 3.0,
            brush_max_radius: 100.0,
            remove_search_offset: 50.0,
            unsaved_snapshot_threshold: 10,
            unify_extra_rounds: 10,
            simplify_tolerance: 1.0,
            color_steps: 8,
            default_format: "native".to_string(),
            session_name: None,
            stroke_width: 3.0,
            hit_tolerance: 2.0,
        }
    }
}

impl EngineConfig {
    pub fn with_history_size(mut self, size: usize) -> Self {
        self.history_size = size;
        self
    }

    pub fn with_click_threshold_ms(mut self, threshold: u64) -> Self {
        self.click_threshold_ms = threshold;
        self
    }

    pub fn with_brush_radius(mut self, radius: f64) -> Self {
        self.brush_radius = radius;
        self
    }

    pub fn with_unify_extra_rounds(mut self, rounds: usize) -> Self {
        self.unify_extra_rounds = rounds;
        self
    }

    pub fn with_unsaved_snapshot_threshold(mut self, threshold: u32) -> Self {
        self.unsaved_snapshot_threshold = threshold;
        self
    }

    pub fn with_default_format(mut self, format: impl Into<String>) -> Self {
        self.default_format = format.into();
        self
    }

    pub fn with_session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = Some(name.into());
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Every key accepted by [`EngineConfig::from_file`] can be set through
    /// `WSI_ANNOTATIONS_<KEY>` with the key upper-cased, e.g.
    /// `WSI_ANNOTATIONS_HISTORY_SIZE=100`.
    ///
    /// # Errors
    /// Returns an error if any variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in Self::KEYS {
            let variable = format!("{ENV_PREFIX}{}", key.to_ascii_uppercase());
            if let Ok(value) = std::env::var(&variable) {
                config.apply(key, &value).map_err(|_| ConfigError::InvalidValue(variable))?;
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format:
    /// ```toml
    /// history_size = 50
    /// click_threshold_ms = 100
    /// brush_radius = 20
    /// default_format = "native"
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or a value is invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string; unknown keys are ignored.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in toml_str.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                config.apply(key.trim(), value.trim().trim_matches('"'))?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml())?;
        Ok(())
    }

    pub fn to_toml(&self) -> String {
        let mut toml = format!(
            "# Annotation engine configuration\n\
             history_size = {}\n\
             click_threshold_ms = {}\n\
             brush_radius = {}\n\
             brush_min_radius = {}\n\
             brush_max_radius = {}\n\
             remove_search_offset = {}\n\
             unsaved_snapshot_threshold = {}\n\
             unify_extra_rounds = {}\n\
             simplify_tolerance = {}\n\
             color_steps = {}\n\
             default_format = \"{}\"\n\
             stroke_width = {}\n\
             hit_tolerance = {}\n",
            self.history_size,
            self.click_threshold_ms,
            self.brush_radius,
            self.brush_min_radius,
            self.brush_max_radius,
            self.remove_search_offset,
            self.unsaved_snapshot_threshold,
            self.unify_extra_rounds,
            self.simplify_tolerance,
            self.color_steps,
            self.default_format,
            self.stroke_width,
            self.hit_tolerance,
        );
        if let Some(name) = &self.session_name {
            toml.push_str(&format!("session_name = \"{name}\"\n"));
        }
        toml
    }

    const KEYS: [&'static str; 14] = [
        "history_size",
        "click_threshold_ms",
        "brush_radius",
        "brush_min_radius",
        "brush_max_radius",
        "remove_search_offset",
        "unsaved_snapshot_threshold",
        "unify_extra_rounds",
        "simplify_tolerance",
        "color_steps",
        "default_format",
        "session_name",
        "stroke_width",
        "hit_tolerance",
    ];

    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue(key.to_string());
        match key {
            "history_size" => self.history_size = value.parse().map_err(|_| invalid())?,
            "click_threshold_ms" => self.click_threshold_ms = value.parse().map_err(|_| invalid())?,
            "brush_radius" => self.brush_radius = value.parse().map_err(|_| invalid())?,
            "brush_min_radius" => self.brush_min_radius = value.parse().map_err(|_| invalid())?,
            "brush_max_radius" => self.brush_max_radius = value.parse().map_err(|_| invalid())?,
            "remove_search_offset" => {
                self.remove_search_offset = value.parse().map_err(|_| invalid())?
            }
            "unsaved_snapshot_threshold" => {
                self.unsaved_snapshot_threshold = value.parse().map_err(|_| invalid())?
            }
            "unify_extra_rounds" => self.unify_extra_rounds = value.parse().map_err(|_| invalid())?,
            "simplify_tolerance" => self.simplify_tolerance = value.parse().map_err(|_| invalid())?,
            "color_steps" => self.color_steps = value.parse().map_err(|_| invalid())?,
            "default_format" if !value.is_empty() => self.default_format = value.to_string(),
            "default_format" => return Err(invalid()),
            "session_name" => {
                self.session_name = (!value.is_empty()).then(|| value.to_string());
            }
            "stroke_width" => self.stroke_width = value.parse().map_err(|_| invalid())?,
            "hit_tolerance" => self.hit_tolerance = value.parse().map_err(|_| invalid())?,
            _ => {}
        }
        Ok(())
    }

    /// Reject settings the engine cannot operate with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_size == 0 {
            return Err(ConfigError::InvalidValue("history_size".into()));
        }
        if self.color_steps == 0 {
            return Err(ConfigError::InvalidValue("color_steps".into()));
        }
        if !(self.brush_min_radius > 0.0 && self.brush_min_radius <= self.brush_max_radius) {
            return Err(ConfigError::InvalidValue("brush_min_radius".into()));
        }
        if !(self.brush_min_radius..=self.brush_max_radius).contains(&self.brush_radius) {
            return Err(ConfigError::InvalidValue("brush_radius".into()));
        }
        if self.stroke_width <= 0.0 {
            return Err(ConfigError::InvalidValue("stroke_width".into()));
        }
        Ok(())
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for configuration key: {0}")]
    InvalidValue(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.history_size, 50);
        assert_eq!(config.click_threshold_ms, 100);
        assert_eq!(config.brush_radius, 20.0);
        assert_eq!(config.unify_extra_rounds, 10);
        assert_eq!(config.default_format, "native");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = EngineConfig::default()
            .with_history_size(5)
            .with_click_threshold_ms(250)
            .with_session_name("slide-7");

        assert_eq!(config.history_size, 5);
        assert_eq!(config.click_threshold_ms, 250);
        assert_eq!(config.session_name.as_deref(), Some("slide-7"));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig::default()
            .with_history_size(12)
            .with_default_format("asap-xml")
            .with_session_name("case-1");

        let parsed = EngineConfig::from_toml(&config.to_toml()).expect("round trip");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_toml_value() {
        let result = EngineConfig::from_toml("history_size = many");
        assert!(matches!(result, Err(ConfigError::InvalidValue(key)) if key == "history_size"));

        let result = EngineConfig::from_toml("history_size = 0");
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("engine.toml");
        let config = EngineConfig::default().with_brush_radius(30.0);

        config.save_to_file(&path).expect("save should succeed");
        let loaded = EngineConfig::from_file(&path).expect("load should succeed");
        assert_eq!(loaded.brush_radius, 30.0);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        env::set_var("WSI_ANNOTATIONS_HISTORY_SIZE", "7");
        env::set_var("WSI_ANNOTATIONS_DEFAULT_FORMAT", "asap-xml");
        let config = EngineConfig::from_env();
        env::remove_var("WSI_ANNOTATIONS_HISTORY_SIZE");
        env::remove_var("WSI_ANNOTATIONS_DEFAULT_FORMAT");

        let config = config.expect("valid environment");
        assert_eq!(config.history_size, 7);
        assert_eq!(config.default_format, "asap-xml");
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_value() {
        env::set_var("WSI_ANNOTATIONS_CLICK_THRESHOLD_MS", "soon");
        let result = EngineConfig::from_env();
        env::remove_var("WSI_ANNOTATIONS_CLICK_THRESHOLD_MS");

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue(key)) if key == "WSI_ANNOTATIONS_CLICK_THRESHOLD_MS"
        ));
    }
}
