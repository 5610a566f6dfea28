//! Configuration types for the Graspy pipeline.
//!
//! Settings are resolved once at process start (file, then environment
//! overlay) and passed explicitly into the pipeline. Nothing in the
//! pipeline reads the environment on its own.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// The default settings file name.
const CONFIG_FILE_NAME: &str = "graspy.json";

/// Default model identifier.
fn default_model_id() -> String {
    "amazon.nova-lite-v1:0".to_string()
}

/// Default sampling temperature for structured calls.
const fn default_temperature() -> f32 {
    0.0
}

/// Default output budget for the coordinating agent.
const fn default_orchestrator_max_tokens() -> u32 {
    1024
}

/// Default heartbeat interval in seconds.
const fn default_heartbeat_seconds() -> u64 {
    20
}

/// Default capacity of the per-session event queue.
const fn default_event_buffer() -> usize {
    32
}

/// Top-level pipeline settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Model capability settings.
    #[serde(default)]
    pub model: ModelSettings,

    /// Lesson pipeline budgets.
    #[serde(default)]
    pub lesson: LessonSettings,

    /// Streaming session tuning.
    #[serde(default)]
    pub stream: StreamSettings,
}

/// Settings handed to the model-capability client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSettings {
    /// Provider model identifier.
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Provider region, if the client needs one.
    #[serde(default)]
    pub region: Option<String>,

    /// Temperature used when a call does not specify one.
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Output budget used when a call does not specify one.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            region: None,
            default_temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

/// Budgets for the lesson stages and the coordinating agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSettings {
    /// Output budget for slide design.
    #[serde(default)]
    pub slide_max_tokens: Option<u32>,

    /// Output budget for practice authoring.
    #[serde(default)]
    pub practice_max_tokens: Option<u32>,

    /// Output budget for the coordinating agent's own turns.
    #[serde(default = "default_orchestrator_max_tokens")]
    pub orchestrator_max_tokens: u32,

    /// Temperature for the coordinating agent.
    #[serde(default = "default_temperature")]
    pub orchestrator_temperature: f32,
}

impl Default for LessonSettings {
    fn default() -> Self {
        Self {
            slide_max_tokens: None,
            practice_max_tokens: None,
            orchestrator_max_tokens: default_orchestrator_max_tokens(),
            orchestrator_temperature: default_temperature(),
        }
    }
}

/// Streaming session tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSettings {
    /// Seconds between liveness pings.
    #[serde(default = "default_heartbeat_seconds")]
    pub heartbeat_seconds: u64,

    /// Capacity of the bounded event queue.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            heartbeat_seconds: default_heartbeat_seconds(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl StreamSettings {
    /// Heartbeat interval as a [`std::time::Duration`].
    #[must_use]
    pub const fn heartbeat(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.heartbeat_seconds)
    }
}

impl Settings {
    /// Loads settings from `graspy.json` in the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads settings from a specific file path.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ConfigParseError` if the file cannot be read
    /// or is not valid JSON, and `PipelineError::ConfigValidationError` if a
    /// value is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let settings = Self::default();
                settings.validate()?;
                return Ok(settings);
            }
            Err(e) => {
                return Err(PipelineError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let settings: Self = serde_json::from_str(&contents)
            .map_err(|e| PipelineError::config_parse(path, e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Overlays values from environment-style variables.
    ///
    /// `lookup` is usually `|name| std::env::var(name).ok()`, resolved once at
    /// startup. Recognized names:
    ///
    /// - `STRANDS_MODEL_ID`, falling back to `BEDROCK_MODEL_ID`
    /// - `BEDROCK_AWS_REGION`, falling back to `AWS_REGION`
    /// - `STRANDS_DEFAULT_TEMPERATURE`
    /// - `STRANDS_MAX_TOKENS`
    /// - `LESSON_SLIDE_MAX_TOKENS`
    /// - `LESSON_PRACTICE_MAX_TOKENS`
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ConfigValidationError` if a numeric variable
    /// does not parse or the resulting settings are invalid.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(model_id) = get("STRANDS_MODEL_ID").or_else(|| get("BEDROCK_MODEL_ID")) {
            self.model.model_id = model_id;
        }
        if let Some(region) = get("BEDROCK_AWS_REGION").or_else(|| get("AWS_REGION")) {
            self.model.region = Some(region);
        }
        if let Some(raw) = get("STRANDS_DEFAULT_TEMPERATURE") {
            self.model.default_temperature = parse_env("STRANDS_DEFAULT_TEMPERATURE", &raw)?;
        }
        if let Some(raw) = get("STRANDS_MAX_TOKENS") {
            self.model.max_tokens = Some(parse_env("STRANDS_MAX_TOKENS", &raw)?);
        }
        if let Some(raw) = get("LESSON_SLIDE_MAX_TOKENS") {
            self.lesson.slide_max_tokens = Some(parse_env("LESSON_SLIDE_MAX_TOKENS", &raw)?);
        }
        if let Some(raw) = get("LESSON_PRACTICE_MAX_TOKENS") {
            self.lesson.practice_max_tokens = Some(parse_env("LESSON_PRACTICE_MAX_TOKENS", &raw)?);
        }

        self.validate()
    }

    /// Validates the settings values.
    ///
    /// - `model.modelId` must not be empty
    /// - temperatures must be within `0.0..=2.0`
    /// - every token budget that is set must be greater than 0
    /// - `stream.heartbeatSeconds` and `stream.eventBuffer` must be greater than 0
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.model.model_id.trim().is_empty() {
            return Err(PipelineError::config_validation(
                "model.modelId must not be empty",
                "Set model.modelId in graspy.json or STRANDS_MODEL_ID",
            ));
        }

        for (name, value) in [
            ("model.defaultTemperature", self.model.default_temperature),
            ("lesson.orchestratorTemperature", self.lesson.orchestrator_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(PipelineError::config_validation(
                    format!("{name} must be between 0.0 and 2.0, got {value}"),
                    format!("Set {name} to a value between 0.0 and 2.0"),
                ));
            }
        }

        for (name, value) in [
            ("model.maxTokens", self.model.max_tokens),
            ("lesson.slideMaxTokens", self.lesson.slide_max_tokens),
            ("lesson.practiceMaxTokens", self.lesson.practice_max_tokens),
            ("lesson.orchestratorMaxTokens", Some(self.lesson.orchestrator_max_tokens)),
        ] {
            if value == Some(0) {
                return Err(PipelineError::config_validation(
                    format!("{name} must be greater than 0"),
                    format!("Remove {name} or set it to a positive token count"),
                ));
            }
        }

        if self.stream.heartbeat_seconds == 0 {
            return Err(PipelineError::config_validation(
                "stream.heartbeatSeconds must be greater than 0",
                "Set stream.heartbeatSeconds to at least 1 in graspy.json",
            ));
        }

        if self.stream.event_buffer == 0 {
            return Err(PipelineError::config_validation(
                "stream.eventBuffer must be greater than 0",
                "Set stream.eventBuffer to at least 1 in graspy.json",
            ));
        }

        Ok(())
    }

    /// Budget for slide design, falling back to the model-wide budget.
    #[must_use]
    pub fn slide_budget(&self) -> Option<u32> {
        self.lesson.slide_max_tokens.or(self.model.max_tokens)
    }

    /// Budget for practice authoring, falling back to the model-wide budget.
    #[must_use]
    pub fn practice_budget(&self) -> Option<u32> {
        self.lesson.practice_max_tokens.or(self.model.max_tokens)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e| {
        PipelineError::config_validation(
            format!("{name}='{raw}' is not a valid number: {e}"),
            format!("Fix or unset the {name} environment variable"),
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_settings_default_values() {
        let settings = Settings::default();

        assert_eq!(settings.model.model_id, "amazon.nova-lite-v1:0");
        assert!(settings.model.region.is_none());
        assert!(settings.model.max_tokens.is_none());
        assert_eq!(settings.lesson.orchestrator_max_tokens, 1024);
        assert!(settings.lesson.orchestrator_temperature.abs() < f32::EPSILON);
        assert_eq!(settings.stream.heartbeat_seconds, 20);
        assert_eq!(settings.stream.event_buffer, 32);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_deserialization_with_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_settings_deserialization_with_overrides() {
        let json = r#"{
            "model": { "modelId": "custom-model", "maxTokens": 4096 },
            "lesson": { "slideMaxTokens": 3000 },
            "stream": { "heartbeatSeconds": 5 }
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();

        assert_eq!(settings.model.model_id, "custom-model");
        assert_eq!(settings.slide_budget(), Some(3000));
        assert_eq!(settings.practice_budget(), Some(4096));
        assert_eq!(settings.stream.heartbeat(), std::time::Duration::from_secs(5));
        assert_eq!(settings.stream.event_buffer, 32);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let json = r#"{ "model": { "modelId": "m" }, "unknownField": 1 }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.model.model_id, "m");
    }

    #[test]
    fn test_load_from_file_valid_json() {
        use std::io::Write;

        let config_path = std::env::temp_dir().join("test_graspy_valid.json");
        let mut file = std::fs::File::create(&config_path).unwrap();
        file.write_all(br#"{"lesson": {"practiceMaxTokens": 800}}"#)
            .unwrap();

        let settings = Settings::load_from_file(&config_path).unwrap();
        assert_eq!(settings.lesson.practice_max_tokens, Some(800));
        assert_eq!(settings.lesson.orchestrator_max_tokens, 1024);

        std::fs::remove_file(&config_path).ok();
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        use std::io::Write;

        let config_path = std::env::temp_dir().join("test_graspy_invalid.json");
        let mut file = std::fs::File::create(&config_path).unwrap();
        file.write_all(b"{ not valid json }").unwrap();

        let err = Settings::load_from_file(&config_path).unwrap_err();
        assert!(
            matches!(&err, PipelineError::ConfigParseError { path, message } if *path == config_path && !message.is_empty()),
            "Expected ConfigParseError with correct path, got: {err:?}"
        );

        std::fs::remove_file(&config_path).ok();
    }

    #[test]
    fn test_load_from_file_nonexistent_returns_default() {
        let settings =
            Settings::load_from_file(&PathBuf::from("/nonexistent/path/graspy.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_from_file_unreadable_is_parse_error() {
        let dir = std::env::temp_dir().join("test_graspy_config_dir.json");
        std::fs::create_dir_all(&dir).unwrap();

        let err = Settings::load_from_file(&dir).unwrap_err();
        assert!(
            matches!(&err, PipelineError::ConfigParseError { path, message } if *path == dir && message.starts_with("failed to read file")),
            "Expected ConfigParseError for a directory, got: {err:?}"
        );

        std::fs::remove_dir(&dir).ok();
    }

    #[test]
    fn test_load_from_file_validates_after_parsing() {
        use std::io::Write;

        let config_path = std::env::temp_dir().join("test_graspy_zero_heartbeat.json");
        let mut file = std::fs::File::create(&config_path).unwrap();
        file.write_all(br#"{"stream": {"heartbeatSeconds": 0}}"#)
            .unwrap();

        let err = Settings::load_from_file(&config_path).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigValidationError { .. }));

        std::fs::remove_file(&config_path).ok();
    }

    #[test]
    fn test_validation_rejects_zero_budget() {
        let mut settings = Settings::default();
        settings.lesson.slide_max_tokens = Some(0);
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("lesson.slideMaxTokens"));
    }

    #[test]
    fn test_validation_rejects_temperature_out_of_range() {
        let mut settings = Settings::default();
        settings.model.default_temperature = 3.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_apply_env_primary_names() {
        let mut settings = Settings::default();
        settings
            .apply_env(env(&[
                ("STRANDS_MODEL_ID", "model-a"),
                ("BEDROCK_MODEL_ID", "model-b"),
                ("BEDROCK_AWS_REGION", "eu-west-1"),
                ("AWS_REGION", "us-east-1"),
                ("STRANDS_DEFAULT_TEMPERATURE", "0.3"),
                ("STRANDS_MAX_TOKENS", "2048"),
                ("LESSON_SLIDE_MAX_TOKENS", "3500"),
                ("LESSON_PRACTICE_MAX_TOKENS", "700"),
            ]))
            .unwrap();

        assert_eq!(settings.model.model_id, "model-a");
        assert_eq!(settings.model.region.as_deref(), Some("eu-west-1"));
        assert!((settings.model.default_temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(settings.model.max_tokens, Some(2048));
        assert_eq!(settings.slide_budget(), Some(3500));
        assert_eq!(settings.practice_budget(), Some(700));
    }

    #[test]
    fn test_apply_env_fallback_names() {
        let mut settings = Settings::default();
        settings
            .apply_env(env(&[
                ("BEDROCK_MODEL_ID", "model-b"),
                ("AWS_REGION", "us-east-1"),
                ("STRANDS_MODEL_ID", "  "),
            ]))
            .unwrap();

        assert_eq!(settings.model.model_id, "model-b");
        assert_eq!(settings.model.region.as_deref(), Some("us-east-1"));
    }

    #[test]
    fn test_apply_env_rejects_bad_number() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env(env(&[("LESSON_SLIDE_MAX_TOKENS", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("LESSON_SLIDE_MAX_TOKENS"));
    }
}
