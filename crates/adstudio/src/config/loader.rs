use std::path::Path;

use crate::config::schema::Settings;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/settings-v1.json");

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_settings_from_str(&content)
}

pub fn load_settings_from_str(content: &str) -> Result<Settings, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let settings: Settings = serde_json::from_value(json_value)?;

    validate_settings(&settings)?;

    Ok(settings)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    if settings.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported settings version: {}", settings.version),
        });
    }

    if settings.storyboard_qc_threshold > 100 {
        return Err(ConfigError::Validation {
            message: format!(
                "storyboard_qc_threshold must be within 0-100, got {}",
                settings.storyboard_qc_threshold
            ),
        });
    }

    if settings.video_qc_threshold > 10 {
        return Err(ConfigError::Validation {
            message: format!(
                "video_qc_threshold must be within 0-10, got {}",
                settings.video_qc_threshold
            ),
        });
    }

    if settings.max_concurrent_scenes == 0 {
        return Err(ConfigError::Validation {
            message: "max_concurrent_scenes must be at least 1".to_string(),
        });
    }

    if settings.max_video_variants == 0 || settings.max_avatar_variants == 0 {
        return Err(ConfigError::Validation {
            message: "variant counts must be at least 1".to_string(),
        });
    }

    let selection = &settings.avatar_selection;
    if !(selection.poll_interval_secs > 0.0 && selection.timeout_secs > 0.0) {
        return Err(ConfigError::Validation {
            message: "avatar_selection intervals must be positive".to_string(),
        });
    }

    if settings.retry.backoff_factor < 1.0 || settings.retry.initial_delay_secs < 0.0 {
        return Err(ConfigError::Validation {
            message: "retry backoff_factor must be >= 1 and initial_delay_secs >= 0".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal_settings() {
        let settings = load_settings_from_str(r#"{"version": "1.0"}"#).unwrap();
        assert_eq!(settings.output_dir, "output");
        assert_eq!(settings.aspect_ratio, "9:16");
    }

    #[test]
    fn test_load_overrides() {
        let settings = load_settings_from_str(
            r#"{
                "version": "1.0",
                "output_dir": "/tmp/ads",
                "storyboard_qc_threshold": 75,
                "max_concurrent_scenes": 2,
                "retry": {"retries": 1, "retryable_codes": [429]}
            }"#,
        )
        .unwrap();
        assert_eq!(settings.output_dir, "/tmp/ads");
        assert_eq!(settings.storyboard_qc_threshold, 75);
        assert_eq!(settings.max_concurrent_scenes, 2);
        assert_eq!(settings.retry.retries, 1);
        assert_eq!(settings.retry.retryable_codes, vec![429]);
        assert_eq!(settings.retry.initial_delay_secs, 2.0);
    }

    #[test]
    fn test_missing_version_fails_schema() {
        let err = load_settings_from_str(r#"{"output_dir": "out"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    }

    #[test]
    fn test_unknown_key_fails_schema() {
        let err = load_settings_from_str(r#"{"version": "1.0", "gpu": true}"#).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    }

    #[test]
    fn test_out_of_range_threshold_fails_schema() {
        let err =
            load_settings_from_str(r#"{"version": "1.0", "video_qc_threshold": 11}"#).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    }

    #[test]
    fn test_unsupported_version() {
        let err = load_settings_from_str(r#"{"version": "2.0"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let err = load_settings_from_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseJson(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"version": "1.0", "max_video_variants": 2}"#).unwrap();
        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.max_video_variants, 2);
    }

    #[test]
    fn test_missing_file() {
        let err = load_settings("/nonexistent/settings.json").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }
}
