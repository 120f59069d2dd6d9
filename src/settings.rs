use std::fmt;

use serde::Serialize;

use crate::{
    config_db::ConfigDb,
    error::{Error, Result},
    refiner::{DEFAULT_API_BASE, DEFAULT_MODEL_ID, GeminiConfig},
};

pub const MODEL_ENV_VAR: &str = "DOCREFINE_MODEL";
pub const API_KEY_ENV_VAR: &str = "GEMINI_API_KEY";

/// Settings keys stored in [`ConfigDb`].
pub const MODEL_SETTING: &str = "model";
pub const API_BASE_SETTING: &str = "api_base";

/// Every key `config set` accepts, with a one-line description.
pub const KNOWN_SETTINGS: &[(&str, &str)] = &[
    (MODEL_SETTING, "refiner model used when no flag or env var is set"),
    (API_BASE_SETTING, "base URL of the generateContent API"),
];

/// Reject keys nothing reads, so a typo cannot silently do nothing.
pub fn validate_setting_key(key: &str) -> Result<()> {
    if KNOWN_SETTINGS.iter().any(|(known, _)| *known == key) {
        return Ok(());
    }
    let known: Vec<&str> = KNOWN_SETTINGS.iter().map(|(k, _)| *k).collect();
    Err(Error::InvalidInput(format!(
        "unknown setting '{key}' (known: {})",
        known.join(", ")
    )))
}

/// Validate and store a setting. Values are trimmed and must not be empty.
pub fn store_setting(
    config_db: &ConfigDb,
    key: &str,
    value: &str,
) -> Result<()> {
    validate_setting_key(key)?;
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput(format!(
            "setting '{key}' cannot be empty"
        )));
    }
    config_db.set_setting(key, value)
}

/// Where a resolved model name came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    Cli,
    Env,
    Config,
    Default,
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelSource::Cli => "--model flag",
            ModelSource::Env => MODEL_ENV_VAR,
            ModelSource::Config => "config.redb",
            ModelSource::Default => "default",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelResolution {
    pub model: String,
    pub source: ModelSource,
}

/// Pick the refiner model: `--model`, then `DOCREFINE_MODEL`, then the
/// stored setting, then [`DEFAULT_MODEL_ID`].
pub fn resolve_model(
    cli_model: Option<&str>,
    config_db: &ConfigDb,
) -> Result<ModelResolution> {
    let env_model = std::env::var(MODEL_ENV_VAR).ok();
    resolve_model_from(cli_model, env_model.as_deref(), config_db)
}

fn resolve_model_from(
    cli_model: Option<&str>,
    env_model: Option<&str>,
    config_db: &ConfigDb,
) -> Result<ModelResolution> {
    let non_empty = |s: &&str| !s.trim().is_empty();

    if let Some(model) = cli_model.filter(non_empty) {
        return Ok(ModelResolution {
            model: model.to_string(),
            source: ModelSource::Cli,
        });
    }
    if let Some(model) = env_model.filter(non_empty) {
        return Ok(ModelResolution {
            model: model.to_string(),
            source: ModelSource::Env,
        });
    }
    if let Some(model) = config_db.get_setting(MODEL_SETTING)? {
        return Ok(ModelResolution {
            model,
            source: ModelSource::Config,
        });
    }
    Ok(ModelResolution {
        model: DEFAULT_MODEL_ID.to_string(),
        source: ModelSource::Default,
    })
}

/// Build the refiner configuration from the environment and stored
/// settings. A missing `GEMINI_API_KEY` is a configuration error.
pub fn gemini_config(
    cli_model: Option<&str>,
    config_db: &ConfigDb,
) -> Result<GeminiConfig> {
    let api_key = std::env::var(API_KEY_ENV_VAR)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            Error::Config(format!(
                "{API_KEY_ENV_VAR} is not set; export it or add it to .env"
            ))
        })?;

    let resolution = resolve_model(cli_model, config_db)?;
    tracing::debug!(
        model = %resolution.model,
        source = %resolution.source,
        "resolved refiner model"
    );

    let mut config = GeminiConfig::new(api_key, resolution.model);
    config.api_base =
        config_db.get_setting_or(API_BASE_SETTING, DEFAULT_API_BASE)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, ConfigDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = ConfigDb::open(&tmp.path().join("config.redb")).unwrap();
        (tmp, db)
    }

    #[test]
    fn cli_beats_env_and_config() {
        let (_tmp, db) = test_db();
        db.set_setting(MODEL_SETTING, "stored").unwrap();

        let r = resolve_model_from(Some("flag"), Some("env"), &db).unwrap();
        assert_eq!(r.model, "flag");
        assert_eq!(r.source, ModelSource::Cli);
    }

    #[test]
    fn env_beats_config() {
        let (_tmp, db) = test_db();
        db.set_setting(MODEL_SETTING, "stored").unwrap();

        let r = resolve_model_from(None, Some("env"), &db).unwrap();
        assert_eq!(r.model, "env");
        assert_eq!(r.source, ModelSource::Env);
    }

    #[test]
    fn stored_setting_then_default() {
        let (_tmp, db) = test_db();
        let r = resolve_model_from(None, Some("  "), &db).unwrap();
        assert_eq!(r.model, DEFAULT_MODEL_ID);
        assert_eq!(r.source, ModelSource::Default);

        db.set_setting(MODEL_SETTING, "gemini-1.5-pro").unwrap();
        let r = resolve_model_from(None, None, &db).unwrap();
        assert_eq!(r.model, "gemini-1.5-pro");
        assert_eq!(r.source, ModelSource::Config);
    }

    #[test]
    fn unknown_setting_key_is_rejected() {
        let (_tmp, db) = test_db();
        let err = store_setting(&db, "modle", "x").unwrap_err();
        assert!(
            matches!(err, Error::InvalidInput(msg) if msg.contains("api_base"))
        );
        assert!(db.list_settings().unwrap().is_empty());
    }

    #[test]
    fn store_setting_trims_and_rejects_empty() {
        let (_tmp, db) = test_db();
        store_setting(&db, API_BASE_SETTING, " http://localhost:8080 ")
            .unwrap();
        assert_eq!(
            db.get_setting(API_BASE_SETTING).unwrap().as_deref(),
            Some("http://localhost:8080")
        );
        assert!(matches!(
            store_setting(&db, MODEL_SETTING, "  "),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn source_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(ModelSource::Default).unwrap(),
            serde_json::json!("default")
        );
    }
}
