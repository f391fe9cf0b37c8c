use std::path::Path;

use crate::config::schema::{Config, LogFormat};
use crate::error::{Error, Result};

const ENV_PREFIX: &str = "DISPATCH_AI_";

pub fn load_from_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|err| {
        Error::Config(format!("failed to read config '{}': {err}", path.display()))
    })?;

    toml::from_str(&content).map_err(|err| {
        Error::Config(format!(
            "failed to parse config '{}': {err}",
            path.display()
        ))
    })
}

/// Loads the file when given (defaults otherwise) and applies `DISPATCH_AI_*` overrides.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => load_from_file(path)?,
        None => Config::default(),
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    apply_overrides_from(config, |key| std::env::var(key).ok())
}

fn apply_overrides_from(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let get = |suffix: &str| {
        lookup(&format!("{ENV_PREFIX}{suffix}"))
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    };

    if let Some(value) = get("BASE_URL") {
        config.provider.base_url = value;
    }
    if let Some(value) = get("API_KEY_ENV") {
        config.provider.api_key_env = value;
    }
    if let Some(value) = get("PRIMARY_MODEL") {
        config.models.primary = value;
    }
    if let Some(value) = get("FAST_MODEL") {
        config.models.fast = value;
    }
    if let Some(value) = get("WORKSPACE_ROOT") {
        config.workspace.root = value;
    }
    if let Some(value) = get("LOG_LEVEL") {
        config.logging.level = value;
    }
    if let Some(value) = get("LOG_FORMAT") {
        config.logging.format = match value.to_ascii_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => {
                return Err(Error::Config(format!(
                    "{ENV_PREFIX}LOG_FORMAT must be 'text' or 'json', got '{other}'"
                )))
            }
        };
    }
    if let Some(value) = get("TURN_TIMEOUT_SECS") {
        config.orchestrator.turn_timeout_secs = value.parse().map_err(|err| {
            Error::Config(format!(
                "{ENV_PREFIX}TURN_TIMEOUT_SECS is not a number ('{value}'): {err}"
            ))
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parses_partial_toml_over_defaults() {
        let config: Config = toml::from_str(
            r#"
            [models]
            primary = "some/model"

            [agent]
            max_iterations = 4
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.models.primary, "some/model");
        assert_eq!(config.models.fast, Config::default().models.fast);
        assert_eq!(config.agent.max_iterations, 4);
        assert_eq!(config.agent.max_read_only_iterations, 3);
        assert_eq!(config.orchestrator.rungs.len(), 5);
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let env: HashMap<String, String> = [
            ("DISPATCH_AI_PRIMARY_MODEL", "env/model"),
            ("DISPATCH_AI_LOG_FORMAT", "json"),
            ("DISPATCH_AI_TURN_TIMEOUT_SECS", "42"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect();

        let mut config = Config::default();
        apply_overrides_from(&mut config, |key| env.get(key).cloned())
            .expect("overrides should apply");

        assert_eq!(config.models.primary, "env/model");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.orchestrator.turn_timeout_secs, 42);
    }

    #[test]
    fn rejects_unknown_log_format() {
        let mut config = Config::default();
        let error = apply_overrides_from(&mut config, |key| {
            (key == "DISPATCH_AI_LOG_FORMAT").then(|| "xml".to_owned())
        })
        .expect_err("xml is not a log format");
        assert!(error.to_string().contains("LOG_FORMAT"));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let error = load_from_file(Path::new("/definitely/not/here.toml"))
            .expect_err("missing file should fail");
        assert!(matches!(error, Error::Config(_)));
    }
}
