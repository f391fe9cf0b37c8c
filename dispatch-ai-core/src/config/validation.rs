use std::collections::HashSet;

use crate::config::schema::{Config, ToolPolicy};
use crate::error::{Error, Result};

pub const MAX_LADDER_RUNGS: usize = 6;

pub fn validate_config(config: &Config) -> Result<()> {
    if config.provider.base_url.trim().is_empty() {
        return Err(Error::Validation(
            "provider.base_url cannot be empty".to_owned(),
        ));
    }

    for (slot, model) in [
        ("primary", &config.models.primary),
        ("fast", &config.models.fast),
        ("alternate", &config.models.alternate),
        ("reliable", &config.models.reliable),
    ] {
        if model.trim().is_empty() {
            return Err(Error::Validation(format!(
                "models.{slot} cannot be empty"
            )));
        }
    }

    if config.agent.max_iterations == 0 {
        return Err(Error::Validation(
            "agent.max_iterations must be at least 1".to_owned(),
        ));
    }

    if config.agent.max_read_only_iterations == 0 {
        return Err(Error::Validation(
            "agent.max_read_only_iterations must be at least 1".to_owned(),
        ));
    }

    if config.agent.max_parallel_tools == 0 {
        return Err(Error::Validation(
            "agent.max_parallel_tools must be at least 1".to_owned(),
        ));
    }

    let rungs = &config.orchestrator.rungs;
    if rungs.is_empty() {
        return Err(Error::Validation(
            "orchestrator.rungs must contain at least one strategy".to_owned(),
        ));
    }

    if rungs.len() > MAX_LADDER_RUNGS {
        return Err(Error::Validation(format!(
            "orchestrator.rungs allows at most {MAX_LADDER_RUNGS} strategies, got {}",
            rungs.len()
        )));
    }

    let mut names = HashSet::new();
    for rung in rungs {
        let name = rung.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("rung name cannot be empty".to_owned()));
        }
        if !names.insert(name.to_owned()) {
            return Err(Error::Validation(format!("duplicate rung name '{name}'")));
        }
    }

    if rungs.iter().all(|rung| rung.fix_only) {
        return Err(Error::Validation(
            "orchestrator.rungs needs at least one rung that is not fix_only".to_owned(),
        ));
    }

    if let Some(last) = rungs.last() {
        if last.tools != ToolPolicy::None {
            tracing::warn!(
                rung = %last.name,
                "last ladder rung still uses tools; there is no text-only last resort"
            );
        }
    }

    if config.conversation_cache.max_conversations == 0 {
        return Err(Error::Validation(
            "conversation_cache.max_conversations must be at least 1".to_owned(),
        ));
    }

    if config.action_cache.max_actions == 0 {
        return Err(Error::Validation(
            "action_cache.max_actions must be at least 1".to_owned(),
        ));
    }

    if config.error_guard.lockout_threshold < 2 {
        return Err(Error::Validation(
            "error_guard.lockout_threshold must be at least 2".to_owned(),
        ));
    }

    if !(0.0..=1.0).contains(&config.routing.min_confidence) {
        return Err(Error::Validation(
            "routing.min_confidence must be within [0, 1]".to_owned(),
        ));
    }

    if let Some(window) = config.transport.reply_window_secs {
        if window <= config.transport.reply_margin_secs {
            return Err(Error::Validation(format!(
                "transport.reply_window_secs ({window}) must exceed reply_margin_secs ({})",
                config.transport.reply_margin_secs
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_config;
    use crate::config::schema::{default_ladder, Config};

    #[test]
    fn accepts_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn rejects_duplicate_rung_names() {
        let mut config = Config::default();
        config.orchestrator.rungs[1].name = "primary".to_owned();

        let error = validate_config(&config).expect_err("validation should fail");
        assert!(error.to_string().contains("duplicate rung name"));
    }

    #[test]
    fn rejects_oversized_ladder() {
        let mut config = Config::default();
        config.orchestrator.rungs.extend(default_ladder());
        for (index, rung) in config.orchestrator.rungs.iter_mut().enumerate() {
            rung.name = format!("rung-{index}");
        }

        let error = validate_config(&config).expect_err("validation should fail");
        assert!(error.to_string().contains("at most"));
    }

    #[test]
    fn rejects_reply_window_inside_margin() {
        let mut config = Config::default();
        config.transport.reply_window_secs = Some(10);
        config.transport.reply_margin_secs = 30;

        let error = validate_config(&config).expect_err("validation should fail");
        assert!(error.to_string().contains("reply_window_secs"));
    }

    #[test]
    fn rejects_empty_model_slot() {
        let mut config = Config::default();
        config.models.reliable = "  ".to_owned();

        let error = validate_config(&config).expect_err("validation should fail");
        assert!(error.to_string().contains("models.reliable"));
    }
}
