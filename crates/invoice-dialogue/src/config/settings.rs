use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::models::EntityRole;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub dialogue: DialogueConfig,
    pub patterns: PatternsConfig,
    pub tracing: TracingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DialogueConfig {
    pub session_ttl_seconds: u64,
    pub key_prefix: String,
    pub max_history_entries: usize,
    /// Word limit for the legacy "short question continues the topic" rule.
    pub legacy_short_max_words: usize,
    /// Role given to an extracted name when no role word accompanies it.
    pub default_name_role: EntityRole,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PatternsConfig {
    pub path: String,
    pub required: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TracingConfig {
    pub queue_capacity: usize,
    pub filter: String,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: 6 * 60 * 60,
            key_prefix: "invoice-dialogue:session:".to_string(),
            max_history_entries: 20,
            legacy_short_max_words: 8,
            default_name_role: EntityRole::Student,
        }
    }
}

impl DialogueConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            path: "config/patterns.toml".to_string(),
            required: false,
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            filter: "info,invoice_dialogue=debug".to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dialogue: DialogueConfig::default(),
            patterns: PatternsConfig::default(),
            tracing: TracingConfig::default(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Settings::default();
        let config = Config::builder()
            .set_default(
                "dialogue.session_ttl_seconds",
                defaults.dialogue.session_ttl_seconds as i64,
            )?
            .set_default("dialogue.key_prefix", defaults.dialogue.key_prefix.clone())?
            .set_default(
                "dialogue.max_history_entries",
                defaults.dialogue.max_history_entries as i64,
            )?
            .set_default(
                "dialogue.legacy_short_max_words",
                defaults.dialogue.legacy_short_max_words as i64,
            )?
            .set_default("dialogue.default_name_role", defaults.dialogue.default_name_role.as_str())?
            .set_default("patterns.path", defaults.patterns.path.clone())?
            .set_default("patterns.required", defaults.patterns.required)?
            .set_default("tracing.queue_capacity", defaults.tracing.queue_capacity as i64)?
            .set_default("tracing.filter", defaults.tracing.filter.clone())?
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    pub fn patterns_path(&self) -> PathBuf {
        PathBuf::from(&self.patterns.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.dialogue.session_ttl(), Duration::from_secs(21_600));
        assert_eq!(settings.dialogue.default_name_role, EntityRole::Student);
        assert_eq!(settings.patterns_path(), PathBuf::from("config/patterns.toml"));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let settings = Settings::load().unwrap();
        assert!(settings.dialogue.max_history_entries > 0);
        assert!(!settings.dialogue.key_prefix.is_empty());
    }
}
