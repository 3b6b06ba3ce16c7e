pub mod patterns;
pub mod settings;

pub use patterns::{
    MetricSynonyms, ModeTrigger, NameRules, PatternConfig, PhraseLists, RoleKeywords, SlotPolicy,
};
pub use settings::{DialogueConfig, PatternsConfig, Settings, TracingConfig};

use tracing::info;

use crate::utils::error::DialogueResult;

/// Load the pattern table named by the settings.
pub fn load_patterns(settings: &Settings) -> DialogueResult<PatternConfig> {
    let path = settings.patterns_path();
    let config = if settings.patterns.required {
        PatternConfig::load(&path)?
    } else {
        PatternConfig::load_or_empty(&path)?
    };
    info!("Pattern config ready (version {})", config.version);
    Ok(config)
}
