//! Engine configuration.

use serde::Deserialize;

/// When the binder audits the traits it binds against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditPolicy {
    Never,
    #[default]
    DebugOnly,
    Always,
}

impl AuditPolicy {
    pub fn enabled(self) -> bool {
        match self {
            AuditPolicy::Never => false,
            AuditPolicy::DebugOnly => cfg!(debug_assertions),
            AuditPolicy::Always => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub audit: AuditPolicy,
    /// Record rebind and reduction steps.
    pub trace: bool,
    /// How deeply the standard reducer may nest rewrites of rewrites. Tree
    /// depth is not limited.
    pub max_reduce_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            audit: AuditPolicy::default(),
            trace: false,
            max_reduce_depth: 64,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid engine config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("max_reduce_depth must be at least 1")]
    ZeroDepth,
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(text)?;
        if config.max_reduce_depth == 0 {
            return Err(ConfigError::ZeroDepth);
        }
        Ok(config)
    }
}
