use crate::debounce::DEFAULT_DEBOUNCE;
use std::time::Duration;

pub const DEBOUNCE_ENV: &str = "GRADEGRID_DEBOUNCE_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridConfig {
    /// Quiet period after the last edit before an automatic save.
    pub debounce_ms: u64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
        }
    }
}

impl GridConfig {
    /// Defaults with environment overrides applied. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(ms) = std::env::var(DEBOUNCE_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            cfg.debounce_ms = ms;
        }
        cfg
    }

    /// Apply per-session overrides from request params on top of `self`.
    pub fn merged_with(&self, params: &serde_json::Value) -> Self {
        let mut cfg = self.clone();
        if let Some(ms) = params.get("debounceMs").and_then(|v| v.as_u64()) {
            cfg.debounce_ms = ms;
        }
        cfg
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_grid_behavior() {
        let cfg = GridConfig::default();
        assert_eq!(cfg.debounce(), Duration::from_millis(1500));
    }

    #[test]
    fn params_override_defaults() {
        let cfg = GridConfig::default().merged_with(&json!({ "debounceMs": 50 }));
        assert_eq!(cfg.debounce_ms, 50);
    }

    #[test]
    fn bad_params_are_ignored() {
        let cfg = GridConfig::default().merged_with(&json!({ "debounceMs": "soon" }));
        assert_eq!(cfg, GridConfig::default());
        let cfg = GridConfig::default().merged_with(&json!({ "debounceMs": -5 }));
        assert_eq!(cfg, GridConfig::default());
    }

    #[test]
    fn max_marks_is_not_configurable() {
        let cfg = GridConfig::default().merged_with(&json!({ "maxMarks": 50 }));
        assert_eq!(cfg, GridConfig::default());
    }
}
