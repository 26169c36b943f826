use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration from config.toml in the data directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Account whose trees are synced. Absent = local-only editing.
    #[serde(default)]
    pub account: Option<String>,
    /// Quiet period before local edits are pushed to the store
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            account: None,
            debounce_ms: default_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// Pointer distance, in pixels, that equals one nesting level while dragging
    #[serde(default = "default_indent_width")]
    pub indent_width: f64,
    #[serde(default)]
    pub hide_done_items: bool,
    #[serde(default)]
    pub dark_mode: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        UiConfig {
            indent_width: default_indent_width(),
            hide_done_items: false,
            dark_mode: false,
        }
    }
}

fn default_debounce_ms() -> u64 {
    3000
}

fn default_indent_width() -> f64 {
    24.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.sync.account, None);
        assert_eq!(config.sync.debounce(), Duration::from_secs(3));
        assert_eq!(config.ui.indent_width, 24.0);
        assert!(!config.ui.hide_done_items);
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let config: Config = toml::from_str(
            r#"
[sync]
account = "u-42"

[ui]
dark_mode = true
"#,
        )
        .unwrap();
        assert_eq!(config.sync.account.as_deref(), Some("u-42"));
        assert_eq!(config.sync.debounce_ms, 3000);
        assert!(config.ui.dark_mode);
        assert_eq!(config.ui.indent_width, 24.0);
    }
}
