use std::fs;
use std::path::{Path, PathBuf};

use crate::io::recovery::atomic_write;
use crate::model::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config.toml: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("could not edit config.toml: {0}")]
    EditError(#[from] toml_edit::TomlError),
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

/// Read the config, returning both the parsed config and the raw
/// toml_edit document for round-trip-safe editing. A missing file reads
/// as all defaults.
pub fn read_config(data_dir: &Path) -> Result<(Config, toml_edit::DocumentMut), ConfigError> {
    let path = config_path(data_dir);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(ConfigError::ReadError { path, source: e }),
    };
    let config: Config = toml::from_str(&text)?;
    let doc: toml_edit::DocumentMut = text.parse()?;
    Ok((config, doc))
}

pub fn load_config(data_dir: &Path) -> Result<Config, ConfigError> {
    read_config(data_dir).map(|(config, _)| config)
}

/// Write the document back, preserving comments and formatting.
pub fn write_config(data_dir: &Path, doc: &toml_edit::DocumentMut) -> Result<(), ConfigError> {
    let path = config_path(data_dir);
    fs::create_dir_all(data_dir)
        .and_then(|()| atomic_write(&path, doc.to_string().as_bytes()))
        .map_err(|e| ConfigError::WriteError { path, source: e })
}

fn sync_table(doc: &mut toml_edit::DocumentMut) -> &mut toml_edit::Item {
    if !doc.contains_key("sync") {
        doc["sync"] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    &mut doc["sync"]
}

/// Set or clear `[sync] account`.
pub fn set_account(doc: &mut toml_edit::DocumentMut, account: Option<&str>) {
    match account {
        Some(account) => sync_table(doc)["account"] = toml_edit::value(account),
        None => {
            if let Some(table) = doc.get_mut("sync").and_then(|s| s.as_table_mut()) {
                table.remove("account");
            }
        }
    }
}

pub fn set_debounce(doc: &mut toml_edit::DocumentMut, ms: u64) {
    let ms = i64::try_from(ms).unwrap_or(i64::MAX);
    sync_table(doc)["debounce_ms"] = toml_edit::value(ms);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"# shared with the laptop
[sync]
account = "u-1"

[ui]
indent_width = 32.0
"#;

    #[test]
    fn round_trip_preserves_comments() {
        let tmp = TempDir::new().unwrap();
        fs::write(config_path(tmp.path()), SAMPLE).unwrap();

        let (config, doc) = read_config(tmp.path()).unwrap();
        assert_eq!(config.sync.account.as_deref(), Some("u-1"));
        assert_eq!(config.ui.indent_width, 32.0);

        write_config(tmp.path(), &doc).unwrap();
        assert_eq!(fs::read_to_string(config_path(tmp.path())).unwrap(), SAMPLE);
    }

    #[test]
    fn missing_file_reads_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.sync.account, None);
        assert_eq!(config.sync.debounce_ms, 3000);
    }

    #[test]
    fn set_account_and_debounce() {
        let mut doc: toml_edit::DocumentMut = "".parse().unwrap();
        set_account(&mut doc, Some("u-9"));
        set_debounce(&mut doc, 500);
        let config: Config = toml::from_str(&doc.to_string()).unwrap();
        assert_eq!(config.sync.account.as_deref(), Some("u-9"));
        assert_eq!(config.sync.debounce_ms, 500);

        set_account(&mut doc, None);
        let config: Config = toml::from_str(&doc.to_string()).unwrap();
        assert_eq!(config.sync.account, None);
        assert_eq!(config.sync.debounce_ms, 500);
    }

    #[test]
    fn edits_keep_other_sections() {
        let mut doc: toml_edit::DocumentMut = SAMPLE.parse().unwrap();
        set_debounce(&mut doc, 1000);
        let result = doc.to_string();
        assert!(result.contains("# shared with the laptop"));
        assert!(result.contains("indent_width = 32.0"));
        assert!(result.contains("debounce_ms = 1000"));
    }

    #[test]
    fn bad_toml_is_parse_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(config_path(tmp.path()), "[sync\n").unwrap();
        assert!(matches!(
            read_config(tmp.path()),
            Err(ConfigError::ParseError(_))
        ));
    }
}
