pub mod config_io;
pub mod export;
pub mod lock;
pub mod recovery;
pub mod watcher;

use std::path::{Path, PathBuf};

/// Resolve the data directory: explicit flag, then `$TT_DATA_DIR`, then
/// `$XDG_DATA_HOME/tasktrees`, then `~/.local/share/tasktrees`.
pub fn data_dir(explicit: Option<&Path>) -> PathBuf {
    resolve_data_dir(explicit, |name| std::env::var_os(name).filter(|v| !v.is_empty()))
}

fn resolve_data_dir(
    explicit: Option<&Path>,
    env: impl Fn(&str) -> Option<std::ffi::OsString>,
) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Some(dir) = env("TT_DATA_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(base) = env("XDG_DATA_HOME") {
        return PathBuf::from(base).join("tasktrees");
    }
    let home = env("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    home.join(".local").join("share").join("tasktrees")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| OsString::from(v))
        }
    }

    #[test]
    fn explicit_dir_wins() {
        let env = env_of(&[("TT_DATA_DIR", "/env")]);
        assert_eq!(
            resolve_data_dir(Some(Path::new("/flag")), env),
            PathBuf::from("/flag")
        );
    }

    #[test]
    fn env_fallback_order() {
        let env = env_of(&[("TT_DATA_DIR", "/tt"), ("XDG_DATA_HOME", "/xdg")]);
        assert_eq!(resolve_data_dir(None, env), PathBuf::from("/tt"));

        let env = env_of(&[("XDG_DATA_HOME", "/xdg"), ("HOME", "/home/u")]);
        assert_eq!(resolve_data_dir(None, env), PathBuf::from("/xdg/tasktrees"));

        let env = env_of(&[("HOME", "/home/u")]);
        assert_eq!(
            resolve_data_dir(None, env),
            PathBuf::from("/home/u/.local/share/tasktrees")
        );
    }
}
