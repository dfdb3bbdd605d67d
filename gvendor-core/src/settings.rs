//! User-level settings at `~/.gvendor/settings.yaml`.
//!
//! Every field is optional on disk; a missing file yields defaults.
//! CLI flags override whatever is loaded here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

/// Default hook timeout: long enough for a downstream build step.
pub const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 300;

/// Hard ceiling on parallel sync workers.
pub const MAX_WORKERS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Parallel worker count; `None` means available parallelism.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    pub hook_timeout_secs: u64,
    /// Log every git and hook command line.
    pub verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: None,
            hook_timeout_secs: DEFAULT_HOOK_TIMEOUT_SECS,
            verbose: false,
        }
    }
}

impl Settings {
    pub fn hook_timeout(&self) -> Duration {
        Duration::from_secs(self.hook_timeout_secs)
    }

    /// Resolve the worker count: explicit value, else available parallelism,
    /// always clamped to `1..=MAX_WORKERS`.
    pub fn worker_count(&self, requested: Option<usize>) -> usize {
        let n = requested.or(self.workers).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        n.clamp(1, MAX_WORKERS)
    }
}

/// `<home>/.gvendor/settings.yaml`: pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    home.join(".gvendor").join("settings.yaml")
}

/// Load settings rooted at `home`; defaults when the file is absent.
pub fn load_at(home: &Path) -> Result<Settings, ConfigError> {
    let path = settings_path_at(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper: uses `dirs::home_dir()`.
pub fn load() -> Result<Settings, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
    load_at(&home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_missing() {
        let home = TempDir::new().unwrap();
        let settings = load_at(home.path()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.hook_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let home = TempDir::new().unwrap();
        let path = settings_path_at(home.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "workers: 3\n").unwrap();

        let settings = load_at(home.path()).unwrap();
        assert_eq!(settings.workers, Some(3));
        assert_eq!(settings.hook_timeout_secs, DEFAULT_HOOK_TIMEOUT_SECS);
        assert!(!settings.verbose);
    }

    #[test]
    fn malformed_file_reports_path() {
        let home = TempDir::new().unwrap();
        let path = settings_path_at(home.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "workers: [unclosed").unwrap();

        let err = load_at(home.path()).unwrap_err();
        assert!(err.to_string().contains("settings.yaml"), "got: {err}");
    }

    #[rstest]
    #[case(Some(0), 1)]
    #[case(Some(4), 4)]
    #[case(Some(64), MAX_WORKERS)]
    fn worker_count_is_clamped(#[case] requested: Option<usize>, #[case] expected: usize) {
        assert_eq!(Settings::default().worker_count(requested), expected);
    }
}
