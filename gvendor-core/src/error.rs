//! Error types for gvendor-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from configuration, lockfile, and settings
/// persistence.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, disk full, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.gvendor/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// `vendor.yml` did not exist at the expected path.
    #[error("vendor config not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// The document parsed but violates a structural rule.
    #[error("invalid vendor config: {reason}")]
    Invalid { reason: String },
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
