//! Configuration error types.
//!
//! Every variant names the layer or file it came from: a manager that
//! refuses to boot over a config problem has to tell the operator
//! exactly which file (or which merged key) to fix.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config layer exists but could not be read (permissions, not a
    /// regular file). Missing layers are skipped, not errors.
    #[error("cannot read config layer {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A config layer is not valid TOML. Caught per-file, before
    /// merging, so the diagnostic names the broken layer.
    #[error("config layer {path} is not valid TOML: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Merging the layers or deserializing the merged tree failed
    /// (wrong value type for a key, unknown enum value, ...).
    #[error("merged configuration is unusable: {0}")]
    Merge(#[from] config::ConfigError),

    /// The merged configuration is well-formed but semantically wrong
    /// (replica id not in the member table, inverted timeouts, ...).
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
