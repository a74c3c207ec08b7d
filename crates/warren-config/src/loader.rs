//! Layered configuration loading.
//!
//! A manager's configuration is assembled from a stack of TOML layers,
//! lowest precedence first:
//!
//! 1. built-in defaults ([`WarrenConfig::default`])
//! 2. the operator's user file (`~/.config/warren/config.toml`)
//! 3. the cluster's project file (`warren.toml`)
//! 4. machine-local overrides (`warren.local.toml`, gitignored)
//! 5. `WARREN_*` environment variables (`__` separates nesting, e.g.
//!    `WARREN_CLUSTER__ELECTION_TIMEOUT_MS=500`)
//!
//! Each file layer is read and syntax-checked here, individually, so a
//! broken layer is reported by path instead of as an opaque merge
//! failure; the `config` crate then merges the surviving layers with
//! the env overlay. The loaded result is validated before it is handed
//! out — a config that deserializes but cannot run a cluster is
//! rejected at the same boundary.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::{ConfigError, WarrenConfig};

const PROJECT_FILE: &str = "warren.toml";
const LOCAL_FILE: &str = "warren.local.toml";
const ENV_PREFIX: &str = "WARREN";
const ENV_SEPARATOR: &str = "__";

/// Assembles a [`WarrenConfig`] from the layer stack rooted at a
/// project directory.
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    /// A loader rooted at the current directory.
    pub fn new() -> Self {
        Self {
            project_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Roots the project and local layers (and relative-path
    /// resolution) at `dir` instead.
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Overrides the environment prefix, mainly so tests can isolate
    /// themselves from a real `WARREN_*` environment.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Loads, merges, resolves, and validates the configuration.
    pub fn load(self) -> Result<WarrenConfig, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&WarrenConfig::default())?);

        for path in self.layers() {
            let Some(text) = read_layer(&path)? else {
                continue;
            };
            // Syntax-check the layer on its own; a typo in
            // warren.local.toml should be reported as exactly that.
            if let Err(source) = text.parse::<toml::Table>() {
                return Err(ConfigError::Parse { path, source });
            }
            builder = builder.add_source(config::File::from_str(
                &text,
                config::FileFormat::Toml,
            ));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let mut loaded: WarrenConfig = builder.build()?.try_deserialize()?;
        loaded.resolve_paths(&self.project_dir);
        loaded.validate()?;
        Ok(loaded)
    }

    /// Loads the configuration, falling back to defaults when no layer
    /// resolves (fresh checkout, no files, no env).
    pub fn load_or_default(self) -> WarrenConfig {
        self.load().unwrap_or_default()
    }

    /// The file layers in merge order (user, then project, then local).
    fn layers(&self) -> Vec<PathBuf> {
        let mut layers = Vec::with_capacity(3);
        layers.extend(user_config_file());
        layers.push(self.project_dir.join(PROJECT_FILE));
        layers.push(self.project_dir.join(LOCAL_FILE));
        layers
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads one layer. Absent files are a normal part of the stack;
/// anything else wrong with the file is surfaced with its path.
fn read_layer(path: &Path) -> Result<Option<String>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// XDG-discovered user config file, if the platform has a home.
fn user_config_file() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "Warren", "warren")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
