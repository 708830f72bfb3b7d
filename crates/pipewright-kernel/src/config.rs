//! Engine configuration.
//!
//! Loaded from `~/.config/pipewright/engine.toml` (or the platform
//! equivalent) when present, otherwise defaults. Every field is optional in
//! the file:
//!
//! ```toml
//! shell = "/bin/bash"
//! shell_flag = "-c"
//! pipe_capacity = 131072
//! default_input = "null"
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::io::InputMode;
use crate::scheduler::DEFAULT_PIPE_CAPACITY;

/// Settings shared by every stage of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Shell used to run external stages.
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Flag that makes `shell` run its next argument as a command string.
    #[serde(default = "default_shell_flag")]
    pub shell_flag: String,

    /// Capacity in bytes of the in-process pipe after each filter.
    #[serde(default = "default_pipe_capacity")]
    pub pipe_capacity: usize,

    /// Input given to the head stage by `Chain::execute`.
    #[serde(default)]
    pub default_input: InputMode,
}

#[cfg(unix)]
fn default_shell() -> String {
    "/bin/sh".to_string()
}

#[cfg(not(unix))]
fn default_shell() -> String {
    "cmd".to_string()
}

#[cfg(unix)]
fn default_shell_flag() -> String {
    "-c".to_string()
}

#[cfg(not(unix))]
fn default_shell_flag() -> String {
    "/C".to_string()
}

fn default_pipe_capacity() -> usize {
    DEFAULT_PIPE_CAPACITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            shell_flag: default_shell_flag(),
            pipe_capacity: default_pipe_capacity(),
            default_input: InputMode::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default path.
    ///
    /// Returns the defaults if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// The default config file path.
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "pipewright").ok_or_else(|| {
            PipelineError::Config("could not determine config directory".to_string())
        })?;

        Ok(dirs.config_dir().join("engine.toml"))
    }

    /// Set the shell program and its command flag.
    pub fn with_shell(mut self, shell: impl Into<String>, flag: impl Into<String>) -> Self {
        self.shell = shell.into();
        self.shell_flag = flag.into();
        self
    }

    /// Set the in-process pipe capacity.
    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity;
        self
    }

    /// Set the input `Chain::execute` gives the head stage.
    pub fn with_default_input(mut self, mode: InputMode) -> Self {
        self.default_input = mode;
        self
    }
}
