use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::paths;

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

// ============================================================================
// Config Schema
// ============================================================================

/// Which three-way merge implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MergeTool {
    /// `git merge-file`
    #[default]
    Git,
    /// In-process line merge
    Builtin,
}

/// dotmerge settings, read from `config.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DotmergeConfig {
    /// Upstream repository URL used when `--repo` is not given
    pub upstream: Option<String>,

    /// Subdirectory of the upstream repository holding the dotfiles
    pub subdir: Option<String>,

    /// Branch the upstream snapshot is imported into
    pub branch: String,

    /// Directory under the source tree holding upstream clones
    pub external_dir: String,

    /// File at the source tree root recording the last synced revision
    pub marker_file: String,

    /// Remote the comparison branch is pushed to
    pub remote: String,

    /// Push the comparison branch after importing
    pub push: bool,

    pub merge_tool: MergeTool,

    /// Editor for conflict markers; falls back to $VISUAL, $EDITOR, nano
    pub editor: Option<String>,

    /// Destination directory passed to `chezmoi import`
    pub destination: String,
}

impl Default for DotmergeConfig {
    fn default() -> Self {
        Self {
            upstream: None,
            subdir: None,
            branch: "compare-external".to_string(),
            external_dir: ".external_sources".to_string(),
            marker_file: ".dotmerge-revision".to_string(),
            remote: "origin".to_string(),
            push: true,
            merge_tool: MergeTool::Git,
            editor: None,
            destination: "~".to_string(),
        }
    }
}

/// Problems with a loaded configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("branch name must not be empty")]
    EmptyBranch,

    #[error("{key} must be a relative path inside the source tree: {value}")]
    EscapingPath { key: &'static str, value: String },

    #[error("{key} must not be empty")]
    Empty { key: &'static str },
}

fn check_relative(key: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Empty { key });
    }
    let path = Path::new(value);
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir));
    if escapes {
        return Err(ConfigError::EscapingPath {
            key,
            value: value.to_string(),
        });
    }
    Ok(())
}

impl DotmergeConfig {
    /// Path of the config file
    pub fn path() -> Result<PathBuf> {
        Ok(paths::config_dir()?.join(CONFIG_FILE))
    }

    /// Load the config, or defaults if the file doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    /// Load the config from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config in {}", path.display()))?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save the config to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.branch.trim().is_empty() {
            return Err(ConfigError::EmptyBranch);
        }
        check_relative("external_dir", &self.external_dir)?;
        check_relative("marker_file", &self.marker_file)?;
        if self.remote.trim().is_empty() {
            return Err(ConfigError::Empty { key: "remote" });
        }
        Ok(())
    }

    /// Editor command for conflict markers
    pub fn editor(&self) -> String {
        pick_editor(
            self.editor.as_deref(),
            std::env::var("VISUAL").ok().as_deref(),
            std::env::var("EDITOR").ok().as_deref(),
        )
    }

    /// Expanded `chezmoi import` destination
    pub fn destination_path(&self) -> PathBuf {
        paths::expand(&self.destination)
    }
}

/// First non-blank of configured, `$VISUAL`, `$EDITOR`, else `nano`
fn pick_editor(configured: Option<&str>, visual: Option<&str>, editor: Option<&str>) -> String {
    [configured, visual, editor]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|e| !e.is_empty())
        .unwrap_or("nano")
        .to_string()
}

// ============================================================================
// Tests
// ============================================================================
