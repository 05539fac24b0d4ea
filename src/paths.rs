//! Path resolution for dotmerge
//!
//! # Environment Variables
//!
//! - `DOTMERGE_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/dotmerge`)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `DOTMERGE_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/dotmerge` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\dotmerge`
//!    - macOS/Linux: `~/.config/dotmerge`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "DOTMERGE_CONFIG_DIR";

/// Get the dotmerge config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("dotmerge");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join("dotmerge");
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("dotmerge");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Directory name a repository URL is cloned into.
///
/// `git@github.com:me/dotfiles.git` and `https://host/me/dotfiles/` both
/// give `dotfiles`.
pub fn repo_name(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

/// Render `path` relative to `root` when possible
pub fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

// ============================================================================
// Tests
// ============================================================================
