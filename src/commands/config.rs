use anyhow::{Context as _, Result, bail};
use std::path::Path;

use crate::Context;
use crate::config::DotmergeConfig;
use crate::paths;
use crate::ui;

pub fn show(_ctx: &Context) -> Result<()> {
    ui::header("Configuration");

    let path = DotmergeConfig::path()?;
    ui::kv("Config directory", &paths::config_dir()?.display().to_string());
    if path.exists() {
        ui::kv("Config file", &path.display().to_string());
    } else {
        ui::kv("Config file", &format!("{} (not present)", path.display()));
    }

    let config = DotmergeConfig::load()?;
    println!();
    let content = toml::to_string_pretty(&config).context("Failed to serialize config")?;
    for line in content.lines() {
        println!("  {line}");
    }

    println!();
    ui::dim(&format!("Editor in effect: {}", config.editor()));
    ui::dim(&format!("Override the directory with {}", paths::ENV_CONFIG_DIR));
    Ok(())
}

pub fn init(_ctx: &Context, repo: Option<&str>, force: bool) -> Result<()> {
    let path = DotmergeConfig::path()?;
    init_at(&path, repo, force)?;
    ui::success(&format!("Wrote {}", path.display()));
    Ok(())
}

fn init_at(path: &Path, repo: Option<&str>, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Config already exists at {}; pass --force to overwrite",
            path.display()
        );
    }

    let config = DotmergeConfig {
        upstream: repo.map(str::to_string),
        ..DotmergeConfig::default()
    };
    config.save_to(path)
}
