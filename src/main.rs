mod chezmoi;
mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod prompt;
mod runner;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, ConfigCommand};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        Command::Sync(args) => commands::sync::run(&ctx, args),
        Command::Merge(args) => commands::merge::run(&ctx, args),
        Command::Status(args) => commands::status::run(&ctx, args),
        Command::Check => commands::check::run(&ctx),
        Command::Config(cmd) => match cmd {
            ConfigCommand::Show => commands::config::show(&ctx),
            ConfigCommand::Init { repo, force } => {
                commands::config::init(&ctx, repo.as_deref(), force)
            }
        },
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "dotmerge", &mut io::stdout());
            Ok(())
        }
    }
}
