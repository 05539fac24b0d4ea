use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use crate::config::MergeTool;

#[derive(Parser)]
#[command(name = "dotmerge")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Track an upstream dotfiles repo and reconcile it into your chezmoi source", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Import the upstream snapshot into the comparison branch and reconcile
    Sync(SyncArgs),

    /// Reconcile against an already imported comparison branch
    Merge(MergeArgs),

    /// Show what changed upstream without touching anything
    Status(StatusArgs),

    /// Run health checks
    Check,

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Where the upstream lives and where it is imported to
#[derive(Args, Debug, Clone, Default)]
pub struct UpstreamArgs {
    /// Upstream repository URL (defaults to `upstream` in config)
    #[arg(short, long, env = "DOTMERGE_UPSTREAM")]
    pub repo: Option<String>,

    /// Subdirectory of the upstream repository holding the dotfiles
    #[arg(short, long)]
    pub path: Option<String>,

    /// Comparison branch name
    #[arg(short, long)]
    pub branch: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub upstream: UpstreamArgs,

    /// Don't push the comparison branch
    #[arg(long)]
    pub no_push: bool,

    /// Resolve conflicts without asking for confirmation first
    #[arg(short, long)]
    pub yes: bool,

    /// Three-way merge implementation
    #[arg(long, value_enum)]
    pub merge_tool: Option<MergeTool>,
}

#[derive(Args, Debug, Clone)]
pub struct MergeArgs {
    #[command(flatten)]
    pub upstream: UpstreamArgs,

    /// Resolve conflicts without asking for confirmation first
    #[arg(short, long)]
    pub yes: bool,

    /// Three-way merge implementation
    #[arg(long, value_enum)]
    pub merge_tool: Option<MergeTool>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub upstream: UpstreamArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration and where it is read from
    Show,

    /// Write a config file with default values
    Init {
        /// Upstream repository URL to record
        #[arg(short, long)]
        repo: Option<String>,

        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },
}
