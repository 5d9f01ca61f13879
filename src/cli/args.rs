//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

/// Referral graph maintenance: commissions, integrity analysis and repair
#[derive(Parser, Debug)]
#[command(name = "sponsorgraph")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-d info, -dd debug, -ddd trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub debug: u8,

    /// Graph JSON file (overrides store_path from config)
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub store: Option<PathBuf>,

    /// Directory holding the local .sponsorgraph.toml (default: cwd)
    #[arg(short = 'C', long, global = true, value_hint = ValueHint::DirPath)]
    pub dir: Option<PathBuf>,

    /// Skip confirmation prompts
    #[arg(short, long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List integrity issues, most severe first
    Analyze,

    /// Suggest a sponsor for a node from its invitation code
    Suggest {
        /// Node id
        id: String,
    },

    /// Fix one issue by its number from `analyze`
    Fix {
        /// 1-based issue number
        issue: usize,
    },

    /// Fix all issues that are safe to fix unattended
    #[command(name = "fix-batch")]
    FixBatch,

    /// Rename a node id and rewrite every reference to it
    Rename {
        /// Current id
        old: String,
        /// New id
        new: String,
    },

    /// Show a node's sponsor chain
    Upline {
        /// Node id
        id: String,
        /// Maximum number of ancestors (1..=5)
        #[arg(long, default_value_t = 3)]
        depth: usize,
    },

    /// Compute price and commission payouts for an order
    Quote {
        /// Buyer node id
        buyer: String,
        /// Product SKU (default: commission.default_sku)
        sku: Option<String>,
    },

    /// Show a node's downline as a tree
    Tree {
        /// Node id
        id: String,
        /// Maximum depth below the node
        #[arg(long, default_value_t = 3)]
        depth: usize,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Create config template
    Init {
        /// Create global config
        #[arg(short, long)]
        global: bool,
    },

    /// Show config paths
    Path,
}
