use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "build-scout")]
#[command(about = "Discover Blender builds and manage local build metadata")]
#[command(version)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Base directory (default: ~/.build-scout)
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ChannelArg {
    Stable,
    Daily,
    Experimental,
    Patch,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scrape download pages for available builds
    Scrape {
        /// Only scrape these channels (default: all)
        #[arg(short, long = "channel", value_enum)]
        channels: Vec<ChannelArg>,
    },

    /// List builds installed in the library folder
    List,

    /// Show metadata of an installed build (derived and cached on first use)
    Info {
        /// Build directory
        path: PathBuf,

        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mark an installed build as favorite
    Favorite {
        /// Build directory
        path: PathBuf,

        /// Remove the favorite mark instead
        #[arg(long)]
        unset: bool,
    },

    /// Give an installed build a custom name (empty to clear)
    Rename {
        /// Build directory
        path: PathBuf,

        /// New display name
        name: String,
    },

    /// Watch a folder for builds appearing and disappearing
    Watch {
        /// Folder to watch (default: every library subfolder)
        path: Option<PathBuf>,

        /// Seconds between scans (default: watcher.poll_interval_secs)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g., sources.daily)
        key: String,
    },

    /// Set a config value
    Set {
        /// Config key (e.g., watcher.poll_interval_secs)
        key: String,

        /// Value to set (e.g., "5" or "https://mirror.example.com/release/")
        value: String,
    },

    /// List all config values
    List,

    /// Show config file path
    Path,

    /// Initialize config file with defaults
    Init,
}
