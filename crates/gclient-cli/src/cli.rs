//! Command-line interface argument parsing and definitions
//!
//! This module defines the CLI structure using clap's derive API.

use clap::{Args, Parser, Subcommand, ValueEnum};
use is_terminal::IsTerminal;
use std::path::PathBuf;

/// gclient - authenticated requests against configured service APIs
///
/// Builds a client from a service profile (base API, default headers, token
/// exchange and TLS settings) and issues GET or POST requests through it.
#[derive(Parser, Debug)]
#[command(
    name = "gclient",
    version,
    author,
    about,
    long_about = None,
    propagate_version = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Enable verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "GCLIENT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Directory holding `<service>.json` profiles
    #[arg(long, global = true, env = "GCLIENT_PROFILES_DIR")]
    pub profiles_dir: Option<PathBuf>,

    /// Forward proxy for both HTTP and HTTPS traffic
    #[arg(long, global = true, env = "GCLIENT_PROXY")]
    pub proxy: Option<String>,

    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a GET request to a service
    Get(RequestArgs),

    /// Send a POST request to a service
    Post(PostArgs),

    /// Inspect the available service profiles
    Profiles(ProfilesArgs),

    /// Generate shell completions for the specified shell
    Completions(CompletionsArgs),
}

/// Arguments shared by every request command
#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// Service profile name
    #[arg(value_name = "SERVICE")]
    pub service: String,

    /// Endpoint path appended to the profile's base API
    #[arg(value_name = "ENDPOINT")]
    pub endpoint: String,

    /// Extra request header, as `Name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    pub headers: Vec<String>,

    /// Query parameter, as `key=value` (repeatable)
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Show the response status and headers as well as the body
    #[arg(short, long)]
    pub include: bool,

    /// Exit with an error when the response status is not 2xx
    #[arg(short, long)]
    pub fail: bool,
}

/// Arguments for the post command
#[derive(Args, Debug, Clone)]
pub struct PostArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Form field, as `key=value` (repeatable)
    #[arg(long = "form", value_name = "KEY=VALUE", conflicts_with = "json")]
    pub form: Vec<String>,

    /// JSON request body
    #[arg(long, value_name = "JSON")]
    pub json: Option<String>,
}

/// Arguments for the profiles command
#[derive(Parser, Debug)]
pub struct ProfilesArgs {
    #[command(subcommand)]
    pub action: ProfilesAction,
}

/// Profile inspection actions
#[derive(Subcommand, Debug)]
pub enum ProfilesAction {
    /// List available profiles
    List,

    /// Show one profile with secrets masked
    Show {
        /// Service profile name
        service: String,
    },
}

/// Arguments for generating shell completions
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Output format options
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable formatted output
    Human,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
    /// Pretty-printed JSON output
    JsonPretty,
}

impl OutputFormat {
    /// Parse a format name as written in the configuration file
    pub fn from_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name, true).ok()
    }
}

/// Supported shells for completion generation
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective verbosity level (considering quiet flag)
    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }

    /// Check if colored output should be used
    pub fn use_color(&self) -> bool {
        !self.no_color && std::io::stdout().is_terminal()
    }
}

impl Shell {
    /// Convert to clap_complete shell type
    pub fn to_clap_shell(self) -> clap_complete::Shell {
        match self {
            Shell::Bash => clap_complete::Shell::Bash,
            Shell::Zsh => clap_complete::Shell::Zsh,
            Shell::Fish => clap_complete::Shell::Fish,
            Shell::PowerShell => clap_complete::Shell::PowerShell,
            Shell::Elvish => clap_complete::Shell::Elvish,
        }
    }
}
