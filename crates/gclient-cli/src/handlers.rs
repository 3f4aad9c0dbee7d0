//! Command handlers for CLI subcommands
//!
//! This module contains the implementation logic for each CLI subcommand.

mod completions;
mod profiles;
mod request;
mod utils;

pub use completions::handle_completions;
pub use profiles::handle_profiles;
pub use request::{handle_get, handle_post};

use std::path::PathBuf;

/// Settings shared by handlers once flags and the config file are merged
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    pub profiles_dir: PathBuf,
    pub proxy: Option<String>,
}
