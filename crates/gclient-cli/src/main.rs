//! gclient - command-line front end for gclient-core
//!
//! Loads the CLI configuration, sets up logging and dispatches the
//! `get`, `post`, `profiles` and `completions` subcommands.

mod cli;
mod config;
mod error;
mod handlers;
mod logging;
mod output;

use cli::{Cli, Commands, OutputFormat};
use colored::control;
use config::Config;
use error::Result;
use handlers::Context;
use logging::{timing::Timer, LoggingConfig};
use output::OutputWriter;
use std::process;
use tracing::instrument;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    // Logging depends on the config file, so a bad file is reported on stderr directly
    let config = match Config::load_with_file(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => exit_with(&e, cli.use_color()),
    };

    let use_color = cli.use_color() && config.output.color;
    control::set_override(use_color);

    if let Err(e) = init_logging(&cli, &config) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(cli, config).await {
        Ok(()) => process::exit(0),
        Err(e) => exit_with(&e, use_color),
    }
}

fn exit_with(e: &error::Error, use_color: bool) -> ! {
    eprintln!("{}", error::format_error(e, use_color));
    if e.should_show_help() {
        eprintln!("\nFor more information, try '--help'");
    }
    process::exit(e.exit_code());
}

#[instrument(skip_all, fields(command = ?cli.command))]
async fn run(cli: Cli, config: Config) -> Result<()> {
    let _timer = Timer::new("cli_execution");

    let format = output_format(&cli, &config);
    let mut output = OutputWriter::new(format, control::SHOULD_COLORIZE.should_colorize(), cli.quiet);

    let context = Context {
        profiles_dir: config.resolve_profiles_dir(cli.profiles_dir.as_deref()),
        proxy: config.resolve_proxy(cli.proxy.as_deref()).map(str::to_string),
    };

    tracing::info!(
        verbosity = cli.verbosity_level(),
        profiles_dir = %context.profiles_dir.display(),
        "Executing command"
    );

    match cli.command {
        Commands::Get(args) => handlers::handle_get(args, &context, &mut output).await,
        Commands::Post(args) => handlers::handle_post(args, &context, &mut output).await,
        Commands::Profiles(args) => handlers::handle_profiles(args, &context, &mut output),
        Commands::Completions(args) => handlers::handle_completions(args),
    }
}

/// `--output` wins, then the config file, then human output
fn output_format(cli: &Cli, config: &Config) -> OutputFormat {
    cli.output
        .or_else(|| OutputFormat::from_name(&config.output.format))
        .unwrap_or(OutputFormat::Human)
}

fn init_logging(cli: &Cli, config: &Config) -> Result<()> {
    let verbosity = cli.verbosity_level();
    let mut logging_config = LoggingConfig::from_verbosity(verbosity);
    logging_config.merge_with_file(&config.logging, verbosity);
    logging_config.merge_with_env();

    if cli.quiet {
        logging_config.level = "error".to_string();
        logging_config.console = false;
    }

    logging::init_logging(logging_config)
}
