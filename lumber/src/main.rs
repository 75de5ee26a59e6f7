//! The lumber CLI.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use lumber_operator::config::BuildContext;
use lumber_pipeline::{PluginRegistry, load_config};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "lumber", version, about = "A pipeline-based log agent")]
struct Cli {
    /// Path to the pipeline configuration file.
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Directory holding custom operator templates.
    #[arg(long, global = true)]
    plugin_dir: Option<PathBuf>,

    /// Log at debug verbosity.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a DOT representation of the operator graph and exit.
    Graph,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Graph => run_graph(&cli),
    }
}

/// Build the configured pipeline and write its DOT graph to stdout.
fn run_graph(cli: &Cli) -> ExitCode {
    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let plugins = match &cli.plugin_dir {
        Some(dir) => match PluginRegistry::load_dir(dir) {
            Ok(plugins) => plugins,
            Err(err) => {
                error!(error = %err, "failed to load custom templates");
                return ExitCode::FAILURE;
            }
        },
        None => PluginRegistry::new(),
    };

    let registry = match lumber::default_registry() {
        Ok(registry) => registry,
        Err(err) => {
            error!(error = %err, "failed to assemble the builtin registry");
            return ExitCode::FAILURE;
        }
    };

    let pipeline = match config.build_pipeline(&registry, &plugins, &BuildContext::new()) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            error!(error = %err, "failed to build the pipeline");
            return ExitCode::FAILURE;
        }
    };

    print!("{}", pipeline.marshal_dot());
    ExitCode::SUCCESS
}
