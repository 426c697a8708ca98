//! ctfe CLI Binary
//!
//! Evaluates `#[comptime]` functions of a crate at build time and writes the
//! results out as generated Rust source.
//!
//! # Usage
//!
//! ```bash
//! # Evaluate every compile-time call site and write the generated units
//! ctfe generate src/main.rs --out-dir target/ctfe
//!
//! # Report declaration and call-site diagnostics without evaluating
//! ctfe check src/lib.rs
//!
//! # Evaluate a constant expression
//! ctfe eval --expr "vec![1, 2 + 3]" --ty "Vec<u8>"
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use ctfe_cli::{
    cli::load_config,
    commands::{
        self, check::CheckArgs, eval::EvalArgs, generate::GenerateArgs, CommandContext,
    },
    diagnostics::{render_cli_error, setup_error_reporting},
    CliError, Result,
};
use ctfe_core::diagnostics::DiagnosticDisplayOptions;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "ctfe",
    version = env!("CARGO_PKG_VERSION"),
    about = "ctfe: compile-time function evaluation for Rust crates",
    long_about = r#"
ctfe finds functions marked #[comptime], runs them once per distinct set of
literal arguments and emits the results as generated Rust source.

EXAMPLES:
    ctfe generate src/main.rs --out-dir target/ctfe
    ctfe check src/lib.rs
    ctfe eval --expr "6 * 7" --ty i32
    "#
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use multiple times for increased verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Set log level (overrides --verbose/--quiet)
    #[arg(long, global = true, value_enum)]
    log: Option<LogLevel>,

    /// Set log output format
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    log_format: LogFormat,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    directory: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate compile-time call sites and write generated units
    Generate(GenerateArgs),

    /// Report diagnostics for marked functions and their call sites
    Check(CheckArgs),

    /// Evaluate a constant expression and print its literal
    Eval(EvalArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_error_reporting()?;
    setup_logging(cli.verbose, cli.quiet, cli.log, cli.log_format);

    if let Some(dir) = &cli.directory {
        std::env::set_current_dir(dir).map_err(CliError::Io)?;
    }

    let ctx = CommandContext {
        config: load_config(cli.config.as_deref())?,
        display: DiagnosticDisplayOptions::pretty(cli.verbose > 0),
    };

    let result = match cli.command {
        Commands::Generate(args) => commands::generate_command(args, &ctx),
        Commands::Check(args) => commands::check_command(args, &ctx),
        Commands::Eval(args) => commands::eval_command(args, &ctx),
    };

    match result {
        Ok(()) => {
            if cli.verbose > 0 {
                info!("Command completed successfully");
            }
            Ok(())
        }
        Err(e) => {
            if !render_cli_error(&e) {
                error!("{}", e);
            }
            if cli.verbose > 0 {
                error!(?e, "detailed error context");
            }
            std::process::exit(1);
        }
    }
}

fn setup_logging(verbose: u8, quiet: bool, log_level: Option<LogLevel>, log_format: LogFormat) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if let Some(level) = log_level {
        EnvFilter::new(match level {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        })
    } else if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // stdout carries command output
    let formatter = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_level(true);

    match log_format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(formatter)
                .with(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(formatter.json())
                .with(filter)
                .init();
        }
    }
}
