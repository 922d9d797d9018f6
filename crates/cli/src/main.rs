mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use output::{OutputFormat, print_error};
use packsmith_lib::shell::OutputEncoding;

/// packsmith - build pipeline for content-pack projects
#[derive(Parser)]
#[command(name = "packsmith")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Project directory containing packsmith.json
  #[arg(short, long, global = true, default_value = ".")]
  project: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a build profile and export the packs
  Run {
    /// Profile to run
    #[arg(default_value = packsmith_lib::project::DEFAULT_PROFILE)]
    profile: String,

    /// Shell to run hooks with instead of the host default
    #[arg(long)]
    shell: Option<String>,

    /// Encoding of shell output without a byte-order mark
    #[arg(long, default_value = "auto")]
    encoding: OutputEncoding,

    /// Export the packs even when a filter fails
    #[arg(long)]
    partial_export: bool,

    /// Skip the export stage
    #[arg(long)]
    no_export: bool,

    /// Cancel the run after this long (e.g. "10m", "90s")
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Show host OS and shell information
  Info {
    /// Shell override to resolve
    #[arg(long)]
    shell: Option<String>,
  },

  /// List the profiles of the project
  Profiles {
    /// Output format
    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "info" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .compact()
    .init();

  let result = match cli.command {
    Commands::Run {
      profile,
      shell,
      encoding,
      partial_export,
      no_export,
      timeout,
      output,
    } => cmd::cmd_run(cmd::RunArgs {
      project: cli.project,
      profile,
      shell,
      encoding,
      partial_export,
      export: !no_export,
      timeout,
      output,
    }),
    Commands::Info { shell } => {
      cmd::cmd_info(shell.as_deref());
      Ok(())
    }
    Commands::Profiles { output } => cmd::cmd_profiles(&cli.project, output),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}
