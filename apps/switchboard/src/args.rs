use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(version, about = "Local coordination daemon for agents sharing a project", long_about = None, bin_name = "switchboard")]
pub struct Cli {
  #[command(subcommand)]
  pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
  /// Run the daemon in the foreground until shutdown or Ctrl-C
  Run(RunArgs),
}

#[derive(Debug, ClapArgs)]
pub struct RunArgs {
  /// Project root; state lives in <root>/.switchboard (defaults to the current directory)
  #[arg(long)]
  pub root: Option<PathBuf>,
  /// Socket path, overriding the config file
  #[arg(long)]
  pub socket: Option<PathBuf>,
}
