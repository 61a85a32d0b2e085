//! Command line front end for slide_tone.
//!
//! `slide_tone siren` and `slide_tone sweep` are the two programs.  With no other flags either one opens the default
//! output device at 48 kHz mono 32-bit float, plays, and exits with status 0, or logs why the device could not be used
//! and exits with a non-zero status.
mod cli_args;
mod commands;

use std::process::ExitCode;

fn main() -> ExitCode {
    use clap::Parser;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = cli_args::CliArgs::parse();
    ExitCode::from(commands::dispatch_command(args))
}
