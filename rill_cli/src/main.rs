//! Rill compiler command-line interface
//!
//! `rillc <file> --lex | --ast | --iloc | -S`

use anyhow::Result;
use clap::{ArgGroup, Parser};
use rill_cli::driver::{self, Mode};
use std::path::PathBuf;
use std::process;

/// The Rill language compiler
#[derive(Parser)]
#[command(name = "rillc")]
#[command(about = "Compiles Rill source files to AArch64 assembly")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(group(ArgGroup::new("mode").required(true)))]
struct Cli {
    /// Source file to compile
    input: PathBuf,

    /// Print the token table
    #[arg(long, group = "mode")]
    lex: bool,

    /// Parse and print the reconstructed source
    #[arg(long, group = "mode")]
    ast: bool,

    /// Lower and print the IR listing
    #[arg(long, group = "mode")]
    iloc: bool,

    /// Emit AArch64 assembly next to the input file's stem
    #[arg(short = 'S', group = "mode")]
    assembly: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress output
    #[arg(short, long, global = true)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if cli.quiet {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let mode = if cli.lex {
        Mode::Lex
    } else if cli.ast {
        Mode::Ast
    } else if cli.iloc {
        Mode::Iloc
    } else {
        Mode::Assembly
    };

    let succeeded = driver::run(&cli.input, mode)?;
    if !succeeded {
        process::exit(1);
    }
    Ok(())
}
