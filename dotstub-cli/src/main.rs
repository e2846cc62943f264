mod app;
mod commands;
mod output;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use crate::{app::Cli, commands::strip::StripOptions};

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .context("failed to set Ctrl+C handler")?;

    let cli = Cli::parse();

    // Show dotstub info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("dotstub", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    if cli.version {
        eprintln!("dotstub version {}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    let Some((output_dir, inputs)) = cli.paths.split_last() else {
        eprintln!("error: Not enough arguments");
        return Ok(ExitCode::FAILURE);
    };
    if inputs.is_empty() {
        eprintln!("error: Not enough arguments");
        return Ok(ExitCode::FAILURE);
    }

    let opts = StripOptions {
        config: cli.strip_config(),
        search_dirs: &cli.search_dirs,
        global: &cli.global,
    };
    let succeeded = commands::strip::run(inputs, output_dir, &opts)?;

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
