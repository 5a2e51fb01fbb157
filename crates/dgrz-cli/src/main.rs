use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use dgrz_types::DgrzError;

mod cli;
mod commands;

fn main() -> ExitCode {
    // Usage errors exit with status 2 from inside `parse`.
    let cli = cli::Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    match commands::run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::from(1)
        }
    }
}

fn report(err: &anyhow::Error) {
    match err.downcast_ref::<DgrzError>() {
        Some(e) => {
            eprintln!("{}", e.to_string().red().bold());
            for (key, value) in e.context() {
                eprintln!("  {}: {}", key.dimmed(), value);
            }
        }
        None => eprintln!("{} {err:#}", "error:".red().bold()),
    }
}
