mod cli;
mod commands;
mod config;
mod display;
mod progress;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use converge::ExitStatus;
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let status = match run(cli) {
        Ok(status) => status,
        Err(err) => {
            ui::error(&format!("{err:#}"));
            exit_status_for(&err)
        }
    };

    std::process::exit(status.code());
}

fn run(cli: Cli) -> Result<ExitStatus> {
    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    let config_path = config::config_path(cli.config.as_deref())?;
    let config = config::BerthConfig::load(&config_path)?;

    match cli.command {
        Command::Apply(args) => commands::apply::run(&ctx, &config, args),
        Command::Diff(args) => commands::diff::run(&config, args),
        Command::Status(args) => commands::status::run(&ctx, &config, &args),
        Command::Validate { spec } => commands::validate::run(&spec),
        Command::Config(cmd) => {
            commands::config::run(cmd, &config_path, &config)?;
            Ok(ExitStatus::Success)
        }
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "berth", &mut io::stdout());
            Ok(ExitStatus::Success)
        }
    }
}

/// Invalid specs exit with 2, every other failure with 1
fn exit_status_for(err: &anyhow::Error) -> ExitStatus {
    let invalid = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<converge::Error>())
        .any(converge::Error::is_invalid_spec);
    if invalid {
        ExitStatus::InvalidSpec
    } else {
        ExitStatus::ActionsFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_exit_status_for_invalid_spec() {
        let err = anyhow::Error::new(converge::Error::SourceNotFound(PathBuf::from("x.toml")))
            .context("loading specs");
        assert_eq!(exit_status_for(&err), ExitStatus::InvalidSpec);

        let err = anyhow::anyhow!("kubectl went away");
        assert_eq!(exit_status_for(&err), ExitStatus::ActionsFailed);
    }
}
