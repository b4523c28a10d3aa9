//! `berth config` - inspect configuration

use anyhow::Result;
use std::path::Path;

use crate::cli::ConfigCommand;
use crate::config::BerthConfig;
use crate::ui;

pub fn run(cmd: ConfigCommand, path: &Path, config: &BerthConfig) -> Result<()> {
    match cmd {
        ConfigCommand::Show => show(path, config),
        ConfigCommand::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn show(path: &Path, config: &BerthConfig) -> Result<()> {
    ui::header("Configuration");

    println!();
    let note = if path.exists() { "" } else { " (not found, using defaults)" };
    ui::kv("Config file", &format!("{}{note}", path.display()));
    ui::kv("State directory", &config.state_dir().display().to_string());
    println!();

    print!("{}", config.to_toml()?);
    Ok(())
}
