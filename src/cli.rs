use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "berth")]
#[command(version)]
#[command(about = "Reconcile declared services across cluster namespaces", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/berth/config.toml)
    #[arg(long, global = true, env = "BERTH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Converge the cluster to the declared state
    Apply(ApplyArgs),

    /// Preview what apply would change
    Diff(DiffArgs),

    /// Show results of the latest pass per namespace
    Status(StatusArgs),

    /// Load and validate a spec without touching the cluster
    Validate {
        /// Spec file or directory
        spec: PathBuf,
    },

    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Spec file or directory
    pub spec: PathBuf,

    /// Only reconcile a namespace or one service (e.g., "web" or "web/flask-app")
    #[arg(short, long)]
    pub target: Option<String>,

    /// Show the plan without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Delete managed services that no spec declares
    #[arg(long)]
    pub prune: bool,

    /// Time budget per namespace pass in seconds (0 disables the limit)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Namespaces reconciled in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Args)]
pub struct DiffArgs {
    /// Spec file or directory
    pub spec: PathBuf,

    /// Only diff a namespace or one service
    #[arg(short, long)]
    pub target: Option<String>,

    /// Include deletes of managed services that no spec declares
    #[arg(long)]
    pub prune: bool,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Only show this namespace
    pub namespace: Option<String>,

    /// Print the stored reports as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Print the config file location
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::parse_from([
            "berth", "-vv", "apply", "apps.toml", "--target", "web/flask-app", "--dry-run",
            "--jobs", "2",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Apply(args) => {
                assert_eq!(args.spec, PathBuf::from("apps.toml"));
                assert_eq!(args.target.as_deref(), Some("web/flask-app"));
                assert!(args.dry_run);
                assert!(!args.prune);
                assert_eq!(args.jobs, Some(2));
                assert_eq!(args.timeout, None);
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_parse_status_namespace() {
        let cli = Cli::parse_from(["berth", "status", "swim", "--json"]);
        match cli.command {
            Command::Status(args) => {
                assert_eq!(args.namespace.as_deref(), Some("swim"));
                assert!(args.json);
            }
            _ => panic!("expected status"),
        }
    }
}
