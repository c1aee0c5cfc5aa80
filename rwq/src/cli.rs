//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// rwq - read/write aware request queue
#[derive(Parser)]
#[command(
    name = "rwq",
    about = "Replay requests through a read/write aware queue",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit every request in a script and print the responses
    Run {
        /// YAML script with a `requests` list
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,

        /// Retries after connectivity is lost before giving up
        #[arg(short, long, default_value_t = 3)]
        retries: u32,

        /// Delay before each retry in milliseconds
        #[arg(long = "retry-delay-ms", default_value_t = 1000)]
        retry_delay_ms: u64,
    },

    /// Print the effective configuration
    CheckConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from(["rwq", "-l", "debug", "run", "script.yml", "--retries", "5"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Run {
                script,
                retries,
                retry_delay_ms,
            } => {
                assert_eq!(script, PathBuf::from("script.yml"));
                assert_eq!(retries, 5);
                assert_eq!(retry_delay_ms, 1000);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_check_config_with_global_config() {
        let cli = Cli::parse_from(["rwq", "check-config", "--config", "x.yml"]);
        assert_eq!(cli.config, Some(PathBuf::from("x.yml")));
        assert!(matches!(cli.command, Command::CheckConfig));
    }
}
