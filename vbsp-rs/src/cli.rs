//! Root CLI structure for vbsp-rs

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vbsp-rs")]
#[command(about = "Command-line tools for Source engine VBSP maps", long_about = None)]
#[command(version)]
#[command(author)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl Cli {
    /// Default log filter for the requested verbosity
    ///
    /// `RUST_LOG` still takes precedence when set.
    pub fn log_filter(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "info",
            (false, 2) => "debug",
            (false, _) => "trace",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// VBSP map operations
    Bsp {
        #[command(subcommand)]
        command: crate::commands::bsp::BspCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_for(args: &[&str]) -> &'static str {
        let mut argv = vec!["vbsp-rs"];
        argv.extend_from_slice(args);
        argv.extend_from_slice(&["completions", "bash"]);
        Cli::parse_from(argv).log_filter()
    }

    #[test]
    fn test_log_filter_follows_verbosity() {
        assert_eq!(filter_for(&[]), "warn");
        assert_eq!(filter_for(&["-v"]), "info");
        assert_eq!(filter_for(&["-vv"]), "debug");
        assert_eq!(filter_for(&["-vvvv"]), "trace");
        assert_eq!(filter_for(&["-q"]), "error");
    }
}
