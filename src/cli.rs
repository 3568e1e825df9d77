// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `nanocas`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "nanocas",
    version,
    about = "Real-time coverage monitoring and alerting for sequencing runs.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the engine settings file (TOML).
    ///
    /// Default: `Nanocas.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `NANOCAS_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Watch a project's source directory until Ctrl-C.
    Watch {
        /// Project id (directory name below the projects root).
        #[arg(long, value_name = "ID")]
        project: String,

        /// Directory the sequencing device writes into.
        #[arg(long, value_name = "DIR")]
        source: PathBuf,
    },

    /// Build the project's reference database, then start watching.
    Build {
        #[arg(long, value_name = "ID")]
        project: String,

        #[arg(long, value_name = "DIR")]
        source: PathBuf,

        /// Sequencing device to notify; defaults to the one in the project
        /// configuration.
        #[arg(long, value_name = "NAME")]
        device: Option<String>,
    },

    /// Validate a project's directory and print a summary.
    Check {
        #[arg(long, value_name = "ID")]
        project: String,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_accepts_global_flags_after_subcommand() {
        let args = CliArgs::try_parse_from([
            "nanocas",
            "build",
            "--project",
            "p1",
            "--source",
            "/data/run1",
            "--config",
            "site.toml",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("site.toml")));
        match args.command {
            Command::Build {
                project, device, ..
            } => {
                assert_eq!(project, "p1");
                assert_eq!(device, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
