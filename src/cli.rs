use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "neon-stream", version, about = "Neon Stream movie API server")]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config.yaml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the HTTP API server (default).
    Serve,
    /// Create database tables and exit.
    Migrate,
    /// Insert the demo movie catalogue.
    Seed,
    /// Exit 0 when a Drive token is stored, 1 otherwise.
    CheckToken,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["neon-stream"]).expect("parse");
        assert_eq!(cli.command(), Command::Serve);
    }

    #[test]
    fn subcommands_and_config_parse() {
        let cli = Cli::try_parse_from(["neon-stream", "--config", "prod.yaml", "check-token"])
            .expect("parse");
        assert_eq!(cli.command(), Command::CheckToken);
        assert_eq!(cli.config.to_str(), Some("prod.yaml"));
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["neon-stream", "seed", "-c", "dev.yaml"]).expect("parse");
        assert_eq!(cli.command(), Command::Seed);
        assert_eq!(cli.config.to_str(), Some("dev.yaml"));
    }
}
