//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - dev: build, start and watch (the default)
//! - tools: list discovered tools

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// devloop - keep a dev server in sync with its source tree
#[derive(Parser, Debug)]
#[command(name = "devloop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build, start the server and rebuild on every change
    Dev(DevArgs),

    /// List the tools discovery would bundle
    Tools(SourceArgs),
}

/// Source tree selection shared by all commands
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Source directory (default: ./src/mastra)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Extra tool directories, comma separated, relative to the working directory
    #[arg(short, long)]
    pub tools_dirs: Option<String>,
}

/// Arguments of the dev session
#[derive(Args, Debug, Clone, Default)]
pub struct DevArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Port for the server
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Initial environment entry written to .env on first run (KEY=VALUE)
    #[arg(short, long, value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,
}

/// Parse `KEY=VALUE`
pub fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dev() {
        let cli = Cli::parse_from([
            "devloop",
            "dev",
            "--port",
            "5000",
            "--dir",
            "app",
            "--tools-dirs",
            "a,b",
            "--env",
            "OPENAI_API_KEY=sk-1",
        ]);
        match cli.command {
            Some(Commands::Dev(args)) => {
                assert_eq!(args.port, Some(5000));
                assert_eq!(args.source.dir, Some(PathBuf::from("app")));
                assert_eq!(args.source.tools_dirs.as_deref(), Some("a,b"));
                assert_eq!(args.env, vec![("OPENAI_API_KEY".to_string(), "sk-1".to_string())]);
            }
            other => panic!("Expected dev command, got {:?}", other),
        }
    }

    #[test]
    fn test_no_subcommand() {
        let cli = Cli::parse_from(["devloop", "--verbose"]);
        assert!(cli.command.is_none());
        assert!(cli.is_verbose());
    }

    #[test]
    fn test_parse_tools() {
        let cli = Cli::parse_from(["devloop", "tools", "-t", "lib/tools"]);
        assert!(matches!(cli.command, Some(Commands::Tools(ref a)) if a.tools_dirs.as_deref() == Some("lib/tools")));
    }

    #[test]
    fn test_parse_env_pair() {
        assert_eq!(parse_env_pair("A=b=c"), Ok(("A".to_string(), "b=c".to_string())));
        assert_eq!(parse_env_pair("A="), Ok(("A".to_string(), String::new())));
        assert!(parse_env_pair("=x").is_err());
        assert!(parse_env_pair("nothing").is_err());
    }
}
