//! Command-line argument parsing for lexigen.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// An LLM-driven glossary builder for text corpora.
#[derive(Parser, Debug)]
#[command(name = "lexigen")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Root directory holding per-project databases
    #[arg(long, value_name = "DIR")]
    pub projects_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP API server
    Serve {
        /// Bind address (overrides config)
        #[arg(long, value_name = "IP:PORT")]
        addr: Option<String>,
    },

    /// Execute a pipeline run against a project and wait for it
    Run {
        /// Project name
        #[arg(long, value_name = "NAME")]
        project: String,

        /// Run scope: full, extract, from_terms, or provisional_to_refined
        #[arg(long, value_name = "SCOPE")]
        scope: String,

        /// Load documents from this directory when the project has none
        #[arg(long, value_name = "DIR")]
        doc_root: Option<PathBuf>,
    },

    /// Manage the project catalog
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Register a new project
    Add {
        /// Project name (also the database directory name)
        name: String,

        /// Document root for CLI-mode loading
        #[arg(long, value_name = "DIR", default_value = "")]
        doc_root: String,

        /// LLM provider: ollama, openai, or mock
        #[arg(long, default_value = "ollama")]
        provider: String,

        /// LLM model name
        #[arg(long, default_value = "")]
        model: String,

        /// LLM base URL (empty for the provider default)
        #[arg(long, default_value = "")]
        base_url: String,
    },

    /// List registered projects
    List,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::Config::default_path)
    }
}
