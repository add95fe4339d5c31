// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "seeker",
    about = "Conversational search with streamed answers and image results",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Initial query.  Further queries are read from stdin, one per line;
    /// each new line supersedes the answer still streaming.
    #[arg(value_name = "QUERY")]
    pub query: Option<String>,

    /// Path to config file (merged on top of auto-discovered ones)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Answer server base URL, e.g. "http://localhost:3000"
    #[arg(long, env = "SEEKER_BASE_URL")]
    pub base_url: Option<String>,

    /// Model identifier sent with every request
    #[arg(long, short = 'M', env = "SEEKER_MODEL")]
    pub model: Option<String>,

    /// Service backend ("http" or "mock")
    #[arg(long, env = "SEEKER_PROVIDER")]
    pub provider: Option<String>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask one question, print the answer and exit
    Ask {
        #[arg(value_name = "QUERY", required = true)]
        query: Vec<String>,
    },
    /// Print the effective configuration and exit
    ShowConfig,
    /// Generate shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut seeker_config::Config) {
        if let Some(url) = &self.base_url {
            config.service.base_url = url.clone();
        }
        if let Some(model) = &self.model {
            config.service.model = model.clone();
        }
        if let Some(provider) = &self.provider {
            config.service.provider = provider.clone();
        }
        if let Some(query) = &self.query {
            config.session.initial_query = Some(query.clone());
        }
    }
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "seeker", &mut std::io::stdout());
}
