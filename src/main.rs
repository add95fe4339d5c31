// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;
mod interactive;
mod render;

use std::io;
use std::pin::pin;

use anyhow::Context;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use clap::Parser;
use render::{report, Renderer};
use seeker_core::{Outcome, SessionController, SessionEvent, SessionOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if let Some(Commands::Completions { shell }) = &cli.command {
        cli::print_completions(*shell);
        return Ok(());
    }

    let mut config = seeker_config::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);

    if let Some(Commands::ShowConfig) = &cli.command {
        println!("{}", toml::to_string(&config).context("serializing configuration")?);
        return Ok(());
    }

    let services = seeker_model::from_config(&config.service)
        .context("setting up answer and image services")?;
    let options = SessionOptions::from_config(&config);
    let (controller, events) = SessionController::new(services.answers, services.images, options);

    match cli.command {
        Some(Commands::Ask { query }) => run_ask(controller, events, query.join(" ")).await,
        _ => {
            let input = BufReader::new(tokio::io::stdin());
            let interrupts = interactive::ctrl_c_interrupts();
            interactive::run(controller, events, input, io::stdout().lock(), interrupts).await?;
            Ok(())
        }
    }
}

/// One question, one answer.  Exits with an error unless the answer
/// completed.
async fn run_ask(
    controller: SessionController,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    query: String,
) -> anyhow::Result<()> {
    let mut renderer = Renderer::new(io::stdout().lock());
    let mut snapshots = controller.subscribe();
    let handle = controller.submit(query);
    let mut wait = pin!(handle.wait());

    let outcome = loop {
        tokio::select! {
            biased;
            outcome = &mut wait => break outcome,
            Ok(()) = snapshots.changed() => {
                let snapshot = snapshots.borrow_and_update().clone();
                renderer.render(&snapshot)?;
            }
        }
    };
    renderer.render(&snapshots.borrow_and_update().clone())?;

    while let Ok(event) = events.try_recv() {
        report(&event);
    }

    match outcome {
        Outcome::Finalized => Ok(()),
        Outcome::Aborted => anyhow::bail!("the answer was cancelled"),
        Outcome::Failed(e) => Err(anyhow::Error::new(e).context("no answer")),
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
