/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

mod config;

use crate::config::{Config, Overrides};
use anyhow::{Context, Result};
use clap::Parser;
use fleet_orchestrator::{Collaborators, Orchestrator, RunConfig, ShellExecutor};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fleet-bench")]
#[command(about = "Run one distributed load test across a fleet of hosts")]
struct Cli {
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    #[command(flatten)]
    overrides: Overrides,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = match load_run_config(&cli) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("fleet-bench: {error:#}");
            return ExitCode::from(1);
        }
    };

    info!(
        servers = config.servers().len(),
        drivers = config.drivers().len(),
        controller = config.controller().address.as_str(),
        "starting fleet-bench run"
    );

    let executor = Arc::new(ShellExecutor::from_config(&config));
    let outcome = Orchestrator::new(config, executor, Collaborators::from_commands())
        .run()
        .await;

    if let Some(error) = &outcome.fatal {
        eprintln!("fleet-bench: {error}");
    }
    if outcome.exit_code() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn load_run_config(cli: &Cli) -> Result<Arc<RunConfig>> {
    let mut settings = Config::load(&cli.config)?.into_settings();
    cli.overrides.apply(&mut settings);
    let config = RunConfig::from_settings(settings).context("invalid configuration")?;
    Ok(Arc::new(config))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
