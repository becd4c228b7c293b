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

//! Interfaces of the external collaborators the run calls into, with
//! implementations that run a configured local command.

use crate::config::RunConfig;
use crate::error::RunError;
use crate::observability::events;
use crate::process::{run_to_completion, LaunchSpec};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const COMPONENT: &str = "collaborators";

/// Unpacks the controller locally and templates its configuration with the
/// database settings.
#[async_trait]
pub trait ControllerStager: Send + Sync {
    async fn stage(&self, config: &RunConfig) -> Result<(), RunError>;
}

/// Populates the servers with test data before the drivers start.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, server_list: &str, config: &RunConfig) -> Result<(), RunError>;
}

/// Turns the collected driver results into a human-readable report.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn render(&self, results_dir: &Path, config: &RunConfig) -> Result<(), RunError>;
}

#[derive(Clone)]
pub struct Collaborators {
    pub stager: Arc<dyn ControllerStager>,
    pub loader: Arc<dyn Loader>,
    pub reporter: Arc<dyn Reporter>,
}

impl Collaborators {
    /// Every collaborator backed by its command template.
    pub fn from_commands() -> Self {
        Self {
            stager: Arc::new(CommandStager),
            loader: Arc::new(CommandLoader),
            reporter: Arc::new(CommandReporter),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CommandStager;

#[async_trait]
impl ControllerStager for CommandStager {
    async fn stage(&self, config: &RunConfig) -> Result<(), RunError> {
        let command = config
            .bindings()
            .render(&config.settings().commands.stage_controller);
        run_local("stage", &command)
            .await
            .map_err(|detail| RunError::CollaboratorFailed {
                name: "stage",
                detail,
            })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CommandLoader;

#[async_trait]
impl Loader for CommandLoader {
    async fn load(&self, server_list: &str, config: &RunConfig) -> Result<(), RunError> {
        let command = config
            .bindings()
            .with("server_list", server_list)
            .with("extra", config.settings().loader_args.clone())
            .render(&config.settings().commands.loader);

        info!(
            event = events::LOADER_INVOKE,
            component = COMPONENT,
            server_list,
            "invoking data loader"
        );
        run_local("loader", &command)
            .await
            .map_err(RunError::LoaderFailed)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CommandReporter;

#[async_trait]
impl Reporter for CommandReporter {
    async fn render(&self, results_dir: &Path, config: &RunConfig) -> Result<(), RunError> {
        let command = config
            .bindings()
            .with("results_dir", results_dir.display().to_string())
            .render(&config.settings().commands.report);

        info!(
            event = events::REPORT_INVOKE,
            component = COMPONENT,
            results_dir = %results_dir.display(),
            "rendering report"
        );
        run_local("report", &command)
            .await
            .map_err(|detail| RunError::CollaboratorFailed {
                name: "report",
                detail,
            })
    }
}

async fn run_local(label: &str, command: &str) -> Result<(), String> {
    let spec = LaunchSpec::shell(label, command);
    let outcome = run_to_completion(&spec)
        .await
        .map_err(|err| format!("unable to run '{command}': {err}"))?;
    if outcome.success() {
        return Ok(());
    }

    warn!(
        component = COMPONENT,
        label,
        status = ?outcome.status_code,
        stderr = outcome.stderr.trim(),
        "collaborator command failed"
    );
    Err(match outcome.status_code {
        Some(code) => format!("'{command}' exited with status {code}"),
        None => format!("'{command}' was terminated by a signal"),
    })
}
