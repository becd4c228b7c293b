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

//! Remote execution over an external transport (by default `ssh`/`scp`).
//!
//! Implementors only describe *how* to reach a host by producing local
//! [`LaunchSpec`]s; blocking runs, streaming starts and transfers are provided
//! on top of those.

mod shell;
mod stream;

pub use shell::ShellExecutor;
pub use stream::{DrainHandle, DrainSummary, RemoteStream};

use crate::config::Host;
use crate::error::RemoteError;
use crate::observability::events;
use crate::process::{run_to_completion, CommandOutcome, LaunchSpec, OutputMode, ProcessHandle};
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info, warn};

const COMPONENT: &str = "remote";

#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Local launch that runs `command` on `host`.
    fn shell_spec(&self, host: &Host, command: &str) -> LaunchSpec;

    /// Local launch that copies `source` to `destination`. Remote endpoints are
    /// addressed with [`remote_path`](Self::remote_path).
    fn copy_spec(
        &self,
        host: &Host,
        source: &str,
        destination: &str,
        recursive: bool,
    ) -> LaunchSpec;

    /// How `path` on `host` is spelled for the copy transport.
    fn remote_path(&self, host: &Host, path: &str) -> String;

    /// Maps a failing transport exit status of a remote command to an error.
    fn classify_failure(&self, host: &Host, exit_code: Option<i32>) -> RemoteError {
        RemoteError::RemoteCommandFailed {
            host: host.address.clone(),
            exit_code,
        }
    }

    /// Runs `command` on `host` and waits for it (blocking mode).
    async fn run(&self, host: &Host, command: &str) -> Result<CommandOutcome, RemoteError> {
        let spec = self.shell_spec(host, command);
        info!(
            event = events::REMOTE_RUN_START,
            component = COMPONENT,
            host = host.address.as_str(),
            command,
            "running remote command"
        );

        let outcome = run_to_completion(&spec)
            .await
            .map_err(|source| RemoteError::Spawn {
                program: spec.program.clone(),
                source,
            })?;

        if outcome.success() {
            debug!(
                event = events::REMOTE_RUN_OK,
                component = COMPONENT,
                host = host.address.as_str(),
                stdout = outcome.stdout.trim(),
                "remote command succeeded"
            );
            return Ok(outcome);
        }

        warn!(
            event = events::REMOTE_RUN_FAILED,
            component = COMPONENT,
            host = host.address.as_str(),
            status = ?outcome.status_code,
            stderr = outcome.stderr.trim(),
            "remote command failed"
        );
        Err(self.classify_failure(host, outcome.status_code))
    }

    /// Starts `command` on `host` and returns its live output immediately
    /// (non-blocking mode).
    async fn start(&self, host: &Host, command: &str) -> Result<RemoteStream, RemoteError> {
        let spec = self.shell_spec(host, command).stdout(OutputMode::Piped);
        let process = ProcessHandle::spawn(&spec).map_err(|source| RemoteError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        info!(
            event = events::REMOTE_STREAM_OPEN,
            component = COMPONENT,
            host = host.address.as_str(),
            command,
            pid = process.pid,
            "started remote command"
        );
        RemoteStream::from_process(host.address.clone(), process)
    }

    async fn copy_to(
        &self,
        local: &Path,
        host: &Host,
        remote_path: &str,
    ) -> Result<(), RemoteError> {
        let source = local.display().to_string();
        let destination = self.remote_path(host, remote_path);
        let spec = self.copy_spec(host, &source, &destination, local.is_dir());
        run_transfer(host, &spec).await
    }

    /// Pulls `remote_glob` from `host` into `local`; the glob expands host-side.
    async fn copy_from(
        &self,
        host: &Host,
        remote_glob: &str,
        local: &Path,
    ) -> Result<(), RemoteError> {
        tokio::fs::create_dir_all(local)
            .await
            .map_err(|source| RemoteError::Io {
                host: host.address.clone(),
                source,
            })?;
        let source = self.remote_path(host, remote_glob);
        let destination = local.display().to_string();
        let spec = self.copy_spec(host, &source, &destination, true);
        run_transfer(host, &spec).await
    }
}

async fn run_transfer(host: &Host, spec: &LaunchSpec) -> Result<(), RemoteError> {
    debug!(
        event = events::REMOTE_COPY_START,
        component = COMPONENT,
        host = host.address.as_str(),
        command = spec.command_line().as_str(),
        "starting transfer"
    );

    let outcome = run_to_completion(spec)
        .await
        .map_err(|source| RemoteError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
    if outcome.success() {
        return Ok(());
    }

    warn!(
        event = events::REMOTE_COPY_FAILED,
        component = COMPONENT,
        host = host.address.as_str(),
        status = ?outcome.status_code,
        stderr = outcome.stderr.trim(),
        "transfer failed"
    );
    Err(RemoteError::TransferFailed {
        host: host.address.clone(),
        exit_code: outcome.status_code,
    })
}
