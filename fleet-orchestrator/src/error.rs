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

//! Error types shared by the remote layer and the run orchestrator.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

/// Failures of a single remote invocation or transfer.
#[derive(Debug)]
pub enum RemoteError {
    /// The local transport process (e.g. `ssh`) could not be started.
    Spawn { program: String, source: io::Error },
    /// The transport reported that the host could not be reached.
    UnreachableHost { host: String },
    /// The remote command ran and exited non-zero. `None` means killed by a signal.
    RemoteCommandFailed {
        host: String,
        exit_code: Option<i32>,
    },
    /// A copy to or from the host failed.
    TransferFailed {
        host: String,
        exit_code: Option<i32>,
    },
    /// Reading output or waiting on the transport process failed.
    Io { host: String, source: io::Error },
}

impl RemoteError {
    pub fn host(&self) -> Option<&str> {
        match self {
            RemoteError::Spawn { .. } => None,
            RemoteError::UnreachableHost { host }
            | RemoteError::RemoteCommandFailed { host, .. }
            | RemoteError::TransferFailed { host, .. }
            | RemoteError::Io { host, .. } => Some(host),
        }
    }
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteError::Spawn { program, source } => {
                write!(f, "unable to spawn transport '{program}': {source}")
            }
            RemoteError::UnreachableHost { host } => write!(f, "host '{host}' is unreachable"),
            RemoteError::RemoteCommandFailed { host, exit_code } => match exit_code {
                Some(code) => write!(f, "remote command on '{host}' exited with status {code}"),
                None => write!(f, "remote command on '{host}' was terminated by a signal"),
            },
            RemoteError::TransferFailed { host, exit_code } => match exit_code {
                Some(code) => write!(f, "transfer with '{host}' failed with status {code}"),
                None => write!(f, "transfer with '{host}' was terminated by a signal"),
            },
            RemoteError::Io { host, source } => {
                write!(f, "i/o error talking to '{host}': {source}")
            }
        }
    }
}

impl Error for RemoteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RemoteError::Spawn { source, .. } | RemoteError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failures that end a run or are recorded against it.
#[derive(Debug)]
pub enum RunError {
    /// A required setting is absent. Raised before any phase starts.
    ConfigurationMissing(&'static str),
    /// A setting is present but unusable (e.g. a malformed pattern).
    InvalidSetting {
        setting: &'static str,
        detail: String,
    },
    TransportUnreachable { host: String },
    RemoteCommandFailed {
        host: String,
        exit_code: Option<i32>,
    },
    /// A server output stream closed before the readiness signature was seen.
    ReadinessNeverObserved { host: String },
    /// The configured readiness deadline expired with hosts still pending.
    ReadinessTimedOut { pending: Vec<String> },
    LoaderFailed(String),
    DriverFailed { host: String, detail: String },
    TransferFailed { host: String, detail: String },
    /// A staging or report collaborator failed.
    CollaboratorFailed { name: &'static str, detail: String },
    /// A local process could not be spawned, waited on or signalled.
    Process { label: String, source: io::Error },
    /// The run tried to move backwards through its phases.
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

impl RunError {
    /// Fatal errors abort the run; the rest are aggregated and the run continues.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            RunError::DriverFailed { .. }
                | RunError::TransferFailed { .. }
                | RunError::CollaboratorFailed { name: "report", .. }
        )
    }

    pub fn host(&self) -> Option<&str> {
        match self {
            RunError::TransportUnreachable { host }
            | RunError::RemoteCommandFailed { host, .. }
            | RunError::ReadinessNeverObserved { host }
            | RunError::DriverFailed { host, .. }
            | RunError::TransferFailed { host, .. } => Some(host),
            _ => None,
        }
    }
}

impl From<RemoteError> for RunError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Spawn { program, source } => RunError::Process {
                label: program,
                source,
            },
            RemoteError::UnreachableHost { host } => RunError::TransportUnreachable { host },
            RemoteError::RemoteCommandFailed { host, exit_code } => {
                RunError::RemoteCommandFailed { host, exit_code }
            }
            err @ RemoteError::TransferFailed { .. } => RunError::TransferFailed {
                host: err.host().unwrap_or_default().to_string(),
                detail: err.to_string(),
            },
            RemoteError::Io { host, source } => RunError::Process {
                label: host,
                source,
            },
        }
    }
}

impl Display for RunError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::ConfigurationMissing(setting) => {
                write!(f, "missing required configuration: {setting}")
            }
            RunError::InvalidSetting { setting, detail } => {
                write!(f, "invalid configuration for {setting}: {detail}")
            }
            RunError::TransportUnreachable { host } => write!(f, "host '{host}' is unreachable"),
            RunError::RemoteCommandFailed { host, exit_code } => match exit_code {
                Some(code) => write!(f, "remote command on '{host}' exited with status {code}"),
                None => write!(f, "remote command on '{host}' was terminated by a signal"),
            },
            RunError::ReadinessNeverObserved { host } => {
                write!(f, "server '{host}' stopped producing output before it became ready")
            }
            RunError::ReadinessTimedOut { pending } => {
                write!(f, "timed out waiting for servers to become ready: {}", pending.join(", "))
            }
            RunError::LoaderFailed(detail) => write!(f, "data loader failed: {detail}"),
            RunError::DriverFailed { host, detail } => {
                write!(f, "driver on '{host}' failed: {detail}")
            }
            RunError::TransferFailed { host, detail } => {
                write!(f, "result transfer from '{host}' failed: {detail}")
            }
            RunError::CollaboratorFailed { name, detail } => write!(f, "{name} failed: {detail}"),
            RunError::Process { label, source } => write!(f, "process '{label}': {source}"),
            RunError::InvalidTransition { from, to } => {
                write!(f, "invalid phase transition from {from} to {to}")
            }
        }
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RunError::Process { source, .. } => Some(source),
            _ => None,
        }
    }
}
