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

//! # fleet-orchestrator
//!
//! Drives one distributed load-test run across a fleet of hosts: a domain
//! controller, server nodes, load-generating drivers and an app stand-in.
//!
//! The [`Orchestrator`] sequences the run through its [`RunPhase`]s using
//! three building blocks:
//!
//! - [`RemoteExecutor`] runs commands on hosts and transfers files, either
//!   blocking or as a live [`RemoteStream`] of output lines.
//! - [`ReadinessWatcher`] scans every server stream concurrently for the
//!   readiness signature, then drains it so no producer stalls on a full pipe.
//! - [`ProcessGroup`] fans driver launches out and waits for all of them,
//!   never cancelling peers when one fails.
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use fleet_orchestrator::{Collaborators, Orchestrator, RunConfig, RunSettings, ShellExecutor};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let settings = RunSettings {
//!     server_hosts: vec!["s1".to_string(), "s2".to_string()],
//!     driver_hosts: vec!["d1".to_string()],
//!     dist_archive: Some(PathBuf::from("build/server-dist.tar.gz")),
//!     ..RunSettings::default()
//! };
//! let config = Arc::new(RunConfig::from_settings(settings).unwrap());
//! let executor = Arc::new(ShellExecutor::from_config(&config));
//!
//! let outcome = Orchestrator::new(config, executor, Collaborators::from_commands())
//!     .run()
//!     .await;
//! std::process::exit(outcome.exit_code());
//! # });
//! ```

pub mod collaborators;
pub mod config;
pub mod error;
pub mod observability;
pub mod orchestrator;
pub mod phase;
pub mod process;
pub mod process_group;
pub mod readiness;
pub mod remote;
pub mod report;
pub mod template;

pub use collaborators::{Collaborators, ControllerStager, Loader, Reporter};
pub use config::{Host, HostRole, RunConfig, RunSettings};
pub use error::{RemoteError, RunError};
pub use orchestrator::{Orchestrator, RunOutcome};
pub use phase::RunPhase;
pub use process_group::{GroupOutcome, ProcessGroup};
pub use readiness::{ReadinessFailure, ReadinessSignature, ReadinessWatcher};
pub use remote::{RemoteExecutor, RemoteStream, ShellExecutor};
pub use report::RunReport;
