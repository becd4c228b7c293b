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

//! The run phase machine.
//!
//! A run moves strictly forward through [`RunPhase`]s. Fatal errors before
//! the controller is launched end the run immediately. Once the controller is
//! up, a failed start or readiness wait still stops the fleet before the run
//! ends. A loader failure aborts without teardown, leaving the fleet as it
//! was. Failures of individual drivers or result transfers are recorded
//! without cancelling their peers.

use crate::collaborators::Collaborators;
use crate::config::{Host, RunConfig};
use crate::error::{RemoteError, RunError};
use crate::observability::events;
use crate::phase::{PhaseTracker, RunPhase};
use crate::process::{shell_escape, LaunchSpec, OutputMode, ProcessHandle, Signal};
use crate::process_group::ProcessGroup;
use crate::readiness::{ReadinessSignature, ReadinessWatcher, ReadyEvent};
use crate::remote::{DrainHandle, RemoteExecutor, RemoteStream};
use crate::report::{
    timestamp_to_string, write_run_report, DriverRecord, ReadinessRecord, RunReport,
    TransferRecord, RUN_REPORT_SCHEMA_VERSION,
};
use chrono::Utc;
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const COMPONENT: &str = "orchestrator";

/// How long teardown waits for the controller and for draining streams.
pub const DEFAULT_TEARDOWN_GRACE: Duration = Duration::from_secs(10);

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    /// The error that ended the run early, if any.
    pub fatal: Option<RunError>,
    /// Driver, transfer and report failures recorded along the way.
    pub failures: Vec<RunError>,
}

impl RunOutcome {
    pub fn final_phase(&self) -> RunPhase {
        self.report.final_phase
    }

    pub fn exit_code(&self) -> i32 {
        self.report.exit_code
    }
}

#[derive(Default)]
struct RunState {
    tracker: PhaseTracker,
    controller: Option<ProcessHandle>,
    drains: Vec<DrainHandle>,
    readiness: Vec<ReadyEvent>,
    drivers: Vec<DriverRecord>,
    transfers: Vec<TransferRecord>,
    failures: Vec<RunError>,
}

pub struct Orchestrator {
    config: Arc<RunConfig>,
    executor: Arc<dyn RemoteExecutor>,
    collaborators: Collaborators,
    teardown_grace: Duration,
}

impl Orchestrator {
    pub fn new(
        config: Arc<RunConfig>,
        executor: Arc<dyn RemoteExecutor>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            config,
            executor,
            collaborators,
            teardown_grace: DEFAULT_TEARDOWN_GRACE,
        }
    }

    pub fn with_teardown_grace(mut self, grace: Duration) -> Self {
        self.teardown_grace = grace;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs every phase to completion or failure and writes the run report.
    pub async fn run(&self) -> RunOutcome {
        let start_wall = Utc::now();
        let start_instant = Instant::now();
        let mut state = RunState::default();

        let fatal = self.advance(&mut state).await.err();
        if let Some(err) = &fatal {
            state.tracker.fail(err);
            if Self::tears_down_after(err, &state)
                && state.tracker.enter(RunPhase::StoppingFleet).is_ok()
            {
                self.stop_fleet(&mut state).await;
            } else if state.controller.is_some() {
                warn!(
                    event = events::TEARDOWN_SKIPPED,
                    component = COMPONENT,
                    err = %err,
                    "run aborted without stopping the fleet"
                );
            }
        }

        let terminal = if fatal.is_some() {
            RunPhase::Failed
        } else {
            RunPhase::Done
        };
        if let Err(err) = state.tracker.enter(terminal) {
            error!(component = COMPONENT, err = %err, "unable to enter terminal phase");
        }

        let RunState {
            tracker,
            readiness,
            drivers,
            transfers,
            failures,
            ..
        } = state;
        let final_phase = tracker.current();
        let pass = fatal.is_none() && failures.is_empty();
        let exit_code = if pass { 0 } else { 1 };

        let report = RunReport {
            schema_version: RUN_REPORT_SCHEMA_VERSION.to_string(),
            final_phase,
            pass,
            exit_code,
            phase_timings: tracker.into_timings(),
            readiness: readiness
                .into_iter()
                .map(|ready| ReadinessRecord {
                    host: ready.host,
                    line: ready.line,
                    elapsed_ms: ready.elapsed.as_millis(),
                })
                .collect(),
            drivers,
            transfers,
            failures: failures.iter().map(ToString::to_string).collect(),
            failure_reason: fatal.as_ref().map(ToString::to_string),
            start_ts: timestamp_to_string(start_wall),
            end_ts: timestamp_to_string(Utc::now()),
            duration_ms: start_instant.elapsed().as_millis(),
        };

        let results_dir = &self.config.settings().results_dir;
        if let Err(err) = write_run_report(&report, results_dir) {
            warn!(
                event = events::REPORT_WRITE_FAILED,
                component = COMPONENT,
                results_dir = %results_dir.display(),
                err = %err,
                "unable to write run report"
            );
        }

        info!(
            event = events::RUN_COMPLETE,
            component = COMPONENT,
            final_phase = final_phase.as_str(),
            exit_code,
            failures = failures.len(),
            "run complete"
        );
        RunOutcome {
            report,
            fatal,
            failures,
        }
    }

    /// Teardown follows a fatal error only once the controller is running, and
    /// never after a loader failure.
    fn tears_down_after(err: &RunError, state: &RunState) -> bool {
        state.controller.is_some() && !matches!(err, RunError::LoaderFailed(_))
    }

    async fn advance(&self, state: &mut RunState) -> Result<(), RunError> {
        let settings = self.config.settings();
        let signature = ReadinessSignature::from_config(&self.config)?;

        if settings.skip_prepare {
            state.tracker.skip(RunPhase::Preparing)?;
        } else {
            state.tracker.enter(RunPhase::Preparing)?;
            self.prepare().await?;
        }

        state.tracker.enter(RunPhase::StartingControllerAndServers)?;
        state.controller = Some(self.launch_controller()?);
        let streams = self.start_servers(state).await?;

        state.tracker.enter(RunPhase::AwaitingReadiness)?;
        let watched = ReadinessWatcher::new(signature)
            .with_timeout(settings.readiness_timeout)
            .with_exit_classifier(self.transport_exit_classifier())
            .watch(streams)
            .await;
        match watched {
            Ok(readiness) => {
                state.readiness = readiness.ready;
                state.drains.extend(readiness.drains);
            }
            Err(failure) => {
                state.drains.extend(failure.drains);
                return Err(failure.error);
            }
        }

        if settings.skip_loader {
            state.tracker.skip(RunPhase::LoadingData)?;
        } else {
            state.tracker.enter(RunPhase::LoadingData)?;
            self.collaborators
                .loader
                .load(&self.config.server_list(), &self.config)
                .await?;
        }

        state.tracker.enter(RunPhase::RunningDrivers)?;
        self.run_drivers(state).await;

        state.tracker.enter(RunPhase::CollectingResults)?;
        self.collect_results(state).await;

        state.tracker.enter(RunPhase::StoppingFleet)?;
        self.stop_fleet(state).await;
        Ok(())
    }

    async fn prepare(&self) -> Result<(), RunError> {
        self.collaborators.stager.stage(&self.config).await?;

        join_all(
            self.config
                .servers()
                .iter()
                .map(|server| self.provision_server(server)),
        )
        .await
        .into_iter()
        .collect::<Result<(), RunError>>()?;

        let Some(artifacts) = &self.config.settings().bench_artifacts else {
            return Ok(());
        };
        join_all(
            self.config
                .drivers()
                .iter()
                .chain(std::iter::once(self.config.app()))
                .map(|host| self.stage_bench_artifacts(host, artifacts)),
        )
        .await
        .into_iter()
        .collect::<Result<(), RunError>>()
    }

    /// Copies the distribution (and server configuration) and runs the
    /// preparation and admin-user commands on one server.
    async fn provision_server(&self, server: &Host) -> Result<(), RunError> {
        let settings = self.config.settings();
        let bindings = self.config.bindings().with("host", server.address.clone());

        let provisioned = async {
            self.executor
                .run(server, &format!("mkdir -p {}", shell_escape(&settings.remote_dir)))
                .await?;
            self.executor
                .copy_to(self.config.dist_archive(), server, &self.config.remote_archive_path())
                .await?;
            if let Some(server_config) = &settings.server_config {
                let file_name = server_config
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "server-config".to_string());
                let remote_dir = settings.remote_dir.trim_end_matches('/');
                let destination = format!("{remote_dir}/{file_name}");
                self.executor
                    .copy_to(server_config, server, &destination)
                    .await?;
            }
            self.executor
                .run(server, &bindings.render(&settings.commands.server_prepare))
                .await?;
            self.executor
                .run(server, &bindings.render(&settings.commands.server_add_user))
                .await?;
            Ok::<(), RemoteError>(())
        }
        .await;

        provisioned.map_err(|err| {
            error!(
                event = events::HOST_PROVISION_FAILED,
                component = COMPONENT,
                host = server.address.as_str(),
                err = %err,
                "unable to provision server"
            );
            RunError::from(err)
        })
    }

    async fn stage_bench_artifacts(&self, host: &Host, artifacts: &Path) -> Result<(), RunError> {
        self.executor
            .copy_to(artifacts, host, &self.config.settings().bench_dir)
            .await
            .map_err(|err| {
                error!(
                    event = events::HOST_PROVISION_FAILED,
                    component = COMPONENT,
                    host = host.address.as_str(),
                    err = %err,
                    "unable to stage benchmark artifacts"
                );
                RunError::from(err)
            })
    }

    fn launch_controller(&self) -> Result<ProcessHandle, RunError> {
        let command = self
            .config
            .bindings()
            .render(&self.config.settings().commands.controller);
        let spec = LaunchSpec::shell("controller", command).stdout(OutputMode::Null);
        let controller = ProcessHandle::spawn(&spec).map_err(|source| RunError::Process {
            label: spec.label.clone(),
            source,
        })?;

        info!(
            event = events::CONTROLLER_LAUNCH,
            component = COMPONENT,
            pid = controller.pid,
            command = controller.command_line.as_str(),
            "controller launched"
        );
        Ok(controller)
    }

    /// Starts every server without waiting. On failure the streams already
    /// opened are drained so their transports keep running unblocked until
    /// teardown stops them.
    async fn start_servers(&self, state: &mut RunState) -> Result<Vec<RemoteStream>, RunError> {
        let settings = self.config.settings();
        let started = join_all(self.config.servers().iter().map(|server| async move {
            let command = self
                .config
                .bindings()
                .with("host", server.address.clone())
                .render(&settings.commands.server_start);
            info!(
                event = events::SERVER_START,
                component = COMPONENT,
                host = server.address.as_str(),
                command = command.as_str(),
                "starting server"
            );
            self.executor.start(server, &command).await
        }))
        .await;

        let mut streams = Vec::with_capacity(started.len());
        let mut first_error = None;
        for result in started {
            match result {
                Ok(stream) => streams.push(stream),
                Err(err) => {
                    first_error.get_or_insert(RunError::from(err));
                }
            }
        }

        match first_error {
            None => Ok(streams),
            Some(err) => {
                state
                    .drains
                    .extend(streams.into_iter().map(RemoteStream::drain));
                Err(err)
            }
        }
    }

    /// Lets the watcher report a server whose transport could not reach its
    /// host as unreachable instead of as never ready.
    fn transport_exit_classifier(
        &self,
    ) -> impl Fn(&str, Option<i32>) -> Option<RunError> + Send + Sync + 'static {
        let executor = Arc::clone(&self.executor);
        let servers = self.config.servers().to_vec();
        move |address, exit_code| {
            let server = servers.iter().find(|server| server.address == address)?;
            match executor.classify_failure(server, exit_code) {
                RemoteError::UnreachableHost { host } => {
                    Some(RunError::TransportUnreachable { host })
                }
                _ => None,
            }
        }
    }

    /// The driver launch command for the driver at `index`.
    pub fn driver_command(&self, index: usize, driver: &Host) -> String {
        let settings = self.config.settings();
        self.config
            .bindings()
            .with("host", driver.address.clone())
            .with("index", index.to_string())
            .with("workdir", self.config.driver_workdir(index))
            .with("extra", settings.driver_args.clone())
            .render(&settings.commands.driver)
    }

    async fn run_drivers(&self, state: &mut RunState) {
        let settings = self.config.settings();

        let app = self.config.app();
        let app_command = self
            .config
            .bindings()
            .with("host", app.address.clone())
            .render(&settings.commands.app_start);
        match self.executor.start(app, &app_command).await {
            Ok(stream) => state.drains.push(stream.drain()),
            Err(err) => {
                warn!(
                    component = COMPONENT,
                    host = app.address.as_str(),
                    err = %err,
                    "unable to start app stand-in"
                );
                state.failures.push(err.into());
            }
        }

        let group = ProcessGroup::new();
        let mut launched = Vec::with_capacity(self.config.drivers().len());
        for (index, driver) in self.config.drivers().iter().enumerate() {
            let command = self.driver_command(index, driver);
            info!(
                event = events::DRIVER_LAUNCH,
                component = COMPONENT,
                host = driver.address.as_str(),
                index,
                command = command.as_str(),
                "launching driver"
            );

            match group.spawn(&self.executor.shell_spec(driver, &command)) {
                Ok(id) => launched.push((id, index, driver)),
                Err(err) => {
                    warn!(
                        event = events::DRIVER_FAILED,
                        component = COMPONENT,
                        host = driver.address.as_str(),
                        index,
                        err = %err,
                        "driver could not be launched"
                    );
                    state.drivers.push(DriverRecord {
                        index,
                        host: driver.address.clone(),
                        exit_code: None,
                        succeeded: false,
                        timed_out: false,
                        error: Some(err.to_string()),
                    });
                    state.failures.push(RunError::DriverFailed {
                        host: driver.address.clone(),
                        detail: err.to_string(),
                    });
                }
            }
        }

        let outcome = group.wait_all_within(settings.driver_timeout).await;
        for (id, index, driver) in launched {
            let Some(member) = outcome.get(id) else {
                continue;
            };
            if !member.succeeded {
                let detail = member.describe_failure();
                warn!(
                    event = events::DRIVER_FAILED,
                    component = COMPONENT,
                    host = driver.address.as_str(),
                    index,
                    detail = detail.as_str(),
                    "driver failed"
                );
                state.failures.push(RunError::DriverFailed {
                    host: driver.address.clone(),
                    detail,
                });
            }
            state.drivers.push(DriverRecord {
                index,
                host: driver.address.clone(),
                exit_code: member.exit_code,
                succeeded: member.succeeded,
                timed_out: member.timed_out,
                error: (!member.succeeded).then(|| member.describe_failure()),
            });
        }
        state.drivers.sort_by_key(|record| record.index);
    }

    async fn collect_results(&self, state: &mut RunState) {
        let settings = self.config.settings();
        let pulls = join_all(
            self.config
                .drivers()
                .iter()
                .enumerate()
                .map(|(index, driver)| async move {
                    let remote_glob = format!(
                        "{}/{}",
                        self.config.driver_workdir(index),
                        settings.driver_result_glob
                    );
                    let local_dir = self.config.driver_results_dir(index);
                    let pulled = self
                        .executor
                        .copy_from(driver, &remote_glob, &local_dir)
                        .await;
                    (index, driver, local_dir, pulled)
                }),
        )
        .await;

        for (index, driver, local_dir, pulled) in pulls {
            let error = pulled.err().map(|err| {
                warn!(
                    event = events::RESULT_PULL_FAILED,
                    component = COMPONENT,
                    host = driver.address.as_str(),
                    index,
                    err = %err,
                    "unable to pull driver results"
                );
                err.to_string()
            });
            if let Some(detail) = &error {
                state.failures.push(RunError::TransferFailed {
                    host: driver.address.clone(),
                    detail: detail.clone(),
                });
            }
            state.transfers.push(TransferRecord {
                index,
                host: driver.address.clone(),
                local_dir: local_dir.display().to_string(),
                succeeded: error.is_none(),
                error,
            });
        }

        if let Err(err) = self
            .collaborators
            .reporter
            .render(&settings.results_dir, &self.config)
            .await
        {
            warn!(
                component = COMPONENT,
                err = %err,
                "report generation failed"
            );
            state.failures.push(err);
        }
    }

    /// Best-effort stop of every server, then the controller tree is killed
    /// and open drains get a grace period to reach end of output.
    async fn stop_fleet(&self, state: &mut RunState) {
        let settings = self.config.settings();
        let stops = join_all(self.config.servers().iter().map(|server| async move {
            let command = self
                .config
                .bindings()
                .with("host", server.address.clone())
                .render(&settings.commands.server_stop);
            (server, self.executor.run(server, &command).await)
        }))
        .await;
        for (server, stopped) in stops {
            if let Err(err) = stopped {
                warn!(
                    event = events::SERVER_STOP_FAILED,
                    component = COMPONENT,
                    host = server.address.as_str(),
                    err = %err,
                    "unable to stop server"
                );
            }
        }

        if let Some(mut controller) = state.controller.take() {
            if let Err(err) = controller.kill_tree(Signal::Kill) {
                warn!(
                    component = COMPONENT,
                    pid = controller.pid,
                    err = %err,
                    "unable to kill controller"
                );
            }
            match controller.wait_with_timeout(self.teardown_grace).await {
                Ok(Some(_)) => {}
                Ok(None) => warn!(
                    component = COMPONENT,
                    pid = controller.pid,
                    "controller still running after kill"
                ),
                Err(err) => warn!(
                    component = COMPONENT,
                    pid = controller.pid,
                    err = %err,
                    "unable to reap controller"
                ),
            }
        }

        let grace = self.teardown_grace;
        let drained = join_all(std::mem::take(&mut state.drains).into_iter().map(|drain| {
            let host = drain.host().to_string();
            async move { (host, drain.finish_within(grace).await) }
        }))
        .await;
        for (host, summary) in drained {
            match summary {
                Some(summary) => debug!(
                    component = COMPONENT,
                    host = host.as_str(),
                    bytes = summary.bytes_discarded,
                    exit_code = ?summary.exit_code,
                    "stream drained"
                ),
                None => debug!(
                    component = COMPONENT,
                    host = host.as_str(),
                    "stream still open after teardown grace"
                ),
            }
        }
    }
}
