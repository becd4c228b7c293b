use async_trait::async_trait;
use fleet_orchestrator::collaborators::{Collaborators, ControllerStager, Loader, Reporter};
use fleet_orchestrator::config::{Host, RunConfig, RunSettings};
use fleet_orchestrator::error::{RemoteError, RunError};
use fleet_orchestrator::orchestrator::Orchestrator;
use fleet_orchestrator::process::{shell_escape, LaunchSpec};
use fleet_orchestrator::remote::RemoteExecutor;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const UNREACHABLE_STATUS: i32 = 255;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum InvocationKind {
    Shell,
    Copy,
}

#[derive(Clone, Debug)]
pub(crate) struct Invocation {
    pub(crate) host: String,
    pub(crate) kind: InvocationKind,
    pub(crate) command: String,
}

/// Runs every "remote" command on this machine through `sh -c`, so globs in
/// transfers still expand on the side that owns the files.
#[derive(Default)]
pub(crate) struct LocalExecutor {
    invocations: Mutex<Vec<Invocation>>,
    unreachable: Mutex<HashSet<String>>,
}

impl LocalExecutor {
    pub(crate) fn mark_unreachable(&self, address: &str) {
        self.unreachable.lock().unwrap().insert(address.to_string());
    }

    pub(crate) fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub(crate) fn commands_for(&self, address: &str) -> Vec<String> {
        self.invocations()
            .into_iter()
            .filter(|invocation| invocation.host == address)
            .map(|invocation| invocation.command)
            .collect()
    }

    fn record(&self, host: &Host, kind: InvocationKind, command: &str) -> bool {
        self.invocations.lock().unwrap().push(Invocation {
            host: host.address.clone(),
            kind,
            command: command.to_string(),
        });
        self.unreachable.lock().unwrap().contains(&host.address)
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    fn shell_spec(&self, host: &Host, command: &str) -> LaunchSpec {
        let label = format!("{}@{}", host.role.as_str(), host.address);
        if self.record(host, InvocationKind::Shell, command) {
            return LaunchSpec::shell(label, format!("exit {UNREACHABLE_STATUS}"));
        }
        LaunchSpec::shell(label, command).env("FLEET_HOST", host.address.clone())
    }

    fn copy_spec(
        &self,
        host: &Host,
        source: &str,
        destination: &str,
        recursive: bool,
    ) -> LaunchSpec {
        let flag = if recursive { "-r " } else { "" };
        let command = format!("cp {flag}{source} {}", shell_escape(destination));
        let label = format!("copy@{}", host.address);
        if self.record(host, InvocationKind::Copy, &command) {
            return LaunchSpec::shell(label, format!("exit {UNREACHABLE_STATUS}"));
        }
        LaunchSpec::shell(label, command)
    }

    fn remote_path(&self, _host: &Host, path: &str) -> String {
        path.to_string()
    }

    fn classify_failure(&self, host: &Host, exit_code: Option<i32>) -> RemoteError {
        if exit_code == Some(UNREACHABLE_STATUS) {
            return RemoteError::UnreachableHost {
                host: host.address.clone(),
            };
        }
        RemoteError::RemoteCommandFailed {
            host: host.address.clone(),
            exit_code,
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingStager {
    calls: AtomicUsize,
}

impl RecordingStager {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControllerStager for RecordingStager {
    async fn stage(&self, _config: &RunConfig) -> Result<(), RunError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingLoader {
    server_lists: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingLoader {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn server_lists(&self) -> Vec<String> {
        self.server_lists.lock().unwrap().clone()
    }
}

#[async_trait]
impl Loader for RecordingLoader {
    async fn load(&self, server_list: &str, _config: &RunConfig) -> Result<(), RunError> {
        self.server_lists
            .lock()
            .unwrap()
            .push(server_list.to_string());
        if self.fail {
            return Err(RunError::LoaderFailed("schema missing".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingReporter {
    results_dirs: Mutex<Vec<PathBuf>>,
}

impl RecordingReporter {
    pub(crate) fn results_dirs(&self) -> Vec<PathBuf> {
        self.results_dirs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn render(&self, results_dir: &Path, _config: &RunConfig) -> Result<(), RunError> {
        self.results_dirs
            .lock()
            .unwrap()
            .push(results_dir.to_path_buf());
        Ok(())
    }
}

/// A whole fleet simulated inside one scratch directory.
pub(crate) struct Fleet {
    pub(crate) scratch: TempDir,
    pub(crate) settings: RunSettings,
    pub(crate) executor: Arc<LocalExecutor>,
    pub(crate) stager: Arc<RecordingStager>,
    pub(crate) loader: Arc<RecordingLoader>,
    pub(crate) reporter: Arc<RecordingReporter>,
}

impl Fleet {
    pub(crate) fn new(servers: &[&str], drivers: &[&str]) -> Self {
        let scratch = tempfile::tempdir().expect("scratch dir");
        let root = scratch.path().display().to_string();
        let dist = scratch.path().join("dist.tar.gz");
        std::fs::write(&dist, b"dist").expect("dist archive");

        let mut settings = RunSettings {
            server_hosts: servers.iter().map(|s| s.to_string()).collect(),
            driver_hosts: drivers.iter().map(|d| d.to_string()).collect(),
            dist_archive: Some(dist),
            remote_dir: format!("{root}/remote"),
            driver_workdir_root: format!("{root}/drivers"),
            results_dir: scratch.path().join("results"),
            ..RunSettings::default()
        };
        settings.commands.controller = format!("echo $$ > {root}/controller.pid; exec sleep 30");
        settings.commands.server_prepare = "test -f {remote_dist}".to_string();
        settings.commands.server_add_user =
            "echo {admin_user} >> {remote_dir}/users-{host}".to_string();
        settings.commands.server_start = format!(
            "echo 'Host Controller started in 1ms'; echo 'server {{host}} started in 2ms'; \
             while [ ! -f {root}/stop-{{host}} ]; do sleep 0.1; done; \
             touch {root}/exited-{{host}}"
        );
        settings.commands.server_stop = format!("touch {root}/stop-{{host}}");
        settings.commands.app_start = "echo app up".to_string();
        settings.commands.driver = "mkdir -p {workdir} && \
             echo '{index} {driver_list} {server_list} {app}' > {workdir}/result.log"
            .to_string();

        Self {
            scratch,
            settings,
            executor: Arc::new(LocalExecutor::default()),
            stager: Arc::new(RecordingStager::default()),
            loader: Arc::new(RecordingLoader::default()),
            reporter: Arc::new(RecordingReporter::default()),
        }
    }

    pub(crate) fn root(&self) -> &Path {
        self.scratch.path()
    }

    pub(crate) fn orchestrator(&self) -> Orchestrator {
        let config = RunConfig::from_settings(self.settings.clone()).expect("valid settings");
        Orchestrator::new(
            Arc::new(config),
            self.executor.clone(),
            Collaborators {
                stager: self.stager.clone(),
                loader: self.loader.clone(),
                reporter: self.reporter.clone(),
            },
        )
        .with_teardown_grace(Duration::from_secs(5))
    }

    pub(crate) fn server_was_stopped(&self, address: &str) -> bool {
        self.root().join(format!("stop-{address}")).exists()
    }

    /// True once the server's start command has returned after being stopped.
    #[allow(dead_code)]
    pub(crate) fn server_exited(&self, address: &str) -> bool {
        self.root().join(format!("exited-{address}")).exists()
    }

    /// Stops whatever a run left behind on purpose.
    #[allow(dead_code)]
    pub(crate) fn stop_leftovers(&self) {
        for server in &self.settings.server_hosts {
            let _ = std::fs::write(self.root().join(format!("stop-{server}")), b"");
        }
        if let Ok(pid) = std::fs::read_to_string(self.root().join("controller.pid")) {
            let _ = std::process::Command::new("kill")
                .arg("-9")
                .arg(pid.trim())
                .status();
        }
    }

    #[allow(dead_code)]
    pub(crate) fn controller_is_alive(&self) -> bool {
        let Ok(pid) = std::fs::read_to_string(self.root().join("controller.pid")) else {
            return false;
        };
        std::process::Command::new("kill")
            .arg("-0")
            .arg(pid.trim())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}
