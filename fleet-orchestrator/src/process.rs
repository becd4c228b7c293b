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

//! Locally spawned processes, each isolated in its own process group so the
//! whole tree it starts can be signalled at once.

use crate::observability::events;
use chrono::{DateTime, Utc};
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, ChildStdout, Command};
use tracing::debug;

const COMPONENT: &str = "process";

/// Where a spawned process writes its standard output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Inherit,
    Null,
    Piped,
}

/// Signals the orchestrator sends to process trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Terminate,
    Kill,
}

impl Signal {
    fn as_raw(self) -> i32 {
        match self {
            Self::Interrupt => libc::SIGINT,
            Self::Terminate => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
        }
    }
}

/// How a process finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub code: Option<i32>,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Everything needed to start one local process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub workdir: Option<PathBuf>,
    pub stdout: OutputMode,
}

impl LaunchSpec {
    pub fn new(label: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            workdir: None,
            stdout: OutputMode::Inherit,
        }
    }

    /// A `sh -c <command>` launch.
    pub fn shell(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(label, "sh").arg("-c").arg(command)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn stdout(mut self, mode: OutputMode) -> Self {
        self.stdout = mode;
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_escape)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(match self.stdout {
                OutputMode::Inherit => Stdio::inherit(),
                OutputMode::Null => Stdio::null(),
                OutputMode::Piped => Stdio::piped(),
            });
        if let Some(workdir) = &self.workdir {
            command.current_dir(workdir);
        }
        command
    }
}

/// Captured result of a process run to completion.
#[derive(Debug)]
pub struct CommandOutcome {
    pub command: String,
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }
}

/// Runs `spec` to completion and captures both output streams.
pub async fn run_to_completion(spec: &LaunchSpec) -> io::Result<CommandOutcome> {
    let output = spec
        .to_command()
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    Ok(CommandOutcome {
        command: spec.command_line(),
        status_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

pub fn shell_escape(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "-_./:=,@%+".contains(ch))
    {
        return value.to_string();
    }
    let escaped = value.replace('\'', "'\"'\"'");
    format!("'{escaped}'")
}

/// Sends `signal` to every member of process group `pgid`. A group that no
/// longer exists is not an error.
pub fn signal_process_group(pgid: i32, signal: Signal) -> io::Result<()> {
    let rc = unsafe { libc::kill(-pgid, signal.as_raw()) };
    if rc == 0 {
        return Ok(());
    }

    let error = io::Error::last_os_error();
    if error.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(error)
}

/// A running (or finished) local process that leads its own process group.
#[derive(Debug)]
pub struct ProcessHandle {
    pub label: String,
    pub pid: i32,
    pub process_group_id: i32,
    pub command_line: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    exit: Option<ExitOutcome>,
    child: Child,
}

impl ProcessHandle {
    pub fn spawn(spec: &LaunchSpec) -> io::Result<Self> {
        let mut command = spec.to_command();

        unsafe {
            command.pre_exec(|| {
                if libc::setpgid(0, 0) != 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = command.spawn()?;
        let pid = child.id().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Other,
                format!("spawned process '{}' has no pid", spec.label),
            )
        })? as i32;

        debug!(
            event = events::PROCESS_SPAWN,
            component = COMPONENT,
            label = spec.label.as_str(),
            pid,
            command = spec.command_line().as_str(),
            "spawned process"
        );

        Ok(Self {
            label: spec.label.clone(),
            pid,
            process_group_id: pid,
            command_line: spec.command_line(),
            started_at: Utc::now(),
            ended_at: None,
            exit: None,
            child,
        })
    }

    /// Hands out the piped standard output, once.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn exit_outcome(&self) -> Option<ExitOutcome> {
        self.exit
    }

    pub fn has_exited(&self) -> bool {
        self.exit.is_some()
    }

    pub fn try_exit(&mut self) -> io::Result<Option<ExitOutcome>> {
        if self.exit.is_none() {
            if let Some(status) = self.child.try_wait()? {
                self.record_exit(status.code());
            }
        }
        Ok(self.exit)
    }

    pub async fn wait(&mut self) -> io::Result<ExitOutcome> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        let status = self.child.wait().await?;
        Ok(self.record_exit(status.code()))
    }

    /// Waits up to `timeout`; `None` if the process is still running.
    pub async fn wait_with_timeout(
        &mut self,
        timeout: Duration,
    ) -> io::Result<Option<ExitOutcome>> {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(outcome) => outcome.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Signals every process in this handle's group. Once the leader has been
    /// reaped its group id may belong to someone else, so nothing is sent.
    pub fn kill_tree(&self, signal: Signal) -> io::Result<()> {
        if self.exit.is_some() {
            return Ok(());
        }
        debug!(
            event = events::PROCESS_KILL_TREE,
            component = COMPONENT,
            label = self.label.as_str(),
            pgid = self.process_group_id,
            signal = ?signal,
            "signalling process group"
        );

        signal_process_group(self.process_group_id, signal)
    }

    fn record_exit(&mut self, code: Option<i32>) -> ExitOutcome {
        let outcome = ExitOutcome { code };
        self.exit = Some(outcome);
        self.ended_at = Some(Utc::now());
        debug!(
            event = events::PROCESS_EXIT,
            component = COMPONENT,
            label = self.label.as_str(),
            pid = self.pid,
            code = ?code,
            "process exited"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::{run_to_completion, shell_escape, LaunchSpec, OutputMode, ProcessHandle, Signal};
    use std::time::Duration;

    #[test]
    fn shell_escape_quotes_only_when_needed() {
        assert_eq!(shell_escape("host-1.example:8080"), "host-1.example:8080");
        assert_eq!(shell_escape("a b"), "'a b'");
        assert_eq!(shell_escape("it's"), "'it'\"'\"'s'");
        assert_eq!(shell_escape(""), "''");
    }

    #[tokio::test]
    async fn run_to_completion_captures_output_and_status() {
        let outcome = run_to_completion(&LaunchSpec::shell("echo", "echo hello; exit 3"))
            .await
            .expect("sh should spawn");

        assert_eq!(outcome.status_code, Some(3));
        assert_eq!(outcome.stdout.trim(), "hello");
        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn kill_tree_terminates_the_whole_group() {
        let spec = LaunchSpec::shell("tree", "sleep 30 & sleep 30; wait").stdout(OutputMode::Null);
        let mut handle = ProcessHandle::spawn(&spec).expect("spawn");

        assert_eq!(handle.pid, handle.process_group_id);
        handle.kill_tree(Signal::Kill).expect("signal group");

        let outcome = handle
            .wait_with_timeout(Duration::from_secs(5))
            .await
            .expect("wait")
            .expect("process should be gone after SIGKILL");
        assert!(!outcome.success());
        assert!(handle.has_exited());

        handle
            .kill_tree(Signal::Kill)
            .expect("signalling a reaped handle is not an error");
    }
}
