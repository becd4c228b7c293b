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

//! Fan-out/fan-in tracking of concurrently running local processes.
//!
//! A [`ProcessGroup`] is cheap to clone; clones share one tracked set, so
//! several tasks may register handles while a single consumer calls
//! [`ProcessGroup::wait_all`]. Waiting never aborts siblings: every handle is
//! awaited and reported, however many of them fail.

use crate::error::RunError;
use crate::observability::events;
use crate::process::{signal_process_group, LaunchSpec, ProcessHandle, Signal};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

const COMPONENT: &str = "process_group";

/// Identifies one handle inside its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

/// Final state of one tracked handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberOutcome {
    pub id: HandleId,
    pub label: String,
    pub exit_code: Option<i32>,
    pub succeeded: bool,
    pub timed_out: bool,
    pub error: Option<String>,
}

impl MemberOutcome {
    pub fn describe_failure(&self) -> String {
        if self.timed_out {
            return "killed after the wait deadline expired".to_string();
        }
        if let Some(error) = &self.error {
            return error.clone();
        }
        match self.exit_code {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by a signal".to_string(),
        }
    }
}

/// Aggregate result of [`ProcessGroup::wait_all`], in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupOutcome {
    pub members: Vec<MemberOutcome>,
}

impl GroupOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.members.iter().all(|member| member.succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &MemberOutcome> {
        self.members.iter().filter(|member| !member.succeeded)
    }

    pub fn get(&self, id: HandleId) -> Option<&MemberOutcome> {
        self.members.iter().find(|member| member.id == id)
    }
}

struct Tracked {
    id: HandleId,
    handle: ProcessHandle,
}

#[derive(Default)]
struct GroupState {
    next_id: u64,
    pending: Vec<Tracked>,
    // Kept after a handle is taken for waiting so kill_tree still reaches it.
    // Cleared once the handle is reaped; its group id may be reused after that.
    process_groups: HashMap<HandleId, (String, i32)>,
    reaped: HashSet<HandleId>,
}

#[derive(Clone, Default)]
pub struct ProcessGroup {
    state: Arc<Mutex<GroupState>>,
}

impl ProcessGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `spec` in its own process group and tracks it.
    pub fn spawn(&self, spec: &LaunchSpec) -> Result<HandleId, RunError> {
        let handle = ProcessHandle::spawn(spec).map_err(|source| RunError::Process {
            label: spec.label.clone(),
            source,
        })?;
        Ok(self.track(handle))
    }

    /// Takes ownership of an already spawned handle.
    pub fn track(&self, handle: ProcessHandle) -> HandleId {
        let mut state = self.lock();
        let id = HandleId(state.next_id);
        state.next_id += 1;
        state
            .process_groups
            .insert(id, (handle.label.clone(), handle.process_group_id));
        state.pending.push(Tracked { id, handle });
        id
    }

    /// Number of handles registered and not yet collected by `wait_all`.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Force-terminates the tree rooted at `id`. A handle that was already
    /// reaped is left alone.
    pub fn kill_tree(&self, id: HandleId, signal: Signal) -> Result<(), RunError> {
        let target = {
            let state = self.lock();
            if state.reaped.contains(&id) {
                None
            } else {
                Some(state.process_groups.get(&id).cloned().ok_or_else(|| {
                    RunError::Process {
                        label: format!("{id:?}"),
                        source: io::Error::new(io::ErrorKind::NotFound, "handle is not tracked"),
                    }
                })?)
            }
        };

        let Some((label, pgid)) = target else {
            debug!(
                component = COMPONENT,
                handle = ?id,
                "handle already reaped; nothing to signal"
            );
            return Ok(());
        };
        signal_process_group(pgid, signal).map_err(|source| RunError::Process { label, source })
    }

    /// Waits until every tracked handle has finished.
    pub async fn wait_all(&self) -> GroupOutcome {
        self.wait_all_within(None).await
    }

    /// Like [`wait_all`](Self::wait_all), but handles still running after
    /// `deadline` are killed and reported as timed out.
    pub async fn wait_all_within(&self, deadline: Option<Duration>) -> GroupOutcome {
        let mut members = Vec::new();

        loop {
            let batch = std::mem::take(&mut self.lock().pending);
            if batch.is_empty() {
                break;
            }
            let waits = batch
                .into_iter()
                .map(|tracked| wait_one(self, tracked, deadline));
            members.extend(join_all(waits).await);
        }

        members.sort_by_key(|member| member.id);
        GroupOutcome { members }
    }

    fn mark_reaped(&self, id: HandleId) {
        let mut state = self.lock();
        state.process_groups.remove(&id);
        state.reaped.insert(id);
    }

    fn lock(&self) -> MutexGuard<'_, GroupState> {
        // The state is plain bookkeeping; a poisoned lock still holds valid data.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn wait_one(
    group: &ProcessGroup,
    tracked: Tracked,
    deadline: Option<Duration>,
) -> MemberOutcome {
    let Tracked { id, mut handle } = tracked;
    let outcome = wait_member(id, &mut handle, deadline).await;
    if handle.has_exited() {
        group.mark_reaped(id);
    }
    outcome
}

async fn wait_member(
    id: HandleId,
    handle: &mut ProcessHandle,
    deadline: Option<Duration>,
) -> MemberOutcome {
    let waited = match deadline {
        None => handle.wait().await.map(Some),
        Some(deadline) => handle.wait_with_timeout(deadline).await,
    };

    match waited {
        Ok(Some(exit)) => MemberOutcome {
            id,
            label: handle.label.clone(),
            exit_code: exit.code,
            succeeded: exit.success(),
            timed_out: false,
            error: None,
        },
        Ok(None) => {
            warn!(
                event = events::GROUP_WAIT_TIMED_OUT,
                component = COMPONENT,
                label = handle.label.as_str(),
                pid = handle.pid,
                "handle still running at the wait deadline; killing its tree"
            );
            let error = handle
                .kill_tree(Signal::Kill)
                .err()
                .map(|err| format!("unable to kill after deadline: {err}"));
            let exit_code = handle.wait().await.ok().and_then(|exit| exit.code);
            MemberOutcome {
                id,
                label: handle.label.clone(),
                exit_code,
                succeeded: false,
                timed_out: true,
                error,
            }
        }
        Err(err) => MemberOutcome {
            id,
            label: handle.label.clone(),
            exit_code: None,
            succeeded: false,
            timed_out: false,
            error: Some(format!("unable to wait: {err}")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::ProcessGroup;
    use crate::process::{LaunchSpec, OutputMode, Signal};
    use std::time::{Duration, Instant};

    fn sh(label: &str, command: &str) -> LaunchSpec {
        LaunchSpec::shell(label, command).stdout(OutputMode::Null)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn wait_all_reports_every_member_even_when_one_fails_early() {
        let group = ProcessGroup::new();
        let fast_fail = group.spawn(&sh("fast-fail", "exit 7")).expect("spawn");
        let slow_ok = group.spawn(&sh("slow-ok", "sleep 0.5; exit 0")).expect("spawn");
        let other_ok = group.spawn(&sh("other-ok", "exit 0")).expect("spawn");

        let started = Instant::now();
        let outcome = group.wait_all().await;

        assert!(started.elapsed() >= Duration::from_millis(400));
        assert_eq!(outcome.members.len(), 3);
        assert!(!outcome.all_succeeded());
        assert_eq!(outcome.get(fast_fail).and_then(|m| m.exit_code), Some(7));
        assert!(outcome.get(slow_ok).map(|m| m.succeeded).unwrap_or(false));
        assert!(outcome.get(other_ok).map(|m| m.succeeded).unwrap_or(false));

        let failed: Vec<&str> = outcome.failures().map(|m| m.label.as_str()).collect();
        assert_eq!(failed, vec!["fast-fail"]);
        assert_eq!(group.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn registration_from_concurrent_tasks_is_collected() {
        let group = ProcessGroup::new();
        let mut tasks = Vec::new();
        for index in 0..8 {
            let group = group.clone();
            tasks.push(tokio::spawn(async move {
                group
                    .spawn(&sh(&format!("member-{index}"), "exit 0"))
                    .expect("spawn")
            }));
        }
        for task in tasks {
            task.await.expect("registration task");
        }

        let outcome = group.wait_all().await;
        assert_eq!(outcome.members.len(), 8);
        assert!(outcome.all_succeeded());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn kill_tree_stops_a_member_while_others_finish() {
        let group = ProcessGroup::new();
        let hung = group.spawn(&sh("hung", "sleep 30")).expect("spawn");
        let ok = group.spawn(&sh("ok", "exit 0")).expect("spawn");

        group.kill_tree(hung, Signal::Kill).expect("kill tree");
        let outcome = group.wait_all().await;

        assert!(!outcome.get(hung).map(|m| m.succeeded).unwrap_or(true));
        assert!(outcome.get(ok).map(|m| m.succeeded).unwrap_or(false));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deadline_kills_stragglers_and_marks_them_timed_out() {
        let group = ProcessGroup::new();
        let hung = group.spawn(&sh("hung", "sleep 30")).expect("spawn");
        let ok = group.spawn(&sh("ok", "exit 0")).expect("spawn");

        let outcome = group
            .wait_all_within(Some(Duration::from_millis(300)))
            .await;

        let hung = outcome.get(hung).expect("hung member reported");
        assert!(hung.timed_out);
        assert!(!hung.succeeded);
        assert!(outcome.get(ok).map(|m| m.succeeded).unwrap_or(false));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn kill_tree_after_reaping_does_not_signal() {
        let group = ProcessGroup::new();
        let done = group.spawn(&sh("done", "exit 0")).expect("spawn");

        let outcome = group.wait_all().await;
        assert!(outcome.all_succeeded());

        group
            .kill_tree(done, Signal::Kill)
            .expect("reaped handle is a no-op");
        assert!(group.lock().process_groups.is_empty());
    }

    #[tokio::test]
    async fn waiting_on_an_empty_group_returns_immediately() {
        let outcome = ProcessGroup::new().wait_all().await;
        assert!(outcome.members.is_empty());
        assert!(outcome.all_succeeded());
    }
}
