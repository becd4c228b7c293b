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

use crate::error::RunError;
use crate::observability::events;
use crate::report::timestamp_to_string;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::Instant;
use tracing::{error, info};

const COMPONENT: &str = "phase";

/// Run phases in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Preparing,
    StartingControllerAndServers,
    AwaitingReadiness,
    LoadingData,
    RunningDrivers,
    CollectingResults,
    StoppingFleet,
    Done,
    Failed,
}

impl RunPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::StartingControllerAndServers => "starting_controller_and_servers",
            Self::AwaitingReadiness => "awaiting_readiness",
            Self::LoadingData => "loading_data",
            Self::RunningDrivers => "running_drivers",
            Self::CollectingResults => "collecting_results",
            Self::StoppingFleet => "stopping_fleet",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    fn ordinal(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Preparing => 1,
            Self::StartingControllerAndServers => 2,
            Self::AwaitingReadiness => 3,
            Self::LoadingData => 4,
            Self::RunningDrivers => 5,
            Self::CollectingResults => 6,
            Self::StoppingFleet => 7,
            Self::Done => 8,
            Self::Failed => 9,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Forward moves only, skipping allowed. Every non-terminal phase may fail.
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || next.ordinal() > self.ordinal()
    }
}

impl Display for RunPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub phase: RunPhase,
    pub status: PhaseStatus,
    pub start_ts: String,
    pub end_ts: String,
    pub duration_ms: u128,
}

struct OpenPhase {
    phase: RunPhase,
    start_wall: DateTime<Utc>,
    start_instant: Instant,
}

/// Tracks the active phase and the timing of every phase the run went through.
pub struct PhaseTracker {
    current: RunPhase,
    open: Option<OpenPhase>,
    timings: Vec<PhaseTiming>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: RunPhase::Idle,
            open: None,
            timings: Vec::new(),
        }
    }

    pub fn current(&self) -> RunPhase {
        self.current
    }

    pub fn timings(&self) -> &[PhaseTiming] {
        &self.timings
    }

    pub fn into_timings(self) -> Vec<PhaseTiming> {
        self.timings
    }

    /// Closes the open phase as completed and makes `next` the active one.
    /// Terminal phases are entered without a timing entry.
    pub fn enter(&mut self, next: RunPhase) -> Result<(), RunError> {
        self.check(next)?;
        self.close(PhaseStatus::Completed);
        self.current = next;

        if next.is_terminal() {
            return Ok(());
        }

        info!(
            event = events::PHASE_ENTER,
            component = COMPONENT,
            phase = next.as_str(),
            "entering phase"
        );
        self.open = Some(OpenPhase {
            phase: next,
            start_wall: Utc::now(),
            start_instant: Instant::now(),
        });
        Ok(())
    }

    /// Records `phase` as skipped and moves past it.
    pub fn skip(&mut self, phase: RunPhase) -> Result<(), RunError> {
        self.check(phase)?;
        self.close(PhaseStatus::Completed);
        self.current = phase;

        info!(
            event = events::PHASE_SKIPPED,
            component = COMPONENT,
            phase = phase.as_str(),
            "phase skipped"
        );
        let now = Utc::now();
        self.timings.push(PhaseTiming {
            phase,
            status: PhaseStatus::Skipped,
            start_ts: timestamp_to_string(now),
            end_ts: timestamp_to_string(now),
            duration_ms: 0,
        });
        Ok(())
    }

    /// Marks the active phase as failed. The phase stays current so that
    /// teardown can still be entered from it.
    pub fn fail(&mut self, err: &RunError) {
        error!(
            event = events::PHASE_FAILED,
            component = COMPONENT,
            phase = self.current.as_str(),
            err = %err,
            "phase failed"
        );
        self.close(PhaseStatus::Failed);
    }

    fn check(&self, next: RunPhase) -> Result<(), RunError> {
        if self.current.can_transition_to(next) {
            Ok(())
        } else {
            Err(RunError::InvalidTransition {
                from: self.current.as_str(),
                to: next.as_str(),
            })
        }
    }

    fn close(&mut self, status: PhaseStatus) {
        let Some(open) = self.open.take() else {
            return;
        };
        let duration_ms = open.start_instant.elapsed().as_millis();

        info!(
            event = events::PHASE_EXIT,
            component = COMPONENT,
            phase = open.phase.as_str(),
            status = ?status,
            elapsed_ms = duration_ms as u64,
            "phase finished"
        );
        self.timings.push(PhaseTiming {
            phase: open.phase,
            status,
            start_ts: timestamp_to_string(open.start_wall),
            end_ts: timestamp_to_string(Utc::now()),
            duration_ms,
        });
    }
}
