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

//! Canonical structured event names used across `fleet-orchestrator`.

// Phase machine events.
pub const PHASE_ENTER: &str = "phase_enter";
pub const PHASE_EXIT: &str = "phase_exit";
pub const PHASE_SKIPPED: &str = "phase_skipped";
pub const PHASE_FAILED: &str = "phase_failed";
pub const RUN_COMPLETE: &str = "run_complete";

// Remote execution events.
pub const REMOTE_RUN_START: &str = "remote_run_start";
pub const REMOTE_RUN_OK: &str = "remote_run_ok";
pub const REMOTE_RUN_FAILED: &str = "remote_run_failed";
pub const REMOTE_STREAM_OPEN: &str = "remote_stream_open";
pub const REMOTE_COPY_START: &str = "remote_copy_start";
pub const REMOTE_COPY_FAILED: &str = "remote_copy_failed";

// Readiness watcher events.
pub const READINESS_OBSERVED: &str = "readiness_observed";
pub const READINESS_LINE_DISQUALIFIED: &str = "readiness_line_disqualified";
pub const READINESS_STREAM_CLOSED: &str = "readiness_stream_closed";
pub const READINESS_TIMED_OUT: &str = "readiness_timed_out";
pub const DRAIN_START: &str = "drain_start";
pub const DRAIN_FINISHED: &str = "drain_finished";

// Process group events.
pub const PROCESS_SPAWN: &str = "process_spawn";
pub const PROCESS_EXIT: &str = "process_exit";
pub const PROCESS_KILL_TREE: &str = "process_kill_tree";
pub const GROUP_WAIT_TIMED_OUT: &str = "group_wait_timed_out";

// Orchestrator step events.
pub const CONTROLLER_LAUNCH: &str = "controller_launch";
pub const SERVER_START: &str = "server_start";
pub const SERVER_STOP_FAILED: &str = "server_stop_failed";
pub const TEARDOWN_SKIPPED: &str = "teardown_skipped";
pub const HOST_PROVISION_FAILED: &str = "host_provision_failed";
pub const DRIVER_LAUNCH: &str = "driver_launch";
pub const DRIVER_FAILED: &str = "driver_failed";
pub const RESULT_PULL_FAILED: &str = "result_pull_failed";
pub const LOADER_INVOKE: &str = "loader_invoke";
pub const REPORT_INVOKE: &str = "report_invoke";
pub const REPORT_WRITE_FAILED: &str = "report_write_failed";
