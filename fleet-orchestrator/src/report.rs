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

use crate::phase::{PhaseTiming, RunPhase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const RUN_REPORT_SCHEMA_VERSION: &str = "1.0";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadinessRecord {
    pub host: String,
    pub line: String,
    pub elapsed_ms: u128,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverRecord {
    pub index: usize,
    pub host: String,
    pub exit_code: Option<i32>,
    pub succeeded: bool,
    pub timed_out: bool,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferRecord {
    pub index: usize,
    pub host: String,
    pub local_dir: String,
    pub succeeded: bool,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: String,
    pub final_phase: RunPhase,
    pub pass: bool,
    pub exit_code: i32,
    pub phase_timings: Vec<PhaseTiming>,
    pub readiness: Vec<ReadinessRecord>,
    pub drivers: Vec<DriverRecord>,
    pub transfers: Vec<TransferRecord>,
    pub failures: Vec<String>,
    pub failure_reason: Option<String>,
    pub start_ts: String,
    pub end_ts: String,
    pub duration_ms: u128,
}

pub fn write_run_report(report: &RunReport, results_dir: &Path) -> io::Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(results_dir)?;

    let run_report_json = results_dir.join("run-report.json");
    let run_report_txt = results_dir.join("run-report.txt");

    let json_payload = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
    fs::write(&run_report_json, json_payload)?;
    fs::write(&run_report_txt, render_run_summary_text(report))?;

    Ok((run_report_json, run_report_txt))
}

pub fn load_run_report(report_path: &Path) -> io::Result<RunReport> {
    let payload = fs::read_to_string(report_path)?;
    serde_json::from_str(&payload).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

pub fn timestamp_to_string(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339()
}

fn render_run_summary_text(report: &RunReport) -> String {
    let mut lines = vec![
        format!("status: {}", if report.pass { "PASS" } else { "FAIL" }),
        format!("final_phase: {}", report.final_phase),
        format!("exit_code: {}", report.exit_code),
        format!("duration_ms: {}", report.duration_ms),
    ];

    if let Some(reason) = &report.failure_reason {
        lines.push(format!("failure_reason: {reason}"));
    }

    lines.push("phase_timings:".to_string());
    for timing in &report.phase_timings {
        lines.push(format!(
            "  - {} {:?} (duration_ms={})",
            timing.phase, timing.status, timing.duration_ms
        ));
    }

    lines.push("readiness:".to_string());
    for ready in &report.readiness {
        lines.push(format!(
            "  - {} after {}ms: {}",
            ready.host, ready.elapsed_ms, ready.line
        ));
    }

    lines.push("drivers:".to_string());
    for driver in &report.drivers {
        lines.push(format!(
            "  - [{}] {}: {}{}",
            driver.index,
            driver.host,
            if driver.succeeded { "OK" } else { "FAILED" },
            driver
                .error
                .as_deref()
                .map(|error| format!(" ({error})"))
                .unwrap_or_default()
        ));
    }

    lines.push("transfers:".to_string());
    for transfer in &report.transfers {
        lines.push(format!(
            "  - [{}] {} -> {}: {}",
            transfer.index,
            transfer.host,
            transfer.local_dir,
            if transfer.succeeded { "OK" } else { "FAILED" }
        ));
    }

    lines
        .into_iter()
        .chain(report.failures.iter().map(|failure| format!("failed: {failure}")))
        .collect::<Vec<String>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::{
        load_run_report, write_run_report, DriverRecord, RunReport, RUN_REPORT_SCHEMA_VERSION,
    };
    use crate::phase::RunPhase;

    fn report() -> RunReport {
        RunReport {
            schema_version: RUN_REPORT_SCHEMA_VERSION.to_string(),
            final_phase: RunPhase::Done,
            pass: false,
            exit_code: 1,
            phase_timings: Vec::new(),
            readiness: Vec::new(),
            drivers: vec![DriverRecord {
                index: 1,
                host: "d2".to_string(),
                exit_code: Some(3),
                succeeded: false,
                timed_out: false,
                error: Some("exited with status 3".to_string()),
            }],
            transfers: Vec::new(),
            failures: vec!["driver on 'd2' failed: exited with status 3".to_string()],
            failure_reason: None,
            start_ts: "2026-01-01T00:00:00+00:00".to_string(),
            end_ts: "2026-01-01T00:00:01+00:00".to_string(),
            duration_ms: 1000,
        }
    }

    #[test]
    fn writes_json_and_text_next_to_results() {
        let dir = tempfile::tempdir().unwrap();
        let (json, txt) = write_run_report(&report(), &dir.path().join("nested")).unwrap();

        let loaded = load_run_report(&json).unwrap();
        assert_eq!(loaded.final_phase, RunPhase::Done);
        assert_eq!(loaded.drivers[0].host, "d2");

        let text = std::fs::read_to_string(txt).unwrap();
        assert!(text.starts_with("status: FAIL"));
        assert!(text.contains("  - [1] d2: FAILED (exited with status 3)"));
        assert!(text.ends_with("failed: driver on 'd2' failed: exited with status 3"));
    }
}
