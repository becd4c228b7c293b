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

//! Watches server output streams for the readiness signature.

use crate::config::RunConfig;
use crate::error::RunError;
use crate::observability::events;
use crate::remote::{DrainHandle, DrainSummary, RemoteStream};
use regex::Regex;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

const COMPONENT: &str = "readiness";

/// Ready when a line matches `ready` and does not match `disqualifier`.
#[derive(Clone, Debug)]
pub struct ReadinessSignature {
    ready: Regex,
    disqualifier: Option<Regex>,
}

impl ReadinessSignature {
    pub fn new(ready: &str, disqualifier: Option<&str>) -> Result<Self, RunError> {
        let ready = Regex::new(ready).map_err(|err| RunError::InvalidSetting {
            setting: "readiness pattern",
            detail: err.to_string(),
        })?;
        let disqualifier = disqualifier
            .filter(|pattern| !pattern.is_empty())
            .map(Regex::new)
            .transpose()
            .map_err(|err| RunError::InvalidSetting {
                setting: "readiness disqualifier",
                detail: err.to_string(),
            })?;
        Ok(Self {
            ready,
            disqualifier,
        })
    }

    pub fn from_config(config: &RunConfig) -> Result<Self, RunError> {
        let settings = config.settings();
        Self::new(
            &settings.readiness_pattern,
            settings.readiness_disqualifier.as_deref(),
        )
    }

    pub fn classify(&self, line: &str) -> LineVerdict {
        if !self.ready.is_match(line) {
            return LineVerdict::Unrelated;
        }
        match &self.disqualifier {
            Some(disqualifier) if disqualifier.is_match(line) => LineVerdict::Disqualified,
            _ => LineVerdict::Ready,
        }
    }

    pub fn matches(&self, line: &str) -> bool {
        self.classify(line) == LineVerdict::Ready
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineVerdict {
    Ready,
    /// Matched the ready pattern but also the disqualifier.
    Disqualified,
    Unrelated,
}

/// One server that reported ready, with the line that proved it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadyEvent {
    pub host: String,
    pub line: String,
    pub elapsed: Duration,
}

/// Result of a successful watch. Every stream has exactly one ready event, in
/// arrival order, and keeps draining behind its handle.
#[derive(Debug)]
pub struct ReadinessReport {
    pub ready: Vec<ReadyEvent>,
    pub drains: Vec<DrainHandle>,
}

/// A failed watch. Every stream is still handed back as a drain so its
/// transport can be reaped during teardown.
#[derive(Debug)]
pub struct ReadinessFailure {
    pub error: RunError,
    pub drains: Vec<DrainHandle>,
}

/// Maps the exit status of a server transport that ended before readiness to
/// a more specific error, such as an unreachable host.
pub type ExitClassifier = Box<dyn Fn(&str, Option<i32>) -> Option<RunError> + Send + Sync>;

enum StreamReport {
    Ready {
        index: usize,
        line: String,
    },
    Closed {
        index: usize,
        exit_code: Option<i32>,
        error: Option<String>,
    },
}

/// Concurrently scans one stream per server until each has reported ready.
pub struct ReadinessWatcher {
    signature: ReadinessSignature,
    timeout: Option<Duration>,
    exit_classifier: Option<ExitClassifier>,
}

impl ReadinessWatcher {
    pub fn new(signature: ReadinessSignature) -> Self {
        Self {
            signature,
            timeout: None,
            exit_classifier: None,
        }
    }

    /// Upper bound on the whole watch. `None` waits for as long as the streams stay open.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_exit_classifier<F>(mut self, classify: F) -> Self
    where
        F: Fn(&str, Option<i32>) -> Option<RunError> + Send + Sync + 'static,
    {
        self.exit_classifier = Some(Box::new(classify));
        self
    }

    /// Returns once every stream has produced a qualifying line.
    ///
    /// A stream that ends first fails the watch with `ReadinessNeverObserved`,
    /// or with whatever the exit classifier makes of its transport status.
    /// Each stream is scanned and then drained by one task; its handle is
    /// returned on success and failure alike.
    pub async fn watch(
        &self,
        streams: Vec<RemoteStream>,
    ) -> Result<ReadinessReport, ReadinessFailure> {
        let started = Instant::now();
        let hosts: Vec<String> = streams.iter().map(|s| s.host().to_string()).collect();
        let (sender, mut receiver) = mpsc::unbounded_channel();

        let drains: Vec<DrainHandle> = streams
            .into_iter()
            .enumerate()
            .map(|(index, stream)| {
                let host = stream.host().to_string();
                let task = scan_stream(index, stream, self.signature.clone(), sender.clone());
                DrainHandle::from_task(host, tokio::spawn(task))
            })
            .collect();
        drop(sender);

        let mut is_ready = vec![false; hosts.len()];
        let mut ready = Vec::with_capacity(hosts.len());

        let collect = async {
            while ready.len() < hosts.len() {
                match receiver.recv().await {
                    Some(StreamReport::Ready { index, line }) => {
                        let elapsed = started.elapsed();
                        info!(
                            event = events::READINESS_OBSERVED,
                            component = COMPONENT,
                            host = hosts[index].as_str(),
                            elapsed_ms = elapsed.as_millis() as u64,
                            line = line.as_str(),
                            "server is ready"
                        );
                        is_ready[index] = true;
                        ready.push(ReadyEvent {
                            host: hosts[index].clone(),
                            line,
                            elapsed,
                        });
                    }
                    Some(StreamReport::Closed {
                        index,
                        exit_code,
                        error,
                    }) => {
                        error!(
                            event = events::READINESS_STREAM_CLOSED,
                            component = COMPONENT,
                            host = hosts[index].as_str(),
                            exit_code = ?exit_code,
                            err = error.as_deref().unwrap_or("end of output"),
                            "server output ended before it became ready"
                        );
                        return Err(self.closed_error(&hosts[index], exit_code, error.is_some()));
                    }
                    None => break,
                }
            }
            Ok(())
        };

        let outcome = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, collect).await.ok(),
            None => Some(collect.await),
        };

        match outcome {
            Some(Ok(())) => Ok(ReadinessReport { ready, drains }),
            Some(Err(error)) => Err(ReadinessFailure { error, drains }),
            None => {
                let pending: Vec<String> = hosts
                    .iter()
                    .zip(&is_ready)
                    .filter(|(_, ready)| !**ready)
                    .map(|(host, _)| host.clone())
                    .collect();
                error!(
                    event = events::READINESS_TIMED_OUT,
                    component = COMPONENT,
                    pending = ?pending,
                    "servers did not become ready in time"
                );
                Err(ReadinessFailure {
                    error: RunError::ReadinessTimedOut { pending },
                    drains,
                })
            }
        }
    }

    fn closed_error(&self, host: &str, exit_code: Option<i32>, read_failed: bool) -> RunError {
        let classified = match &self.exit_classifier {
            Some(classify) if !read_failed => classify(host, exit_code),
            _ => None,
        };
        classified.unwrap_or_else(|| RunError::ReadinessNeverObserved {
            host: host.to_string(),
        })
    }
}

/// Reads lines until the signature shows up, reports it, then discards the
/// rest of the stream. Ends when the stream does.
async fn scan_stream(
    index: usize,
    mut stream: RemoteStream,
    signature: ReadinessSignature,
    sender: mpsc::UnboundedSender<StreamReport>,
) -> DrainSummary {
    loop {
        match stream.next_line().await {
            Ok(Some(line)) => match signature.classify(&line) {
                LineVerdict::Ready => {
                    let _ = sender.send(StreamReport::Ready { index, line });
                    return stream.drain_in_place().await;
                }
                LineVerdict::Disqualified => {
                    debug!(
                        event = events::READINESS_LINE_DISQUALIFIED,
                        component = COMPONENT,
                        host = stream.host(),
                        line = line.as_str(),
                        "ignoring line matching the disqualifier"
                    );
                }
                LineVerdict::Unrelated => {}
            },
            Ok(None) => {
                let _ = sender.send(StreamReport::Closed {
                    index,
                    exit_code: stream.exit_code(),
                    error: None,
                });
                return stream.drain_in_place().await;
            }
            Err(err) => {
                let _ = sender.send(StreamReport::Closed {
                    index,
                    exit_code: None,
                    error: Some(err.to_string()),
                });
                return stream.drain_in_place().await;
            }
        }
    }
}
