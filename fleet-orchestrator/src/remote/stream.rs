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

//! Live output channel of one in-flight remote command.

use crate::error::RemoteError;
use crate::observability::events;
use crate::process::ProcessHandle;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const COMPONENT: &str = "remote_stream";

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Line-oriented view over a remote command's standard output.
///
/// The stream owns the local transport process, if any; it is reaped when the
/// stream reaches end of output, either while reading or while draining.
pub struct RemoteStream {
    host: String,
    reader: BufReader<BoxedReader>,
    process: Option<ProcessHandle>,
    buffer: Vec<u8>,
}

impl RemoteStream {
    /// Wraps a spawned transport process whose stdout was piped.
    pub fn from_process(
        host: impl Into<String>,
        mut process: ProcessHandle,
    ) -> Result<Self, RemoteError> {
        let host = host.into();
        let stdout = process.take_stdout().ok_or_else(|| RemoteError::Io {
            host: host.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "transport process has no piped stdout",
            ),
        })?;

        Ok(Self {
            host,
            reader: BufReader::new(Box::new(stdout) as BoxedReader),
            process: Some(process),
            buffer: Vec::new(),
        })
    }

    /// A stream over any byte source; used for tests and local replays.
    pub fn from_reader(
        host: impl Into<String>,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            host: host.into(),
            reader: BufReader::new(Box::new(reader) as BoxedReader),
            process: None,
            buffer: Vec::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Next output line without its terminator, or `None` at end of output.
    /// Invalid UTF-8 is replaced rather than rejected.
    pub async fn next_line(&mut self) -> Result<Option<String>, RemoteError> {
        self.buffer.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.buffer)
            .await
            .map_err(|source| RemoteError::Io {
                host: self.host.clone(),
                source,
            })?;

        if read == 0 {
            self.reap().await;
            return Ok(None);
        }

        let line = String::from_utf8_lossy(&self.buffer);
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Moves the stream into a background task that discards all further
    /// output until end of stream, so the producer never blocks on a full pipe.
    pub fn drain(self) -> DrainHandle {
        let host = self.host.clone();
        DrainHandle::from_task(host, tokio::spawn(drain_to_end(self)))
    }

    /// Discards output on the current task until end of stream.
    pub(crate) async fn drain_in_place(self) -> DrainSummary {
        drain_to_end(self).await
    }

    /// Exit code of the transport process, once it has been reaped.
    pub fn exit_code(&self) -> Option<i32> {
        self.process
            .as_ref()
            .and_then(|process| process.exit_outcome())
            .and_then(|exit| exit.code)
    }

    async fn reap(&mut self) {
        if let Some(process) = self.process.as_mut() {
            if let Err(err) = process.wait().await {
                warn!(
                    component = COMPONENT,
                    host = self.host.as_str(),
                    err = %err,
                    "unable to reap transport process"
                );
            }
        }
    }
}

/// What a drain task observed before its stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainSummary {
    pub host: String,
    pub bytes_discarded: u64,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

/// Handle to a background drain task.
#[derive(Debug)]
pub struct DrainHandle {
    host: String,
    join: JoinHandle<DrainSummary>,
}

impl DrainHandle {
    /// Wraps a task that owns a stream and ends with its drain summary.
    pub(crate) fn from_task(host: String, join: JoinHandle<DrainSummary>) -> Self {
        Self { host, join }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the stream to end.
    pub async fn finish(self) -> Option<DrainSummary> {
        self.join.await.ok()
    }

    /// Waits up to `timeout`; `None` if the stream is still producing output.
    /// The drain keeps running in the background either way.
    pub async fn finish_within(self, timeout: Duration) -> Option<DrainSummary> {
        tokio::time::timeout(timeout, self.join)
            .await
            .ok()
            .and_then(Result::ok)
    }
}

async fn drain_to_end(mut stream: RemoteStream) -> DrainSummary {
    debug!(
        event = events::DRAIN_START,
        component = COMPONENT,
        host = stream.host.as_str(),
        "draining remote output"
    );

    let copied = tokio::io::copy(&mut stream.reader, &mut tokio::io::sink()).await;
    stream.reap().await;

    let (bytes_discarded, error) = match copied {
        Ok(bytes) => (bytes, None),
        Err(err) => (0, Some(err.to_string())),
    };
    let summary = DrainSummary {
        exit_code: stream.exit_code(),
        host: stream.host,
        bytes_discarded,
        error,
    };

    debug!(
        event = events::DRAIN_FINISHED,
        component = COMPONENT,
        host = summary.host.as_str(),
        bytes = summary.bytes_discarded,
        exit_code = ?summary.exit_code,
        "remote output ended"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::RemoteStream;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn next_line_strips_terminators_and_reports_end() {
        let input: &[u8] = b"first\r\nsecond\nlast-without-newline";
        let mut stream = RemoteStream::from_reader("s1", input);

        assert_eq!(stream.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(stream.next_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(
            stream.next_line().await.unwrap().as_deref(),
            Some("last-without-newline")
        );
        assert_eq!(stream.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced_not_fatal() {
        let input: &[u8] = b"ok \xff\xfe line\n";
        let mut stream = RemoteStream::from_reader("s1", input);

        let line = stream.next_line().await.unwrap().expect("one line");
        assert!(line.starts_with("ok "));
        assert!(line.ends_with(" line"));
    }

    #[tokio::test]
    async fn drain_keeps_a_small_pipe_flowing() {
        let (mut producer, consumer) = tokio::io::duplex(64);
        let stream = RemoteStream::from_reader("s1", consumer);
        let drain = stream.drain();

        let payload = vec![b'x'; 1 << 20];
        tokio::time::timeout(Duration::from_secs(5), producer.write_all(&payload))
            .await
            .expect("producer must not block while the stream drains")
            .expect("write");
        drop(producer);

        let summary = drain.finish().await.expect("drain task");
        assert_eq!(summary.bytes_discarded, 1 << 20);
        assert_eq!(summary.host, "s1");
    }
}
