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

//! [`RemoteExecutor`] driven by remote-shell / remote-copy command templates.

use super::RemoteExecutor;
use crate::config::{Host, RunConfig};
use crate::error::RemoteError;
use crate::process::LaunchSpec;
use crate::template;
use async_trait::async_trait;

/// Exit status `ssh` uses for its own connection failures.
pub const SSH_TRANSPORT_FAILURE: i32 = 255;

/// Executes commands through template-configured `ssh`/`scp`-style tools.
///
/// A template is split on whitespace. Tokens may carry `{host}` and
/// `{command}` (shell) or `{source}` and `{destination}` (copy); when a
/// template has none of them the operands are appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellExecutor {
    remote_shell: Vec<String>,
    remote_copy: Vec<String>,
}

impl ShellExecutor {
    pub fn new(remote_shell: &str, remote_copy: &str) -> Self {
        Self {
            remote_shell: tokenize(remote_shell, "ssh"),
            remote_copy: tokenize(remote_copy, "scp"),
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(&config.settings().remote_shell, &config.settings().remote_copy)
    }
}

#[async_trait]
impl RemoteExecutor for ShellExecutor {
    fn shell_spec(&self, host: &Host, command: &str) -> LaunchSpec {
        let label = format!("{}@{}", host.role.as_str(), host.address);
        build_spec(
            label,
            &self.remote_shell,
            &[("host", host.address.as_str()), ("command", command)],
            &[host.address.as_str(), command],
            &[],
        )
    }

    fn copy_spec(
        &self,
        host: &Host,
        source: &str,
        destination: &str,
        recursive: bool,
    ) -> LaunchSpec {
        let label = format!("copy@{}", host.address);
        let flags: &[&str] = if recursive { &["-r"] } else { &[] };
        build_spec(
            label,
            &self.remote_copy,
            &[("source", source), ("destination", destination)],
            &[source, destination],
            flags,
        )
    }

    fn remote_path(&self, host: &Host, path: &str) -> String {
        format!("{}:{}", host.address, path)
    }

    fn classify_failure(&self, host: &Host, exit_code: Option<i32>) -> RemoteError {
        if exit_code == Some(SSH_TRANSPORT_FAILURE) {
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

fn tokenize(template: &str, fallback: &str) -> Vec<String> {
    let tokens: Vec<String> = template.split_whitespace().map(str::to_string).collect();
    if tokens.is_empty() {
        vec![fallback.to_string()]
    } else {
        tokens
    }
}

fn build_spec(
    label: String,
    template_tokens: &[String],
    bindings: &[(&str, &str)],
    operands: &[&str],
    flags: &[&str],
) -> LaunchSpec {
    let templated = template_tokens.iter().any(|token| {
        bindings
            .iter()
            .any(|(name, _)| token.contains(&format!("{{{name}}}")))
    });

    let mut tokens = template_tokens.iter();
    let program = tokens.next().cloned().unwrap_or_default();
    let mut spec = LaunchSpec::new(label, program);
    for flag in flags {
        spec = spec.arg(*flag);
    }
    for token in tokens {
        spec = spec.arg(template::render(token, bindings));
    }
    if !templated {
        for operand in operands {
            spec = spec.arg(*operand);
        }
    }
    spec
}

#[cfg(test)]
mod tests {
    use super::{ShellExecutor, SSH_TRANSPORT_FAILURE};
    use crate::config::{Host, HostRole};
    use crate::error::RemoteError;
    use crate::remote::RemoteExecutor;

    fn server() -> Host {
        Host::new("s1.example", HostRole::Server)
    }

    #[test]
    fn default_templates_append_host_and_command() {
        let executor = ShellExecutor::new("ssh", "scp");
        let spec = executor.shell_spec(&server(), "echo hi && uptime");

        assert_eq!(spec.program, "ssh");
        assert_eq!(spec.args, vec!["s1.example", "echo hi && uptime"]);
        assert_eq!(spec.label, "server@s1.example");
    }

    #[test]
    fn extra_transport_options_are_kept() {
        let executor = ShellExecutor::new("ssh -o BatchMode=yes", "scp -q");
        let spec = executor.shell_spec(&server(), "true");
        assert_eq!(spec.args, vec!["-o", "BatchMode=yes", "s1.example", "true"]);

        let copy = executor.copy_spec(&server(), "/local/a.tar", "s1.example:/tmp/a.tar", false);
        assert_eq!(copy.program, "scp");
        assert_eq!(copy.args, vec!["-q", "/local/a.tar", "s1.example:/tmp/a.tar"]);
    }

    #[test]
    fn placeholders_control_operand_position() {
        let executor = ShellExecutor::new(
            "ssh -p 2222 root@{host} {command}",
            "rsync -a {source} {destination}",
        );
        let spec = executor.shell_spec(&server(), "ls /tmp");
        assert_eq!(spec.args, vec!["-p", "2222", "root@s1.example", "ls /tmp"]);

        let copy = executor.copy_spec(&server(), "src", "dst", true);
        assert_eq!(copy.args, vec!["-r", "-a", "src", "dst"]);
    }

    #[test]
    fn remote_path_and_failure_classification() {
        let executor = ShellExecutor::new("", "");
        assert_eq!(executor.remote_path(&server(), "/tmp/*.log"), "s1.example:/tmp/*.log");

        assert!(matches!(
            executor.classify_failure(&server(), Some(SSH_TRANSPORT_FAILURE)),
            RemoteError::UnreachableHost { .. }
        ));
        assert!(matches!(
            executor.classify_failure(&server(), Some(2)),
            RemoteError::RemoteCommandFailed {
                exit_code: Some(2),
                ..
            }
        ));
    }
}
