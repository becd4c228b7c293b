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

use anyhow::{Context, Result};
use clap::Args;
use fleet_orchestrator::config::{
    CommandTemplates, DatabaseSettings, RunSettings, DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USER,
    DEFAULT_APP_PORT, DEFAULT_BENCH_DIR, DEFAULT_CONTROLLER_DIR, DEFAULT_DB_NAME,
    DEFAULT_DB_PASSWORD, DEFAULT_DB_USER, DEFAULT_DRIVER_RESULT_GLOB,
    DEFAULT_DRIVER_WORKDIR_ROOT, DEFAULT_LOCAL_HOST, DEFAULT_READINESS_DISQUALIFIER,
    DEFAULT_READINESS_PATTERN, DEFAULT_REMOTE_COPY, DEFAULT_REMOTE_DIR, DEFAULT_REMOTE_SHELL,
    DEFAULT_RESULTS_DIR, DEFAULT_SERVER_PORT,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub(crate) fleet: FleetConfig,
    pub(crate) distribution: DistributionConfig,
    pub(crate) transport: TransportConfig,
    pub(crate) database: DatabaseConfig,
    pub(crate) paths: PathsConfig,
    pub(crate) admin: AdminConfig,
    pub(crate) readiness: ReadinessConfig,
    pub(crate) run: RunFlags,
    pub(crate) commands: CommandsConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct FleetConfig {
    pub(crate) servers: Vec<String>,
    pub(crate) drivers: Vec<String>,
    pub(crate) controller: String,
    pub(crate) server_port: u16,
    pub(crate) app_address: String,
    pub(crate) app_port: u16,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            drivers: Vec::new(),
            controller: DEFAULT_LOCAL_HOST.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            app_address: DEFAULT_LOCAL_HOST.to_string(),
            app_port: DEFAULT_APP_PORT,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields, default)]
pub struct DistributionConfig {
    pub(crate) archive: Option<PathBuf>,
    pub(crate) server_config: Option<PathBuf>,
    pub(crate) bench_artifacts: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct TransportConfig {
    pub(crate) remote_shell: String,
    pub(crate) remote_copy: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            remote_shell: DEFAULT_REMOTE_SHELL.to_string(),
            remote_copy: DEFAULT_REMOTE_COPY.to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct DatabaseConfig {
    pub(crate) address: String,
    pub(crate) name: String,
    pub(crate) user: String,
    pub(crate) password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_LOCAL_HOST.to_string(),
            name: DEFAULT_DB_NAME.to_string(),
            user: DEFAULT_DB_USER.to_string(),
            password: DEFAULT_DB_PASSWORD.to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct PathsConfig {
    pub(crate) controller_dir: PathBuf,
    pub(crate) remote_dir: String,
    pub(crate) bench_dir: String,
    pub(crate) driver_workdir_root: String,
    pub(crate) results_dir: PathBuf,
    pub(crate) driver_result_glob: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            controller_dir: PathBuf::from(DEFAULT_CONTROLLER_DIR),
            remote_dir: DEFAULT_REMOTE_DIR.to_string(),
            bench_dir: DEFAULT_BENCH_DIR.to_string(),
            driver_workdir_root: DEFAULT_DRIVER_WORKDIR_ROOT.to_string(),
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            driver_result_glob: DEFAULT_DRIVER_RESULT_GLOB.to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct AdminConfig {
    pub(crate) user: String,
    pub(crate) password: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            user: DEFAULT_ADMIN_USER.to_string(),
            password: DEFAULT_ADMIN_PASSWORD.to_string(),
        }
    }
}

/// An empty `disqualifier` disables it.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct ReadinessConfig {
    pub(crate) pattern: String,
    pub(crate) disqualifier: String,
    pub(crate) timeout_secs: Option<u64>,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_READINESS_PATTERN.to_string(),
            disqualifier: DEFAULT_READINESS_DISQUALIFIER.to_string(),
            timeout_secs: None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields, default)]
pub struct RunFlags {
    pub(crate) skip_prepare: bool,
    pub(crate) skip_loader: bool,
    pub(crate) loader_args: String,
    pub(crate) driver_args: String,
    pub(crate) driver_timeout_secs: Option<u64>,
}

/// Replacements for individual command templates; unset ones keep their default.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields, default)]
pub struct CommandsConfig {
    pub(crate) stage_controller: Option<String>,
    pub(crate) controller: Option<String>,
    pub(crate) server_prepare: Option<String>,
    pub(crate) server_add_user: Option<String>,
    pub(crate) server_start: Option<String>,
    pub(crate) server_stop: Option<String>,
    pub(crate) app_start: Option<String>,
    pub(crate) driver: Option<String>,
    pub(crate) loader: Option<String>,
    pub(crate) report: Option<String>,
}

impl CommandsConfig {
    fn into_templates(self) -> CommandTemplates {
        let defaults = CommandTemplates::default();
        CommandTemplates {
            stage_controller: self.stage_controller.unwrap_or(defaults.stage_controller),
            controller: self.controller.unwrap_or(defaults.controller),
            server_prepare: self.server_prepare.unwrap_or(defaults.server_prepare),
            server_add_user: self.server_add_user.unwrap_or(defaults.server_add_user),
            server_start: self.server_start.unwrap_or(defaults.server_start),
            server_stop: self.server_stop.unwrap_or(defaults.server_stop),
            app_start: self.app_start.unwrap_or(defaults.app_start),
            driver: self.driver.unwrap_or(defaults.driver),
            loader: self.loader.unwrap_or(defaults.loader),
            report: self.report.unwrap_or(defaults.report),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        json5::from_str(&contents)
            .with_context(|| format!("unable to parse config file {}", path.display()))
    }

    pub fn into_settings(self) -> RunSettings {
        RunSettings {
            server_hosts: self.fleet.servers,
            driver_hosts: self.fleet.drivers,
            dist_archive: self.distribution.archive,
            remote_shell: self.transport.remote_shell,
            remote_copy: self.transport.remote_copy,
            controller_address: self.fleet.controller,
            database: DatabaseSettings {
                address: self.database.address,
                name: self.database.name,
                user: self.database.user,
                password: self.database.password,
            },
            controller_dir: self.paths.controller_dir,
            server_port: self.fleet.server_port,
            app_address: self.fleet.app_address,
            app_port: self.fleet.app_port,
            loader_args: self.run.loader_args,
            driver_args: self.run.driver_args,
            skip_prepare: self.run.skip_prepare,
            skip_loader: self.run.skip_loader,
            server_config: self.distribution.server_config,
            bench_artifacts: self.distribution.bench_artifacts,
            remote_dir: self.paths.remote_dir,
            bench_dir: self.paths.bench_dir,
            driver_workdir_root: self.paths.driver_workdir_root,
            results_dir: self.paths.results_dir,
            driver_result_glob: self.paths.driver_result_glob,
            admin_user: self.admin.user,
            admin_password: self.admin.password,
            readiness_pattern: self.readiness.pattern,
            readiness_disqualifier: Some(self.readiness.disqualifier)
                .filter(|pattern| !pattern.is_empty()),
            readiness_timeout: self.readiness.timeout_secs.map(Duration::from_secs),
            driver_timeout: self.run.driver_timeout_secs.map(Duration::from_secs),
            commands: self.commands.into_templates(),
        }
    }
}

/// Command-line settings that win over the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct Overrides {
    /// Comma-separated server addresses, in order.
    #[arg(long, env = "FLEET_SERVERS", value_delimiter = ',')]
    pub(crate) servers: Option<Vec<String>>,

    /// Comma-separated driver addresses; the position is the driver index.
    #[arg(long, env = "FLEET_DRIVERS", value_delimiter = ',')]
    pub(crate) drivers: Option<Vec<String>>,

    /// Packaged server distribution archive.
    #[arg(long, env = "FLEET_DIST", value_name = "PATH")]
    pub(crate) dist: Option<PathBuf>,

    #[arg(long, env = "FLEET_SKIP_PREPARE")]
    pub(crate) skip_prepare: bool,

    #[arg(long, env = "FLEET_SKIP_LOADER")]
    pub(crate) skip_loader: bool,

    #[arg(long, value_name = "SECS")]
    pub(crate) readiness_timeout_secs: Option<u64>,

    #[arg(long, value_name = "SECS")]
    pub(crate) driver_timeout_secs: Option<u64>,
}

impl Overrides {
    pub fn apply(&self, settings: &mut RunSettings) {
        if let Some(servers) = &self.servers {
            settings.server_hosts = servers.clone();
        }
        if let Some(drivers) = &self.drivers {
            settings.driver_hosts = drivers.clone();
        }
        if let Some(dist) = &self.dist {
            settings.dist_archive = Some(dist.clone());
        }
        settings.skip_prepare |= self.skip_prepare;
        settings.skip_loader |= self.skip_loader;
        if let Some(secs) = self.readiness_timeout_secs {
            settings.readiness_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = self.driver_timeout_secs {
            settings.driver_timeout = Some(Duration::from_secs(secs));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, Overrides};
    use fleet_orchestrator::config::RunConfig;
    use fleet_orchestrator::error::RunError;
    use std::path::PathBuf;
    use std::time::Duration;

    const SAMPLE: &str = include_str!("../CONFIG.json5");

    #[test]
    fn sample_config_parses_into_valid_settings() {
        let config: Config = json5::from_str(SAMPLE).unwrap();
        let run_config = RunConfig::from_settings(config.into_settings()).unwrap();

        assert_eq!(
            run_config.server_list(),
            "perf-server-1:8080,perf-server-2:8080,"
        );
        assert_eq!(run_config.driver_list(), "perf-driver-1,perf-driver-2");
        assert_eq!(run_config.settings().database.name, "bench");
        assert_eq!(run_config.settings().loader_args, "--rows 100000");
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: Config = json5::from_str(
            "{ fleet: { servers: ['s1'], drivers: ['d1'] }, \
             distribution: { archive: 'dist.tgz' } }",
        )
        .unwrap();
        let settings = config.into_settings();

        assert_eq!(settings.remote_shell, "ssh");
        assert_eq!(settings.remote_copy, "scp");
        assert_eq!(settings.controller_dir, PathBuf::from("/tmp/master"));
        assert_eq!(settings.database.user, "test");
        assert_eq!(settings.readiness_disqualifier.as_deref(), Some("Host Controller"));
        assert_eq!(settings.readiness_timeout, None);
        assert!(!settings.skip_prepare);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed = json5::from_str::<Config>("{ fleet: { servres: ['s1'] } }");
        assert!(parsed.is_err());
    }

    #[test]
    fn command_line_overrides_win() {
        let config: Config =
            json5::from_str("{ fleet: { servers: ['s1'], drivers: ['d1'] } }").unwrap();
        let mut settings = config.into_settings();
        let overrides = Overrides {
            servers: Some(vec!["a".to_string(), "b".to_string()]),
            dist: Some(PathBuf::from("other.tgz")),
            skip_loader: true,
            readiness_timeout_secs: Some(90),
            ..Overrides::default()
        };

        overrides.apply(&mut settings);

        assert_eq!(settings.server_hosts, ["a", "b"]);
        assert_eq!(settings.driver_hosts, ["d1"]);
        assert_eq!(settings.dist_archive, Some(PathBuf::from("other.tgz")));
        assert!(settings.skip_loader);
        assert_eq!(settings.readiness_timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn missing_archive_is_a_configuration_error() {
        let config: Config =
            json5::from_str("{ fleet: { servers: ['s1'], drivers: ['d1'] } }").unwrap();

        let err = RunConfig::from_settings(config.into_settings()).unwrap_err();
        assert!(matches!(
            err,
            RunError::ConfigurationMissing("distribution archive path")
        ));
    }

    #[test]
    fn load_reports_the_file_on_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.json5");
        std::fs::write(&path, "{ fleet: ").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("fleet.json5"));
    }
}
