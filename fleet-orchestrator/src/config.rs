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

//! Immutable run configuration and the host model derived from it.
//!
//! [`RunSettings`] is the mutable input produced by a config loader; it is
//! validated once by [`RunConfig::from_settings`] and never changes afterwards.

use crate::error::RunError;
use crate::template::Bindings;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_REMOTE_SHELL: &str = "ssh";
pub const DEFAULT_REMOTE_COPY: &str = "scp";
pub const DEFAULT_LOCAL_HOST: &str = "localhost";
pub const DEFAULT_DB_NAME: &str = "test";
pub const DEFAULT_DB_USER: &str = "test";
pub const DEFAULT_DB_PASSWORD: &str = "test";
pub const DEFAULT_CONTROLLER_DIR: &str = "/tmp/master";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_APP_PORT: u16 = 8080;
pub const DEFAULT_REMOTE_DIR: &str = "/tmp/server";
pub const DEFAULT_BENCH_DIR: &str = "/tmp/bench";
pub const DEFAULT_DRIVER_WORKDIR_ROOT: &str = "/tmp/driver";
pub const DEFAULT_RESULTS_DIR: &str = "results";
pub const DEFAULT_DRIVER_RESULT_GLOB: &str = "*.log";
pub const DEFAULT_ADMIN_USER: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";
pub const DEFAULT_READINESS_PATTERN: &str = "started in";
pub const DEFAULT_READINESS_DISQUALIFIER: &str = "Host Controller";

/// The role a host plays in the fleet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostRole {
    Controller,
    Server,
    Driver,
    App,
}

impl HostRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Controller => "controller",
            Self::Server => "server",
            Self::Driver => "driver",
            Self::App => "app",
        }
    }
}

/// An address tagged with its role.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Host {
    pub address: String,
    pub role: HostRole,
}

impl Host {
    pub fn new(address: impl Into<String>, role: HostRole) -> Self {
        Self {
            address: address.into(),
            role,
        }
    }
}

impl Display for Host {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.address)
    }
}

/// Connection settings injected into the controller configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub address: String,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            address: DEFAULT_LOCAL_HOST.to_string(),
            name: DEFAULT_DB_NAME.to_string(),
            user: DEFAULT_DB_USER.to_string(),
            password: DEFAULT_DB_PASSWORD.to_string(),
        }
    }
}

/// Command templates, rendered with [`crate::template::render`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandTemplates {
    /// Local command that unpacks the distribution and templates the controller config.
    pub stage_controller: String,
    /// Local command that runs the controller in the foreground.
    pub controller: String,
    pub server_prepare: String,
    pub server_add_user: String,
    pub server_start: String,
    pub server_stop: String,
    pub app_start: String,
    pub driver: String,
    /// Local loader invocation.
    pub loader: String,
    /// Local report invocation.
    pub report: String,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self {
            stage_controller: concat!(
                "mkdir -p {controller_dir} && tar -xzf {dist} -C {controller_dir} && ",
                "sed -i -e 's/@DB_ADDRESS@/{db_address:sed}/g' ",
                "-e 's/@DB_NAME@/{db_name:sed}/g' -e 's/@DB_USER@/{db_user:sed}/g' ",
                "-e 's/@DB_PASSWORD@/{db_password:sed}/g' ",
                "{controller_dir}/configuration/domain.xml"
            )
            .to_string(),
            controller: "{controller_dir}/bin/domain.sh".to_string(),
            server_prepare: "tar -xzf {remote_dist} -C {remote_dir}".to_string(),
            server_add_user: "{remote_dir}/bin/add-user.sh {admin_user:sh} {admin_password:sh}"
                .to_string(),
            server_start: "{remote_dir}/bin/host.sh --master-address={controller} --host={host}"
                .to_string(),
            server_stop: "{remote_dir}/bin/stop.sh".to_string(),
            app_start: "{bench_dir}/bin/app --port={app_port}".to_string(),
            driver: concat!(
                "mkdir -p {workdir} && {bench_dir}/bin/driver --index {index} ",
                "--drivers {driver_list} --servers {server_list} --app {app} ",
                "--workdir {workdir} {extra}"
            )
            .to_string(),
            loader: "bench/bin/loader --servers {server_list} {extra}".to_string(),
            report: "bench/bin/report {results_dir}".to_string(),
        }
    }
}

/// Raw settings as produced by a config loader. Every optional setting has a default.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSettings {
    pub server_hosts: Vec<String>,
    pub driver_hosts: Vec<String>,
    pub dist_archive: Option<PathBuf>,
    pub remote_shell: String,
    pub remote_copy: String,
    pub controller_address: String,
    pub database: DatabaseSettings,
    pub controller_dir: PathBuf,
    pub server_port: u16,
    pub app_address: String,
    pub app_port: u16,
    pub loader_args: String,
    pub driver_args: String,
    pub skip_prepare: bool,
    pub skip_loader: bool,
    /// Optional server configuration file copied next to the distribution.
    pub server_config: Option<PathBuf>,
    /// Local directory of benchmark artifacts staged on drivers and the app host.
    pub bench_artifacts: Option<PathBuf>,
    pub remote_dir: String,
    pub bench_dir: String,
    pub driver_workdir_root: String,
    pub results_dir: PathBuf,
    pub driver_result_glob: String,
    pub admin_user: String,
    pub admin_password: String,
    pub readiness_pattern: String,
    pub readiness_disqualifier: Option<String>,
    pub readiness_timeout: Option<Duration>,
    pub driver_timeout: Option<Duration>,
    pub commands: CommandTemplates,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            server_hosts: Vec::new(),
            driver_hosts: Vec::new(),
            dist_archive: None,
            remote_shell: DEFAULT_REMOTE_SHELL.to_string(),
            remote_copy: DEFAULT_REMOTE_COPY.to_string(),
            controller_address: DEFAULT_LOCAL_HOST.to_string(),
            database: DatabaseSettings::default(),
            controller_dir: PathBuf::from(DEFAULT_CONTROLLER_DIR),
            server_port: DEFAULT_SERVER_PORT,
            app_address: DEFAULT_LOCAL_HOST.to_string(),
            app_port: DEFAULT_APP_PORT,
            loader_args: String::new(),
            driver_args: String::new(),
            skip_prepare: false,
            skip_loader: false,
            server_config: None,
            bench_artifacts: None,
            remote_dir: DEFAULT_REMOTE_DIR.to_string(),
            bench_dir: DEFAULT_BENCH_DIR.to_string(),
            driver_workdir_root: DEFAULT_DRIVER_WORKDIR_ROOT.to_string(),
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            driver_result_glob: DEFAULT_DRIVER_RESULT_GLOB.to_string(),
            admin_user: DEFAULT_ADMIN_USER.to_string(),
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            readiness_pattern: DEFAULT_READINESS_PATTERN.to_string(),
            readiness_disqualifier: Some(DEFAULT_READINESS_DISQUALIFIER.to_string()),
            readiness_timeout: None,
            driver_timeout: None,
            commands: CommandTemplates::default(),
        }
    }
}

/// Validated, immutable configuration for one run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    controller: Host,
    servers: Vec<Host>,
    drivers: Vec<Host>,
    app: Host,
    dist_archive: PathBuf,
    settings: RunSettings,
}

impl RunConfig {
    /// Validates the required settings and derives the host model.
    pub fn from_settings(settings: RunSettings) -> Result<Self, RunError> {
        let servers: Vec<Host> = settings
            .server_hosts
            .iter()
            .map(|address| address.trim())
            .filter(|address| !address.is_empty())
            .map(|address| Host::new(address, HostRole::Server))
            .collect();
        if servers.is_empty() {
            return Err(RunError::ConfigurationMissing("server hosts"));
        }

        let drivers: Vec<Host> = settings
            .driver_hosts
            .iter()
            .map(|address| address.trim())
            .filter(|address| !address.is_empty())
            .map(|address| Host::new(address, HostRole::Driver))
            .collect();
        if drivers.is_empty() {
            return Err(RunError::ConfigurationMissing("driver hosts"));
        }

        let dist_archive = settings
            .dist_archive
            .clone()
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(RunError::ConfigurationMissing("distribution archive path"))?;

        Ok(Self {
            controller: Host::new(settings.controller_address.clone(), HostRole::Controller),
            app: Host::new(settings.app_address.clone(), HostRole::App),
            servers,
            drivers,
            dist_archive,
            settings,
        })
    }

    pub fn controller(&self) -> &Host {
        &self.controller
    }

    pub fn servers(&self) -> &[Host] {
        &self.servers
    }

    pub fn drivers(&self) -> &[Host] {
        &self.drivers
    }

    pub fn app(&self) -> &Host {
        &self.app
    }

    pub fn dist_archive(&self) -> &Path {
        &self.dist_archive
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// `s1:8080,s2:8080,`: every server with the server port, in input order.
    pub fn server_list(&self) -> String {
        self.servers
            .iter()
            .map(|server| format!("{}:{},", server.address, self.settings.server_port))
            .collect()
    }

    pub fn driver_list(&self) -> String {
        self.drivers
            .iter()
            .map(|driver| driver.address.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn app_endpoint(&self) -> String {
        format!("{}:{}", self.app.address, self.settings.app_port)
    }

    /// Private working directory of the driver at `index` on its host.
    pub fn driver_workdir(&self, index: usize) -> String {
        format!(
            "{}/driver-{index}",
            self.settings.driver_workdir_root.trim_end_matches('/')
        )
    }

    /// Local directory collecting the results pulled from the driver at `index`.
    pub fn driver_results_dir(&self, index: usize) -> PathBuf {
        self.settings.results_dir.join(format!("driver-{index}"))
    }

    /// Placeholder values shared by every command template. Per-host values
    /// (`host`, `index`, `workdir`, `extra`) are added by the caller.
    pub fn bindings(&self) -> Bindings {
        let settings = &self.settings;
        Bindings::new()
            .with("controller", self.controller.address.clone())
            .with("controller_dir", settings.controller_dir.display().to_string())
            .with("dist", self.dist_archive.display().to_string())
            .with("remote_dist", self.remote_archive_path())
            .with("remote_dir", settings.remote_dir.clone())
            .with("bench_dir", settings.bench_dir.clone())
            .with("server_list", self.server_list())
            .with("driver_list", self.driver_list())
            .with("app", self.app_endpoint())
            .with("app_port", settings.app_port.to_string())
            .with("results_dir", settings.results_dir.display().to_string())
            .with("admin_user", settings.admin_user.clone())
            .with("admin_password", settings.admin_password.clone())
            .with("db_address", settings.database.address.clone())
            .with("db_name", settings.database.name.clone())
            .with("db_user", settings.database.user.clone())
            .with("db_password", settings.database.password.clone())
    }

    pub fn remote_archive_path(&self) -> String {
        let file_name = self
            .dist_archive
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dist.tar.gz".to_string());
        format!("{}/{file_name}", self.settings.remote_dir.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::{HostRole, RunConfig, RunSettings};
    use crate::error::RunError;
    use std::path::PathBuf;

    fn settings(servers: &[&str], drivers: &[&str]) -> RunSettings {
        RunSettings {
            server_hosts: servers.iter().map(|s| s.to_string()).collect(),
            driver_hosts: drivers.iter().map(|s| s.to_string()).collect(),
            dist_archive: Some(PathBuf::from("/build/server-dist.tar.gz")),
            ..RunSettings::default()
        }
    }

    #[test]
    fn server_list_suffixes_port_in_input_order() {
        let config = RunConfig::from_settings(settings(&["s1", "s2"], &["d1"]))
            .expect("valid settings");

        assert_eq!(config.server_list(), "s1:8080,s2:8080,");
    }

    #[test]
    fn server_list_uses_configured_port_and_keeps_every_address_once() {
        let mut input = settings(&["c", "a", "b"], &["d1"]);
        input.server_port = 9990;
        let config = RunConfig::from_settings(input).expect("valid settings");
        let list = config.server_list();

        assert_eq!(list, "c:9990,a:9990,b:9990,");
        for server in ["c", "a", "b"] {
            assert_eq!(list.matches(&format!("{server}:9990,")).count(), 1);
        }
    }

    #[test]
    fn missing_servers_drivers_or_archive_are_rejected() {
        let no_servers = RunConfig::from_settings(settings(&[], &["d1"]));
        assert!(matches!(
            no_servers,
            Err(RunError::ConfigurationMissing("server hosts"))
        ));

        let no_drivers = RunConfig::from_settings(settings(&["s1"], &[" "]));
        assert!(matches!(
            no_drivers,
            Err(RunError::ConfigurationMissing("driver hosts"))
        ));

        let mut no_archive = settings(&["s1"], &["d1"]);
        no_archive.dist_archive = None;
        assert!(matches!(
            RunConfig::from_settings(no_archive),
            Err(RunError::ConfigurationMissing("distribution archive path"))
        ));
    }

    #[test]
    fn derived_paths_and_roles() {
        let config = RunConfig::from_settings(settings(&["s1"], &["d1", "d2"]))
            .expect("valid settings");

        assert_eq!(config.driver_list(), "d1,d2");
        assert_eq!(config.app_endpoint(), "localhost:8080");
        assert_eq!(config.driver_workdir(1), "/tmp/driver/driver-1");
        assert_eq!(
            config.driver_results_dir(0),
            PathBuf::from("results").join("driver-0")
        );
        assert_eq!(config.remote_archive_path(), "/tmp/server/server-dist.tar.gz");
        assert!(config.drivers().iter().all(|d| d.role == HostRole::Driver));
        assert_eq!(config.controller().role, HostRole::Controller);
    }

    #[test]
    fn shared_bindings_render_the_default_server_start() {
        let mut input = settings(&["s1"], &["d1"]);
        input.controller_address = "10.0.0.1".to_string();
        let config = RunConfig::from_settings(input).expect("valid settings");

        let command = config
            .bindings()
            .with("host", "s1")
            .render(&config.settings().commands.server_start);

        assert_eq!(
            command,
            "/tmp/server/bin/host.sh --master-address=10.0.0.1 --host=s1"
        );
        assert_eq!(config.bindings().get("db_user"), Some("test"));
    }

    #[test]
    fn secrets_are_escaped_in_the_default_commands() {
        let mut input = settings(&["s1"], &["d1"]);
        input.database.password = "a/b&c'd".to_string();
        input.admin_password = "pa ss".to_string();
        let config = RunConfig::from_settings(input).expect("valid settings");
        let commands = &config.settings().commands;

        let stage = config.bindings().render(&commands.stage_controller);
        assert!(stage.contains("-e 's/@DB_PASSWORD@/a\\/b\\&c'\\''d/g'"));

        let add_user = config.bindings().render(&commands.server_add_user);
        assert!(add_user.ends_with("add-user.sh admin 'pa ss'"));
    }
}
