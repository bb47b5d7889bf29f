//! Backend that drives a live cluster through the orchestration CLI.
//!
//! All tool invocations go through [`RealBackend::run_tool`], which appends
//! the `--environment` flag, parses YAML stdout, and converts a non-zero exit
//! into [`Error::CommandFailed`] carrying the joined command line and the
//! captured diagnostic text. The backend owns no persistent state; every
//! query reflects the orchestrator's live status.

use crate::backend::status::StatusResponse;
use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::exec;
use crate::unit::{parse_unit_name, unit_name, Unit, UnitState};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Default orchestration tool invoked on PATH.
pub const DEFAULT_TOOL: &str = "fleetctl";

/// Grace delay between destroying a unit and releasing its machine, to avoid
/// racing the backend's own unit teardown.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Polling parameters for [`RealBackend::bootstrap`].
#[derive(Debug, Clone)]
pub struct BootstrapWait {
    pub timeout: Duration,
    pub poll: Duration,
}

impl Default for BootstrapWait {
    fn default() -> Self {
        BootstrapWait {
            timeout: Duration::from_secs(600),
            poll: Duration::from_secs(10),
        }
    }
}

/// Options for deploying a charm as a new service.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub config: Option<PathBuf>,
    pub constraints: Option<String>,
    /// Deploy from a local charm repository instead of the store.
    pub local: bool,
    pub repository: Option<PathBuf>,
    pub release: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelationOp {
    Add,
    Remove,
}

/// Relation add/remove failures whose diagnostic indicates the requested
/// relationship already holds (or is already absent) are no-ops, not errors.
fn relation_noop(op: RelationOp, stderr: &str) -> bool {
    match op {
        RelationOp::Add => stderr.contains("already exists"),
        // Covers both "does not exist" and "no such relation exists".
        RelationOp::Remove => stderr.contains("exist"),
    }
}

#[derive(Debug, Clone)]
pub struct RealBackend {
    program: String,
    environment: String,
    grace: Duration,
}

impl RealBackend {
    pub fn new(environment: impl Into<String>) -> Self {
        RealBackend {
            program: DEFAULT_TOOL.to_string(),
            environment: environment.into(),
            grace: DEFAULT_GRACE,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Execute one orchestration command against this environment and parse
    /// its YAML response. Environment destruction needs elevated privileges.
    pub fn run_tool(&self, command: &str, options: &[String]) -> Result<serde_yaml::Value> {
        let mut argv: Vec<String> = Vec::new();
        if command == "destroy-environment" {
            argv.push("sudo".to_string());
        }
        argv.push(self.program.clone());
        argv.push(command.to_string());
        if self.environment != "default" {
            argv.push("--environment".to_string());
            argv.push(self.environment.clone());
        }
        argv.extend(options.iter().cloned());

        let output = exec::run_shell(&argv[0], &argv[1..], None)?;
        if !output.success() {
            return Err(Error::CommandFailed {
                command: argv.join(" "),
                stderr: output.stderr.trim().to_string(),
                exit_code: output.exit_code,
            });
        }
        if output.stdout.trim().is_empty() {
            Ok(serde_yaml::Value::Null)
        } else {
            Ok(serde_yaml::from_str(&output.stdout)?)
        }
    }

    /// Live status of the whole environment.
    pub fn status(&self) -> Result<StatusResponse> {
        let value = self.run_tool("status", &[])?;
        Ok(serde_yaml::from_value(value)?)
    }

    /// One unit's snapshot, failing with [`Error::UnknownEntity`] if the
    /// service or unit is absent.
    pub fn get_unit(&self, service: &str, ordinal: u32) -> Result<Unit> {
        let status = self.status()?;
        let svc = status.services.get(service).ok_or_else(|| {
            Error::UnknownEntity(format!(
                "service {} in environment {}",
                service, self.environment
            ))
        })?;
        let name = unit_name(service, ordinal);
        let unit = svc.units.get(&name).ok_or_else(|| {
            Error::UnknownEntity(format!("unit {} in environment {}", name, self.environment))
        })?;
        Ok(unit.to_unit())
    }

    /// Bootstrap the environment. With `wait`, poll machine `"0"` until it
    /// reaches a started-like state; fail immediately on an error-like state
    /// and with [`Error::Timeout`] once the deadline elapses.
    pub fn bootstrap(&self, wait: Option<&BootstrapWait>) -> Result<serde_yaml::Value> {
        let result = self.run_tool("bootstrap", &[])?;
        if let Some(wait) = wait {
            let deadline = Instant::now() + wait.timeout;
            loop {
                let status = self.status()?;
                let state = status
                    .machines
                    .get("0")
                    .and_then(|m| m.agent_state.as_deref())
                    .map(UnitState::from_wire)
                    .unwrap_or(UnitState::Pending);
                if state.is_started_like() {
                    break;
                }
                if state.is_error_like() {
                    return Err(Error::BootstrapFailed(state.to_string()));
                }
                if Instant::now() >= deadline {
                    return Err(Error::Timeout {
                        operation: "bootstrap".to_string(),
                        state: state.to_string(),
                    });
                }
                tracing::debug!(state = %state, "bootstrap not yet started, polling");
                std::thread::sleep(wait.poll);
            }
        }
        Ok(result)
    }

    /// Deploy a charm as a new service with an initial unit count.
    pub fn deploy(
        &self,
        charm: &str,
        service: Option<&str>,
        num_units: u32,
        opts: &DeployOptions,
    ) -> Result<serde_yaml::Value> {
        if charm.is_empty() {
            return Err(Error::Config("charm is required".to_string()));
        }
        let mut options = vec!["--num-units".to_string(), num_units.to_string()];
        if let Some(config) = &opts.config {
            options.push("--config".to_string());
            options.push(config.display().to_string());
        }
        if let Some(constraints) = &opts.constraints {
            options.push("--constraints".to_string());
            options.push(constraints.clone());
        }
        if let Some(repository) = &opts.repository {
            options.push("--repository".to_string());
            options.push(repository.display().to_string());
        }
        let mut charm = charm.to_string();
        if let Some(release) = &opts.release {
            charm = format!("{}/{}", release, charm);
        }
        if opts.local {
            charm = format!("local:{}", charm);
        }
        options.push(charm);
        if let Some(service) = service {
            options.push(service.to_string());
        }
        self.run_tool("deploy", &options)
    }

    pub fn expose_service(&self, service: &str) -> Result<serde_yaml::Value> {
        self.run_tool("expose", &[service.to_string()])
    }

    pub fn unexpose_service(&self, service: &str) -> Result<serde_yaml::Value> {
        self.run_tool("unexpose", &[service.to_string()])
    }

    /// Current configuration of a deployed service.
    pub fn get_service_config(&self, service: &str) -> Result<serde_yaml::Value> {
        self.run_tool("get", &[service.to_string()])
    }

    pub fn destroy_environment(&self) -> Result<serde_yaml::Value> {
        self.run_tool("destroy-environment", &[])
    }

    fn relation_member(service: &str, relation: Option<&str>) -> String {
        match relation {
            Some(relation) => format!("{}:{}", service, relation),
            None => service.to_string(),
        }
    }

    /// Relate two services. Succeeds if the relation already exists.
    pub fn add_relation(
        &self,
        service1: &str,
        service2: &str,
        relation1: Option<&str>,
        relation2: Option<&str>,
    ) -> Result<()> {
        let members = [
            Self::relation_member(service1, relation1),
            Self::relation_member(service2, relation2),
        ];
        match self.run_tool("add-relation", &members) {
            Ok(_) => Ok(()),
            Err(Error::CommandFailed { ref stderr, .. })
                if relation_noop(RelationOp::Add, stderr) =>
            {
                tracing::debug!(%service1, %service2, "relation already exists, treating as success");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Unrelate two services. Succeeds if the relation is already absent.
    pub fn remove_relation(
        &self,
        service1: &str,
        service2: &str,
        relation1: Option<&str>,
        relation2: Option<&str>,
    ) -> Result<()> {
        let members = [
            Self::relation_member(service1, relation1),
            Self::relation_member(service2, relation2),
        ];
        match self.run_tool("remove-relation", &members) {
            Ok(_) => Ok(()),
            Err(Error::CommandFailed { ref stderr, .. })
                if relation_noop(RelationOp::Remove, stderr) =>
            {
                tracing::debug!(%service1, %service2, "relation already absent, treating as success");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Destroy every machine hosting no unit. Machine `"0"` (the controller)
    /// is always considered busy.
    pub fn cleanup_machines(&self) -> Result<Vec<String>> {
        let status = self.status()?;
        let mut busy: BTreeSet<String> = BTreeSet::new();
        busy.insert("0".to_string());
        for service in status.services.values() {
            for unit in service.units.values() {
                if let Some(machine) = &unit.machine {
                    busy.insert(machine.clone());
                }
            }
        }
        let idle: Vec<String> = status
            .machines
            .keys()
            .filter(|machine| !busy.contains(*machine))
            .cloned()
            .collect();
        if !idle.is_empty() {
            tracing::info!(machines = ?idle, "destroying idle machines");
            self.run_tool("destroy-machine", &idle)?;
        }
        Ok(idle)
    }
}

impl Backend for RealBackend {
    fn list_units(&mut self, service: &str) -> Result<Option<BTreeMap<u32, Unit>>> {
        let status = self.status()?;
        let Some(svc) = status.services.get(service) else {
            return Ok(None);
        };
        let mut units = BTreeMap::new();
        for (name, unit) in &svc.units {
            let (_, ordinal) = parse_unit_name(name)?;
            units.insert(ordinal, unit.to_unit());
        }
        Ok(Some(units))
    }

    fn add_units(&mut self, service: &str, count: u32) -> Result<()> {
        let options = vec![
            "--num-units".to_string(),
            count.to_string(),
            service.to_string(),
        ];
        self.run_tool("add-unit", &options)?;
        Ok(())
    }

    fn destroy_unit(&mut self, service: &str, ordinal: u32, terminate: bool) -> Result<()> {
        // Snapshot first: the machine handle is gone once the unit is.
        let unit = self.get_unit(service, ordinal)?;
        self.run_tool("destroy-unit", &[unit_name(service, ordinal)])?;
        if terminate {
            std::thread::sleep(self.grace);
            if let Some(machine) = &unit.machine {
                self.destroy_machine(machine)?;
            }
        }
        Ok(())
    }

    fn destroy_service(&mut self, service: &str) -> Result<()> {
        self.run_tool("destroy-service", &[service.to_string()])?;
        Ok(())
    }

    fn destroy_machine(&mut self, machine: &str) -> Result<()> {
        self.run_tool("destroy-machine", &[machine.to_string()])?;
        Ok(())
    }
}
