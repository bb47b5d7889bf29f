//! Lifecycle hook dispatch for charm code running on a unit.
//!
//! The agent invokes the charm with a hook name; [`dispatch`] turns that into
//! a call on the matching [`Charm`] method, brackets it with enter/exit trace
//! markers, and persists the unit's effective configuration when the handler
//! succeeds. A [`HookContext`] is either live (a real agent is reachable and
//! agent helpers shell out to it) or standalone (local development, where
//! answers come from the defaults the caller supplied).

pub mod config;

use crate::error::{Error, Result};
use crate::exec;
use crate::unit::parse_unit_name;
use config::{config_from_map, save_service_config, CharmConfig};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// The closed set of lifecycle events a charm can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Install,
    ConfigChanged,
    Start,
    Stop,
    UpgradeCharm,
}

impl Hook {
    pub const ALL: [Hook; 5] = [
        Hook::Install,
        Hook::ConfigChanged,
        Hook::Start,
        Hook::Stop,
        Hook::UpgradeCharm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Hook::Install => "install",
            Hook::ConfigChanged => "config-changed",
            Hook::Start => "start",
            Hook::Stop => "stop",
            Hook::UpgradeCharm => "upgrade-charm",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Hook {
    type Err = Error;

    fn from_str(s: &str) -> Result<Hook> {
        Hook::ALL
            .into_iter()
            .find(|hook| hook.as_str() == s)
            .ok_or_else(|| Error::UnknownHook(s.to_string()))
    }
}

/// Whether a charm method actually handled the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Handled,
    /// The default for every [`Charm`] method; dispatch turns this into
    /// [`Error::UnknownHook`].
    Unhandled,
}

/// Per-charm hook handlers. Every method defaults to [`Outcome::Unhandled`],
/// so a charm implements only the events it cares about.
pub trait Charm {
    fn install(&mut self, _ctx: &mut HookContext) -> Result<Outcome> {
        Ok(Outcome::Unhandled)
    }

    fn config_changed(&mut self, _ctx: &mut HookContext) -> Result<Outcome> {
        Ok(Outcome::Unhandled)
    }

    fn start(&mut self, _ctx: &mut HookContext) -> Result<Outcome> {
        Ok(Outcome::Unhandled)
    }

    fn stop(&mut self, _ctx: &mut HookContext) -> Result<Outcome> {
        Ok(Outcome::Unhandled)
    }

    fn upgrade_charm(&mut self, _ctx: &mut HookContext) -> Result<Outcome> {
        Ok(Outcome::Unhandled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// A real agent is reachable; helpers shell out to it.
    Live,
    /// Local development without an agent.
    Standalone,
}

/// Execution context passed to every hook handler.
#[derive(Debug)]
pub struct HookContext {
    pub unit_name: String,
    pub environment_uuid: Option<String>,
    pub config: CharmConfig,
    mode: Mode,
    private_address: Option<String>,
    public_address: Option<String>,
    local_config_path: Option<PathBuf>,
}

impl HookContext {
    /// Context for a unit with a live agent, from the environment variables
    /// the agent sets before invoking the charm.
    pub fn live() -> Result<HookContext> {
        let unit_name = std::env::var("FLEET_UNIT_NAME")
            .map_err(|_| Error::Config("FLEET_UNIT_NAME is not set".to_string()))?;
        let mut ctx = HookContext {
            unit_name,
            environment_uuid: std::env::var("FLEET_ENV_UUID").ok(),
            config: CharmConfig::new(),
            mode: Mode::Live,
            private_address: None,
            public_address: None,
            local_config_path: None,
        };
        ctx.config = ctx.config_get()?;
        Ok(ctx)
    }

    /// Context for local development: no agent, answers come from the given
    /// address and configuration defaults.
    pub fn standalone(
        unit_name: impl Into<String>,
        address: IpAddr,
        config: CharmConfig,
    ) -> HookContext {
        let address = address.to_string();
        HookContext {
            unit_name: unit_name.into(),
            environment_uuid: None,
            config,
            mode: Mode::Standalone,
            private_address: Some(address.clone()),
            public_address: Some(address),
            local_config_path: None,
        }
    }

    /// Build a live context when the agent environment is present, otherwise
    /// fall back to standalone. The probe happens once, here.
    pub fn detect(
        fallback_unit: impl Into<String>,
        fallback_address: IpAddr,
        default_config: CharmConfig,
    ) -> HookContext {
        match HookContext::live() {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::debug!(error = %e, "no live agent, running standalone");
                HookContext::standalone(fallback_unit, fallback_address, default_config)
            }
        }
    }

    pub fn is_live(&self) -> bool {
        self.mode == Mode::Live
    }

    /// Persist the effective configuration here after each handled hook.
    pub fn with_local_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_config_path = Some(path.into());
        self
    }

    pub fn service(&self) -> Result<&str> {
        Ok(parse_unit_name(&self.unit_name)?.0)
    }

    pub fn ordinal(&self) -> Result<u32> {
        Ok(parse_unit_name(&self.unit_name)?.1)
    }

    fn agent(&self, program: &str, args: &[String]) -> Result<String> {
        if self.mode == Mode::Standalone {
            return Err(Error::AgentUnavailable(program.to_string()));
        }
        let output = exec::run_shell_checked(program, args, None)?;
        Ok(output.stdout.trim().to_string())
    }

    /// The unit's effective configuration, as the agent reports it.
    pub fn config_get(&self) -> Result<CharmConfig> {
        let stdout = self.agent("config-get", &["--format=json".to_string()])?;
        if stdout.is_empty() {
            return Ok(CharmConfig::new());
        }
        let map: BTreeMap<String, serde_json::Value> = serde_json::from_str(&stdout)?;
        let mut config = BTreeMap::new();
        for (key, value) in map {
            config.insert(key, serde_yaml::to_value(value)?);
        }
        Ok(config_from_map(config))
    }

    fn unit_get(&self, key: &str) -> Result<String> {
        self.agent("unit-get", &[key.to_string()])
    }

    pub fn private_address(&mut self) -> Result<String> {
        if let Some(address) = &self.private_address {
            return Ok(address.clone());
        }
        let address = self.unit_get("private-address")?;
        self.private_address = Some(address.clone());
        Ok(address)
    }

    pub fn public_address(&mut self) -> Result<String> {
        if let Some(address) = &self.public_address {
            return Ok(address.clone());
        }
        let address = self.unit_get("public-address")?;
        self.public_address = Some(address.clone());
        Ok(address)
    }

    /// Peer unit names from the agent's relation listing.
    pub fn relation_list(&self, relation_id: Option<&str>) -> Result<Vec<String>> {
        let mut args = vec!["--format=json".to_string()];
        if let Some(id) = relation_id {
            args.push("--relation".to_string());
            args.push(id.to_string());
        }
        let stdout = self.agent("relation-list", &args)?;
        if stdout.is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&stdout)?)
    }

    /// Leadership by convention: the peer with the smallest ordinal leads.
    ///
    /// A standalone unit, a unit with no peers, and a unit whose peer listing
    /// fails all count as leader: a unit alone in the world has nobody to
    /// defer to.
    pub fn is_leader(&self, relation_id: Option<&str>) -> bool {
        if self.mode == Mode::Standalone {
            return true;
        }
        let own = match self.ordinal() {
            Ok(ordinal) => ordinal,
            Err(e) => {
                tracing::debug!(error = %e, "own ordinal unknown, assuming leader");
                return true;
            }
        };
        match self.relation_list(relation_id) {
            Ok(peers) => {
                let min_peer = peers
                    .iter()
                    .filter_map(|name| parse_unit_name(name).ok())
                    .map(|(_, ordinal)| ordinal)
                    .min();
                match min_peer {
                    Some(min) => own < min,
                    None => true,
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "peer listing failed, assuming leader");
                true
            }
        }
    }

    /// Open a port on the unit's firewall. Standalone contexts only log.
    pub fn open_port(&self, port: u16, protocol: &str) -> Result<()> {
        let spec = format!("{}/{}", port, protocol);
        match self.agent("open-port", &[spec.clone()]) {
            Ok(_) => Ok(()),
            Err(Error::AgentUnavailable(_)) => {
                tracing::debug!(port = %spec, "standalone, skipping firewall change");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Close a port on the unit's firewall. Standalone contexts only log.
    pub fn close_port(&self, port: u16, protocol: &str) -> Result<()> {
        let spec = format!("{}/{}", port, protocol);
        match self.agent("close-port", &[spec.clone()]) {
            Ok(_) => Ok(()),
            Err(Error::AgentUnavailable(_)) => {
                tracing::debug!(port = %spec, "standalone, skipping firewall change");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Write the effective config to the configured local path, if any.
    pub fn save_local_config(&self) -> Result<()> {
        if let Some(path) = &self.local_config_path {
            let service = self.service()?.to_string();
            save_service_config(path, &service, &self.config)?;
            tracing::debug!(path = %path.display(), "saved local configuration");
        }
        Ok(())
    }
}

/// Run one hook against a charm.
///
/// Emits an enter marker, calls the handler, persists local config on
/// success, and always emits the exit marker before returning, so logs show
/// a matched pair for every invocation whatever the handler did. An
/// [`Outcome::Unhandled`] result is reported as [`Error::UnknownHook`].
pub fn dispatch(charm: &mut dyn Charm, ctx: &mut HookContext, hook: Hook) -> Result<()> {
    tracing::info!(hook = %hook, unit = %ctx.unit_name, "hook enter");
    let result = invoke(charm, ctx, hook).and_then(|outcome| match outcome {
        Outcome::Handled => ctx.save_local_config(),
        Outcome::Unhandled => Err(Error::UnknownHook(hook.to_string())),
    });
    match &result {
        Ok(()) => tracing::info!(hook = %hook, unit = %ctx.unit_name, "hook exit"),
        Err(e) => {
            if let Error::CommandFailed { command, stderr, .. } = e {
                tracing::error!(hook = %hook, %command, %stderr, "hook command failed");
            }
            tracing::info!(hook = %hook, unit = %ctx.unit_name, error = %e, "hook exit");
        }
    }
    result
}

fn invoke(charm: &mut dyn Charm, ctx: &mut HookContext, hook: Hook) -> Result<Outcome> {
    match hook {
        Hook::Install => charm.install(ctx),
        Hook::ConfigChanged => charm.config_changed(ctx),
        Hook::Start => charm.start(ctx),
        Hook::Stop => charm.stop(ctx),
        Hook::UpgradeCharm => charm.upgrade_charm(ctx),
    }
}
