//! Typed view of the orchestrator's status response.
//!
//! The shape consumed here is the only wire format the engine depends on:
//! `services` mapping service name to its units (each with `agent-state` and
//! `machine`), and `machines` mapping machine id to its own `agent-state`.
//! Extra keys are retained but ignored.

use crate::unit::{Unit, UnitState};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub machines: BTreeMap<String, MachineStatus>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceStatus {
    #[serde(default)]
    pub units: BTreeMap<String, UnitStatus>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnitStatus {
    #[serde(rename = "agent-state")]
    pub agent_state: Option<String>,
    pub machine: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MachineStatus {
    #[serde(rename = "agent-state")]
    pub agent_state: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl UnitStatus {
    /// Collapse the wire record into the engine's view of a unit.
    ///
    /// A missing `agent-state` is indistinguishable from an unrecognized one:
    /// both classify as unknown.
    pub fn to_unit(&self) -> Unit {
        let state = match self.agent_state.as_deref() {
            Some(s) => UnitState::from_wire(s),
            None => UnitState::Other(String::new()),
        };
        Unit {
            state,
            machine: self.machine.clone(),
        }
    }
}
