//! Unit identity and lifecycle state classification.
//!
//! A unit is one running instance of a deployed service. Its lifecycle state
//! arrives from the backend as a string (`agent-state` on the wire); anything
//! outside the six named states is carried as [`UnitState::Other`] and is
//! classified as eligible for destruction with highest priority; removing
//! unrecognized units first is the safe default.

use crate::error::{Error, Result};
use std::fmt;

/// Lifecycle state of a single unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnitState {
    Pending,
    Installed,
    Started,
    Stopped,
    NotStarted,
    Error,
    /// Any state value outside the enumerated set (treated as unknown).
    Other(String),
}

/// Named classification sets over [`UnitState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateClass {
    /// {Pending, Installed}
    PendingLike,
    /// {Started}
    StartedLike,
    /// {Stopped}
    StoppedLike,
    /// {Error, NotStarted}
    ErrorLike,
}

impl UnitState {
    /// Parse a wire value. Unrecognized values become [`UnitState::Other`].
    pub fn from_wire(value: &str) -> UnitState {
        match value {
            "pending" => UnitState::Pending,
            "installed" => UnitState::Installed,
            "started" => UnitState::Started,
            "stopped" => UnitState::Stopped,
            "not-started" => UnitState::NotStarted,
            "error" => UnitState::Error,
            other => UnitState::Other(other.to_string()),
        }
    }

    /// The wire form of this state.
    pub fn as_wire(&self) -> &str {
        match self {
            UnitState::Pending => "pending",
            UnitState::Installed => "installed",
            UnitState::Started => "started",
            UnitState::Stopped => "stopped",
            UnitState::NotStarted => "not-started",
            UnitState::Error => "error",
            UnitState::Other(s) => s,
        }
    }

    /// True when the state is one of the six named states.
    pub fn is_known(&self) -> bool {
        !matches!(self, UnitState::Other(_))
    }

    /// Membership in one of the named classification sets.
    pub fn is_member(&self, class: StateClass) -> bool {
        match class {
            StateClass::PendingLike => {
                matches!(self, UnitState::Pending | UnitState::Installed)
            }
            StateClass::StartedLike => matches!(self, UnitState::Started),
            StateClass::StoppedLike => matches!(self, UnitState::Stopped),
            StateClass::ErrorLike => {
                matches!(self, UnitState::Error | UnitState::NotStarted)
            }
        }
    }

    pub fn is_started_like(&self) -> bool {
        self.is_member(StateClass::StartedLike)
    }

    pub fn is_error_like(&self) -> bool {
        self.is_member(StateClass::ErrorLike)
    }

    /// The fixed destruction-priority sequence, least-wanted first.
    pub fn destruction_order() -> [UnitState; 5] {
        [
            UnitState::Error,
            UnitState::NotStarted,
            UnitState::Pending,
            UnitState::Installed,
            UnitState::Started,
        ]
    }

    /// Rank of this state in the destruction-priority sequence.
    ///
    /// Unknown states rank with the first (highest-priority) class. `Stopped`
    /// units return `None`: they are already on their way out and are never
    /// selected for destruction.
    pub fn destruction_rank(&self) -> Option<usize> {
        match self {
            UnitState::Error | UnitState::Other(_) => Some(0),
            UnitState::NotStarted => Some(1),
            UnitState::Pending => Some(2),
            UnitState::Installed => Some(3),
            UnitState::Started => Some(4),
            UnitState::Stopped => None,
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// One running instance of a deployed service, as seen by the engine.
///
/// The engine never holds units across calls (it always re-queries the
/// backend), so this is a point-in-time snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub state: UnitState,
    /// Opaque handle of the hosting machine (real backend only).
    pub machine: Option<String>,
}

impl Unit {
    pub fn new(state: UnitState) -> Self {
        Unit {
            state,
            machine: None,
        }
    }

    pub fn with_machine(state: UnitState, machine: impl Into<String>) -> Self {
        Unit {
            state,
            machine: Some(machine.into()),
        }
    }
}

/// Wire identity of a unit: `"<service>/<ordinal>"`.
pub fn unit_name(service: &str, ordinal: u32) -> String {
    format!("{}/{}", service, ordinal)
}

/// Split a wire unit name into its service and ordinal.
pub fn parse_unit_name(name: &str) -> Result<(&str, u32)> {
    let (service, ordinal) = name
        .split_once('/')
        .ok_or_else(|| Error::MalformedUnitName(name.to_string()))?;
    if service.is_empty() {
        return Err(Error::MalformedUnitName(name.to_string()));
    }
    let ordinal = ordinal
        .parse::<u32>()
        .map_err(|_| Error::MalformedUnitName(name.to_string()))?;
    Ok((service, ordinal))
}
