//! Backend abstraction over unit provisioning.
//!
//! The convergence engine speaks only this trait. Two implementations exist:
//! [`RealBackend`] shells out to the orchestration CLI, and
//! [`SimulatedBackend`] models provisioning latency in memory. The choice is
//! always explicit at construction time; nothing probes a live cluster to
//! decide which one to use.

pub mod real;
pub mod sim;
pub mod status;

pub use real::{BootstrapWait, DeployOptions, RealBackend, DEFAULT_GRACE, DEFAULT_TOOL};
pub use sim::{SimulatedBackend, SimulatedUnit};

use crate::error::Result;
use crate::unit::Unit;
use std::collections::BTreeMap;

/// The unit-provisioning operations the convergence engine relies on.
///
/// `&mut self` throughout: the simulated backend mutates in-memory state, and
/// the trait keeps both implementations interchangeable behind one signature.
pub trait Backend {
    /// Snapshot of a service's units keyed by ordinal.
    ///
    /// Returns `Ok(None)` when the service itself is absent; an absent
    /// service and a service with zero units are different answers.
    fn list_units(&mut self, service: &str) -> Result<Option<BTreeMap<u32, Unit>>>;

    /// Add `count` new units to an existing service.
    fn add_units(&mut self, service: &str, count: u32) -> Result<()>;

    /// Destroy one unit. With `terminate`, also release the hosting machine
    /// once the unit is gone.
    fn destroy_unit(&mut self, service: &str, ordinal: u32, terminate: bool) -> Result<()>;

    /// Destroy a service and everything it runs.
    fn destroy_service(&mut self, service: &str) -> Result<()>;

    /// Release one machine back to the provider.
    fn destroy_machine(&mut self, machine: &str) -> Result<()>;
}

/// Explicit backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendChoice {
    Real,
    Simulated,
}

impl BackendChoice {
    /// Construct the chosen backend for an environment. Simulated backends
    /// get a 1..=3 tick latency band for both start and stop.
    pub fn build(self, environment: &str, program: &str) -> Box<dyn Backend> {
        match self {
            BackendChoice::Real => {
                Box::new(RealBackend::new(environment).with_program(program))
            }
            BackendChoice::Simulated => Box::new(SimulatedBackend::new(1..=3, 1..=3)),
        }
    }
}
