//! # Converge
//!
//! A deployment-orchestration shim that drives deployed services toward a
//! desired number of running units.
//!
//! ## Features
//!
//! - **Convergence Engine**: One idempotent entry point that scales a service
//!   up or down to a target unit count
//! - **Destruction Priority**: Scale-downs remove broken and not-yet-started
//!   units before healthy ones, with a keep-set for protected ordinals
//! - **Dual Backends**: A live backend that shells out to the orchestration
//!   CLI, and a tick-driven simulated backend for tests and dry runs
//! - **Hook Dispatch**: A `Charm` trait with per-lifecycle-event handlers,
//!   runnable against a live agent or standalone
//! - **Environments Registry**: A YAML registry of environments with
//!   bootstrap-rollback on configuration errors
//!
//! ## Quick Start
//!
//! ```no_run
//! use converge::backend::SimulatedBackend;
//! use converge::engine::{ensure_num_units, ConvergeOptions};
//!
//! # fn example() -> Result<(), converge::Error> {
//! // Provisioning latency of 1..=3 logical ticks for start and stop.
//! let mut backend = SimulatedBackend::new(1..=3, 1..=3);
//!
//! // Converge toward three units, then let simulated time pass.
//! ensure_num_units(&mut backend, "storage", Some(3), &ConvergeOptions::default())?;
//! backend.tick();
//! backend.tick();
//! backend.tick();
//!
//! // A second identical call is a no-op.
//! ensure_num_units(&mut backend, "storage", Some(3), &ConvergeOptions::default())?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cli;
pub mod engine;
pub mod environment;
pub mod error;
pub mod exec;
pub mod hooks;
pub mod unit;

// Re-export commonly used types
pub use backend::{Backend, BackendChoice, RealBackend, SimulatedBackend};
pub use engine::{ensure_num_units, ConvergeOptions};
pub use error::{Error, Result};
pub use hooks::{dispatch, Charm, Hook, HookContext, Outcome};
pub use unit::{Unit, UnitState};
