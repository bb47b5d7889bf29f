//! End-to-end convergence scenarios against the simulated backend.

use converge::backend::{Backend, SimulatedBackend};
use converge::engine::{ensure_num_units, ConvergeOptions};
use converge::unit::{Unit, UnitState};
use std::collections::{BTreeMap, BTreeSet};

/// Wraps a backend and counts every mutating call, so tests can assert not
/// just the final state but how much work convergence actually did.
struct RecordingBackend {
    inner: SimulatedBackend,
    units_added: u32,
    units_destroyed: Vec<u32>,
    services_destroyed: Vec<String>,
    machines_destroyed: Vec<String>,
}

impl RecordingBackend {
    fn new() -> Self {
        RecordingBackend {
            inner: SimulatedBackend::with_seed(1..=3, 1..=3, 7),
            units_added: 0,
            units_destroyed: Vec::new(),
            services_destroyed: Vec::new(),
            machines_destroyed: Vec::new(),
        }
    }

    fn settle(&mut self) {
        for _ in 0..4 {
            self.inner.tick();
        }
    }
}

impl Backend for RecordingBackend {
    fn list_units(&mut self, service: &str) -> converge::Result<Option<BTreeMap<u32, Unit>>> {
        self.inner.list_units(service)
    }

    fn add_units(&mut self, service: &str, count: u32) -> converge::Result<()> {
        self.units_added += count;
        self.inner.add_units(service, count)
    }

    fn destroy_unit(
        &mut self,
        service: &str,
        ordinal: u32,
        terminate: bool,
    ) -> converge::Result<()> {
        self.units_destroyed.push(ordinal);
        self.inner.destroy_unit(service, ordinal, terminate)
    }

    fn destroy_service(&mut self, service: &str) -> converge::Result<()> {
        self.services_destroyed.push(service.to_string());
        self.inner.destroy_service(service)
    }

    fn destroy_machine(&mut self, machine: &str) -> converge::Result<()> {
        self.machines_destroyed.push(machine.to_string());
        self.inner.destroy_machine(machine)
    }
}

fn opts() -> ConvergeOptions {
    ConvergeOptions::default()
}

#[test]
fn absent_service_is_deployed_at_target() {
    let mut backend = RecordingBackend::new();
    ensure_num_units(&mut backend, "web", Some(3), &opts()).unwrap();
    assert_eq!(backend.units_added, 3);
    assert_eq!(backend.inner.raw_unit_count("web"), 3);
}

#[test]
fn shortfall_adds_only_the_missing_units() {
    let mut backend = RecordingBackend::new();
    ensure_num_units(&mut backend, "web", Some(2), &opts()).unwrap();
    backend.settle();
    ensure_num_units(&mut backend, "web", Some(5), &opts()).unwrap();
    assert_eq!(backend.units_added, 5);
    assert_eq!(backend.inner.raw_unit_count("web"), 5);
}

#[test]
fn converged_service_is_left_alone() {
    let mut backend = RecordingBackend::new();
    ensure_num_units(&mut backend, "web", Some(3), &opts()).unwrap();
    backend.settle();
    backend.units_added = 0;

    ensure_num_units(&mut backend, "web", Some(3), &opts()).unwrap();
    assert_eq!(backend.units_added, 0);
    assert!(backend.units_destroyed.is_empty());
}

#[test]
fn repeated_ensure_is_idempotent_even_before_settling() {
    let mut backend = RecordingBackend::new();
    ensure_num_units(&mut backend, "web", Some(3), &opts()).unwrap();
    ensure_num_units(&mut backend, "web", Some(1), &opts()).unwrap();
    assert_eq!(backend.units_destroyed.len(), 2);

    // The destroyed units are still ticking toward removal, but they must
    // not be destroyed a second time.
    ensure_num_units(&mut backend, "web", Some(1), &opts()).unwrap();
    assert_eq!(backend.units_destroyed.len(), 2);
}

#[test]
fn excess_destroys_broken_units_before_healthy_ones() {
    let mut backend = RecordingBackend::new();
    backend.inner.inject_unit("web", 0, UnitState::Started);
    backend.inner.inject_unit("web", 1, UnitState::Error);
    backend.inner.inject_unit("web", 2, UnitState::Pending);
    backend.inner.inject_unit("web", 3, UnitState::Started);

    ensure_num_units(&mut backend, "web", Some(2), &opts()).unwrap();
    assert_eq!(backend.units_destroyed, vec![1, 2]);
}

#[test]
fn unknown_states_are_destroyed_first() {
    let mut backend = RecordingBackend::new();
    backend.inner.inject_unit("web", 0, UnitState::Started);
    backend
        .inner
        .inject_unit("web", 1, UnitState::Other("agent-lost".into()));

    ensure_num_units(&mut backend, "web", Some(1), &opts()).unwrap();
    assert_eq!(backend.units_destroyed, vec![1]);
}

#[test]
fn kept_ordinals_survive_a_scale_down() {
    let mut backend = RecordingBackend::new();
    backend.inner.inject_unit("web", 0, UnitState::Error);
    backend.inner.inject_unit("web", 1, UnitState::Started);
    backend.inner.inject_unit("web", 2, UnitState::Started);

    let mut opts = opts();
    opts.keep = BTreeSet::from([0]);
    ensure_num_units(&mut backend, "web", Some(1), &opts).unwrap();
    // The error unit is protected, so healthy units go instead.
    assert_eq!(backend.units_destroyed, vec![1, 2]);
}

#[test]
fn keeping_everything_leaves_the_service_over_target() {
    let mut backend = RecordingBackend::new();
    backend.inner.inject_unit("web", 0, UnitState::Started);
    backend.inner.inject_unit("web", 1, UnitState::Started);

    let mut opts = opts();
    opts.keep = BTreeSet::from([0, 1]);
    ensure_num_units(&mut backend, "web", Some(0), &opts).unwrap();
    assert!(backend.units_destroyed.is_empty());
    assert_eq!(backend.inner.raw_unit_count("web"), 2);
}

#[test]
fn no_target_destroys_the_whole_service() {
    let mut backend = RecordingBackend::new();
    ensure_num_units(&mut backend, "web", Some(2), &opts()).unwrap();
    let destroyed = ensure_num_units(&mut backend, "web", None, &opts()).unwrap();
    assert!(destroyed.is_empty());
    assert_eq!(backend.services_destroyed, vec!["web".to_string()]);
    // Destruction is wholesale, never per-unit.
    assert!(backend.units_destroyed.is_empty());
    assert!(backend.list_units("web").unwrap().is_none());
}

#[test]
fn absent_service_at_target_zero_stays_absent() {
    let mut backend = RecordingBackend::new();
    let destroyed = ensure_num_units(&mut backend, "ghost", Some(0), &opts()).unwrap();
    assert!(destroyed.is_empty());
    assert_eq!(backend.units_added, 0);
    // The service must not be materialized as present-with-zero-units.
    assert!(backend.list_units("ghost").unwrap().is_none());
}

#[test]
fn scale_to_zero_differs_from_destroy() {
    let mut backend = RecordingBackend::new();
    ensure_num_units(&mut backend, "web", Some(2), &opts()).unwrap();
    ensure_num_units(&mut backend, "web", Some(0), &opts()).unwrap();
    assert!(backend.services_destroyed.is_empty());
    assert_eq!(backend.units_destroyed.len(), 2);

    backend.settle();
    // The service still exists, just with zero units.
    let units = backend.list_units("web").unwrap();
    assert_eq!(units.unwrap().len(), 0);
}

#[test]
fn ensure_returns_pre_destruction_snapshots() {
    let mut backend = RecordingBackend::new();
    backend.inner.inject_unit("web", 0, UnitState::Started);
    backend.inner.inject_unit("web", 1, UnitState::Error);
    backend.inner.inject_unit("web", 2, UnitState::Started);

    let destroyed = ensure_num_units(&mut backend, "web", Some(2), &opts()).unwrap();
    assert_eq!(destroyed.len(), 1);
    assert_eq!(destroyed[&1].state, UnitState::Error);

    // Scaling up reports nothing destroyed.
    let destroyed = ensure_num_units(&mut backend, "web", Some(4), &opts()).unwrap();
    assert!(destroyed.is_empty());
}

#[test]
fn simulated_units_have_no_machines_to_terminate() {
    let mut backend = RecordingBackend::new();
    backend.inner.inject_unit("web", 0, UnitState::Started);
    backend.inner.inject_unit("web", 1, UnitState::Started);

    let mut opts = opts();
    opts.terminate = true;
    opts.grace = std::time::Duration::from_millis(0);
    ensure_num_units(&mut backend, "web", Some(1), &opts).unwrap();
    assert!(backend.machines_destroyed.is_empty());
}
