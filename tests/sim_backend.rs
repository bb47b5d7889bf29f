//! Timing behavior of the simulated backend.

use converge::backend::{Backend, SimulatedBackend};
use converge::unit::UnitState;

/// Ticks until the unit at `ordinal` reports started, or panics after `max`.
fn ticks_until_started(backend: &mut SimulatedBackend, service: &str, ordinal: u32, max: u32) -> u32 {
    for tick in 1..=max {
        backend.tick();
        if backend.unit_state(service, ordinal) == Some(&UnitState::Started) {
            return tick;
        }
    }
    panic!("unit {}/{} never started within {} ticks", service, ordinal, max);
}

#[test]
fn units_deploy_as_pending() {
    let mut backend = SimulatedBackend::with_seed(1..=3, 1..=3, 11);
    backend.add_units("web", 2).unwrap();
    assert_eq!(backend.unit_state("web", 0), Some(&UnitState::Pending));
    assert_eq!(backend.unit_state("web", 1), Some(&UnitState::Pending));
}

#[test]
fn start_latency_stays_within_the_configured_band() {
    let mut backend = SimulatedBackend::with_seed(2..=5, 1..=1, 13);
    for ordinal in 0..20 {
        backend.add_units("web", 1).unwrap();
        let ticks = ticks_until_started(&mut backend, "web", ordinal, 10);
        assert!((2..=5).contains(&ticks), "unit started after {} ticks", ticks);
    }
}

#[test]
fn degenerate_range_gives_an_exact_tick_count() {
    let mut backend = SimulatedBackend::with_seed(2..=2, 2..=2, 17);
    backend.add_units("web", 1).unwrap();

    backend.tick();
    assert_eq!(backend.unit_state("web", 0), Some(&UnitState::Pending));
    backend.tick();
    assert_eq!(backend.unit_state("web", 0), Some(&UnitState::Started));
}

#[test]
fn time_never_passes_without_a_tick() {
    let mut backend = SimulatedBackend::with_seed(1..=1, 1..=1, 19);
    backend.add_units("web", 1).unwrap();
    for _ in 0..100 {
        assert_eq!(backend.unit_state("web", 0), Some(&UnitState::Pending));
    }
    backend.tick();
    assert_eq!(backend.unit_state("web", 0), Some(&UnitState::Started));
}

#[test]
fn stopped_units_vanish_in_the_same_tick() {
    let mut backend = SimulatedBackend::with_seed(1..=1, 2..=2, 23);
    backend.add_units("web", 1).unwrap();
    backend.tick();
    assert_eq!(backend.unit_state("web", 0), Some(&UnitState::Started));

    backend.destroy_unit("web", 0, false).unwrap();
    backend.tick();
    // One tick in, the countdown is still running.
    assert_eq!(backend.raw_unit_count("web"), 1);
    backend.tick();
    // The tick that produces Stopped also removes the unit.
    assert_eq!(backend.raw_unit_count("web"), 0);
    assert_eq!(backend.unit_state("web", 0), None);
}

#[test]
fn destroy_overrides_a_pending_start() {
    let mut backend = SimulatedBackend::with_seed(5..=5, 1..=1, 29);
    backend.add_units("web", 1).unwrap();
    backend.destroy_unit("web", 0, false).unwrap();
    backend.tick();
    // The stop won the race; the unit never reaches Started.
    assert_eq!(backend.unit_state("web", 0), None);
}

#[test]
fn services_tick_independently() {
    let mut backend = SimulatedBackend::with_seed(1..=1, 1..=1, 31);
    backend.add_units("web", 1).unwrap();
    backend.tick();
    backend.add_units("db", 1).unwrap();

    assert_eq!(backend.unit_state("web", 0), Some(&UnitState::Started));
    assert_eq!(backend.unit_state("db", 0), Some(&UnitState::Pending));
}
