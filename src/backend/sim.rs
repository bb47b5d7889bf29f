//! In-memory, tick-driven backend.
//!
//! Models asynchronous provisioning without a live cluster: every unit
//! transitions state only when [`SimulatedBackend::tick`] is called, after a
//! latency drawn uniformly from a configured inclusive range. Time never
//! passes on its own, so tests stay fully deterministic.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::unit::{unit_name, Unit, UnitState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// A simulated unit: a small state machine with a latency countdown.
///
/// Invariant: `counter` is `Some` exactly when `next_state` is `Some`. When
/// the counter reaches zero the unit adopts `next_state` and both clear.
#[derive(Debug, Clone)]
pub struct SimulatedUnit {
    pub state: UnitState,
    next_state: Option<UnitState>,
    counter: Option<u32>,
}

impl SimulatedUnit {
    fn new(state: UnitState) -> Self {
        SimulatedUnit {
            state,
            next_state: None,
            counter: None,
        }
    }

    /// Schedule a transition after `latency` ticks, clamped to at least one
    /// since a zero countdown would never fire.
    fn schedule(&mut self, next: UnitState, latency: u32) {
        self.counter = Some(latency.max(1));
        self.next_state = Some(next);
    }

    /// True once a stop has been requested but not yet completed.
    fn stopping(&self) -> bool {
        self.next_state == Some(UnitState::Stopped)
    }

    /// Advance one tick of logical time.
    fn tick(&mut self) {
        if let Some(counter) = self.counter {
            let counter = counter - 1;
            if counter == 0 {
                if let Some(next) = self.next_state.take() {
                    self.state = next;
                }
                self.counter = None;
            } else {
                self.counter = Some(counter);
            }
        }
    }
}

#[derive(Debug, Default)]
struct SimService {
    units: BTreeMap<u32, SimulatedUnit>,
    next_ordinal: u32,
}

/// Backend implementation backed by in-memory [`SimulatedUnit`]s.
///
/// Each instance owns an isolated unit collection. Growth schedules a
/// pending-to-started countdown; shrink schedules a countdown toward
/// `Stopped` rather than deleting immediately. Units that land in `Stopped`
/// are removed in the same [`tick`](Self::tick) that produced the transition.
#[derive(Debug)]
pub struct SimulatedBackend {
    start_latency: RangeInclusive<u32>,
    stop_latency: RangeInclusive<u32>,
    rng: StdRng,
    services: BTreeMap<String, SimService>,
}

impl SimulatedBackend {
    pub fn new(start_latency: RangeInclusive<u32>, stop_latency: RangeInclusive<u32>) -> Self {
        Self::with_seed(start_latency, stop_latency, rand::random())
    }

    /// Seeded constructor for reproducible latency draws.
    pub fn with_seed(
        start_latency: RangeInclusive<u32>,
        stop_latency: RangeInclusive<u32>,
        seed: u64,
    ) -> Self {
        SimulatedBackend {
            start_latency,
            stop_latency,
            rng: StdRng::seed_from_u64(seed),
            services: BTreeMap::new(),
        }
    }

    /// Advance every unit by one tick of logical time; units that reach
    /// `Stopped` are removed from the collection as part of the same tick.
    pub fn tick(&mut self) {
        for (name, service) in &mut self.services {
            for unit in service.units.values_mut() {
                unit.tick();
            }
            let before = service.units.len();
            service.units.retain(|_, unit| unit.state != UnitState::Stopped);
            let removed = before - service.units.len();
            if removed > 0 {
                tracing::debug!(service = %name, removed, "removed stopped units");
            }
        }
    }

    /// Place a unit directly into the collection at a given ordinal and
    /// state, with no scheduled transition. Intended for seeding dry-run and
    /// test scenarios.
    pub fn inject_unit(&mut self, service: &str, ordinal: u32, state: UnitState) {
        let svc = self.services.entry(service.to_string()).or_default();
        svc.units.insert(ordinal, SimulatedUnit::new(state));
        svc.next_ordinal = svc.next_ordinal.max(ordinal + 1);
    }

    /// Current state of one unit, if present.
    pub fn unit_state(&self, service: &str, ordinal: u32) -> Option<&UnitState> {
        self.services
            .get(service)
            .and_then(|svc| svc.units.get(&ordinal))
            .map(|unit| &unit.state)
    }

    /// Number of units currently in the collection for `service`, including
    /// units still counting down toward `Stopped`.
    pub fn raw_unit_count(&self, service: &str) -> usize {
        self.services
            .get(service)
            .map(|svc| svc.units.len())
            .unwrap_or(0)
    }
}

impl Backend for SimulatedBackend {
    /// Units already scheduled to stop are excluded: from the caller's view
    /// their destruction has been issued and only backend-side teardown
    /// latency remains.
    fn list_units(&mut self, service: &str) -> Result<Option<BTreeMap<u32, Unit>>> {
        let Some(svc) = self.services.get(service) else {
            return Ok(None);
        };
        let units = svc
            .units
            .iter()
            .filter(|(_, unit)| !unit.stopping())
            .map(|(&ordinal, unit)| (ordinal, Unit::new(unit.state.clone())))
            .collect();
        Ok(Some(units))
    }

    fn add_units(&mut self, service: &str, count: u32) -> Result<()> {
        let Self {
            services,
            rng,
            start_latency,
            ..
        } = self;
        let svc = services.entry(service.to_string()).or_default();
        for _ in 0..count {
            let mut unit = SimulatedUnit::new(UnitState::Pending);
            let latency = rng.gen_range(start_latency.clone());
            unit.schedule(UnitState::Started, latency);
            let ordinal = svc.next_ordinal;
            svc.next_ordinal += 1;
            svc.units.insert(ordinal, unit);
            tracing::debug!(unit = %unit_name(service, ordinal), latency, "simulated unit deploying");
        }
        Ok(())
    }

    fn destroy_unit(&mut self, service: &str, ordinal: u32, _terminate: bool) -> Result<()> {
        let Self {
            services,
            rng,
            stop_latency,
            ..
        } = self;
        let svc = services
            .get_mut(service)
            .ok_or_else(|| Error::UnknownEntity(format!("service {}", service)))?;
        let unit = svc
            .units
            .get_mut(&ordinal)
            .ok_or_else(|| Error::UnknownEntity(format!("unit {}", unit_name(service, ordinal))))?;
        let latency = rng.gen_range(stop_latency.clone());
        unit.schedule(UnitState::Stopped, latency);
        tracing::debug!(unit = %unit_name(service, ordinal), latency, "simulated unit stopping");
        Ok(())
    }

    fn destroy_service(&mut self, service: &str) -> Result<()> {
        self.services.remove(service);
        tracing::debug!(service, "simulated service destroyed");
        Ok(())
    }

    /// Simulated units have no underlying machines; releasing one is a no-op.
    fn destroy_machine(&mut self, machine: &str) -> Result<()> {
        tracing::debug!(machine, "simulated machine destroy (no-op)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SimulatedBackend {
        SimulatedBackend::with_seed(1..=3, 1..=3, 42)
    }

    #[test]
    fn counter_and_next_state_clear_together() {
        let mut unit = SimulatedUnit::new(UnitState::Pending);
        unit.schedule(UnitState::Started, 2);
        assert!(unit.counter.is_some() && unit.next_state.is_some());
        unit.tick();
        assert!(unit.counter.is_some() && unit.next_state.is_some());
        unit.tick();
        assert!(unit.counter.is_none() && unit.next_state.is_none());
        assert_eq!(unit.state, UnitState::Started);
    }

    #[test]
    fn zero_latency_is_clamped_to_one_tick() {
        let mut unit = SimulatedUnit::new(UnitState::Pending);
        unit.schedule(UnitState::Started, 0);
        assert_eq!(unit.state, UnitState::Pending);
        unit.tick();
        assert_eq!(unit.state, UnitState::Started);
    }

    #[test]
    fn absent_service_is_the_missing_signal() {
        let mut backend = backend();
        assert!(backend.list_units("ghost").unwrap().is_none());
    }

    #[test]
    fn destroyed_service_reads_as_missing_again() {
        let mut backend = backend();
        backend.add_units("web", 2).unwrap();
        assert!(backend.list_units("web").unwrap().is_some());
        backend.destroy_service("web").unwrap();
        assert!(backend.list_units("web").unwrap().is_none());
    }

    #[test]
    fn destroying_unknown_unit_fails() {
        let mut backend = backend();
        backend.add_units("web", 1).unwrap();
        let err = backend.destroy_unit("web", 9, false).unwrap_err();
        assert!(matches!(err, Error::UnknownEntity(_)));
    }

    #[test]
    fn stopping_units_are_hidden_from_listings() {
        let mut backend = backend();
        backend.add_units("web", 2).unwrap();
        backend.destroy_unit("web", 0, false).unwrap();
        let units = backend.list_units("web").unwrap().unwrap();
        assert_eq!(units.len(), 1);
        assert!(units.contains_key(&1));
        // Still physically present until the countdown completes.
        assert_eq!(backend.raw_unit_count("web"), 2);
    }

    #[test]
    fn ordinals_keep_growing_after_destruction() {
        let mut backend = backend();
        backend.add_units("web", 2).unwrap();
        backend.destroy_unit("web", 1, false).unwrap();
        backend.add_units("web", 1).unwrap();
        let units = backend.list_units("web").unwrap().unwrap();
        assert!(units.contains_key(&2), "new unit reuses no ordinal");
    }
}
