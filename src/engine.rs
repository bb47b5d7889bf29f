//! Convergence of a service toward a desired unit count.
//!
//! [`ensure_num_units`] is the single entry point: it reads the backend's
//! current view, computes the difference to the target, and issues add or
//! destroy operations. It plans over an immutable snapshot taken up front,
//! then acts; it never interleaves queries with mutations. Calling it again
//! with the same arguments after the backend settles is a no-op.

use crate::backend::Backend;
use crate::error::Result;
use crate::unit::{unit_name, Unit, UnitState};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Knobs for one convergence pass.
#[derive(Debug, Clone)]
pub struct ConvergeOptions {
    /// Ordinals that must survive a shrink regardless of state.
    pub keep: BTreeSet<u32>,
    /// Release each destroyed unit's machine as well.
    pub terminate: bool,
    /// Delay between unit destruction and machine release, giving the
    /// backend time to tear the units down first.
    pub grace: Duration,
}

impl Default for ConvergeOptions {
    fn default() -> Self {
        ConvergeOptions {
            keep: BTreeSet::new(),
            terminate: false,
            grace: Duration::from_secs(5),
        }
    }
}

/// Drive `service` toward `target` units.
///
/// * `target = None` destroys the service outright.
/// * A shortfall adds the missing units in one call.
/// * An excess destroys units in destruction-priority order (error-like and
///   unknown states first, started last), lowest ordinal first within each
///   class, skipping ordinals named in [`ConvergeOptions::keep`].
///
/// Returns the destroyed units keyed by ordinal, each a snapshot of the
/// unit as it was before destruction was issued.
pub fn ensure_num_units<B: Backend + ?Sized>(
    backend: &mut B,
    service: &str,
    target: Option<u32>,
    opts: &ConvergeOptions,
) -> Result<BTreeMap<u32, Unit>> {
    let Some(target) = target else {
        tracing::info!(service, "destroying service");
        backend.destroy_service(service)?;
        return Ok(BTreeMap::new());
    };

    let Some(mut units) = backend.list_units(service)? else {
        // An absent service at target zero is already converged; adding
        // zero units would materialize an empty service.
        if target > 0 {
            tracing::info!(service, num_units = target, "service absent, deploying");
            backend.add_units(service, target)?;
        }
        return Ok(BTreeMap::new());
    };

    let current = units.len() as u32;
    if current < target {
        let missing = target - current;
        tracing::info!(service, current, target, adding = missing, "scaling up");
        backend.add_units(service, missing)?;
        return Ok(BTreeMap::new());
    }
    if current == target {
        tracing::debug!(service, current, "already at target");
        return Ok(BTreeMap::new());
    }

    let excess = (current - target) as usize;
    let victims = select_victims(&units, excess, &opts.keep);
    tracing::info!(
        service,
        current,
        target,
        destroying = victims.len(),
        "scaling down"
    );

    let mut destroyed = BTreeMap::new();
    for &ordinal in &victims {
        if let Some(unit) = units.remove(&ordinal) {
            tracing::info!(unit = %unit_name(service, ordinal), state = %unit.state, "destroying unit");
            backend.destroy_unit(service, ordinal, false)?;
            destroyed.insert(ordinal, unit);
        }
    }

    if opts.terminate {
        let machines: Vec<String> = destroyed
            .values()
            .filter_map(|unit| unit.machine.clone())
            .collect();
        if !machines.is_empty() {
            std::thread::sleep(opts.grace);
            for machine in machines {
                // A machine may already be gone once its unit is; that is
                // not a reason to abandon the remaining releases.
                if let Err(e) = backend.destroy_machine(&machine) {
                    tracing::warn!(machine = %machine, error = %e, "machine release failed, continuing");
                }
            }
        }
    }

    Ok(destroyed)
}

/// Pick `excess` ordinals to destroy, in destruction-priority order and
/// ascending ordinal within each class. Kept ordinals are never selected,
/// even if that leaves the service above target.
fn select_victims(
    units: &BTreeMap<u32, Unit>,
    excess: usize,
    keep: &BTreeSet<u32>,
) -> Vec<u32> {
    let mut victims = Vec::with_capacity(excess);
    for (rank, _) in UnitState::destruction_order().iter().enumerate() {
        for (&ordinal, unit) in units {
            if victims.len() == excess {
                return victims;
            }
            if keep.contains(&ordinal) {
                continue;
            }
            if unit.state.destruction_rank() == Some(rank) {
                victims.push(ordinal);
            }
        }
    }
    if victims.len() < excess {
        tracing::warn!(
            selected = victims.len(),
            excess,
            "kept ordinals prevent full scale-down"
        );
    }
    victims
}
