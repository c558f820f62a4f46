// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Initial reconciliation (§4.5.1 of `SPEC_FULL.md`): the first batch sent
//! on a `GetChanges` stream, diffing the probe's claimed state against the
//! store's assigned set.

use std::collections::{HashMap, HashSet};

use sm_inventory::Check;

use crate::filter::CheckChange;

/// A single `{id, last_modified}` entry the probe claims to already have.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClaimedCheck {
    /// Check id.
    pub id: i64,
    /// The `modified` timestamp the probe last saw for this check.
    pub last_modified: f64,
}

/// Result of reconciling claimed state against the store's assigned set.
pub struct Reconciliation {
    /// The batch to send to the probe; empty iff both inputs were empty.
    pub changes: Vec<CheckChange>,
    /// The authoritative known-set seed for the main loop: ids of enabled
    /// assigned checks.
    pub known: HashSet<i64>,
    /// Set iff `current_state` was non-empty (a reconnecting probe).
    pub is_delta_first_batch: bool,
}

/// Diff `current_state` (what the probe claims) against `assigned` (what
/// the store currently assigns to the probe), per §4.5.1.
#[must_use]
pub fn reconcile(assigned: &[Check], current_state: &[ClaimedCheck]) -> Reconciliation {
    let known: HashSet<i64> = assigned
        .iter()
        .filter(|c| c.enabled)
        .map(|c| c.id)
        .collect();

    let claimed: HashMap<i64, f64> = current_state.iter().map(|c| (c.id, c.last_modified)).collect();

    let mut changes = Vec::new();

    for c in assigned.iter().filter(|c| c.enabled) {
        match claimed.get(&c.id) {
            None => changes.push(CheckChange::Add(c.clone())),
            Some(last_modified) if (*last_modified - c.modified).abs() > f64::EPSILON => {
                changes.push(CheckChange::Update(c.clone()));
            }
            Some(_) => {}
        }
    }

    for id in claimed.keys() {
        if !known.contains(id) {
            changes.push(CheckChange::Delete { id: *id });
        }
    }

    Reconciliation {
        changes,
        known,
        is_delta_first_batch: !current_state.is_empty(),
    }
}
