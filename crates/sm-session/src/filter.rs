// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The change filter (§4.4 of `SPEC_FULL.md`): the heart of the core. A
//! pure function over `(probe_id, incoming_change, known_set)` yielding at
//! most one outgoing `CheckChange`, possibly re-tagged.

use std::collections::HashSet;

use sm_inventory::Check;

/// Operation carried by an incoming tenant-level mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    /// The check was just created.
    Add,
    /// The check was mutated in place.
    Update,
    /// The check was removed.
    Delete,
}

/// A per-probe command: add/update a full check record, or delete by id
/// only (per §4.4, a `DELETE` always carries just the id).
#[derive(Debug, Clone, PartialEq)]
pub enum CheckChange {
    /// The probe should start running this check.
    Add(Check),
    /// The probe should apply these new field values.
    Update(Check),
    /// The probe should stop running the check with this id.
    Delete {
        /// Id of the check to remove.
        id: i64,
    },
}

impl CheckChange {
    /// The check id this change concerns, regardless of variant.
    #[must_use]
    pub const fn check_id(&self) -> i64 {
        match self {
            Self::Add(c) | Self::Update(c) => c.id,
            Self::Delete { id } => *id,
        }
    }
}

/// A tenant-level mutation as it arrives from the broadcast path.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingChange {
    /// What kind of mutation this is.
    pub op: ChangeOp,
    /// The check as it stands after the mutation. For `Delete`, only `id`
    /// is guaranteed meaningful.
    pub check: Check,
}

/// Apply [`filter`] across every change in a batch for a single probe,
/// updating `known` in place as each change is materialised, and return the
/// outgoing batch of wire-level [`CheckChange`]s (possibly empty).
///
/// This is the per-probe half of the change-dispatch engine (§4.4): the
/// stream handler's main loop (§4.5 step 4) calls this once per batch
/// received on the probe's `events` channel. Per §4.4's closing rule, an
/// empty result means the batch is suppressed — the caller sends nothing.
#[must_use]
pub fn apply_batch(probe_id: i64, batch: &[IncomingChange], known: &mut HashSet<i64>) -> Vec<CheckChange> {
    let mut out = Vec::with_capacity(batch.len());
    for incoming in batch {
        let Some(change) = filter(probe_id, incoming, known) else {
            continue;
        };
        match &change {
            CheckChange::Add(c) => {
                known.insert(c.id);
            }
            CheckChange::Delete { id } => {
                known.remove(id);
            }
            CheckChange::Update(_) => {}
        }
        out.push(change);
    }
    out
}

/// Apply the decision table in §4.4 for a single probe.
///
/// Pure: does not mutate `known`. Callers update `known` according to the
/// returned op (`Add` ⇒ insert id; `Delete` ⇒ remove id; `Update` ⇒ no
/// change).
#[must_use]
pub fn filter(probe_id: i64, incoming: &IncomingChange, known: &HashSet<i64>) -> Option<CheckChange> {
    let listed = incoming.check.probes.contains(&probe_id);
    let is_known = known.contains(&incoming.check.id);
    let enabled = incoming.check.enabled;

    if !listed {
        return is_known.then(|| CheckChange::Delete {
            id: incoming.check.id,
        });
    }

    if !is_known {
        return if enabled {
            match incoming.op {
                ChangeOp::Add | ChangeOp::Update => Some(CheckChange::Add(incoming.check.clone())),
                ChangeOp::Delete => None,
            }
        } else {
            None
        };
    }

    // listed && known
    if !enabled {
        return Some(CheckChange::Delete {
            id: incoming.check.id,
        });
    }
    match incoming.op {
        ChangeOp::Add => Some(CheckChange::Add(incoming.check.clone())),
        ChangeOp::Update => Some(CheckChange::Update(incoming.check.clone())),
        ChangeOp::Delete => Some(CheckChange::Delete {
            id: incoming.check.id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(id: i64, probes: Vec<i64>, enabled: bool) -> Check {
        Check {
            id,
            tenant_id: 1,
            job: "j".into(),
            target: "t".into(),
            frequency: 60,
            timeout: 10,
            probes,
            enabled,
            settings: Vec::new(),
            created: 0.0,
            modified: 0.0,
        }
    }

    #[test]
    fn not_listed_not_known_is_skipped() {
        let incoming = IncomingChange {
            op: ChangeOp::Add,
            check: check(1, vec![], true),
        };
        assert_eq!(filter(99, &incoming, &HashSet::new()), None);
    }

    #[test]
    fn not_listed_but_known_always_deletes() {
        let known: HashSet<i64> = [1].into_iter().collect();
        for op in [ChangeOp::Add, ChangeOp::Update, ChangeOp::Delete] {
            let incoming = IncomingChange {
                op,
                check: check(1, vec![], true),
            };
            assert_eq!(
                filter(99, &incoming, &known),
                Some(CheckChange::Delete { id: 1 })
            );
        }
    }

    #[test]
    fn listed_new_disabled_is_skipped() {
        let incoming = IncomingChange {
            op: ChangeOp::Add,
            check: check(1, vec![99], false),
        };
        assert_eq!(filter(99, &incoming, &HashSet::new()), None);
    }

    #[test]
    fn listed_new_enabled_add_or_update_materialises_as_add() {
        for op in [ChangeOp::Add, ChangeOp::Update] {
            let incoming = IncomingChange {
                op,
                check: check(1, vec![99], true),
            };
            let out = filter(99, &incoming, &HashSet::new());
            assert!(matches!(out, Some(CheckChange::Add(c)) if c.id == 1));
        }
    }

    #[test]
    fn listed_new_delete_is_skipped() {
        let incoming = IncomingChange {
            op: ChangeOp::Delete,
            check: check(1, vec![99], true),
        };
        assert_eq!(filter(99, &incoming, &HashSet::new()), None);
    }

    #[test]
    fn listed_known_disabled_deletes_regardless_of_op() {
        let known: HashSet<i64> = [1].into_iter().collect();
        for op in [ChangeOp::Add, ChangeOp::Update, ChangeOp::Delete] {
            let incoming = IncomingChange {
                op,
                check: check(1, vec![99], false),
            };
            assert_eq!(
                filter(99, &incoming, &known),
                Some(CheckChange::Delete { id: 1 })
            );
        }
    }

    #[test]
    fn listed_known_enabled_update_stays_update() {
        let known: HashSet<i64> = [1].into_iter().collect();
        let incoming = IncomingChange {
            op: ChangeOp::Update,
            check: check(1, vec![99], true),
        };
        assert!(matches!(
            filter(99, &incoming, &known),
            Some(CheckChange::Update(c)) if c.id == 1
        ));
    }

    #[test]
    fn idempotence_on_convergence() {
        let mut known: HashSet<i64> = HashSet::new();
        let incoming = IncomingChange {
            op: ChangeOp::Add,
            check: check(7, vec![99], true),
        };
        let first = filter(99, &incoming, &known).expect("first add");
        assert!(matches!(first, CheckChange::Add(_)));
        known.insert(7);
        let second = filter(99, &incoming, &known).expect("converges");
        assert!(matches!(second, CheckChange::Update(_)));
    }

    #[test]
    fn purity_same_inputs_same_output() {
        let known: HashSet<i64> = [3].into_iter().collect();
        let incoming = IncomingChange {
            op: ChangeOp::Update,
            check: check(3, vec![1], true),
        };
        assert_eq!(
            filter(1, &incoming, &known),
            filter(1, &incoming, &known)
        );
    }

    #[test]
    fn apply_batch_reassign_scenario() {
        // C1 moves from P1-only to P2-only; update carries the new record.
        let moved = IncomingChange {
            op: ChangeOp::Update,
            check: check(1, vec![2], true),
        };

        let mut p1_known: HashSet<i64> = [1].into_iter().collect();
        let p1_out = apply_batch(1, std::slice::from_ref(&moved), &mut p1_known);
        assert_eq!(p1_out, vec![CheckChange::Delete { id: 1 }]);
        assert!(!p1_known.contains(&1));

        let mut p2_known: HashSet<i64> = HashSet::new();
        let p2_out = apply_batch(2, std::slice::from_ref(&moved), &mut p2_known);
        assert!(matches!(p2_out.as_slice(), [CheckChange::Add(c)] if c.id == 1));
        assert!(p2_known.contains(&1));
    }

    #[test]
    fn apply_batch_disable_scenario() {
        let disabled = IncomingChange {
            op: ChangeOp::Update,
            check: check(1, vec![1, 2], false),
        };

        for probe_id in [1_i64, 2] {
            let mut known: HashSet<i64> = [1].into_iter().collect();
            let out = apply_batch(probe_id, std::slice::from_ref(&disabled), &mut known);
            assert_eq!(out, vec![CheckChange::Delete { id: 1 }]);
            assert!(!known.contains(&1));
        }
    }

    #[test]
    fn apply_batch_suppresses_empty_output() {
        let untouched = IncomingChange {
            op: ChangeOp::Update,
            check: check(1, vec![], true),
        };
        let mut known = HashSet::new();
        assert!(apply_batch(99, std::slice::from_ref(&untouched), &mut known).is_empty());
    }
}
