// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The change-dispatch engine's broadcast-side half (§4.4/§9 of
//! `SPEC_FULL.md`): given a tenant-level check mutation, compute which
//! probes could possibly need to hear about it and enqueue the raw change
//! on each one's `events` queue.
//!
//! Per §9's design note, the *producer* of these mutations (the substrate
//! that watches the inventory store and calls into this module) is an
//! external collaborator outside the core's scope — `spec.md` describes
//! only the contract it must honor ("enqueues one `Changes` record per
//! logical mutation ... non-blocking up to the 128-slot bound"). This
//! module is the core-owned consumer side of that contract: recipient
//! computation plus the enqueue, leaving the actual per-probe decision to
//! [`crate::filter::filter`] once the stream handler dequeues it.

use std::collections::BTreeSet;

use sm_inventory::Check;

use crate::filter::{ChangeOp, IncomingChange};
use crate::session::{ChangeBatch, SessionManager};

/// Every probe id that could possibly care about a check mutation: the
/// check's current `probes` list, plus (for updates) its previous one. A
/// probe that is in neither set was never told about the check and never
/// will be; a probe that dropped out of `probes` still needs a `DELETE`
/// (§4.4's "listed=false, known=true" row), which is why the previous set
/// is included even though the new record no longer lists it.
fn recipients(previous: Option<&Check>, current: &Check) -> BTreeSet<i64> {
    let mut ids: BTreeSet<i64> = current.probes.iter().copied().collect();
    if let Some(p) = previous {
        ids.extend(p.probes.iter().copied());
    }
    ids
}

/// Dispatch a check `Add`/`Update` mutation to every potentially affected
/// probe's session. `previous` is `None` for a brand-new check (§4.4's
/// "new" rows) and `Some(&old_record)` for an update, so the recipient set
/// can include probes the update just removed from `probes`.
///
/// A no-op for a probe with no active session — [`SessionManager::enqueue_change`]
/// silently drops the batch, consistent with a probe that will reconcile
/// from scratch (§4.5.1) the next time it connects.
pub fn dispatch_check_upsert(sessions: &SessionManager, op: ChangeOp, previous: Option<&Check>, current: &Check) {
    debug_assert!(!matches!(op, ChangeOp::Delete), "use dispatch_check_delete for removals");
    for probe_id in recipients(previous, current) {
        sessions.enqueue_change(
            probe_id,
            ChangeBatch {
                changes: vec![IncomingChange {
                    op,
                    check: current.clone(),
                }],
            },
        );
    }
}

/// Dispatch a check deletion: every probe listed on the check's last known
/// `probes` (as returned by `InventoryStore::delete_check`) must be told to
/// delete it.
pub fn dispatch_check_delete(sessions: &SessionManager, removed: &Check) {
    let recipients: BTreeSet<i64> = removed.probes.iter().copied().collect();
    for probe_id in recipients {
        sessions.enqueue_change(
            probe_id,
            ChangeBatch {
                changes: vec![IncomingChange {
                    op: ChangeOp::Delete,
                    check: removed.clone(),
                }],
            },
        );
    }
}
