// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Bootstrap data loading (§6/§13 of `SPEC_FULL.md`): seed a freshly created
//! store from a JSON document, one `add_*` call per entry so every
//! invariant runs over bootstrap data exactly as it would over live RPCs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::{Check, Probe, Tenant};
use crate::store::InventoryStore;

/// `{tenants, probes, probeTokens, checks}`, loaded once at startup.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BootstrapData {
    /// Tenants to insert, in order.
    pub tenants: Vec<Tenant>,
    /// Probes to insert, in order.
    pub probes: Vec<Probe>,
    /// Token bytes for each probe, keyed by the `id` each `Probe` entry
    /// above declares (the store reassigns ids sequentially from 1 on a
    /// fresh load, so a bootstrap document's declared ids must match
    /// insertion order with no gaps for this mapping to resolve).
    #[serde(rename = "probeTokens")]
    pub probe_tokens: HashMap<String, String>,
    /// Checks to insert, in order.
    pub checks: Vec<Check>,
}

/// Load `data` into `store`, inserting every entry through the normal
/// `add_*` operations. Aborts on the first rejected entry, leaving the
/// store exactly as populated up to (not including) that entry — callers
/// that require all-or-nothing bootstrap should discard the store on error.
pub fn load(store: &InventoryStore, data: BootstrapData) -> Result<(), CoreError> {
    for tenant in data.tenants {
        store.add_tenant(tenant)?;
    }
    for probe in data.probes {
        let token = data
            .probe_tokens
            .get(&probe.id.to_string())
            .cloned()
            .unwrap_or_default();
        store.add_probe(probe, token.into_bytes())?;
    }
    for check in data.checks {
        store.add_check(check)?;
    }
    Ok(())
}
