// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The inventory store (§4.1 of `SPEC_FULL.md`): authoritative in-memory
//! state of tenants, probes, checks, and probe tokens, guarded by a single
//! mutex so every operation is atomic with respect to every other.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::error::CoreError;
use crate::model::{Check, Probe, ProbeToken, Tenant};

struct Inner {
    tenants: BTreeMap<i64, Tenant>,
    probes: BTreeMap<i64, Probe>,
    checks: BTreeMap<i64, Check>,
    /// token bytes -> probe id
    tokens: HashMap<Vec<u8>, i64>,
    /// probe id -> tokens bound to it (for teardown on delete)
    probe_tokens: HashMap<i64, HashSet<Vec<u8>>>,
    /// probe id -> ids of checks that list it, maintained transactionally
    /// with check mutations.
    probe_checks: HashMap<i64, BTreeSet<i64>>,
    next_tenant_id: i64,
    next_probe_id: i64,
    next_check_id: i64,
}

impl Inner {
    fn new() -> Self {
        Self {
            tenants: BTreeMap::new(),
            probes: BTreeMap::new(),
            checks: BTreeMap::new(),
            tokens: HashMap::new(),
            probe_tokens: HashMap::new(),
            probe_checks: HashMap::new(),
            next_tenant_id: 1,
            next_probe_id: 1,
            next_check_id: 1,
        }
    }
}

/// The authoritative tenant/probe/check inventory, behind one process-wide
/// mutex. All public methods are atomic: a rejected call leaves the store
/// bit-identical to its pre-call state.
pub struct InventoryStore {
    inner: Mutex<Inner>,
    clock: Box<dyn Clock>,
}

impl Default for InventoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InventoryStore {
    /// Create an empty store using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create an empty store using a caller-supplied clock (tests).
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
            clock: Box::new(clock),
        }
    }

    fn now(&self) -> f64 {
        self.clock.now()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    // ---------------------------------------------------------------
    // Tenants
    // ---------------------------------------------------------------

    /// Add a tenant. Rejects if a tenant with the same `stack_id` exists.
    pub fn add_tenant(&self, mut t: Tenant) -> Result<Tenant, CoreError> {
        let mut inner = self.lock();
        if inner.tenants.values().any(|e| e.stack_id == t.stack_id) {
            return Err(CoreError::conflict(format!(
                "tenant with stack_id {} already exists",
                t.stack_id
            )));
        }
        let id = inner.next_tenant_id;
        inner.next_tenant_id += 1;
        let now = self.now();
        t.id = id;
        t.created = now;
        t.modified = now;
        inner.tenants.insert(id, t.clone());
        Ok(t)
    }

    /// Look up a tenant by id.
    pub fn get_tenant(&self, id: i64) -> Result<Tenant, CoreError> {
        self.lock()
            .tenants
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("tenant {id}")))
    }

    /// List every tenant.
    pub fn list_tenants(&self) -> Vec<Tenant> {
        self.lock().tenants.values().cloned().collect()
    }

    /// Overwrite a tenant's mutable fields. Rejects if `id` is unknown.
    pub fn update_tenant(&self, mut t: Tenant) -> Result<Tenant, CoreError> {
        let mut inner = self.lock();
        let existing = inner
            .tenants
            .get(&t.id)
            .ok_or_else(|| CoreError::not_found(format!("tenant {}", t.id)))?;
        t.created = existing.created;
        t.modified = self.now();
        inner.tenants.insert(t.id, t.clone());
        Ok(t)
    }

    /// Remove a tenant. Rejects if any probe or check still references it.
    pub fn delete_tenant(&self, id: i64) -> Result<(), CoreError> {
        let mut inner = self.lock();
        if !inner.tenants.contains_key(&id) {
            return Err(CoreError::not_found(format!("tenant {id}")));
        }
        if inner.probes.values().any(|p| p.tenant_id == id) {
            return Err(CoreError::validation(format!(
                "tenant {id} still has probes referencing it"
            )));
        }
        if inner.checks.values().any(|c| c.tenant_id == id) {
            return Err(CoreError::validation(format!(
                "tenant {id} still has checks referencing it"
            )));
        }
        inner.tenants.remove(&id);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Probes
    // ---------------------------------------------------------------

    fn validate_probe_fields(p: &Probe) -> Result<(), CoreError> {
        if p.name.trim().is_empty() {
            return Err(CoreError::validation("probe name must not be empty"));
        }
        Ok(())
    }

    /// Global/tenant-scoped name-uniqueness rule (§3): if either probe is
    /// public, names must be globally unique; otherwise unique per tenant.
    fn check_probe_name_uniqueness(
        inner: &Inner,
        candidate: &Probe,
        exclude_id: Option<i64>,
    ) -> Result<(), CoreError> {
        for other in inner.probes.values() {
            if Some(other.id) == exclude_id {
                continue;
            }
            if other.name != candidate.name {
                continue;
            }
            if candidate.public || other.public {
                return Err(CoreError::conflict(format!(
                    "probe name {:?} is already in use (public scope)",
                    candidate.name
                )));
            }
            if other.tenant_id == candidate.tenant_id {
                return Err(CoreError::conflict(format!(
                    "probe name {:?} is already in use in tenant {}",
                    candidate.name, candidate.tenant_id
                )));
            }
        }
        Ok(())
    }

    /// Add a probe bound to a token. Rejects an unknown tenant, a name
    /// collision under the public/tenant scoping rule, or a token
    /// collision.
    pub fn add_probe(&self, mut p: Probe, token: ProbeToken) -> Result<Probe, CoreError> {
        Self::validate_probe_fields(&p)?;
        let mut inner = self.lock();
        if !inner.tenants.contains_key(&p.tenant_id) {
            return Err(CoreError::validation(format!(
                "unknown tenant {}",
                p.tenant_id
            )));
        }
        Self::check_probe_name_uniqueness(&inner, &p, None)?;
        if inner.tokens.contains_key(&token) {
            return Err(CoreError::conflict("token already bound to a probe"));
        }
        let id = inner.next_probe_id;
        inner.next_probe_id += 1;
        let now = self.now();
        p.id = id;
        p.created = now;
        p.modified = now;
        inner.tokens.insert(token.clone(), id);
        inner.probe_tokens.entry(id).or_default().insert(token);
        inner.probes.insert(id, p.clone());
        Ok(p)
    }

    /// Look up a probe by id.
    pub fn get_probe(&self, id: i64) -> Result<Probe, CoreError> {
        self.lock()
            .probes
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("probe {id}")))
    }

    /// Alias of [`Self::get_probe`], kept for parity with the wire API's
    /// separate lookup entry point.
    pub fn find_probe_by_id(&self, id: i64) -> Result<Probe, CoreError> {
        self.get_probe(id)
    }

    /// List every probe.
    pub fn list_probes(&self) -> Vec<Probe> {
        self.lock().probes.values().cloned().collect()
    }

    /// Resolve a bearer token to its probe id. Constant-time comparison is
    /// not required (§4.1).
    pub fn find_probe_id_by_token(&self, token: &[u8]) -> Result<i64, CoreError> {
        self.lock()
            .tokens
            .get(token)
            .copied()
            .ok_or_else(|| CoreError::not_found("no probe bound to token"))
    }

    /// Update a probe's mutable fields. Rejects an unknown id, a changed
    /// `name`, or a changed `tenant_id`; re-runs the uniqueness rule since
    /// toggling `public` can change its scope.
    pub fn update_probe(&self, p: Probe) -> Result<Probe, CoreError> {
        Self::validate_probe_fields(&p)?;
        let mut inner = self.lock();
        let existing = inner
            .probes
            .get(&p.id)
            .ok_or_else(|| CoreError::not_found(format!("probe {}", p.id)))?
            .clone();
        if existing.name != p.name {
            return Err(CoreError::validation("probe name is immutable"));
        }
        if existing.tenant_id != p.tenant_id {
            return Err(CoreError::validation("probe tenant_id is immutable"));
        }
        Self::check_probe_name_uniqueness(&inner, &p, Some(p.id))?;
        let mut p = p;
        p.created = existing.created;
        p.modified = self.now();
        inner.probes.insert(p.id, p.clone());
        Ok(p)
    }

    /// Remove a probe. Rejects if any check still lists it; removes all
    /// tokens bound to the id.
    pub fn delete_probe(&self, id: i64) -> Result<(), CoreError> {
        let mut inner = self.lock();
        if !inner.probes.contains_key(&id) {
            return Err(CoreError::not_found(format!("probe {id}")));
        }
        if inner.checks.values().any(|c| c.probes.contains(&id)) {
            return Err(CoreError::validation(format!(
                "probe {id} is still listed by a check"
            )));
        }
        inner.probes.remove(&id);
        if let Some(tokens) = inner.probe_tokens.remove(&id) {
            for tok in tokens {
                inner.tokens.remove(&tok);
            }
        }
        inner.probe_checks.remove(&id);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Checks
    // ---------------------------------------------------------------

    fn validate_check_fields(c: &Check) -> Result<(), CoreError> {
        if c.job.trim().is_empty() {
            return Err(CoreError::validation("check job must not be empty"));
        }
        if c.target.trim().is_empty() {
            return Err(CoreError::validation("check target must not be empty"));
        }
        Ok(())
    }

    fn check_probe_visibility(
        inner: &Inner,
        tenant_id: i64,
        probe_id: i64,
    ) -> Result<(), CoreError> {
        let probe = inner
            .probes
            .get(&probe_id)
            .ok_or_else(|| CoreError::validation(format!("unknown probe {probe_id}")))?;
        if probe.public || probe.tenant_id == tenant_id {
            Ok(())
        } else {
            Err(CoreError::validation(format!(
                "probe {probe_id} is not visible to tenant {tenant_id}"
            )))
        }
    }

    /// Add a check. Rejects an unknown tenant, a `(job, target)` duplicate,
    /// or any listed probe that does not exist or is not visible to the
    /// check's tenant.
    pub fn add_check(&self, mut c: Check) -> Result<Check, CoreError> {
        Self::validate_check_fields(&c)?;
        let mut inner = self.lock();
        if !inner.tenants.contains_key(&c.tenant_id) {
            return Err(CoreError::validation(format!("unknown tenant {}", c.tenant_id)));
        }
        if inner
            .checks
            .values()
            .any(|e| e.job == c.job && e.target == c.target)
        {
            return Err(CoreError::conflict(format!(
                "check (job={:?}, target={:?}) already exists",
                c.job, c.target
            )));
        }
        for probe_id in &c.probes {
            Self::check_probe_visibility(&inner, c.tenant_id, *probe_id)?;
        }
        let id = inner.next_check_id;
        inner.next_check_id += 1;
        let now = self.now();
        c.id = id;
        c.created = now;
        c.modified = now;
        for probe_id in &c.probes {
            inner.probe_checks.entry(*probe_id).or_default().insert(id);
        }
        inner.checks.insert(id, c.clone());
        Ok(c)
    }

    /// Look up a check by id.
    pub fn get_check(&self, id: i64) -> Result<Check, CoreError> {
        self.lock()
            .checks
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("check {id}")))
    }

    /// List every check.
    pub fn list_checks(&self) -> Vec<Check> {
        self.lock().checks.values().cloned().collect()
    }

    /// List the checks currently assigned to a probe, via the probe→check
    /// index maintained transactionally with check mutations.
    pub fn list_checks_for_probe(&self, probe_id: i64) -> Vec<Check> {
        let inner = self.lock();
        let Some(ids) = inner.probe_checks.get(&probe_id) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| inner.checks.get(id).cloned())
            .collect()
    }

    /// Update a check. Rejects an unknown id or a changed `job`/`target`/
    /// `tenant_id`. Returns the **previous** record so callers can diff the
    /// assignment set.
    pub fn update_check(&self, c: Check) -> Result<Check, CoreError> {
        Self::validate_check_fields(&c)?;
        let mut inner = self.lock();
        let existing = inner
            .checks
            .get(&c.id)
            .ok_or_else(|| CoreError::not_found(format!("check {}", c.id)))?
            .clone();
        if existing.job != c.job || existing.target != c.target || existing.tenant_id != c.tenant_id {
            return Err(CoreError::validation(
                "check job/target/tenant_id are immutable",
            ));
        }
        for probe_id in &c.probes {
            Self::check_probe_visibility(&inner, c.tenant_id, *probe_id)?;
        }
        let mut c = c;
        c.created = existing.created;
        c.modified = self.now();

        let old_set: BTreeSet<i64> = existing.probes.iter().copied().collect();
        let new_set: BTreeSet<i64> = c.probes.iter().copied().collect();
        for removed in old_set.difference(&new_set) {
            if let Some(ids) = inner.probe_checks.get_mut(removed) {
                ids.remove(&c.id);
            }
        }
        for added in new_set.difference(&old_set) {
            inner.probe_checks.entry(*added).or_default().insert(c.id);
        }

        inner.checks.insert(c.id, c.clone());
        Ok(existing)
    }

    /// Remove a check and return the record as it was just before removal,
    /// so the caller (the change-dispatch engine) can build per-probe
    /// `DELETE` events from its prior `probes` list before it is gone.
    pub fn delete_check(&self, id: i64) -> Result<Check, CoreError> {
        let mut inner = self.lock();
        let existing = inner
            .checks
            .remove(&id)
            .ok_or_else(|| CoreError::not_found(format!("check {id}")))?;
        for probe_id in &existing.probes {
            if let Some(ids) = inner.probe_checks.get_mut(probe_id) {
                ids.remove(&id);
            }
        }
        Ok(existing)
    }
}
