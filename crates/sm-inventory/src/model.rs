// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Data model (§3 of `SPEC_FULL.md`): tenants, probes, checks, and the
//! opaque probe token.

use serde::{Deserialize, Serialize};

/// Administrative status of a [`Tenant`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TenantStatus {
    /// Tenant is active; probes may run its checks.
    Active,
    /// Tenant is scheduled for deletion.
    Delete,
    /// Tenant is being restored from a prior deletion.
    Restore,
}

/// Pointer to a tenant's downstream metrics or events endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteInfo {
    /// Remote instance id.
    pub id: i64,
    /// Human-readable name.
    pub name: String,
    /// Endpoint URL.
    pub url: String,
}

/// Credentials for a tenant's downstream secret store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecretStore {
    /// Secret-store endpoint URL.
    pub url: String,
    /// Opaque credential used to authenticate against the secret store.
    pub token: String,
}

/// An administrative boundary owning probes and checks and carrying
/// downstream credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tenant {
    /// Unique tenant id, assigned by the store on creation.
    pub id: i64,
    /// Owning organisation id.
    pub org_id: i64,
    /// Stack id; unique across all tenants.
    pub stack_id: i64,
    /// Administrative status.
    pub status: TenantStatus,
    /// Free-form status reason.
    pub reason: String,
    /// Creation timestamp (seconds since the epoch).
    pub created: f64,
    /// Last-modification timestamp (seconds since the epoch).
    pub modified: f64,
    /// Downstream metrics endpoint, if configured.
    pub metrics_remote: Option<RemoteInfo>,
    /// Downstream events endpoint, if configured.
    pub events_remote: Option<RemoteInfo>,
    /// Downstream secret-store credentials, if configured.
    pub secret_store: Option<SecretStore>,
}

/// A `name`/`value` label attached to a [`Probe`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Label {
    /// Label name.
    pub name: String,
    /// Label value.
    pub value: String,
}

/// A remote agent that executes checks and streams results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Probe {
    /// Unique probe id, assigned by the store on creation.
    pub id: i64,
    /// Owning tenant id. Immutable after creation.
    pub tenant_id: i64,
    /// Probe name. Immutable after creation; uniqueness scope depends on
    /// `public` (see the invariant on [`crate::store::InventoryStore::add_probe`]).
    pub name: String,
    /// Whether this probe is usable by checks in any tenant.
    pub public: bool,
    /// Creation timestamp (seconds since the epoch).
    pub created: f64,
    /// Last-modification timestamp (seconds since the epoch).
    pub modified: f64,
    /// Approximate latitude of the probe's location.
    pub latitude: f64,
    /// Approximate longitude of the probe's location.
    pub longitude: f64,
    /// Free-form region label (e.g. `"us-east"`).
    pub region: String,
    /// Additional operator-supplied labels.
    pub labels: Vec<Label>,
}

/// A scheduled health measurement identified by `(job, target)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Check {
    /// Unique check id, assigned by the store on creation.
    pub id: i64,
    /// Owning tenant id. Immutable after creation.
    pub tenant_id: i64,
    /// Job name. Immutable after creation; `(job, target)` is globally
    /// unique.
    pub job: String,
    /// Check target (e.g. a URL or host). Immutable after creation.
    pub target: String,
    /// Execution interval, in seconds.
    pub frequency: i32,
    /// Per-execution timeout, in seconds.
    pub timeout: i32,
    /// Probe ids this check is assigned to.
    pub probes: Vec<i64>,
    /// Whether the tenant wants this check to run at all.
    pub enabled: bool,
    /// Opaque, prober-specific settings payload.
    pub settings: Vec<u8>,
    /// Creation timestamp (seconds since the epoch).
    pub created: f64,
    /// Last-modification timestamp (seconds since the epoch).
    pub modified: f64,
}

/// An opaque probe token. Tokens are never disclosed after creation; the
/// store only ever compares raw bytes against what it was given.
pub type ProbeToken = Vec<u8>;
