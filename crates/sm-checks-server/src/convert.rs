// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Conversions between `sm_inventory`/`sm_session` domain types and the
//! `sm_proto` wire types, and the `CoreError`/`SessionError`/`AuthError` →
//! `tonic::Status` mapping table from §11 of `SPEC_FULL.md`.

use sm_inventory::{Check, CoreError, Probe, Tenant, TenantStatus};
use sm_session::{AuthError, CheckChange, SessionError};
use sm_proto::{CheckOperation, RegisterProbeResult};
use tonic::Status;

/// Map a [`CoreError`] to a [`Status`] per the §11/§7 mapping table.
pub fn core_error_to_status(err: &CoreError) -> Status {
    match err {
        CoreError::Validation(msg) => Status::invalid_argument(msg.clone()),
        CoreError::NotFound(msg) => Status::not_found(msg.clone()),
        CoreError::Conflict(msg) => Status::already_exists(msg.clone()),
        CoreError::Internal(_) => Status::internal("internal error"),
    }
}

/// Map a [`SessionError`] to a [`Status`].
pub fn session_error_to_status(err: &SessionError) -> Status {
    match err {
        SessionError::AlreadyExists => Status::already_exists("session already exists"),
        SessionError::NotFound => Status::not_found("no session for probe"),
        SessionError::Internal(_) => Status::internal("internal error"),
    }
}

/// Map an [`AuthError`] to a [`Status`].
pub fn auth_error_to_status(err: &AuthError) -> Status {
    match err {
        AuthError::InvalidArgument(msg) => Status::invalid_argument(msg.clone()),
        AuthError::UnknownToken(_) => Status::unauthenticated("unknown token"),
    }
}

/// `tonic::Code::Aborted`, used to voluntarily end a stream on restart or
/// `gone` (§4.5 step 4).
pub fn stream_aborted() -> Status {
    Status::aborted("stream aborted; reconnect and resync")
}

fn remote_info_to_wire(r: &sm_inventory::RemoteInfo) -> sm_proto::RemoteInfo {
    sm_proto::RemoteInfo {
        id: r.id,
        name: r.name.clone(),
        url: r.url.clone(),
    }
}

/// Convert a domain [`Tenant`] to its wire representation. `secret_store`
/// is deliberately never placed on the wire (§3: tokens/credentials are
/// never disclosed after creation).
pub fn tenant_to_wire(t: &Tenant) -> sm_proto::Tenant {
    sm_proto::Tenant {
        id: t.id,
        org_id: t.org_id,
        stack_id: t.stack_id,
        status: status_code_for_tenant(t.status),
        reason: t.reason.clone(),
        created: t.created,
        modified: t.modified,
        metrics_remote: t.metrics_remote.as_ref().map(remote_info_to_wire),
        events_remote: t.events_remote.as_ref().map(remote_info_to_wire),
    }
}

/// `TenantStatus` is carried on the wire as its `UPPERCASE` name, matching
/// `sm_inventory`'s own `serde(rename_all = "UPPERCASE")` representation.
fn status_code_for_tenant(status: TenantStatus) -> String {
    match status {
        TenantStatus::Active => "ACTIVE".to_owned(),
        TenantStatus::Delete => "DELETE".to_owned(),
        TenantStatus::Restore => "RESTORE".to_owned(),
    }
}

/// Convert a domain [`Probe`] to its wire representation.
pub fn probe_to_wire(p: &Probe) -> sm_proto::ProbeInfo {
    sm_proto::ProbeInfo {
        id: p.id,
        tenant_id: p.tenant_id,
        name: p.name.clone(),
        public: p.public,
        created: p.created,
        modified: p.modified,
        latitude: p.latitude,
        longitude: p.longitude,
        region: p.region.clone(),
        labels: p
            .labels
            .iter()
            .map(|l| sm_proto::Label {
                name: l.name.clone(),
                value: l.value.clone(),
            })
            .collect(),
    }
}

/// Convert a domain [`Check`] to its wire representation.
pub fn check_to_wire(c: &Check) -> sm_proto::Check {
    sm_proto::Check {
        id: c.id,
        tenant_id: c.tenant_id,
        job: c.job.clone(),
        target: c.target.clone(),
        frequency: c.frequency,
        timeout: c.timeout,
        probes: c.probes.clone(),
        enabled: c.enabled,
        settings: c.settings.clone(),
        created: c.created,
        modified: c.modified,
    }
}

/// Convert a domain [`CheckChange`] into the wire `CheckChange` message.
/// A `Delete` is carried as a check record with only `id` populated, per
/// §4.4's "a DELETE operation... carries only the check id."
pub fn check_change_to_wire(change: &CheckChange) -> sm_proto::CheckChange {
    match change {
        CheckChange::Add(c) => sm_proto::CheckChange {
            operation: CheckOperation::CheckAdd.code(),
            check: Some(check_to_wire(c)),
        },
        CheckChange::Update(c) => sm_proto::CheckChange {
            operation: CheckOperation::CheckUpdate.code(),
            check: Some(check_to_wire(c)),
        },
        CheckChange::Delete { id } => sm_proto::CheckChange {
            operation: CheckOperation::CheckDelete.code(),
            check: Some(sm_proto::Check {
                id: *id,
                ..empty_wire_check()
            }),
        },
    }
}

fn empty_wire_check() -> sm_proto::Check {
    sm_proto::Check {
        id: 0,
        tenant_id: 0,
        job: String::new(),
        target: String::new(),
        frequency: 0,
        timeout: 0,
        probes: Vec::new(),
        enabled: false,
        settings: Vec::new(),
        created: 0.0,
        modified: 0.0,
    }
}

/// Build a `RegisterProbeResult` carrying an embedded domain-level status
/// (§6: `RegisterProbeResult` carries its own `{code, message}`, distinct
/// from the RPC's transport-level `tonic::Status`).
pub fn register_result(probe: Option<sm_proto::ProbeInfo>, code: i32, message: String) -> RegisterProbeResult {
    RegisterProbeResult {
        status: Some(sm_proto::Status { code, message }),
        probe,
    }
}
