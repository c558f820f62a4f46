// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wire schema for the probe-facing RPC surface: `Checks.RegisterProbe`,
//! `Checks.GetChanges`, `Checks.Ping`, and `Tenants.GetTenant`.
//!
//! Generated from `proto/checks.proto` via `tonic-prost-build`; this crate
//! re-exports the generated types and adds the small amount of glue
//! (`CheckOperation` conversions, status-code constants) that callers need
//! without touching `prost`/`tonic` directly.

#![allow(missing_docs)]

pub mod pb {
    //! Generated protobuf/gRPC types and service stubs.
    #![allow(clippy::all, clippy::pedantic, clippy::nursery)]
    tonic::include_proto!("monitoring.checks.v1");
}

pub use pb::{
    checks_client::ChecksClient,
    checks_server::{Checks, ChecksServer},
    tenants_client::TenantsClient,
    tenants_server::{Tenants, TenantsServer},
    Changes, Check, CheckChange, CheckOperation, CheckState, Label, PingRequest, PongResponse,
    ProbeInfo, ProbeState, RegisterProbeResult, RemoteInfo, Status, Tenant, TenantInfo,
};

/// Stable gRPC-style status codes used throughout the RPC surface.
///
/// These mirror the subset of `google.rpc.Code` the error design (§7 of
/// `SPEC_FULL.md`) names explicitly; `sm-checks-server` maps its
/// `CoreError`/`SessionError` types onto these when building a
/// `tonic::Status`.
pub mod status_code {
    /// The operation completed successfully.
    pub const OK: i32 = 0;
    /// Caller supplied an invalid/malformed argument.
    pub const INVALID_ARGUMENT: i32 = 3;
    /// The requested resource was not found.
    pub const NOT_FOUND: i32 = 5;
    /// The resource already exists (conflict).
    pub const ALREADY_EXISTS: i32 = 6;
    /// The caller is not authenticated.
    pub const UNAUTHENTICATED: i32 = 16;
    /// The operation was aborted, typically by the server.
    pub const ABORTED: i32 = 10;
    /// Internal server error.
    pub const INTERNAL: i32 = 13;
}

impl CheckOperation {
    /// Stable integer encoding (part of the wire contract; never renumbered).
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }
}
