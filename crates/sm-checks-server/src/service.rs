// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The `Checks` and `Tenants` tonic service implementations: the stream
//! handler (§4.5 of `SPEC_FULL.md`), `RegisterProbe`, `Ping`, and
//! `Tenants.GetTenant`.

use std::collections::HashSet;
use std::sync::Arc;

use sm_inventory::InventoryStore;
use sm_session::{
    apply_batch, reconcile, ActiveSession, Batch, CheckChange, ClaimedCheck, SessionError, SessionManager,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::auth::require_probe_id;
use crate::convert::{
    check_change_to_wire, core_error_to_status, probe_to_wire, register_result, session_error_to_status,
    stream_aborted, tenant_to_wire,
};
use sm_proto::pb::{
    checks_server::Checks, tenants_server::Tenants, Changes, PingRequest, PongResponse, ProbeInfo, ProbeState,
    RegisterProbeResult, TenantInfo,
};

/// Capacity of the outbound stream channel feeding each probe's
/// `GetChanges` response stream.
const OUTBOUND_CAPACITY: usize = 32;

/// Implements `Checks.RegisterProbe`/`GetChanges`/`Ping`.
pub struct ChecksService {
    inventory: Arc<InventoryStore>,
    sessions: Arc<SessionManager>,
}

impl ChecksService {
    /// Build the service over a shared inventory store and session manager.
    #[must_use]
    pub fn new(inventory: Arc<InventoryStore>, sessions: Arc<SessionManager>) -> Self {
        Self { inventory, sessions }
    }
}

#[tonic::async_trait]
impl Checks for ChecksService {
    async fn register_probe(&self, request: Request<ProbeInfo>) -> Result<Response<RegisterProbeResult>, Status> {
        let probe_id = require_probe_id(&request)?;
        tracing::info!(probe_id, "register probe");

        match self.sessions.register_probe(probe_id) {
            Ok(probe) => Ok(Response::new(register_result(
                Some(probe_to_wire(&probe)),
                sm_proto::status_code::OK,
                String::new(),
            ))),
            Err(SessionError::AlreadyExists) => Ok(Response::new(register_result(
                None,
                sm_proto::status_code::ALREADY_EXISTS,
                "session already exists for this probe".to_owned(),
            ))),
            Err(err @ SessionError::Internal(_)) => Ok(Response::new(register_result(
                None,
                sm_proto::status_code::INTERNAL,
                err.to_string(),
            ))),
            Err(SessionError::NotFound) => Ok(Response::new(register_result(
                None,
                sm_proto::status_code::INTERNAL,
                "no session".to_owned(),
            ))),
        }
    }

    type GetChangesStream = ReceiverStream<Result<Changes, Status>>;

    async fn get_changes(&self, request: Request<ProbeState>) -> Result<Response<Self::GetChangesStream>, Status> {
        let probe_id = require_probe_id(&request)?;
        let claimed: Vec<ClaimedCheck> = request
            .get_ref()
            .checks
            .iter()
            .map(|c| ClaimedCheck {
                id: c.id,
                last_modified: c.last_modified,
            })
            .collect();

        let mut active = self
            .sessions
            .activate(probe_id)
            .map_err(|e| session_error_to_status(&e))?;

        let assigned = self.inventory.list_checks_for_probe(probe_id);
        let reconciliation = reconcile(&assigned, &claimed);
        let mut known = reconciliation.known;

        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);

        if !reconciliation.changes.is_empty() {
            let changes = Changes {
                checks: reconciliation.changes.iter().map(check_change_to_wire).collect(),
                tenants: Vec::new(),
                is_delta_first_batch: reconciliation.is_delta_first_batch,
            };
            if tx.send(Ok(changes)).await.is_err() {
                self.sessions.deactivate(probe_id);
                return Err(Status::aborted("probe disconnected before initial batch"));
            }
        }

        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            drive_stream(probe_id, &mut active, &mut known, &tx).await;
            active.drain();
            sessions.deactivate(probe_id);
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn ping(&self, request: Request<PingRequest>) -> Result<Response<PongResponse>, Status> {
        let _probe_id = require_probe_id(&request)?;
        Ok(Response::new(PongResponse {
            sequence: request.get_ref().sequence,
        }))
    }
}

/// Main loop for an activated `GetChanges` stream (§4.5 step 4). Returns
/// when the probe disconnects, a restart/gone signal fires, or the
/// outbound channel closes because the client went away — including an
/// idle probe with no pending events, detected via `tx.closed()` so the
/// session is always deactivated instead of parking forever.
async fn drive_stream(
    probe_id: i64,
    active: &mut ActiveSession,
    known: &mut HashSet<i64>,
    tx: &mpsc::Sender<Result<Changes, Status>>,
) {
    loop {
        tokio::select! {
            biased;

            () = tx.closed() => {
                tracing::info!(probe_id, "stream context cancelled; probe went away");
                return;
            }
            _ = &mut active.restart_rx => {
                tracing::info!(probe_id, "stream restarted");
                let _ = tx.send(Err(stream_aborted())).await;
                return;
            }
            _ = &mut active.gone_rx => {
                tracing::info!(probe_id, "probe declared gone");
                let _ = tx.send(Err(stream_aborted())).await;
                return;
            }
            batch = active.events_rx.recv() => {
                let Some(batch) = batch else { return };
                let changes = apply_batch(probe_id, &batch.changes, known);
                if !changes.is_empty() && !send_changes(probe_id, &changes, tx).await {
                    return;
                }
            }
            batch = active.adhoc_rx.recv() => {
                let Some(batch) = batch else { return };
                if !forward_adhoc_batch(probe_id, batch, tx).await {
                    return;
                }
            }
        }
    }
}

/// Send a filtered batch of wire `CheckChange`s to the probe. Returns
/// `false` if the outbound channel is closed (the probe disconnected).
async fn send_changes(probe_id: i64, changes: &[CheckChange], tx: &mpsc::Sender<Result<Changes, Status>>) -> bool {
    tracing::trace!(probe_id, batch_len = changes.len(), "forwarding batch");
    let changes = Changes {
        checks: changes.iter().map(check_change_to_wire).collect(),
        tenants: Vec::new(),
        is_delta_first_batch: false,
    };
    tx.send(Ok(changes)).await.is_ok()
}

/// Forward an already-materialised ad-hoc batch as-is; ad-hoc checks are
/// one-off and are not tracked in the convergence `known` set (§4.3).
/// Returns `false` if the outbound channel is closed.
async fn forward_adhoc_batch(probe_id: i64, batch: Batch, tx: &mpsc::Sender<Result<Changes, Status>>) -> bool {
    if batch.checks.is_empty() {
        return true;
    }
    send_changes(probe_id, &batch.checks, tx).await
}

/// Implements `Tenants.GetTenant`.
pub struct TenantsService {
    inventory: Arc<InventoryStore>,
}

impl TenantsService {
    /// Build the service over a shared inventory store.
    #[must_use]
    pub fn new(inventory: Arc<InventoryStore>) -> Self {
        Self { inventory }
    }
}

#[tonic::async_trait]
impl Tenants for TenantsService {
    async fn get_tenant(&self, request: Request<TenantInfo>) -> Result<Response<sm_proto::Tenant>, Status> {
        let _probe_id = require_probe_id(&request)?;
        let id = request.get_ref().id;
        let tenant = self.inventory.get_tenant(id).map_err(|e| core_error_to_status(&e))?;
        Ok(Response::new(tenant_to_wire(&tenant)))
    }
}
