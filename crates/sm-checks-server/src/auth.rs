// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Transport half of the auth gate (§4.2 of `SPEC_FULL.md`): a tonic
//! interceptor that extracts the `authorization` metadata entry, resolves
//! it to a probe id via [`sm_session::auth`], and attaches the id to the
//! per-call request extensions before the handler runs.

use std::sync::Arc;

use sm_inventory::InventoryStore;
use tonic::{Request, Status};

use crate::convert::auth_error_to_status;

/// The resolved probe identity, injected into request extensions by
/// [`intercept`] and read back out by every handler.
#[derive(Debug, Clone, Copy)]
pub struct ProbeId(pub i64);

/// Build the interceptor closure bound to `store`. Applied to both the
/// `Checks` and `Tenants` services: §4.2 runs "for every incoming call."
pub fn intercept(store: Arc<InventoryStore>) -> impl FnMut(Request<()>) -> Result<Request<()>, Status> + Clone {
    move |mut req: Request<()>| {
        let values: Vec<&str> = req
            .metadata()
            .get_all("authorization")
            .iter()
            .map(|v| v.to_str().map_err(|_| Status::invalid_argument("authorization metadata is not ASCII")))
            .collect::<Result<_, _>>()?;
        let value = sm_session::auth::require_single_value(&values).map_err(|e| auth_error_to_status(&e))?;
        let probe_id = sm_session::auth::resolve_probe_id(&store, value).map_err(|e| auth_error_to_status(&e))?;
        req.extensions_mut().insert(ProbeId(probe_id));
        Ok(req)
    }
}

/// Read the probe id the interceptor attached. Absent only if the
/// interceptor did not run, which should never happen in a correctly
/// wired server (§4.5 step 1: "should never happen if the auth gate ran").
pub fn require_probe_id<T>(request: &Request<T>) -> Result<i64, Status> {
    request
        .extensions()
        .get::<ProbeId>()
        .map(|p| p.0)
        .ok_or_else(|| Status::invalid_argument("missing resolved probe identity"))
}
