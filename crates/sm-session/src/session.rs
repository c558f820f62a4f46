// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The session manager (§4.3 of `SPEC_FULL.md`): a process-wide mapping
//! `probe_id -> ProbeSession`, admission control, and the registration
//! watchdog.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sm_inventory::{InventoryStore, Probe};
use tokio::sync::{mpsc, oneshot};

use crate::error::SessionError;
use crate::filter::{CheckChange, IncomingChange};

/// Capacity of the bounded per-probe event/adhoc queues (§5).
pub const CHANNEL_CAPACITY: usize = 128;

/// Registration watchdog timeout (§4.3): a probe that registers but never
/// opens the change stream is force-deactivated after this long.
pub const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(1);

/// A batch of raw tenant-level mutations queued on a probe's `events`
/// channel (§4.3/§4.4). The stream handler runs each entry through
/// [`crate::filter::apply_batch`] against its own `known` set before
/// forwarding anything to the probe.
#[derive(Debug, Clone, Default)]
pub struct ChangeBatch {
    /// Pending tenant-level mutations, in enqueue order.
    pub changes: Vec<IncomingChange>,
}

/// A batch of already-materialised check changes, queued on a probe's
/// `adhoc` channel. Ad-hoc checks are one-off and are not tracked in the
/// convergence `known` set, so they are forwarded to the probe as-is.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Check changes in this batch.
    pub checks: Vec<CheckChange>,
}

struct SessionEntry {
    events_tx: mpsc::Sender<ChangeBatch>,
    events_rx: Option<mpsc::Receiver<ChangeBatch>>,
    adhoc_tx: mpsc::Sender<Batch>,
    adhoc_rx: Option<mpsc::Receiver<Batch>>,
    restart_tx: Option<oneshot::Sender<()>>,
    restart_rx: Option<oneshot::Receiver<()>>,
    ready_tx: Option<oneshot::Sender<()>>,
    gone_tx: Option<oneshot::Sender<()>>,
    gone_rx: Option<oneshot::Receiver<()>>,
    cleanup_tx: Option<oneshot::Sender<()>>,
}

/// Handles returned to the stream handler on activation (§4.3).
pub struct ActiveSession {
    probe_id: i64,
    /// Receives raw tenant-level mutations to filter and forward to the
    /// probe.
    pub events_rx: mpsc::Receiver<ChangeBatch>,
    /// Receives ad-hoc check events to forward to the probe.
    pub adhoc_rx: mpsc::Receiver<Batch>,
    /// Resolves when the server wants this stream to abort so the probe
    /// reconnects and re-reconciles.
    pub restart_rx: oneshot::Receiver<()>,
    /// Resolves when an external collaborator declares the probe's
    /// transport peer dead.
    pub gone_rx: oneshot::Receiver<()>,
}

impl ActiveSession {
    /// Non-blockingly drain any pending events/adhoc batches. Per §9's
    /// documented drain-on-deactivate race, a producer enqueueing in the
    /// narrow window between this drain and channel teardown can still
    /// lose an event; that is accepted (the probe will resync on its next
    /// connection).
    pub fn drain(&mut self) {
        while self.events_rx.try_recv().is_ok() {}
        while self.adhoc_rx.try_recv().is_ok() {}
    }

    /// The probe id this session belongs to.
    #[must_use]
    pub const fn probe_id(&self) -> i64 {
        self.probe_id
    }
}

type SessionMap = Mutex<HashMap<i64, SessionEntry>>;

fn new_entry() -> SessionEntry {
    let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (adhoc_tx, adhoc_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (restart_tx, restart_rx) = oneshot::channel();
    let (gone_tx, gone_rx) = oneshot::channel();
    let (cleanup_tx, _cleanup_rx) = oneshot::channel();
    SessionEntry {
        events_tx,
        events_rx: Some(events_rx),
        adhoc_tx,
        adhoc_rx: Some(adhoc_rx),
        restart_tx: Some(restart_tx),
        restart_rx: Some(restart_rx),
        // `ready_tx`/`ready_rx` are created by `register_probe` itself,
        // since the watchdog task needs to own the receiver directly
        // rather than fetching it back out of the map.
        ready_tx: None,
        gone_tx: Some(gone_tx),
        gone_rx: Some(gone_rx),
        cleanup_tx: Some(cleanup_tx),
    }
}

fn lock(sessions: &SessionMap) -> std::sync::MutexGuard<'_, HashMap<i64, SessionEntry>> {
    sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Force-deactivate a session without it ever having been activated
/// (registration watchdog timeout path), or as the common teardown used by
/// [`SessionManager::deactivate`]. Idempotent: a second call for the same
/// id is a no-op.
fn teardown(sessions: &SessionMap, probe_id: i64) {
    let removed = {
        let mut map = lock(sessions);
        map.remove(&probe_id)
    };
    let Some(mut entry) = removed else {
        return;
    };
    if let Some(mut rx) = entry.events_rx.take() {
        while rx.try_recv().is_ok() {}
    }
    if let Some(mut rx) = entry.adhoc_rx.take() {
        while rx.try_recv().is_ok() {}
    }
    if let Some(tx) = entry.cleanup_tx.take() {
        let _ = tx.send(());
    }
}

/// Owns the process-wide probe-session map and serializes registration,
/// activation, and deactivation on a single mutex (§4.3, §5).
pub struct SessionManager {
    sessions: Arc<SessionMap>,
    inventory: Arc<InventoryStore>,
    registration_timeout: Duration,
}

impl SessionManager {
    /// Create a session manager backed by the given inventory store, using
    /// the default 1-second registration-watchdog timeout (§4.3).
    #[must_use]
    pub fn new(inventory: Arc<InventoryStore>) -> Self {
        Self::with_registration_timeout(inventory, REGISTRATION_TIMEOUT)
    }

    /// Create a session manager with a caller-supplied registration-watchdog
    /// timeout (§12's `registration_timeout_ms` setting).
    #[must_use]
    pub fn with_registration_timeout(inventory: Arc<InventoryStore>, registration_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            inventory,
            registration_timeout,
        }
    }

    /// `RegisterProbe`: allocate a new session for `probe_id`, spawn its
    /// registration watchdog, and return the probe record.
    ///
    /// Fails with [`SessionError::AlreadyExists`] if a session is already
    /// registered for this id, or [`SessionError::Internal`] if the probe
    /// record cannot be looked up.
    pub fn register_probe(&self, probe_id: i64) -> Result<Probe, SessionError> {
        {
            let mut map = lock(&self.sessions);
            if map.contains_key(&probe_id) {
                return Err(SessionError::AlreadyExists);
            }
            let mut entry = new_entry();
            // The watchdog owns the ready receiver directly; it is never
            // stored in the map (only `ready_tx` is, for `activate` to
            // close).
            let (ready_tx, ready_rx) = oneshot::channel();
            entry.ready_tx = Some(ready_tx);
            map.insert(probe_id, entry);

            let sessions = Arc::clone(&self.sessions);
            let timeout = self.registration_timeout;
            tokio::spawn(async move {
                if tokio::time::timeout(timeout, ready_rx).await.is_err() {
                    tracing::info!(probe_id, "registration watchdog expired; deactivating");
                    teardown(&sessions, probe_id);
                }
            });
        }

        self.inventory
            .get_probe(probe_id)
            .map_err(|e| SessionError::from_lookup_failure(&e))
    }

    /// Activate the session for `probe_id`: close `ready` and hand the
    /// stream handler its channel endpoints. Fails with
    /// [`SessionError::NotFound`] if no session is registered, or
    /// [`SessionError::Internal`] if the session was already activated.
    pub fn activate(&self, probe_id: i64) -> Result<ActiveSession, SessionError> {
        let mut map = lock(&self.sessions);
        let entry = map.get_mut(&probe_id).ok_or(SessionError::NotFound)?;

        let events_rx = entry
            .events_rx
            .take()
            .ok_or_else(|| SessionError::Internal("session already activated".into()))?;
        let adhoc_rx = entry.adhoc_rx.take().ok_or_else(|| {
            SessionError::Internal("session already activated (adhoc)".into())
        })?;
        let restart_rx = entry.restart_rx.take().ok_or_else(|| {
            SessionError::Internal("session already activated (restart)".into())
        })?;
        let gone_rx = entry
            .gone_rx
            .take()
            .ok_or_else(|| SessionError::Internal("session already activated (gone)".into()))?;

        if let Some(ready_tx) = entry.ready_tx.take() {
            let _ = ready_tx.send(());
        }

        Ok(ActiveSession {
            probe_id,
            events_rx,
            adhoc_rx,
            restart_rx,
            gone_rx,
        })
    }

    /// Deactivate the session for `probe_id`. Called exactly once per
    /// session, from the same stream task that activated it (or from the
    /// watchdog, if it never activated). Subsequent calls are no-ops.
    pub fn deactivate(&self, probe_id: i64) {
        teardown(&self.sessions, probe_id);
    }

    /// Request the active stream for `probe_id` to abort so the probe
    /// reconnects and re-reconciles. A no-op if no session exists or the
    /// restart signal was already consumed.
    pub fn request_restart(&self, probe_id: i64) {
        let mut map = lock(&self.sessions);
        if let Some(entry) = map.get_mut(&probe_id) {
            if let Some(tx) = entry.restart_tx.take() {
                let _ = tx.send(());
            }
        }
    }

    /// Declare the probe's transport peer dead; the active stream (if any)
    /// observes this on its `gone` receiver and aborts.
    pub fn mark_gone(&self, probe_id: i64) {
        let mut map = lock(&self.sessions);
        if let Some(entry) = map.get_mut(&probe_id) {
            if let Some(tx) = entry.gone_tx.take() {
                let _ = tx.send(());
            }
        }
    }

    /// Enqueue a batch of raw tenant-level mutations on `probe_id`'s
    /// `events` channel, for the stream handler to filter against its own
    /// `known` set (§4.4). A no-op if no session exists for `probe_id` (the
    /// change-dispatch engine's recipient set is a superset of "has an
    /// active session"). Non-blocking: if the bounded queue is full, the
    /// batch is dropped and the probe is asked to reconnect via `restart`
    /// (§5's back-pressure policy).
    pub fn enqueue_change(&self, probe_id: i64, batch: ChangeBatch) {
        let tx = {
            let map = lock(&self.sessions);
            map.get(&probe_id).map(|e| e.events_tx.clone())
        };
        let Some(tx) = tx else { return };
        if tx.try_send(batch).is_err() {
            tracing::warn!(probe_id, "event queue full; forcing restart");
            self.request_restart(probe_id);
        }
    }

    /// Enqueue an already-materialised batch on `probe_id`'s `adhoc`
    /// channel. Same back-pressure policy as [`Self::enqueue_change`].
    pub fn enqueue_adhoc(&self, probe_id: i64, batch: Batch) {
        let tx = {
            let map = lock(&self.sessions);
            map.get(&probe_id).map(|e| e.adhoc_tx.clone())
        };
        let Some(tx) = tx else { return };
        if tx.try_send(batch).is_err() {
            tracing::warn!(probe_id, "adhoc queue full; forcing restart");
            self.request_restart(probe_id);
        }
    }

    /// Whether a session currently exists for `probe_id`.
    #[must_use]
    pub fn has_session(&self, probe_id: i64) -> bool {
        lock(&self.sessions).contains_key(&probe_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sm_inventory::{Tenant, TenantStatus};

    fn store_with_probe() -> (Arc<InventoryStore>, i64) {
        let store = Arc::new(InventoryStore::new());
        let tenant = store
            .add_tenant(Tenant {
                id: 0,
                org_id: 1,
                stack_id: 1,
                status: TenantStatus::Active,
                reason: String::new(),
                created: 0.0,
                modified: 0.0,
                metrics_remote: None,
                events_remote: None,
                secret_store: None,
            })
            .expect("tenant");
        let probe = store
            .add_probe(
                sm_inventory::Probe {
                    id: 0,
                    tenant_id: tenant.id,
                    name: "p".into(),
                    public: false,
                    created: 0.0,
                    modified: 0.0,
                    latitude: 0.0,
                    longitude: 0.0,
                    region: String::new(),
                    labels: Vec::new(),
                },
                b"tok".to_vec(),
            )
            .expect("probe");
        (store, probe.id)
    }

    #[tokio::test]
    async fn register_twice_is_already_exists() {
        let (store, probe_id) = store_with_probe();
        let manager = SessionManager::new(store);
        manager.register_probe(probe_id).expect("first register");
        let err = manager.register_probe(probe_id).unwrap_err();
        assert!(matches!(err, SessionError::AlreadyExists));
    }

    #[tokio::test]
    async fn activate_requires_prior_registration() {
        let (store, probe_id) = store_with_probe();
        let manager = SessionManager::new(store);
        assert!(matches!(
            manager.activate(probe_id).unwrap_err(),
            SessionError::NotFound
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn registration_timeout_deactivates_and_allows_reregistration() {
        let (store, probe_id) = store_with_probe();
        let manager = SessionManager::new(store);
        manager.register_probe(probe_id).expect("register");
        assert!(manager.has_session(probe_id));

        tokio::time::advance(REGISTRATION_TIMEOUT + Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert!(!manager.has_session(probe_id));

        manager
            .register_probe(probe_id)
            .expect("re-register after timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn activation_prevents_watchdog_from_deactivating() {
        let (store, probe_id) = store_with_probe();
        let manager = SessionManager::new(store);
        manager.register_probe(probe_id).expect("register");
        let _active = manager.activate(probe_id).expect("activate");

        tokio::time::advance(REGISTRATION_TIMEOUT + Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert!(manager.has_session(probe_id), "activation closes ready in time");
    }

    #[tokio::test]
    async fn deactivate_is_idempotent() {
        let (store, probe_id) = store_with_probe();
        let manager = SessionManager::new(store);
        manager.register_probe(probe_id).expect("register");
        manager.deactivate(probe_id);
        manager.deactivate(probe_id);
        assert!(!manager.has_session(probe_id));
    }

    #[tokio::test]
    async fn restart_signal_resolves_active_session() {
        let (store, probe_id) = store_with_probe();
        let manager = SessionManager::new(store);
        manager.register_probe(probe_id).expect("register");
        let mut active = manager.activate(probe_id).expect("activate");
        manager.request_restart(probe_id);
        tokio::time::timeout(Duration::from_millis(100), &mut active.restart_rx)
            .await
            .expect("restart resolves")
            .expect("sender not dropped");
    }
}
