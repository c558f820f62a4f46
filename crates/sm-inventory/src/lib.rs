// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The authoritative inventory of tenants, probes, checks, and probe
//! tokens for the synthetic-monitoring checks core, with the
//! referential-integrity invariants described in `SPEC_FULL.md` §3/§4.1.

pub mod bootstrap;
pub mod clock;
pub mod error;
pub mod model;
pub mod store;

pub use bootstrap::BootstrapData;
pub use clock::{Clock, SystemClock};
pub use error::CoreError;
pub use model::{Check, Label, Probe, RemoteInfo, SecretStore, Tenant, TenantStatus};
pub use store::InventoryStore;

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FixedClock(Cell<f64>);
    impl Clock for FixedClock {
        fn now(&self) -> f64 {
            let v = self.0.get();
            self.0.set(v + 1.0);
            v
        }
    }

    fn store() -> InventoryStore {
        InventoryStore::with_clock(FixedClock(Cell::new(1000.0)))
    }

    fn tenant(stack_id: i64) -> Tenant {
        Tenant {
            id: 0,
            org_id: 1,
            stack_id,
            status: TenantStatus::Active,
            reason: String::new(),
            created: 0.0,
            modified: 0.0,
            metrics_remote: None,
            events_remote: None,
            secret_store: None,
        }
    }

    fn probe(tenant_id: i64, name: &str, public: bool) -> Probe {
        Probe {
            id: 0,
            tenant_id,
            name: name.to_string(),
            public,
            created: 0.0,
            modified: 0.0,
            latitude: 0.0,
            longitude: 0.0,
            region: "dev".into(),
            labels: Vec::new(),
        }
    }

    fn check(tenant_id: i64, job: &str, target: &str, probes: Vec<i64>) -> Check {
        Check {
            id: 0,
            tenant_id,
            job: job.to_string(),
            target: target.to_string(),
            frequency: 60,
            timeout: 10,
            probes,
            enabled: true,
            settings: Vec::new(),
            created: 0.0,
            modified: 0.0,
        }
    }

    #[test]
    fn scenario_bootstrap() {
        let s = store();
        let t1 = s.add_tenant(tenant(1)).expect("add tenant");
        let p1 = s
            .add_probe(probe(t1.id, "p1", false), b"t1".to_vec())
            .expect("add probe");
        let c1 = s
            .add_check(check(t1.id, "j", "127.0.0.1", vec![p1.id]))
            .expect("add check");

        let assigned = s.list_checks_for_probe(p1.id);
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].id, c1.id);
    }

    #[test]
    fn scenario_name_collision() {
        let s = store();
        let t1 = s.add_tenant(tenant(1)).expect("add tenant");
        let t2 = s.add_tenant(tenant(2)).expect("add tenant");
        s.add_probe(probe(t1.id, "north", true), b"tok-a".to_vec())
            .expect("first public probe");

        let err = s
            .add_probe(probe(t2.id, "north", false), b"tok-b".to_vec())
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let err = s
            .add_probe(probe(t2.id, "north", true), b"tok-c".to_vec())
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn stack_id_must_be_unique() {
        let s = store();
        s.add_tenant(tenant(42)).expect("first tenant");
        let err = s.add_tenant(tenant(42)).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn check_job_target_pair_must_be_unique() {
        let s = store();
        let t = s.add_tenant(tenant(1)).expect("tenant");
        s.add_check(check(t.id, "j", "x", vec![])).expect("first check");
        let err = s.add_check(check(t.id, "j", "x", vec![])).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn delete_probe_removes_its_tokens() {
        let s = store();
        let t = s.add_tenant(tenant(1)).expect("tenant");
        let p = s
            .add_probe(probe(t.id, "p", false), b"secret".to_vec())
            .expect("probe");
        s.delete_probe(p.id).expect("delete");
        let err = s.find_probe_id_by_token(b"secret").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn delete_probe_blocked_while_referenced_by_a_check() {
        let s = store();
        let t = s.add_tenant(tenant(1)).expect("tenant");
        let p = s
            .add_probe(probe(t.id, "p", false), b"tok".to_vec())
            .expect("probe");
        s.add_check(check(t.id, "j", "x", vec![p.id])).expect("check");
        let err = s.delete_probe(p.id).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn update_check_returns_previous_record_and_updates_index() {
        let s = store();
        let t = s.add_tenant(tenant(1)).expect("tenant");
        let p1 = s
            .add_probe(probe(t.id, "p1", false), b"t1".to_vec())
            .expect("p1");
        let p2 = s
            .add_probe(probe(t.id, "p2", false), b"t2".to_vec())
            .expect("p2");
        let c1 = s
            .add_check(check(t.id, "j", "x", vec![p1.id]))
            .expect("check");

        let mut updated = c1.clone();
        updated.probes = vec![p2.id];
        let previous = s.update_check(updated).expect("update");
        assert_eq!(previous.probes, vec![p1.id]);

        assert!(s.list_checks_for_probe(p1.id).is_empty());
        assert_eq!(s.list_checks_for_probe(p2.id).len(), 1);
    }

    #[test]
    fn update_probe_rejects_name_change() {
        let s = store();
        let t = s.add_tenant(tenant(1)).expect("tenant");
        let p = s
            .add_probe(probe(t.id, "p", false), b"tok".to_vec())
            .expect("probe");
        let mut renamed = p.clone();
        renamed.name = "new-name".into();
        let err = s.update_probe(renamed).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn modified_strictly_increases_across_updates() {
        let s = store();
        let mut t = s.add_tenant(tenant(1)).expect("tenant");
        let first_modified = t.modified;
        t.reason = "paused".into();
        t = s.update_tenant(t).expect("update");
        assert!(t.modified > first_modified);
        assert!(t.modified >= t.created);
    }
}
