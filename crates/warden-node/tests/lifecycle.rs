//! End-to-end license lifecycle scenarios across engine, watcher, overrides,
//! dispatcher and gate.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use warden_core::{
    AccessDecision, EventType, License, LicenseStatus, Member, Reason, Topic,
};
use warden_node::{
    EngineConfig, Error, LicenseEngine, LicenseStore, MemberRegistry, MemoryStore,
    RecordingChannel, Result,
};

struct Harness {
    engine: Arc<LicenseEngine>,
    store: Arc<MemoryStore>,
    push: Arc<RecordingChannel>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let push = Arc::new(RecordingChannel::new());
    let engine = Arc::new(LicenseEngine::with_store(
        store.clone(),
        push.clone(),
        EngineConfig::default(),
    ));
    Harness {
        engine,
        store,
        push,
    }
}

async fn seed(store: &MemoryStore, tenant: &str, capacity: u32, expires_in: Duration, students: u32) {
    let now = Utc::now();
    store
        .put_license(&License::new(tenant, capacity, now + expires_in, now).unwrap())
        .await
        .unwrap();
    for i in 0..students {
        store
            .upsert_member(&Member::student(tenant, format!("{}-s{}", tenant, i)))
            .await
            .unwrap();
    }
}

fn events_on(push: &RecordingChannel, topic: Topic) -> Vec<EventType> {
    push.on_topic(&topic)
        .iter()
        .map(|e| e.notification.event_type)
        .collect()
}

#[tokio::test]
async fn scenario_a_full_tenant_blocks_only_growth() {
    let h = harness();
    seed(&h.store, "college-a", 10, Duration::days(30), 10).await;
    h.store
        .upsert_member(&Member::admin("college-a", "dean"))
        .await
        .unwrap();
    // dean is the eleventh active member
    h.store.remove_member("college-a", "college-a-s9").await.unwrap();

    let state = h.engine.force_check("college-a").await.unwrap();
    assert_eq!(state.status, LicenseStatus::Active);
    assert_eq!(state.reason, Reason::LimitReached);
    assert!(state.limit_reached);

    let gate = h.engine.gate();
    assert_eq!(
        gate.check_access("college-a", true).await.unwrap(),
        AccessDecision::deny(Reason::LimitReached)
    );
    assert_eq!(
        gate.check_access("college-a", false).await.unwrap(),
        AccessDecision::allow()
    );

    // Limit notices reach platform admins and the tenant's own admins only
    assert_eq!(
        events_on(&h.push, Topic::Admins),
        vec![EventType::LimitReached, EventType::StatusChanged]
    );
    assert_eq!(
        events_on(&h.push, Topic::Member("dean".into())),
        vec![EventType::LimitReached]
    );
    assert!(events_on(&h.push, Topic::Tenant("college-a".into())).is_empty());
}

#[tokio::test]
async fn scenario_b_reactivating_expired_tenant_stays_expired() {
    let h = harness();
    seed(&h.store, "college-b", 10, -Duration::days(1), 2).await;

    let state = h.engine.force_check("college-b").await.unwrap();
    assert_eq!(state.status, LicenseStatus::Expired);
    assert_eq!(state.reason, Reason::Expired);

    h.engine.disable("college-b", "root").await.unwrap();
    h.push.clear();
    h.engine.reactivate("college-b", "root").await.unwrap();

    let view = h.engine.license_status("college-b").await.unwrap();
    assert_eq!(view.status, LicenseStatus::Expired);
    assert_eq!(view.reason, Reason::Expired);
    assert_eq!(view.stored_status, LicenseStatus::Expired);

    let room = events_on(&h.push, Topic::Tenant("college-b".into()));
    assert_eq!(room, vec![EventType::Expired]);
    assert!(!events_on(&h.push, Topic::Admins).contains(&EventType::Reactivated));
}

#[tokio::test]
async fn scenario_c_first_tick_announces_once() {
    let h = harness();
    seed(&h.store, "college-c", 10, Duration::days(30), 3).await;

    h.engine.run_tick().await.unwrap();

    let all = h.push.envelopes();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].topic, Topic::Admins);
    assert_eq!(all[0].notification.event_type, EventType::StatusChanged);
    assert_eq!(all[0].notification.reason, Reason::None);
    assert_eq!(all[0].notification.payload.usage_count, 3);
}

#[tokio::test]
async fn scenario_d_disable_is_enforced_before_any_tick() {
    let h = harness();
    seed(&h.store, "college-d", 10, Duration::days(30), 1).await;

    h.engine.disable("college-d", "root").await.unwrap();

    assert_eq!(
        h.engine.gate().check_access("college-d", false).await.unwrap(),
        AccessDecision::deny(Reason::ManualSuspend)
    );
    assert_eq!(
        events_on(&h.push, Topic::Tenant("college-d".into())),
        vec![EventType::ManualDisable]
    );
}

#[tokio::test]
async fn unchanged_tenants_are_not_renotified() {
    let h = harness();
    seed(&h.store, "college-a", 10, Duration::days(30), 2).await;
    seed(&h.store, "college-b", 2, Duration::days(30), 2).await;

    h.engine.run_tick().await.unwrap();
    let after_first = h.push.len();
    let report = h.engine.run_tick().await.unwrap();

    assert_eq!(report.edges, 0);
    assert_eq!(h.push.len(), after_first);
}

#[tokio::test]
async fn tick_reconciles_every_usage_count() {
    let h = harness();
    seed(&h.store, "college-a", 10, Duration::days(30), 4).await;
    seed(&h.store, "college-b", 10, -Duration::days(3), 7).await;

    // Persisted counts drift from the registry
    for tenant in ["college-a", "college-b"] {
        h.store.set_usage_count(tenant, 99).await.unwrap();
    }
    h.engine.run_tick().await.unwrap();

    for license in h.store.list_licenses().await.unwrap() {
        let live = h.store.count_active(&license.tenant_id).await.unwrap();
        assert_eq!(license.usage_count, live, "{}", license.tenant_id);
    }
    let expired = h.store.get_license("college-b").await.unwrap().unwrap();
    assert_eq!(expired.stored_status, LicenseStatus::Expired);
}

#[tokio::test]
async fn watcher_never_clears_a_suspension() {
    let h = harness();
    seed(&h.store, "college-a", 10, Duration::days(30), 0).await;
    h.engine.disable("college-a", "root").await.unwrap();

    h.engine.run_tick().await.unwrap();
    h.engine.run_tick().await.unwrap();

    let license = h.store.get_license("college-a").await.unwrap().unwrap();
    assert_eq!(license.stored_status, LicenseStatus::Suspended);
    assert!(license.is_suspended());
}

#[tokio::test]
async fn override_survives_concurrent_scans() {
    let h = harness();
    for i in 0..8 {
        seed(&h.store, &format!("college-{}", i), 5, Duration::days(30), 3).await;
    }

    let scans = {
        let engine = Arc::clone(&h.engine);
        tokio::spawn(async move {
            for _ in 0..20 {
                engine.run_tick().await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };
    for i in 0..8 {
        h.engine
            .disable(&format!("college-{}", i), "root")
            .await
            .unwrap();
        tokio::task::yield_now().await;
    }
    scans.await.unwrap();

    for license in h.store.list_licenses().await.unwrap() {
        assert!(license.is_suspended(), "{}", license.tenant_id);
        assert_eq!(license.stored_status, LicenseStatus::Suspended);
        assert_eq!(license.usage_count, 3);
    }
}

/// Member registry that fails, stalls or crashes for chosen tenants.
struct FlakyRegistry {
    inner: Arc<MemoryStore>,
    failing: Mutex<HashSet<String>>,
    stalled: Mutex<HashSet<String>>,
    crashing: Mutex<HashSet<String>>,
}

impl FlakyRegistry {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
            stalled: Mutex::new(HashSet::new()),
            crashing: Mutex::new(HashSet::new()),
        }
    }

    fn fail(&self, tenant: &str) {
        self.failing.lock().unwrap().insert(tenant.to_string());
    }

    fn stall(&self, tenant: &str) {
        self.stalled.lock().unwrap().insert(tenant.to_string());
    }

    fn crash(&self, tenant: &str) {
        self.crashing.lock().unwrap().insert(tenant.to_string());
    }

    fn heal(&self) {
        self.failing.lock().unwrap().clear();
        self.stalled.lock().unwrap().clear();
        self.crashing.lock().unwrap().clear();
    }
}

#[async_trait]
impl MemberRegistry for FlakyRegistry {
    async fn list_members(&self, tenant_id: &str) -> Result<Vec<Member>> {
        if self.failing.lock().unwrap().contains(tenant_id) {
            return Err(Error::TransientStore(format!("registry down for {}", tenant_id)));
        }
        let crashing = self.crashing.lock().unwrap().contains(tenant_id);
        if crashing {
            panic!("registry crashed for {}", tenant_id);
        }
        let stalled = self.stalled.lock().unwrap().contains(tenant_id);
        if stalled {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        }
        self.inner.list_members(tenant_id).await
    }

    async fn upsert_member(&self, member: &Member) -> Result<()> {
        self.inner.upsert_member(member).await
    }

    async fn remove_member(&self, tenant_id: &str, member_id: &str) -> Result<bool> {
        self.inner.remove_member(tenant_id, member_id).await
    }
}

#[tokio::test]
async fn one_failing_tenant_does_not_stop_the_scan() {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(FlakyRegistry::new(store.clone()));
    let push = Arc::new(RecordingChannel::new());
    let config = EngineConfig {
        store_timeout: std::time::Duration::from_millis(50),
        ..EngineConfig::default()
    };
    let engine = LicenseEngine::new(store.clone(), registry.clone(), push.clone(), config);

    for tenant in ["college-a", "college-b", "college-c"] {
        seed(&store, tenant, 10, Duration::days(30), 1).await;
    }
    registry.fail("college-a");
    registry.stall("college-b");

    let report = engine.run_tick().await.unwrap();
    assert_eq!(report.tenants, 3);
    assert_eq!(report.failures, 2);
    assert_eq!(report.edges, 1);

    // Synchronous callers see the transient error
    assert!(matches!(
        engine.gate().check_access("college-b", false).await,
        Err(Error::TransientStore(_))
    ));

    // Recovered tenants are picked up on the next tick
    registry.heal();
    let report = engine.run_tick().await.unwrap();
    assert_eq!(report.failures, 0);
    assert_eq!(report.edges, 2);
}

#[tokio::test]
async fn one_panicking_tenant_does_not_abort_the_tick() {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(FlakyRegistry::new(store.clone()));
    let push = Arc::new(RecordingChannel::new());
    let engine = LicenseEngine::new(
        store.clone(),
        registry.clone(),
        push.clone(),
        EngineConfig::default(),
    );

    for tenant in ["college-a", "college-b", "college-c"] {
        seed(&store, tenant, 10, Duration::days(30), 1).await;
    }
    registry.crash("college-b");

    let report = engine.run_tick().await.unwrap();
    assert_eq!(report.tenants, 3);
    assert_eq!(report.failures, 1);
    assert_eq!(report.edges, 2);
    assert!(engine.cache().get("college-b").await.is_none());

    // The crashed tenant's lock was released during unwinding
    registry.heal();
    let report = engine.run_tick().await.unwrap();
    assert_eq!(report.failures, 0);
    assert_eq!(report.edges, 1);
    assert!(engine.cache().get("college-b").await.is_some());
}
