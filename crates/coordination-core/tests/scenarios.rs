//! End-to-end scenarios exercising LM, SM, and NCR together through an
//! in-memory backend and a fake clock, matching the six concrete scenarios
//! the coordination service is expected to support.

use std::sync::Arc;

use chrono::Utc;
use coordination_core::clock::FakeClock;
use coordination_core::config::Config;
use coordination_core::coordination::{
    AcquireOutcome, CheckOutcome, LockManager, ReleaseOutcome, SessionManager, StalenessTier,
};
use coordination_core::domain_types::{LockToken, SessionId, WorktreePath};
use coordination_core::kvg::{InMemoryGateway, KeyValueGateway};
use coordination_core::naming::BranchContext;

struct Harness {
    locks: Arc<LockManager>,
    sessions: SessionManager,
    clock: Arc<FakeClock>,
}

fn harness() -> Harness {
    let clock = Arc::new(FakeClock::new(Utc::now()));
    let kvg: Arc<dyn KeyValueGateway> = Arc::new(InMemoryGateway::new(clock.clone()));
    let config = Config::default();
    let locks = Arc::new(LockManager::new(
        kvg.clone(),
        clock.clone(),
        &config.lock_namespace,
        config.default_lock_timeout_secs,
        config.max_lock_timeout_secs,
    ));
    let sessions = SessionManager::new(kvg, clock.clone(), locks.clone(), &config);
    Harness {
        locks,
        sessions,
        clock,
    }
}

fn sid(s: &str) -> SessionId {
    SessionId::new(s).unwrap()
}

fn wt() -> WorktreePath {
    WorktreePath::new("/work")
}

#[tokio::test]
async fn scenario_basic_mutex() {
    let h = harness();
    let token = LockToken::new("db-migration").unwrap();

    let a = h
        .locks
        .acquire(&token, &sid("alice"), &wt(), &BranchContext::Unknown, None)
        .await
        .unwrap();
    assert!(matches!(a, AcquireOutcome::Acquired { extended: false, .. }));

    let b = h
        .locks
        .acquire(&token, &sid("bob"), &wt(), &BranchContext::Unknown, None)
        .await
        .unwrap();
    assert!(matches!(b, AcquireOutcome::Denied { .. }));
}

#[tokio::test]
async fn scenario_owner_reentry_extends() {
    let h = harness();
    let token = LockToken::new("db-migration").unwrap();
    let alice = sid("alice");

    h.locks
        .acquire(&token, &alice, &wt(), &BranchContext::Unknown, Some(60))
        .await
        .unwrap();
    h.clock.advance(chrono::Duration::seconds(30));
    let extended = h
        .locks
        .acquire(&token, &alice, &wt(), &BranchContext::Unknown, Some(60))
        .await
        .unwrap();
    assert!(matches!(extended, AcquireOutcome::Acquired { extended: true, .. }));
}

#[tokio::test]
async fn scenario_branch_auto_detect_switches_locks() {
    let h = harness();
    let token = LockToken::new("work").unwrap();
    let alice = sid("alice");

    h.locks
        .acquire(&token, &alice, &wt(), &BranchContext::Issue(1), None)
        .await
        .unwrap();
    h.locks
        .acquire(&token, &alice, &wt(), &BranchContext::Issue(2), None)
        .await
        .unwrap();

    let issue1 = h
        .locks
        .check(&LockToken::new("issue:1").unwrap(), None, &BranchContext::Unknown)
        .await
        .unwrap();
    let issue2 = h
        .locks
        .check(&LockToken::new("issue:2").unwrap(), None, &BranchContext::Unknown)
        .await
        .unwrap();
    assert!(matches!(issue1, CheckOutcome::Held { .. }));
    assert!(matches!(issue2, CheckOutcome::Held { .. }));
}

#[tokio::test]
async fn scenario_cascade_release_on_unregister() {
    let h = harness();
    let alice = sid("alice");
    h.sessions
        .register(&alice, &wt(), serde_json::Value::Null)
        .await
        .unwrap();
    h.locks
        .acquire(
            &LockToken::new("a").unwrap(),
            &alice,
            &wt(),
            &BranchContext::Unknown,
            None,
        )
        .await
        .unwrap();
    h.locks
        .acquire(
            &LockToken::new("b").unwrap(),
            &alice,
            &wt(),
            &BranchContext::Unknown,
            None,
        )
        .await
        .unwrap();

    let outcome = h.sessions.unregister(&alice).await.unwrap();
    assert_eq!(outcome.released_locks.len(), 2);

    let released = h
        .locks
        .check(&LockToken::new("a").unwrap(), None, &BranchContext::Unknown)
        .await
        .unwrap();
    assert_eq!(released, CheckOutcome::Available);
}

#[tokio::test]
async fn scenario_staleness_tier_progression() {
    let h = harness();
    let alice = sid("alice");
    h.sessions
        .register(&alice, &wt(), serde_json::Value::Null)
        .await
        .unwrap();

    let statuses = h.sessions.status().await.unwrap();
    assert_eq!(statuses[0].tier, StalenessTier::Active);

    h.clock.advance(chrono::Duration::seconds(10_000));
    let statuses = h.sessions.status().await.unwrap();
    assert_eq!(statuses[0].tier, StalenessTier::Stale);
}

#[tokio::test]
async fn scenario_pattern_listing() {
    let h = harness();
    h.locks
        .acquire(
            &LockToken::new("issue:1").unwrap(),
            &sid("alice"),
            &wt(),
            &BranchContext::Unknown,
            None,
        )
        .await
        .unwrap();
    h.locks
        .acquire(
            &LockToken::new("wave:3").unwrap(),
            &sid("bob"),
            &wt(),
            &BranchContext::Unknown,
            None,
        )
        .await
        .unwrap();

    let issues = h.locks.list("issue:*", None).await.unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].name, "issue:1");
    let all = h.locks.list("*", Some(&sid("alice"))).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().any(|e| e.is_mine));
    assert!(all.iter().any(|e| !e.is_mine));
}

#[tokio::test]
async fn release_is_terminal() {
    let h = harness();
    let token = LockToken::new("once").unwrap();
    let alice = sid("alice");
    h.locks
        .acquire(&token, &alice, &wt(), &BranchContext::Unknown, None)
        .await
        .unwrap();
    let first_release = h.locks.release(&token, &alice, &BranchContext::Unknown).await.unwrap();
    assert!(matches!(first_release, ReleaseOutcome::Released { .. }));
    let second_release = h.locks.release(&token, &alice, &BranchContext::Unknown).await.unwrap();
    assert_eq!(second_release, ReleaseOutcome::NotFound);
}
