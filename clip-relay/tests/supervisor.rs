mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;

use clip_relay::Error;
use clip_relay::config::{SessionRetryConfig, SupervisorConfig, load_tenants_file};
use clip_relay::domain::{Tenant, TenantStatus};
use clip_relay::scheduler::{Collaborators, Supervisor, SupervisorEvent, SupervisorHandle};

use common::{FakeMedia, FakeSessions, FakeSource, FakeSurfaces, ScriptedProvider, fake_stages, item};

struct Harness {
    supervisor: SupervisorHandle,
    source: Arc<FakeSource>,
    sessions: Arc<FakeSessions>,
    surfaces: Arc<FakeSurfaces>,
    token: CancellationToken,
    _dir: tempfile::TempDir,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn test_config() -> SupervisorConfig {
    SupervisorConfig {
        session_retry: SessionRetryConfig {
            max_attempts: 3,
            delay_ms: 10,
        },
        shutdown_timeout_ms: 2_000,
        heartbeat_interval_ms: 20,
        start_all_delay_ms: 10,
        ..SupervisorConfig::default()
    }
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::default());
    let sessions = Arc::new(FakeSessions::default());
    let surfaces = Arc::new(FakeSurfaces::default());
    let collaborators = Collaborators {
        source: source.clone(),
        sessions: sessions.clone(),
        surfaces: surfaces.clone(),
        stages: fake_stages(
            dir.path(),
            Arc::new(ScriptedProvider::default()),
            Arc::new(FakeMedia::with_duration(90.0)),
        ),
    };
    let token = CancellationToken::new();
    let supervisor = Supervisor::spawn(
        test_config(),
        Duration::from_millis(20),
        collaborators,
        token.clone(),
    );
    Harness {
        supervisor,
        source,
        sessions,
        surfaces,
        token,
        _dir: dir,
    }
}

async fn status_of(supervisor: &SupervisorHandle, id: &str) -> TenantStatus {
    supervisor
        .list_tenants()
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.id == id)
        .map(|t| t.status)
        .unwrap()
}

async fn wait_for_status(supervisor: &SupervisorHandle, id: &str, status: TenantStatus) {
    for _ in 0..200 {
        if status_of(supervisor, id).await == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("tenant {id} never reached {status}");
}

fn tenants(ids: &[&str]) -> Vec<Tenant> {
    ids.iter()
        .map(|id| Tenant::new(*id, format!("AIzaSy-key-{id}"), ["UC1"]))
        .collect()
}

#[tokio::test]
async fn test_duplicate_start_is_rejected() {
    let h = harness();
    h.supervisor.load_tenants(tenants(&["p1"])).await.unwrap();

    h.supervisor.start("p1").await.unwrap();
    assert_eq!(status_of(&h.supervisor, "p1").await, TenantStatus::Running);

    let err = h.supervisor.start("p1").await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRunning(ref id) if id == "p1"));
    assert_eq!(h.sessions.calls.load(Ordering::SeqCst), 1);

    h.supervisor.stop("p1").await.unwrap();
    assert_eq!(status_of(&h.supervisor, "p1").await, TenantStatus::Stopped);

    // A stopped tenant can be started again.
    h.supervisor.start("p1").await.unwrap();
    assert_eq!(status_of(&h.supervisor, "p1").await, TenantStatus::Running);
}

#[tokio::test]
async fn test_stop_unknown_or_idle_tenant_is_not_found() {
    let h = harness();
    h.supervisor.load_tenants(tenants(&["p1", "p2"])).await.unwrap();
    h.supervisor.start("p2").await.unwrap();
    let before: Vec<_> = h
        .supervisor
        .list_tenants()
        .await
        .unwrap()
        .into_iter()
        .map(|t| (t.id, t.status))
        .collect();

    assert!(matches!(
        h.supervisor.stop("ghost").await,
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        h.supervisor.stop("p1").await,
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        h.supervisor.start("ghost").await,
        Err(Error::NotFound { .. })
    ));

    let after: Vec<_> = h
        .supervisor
        .list_tenants()
        .await
        .unwrap()
        .into_iter()
        .map(|t| (t.id, t.status))
        .collect();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_session_failure_leaves_tenant_stopped() {
    let h = harness();
    h.supervisor.load_tenants(tenants(&["flaky1"])).await.unwrap();

    let err = h.supervisor.start("flaky1").await.unwrap_err();
    match err {
        Error::Session {
            tenant_id, attempts, ..
        } => {
            assert_eq!(tenant_id, "flaky1");
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.sessions.calls.load(Ordering::SeqCst), 3);
    assert_eq!(status_of(&h.supervisor, "flaky1").await, TenantStatus::Stopped);

    let snapshot = h.supervisor.list_tenants().await.unwrap().remove(0);
    assert!(snapshot.started_at.is_none());
    assert!(snapshot.session_endpoint.is_none());

    let logs = h.supervisor.get_logs("flaky1").await.unwrap();
    assert!(logs.iter().any(|l| l.message.contains("Could not open remote session")));
}

#[tokio::test]
async fn test_panicking_unit_is_isolated() {
    let h = harness();
    h.supervisor
        .load_tenants(tenants(&["healthy", "panicky"]))
        .await
        .unwrap();

    h.supervisor.start("healthy").await.unwrap();
    h.supervisor.start("panicky").await.unwrap();

    wait_for_status(&h.supervisor, "panicky", TenantStatus::Error).await;
    assert_eq!(status_of(&h.supervisor, "healthy").await, TenantStatus::Running);

    let logs = h.supervisor.get_logs("panicky").await.unwrap();
    assert!(logs.iter().any(|l| l.message.contains("surface crashed")));

    // An errored tenant is not running, so stopping it is not found.
    assert!(matches!(
        h.supervisor.stop("panicky").await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_tenant_without_sources_ends_in_error() {
    let h = harness();
    h.supervisor
        .load_tenants(vec![Tenant::new("nosrc", "key", Vec::<String>::new())])
        .await
        .unwrap();

    h.supervisor.start("nosrc").await.unwrap();
    wait_for_status(&h.supervisor, "nosrc", TenantStatus::Error).await;

    let logs = h.supervisor.get_logs("nosrc").await.unwrap();
    assert!(logs.iter().any(|l| l.message.contains("no sources")));
}

#[tokio::test]
async fn test_published_item_updates_stats_and_events() {
    let h = harness();
    let mut events = h.supervisor.subscribe();
    h.supervisor.load_tenants(tenants(&["p1"])).await.unwrap();
    h.source
        .set("UC1", vec![item("fresh", Utc::now() + ChronoDuration::hours(1))]);

    h.supervisor.start("p1").await.unwrap();

    let mut stats = None;
    for _ in 0..300 {
        let current = h.supervisor.get_stats("p1").await.unwrap();
        if current.total_count == 1 {
            stats = Some(current);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let stats = stats.expect("item was never published");
    assert_eq!(stats.failed_count, 0);
    assert_eq!(stats.completed_today, 1);
    assert_eq!(stats.sample_count(), 1);
    assert!(stats.last_completed_at.is_some());

    let snapshot = h.supervisor.list_tenants().await.unwrap().remove(0);
    assert_eq!(snapshot.items_discovered, 1);
    assert!(snapshot.last_heartbeat.is_some());
    assert!(!snapshot.masked_credential.contains("key-p1"));
    assert_eq!(h.surfaces.surface.injected.lock().len(), 1);

    let aggregate = h.supervisor.aggregate_stats().await.unwrap();
    assert_eq!(aggregate.total_tenants, 1);
    assert_eq!(aggregate.running_count, 1);
    assert_eq!(aggregate.total_count, 1);
    assert_eq!(
        aggregate.global_average_duration_secs,
        stats.average_duration_secs
    );

    let mut saw_running = false;
    let mut saw_stats = false;
    while let Ok(event) = events.try_recv() {
        match event {
            SupervisorEvent::Lifecycle { tenant_id, status, .. } => {
                assert_eq!(tenant_id, "p1");
                saw_running |= status == TenantStatus::Running;
            }
            SupervisorEvent::StatsSnapshot { stats, .. } => saw_stats |= stats.total_count == 1,
            SupervisorEvent::LogLine { .. } => {}
        }
    }
    assert!(saw_running);
    assert!(saw_stats);
}

#[tokio::test]
async fn test_start_all_and_stop_all() {
    let h = harness();
    h.supervisor
        .load_tenants(tenants(&["p1", "flaky2", "p3"]))
        .await
        .unwrap();

    let results = h.supervisor.start_all().await.unwrap();
    let summary: Vec<_> = results
        .iter()
        .map(|r| (r.tenant_id.as_str(), r.started))
        .collect();
    assert_eq!(summary, vec![("p1", true), ("flaky2", false), ("p3", true)]);
    assert!(results[1].error.is_some());

    // Already running tenants are skipped.
    let again = h.supervisor.start_all().await.unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].tenant_id, "flaky2");

    assert_eq!(h.supervisor.stop_all().await.unwrap(), 2);
    for id in ["p1", "flaky2", "p3"] {
        assert_eq!(status_of(&h.supervisor, id).await, TenantStatus::Stopped);
    }
}

#[tokio::test]
async fn test_reload_keeps_active_tenants_until_stopped() {
    let h = harness();
    h.supervisor
        .load_tenants(tenants(&["p1", "p2"]))
        .await
        .unwrap();
    h.supervisor.start("p1").await.unwrap();

    let report = h.supervisor.load_tenants(tenants(&["p2", "p3"])).await.unwrap();
    assert_eq!(report.loaded, 2);
    assert_eq!(report.retired, vec!["p1".to_string()]);

    let listed = h.supervisor.list_tenants().await.unwrap();
    let ids: Vec<_> = listed.iter().map(|t| (t.id.as_str(), t.configured)).collect();
    assert_eq!(ids, vec![("p2", true), ("p3", true), ("p1", false)]);

    h.supervisor.stop("p1").await.unwrap();
    let ids: Vec<_> = h
        .supervisor
        .list_tenants()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ids, vec!["p2", "p3"]);
}

#[tokio::test]
async fn test_duplicate_tenant_ids_keep_first_entry() {
    let h = harness();
    let mut list = tenants(&["p1", "p2"]);
    list.push(Tenant::new("p1", "AIzaSy-key-other", ["UC9"]));

    let report = h.supervisor.load_tenants(list).await.unwrap();
    assert_eq!(report.loaded, 2);
    assert_eq!(report.duplicates, vec!["p1".to_string()]);

    let listed = h.supervisor.list_tenants().await.unwrap();
    let ids: Vec<_> = listed.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "p2"]);
    assert_eq!(listed[0].sources, vec!["UC1".to_string()]);
}

#[tokio::test]
async fn test_open_session_leaves_tenant_stopped() {
    let h = harness();
    h.supervisor
        .load_tenants(tenants(&["p1", "flaky2"]))
        .await
        .unwrap();

    let endpoint = h.supervisor.open_session("p1").await.unwrap();
    assert!(endpoint.ends_with("/p1"));
    assert_eq!(h.sessions.calls.load(Ordering::SeqCst), 1);
    assert_eq!(status_of(&h.supervisor, "p1").await, TenantStatus::Stopped);
    let logs = h.supervisor.get_logs("p1").await.unwrap();
    assert!(logs.iter().any(|l| l.message.contains("Opening remote session")));

    let err = h.supervisor.open_session("flaky2").await.unwrap_err();
    assert!(matches!(err, Error::Session { attempts: 3, .. }));
    assert_eq!(status_of(&h.supervisor, "flaky2").await, TenantStatus::Stopped);

    let err = h.supervisor.open_session("ghost").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn test_open_sessions_reports_each_tenant() {
    let h = harness();
    h.supervisor
        .load_tenants(tenants(&["p1", "flaky2", "p3"]))
        .await
        .unwrap();

    let ids = ["p1", "flaky2", "ghost", "p3"].map(String::from);
    let results = h.supervisor.open_sessions(&ids).await;
    let summary: Vec<_> = results
        .iter()
        .map(|r| (r.tenant_id.as_str(), r.endpoint.is_some()))
        .collect();
    assert_eq!(
        summary,
        vec![("p1", true), ("flaky2", false), ("ghost", false), ("p3", true)]
    );
    assert!(results[1].error.is_some());
    assert!(results[2].error.is_some());

    let listed = h.supervisor.list_tenants().await.unwrap();
    assert!(listed.iter().all(|t| t.status == TenantStatus::Stopped));
}

#[tokio::test]
async fn test_reload_from_chosen_file() {
    let h = harness();
    h.supervisor.load_tenants(tenants(&["p1"])).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("other-profiles.txt");
    tokio::fs::write(&path, "q1|key-q1|UC1\nbroken line\nq2|key-q2|UC2,UC3\n")
        .await
        .unwrap();

    let file = load_tenants_file(&path).await.unwrap();
    let report = h.supervisor.load_tenant_file(file).await.unwrap();
    assert_eq!(report.loaded, 2);
    assert_eq!(report.skipped_lines, 1);

    let ids: Vec<_> = h
        .supervisor
        .list_tenants()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ids, vec!["q1", "q2"]);
}
