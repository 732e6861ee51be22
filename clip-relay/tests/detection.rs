mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::mpsc;

use clip_relay::domain::Tenant;
use clip_relay::monitor::{DetectionLoop, MonitorState};
use clip_relay::pipeline::job_queue;
use clip_relay::scheduler::{EventSink, LogLevel, UnitEvent};

use common::{FakeSource, item};

#[tokio::test]
async fn test_only_items_after_cutoff_are_enqueued_once() {
    let cutoff = Utc::now();
    let source = Arc::new(FakeSource::default());
    // Newest first, like the source API.
    source.set(
        "UC1",
        vec![
            item("new2", cutoff + ChronoDuration::minutes(2)),
            item("new1", cutoff + ChronoDuration::minutes(1)),
            item("old1", cutoff - ChronoDuration::minutes(1)),
            item("old2", cutoff - ChronoDuration::hours(1)),
            item("old3", cutoff - ChronoDuration::days(1)),
        ],
    );

    let tenant = Arc::new(Tenant::new("p1", "key", ["UC1"]));
    let (jobs_tx, mut jobs_rx) = job_queue();
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let mut detection = DetectionLoop::new(
        tenant,
        source.clone(),
        MonitorState::new(cutoff),
        Duration::from_secs(1),
        jobs_tx,
        EventSink::new("p1", 1, events_tx),
    );

    assert_eq!(detection.run_cycle().await, 2);
    assert_eq!(jobs_rx.depth(), 2);
    assert_eq!(jobs_rx.recv().await.unwrap().item_id, "new2");
    assert_eq!(jobs_rx.recv().await.unwrap().item_id, "new1");

    // Unchanged listing.
    assert_eq!(detection.run_cycle().await, 0);

    source.set(
        "UC1",
        vec![
            item("new3", cutoff + ChronoDuration::minutes(3)),
            item("new2", cutoff + ChronoDuration::minutes(2)),
            item("new1", cutoff + ChronoDuration::minutes(1)),
        ],
    );
    assert_eq!(detection.run_cycle().await, 1);
    let job = jobs_rx.recv().await.unwrap();
    assert_eq!(job.item_id, "new3");
    assert_eq!(job.source_id, "UC1");
    assert_eq!(job.locator, "https://www.youtube.com/watch?v=new3");
    assert_eq!(detection.state().seen_count(), 3);
}

#[tokio::test]
async fn test_failed_source_does_not_block_others() {
    let cutoff = Utc::now();
    let source = Arc::new(FakeSource::default());
    source.fail("UC_BAD", "quota exceeded");
    source.set("UC_GOOD", vec![item("a", cutoff + ChronoDuration::seconds(5))]);

    let tenant = Arc::new(Tenant::new("p1", "key", ["UC_BAD", "UC_GOOD"]));
    let (jobs_tx, mut jobs_rx) = job_queue();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut detection = DetectionLoop::new(
        tenant,
        source,
        MonitorState::new(cutoff),
        Duration::from_secs(1),
        jobs_tx,
        EventSink::new("p1", 1, events_tx),
    );

    assert_eq!(detection.run_cycle().await, 1);
    assert_eq!(jobs_rx.recv().await.unwrap().item_id, "a");

    let mut saw_warning = false;
    let mut saw_discovery = false;
    while let Ok(envelope) = events_rx.try_recv() {
        match envelope.event {
            UnitEvent::Log {
                level: LogLevel::Warn,
                message,
                ..
            } => {
                assert!(message.contains("UC_BAD"));
                assert!(message.contains("quota exceeded"));
                saw_warning = true;
            }
            UnitEvent::ItemDiscovered { item_id, source_id, .. } => {
                assert_eq!(item_id, "a");
                assert_eq!(source_id, "UC_GOOD");
                saw_discovery = true;
            }
            _ => {}
        }
    }
    assert!(saw_warning);
    assert!(saw_discovery);
}

#[tokio::test(start_paused = true)]
async fn test_loop_paces_cycles_and_stops_on_cancel() {
    let cutoff = Utc::now();
    let source = Arc::new(FakeSource::default());
    let tenant = Arc::new(Tenant::new("p1", "key", ["UC1"]));
    let (jobs_tx, mut jobs_rx) = job_queue();
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let detection = DetectionLoop::new(
        tenant,
        source.clone(),
        MonitorState::new(cutoff),
        Duration::from_millis(1000),
        jobs_tx,
        EventSink::new("p1", 1, events_tx),
    );

    let token = tokio_util::sync::CancellationToken::new();
    let handle = tokio::spawn(detection.run(token.clone()));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    source.set("UC1", vec![item("late", cutoff + ChronoDuration::seconds(1))]);

    // Picked up by the next paced cycle.
    let job = tokio::time::timeout(Duration::from_secs(2), jobs_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.item_id, "late");

    token.cancel();
    handle.await.unwrap();
}
