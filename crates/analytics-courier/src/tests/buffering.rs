//! Buffer ceiling, flush triggers, batch cutting and ordering.

use super::harness::{client, settle, test_config, track, wait_until, MockReply, MockTransport};
use crate::{Completion, DeliveryError, FlushOutcome, FlushState};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;
use tracing_test::traced_test;

fn sent_numbers(transport: &MockTransport) -> Vec<Value> {
    transport
        .sent_field("properties")
        .into_iter()
        .map(|p| p["n"].clone())
        .collect()
}

/// Send one event and wait for the cold-start flush to deliver it.
async fn warm_up(analytics: &crate::Analytics) {
    let (completion, rx) = Completion::channel();
    analytics.track(track(9_999), Some(completion)).unwrap();
    assert_eq!(rx.await.unwrap(), Ok(()));
    settle().await;
}

#[tokio::test]
#[traced_test]
async fn overflow_drops_and_completes_with_dropped() {
    let transport = MockTransport::new();
    let analytics = client(
        test_config()
            .with_max_internal_queue_size(3)
            .with_flush_at(100),
        &transport,
    );

    let mut receivers = Vec::new();
    for n in 0..4 {
        let (completion, rx) = Completion::channel();
        analytics.track(track(n), Some(completion)).unwrap();
        receivers.push(rx);
    }

    assert_eq!(analytics.buffered(), 3);
    let mut dropped = receivers.pop().unwrap();
    assert_eq!(
        dropped.try_recv().unwrap(),
        Err(DeliveryError::Dropped {
            buffered: 3,
            capacity: 3
        })
    );
    assert!(logs_contain("Not adding event for processing"));

    for rx in receivers {
        assert_eq!(rx.await.unwrap(), Ok(()));
    }
    assert_eq!(transport.batch_sizes(), vec![3]);
    assert_eq!(sent_numbers(&transport), vec![json!(0), json!(1), json!(2)]);
}

#[tokio::test]
async fn first_event_flushes_immediately() {
    let transport = MockTransport::new();
    let analytics = client(test_config().with_flush_at(100), &transport);

    let (completion, rx) = Completion::channel();
    analytics.track(track(0), Some(completion)).unwrap();
    assert_eq!(rx.await.unwrap(), Ok(()));

    assert_eq!(transport.batch_sizes(), vec![1]);

    // Only the first event ever gets the cold-start flush.
    analytics.track(track(1), None).unwrap();
    settle().await;
    assert_eq!(transport.send_count(), 1);
    assert_eq!(analytics.buffered(), 1);
}

#[tokio::test]
async fn reaching_flush_at_sends_exactly_one_batch() {
    let transport = MockTransport::new();
    let analytics = client(test_config().with_flush_at(5), &transport);
    warm_up(&analytics).await;

    for n in 0..5 {
        analytics.track(track(n), None).unwrap();
    }
    wait_until(|| transport.send_count() == 2).await;
    settle().await;

    assert_eq!(transport.batch_sizes(), vec![1, 5]);
    assert_eq!(analytics.buffered(), 0);
}

#[tokio::test]
async fn batches_are_cut_at_flush_at_in_arrival_order() {
    let transport = MockTransport::new();
    let analytics = client(test_config().with_flush_at(3), &transport);
    warm_up(&analytics).await;

    for n in 0..7 {
        analytics.track(track(n), None).unwrap();
    }
    wait_until(|| transport.send_count() >= 3).await;
    settle().await;

    // Whatever the threshold flushes left behind goes out on demand.
    let outcome = analytics.flush().await.unwrap();
    assert!(matches!(
        outcome,
        FlushOutcome::Delivered { count: 1 } | FlushOutcome::Empty
    ));
    assert_eq!(analytics.buffered(), 0);

    let sizes = transport.batch_sizes();
    assert_eq!(sizes[..2], [1, 3]);
    assert!(sizes.iter().all(|&size| size <= 3), "{sizes:?}");

    let mut expected = vec![json!(9_999)];
    expected.extend((0..7).map(|n| json!(n)));
    assert_eq!(sent_numbers(&transport), expected);
}

#[tokio::test(start_paused = true)]
async fn interval_timer_flushes_leftovers() {
    let transport = MockTransport::new();
    let analytics = client(
        test_config()
            .with_flush_at(100)
            .with_flush_interval(Some(Duration::from_secs(10))),
        &transport,
    );
    warm_up(&analytics).await;
    assert!(!analytics.flush_timer_armed());

    analytics.track(track(0), None).unwrap();
    analytics.track(track(1), None).unwrap();
    assert!(analytics.flush_timer_armed());

    tokio::time::sleep(Duration::from_secs(9)).await;
    assert_eq!(transport.send_count(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(transport.batch_sizes(), vec![1, 2]);
    assert!(!analytics.flush_timer_armed());
}

#[tokio::test(start_paused = true)]
async fn flush_while_running_is_a_no_op() {
    let transport = MockTransport::new();
    transport.script([MockReply::DelayThenAccept(Duration::from_secs(3))]);
    let analytics = client(test_config().with_flush_at(100), &transport);

    let (completion, rx) = Completion::channel();
    analytics.track(track(0), Some(completion)).unwrap();
    analytics.track(track(1), None).unwrap();
    settle().await;

    assert_eq!(analytics.flush_state(), FlushState::Running);
    assert_eq!(analytics.flush().await.unwrap(), FlushOutcome::InProgress);

    assert_eq!(rx.await.unwrap(), Ok(()));
    settle().await;
    assert_eq!(analytics.flush_state(), FlushState::Idle);
    assert_eq!(transport.batch_sizes(), vec![2]);
}

#[tokio::test]
async fn message_ids_unique_across_identical_events() {
    let transport = MockTransport::new();
    let analytics = client(test_config().with_flush_at(500), &transport);

    for _ in 0..10_000 {
        analytics
            .track(json!({ "userId": "same", "event": "Same" }), None)
            .unwrap();
    }
    wait_until(|| transport.sent_field("messageId").len() == 10_000).await;

    let ids: HashSet<String> = transport
        .sent_field("messageId")
        .into_iter()
        .map(|id| id.as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids.len(), 10_000);
}

#[tokio::test]
async fn events_are_normalized_before_sending() {
    let transport = MockTransport::new();
    let analytics = client(test_config(), &transport);

    let (completion, rx) = Completion::channel();
    analytics
        .identify(
            json!({ "userId": 42, "traits": { "plan": "pro" } }),
            Some(completion),
        )
        .unwrap();
    assert_eq!(rx.await.unwrap(), Ok(()));

    let request = &transport.requests()[0];
    let event = &request.body.batch[0];
    assert_eq!(event["type"], "identify");
    assert_eq!(event["userId"], "42");
    assert_eq!(event["context"]["traits"]["plan"], "pro");
    assert_eq!(event["context"]["library"]["name"], "analytics-courier");
    assert!(event["messageId"].as_str().unwrap().starts_with("analytics-courier-"));
    assert!(event["originalTimestamp"].is_string());
    assert!(event["sentAt"].is_string());
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn threshold_during_running_cycle_defers_to_it() {
    let transport = MockTransport::new();
    transport.script([MockReply::DelayThenAccept(Duration::from_secs(3))]);
    let analytics = client(test_config().with_flush_at(2), &transport);

    analytics.track(track(0), None).unwrap();
    settle().await;
    assert_eq!(analytics.flush_state(), FlushState::Running);

    for n in 1..=4 {
        analytics.track(track(n), None).unwrap();
    }
    assert!(logs_contain("Flush in progress, leaving events to the running cycle"));

    wait_until(|| transport.send_count() == 3).await;
    settle().await;
    assert_eq!(transport.batch_sizes(), vec![1, 2, 2]);
    assert_eq!(
        sent_numbers(&transport),
        vec![json!(0), json!(1), json!(2), json!(3), json!(4)]
    );
    assert_eq!(analytics.buffered(), 0);
}

#[tokio::test]
async fn flush_reports_cancelled_when_runtime_shuts_down() {
    let transport = MockTransport::new();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let analytics = {
        let _entered = runtime.enter();
        client(test_config().with_flush_at(100), &transport)
    };

    let (completion, rx) = Completion::channel();
    analytics.track(track(0), Some(completion)).unwrap();
    assert_eq!(rx.await.unwrap(), Ok(()));
    wait_until(|| analytics.flush_state() == FlushState::Idle).await;

    transport.script([MockReply::DelayThenAccept(Duration::from_secs(60))]);
    analytics.track(track(1), None).unwrap();
    let flush = tokio::spawn({
        let analytics = analytics.clone();
        async move { analytics.flush().await }
    });
    wait_until(|| transport.send_count() == 2).await;

    runtime.shutdown_background();
    assert_eq!(flush.await.unwrap(), Ok(FlushOutcome::Cancelled));
}
