//! A disabled client never buffers and never touches the network.

use super::harness::{client, test_config, track, MockTransport};
use crate::{Completion, FlushOutcome};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn disabled_completes_inline_without_sending() {
    let transport = MockTransport::new();
    let analytics = client(test_config().with_enable(false), &transport);
    let calls = Arc::new(AtomicUsize::new(0));

    for n in 0..50 {
        let calls = calls.clone();
        analytics
            .track(
                track(n),
                Some(Completion::new(move |result| {
                    assert!(result.is_ok());
                    calls.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .unwrap();
    }

    // Completions ran before `track` returned.
    assert_eq!(calls.load(Ordering::SeqCst), 50);
    assert_eq!(analytics.buffered(), 0);
    assert_eq!(analytics.flush().await.unwrap(), FlushOutcome::Disabled);

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(transport.send_count(), 0);
}

#[tokio::test]
async fn disabled_still_validates() {
    let transport = MockTransport::new();
    let analytics = client(test_config().with_enable(false), &transport);

    assert!(analytics.track(json!({ "event": "No Identity" }), None).is_err());
    assert!(analytics.track(json!("not an object"), None).is_err());
}
