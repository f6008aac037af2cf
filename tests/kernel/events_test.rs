//! Tests for `src/kernel/events.rs`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use taskhive::kernel::events::{handler_fn, EventBus, WILDCARD_TOPIC};

/// Poll `check` until it holds or two seconds pass.
async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

fn recorder() -> Arc<Mutex<Vec<Value>>> {
    Arc::new(Mutex::new(Vec::new()))
}

fn snapshot(seen: &Arc<Mutex<Vec<Value>>>) -> Vec<Value> {
    seen.lock().expect("lock").clone()
}

#[tokio::test]
async fn channel_subscriber_sees_events_in_publish_order() {
    let bus = EventBus::default();
    let (_id, mut rx) = bus.subscribe_channel("tick");

    for i in 0..100 {
        assert_eq!(bus.publish("tick", json!(i), "test"), 1);
    }
    for i in 0..100 {
        let event = rx.recv().await.expect("event");
        assert_eq!(event.payload, json!(i));
        assert_eq!(event.source, "test");
    }
}

#[tokio::test]
async fn handler_subscriber_sees_events_in_publish_order() {
    let bus = EventBus::default();
    let seen = recorder();
    let sink = Arc::clone(&seen);
    bus.subscribe(
        "tick",
        handler_fn(move |event| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().expect("lock").push(event.payload);
                Ok(())
            }
        }),
    );

    for i in 0..50 {
        bus.publish("tick", json!(i), "test");
    }

    assert!(eventually(|| snapshot(&seen).len() == 50).await);
    let expected: Vec<Value> = (0..50).map(|i| json!(i)).collect();
    assert_eq!(snapshot(&seen), expected);
}

#[tokio::test]
async fn unsubscribed_handler_receives_nothing_further() {
    let bus = EventBus::default();
    let seen = recorder();
    let sink = Arc::clone(&seen);
    let id = bus.subscribe(
        "tick",
        handler_fn(move |event| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().expect("lock").push(event.payload);
                Ok(())
            }
        }),
    );

    bus.publish("tick", json!("before"), "test");
    assert!(eventually(|| snapshot(&seen).len() == 1).await);

    assert!(bus.unsubscribe(&id));
    assert!(!bus.unsubscribe(&id));
    assert_eq!(bus.publish("tick", json!("after"), "test"), 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(snapshot(&seen), vec![json!("before")]);
}

#[tokio::test]
async fn unsubscribed_channel_is_closed() {
    let bus = EventBus::default();
    let (id, mut rx) = bus.subscribe_channel(WILDCARD_TOPIC);
    assert!(bus.unsubscribe(&id));
    assert_eq!(bus.publish("tick", Value::Null, "test"), 0);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn failing_and_panicking_handlers_do_not_affect_others() {
    let bus = EventBus::default();
    let failing_calls = recorder();
    let sink = Arc::clone(&failing_calls);

    bus.subscribe(
        "tick",
        handler_fn(move |event| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().expect("lock").push(event.payload);
                Err(anyhow::anyhow!("handler refused"))
            }
        }),
    );
    bus.subscribe(
        "tick",
        handler_fn(|event| async move {
            if event.payload.is_number() {
                panic!("handler exploded");
            }
            Ok(())
        }),
    );
    let (_id, mut rx) = bus.subscribe_channel("tick");

    assert_eq!(bus.publish("tick", json!(1), "test"), 3);
    assert_eq!(bus.publish("tick", json!(2), "test"), 3);

    assert_eq!(rx.recv().await.map(|e| e.payload), Some(json!(1)));
    assert_eq!(rx.recv().await.map(|e| e.payload), Some(json!(2)));

    // The failing handler still gets every event.
    assert!(eventually(|| snapshot(&failing_calls).len() == 2).await);
    assert_eq!(bus.subscriber_count(), 3);
}

#[tokio::test]
async fn slow_handler_is_cut_off_by_timeout() {
    let bus = EventBus::new(Duration::from_millis(50));
    let seen = recorder();
    let sink = Arc::clone(&seen);
    bus.subscribe(
        "tick",
        handler_fn(move |event| {
            let sink = Arc::clone(&sink);
            async move {
                if event.payload == json!("slow") {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                sink.lock().expect("lock").push(event.payload);
                Ok(())
            }
        }),
    );

    bus.publish("tick", json!("slow"), "test");
    bus.publish("tick", json!("fast"), "test");

    assert!(eventually(|| snapshot(&seen) == vec![json!("fast")]).await);
}

#[tokio::test]
async fn wildcard_matches_every_topic() {
    let bus = EventBus::default();
    let (_all, mut all_rx) = bus.subscribe_channel(WILDCARD_TOPIC);
    let (_one, mut one_rx) = bus.subscribe_channel("task_submitted");

    assert_eq!(bus.publish("task_submitted", Value::Null, "test"), 2);
    assert_eq!(bus.publish("worker_registered", Value::Null, "test"), 1);

    assert_eq!(all_rx.recv().await.map(|e| e.topic), Some("task_submitted".into()));
    assert_eq!(all_rx.recv().await.map(|e| e.topic), Some("worker_registered".into()));
    assert_eq!(one_rx.recv().await.map(|e| e.topic), Some("task_submitted".into()));
    assert!(one_rx.try_recv().is_err());
}

#[tokio::test]
async fn publish_without_subscribers_reaches_nobody() {
    let bus = EventBus::default();
    assert_eq!(bus.publish("nobody_listens", Value::Null, "test"), 0);
}

#[tokio::test]
async fn shutdown_drains_and_clears_subscriptions() {
    let bus = EventBus::default();
    let seen = recorder();
    let sink = Arc::clone(&seen);
    bus.subscribe(
        WILDCARD_TOPIC,
        handler_fn(move |event| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().expect("lock").push(event.payload);
                Ok(())
            }
        }),
    );
    for i in 0..10 {
        bus.publish("tick", json!(i), "test");
    }

    bus.shutdown().await;
    assert_eq!(snapshot(&seen).len(), 10);
    assert_eq!(bus.subscriber_count(), 0);
}
