mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{chat, config, harness, FailingSink, FakeClient, ScriptedTransport, StuckSink, FLUSH};
use domain::{hash_prompt, CallOutcome, LlmClient, SampleRate};
use interceptor::WrapBuilder;

#[tokio::test]
async fn failing_control_plane_never_reaches_the_caller() {
    let sink = Arc::new(FailingSink::default());
    let wrapped = WrapBuilder::new(Arc::new(FakeClient::default()), config())
        .telemetry_sink(sink.clone())
        .health_probe(false)
        .build()
        .unwrap();

    for _ in 0..5 {
        let response = wrapped.create_chat_completion(chat("gpt-4o")).await.unwrap();
        assert_eq!(response["id"], "chat_1");
    }
    wrapped.flush_telemetry(FLUSH).await;

    let stats = wrapped.telemetry_stats();
    assert_eq!(stats.delivered, 0);
    assert_eq!(stats.abandoned, 5);
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn stuck_control_plane_does_not_slow_calls() {
    let mut config = config();
    config.telemetry.batch_size = 1;
    let wrapped = WrapBuilder::new(Arc::new(FakeClient::default()), config)
        .telemetry_sink(Arc::new(StuckSink))
        .health_probe(false)
        .build()
        .unwrap();

    let started = Instant::now();
    for _ in 0..50 {
        wrapped.create_chat_completion(chat("gpt-4o")).await.unwrap();
    }
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!wrapped.flush_telemetry(Duration::from_millis(100)).await);
}

#[tokio::test]
async fn buffer_never_exceeds_capacity() {
    let mut config = config();
    config.telemetry.buffer_capacity = 5;
    config.telemetry.batch_size = 1000;
    let wrapped = WrapBuilder::new(Arc::new(FakeClient::default()), config)
        .telemetry_sink(Arc::new(StuckSink))
        .health_probe(false)
        .build()
        .unwrap();

    for _ in 0..50 {
        wrapped.create_chat_completion(chat("gpt-4o")).await.unwrap();
    }

    let stats = wrapped.telemetry_stats();
    assert_eq!(stats.capacity, 5);
    assert_eq!(stats.buffered, 5);
    assert_eq!(stats.dropped, 45);
}

#[tokio::test]
async fn zero_sample_rate_records_nothing() {
    let mut config = config();
    config.telemetry.sample_rate = SampleRate::NEVER;
    let h = harness(config, ScriptedTransport::unavailable());

    for _ in 0..25 {
        h.wrapped.create_chat_completion(chat("gpt-4o")).await.unwrap();
    }
    h.wrapped.flush_telemetry(FLUSH).await;

    assert!(h.sink.records().is_empty());
    assert_eq!(h.client.calls(), 25);
}

#[tokio::test]
async fn full_sample_rate_records_exactly_one_per_call() {
    let h = harness(config(), ScriptedTransport::unavailable());

    for _ in 0..25 {
        h.wrapped.create_chat_completion(chat("gpt-4o")).await.unwrap();
    }
    assert!(h.wrapped.flush_telemetry(FLUSH).await);

    let records = h.sink.records();
    assert_eq!(records.len(), 25);
    assert!(records.iter().all(|r| r.sampling_decision && r.sample_rate == 1.0));
}

#[tokio::test]
async fn disabled_telemetry_records_nothing() {
    let mut config = config();
    config.telemetry.enabled = false;
    let h = harness(config, ScriptedTransport::unavailable());

    h.wrapped.create_chat_completion(chat("gpt-4o")).await.unwrap();
    h.wrapped.flush_telemetry(FLUSH).await;

    assert!(h.sink.records().is_empty());
}

#[tokio::test]
async fn prompts_are_hashed_unless_included() {
    let h = harness(config(), ScriptedTransport::unavailable());
    h.wrapped
        .create_chat_completion(serde_json::json!({ "model": "gpt-4o", "messages": "Hello" }))
        .await
        .unwrap();

    let mut with_prompts = config();
    with_prompts.telemetry.include_prompts = true;
    h.wrapped.refresh(with_prompts).unwrap();
    h.wrapped
        .create_chat_completion(serde_json::json!({ "model": "gpt-4o", "messages": "Hello" }))
        .await
        .unwrap();

    assert!(h.wrapped.flush_telemetry(FLUSH).await);
    let records = h.sink.records();
    assert_eq!(records[0].prompt, None);
    assert_eq!(records[0].prompt_hash, Some(hash_prompt("Hello")));
    assert_eq!(records[1].prompt.as_deref(), Some("Hello"));
    assert_eq!(records[1].prompt_hash, None);
}

#[tokio::test]
async fn dropped_call_is_recorded_as_cancelled() {
    let h = harness(config(), ScriptedTransport::unavailable());

    let timed_out = tokio::time::timeout(
        Duration::from_millis(50),
        h.wrapped.create_chat_completion(chat("slow")),
    )
    .await;
    assert!(timed_out.is_err());

    assert!(h.wrapped.flush_telemetry(FLUSH).await);
    let records = h.sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, CallOutcome::Cancelled);
    assert_eq!(records[0].model, "slow");
}

#[test]
fn wrapping_outside_a_runtime_still_serves_calls() {
    let wrapped = WrapBuilder::new(Arc::new(FakeClient::default()), config())
        .health_probe(false)
        .build()
        .unwrap();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let response = wrapped.create_chat_completion(chat("gpt-4o")).await.unwrap();
        assert_eq!(response["id"], "chat_1");
        assert!(!wrapped.flush_telemetry(Duration::from_millis(50)).await);
    });

    let stats = wrapped.telemetry_stats();
    assert_eq!((stats.buffered, stats.delivered), (0, 0));
}
