mod common;

use std::sync::Arc;

use common::{chat, config, direct_harness, FakeClient, FixedPolicy, ScriptedTransport, FLUSH};
use domain::{ConfigError, LlmClient, PolicyFlags, SkewError};
use interceptor::{wrap_with_resolver, ConfigResolver, MapSettings, WrapBuilder, WrapOptions};
use serde_json::json;

#[tokio::test]
async fn unwrap_returns_the_original_client() {
    let h = direct_harness();

    let original = h.wrapped.unwrap();
    assert!(Arc::ptr_eq(&original, &h.client));

    original.create_chat_completion(chat("gpt-4o")).await.unwrap();
    h.wrapped.flush_telemetry(FLUSH).await;

    assert!(h.sink.records().is_empty());
    assert_eq!(h.client.calls(), 1);
}

#[tokio::test]
async fn paused_calls_produce_no_records() {
    let h = direct_harness();

    h.wrapped.pause_telemetry();
    h.wrapped.pause_telemetry();
    for _ in 0..3 {
        h.wrapped.create_chat_completion(chat("gpt-4o")).await.unwrap();
    }
    assert!(h.wrapped.telemetry_stats().paused);

    h.wrapped.resume_telemetry();
    h.wrapped.resume_telemetry();
    h.wrapped.create_chat_completion(chat("gpt-4o")).await.unwrap();

    assert!(h.wrapped.flush_telemetry(FLUSH).await);
    assert_eq!(h.sink.records().len(), 1);
    assert!(!h.wrapped.telemetry_stats().paused);
}

#[tokio::test]
async fn pause_discards_pending_records() {
    let h = direct_harness();

    h.wrapped.create_chat_completion(chat("gpt-4o")).await.unwrap();
    assert_eq!(h.wrapped.telemetry_stats().buffered, 1);

    h.wrapped.pause_telemetry();
    assert_eq!(h.wrapped.telemetry_stats().buffered, 0);

    h.wrapped.resume_telemetry();
    h.wrapped.flush_telemetry(FLUSH).await;
    assert!(h.sink.records().is_empty());
}

#[tokio::test]
async fn refresh_swaps_the_whole_snapshot() {
    let h = direct_harness();
    assert!(!h.wrapped.is_proxy_active());

    let mut next = config();
    next.proxy.enabled = true;
    h.wrapped.refresh(next).unwrap();
    assert!(h.wrapped.is_proxy_active());

    let mut invalid = config();
    invalid.proxy.base_url = "ftp://nope".into();
    assert!(h.wrapped.refresh(invalid).is_err());
    assert!(h.wrapped.is_proxy_active());
}

#[tokio::test]
async fn refresh_policy_overlays_flags() {
    let h = direct_harness();

    h.wrapped
        .refresh_policy(&PolicyFlags {
            include_prompts: Some(true),
            sample_rate: Some(0.5),
            ..PolicyFlags::default()
        })
        .unwrap();

    let config = h.wrapped.config();
    assert!(config.telemetry.include_prompts);
    assert_eq!(config.telemetry.sample_rate.as_f64(), 0.5);

    let err = h
        .wrapped
        .refresh_policy(&PolicyFlags {
            sample_rate: Some(3.0),
            ..PolicyFlags::default()
        })
        .unwrap_err();
    assert!(matches!(
        err,
        SkewError::Configuration {
            source: ConfigError::InvalidSampleRate { .. }
        }
    ));
    assert_eq!(h.wrapped.config().telemetry.sample_rate.as_f64(), 0.5);
}

#[tokio::test]
async fn sync_policy_applies_fetched_flags_and_absorbs_failures() {
    let client = Arc::new(FakeClient::default());
    let reachable = WrapBuilder::new(Arc::clone(&client), config())
        .proxy_transport(Arc::new(ScriptedTransport::unavailable()))
        .policy_source(Arc::new(FixedPolicy(Some(PolicyFlags {
            proxy_enabled: Some(true),
            ..PolicyFlags::default()
        }))))
        .health_probe(false)
        .build()
        .unwrap();
    assert!(reachable.sync_policy().await);
    assert!(reachable.is_proxy_active());

    let unreachable = WrapBuilder::new(client, config())
        .policy_source(Arc::new(FixedPolicy(None)))
        .health_probe(false)
        .build()
        .unwrap();
    let before = unreachable.config();
    assert!(!unreachable.sync_policy().await);
    assert_eq!(*unreachable.config(), *before);
}

#[tokio::test]
async fn missing_api_key_fails_wrapping() {
    let resolver = ConfigResolver::new(MapSettings::new());

    let err = wrap_with_resolver(FakeClient::default(), WrapOptions::new(), &resolver).unwrap_err();

    assert!(matches!(
        err,
        SkewError::Configuration {
            source: ConfigError::MissingCredential { .. }
        }
    ));
}

#[tokio::test]
async fn settings_source_feeds_the_snapshot() {
    let resolver = ConfigResolver::new(
        MapSettings::new()
            .with("SKEW_API_KEY", "sk_from_env")
            .with("SKEW_PROXY_ENABLED", "true")
            .with("SKEW_SAMPLE_RATE", "0.25"),
    );

    let wrapped = wrap_with_resolver(
        FakeClient::default(),
        WrapOptions::new().with_proxy_enabled(false),
        &resolver,
    )
    .unwrap();

    let config = wrapped.config();
    assert_eq!(config.api_key.expose(), "sk_from_env");
    assert!(!config.proxy.enabled);
    assert_eq!(config.telemetry.sample_rate.as_f64(), 0.25);
    wrapped.shutdown(FLUSH).await;
}

#[tokio::test]
async fn shutdown_flushes_and_calls_keep_working() {
    let h = direct_harness();

    h.wrapped.create_chat_completion(chat("gpt-4o")).await.unwrap();
    assert!(h.wrapped.shutdown(FLUSH).await);
    assert_eq!(h.sink.records().len(), 1);

    let response = h.wrapped.create_chat_completion(chat("gpt-4o")).await.unwrap();
    assert_eq!(response["model"], json!("gpt-4o"));
    assert!(!h.wrapped.flush_telemetry(FLUSH).await);
}

#[tokio::test]
async fn calls_after_shutdown_are_not_buffered() {
    let h = direct_harness();
    assert!(h.wrapped.shutdown(FLUSH).await);

    for _ in 0..3 {
        h.wrapped.create_chat_completion(chat("gpt-4o")).await.unwrap();
    }

    let stats = h.wrapped.telemetry_stats();
    assert_eq!((stats.buffered, stats.dropped), (0, 0));
    assert_eq!(h.client.calls(), 3);
    assert!(h.sink.records().is_empty());
}
