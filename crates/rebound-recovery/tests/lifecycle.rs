mod common;

use common::*;
use rebound_config::{RecoverySettings, ReboundConfig, StorageSettings};
use rebound_events::{BroadcastBus, DeletedSession, EventHandler, HostEvent, MessageInfo};
use rebound_recovery::{RecoveryHook, RecoveryPlugin, RunOutcome, ToolOutputStore};
use serde_json::json;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

fn hook(fixture: &Fixture, host: Arc<MockHost>, settings: RecoverySettings) -> RecoveryHook {
    RecoveryHook::new(orchestrator(fixture, host, settings))
}

fn session_error(error: serde_json::Value) -> HostEvent {
    HostEvent::SessionError {
        session_id: Some(SESSION.to_string()),
        error: Some(error),
    }
}

#[tokio::test]
async fn test_session_error_schedules_a_run() {
    let fixture = Fixture::new();
    let host = MockHost::new();
    host.push_assistant("anthropic", "claude-sonnet-4", false);
    let hook = hook(&fixture, host.clone(), fast_settings());

    let run = hook
        .on_event(&session_error(raw_prompt_too_long(250_000, 200_000)))
        .await
        .expect("run scheduled");

    assert_eq!(run.await.unwrap(), RunOutcome::Summarized { attempt: 1 });
    assert_eq!(host.toast_titles()[0], "Context Limit Hit");
    assert_eq!(host.summarize_count(), 1);
}

#[tokio::test]
async fn test_non_limit_errors_are_ignored() {
    let fixture = Fixture::new();
    let host = MockHost::new();
    let hook = hook(&fixture, host.clone(), fast_settings());

    let thinking = session_error(json!({
        "message": "messages.1: Expected thinking block but found text; prompt is too long"
    }));
    assert!(hook.on_event(&thinking).await.is_none());

    let overloaded = session_error(json!({"data": {"message": "Overloaded"}}));
    assert!(hook.on_event(&overloaded).await.is_none());

    let anonymous = HostEvent::SessionError {
        session_id: None,
        error: Some(raw_prompt_too_long(250_000, 200_000)),
    };
    assert!(hook.on_event(&anonymous).await.is_none());

    assert_eq!(hook.orchestrator().state().tracked_sessions(), 0);
    assert!(host.toast_titles().is_empty());
}

#[tokio::test]
async fn test_error_during_run_deduplicates_instead_of_reentering() {
    let mut fixture = Fixture::new();
    fixture.message("assistant", vec![step(), tool_call("c1", "read", json!({"path": "a.rs"}), 500)]);
    fixture.message("assistant", vec![step(), tool_call("c2", "read", json!({"path": "a.rs"}), 500)]);
    fixture.message("assistant", vec![step(), tool_call("c3", "todowrite", json!({}), 500)]);
    fixture.message("assistant", vec![step(), tool_call("c4", "todowrite", json!({}), 500)]);

    let host = MockHost::new();
    let mut settings = fast_settings();
    settings.deduplication.enabled = true;
    let hook = hook(&fixture, host.clone(), settings);
    let state = hook.orchestrator().state().clone();

    let guard = state.try_begin_run(SESSION).unwrap();
    let run = hook
        .on_event(&session_error(raw_prompt_too_long(250_000, 200_000)))
        .await;

    assert!(run.is_none());
    assert!(state.is_pending(SESSION));
    assert!(host.toast_titles().is_empty());

    let mut remaining: Vec<String> = ToolOutputStore::new(fixture.layout())
        .find_tool_results_by_size(SESSION)
        .into_iter()
        .map(|r| r.call_id)
        .collect();
    remaining.sort();
    assert_eq!(remaining, vec!["c2", "c3", "c4"]);
    drop(guard);
}

#[tokio::test]
async fn test_dedup_disabled_by_default() {
    let mut fixture = Fixture::new();
    fixture.message("assistant", vec![tool_call("c1", "read", json!({"path": "a.rs"}), 500)]);
    fixture.message("assistant", vec![tool_call("c2", "read", json!({"path": "a.rs"}), 500)]);

    let host = MockHost::new();
    let hook = hook(&fixture, host, fast_settings());
    let state = hook.orchestrator().state().clone();

    let _guard = state.try_begin_run(SESSION).unwrap();
    hook.on_event(&session_error(raw_prompt_too_long(250_000, 200_000)))
        .await;

    assert_eq!(
        ToolOutputStore::new(fixture.layout())
            .find_tool_results_by_size(SESSION)
            .len(),
        2
    );
}

#[tokio::test]
async fn test_message_updated_then_idle_runs_with_message_model() {
    let fixture = Fixture::new();
    let host = MockHost::new();
    let hook = hook(&fixture, host.clone(), fast_settings());

    let updated = HostEvent::MessageUpdated {
        info: MessageInfo {
            id: Some("msg_9".to_string()),
            session_id: SESSION.to_string(),
            role: "assistant".to_string(),
            error: Some(json!({"data": {"message": "context_length_exceeded"}})),
            provider_id: Some("openai".to_string()),
            model_id: Some("gpt-4.1".to_string()),
            summary: None,
        },
    };
    assert!(hook.on_event(&updated).await.is_none());
    assert!(hook.orchestrator().state().is_pending(SESSION));

    let run = hook
        .on_event(&HostEvent::SessionIdle {
            session_id: SESSION.to_string(),
        })
        .await
        .expect("idle with pending error starts a run");
    assert_eq!(run.await.unwrap(), RunOutcome::Summarized { attempt: 1 });

    let calls = host.summarize_calls.lock().clone();
    assert_eq!(calls[0].1.provider_id, "openai");
    assert_eq!(calls[0].1.model_id, "gpt-4.1");
}

#[tokio::test]
async fn test_user_message_errors_are_not_recorded() {
    let fixture = Fixture::new();
    let hook = hook(&fixture, MockHost::new(), fast_settings());

    hook.on_event(&HostEvent::MessageUpdated {
        info: MessageInfo {
            session_id: SESSION.to_string(),
            role: "user".to_string(),
            error: Some(json!("prompt is too long")),
            ..MessageInfo::default()
        },
    })
    .await;

    assert!(!hook.orchestrator().state().is_pending(SESSION));
}

#[tokio::test]
async fn test_idle_without_pending_error_does_nothing() {
    let fixture = Fixture::new();
    let host = MockHost::new();
    let hook = hook(&fixture, host.clone(), fast_settings());

    let idle = HostEvent::SessionIdle {
        session_id: SESSION.to_string(),
    };
    assert!(hook.on_event(&idle).await.is_none());
    assert_eq!(host.summarize_count(), 0);
}

#[tokio::test]
async fn test_idle_after_summary_clears_state() {
    let fixture = Fixture::new();
    let host = MockHost::new();
    host.push_assistant("anthropic", "claude-sonnet-4", true);
    let hook = hook(&fixture, host.clone(), fast_settings());
    let state = hook.orchestrator().state().clone();
    state.record_error(SESSION, prompt_too_long(250_000, 200_000));

    let run = hook
        .on_event(&HostEvent::SessionIdle {
            session_id: SESSION.to_string(),
        })
        .await;

    assert!(run.is_none());
    assert_eq!(state.tracked_sessions(), 0);
    assert_eq!(host.summarize_count(), 0);
}

#[tokio::test]
async fn test_deleted_and_compacted_sessions_drop_state() {
    let fixture = Fixture::new();
    let hook = hook(&fixture, MockHost::new(), fast_settings());
    let state = hook.orchestrator().state().clone();

    state.record_error(SESSION, prompt_too_long(250_000, 200_000));
    state.record_truncations(SESSION, 4, None);
    hook.on_event(&HostEvent::SessionDeleted {
        info: DeletedSession {
            id: SESSION.to_string(),
        },
    })
    .await;
    assert_eq!(state.tracked_sessions(), 0);

    state.record_error(SESSION, prompt_too_long(250_000, 200_000));
    hook.on_event(&HostEvent::SessionCompacted {
        session_id: SESSION.to_string(),
    })
    .await;
    assert_eq!(state.tracked_sessions(), 0);
}

#[tokio::test]
async fn test_disabled_recovery_ignores_events() {
    let fixture = Fixture::new();
    let host = MockHost::new();
    let mut settings = fast_settings();
    settings.enabled = false;
    let hook = hook(&fixture, host.clone(), settings);

    let run = hook
        .on_event(&session_error(raw_prompt_too_long(250_000, 200_000)))
        .await;

    assert!(run.is_none());
    assert_eq!(hook.orchestrator().state().tracked_sessions(), 0);
}

#[test]
fn test_handler_filter_covers_lifecycle_events() {
    let fixture = Fixture::new();
    let hook = hook(&fixture, MockHost::new(), fast_settings());
    let filter = hook.filter();

    assert_eq!(hook.name(), "context-window-recovery");
    assert!(filter.matches(&HostEvent::SessionIdle {
        session_id: "x".to_string()
    }));
    assert!(filter.matches(&HostEvent::SessionCompacted {
        session_id: "x".to_string()
    }));
}

#[tokio::test]
async fn test_plugin_recovers_from_bus_event() {
    let mut fixture = Fixture::new();
    fixture.message(
        "assistant",
        vec![tool_call("c1", "bash", json!({"command": "cat big.log"}), 700_000)],
    );

    let config = ReboundConfig {
        recovery: fast_settings(),
        storage: StorageSettings {
            root: Some(fixture.dir.path().to_string_lossy().into_owned()),
        },
        ..ReboundConfig::default()
    };
    let host = MockHost::new();
    let plugin = RecoveryPlugin::new(&config, host.clone());
    let bus = BroadcastBus::new();
    let runner = plugin.attach(&bus);

    assert!(bus.publish_json(&json!({
        "type": "session.error",
        "properties": {
            "sessionID": SESSION,
            "error": raw_prompt_too_long(250_000, 200_000)
        }
    })));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while host.prompt_count() == 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(host.prompt_count(), 1);
    assert_eq!(host.summarize_count(), 0);
    assert_eq!(plugin.state().tracked_sessions(), 0);
    runner.abort();
}

#[test]
fn test_plugin_load_from_config_file() {
    let fixture = Fixture::new();
    let path = fixture.dir.path().join("rebound.json");
    fs::write(
        &path,
        json!({
            "recovery": {"deduplication": {"enabled": true}},
            "storage": {"root": fixture.dir.path()},
            "telemetry": {"level": "warn"}
        })
        .to_string(),
    )
    .unwrap();

    let plugin = RecoveryPlugin::load(Some(&path), MockHost::new()).unwrap();
    assert!(plugin.hook().orchestrator().settings().deduplication.enabled);
    assert_eq!(
        plugin.hook().orchestrator().layout().root(),
        fixture.dir.path()
    );
}
