//! One-shot sweeps through the assembled service, as run by `--once`

mod fixtures;

use appointment_sweeper::config::AppConfig;
use appointment_sweeper::service::AppState;
use appointment_sweeper::types::CancellationRecord;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use fixtures::{details_for, RecordingDispatcher, ScriptedStore};

fn app(store: Arc<ScriptedStore>, dispatcher: Arc<RecordingDispatcher>) -> AppState {
    AppState::with_components(AppConfig::default(), store, dispatcher, None).unwrap()
}

#[tokio::test]
async fn test_single_sweep_success_prints_records_and_exits_zero() {
    let appointment_id = Uuid::new_v4();
    let store = Arc::new(
        ScriptedStore::returning(vec![CancellationRecord::new(appointment_id)])
            .with_details(details_for(appointment_id, Some("jamie@example.com"))),
    );
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let app = app(store.clone(), dispatcher.clone());

    let response = app.run_once().await;

    assert!(response.is_success());
    assert_eq!(response.exit_code(), 0);

    let printed = serde_json::to_string_pretty(&response).unwrap();
    let body: Value = serde_json::from_str(&printed).unwrap();
    assert_eq!(
        body,
        json!({
            "success": true,
            "cancelled_count": 1,
            "cancelled_appointments": [{ "cancelled_appointment_id": appointment_id }]
        })
    );

    assert_eq!(store.cancel_calls(), 1);
    assert_eq!(dispatcher.dispatched().len(), 1);

    let last = app.status().last_sweep().await.unwrap();
    assert!(last.succeeded);
    assert_eq!(last.cancelled, 1);
}

#[tokio::test]
async fn test_single_sweep_failure_prints_error_and_exits_one() {
    let store = Arc::new(ScriptedStore::failing("permission denied for function"));
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let app = app(store, dispatcher.clone());

    let response = app.run_once().await;

    assert!(!response.is_success());
    assert_eq!(response.exit_code(), 1);

    let body = serde_json::to_value(&response).unwrap();
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("permission denied for function"));
    assert!(body.get("success").is_none());

    assert_eq!(dispatcher.attempts(), 0);

    let last = app.status().last_sweep().await.unwrap();
    assert!(!last.succeeded);
}

#[tokio::test]
async fn test_single_sweep_with_nothing_expired() {
    let app = app(
        Arc::new(ScriptedStore::returning(Vec::new())),
        Arc::new(RecordingDispatcher::new()),
    );

    let response = app.run_once().await;

    assert_eq!(response.exit_code(), 0);
    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({ "success": true, "cancelled_count": 0, "cancelled_appointments": [] })
    );
}
