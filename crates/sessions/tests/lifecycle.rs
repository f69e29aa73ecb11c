use std::sync::Arc;

use chrono::Duration;
use serde_json::json;

use ideaflow_domain::config::SessionsConfig;
use ideaflow_sessions::{
    ManualClock, SessionError, SessionStore, SessionUpdate, TransitionTable, WorkflowState,
};

fn config(dir: &std::path::Path) -> SessionsConfig {
    SessionsConfig {
        state_path: dir.join("state"),
        ..Default::default()
    }
}

fn open(cfg: &SessionsConfig, clock: &Arc<ManualClock>) -> SessionStore {
    SessionStore::open_with(cfg, TransitionTable::standard(), clock.clone()).unwrap()
}

#[test]
fn workflow_survives_restarts_at_every_phase() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let clock = Arc::new(ManualClock::default());

    let id = open(&cfg, &clock).create_session("a habit tracker").unwrap().id;

    let steps = [
        (WorkflowState::Refining, "answers", json!({"audience": "students"})),
        (WorkflowState::DocumentReview, "generatedDocuments", json!({"prd": "# PRD"})),
        (WorkflowState::FinalApproval, "approvalStatus", json!("approved")),
        (WorkflowState::Development, "developmentPlan", json!({"phases": 3})),
    ];

    for (to, field, payload) in steps {
        clock.advance(Duration::minutes(1));
        let store = open(&cfg, &clock);
        let update = match field {
            "answers" => SessionUpdate::transition(to).with_answers(payload),
            "generatedDocuments" => SessionUpdate::transition(to).with_generated_documents(payload),
            "approvalStatus" => SessionUpdate::transition(to).with_approval_status(payload),
            _ => SessionUpdate::transition(to).with_development_plan(payload),
        };
        let record = store.update_session(&id, update).unwrap();
        assert_eq!(record.state, to);
    }

    let store = open(&cfg, &clock);
    let record = store.get_session(&id).unwrap();
    assert_eq!(record.state, WorkflowState::Development);
    assert_eq!(record.user_idea, "a habit tracker");
    assert_eq!(record.answers, Some(json!({"audience": "students"})));
    assert_eq!(record.generated_documents, Some(json!({"prd": "# PRD"})));
    assert_eq!(record.approval_status, Some(json!("approved")));
    assert_eq!(record.development_plan, Some(json!({"phases": 3})));
    assert!(store.transitions().is_terminal(record.state));
}

#[test]
fn session_expired_while_down_is_gone_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let clock = Arc::new(ManualClock::default());

    let id = open(&cfg, &clock).create_session("forgotten").unwrap().id;
    clock.advance(Duration::minutes(cfg.timeout_minutes as i64 + 1));

    let store = open(&cfg, &clock);
    assert_eq!(store.load_report().loaded, 1);
    assert_eq!(store.sweep_expired(), 1);
    assert!(matches!(
        store.get_session(&id),
        Err(SessionError::NotFound { .. })
    ));

    let reopened = open(&cfg, &clock);
    assert!(reopened.is_empty());
}

#[test]
fn hand_edited_file_keeps_valid_records() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    std::fs::create_dir_all(&cfg.state_path).unwrap();

    let now = chrono::Utc::now().to_rfc3339();
    let raw = json!([
        {
            "id": "sess_kept",
            "state": "final_approval",
            "userIdea": "kept",
            "createdAt": now,
            "lastActivity": now,
            "owner": "ops"
        },
        {
            "id": "sess_bad_state",
            "state": "shipping",
            "createdAt": now,
            "lastActivity": now
        },
        "not even an object"
    ]);
    std::fs::write(cfg.sessions_file(), serde_json::to_vec(&raw).unwrap()).unwrap();

    let clock = Arc::new(ManualClock::default());
    let store = open(&cfg, &clock);
    let report = store.load_report();
    assert_eq!((report.loaded, report.dropped), (1, 2));
    assert!(!report.corrupt);

    let record = store
        .update_session("sess_kept", SessionUpdate::transition(WorkflowState::Development))
        .unwrap();
    assert_eq!(record.extra.get("owner"), Some(&json!("ops")));
}
