//! Session subcommands.  Each handler returns the JSON it prints so the
//! output can be checked without a terminal.

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;

use ideaflow_domain::config::SessionsConfig;
use ideaflow_sessions::{SessionRuntime, SessionStore, SessionUpdate, WorkflowState};

use super::UpdateArgs;

pub fn create(store: &SessionStore, idea: &str) -> anyhow::Result<String> {
    let record = store.create_session(idea)?;
    flushed(store)?;
    render(&record)
}

/// Reading counts as activity, so the touch is written before exiting.
pub fn get(store: &SessionStore, session_id: &str) -> anyhow::Result<String> {
    let record = store.get_session(session_id)?;
    flushed(store)?;
    render(&record)
}

pub fn update(store: &SessionStore, session_id: &str, args: UpdateArgs) -> anyhow::Result<String> {
    let update = build_update(args)?;
    let record = store.update_session(session_id, update)?;
    flushed(store)?;
    render(&record)
}

pub fn list(store: &SessionStore) -> anyhow::Result<String> {
    render(&store.list())
}

pub fn status(store: &SessionStore) -> anyhow::Result<String> {
    #[derive(Serialize)]
    struct Status<'a> {
        #[serde(flatten)]
        store: ideaflow_sessions::StoreStatus,
        load: &'a ideaflow_sessions::LoadReport,
    }
    render(&Status {
        store: store.status(),
        load: store.load_report(),
    })
}

pub fn sweep(store: &SessionStore) -> anyhow::Result<String> {
    let removed = store.sweep_expired();
    flushed(store)?;
    render(&serde_json::json!({ "removed": removed, "remaining": store.len() }))
}

pub fn reset(store: &SessionStore, confirmed: bool) -> anyhow::Result<String> {
    if !confirmed {
        anyhow::bail!("refusing to delete every session without --yes");
    }
    let removed = store.reset();
    flushed(store)?;
    render(&serde_json::json!({ "removed": removed }))
}

/// Run the sweeper until Ctrl-C, then flush and exit.
pub async fn watch(config: &SessionsConfig) -> anyhow::Result<()> {
    let runtime = SessionRuntime::start(config).context("opening session store")?;
    eprintln!(
        "watching {} ({} sessions), sweeping every {}s; Ctrl-C to stop",
        runtime.store().path().display(),
        runtime.store().len(),
        config.cleanup_interval_secs,
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    tracing::info!("shutdown requested");

    runtime
        .shutdown()
        .await
        .context("final session flush")?;
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────

/// Implicit writes only log failures; a one-shot command must not exit 0
/// when its change never reached disk.
fn flushed(store: &SessionStore) -> anyhow::Result<()> {
    store
        .flush()
        .with_context(|| format!("writing {}", store.path().display()))
}

fn render<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<String> {
    serde_json::to_string_pretty(value).context("rendering JSON")
}

pub fn build_update(args: UpdateArgs) -> anyhow::Result<SessionUpdate> {
    let mut update = SessionUpdate::default();
    if let Some(state) = args.state {
        let to: WorkflowState = state.parse()?;
        update = SessionUpdate::transition(to);
    }
    if let Some(raw) = args.answers {
        update = update.with_answers(parse_json_arg(&raw));
    }
    if let Some(raw) = args.documents {
        update = update.with_generated_documents(parse_json_arg(&raw));
    }
    if let Some(raw) = args.approval {
        update = update.with_approval_status(parse_json_arg(&raw));
    }
    if let Some(raw) = args.plan {
        update = update.with_development_plan(parse_json_arg(&raw));
    }
    for raw in &args.extra {
        let (key, value) = parse_field(raw)?;
        update = update.with_field(key, value);
    }
    Ok(update)
}

/// JSON when it parses, otherwise the raw text as a JSON string.
pub fn parse_json_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

pub fn parse_field(raw: &str) -> anyhow::Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("empty field name in {raw:?}");
    }
    Ok((key.to_owned(), parse_json_arg(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_in(dir: &std::path::Path) -> SessionStore {
        SessionStore::open(&SessionsConfig {
            state_path: dir.to_path_buf(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn json_args_fall_back_to_strings() {
        assert_eq!(parse_json_arg(r#"{"a": 1}"#), json!({"a": 1}));
        assert_eq!(parse_json_arg("[1, 2]"), json!([1, 2]));
        assert_eq!(parse_json_arg("approved"), json!("approved"));
        assert_eq!(parse_json_arg("true"), json!(true));
    }

    #[test]
    fn field_args() {
        assert_eq!(parse_field("owner=ops").unwrap(), ("owner".into(), json!("ops")));
        assert_eq!(parse_field("n=3").unwrap(), ("n".into(), json!(3)));
        assert_eq!(parse_field("eq=a=b").unwrap(), ("eq".into(), json!("a=b")));
        assert!(parse_field("novalue").is_err());
        assert!(parse_field("=x").is_err());
    }

    #[test]
    fn unknown_state_rejected_before_touching_store() {
        let args = UpdateArgs {
            state: Some("shipping".into()),
            ..Default::default()
        };
        assert!(build_update(args).is_err());
    }

    #[test]
    fn create_update_get_through_handlers() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let created: Value = serde_json::from_str(&create(&store, "build a cli tool").unwrap()).unwrap();
        let id = created["id"].as_str().unwrap().to_owned();
        assert_eq!(created["state"], "questioning");

        let args = UpdateArgs {
            state: Some("refining".into()),
            answers: Some(r#"["yes"]"#.into()),
            extra: vec!["owner=ops".into()],
            ..Default::default()
        };
        update(&store, &id, args).unwrap();

        let skip = UpdateArgs {
            state: Some("development".into()),
            ..Default::default()
        };
        assert!(update(&store, &id, skip).is_err());

        let reopened = store_in(dir.path());
        let got: Value = serde_json::from_str(&get(&reopened, &id).unwrap()).unwrap();
        assert_eq!(got["state"], "refining");
        assert_eq!(got["answers"], json!(["yes"]));
        assert_eq!(got["owner"], "ops");
    }

    #[test]
    fn reset_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        create(&store, "a").unwrap();
        assert!(reset(&store, false).is_err());
        assert_eq!(store.len(), 1);

        let out: Value = serde_json::from_str(&reset(&store, true).unwrap()).unwrap();
        assert_eq!(out["removed"], 1);
        assert!(store.is_empty());
    }

    #[test]
    fn status_includes_load_report() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let out: Value = serde_json::from_str(&status(&store).unwrap()).unwrap();
        assert_eq!(out["sessions"], 0);
        assert_eq!(out["max_sessions"], 100);
        assert_eq!(out["load"]["corrupt"], false);
        assert_eq!(out["persistence"]["consecutive_failures"], 0);
    }
}
