//! Session records and partial updates.
//!
//! Payload fields (`answers`, `generatedDocuments`, ...) are opaque JSON:
//! the store only checks whether an update carries them.  Fields the store
//! does not know about land in `extra` and are written back unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::workflow::WorkflowState;

/// Field names owned by [`SessionRecord`]; an update can never smuggle
/// these in through `extra`.
const RESERVED_FIELDS: &[&str] = &[
    "id",
    "state",
    "userIdea",
    "createdAt",
    "lastActivity",
    "answers",
    "generatedDocuments",
    "approvalStatus",
    "developmentPlan",
];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single workflow session tracked by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub state: WorkflowState,
    /// Free text supplied at creation.  Never modified afterwards.
    #[serde(default)]
    pub user_idea: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_documents: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_status: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub development_plan: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionRecord {
    pub(crate) fn new(id: String, user_idea: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            state: WorkflowState::Questioning,
            user_idea,
            created_at: now,
            last_activity: now,
            answers: None,
            generated_documents: None,
            approval_status: None,
            development_plan: None,
            extra: Map::new(),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            state: self.state,
            created_at: self.created_at,
            last_activity: self.last_activity,
        }
    }
}

/// Lightweight listing view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub state: WorkflowState,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Partial update
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fields to merge into a record.  `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<WorkflowState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_documents: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_status: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub development_plan: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionUpdate {
    /// An update that only requests a state change.
    pub fn transition(to: WorkflowState) -> Self {
        Self {
            state: Some(to),
            ..Self::default()
        }
    }

    pub fn with_answers(mut self, answers: Value) -> Self {
        self.answers = Some(answers);
        self
    }

    pub fn with_generated_documents(mut self, documents: Value) -> Self {
        self.generated_documents = Some(documents);
        self
    }

    pub fn with_approval_status(mut self, status: Value) -> Self {
        self.approval_status = Some(status);
        self
    }

    pub fn with_development_plan(mut self, plan: Value) -> Self {
        self.development_plan = Some(plan);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Merge into `record`.  The caller has already checked the state
    /// change against the transition table.
    pub(crate) fn apply(self, record: &mut SessionRecord) {
        if let Some(state) = self.state {
            record.state = state;
        }
        if let Some(answers) = self.answers {
            record.answers = Some(answers);
        }
        if let Some(documents) = self.generated_documents {
            record.generated_documents = Some(documents);
        }
        if let Some(status) = self.approval_status {
            record.approval_status = Some(status);
        }
        if let Some(plan) = self.development_plan {
            record.development_plan = Some(plan);
        }
        for (key, value) in self.extra {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                tracing::debug!(session_id = %record.id, field = %key, "ignoring reserved field in update");
                continue;
            }
            record.extra.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> SessionRecord {
        SessionRecord::new("sess_1".into(), "build a cli tool".into(), Utc::now())
    }

    #[test]
    fn new_record_starts_questioning() {
        let r = record();
        assert_eq!(r.state, WorkflowState::Questioning);
        assert_eq!(r.created_at, r.last_activity);
        assert!(r.answers.is_none());
    }

    #[test]
    fn wire_names_are_camel_case() {
        let mut r = record();
        r.generated_documents = Some(json!({"prd": "..."}));
        let value = serde_json::to_value(&r).unwrap();
        assert_eq!(value["userIdea"], "build a cli tool");
        assert_eq!(value["state"], "questioning");
        assert!(value.get("createdAt").is_some());
        assert!(value.get("lastActivity").is_some());
        assert!(value.get("generatedDocuments").is_some());
        assert!(value.get("answers").is_none());
    }

    #[test]
    fn unknown_fields_preserved() {
        let raw = json!({
            "id": "sess_1",
            "state": "refining",
            "userIdea": "x",
            "createdAt": "2026-01-15T03:00:00Z",
            "lastActivity": "2026-01-15T03:05:00Z",
            "priority": 3,
            "tags": ["a"]
        });
        let r: SessionRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(r.extra.get("priority"), Some(&json!(3)));

        let back = serde_json::to_value(&r).unwrap();
        assert_eq!(back["tags"], json!(["a"]));
    }

    #[test]
    fn apply_merges_only_present_fields() {
        let mut r = record();
        r.answers = Some(json!(["first"]));

        SessionUpdate::transition(WorkflowState::Refining)
            .with_development_plan(json!({"phases": 2}))
            .apply(&mut r);

        assert_eq!(r.state, WorkflowState::Refining);
        assert_eq!(r.answers, Some(json!(["first"])));
        assert_eq!(r.development_plan, Some(json!({"phases": 2})));
    }

    #[test]
    fn apply_ignores_reserved_extra_fields() {
        let mut r = record();
        SessionUpdate::default()
            .with_field("userIdea", json!("rewritten"))
            .with_field("id", json!("sess_other"))
            .with_field("note", json!("kept"))
            .apply(&mut r);

        assert_eq!(r.user_idea, "build a cli tool");
        assert_eq!(r.id, "sess_1");
        assert!(!r.extra.contains_key("userIdea"));
        assert_eq!(r.extra.get("note"), Some(&json!("kept")));
    }

    #[test]
    fn update_deserializes_from_caller_json() {
        let update: SessionUpdate = serde_json::from_value(json!({
            "state": "document_review",
            "generatedDocuments": {"spec": "..."},
            "reviewer": "bot"
        }))
        .unwrap();
        assert_eq!(update.state, Some(WorkflowState::DocumentReview));
        assert!(update.generated_documents.is_some());
        assert_eq!(update.extra.get("reviewer"), Some(&json!("bot")));
    }
}
