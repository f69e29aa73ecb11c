use serde::Serialize;

/// Structured trace events emitted by the session store.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    StoreLoaded {
        path: String,
        loaded: usize,
        dropped: usize,
        trimmed: usize,
    },
    RecordDropped {
        index: usize,
        reason: String,
    },
    StoreCorrupt {
        path: String,
        reason: String,
        backup: Option<String>,
    },
    SessionCreated {
        session_id: String,
    },
    SessionTransitioned {
        session_id: String,
        from: String,
        to: String,
    },
    SessionsEvicted {
        session_ids: Vec<String>,
    },
    SessionsExpired {
        session_ids: Vec<String>,
    },
    StoreReset {
        removed: usize,
    },
    PersistFailed {
        path: String,
        error: String,
        consecutive_failures: u32,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        match self {
            Self::StoreCorrupt { .. } => tracing::error!(trace_event = %json, "ideaflow_event"),
            Self::RecordDropped { .. } | Self::PersistFailed { .. } => {
                tracing::warn!(trace_event = %json, "ideaflow_event")
            }
            _ => tracing::info!(trace_event = %json, "ideaflow_event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_variant() {
        let event = TraceEvent::SessionTransitioned {
            session_id: "sess_1".into(),
            from: "refining".into(),
            to: "document_review".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "SessionTransitioned");
        assert_eq!(value["to"], "document_review");
    }
}
