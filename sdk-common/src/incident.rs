use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentCategory {
    Exception,
    Anr,
}

/// `{sessionId, timestampMs, category, identifier, detail, frames, context}`
/// — owned exclusively by StabilityMonitor, persisted as a single JSON
/// object distinct from events.jsonl so crash-path writes stay minimal and
/// atomic (§3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub session_id: String,
    pub timestamp_ms: u64,
    pub category: IncidentCategory,
    pub identifier: String,
    pub detail: String,
    pub frames: Vec<String>,
    pub context: HashMap<String, String>,
}

impl Incident {
    pub fn exception(
        session_id: impl Into<String>,
        timestamp_ms: u64,
        identifier: impl Into<String>,
        detail: impl Into<String>,
        frames: Vec<String>,
        context: HashMap<String, String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp_ms,
            category: IncidentCategory::Exception,
            identifier: identifier.into(),
            detail: detail.into(),
            frames,
            context,
        }
    }

    pub fn anr(
        session_id: impl Into<String>,
        timestamp_ms: u64,
        duration_ms: u64,
        frames: Vec<String>,
    ) -> Self {
        let mut context = HashMap::new();
        context.insert("threadState".to_string(), "blocked".to_string());
        context.insert("durationMs".to_string(), duration_ms.to_string());
        Self {
            session_id: session_id.into(),
            timestamp_ms,
            category: IncidentCategory::Anr,
            identifier: "anr".to_string(),
            detail: format!("main thread blocked for {}ms", duration_ms),
            frames,
            context,
        }
    }
}
