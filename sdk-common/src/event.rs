use serde::{Deserialize, Serialize};

/// The small, closed vocabulary of typed events the agent produces. The
/// ordered JSONL concatenation of these in the EventBuffer is the canonical
/// reconstruction of non-visual session activity (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    SessionStart,
    Tap,
    Swipe,
    Scroll,
    Pan,
    Pinch,
    Rotation,
    LongPress,
    RageTap,
    DeadTap,
    Input,
    ViewTransition,
    Network,
    Anr,
}

/// A structured, self-describing record: `{type, timestampMs, sessionId, payload}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp_ms: u64,
    pub session_id: String,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(
        kind: EventKind,
        timestamp_ms: u64,
        session_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            timestamp_ms,
            session_id: session_id.into(),
            payload,
        }
    }

    /// Serialize to one JSONL line, newline included. A writer must never
    /// flush a partial line: this always returns a single complete object.
    pub fn to_jsonl_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parse one line from an events.jsonl file. Blank or malformed lines
    /// are the caller's responsibility to skip (§4.1, §9): this only
    /// reports whether the specific line it was given parsed.
    pub fn from_jsonl_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim_end_matches('\n'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_through_jsonl() {
        let event = Event::new(EventKind::Tap, 1234, "sess-1", json!({"x": 1, "y": 2}));
        let line = event.to_jsonl_line().unwrap();
        assert!(line.ends_with('\n'));
        let parsed = Event::from_jsonl_line(&line).unwrap();
        assert_eq!(parsed.kind, EventKind::Tap);
        assert_eq!(parsed.session_id, "sess-1");
    }

    #[test]
    fn rejects_blank_and_garbage_lines() {
        assert!(Event::from_jsonl_line("").is_err());
        assert!(Event::from_jsonl_line("not json").is_err());
    }
}
