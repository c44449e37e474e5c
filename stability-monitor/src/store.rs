use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use sdk_common::Incident;

const INCIDENTS_FILE: &str = "rj_incidents.json";

/// Owns `<cache>/rj_incidents.json` — a single pending incident, written
/// synchronously and atomically (§4.4). Shared between StabilityMonitor
/// (exceptions) and AnrSentinel (ANRs); a new incident overwrites whatever
/// was pending, since the file holds one JSON object, not a list — if a
/// second fault lands before the first uploads, only the most recent is
/// kept (documented Open Question disposition: this SDK favors the freshest
/// diagnostic over a queue of crash records it cannot practically bound).
pub struct IncidentStore {
    path: Mutex<PathBuf>,
}

impl IncidentStore {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            path: Mutex::new(cache_root.into().join(INCIDENTS_FILE)),
        }
    }

    /// Atomic write-then-rename, followed by a short sleep to give the OS
    /// time to flush before the handler returns control to whatever the
    /// host runtime does next with a dying process (§4.4).
    pub fn persist(&self, incident: &Incident) -> bool {
        let path = self.path.lock().unwrap().clone();
        let Ok(json) = serde_json::to_vec(incident) else {
            return false;
        };

        let Some(parent) = path.parent() else { return false };
        if std::fs::create_dir_all(parent).is_err() {
            return false;
        }

        let tmp_path = path.with_extension("json.tmp");
        let ok = std::fs::write(&tmp_path, &json).is_ok() && std::fs::rename(&tmp_path, &path).is_ok();

        std::thread::sleep(Duration::from_millis(150));
        ok
    }

    pub fn load(&self) -> Option<Incident> {
        let path = self.path.lock().unwrap().clone();
        let data = std::fs::read(path).ok()?;
        serde_json::from_slice(&data).ok()
    }

    pub fn clear(&self) {
        let path = self.path.lock().unwrap().clone();
        if let Err(err) = std::fs::remove_file(&path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove incident file");
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        self.path.lock().unwrap().exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = IncidentStore::new(dir.path());
        let incident = Incident::exception("sess-1", 1_000, "NullPointerException", "boom", vec!["a.kt:1".into()], HashMap::new());

        assert!(store.persist(&incident));
        let loaded = store.load().unwrap();
        assert_eq!(loaded.identifier, "NullPointerException");
        assert_eq!(loaded.session_id, "sess-1");
    }

    #[test]
    fn clear_removes_the_pending_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = IncidentStore::new(dir.path());
        let incident = Incident::anr("sess-1", 2_000, 5200, vec!["main.run".into()]);
        store.persist(&incident);
        assert!(store.has_pending());
        store.clear();
        assert!(!store.has_pending());
    }

    #[test]
    fn second_incident_overwrites_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = IncidentStore::new(dir.path());
        store.persist(&Incident::exception("sess-1", 1_000, "First", "a", vec![], HashMap::new()));
        store.persist(&Incident::exception("sess-1", 2_000, "Second", "b", vec![], HashMap::new()));

        let loaded = store.load().unwrap();
        assert_eq!(loaded.identifier, "Second");
    }
}
