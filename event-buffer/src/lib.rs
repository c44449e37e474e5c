//! Durable, append-only on-disk event log (C1, §4.1).
//!
//! On-disk layout: `<cache>/rj_pending/<sessionId>/events.jsonl` and
//! `…/buffer_meta.json`. Every `append_event` persists before returning
//! `ok=true` — the write-first property that makes this the crash-safety
//! foundation for the rest of the agent.
//!
//! All public methods are synchronous and serialized by a single mutex, so
//! `append_event` can be called from any thread, including from inside an
//! uncaught-exception handler where no async runtime can be assumed to be
//! running (§4.1's concurrency note).

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sdk_common::Event;
use serde::{Deserialize, Serialize};

const PENDING_DIR: &str = "rj_pending";
const EVENTS_FILE: &str = "events.jsonl";
const META_FILE: &str = "buffer_meta.json";
const META_WRITE_INTERVAL: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferMeta {
    pub session_id: String,
    pub event_count: u64,
    pub last_event_timestamp: u64,
    pub saved_at: u64,
}

struct SessionState {
    handle: Option<File>,
    meta: BufferMeta,
    appends_since_meta_write: u32,
}

struct Inner {
    root: PathBuf,
    sessions: HashMap<String, SessionState>,
    shut_down: bool,
}

pub struct EventBuffer {
    inner: Mutex<Inner>,
}

impl EventBuffer {
    /// `cache_root` is the platform cache directory the host bridge hands
    /// the SDK; all state lives under `<cache_root>/rj_pending`.
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                root: cache_root.into(),
                sessions: HashMap::new(),
                shut_down: false,
            }),
        }
    }

    fn session_dir(&self, root: &Path, session_id: &str) -> PathBuf {
        root.join(PENDING_DIR).join(session_id)
    }

    /// Opens (creating if needed) the append handle and metadata for a
    /// session. Idempotent: calling it again re-opens the handle, which is
    /// how callers recover from a prior I/O failure (§4.1's failure mode).
    pub fn configure(&self, session_id: &str) -> bool {
        let mut inner = self.inner.lock().expect("event buffer mutex poisoned");
        inner.shut_down = false;
        let dir = self.session_dir(&inner.root, session_id);

        if let Err(err) = fs::create_dir_all(&dir) {
            tracing::error!(session_id, error = %err, "failed to create pending session directory");
            return false;
        }

        let events_path = dir.join(EVENTS_FILE);
        let handle = match OpenOptions::new().create(true).append(true).open(&events_path) {
            Ok(f) => Some(f),
            Err(err) => {
                tracing::error!(session_id, error = %err, "failed to open events.jsonl for append");
                None
            }
        };
        let opened = handle.is_some();

        let meta = load_meta(&dir.join(META_FILE)).unwrap_or(BufferMeta {
            session_id: session_id.to_string(),
            event_count: 0,
            last_event_timestamp: 0,
            saved_at: 0,
        });

        inner.sessions.insert(
            session_id.to_string(),
            SessionState {
                handle,
                meta,
                appends_since_meta_write: 0,
            },
        );

        opened
    }

    /// Write-first: the event is fully written and flushed before this
    /// returns `true`. If the process dies mid-write, the file contains
    /// either the full line or none of it — the blank/partial tail is
    /// tolerated by readers.
    #[tracing::instrument(skip_all, fields(session_id = %event.session_id))]
    pub fn append_event(&self, event: &Event) -> bool {
        let mut inner = self.inner.lock().expect("event buffer mutex poisoned");
        if inner.shut_down {
            return false;
        }

        let session_id = event.session_id.clone();
        let line = match event.to_jsonl_line() {
            Ok(line) => line,
            Err(err) => {
                tracing::error!(session_id, error = %err, "failed to encode event");
                return false;
            }
        };

        let root = inner.root.clone();
        let dir = self.session_dir(&root, &session_id);
        let timestamp_ms = event.timestamp_ms;

        let Some(state) = inner.sessions.get_mut(&session_id) else {
            tracing::error!(session_id, "append_event called before configure");
            return false;
        };

        let Some(handle) = state.handle.as_mut() else {
            tracing::error!(session_id, "no open append handle, dropping event until next configure");
            return false;
        };

        if let Err(err) = handle.write_all(line.as_bytes()).and_then(|_| handle.flush()) {
            tracing::error!(session_id, error = %err, "failed to persist event, closing handle");
            state.handle = None;
            return false;
        }

        state.meta.event_count += 1;
        state.meta.last_event_timestamp = timestamp_ms;
        state.appends_since_meta_write += 1;

        if state.appends_since_meta_write >= META_WRITE_INTERVAL {
            state.appends_since_meta_write = 0;
            write_meta(&dir.join(META_FILE), &state.meta, timestamp_ms);
        }

        true
    }

    /// Flushes and rewrites metadata for every configured session, without
    /// closing handles.
    pub fn flush(&self) -> bool {
        let mut inner = self.inner.lock().expect("event buffer mutex poisoned");
        if inner.shut_down {
            return false;
        }
        let root = inner.root.clone();
        let mut ok = true;
        for (session_id, state) in inner.sessions.iter_mut() {
            if let Some(handle) = state.handle.as_mut() {
                if let Err(err) = handle.flush() {
                    tracing::error!(session_id, error = %err, "failed to flush event handle");
                    ok = false;
                }
            }
            let dir = self.session_dir(&root, session_id);
            let now = state.meta.last_event_timestamp;
            write_meta(&dir.join(META_FILE), &state.meta, now);
            state.appends_since_meta_write = 0;
        }
        ok
    }

    /// Flushes metadata, closes every handle, and rejects further appends
    /// until the next `configure`.
    pub fn shutdown(&self) {
        self.flush();
        let mut inner = self.inner.lock().expect("event buffer mutex poisoned");
        for state in inner.sessions.values_mut() {
            state.handle = None;
        }
        inner.shut_down = true;
    }

    /// Reads every parseable event for a session, in append order. Blank
    /// and malformed lines are skipped, never fail the whole read (§9).
    pub fn read_pending_events(&self, session_id: &str) -> Vec<Event> {
        let inner = self.inner.lock().expect("event buffer mutex poisoned");
        let path = self.session_dir(&inner.root, session_id).join(EVENTS_FILE);
        drop(inner);

        let Ok(file) = File::open(&path) else {
            return Vec::new();
        };
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        for line in reader.lines() {
            let Ok(line) = line else { continue };
            if line.trim().is_empty() {
                continue;
            }
            match Event::from_jsonl_line(&line) {
                Ok(event) => events.push(event),
                Err(err) => tracing::warn!(session_id, error = %err, "skipping unparseable event line"),
            }
        }
        events
    }

    /// Enumerates subdirectories of the pending root that hold an
    /// `events.jsonl`, for the orchestrator to decide which sessions to
    /// resurrect and upload after a process restart.
    pub fn get_pending_sessions(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("event buffer mutex poisoned");
        let pending_root = inner.root.join(PENDING_DIR);
        drop(inner);

        let Ok(entries) = fs::read_dir(&pending_root) else {
            return Vec::new();
        };

        let mut sessions = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() && path.join(EVENTS_FILE).is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    sessions.push(name.to_string());
                }
            }
        }
        sessions
    }

    pub fn get_session_metadata(&self, session_id: &str) -> Option<BufferMeta> {
        let inner = self.inner.lock().expect("event buffer mutex poisoned");
        if let Some(state) = inner.sessions.get(session_id) {
            return Some(state.meta.clone());
        }
        let path = self.session_dir(&inner.root, session_id).join(META_FILE);
        drop(inner);
        load_meta(&path)
    }

    /// Removes a session's pending directory entirely, after its events
    /// have been durably uploaded.
    pub fn clear_session(&self, session_id: &str) {
        let mut inner = self.inner.lock().expect("event buffer mutex poisoned");
        inner.sessions.remove(session_id);
        let dir = self.session_dir(&inner.root, session_id);
        drop(inner);
        if let Err(err) = fs::remove_dir_all(&dir) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(session_id, error = %err, "failed to remove pending session directory");
            }
        }
    }
}

fn load_meta(path: &Path) -> Option<BufferMeta> {
    let data = fs::read_to_string(path).ok()?;
    serde_json::from_str(&data).ok()
}

fn write_meta(path: &Path, meta: &BufferMeta, now_ms: u64) {
    let mut to_write = meta.clone();
    to_write.saved_at = now_ms;
    let Ok(data) = serde_json::to_string(&to_write) else {
        return;
    };
    // Write to a temp file then rename, so a crash mid-write never leaves a
    // half-written buffer_meta.json behind (unlike events.jsonl, this file
    // is read back as a whole document, not a line at a time).
    let tmp_path = path.with_extension("json.tmp");
    if fs::write(&tmp_path, data).is_ok() {
        if let Err(err) = fs::rename(&tmp_path, path) {
            tracing::warn!(path = %path.display(), error = %err, "failed to rename buffer_meta.json.tmp into place");
        }
    }
}
