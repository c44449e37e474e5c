use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::sync::Arc;

use platform::{HostThrowable, PreviousHandler, UncaughtHandlerInstaller};
use sdk_common::{Incident, Tallies};

use crate::store::IncidentStore;

/// C4 — installs the process-wide uncaught-exception handler, captures an
/// `Incident` from whatever the host runtime reports, persists it
/// synchronously, then chains to whichever handler was previously installed
/// (§4.4). The upload side lives in `crate::upload`.
pub struct StabilityMonitor {
    installer: Arc<dyn UncaughtHandlerInstaller>,
    store: Arc<IncidentStore>,
    tallies: Arc<Tallies>,
    session_id: Mutex<Option<String>>,
    now_ms: Arc<dyn Fn() -> u64 + Send + Sync>,
    chain_slot: Mutex<Option<Arc<Mutex<Option<PreviousHandler>>>>>,
    active: AtomicBool,
}

impl StabilityMonitor {
    pub fn new(
        installer: Arc<dyn UncaughtHandlerInstaller>,
        store: Arc<IncidentStore>,
        tallies: Arc<Tallies>,
        now_ms: Arc<dyn Fn() -> u64 + Send + Sync>,
    ) -> Self {
        Self {
            installer,
            store,
            tallies,
            session_id: Mutex::new(None),
            now_ms,
            chain_slot: Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    /// Idempotent: re-activating with the SDK handler already installed only
    /// updates the session id used to tag future incidents.
    pub fn activate(&self, session_id: impl Into<String>) {
        *self.session_id.lock().unwrap() = Some(session_id.into());

        if self.active.swap(true, Ordering::SeqCst) {
            return;
        }

        let store = Arc::clone(&self.store);
        let tallies = Arc::clone(&self.tallies);
        let now_ms = Arc::clone(&self.now_ms);
        let session_id_slot: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(
            self.session_id.lock().unwrap().clone(),
        ));
        // The SDK's own handler must chain to whatever was previously
        // installed once it's done persisting (§4.4). Since `install`
        // returns the previous handler only after the new one is already
        // live, the chain target is threaded through a shared slot filled
        // in immediately below, before `activate` returns control to the
        // host runtime.
        let chain_slot: Arc<Mutex<Option<PreviousHandler>>> = Arc::new(Mutex::new(None));

        let handler: Box<dyn Fn(HostThrowable) + Send + Sync> = {
            let session_id_slot = Arc::clone(&session_id_slot);
            let chain_slot = Arc::clone(&chain_slot);
            Box::new(move |throwable: HostThrowable| {
                let session_id = session_id_slot
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string());

                let mut context = HashMap::new();
                context.insert("threadName".to_string(), throwable.thread_name.clone());
                context.insert("isMain".to_string(), throwable.is_main_thread.to_string());
                context.insert("priority".to_string(), throwable.thread_priority.to_string());

                let incident = Incident::exception(
                    session_id,
                    now_ms(),
                    throwable.identifier.clone(),
                    throwable.detail.clone(),
                    throwable.frames.clone(),
                    context,
                );

                tracing::error!(
                    session_id = %incident.session_id,
                    identifier = %throwable.identifier,
                    thread = %throwable.thread_name,
                    "uncaught exception captured"
                );
                store.persist(&incident);
                tallies.record_fault();

                if let Some(PreviousHandler(previous)) = chain_slot.lock().unwrap().as_ref() {
                    previous(throwable);
                }
            })
        };

        let previous = self.installer.install(handler);
        *chain_slot.lock().unwrap() = previous;
        *self.chain_slot.lock().unwrap() = Some(chain_slot);
    }

    pub fn deactivate(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let previous = self
            .chain_slot
            .lock()
            .unwrap()
            .take()
            .and_then(|slot| slot.lock().unwrap().take());
        self.installer.restore(previous);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
