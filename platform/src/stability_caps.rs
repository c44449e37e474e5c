/// A serialized stack frame, already resolved to `file:line` form by the
/// host runtime (the Rust core never symbolicates — see Non-goals).
pub type StackFrame = String;

/// What the host runtime told us about an uncaught exception.
#[derive(Debug, Clone)]
pub struct HostThrowable {
    pub identifier: String,
    pub detail: String,
    pub frames: Vec<StackFrame>,
    pub thread_name: String,
    pub is_main_thread: bool,
    pub thread_priority: i32,
}

/// A handle to whatever exception handler was installed before the SDK's
/// own. `StabilityMonitor::deactivate` chains back to it.
pub struct PreviousHandler(pub Box<dyn Fn(HostThrowable) + Send + Sync>);

/// Installs/uninstalls the process-wide uncaught-exception handler. On
/// activation, the SDK's own handler must run first and chain to whatever
/// was previously installed once it finishes persisting the incident.
pub trait UncaughtHandlerInstaller: Send + Sync {
    fn install(
        &self,
        handler: Box<dyn Fn(HostThrowable) + Send + Sync>,
    ) -> Option<PreviousHandler>;

    fn restore(&self, previous: Option<PreviousHandler>);
}
