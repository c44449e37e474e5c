//! Capability interfaces the core is written against, instead of calling
//! directly into any specific host UI toolkit, map SDK, or pixel-copy API.
//! See design note "Dynamic dispatch (adapter interfaces)": the host's UI
//! toolkit, map SDK, and pixel-copy capability vary across platforms, so the
//! core never calls them directly.

pub mod capture_caps;
pub mod clock;
pub mod http;
pub mod input_caps;
pub mod observer;
pub mod stability_caps;
pub mod thread_caps;

pub use capture_caps::{
    CapturedBitmap, PixelCopyProvider, Rect, ScreenSurface, SensitiveCategory, ViewHierarchyProvider,
    ViewNode, WindowBounds,
};
pub use clock::{Clock, FakeClock, SystemClock};
pub use http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
pub use input_caps::{
    TextFieldSample, TextFieldWatcher, TouchEvent, TouchIntake, TouchPhase, TouchPoint,
    WindowFrameObserver,
};
pub use observer::ObserverHandle;
pub use stability_caps::{HostThrowable, PreviousHandler, StackFrame, UncaughtHandlerInstaller};
pub use thread_caps::{MainThreadExecutor, MainThreadStackProvider};
pub use capture_caps::MapIdleSource;
