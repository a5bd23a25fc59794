// Error taxonomy shared by every module
pub mod error;

// Process-wide settings (JSON)
pub mod config;

// Window property store and window registry
pub mod state;

// Event override chain
pub mod hooks;

// Main-thread dispatch queue
pub mod dispatch;

// Engine and toolkit capabilities implemented by the binding layer
pub mod backend;

// Platform close sequencer
pub mod sequencer;

// Per-window lifecycle state machine
pub mod controller;

// Factory, popup pool and engine-signal routing
pub mod manager;

// Toolkit adapter over tauri webview windows
#[cfg(feature = "tauri")]
pub mod tauri_toolkit;

pub use backend::{
    Backend, BrowserEngine, EmbeddingSurface, EngineCloseAction, EngineOptions, FocusChange,
    Frame, FrameId, KeyEvent, KeyEventKind, ProcessId, ProcessMessage, ToolkitWindow,
};
pub use config::BrowserWindowConfig;
pub use controller::{PopupDecision, RejectReason, WindowController};
pub use dispatch::{Dispatcher, MainThreadQueue, Task};
pub use error::{Error, HookError, Result};
pub use hooks::{CloseAction, HookChain, HookEvent, HookResult, WindowHooks};
pub use manager::{BrowserWindows, EngineReply, EngineSignal};
pub use sequencer::{ClosePolicy, CloseSequencer, Platform};
pub use state::window::{LifecycleState, Rect, WindowId, WindowKind, WindowProperty, WindowShowState};
pub use state::WindowRegistry;
