// Collaborator capabilities
//
// The controller never talks to a native engine or GUI toolkit directly. A
// binding layer implements these traits; handles are reference-counted and
// take `&self` so no controller lock is held while they run (toolkit and
// engine calls may re-enter the controller synchronously).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::state::window::{Rect, WindowProperty, WindowShowState};

/// Windows virtual key code for F12.
pub const VK_F12: i32 = 0x7B;

/// Action the engine should take when a browser asks to close.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineCloseAction {
    /// Close right away.
    Close,
    /// Hold off; the embedder finishes the close later.
    Delay,
    /// Keep the browser open.
    Cancel,
}

/// Focus movement on the embedding surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusChange {
    Enter,
    Exit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyEventKind {
    RawKeyDown,
    KeyDown,
    KeyUp,
    Char,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    pub windows_key_code: i32,
    pub modifiers: u32,
}

impl KeyEvent {
    pub fn new(kind: KeyEventKind, windows_key_code: i32) -> Self {
        Self {
            kind,
            windows_key_code,
            modifiers: 0,
        }
    }
}

pub type FrameId = i64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub id: FrameId,
    pub name: String,
    pub url: String,
    pub is_main: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessId {
    Browser,
    Renderer,
}

/// Opaque inter-process message. Decoding it is not this crate's job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessMessage {
    pub name: String,
    pub payload: serde_json::Value,
}

/// Settings handed to the binding when an engine handle is built.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineOptions {
    pub default_url: Option<String>,
    pub multi_browser_mode: bool,
    /// Popup engines deliver their own events instead of the opener's.
    pub independent_events: bool,
}

/// One embedded browser instance.
pub trait BrowserEngine: Send + Sync {
    /// Ask the engine to create its browser inside `surface`.
    fn create_browser(&self, surface: &dyn EmbeddingSurface) -> bool;
    fn close_browser(&self, force: bool);
    /// True once the browser exists on the engine side.
    fn initialized(&self) -> bool;
    fn notify_move_or_resize_started(&self);
    fn set_focus(&self, focus: bool);
    fn send_capture_lost_event(&self);
    /// Host the browser's DevTools inside `surface`.
    fn show_dev_tools(&self, surface: &dyn EmbeddingSurface);
    fn current_url(&self) -> Option<String>;
}

/// The native region the engine renders into, a child of the window.
pub trait EmbeddingSurface: Send + Sync {
    /// Re-layout to fill the parent window's client area.
    fn update_size(&self);
    /// Destroy native child windows hosted by the surface. Returns whether
    /// anything was destroyed.
    fn destroy_child_window(&self) -> bool;
    /// Release the surface. Called exactly once per surface.
    fn free(&self);
    /// Install the enter/exit focus callback.
    fn set_focus_listener(&self, listener: Box<dyn Fn(FocusChange) + Send + Sync>);
}

/// A top-level toolkit window.
///
/// Only ever called on the UI thread: the controller routes every call that
/// originates on an engine thread through the dispatch queue.
pub trait ToolkitWindow: Send + Sync {
    fn set_name(&self, name: &str);
    fn set_title(&self, title: &str);
    fn center(&self);
    fn show(&self);
    fn show_modal(&self);
    fn hide(&self);
    /// Close through the toolkit, raising close-query and close events.
    fn close(&self);
    /// Queue a native close message instead of closing inline.
    fn post_close(&self);
    fn bounds(&self) -> Rect;
    fn set_bounds(&self, bounds: Rect);
    fn show_state(&self) -> WindowShowState;
    fn set_show_state(&self, state: WindowShowState);
    /// Work area of the monitor the window is on.
    fn work_area(&self) -> Rect;
    fn is_borderless(&self) -> bool;
    fn create_surface(&self) -> Arc<dyn EmbeddingSurface>;
}

/// Builds toolkit windows and engine handles for new controllers.
pub trait Backend: Send + Sync {
    fn create_window(&self, property: &WindowProperty) -> Arc<dyn ToolkitWindow>;
    fn create_engine(&self, options: &EngineOptions) -> Arc<dyn BrowserEngine>;
}
