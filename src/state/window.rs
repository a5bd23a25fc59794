use serde::{Deserialize, Serialize};

/// Process-unique window number. Also the join key for engine callbacks.
pub type WindowId = u64;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub enum WindowShowState {
    /// Regular sized window
    #[default]
    Normal,
    /// Window fills the monitor work area
    Maximized,
    /// Window is iconified
    Minimized,
}

/// What a controller hosts. Decides which default behaviors apply.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum WindowKind {
    MainBrowser,
    PopupSubBrowser,
    DevTools,
    ViewSource,
}

impl WindowKind {
    /// Auxiliary windows belong to a main controller and die with it.
    pub fn is_auxiliary(self) -> bool {
        matches!(self, WindowKind::DevTools | WindowKind::ViewSource)
    }
}

/// Controller lifecycle. Variants are ordered; a controller only moves forward.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Uninitialized,
    FormReady,
    EngineCreating,
    EngineReady,
    Closing,
    PendingDestroy,
    Destroyed,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }
}

/// Geometry and state snapshot owned by a controller.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct WindowProperty {
    pub title: String,
    pub url: Option<String>,     // Initial page for the engine
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub window_state: WindowShowState,
    pub is_show_modal: bool,     // Popups using this property open modal
}

impl Default for WindowProperty {
    fn default() -> Self {
        Self {
            title: String::new(),
            url: None,
            x: 0,
            y: 0,
            width: 1024,
            height: 768,
            window_state: WindowShowState::Normal,
            is_show_modal: false,
        }
    }
}

impl WindowProperty {
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// Remember `rect` as the geometry to restore to.
    pub fn save_bounds(&mut self, rect: Rect) {
        self.x = rect.x;
        self.y = rect.y;
        self.width = rect.width;
        self.height = rect.height;
    }
}
