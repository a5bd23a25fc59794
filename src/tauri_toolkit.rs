// Toolkit adapter for tauri
//
// Maps `ToolkitWindow`/`EmbeddingSurface` onto a `tauri::WebviewWindow`, feeds
// the window's events into its controller and drains the dispatch queue on
// tauri's main thread. Tauri errors are logged, never raised into the
// controller.

use std::sync::{Arc, Weak};

use tauri::{AppHandle, PhysicalPosition, PhysicalSize, Runtime, WebviewWindow, WindowEvent};

use crate::backend::{EmbeddingSurface, FocusChange, ToolkitWindow};
use crate::controller::WindowController;
use crate::dispatch::MainThreadQueue;
use crate::hooks::CloseAction;
use crate::state::window::{Rect, WindowShowState};

fn logged(what: &str, result: tauri::Result<()>) {
    if let Err(e) = result {
        log::warn!("[tauri] {what} failed: {e}");
    }
}

/// Run queued UI work on tauri's main thread whenever something is posted.
pub fn drive_queue<R: Runtime>(app: &AppHandle<R>, queue: Arc<MainThreadQueue>) {
    let app = app.clone();
    let drained = Arc::clone(&queue);
    queue.set_waker(move || {
        let queue = Arc::clone(&drained);
        logged(
            "run_on_main_thread",
            app.run_on_main_thread(move || {
                queue.run_turn();
            }),
        );
    });
}

/// Forward a window's toolkit events to its controller.
pub fn bind_events<R: Runtime>(window: &WebviewWindow<R>, controller: &Arc<WindowController>) {
    let weak: Weak<WindowController> = Arc::downgrade(controller);
    window.on_window_event(move |event| {
        let Some(controller) = weak.upgrade() else { return };
        match event {
            WindowEvent::Resized(_) | WindowEvent::Moved(_) => controller.on_resize(),
            WindowEvent::Focused(true) => controller.on_activate(),
            WindowEvent::CloseRequested { api, .. } => {
                if !controller.on_close_query() {
                    api.prevent_close();
                }
            }
            WindowEvent::Destroyed => {
                controller.on_close(CloseAction::Free);
            }
            _ => {}
        }
    });
}

pub struct TauriWindow<R: Runtime> {
    window: WebviewWindow<R>,
}

impl<R: Runtime> TauriWindow<R> {
    pub fn new(window: WebviewWindow<R>) -> Self {
        Self { window }
    }

    pub fn inner(&self) -> &WebviewWindow<R> {
        &self.window
    }
}

impl<R: Runtime> ToolkitWindow for TauriWindow<R> {
    fn set_name(&self, name: &str) {
        log::trace!("[tauri] window {} named {name}", self.window.label());
    }

    fn set_title(&self, title: &str) {
        logged("set_title", self.window.set_title(title));
    }

    fn center(&self) {
        logged("center", self.window.center());
    }

    fn show(&self) {
        logged("show", self.window.show());
    }

    fn show_modal(&self) {
        // No modal loop in tauri; show and grab focus instead.
        logged("show", self.window.show());
        logged("set_focus", self.window.set_focus());
    }

    fn hide(&self) {
        logged("hide", self.window.hide());
    }

    fn close(&self) {
        logged("close", self.window.close());
    }

    fn post_close(&self) {
        // tauri already delivers close requests through its event loop.
        logged("close", self.window.close());
    }

    fn bounds(&self) -> Rect {
        let position = self.window.outer_position().unwrap_or_default();
        let size = self.window.outer_size().unwrap_or_default();
        Rect::new(position.x, position.y, size.width as i32, size.height as i32)
    }

    fn set_bounds(&self, bounds: Rect) {
        logged(
            "set_position",
            self.window.set_position(PhysicalPosition::new(bounds.x, bounds.y)),
        );
        logged(
            "set_size",
            self.window.set_size(PhysicalSize::new(
                bounds.width.max(0) as u32,
                bounds.height.max(0) as u32,
            )),
        );
    }

    fn show_state(&self) -> WindowShowState {
        if self.window.is_minimized().unwrap_or(false) {
            WindowShowState::Minimized
        } else if self.window.is_maximized().unwrap_or(false) {
            WindowShowState::Maximized
        } else {
            WindowShowState::Normal
        }
    }

    fn set_show_state(&self, state: WindowShowState) {
        match state {
            WindowShowState::Normal => {
                logged("unminimize", self.window.unminimize());
                logged("unmaximize", self.window.unmaximize());
            }
            WindowShowState::Maximized => logged("maximize", self.window.maximize()),
            WindowShowState::Minimized => logged("minimize", self.window.minimize()),
        }
    }

    fn work_area(&self) -> Rect {
        match self.window.current_monitor() {
            Ok(Some(monitor)) => {
                let position = monitor.position();
                let size = monitor.size();
                Rect::new(position.x, position.y, size.width as i32, size.height as i32)
            }
            _ => self.bounds(),
        }
    }

    fn is_borderless(&self) -> bool {
        !self.window.is_decorated().unwrap_or(true)
    }

    fn create_surface(&self) -> Arc<dyn EmbeddingSurface> {
        Arc::new(TauriSurface {
            window: self.window.clone(),
        })
    }
}

/// The webview fills its window, so most surface work is done by tauri.
pub struct TauriSurface<R: Runtime> {
    window: WebviewWindow<R>,
}

impl<R: Runtime> EmbeddingSurface for TauriSurface<R> {
    fn update_size(&self) {}

    fn destroy_child_window(&self) -> bool {
        false
    }

    fn free(&self) {
        log::trace!("[tauri] surface of {} released", self.window.label());
    }

    fn set_focus_listener(&self, listener: Box<dyn Fn(FocusChange) + Send + Sync>) {
        self.window.on_window_event(move |event| {
            if let WindowEvent::Focused(focused) = event {
                listener(if *focused {
                    FocusChange::Enter
                } else {
                    FocusChange::Exit
                });
            }
        });
    }
}
