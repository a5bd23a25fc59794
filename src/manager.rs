// Window factory and engine-signal entry point
//
// `BrowserWindows` owns what every controller shares: config, registry,
// dispatcher, close sequencer, backend and the popup pool. Engine bindings
// deliver callbacks through `engine_signal`, joined to controllers by id.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::backend::{Backend, EngineCloseAction, Frame, KeyEvent, ProcessId, ProcessMessage};
use crate::config::BrowserWindowConfig;
use crate::controller::{PopupDecision, WindowController};
use crate::dispatch::{Dispatcher, MainThreadQueue};
use crate::error::{panic_message, Error, Result};
use crate::sequencer::{CloseSequencer, Platform};
use crate::state::window::{WindowId, WindowKind, WindowProperty};
use crate::state::WindowRegistry;

pub(crate) struct Shared {
    pub(crate) config: BrowserWindowConfig,
    pub(crate) registry: WindowRegistry,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) sequencer: CloseSequencer,
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) popups: PopupPool,
}

impl Shared {
    /// Queue a UI-thread task that builds idle popups up to the pool size.
    pub(crate) fn refill_popups(self: &Arc<Self>) {
        if !self.config.enable_window_popup {
            return;
        }
        let weak: Weak<Shared> = Arc::downgrade(self);
        self.dispatcher.post(move || {
            if let Some(shared) = weak.upgrade() {
                shared.popups.prewarm(&shared);
            }
        });
    }
}

struct PoolSlots {
    idle: Vec<Arc<WindowController>>,
    live: usize,
}

/// Caps how many popup windows are alive and keeps pre-built ones around.
///
/// Popup requests arrive on engine threads, so the pool only ever hands out
/// controllers whose toolkit window and surface were built on the UI thread.
pub(crate) struct PopupPool {
    capacity: usize,
    slots: Mutex<PoolSlots>,
    closed: AtomicBool,
}

impl PopupPool {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Mutex::new(PoolSlots {
                idle: Vec::new(),
                live: 0,
            }),
            closed: AtomicBool::new(false),
        }
    }

    /// Take an idle pre-built controller. `None` when every slot is live or
    /// the next one has not been built yet.
    pub(crate) fn acquire(&self) -> Option<Arc<WindowController>> {
        let mut slots = self.lock();
        if slots.live >= self.capacity {
            return None;
        }
        let popup = slots.idle.pop()?;
        slots.live += 1;
        Some(popup)
    }

    pub(crate) fn release(&self) {
        let mut slots = self.lock();
        slots.live = slots.live.saturating_sub(1);
    }

    /// UI thread only.
    fn prewarm(&self, shared: &Arc<Shared>) -> usize {
        if self.closed.load(Ordering::SeqCst) {
            return 0;
        }
        let missing = {
            let slots = self.lock();
            self.capacity.saturating_sub(slots.live + slots.idle.len())
        };
        let built: Vec<_> = (0..missing)
            .map(|_| {
                let popup = WindowController::new(
                    Arc::clone(shared),
                    WindowKind::PopupSubBrowser,
                    shared.config.window.clone(),
                );
                popup.form_create();
                popup.prepare_surface();
                popup
            })
            .collect();
        self.lock().idle.extend(built);
        if missing > 0 {
            log::debug!("[popups] {missing} popup window(s) prepared");
        }
        missing
    }

    fn live(&self) -> usize {
        self.lock().live
    }

    fn idle(&self) -> usize {
        self.lock().idle.len()
    }

    fn drain_idle(&self) -> Vec<Arc<WindowController>> {
        self.closed.store(true, Ordering::SeqCst);
        std::mem::take(&mut self.lock().idle)
    }

    fn lock(&self) -> MutexGuard<'_, PoolSlots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An engine callback, as delivered by the binding layer.
#[derive(Debug, Clone)]
pub enum EngineSignal {
    AfterCreated,
    /// The engine asks how to close the browser.
    Close,
    BeforeClose,
    FrameCreated(Frame),
    FrameDetached(Frame),
    BeforePopup { target_url: String },
    BeforeBrowser(Frame),
    TitleChange(String),
    Key(KeyEvent),
    LoadingStateChange {
        is_loading: bool,
        can_go_back: bool,
        can_go_forward: bool,
    },
    ProcessMessageReceived {
        frame: Option<Frame>,
        source: ProcessId,
        message: ProcessMessage,
    },
}

impl EngineSignal {
    pub fn name(&self) -> &'static str {
        match self {
            EngineSignal::AfterCreated => "afterCreated",
            EngineSignal::Close => "onClose",
            EngineSignal::BeforeClose => "beforeClose",
            EngineSignal::FrameCreated(_) => "frameCreated",
            EngineSignal::FrameDetached(_) => "frameDetached",
            EngineSignal::BeforePopup { .. } => "beforePopup",
            EngineSignal::BeforeBrowser(_) => "beforeBrowser",
            EngineSignal::TitleChange(_) => "titleChange",
            EngineSignal::Key(_) => "keyEvent",
            EngineSignal::LoadingStateChange { .. } => "loadingStateChange",
            EngineSignal::ProcessMessageReceived { .. } => "processMessageReceived",
        }
    }
}

/// What goes back to the engine for a signal.
pub enum EngineReply {
    Done,
    CloseAction(EngineCloseAction),
    Popup(PopupDecision),
    /// Cancel the navigation.
    Cancel(bool),
    Handled(bool),
}

/// Entry point for creating browser windows and routing engine callbacks.
pub struct BrowserWindows {
    shared: Arc<Shared>,
}

impl BrowserWindows {
    /// Set up the registry and close sequencer. Toolkit work is posted to `queue`.
    pub fn new(config: BrowserWindowConfig, backend: Arc<dyn Backend>, queue: &MainThreadQueue) -> Self {
        let dispatcher = queue.dispatcher();
        let platform = config.platform();
        let popups = PopupPool::new(config.popup_pool_size);
        log::debug!("[windows] close model {platform:?}, popup pool {}", config.popup_pool_size);

        let shared = Arc::new(Shared {
            sequencer: CloseSequencer::new(platform.close_policy(), dispatcher.clone()),
            config,
            registry: WindowRegistry::new(),
            dispatcher,
            backend,
            popups,
        });
        // Popup windows are built on the first UI turn, never on request.
        shared.refill_popups();
        Self { shared }
    }

    pub fn config(&self) -> &BrowserWindowConfig {
        &self.shared.config
    }

    pub fn platform(&self) -> Platform {
        self.shared.sequencer.platform()
    }

    pub fn registry(&self) -> &WindowRegistry {
        &self.shared.registry
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.shared.dispatcher.clone()
    }

    /// A controller with no toolkit window or engine yet.
    pub fn new_window(&self, kind: WindowKind, property: WindowProperty) -> Arc<WindowController> {
        WindowController::new(Arc::clone(&self.shared), kind, property)
    }

    /// Create a main browser window: build the form, attach an engine and
    /// register it. `None` uses the configured default property.
    pub fn create_browser_window(&self, property: Option<WindowProperty>) -> Result<Arc<WindowController>> {
        let property = property.unwrap_or_else(|| self.shared.config.window.clone());
        let url = property
            .url
            .clone()
            .or_else(|| self.shared.config.default_url.clone());

        let controller = self.new_window(WindowKind::MainBrowser, property);
        controller.form_create();
        controller.attach_engine(url.as_deref())?;
        Ok(controller)
    }

    pub fn window(&self, id: WindowId) -> Option<Arc<WindowController>> {
        self.shared.registry.get(id)
    }

    /// Pre-build idle popup controllers up to the pool size now instead of
    /// on the next UI turn. UI thread only.
    pub fn prewarm_popups(&self) -> usize {
        self.shared.popups.prewarm(&self.shared)
    }

    pub fn live_popups(&self) -> usize {
        self.shared.popups.live()
    }

    pub fn idle_popups(&self) -> usize {
        self.shared.popups.idle()
    }

    /// Route an engine callback to its controller.
    ///
    /// Unknown ids are protocol violations: logged and dropped. Nothing a
    /// controller or hook does unwinds past this point.
    pub fn engine_signal(&self, id: WindowId, signal: EngineSignal) -> Option<EngineReply> {
        let name = signal.name();
        let Some(controller) = self.shared.registry.get(id) else {
            log::warn!("[engine] {}", Error::ProtocolViolation { id, signal: name });
            return None;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match signal {
            EngineSignal::AfterCreated => {
                controller.on_after_created();
                EngineReply::Done
            }
            EngineSignal::Close => EngineReply::CloseAction(controller.on_engine_close()),
            EngineSignal::BeforeClose => {
                controller.on_before_close();
                EngineReply::Done
            }
            EngineSignal::FrameCreated(frame) => {
                controller.on_frame_created(frame);
                EngineReply::Done
            }
            EngineSignal::FrameDetached(frame) => {
                controller.on_frame_detached(frame);
                EngineReply::Done
            }
            EngineSignal::BeforePopup { target_url } => {
                EngineReply::Popup(controller.request_popup(&target_url))
            }
            EngineSignal::BeforeBrowser(frame) => EngineReply::Cancel(controller.on_before_browser(frame)),
            EngineSignal::TitleChange(title) => {
                controller.on_title_change(&title);
                EngineReply::Done
            }
            EngineSignal::Key(event) => EngineReply::Handled(controller.on_key_event(event)),
            EngineSignal::LoadingStateChange {
                is_loading,
                can_go_back,
                can_go_forward,
            } => {
                controller.on_loading_state_change(is_loading, can_go_back, can_go_forward);
                EngineReply::Done
            }
            EngineSignal::ProcessMessageReceived {
                frame,
                source,
                message,
            } => EngineReply::Handled(controller.on_process_message_received(frame, source, message)),
        }));

        match outcome {
            Ok(reply) => Some(reply),
            Err(payload) => {
                log::error!(
                    "[engine] signal `{name}` for window {id} panicked: {}",
                    panic_message(payload.as_ref())
                );
                None
            }
        }
    }

    /// Ask every registered window to close.
    pub fn close_all(&self) {
        for id in self.shared.registry.ids() {
            if let Some(controller) = self.shared.registry.get(id) {
                controller.close_window();
            }
        }
    }

    /// Drop every registry entry and idle popup. Returns how many windows
    /// were still registered.
    pub fn shutdown(&self) -> usize {
        self.shared.popups.drain_idle();
        let remaining = self.shared.registry.clear();
        if !remaining.is_empty() {
            log::debug!("[windows] shutdown with {} window(s) still registered", remaining.len());
        }
        remaining.len()
    }
}

impl Drop for BrowserWindows {
    fn drop(&mut self) {
        // Controllers hold the shared state; clearing the table breaks the cycle.
        self.shutdown();
    }
}
