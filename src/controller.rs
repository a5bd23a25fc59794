// Browser window controller
//
// One controller per toolkit window that hosts (or belongs to) an engine
// browser. Toolkit events arrive on the UI thread; engine signals may arrive
// on engine threads and only ever reach the toolkit through the dispatch
// queue. Collaborator handles are cloned out of the state lock before they
// are called, so re-entrant toolkit or engine callbacks never deadlock.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use uuid::Uuid;

use crate::backend::{
    BrowserEngine, EmbeddingSurface, EngineCloseAction, EngineOptions, FocusChange, Frame,
    FrameId, KeyEvent, KeyEventKind, ProcessId, ProcessMessage, ToolkitWindow, VK_F12,
};
use crate::error::{Error, Result};
use crate::hooks::{
    BeforeBrowserArgs, BrowserArgs, CloseAction, CloseArgs, CloseQueryArgs, EngineCloseArgs,
    FrameArgs, HookEvent, HookResult, KeyArgs, LoadingArgs, PopupArgs, ProcessMessageArgs,
    TitleArgs, WindowEvent, WindowHooks,
};
use crate::manager::Shared;
use crate::sequencer::Platform;
use crate::state::window::{LifecycleState, Rect, WindowId, WindowKind, WindowProperty, WindowShowState};

type ActivateAfter = Arc<dyn Fn(&WindowController) + Send + Sync>;

/// Why a popup request did not produce a window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// Popups are switched off in the config.
    Disabled,
    /// Every popup slot is in use.
    PoolExhausted,
    /// A `BeforePopup` hook suppressed the popup.
    Vetoed,
    /// The popup window could not be attached to an engine.
    AttachFailed,
}

/// Outcome of one popup request. Exactly one per request.
pub enum PopupDecision {
    Accepted {
        popup: Arc<WindowController>,
        no_javascript_access: bool,
    },
    Rejected(RejectReason),
}

impl PopupDecision {
    /// The engine must not create its own window for this popup.
    pub fn cancels_engine_popup(&self) -> bool {
        matches!(self, PopupDecision::Rejected(_))
    }

    pub fn popup(&self) -> Option<&Arc<WindowController>> {
        match self {
            PopupDecision::Accepted { popup, .. } => Some(popup),
            PopupDecision::Rejected(_) => None,
        }
    }
}

struct Inner {
    state: LifecycleState,
    kind: WindowKind,
    property: WindowProperty,
    name: Option<String>,
    title: String,
    window: Option<Arc<dyn ToolkitWindow>>,
    surface: Option<Arc<dyn EmbeddingSurface>>,
    engine: Option<Arc<dyn BrowserEngine>>,
    browser_requested: bool,
    dev_tools: Option<Arc<WindowController>>,
    view_source: Option<Arc<WindowController>>,
    frames: BTreeMap<FrameId, Frame>,
    on_activate_after: Option<ActivateAfter>,
}

impl Inner {
    /// Move forward to `to`; never back.
    fn advance(&mut self, to: LifecycleState) {
        if to > self.state {
            self.state = to;
        }
    }

    fn auxiliaries(&mut self) -> Vec<Arc<WindowController>> {
        self.dev_tools.take().into_iter().chain(self.view_source.take()).collect()
    }
}

pub struct WindowController {
    shared: Arc<Shared>,
    id: OnceLock<WindowId>,
    is_closing: AtomicBool,
    can_close: AtomicBool,
    hooks: WindowHooks,
    inner: Mutex<Inner>,
}

impl WindowController {
    pub(crate) fn new(shared: Arc<Shared>, kind: WindowKind, property: WindowProperty) -> Arc<Self> {
        let title = property.title.clone();
        Arc::new(Self {
            shared,
            id: OnceLock::new(),
            is_closing: AtomicBool::new(false),
            can_close: AtomicBool::new(false),
            hooks: WindowHooks::new(),
            inner: Mutex::new(Inner {
                state: LifecycleState::Uninitialized,
                kind,
                property,
                name: None,
                title,
                window: None,
                surface: None,
                engine: None,
                browser_requested: false,
                dev_tools: None,
                view_source: None,
                frames: BTreeMap::new(),
                on_activate_after: None,
            }),
        })
    }

    // ===== Accessors =====

    /// Window id, once an engine has been attached.
    pub fn id(&self) -> Option<WindowId> {
        self.id.get().copied()
    }

    pub fn kind(&self) -> WindowKind {
        self.lock().kind
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lock().state
    }

    pub fn is_closing(&self) -> bool {
        self.is_closing.load(Ordering::SeqCst)
    }

    pub fn can_close(&self) -> bool {
        self.can_close.load(Ordering::SeqCst)
    }

    pub fn property(&self) -> WindowProperty {
        self.lock().property.clone()
    }

    pub fn set_property(&self, property: WindowProperty) {
        self.lock().property = property;
    }

    pub fn name(&self) -> Option<String> {
        self.lock().name.clone()
    }

    /// Last title reported by the engine (or the property title).
    pub fn title(&self) -> String {
        self.lock().title.clone()
    }

    pub fn engine(&self) -> Option<Arc<dyn BrowserEngine>> {
        self.lock().engine.clone()
    }

    pub fn surface(&self) -> Option<Arc<dyn EmbeddingSurface>> {
        self.lock().surface.clone()
    }

    pub fn window(&self) -> Option<Arc<dyn ToolkitWindow>> {
        self.lock().window.clone()
    }

    pub fn dev_tools(&self) -> Option<Arc<WindowController>> {
        self.lock().dev_tools.clone()
    }

    pub fn view_source_window(&self) -> Option<Arc<WindowController>> {
        self.lock().view_source.clone()
    }

    /// Frames the engine reported for this browser, by frame id.
    pub fn frames(&self) -> Vec<Frame> {
        self.lock().frames.values().cloned().collect()
    }

    pub fn hooks(&self) -> &WindowHooks {
        &self.hooks
    }

    /// Add a hook without replacing the default behavior. Returning
    /// `Ok(true)` from the hook skips the default.
    pub fn register_hook<E, F>(&self, event: E, hook: F)
    where
        E: HookEvent,
        F: Fn(&mut E::Args) -> HookResult + Send + Sync + 'static,
    {
        self.hooks.register(event, hook);
    }

    /// Run `callback` after every activate, whether or not the default ran.
    pub fn set_on_activate_after<F>(&self, callback: F)
    where
        F: Fn(&WindowController) + Send + Sync + 'static,
    {
        self.lock().on_activate_after = Some(Arc::new(callback));
    }

    pub(crate) fn set_kind(&self, kind: WindowKind) {
        self.lock().kind = kind;
    }

    fn is_destroyed(&self) -> bool {
        self.lock().state == LifecycleState::Destroyed
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ===== Construction =====

    /// Build the toolkit window. Runs once; later calls do nothing.
    pub fn form_create(&self) {
        let property = {
            let inner = self.lock();
            if inner.state != LifecycleState::Uninitialized {
                return;
            }
            inner.property.clone()
        };

        let window = self.shared.backend.create_window(&property);
        let name = format!("browser_window_{}", Uuid::new_v4().simple());
        window.set_name(&name);
        if !property.title.is_empty() {
            window.set_title(&property.title);
        }
        window.center();

        let mut inner = self.lock();
        if inner.state != LifecycleState::Uninitialized {
            return;
        }
        inner.window = Some(window);
        inner.name = Some(name);
        inner.advance(LifecycleState::FormReady);
    }

    /// Give the window an engine: allocate its id, build the engine handle
    /// and embedding surface, wire focus bridging and publish the controller
    /// in the registry. Runs once; later calls return the existing id.
    pub fn attach_engine(self: &Arc<Self>, default_url: Option<&str>) -> Result<WindowId> {
        if let Some(id) = self.id() {
            return Ok(id);
        }
        self.form_create();

        let (kind, window) = {
            let inner = self.lock();
            if inner.state != LifecycleState::FormReady {
                return Err(Error::NotAttached);
            }
            match &inner.window {
                Some(window) => (inner.kind, Arc::clone(window)),
                None => return Err(Error::NotAttached),
            }
        };

        let id = self.shared.registry.next_id();
        if self.id.set(id).is_err() {
            return self.id().ok_or(Error::NotAttached);
        }

        let options = EngineOptions {
            default_url: default_url.map(str::to_string),
            multi_browser_mode: true,
            independent_events: kind == WindowKind::PopupSubBrowser,
        };
        let engine = self.shared.backend.create_engine(&options);
        let surface = match self.surface() {
            Some(surface) => surface,
            None => self.bridged_surface(&window),
        };

        {
            let mut inner = self.lock();
            inner.engine = Some(engine);
            inner.surface = Some(surface);
            inner.advance(LifecycleState::EngineCreating);
        }

        if let Err(e) = self.shared.registry.put(id, Arc::clone(self)) {
            log::error!("[window {id}] {e}");
            return Err(e);
        }
        log::debug!("[window {id}] engine attached ({kind:?})");
        Ok(id)
    }

    /// Build the embedding surface ahead of `attach_engine`, so attaching
    /// later touches no toolkit object. UI thread only.
    pub(crate) fn prepare_surface(self: &Arc<Self>) {
        let Some(window) = self.window() else { return };
        if self.surface().is_some() {
            return;
        }
        let surface = self.bridged_surface(&window);
        self.lock().surface = Some(surface);
    }

    /// New surface with enter/exit focus forwarded to the engine.
    fn bridged_surface(self: &Arc<Self>, window: &Arc<dyn ToolkitWindow>) -> Arc<dyn EmbeddingSurface> {
        let surface = window.create_surface();
        let weak = Arc::downgrade(self);
        surface.set_focus_listener(Box::new(move |change| {
            if let Some(controller) = weak.upgrade() {
                controller.on_surface_focus(change);
            }
        }));
        surface
    }

    // ===== Toolkit events (UI thread) =====

    pub fn on_show(&self) {
        let Some(mut event) = self.window_event() else { return };
        if self.hooks.show.fire(&mut event) {
            return;
        }
        if let Some(surface) = self.surface() {
            self.shared.dispatcher.post(move || surface.update_size());
        }
    }

    pub fn on_resize(&self) {
        let Some(mut event) = self.window_event() else { return };
        if self.hooks.resize.fire(&mut event) {
            return;
        }
        if self.is_closing() || event.kind == WindowKind::DevTools {
            return;
        }
        let (engine, surface) = {
            let inner = self.lock();
            (inner.engine.clone(), inner.surface.clone())
        };
        if let Some(engine) = engine {
            engine.notify_move_or_resize_started();
        }
        if let Some(surface) = surface {
            surface.update_size();
        }
    }

    pub fn on_activate(&self) {
        let Some(mut event) = self.window_event() else { return };
        let suppressed = self.hooks.activate.fire(&mut event);
        if !suppressed && !self.is_closing() && event.kind != WindowKind::DevTools {
            self.create_browser_once();
        }

        let after = self.lock().on_activate_after.clone();
        if let Some(after) = after {
            after(self);
        }
    }

    /// Toolkit close query. Returns whether the toolkit may close the window.
    pub fn on_close_query(self: &Arc<Self>) -> bool {
        let (state, kind, surface) = {
            let inner = self.lock();
            (inner.state, inner.kind, inner.surface.clone())
        };
        if state == LifecycleState::Destroyed {
            return true;
        }

        let mut args = CloseQueryArgs {
            id: self.id(),
            kind,
            allow: true,
        };
        if self.hooks.close_query.fire(&mut args) {
            return args.allow;
        }
        log::debug!("[window {:?}] onCloseQuery ({kind:?})", self.id());

        if state < LifecycleState::EngineCreating {
            self.is_closing.store(true, Ordering::SeqCst);
            return true;
        }
        let allow = self
            .shared
            .sequencer
            .close_query(kind, self.can_close(), surface.as_ref());
        self.begin_close();
        // A browser that never existed was discarded outright; nothing is
        // left for the engine to confirm.
        if self.lock().state >= LifecycleState::PendingDestroy {
            return true;
        }
        allow
    }

    /// Toolkit close. Returns what the toolkit should do with the window.
    pub fn on_close(&self, action: CloseAction) -> CloseAction {
        if self.is_destroyed() {
            return action;
        }
        let mut args = CloseArgs {
            id: self.id(),
            action,
        };
        if !self.hooks.close.fire(&mut args) {
            args.action = CloseAction::Free;
        }

        let engineless = {
            let inner = self.lock();
            inner.engine.is_none() && inner.state < LifecycleState::PendingDestroy
        };
        if args.action == CloseAction::Free && engineless {
            self.is_closing.store(true, Ordering::SeqCst);
            self.finalize(None);
        }
        args.action
    }

    fn on_surface_focus(&self, change: FocusChange) {
        if self.is_closing() {
            return;
        }
        let Some(engine) = self.engine() else { return };
        match change {
            FocusChange::Enter => engine.set_focus(true),
            FocusChange::Exit => engine.send_capture_lost_event(),
        }
    }

    // ===== Commands =====

    /// Close this window. Safe to call from any thread; the work is posted
    /// to the UI thread.
    pub fn close_window(self: &Arc<Self>) {
        if self.is_closing() || self.is_destroyed() {
            return;
        }
        let this = Arc::clone(self);
        self.shared.dispatcher.post(move || {
            let kind = this.kind();
            if this.shared.sequencer.policy().close_through_toolkit(kind) {
                if let Some(window) = this.window() {
                    window.close();
                    return;
                }
            }
            this.close_now();
        });
    }

    /// Start closing right away. UI thread only.
    pub fn close_now(self: &Arc<Self>) {
        let state = self.lock().state;
        if state >= LifecycleState::EngineCreating {
            self.begin_close();
            return;
        }
        if state == LifecycleState::Destroyed || self.is_closing.swap(true, Ordering::SeqCst) {
            return;
        }
        let window = {
            let mut inner = self.lock();
            inner.advance(LifecycleState::Closing);
            inner.window.take()
        };
        if let Some(window) = window {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| window.close())) {
                self.finalize(None);
                panic::resume_unwind(payload);
            }
        }
        self.finalize(None);
    }

    pub fn show_window(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.shared.dispatcher.post(move || {
            if let Some(window) = this.window() {
                window.show();
            }
        });
    }

    pub fn hide_window(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.shared.dispatcher.post(move || {
            if let Some(window) = this.window() {
                window.hide();
            }
        });
    }

    pub fn minimize(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.shared.dispatcher.post(move || {
            if let Some(window) = this.window() {
                window.set_show_state(WindowShowState::Minimized);
            }
        });
    }

    /// Toggle between maximized and restored on the UI thread.
    pub fn maximize(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.shared.dispatcher.post(move || this.toggle_maximize());
    }

    fn toggle_maximize(&self) {
        let Some(window) = self.window() else { return };

        if window.is_borderless() {
            // No native maximize without decorations: swap between the saved
            // geometry and the work area by hand.
            let current = window.bounds();
            let area = window.work_area();
            let target = {
                let mut inner = self.lock();
                if inner.property.window_state == WindowShowState::Maximized {
                    inner.property.window_state = WindowShowState::Normal;
                    inner.property.bounds()
                } else {
                    inner.property.save_bounds(current);
                    inner.property.window_state = WindowShowState::Maximized;
                    Rect::new(area.x, area.y, area.width - 1, area.height - 1)
                }
            };
            window.set_bounds(target);
            return;
        }

        match window.show_state() {
            WindowShowState::Maximized => {
                window.set_show_state(WindowShowState::Normal);
                if self.shared.sequencer.platform() == Platform::Hierarchical {
                    // Cocoa keeps the zoomed frame unless it is cycled once.
                    window.set_show_state(WindowShowState::Maximized);
                    window.set_show_state(WindowShowState::Normal);
                }
            }
            WindowShowState::Normal => window.set_show_state(WindowShowState::Maximized),
            WindowShowState::Minimized => {}
        }
        self.lock().property.window_state = window.show_state();
    }

    /// Open (or bring back) the DevTools window for this browser. UI thread only.
    pub fn show_dev_tools(self: &Arc<Self>) -> Option<Arc<WindowController>> {
        if self.is_closing() {
            return None;
        }
        let (existing, engine, property) = {
            let inner = self.lock();
            (inner.dev_tools.clone(), inner.engine.clone(), inner.property.clone())
        };
        if let Some(dev_tools) = existing.filter(|d| !d.is_destroyed() && !d.is_closing()) {
            if let Some(window) = dev_tools.window() {
                window.show();
            }
            return Some(dev_tools);
        }
        let engine = engine?;

        let dev_tools = WindowController::new(
            Arc::clone(&self.shared),
            WindowKind::DevTools,
            WindowProperty {
                title: format!("DevTools - {}", self.title()),
                url: None,
                ..property
            },
        );
        dev_tools.form_create();
        let window = dev_tools.window()?;
        let surface = window.create_surface();
        engine.show_dev_tools(surface.as_ref());
        dev_tools.lock().surface = Some(surface);
        window.show();

        self.lock().dev_tools = Some(Arc::clone(&dev_tools));
        Some(dev_tools)
    }

    /// Open a registered view-source window for the current page.
    pub fn view_source(self: &Arc<Self>) -> Result<Arc<WindowController>> {
        if let Some(existing) = self
            .view_source_window()
            .filter(|v| !v.is_destroyed() && !v.is_closing())
        {
            existing.show_window();
            return Ok(existing);
        }
        let engine = self.engine().ok_or(Error::NotAttached)?;
        let url = engine.current_url().unwrap_or_default();

        let property = WindowProperty {
            title: format!("ViewSource - {}", self.title()),
            url: Some(format!("view-source:{url}")),
            ..self.property()
        };
        let view_source =
            WindowController::new(Arc::clone(&self.shared), WindowKind::ViewSource, property);
        view_source.form_create();
        view_source.attach_engine(Some(&format!("view-source:{url}")))?;
        view_source.show_window();

        self.lock().view_source = Some(Arc::clone(&view_source));
        Ok(view_source)
    }

    // ===== Engine signals (any thread) =====

    pub fn on_after_created(&self) {
        let Some(id) = self.engine_signal_id("afterCreated") else { return };
        log::debug!("[window {id}] chromium.onAfterCreated");
        self.hooks.after_created.fire(&mut BrowserArgs { id });
    }

    /// The engine wants to close the browser. Returns the action it should take.
    pub fn on_engine_close(&self) -> EngineCloseAction {
        let Some(id) = self.engine_signal_id("onClose") else {
            return EngineCloseAction::Close;
        };
        log::debug!("[window {id}] chromium.onClose");

        if !self.is_closing.swap(true, Ordering::SeqCst) {
            let window = {
                let mut inner = self.lock();
                inner.advance(LifecycleState::Closing);
                inner.window.clone()
            };
            if let Some(window) = window {
                self.shared.dispatcher.post(move || window.hide());
            }
        }

        let (kind, surface) = {
            let mut inner = self.lock();
            (inner.kind, inner.surface.take())
        };
        let action = self.shared.sequencer.engine_close(kind, surface);

        let mut args = EngineCloseArgs { id, action };
        self.hooks.engine_close.fire(&mut args);
        args.action
    }

    /// The engine is done with the browser. Teardown starts here and cannot
    /// be suppressed.
    pub fn on_before_close(self: &Arc<Self>) {
        let Some(id) = self.engine_signal_id("beforeClose") else { return };
        log::debug!("[window {id}] chromium.onBeforeClose");

        self.can_close.store(true, Ordering::SeqCst);
        self.is_closing.store(true, Ordering::SeqCst);

        let (kind, window, engine, auxiliaries) = {
            let mut inner = self.lock();
            if inner.state >= LifecycleState::PendingDestroy {
                log::warn!("[window {id}] duplicate beforeClose ignored");
                return;
            }
            inner.advance(LifecycleState::PendingDestroy);
            inner.frames.clear();
            let auxiliaries = inner.auxiliaries();
            (inner.kind, inner.window.take(), inner.engine.take(), auxiliaries)
        };

        self.shared.registry.remove(id);

        let this = Arc::clone(self);
        self.shared
            .sequencer
            .schedule_destroy(kind, window, auxiliaries, move || this.finalize(engine));

        self.hooks.before_close.fire(&mut BrowserArgs { id });
    }

    pub fn on_frame_created(self: &Arc<Self>, frame: Frame) {
        let Some(id) = self.engine_signal_id("frameCreated") else { return };
        {
            let this = Arc::clone(self);
            let frame = frame.clone();
            self.shared.dispatcher.post(move || {
                let mut inner = this.lock();
                if inner.state < LifecycleState::PendingDestroy {
                    inner.frames.insert(frame.id, frame);
                }
            });
        }
        self.hooks.frame_created.fire(&mut FrameArgs { id, frame });
    }

    pub fn on_frame_detached(&self, frame: Frame) {
        let Some(id) = self.engine_signal_id("frameDetached") else { return };
        self.lock().frames.remove(&frame.id);
        self.hooks.frame_detached.fire(&mut FrameArgs { id, frame });
    }

    /// Returns true to cancel the navigation.
    pub fn on_before_browser(&self, frame: Frame) -> bool {
        let Some(id) = self.engine_signal_id("beforeBrowser") else { return false };
        let mut args = BeforeBrowserArgs {
            id,
            frame,
            cancel: false,
        };
        self.hooks.before_browser.fire(&mut args);
        args.cancel
    }

    pub fn on_title_change(self: &Arc<Self>, title: &str) {
        let Some(id) = self.engine_signal_id("titleChange") else { return };
        let mut args = TitleArgs {
            id,
            title: title.to_string(),
        };
        let suppressed = self.hooks.title_change.fire(&mut args);

        let auxiliaries = {
            let mut inner = self.lock();
            inner.title = args.title.clone();
            [inner.dev_tools.clone(), inner.view_source.clone()]
        };
        if suppressed {
            return;
        }
        for aux in auxiliaries.into_iter().flatten() {
            let title = args.title.clone();
            self.shared.dispatcher.post(move || {
                let caption = match aux.kind() {
                    WindowKind::DevTools => format!("DevTools - {title}"),
                    _ => format!("ViewSource - {title}"),
                };
                if let Some(window) = aux.window() {
                    window.set_title(&caption);
                }
            });
        }
    }

    /// Returns whether the key was consumed.
    pub fn on_key_event(self: &Arc<Self>, event: KeyEvent) -> bool {
        let Some(id) = self.engine_signal_id("keyEvent") else { return false };
        let mut args = KeyArgs {
            id,
            event,
            handled: false,
        };
        if self.hooks.key_event.fire(&mut args) {
            return args.handled;
        }

        let kind = self.kind();
        if self.shared.config.enable_dev_tools
            && !kind.is_auxiliary()
            && args.event.windows_key_code == VK_F12
        {
            match args.event.kind {
                KeyEventKind::RawKeyDown => {
                    let this = Arc::clone(self);
                    self.shared.dispatcher.post(move || {
                        this.show_dev_tools();
                    });
                    args.handled = true;
                }
                KeyEventKind::KeyUp => args.handled = true,
                _ => {}
            }
        }
        args.handled
    }

    pub fn on_loading_state_change(&self, is_loading: bool, can_go_back: bool, can_go_forward: bool) {
        let Some(id) = self.engine_signal_id("loadingStateChange") else { return };
        self.hooks.loading_state_change.fire(&mut LoadingArgs {
            id,
            is_loading,
            can_go_back,
            can_go_forward,
        });
    }

    /// Returns whether a hook handled the message.
    pub fn on_process_message_received(
        &self,
        frame: Option<Frame>,
        source: ProcessId,
        message: ProcessMessage,
    ) -> bool {
        let Some(id) = self.engine_signal_id("processMessageReceived") else { return false };
        let mut args = ProcessMessageArgs {
            id,
            frame,
            source,
            message,
            handled: false,
        };
        self.hooks.process_message_received.fire(&mut args);
        args.handled
    }

    /// The engine's before-popup signal for a browser hosted here.
    pub fn request_popup(self: &Arc<Self>, target_url: &str) -> PopupDecision {
        if !self.shared.config.enable_window_popup {
            log::debug!("[window {:?}] popup to {target_url} rejected: popups disabled", self.id());
            return PopupDecision::Rejected(RejectReason::Disabled);
        }
        // Only pre-built popups are handed out: this may run on an engine
        // thread, where no toolkit window may be created.
        let Some(popup) = self.shared.popups.acquire() else {
            log::debug!("[window {:?}] popup to {target_url} rejected: pool exhausted", self.id());
            return PopupDecision::Rejected(RejectReason::PoolExhausted);
        };

        popup.set_kind(WindowKind::PopupSubBrowser);
        if let Err(e) = popup.attach_engine(Some(target_url)) {
            log::warn!("[popup] attach failed: {e}");
            popup.discard();
            return PopupDecision::Rejected(RejectReason::AttachFailed);
        }

        let mut args = PopupArgs {
            source_id: self.id(),
            target_url: target_url.to_string(),
            popup: Arc::clone(&popup),
            no_javascript_access: false,
        };
        if self.hooks.before_popup.fire(&mut args) {
            popup.discard();
            return PopupDecision::Rejected(RejectReason::Vetoed);
        }

        let shown = Arc::clone(&popup);
        self.shared.dispatcher.post(move || {
            let modal = shown.property().is_show_modal;
            if let Some(window) = shown.window() {
                if modal {
                    window.show_modal();
                } else {
                    window.show();
                }
            }
        });
        PopupDecision::Accepted {
            popup,
            no_javascript_access: args.no_javascript_access,
        }
    }

    // ===== Internals =====

    fn window_event(&self) -> Option<WindowEvent> {
        let inner = self.lock();
        if inner.state == LifecycleState::Destroyed {
            return None;
        }
        Some(WindowEvent {
            id: self.id(),
            kind: inner.kind,
        })
    }

    /// Id for an engine signal, or `None` (logged) if the window cannot take it.
    fn engine_signal_id(&self, signal: &'static str) -> Option<WindowId> {
        match self.id() {
            Some(id) if !self.is_destroyed() => Some(id),
            id => {
                let violation = Error::ProtocolViolation {
                    id: id.unwrap_or_default(),
                    signal,
                };
                log::warn!("[engine] {violation}");
                None
            }
        }
    }

    fn create_browser_once(&self) {
        let (engine, surface) = {
            let mut inner = self.lock();
            if inner.state != LifecycleState::EngineCreating || inner.browser_requested {
                return;
            }
            let (Some(engine), Some(surface)) = (inner.engine.clone(), inner.surface.clone()) else {
                return;
            };
            inner.advance(LifecycleState::EngineReady);
            inner.browser_requested = true;
            (engine, surface)
        };
        if engine.initialized() {
            return;
        }
        let created = engine.create_browser(surface.as_ref());
        log::debug!("[window {:?}] createBrowser => {created}", self.id());
    }

    /// Latch closing, hide the window and ask the engine to close. Returns
    /// false if closing had already started. UI thread only.
    fn begin_close(self: &Arc<Self>) -> bool {
        if self.is_closing.swap(true, Ordering::SeqCst) {
            return false;
        }
        let (window, engine, requested) = {
            let mut inner = self.lock();
            inner.advance(LifecycleState::Closing);
            (inner.window.clone(), inner.engine.clone(), inner.browser_requested)
        };
        if let Some(window) = window {
            window.hide();
        }
        match engine {
            Some(engine) if requested || engine.initialized() => engine.close_browser(true),
            // No browser was ever created, so no engine close signals will come.
            _ => self.discard(),
        }
        true
    }

    /// Tear down a window whose browser never came to life: deregister now,
    /// then close the native window and release handles on the UI thread.
    pub(crate) fn discard(self: &Arc<Self>) {
        self.is_closing.store(true, Ordering::SeqCst);
        let (kind, window, engine, auxiliaries) = {
            let mut inner = self.lock();
            if inner.state >= LifecycleState::PendingDestroy {
                return;
            }
            inner.advance(LifecycleState::PendingDestroy);
            inner.frames.clear();
            let auxiliaries = inner.auxiliaries();
            (inner.kind, inner.window.take(), inner.engine.take(), auxiliaries)
        };
        if let Some(id) = self.id() {
            self.shared.registry.remove(id);
        }
        log::debug!("[window {:?}] discarded before the browser was created", self.id());

        let this = Arc::clone(self);
        self.shared
            .sequencer
            .schedule_destroy(kind, window, auxiliaries, move || this.finalize(engine));
    }

    /// Terminal step: release everything still held.
    fn finalize(&self, engine: Option<Arc<dyn BrowserEngine>>) {
        let (kind, surface, window, engine, auxiliaries) = {
            let mut inner = self.lock();
            if inner.state == LifecycleState::Destroyed {
                return;
            }
            inner.state = LifecycleState::Destroyed;
            inner.frames.clear();
            inner.on_activate_after = None;
            let auxiliaries = inner.auxiliaries();
            (
                inner.kind,
                inner.surface.take(),
                inner.window.take(),
                engine.or_else(|| inner.engine.take()),
                auxiliaries,
            )
        };
        if let Some(surface) = surface {
            surface.free();
        }
        if kind == WindowKind::PopupSubBrowser {
            self.shared.popups.release();
            self.shared.refill_popups();
        }
        drop(engine);
        drop(window);
        if !auxiliaries.is_empty() {
            crate::sequencer::teardown_auxiliaries(auxiliaries);
        }
        log::debug!("[window {:?}] destroyed", self.id());
    }
}
