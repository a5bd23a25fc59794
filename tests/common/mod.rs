// Recording mock backend shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use browser_window::{
    Backend, BrowserEngine, BrowserWindowConfig, BrowserWindows, EmbeddingSurface, EngineOptions,
    FocusChange, MainThreadQueue, Platform, Rect, ToolkitWindow, WindowProperty, WindowShowState,
};

/// Ordered log of every collaborator call, as `"<handle>:<call>"`.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    /// Calls named `call` on any handle.
    pub fn count_call(&self, call: &str) -> usize {
        let suffix = format!(":{call}");
        self.events().iter().filter(|e| e.ends_with(&suffix)).count()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    pub fn has(&self, event: &str) -> bool {
        self.position(event).is_some()
    }
}

type FocusListener = Box<dyn Fn(FocusChange) + Send + Sync>;

pub struct MockSurface {
    pub label: String,
    rec: Arc<Recorder>,
    listener: Mutex<Option<FocusListener>>,
}

impl MockSurface {
    /// Simulate the toolkit moving focus onto or off the surface.
    pub fn focus(&self, change: FocusChange) {
        if let Some(listener) = self.listener.lock().unwrap().as_ref() {
            listener(change);
        }
    }
}

impl EmbeddingSurface for MockSurface {
    fn update_size(&self) {
        self.rec.push(format!("{}:update_size", self.label));
    }

    fn destroy_child_window(&self) -> bool {
        self.rec.push(format!("{}:destroy_child_window", self.label));
        true
    }

    fn free(&self) {
        self.rec.push(format!("{}:free", self.label));
    }

    fn set_focus_listener(&self, listener: FocusListener) {
        *self.listener.lock().unwrap() = Some(listener);
    }
}

pub struct MockWindow {
    pub label: String,
    rec: Arc<Recorder>,
    surfaces: Arc<Mutex<Vec<Arc<MockSurface>>>>,
    bounds: Mutex<Rect>,
    state: Mutex<WindowShowState>,
    pub borderless: AtomicBool,
    pub panic_on_close: AtomicBool,
    pub title: Mutex<String>,
}

impl ToolkitWindow for MockWindow {
    fn set_name(&self, name: &str) {
        self.rec.push(format!("{}:set_name({name})", self.label));
    }

    fn set_title(&self, title: &str) {
        *self.title.lock().unwrap() = title.to_string();
        self.rec.push(format!("{}:set_title({title})", self.label));
    }

    fn center(&self) {
        self.rec.push(format!("{}:center", self.label));
    }

    fn show(&self) {
        self.rec.push(format!("{}:show", self.label));
    }

    fn show_modal(&self) {
        self.rec.push(format!("{}:show_modal", self.label));
    }

    fn hide(&self) {
        self.rec.push(format!("{}:hide", self.label));
    }

    fn close(&self) {
        if self.panic_on_close.load(Ordering::SeqCst) {
            panic!("{} refused to close", self.label);
        }
        self.rec.push(format!("{}:close", self.label));
    }

    fn post_close(&self) {
        self.rec.push(format!("{}:post_close", self.label));
    }

    fn bounds(&self) -> Rect {
        *self.bounds.lock().unwrap()
    }

    fn set_bounds(&self, bounds: Rect) {
        *self.bounds.lock().unwrap() = bounds;
        self.rec.push(format!("{}:set_bounds", self.label));
    }

    fn show_state(&self) -> WindowShowState {
        *self.state.lock().unwrap()
    }

    fn set_show_state(&self, state: WindowShowState) {
        *self.state.lock().unwrap() = state;
        self.rec.push(format!("{}:set_show_state({state:?})", self.label));
    }

    fn work_area(&self) -> Rect {
        Rect::new(0, 0, 1920, 1080)
    }

    fn is_borderless(&self) -> bool {
        self.borderless.load(Ordering::SeqCst)
    }

    fn create_surface(&self) -> Arc<dyn EmbeddingSurface> {
        let mut surfaces = self.surfaces.lock().unwrap();
        let surface = Arc::new(MockSurface {
            label: format!("s{}", surfaces.len()),
            rec: Arc::clone(&self.rec),
            listener: Mutex::new(None),
        });
        surfaces.push(Arc::clone(&surface));
        surface
    }
}

pub struct MockEngine {
    pub label: String,
    pub options: EngineOptions,
    rec: Arc<Recorder>,
    pub initialized: AtomicBool,
    pub url: Mutex<Option<String>>,
}

impl BrowserEngine for MockEngine {
    fn create_browser(&self, _surface: &dyn EmbeddingSurface) -> bool {
        self.rec.push(format!("{}:create_browser", self.label));
        true
    }

    fn close_browser(&self, force: bool) {
        self.rec.push(format!("{}:close_browser({force})", self.label));
    }

    fn initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn notify_move_or_resize_started(&self) {
        self.rec.push(format!("{}:notify_move_or_resize_started", self.label));
    }

    fn set_focus(&self, focus: bool) {
        self.rec.push(format!("{}:set_focus({focus})", self.label));
    }

    fn send_capture_lost_event(&self) {
        self.rec.push(format!("{}:capture_lost", self.label));
    }

    fn show_dev_tools(&self, _surface: &dyn EmbeddingSurface) {
        self.rec.push(format!("{}:show_dev_tools", self.label));
    }

    fn current_url(&self) -> Option<String> {
        self.url.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct MockBackend {
    pub rec: Arc<Recorder>,
    pub windows: Mutex<Vec<Arc<MockWindow>>>,
    pub engines: Mutex<Vec<Arc<MockEngine>>>,
    pub surfaces: Arc<Mutex<Vec<Arc<MockSurface>>>>,
}

impl MockBackend {
    pub fn window(&self, index: usize) -> Arc<MockWindow> {
        Arc::clone(&self.windows.lock().unwrap()[index])
    }

    pub fn engine(&self, index: usize) -> Arc<MockEngine> {
        Arc::clone(&self.engines.lock().unwrap()[index])
    }

    pub fn surface(&self, index: usize) -> Arc<MockSurface> {
        Arc::clone(&self.surfaces.lock().unwrap()[index])
    }

    pub fn window_count(&self) -> usize {
        self.windows.lock().unwrap().len()
    }

    pub fn engine_count(&self) -> usize {
        self.engines.lock().unwrap().len()
    }
}

impl Backend for MockBackend {
    fn create_window(&self, property: &WindowProperty) -> Arc<dyn ToolkitWindow> {
        let mut windows = self.windows.lock().unwrap();
        let window = Arc::new(MockWindow {
            label: format!("w{}", windows.len()),
            rec: Arc::clone(&self.rec),
            surfaces: Arc::clone(&self.surfaces),
            bounds: Mutex::new(property.bounds()),
            state: Mutex::new(WindowShowState::Normal),
            borderless: AtomicBool::new(false),
            panic_on_close: AtomicBool::new(false),
            title: Mutex::new(String::new()),
        });
        windows.push(Arc::clone(&window));
        window
    }

    fn create_engine(&self, options: &EngineOptions) -> Arc<dyn BrowserEngine> {
        let mut engines = self.engines.lock().unwrap();
        let engine = Arc::new(MockEngine {
            label: format!("e{}", engines.len()),
            options: options.clone(),
            rec: Arc::clone(&self.rec),
            initialized: AtomicBool::new(false),
            url: Mutex::new(options.default_url.clone()),
        });
        engines.push(Arc::clone(&engine));
        engine
    }
}

pub struct Harness {
    pub queue: MainThreadQueue,
    pub windows: BrowserWindows,
    pub backend: Arc<MockBackend>,
}

impl Harness {
    pub fn rec(&self) -> &Recorder {
        &self.backend.rec
    }

    pub fn drain(&self) -> usize {
        self.queue.run_until_idle()
    }
}

pub fn harness(platform: Platform) -> Harness {
    harness_with(BrowserWindowConfig {
        platform: Some(platform),
        ..BrowserWindowConfig::default()
    })
}

pub fn harness_with(config: BrowserWindowConfig) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let queue = MainThreadQueue::new();
    let backend = Arc::new(MockBackend::default());
    let windows = BrowserWindows::new(config, Arc::clone(&backend) as Arc<dyn Backend>, &queue);
    Harness {
        queue,
        windows,
        backend,
    }
}
