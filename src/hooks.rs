// Event override chain
//
// Every toolkit event and engine signal a controller handles has an ordered
// list of user hooks. All hooks run on every firing, in registration order,
// and each may ask for the built-in default to be skipped. The default runs
// only when none of them did.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::backend::{EngineCloseAction, Frame, KeyEvent, ProcessId, ProcessMessage};
use crate::controller::WindowController;
use crate::error::{panic_message, Error, HookError};
use crate::state::window::{WindowId, WindowKind};

/// What a hook reports: `Ok(true)` skips the default body.
pub type HookResult = std::result::Result<bool, HookError>;

type Hook<A> = Arc<dyn Fn(&mut A) -> HookResult + Send + Sync>;

/// Ordered hooks for one logical event.
pub struct HookChain<A> {
    event: &'static str,
    hooks: Mutex<Vec<Hook<A>>>,
}

impl<A> HookChain<A> {
    pub fn new(event: &'static str) -> Self {
        Self {
            event,
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn event(&self) -> &'static str {
        self.event
    }

    /// Append a hook. Registration order is evaluation order.
    pub fn register<F>(&self, hook: F)
    where
        F: Fn(&mut A) -> HookResult + Send + Sync + 'static,
    {
        self.lock().push(Arc::new(hook));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run every hook against `args` and return whether the default should
    /// be skipped.
    ///
    /// The list is snapshotted first, so hooks may register more hooks (they
    /// take effect on the next firing) or close the window without deadlocking.
    /// A failing or panicking hook is logged and counts as "don't suppress".
    pub fn fire(&self, args: &mut A) -> bool {
        let hooks: Vec<Hook<A>> = self.lock().clone();
        let mut suppress = false;

        for (index, hook) in hooks.iter().enumerate() {
            let message = match panic::catch_unwind(AssertUnwindSafe(|| hook(&mut *args))) {
                Ok(Ok(skip)) => {
                    suppress |= skip;
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };
            let failure = Error::HookFailure {
                event: self.event,
                message,
            };
            log::warn!("[hooks] hook #{index}: {failure}");
        }

        suppress
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Hook<A>>> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ===== Hook arguments =====

/// Toolkit notification without payload (show, resize, activate).
#[derive(Debug, Clone)]
pub struct WindowEvent {
    pub id: Option<WindowId>,
    pub kind: WindowKind,
}

/// What the toolkit should do with a window once it is allowed to close.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseAction {
    None,
    Hide,
    Free,
    Minimize,
}

#[derive(Debug, Clone)]
pub struct CloseArgs {
    pub id: Option<WindowId>,
    pub action: CloseAction,
}

#[derive(Debug, Clone)]
pub struct CloseQueryArgs {
    pub id: Option<WindowId>,
    pub kind: WindowKind,
    /// Answer handed back to the toolkit when the default is suppressed.
    pub allow: bool,
}

#[derive(Debug, Clone)]
pub struct BrowserArgs {
    pub id: WindowId,
}

#[derive(Debug, Clone)]
pub struct EngineCloseArgs {
    pub id: WindowId,
    pub action: EngineCloseAction,
}

#[derive(Debug, Clone)]
pub struct FrameArgs {
    pub id: WindowId,
    pub frame: Frame,
}

pub struct PopupArgs {
    pub source_id: Option<WindowId>,
    pub target_url: String,
    /// The controller that will host the popup if nobody vetoes it.
    pub popup: Arc<WindowController>,
    pub no_javascript_access: bool,
}

#[derive(Debug, Clone)]
pub struct BeforeBrowserArgs {
    pub id: WindowId,
    pub frame: Frame,
    /// Set to cancel the navigation.
    pub cancel: bool,
}

#[derive(Debug, Clone)]
pub struct TitleArgs {
    pub id: WindowId,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct KeyArgs {
    pub id: WindowId,
    pub event: KeyEvent,
    pub handled: bool,
}

#[derive(Debug, Clone)]
pub struct LoadingArgs {
    pub id: WindowId,
    pub is_loading: bool,
    pub can_go_back: bool,
    pub can_go_forward: bool,
}

#[derive(Debug, Clone)]
pub struct ProcessMessageArgs {
    pub id: WindowId,
    pub frame: Option<Frame>,
    pub source: ProcessId,
    pub message: ProcessMessage,
    pub handled: bool,
}

// ===== Typed registration =====

/// Marker for an event hooks can be registered on.
pub trait HookEvent {
    type Args: 'static;

    fn chain(hooks: &WindowHooks) -> &HookChain<Self::Args>;
}

macro_rules! hook_events {
    ($($(#[$doc:meta])* $marker:ident => $field:ident : $args:ty),* $(,)?) => {
        /// Per-controller hook chains, one per event.
        pub struct WindowHooks {
            $(pub(crate) $field: HookChain<$args>,)*
        }

        impl WindowHooks {
            pub fn new() -> Self {
                Self {
                    $($field: HookChain::new(stringify!($field)),)*
                }
            }
        }

        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, Default)]
            pub struct $marker;

            impl HookEvent for $marker {
                type Args = $args;

                fn chain(hooks: &WindowHooks) -> &HookChain<$args> {
                    &hooks.$field
                }
            }
        )*
    };
}

hook_events! {
    /// Toolkit show.
    Show => show: WindowEvent,
    /// Toolkit resize.
    Resize => resize: WindowEvent,
    /// Toolkit activate.
    Activate => activate: WindowEvent,
    /// Toolkit close; hooks may change the action.
    Close => close: CloseArgs,
    /// Toolkit close query; hooks that suppress decide `allow`.
    CloseQuery => close_query: CloseQueryArgs,
    AfterCreated => after_created: BrowserArgs,
    /// Notified after teardown has been scheduled. Cannot be suppressed.
    BeforeClose => before_close: BrowserArgs,
    /// Notified after the platform picked the action; may override it.
    EngineClose => engine_close: EngineCloseArgs,
    FrameCreated => frame_created: FrameArgs,
    FrameDetached => frame_detached: FrameArgs,
    /// Suppressing vetoes the popup.
    BeforePopup => before_popup: PopupArgs,
    BeforeBrowser => before_browser: BeforeBrowserArgs,
    TitleChange => title_change: TitleArgs,
    /// Keyboard input reaching the browser.
    Key => key_event: KeyArgs,
    LoadingStateChange => loading_state_change: LoadingArgs,
    ProcessMessageReceived => process_message_received: ProcessMessageArgs,
}

impl WindowHooks {
    pub fn register<E, F>(&self, _event: E, hook: F)
    where
        E: HookEvent,
        F: Fn(&mut E::Args) -> HookResult + Send + Sync + 'static,
    {
        E::chain(self).register(hook);
    }
}

impl Default for WindowHooks {
    fn default() -> Self {
        Self::new()
    }
}
