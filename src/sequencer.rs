// Platform close sequencer
//
// The desktop platforms disagree about when the embedding surface may go
// away relative to the engine. Each close model is a `ClosePolicy`; the
// `CloseSequencer` executes a policy's decisions against the controller's
// handles. The policy is picked once at startup, so the controller's state
// machine has no platform branches.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{EmbeddingSurface, EngineCloseAction, ToolkitWindow};
use crate::controller::WindowController;
use crate::dispatch::Dispatcher;
use crate::error::{panic_message, Error};
use crate::state::window::WindowKind;

/// Close model of the host platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Platform {
    /// The engine is told to delay; the surface is freed first (Windows).
    DelayedClose,
    /// The engine closes immediately; surface freed on the next turn (Linux).
    ImmediateClose,
    /// Child surfaces are torn down before their parent (macOS).
    Hierarchical,
}

impl Platform {
    /// Close model of the compile target.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::DelayedClose
        } else if cfg!(target_os = "macos") {
            Platform::Hierarchical
        } else {
            Platform::ImmediateClose
        }
    }

    pub fn close_policy(self) -> Arc<dyn ClosePolicy> {
        match self {
            Platform::DelayedClose => Arc::new(DelayedClose),
            Platform::ImmediateClose => Arc::new(ImmediateClose),
            Platform::Hierarchical => Arc::new(Hierarchical),
        }
    }
}

/// Answer to a toolkit close query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CloseQueryPlan {
    pub allow: bool,
    pub destroy_children_first: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceTeardown {
    /// Freed by a task on the dispatch queue.
    Deferred,
    /// Freed inside the engine callback.
    Inline,
}

/// Reaction to the engine's close signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineClosePlan {
    pub action: EngineCloseAction,
    pub destroy_children_inline: bool,
    pub surface: SurfaceTeardown,
}

/// How the toolkit window is destroyed once the engine is done with it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DestroyMode {
    /// Queue a native close message.
    PostCloseMessage,
    /// Close through the toolkit right away.
    CloseNow,
}

pub trait ClosePolicy: Send + Sync {
    fn platform(&self) -> Platform;

    /// `can_close` is the latch set by the engine's before-close signal.
    fn close_query(&self, kind: WindowKind, can_close: bool) -> CloseQueryPlan;

    fn engine_close(&self, kind: WindowKind) -> EngineClosePlan;

    fn destroy_mode(&self, kind: WindowKind) -> DestroyMode;

    /// Whether an explicit close request goes through the toolkit's close
    /// path instead of closing the browser directly.
    fn close_through_toolkit(&self, _kind: WindowKind) -> bool {
        false
    }
}

pub struct DelayedClose;

impl ClosePolicy for DelayedClose {
    fn platform(&self) -> Platform {
        Platform::DelayedClose
    }

    fn close_query(&self, _kind: WindowKind, can_close: bool) -> CloseQueryPlan {
        CloseQueryPlan {
            allow: can_close,
            destroy_children_first: false,
        }
    }

    fn engine_close(&self, _kind: WindowKind) -> EngineClosePlan {
        EngineClosePlan {
            action: EngineCloseAction::Delay,
            destroy_children_inline: false,
            surface: SurfaceTeardown::Deferred,
        }
    }

    fn destroy_mode(&self, kind: WindowKind) -> DestroyMode {
        match kind {
            WindowKind::MainBrowser => DestroyMode::PostCloseMessage,
            _ => DestroyMode::CloseNow,
        }
    }
}

pub struct ImmediateClose;

impl ClosePolicy for ImmediateClose {
    fn platform(&self) -> Platform {
        Platform::ImmediateClose
    }

    fn close_query(&self, _kind: WindowKind, can_close: bool) -> CloseQueryPlan {
        CloseQueryPlan {
            allow: can_close,
            destroy_children_first: false,
        }
    }

    fn engine_close(&self, _kind: WindowKind) -> EngineClosePlan {
        EngineClosePlan {
            action: EngineCloseAction::Close,
            destroy_children_inline: false,
            surface: SurfaceTeardown::Deferred,
        }
    }

    fn destroy_mode(&self, _kind: WindowKind) -> DestroyMode {
        DestroyMode::CloseNow
    }
}

pub struct Hierarchical;

impl ClosePolicy for Hierarchical {
    fn platform(&self) -> Platform {
        Platform::Hierarchical
    }

    fn close_query(&self, kind: WindowKind, can_close: bool) -> CloseQueryPlan {
        match kind {
            WindowKind::MainBrowser => CloseQueryPlan {
                allow: true,
                destroy_children_first: true,
            },
            _ => CloseQueryPlan {
                allow: can_close,
                destroy_children_first: false,
            },
        }
    }

    fn engine_close(&self, _kind: WindowKind) -> EngineClosePlan {
        EngineClosePlan {
            action: EngineCloseAction::Close,
            destroy_children_inline: true,
            surface: SurfaceTeardown::Inline,
        }
    }

    fn destroy_mode(&self, _kind: WindowKind) -> DestroyMode {
        DestroyMode::CloseNow
    }

    fn close_through_toolkit(&self, kind: WindowKind) -> bool {
        kind == WindowKind::MainBrowser
    }
}

/// Runs a close policy against one controller's handles.
pub struct CloseSequencer {
    policy: Arc<dyn ClosePolicy>,
    dispatcher: Dispatcher,
}

impl CloseSequencer {
    pub fn new(policy: Arc<dyn ClosePolicy>, dispatcher: Dispatcher) -> Self {
        Self { policy, dispatcher }
    }

    pub fn policy(&self) -> &dyn ClosePolicy {
        self.policy.as_ref()
    }

    pub fn platform(&self) -> Platform {
        self.policy.platform()
    }

    /// Decide a close query, destroying child surfaces first where the
    /// platform requires it.
    pub fn close_query(
        &self,
        kind: WindowKind,
        can_close: bool,
        surface: Option<&Arc<dyn EmbeddingSurface>>,
    ) -> bool {
        let plan = self.policy.close_query(kind, can_close);
        if plan.destroy_children_first {
            if let Some(surface) = surface {
                let destroyed = surface.destroy_child_window();
                log::debug!("[close] closeQuery => destroy child window: {destroyed}");
            }
        }
        plan.allow
    }

    /// React to the engine's close signal. Takes ownership of the surface,
    /// which is freed inline or on the dispatch queue.
    pub fn engine_close(
        &self,
        kind: WindowKind,
        surface: Option<Arc<dyn EmbeddingSurface>>,
    ) -> EngineCloseAction {
        let plan = self.policy.engine_close(kind);
        let Some(surface) = surface else {
            return plan.action;
        };

        if plan.destroy_children_inline {
            let destroyed = surface.destroy_child_window();
            log::debug!("[close] onClose => destroy child window: {destroyed}");
        }
        match plan.surface {
            SurfaceTeardown::Inline => {
                surface.free();
                log::debug!("[close] onClose => surface freed inline");
            }
            SurfaceTeardown::Deferred => self.dispatcher.post(move || {
                surface.free();
                log::debug!("[close] onClose => surface freed");
            }),
        }
        plan.action
    }

    /// Post the final destroy: auxiliaries first, each behind its own guard,
    /// then the window itself, then `finalize`.
    pub fn schedule_destroy<F>(
        &self,
        kind: WindowKind,
        window: Option<Arc<dyn ToolkitWindow>>,
        auxiliaries: Vec<Arc<WindowController>>,
        finalize: F,
    ) where
        F: FnOnce() + Send + 'static,
    {
        let mode = self.policy.destroy_mode(kind);
        self.dispatcher.post(move || {
            teardown_auxiliaries(auxiliaries);
            if let Some(window) = window {
                match mode {
                    DestroyMode::PostCloseMessage => window.post_close(),
                    DestroyMode::CloseNow => window.close(),
                }
            }
            finalize();
        });
    }
}

/// Close every auxiliary window. One failing never stops the rest.
pub fn teardown_auxiliaries(auxiliaries: Vec<Arc<WindowController>>) -> usize {
    let mut failures = 0;
    for aux in auxiliaries {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| aux.close_now())) {
            failures += 1;
            let failure = Error::TeardownFailure {
                kind: aux.kind(),
                message: panic_message(payload.as_ref()),
            };
            log::warn!("[close] {failure}");
        }
    }
    failures
}
