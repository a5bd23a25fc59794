// Main-thread dispatch queue
//
// Anything that mutates toolkit objects runs here, on the thread that owns
// the toolkit, no matter which thread asked for it. `Dispatcher` is the
// cheap, cloneable posting side; `MainThreadQueue` is drained by the UI loop.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::panic_message;

/// A unit of UI-thread work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

type Waker = Arc<dyn Fn() + Send + Sync>;

struct QueueState {
    pending: AtomicUsize,
    waker: Mutex<Option<Waker>>,
}

/// Posting handle. Never blocks.
#[derive(Clone)]
pub struct Dispatcher {
    tx: UnboundedSender<Task>,
    state: Arc<QueueState>,
}

impl Dispatcher {
    /// Append `task` to the queue. If the queue is already gone (process
    /// teardown) the task is dropped.
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.state.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(Box::new(task)).is_err() {
            self.state.pending.fetch_sub(1, Ordering::SeqCst);
            log::trace!("[dispatch] queue closed, task dropped");
            return;
        }

        let waker = self
            .state
            .waker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(wake) = waker {
            wake();
        }
    }

    /// Tasks posted but not run yet.
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::SeqCst)
    }
}

/// Receiving side, drained on the UI thread one turn at a time.
pub struct MainThreadQueue {
    rx: Mutex<UnboundedReceiver<Task>>,
    dispatcher: Dispatcher,
}

impl MainThreadQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(QueueState {
            pending: AtomicUsize::new(0),
            waker: Mutex::new(None),
        });
        Self {
            rx: Mutex::new(rx),
            dispatcher: Dispatcher { tx, state },
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// Called after every post so the native loop can schedule a turn.
    pub fn set_waker<F>(&self, wake: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self
            .dispatcher
            .state
            .waker
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(wake));
    }

    pub fn pending(&self) -> usize {
        self.dispatcher.pending()
    }

    /// Run the tasks that were queued when the turn started, in FIFO order.
    ///
    /// Tasks posted while the turn runs wait for the next one. Calling this
    /// from inside a task is a no-op, so tasks never nest. Returns how many
    /// tasks ran.
    pub fn run_turn(&self) -> usize {
        let mut rx = match self.rx.try_lock() {
            Ok(rx) => rx,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return 0,
        };

        let budget = self.pending();
        let mut ran = 0;
        while ran < budget {
            let Ok(task) = rx.try_recv() else { break };
            self.dispatcher.state.pending.fetch_sub(1, Ordering::SeqCst);
            ran += 1;
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                log::error!(
                    "[dispatch] task panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
        ran
    }

    /// Keep running turns until the queue is empty.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_turn();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }
}

impl Default for MainThreadQueue {
    fn default() -> Self {
        Self::new()
    }
}
