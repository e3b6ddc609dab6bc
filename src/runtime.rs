//! Runtime management and initialization.

use std::{
    fmt,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
};

use tracing::{debug, warn};

use crate::{
    backend::LoopbackBackend,
    finder::{Finder, FinderOptions},
    framesync::FrameSync,
    handle::{HandleKind, Registry},
    receiver::{Receiver, ReceiverOptions},
    routing::{Routing, RoutingOptions},
    sender::{Sender, SenderOptions},
    sys::Backend,
    Error, Result,
};

/// State of the runtime lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Runtime has not been initialized yet.
    Uninitialized,
    /// Runtime is currently being initialized by another thread.
    Initializing,
    /// Runtime is initialized and active with the given reference count.
    Initialized { refcount: usize },
    /// Runtime is currently being destroyed.
    Destroying,
}

/// A backend plus its refcounted init/teardown bracket.
pub(crate) struct Runtime {
    backend: Arc<dyn Backend>,
    state: Mutex<State>,
    cv: Condvar,
    registry: Registry,
}

impl Runtime {
    fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            state: Mutex::new(State::Uninitialized),
            cv: Condvar::new(),
            registry: Registry::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self) -> Result<()> {
        let mut state = self.lock();

        loop {
            match *state {
                State::Uninitialized => {
                    *state = State::Initializing;
                    drop(state);

                    let ok = self.backend.initialize();

                    state = self.lock();
                    self.cv.notify_all();
                    if ok {
                        *state = State::Initialized { refcount: 1 };
                        debug!(backend = self.backend.name(), "runtime initialized");
                        return Ok(());
                    }
                    *state = State::Uninitialized;
                    warn!(backend = self.backend.name(), "runtime initialization failed");
                    return Err(Error::InitializationFailed(format!(
                        "{} backend failed to initialize",
                        self.backend.name()
                    )));
                }
                State::Initializing | State::Destroying => {
                    state = self.cv.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
                State::Initialized { refcount } => {
                    *state = State::Initialized {
                        refcount: refcount + 1,
                    };
                    return Ok(());
                }
            }
        }
    }

    /// Add a reference to an already initialized runtime.
    fn retain(&self) {
        let mut state = self.lock();
        match *state {
            State::Initialized { refcount } => {
                *state = State::Initialized {
                    refcount: refcount + 1,
                }
            }
            other => warn!(?other, "retain() on a runtime that is not initialized"),
        }
    }

    fn release(&self) {
        let mut state = self.lock();

        match *state {
            State::Initialized { refcount: 1 } => {
                *state = State::Destroying;
                drop(state);

                self.backend.destroy();

                state = self.lock();
                *state = State::Uninitialized;
                self.cv.notify_all();
                debug!(backend = self.backend.name(), "runtime torn down");
            }
            State::Initialized { refcount } => {
                *state = State::Initialized {
                    refcount: refcount - 1,
                };
            }
            other => warn!(?other, "release() called in invalid state"),
        }
    }

    fn is_running(&self) -> bool {
        matches!(*self.lock(), State::Initialized { .. })
    }
}

#[cfg(feature = "native")]
static NATIVE: once_cell::sync::Lazy<Arc<Runtime>> = once_cell::sync::Lazy::new(|| {
    Arc::new(Runtime::new(Arc::new(crate::backend::NdiBackend::new())))
});

/// Entry point and process-wide runtime reference.
///
/// Each `Ndi` value holds one reference on its runtime. The first reference
/// initializes the backend and the last one tears it down, so init and teardown each
/// happen exactly once per lifetime regardless of how many clones exist. Every
/// handle keeps its own `Ndi`, which means teardown cannot run while a handle is
/// alive.
///
/// ```no_run
/// use ndi_bridge::{Ndi, SenderOptions};
///
/// # async fn run() -> Result<(), ndi_bridge::Error> {
/// let ndi = Ndi::loopback()?;
/// let sender = ndi.open_sender(SenderOptions::builder("A").build()?).await?;
/// assert_eq!(sender.connections()?, 0);
/// # Ok(())
/// # }
/// ```
pub struct Ndi {
    runtime: Arc<Runtime>,
}

impl Ndi {
    /// Acquire the process-global runtime backed by the NDI SDK.
    ///
    /// # Errors
    ///
    /// [`Error::InitializationFailed`] if the SDK cannot be initialized.
    #[cfg(feature = "native")]
    pub fn new() -> Result<Self> {
        Self::acquire(Arc::clone(&NATIVE))
    }

    /// A fresh in-process network. Clones share it; separate calls do not.
    pub fn loopback() -> Result<Self> {
        Self::with_backend(Arc::new(LoopbackBackend::new()))
    }

    /// A runtime over a caller-provided backend.
    pub fn with_backend(backend: Arc<dyn Backend>) -> Result<Self> {
        Self::acquire(Arc::new(Runtime::new(backend)))
    }

    fn acquire(runtime: Arc<Runtime>) -> Result<Self> {
        runtime.acquire()?;
        Ok(Self { runtime })
    }

    pub fn is_running(&self) -> bool {
        self.runtime.is_running()
    }

    pub fn version(&self) -> String {
        self.runtime.backend.version()
    }

    pub fn backend_name(&self) -> &'static str {
        self.runtime.backend.name()
    }

    /// Number of live handles of `kind` opened through this runtime.
    pub fn live_handles(&self, kind: HandleKind) -> usize {
        self.runtime.registry.live(kind)
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.runtime.backend.as_ref()
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.runtime.registry
    }

    pub async fn open_finder(&self, options: FinderOptions) -> Result<Finder> {
        Finder::open(self, options).await
    }

    pub async fn open_receiver(&self, options: ReceiverOptions) -> Result<Receiver> {
        Receiver::open(self, options).await
    }

    pub async fn open_sender(&self, options: SenderOptions) -> Result<Sender> {
        Sender::open(self, options).await
    }

    pub async fn open_framesync(&self, receiver: &Receiver) -> Result<FrameSync> {
        FrameSync::open(receiver).await
    }

    pub async fn open_routing(&self, options: RoutingOptions) -> Result<Routing> {
        Routing::open(self, options).await
    }
}

impl Clone for Ndi {
    fn clone(&self) -> Self {
        self.runtime.retain();
        Self {
            runtime: Arc::clone(&self.runtime),
        }
    }
}

impl Drop for Ndi {
    fn drop(&mut self) {
        self.runtime.release();
    }
}

impl fmt::Debug for Ndi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ndi")
            .field("backend", &self.backend_name())
            .field("live_handles", &self.runtime.registry.total())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        finder::FinderOptions,
        receiver::ReceiverOptions,
        routing::RoutingOptions,
        sender::SenderOptions,
        sys::{NativeFinder, NativeReceiver, NativeRouter, NativeSender},
    };

    #[derive(Default)]
    struct Counting {
        inits: AtomicUsize,
        destroys: AtomicUsize,
        fail: bool,
    }

    impl Backend for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn initialize(&self) -> bool {
            self.inits.fetch_add(1, Ordering::SeqCst);
            !self.fail
        }
        fn destroy(&self) {
            self.destroys.fetch_add(1, Ordering::SeqCst);
        }
        fn version(&self) -> String {
            "0".into()
        }
        fn create_finder(&self, _: &FinderOptions) -> Option<Box<dyn NativeFinder>> {
            None
        }
        fn create_receiver(&self, _: &ReceiverOptions) -> Option<Box<dyn NativeReceiver>> {
            None
        }
        fn create_sender(&self, _: &SenderOptions) -> Option<Box<dyn NativeSender>> {
            None
        }
        fn create_router(&self, _: &RoutingOptions) -> Option<Box<dyn NativeRouter>> {
            None
        }
    }

    #[test]
    fn init_and_teardown_run_once() {
        let backend = Arc::new(Counting::default());
        let ndi = Ndi::with_backend(backend.clone()).unwrap();
        let clones: Vec<_> = (0..4).map(|_| ndi.clone()).collect();
        assert!(ndi.is_running());
        drop(clones);
        assert_eq!(backend.destroys.load(Ordering::SeqCst), 0);
        drop(ndi);
        assert_eq!(backend.inits.load(Ordering::SeqCst), 1);
        assert_eq!(backend.destroys.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_init_reports_error() {
        let backend = Arc::new(Counting {
            fail: true,
            ..Default::default()
        });
        let err = Ndi::with_backend(backend.clone()).unwrap_err();
        assert!(matches!(err, Error::InitializationFailed(_)));
        assert_eq!(backend.destroys.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn separate_loopbacks_are_independent() {
        let a = Ndi::loopback().unwrap();
        let b = Ndi::loopback().unwrap();
        assert_eq!(a.backend_name(), "loopback");
        assert!(a.is_running() && b.is_running());
        drop(a);
        assert!(b.is_running());
    }
}
