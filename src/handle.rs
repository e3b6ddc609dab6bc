//! Ownership capsule for native resources.
//!
//! Every finder, receiver, sender, frame synchronizer and router lives in a
//! [`Handle`]. The slot inside the handle is the single authoritative live flag:
//! explicit `destroy()` and the `Drop` finalizer both go through it, so whichever
//! runs first releases the resource and the other is a no-op.
//!
//! The slot holds the resource behind an `Arc`. A call clones it out and releases
//! the lock before touching the native object, so `destroy()` only empties the slot
//! and never waits on an in-flight call. The native object is freed when the last
//! in-flight call drops its clone.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, PoisonError, RwLock,
    },
};

use tracing::debug;

use crate::{Error, Ndi, Result};

/// The kinds of native handle this crate manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Finder,
    Receiver,
    Sender,
    FrameSync,
    Routing,
}

impl HandleKind {
    const ALL: [HandleKind; 5] = [
        HandleKind::Finder,
        HandleKind::Receiver,
        HandleKind::Sender,
        HandleKind::FrameSync,
        HandleKind::Routing,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Per-runtime count of live handles.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    live: [AtomicUsize; HandleKind::ALL.len()],
}

impl Registry {
    fn opened(&self, kind: HandleKind) {
        self.live[kind.index()].fetch_add(1, Ordering::AcqRel);
    }

    fn closed(&self, kind: HandleKind) {
        self.live[kind.index()].fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn live(&self, kind: HandleKind) -> usize {
        self.live[kind.index()].load(Ordering::Acquire)
    }

    pub(crate) fn total(&self) -> usize {
        HandleKind::ALL.iter().map(|k| self.live(*k)).sum()
    }
}

/// A native resource plus its live flag.
///
/// The handle also keeps the runtime acquired, so process-wide teardown cannot run
/// while any handle still holds a resource.
pub(crate) struct Handle<R> {
    kind: HandleKind,
    slot: RwLock<Option<Arc<R>>>,
    ndi: Ndi,
}

impl<R> Handle<R> {
    pub(crate) fn new(ndi: &Ndi, kind: HandleKind, resource: R) -> Self {
        ndi.registry().opened(kind);
        debug!(%kind, backend = ndi.backend_name(), "handle created");
        Self {
            kind,
            slot: RwLock::new(Some(Arc::new(resource))),
            ndi: ndi.clone(),
        }
    }

    pub(crate) fn ndi(&self) -> &Ndi {
        &self.ndi
    }

    pub(crate) fn is_live(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Run `f` against the live resource.
    ///
    /// The slot lock is not held while `f` runs.
    ///
    /// # Errors
    ///
    /// [`Error::Destroyed`] once the handle has been destroyed.
    pub(crate) fn with<T>(&self, f: impl FnOnce(&R) -> T) -> Result<T> {
        let resource = self
            .slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::Destroyed(self.kind))?;
        Ok(f(&resource))
    }

    /// Release the resource now. `true` only for the call that actually released it.
    pub(crate) fn destroy(&self) -> bool {
        matches!(self.destroy_unless(|| Ok(())), Ok(true))
    }

    /// Release the resource unless `busy` objects.
    ///
    /// `busy` runs under the slot's write lock, so nothing can start using the
    /// resource between the check and the release.
    pub(crate) fn destroy_unless(&self, busy: impl FnOnce() -> Result<()>) -> Result<bool> {
        let taken = {
            let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                return Ok(false);
            }
            busy()?;
            slot.take()
        };
        // Frees the native object here unless a call still holds a clone.
        drop(taken);
        self.ndi.registry().closed(self.kind);
        debug!(kind = %self.kind, "handle destroyed");
        Ok(true)
    }
}

impl<R> Drop for Handle<R> {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(resource) = slot.take() {
            drop(resource);
            self.ndi.registry().closed(self.kind);
            debug!(kind = %self.kind, "handle finalized without explicit destroy");
        }
    }
}

impl<R> fmt::Debug for Handle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &self.kind)
            .field("live", &self.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{atomic::AtomicUsize, Arc};

    use super::*;

    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn destroy_releases_exactly_once() {
        let ndi = Ndi::loopback().unwrap();
        let frees = Arc::new(AtomicUsize::new(0));
        let handle = Handle::new(&ndi, HandleKind::Sender, Tracked(Arc::clone(&frees)));

        assert_eq!(ndi.live_handles(HandleKind::Sender), 1);
        assert!(handle.destroy());
        assert!(!handle.destroy());
        assert!(matches!(
            handle.with(|_| ()),
            Err(Error::Destroyed(HandleKind::Sender))
        ));
        drop(handle);

        assert_eq!(frees.load(Ordering::SeqCst), 1);
        assert_eq!(ndi.live_handles(HandleKind::Sender), 0);
    }

    #[test]
    fn finalizer_releases_when_never_destroyed() {
        let ndi = Ndi::loopback().unwrap();
        let frees = Arc::new(AtomicUsize::new(0));
        {
            let handle = Handle::new(&ndi, HandleKind::Finder, Tracked(Arc::clone(&frees)));
            assert!(handle.is_live());
            assert_eq!(handle.with(|t| t.0.load(Ordering::SeqCst)).unwrap(), 0);
        }
        assert_eq!(frees.load(Ordering::SeqCst), 1);
        assert_eq!(ndi.live_handles(HandleKind::Finder), 0);
    }

    #[test]
    fn destroy_does_not_wait_for_in_flight_calls() {
        let ndi = Ndi::loopback().unwrap();
        let frees = Arc::new(AtomicUsize::new(0));
        let handle = Arc::new(Handle::new(&ndi, HandleKind::Receiver, Tracked(Arc::clone(&frees))));
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let worker = {
            let handle = Arc::clone(&handle);
            std::thread::spawn(move || {
                handle.with(|_| {
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                })
            })
        };
        entered_rx.recv().unwrap();

        let start = std::time::Instant::now();
        assert!(handle.destroy());
        assert!(start.elapsed() < std::time::Duration::from_millis(100));
        assert_eq!(ndi.live_handles(HandleKind::Receiver), 0);
        assert_eq!(frees.load(Ordering::SeqCst), 0);

        release_tx.send(()).unwrap();
        worker.join().unwrap().unwrap();
        assert_eq!(frees.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn busy_check_blocks_destroy() {
        let ndi = Ndi::loopback().unwrap();
        let handle = Handle::new(&ndi, HandleKind::Receiver, ());
        let err = handle
            .destroy_unless(|| Err(Error::HandleInUse("busy".into())))
            .unwrap_err();
        assert!(matches!(err, Error::HandleInUse(_)));
        assert!(handle.is_live());
        assert!(handle.destroy_unless(|| Ok(())).unwrap());
        assert!(!handle.destroy_unless(|| unreachable!()).unwrap());
    }

    #[test]
    fn handle_keeps_runtime_alive() {
        let ndi = Ndi::loopback().unwrap();
        let handle = Handle::new(&ndi, HandleKind::Routing, ());
        let observer = handle.ndi().clone();
        drop(ndi);
        assert!(observer.is_running());
        drop(handle);
        assert!(observer.is_running());
    }
}
