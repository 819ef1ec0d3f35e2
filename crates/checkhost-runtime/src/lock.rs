//! Lock coordination for the embedded runtime.
//!
//! The runtime has a single global lock whose owner is a native thread, not
//! a task. A [`LockToken`] is proof that the current thread owns it. Tokens
//! are `!Send`: the compiler refuses to move one to another thread or to
//! keep one alive across an `.await` in a `Send` future, which is what keeps
//! a task pinned to its carrier thread for the whole critical section.
//!
//! Releasing from a thread other than the acquiring one is a fatal
//! consistency breach and panics.

use parking_lot::{Condvar, Mutex};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

use crate::error::RuntimeError;

#[derive(Debug, Default)]
struct Ownership {
    owner: Option<ThreadId>,
    depth: usize,
}

/// Thread-owned global lock of the runtime.
#[derive(Debug, Default)]
pub(crate) struct GlobalLock {
    ownership: Mutex<Ownership>,
    released: Condvar,
    enabled: AtomicBool,
}

impl GlobalLock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Turns on the locking subsystem. The calling thread comes out holding
    /// the lock.
    pub(crate) fn enable(&self) -> LockToken<'_> {
        self.enabled.store(true, Ordering::Release);
        self.lock()
    }

    /// Blocks until the calling thread owns the lock.
    pub(crate) fn lock(&self) -> LockToken<'_> {
        let current = thread::current().id();
        let mut ownership = self.ownership.lock();

        if ownership.owner == Some(current) {
            ownership.depth += 1;
            return LockToken::new(self, current, true, false);
        }

        let contended = ownership.owner.is_some();
        while ownership.owner.is_some() {
            self.released.wait(&mut ownership);
        }
        ownership.owner = Some(current);
        ownership.depth = 1;

        LockToken::new(self, current, false, contended)
    }

    pub(crate) fn owner(&self) -> Option<ThreadId> {
        self.ownership.lock().owner
    }

    fn release(&self, acquired_on: ThreadId) {
        let current = thread::current().id();
        if acquired_on != current {
            affinity_violation(acquired_on, current);
        }

        let mut ownership = self.ownership.lock();
        if ownership.owner != Some(current) {
            let holder = ownership.owner.unwrap_or(acquired_on);
            drop(ownership);
            affinity_violation(holder, current);
        }

        ownership.depth -= 1;
        if ownership.depth == 0 {
            ownership.owner = None;
            drop(ownership);
            self.released.notify_one();
        }
    }
}

#[cold]
#[track_caller]
fn affinity_violation(acquired_on: ThreadId, released_on: ThreadId) -> ! {
    let err = RuntimeError::ThreadAffinityViolation {
        acquired_on,
        released_on,
    };
    tracing::error!(?acquired_on, ?released_on, "runtime lock released from a foreign thread");
    panic!("{}", err)
}

/// Proof of holding the runtime lock on the current thread.
///
/// Dropping the token releases it, so every exit path of a critical section
/// gives the lock back. A token taken while the thread already holds the
/// lock is *nested*: it does not acquire again, and releasing it only undoes
/// the nesting.
#[must_use = "dropping the token releases the runtime lock immediately"]
pub struct LockToken<'a> {
    lock: &'a GlobalLock,
    acquired_on: ThreadId,
    nested: bool,
    contended: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'a> LockToken<'a> {
    fn new(lock: &'a GlobalLock, acquired_on: ThreadId, nested: bool, contended: bool) -> Self {
        Self {
            lock,
            acquired_on,
            nested,
            contended,
            _not_send: PhantomData,
        }
    }

    /// Native thread the token is bound to.
    pub fn thread(&self) -> ThreadId {
        self.acquired_on
    }

    pub fn is_nested(&self) -> bool {
        self.nested
    }

    /// Whether acquiring had to wait for another holder.
    pub fn was_contended(&self) -> bool {
        self.contended
    }

    /// Releases the lock. Equivalent to dropping the token.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LockToken<'_> {
    fn drop(&mut self) {
        self.lock.release(self.acquired_on);
    }
}

impl std::fmt::Debug for LockToken<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockToken")
            .field("thread", &self.acquired_on)
            .field("nested", &self.nested)
            .finish()
    }
}
