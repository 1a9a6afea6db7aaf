//! Single-assignment result cell with an ordered listener chain and
//! dead-lock detection.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use parking_lot::Mutex as PlMutex;

use crate::error::{CoreError, CoreResult};

/// Anything that can run a boxed closure "on its own thread" and answer
/// whether the current thread already is that thread. An [`EventLoop`]
/// implements this; tests use a same-thread stub.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Box<dyn FnOnce() + Send>);
    fn in_executor(&self) -> bool;
}

/// A no-op executor that runs tasks inline, used by promises created before
/// a channel has an event loop and by tests.
#[derive(Clone, Default)]
pub struct ImmediateExecutor;

impl Executor for ImmediateExecutor {
    fn execute(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }

    fn in_executor(&self) -> bool {
        // An immediate executor never "owns" a distinct thread to deadlock
        // against, so sync/await are always safe to call here.
        false
    }
}

/// The executor behind a promise created before its channel has selected an
/// event loop (spec §4.C `PendingRegistrationPromise`): `execute`/`in_executor`
/// behave like [`ImmediateExecutor`] until [`PendingRegistrationExecutor::registered`]
/// is called, after which every call — including ones made after the fact —
/// delegates to the channel's actual loop. This is what lets `sync()`/`await()`
/// on a bootstrap's returned future still raise `BlockingOnEventLoop` when
/// called from inside a handler running on the now-known loop, instead of
/// forever answering "not the owning thread" the way a snapshotted
/// `ImmediateExecutor` would.
#[derive(Default)]
pub struct PendingRegistrationExecutor {
    delegate: PlMutex<Option<Arc<dyn Executor>>>,
}

impl PendingRegistrationExecutor {
    pub fn new() -> Arc<PendingRegistrationExecutor> {
        Arc::new(PendingRegistrationExecutor::default())
    }

    /// Points every future `execute`/`in_executor` call at `executor`. Called
    /// once a channel's registration with its event loop succeeds.
    pub fn registered(&self, executor: Arc<dyn Executor>) {
        *self.delegate.lock() = Some(executor);
    }
}

impl Executor for PendingRegistrationExecutor {
    fn execute(&self, task: Box<dyn FnOnce() + Send>) {
        match self.delegate.lock().clone() {
            Some(executor) => executor.execute(task),
            None => task(),
        }
    }

    fn in_executor(&self) -> bool {
        match self.delegate.lock().clone() {
            Some(executor) => executor.in_executor(),
            None => false,
        }
    }
}

enum Outcome<T, E> {
    Pending,
    Success(T),
    Failure(E),
    Cancelled,
}

impl<T: Clone, E: Clone> Clone for Outcome<T, E> {
    fn clone(&self) -> Self {
        match self {
            Outcome::Pending => Outcome::Pending,
            Outcome::Success(v) => Outcome::Success(v.clone()),
            Outcome::Failure(e) => Outcome::Failure(e.clone()),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }
}

type Listener<T, E> = Box<dyn FnOnce(&Outcome<T, E>) + Send>;

struct Inner<T, E> {
    outcome: Outcome<T, E>,
    listeners: Vec<Listener<T, E>>,
}

/// A promise (writer side) and future (reader side) in one type, following
/// Netty's own merged `Promise`/`Future` hierarchy rather than splitting
/// them into separate crate-exposed types.
pub struct Promise<T, E> {
    inner: Arc<PlMutex<Inner<T, E>>>,
    executor: Arc<dyn Executor>,
    completed: Arc<AtomicBool>,
    wait_gate: Arc<(Mutex<bool>, Condvar)>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Promise {
            inner: self.inner.clone(),
            executor: self.executor.clone(),
            completed: self.completed.clone(),
            wait_gate: self.wait_gate.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("done", &self.completed.load(Ordering::Acquire))
            .finish()
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn new(executor: Arc<dyn Executor>) -> Promise<T, E> {
        Promise {
            inner: Arc::new(PlMutex::new(Inner {
                outcome: Outcome::Pending,
                listeners: Vec::new(),
            })),
            executor,
            completed: Arc::new(AtomicBool::new(false)),
            wait_gate: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn is_done(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.inner.lock().outcome, Outcome::Success(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.inner.lock().outcome, Outcome::Cancelled)
    }

    /// Completes the promise with a successful value. Returns
    /// `Err(AlreadyComplete)` if already resolved.
    pub fn set_success(&self, value: T) -> CoreResult<()> {
        if self.try_complete(Outcome::Success(value)) {
            Ok(())
        } else {
            Err(CoreError::AlreadyComplete)
        }
    }

    /// Like [`Promise::set_success`] but returns `false` instead of erroring
    /// on an already-completed promise.
    pub fn try_success(&self, value: T) -> bool {
        self.try_complete(Outcome::Success(value))
    }

    pub fn set_failure(&self, error: E) -> CoreResult<()> {
        if self.try_complete(Outcome::Failure(error)) {
            Ok(())
        } else {
            Err(CoreError::AlreadyComplete)
        }
    }

    pub fn try_failure(&self, error: E) -> bool {
        self.try_complete(Outcome::Failure(error))
    }

    pub fn cancel(&self) -> bool {
        self.try_complete(Outcome::Cancelled)
    }

    fn try_complete(&self, outcome: Outcome<T, E>) -> bool {
        let listeners = {
            let mut inner = self.inner.lock();
            if !matches!(inner.outcome, Outcome::Pending) {
                return false;
            }
            inner.outcome = outcome;
            std::mem::take(&mut inner.listeners)
        };
        self.completed.store(true, Ordering::Release);
        {
            let (lock, cv) = &*self.wait_gate;
            *lock.lock().unwrap() = true;
            cv.notify_all();
        }
        self.fire_listeners(listeners);
        true
    }

    /// Registers a listener to run once this promise completes, in the
    /// executor given at construction. Listeners already-registered fire in
    /// insertion order; a listener added after completion runs immediately
    /// (still dispatched through the executor, never inline).
    pub fn add_listener<F>(&self, listener: F)
    where
        F: FnOnce(PromiseResult<T, E>) + Send + 'static,
    {
        let boxed: Listener<T, E> = Box::new(move |outcome| listener(PromiseResult::from(outcome)));
        let to_fire = {
            let mut inner = self.inner.lock();
            if matches!(inner.outcome, Outcome::Pending) {
                inner.listeners.push(boxed);
                return;
            }
            Some(boxed)
        };
        if let Some(boxed) = to_fire {
            self.fire_listeners(vec![boxed]);
        }
    }

    fn fire_listeners(&self, listeners: Vec<Listener<T, E>>) {
        if listeners.is_empty() {
            return;
        }
        let inner = self.inner.clone();
        self.executor.execute(Box::new(move || {
            // Snapshot is already resolved; clone it once for all listeners
            // in this batch so each closure gets its own reference.
            let outcome = clone_outcome(&inner.lock().outcome);
            for listener in listeners {
                listener(&outcome);
            }
        }));
    }

    /// Blocks the calling thread until the promise completes, returning the
    /// result. Raises [`CoreError::BlockingOnEventLoop`] if called from the
    /// promise's own executor thread, since that thread is the only one that
    /// could ever complete it.
    pub fn sync(&self, timeout: Option<Duration>) -> CoreResult<PromiseResult<T, E>> {
        if self.executor.in_executor() {
            return Err(CoreError::BlockingOnEventLoop);
        }
        let (lock, cv) = &*self.wait_gate;
        let mut done = lock.lock().unwrap();
        while !*done {
            match timeout {
                Some(d) => {
                    let (guard, timed_out) = cv.wait_timeout(done, d).unwrap();
                    done = guard;
                    if timed_out.timed_out() && !*done {
                        return Err(CoreError::Timeout);
                    }
                }
                None => done = cv.wait(done).unwrap(),
            }
        }
        Ok(PromiseResult::from(&self.inner.lock().outcome))
    }
}

fn clone_outcome<T: Clone, E: Clone>(outcome: &Outcome<T, E>) -> Outcome<T, E> {
    outcome.clone()
}

/// A resolved promise outcome, handed to listeners and `sync()` callers.
pub enum PromiseResult<T, E> {
    Success(T),
    Failure(E),
    Cancelled,
}

impl<T: Clone, E: Clone> From<&Outcome<T, E>> for PromiseResult<T, E> {
    fn from(outcome: &Outcome<T, E>) -> Self {
        match outcome {
            Outcome::Pending => unreachable!("listeners only ever observe a resolved outcome"),
            Outcome::Success(v) => PromiseResult::Success(v.clone()),
            Outcome::Failure(e) => PromiseResult::Failure(e.clone()),
            Outcome::Cancelled => PromiseResult::Cancelled,
        }
    }
}

impl<T, E> PromiseResult<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, PromiseResult::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn second_set_success_fails() {
        let p = Promise::<u32, String>::new(Arc::new(ImmediateExecutor));
        assert!(p.set_success(1).is_ok());
        assert!(matches!(p.set_success(2), Err(CoreError::AlreadyComplete)));
    }

    #[test]
    fn listeners_fire_in_registration_order() {
        let p = Promise::<u32, String>::new(Arc::new(ImmediateExecutor));
        let order = Arc::new(PlMutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            p.add_listener(move |_| order.lock().push(i));
        }
        p.set_success(7).unwrap();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn listener_after_completion_still_fires() {
        let p = Promise::<u32, String>::new(Arc::new(ImmediateExecutor));
        p.set_success(5).unwrap();

        let seen = Arc::new(AtomicU32::new(0));
        let seen2 = seen.clone();
        p.add_listener(move |r| {
            if let PromiseResult::Success(v) = r {
                seen2.store(v, Ordering::SeqCst);
            }
        });
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn sync_on_owning_executor_raises_blocking_error() {
        struct AlwaysInExecutor;
        impl Executor for AlwaysInExecutor {
            fn execute(&self, task: Box<dyn FnOnce() + Send>) {
                task();
            }
            fn in_executor(&self) -> bool {
                true
            }
        }

        let p = Promise::<u32, String>::new(Arc::new(AlwaysInExecutor));
        assert!(matches!(
            p.sync(None),
            Err(CoreError::BlockingOnEventLoop)
        ));
    }

    #[test]
    fn pending_registration_executor_delegates_once_registered() {
        struct AlwaysInExecutor;
        impl Executor for AlwaysInExecutor {
            fn execute(&self, task: Box<dyn FnOnce() + Send>) {
                task();
            }
            fn in_executor(&self) -> bool {
                true
            }
        }

        let pending = PendingRegistrationExecutor::new();
        let p = Promise::<u32, String>::new(pending.clone());

        // Before `registered()`, behaves like `ImmediateExecutor`: safe to
        // `sync()` from any thread.
        assert!(!pending.in_executor());

        pending.registered(Arc::new(AlwaysInExecutor));
        assert!(matches!(
            p.sync(None),
            Err(CoreError::BlockingOnEventLoop)
        ));
    }
}
