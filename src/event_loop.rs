//! A single-threaded scheduler that interleaves reactor I/O with a task
//! queue and a scheduled-task heap.
//!
//! Grounded on mio's reactor/selector split (`mio::Poll` drives one
//! thread's readiness loop), generalized with task-queue/timer-wheel/
//! shutdown-state-machine machinery layered on top, enriched from
//! the same `crossbeam_queue`/`parking_lot` stack already used by
//! [`crate::task_queue`] and [`crate::promise`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::Mutex as PlMutex;

use crate::error::{CoreError, CoreResult};
use crate::promise::{Executor, Promise};
use crate::reactor::select_strategy::{DefaultSelectStrategy, SelectDecision, SelectStrategy};
use crate::reactor::{ReadyOps, Reactor, Registration};
use crate::task_queue::{Task, TaskQueue};
use crate::timer_wheel::{ScheduledHandle, TimerWheel};
use crate::token::Token;
use crate::waker::Waker;
use crate::interest::Interest;

/// Anything a reactor registration dispatches readiness to. [`crate::channel::Channel`]
/// is the only real implementor; tests use simpler stand-ins.
pub trait IoHandler: Send + Sync {
    fn handle_io(&self, ready: ReadyOps);

    /// Called once per handler when the owning loop finishes its quiet
    /// period or hits its hard shutdown deadline, so it can deregister and
    /// process any final outbound events. Default no-op for handlers that
    /// aren't full channels (e.g. tests).
    fn on_loop_shutdown(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum LoopState {
    Running = 0,
    ShuttingDown = 1,
    Shutdown = 2,
    Terminated = 3,
}

impl From<u8> for LoopState {
    fn from(v: u8) -> LoopState {
        match v {
            0 => LoopState::Running,
            1 => LoopState::ShuttingDown,
            2 => LoopState::Shutdown,
            _ => LoopState::Terminated,
        }
    }
}

/// Tunables for one [`EventLoop`].
#[derive(Debug, Clone, Copy)]
pub struct EventLoopConfig {
    pub task_queue_capacity: usize,
    pub events_capacity: usize,
    /// I/O-vs-task time ratio in `(0, 100]`; `100` disables the task-time
    /// cap (always drain the whole queue each iteration).
    pub io_ratio: u8,
}

impl Default for EventLoopConfig {
    fn default() -> EventLoopConfig {
        EventLoopConfig {
            task_queue_capacity: 4096,
            events_capacity: 1024,
            io_ratio: 50,
        }
    }
}

static NEXT_LOOP_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static CURRENT_LOOP_ID: std::cell::Cell<Option<u64>> = const { std::cell::Cell::new(None) };
}

struct ShutdownInfo {
    quiet: Duration,
    hard_deadline: Instant,
    quiet_deadline: Instant,
}

struct Inner {
    id: u64,
    reactor: Arc<Reactor>,
    tasks: TaskQueue,
    scheduled: Mutex<TimerWheel>,
    handlers: PlMutex<HashMap<Token, Arc<dyn IoHandler>>>,
    state: AtomicU8,
    io_ratio: u8,
    select_strategy: Mutex<Box<dyn SelectStrategy>>,
    waker: Waker,
    shutdown: Mutex<Option<ShutdownInfo>>,
    termination: Promise<(), Arc<CoreError>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: Mutex<Option<ThreadId>>,
}

/// A single OS thread running one reactor, one task queue, and one
/// scheduled-task heap. Cheap to clone — every clone shares the same
/// background thread.
#[derive(Clone)]
pub struct EventLoop {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("id", &self.inner.id)
            .field("state", &LoopState::from(self.inner.state.load(Ordering::Acquire)))
            .finish()
    }
}

impl EventLoop {
    pub fn new(config: EventLoopConfig) -> io::Result<EventLoop> {
        let id = NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed);
        let waker_token = Token(usize::MAX);
        let reactor = Arc::new(Reactor::new(config.events_capacity, waker_token)?);
        let waker = Waker::new(&reactor)?;

        let inner = Arc::new(Inner {
            id,
            reactor,
            tasks: TaskQueue::new(config.task_queue_capacity),
            scheduled: Mutex::new(TimerWheel::new()),
            handlers: PlMutex::new(HashMap::new()),
            state: AtomicU8::new(LoopState::Running as u8),
            io_ratio: config.io_ratio.clamp(1, 100),
            select_strategy: Mutex::new(Box::new(DefaultSelectStrategy)),
            waker,
            shutdown: Mutex::new(None),
            termination: Promise::new(Arc::new(crate::promise::ImmediateExecutor)),
            thread: Mutex::new(None),
            thread_id: Mutex::new(None),
        });

        let spawned = {
            let inner = inner.clone();
            thread::Builder::new()
                .name(format!("corvid-loop-{id}"))
                .spawn(move || {
                    CURRENT_LOOP_ID.with(|c| c.set(Some(inner.id)));
                    *inner.thread_id.lock().unwrap() = Some(thread::current().id());
                    run_loop(&inner);
                })?
        };
        *inner.thread.lock().unwrap() = Some(spawned);

        Ok(EventLoop { inner })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether the calling thread is this loop's own thread.
    pub fn in_event_loop(&self) -> bool {
        CURRENT_LOOP_ID.with(|c| c.get()) == Some(self.inner.id)
    }

    /// Schedules `task` to run on the loop thread. Safe from any thread.
    pub fn execute<F>(&self, task: F) -> CoreResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.restart_quiet_period_if_shutting_down();
        self.inner.tasks.push(Box::new(task))?;
        let _ = self.inner.waker.wake();
        Ok(())
    }

    /// Schedules `task` to run no earlier than `delay` from now.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> CoreResult<ScheduledHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.state() != LoopState::Running && self.state() != LoopState::ShuttingDown {
            return Err(CoreError::registration("event loop is shut down"));
        }
        let handle = self.inner.scheduled.lock().unwrap().schedule(delay, Box::new(task));
        let _ = self.inner.waker.wake();
        Ok(handle)
    }

    fn restart_quiet_period_if_shutting_down(&self) {
        let mut guard = self.inner.shutdown.lock().unwrap();
        if let Some(info) = guard.as_mut() {
            info.quiet_deadline = (Instant::now() + info.quiet).min(info.hard_deadline);
        }
    }

    fn state(&self) -> LoopState {
        LoopState::from(self.inner.state.load(Ordering::Acquire))
    }

    /// Registers an I/O handle for `interests`, dispatching readiness events
    /// to `handler`. Must be called from the loop thread.
    pub fn register_io(
        &self,
        fd: std::os::fd::RawFd,
        interests: Interest,
        handler: Arc<dyn IoHandler>,
    ) -> CoreResult<Registration> {
        if self.state() != LoopState::Running && self.state() != LoopState::ShuttingDown {
            return Err(CoreError::registration("event loop is shut down"));
        }
        let registration = self.inner.reactor.register(fd, interests).map_err(CoreError::Io)?;
        self.inner
            .handlers
            .lock()
            .insert(registration.token(), handler);
        Ok(registration)
    }

    pub fn reregister_io(&self, registration: Registration, interests: Interest) -> CoreResult<()> {
        self.inner.reactor.modify(registration, interests).map_err(CoreError::Io)
    }

    pub fn deregister_io(&self, registration: Registration) {
        self.inner.handlers.lock().remove(&registration.token());
        self.inner.reactor.cancel(registration);
    }

    /// Initiates graceful shutdown: the loop keeps running
    /// (accepting new tasks, which restart the quiet period) until either
    /// `quiet` elapses without a new submission, or `timeout` elapses
    /// absolute. Returns a promise that resolves once the loop thread
    /// terminates.
    pub fn shutdown_gracefully(&self, quiet: Duration, timeout: Duration) -> Promise<(), Arc<CoreError>> {
        let now = Instant::now();
        *self.inner.shutdown.lock().unwrap() = Some(ShutdownInfo {
            quiet,
            hard_deadline: now + timeout,
            quiet_deadline: now + quiet,
        });
        self.inner
            .state
            .store(LoopState::ShuttingDown as u8, Ordering::Release);
        let _ = self.inner.waker.wake();
        self.inner.termination.clone()
    }
}

impl Executor for EventLoop {
    fn execute(&self, task: Box<dyn FnOnce() + Send>) {
        if EventLoop::in_event_loop(self) {
            task();
        } else if EventLoop::execute(self, move || task()).is_err() {
            log_warn!("dropped task submitted to a shut-down event loop");
        }
    }

    fn in_executor(&self) -> bool {
        EventLoop::in_event_loop(self)
    }
}

use std::io;

fn run_loop(inner: &Arc<Inner>) {
    loop {
        let tasks_waiting = !inner.tasks.is_empty();
        let io_start = Instant::now();

        let dispatch = |inner: &Arc<Inner>, token: Token, ready: ReadyOps| {
            let handler = inner.handlers.lock().get(&token).cloned();
            if let Some(handler) = handler {
                handler.handle_io(ready);
            }
        };

        let mut decision_events = 0usize;
        let decision = {
            let mut strategy = inner.select_strategy.lock().unwrap();
            let mut poll_now = || {
                inner
                    .reactor
                    .run(Some(Duration::ZERO), |t, r| dispatch(inner, t, r))
                    .unwrap_or(0)
            };
            strategy.decide(tasks_waiting, &mut poll_now)
        };

        match decision {
            SelectDecision::Ready(n) => decision_events = n,
            SelectDecision::Continue => {}
            SelectDecision::BusyWait => {
                decision_events = inner
                    .reactor
                    .run(Some(Duration::ZERO), |t, r| dispatch(inner, t, r))
                    .unwrap_or(0);
            }
            SelectDecision::Block => {
                let deadline = next_wait_deadline(inner);
                decision_events = inner
                    .reactor
                    .run(deadline, |t, r| dispatch(inner, t, r))
                    .unwrap_or(0);
            }
        }
        let _ = decision_events;
        let io_elapsed = io_start.elapsed();

        drain_tasks(inner, io_elapsed);
        drain_scheduled(inner);

        if check_shutdown(inner) {
            break;
        }
    }

    inner.state.store(LoopState::Terminated as u8, Ordering::Release);
    let _ = inner.termination.set_success(());
}

fn next_wait_deadline(inner: &Inner) -> Option<Duration> {
    inner
        .scheduled
        .lock()
        .unwrap()
        .next_deadline()
        .map(|deadline| deadline.saturating_duration_since(Instant::now()))
}

fn drain_tasks(inner: &Inner, io_elapsed: Duration) {
    let budget = if inner.io_ratio >= 100 {
        None
    } else {
        let ratio = inner.io_ratio as f64;
        Some(io_elapsed.mul_f64((100.0 - ratio) / ratio))
    };
    let start = Instant::now();
    loop {
        if let Some(budget) = budget {
            if !budget.is_zero() && start.elapsed() >= budget {
                break;
            }
        }
        match inner.tasks.pop() {
            Some(task) => task(),
            None => break,
        }
    }
}

fn drain_scheduled(inner: &Inner) {
    let ready = inner.scheduled.lock().unwrap().drain_ready(Instant::now());
    for task in ready {
        task();
    }
}

/// Evaluates the shutdown state machine; returns `true` once the loop
/// thread should stop running.
fn check_shutdown(inner: &Inner) -> bool {
    let state = LoopState::from(inner.state.load(Ordering::Acquire));
    if state != LoopState::ShuttingDown {
        return false;
    }

    let now = Instant::now();
    let finished = {
        let guard = inner.shutdown.lock().unwrap();
        let info = guard.as_ref().expect("shutdown info set before ShuttingDown");
        now >= info.hard_deadline || now >= info.quiet_deadline
    };
    if finished {
        inner.state.store(LoopState::Shutdown as u8, Ordering::Release);
        // Tear down every channel still registered to this loop before the
        // thread exits and the reactor is dropped, so each gets its final
        // `channelUnregistered` rather than silently vanishing.
        let handlers: Vec<_> = inner.handlers.lock().drain().map(|(_, handler)| handler).collect();
        for handler in handlers {
            handler.on_loop_shutdown();
        }
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn execute_runs_on_loop_thread() {
        let event_loop = EventLoop::new(EventLoopConfig::default()).unwrap();
        let ran_on_loop = Arc::new(AtomicBool::new(false));
        let loop_id = event_loop.id();
        let flag = ran_on_loop.clone();
        let done = Arc::new((Mutex::new(false), std::sync::Condvar::new()));
        let done2 = done.clone();
        event_loop
            .execute(move || {
                CURRENT_LOOP_ID.with(|c| {
                    flag.store(c.get() == Some(loop_id), Ordering::SeqCst);
                });
                let (lock, cv) = &*done2;
                *lock.lock().unwrap() = true;
                cv.notify_all();
            })
            .unwrap();

        let (lock, cv) = &*done;
        let mut guard = lock.lock().unwrap();
        while !*guard {
            guard = cv.wait(guard).unwrap();
        }
        assert!(ran_on_loop.load(Ordering::SeqCst));

        event_loop
            .shutdown_gracefully(Duration::from_millis(1), Duration::from_secs(1))
            .sync(Some(Duration::from_secs(5)))
            .unwrap();
    }

    #[test]
    fn in_event_loop_is_false_from_outside() {
        let event_loop = EventLoop::new(EventLoopConfig::default()).unwrap();
        assert!(!event_loop.in_event_loop());
        event_loop
            .shutdown_gracefully(Duration::from_millis(1), Duration::from_secs(1))
            .sync(Some(Duration::from_secs(5)))
            .unwrap();
    }
}
