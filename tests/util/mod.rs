// Not all functions are used by every test binary.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Once};
use std::time::{Duration, Instant};

use corvid::{EventLoopConfig, EventLoopGroup};

pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub fn group(size: usize) -> EventLoopGroup {
    init();
    EventLoopGroup::new(size, EventLoopConfig::default()).expect("failed to start event loop group")
}

/// Blocks the calling thread until `condition` is true or `timeout` elapses,
/// polling every 10ms. Returns whether the condition was observed.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// A shared byte sink handlers can append to from any event loop thread.
#[derive(Clone, Default)]
pub struct Collected(Arc<StdMutex<Vec<u8>>>);

impl Collected {
    pub fn new() -> Collected {
        Collected::default()
    }

    pub fn extend(&self, bytes: &[u8]) {
        self.0.lock().unwrap().extend_from_slice(bytes);
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

/// A flag flippable from a handler callback and observable from the test
/// thread, for the common "did the expected event fire" assertion shape.
#[derive(Clone, Default)]
pub struct Flag(Arc<AtomicBool>);

impl Flag {
    pub fn new() -> Flag {
        Flag::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn assert_send<T: Send>() {}
pub fn assert_sync<T: Sync>() {}
