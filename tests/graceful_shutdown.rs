//! Graceful shutdown quiet-period semantics: two
//! channels registered on a group, a new task keeps arriving on one of the
//! loops (restarting its quiet period) while the other loop is already
//! idle; `shutdown_gracefully` must still complete once the busy loop goes
//! quiet, bounded by the hard timeout either way.

mod util;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use corvid::{Channel, EventLoopConfig, EventLoopGroup};

#[test]
fn shutdown_waits_out_a_busy_loops_quiet_period() {
    let group = EventLoopGroup::new(2, EventLoopConfig::default()).unwrap();
    let busy = group.next();
    let idle = group.next();

    // Register one channel per loop so each loop has live I/O state to
    // tear down, matching the scenario's "two channels" setup.
    let busy_channel = Channel::new();
    busy_channel.bind("127.0.0.1:0".parse().unwrap()).sync(None).unwrap();
    let idle_channel = Channel::new();
    idle_channel.bind("127.0.0.1:0".parse().unwrap()).sync(None).unwrap();

    let submissions = Arc::new(AtomicUsize::new(0));
    let keep_submitting = Arc::new(std::sync::atomic::AtomicBool::new(true));

    // A long-lived task that keeps re-submitting itself on the busy loop
    // every 10ms, restarting that loop's quiet period each time, until the
    // test tells it to stop.
    fn resubmit(
        event_loop: corvid::EventLoop,
        submissions: Arc<AtomicUsize>,
        keep_going: Arc<std::sync::atomic::AtomicBool>,
    ) {
        submissions.fetch_add(1, Ordering::SeqCst);
        if keep_going.load(Ordering::SeqCst) {
            let event_loop2 = event_loop.clone();
            let submissions2 = submissions.clone();
            let keep_going2 = keep_going.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                let _ = event_loop2.execute(move || resubmit(event_loop2.clone(), submissions2, keep_going2));
            });
        }
    }

    resubmit(busy.clone(), submissions.clone(), keep_submitting.clone());

    // Let a few resubmissions happen so the busy loop's quiet period is
    // genuinely being restarted before shutdown is requested.
    std::thread::sleep(Duration::from_millis(60));
    assert!(submissions.load(Ordering::SeqCst) >= 2);

    // Stop resubmitting shortly after requesting shutdown, so the busy
    // loop's quiet period can actually elapse.
    let quiet = Duration::from_millis(80);
    let timeout = Duration::from_secs(5);
    let shutdown = group.shutdown_gracefully(quiet, timeout);

    std::thread::sleep(Duration::from_millis(30));
    keep_submitting.store(false, Ordering::SeqCst);

    let result = shutdown.sync(Some(Duration::from_secs(10))).unwrap();
    assert!(result.is_success(), "group shutdown should complete once both loops go quiet");

    let _ = idle;
}

#[test]
fn shutdown_is_bounded_by_the_hard_timeout_even_under_continuous_load() {
    let group = EventLoopGroup::new(1, EventLoopConfig::default()).unwrap();
    let lp = group.next();

    let keep_going = Arc::new(std::sync::atomic::AtomicBool::new(true));

    fn hammer(event_loop: corvid::EventLoop, keep_going: Arc<std::sync::atomic::AtomicBool>) {
        if keep_going.load(Ordering::SeqCst) {
            let event_loop2 = event_loop.clone();
            let keep_going2 = keep_going.clone();
            let _ = event_loop.execute(move || hammer(event_loop2, keep_going2));
        }
    }
    hammer(lp, keep_going.clone());

    let started = std::time::Instant::now();
    let shutdown = group.shutdown_gracefully(Duration::from_secs(60), Duration::from_millis(200));
    let result = shutdown.sync(Some(Duration::from_secs(10))).unwrap();
    keep_going.store(false, Ordering::SeqCst);

    assert!(result.is_success());
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "hard timeout of 200ms should have forced termination, took {:?}",
        started.elapsed()
    );
}
