//! The leak-sweeper background worker (§4.E "Leak sweeper"): wakes every
//! `T_occ / 2` and force-reclaims any lease that has outlived its occupancy
//! budget.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::Inner;

pub(super) fn spawn(inner: Arc<Inner>) {
    let interval = (inner.pool_config.max_occupancy / 2).max(Duration::from_millis(50));

    thread::Builder::new()
        .name("naivemysql-leak-sweeper".to_owned())
        .spawn(move || run(inner, interval))
        .expect("failed to spawn the pool's leak sweeper thread");
}

fn run(inner: Arc<Inner>, interval: Duration) {
    loop {
        let guard = inner
            .shutdown_lock
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        if inner.closed.load(Ordering::SeqCst) {
            return;
        }

        let (_guard, _timed_out) = inner
            .shutdown_cond
            .wait_timeout(guard, interval)
            .unwrap_or_else(|e| e.into_inner());

        if inner.closed.load(Ordering::SeqCst) {
            return;
        }

        inner.sweep_once();
    }
}
