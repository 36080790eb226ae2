//! Connection Pool (§4.E): a bounded fleet of channels, fairness-gated
//! acquire/release, a background leak sweeper, and query-timeout
//! cancellation via a sibling channel's `KILL`. Grounded on `sqlx-core`'s
//! `pool/inner.rs` (the permit-channel + slot-vector shape of `SharedPool`/
//! `Live`/`Idle`), reworked from an async channel of idle connections into a
//! blocking `Mutex<Vec<SlotCell>>` + `Condvar` plus a `crossbeam-channel`
//! counting semaphore, since this core has no async runtime and the spec's
//! slot vector (not a simple idle queue) is load-bearing for the leak
//! sweeper and the sibling-channel KILL (§9 "Cyclic references").

mod slot;
mod sweeper;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::channel::{BrokenCallback, Channel};
use crate::command::{Command, InitDatabaseCommand, KillCommand, Outcome, PingCommand, QueryCommand};
use crate::config::{ChannelConfig, PoolConfig};
use crate::counters::{self, Counters, SqlShape};
use crate::error::{Error, Result};

use slot::{SlotCell, SlotState};

/// Called when a pooled channel transitions to `Broken` for any reason other
/// than an explicit `Pool::close` (§4.E "Unhealthy notification"). Receives
/// the slot index, not a connection id, since by the time this fires the
/// channel itself may already have been recycled.
pub type UnhealthyCallback = Box<dyn Fn(usize) + Send + Sync>;

/// Called once per command whose wall-clock time exceeded the configured
/// slow-query threshold (§4.E "Slow query surface"). Opaque to the core;
/// real metrics export is an external collaborator (§1).
pub type SlowExecutionCallback = Box<dyn Fn(Duration) + Send + Sync>;

struct Inner {
    channel_config: ChannelConfig,
    pool_config: PoolConfig,
    slots: Mutex<Vec<SlotCell>>,
    cond: Condvar,
    permits: (Sender<()>, Receiver<()>),
    closed: AtomicBool,
    counters: Arc<Counters>,
    on_unhealthy: Mutex<Option<UnhealthyCallback>>,
    on_slow: Mutex<Option<SlowExecutionCallback>>,
    shutdown_lock: Mutex<()>,
    shutdown_cond: Condvar,
}

/// A fixed-size fleet of `Channel`s shared across threads (§3 "Pool").
/// Cloning a `Pool` is cheap and shares the same underlying fleet, mirroring
/// `Channel`'s own `Clone` semantics.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<Inner>,
}

impl Pool {
    /// Builds a pool of `pool_config.size` lazily-constructed channels, all
    /// dialing `channel_config.host:channel_config.port`, and starts the
    /// background leak sweeper. No channel is actually connected until the
    /// first `acquire` needs one (§4.E "Slot allocation": slots start
    /// `Empty`).
    pub fn new(channel_config: ChannelConfig, pool_config: PoolConfig) -> Result<Pool> {
        pool_config.validate()?;

        let counters = counters::counters_for(
            &channel_config.host,
            channel_config.database.as_deref().unwrap_or(""),
        );

        let (tx, rx) = crossbeam_channel::bounded(pool_config.size);
        for _ in 0..pool_config.size {
            tx.send(())
                .expect("bounded channel sized to its own capacity cannot be full here");
        }

        let mut slots = Vec::with_capacity(pool_config.size);
        slots.resize_with(pool_config.size, SlotCell::default);

        let inner = Arc::new(Inner {
            channel_config,
            pool_config,
            slots: Mutex::new(slots),
            cond: Condvar::new(),
            permits: (tx, rx),
            closed: AtomicBool::new(false),
            counters,
            on_unhealthy: Mutex::new(None),
            on_slow: Mutex::new(None),
            shutdown_lock: Mutex::new(()),
            shutdown_cond: Condvar::new(),
        });

        sweeper::spawn(inner.clone());

        Ok(Pool { inner })
    }

    /// Registers the unhealthy-channel notification sink (§4.E "Unhealthy
    /// notification"). Replaces any previously registered callback.
    pub fn on_unhealthy(&self, callback: impl Fn(usize) + Send + Sync + 'static) {
        *self
            .inner
            .on_unhealthy
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Box::new(callback));
    }

    /// Registers the slow-execution event sink (§4.E "Slow query surface").
    pub fn on_slow_execution(&self, callback: impl Fn(Duration) + Send + Sync + 'static) {
        *self.inner.on_slow.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(callback));
    }

    pub fn counters(&self) -> &Arc<Counters> {
        &self.inner.counters
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.pool_config
    }

    /// Bounded-wait acquire (§4.E "Acquire"). Blocks up to `T_acq`.
    pub fn acquire(&self) -> Result<Lease> {
        self.inner.acquire()
    }

    /// `QueryCommand` through a lease, with row-count and slow-execution
    /// instrumentation, and the query-timeout/KILL dance on `Err(Timeout)`
    /// (§4.E "Query-timeout and KILL"). This is the pool-mediated surface
    /// the §6 `Channel::submit` contract is specified at the seam of --
    /// `Channel::submit` itself has no notion of siblings.
    pub fn execute(&self, lease: &Lease, sql: &str) -> Result<Outcome> {
        let capabilities = lease.channel().descriptor().capabilities;
        let shape = SqlShape::classify(sql);
        self.inner
            .submit_tracked(lease, QueryCommand::new(sql, capabilities), Some(shape))
    }

    /// `COM_INIT_DB` (`USE <schema>`) through a lease (§4.C "InitDatabaseCommand
    /// specifics"). Never issued automatically by the pool.
    pub fn use_database(&self, lease: &Lease, schema: &str) -> Result<Outcome> {
        let capabilities = lease.channel().descriptor().capabilities;
        self.inner
            .submit_tracked(lease, InitDatabaseCommand::new(schema, capabilities), None)
    }

    /// `COM_PING` through a lease, outside of the channel's own heartbeat
    /// thread.
    pub fn ping(&self, lease: &Lease) -> Result<Outcome> {
        let capabilities = lease.channel().descriptor().capabilities;
        self.inner
            .submit_tracked(lease, PingCommand::new(capabilities), None)
    }

    /// Idempotent. Closes every channel the pool currently holds and wakes
    /// every thread blocked in `acquire` or the leak sweeper
    /// (§5 "Cancellation": "explicit Pool close broadcasts a shutdown
    /// signal").
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

/// A caller's time-bounded right to use a pooled channel (§3 "Pooled
/// connection", GLOSSARY "Lease"). Ownership of the channel itself stays
/// with the pool; dropping (or explicitly calling `release` on) a `Lease`
/// returns the slot to the free pool, not to the caller.
pub struct Lease {
    pool: Arc<Inner>,
    index: usize,
    generation: u64,
    channel: Channel,
}

impl Lease {
    fn new(pool: Arc<Inner>, index: usize, generation: u64, channel: Channel) -> Self {
        Lease {
            pool,
            index,
            generation,
            channel,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// The slot index this lease occupies, for diagnostics and for matching
    /// against `Pool::on_unhealthy` callback invocations.
    pub fn slot_index(&self) -> usize {
        self.index
    }

    /// Explicit release (§4.E "Release"). Equivalent to dropping the lease;
    /// provided because callers coming from a non-RAII background (the
    /// façade this core sits under) may prefer to call it by name. Idempotent
    /// with any other release of the same lease, including the implicit one
    /// on `Drop`.
    pub fn release(self) {
        drop(self)
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.pool.release_slot(self.index, self.generation);
    }
}

impl Inner {
    fn acquire(self: &Arc<Self>) -> Result<Lease> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::illegal_state("pool is closed"));
        }

        let deadline = Instant::now() + self.pool_config.acquire_timeout;

        let permit_wait = deadline.saturating_duration_since(Instant::now());
        if self.permits.1.recv_timeout(permit_wait).is_err() {
            self.counters.pool.on_acquire_failed();
            return Err(Error::illegal_state(
                "acquire timed out waiting for a free connection permit",
            ));
        }

        // If we return before handing out a `Lease`, the permit must go
        // back -- `armed` is disarmed the instant a `Lease` takes ownership
        // of it.
        struct PermitGuard<'a> {
            tx: &'a Sender<()>,
            armed: bool,
        }
        impl Drop for PermitGuard<'_> {
            fn drop(&mut self) {
                if self.armed {
                    let _ = self.tx.send(());
                }
            }
        }
        let mut permit_guard = PermitGuard {
            tx: &self.permits.0,
            armed: true,
        };

        let mut attempts = 0usize;
        loop {
            if self.closed.load(Ordering::SeqCst) {
                self.counters.pool.on_acquire_failed();
                return Err(Error::illegal_state("pool is closed"));
            }

            let now = Instant::now();
            if now >= deadline {
                self.counters.pool.on_acquire_failed();
                return Err(Error::illegal_state("acquire timed out"));
            }

            if attempts > self.pool_config.size {
                self.counters.pool.on_acquire_failed();
                return Err(Error::illegal_state(
                    "acquire failed after exhausting the retry budget",
                ));
            }

            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());

            if let Some(idx) = slots.iter().position(SlotCell::is_free) {
                let channel = match std::mem::take(&mut slots[idx].state) {
                    SlotState::Free(channel) => channel,
                    _ => unreachable!("position() only matched Free cells"),
                };

                if channel.is_broken() {
                    slots[idx].state = SlotState::Empty;
                    slots[idx].generation += 1;
                    drop(slots);
                    self.cond.notify_all();
                    channel.close();
                    attempts += 1;
                    continue;
                }

                slots[idx].generation += 1;
                let generation = slots[idx].generation;
                slots[idx].state = SlotState::Leased {
                    channel: channel.clone(),
                    acquired_at: now,
                    budget: self.pool_config.max_occupancy,
                };
                drop(slots);

                self.counters.pool.on_acquire();
                permit_guard.armed = false;
                return Ok(Lease::new(self.clone(), idx, generation, channel));
            }

            if let Some(idx) = slots.iter().position(SlotCell::is_empty) {
                slots[idx].state = SlotState::Connecting;
                drop(slots);

                let connected = self.connect_channel(idx);

                let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
                match connected {
                    Ok(channel) => {
                        slots[idx].generation += 1;
                        let generation = slots[idx].generation;
                        slots[idx].state = SlotState::Leased {
                            channel: channel.clone(),
                            acquired_at: Instant::now(),
                            budget: self.pool_config.max_occupancy,
                        };
                        drop(slots);

                        self.cond.notify_all();
                        self.counters.pool.on_acquire();
                        permit_guard.armed = false;
                        return Ok(Lease::new(self.clone(), idx, generation, channel));
                    }
                    Err(err) => {
                        slots[idx].state = SlotState::Empty;
                        drop(slots);
                        self.cond.notify_all();
                        log::warn!("failed to establish a pooled mysql connection: {}", err);
                        attempts += 1;
                        continue;
                    }
                }
            }

            // Every slot is either Leased or being Connected by a sibling
            // acquirer; wait for either to change and retry.
            let wait = deadline
                .saturating_duration_since(Instant::now())
                .min(Duration::from_millis(50));
            let (_guard, _timed_out) = self
                .cond
                .wait_timeout(slots, wait.max(Duration::from_millis(1)))
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    fn connect_channel(self: &Arc<Self>, index: usize) -> Result<Channel> {
        let notify_target = self.clone();
        let on_broken: BrokenCallback = Box::new(move |_connection_id| {
            notify_target.notify_unhealthy(index);
        });
        Channel::connect(&self.channel_config, on_broken)
    }

    fn notify_unhealthy(&self, index: usize) {
        log::warn!("mysql pool: channel in slot {} transitioned to Broken", index);
        if let Some(callback) = self
            .on_unhealthy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            callback(index);
        }
    }

    fn notify_slow(&self, elapsed: Duration) {
        log::warn!("mysql pool: command exceeded the slow-execution threshold ({:?})", elapsed);
        if let Some(callback) = self.on_slow.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            callback(elapsed);
        }
    }

    /// Flips a `Leased` cell back to `Free`, but only if `generation` still
    /// matches -- a mismatch means the leak sweeper (or a prior release of
    /// the same lease) already reclaimed this slot, so the call is a no-op
    /// (§4.E "Release ... idempotent").
    fn release_slot(&self, index: usize, generation: u64) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let cell = &mut slots[index];
        if cell.generation != generation {
            return;
        }

        if let SlotState::Leased { channel, .. } = &cell.state {
            let channel = channel.clone();
            cell.state = SlotState::Free(channel);
            drop(slots);
            self.counters.pool.on_release();
            self.cond.notify_all();
            // Hands the permit this lease was holding back to the semaphore.
            // `acquire`'s `PermitGuard` only returns a permit for an attempt
            // that never produced a `Lease`; every successful one is repaid
            // here, exactly once per generation, when the lease ends.
            let _ = self.permits.0.send(());
        }
    }

    /// Force-reclaims every `Leased` cell whose occupancy budget has
    /// elapsed (§4.E "Leak sweeper").
    fn sweep_once(&self) {
        let now = Instant::now();
        let mut reclaimed: Vec<(usize, Channel, bool)> = Vec::new();

        {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            for (idx, cell) in slots.iter_mut().enumerate() {
                let overdue = matches!(
                    &cell.state,
                    SlotState::Leased { acquired_at, budget, .. }
                        if now.duration_since(*acquired_at) > *budget
                );
                if !overdue {
                    continue;
                }

                let channel = match std::mem::take(&mut cell.state) {
                    SlotState::Leased { channel, .. } => channel,
                    _ => unreachable!("`overdue` only matches Leased cells"),
                };
                let outstanding = channel.has_outstanding_command();
                cell.generation += 1;
                cell.state = SlotState::Free(channel.clone());
                reclaimed.push((idx, channel, outstanding));
            }
        }

        if reclaimed.is_empty() {
            return;
        }

        self.cond.notify_all();
        for (idx, channel, outstanding) in reclaimed {
            self.counters.pool.on_leak();
            self.counters.pool.on_release();
            log::warn!(
                "mysql pool: reclaimed leaked slot {} (command still outstanding: {})",
                idx,
                outstanding
            );
            if outstanding {
                // The stream's state is indeterminate -- a half-written
                // request or a half-read response -- so the channel cannot
                // simply be reused (§4.E "Leak sweeper").
                channel.mark_broken();
            }
            // The generation bump above means the abandoned `Lease`, whenever
            // it eventually drops, will find a mismatch and skip `release_slot`
            // entirely -- so the permit it holds must be repaid here instead,
            // exactly once.
            let _ = self.permits.0.send(());
        }
    }

    /// The out-of-band cancellation path (§4.E "Query-timeout and KILL"):
    /// acquire a sibling, `KILL` the timed-out connection id on it, release
    /// the sibling, and mark the timed-out channel `Broken`.
    fn on_query_timeout(self: &Arc<Self>, lease: &Lease) {
        let connection_id = lease.channel().connection_id();
        log::warn!(
            "mysql query timed out on connection_id={}; issuing KILL on a sibling channel",
            connection_id
        );

        match self.acquire() {
            Ok(sibling) => {
                let capabilities = sibling.channel().descriptor().capabilities;
                let kill_timeout = self.pool_config.query_timeout.min(Duration::from_secs(5));
                if let Err(err) = sibling
                    .channel()
                    .submit(KillCommand::new(connection_id, capabilities), kill_timeout)
                {
                    log::warn!("KILL {} failed: {}", connection_id, err);
                }
                // `sibling` is released back to the pool when it drops here.
            }
            Err(err) => {
                log::warn!(
                    "no sibling channel available to KILL connection_id={}: {}",
                    connection_id,
                    err
                );
            }
        }

        lease.channel().mark_broken();
    }

    fn submit_tracked<C: Command + 'static>(
        self: &Arc<Self>,
        lease: &Lease,
        command: C,
        shape: Option<SqlShape>,
    ) -> Result<Outcome> {
        let started = Instant::now();
        let result = lease
            .channel()
            .submit(command, self.pool_config.query_timeout);
        let elapsed = started.elapsed();

        match &result {
            Ok(outcome) => {
                if let Some(shape) = shape {
                    self.counters.rows.record(shape, outcome_row_count(outcome));
                }
                if elapsed > self.pool_config.slow_query_threshold {
                    self.counters.errors.record(&Error::SlowExecution);
                    self.notify_slow(elapsed);
                }
            }
            Err(Error::Timeout) => {
                self.counters.errors.record(&Error::Timeout);
                self.on_query_timeout(lease);
            }
            Err(err) => {
                self.counters.errors.record(err);
            }
        }

        result
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return; // already closed
        }

        self.shutdown_cond.notify_all();
        self.cond.notify_all();

        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        for cell in slots.iter_mut() {
            match std::mem::take(&mut cell.state) {
                SlotState::Free(channel) | SlotState::Leased { channel, .. } => channel.close(),
                SlotState::Empty | SlotState::Connecting => {}
            }
            cell.state = SlotState::Empty;
        }
    }
}

fn outcome_row_count(outcome: &Outcome) -> u64 {
    match outcome {
        Outcome::ResultSet { rows, .. } => rows.len() as u64,
        Outcome::Done { affected_rows, .. } => *affected_rows,
        Outcome::Quit => 0,
    }
}
