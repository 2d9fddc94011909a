//! The pool core: check-out/check-in arbitration, FIFO waiters, idle
//! reclamation and shutdown
//!
//! All pool state lives behind a single mutex. Blocked check-outs each own a
//! private handoff channel; a freed handle is dequeued-and-sent to the
//! longest waiter while the lock is held, which makes delivery atomic and
//! resolves the timeout-versus-assignment race in favor of the assignment.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::errors::{Error, Result};
use crate::metrics::PoolStats;
use crate::store::{Builder, Store};

/// What a blocked check-out eventually receives from the pool.
enum Delivery<S> {
    /// A live handle freed by a concurrent check-in.
    Handle(S),
    /// Capacity freed by a failed build; the receiver now owns a creation
    /// slot and retries the builder itself.
    Vacancy,
    /// The pool stopped while the request was queued.
    Shutdown,
}

struct Waiter<S> {
    id: u64,
    enqueued_at: Instant,
    tx: Sender<Delivery<S>>,
}

struct Idle<S> {
    store: S,
    since: Instant,
}

struct State<S> {
    /// Live handles: available plus checked out, including reserved
    /// creation slots whose build is still in flight.
    total: usize,
    /// Idle handles, oldest first. Check-out takes from the back, the
    /// reaper from the front.
    available: VecDeque<Idle<S>>,
    /// Blocked check-outs in arrival order.
    waiters: VecDeque<Waiter<S>>,
    next_waiter: u64,
    stopped: bool,
    /// Basis for `stats().idle_time`.
    last_activity: Instant,
}

impl<S> State<S> {
    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

struct Shared<B: Builder> {
    builder: B,
    config: PoolConfig,
    state: Mutex<State<B::Store>>,
    /// Re-arms the reaper when a handle goes idle and wakes it for shutdown.
    reaper: Condvar,
    /// Signalled on every `total` decrement after the pool has stopped;
    /// `stop` waits here for outstanding handles.
    drained: Condvar,
}

/// Bounded pool of store handles shared across threads.
///
/// Handles are created on demand through the [`Builder`] up to `max`, kept
/// warm down to `min`, retired by a background reaper once idle for `ttl`,
/// and lent to exactly one caller at a time. When the pool is exhausted,
/// callers queue and are served strictly first come, first served.
///
/// Cloning is cheap and yields another handle onto the same pool.
///
/// # Examples
///
/// ```
/// use polystore::adapters::Memory;
/// use polystore::{PoolConfig, PoolManager};
///
/// # fn main() -> polystore::Result<()> {
/// let manager = PoolManager::new(Memory::new(), PoolConfig::new().with_max(2))?;
///
/// let first = manager.check_out()?;
/// let second = manager.check_out()?;
/// assert_eq!(manager.stats().stores, 2);
///
/// drop(first); // returns the handle to the pool
/// drop(second);
/// manager.stop();
/// # Ok(())
/// # }
/// ```
pub struct PoolManager<B: Builder> {
    shared: Arc<Shared<B>>,
}

impl<B: Builder> Clone for PoolManager<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: Builder> PoolManager<B> {
    /// Creates the pool, warms it to `config.min` handles and spawns the
    /// idle reaper. A builder failure during warm-up fails construction.
    pub fn new(builder: B, config: PoolConfig) -> Result<Self> {
        let mut available = VecDeque::with_capacity(config.min);
        for _ in 0..config.min {
            available.push_back(Idle {
                store: builder.build()?,
                since: Instant::now(),
            });
        }
        let total = available.len();

        let shared = Arc::new(Shared {
            builder,
            config,
            state: Mutex::new(State {
                total,
                available,
                waiters: VecDeque::new(),
                next_waiter: 0,
                stopped: false,
                last_activity: Instant::now(),
            }),
            reaper: Condvar::new(),
            drained: Condvar::new(),
        });

        let for_reaper = Arc::clone(&shared);
        thread::Builder::new()
            .name("polystore-reaper".into())
            .spawn(move || reaper_loop(for_reaper))?;

        Ok(Self { shared })
    }

    /// Borrows a store handle, creating one when capacity allows and
    /// queueing FIFO behind other requests when it does not.
    ///
    /// Fails with [`Error::Shutdown`] once the pool has stopped, with
    /// [`Error::Timeout`] when the configured `timeout` elapses first, and
    /// propagates builder failures verbatim.
    pub fn check_out(&self) -> Result<PooledStore<B>> {
        let deadline = self.shared.config.timeout.map(|t| Instant::now() + t);
        let store = self.acquire(deadline)?;
        Ok(PooledStore {
            store: Some(store),
            shared: Arc::clone(&self.shared),
        })
    }

    /// Async adapter over [`check_out`](Self::check_out); the blocking wait
    /// runs on the tokio blocking thread pool.
    pub async fn check_out_async(&self) -> Result<PooledStore<B>> {
        let manager = self.clone();
        match tokio::task::spawn_blocking(move || manager.check_out()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Cancelled),
        }
    }

    fn acquire(&self, deadline: Option<Instant>) -> Result<B::Store> {
        let (rx, id) = {
            let mut state = self.shared.state.lock();
            state.touch();
            if state.stopped {
                return Err(Error::Shutdown);
            }
            if let Some(idle) = state.available.pop_back() {
                return Ok(idle.store);
            }
            if self.shared.config.max.map_or(true, |max| state.total < max) {
                state.total += 1;
                drop(state);
                return self.build_reserved();
            }

            let (tx, rx) = channel::bounded(1);
            let id = state.next_waiter;
            state.next_waiter += 1;
            state.waiters.push_back(Waiter {
                id,
                enqueued_at: Instant::now(),
                tx,
            });
            (rx, id)
        };
        self.await_delivery(rx, id, deadline)
    }

    /// Builds a new store against a slot already counted in `total`. On
    /// failure the slot moves to the longest waiter, who retries creation
    /// itself; with nobody waiting it is released, leaving the pool exactly
    /// as before the attempt.
    fn build_reserved(&self) -> Result<B::Store> {
        match self.shared.builder.build() {
            Ok(store) => Ok(store),
            Err(err) => {
                let mut state = self.shared.state.lock();
                state.touch();
                while let Some(waiter) = state.waiters.pop_front() {
                    if waiter.tx.send(Delivery::Vacancy).is_ok() {
                        return Err(err);
                    }
                }
                state.total -= 1;
                self.shared.drained.notify_all();
                Err(err)
            }
        }
    }

    fn await_delivery(
        &self,
        rx: Receiver<Delivery<B::Store>>,
        id: u64,
        deadline: Option<Instant>,
    ) -> Result<B::Store> {
        let received = match deadline {
            Some(at) => rx.recv_deadline(at),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(delivery) => self.open_delivery(delivery),
            Err(RecvTimeoutError::Timeout) => {
                let still_queued = {
                    let mut state = self.shared.state.lock();
                    state.touch();
                    match state.waiters.iter().position(|w| w.id == id) {
                        Some(pos) => {
                            state.waiters.remove(pos);
                            true
                        }
                        None => false,
                    }
                };
                if still_queued {
                    return Err(Error::Timeout(
                        self.shared.config.timeout.unwrap_or_default(),
                    ));
                }
                // Dequeued concurrently: the delivery was sent under the
                // lock before our entry disappeared, so it is already in
                // the channel and the assignment wins.
                match rx.try_recv() {
                    Ok(delivery) => self.open_delivery(delivery),
                    Err(_) => Err(Error::Shutdown),
                }
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::Shutdown),
        }
    }

    fn open_delivery(&self, delivery: Delivery<B::Store>) -> Result<B::Store> {
        match delivery {
            Delivery::Handle(store) => Ok(store),
            Delivery::Vacancy => self.build_reserved(),
            Delivery::Shutdown => Err(Error::Shutdown),
        }
    }

    /// Gracefully shuts the pool down: fails every queued waiter with
    /// [`Error::Shutdown`], closes all idle handles, then blocks until every
    /// checked-out handle has been returned and closed. Idempotent; a second
    /// call after the pool has drained returns immediately.
    pub fn stop(&self) {
        let mut state = self.shared.state.lock();
        if !state.stopped {
            state.stopped = true;
            state.touch();
            for waiter in state.waiters.drain(..) {
                let _ = waiter.tx.send(Delivery::Shutdown);
            }
            let idle = std::mem::take(&mut state.available);
            debug!(closing = idle.len(), outstanding = state.total - idle.len(), "pool stopping");
            self.shared.reaper.notify_all();
            for mut entry in idle {
                MutexGuard::unlocked(&mut state, || close_quietly(&mut entry.store));
                state.total -= 1;
            }
            self.shared.drained.notify_all();
        }
        while state.total > 0 {
            self.shared.drained.wait(&mut state);
        }
    }

    /// Immediate, best-effort teardown: stops the reaper, fails queued
    /// waiters and closes idle handles without waiting for checked-out
    /// handles to come back. Outstanding handles are closed whenever their
    /// holders drop them.
    pub fn kill(&self) {
        let mut state = self.shared.state.lock();
        let was_stopped = state.stopped;
        state.stopped = true;
        state.touch();
        for waiter in state.waiters.drain(..) {
            let _ = waiter.tx.send(Delivery::Shutdown);
        }
        let idle = std::mem::take(&mut state.available);
        if !was_stopped || !idle.is_empty() {
            debug!(closing = idle.len(), "pool killed");
        }
        self.shared.reaper.notify_all();
        for mut entry in idle {
            MutexGuard::unlocked(&mut state, || close_quietly(&mut entry.store));
            state.total -= 1;
        }
        self.shared.drained.notify_all();
    }

    /// A consistent snapshot of pool occupancy and scheduling state. Cheap:
    /// one short lock hold, no I/O.
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            stores: state.total,
            available: state.available.len(),
            waiting: state.waiters.len(),
            longest_wait: state.waiters.front().map(|w| w.enqueued_at.elapsed()),
            idle_time: state.last_activity.elapsed(),
        }
    }
}

/// A store handle checked out of the pool, lent to exactly one caller.
///
/// Dereferences to the underlying store. Dropping the guard checks the
/// handle back in: it goes to the longest waiter if any, otherwise to the
/// idle set — or straight to `close` once the pool has stopped.
pub struct PooledStore<B: Builder> {
    store: Option<B::Store>,
    shared: Arc<Shared<B>>,
}

impl<B: Builder> Deref for PooledStore<B> {
    type Target = B::Store;

    fn deref(&self) -> &Self::Target {
        self.store.as_ref().expect("store already returned")
    }
}

impl<B: Builder> DerefMut for PooledStore<B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.store.as_mut().expect("store already returned")
    }
}

impl<B: Builder> Drop for PooledStore<B> {
    fn drop(&mut self) {
        if let Some(store) = self.store.take() {
            check_in(&self.shared, store);
        }
    }
}

/// Returns a handle to the pool: longest waiter first, idle set otherwise,
/// closed immediately once the pool has stopped.
fn check_in<B: Builder>(shared: &Shared<B>, store: B::Store) {
    let mut state = shared.state.lock();
    state.touch();

    if state.stopped {
        let mut store = store;
        MutexGuard::unlocked(&mut state, || close_quietly(&mut store));
        state.total -= 1;
        shared.drained.notify_all();
        return;
    }

    let mut returned = store;
    while let Some(waiter) = state.waiters.pop_front() {
        match waiter.tx.send(Delivery::Handle(returned)) {
            Ok(()) => return,
            Err(send) => match send.into_inner() {
                // The waiter went away without dequeueing itself; pass the
                // handle to the next one.
                Delivery::Handle(store) => returned = store,
                _ => return,
            },
        }
    }

    state.available.push_back(Idle {
        store: returned,
        since: Instant::now(),
    });
    shared.reaper.notify_one();
}

fn close_quietly<S: Store>(store: &mut S) {
    if let Err(err) = store.close() {
        warn!(error = %err, "failed to close pooled store");
    }
}

/// Background reaper: sleeps until the earliest idle handle crosses `ttl`,
/// then closes every eligible handle oldest-idle first, never taking the
/// pool below `min`. With nothing schedulable it parks on the condvar, so an
/// idle pool does no work at all.
fn reaper_loop<B: Builder>(shared: Arc<Shared<B>>) {
    let mut state = shared.state.lock();
    loop {
        if state.stopped {
            return;
        }
        let Some(ttl) = shared.config.ttl else {
            shared.reaper.wait(&mut state);
            continue;
        };

        let now = Instant::now();
        let mut reaped = Vec::new();
        while state.total > shared.config.min
            && state
                .available
                .front()
                .is_some_and(|idle| now.duration_since(idle.since) >= ttl)
        {
            if let Some(idle) = state.available.pop_front() {
                state.total -= 1;
                reaped.push(idle.store);
            }
        }
        if !reaped.is_empty() {
            state.touch();
            debug!(reaped = reaped.len(), remaining = state.total, "closed idle stores past ttl");
            MutexGuard::unlocked(&mut state, || {
                for mut store in reaped {
                    close_quietly(&mut store);
                }
            });
            // State may have moved while the lock was released.
            continue;
        }

        let next = if state.total > shared.config.min {
            state.available.front().map(|idle| idle.since + ttl)
        } else {
            None
        };
        match next {
            Some(at) => {
                let _ = shared.reaper.wait_until(&mut state, at);
            }
            None => shared.reaper.wait(&mut state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Memory;

    #[test]
    fn check_out_reuses_idle_handles() {
        let manager = PoolManager::new(Memory::new(), PoolConfig::new().with_max(1)).unwrap();

        let store = manager.check_out().unwrap();
        drop(store);
        let _again = manager.check_out().unwrap();

        let stats = manager.stats();
        assert_eq!(stats.stores, 1);
        assert_eq!(stats.available, 0);
        manager.kill();
    }

    #[test]
    fn stats_reflect_check_in() {
        let manager = PoolManager::new(Memory::new(), PoolConfig::new()).unwrap();

        let store = manager.check_out().unwrap();
        assert_eq!(manager.stats().available, 0);
        drop(store);
        assert_eq!(manager.stats().available, 1);
        manager.stop();
    }

    #[test]
    fn stopped_pool_rejects_check_out() {
        let manager = PoolManager::new(Memory::new(), PoolConfig::new()).unwrap();
        manager.stop();
        assert!(matches!(manager.check_out(), Err(Error::Shutdown)));
    }

    #[tokio::test]
    async fn async_check_out_round_trips() {
        let manager = PoolManager::new(Memory::new(), PoolConfig::new().with_max(1)).unwrap();

        let store = manager.check_out_async().await.unwrap();
        drop(store);
        let _again = manager.check_out_async().await.unwrap();
        manager.kill();
    }
}
