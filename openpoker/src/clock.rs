//! Monotonic time source and timer scheduling.
//!
//! Every timed behavior in the runtime (turn timers, disconnect grace,
//! inter-hand delay, the tournament blind clock) goes through the [`Clock`]
//! trait so tests can drive virtual time. Deadlines are absolute epoch
//! milliseconds, but [`SystemClock`] derives them from a monotonic instant
//! so wall-clock adjustments never move a timer.
//!
//! Cancellation is idempotent: cancelling a timer that already fired is a
//! no-op, and a cancelled timer never delivers its callback.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::game::entities::UnixMillis;

pub type TimerId = u64;

pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

pub trait Clock: Send + Sync + 'static {
    /// Current time in epoch milliseconds, monotonic within a process.
    fn now_millis(&self) -> UnixMillis;

    /// Run `callback` once `deadline` passes. Past deadlines fire as soon
    /// as possible.
    fn schedule_at(&self, deadline: UnixMillis, callback: TimerCallback) -> TimerId;

    /// Cancel a scheduled timer. No-op for unknown or already-fired ids.
    fn cancel(&self, id: TimerId);
}

/// Production clock backed by the tokio timer. The epoch anchor is sampled
/// once at construction; elapsed time comes from a monotonic `Instant`.
pub struct SystemClock {
    base_instant: Instant,
    base_epoch: UnixMillis,
    next_id: AtomicU64,
    live: Arc<Mutex<std::collections::HashSet<TimerId>>>,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        let base_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as UnixMillis;
        Self {
            base_instant: Instant::now(),
            base_epoch,
            next_id: AtomicU64::new(1),
            live: Arc::new(Mutex::new(std::collections::HashSet::new())),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> UnixMillis {
        self.base_epoch + self.base_instant.elapsed().as_millis() as UnixMillis
    }

    fn schedule_at(&self, deadline: UnixMillis, callback: TimerCallback) -> TimerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let delay = deadline.saturating_sub(self.now_millis());
        let live = Arc::clone(&self.live);
        live.lock().expect("timer registry poisoned").insert(id);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            // Removal is the linearization point against `cancel`.
            let still_live = live.lock().expect("timer registry poisoned").remove(&id);
            if still_live {
                callback();
            }
        });
        id
    }

    fn cancel(&self, id: TimerId) {
        self.live.lock().expect("timer registry poisoned").remove(&id);
    }
}

/// Test clock with manually driven time. Callbacks run synchronously on
/// [`VirtualClock::advance`], in deadline order.
pub struct VirtualClock {
    inner: Mutex<VirtualInner>,
}

struct VirtualInner {
    now: UnixMillis,
    next_id: TimerId,
    timers: BTreeMap<(UnixMillis, TimerId), TimerCallback>,
}

impl VirtualClock {
    #[must_use]
    pub fn new(start: UnixMillis) -> Self {
        Self {
            inner: Mutex::new(VirtualInner {
                now: start,
                next_id: 1,
                timers: BTreeMap::new(),
            }),
        }
    }

    /// Advance time by `millis`, firing every timer whose deadline falls
    /// inside the window, in order.
    pub fn advance(&self, millis: UnixMillis) {
        let target = {
            let inner = self.inner.lock().expect("virtual clock poisoned");
            inner.now + millis
        };
        self.advance_to(target);
    }

    /// Advance to an absolute time.
    pub fn advance_to(&self, target: UnixMillis) {
        loop {
            let due = {
                let mut inner = self.inner.lock().expect("virtual clock poisoned");
                let next = inner
                    .timers
                    .first_key_value()
                    .map(|(&key, _)| key)
                    .filter(|&(deadline, _)| deadline <= target);
                match next {
                    Some((deadline, id)) => {
                        inner.now = inner.now.max(deadline);
                        inner.timers.remove(&(deadline, id))
                    }
                    None => {
                        inner.now = inner.now.max(target);
                        None
                    }
                }
            };
            match due {
                // Run outside the lock: callbacks may schedule or cancel.
                Some(callback) => callback(),
                None => break,
            }
        }
    }

    /// Number of timers currently scheduled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.lock().expect("virtual clock poisoned").timers.len()
    }
}

impl Clock for VirtualClock {
    fn now_millis(&self) -> UnixMillis {
        self.inner.lock().expect("virtual clock poisoned").now
    }

    fn schedule_at(&self, deadline: UnixMillis, callback: TimerCallback) -> TimerId {
        let mut inner = self.inner.lock().expect("virtual clock poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        let at = deadline.max(inner.now);
        inner.timers.insert((at, id), callback);
        id
    }

    fn cancel(&self, id: TimerId) {
        let mut inner = self.inner.lock().expect("virtual clock poisoned");
        inner.timers.retain(|&(_, timer_id), _| timer_id != id);
    }
}
