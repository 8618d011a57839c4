use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Debounced output pair for the two target zones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct HitPair {
    pub target1: bool,
    pub target2: bool,
}

impl HitPair {
    pub fn new(target1: bool, target2: bool) -> Self {
        Self { target1, target2 }
    }

    pub fn get(&self, index: usize) -> bool {
        match index {
            0 => self.target1,
            _ => self.target2,
        }
    }
}

impl From<[bool; 2]> for HitPair {
    fn from(values: [bool; 2]) -> Self {
        Self::new(values[0], values[1])
    }
}

#[derive(Debug, Default)]
struct QueueState {
    pending: Option<HitPair>,
    closed: bool,
    submitted: u64,
    coalesced: u64,
}

/// Single-slot, latest-wins handoff between the frame loop and the writer.
///
/// A submit never blocks and never grows the queue: an undelivered pair is
/// overwritten by the next one.
#[derive(Debug, Default)]
pub struct WriteQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Store `pair` as the pending request. Returns false once closed.
    pub fn submit(&self, pair: HitPair) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        if state.pending.replace(pair).is_some() {
            state.coalesced += 1;
        }
        state.submitted += 1;
        drop(state);
        self.ready.notify_one();
        true
    }

    /// Wait up to `timeout` for a pending request and take it.
    ///
    /// Returns early with `None` when the queue is closed.
    pub fn take(&self, timeout: Duration) -> Option<HitPair> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(pair) = state.pending.take() {
                return Some(pair);
            }
            if state.closed {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = match self.ready.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    pub fn try_take(&self) -> Option<HitPair> {
        self.lock().pending.take()
    }

    /// Reject further submits and wake any waiter. The pending pair is kept.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Total accepted submits.
    pub fn submitted(&self) -> u64 {
        self.lock().submitted
    }

    /// Submits that overwrote an undelivered pair.
    pub fn coalesced(&self) -> u64 {
        self.lock().coalesced
    }
}
