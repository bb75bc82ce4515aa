//! Cancelable timer service
//!
//! Timers are driven by an explicit clock (milliseconds since the owner
//! started) instead of wall time, so every owner decides when time advances.
//! A timer fires at most once: after it expires or is cancelled its handle is
//! dead and `cancel` returns false.

/// Opaque handle returned by [`TimerQueue::schedule`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct TimerEntry<T> {
    handle: TimerHandle,
    deadline: u64,
    payload: T,
}

/// Small deadline queue; owners hold a handful of timers at most
#[derive(Debug)]
pub struct TimerQueue<T> {
    next_id: u64,
    entries: Vec<TimerEntry<T>>,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: Vec::new(),
        }
    }

    /// Schedule `payload` to fire `delay_ms` after `now`
    pub fn schedule(&mut self, now: u64, delay_ms: u64, payload: T) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.entries.push(TimerEntry {
            handle,
            deadline: now.saturating_add(delay_ms),
            payload,
        });
        handle
    }

    /// Cancel a pending timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.entries.iter().position(|e| e.handle == handle) {
            Some(index) => {
                self.entries.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.entries.iter().any(|e| e.handle == handle)
    }

    /// Remove and return every timer whose deadline is at or before `now`,
    /// earliest first
    pub fn expire(&mut self, now: u64) -> Vec<(TimerHandle, T)> {
        let mut fired = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].deadline <= now {
                fired.push(self.entries.swap_remove(i));
            } else {
                i += 1;
            }
        }
        fired.sort_by_key(|e| (e.deadline, e.handle.0));
        fired.into_iter().map(|e| (e.handle, e.payload)).collect()
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.iter().map(|e| e.deadline).min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
