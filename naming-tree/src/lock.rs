//! The per-node fair reader/writer primitive backing [`crate::DirectoryNode`]'s
//! lock state. This is
//! node-local: it knows nothing about ancestor chains or paths. The
//! hierarchical acquire/release protocol across a path's ancestor chain
//! lives in `naming-lock-manager`, which calls the primitives here once per
//! node.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

struct Waiter {
    id: u64,
    mode: LockMode,
}

struct State {
    shared_holders: usize,
    exclusive_held: bool,
    waiters: VecDeque<Waiter>,
}

impl State {
    fn compatible_with_holders(&self, mode: LockMode) -> bool {
        if self.exclusive_held {
            return false;
        }
        match mode {
            LockMode::Shared => true,
            LockMode::Exclusive => self.shared_holders == 0,
        }
    }

    /// True iff `id` is within the currently admissible prefix of the
    /// waiter queue: either it is the sole queued writer at the head, or it
    /// is part of a contiguous run of queued readers at the head. A queued
    /// writer blocks every reader behind it (writer preference).
    fn admissible(&self, id: u64, mode: LockMode) -> bool {
        if !self.compatible_with_holders(mode) {
            return false;
        }
        for w in &self.waiters {
            if w.id == id {
                return true;
            }
            if mode == LockMode::Shared && w.mode == LockMode::Shared {
                continue;
            }
            return false;
        }
        false
    }
}

/// A single node's fair, writer-preferring reader/writer lock.
pub struct NodeLock {
    state: Mutex<State>,
    condvar: Condvar,
    next_ticket: AtomicU64,
}

impl Default for NodeLock {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                shared_holders: 0,
                exclusive_held: false,
                waiters: VecDeque::new(),
            }),
            condvar: Condvar::new(),
            next_ticket: AtomicU64::new(0),
        }
    }
}

impl NodeLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `mode` can be granted, then grants it.
    pub fn acquire(&self, mode: LockMode) {
        let mut guard = self.state.lock();

        if guard.waiters.is_empty() && guard.compatible_with_holders(mode) {
            self.admit(&mut guard, mode);
            return;
        }

        let id = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        guard.waiters.push_back(Waiter { id, mode });

        loop {
            if guard.admissible(id, mode) {
                guard.waiters.retain(|w| w.id != id);
                self.admit(&mut guard, mode);
                // Admitting this ticket may have changed which waiter is now
                // at the head of the queue; wake everyone so they re-check.
                self.condvar.notify_all();
                return;
            }
            self.condvar.wait(&mut guard);
        }
    }

    /// Like [`acquire`](Self::acquire), but returns `false` instead of
    /// blocking forever if `cancelled` becomes `true` while waiting. On
    /// cancellation the waiter's ticket is removed and the node is
    /// re-notified so that any peer whose admissibility depended on queue
    /// order re-checks.
    pub fn acquire_cancelable(&self, mode: LockMode, cancelled: &std::sync::atomic::AtomicBool) -> bool {
        let mut guard = self.state.lock();

        if guard.waiters.is_empty() && guard.compatible_with_holders(mode) {
            self.admit(&mut guard, mode);
            return true;
        }

        let id = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        guard.waiters.push_back(Waiter { id, mode });

        loop {
            if guard.admissible(id, mode) {
                guard.waiters.retain(|w| w.id != id);
                self.admit(&mut guard, mode);
                self.condvar.notify_all();
                return true;
            }
            if cancelled.load(Ordering::SeqCst) {
                guard.waiters.retain(|w| w.id != id);
                self.condvar.notify_all();
                return false;
            }
            self.condvar
                .wait_for(&mut guard, std::time::Duration::from_millis(20));
        }
    }

    pub fn release(&self, mode: LockMode) {
        let mut guard = self.state.lock();
        match mode {
            LockMode::Shared => {
                debug_assert!(guard.shared_holders > 0);
                guard.shared_holders = guard.shared_holders.saturating_sub(1);
            }
            LockMode::Exclusive => {
                debug_assert!(guard.exclusive_held);
                guard.exclusive_held = false;
            }
        }
        self.condvar.notify_all();
    }

    /// True iff the node is currently held in `mode` by at least one holder.
    /// Used to validate `unlock` calls.
    pub fn is_held(&self, mode: LockMode) -> bool {
        let guard = self.state.lock();
        match mode {
            LockMode::Shared => guard.shared_holders > 0,
            LockMode::Exclusive => guard.exclusive_held,
        }
    }

    fn admit(&self, guard: &mut State, mode: LockMode) {
        match mode {
            LockMode::Shared => guard.shared_holders += 1,
            LockMode::Exclusive => guard.exclusive_held = true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn multiple_readers_concurrent() {
        let lock = Arc::new(NodeLock::new());
        lock.acquire(LockMode::Shared);
        lock.acquire(LockMode::Shared);
        assert!(lock.is_held(LockMode::Shared));
        lock.release(LockMode::Shared);
        assert!(lock.is_held(LockMode::Shared));
        lock.release(LockMode::Shared);
        assert!(!lock.is_held(LockMode::Shared));
    }

    #[test]
    fn exclusive_excludes_everything() {
        let lock = Arc::new(NodeLock::new());
        lock.acquire(LockMode::Exclusive);

        let lock2 = lock.clone();
        let got_in = Arc::new(AtomicBool::new(false));
        let got_in2 = got_in.clone();
        let handle = thread::spawn(move || {
            lock2.acquire(LockMode::Shared);
            got_in2.store(true, Ordering::SeqCst);
            lock2.release(LockMode::Shared);
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!got_in.load(Ordering::SeqCst));

        lock.release(LockMode::Exclusive);
        handle.join().unwrap();
        assert!(got_in.load(Ordering::SeqCst));
    }

    #[test]
    fn writer_preference_blocks_new_readers() {
        let lock = Arc::new(NodeLock::new());
        lock.acquire(LockMode::Shared); // reader 1 holds

        let order = Arc::new(Mutex::new(Vec::new()));

        // A writer enqueues while the reader holds the lock.
        let lock_w = lock.clone();
        let order_w = order.clone();
        let writer = thread::spawn(move || {
            lock_w.acquire(LockMode::Exclusive);
            order_w.lock().push("writer");
            lock_w.release(LockMode::Exclusive);
        });
        thread::sleep(Duration::from_millis(30));

        // A second reader arrives after the writer has enqueued.
        let lock_r = lock.clone();
        let order_r = order.clone();
        let late_reader = thread::spawn(move || {
            lock_r.acquire(LockMode::Shared);
            order_r.lock().push("late_reader");
            lock_r.release(LockMode::Shared);
        });
        thread::sleep(Duration::from_millis(30));

        lock.release(LockMode::Shared); // reader 1 releases

        writer.join().unwrap();
        late_reader.join().unwrap();

        assert_eq!(vec!["writer", "late_reader"], *order.lock());
    }
}
