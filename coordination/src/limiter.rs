//! Counting semaphore bounding concurrent model calls.
//!
//! Waiters queue in FIFO order. A released slot is handed directly to the
//! oldest waiter that is still alive, so a late arrival can never overtake
//! the queue. Dropping a queued `acquire()` future removes its entry; if the
//! slot had already been handed over, the drop passes it on.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::trace;

#[derive(Debug)]
struct Waiter {
    id: u64,
    tx: oneshot::Sender<()>,
}

#[derive(Debug)]
struct LimiterState {
    active: usize,
    capacity: usize,
    waiters: VecDeque<Waiter>,
    next_id: u64,
}

impl LimiterState {
    /// Hand the caller's slot to the next live waiter, or free it.
    fn release(&mut self) {
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.tx.send(()).is_ok() {
                trace!(waiter = waiter.id, "Slot handed to queued caller");
                return;
            }
        }
        self.active = self.active.saturating_sub(1);
    }
}

/// Shared handle to one semaphore. Clones refer to the same slots.
#[derive(Debug, Clone)]
pub struct CallLimiter {
    state: Arc<Mutex<LimiterState>>,
}

impl CallLimiter {
    /// A limiter with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(LimiterState {
                active: 0,
                capacity: capacity.max(1),
                waiters: VecDeque::new(),
                next_id: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a slot. The slot is held until the returned permit drops.
    pub async fn acquire(&self) -> CallPermit {
        loop {
            let (id, rx) = {
                let mut state = self.lock();
                if state.active < state.capacity && state.waiters.is_empty() {
                    state.active += 1;
                    return CallPermit {
                        limiter: self.clone(),
                    };
                }
                let id = state.next_id;
                state.next_id += 1;
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(Waiter { id, tx });
                (id, rx)
            };

            let mut pending = PendingAcquire {
                limiter: self,
                id,
                rx: Some(rx),
                settled: false,
            };
            let granted = match pending.rx.as_mut() {
                Some(rx) => rx.await.is_ok(),
                None => false,
            };
            pending.settled = true;
            if granted {
                return CallPermit {
                    limiter: self.clone(),
                };
            }
        }
    }

    /// Slots currently held.
    pub fn active(&self) -> usize {
        self.lock().active
    }

    /// Callers queued for a slot.
    pub fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }
}

/// Scoped slot. Releasing it wakes the next queued caller.
#[derive(Debug)]
pub struct CallPermit {
    limiter: CallLimiter,
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        self.limiter.lock().release();
    }
}

/// Queue entry owned by a suspended `acquire()`; cleans up on cancellation.
struct PendingAcquire<'a> {
    limiter: &'a CallLimiter,
    id: u64,
    rx: Option<oneshot::Receiver<()>>,
    settled: bool,
}

impl Drop for PendingAcquire<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.limiter.lock();
        if let Some(pos) = state.waiters.iter().position(|w| w.id == self.id) {
            state.waiters.remove(pos);
            return;
        }
        // Popped by a release while we were being cancelled: the send
        // succeeded because `rx` is still alive, so the slot is ours to pass on.
        state.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_acquire_within_capacity() {
        let limiter = CallLimiter::new(2);
        let a = limiter.acquire().await;
        let b = limiter.acquire().await;
        assert_eq!(limiter.active(), 2);
        drop(a);
        assert_eq!(limiter.active(), 1);
        drop(b);
        assert_eq!(limiter.active(), 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_clamped() {
        let limiter = CallLimiter::new(0);
        assert_eq!(limiter.capacity(), 1);
        let _p = limiter.acquire().await;
    }

    #[tokio::test]
    async fn test_waiters_served_fifo() {
        let limiter = CallLimiter::new(1);
        let held = limiter.acquire().await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut handles = Vec::new();
        for i in 0..4 {
            let task_limiter = limiter.clone();
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let _permit = task_limiter.acquire().await;
                tx.send(i).unwrap();
            }));
            // let each task enqueue before the next one starts
            while limiter.waiting() < i + 1 {
                tokio::task::yield_now().await;
            }
        }

        drop(held);
        for h in handles {
            h.await.unwrap();
        }
        drop(tx);

        let mut order = Vec::new();
        while let Some(i) = rx.recv().await {
            order.push(i);
        }
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert_eq!(limiter.active(), 0);
        assert_eq!(limiter.waiting(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_queue() {
        let limiter = CallLimiter::new(1);
        let held = limiter.acquire().await;

        let mut queued = Box::pin(limiter.acquire());
        assert!(tokio::time::timeout(Duration::ZERO, &mut queued)
            .await
            .is_err());
        assert_eq!(limiter.waiting(), 1);

        drop(queued);
        assert_eq!(limiter.waiting(), 0);

        drop(held);
        assert_eq!(limiter.active(), 0);
    }

    #[tokio::test]
    async fn test_cancel_after_handoff_passes_slot_on() {
        let limiter = CallLimiter::new(1);
        let held = limiter.acquire().await;

        let mut first = Box::pin(limiter.acquire());
        assert!(tokio::time::timeout(Duration::ZERO, &mut first)
            .await
            .is_err());
        let mut second = Box::pin(limiter.acquire());
        assert!(tokio::time::timeout(Duration::ZERO, &mut second)
            .await
            .is_err());
        assert_eq!(limiter.waiting(), 2);

        // slot goes to `first`, which is cancelled before it observes it
        drop(held);
        assert_eq!(limiter.waiting(), 1);
        drop(first);
        assert_eq!(limiter.waiting(), 0);
        assert_eq!(limiter.active(), 1);

        let permit = second.await;
        assert_eq!(limiter.active(), 1);
        drop(permit);
        assert_eq!(limiter.active(), 0);
    }

    #[tokio::test]
    async fn test_active_never_exceeds_capacity() {
        let limiter = CallLimiter::new(2);
        let peak = Arc::new(Mutex::new(0usize));
        let mut set = tokio::task::JoinSet::new();
        for _ in 0..10 {
            let limiter = limiter.clone();
            let peak = Arc::clone(&peak);
            set.spawn(async move {
                let _p = limiter.acquire().await;
                {
                    let mut peak = peak.lock().unwrap();
                    *peak = (*peak).max(limiter.active());
                }
                tokio::task::yield_now().await;
            });
        }
        while let Some(r) = set.join_next().await {
            r.unwrap();
        }
        assert!(*peak.lock().unwrap() <= 2);
        assert_eq!(limiter.active(), 0);
    }
}
