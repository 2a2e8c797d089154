//! Concurrency limiter: a counting admission gate for conversion calls.
//!
//! Built on [`tokio::sync::Semaphore`], whose waiters are served in FIFO
//! order, so no task starves while slots keep being released.
//!
//! Admission hands out a [`SlotPermit`]. The permit returns its slot when it
//! is dropped, which happens on every exit path of the task holding it:
//! normal return, early `?` return, or a panic unwinding through the task.
//! A leaked slot would permanently shrink the batch's effective concurrency,
//! so release is tied to `Drop` rather than to an explicit call.
//!
//! Each permit also carries a slot number in `0..capacity`, which lets the
//! progress view show which document occupies which slot.

use crate::error::ConversionError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded admission gate shared by all task runners of one batch.
///
/// Cloning is cheap and yields a handle to the same gate.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    capacity: usize,
    semaphore: Arc<Semaphore>,
    free_slots: Mutex<Vec<usize>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyLimiter {
    /// Create a gate admitting at most `capacity` holders (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        // Reversed so that slot 0 is handed out first.
        let free_slots = (0..capacity).rev().collect();
        Self {
            inner: Arc::new(Inner {
                capacity,
                semaphore: Arc::new(Semaphore::new(capacity)),
                free_slots: Mutex::new(free_slots),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Wait until a slot is free, then reserve it.
    ///
    /// # Errors
    /// [`ConversionError::LimiterClosed`] if [`close`](Self::close) was called.
    pub async fn acquire(&self) -> Result<SlotPermit, ConversionError> {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ConversionError::LimiterClosed)?;

        let slot = {
            let mut free = self
                .inner
                .free_slots
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // A granted permit always has a free slot: slots are pushed back
            // before their permit is released (see `Drop for SlotPermit`).
            free.pop().unwrap_or(0)
        };

        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);

        Ok(SlotPermit {
            slot,
            limiter: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Stop admitting. Pending and future `acquire` calls fail.
    pub fn close(&self) {
        self.inner.semaphore.close();
    }

    /// Configured ceiling.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of slots held at the same time so far.
    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    /// Slots free right now.
    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }
}

/// A reserved slot. Dropping it releases the slot exactly once.
#[derive(Debug)]
pub struct SlotPermit {
    slot: usize,
    limiter: Arc<Inner>,
    // Dropped after `Drop::drop` below has returned the slot number.
    _permit: OwnedSemaphorePermit,
}

impl SlotPermit {
    /// Slot number in `0..capacity`.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.limiter.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.limiter
            .free_slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(self.slot);
    }
}
