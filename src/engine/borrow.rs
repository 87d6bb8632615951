//! # Column Borrow Tracking
//!
//! Every table column carries one [`BorrowState`], a runtime read/write
//! borrow flag that lets dataset guards hand out `&[T]` and `&mut [T]` over
//! column memory while only holding `&World`.
//!
//! ## Rules
//!
//! - Any number of readers may hold a column at once.
//! - A writer holds it exclusively.
//! - Acquisition never blocks. A conflicting request fails immediately and
//!   the caller decides whether to retry, which keeps a thread that already
//!   holds a guard from deadlocking on itself.
//!
//! ## State Encoding
//!
//! | State | Meaning |
//! |------:|--------|
//! | `0` | Unlocked |
//! | `1` | Write-locked (exclusive writer) |
//! | `>= 2` | Read-locked (`state - 1` active readers) |

use std::sync::atomic::{AtomicUsize, Ordering};


const UNLOCKED: usize = 0;
const WRITER: usize = 1;

/// Runtime borrow flag of a single column.
#[derive(Debug, Default)]
pub struct BorrowState {
    state: AtomicUsize,
}

impl BorrowState {
    /// Creates an unlocked state.
    pub const fn new() -> Self {
        Self { state: AtomicUsize::new(UNLOCKED) }
    }

    /// Attempts to take a shared borrow.
    ///
    /// ## State Transitions
    /// - `0 → 2` : first reader
    /// - `N → N+1` : additional reader
    /// - `1` : fails

    pub fn try_acquire_read(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == WRITER {
                return false;
            }
            let next = if current == UNLOCKED { 2 } else { current + 1 };
            match self.state.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Releases a shared borrow taken by [`try_acquire_read`](Self::try_acquire_read).
    pub fn release_read(&self) {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            debug_assert!(current >= 2, "release_read on a column that was not read-locked");
            // Last reader goes straight to 0; 2 -> 1 would read as a writer.
            let next = if current == 2 { UNLOCKED } else { current - 1 };
            match self.state.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Attempts to take the exclusive borrow (`0 → 1`).
    pub fn try_acquire_write(&self) -> bool {
        self.state
            .compare_exchange(UNLOCKED, WRITER, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Releases the exclusive borrow.
    pub fn release_write(&self) {
        let previous = self.state.swap(UNLOCKED, Ordering::AcqRel);
        debug_assert!(previous == WRITER, "release_write on a column that was not write-locked");
    }

    /// Returns `true` if no guard is alive.
    pub fn is_unlocked(&self) -> bool {
        self.state.load(Ordering::Acquire) == UNLOCKED
    }
}
