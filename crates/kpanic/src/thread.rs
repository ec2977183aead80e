//! Per-thread crash state.
//!
//! Once a thread is marked as crashing, the rest of the kernel stops
//! enforcing invariants on it that could fault again while the panic path is
//! printing, most notably lock-rank ordering.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use bitflags::bitflags;
use thiserror::Error;

/// A thread that can be flagged as crashing.
///
/// Implementations must perform a single lock-free write and nothing else:
/// the caller may already hold any lock in the system.
pub trait CrashMark: Sync {
    fn set_crashing(&self);
}

/// Access to the thread that was running when the fault happened.
pub trait CurrentThread: Sync {
    /// `None` when no thread is running yet (early boot, idle, interrupt
    /// context without a thread).
    fn current(&self) -> Option<&dyn CrashMark>;
}

bitflags! {
    /// Lock ranks. Locks must be taken from the highest rank down to the
    /// lowest, and released in the reverse order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LockRank: u32 {
        const MEMORY_MANAGER = 1 << 0;
        const INTERRUPTS     = 1 << 1;
        const FILE_SYSTEM    = 1 << 2;
        const THREAD         = 1 << 3;
        const PROCESS        = 1 << 4;
    }
}

impl LockRank {
    /// Locks outside the ranking scheme.
    pub const NONE: Self = Self::empty();

    fn lowest(self) -> Self {
        Self::from_bits_retain(self.bits() & self.bits().wrapping_neg())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockRankViolation {
    #[error("acquiring {acquired:?} while holding {held:?}")]
    OutOfOrderAcquire { held: LockRank, acquired: LockRank },
    #[error("releasing {0:?}, which is not a single rank")]
    NotSingle(LockRank),
    #[error("releasing {0:?}, which is not held")]
    NotHeld(LockRank),
    #[error("releasing {released:?} before {lowest:?}")]
    OutOfOrderRelease { released: LockRank, lowest: LockRank },
}

/// Crash flag and held lock ranks of one thread.
///
/// Only the owning thread touches the rank mask; the crash flag may be set
/// from the panic path on the same thread.
pub struct ThreadState {
    crashing: AtomicBool,
    lock_ranks: AtomicU32,
}

impl ThreadState {
    pub const fn new() -> Self {
        Self {
            crashing: AtomicBool::new(false),
            lock_ranks: AtomicU32::new(0),
        }
    }

    pub fn is_crashing(&self) -> bool {
        self.crashing.load(Ordering::Acquire)
    }

    pub fn held_ranks(&self) -> LockRank {
        LockRank::from_bits_retain(self.lock_ranks.load(Ordering::Relaxed))
    }

    /// Records that a lock of `rank` is being taken.
    ///
    /// Not checked once the thread is crashing.
    pub fn track_lock_acquire(&self, rank: LockRank) -> Result<(), LockRankViolation> {
        if rank.is_empty() || self.is_crashing() {
            return Ok(());
        }

        let held = self.held_ranks();
        if !held.is_empty() && held.lowest().bits() <= rank.bits() {
            return Err(LockRankViolation::OutOfOrderAcquire {
                held,
                acquired: rank,
            });
        }

        self.lock_ranks.store((held | rank).bits(), Ordering::Relaxed);
        Ok(())
    }

    /// Records that a lock of `rank` is being released.
    ///
    /// Not checked once the thread is crashing.
    pub fn track_lock_release(&self, rank: LockRank) -> Result<(), LockRankViolation> {
        if rank.is_empty() || self.is_crashing() {
            return Ok(());
        }

        if rank.bits().count_ones() != 1 {
            return Err(LockRankViolation::NotSingle(rank));
        }

        let held = self.held_ranks();
        if !held.contains(rank) {
            return Err(LockRankViolation::NotHeld(rank));
        }
        if held.lowest() != rank {
            return Err(LockRankViolation::OutOfOrderRelease {
                released: rank,
                lowest: held.lowest(),
            });
        }

        self.lock_ranks.store((held ^ rank).bits(), Ordering::Relaxed);
        Ok(())
    }
}

impl Default for ThreadState {
    fn default() -> Self {
        Self::new()
    }
}

impl CrashMark for ThreadState {
    fn set_crashing(&self) {
        self.crashing.store(true, Ordering::Release);
    }
}
