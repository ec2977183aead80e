// =============================================================================
// MinimalOS Panic Path - Ranked Ticket Spinlock
// =============================================================================
//
// A ticket spinlock provides mutual exclusion in a multi-core kernel.
// Threads acquire the lock in FIFO order, preventing starvation.
//
// HOW IT WORKS:
//   - Two counters: `next_ticket` and `now_serving`
//   - To lock: atomically increment `next_ticket`, get your ticket number.
//     Spin until `now_serving` equals your ticket.
//   - To unlock: increment `now_serving`, which lets the next waiter proceed.
//
// RANKS:
//   Each lock carries a LockRank. After acquiring, the current thread's
//   ThreadState records the rank and checks it against the ranks it already
//   holds; before releasing, the rank is checked and dropped again. With no
//   current thread (very early boot) nothing is tracked. LockRank::NONE opts
//   a lock out of tracking.
//
// IRQ SAFETY:
//   Interrupts are disabled while a lock is held and restored to their
//   previous state on unlock, so nested lock/unlock pairs work correctly.
// =============================================================================

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU32, Ordering};

use kpanic::{LockRank, kpanic};
use x86_64::instructions::interrupts;

use crate::task::thread;

/// A ticket-based spinlock with a lock rank that disables interrupts while
/// held.
///
/// ```ignore
/// static TABLE: SpinLock<[u32; 4]> = SpinLock::new(LockRank::THREAD, [0; 4]);
///
/// let mut table = TABLE.lock();
/// table[0] += 1;
/// ```
pub struct SpinLock<T> {
    /// The next ticket to be dispensed (atomically incremented by each locker).
    next_ticket: AtomicU32,

    /// The ticket number currently being served (incremented on unlock).
    now_serving: AtomicU32,

    rank: LockRank,

    /// The protected data. UnsafeCell is required because we mutate through
    /// a shared reference (the lock ensures exclusive access at runtime).
    data: UnsafeCell<T>,
}

// SAFETY: the lock ensures that only one core accesses T at a time.
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(rank: LockRank, value: T) -> Self {
        Self {
            next_ticket: AtomicU32::new(0),
            now_serving: AtomicU32::new(0),
            rank,
            data: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, disabling interrupts on the current core.
    ///
    /// Panics the kernel if taking a lock of this rank breaks the ordering
    /// of the locks the current thread already holds.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let irq_was_enabled = interrupts::are_enabled();
        interrupts::disable();

        let my_ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        while self.now_serving.load(Ordering::Acquire) != my_ticket {
            core::hint::spin_loop();
        }

        self.track_acquire();
        SpinLockGuard {
            lock: self,
            irq_was_enabled,
        }
    }

    fn track_acquire(&self) {
        if let Some(thread) = thread::current() {
            if let Err(violation) = thread.state().track_lock_acquire(self.rank) {
                kpanic!("thread {} ({}): {}", thread.id(), thread.name(), violation);
            }
        }
    }

    fn track_release(&self) {
        if let Some(thread) = thread::current() {
            if let Err(violation) = thread.state().track_lock_release(self.rank) {
                kpanic!("thread {} ({}): {}", thread.id(), thread.name(), violation);
            }
        }
    }
}

/// RAII guard for a held spinlock. Dropping it releases the lock and
/// restores the previous interrupt state.
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    irq_was_enabled: bool,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: We hold the lock, so we have exclusive access.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: We hold the lock, so we have exclusive access.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.track_release();

        // Release ordering ensures all our writes to the protected data
        // are visible to the next lock holder.
        self.lock.now_serving.fetch_add(1, Ordering::Release);

        if self.irq_was_enabled {
            interrupts::enable();
        }
    }
}
