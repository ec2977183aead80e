// =============================================================================
// MinimalOS Panic Path - Kernel Synchronization Primitives
// =============================================================================
//
// Lock ordering is not a convention here, it is checked. Every SpinLock has a
// LockRank; a thread must take locks from the highest rank down and release
// them in reverse:
//
//   PROCESS (0x10) → THREAD (0x08) → FILE_SYSTEM (0x04)
//     → INTERRUPTS (0x02) → MEMORY_MANAGER (0x01)
//
// A violation is a kernel panic. Once a thread is crashing the checks stand
// down, so the panic path itself can take whatever locks it needs.
// =============================================================================

pub mod spinlock;
