// =============================================================================
// MinimalOS Panic Path - Architecture Abstraction
// =============================================================================
//
// Only x86_64 boots. The rest of the kernel uses `crate::arch::*` and never
// names `x86_64` directly.
// =============================================================================

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

#[cfg(target_arch = "x86_64")]
pub use x86_64::*;
