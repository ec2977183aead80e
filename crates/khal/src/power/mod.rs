//! Machine power-off.
//!
//! Each architecture contributes the primitives it knows about as a fixed
//! [`ShutdownSequence`]; [`sequence`] hands out the one for the target. The
//! order is the order they are tried in and is part of each module's docs.

use kpanic::ShutdownSequence;

pub mod rpi;

#[cfg(target_arch = "x86_64")]
pub mod x86;

#[cfg(target_arch = "aarch64")]
pub mod aarch64;

#[cfg(target_arch = "riscv64")]
pub mod riscv64;

/// The shutdown sequence for the architecture being built for.
pub fn sequence() -> &'static ShutdownSequence<'static> {
    #[cfg(target_arch = "x86_64")]
    {
        &x86::SEQUENCE
    }
    #[cfg(target_arch = "aarch64")]
    {
        &aarch64::SEQUENCE
    }
    #[cfg(target_arch = "riscv64")]
    {
        &riscv64::SEQUENCE
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "riscv64")))]
    {
        static EMPTY: ShutdownSequence<'static> = ShutdownSequence::new(&[]);
        &EMPTY
    }
}
