//! Hardware Abstraction Layer.
//!
//! The hardware half of the panic path: stopping cores, powering the machine
//! off and a serial line that still works when nothing else does.
#![cfg_attr(not(test), no_std)]

pub mod cpu;
pub mod power;

#[cfg(target_arch = "x86_64")]
pub mod apic;
#[cfg(target_arch = "x86_64")]
pub mod port;
#[cfg(target_arch = "x86_64")]
pub mod serial;

pub use cpu::Cpu;
