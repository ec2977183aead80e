//! Power-off on aarch64. Tried in this order:
//!
//! 1. [`Psci`]: PSCI `SYSTEM_OFF` through the firmware, once a conduit is
//!    configured (the device tree's `/psci` node says HVC or SMC)
//! 2. [`RpiWatchdog`]: the Raspberry Pi watchdog halt, once its MMIO base is
//!    configured

use core::convert::Infallible;
use core::sync::atomic::{AtomicU8, Ordering};

use kpanic::{ResetReason, ShutdownError, ShutdownPrimitive, ShutdownSequence};

use super::rpi::RpiWatchdog;

/// PSCI 0.2 `SYSTEM_OFF` (SMC32 calling convention).
const PSCI_SYSTEM_OFF: u64 = 0x8400_0008;
const PSCI_NOT_SUPPORTED: i64 = -1;

/// How PSCI calls reach the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Conduit {
    None = 0,
    Hvc = 1,
    Smc = 2,
}

pub struct Psci {
    conduit: AtomicU8,
}

impl Psci {
    pub const fn new() -> Self {
        Self {
            conduit: AtomicU8::new(Conduit::None as u8),
        }
    }

    pub fn configure(&self, conduit: Conduit) {
        self.conduit.store(conduit as u8, Ordering::Release);
    }

    pub fn conduit(&self) -> Conduit {
        match self.conduit.load(Ordering::Acquire) {
            1 => Conduit::Hvc,
            2 => Conduit::Smc,
            _ => Conduit::None,
        }
    }

    /// SMCCC call with no arguments. The firmware may clobber x1-x17, so
    /// the call is declared with the C ABI clobbers and x1-x3 zeroed.
    fn call(conduit: Conduit, function: u64) -> i64 {
        let mut x0 = function;
        unsafe {
            match conduit {
                Conduit::Hvc => core::arch::asm!(
                    "hvc #0",
                    inout("x0") x0,
                    inlateout("x1") 0u64 => _,
                    inlateout("x2") 0u64 => _,
                    inlateout("x3") 0u64 => _,
                    clobber_abi("C"),
                    options(nostack),
                ),
                Conduit::Smc => core::arch::asm!(
                    "smc #0",
                    inout("x0") x0,
                    inlateout("x1") 0u64 => _,
                    inlateout("x2") 0u64 => _,
                    inlateout("x3") 0u64 => _,
                    clobber_abi("C"),
                    options(nostack),
                ),
                Conduit::None => return PSCI_NOT_SUPPORTED,
            }
        }
        x0 as i64
    }
}

impl Default for Psci {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownPrimitive for Psci {
    fn name(&self) -> &'static str {
        "psci"
    }

    fn power_off(&self, _reason: ResetReason) -> Result<Infallible, ShutdownError> {
        let conduit = self.conduit();
        if conduit == Conduit::None {
            return Err(ShutdownError::NotPresent);
        }
        match Self::call(conduit, PSCI_SYSTEM_OFF) {
            PSCI_NOT_SUPPORTED => Err(ShutdownError::NotPresent),
            code => Err(ShutdownError::Firmware(code)),
        }
    }
}

pub static PSCI: Psci = Psci::new();
pub static RPI_WATCHDOG: RpiWatchdog = RpiWatchdog::new();

static PRIMITIVES: [&dyn ShutdownPrimitive; 2] = [&PSCI, &RPI_WATCHDOG];

pub static SEQUENCE: ShutdownSequence<'static> = ShutdownSequence::new(&PRIMITIVES);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_psci_never_calls_firmware() {
        let psci = Psci::new();
        assert_eq!(psci.conduit(), Conduit::None);
        assert_eq!(
            psci.power_off(ResetReason::SystemFailure),
            Err(ShutdownError::NotPresent)
        );
    }

    #[test]
    fn sequence_order() {
        let names: Vec<_> = SEQUENCE.primitives().iter().map(|p| p.name()).collect();
        assert_eq!(names, ["psci", "rpi-watchdog"]);
    }
}
