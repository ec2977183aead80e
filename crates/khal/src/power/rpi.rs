//! Raspberry Pi power-off through the power-management watchdog.
//!
//! The BCM283x has no power-off register. The firmware, however, reads the
//! boot partition number out of `PM_RSTS` after a watchdog reset, and treats
//! partition 63 as "halt": the board resets into a state where it stays off.
//! So shutting down means: write 63 into the partition bits, arm the watchdog
//! with a short timeout and request a full reset.
//!
//! The MMIO base is only known once the platform has been identified, so the
//! primitive starts out absent and is enabled with [`RpiWatchdog::configure`].

use core::convert::Infallible;
use core::sync::atomic::{AtomicUsize, Ordering};

use kpanic::{ResetReason, ShutdownError, ShutdownPrimitive};

/// Every PM register write must carry this in the top byte.
pub const PM_PASSWORD: u32 = 0x5a00_0000;

const PM_RSTC: usize = 0x1c;
const PM_RSTS: usize = 0x20;
const PM_WDOG: usize = 0x24;

const PM_RSTC_WRCFG_CLR: u32 = 0xffff_ffcf;
const PM_RSTC_WRCFG_FULL_RESET: u32 = 0x0000_0020;
const PM_RSTS_PARTITION_CLR: u32 = 0xffff_faaa;

/// The partition number the firmware takes to mean "stay halted".
pub const HALT_PARTITION: u32 = 63;

/// Watchdog ticks (about 16 us each) before the reset fires.
const WATCHDOG_TICKS: u32 = 10;

/// Spins to wait for the reset before giving up.
const RESET_WAIT_SPINS: usize = 1 << 20;

/// Spreads a 6-bit partition number over the even bits of `PM_RSTS`.
pub const fn partition_bits(partition: u32) -> u32 {
    let mut bits = 0;
    let mut i = 0;
    while i < 6 {
        bits |= ((partition >> i) & 1) << (2 * i);
        i += 1;
    }
    bits
}

pub struct RpiWatchdog {
    /// Virtual address of the PM block, 0 while unconfigured.
    base: AtomicUsize,
}

impl RpiWatchdog {
    pub const fn new() -> Self {
        Self {
            base: AtomicUsize::new(0),
        }
    }

    /// Points the primitive at the PM register block (peripheral base +
    /// `0x10_0000`).
    ///
    /// # Safety
    ///
    /// `base` must be a mapped, device-memory view of the PM registers and
    /// stay valid for the rest of the kernel's life.
    pub unsafe fn configure(&self, base: usize) {
        self.base.store(base, Ordering::Release);
    }

    pub fn is_configured(&self) -> bool {
        self.base.load(Ordering::Acquire) != 0
    }

    unsafe fn read(base: usize, offset: usize) -> u32 {
        core::ptr::read_volatile((base + offset) as *const u32)
    }

    unsafe fn write(base: usize, offset: usize, value: u32) {
        core::ptr::write_volatile((base + offset) as *mut u32, value);
    }
}

impl Default for RpiWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownPrimitive for RpiWatchdog {
    fn name(&self) -> &'static str {
        "rpi-watchdog"
    }

    fn power_off(&self, _reason: ResetReason) -> Result<Infallible, ShutdownError> {
        let base = self.base.load(Ordering::Acquire);
        if base == 0 {
            return Err(ShutdownError::NotPresent);
        }

        unsafe {
            let rsts = Self::read(base, PM_RSTS) & PM_RSTS_PARTITION_CLR;
            Self::write(base, PM_RSTS, PM_PASSWORD | rsts | partition_bits(HALT_PARTITION));

            Self::write(base, PM_WDOG, PM_PASSWORD | WATCHDOG_TICKS);

            let rstc = Self::read(base, PM_RSTC) & PM_RSTC_WRCFG_CLR;
            Self::write(base, PM_RSTC, PM_PASSWORD | rstc | PM_RSTC_WRCFG_FULL_RESET);
        }

        for _ in 0..RESET_WAIT_SPINS {
            core::hint::spin_loop();
        }
        Err(ShutdownError::Ignored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halt_partition_sets_every_even_bit() {
        assert_eq!(partition_bits(HALT_PARTITION), 0x555);
        assert_eq!(partition_bits(0), 0);
        assert_eq!(partition_bits(1), 0b1);
        assert_eq!(partition_bits(2), 0b100);
        assert_eq!(partition_bits(5), 0b10001);
    }

    #[test]
    fn unconfigured_watchdog_is_absent() {
        let watchdog = RpiWatchdog::new();
        assert!(!watchdog.is_configured());
        assert_eq!(
            watchdog.power_off(ResetReason::SystemFailure),
            Err(ShutdownError::NotPresent)
        );
    }

    #[test]
    fn programs_halt_partition_and_full_reset() {
        // Stand-in for the PM block; offsets up to 0x24 inclusive.
        let mut registers = [0u32; 16];
        registers[PM_RSTS / 4] = 0x0000_1fff;
        registers[PM_RSTC / 4] = 0x0000_0030;

        let watchdog = RpiWatchdog::new();
        unsafe { watchdog.configure(registers.as_mut_ptr() as usize) };
        assert_eq!(
            watchdog.power_off(ResetReason::SystemFailure),
            Err(ShutdownError::Ignored)
        );

        let registers = unsafe { core::ptr::read_volatile(&registers) };
        assert_eq!(registers[PM_RSTS / 4], PM_PASSWORD | 0x1aaa | 0x555);
        assert_eq!(registers[PM_WDOG / 4], PM_PASSWORD | WATCHDOG_TICKS);
        assert_eq!(registers[PM_RSTC / 4], PM_PASSWORD | PM_RSTC_WRCFG_FULL_RESET);
    }
}
