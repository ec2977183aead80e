//! Power-off on riscv64 through the SBI System Reset extension.

use core::convert::Infallible;

use kpanic::{ResetReason, ShutdownError, ShutdownPrimitive, ShutdownSequence};

/// `SBI_ERR_NOT_SUPPORTED`: the firmware lacks SRST.
const SBI_ERR_NOT_SUPPORTED: i64 = -2;

pub struct SbiSystemReset;

impl ShutdownPrimitive for SbiSystemReset {
    fn name(&self) -> &'static str {
        "sbi-srst"
    }

    fn power_off(&self, reason: ResetReason) -> Result<Infallible, ShutdownError> {
        let ret = match reason {
            ResetReason::NoReason => sbi_rt::system_reset(sbi_rt::Shutdown, sbi_rt::NoReason),
            ResetReason::SystemFailure => {
                sbi_rt::system_reset(sbi_rt::Shutdown, sbi_rt::SystemFailure)
            }
        };
        match ret.error as isize as i64 {
            SBI_ERR_NOT_SUPPORTED => Err(ShutdownError::NotPresent),
            0 => Err(ShutdownError::Ignored),
            code => Err(ShutdownError::Firmware(code)),
        }
    }
}

static PRIMITIVES: [&dyn ShutdownPrimitive; 1] = [&SbiSystemReset];

pub static SEQUENCE: ShutdownSequence<'static> = ShutdownSequence::new(&PRIMITIVES);
