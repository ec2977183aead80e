//! The platform power-off contract.
//!
//! Which mechanism works depends on the hypervisor or firmware underneath,
//! which the kernel cannot know up front. Mechanisms are therefore tried in a
//! fixed order; each one probes cheaply for its device and reports absence
//! instead of waiting for something that will never happen.

use core::convert::Infallible;

use thiserror::Error;

/// Why the machine is being reset, for platforms that record it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    #[default]
    NoReason,
    SystemFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShutdownError {
    /// The probe ruled the mechanism out; nothing was attempted.
    #[error("not present")]
    NotPresent,
    /// The request was issued but execution continued.
    #[error("request ignored")]
    Ignored,
    /// The firmware or hypervisor refused with an error code.
    #[error("firmware error {0}")]
    Firmware(i64),
    /// There was nothing to try.
    #[error("no shutdown mechanism")]
    NoMechanism,
}

/// One way of powering the machine off.
pub trait ShutdownPrimitive: Sync {
    fn name(&self) -> &'static str;

    /// Requests power-off. On success control never comes back, so the only
    /// value this can return is the reason it failed.
    fn power_off(&self, reason: ResetReason) -> Result<Infallible, ShutdownError>;
}

/// Primitives tried once each, in order.
pub struct ShutdownSequence<'a> {
    primitives: &'a [&'a dyn ShutdownPrimitive],
}

impl<'a> ShutdownSequence<'a> {
    pub const fn new(primitives: &'a [&'a dyn ShutdownPrimitive]) -> Self {
        Self { primitives }
    }

    pub fn primitives(&self) -> &'a [&'a dyn ShutdownPrimitive] {
        self.primitives
    }
}

impl ShutdownPrimitive for ShutdownSequence<'_> {
    fn name(&self) -> &'static str {
        "sequence"
    }

    /// Returns the error of the last primitive tried. Absent mechanisms only
    /// count when nothing else was attempted.
    fn power_off(&self, reason: ResetReason) -> Result<Infallible, ShutdownError> {
        let mut result = ShutdownError::NoMechanism;
        for primitive in self.primitives {
            let Err(err) = primitive.power_off(reason);
            if err != ShutdownError::NotPresent || result == ShutdownError::NoMechanism {
                result = err;
            }
        }
        Err(result)
    }
}
