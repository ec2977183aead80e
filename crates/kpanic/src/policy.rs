//! Panic policy and the boot configuration it is read from.
//!
//! The policy comes from the kernel command line (`panic=halt` or
//! `panic=shutdown`). The panic path may run before the command line has been
//! parsed, so the configuration is always consulted through [`BootConfig`],
//! which answers "was I initialised?" before anything else is read.

use core::str::FromStr;

use spin::Once;
use thiserror::Error;

/// Command line key selecting the panic policy.
pub const PANIC_KEY: &str = "panic";

/// What the panic path does once diagnostics have been printed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PanicPolicy {
    /// Stop the CPU and leave the machine hanging on the panic screen.
    #[default]
    Halt,
    /// Ask the platform to power off, then halt if it did not.
    Shutdown,
}

impl PanicPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PanicPolicy::Halt => "halt",
            PanicPolicy::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown panic policy `{0}`")]
pub struct UnknownPanicPolicy<'a>(pub &'a str);

impl FromStr for PanicPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "halt" => Ok(PanicPolicy::Halt),
            "shutdown" => Ok(PanicPolicy::Shutdown),
            _ => Err(()),
        }
    }
}

/// Read access to the parts of the boot configuration the panic path uses.
pub trait BootConfig: Sync {
    /// Whether the configuration has been parsed and published yet.
    fn was_initialized(&self) -> bool;

    /// The configured policy. Only meaningful once [`was_initialized`]
    /// returns true.
    ///
    /// [`was_initialized`]: BootConfig::was_initialized
    fn panic_policy(&self) -> PanicPolicy;
}

/// A write-once holder for the boot-time panic policy.
pub struct BootConfigCell {
    policy: Once<PanicPolicy>,
}

impl BootConfigCell {
    pub const fn new() -> Self {
        Self { policy: Once::new() }
    }

    /// Publishes the policy. Only the first call has any effect; the value
    /// that ends up stored is returned.
    pub fn publish(&self, policy: PanicPolicy) -> PanicPolicy {
        *self.policy.call_once(|| policy)
    }
}

impl Default for BootConfigCell {
    fn default() -> Self {
        Self::new()
    }
}

impl BootConfig for BootConfigCell {
    fn was_initialized(&self) -> bool {
        self.policy.is_completed()
    }

    fn panic_policy(&self) -> PanicPolicy {
        self.policy.get().copied().unwrap_or_default()
    }
}

/// A borrowed view over the raw kernel command line.
///
/// Arguments are separated by whitespace and are either `key=value` pairs or
/// bare flags. Nothing is copied.
#[derive(Debug, Clone, Copy)]
pub struct CommandLine<'a> {
    raw: &'a str,
}

impl<'a> CommandLine<'a> {
    pub const fn new(raw: &'a str) -> Self {
        Self { raw }
    }

    pub fn as_str(&self) -> &'a str {
        self.raw
    }

    /// Iterates over `(key, value)` pairs in order. Bare flags have no value.
    pub fn args(&self) -> impl Iterator<Item = (&'a str, Option<&'a str>)> + 'a {
        let raw = self.raw;
        raw.split_whitespace().map(|arg| match arg.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (arg, None),
        })
    }

    /// Value of `key`. When a key is repeated the last occurrence wins.
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.args()
            .filter(|(k, _)| *k == key)
            .filter_map(|(_, v)| v)
            .last()
    }

    /// Whether `flag` appears as a bare flag.
    pub fn contains(&self, flag: &str) -> bool {
        self.args().any(|(k, v)| k == flag && v.is_none())
    }

    /// The panic policy requested on this command line. Absent means
    /// [`PanicPolicy::Halt`].
    pub fn panic_policy(&self) -> Result<PanicPolicy, UnknownPanicPolicy<'a>> {
        match self.get(PANIC_KEY) {
            None => Ok(PanicPolicy::default()),
            Some(value) => value.parse().map_err(|()| UnknownPanicPolicy(value)),
        }
    }

    /// Resolves the panic policy, falling back to [`PanicPolicy::Halt`] with a
    /// warning on an unrecognised value.
    pub fn panic_policy_or_default(&self) -> PanicPolicy {
        self.panic_policy().unwrap_or_else(|err| {
            log::warn!("cmdline: {}, using `{}`", err, PanicPolicy::default().as_str());
            PanicPolicy::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_defaults_to_halt() {
        assert_eq!(PanicPolicy::default(), PanicPolicy::Halt);
        assert_eq!(CommandLine::new("").panic_policy(), Ok(PanicPolicy::Halt));
        assert_eq!(CommandLine::new("quiet root=/dev/sda").panic_policy(), Ok(PanicPolicy::Halt));
    }

    #[test]
    fn policy_is_read_from_the_panic_key() {
        let cmdline = CommandLine::new("quiet panic=shutdown serial");
        assert_eq!(cmdline.panic_policy(), Ok(PanicPolicy::Shutdown));
        assert_eq!(CommandLine::new("panic=halt").panic_policy(), Ok(PanicPolicy::Halt));
    }

    #[test]
    fn unknown_policy_is_reported() {
        let cmdline = CommandLine::new("panic=reboot");
        assert_eq!(cmdline.panic_policy(), Err(UnknownPanicPolicy("reboot")));
        assert_eq!(cmdline.panic_policy_or_default(), PanicPolicy::Halt);
    }

    #[test]
    fn last_occurrence_wins() {
        let cmdline = CommandLine::new("panic=shutdown panic=halt");
        assert_eq!(cmdline.get("panic"), Some("halt"));
    }

    #[test]
    fn flags_have_no_value() {
        let cmdline = CommandLine::new("  nosmp\tpanic=halt  ");
        assert!(cmdline.contains("nosmp"));
        assert!(!cmdline.contains("panic"));
        assert_eq!(cmdline.get("nosmp"), None);
    }

    #[test]
    fn cell_reports_initialisation() {
        let cell = BootConfigCell::new();
        assert!(!cell.was_initialized());
        assert_eq!(cell.panic_policy(), PanicPolicy::Halt);

        assert_eq!(cell.publish(PanicPolicy::Shutdown), PanicPolicy::Shutdown);
        assert!(cell.was_initialized());
        assert_eq!(cell.panic_policy(), PanicPolicy::Shutdown);
    }

    #[test]
    fn cell_keeps_the_first_publication() {
        let cell = BootConfigCell::new();
        cell.publish(PanicPolicy::Shutdown);
        assert_eq!(cell.publish(PanicPolicy::Halt), PanicPolicy::Shutdown);
        assert_eq!(cell.panic_policy(), PanicPolicy::Shutdown);
    }
}
