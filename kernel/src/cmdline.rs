// =============================================================================
// MinimalOS Panic Path - Boot Command Line
// =============================================================================
//
// The command line is read once, during single-core boot, and the panic
// policy is published into BOOT_CONFIG. Until then BOOT_CONFIG reports
// "not initialized" and a panic halts without consulting any policy.
//
// Recognised arguments:
//   panic=halt        halt on panic (default)
//   panic=shutdown    try to power off on panic, halt if that fails
//   panic_test=<kind> trigger a deliberate fault once boot completes
// =============================================================================

use kpanic::{BootConfigCell, CommandLine, PanicPolicy};

use crate::arch::boot;

/// The boot configuration the panic orchestrator reads.
pub static BOOT_CONFIG: BootConfigCell = BootConfigCell::new();

/// Parse the command line and publish the panic policy.
///
/// A missing command line is the same as an empty one.
pub fn init() -> CommandLine<'static> {
    let cmdline = CommandLine::new(boot::cmdline().unwrap_or(""));
    log::info!("cmdline: \"{}\"", cmdline.as_str());

    let policy = BOOT_CONFIG.publish(cmdline.panic_policy_or_default());
    log::info!("panic policy: {}", policy.as_str());
    if policy == PanicPolicy::Shutdown {
        log::info!("shutdown sequence: {} mechanisms", khal::power::sequence().primitives().len());
    }
    cmdline
}
