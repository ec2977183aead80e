// =============================================================================
// MinimalOS Panic Path - Kernel Console
// =============================================================================
//
// Normal output goes through the `log` facade (klog installs the backend);
// kprintln! is for raw, unprefixed text such as the boot banner.
//
// The panic path must not go through either: both take the serial lock, and
// the faulting code may hold it. Console is the DiagnosticSink handed to the
// orchestrator and routes critical lines to klog's lock-free channel.
// =============================================================================

use core::fmt;

use kpanic::DiagnosticSink;

/// Prints formatted text followed by a newline to the kernel console.
#[macro_export]
macro_rules! kprintln {
    () => {
        ::klog::println!()
    };
    ($($arg:tt)*) => {
        ::klog::println!($($arg)*)
    };
}

/// Panic-path output.
pub struct Console;

impl DiagnosticSink for Console {
    fn critical_line(&self, args: fmt::Arguments<'_>) {
        klog::critical!("{}", args);
    }

    fn log_line(&self, args: fmt::Arguments<'_>) {
        log::error!("{}", args);
    }
}
