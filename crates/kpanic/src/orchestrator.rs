//! The panic orchestrator.
//!
//! Any code that detects an unrecoverable fault ends up in
//! [`PanicOrchestrator::panic`], which runs a fixed sequence and never
//! returns:
//!
//! 1. mark the current thread as crashing (if there is one),
//! 2. print the fault site on the critical channel,
//! 3. dump a backtrace to the screen,
//! 4. halt straight away if the boot configuration was never initialised,
//! 5. otherwise follow the panic policy: try to power off and then halt, or
//!    just halt.
//!
//! Step 1 has to come before any output. Printing takes locks, and the lock
//! rank checks only stand down once the thread is flagged; without the flag
//! the diagnostics themselves could fault again.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Once;

use crate::backtrace::{Backtrace, PrintTarget};
use crate::policy::{BootConfig, PanicPolicy};
use crate::shutdown::{ResetReason, ShutdownPrimitive};
use crate::sink::DiagnosticSink;
use crate::site::FaultSite;
use crate::thread::CurrentThread;

/// Stops cores for good.
///
/// Neither method may fail, and both must be callable with interrupts in any
/// state and without a heap or any lock.
pub trait Processor: Sync {
    /// Stops the whole machine: every other core, then the calling one. Only
    /// the core that owns the panic calls this.
    fn halt(&self) -> !;

    /// Stops the calling core only, leaving the others running.
    fn park(&self) -> !;
}

/// Sequences a kernel panic. See the module documentation.
pub struct PanicOrchestrator<'a> {
    processor: &'a dyn Processor,
    shutdown: &'a dyn ShutdownPrimitive,
    backtrace: &'a dyn Backtrace,
    sink: &'a dyn DiagnosticSink,
    threads: &'a dyn CurrentThread,
    config: &'a dyn BootConfig,
    entered: AtomicBool,
}

impl<'a> PanicOrchestrator<'a> {
    pub const fn new(
        processor: &'a dyn Processor,
        shutdown: &'a dyn ShutdownPrimitive,
        backtrace: &'a dyn Backtrace,
        sink: &'a dyn DiagnosticSink,
        threads: &'a dyn CurrentThread,
        config: &'a dyn BootConfig,
    ) -> Self {
        Self {
            processor,
            shutdown,
            backtrace,
            sink,
            threads,
            config,
            entered: AtomicBool::new(false),
        }
    }

    /// Whether a panic is already being handled.
    pub fn is_panicking(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }

    pub fn panic(&self, site: &FaultSite<'_>) -> ! {
        self.panic_with_message(site, None)
    }

    /// Like [`panic`](Self::panic), printing `message` under a panic banner
    /// before the fault site.
    pub fn panic_with_message(&self, site: &FaultSite<'_>, message: Option<fmt::Arguments<'_>>) -> ! {
        // A fault while handling a fault, here or on another core: the first
        // one owns the diagnostics and the shutdown attempt. Only this core
        // stops; halting the machine would take the owner down with it.
        if self.entered.swap(true, Ordering::AcqRel) {
            self.processor.park();
        }

        if let Some(thread) = self.threads.current() {
            thread.set_crashing();
        }

        if let Some(message) = message {
            self.sink.critical_line(format_args!("KERNEL PANIC! :^("));
            self.sink.critical_line(message);
        }
        self.sink.critical_line(format_args!("{site}"));
        self.backtrace.dump(PrintTarget::SCREEN);

        if !self.config.was_initialized() {
            self.processor.halt();
        }

        if self.config.panic_policy() == PanicPolicy::Shutdown {
            // Power-off may silently not happen (unknown hypervisor, firmware
            // refusal). Whatever it did, halt afterwards so nothing keeps running.
            let _ = self.shutdown.power_off(ResetReason::SystemFailure);
        }

        self.processor.halt()
    }
}

static INSTALLED: Once<&'static PanicOrchestrator<'static>> = Once::new();

/// Registers the kernel's orchestrator as the target of [`kpanic!`] and
/// [`kassert!`]. Only the first call has an effect.
///
/// [`kpanic!`]: crate::kpanic
/// [`kassert!`]: crate::kassert
pub fn install(orchestrator: &'static PanicOrchestrator<'static>) {
    INSTALLED.call_once(|| orchestrator);
}

pub fn installed() -> Option<&'static PanicOrchestrator<'static>> {
    INSTALLED.get().copied()
}

/// Entry point behind the panic macros.
///
/// With nothing installed there is no processor to halt, so the core spins.
#[doc(hidden)]
#[cold]
#[inline(never)]
pub fn panic_at(site: &FaultSite<'_>, message: Option<fmt::Arguments<'_>>) -> ! {
    match installed() {
        Some(orchestrator) => orchestrator.panic_with_message(site, message),
        None => loop {
            core::hint::spin_loop();
        },
    }
}
