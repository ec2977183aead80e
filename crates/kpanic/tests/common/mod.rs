//! A simulated machine for driving the panic path on the host.
//!
//! Every collaborator records what it was asked to do into one shared trace.
//! Halting (and a successful power-off) unwinds with [`Stopped`], which the
//! tests catch in place of the machine actually stopping.

#![allow(dead_code)]

use std::convert::Infallible;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex, Once};

use kpanic::backtrace::{Backtrace, PrintTarget};
use kpanic::{
    BootConfig, CrashMark, CurrentThread, DiagnosticSink, FaultSite, PanicOrchestrator,
    PanicPolicy, Processor, ResetReason, ShutdownError, ShutdownPrimitive,
};

pub const SITE: FaultSite<'static> = FaultSite::new("kernel/src/mm/vmm.rs", 314, "kernel::mm::vmm::map");

/// Unwinding payload standing in for "execution stopped".
#[derive(Debug)]
pub struct Stopped;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    MarkCrashing,
    Critical(String),
    Log(String),
    Backtrace(PrintTarget),
    WasInitialized,
    ReadPolicy,
    Shutdown(ResetReason),
    Halt,
    Park,
}

type Trace = Arc<Mutex<Vec<Event>>>;

pub struct MockThread {
    trace: Trace,
    crashing: AtomicBool,
}

impl MockThread {
    pub fn is_crashing(&self) -> bool {
        self.crashing.load(Ordering::SeqCst)
    }
}

impl CrashMark for MockThread {
    fn set_crashing(&self) {
        self.trace.lock().unwrap().push(Event::MarkCrashing);
        self.crashing.store(true, Ordering::SeqCst);
    }
}

/// How the mocked shutdown primitive behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOff {
    /// Returns, as when the hypervisor is not recognised.
    Fails,
    /// Powers the machine off: never returns.
    Succeeds,
}

pub struct Machine {
    trace: Trace,
    thread: Option<MockThread>,
    initialized: bool,
    policy: PanicPolicy,
    power_off: PowerOff,
    /// Meets another thread here twice while dumping the backtrace.
    backtrace_gate: Option<Arc<Barrier>>,
}

impl Machine {
    pub fn new() -> Self {
        Self {
            trace: Arc::default(),
            thread: None,
            initialized: true,
            policy: PanicPolicy::Halt,
            power_off: PowerOff::Fails,
            backtrace_gate: None,
        }
    }

    pub fn with_thread(mut self) -> Self {
        self.thread = Some(MockThread {
            trace: self.trace.clone(),
            crashing: AtomicBool::new(false),
        });
        self
    }

    pub fn uninitialized(mut self) -> Self {
        self.initialized = false;
        self
    }

    pub fn policy(mut self, policy: PanicPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn power_off(mut self, power_off: PowerOff) -> Self {
        self.power_off = power_off;
        self
    }

    /// Holds the backtrace dump open: it waits on `gate` once on entry, so
    /// the other side knows a panic is in progress, and again before it
    /// returns.
    pub fn hold_backtrace(mut self, gate: Arc<Barrier>) -> Self {
        self.backtrace_gate = Some(gate);
        self
    }

    pub fn thread(&self) -> Option<&MockThread> {
        self.thread.as_ref()
    }

    pub fn trace(&self) -> Vec<Event> {
        self.trace.lock().unwrap().clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.trace().iter().filter(|e| *e == event).count()
    }

    pub fn orchestrator(&self) -> PanicOrchestrator<'_> {
        PanicOrchestrator::new(self, self, self, self, self, self)
    }

    fn record(&self, event: Event) {
        self.trace.lock().unwrap().push(event);
    }

    fn stop(&self) -> ! {
        panic::panic_any(Stopped)
    }
}

impl Processor for Machine {
    fn halt(&self) -> ! {
        self.record(Event::Halt);
        self.stop()
    }

    fn park(&self) -> ! {
        self.record(Event::Park);
        self.stop()
    }
}

impl ShutdownPrimitive for Machine {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn power_off(&self, reason: ResetReason) -> Result<Infallible, ShutdownError> {
        self.record(Event::Shutdown(reason));
        match self.power_off {
            PowerOff::Fails => Err(ShutdownError::Ignored),
            PowerOff::Succeeds => self.stop(),
        }
    }
}

impl Backtrace for Machine {
    fn dump(&self, target: PrintTarget) {
        self.record(Event::Backtrace(target));
        if let Some(gate) = &self.backtrace_gate {
            gate.wait();
            gate.wait();
        }
    }
}

impl DiagnosticSink for Machine {
    fn critical_line(&self, args: fmt::Arguments<'_>) {
        self.record(Event::Critical(args.to_string()));
    }

    fn log_line(&self, args: fmt::Arguments<'_>) {
        self.record(Event::Log(args.to_string()));
    }
}

impl CurrentThread for Machine {
    fn current(&self) -> Option<&dyn CrashMark> {
        self.thread.as_ref().map(|thread| thread as &dyn CrashMark)
    }
}

impl BootConfig for Machine {
    fn was_initialized(&self) -> bool {
        self.record(Event::WasInitialized);
        self.initialized
    }

    fn panic_policy(&self) -> PanicPolicy {
        self.record(Event::ReadPolicy);
        self.policy
    }
}

/// Keeps the expected [`Stopped`] unwinds out of the test output.
pub fn quiet_stops() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if info.payload().downcast_ref::<Stopped>().is_none() {
                default(info);
            }
        }));
    });
}

/// Runs `f`, which must stop the machine, and asserts that it did.
pub fn expect_stop(f: impl FnOnce()) {
    quiet_stops();
    let payload = panic::catch_unwind(AssertUnwindSafe(f))
        .expect_err("the panic path returned to its caller");
    assert!(
        payload.downcast_ref::<Stopped>().is_some(),
        "the panic path faulted instead of stopping"
    );
}
