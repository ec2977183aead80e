//! Kernel panic sequencing.
//!
//! Everything the panic path decides lives here, free of hardware: the
//! orchestrator, the boot-time panic policy, per-thread crash state, the
//! frame-pointer backtrace walker and the shutdown contract. `khal` supplies
//! the hardware primitives and the kernel wires both together.
#![cfg_attr(not(test), no_std)]

pub mod backtrace;
pub mod orchestrator;
pub mod policy;
pub mod shutdown;
pub mod sink;
pub mod site;
pub mod thread;

mod macros;

pub use backtrace::{Backtrace, PrintTarget};
pub use orchestrator::{install, PanicOrchestrator, Processor};
pub use policy::{BootConfig, BootConfigCell, CommandLine, PanicPolicy};
pub use shutdown::{ResetReason, ShutdownError, ShutdownPrimitive, ShutdownSequence};
pub use sink::DiagnosticSink;
pub use site::FaultSite;
pub use thread::{CrashMark, CurrentThread, LockRank, ThreadState};
