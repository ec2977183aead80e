// =============================================================================
// MinimalOS Panic Path - Kernel Panic Wiring
// =============================================================================
//
// Every unrecoverable fault ends in KERNEL_PANIC:
//   - kpanic!/kassert! anywhere in the kernel
//   - CPU exceptions (traps::handlers)
//   - lock-rank violations (sync::spinlock)
//   - Rust panics, via the #[panic_handler] below
//
// The orchestrator is a plain static, built at compile time from static
// parts, so it works from the very first instruction of kmain(): before
// the command line is parsed it simply halts.
// =============================================================================

use core::panic::PanicInfo;
use core::sync::atomic::{AtomicUsize, Ordering};

use kpanic::backtrace::{FrameLayout, FramePointerBacktrace, FrameSource, StackBounds, Symbols};
use kpanic::{FaultSite, PanicOrchestrator};

use crate::cmdline::BOOT_CONFIG;
use crate::task::thread::Threads;
use crate::util::logger::Console;

/// Top of the boot stack, recorded on entry to kmain(). 0 until then.
static STACK_TOP: AtomicUsize = AtomicUsize::new(0);

/// Record the top of the stack kmain() runs on: its frame's saved frame
/// pointer and return address are the last words the backtrace may read.
#[inline(always)]
pub fn record_stack_top() {
    let fp = khal::cpu::frame_pointer();
    if fp != 0 {
        STACK_TOP.store(fp + 2 * size_of::<usize>(), Ordering::Relaxed);
    }
}

/// The stack the panicking code is running on, from the current stack
/// pointer up to the recorded top.
pub struct KernelStack;

impl FrameSource for KernelStack {
    type Memory = StackBounds;

    fn current(&self) -> Option<(usize, StackBounds)> {
        let top = STACK_TOP.load(Ordering::Relaxed);
        let sp = khal::cpu::stack_pointer();
        let fp = khal::cpu::frame_pointer();
        // On an IST stack (double fault, NMI) the boot stack bounds say
        // nothing about where we are.
        if top == 0 || sp >= top || fp < sp || fp >= top {
            return None;
        }
        // SAFETY: [sp, top) is the live part of the boot stack, mapped by
        // Limine for the lifetime of the kernel.
        Some((fp, unsafe { StackBounds::new(sp, top) }))
    }
}

static CONSOLE: Console = Console;
static THREADS: Threads = Threads;
static KERNEL_STACK: KernelStack = KernelStack;

static BACKTRACE: FramePointerBacktrace<'static, KernelStack> = FramePointerBacktrace::new(
    &KERNEL_STACK,
    FrameLayout::NATIVE,
    Symbols::EMPTY,
    &CONSOLE,
);

/// The kernel's panic orchestrator.
pub static KERNEL_PANIC: PanicOrchestrator<'static> = PanicOrchestrator::new(
    &khal::Cpu,
    &khal::power::x86::SEQUENCE,
    &BACKTRACE,
    &CONSOLE,
    &THREADS,
    &BOOT_CONFIG,
);

/// Route kpanic!/kassert! to KERNEL_PANIC.
pub fn init() {
    kpanic::install(&KERNEL_PANIC);
}

/// The kernel panic handler.
///
/// Rust panics (overflow checks, indexing, `unwrap` on `None`) carry a
/// location but no enclosing function name.
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    let site = match info.location() {
        Some(location) => FaultSite::from_location(location),
        None => FaultSite::new("<unknown>", 0, kpanic::site::UNKNOWN_FUNCTION),
    };
    KERNEL_PANIC.panic_with_message(&site, Some(format_args!("{}", info.message())))
}
