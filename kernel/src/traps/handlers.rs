//! Interrupt and exception handlers.
//!
//! Every fault the kernel cannot recover from goes through `kpanic!`, so it
//! gets the same treatment as any other kernel panic: crash marking,
//! backtrace, then halt or shutdown per the boot configuration.

use x86_64::registers::control::Cr2;
use x86_64::structures::idt::{InterruptStackFrame, PageFaultErrorCode};

use kpanic::kpanic;

/// Breakpoint exception handler (INT 3). Logged and resumed.
pub extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    log::info!("breakpoint at {:#018x}", stack_frame.instruction_pointer.as_u64());
}

pub extern "x86-interrupt" fn divide_error_handler(stack_frame: InterruptStackFrame) {
    kpanic!(
        "divide error at {:#018x}",
        stack_frame.instruction_pointer.as_u64()
    );
}

pub extern "x86-interrupt" fn invalid_opcode_handler(stack_frame: InterruptStackFrame) {
    kpanic!(
        "invalid opcode at {:#018x}",
        stack_frame.instruction_pointer.as_u64()
    );
}

pub extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    kpanic!(
        "general protection fault at {:#018x}, error code {:#x}",
        stack_frame.instruction_pointer.as_u64(),
        error_code
    );
}

/// Page Fault exception handler (INT 14).
///
/// There is no demand paging, so every page fault is a kernel bug.
pub extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    let address = Cr2::read_raw();
    kpanic!(
        "page fault at {:#018x} accessing {:#018x} ({:?})",
        stack_frame.instruction_pointer.as_u64(),
        address,
        error_code
    );
}

/// Double Fault exception handler (INT 8).
///
/// Runs on its own IST stack, since the usual cause is a kernel stack
/// overflow.
pub extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) -> ! {
    kpanic!(
        "double fault at {:#018x}, error code {:#x}",
        stack_frame.instruction_pointer.as_u64(),
        error_code
    );
}

/// NMI handler (INT 2).
///
/// The only NMI source this kernel arms is the halt broadcast of another
/// core that has already taken over the machine, so there is nothing to
/// report: park this core without touching any shared state.
pub extern "x86-interrupt" fn nmi_handler(_stack_frame: InterruptStackFrame) {
    khal::cpu::halt_forever();
}
