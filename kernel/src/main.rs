// =============================================================================
// MinimalOS Panic Path - Kernel Entry Point
// =============================================================================
//
// This is the first Rust code that runs when the kernel boots. Limine has
// already put the CPU in long mode, mapped the kernel in the higher half,
// filled in our requests and handed us a stack.
//
// WHAT WE DO HERE:
//   Phase 1: "Deaf and Blind" → serial output and the logger
//   Phase 2: "Can Fail Well"  → panic orchestrator, GDT/TSS, IDT, APIC
//   Phase 3: "Configured"     → command line, panic policy, boot thread
//   Phase 4: "Idle"           → optional fault injection, then idle
//
// The orchestrator is installed before anything that can fault. Until the
// command line is parsed it halts on any panic; afterwards it follows the
// configured policy.
// =============================================================================

#![no_std]
#![no_main]
#![feature(abi_x86_interrupt)]

mod arch;
mod cmdline;
mod selftest;
mod sync;
mod task;
mod traps;
mod util;

use log::LevelFilter;

use arch::{boot, gdt};
use task::thread::{self, BOOT_THREAD};

/// The kernel's main entry point.
///
/// # Execution Environment
/// When we enter this function:
///   - CPU is in 64-bit long mode, paging enabled (Limine's page tables)
///   - Interrupts are DISABLED and no IDT of ours is loaded
///   - Only the BSP (Bootstrap Processor) is running
#[unsafe(no_mangle)]
extern "C" fn kmain() -> ! {
    util::panic::record_stack_top();

    // =========================================================================
    // PHASE 1: "Deaf and Blind" → Get serial output working
    // =========================================================================
    klog::init(LevelFilter::Debug);

    kprintln!();
    kprintln!("==========================================================");
    kprintln!("  MinimalOS Panic Path v{}", env!("CARGO_PKG_VERSION"));
    kprintln!("==========================================================");

    if !boot::is_supported() {
        log::warn!("boot: Limine base revision not supported, continuing anyway");
    }

    // =========================================================================
    // PHASE 2: "Can Fail Well" → every fault from here on is a kernel panic
    // =========================================================================
    util::panic::init();
    gdt::init();
    traps::idt::init_idt();

    if let Some(hhdm) = boot::hhdm_offset() {
        log::debug!("boot: HHDM offset {:#018x}", hhdm);
    }

    // Limine's HHDM does not cover the xAPIC MMIO page, and nothing else maps
    // it yet, so only x2APIC is usable.
    // SAFETY: no xAPIC base is handed out.
    match unsafe { khal::apic::init(None) } {
        Some(apic_id) => log::info!("apic: {:?}, BSP APIC ID {}", khal::apic::mode(), apic_id),
        None => log::warn!(
            "apic: no x2APIC (xAPIC at {:#x} unmapped), halt broadcast disabled",
            khal::apic::xapic_phys_base()
        ),
    }

    // =========================================================================
    // PHASE 3: "Configured" → command line and the boot thread
    // =========================================================================
    let cmdline = cmdline::init();

    thread::set_current(&BOOT_THREAD);
    log::info!(
        "thread: running as {} ({})",
        BOOT_THREAD.id(),
        BOOT_THREAD.name()
    );

    // =========================================================================
    // PHASE 4: "Idle"
    // =========================================================================
    selftest::run(&cmdline);

    log::info!("boot complete, idling");
    x86_64::instructions::interrupts::enable();
    loop {
        x86_64::instructions::hlt();
    }
}
