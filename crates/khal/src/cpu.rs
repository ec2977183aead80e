//! Per-core CPU control: parking a core for good and reading the registers
//! the backtrace walker starts from.

use kpanic::Processor;

/// Masks interrupts and parks the calling core. Never returns.
///
/// NMIs still wake an x86 core out of `hlt`, which is why this loops.
#[inline(always)]
pub fn halt_forever() -> ! {
    loop {
        park();
    }
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn park() {
    x86_64::instructions::interrupts::disable();
    x86_64::instructions::hlt();
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
fn park() {
    unsafe {
        core::arch::asm!("msr daifset, #0xf", "wfi", options(nomem, nostack));
    }
}

#[cfg(target_arch = "riscv64")]
#[inline(always)]
fn park() {
    // Clear sstatus.SIE, then wait.
    unsafe {
        core::arch::asm!("csrci sstatus, 2", "wfi", options(nomem, nostack));
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "riscv64")))]
#[inline(always)]
fn park() {
    core::hint::spin_loop();
}

/// The current frame pointer, or 0 where the architecture has none wired up.
///
/// Only meaningful when the kernel is built with frame pointers forced on.
#[inline(always)]
pub fn frame_pointer() -> usize {
    let fp: usize;
    #[cfg(target_arch = "x86_64")]
    unsafe {
        core::arch::asm!("mov {}, rbp", out(reg) fp, options(nomem, nostack, preserves_flags));
    }
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("mov {}, x29", out(reg) fp, options(nomem, nostack, preserves_flags));
    }
    #[cfg(target_arch = "riscv64")]
    unsafe {
        core::arch::asm!("mv {}, s0", out(reg) fp, options(nomem, nostack, preserves_flags));
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "riscv64")))]
    {
        fp = 0;
    }
    fp
}

/// The current stack pointer, or 0 where unsupported.
#[inline(always)]
pub fn stack_pointer() -> usize {
    let sp: usize;
    #[cfg(target_arch = "x86_64")]
    unsafe {
        core::arch::asm!("mov {}, rsp", out(reg) sp, options(nomem, nostack, preserves_flags));
    }
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("mov {}, sp", out(reg) sp, options(nomem, nostack, preserves_flags));
    }
    #[cfg(target_arch = "riscv64")]
    unsafe {
        core::arch::asm!("mv {}, sp", out(reg) sp, options(nomem, nostack, preserves_flags));
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "riscv64")))]
    {
        sp = 0;
    }
    sp
}

/// The processor as the panic path sees it.
///
/// Halting stops every other core first, then this one, so that nothing
/// keeps running on a machine that has declared itself broken. Parking never
/// signals the other cores.
pub struct Cpu;

impl Processor for Cpu {
    fn halt(&self) -> ! {
        #[cfg(target_arch = "x86_64")]
        crate::apic::broadcast_halt();
        halt_forever()
    }

    fn park(&self) -> ! {
        halt_forever()
    }
}
