//! Local APIC, just enough of it to stop the other cores.
//!
//! Each CPU core has its own Local APIC. The panic path uses it for one
//! thing: an NMI to every other core ("all excluding self"), whose handler
//! parks that core. NMIs get through even with interrupts masked, which a
//! fixed-vector IPI would not.
//!
//! x2APIC (register access through MSRs) is used when the CPU has it, since
//! it needs no MMIO mapping. Otherwise the caller has to supply a mapping of
//! the xAPIC register page.

use core::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use x86_64::registers::model_specific::Msr;

/// IA32_APIC_BASE Model Specific Register.
const IA32_APIC_BASE_MSR: u32 = 0x1B;

/// Bit 11 of IA32_APIC_BASE MSR: Global APIC enable/disable.
const APIC_BASE_ENABLE: u64 = 1 << 11;
/// Bit 10 of IA32_APIC_BASE MSR: x2APIC mode.
const APIC_BASE_X2APIC: u64 = 1 << 10;

/// x2APIC registers live at MSR 0x800 + (xAPIC offset >> 4).
const X2APIC_MSR_BASE: u32 = 0x800;

// --- APIC Register Offsets (from APIC base address) ---

/// Local APIC ID Register.
const APIC_REG_ID: u32 = 0x020;
/// Spurious Interrupt Vector Register.
const APIC_REG_SVR: u32 = 0x0F0;
/// Interrupt Command Register, low half.
const APIC_REG_ICR_LOW: u32 = 0x300;
/// Interrupt Command Register, high half (xAPIC only).
const APIC_REG_ICR_HIGH: u32 = 0x310;

/// SVR bit 8: APIC Software Enable.
const SVR_APIC_ENABLE: u32 = 1 << 8;

/// Spurious interrupt vector number.
pub const SPURIOUS_VECTOR: u8 = 0xFF;

/// ICR delivery mode NMI (0b100 << 8).
const ICR_DELIVERY_NMI: u32 = 0b100 << 8;
/// ICR level: assert.
const ICR_LEVEL_ASSERT: u32 = 1 << 14;
/// ICR delivery status: send pending (xAPIC only).
const ICR_SEND_PENDING: u32 = 1 << 12;
/// ICR destination shorthand: all excluding self.
const ICR_ALL_EXCLUDING_SELF: u32 = 0b11 << 18;

/// The command that stops every other core.
pub const ICR_HALT_OTHERS: u32 = ICR_ALL_EXCLUDING_SELF | ICR_LEVEL_ASSERT | ICR_DELIVERY_NMI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    Uninitialized = 0,
    XApic = 1,
    X2Apic = 2,
}

static MODE: AtomicU8 = AtomicU8::new(Mode::Uninitialized as u8);

/// Virtual address of the xAPIC register page.
static APIC_BASE: AtomicU64 = AtomicU64::new(0);

pub fn mode() -> Mode {
    match MODE.load(Ordering::Acquire) {
        1 => Mode::XApic,
        2 => Mode::X2Apic,
        _ => Mode::Uninitialized,
    }
}

/// CPUID.1:ECX bit 21.
fn has_x2apic() -> bool {
    let leaf = unsafe { core::arch::x86_64::__cpuid(1) };
    leaf.ecx & (1 << 21) != 0
}

/// Read a 32-bit APIC register.
#[inline]
unsafe fn read_reg(mode: Mode, offset: u32) -> u32 {
    match mode {
        Mode::X2Apic => Msr::new(X2APIC_MSR_BASE + (offset >> 4)).read() as u32,
        _ => {
            let addr = APIC_BASE.load(Ordering::Relaxed) + offset as u64;
            core::ptr::read_volatile(addr as *const u32)
        }
    }
}

/// Write a 32-bit APIC register.
#[inline]
unsafe fn write_reg(mode: Mode, offset: u32, value: u32) {
    match mode {
        Mode::X2Apic => Msr::new(X2APIC_MSR_BASE + (offset >> 4)).write(value as u64),
        _ => {
            let addr = APIC_BASE.load(Ordering::Relaxed) + offset as u64;
            core::ptr::write_volatile(addr as *mut u32, value);
        }
    }
}

/// Initialize and enable the Local APIC of the calling core.
///
/// x2APIC is used whenever the CPU supports it. Otherwise the xAPIC needs
/// `xapic_base`, the virtual address of its register page; without one the
/// APIC stays uninitialized and [`broadcast_halt`] does nothing.
///
/// Returns the APIC ID of the current processor, if initialized.
///
/// # Safety
///
/// `xapic_base`, if given, must map the physical page named by
/// IA32_APIC_BASE as device memory.
pub unsafe fn init(xapic_base: Option<u64>) -> Option<u32> {
    let mut base_msr = Msr::new(IA32_APIC_BASE_MSR);
    let msr_value = base_msr.read();

    let mode = if has_x2apic() {
        base_msr.write(msr_value | APIC_BASE_ENABLE | APIC_BASE_X2APIC);
        Mode::X2Apic
    } else {
        APIC_BASE.store(xapic_base?, Ordering::Relaxed);
        if msr_value & APIC_BASE_ENABLE == 0 {
            base_msr.write(msr_value | APIC_BASE_ENABLE);
        }
        Mode::XApic
    };

    write_reg(mode, APIC_REG_SVR, SVR_APIC_ENABLE | SPURIOUS_VECTOR as u32);
    MODE.store(mode as u8, Ordering::Release);

    Some(id())
}

/// Physical address of the xAPIC register page.
pub fn xapic_phys_base() -> u64 {
    unsafe { Msr::new(IA32_APIC_BASE_MSR).read() & 0xFFFF_FFFF_FFFF_F000 }
}

/// The APIC ID of the calling core, 0 before [`init`].
pub fn id() -> u32 {
    match mode() {
        Mode::Uninitialized => 0,
        Mode::X2Apic => unsafe { read_reg(Mode::X2Apic, APIC_REG_ID) },
        Mode::XApic => unsafe { read_reg(Mode::XApic, APIC_REG_ID) >> 24 },
    }
}

/// Sends an NMI to every core but this one. Does nothing before [`init`].
///
/// Safe to call from any context: no locks, no allocation.
pub fn broadcast_halt() {
    let mode = mode();
    match mode {
        Mode::Uninitialized => {}
        Mode::X2Apic => unsafe {
            // One 64-bit write; the destination field is ignored with a shorthand.
            Msr::new(X2APIC_MSR_BASE + (APIC_REG_ICR_LOW >> 4)).write(ICR_HALT_OTHERS as u64);
        },
        Mode::XApic => unsafe {
            while read_reg(mode, APIC_REG_ICR_LOW) & ICR_SEND_PENDING != 0 {
                core::hint::spin_loop();
            }
            write_reg(mode, APIC_REG_ICR_HIGH, 0);
            write_reg(mode, APIC_REG_ICR_LOW, ICR_HALT_OTHERS);
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halt_command_is_an_nmi_to_all_others() {
        assert_eq!(ICR_HALT_OTHERS, 0x000C_4400);
    }

    #[test]
    fn broadcast_before_init_is_a_no_op() {
        assert_eq!(mode(), Mode::Uninitialized);
        broadcast_halt();
        assert_eq!(id(), 0);
    }
}
