//! Power-off on x86_64 virtual machines.
//!
//! PCs have no architectural power-off instruction; the real mechanism is
//! ACPI sleep state S5, which needs an AML interpreter. Emulators expose
//! fixed I/O ports instead. Tried in this order:
//!
//! 1. [`QemuAcpi`]: port `0x604` ← `0x2000` (QEMU q35/i440fx PM1a control)
//! 2. [`QemuLegacy`]: port `0xB004` ← `0x2000` (Bochs and old QEMU)
//! 3. [`VirtualBox`]: port `0x4004` ← `0x3400`
//!
//! Those ports mean something else on real hardware and on other hypervisors,
//! so each primitive first checks the CPUID hypervisor signature and only
//! touches its port when the signature names an emulator known to have it.
//! On bare metal and under unidentified hypervisors all three report
//! [`ShutdownError::NotPresent`].

use core::convert::Infallible;

use kpanic::{ResetReason, ShutdownError, ShutdownPrimitive, ShutdownSequence};

use crate::port::outw;

/// CPUID.1:ECX bit 31, reserved for hypervisors to announce themselves.
const CPUID_HYPERVISOR_BIT: u32 = 1 << 31;
/// Hypervisor vendor leaf; the signature is in EBX, ECX, EDX.
const CPUID_HYPERVISOR_LEAF: u32 = 0x4000_0000;

const QEMU_ACPI_PORT: u16 = 0x604;
const QEMU_LEGACY_PORT: u16 = 0xB004;
const QEMU_SHUTDOWN: u16 = 0x2000;
const VIRTUALBOX_PORT: u16 = 0x4004;
const VIRTUALBOX_SHUTDOWN: u16 = 0x3400;

/// What, if anything, the kernel runs on top of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hypervisor {
    BareMetal,
    /// QEMU without acceleration.
    Tcg,
    /// KVM, almost always driven by QEMU.
    Kvm,
    VirtualBox,
    /// A hypervisor with a signature not listed here (Hyper-V, VMware, Xen,
    /// ...). None of the power-off ports are assumed to exist.
    Other,
}

impl Hypervisor {
    /// Decodes the 12-byte vendor signature of the hypervisor leaf.
    pub fn from_signature(signature: &[u8; 12]) -> Self {
        match signature {
            b"TCGTCGTCGTCG" => Hypervisor::Tcg,
            b"KVMKVMKVM\0\0\0" => Hypervisor::Kvm,
            b"VBoxVBoxVBox" => Hypervisor::VirtualBox,
            _ => Hypervisor::Other,
        }
    }

    pub fn detect() -> Self {
        let leaf = unsafe { core::arch::x86_64::__cpuid(1) };
        if leaf.ecx & CPUID_HYPERVISOR_BIT == 0 {
            return Hypervisor::BareMetal;
        }

        let vendor = unsafe { core::arch::x86_64::__cpuid(CPUID_HYPERVISOR_LEAF) };
        let mut signature = [0u8; 12];
        signature[0..4].copy_from_slice(&vendor.ebx.to_le_bytes());
        signature[4..8].copy_from_slice(&vendor.ecx.to_le_bytes());
        signature[8..12].copy_from_slice(&vendor.edx.to_le_bytes());
        Self::from_signature(&signature)
    }

    /// Whether the QEMU power-off ports may be there.
    pub fn may_be_qemu(self) -> bool {
        matches!(self, Hypervisor::Tcg | Hypervisor::Kvm)
    }

    /// Whether the VirtualBox power-off port may be there. VirtualBox can
    /// present a KVM paravirtualisation signature.
    pub fn may_be_virtualbox(self) -> bool {
        matches!(self, Hypervisor::VirtualBox | Hypervisor::Kvm)
    }
}

/// Writes `value` to `port` if `present`; either way control came back.
fn write_port(present: bool, port: u16, value: u16) -> Result<Infallible, ShutdownError> {
    if !present {
        return Err(ShutdownError::NotPresent);
    }
    unsafe {
        outw(port, value);
    }
    Err(ShutdownError::Ignored)
}

pub struct QemuAcpi;

impl ShutdownPrimitive for QemuAcpi {
    fn name(&self) -> &'static str {
        "qemu-acpi"
    }

    fn power_off(&self, _reason: ResetReason) -> Result<Infallible, ShutdownError> {
        write_port(Hypervisor::detect().may_be_qemu(), QEMU_ACPI_PORT, QEMU_SHUTDOWN)
    }
}

pub struct QemuLegacy;

impl ShutdownPrimitive for QemuLegacy {
    fn name(&self) -> &'static str {
        "qemu-legacy"
    }

    fn power_off(&self, _reason: ResetReason) -> Result<Infallible, ShutdownError> {
        write_port(Hypervisor::detect().may_be_qemu(), QEMU_LEGACY_PORT, QEMU_SHUTDOWN)
    }
}

pub struct VirtualBox;

impl ShutdownPrimitive for VirtualBox {
    fn name(&self) -> &'static str {
        "virtualbox"
    }

    fn power_off(&self, _reason: ResetReason) -> Result<Infallible, ShutdownError> {
        write_port(
            Hypervisor::detect().may_be_virtualbox(),
            VIRTUALBOX_PORT,
            VIRTUALBOX_SHUTDOWN,
        )
    }
}

static PRIMITIVES: [&dyn ShutdownPrimitive; 3] = [&QemuAcpi, &QemuLegacy, &VirtualBox];

pub static SEQUENCE: ShutdownSequence<'static> = ShutdownSequence::new(&PRIMITIVES);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_signatures() {
        assert_eq!(Hypervisor::from_signature(b"TCGTCGTCGTCG"), Hypervisor::Tcg);
        assert_eq!(Hypervisor::from_signature(b"KVMKVMKVM\0\0\0"), Hypervisor::Kvm);
        assert_eq!(Hypervisor::from_signature(b"VBoxVBoxVBox"), Hypervisor::VirtualBox);
        assert_eq!(Hypervisor::from_signature(b"Microsoft Hv"), Hypervisor::Other);
    }

    #[test]
    fn bare_metal_rules_every_port_out() {
        assert!(!Hypervisor::BareMetal.may_be_qemu());
        assert!(!Hypervisor::BareMetal.may_be_virtualbox());
    }

    #[test]
    fn each_emulator_only_gets_its_own_ports() {
        assert!(Hypervisor::Tcg.may_be_qemu());
        assert!(!Hypervisor::Tcg.may_be_virtualbox());
        assert!(Hypervisor::VirtualBox.may_be_virtualbox());
        assert!(!Hypervisor::VirtualBox.may_be_qemu());
    }

    #[test]
    fn unidentified_hypervisors_get_no_port_writes() {
        let other = Hypervisor::from_signature(b"Microsoft Hv");
        assert!(!other.may_be_qemu());
        assert!(!other.may_be_virtualbox());
        assert_eq!(
            write_port(other.may_be_qemu(), QEMU_LEGACY_PORT, QEMU_SHUTDOWN),
            Err(ShutdownError::NotPresent)
        );
    }

    #[test]
    fn absent_device_is_never_written() {
        assert_eq!(
            write_port(false, QEMU_ACPI_PORT, QEMU_SHUTDOWN),
            Err(ShutdownError::NotPresent)
        );
    }

    #[test]
    fn sequence_order() {
        let names: Vec<_> = SEQUENCE.primitives().iter().map(|p| p.name()).collect();
        assert_eq!(names, ["qemu-acpi", "qemu-legacy", "virtualbox"]);
    }
}
