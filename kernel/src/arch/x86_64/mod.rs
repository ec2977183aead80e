// =============================================================================
// MinimalOS Panic Path - x86_64 Architecture Support
// =============================================================================
//
//   boot.rs - Limine requests (HHDM, command line)
//   gdt.rs  - GDT + TSS with dedicated stacks for #DF and NMI
//
// CPU halt, the APIC and serial live in khal; what remains here is specific
// to how this kernel boots.
// =============================================================================

pub mod boot;
pub mod gdt;
