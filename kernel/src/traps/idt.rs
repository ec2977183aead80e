//! IDT initialization.

use spin::Once;
use x86_64::structures::idt::InterruptDescriptorTable;

use crate::arch::gdt::{DOUBLE_FAULT_IST_INDEX, NMI_IST_INDEX};

use super::handlers;

/// Global IDT instance.
static IDT: Once<InterruptDescriptorTable> = Once::new();

/// Build and load the IDT. The GDT (and with it the TSS) must be loaded.
pub fn init_idt() {
    let idt = IDT.call_once(|| {
        let mut idt = InterruptDescriptorTable::new();
        idt.breakpoint.set_handler_fn(handlers::breakpoint_handler);
        idt.divide_error.set_handler_fn(handlers::divide_error_handler);
        idt.invalid_opcode.set_handler_fn(handlers::invalid_opcode_handler);
        idt.general_protection_fault
            .set_handler_fn(handlers::general_protection_fault_handler);
        idt.page_fault.set_handler_fn(handlers::page_fault_handler);
        // SAFETY: both indices point at IST stacks set up by gdt::init and
        // used by no other vector.
        unsafe {
            idt.double_fault
                .set_handler_fn(handlers::double_fault_handler)
                .set_stack_index(DOUBLE_FAULT_IST_INDEX);
            idt.non_maskable_interrupt
                .set_handler_fn(handlers::nmi_handler)
                .set_stack_index(NMI_IST_INDEX);
        }
        idt
    });
    idt.load();
    log::debug!("IDT loaded");
}
