//! GDT and TSS.
//!
//! Limine leaves us a usable GDT but no TSS, and without a TSS there is no
//! Interrupt Stack Table. Double faults (often a blown kernel stack) and NMIs
//! (the halt broadcast, which can land anywhere) both need a stack of their
//! own to be handled at all.

use spin::Once;
use x86_64::VirtAddr;
use x86_64::instructions::segmentation::{CS, DS, ES, SS, Segment};
use x86_64::instructions::tables::load_tss;
use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};
use x86_64::structures::tss::TaskStateSegment;

/// IST index used for the double fault handler.
pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;
/// IST index used for the NMI handler.
pub const NMI_IST_INDEX: u16 = 1;

/// Size of each IST stack in bytes (16 KiB).
const IST_STACK_SIZE: usize = 4096 * 4;

#[repr(align(16))]
struct IstStack([u8; IST_STACK_SIZE]);

static mut DOUBLE_FAULT_STACK: IstStack = IstStack([0; IST_STACK_SIZE]);
static mut NMI_STACK: IstStack = IstStack([0; IST_STACK_SIZE]);

struct Selectors {
    kernel_code: SegmentSelector,
    kernel_data: SegmentSelector,
    tss: SegmentSelector,
}

static TSS: Once<TaskStateSegment> = Once::new();
static GDT: Once<(GlobalDescriptorTable, Selectors)> = Once::new();

/// Stack grows downward, so the IST entry is the top of the allocation.
fn stack_top(stack: *const IstStack) -> VirtAddr {
    VirtAddr::from_ptr(stack) + IST_STACK_SIZE as u64
}

/// Load the GDT, reload the segment registers and load the TSS.
pub fn init() {
    let tss = TSS.call_once(|| {
        let mut tss = TaskStateSegment::new();
        tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] =
            stack_top(&raw const DOUBLE_FAULT_STACK);
        tss.interrupt_stack_table[NMI_IST_INDEX as usize] = stack_top(&raw const NMI_STACK);
        tss
    });

    let (gdt, selectors) = GDT.call_once(|| {
        let mut gdt = GlobalDescriptorTable::new();
        let kernel_code = gdt.append(Descriptor::kernel_code_segment());
        let kernel_data = gdt.append(Descriptor::kernel_data_segment());
        let tss = gdt.append(Descriptor::tss_segment(tss));
        (gdt, Selectors { kernel_code, kernel_data, tss })
    });

    gdt.load();
    // SAFETY: the selectors index descriptors of the GDT just loaded, which
    // lives in a static.
    unsafe {
        CS::set_reg(selectors.kernel_code);
        SS::set_reg(selectors.kernel_data);
        DS::set_reg(selectors.kernel_data);
        ES::set_reg(selectors.kernel_data);
        load_tss(selectors.tss);
    }

    log::debug!(
        "GDT loaded (CS={:#06x}, DS={:#06x}, TSS={:#06x})",
        selectors.kernel_code.0,
        selectors.kernel_data.0,
        selectors.tss.0
    );
}
