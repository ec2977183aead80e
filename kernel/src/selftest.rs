// =============================================================================
// MinimalOS Panic Path - Boot-Time Fault Injection
// =============================================================================
//
// `panic_test=<kind>` on the command line makes the kernel fault on purpose
// once boot has finished, so each way into the panic path can be exercised
// under QEMU:
//
//   kpanic      explicit kpanic!
//   assert      failed kassert!
//   rust        core::panic! (through #[panic_handler])
//   lock-order  taking a higher-ranked lock while holding a lower one
//   page-fault  reading an unmapped address
//   breakpoint  int3 (recoverable: logged, boot continues)
// =============================================================================

use kpanic::{CommandLine, LockRank, kassert, kpanic};

use crate::sync::spinlock::SpinLock;

const PANIC_TEST_KEY: &str = "panic_test";

static PROCESS_TABLE: SpinLock<u32> = SpinLock::new(LockRank::PROCESS, 0);
static FRAME_ALLOCATOR: SpinLock<u32> = SpinLock::new(LockRank::MEMORY_MANAGER, 0);

/// Run the fault requested on the command line, if any.
pub fn run(cmdline: &CommandLine<'_>) {
    let Some(kind) = cmdline.get(PANIC_TEST_KEY) else {
        return;
    };
    log::warn!("panic_test: triggering `{}`", kind);

    match kind {
        "kpanic" => kpanic!("panic_test requested"),
        "assert" => {
            let cores = 0;
            kassert!(cores > 0, "booted with {} cores", cores);
        }
        "rust" => panic!("panic_test requested"),
        "lock-order" => lock_order_inversion(),
        "page-fault" => {
            // The lowest page is never mapped.
            let value = unsafe { core::ptr::read_volatile(8 as *const u64) };
            log::error!("panic_test: read {:#x} from an unmapped page", value);
        }
        "breakpoint" => x86_64::instructions::interrupts::int3(),
        other => log::warn!("panic_test: unknown kind `{}`", other),
    }
}

/// Correct order first, then the inversion that must panic.
fn lock_order_inversion() {
    {
        let mut processes = PROCESS_TABLE.lock();
        let mut frames = FRAME_ALLOCATOR.lock();
        *processes += 1;
        *frames += 1;
    }
    log::info!("panic_test: PROCESS -> MEMORY_MANAGER ok");

    let _frames = FRAME_ALLOCATOR.lock();
    let _processes = PROCESS_TABLE.lock();
    log::error!("panic_test: lock-order inversion went unnoticed");
}
