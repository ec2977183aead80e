// =============================================================================
// MinimalOS Panic Path - Kernel Utilities
// =============================================================================
//
//   logger.rs - kprintln! macro and the panic diagnostic sink
//   panic.rs  - the kernel's panic orchestrator and #[panic_handler]
// =============================================================================

pub mod logger;
pub mod panic;
