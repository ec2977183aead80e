// =============================================================================
// MinimalOS Panic Path - Limine Boot Protocol Interface
// =============================================================================
//
// The kernel binary contains static "request" structures. During boot,
// Limine scans the image for their magic numbers and fills in the response
// pointers before jumping to kmain(). We ask for exactly what the panic path
// needs:
//   - HHDM offset - to reach the xAPIC registers when x2APIC is missing
//   - Executable command line - where `panic=halt|shutdown` comes from
//
// `#[used]` keeps the requests alive (nothing in Rust reads them before
// Limine writes them) and `.limine_requests` keeps them in a loaded segment.
// =============================================================================

use limine::BaseRevision;
use limine::request::{ExecutableCmdlineRequest, HhdmRequest};

/// Limine base revision tag - required by Limine v1+ protocol.
#[used]
#[unsafe(link_section = ".limine_requests")]
static BASE_REVISION: BaseRevision = BaseRevision::new();

#[used]
#[unsafe(link_section = ".limine_requests")]
static HHDM_REQUEST: HhdmRequest = HhdmRequest::new();

/// The command line from the boot entry's `cmdline:` (or `kernel_cmdline:`).
#[used]
#[unsafe(link_section = ".limine_requests")]
static CMDLINE_REQUEST: ExecutableCmdlineRequest = ExecutableCmdlineRequest::new();

/// Whether the bootloader speaks the protocol revision we were built for.
pub fn is_supported() -> bool {
    BASE_REVISION.is_supported()
}

/// The HHDM offset, if Limine provided one.
pub fn hhdm_offset() -> Option<u64> {
    HHDM_REQUEST.get_response().map(|response| response.offset())
}

/// The kernel command line. `None` if the bootloader did not answer the
/// request or the line is not UTF-8; an empty line is `Some("")`.
pub fn cmdline() -> Option<&'static str> {
    CMDLINE_REQUEST
        .get_response()
        .and_then(|response| response.cmdline().to_str().ok())
}
