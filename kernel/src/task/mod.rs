// =============================================================================
// MinimalOS Panic Path - Tasks
// =============================================================================
//
// There is no scheduler: each core runs one kernel thread. What the panic
// path needs from a thread is its crash flag and its held lock ranks, both in
// kpanic::ThreadState.
// =============================================================================

pub mod thread;
