//! Exception handling: CPU faults become kernel panics, and the NMI that the
//! halt broadcast sends parks the core.

pub mod handlers;
pub mod idt;
