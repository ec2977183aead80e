//! Kernel threads and the per-core "current thread" slot.

use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use kpanic::{CrashMark, CurrentThread, ThreadState};

/// Upper bound on cores with a current-thread slot.
pub const MAX_CPUS: usize = 64;

pub struct Thread {
    id: u32,
    name: &'static str,
    state: ThreadState,
}

impl Thread {
    pub const fn new(id: u32, name: &'static str) -> Self {
        Self {
            id,
            name,
            state: ThreadState::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> &ThreadState {
        &self.state
    }
}

/// The thread kmain() runs on.
pub static BOOT_THREAD: Thread = Thread::new(0, "boot");

static CURRENT: [AtomicPtr<Thread>; MAX_CPUS] =
    [const { AtomicPtr::new(ptr::null_mut()) }; MAX_CPUS];

/// Index of the calling core's slot. The APIC ID stands in for a CPU index
/// until cores are numbered densely.
fn slot() -> Option<&'static AtomicPtr<Thread>> {
    CURRENT.get(khal::apic::id() as usize)
}

/// Make `thread` the calling core's current thread.
pub fn set_current(thread: &'static Thread) {
    if let Some(slot) = slot() {
        slot.store(ptr::from_ref(thread).cast_mut(), Ordering::Release);
    } else {
        log::warn!("thread: no slot for APIC ID {}", khal::apic::id());
    }
}

/// The calling core's current thread, if it has one.
pub fn current() -> Option<&'static Thread> {
    let thread = slot()?.load(Ordering::Acquire);
    // SAFETY: slots only ever hold pointers derived from `&'static Thread`.
    unsafe { thread.as_ref() }
}

/// Current-thread lookup for the panic orchestrator. Lock-free: one atomic
/// load.
pub struct Threads;

impl CurrentThread for Threads {
    fn current(&self) -> Option<&dyn CrashMark> {
        current().map(|thread| thread.state() as &dyn CrashMark)
    }
}
