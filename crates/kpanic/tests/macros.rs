//! The panic macros route through the installed orchestrator. Installation is
//! process-wide, so this binary holds a single test.

mod common;

use common::{expect_stop, Event, Machine};
use kpanic::{kassert, PanicOrchestrator, PrintTarget};

fn checked_divide(a: u32, b: u32) -> u32 {
    kassert!(b != 0, "dividing {} by zero", a);
    a / b
}

#[test]
fn kassert_panics_through_the_installed_orchestrator() {
    let machine: &'static Machine = Box::leak(Box::new(Machine::new().with_thread()));
    let orchestrator: &'static PanicOrchestrator<'static> =
        Box::leak(Box::new(machine.orchestrator()));
    kpanic::install(orchestrator);

    assert_eq!(checked_divide(6, 3), 2);
    assert!(machine.trace().is_empty());

    expect_stop(|| {
        checked_divide(1, 0);
    });

    let trace = machine.trace();
    assert_eq!(trace[0], Event::MarkCrashing);
    assert_eq!(trace[1], Event::Critical("KERNEL PANIC! :^(".to_string()));
    assert_eq!(
        trace[2],
        Event::Critical("ASSERTION FAILED: b != 0: dividing 1 by zero".to_string())
    );
    match &trace[3] {
        Event::Critical(line) => {
            assert!(line.starts_with(&format!("at {}:", file!())), "{line}");
            assert!(line.ends_with("macros::checked_divide"), "{line}");
        }
        other => panic!("expected the fault site, got {other:?}"),
    }
    assert_eq!(trace[4], Event::Backtrace(PrintTarget::SCREEN));
    assert_eq!(trace.last(), Some(&Event::Halt));
}
