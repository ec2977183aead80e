/// Panics the kernel through the installed orchestrator.
///
/// ```ignore
/// kpanic!("page table for {:#x} is corrupted", addr);
/// ```
#[macro_export]
macro_rules! kpanic {
    () => {
        $crate::orchestrator::panic_at(&$crate::fault_site!(), ::core::option::Option::None)
    };
    ($($arg:tt)+) => {
        $crate::orchestrator::panic_at(
            &$crate::fault_site!(),
            ::core::option::Option::Some(::core::format_args!($($arg)+)),
        )
    };
}

/// Panics the kernel if `cond` is false.
#[macro_export]
macro_rules! kassert {
    ($cond:expr $(,)?) => {
        if !$cond {
            $crate::kpanic!("ASSERTION FAILED: {}", ::core::stringify!($cond));
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::kpanic!(
                "ASSERTION FAILED: {}: {}",
                ::core::stringify!($cond),
                ::core::format_args!($($arg)+)
            );
        }
    };
}

/// Marks code that must never run.
#[macro_export]
macro_rules! kassert_not_reached {
    () => {
        $crate::kpanic!("ASSERTION FAILED: not reached")
    };
}
