//! Where a fault was detected.

use core::fmt;
use core::panic::Location;

/// Function name reported when the fault came from somewhere that cannot
/// name its caller, such as a Rust `panic!`.
pub const UNKNOWN_FUNCTION: &str = "<unknown>";

/// The source location of a fault: file, line and enclosing function.
///
/// Captured once at the call site (normally through [`fault_site!`]) and only
/// read afterwards.
///
/// [`fault_site!`]: crate::fault_site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultSite<'a> {
    pub file: &'a str,
    pub line: u32,
    pub function: &'a str,
}

impl<'a> FaultSite<'a> {
    pub const fn new(file: &'a str, line: u32, function: &'a str) -> Self {
        Self {
            file,
            line,
            function,
        }
    }

    /// Builds a site from a Rust panic location. The enclosing function is
    /// not known there.
    pub fn from_location(location: &Location<'a>) -> Self {
        Self::new(location.file(), location.line(), UNKNOWN_FUNCTION)
    }
}

impl fmt::Display for FaultSite<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}:{} in {}", self.file, self.line, self.function)
    }
}

/// Strips the helper item and any closure frames from a `type_name` path so
/// that only the enclosing function remains.
#[doc(hidden)]
pub fn trim_function_name(raw: &'static str) -> &'static str {
    let mut name = raw.strip_suffix("::__f").unwrap_or(raw);
    while let Some(outer) = name.strip_suffix("::{{closure}}") {
        name = outer;
    }
    name
}

/// Expands to the path of the enclosing function, e.g. `kernel::sync::lock`.
#[macro_export]
macro_rules! function_name {
    () => {{
        fn __f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::core::any::type_name::<T>()
        }
        $crate::site::trim_function_name(type_name_of(__f))
    }};
}

/// Expands to the [`FaultSite`] of the invocation.
#[macro_export]
macro_rules! fault_site {
    () => {
        $crate::site::FaultSite::new(::core::file!(), ::core::line!(), $crate::function_name!())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_file_line_and_function() {
        let site = FaultSite::new("kernel/src/mm.rs", 42, "kernel::mm::map");
        assert_eq!(site.to_string(), "at kernel/src/mm.rs:42 in kernel::mm::map");
    }

    #[test]
    fn function_name_is_the_enclosing_function() {
        let name = crate::function_name!();
        assert!(name.ends_with("tests::function_name_is_the_enclosing_function"), "{name}");
    }

    #[test]
    fn function_name_strips_closures() {
        let name = (|| crate::function_name!())();
        assert!(name.ends_with("tests::function_name_strips_closures"), "{name}");
    }

    #[test]
    fn fault_site_captures_this_file() {
        let site = crate::fault_site!();
        assert_eq!(site.file, file!());
        assert_eq!(site.line, line!() - 2);
        assert!(site.function.ends_with("fault_site_captures_this_file"));
    }

    #[test]
    fn rust_panics_have_no_function() {
        let site = FaultSite::from_location(Location::caller());
        assert_eq!(site.function, UNKNOWN_FUNCTION);
    }
}
