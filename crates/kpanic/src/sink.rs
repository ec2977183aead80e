use core::fmt;

/// Where the panic path writes its diagnostics.
pub trait DiagnosticSink: Sync {
    /// Writes a line to the channel that is reachable even while the rest of
    /// the kernel is broken (serial, screen). Must not wait on locks that the
    /// faulting context could hold. A newline is appended.
    fn critical_line(&self, args: fmt::Arguments<'_>);

    /// Writes a line to the regular kernel log.
    fn log_line(&self, args: fmt::Arguments<'_>);
}
