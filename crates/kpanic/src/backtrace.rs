//! Frame-pointer backtraces for the panic path.
//!
//! The walker trusts nothing it reads: every frame is fetched through a
//! [`StackMemory`] that refuses addresses outside the stack, the chain must
//! keep moving towards the stack base, and the depth is capped. A short dump
//! is fine, hanging or faulting again is not.

use core::fmt;
use core::mem::size_of;

use bitflags::bitflags;

use crate::sink::DiagnosticSink;

/// Upper bound on printed frames.
pub const MAX_FRAMES: usize = 64;

const WORD: usize = size_of::<usize>();

bitflags! {
    /// Where a backtrace is printed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PrintTarget: u8 {
        /// The critical channel (serial console / screen).
        const SCREEN = 1 << 0;
        /// The regular kernel log.
        const LOG    = 1 << 1;
        const BOTH   = Self::SCREEN.bits() | Self::LOG.bits();
    }
}

/// Dumps the current call stack.
pub trait Backtrace: Sync {
    fn dump(&self, target: PrintTarget);
}

/// Word-sized reads from a stack, refusing anything that cannot be read
/// safely.
pub trait StackMemory {
    fn read_word(&self, addr: usize) -> Option<usize>;
}

/// A mapped, readable stack region `[low, high)`.
#[derive(Debug, Clone, Copy)]
pub struct StackBounds {
    low: usize,
    high: usize,
}

impl StackBounds {
    /// # Safety
    ///
    /// Every word-aligned address in `[low, high)` must be mapped and
    /// readable for as long as the bounds are used.
    pub const unsafe fn new(low: usize, high: usize) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.low && addr.checked_add(WORD).is_some_and(|end| end <= self.high)
    }
}

impl StackMemory for StackBounds {
    fn read_word(&self, addr: usize) -> Option<usize> {
        if addr % WORD != 0 || !self.contains(addr) {
            return None;
        }
        // SAFETY: `new` guarantees the range is readable; the address is
        // aligned and inside it.
        Some(unsafe { core::ptr::read_volatile(addr as *const usize) })
    }
}

/// Where the saved frame pointer and return address sit relative to a frame
/// pointer, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub saved_fp: isize,
    pub return_address: isize,
}

impl FrameLayout {
    /// `rbp` / `x29` point at the saved frame pointer, followed by the
    /// return address.
    pub const X86_64: Self = Self {
        saved_fp: 0,
        return_address: WORD as isize,
    };
    pub const AARCH64: Self = Self::X86_64;
    /// `s0` points just past the saved `ra` and `s0`.
    pub const RISCV64: Self = Self {
        saved_fp: -2 * WORD as isize,
        return_address: -(WORD as isize),
    };

    #[cfg(target_arch = "riscv64")]
    pub const NATIVE: Self = Self::RISCV64;
    #[cfg(target_arch = "aarch64")]
    pub const NATIVE: Self = Self::AARCH64;
    #[cfg(not(any(target_arch = "riscv64", target_arch = "aarch64")))]
    pub const NATIVE: Self = Self::X86_64;
}

/// Iterates over the return addresses of a frame-pointer chain.
pub struct FrameWalker<'m, M: StackMemory + ?Sized> {
    memory: &'m M,
    layout: FrameLayout,
    fp: usize,
    remaining: usize,
}

impl<'m, M: StackMemory + ?Sized> FrameWalker<'m, M> {
    pub fn new(memory: &'m M, layout: FrameLayout, fp: usize) -> Self {
        Self {
            memory,
            layout,
            fp,
            remaining: MAX_FRAMES,
        }
    }

    fn read_at(&self, offset: isize) -> Option<usize> {
        self.memory.read_word(self.fp.checked_add_signed(offset)?)
    }
}

impl<M: StackMemory + ?Sized> Iterator for FrameWalker<'_, M> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 || self.fp == 0 || self.fp % WORD != 0 {
            return None;
        }

        let saved_fp = self.read_at(self.layout.saved_fp)?;
        let return_address = self.read_at(self.layout.return_address)?;
        if return_address == 0 {
            self.fp = 0;
            return None;
        }

        // Callers live further up the stack. Anything else is a loop or garbage.
        self.fp = if saved_fp > self.fp { saved_fp } else { 0 };
        self.remaining -= 1;
        Some(return_address)
    }
}

/// A symbol table sorted by address.
#[derive(Debug, Clone, Copy, Default)]
pub struct Symbols<'a> {
    entries: &'a [(usize, &'a str)],
}

impl<'a> Symbols<'a> {
    pub const EMPTY: Symbols<'static> = Symbols { entries: &[] };

    /// `entries` must be sorted by address.
    pub const fn new(entries: &'a [(usize, &'a str)]) -> Self {
        Self { entries }
    }

    /// The symbol containing `addr` and the offset into it.
    pub fn lookup(&self, addr: usize) -> Option<(&'a str, usize)> {
        let index = self.entries.partition_point(|&(base, _)| base <= addr);
        let (base, name) = *self.entries.get(index.checked_sub(1)?)?;
        Some((name, addr - base))
    }
}

/// Gives the backtrace dumper the current frame pointer and a view of the
/// stack it lives on.
pub trait FrameSource: Sync {
    type Memory: StackMemory;

    /// `None` if the current stack cannot be described (unknown stack).
    fn current(&self) -> Option<(usize, Self::Memory)>;
}

/// [`Backtrace`] over a frame-pointer chain.
pub struct FramePointerBacktrace<'a, F: FrameSource> {
    frames: &'a F,
    layout: FrameLayout,
    symbols: Symbols<'a>,
    sink: &'a dyn DiagnosticSink,
}

impl<'a, F: FrameSource> FramePointerBacktrace<'a, F> {
    pub const fn new(
        frames: &'a F,
        layout: FrameLayout,
        symbols: Symbols<'a>,
        sink: &'a dyn DiagnosticSink,
    ) -> Self {
        Self {
            frames,
            layout,
            symbols,
            sink,
        }
    }

    fn emit(&self, target: PrintTarget, args: fmt::Arguments<'_>) {
        if target.contains(PrintTarget::SCREEN) {
            self.sink.critical_line(args);
        }
        if target.contains(PrintTarget::LOG) {
            self.sink.log_line(args);
        }
    }
}

impl<F: FrameSource> Backtrace for FramePointerBacktrace<'_, F> {
    fn dump(&self, target: PrintTarget) {
        self.emit(target, format_args!("Kernel backtrace:"));

        let Some((fp, memory)) = self.frames.current() else {
            self.emit(target, format_args!("  <stack unavailable>"));
            return;
        };

        let mut printed = 0;
        for address in FrameWalker::new(&memory, self.layout, fp) {
            match self.symbols.lookup(address) {
                Some((name, offset)) => {
                    self.emit(target, format_args!("  {address:#018x}  {name}+{offset:#x}"))
                }
                None => self.emit(target, format_args!("  {address:#018x}  ???")),
            }
            printed += 1;
        }

        if printed == 0 {
            self.emit(target, format_args!("  <no frames>"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// A fake stack: a sparse map of word addresses.
    #[derive(Default, Clone)]
    struct FakeStack(HashMap<usize, usize>);

    impl FakeStack {
        fn frame(mut self, fp: usize, saved_fp: usize, ret: usize) -> Self {
            self.0.insert(fp, saved_fp);
            self.0.insert(fp + WORD, ret);
            self
        }
    }

    impl StackMemory for FakeStack {
        fn read_word(&self, addr: usize) -> Option<usize> {
            self.0.get(&addr).copied()
        }
    }

    fn walk(stack: &FakeStack, fp: usize) -> Vec<usize> {
        FrameWalker::new(stack, FrameLayout::X86_64, fp).collect()
    }

    #[test]
    fn walks_until_the_chain_ends() {
        let stack = FakeStack::default()
            .frame(0x1000, 0x1040, 0xaaa)
            .frame(0x1040, 0x1080, 0xbbb)
            .frame(0x1080, 0, 0xccc);
        assert_eq!(walk(&stack, 0x1000), [0xaaa, 0xbbb, 0xccc]);
    }

    #[test]
    fn stops_on_a_loop() {
        let stack = FakeStack::default()
            .frame(0x1000, 0x1040, 0xaaa)
            .frame(0x1040, 0x1000, 0xbbb);
        assert_eq!(walk(&stack, 0x1000), [0xaaa, 0xbbb]);
    }

    #[test]
    fn stops_on_unreadable_or_misaligned_frames() {
        let stack = FakeStack::default().frame(0x1000, 0x9000, 0xaaa);
        assert_eq!(walk(&stack, 0x1000), [0xaaa]);
        assert!(walk(&stack, 0x1003).is_empty());
        assert!(walk(&stack, 0).is_empty());
    }

    #[test]
    fn stops_on_a_null_return_address() {
        let stack = FakeStack::default()
            .frame(0x1000, 0x1040, 0xaaa)
            .frame(0x1040, 0x1080, 0)
            .frame(0x1080, 0, 0xccc);
        assert_eq!(walk(&stack, 0x1000), [0xaaa]);
    }

    #[test]
    fn depth_is_capped() {
        let mut stack = FakeStack::default();
        for i in 0..(MAX_FRAMES + 10) {
            let fp = 0x10_0000 + i * 0x20;
            stack = stack.frame(fp, fp + 0x20, 0x4000 + i);
        }
        assert_eq!(walk(&stack, 0x10_0000).len(), MAX_FRAMES);
    }

    #[test]
    fn riscv_layout_reads_below_the_frame_pointer() {
        let mut stack = FakeStack::default();
        stack.0.insert(0x2000 - 2 * WORD, 0x2100);
        stack.0.insert(0x2000 - WORD, 0xaaa);
        stack.0.insert(0x2100 - 2 * WORD, 0);
        stack.0.insert(0x2100 - WORD, 0xbbb);
        let frames: Vec<_> = FrameWalker::new(&stack, FrameLayout::RISCV64, 0x2000).collect();
        assert_eq!(frames, [0xaaa, 0xbbb]);
    }

    #[test]
    fn bounds_refuse_addresses_outside_the_stack() {
        let words = [7usize, 8, 9];
        let low = words.as_ptr() as usize;
        let bounds = unsafe { StackBounds::new(low, low + 3 * WORD) };
        assert_eq!(bounds.read_word(low), Some(7));
        assert_eq!(bounds.read_word(low + 2 * WORD), Some(9));
        assert_eq!(bounds.read_word(low + 3 * WORD), None);
        assert_eq!(bounds.read_word(low - WORD), None);
        assert_eq!(bounds.read_word(low + 1), None);
    }

    #[test]
    fn symbols_resolve_to_the_enclosing_entry() {
        let table = [(0x1000, "kmain"), (0x1200, "panic"), (0x1800, "halt")];
        let symbols = Symbols::new(&table);
        assert_eq!(symbols.lookup(0x0fff), None);
        assert_eq!(symbols.lookup(0x1000), Some(("kmain", 0)));
        assert_eq!(symbols.lookup(0x1234), Some(("panic", 0x34)));
        assert_eq!(symbols.lookup(0x9000), Some(("halt", 0x7800)));
        assert_eq!(Symbols::EMPTY.lookup(0x1000), None);
    }

    #[derive(Default)]
    struct Lines {
        critical: RefCell<Vec<String>>,
        log: RefCell<Vec<String>>,
    }

    // Tests are single threaded per sink instance.
    unsafe impl Sync for Lines {}

    impl DiagnosticSink for Lines {
        fn critical_line(&self, args: fmt::Arguments<'_>) {
            self.critical.borrow_mut().push(args.to_string());
        }

        fn log_line(&self, args: fmt::Arguments<'_>) {
            self.log.borrow_mut().push(args.to_string());
        }
    }

    struct Fixed(Option<(usize, FakeStack)>);

    impl FrameSource for Fixed {
        type Memory = FakeStack;

        fn current(&self) -> Option<(usize, FakeStack)> {
            self.0.clone()
        }
    }

    #[test]
    fn dump_prints_symbolised_frames_to_the_screen() {
        let stack = FakeStack::default()
            .frame(0x1000, 0x1040, 0x1234)
            .frame(0x1040, 0, 0x5000);
        let frames = Fixed(Some((0x1000, stack)));
        let table = [(0x1200, "kernel::panic")];
        let sink = Lines::default();

        FramePointerBacktrace::new(&frames, FrameLayout::X86_64, Symbols::new(&table), &sink)
            .dump(PrintTarget::SCREEN);

        assert_eq!(
            *sink.critical.borrow(),
            [
                "Kernel backtrace:",
                "  0x0000000000001234  kernel::panic+0x34",
                "  0x0000000000005000  kernel::panic+0x3e00",
            ]
        );
        assert!(sink.log.borrow().is_empty());
    }

    #[test]
    fn dump_routes_to_every_requested_target() {
        let frames = Fixed(None);
        let sink = Lines::default();
        FramePointerBacktrace::new(&frames, FrameLayout::X86_64, Symbols::EMPTY, &sink)
            .dump(PrintTarget::BOTH);

        let expected = ["Kernel backtrace:", "  <stack unavailable>"];
        assert_eq!(*sink.critical.borrow(), expected);
        assert_eq!(*sink.log.borrow(), expected);
    }

    #[test]
    fn dump_reports_an_empty_chain() {
        let frames = Fixed(Some((0, FakeStack::default())));
        let sink = Lines::default();
        FramePointerBacktrace::new(&frames, FrameLayout::X86_64, Symbols::EMPTY, &sink)
            .dump(PrintTarget::LOG);

        assert!(sink.critical.borrow().is_empty());
        assert_eq!(*sink.log.borrow(), ["Kernel backtrace:", "  <no frames>"]);
    }
}
