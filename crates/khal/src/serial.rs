//! Serial port (COM1 UART 16550) driver.
//!
//! Two ways in: the locked writers used by the normal log, and
//! [`write_fmt_unlocked`] for the panic path, which must not wait on a lock
//! the faulting code might be holding. Output from the unlocked path can
//! interleave with another core's; a deadlock instead of a panic message
//! would be worse.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use crate::port::{inb, outb};

/// COM1 base port address
const COM1_PORT: u16 = 0x3F8;

/// Set once the UART has been programmed. Writes before that are dropped.
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Serial port driver for COM1
pub struct Serial(());

impl Serial {
    const fn new() -> Self {
        Self(())
    }

    /// Initialize the serial port (115200 baud, 8N1)
    pub fn init(&mut self) {
        unsafe {
            // Disable all interrupts
            outb(COM1_PORT + 1, 0x00);

            // Enable DLAB (set baud rate divisor)
            outb(COM1_PORT + 3, 0x80);

            // Set divisor to 1 (115200 baud)
            outb(COM1_PORT, 0x01); // Divisor low byte
            outb(COM1_PORT + 1, 0x00); // Divisor high byte

            // 8 bits, no parity, one stop bit (clear DLAB)
            outb(COM1_PORT + 3, 0x03);

            // Enable FIFO, clear them, with 14-byte threshold
            outb(COM1_PORT + 2, 0xC7);

            // Put chip in loopback mode and check that a test byte comes back
            outb(COM1_PORT + 4, 0x1E);
            outb(COM1_PORT, 0xAE);
            if inb(COM1_PORT) != 0xAE {
                // Faulty or absent UART. Keep writing anyway: on emulators the
                // loopback is sometimes not modelled while output still works.
                outb(COM1_PORT + 4, 0x0F);
                INITIALIZED.store(true, Ordering::Release);
                return;
            }

            // Normal operation (OUT1, OUT2, RTS, DTR), interrupts stay off: we poll
            outb(COM1_PORT + 4, 0x0F);
            outb(COM1_PORT + 1, 0x00);
        }
        INITIALIZED.store(true, Ordering::Release);
    }

    /// Check if transmit buffer is empty
    fn is_transmit_empty() -> bool {
        unsafe { inb(COM1_PORT + 5) & 0x20 != 0 }
    }

    /// Write a byte to the serial port
    pub fn write_byte(&self, byte: u8) {
        if !INITIALIZED.load(Ordering::Acquire) {
            return;
        }

        // Wait for transmit buffer to be empty
        while !Self::is_transmit_empty() {
            core::hint::spin_loop();
        }

        unsafe {
            outb(COM1_PORT, byte);
        }
    }

    /// Write a string to the serial port, translating `\n` to `\r\n`.
    pub fn write_str(&self, s: &str) {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
    }
}

impl fmt::Write for Serial {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Serial::write_str(self, s);
        Ok(())
    }
}

/// Global serial port instance (COM1)
static SERIAL: Mutex<Serial> = Mutex::new(Serial::new());

/// Initialize the global serial port
pub fn init() {
    SERIAL.lock().init();
}

/// Write formatted arguments to the serial port
pub fn write_fmt(args: fmt::Arguments) {
    use fmt::Write;
    let _ = SERIAL.lock().write_fmt(args);
}

/// Write formatted arguments without waiting for the serial lock.
///
/// Takes the lock if it is free so that output stays whole; otherwise writes
/// through a second handle to the same port.
pub fn write_fmt_unlocked(args: fmt::Arguments) {
    use fmt::Write;
    match SERIAL.try_lock() {
        Some(mut serial) => {
            let _ = serial.write_fmt(args);
        }
        None => {
            let _ = Serial::new().write_fmt(args);
        }
    }
}
