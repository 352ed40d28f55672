//! COM1 output for the bare-metal log sink

use core::fmt;

use spin::Mutex;
#[cfg(target_arch = "x86_64")]
use uart_16550::SerialPort;

const COM1: u16 = 0x3f8;

/// Lazily programmed UART. The port is only touched on first write.
struct Com1 {
    #[cfg(target_arch = "x86_64")]
    port: Option<SerialPort>,
}

impl Com1 {
    const fn new() -> Self {
        Self {
            #[cfg(target_arch = "x86_64")]
            port: None,
        }
    }

    #[cfg(target_arch = "x86_64")]
    fn write(&mut self, args: fmt::Arguments<'_>) {
        let port = self.port.get_or_insert_with(|| {
            // SAFETY: COM1 is owned by this module and only reached under
            // the COM1 lock.
            let mut port = unsafe { SerialPort::new(COM1) };
            port.init();
            port
        });
        let _ = fmt::Write::write_fmt(port, args);
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn write(&mut self, args: fmt::Arguments<'_>) {
        let _ = (args, COM1);
    }
}

static PORT: Mutex<Com1> = Mutex::new(Com1::new());

/// Write to COM1 unless the port is already held.
///
/// A trap can land while the same CPU is mid-line, so this never spins on
/// the lock: a contended line is dropped.
pub fn _print(args: fmt::Arguments<'_>) {
    if let Some(mut port) = PORT.try_lock() {
        port.write(args);
    }
}
