//! Logging interface implementation for the Xen debug console.

use core::fmt::{self, Write};

use atman::{
    logging::{Log, Message},
    unsafe_global_logger,
};
use atman_x86_64::XenHypervisor;

unsafe_global_logger!(Logger);

/// Implementation of [`Log`] using the hypervisor's debug console.
struct Logger;

impl Log for Logger {
    fn log(&self, message: &Message) {
        let _ = writeln!(
            Console,
            "[{}][{}]: {}",
            message.level(),
            message.target(),
            message.args()
        );
    }
}

/// Implementation of [`Write`] for the hypervisor's debug console.
struct Console;

impl Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // SAFETY:
        //
        // `atman-x86_64-xen` only runs as a PV guest, whose hypercall page is populated before the
        // first instruction executes.
        let hypervisor = unsafe { XenHypervisor::new() };

        hypervisor
            .console_write(s.as_bytes())
            .map_err(|_| fmt::Error)
    }
}
