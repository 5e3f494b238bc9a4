//! Hypercalls through the hypercall page.
//!
//! The domain builder fills the page reserved here with one 32-byte stub per hypercall number,
//! each of which loads the number into `rax` and executes `syscall`.

use core::arch::{asm, global_asm};

use atman::{
    hypercall::{HypercallError, Hypervisor, UpdateFlags},
    memory::{VirtAddr, paging::PageTableEntry},
};
use xen_abi::hypercall::{
    CONSOLE_IO, CONSOLEIO_WRITE, HYPERCALL_STUB_SIZE, SCHED_OP, SCHEDOP_SHUTDOWN, SHUTDOWN_CRASH,
    SHUTDOWN_POWEROFF, SHUTDOWN_REBOOT, SchedShutdown, UPDATE_VA_MAPPING,
};

global_asm!(
    ".pushsection .text.hypercall_page, \"ax\"",
    ".balign 4096",
    ".global hypercall_page",
    "hypercall_page:",
    ".fill 4096, 1, 0xcc",
    ".popsection",
);

unsafe extern "C" {
    /// The page the domain builder fills with hypercall stubs.
    #[link_name = "hypercall_page"]
    static HYPERCALL_PAGE: u8;
}

/// Issues hypercall `number` with up to three arguments and returns its status.
///
/// # Safety
///
/// The hypercall page must have been populated, and the arguments must satisfy the requirements
/// of hypercall `number`.
unsafe fn hypercall3(number: u64, arg0: u64, arg1: u64, arg2: u64) -> i64 {
    let entry = (&raw const HYPERCALL_PAGE).wrapping_add((number * HYPERCALL_STUB_SIZE) as usize);
    let status: i64;

    // SAFETY:
    //
    // The invariants of this function guarantee that the stub at `entry` exists and that the
    // hypervisor accepts the arguments. The stub follows the hypercall ABI, clobbering only the
    // argument registers, `rax`, `rcx` and `r11`.
    unsafe {
        asm!(
            "call {entry}",
            entry = in(reg) entry,
            inlateout("rdi") arg0 => _,
            inlateout("rsi") arg1 => _,
            inlateout("rdx") arg2 => _,
            lateout("rax") status,
            lateout("rcx") _,
            lateout("r11") _,
        );
    }

    status
}

/// Why the domain shuts down.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The guest finished its work.
    Poweroff,
    /// The guest asks to be restarted.
    Reboot,
    /// The guest hit an unrecoverable error.
    Crash,
}

impl ShutdownReason {
    const fn code(self) -> u32 {
        match self {
            Self::Poweroff => SHUTDOWN_POWEROFF,
            Self::Reboot => SHUTDOWN_REBOOT,
            Self::Crash => SHUTDOWN_CRASH,
        }
    }
}

/// [`Hypervisor`] implementation that traps into Xen.
#[derive(Debug)]
pub struct XenHypervisor(());

impl XenHypervisor {
    /// Creates a new [`XenHypervisor`].
    ///
    /// # Safety
    ///
    /// The guest must run paravirtualized under Xen, with the hypercall page populated by the
    /// domain builder.
    pub const unsafe fn new() -> Self {
        Self(())
    }

    /// Writes `bytes` to the hypervisor's debug console.
    ///
    /// # Errors
    ///
    /// Returns [`HypercallError`] if the hypervisor rejects the write.
    pub fn console_write(&self, bytes: &[u8]) -> Result<(), HypercallError> {
        // SAFETY:
        //
        // `bytes` is readable for its whole length, which is all `CONSOLEIO_write` accesses.
        let status = unsafe {
            hypercall3(
                CONSOLE_IO,
                CONSOLEIO_WRITE,
                bytes.len() as u64,
                bytes.as_ptr() as u64,
            )
        };
        if status < 0 {
            return Err(HypercallError::new(status));
        }

        Ok(())
    }

    /// Shuts the domain down for `reason`.
    pub fn shutdown(&self, reason: ShutdownReason) -> ! {
        let argument = SchedShutdown {
            reason: reason.code(),
        };

        // SAFETY:
        //
        // `argument` is a valid `sched_shutdown` structure that outlives the call.
        let _ = unsafe {
            hypercall3(
                SCHED_OP,
                SCHEDOP_SHUTDOWN,
                (&raw const argument) as u64,
                0,
            )
        };

        // The hypervisor does not schedule the domain again once the shutdown is accepted.
        loop {
            core::hint::spin_loop();
        }
    }
}

impl Hypervisor for XenHypervisor {
    unsafe fn update_va_mapping(
        &self,
        address: VirtAddr,
        entry: PageTableEntry,
        flags: UpdateFlags,
    ) -> i64 {
        // SAFETY:
        //
        // The invariants of this function guarantee that replacing the mapping at `address` does
        // not invalidate live references.
        unsafe {
            hypercall3(
                UPDATE_VA_MAPPING,
                address.value(),
                entry.raw(),
                flags.bits(),
            )
        }
    }
}
