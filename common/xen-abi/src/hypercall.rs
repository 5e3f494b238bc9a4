//! Hypercall numbers, command codes and flags.

/// `HYPERVISOR_update_va_mapping`.
pub const UPDATE_VA_MAPPING: u64 = 14;
/// `HYPERVISOR_console_io`.
pub const CONSOLE_IO: u64 = 18;
/// `HYPERVISOR_sched_op`.
pub const SCHED_OP: u64 = 29;

/// Size, in bytes, of each hypercall stub in the hypercall page.
pub const HYPERCALL_STUB_SIZE: u64 = 32;

/// No TLB flush after the update.
pub const UVMF_NONE: u64 = 0;
/// Flush the entire TLB after the update.
pub const UVMF_TLB_FLUSH: u64 = 1;
/// Flush only the updated entry.
pub const UVMF_INVLPG: u64 = 2;
/// Mask of the flush kind bits.
pub const UVMF_FLUSHTYPE_MASK: u64 = 3;
/// Flush on the local vCPU only.
pub const UVMF_LOCAL: u64 = 0;
/// Flush on every vCPU of the domain.
pub const UVMF_ALL: u64 = 1 << 2;

/// `console_io` command writing bytes to the hypervisor's debug console.
pub const CONSOLEIO_WRITE: u64 = 0;

/// `sched_op` command shutting the domain down.
pub const SCHEDOP_SHUTDOWN: u64 = 2;

/// Argument of [`SCHEDOP_SHUTDOWN`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct SchedShutdown {
    /// One of the `SHUTDOWN_*` reasons.
    pub reason: u32,
}

/// Domain exited normally.
pub const SHUTDOWN_POWEROFF: u32 = 0;
/// Domain requested a restart.
pub const SHUTDOWN_REBOOT: u32 = 1;
/// Domain crashed.
pub const SHUTDOWN_CRASH: u32 = 3;

/// ELF note types read by the domain builder from the `"Xen"` note namespace.
pub mod elfnote {
    /// Entry point virtual address.
    pub const ENTRY: u32 = 1;
    /// Virtual address of the page to fill with hypercall stubs.
    pub const HYPERCALL_PAGE: u32 = 2;
    /// Virtual base of the kernel image.
    pub const VIRT_BASE: u32 = 3;
    /// Offset between virtual and physical addresses in the image.
    pub const PADDR_OFFSET: u32 = 4;
    /// Required hypervisor interface version.
    pub const XEN_VERSION: u32 = 5;
    /// Guest operating system name.
    pub const GUEST_OS: u32 = 6;
    /// Guest operating system version.
    pub const GUEST_VERSION: u32 = 7;
    /// Loader interface the image expects.
    pub const LOADER: u32 = 8;
}
