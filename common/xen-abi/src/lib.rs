//! Definitions of the Xen paravirtualized guest interface used by `atman`.
//!
//! Every structure in this crate mirrors a layout written by the hypervisor and must match it
//! byte for byte. Field order and explicit padding follow the `x86_64` Xen public headers, and the
//! layouts are checked at compile time.

#![no_std]

pub mod hypercall;
pub mod shared_info;
pub mod start_info;

/// Size, in bytes, of a page on `x86_64`.
pub const PAGE_SIZE: u64 = 4096;
/// Number of bits in the offset of an address within a page.
pub const PAGE_SHIFT: u32 = 12;

/// Virtual address at which the hypervisor maps the machine-to-physical table into every PV guest.
pub const MACH2PHYS_VIRT_START: u64 = 0xFFFF_8000_0000_0000;
/// Virtual address one past the end of the machine-to-physical table.
pub const MACH2PHYS_VIRT_END: u64 = 0xFFFF_8040_0000_0000;
/// Number of entries in the machine-to-physical table.
pub const MACH2PHYS_NR_ENTRIES: u64 = (MACH2PHYS_VIRT_END - MACH2PHYS_VIRT_START) / 8;
/// Value stored in the machine-to-physical table for frames that belong to no guest.
pub const INVALID_M2P_ENTRY: u64 = !0;
