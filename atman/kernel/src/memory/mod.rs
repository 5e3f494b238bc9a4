//! Guest memory management.
//!
//! A PV guest deals with three address spaces that must never be mixed up:
//!
//! - guest virtual addresses ([`VirtAddr`]), which are what the CPU dereferences,
//! - pseudo-physical frame numbers ([`Pfn`]), the guest's contiguous view of its own memory,
//! - machine frame numbers ([`Mfn`]) and machine addresses ([`MachineAddr`]), the host's frames,
//!   which are what page table entries hold.
//!
//! Conversions between them are explicit and go through the [`p2m`] and [`m2p`] tables.

pub mod addr;
pub mod m2p;
pub mod p2m;
pub mod paging;
pub mod shared_info;

pub use addr::{MachineAddr, Mfn, Pfn, VirtAddr};
