//! The guest's 4-level page tables.
//!
//! A PV guest reads its page tables directly but may never write a live entry: every change is
//! submitted through [`crate::hypercall::install_mapping()`], which lets the hypervisor validate
//! it.

mod entry;
mod level;
mod walk;

pub use entry::{PageTableEntry, PageTableFlags};
pub use level::Level;
pub use walk::{
    DirectMemory, ENTRY_COUNT, MissReason, PageTableMemory, PageTableWalker, TranslationMiss,
};
