//! Software walk of the page table tree.

use core::{error, fmt};

use crate::{
    hypercall::{HypercallError, Hypervisor, UpdateFlags, install_mapping},
    memory::{
        MachineAddr, VirtAddr,
        m2p::MachineToPhys,
        paging::{Level, PageTableEntry},
    },
};

/// Number of entries in a page table.
pub const ENTRY_COUNT: usize = 512;

/// Read access to page table frames through the guest's virtual address space.
pub trait PageTableMemory {
    /// Returns entry `index` of the table mapped at `table`.
    ///
    /// `index` is always below [`ENTRY_COUNT`].
    fn read_entry(&self, table: VirtAddr, index: usize) -> PageTableEntry;
}

/// [`PageTableMemory`] that dereferences the table addresses directly.
#[derive(Debug)]
pub struct DirectMemory(());

impl DirectMemory {
    /// Creates a new [`DirectMemory`].
    ///
    /// # Safety
    ///
    /// Every page table frame reachable from the tables walked with this [`DirectMemory`] must be
    /// mapped readable at `pfn << 12`, which is how the domain builder lays out the initial
    /// tables.
    pub const unsafe fn new() -> Self {
        Self(())
    }
}

impl PageTableMemory for DirectMemory {
    fn read_entry(&self, table: VirtAddr, index: usize) -> PageTableEntry {
        debug_assert!(index < ENTRY_COUNT);

        let entry = table.as_ptr::<u64>().wrapping_add(index);

        // SAFETY:
        //
        // The invariants of [`DirectMemory::new()`] guarantee that `table` is a mapped page table
        // and `index` is within it. The hypervisor may update accessed and dirty bits at any
        // time, so the read is volatile.
        PageTableEntry::from_raw(unsafe { entry.read_volatile() })
    }
}

/// Walks a 4-level page table tree rooted at a top-level table.
pub struct PageTableWalker<'a, M> {
    root: VirtAddr,
    m2p: MachineToPhys<'a>,
    memory: &'a M,
}

impl<'a, M: PageTableMemory> PageTableWalker<'a, M> {
    /// Creates a walker over the tree whose top-level table is mapped at `root`.
    pub fn new(root: VirtAddr, m2p: MachineToPhys<'a>, memory: &'a M) -> Self {
        Self { root, m2p, memory }
    }

    /// Returns the virtual address of the top-level table.
    pub fn root(&self) -> VirtAddr {
        self.root
    }

    /// Returns the entry covering `address` at `target`, descending from the top-level table.
    ///
    /// A table is only descended into if the guest owns its frame. The hypervisor's own tables,
    /// such as those mapping the machine-to-physical table, are never read.
    ///
    /// # Errors
    ///
    /// Returns [`TranslationMiss`] if an entry above `target` is not present or references a
    /// frame the guest does not own.
    pub fn entry(
        &self,
        address: VirtAddr,
        target: Level,
    ) -> Result<PageTableEntry, TranslationMiss> {
        let mut table = self.root;
        for level in Level::WALK_ORDER {
            let entry = self
                .memory
                .read_entry(table, address.page_table_index(level));
            if level == target {
                return Ok(entry);
            }

            let miss = |reason| TranslationMiss {
                address,
                level,
                entry,
                reason,
            };
            if !entry.is_present() {
                return Err(miss(MissReason::NotPresent));
            }

            let pfn = entry.pfn(&self.m2p);
            if !pfn.is_valid() {
                return Err(miss(MissReason::UnownedFrame));
            }

            table = pfn.identity_virt();
        }

        unreachable!("every level is part of the walk")
    }

    /// Translates `address` to the machine address it maps to.
    ///
    /// # Errors
    ///
    /// Returns [`TranslationMiss`] naming the level at which the walk stopped.
    pub fn translate(&self, address: VirtAddr) -> Result<MachineAddr, TranslationMiss> {
        let leaf = self.entry(address, Level::Level1)?;
        if !leaf.is_present() {
            return Err(TranslationMiss {
                address,
                level: Level::Level1,
                entry: leaf,
                reason: MissReason::NotPresent,
            });
        }

        Ok(MachineAddr::new(
            leaf.mfn().machine_addr().value() + address.page_offset(),
        ))
    }

    /// Asks the hypervisor to replace the leaf entry mapping `address` with `entry`.
    ///
    /// # Errors
    ///
    /// Returns [`HypercallError`] if the hypervisor rejects the update.
    ///
    /// # Safety
    ///
    /// No live reference may point into the page currently mapped at `address`.
    pub unsafe fn install<H: Hypervisor>(
        &self,
        hypervisor: &H,
        address: VirtAddr,
        entry: PageTableEntry,
        flags: UpdateFlags,
    ) -> Result<(), HypercallError> {
        // SAFETY:
        //
        // The invariants of this function are the invariants of `install_mapping()`.
        unsafe { install_mapping(hypervisor, address, entry, flags) }
    }
}

/// A virtual address has no translation.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct TranslationMiss {
    /// The address that was being translated.
    pub address: VirtAddr,
    /// The level of the entry that stopped the walk.
    pub level: Level,
    /// The entry that stopped the walk.
    pub entry: PageTableEntry,
    /// Why `entry` stopped the walk.
    pub reason: MissReason,
}

/// Why a [`PageTableWalker`] stopped before reaching a page.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum MissReason {
    /// The entry maps nothing.
    NotPresent,
    /// The entry references a table in a frame the guest does not own.
    UnownedFrame,
}

impl fmt::Display for TranslationMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is not mapped: {} entry {:#x} ",
            self.address,
            self.level,
            self.entry.raw()
        )?;

        match self.reason {
            MissReason::NotPresent => f.write_str("is not present"),
            MissReason::UnownedFrame => write!(
                f,
                "references machine frame {} not owned by the guest",
                self.entry.mfn()
            ),
        }
    }
}

impl error::Error for TranslationMiss {}
