//! Strongly typed coordinates for the guest's address spaces.

use core::fmt;

use xen_abi::{INVALID_M2P_ENTRY, PAGE_SHIFT, PAGE_SIZE};

use crate::memory::{m2p::MachineToPhys, p2m::PhysToMachine, paging::Level};

/// Mask of the offset of an address within its page.
const PAGE_OFFSET_MASK: u64 = PAGE_SIZE - 1;

/// Number of meaningful bits in a 4-level virtual address.
const VIRTUAL_ADDRESS_BITS: u32 = 48;

/// A guest virtual address.
#[repr(transparent)]
#[derive(Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtAddr(u64);

impl VirtAddr {
    /// Creates a new [`VirtAddr`].
    pub const fn new(address: u64) -> Self {
        Self(address)
    }

    /// Returns the [`VirtAddr`] of `ptr`.
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize as u64)
    }

    /// Returns the address as an integer.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns the address as a raw pointer.
    pub const fn as_ptr<T>(self) -> *const T {
        self.0 as usize as *const T
    }

    /// Returns the address as a mutable raw pointer.
    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as usize as *mut T
    }

    /// Returns the offset of this address within its page.
    pub const fn page_offset(self) -> u64 {
        self.0 & PAGE_OFFSET_MASK
    }

    /// Returns the index of the entry covering this address in a page table at `level`.
    pub const fn page_table_index(self, level: Level) -> usize {
        level.index_of(self.0)
    }

    /// Returns the four page table indices of this address, indexed by [`Level`].
    pub const fn page_table_indices(self) -> [usize; 4] {
        [
            self.page_table_index(Level::Level1),
            self.page_table_index(Level::Level2),
            self.page_table_index(Level::Level3),
            self.page_table_index(Level::Level4),
        ]
    }

    /// Reassembles a canonical address from its page table `indices`, indexed by [`Level`], and
    /// its page `offset`.
    ///
    /// # Panics
    ///
    /// Panics if an index is not below 512 or `offset` is not below the page size.
    pub const fn from_indices(indices: [usize; 4], offset: u64) -> Self {
        assert!(offset < PAGE_SIZE, "page offset out of range");

        let mut address = offset;
        let mut level = 0;
        while level < 4 {
            assert!(indices[level] < 512, "page table index out of range");

            address |= (indices[level] as u64) << (PAGE_SHIFT + 9 * level as u32);
            level += 1;
        }

        Self::new(sign_extend(address))
    }

    /// Returns `true` if bits 48 to 63 are copies of bit 47.
    pub const fn is_canonical(self) -> bool {
        sign_extend(self.0) == self.0
    }

    /// Returns the address rounded up to the next page boundary.
    ///
    /// Returns [`None`] on overflow.
    pub const fn page_align_up(self) -> Option<Self> {
        match self.0.checked_add(PAGE_OFFSET_MASK) {
            Some(address) => Some(Self(address & !PAGE_OFFSET_MASK)),
            None => None,
        }
    }

    /// Returns the first [`Pfn`] whose identity mapping starts at or above this address.
    pub const fn pfn_ceil(self) -> Pfn {
        Pfn::new(self.0.div_ceil(PAGE_SIZE))
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A pseudo-physical frame number.
#[repr(transparent)]
#[derive(Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pfn(u64);

impl Pfn {
    /// Value the hypervisor stores in the machine-to-physical table for unowned frames.
    pub const INVALID: Self = Self(INVALID_M2P_ENTRY);

    /// Creates a new [`Pfn`].
    pub const fn new(pfn: u64) -> Self {
        Self(pfn)
    }

    /// Returns the frame number as an integer.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns `false` if this is the [`Pfn::INVALID`] sentinel.
    pub const fn is_valid(self) -> bool {
        self.0 != INVALID_M2P_ENTRY
    }

    /// Returns the frame `count` frames above this one.
    ///
    /// # Panics
    ///
    /// Panics if the result does not fit in a `u64`.
    pub const fn add(self, count: u64) -> Self {
        Self(self.0 + count)
    }

    /// Returns the virtual address of this frame under the guest's identity-style mapping of its
    /// pseudo-physical memory.
    pub const fn identity_virt(self) -> VirtAddr {
        VirtAddr::new(self.0 << PAGE_SHIFT)
    }

    /// Translates this frame to the machine frame backing it.
    ///
    /// # Panics
    ///
    /// Panics if the frame is not owned by the guest.
    pub fn to_mfn(self, p2m: &PhysToMachine<'_>) -> Mfn {
        p2m.get(self)
    }
}

impl fmt::Debug for Pfn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pfn({:#x})", self.0)
    }
}

impl fmt::Display for Pfn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A machine frame number.
#[repr(transparent)]
#[derive(Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Mfn(u64);

impl Mfn {
    /// Creates a new [`Mfn`].
    pub const fn new(mfn: u64) -> Self {
        Self(mfn)
    }

    /// Returns the frame number as an integer.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns the machine address of the start of this frame.
    pub const fn machine_addr(self) -> MachineAddr {
        MachineAddr::new(self.0 << PAGE_SHIFT)
    }

    /// Translates this frame to the pseudo-physical frame the hypervisor recorded for it.
    ///
    /// The result is only meaningful for frames owned by the guest; check
    /// [`Pfn::is_valid()`] before treating it as guest memory.
    pub fn to_pfn(self, m2p: &MachineToPhys<'_>) -> Pfn {
        m2p.get(self)
    }
}

impl fmt::Debug for Mfn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mfn({:#x})", self.0)
    }
}

impl fmt::Display for Mfn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A machine address.
#[repr(transparent)]
#[derive(Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct MachineAddr(u64);

impl MachineAddr {
    /// Creates a new [`MachineAddr`].
    pub const fn new(address: u64) -> Self {
        Self(address)
    }

    /// Returns the address as an integer.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns the machine frame containing this address.
    pub const fn mfn(self) -> Mfn {
        Mfn::new(self.0 >> PAGE_SHIFT)
    }

    /// Returns the offset of this address within its frame.
    pub const fn page_offset(self) -> u64 {
        self.0 & PAGE_OFFSET_MASK
    }

    /// Returns `true` if the address is at the start of a frame.
    pub const fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }
}

impl fmt::Debug for MachineAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MachineAddr({:#x})", self.0)
    }
}

impl fmt::Display for MachineAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Copies bit 47 of `address` into bits 48 to 63.
const fn sign_extend(address: u64) -> u64 {
    let shift = 64 - VIRTUAL_ADDRESS_BITS;
    (((address << shift) as i64) >> shift) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_and_offset_reassemble_address() {
        let addresses = [
            0x0000_0000_0000_0000,
            0x0000_0000_0040_2123,
            0x0000_7FFF_FFFF_FFFF,
            0x0000_1234_5678_9ABC,
            0xFFFF_8000_0000_0000,
            0xFFFF_8040_0020_1FFF,
            0xFFFF_FFFF_FFFF_F000,
        ];

        for address in addresses.map(VirtAddr::new) {
            let rebuilt =
                VirtAddr::from_indices(address.page_table_indices(), address.page_offset());

            assert_eq!(rebuilt, address);
        }
    }

    #[test]
    fn indices_follow_level_shifts() {
        let address = VirtAddr::from_indices([1, 2, 3, 4], 0x56);

        assert_eq!(address.value(), (4 << 39) | (3 << 30) | (2 << 21) | (1 << 12) | 0x56);
        assert_eq!(address.page_table_index(Level::Level4), 4);
        assert_eq!(address.page_table_index(Level::Level1), 1);
    }

    #[test]
    fn high_half_indices_produce_canonical_address() {
        let address = VirtAddr::from_indices([0, 0, 0, 256], 0);

        assert_eq!(address.value(), 0xFFFF_8000_0000_0000);
        assert!(address.is_canonical());
        assert!(!VirtAddr::new(0x0000_8000_0000_0000).is_canonical());
    }

    #[test]
    fn conversions_between_spaces_are_explicit() {
        assert_eq!(Pfn::new(3).identity_virt(), VirtAddr::new(0x3000));
        assert_eq!(Mfn::new(0x12).machine_addr(), MachineAddr::new(0x12000));
        assert_eq!(MachineAddr::new(0x12345).mfn(), Mfn::new(0x12));
        assert_eq!(MachineAddr::new(0x12345).page_offset(), 0x345);
    }

    #[test]
    fn pfn_ceil_rounds_up() {
        assert_eq!(VirtAddr::new(0).pfn_ceil(), Pfn::new(0));
        assert_eq!(VirtAddr::new(1).pfn_ceil(), Pfn::new(1));
        assert_eq!(VirtAddr::new(0x2000).pfn_ceil(), Pfn::new(2));
        assert_eq!(VirtAddr::new(0x2001).pfn_ceil(), Pfn::new(3));
    }

    #[test]
    fn page_align_up_handles_overflow() {
        assert_eq!(
            VirtAddr::new(0x1001).page_align_up(),
            Some(VirtAddr::new(0x2000))
        );
        assert_eq!(
            VirtAddr::new(0x1000).page_align_up(),
            Some(VirtAddr::new(0x1000))
        );
        assert_eq!(VirtAddr::new(u64::MAX).page_align_up(), None);
    }

    #[test]
    fn invalid_pfn_is_recognized() {
        assert!(!Pfn::INVALID.is_valid());
        assert!(Pfn::new(0).is_valid());
    }

    #[test]
    fn pfn_add_steps_frames() {
        assert_eq!(Pfn::new(0x10).add(3), Pfn::new(0x13));
        assert_eq!(Pfn::new(0x10).add(0), Pfn::new(0x10));
    }

    #[test]
    #[should_panic]
    fn pfn_add_overflow_panics() {
        let _ = Pfn::INVALID.add(1);
    }
}
