//! Page table entries as seen by a PV guest.
//!
//! Layout of an entry:
//!
//! | Bits  | Meaning                                  |
//! |-------|------------------------------------------|
//! | 63    | no execute                               |
//! | 52    | available to the guest                   |
//! | 12-51 | machine frame number                     |
//! | 9-11  | available to the guest                   |
//! | 8     | global                                   |
//! | 7     | PAT (large pages require a hypercall)    |
//! | 6     | dirty                                    |
//! | 5     | accessed                                 |
//! | 4     | cache disabled                           |
//! | 3     | write through                            |
//! | 2     | user accessible                          |
//! | 1     | writable                                 |
//! | 0     | present                                  |

use core::fmt;

use xen_abi::PAGE_SHIFT;

use crate::memory::{Mfn, Pfn, VirtAddr, m2p::MachineToPhys};

/// Mask of the machine frame field of an entry.
const MFN_MASK: u64 = ((1 << 40) - 1) << PAGE_SHIFT;

/// Flag bits of a [`PageTableEntry`].
#[repr(transparent)]
#[derive(Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageTableFlags(u64);

impl PageTableFlags {
    /// No flags.
    pub const EMPTY: Self = Self(0);
    /// The entry maps something.
    pub const PRESENT: Self = Self(1 << 0);
    /// Writes are allowed.
    pub const WRITABLE: Self = Self(1 << 1);
    /// Accessible from user mode.
    pub const USER: Self = Self(1 << 2);
    /// Write-through caching.
    pub const WRITE_THROUGH: Self = Self(1 << 3);
    /// Caching disabled.
    pub const CACHE_DISABLED: Self = Self(1 << 4);
    /// Set by the processor on access.
    pub const ACCESSED: Self = Self(1 << 5);
    /// Set by the processor on write.
    pub const DIRTY: Self = Self(1 << 6);
    /// Page attribute table selector.
    pub const PAT: Self = Self(1 << 7);
    /// Translation survives address space switches.
    pub const GLOBAL: Self = Self(1 << 8);
    /// First bit available to the guest.
    pub const GUEST_1: Self = Self(1 << 9);
    /// Second bit available to the guest.
    pub const GUEST_2: Self = Self(1 << 10);
    /// Third bit available to the guest.
    pub const GUEST_3: Self = Self(1 << 11);
    /// Fourth bit available to the guest.
    pub const GUEST_4: Self = Self(1 << 52);
    /// Instruction fetches are not allowed.
    pub const NO_EXECUTE: Self = Self(1 << 63);

    /// Flags of an entry mapping an ordinary data page.
    pub const PAGE_FLAGS: Self =
        Self(Self::PRESENT.0 | Self::WRITABLE.0 | Self::USER.0 | Self::ACCESSED.0);
    /// Flags of an entry referencing a page table frame.
    pub const PAGE_TABLE_FLAGS: Self =
        Self(Self::PRESENT.0 | Self::USER.0 | Self::ACCESSED.0 | Self::DIRTY.0);
    /// Marks an entry installed only for the duration of a mapping operation.
    pub const TEMPORARY: Self = Self::GUEST_1;

    /// Every flag bit.
    pub const ALL: Self = Self(!MFN_MASK);

    /// Creates flags from raw bits, discarding any machine frame bits.
    pub const fn from_bits_truncate(bits: u64) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Returns the raw bits.
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Returns `true` if every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for PageTableFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for PageTableFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

impl core::ops::BitAnd for PageTableFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl core::ops::BitAndAssign for PageTableFlags {
    fn bitand_assign(&mut self, rhs: Self) {
        *self = *self & rhs;
    }
}

impl core::ops::Not for PageTableFlags {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self(!self.0 & Self::ALL.0)
    }
}

impl fmt::Debug for PageTableFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageTableFlags({:#x})", self.0)
    }
}

/// A page table entry at any level.
///
/// The frame field always holds a machine frame number. Reaching the pseudo-physical frame, and
/// from it a virtual address, always goes through the [`MachineToPhys`] table.
#[repr(transparent)]
#[derive(Clone, Copy, Default, Hash, PartialEq, Eq)]
pub struct PageTableEntry(u64);

impl PageTableEntry {
    /// An entry that maps nothing.
    pub const EMPTY: Self = Self(0);

    /// Creates an entry referencing `mfn` with `flags`.
    ///
    /// # Panics
    ///
    /// Panics if `mfn` does not fit in the 40-bit frame field.
    pub const fn new(mfn: Mfn, flags: PageTableFlags) -> Self {
        assert!(mfn.value() < 1 << 40, "machine frame number too large");

        Self((mfn.value() << PAGE_SHIFT) | flags.bits())
    }

    /// Creates an entry from its raw representation.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw representation.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns the flag bits of the entry.
    pub const fn flags(self) -> PageTableFlags {
        PageTableFlags::from_bits_truncate(self.0)
    }

    /// Returns `true` if every flag in `flags` is set.
    pub const fn has_flags(self, flags: PageTableFlags) -> bool {
        self.flags().contains(flags)
    }

    /// Returns a copy of the entry with `flags` added.
    pub const fn with_flags(self, flags: PageTableFlags) -> Self {
        Self(self.0 | flags.bits())
    }

    /// Returns `true` if the entry maps something.
    pub const fn is_present(self) -> bool {
        self.has_flags(PageTableFlags::PRESENT)
    }

    /// Returns `true` if writes are allowed.
    pub const fn is_writable(self) -> bool {
        self.has_flags(PageTableFlags::WRITABLE)
    }

    /// Returns `true` if the mapping is accessible from user mode.
    pub const fn is_user(self) -> bool {
        self.has_flags(PageTableFlags::USER)
    }

    /// Returns `true` if caching is write-through.
    pub const fn is_write_through(self) -> bool {
        self.has_flags(PageTableFlags::WRITE_THROUGH)
    }

    /// Returns `true` if caching is disabled.
    pub const fn is_cache_disabled(self) -> bool {
        self.has_flags(PageTableFlags::CACHE_DISABLED)
    }

    /// Returns `true` if the processor recorded an access.
    pub const fn is_accessed(self) -> bool {
        self.has_flags(PageTableFlags::ACCESSED)
    }

    /// Returns `true` if the processor recorded a write.
    pub const fn is_dirty(self) -> bool {
        self.has_flags(PageTableFlags::DIRTY)
    }

    /// Returns `true` if the PAT bit is set.
    pub const fn is_pat(self) -> bool {
        self.has_flags(PageTableFlags::PAT)
    }

    /// Returns `true` if the translation is global.
    pub const fn is_global(self) -> bool {
        self.has_flags(PageTableFlags::GLOBAL)
    }

    /// Returns `true` if instruction fetches are forbidden.
    pub const fn is_no_execute(self) -> bool {
        self.has_flags(PageTableFlags::NO_EXECUTE)
    }

    /// Returns `true` if the entry carries the [`PageTableFlags::TEMPORARY`] marker.
    pub const fn is_temporary(self) -> bool {
        self.has_flags(PageTableFlags::TEMPORARY)
    }

    /// Returns the machine frame referenced by the entry.
    pub const fn mfn(self) -> Mfn {
        Mfn::new((self.0 & MFN_MASK) >> PAGE_SHIFT)
    }

    /// Returns the pseudo-physical frame referenced by the entry.
    pub fn pfn(self, m2p: &MachineToPhys<'_>) -> Pfn {
        self.mfn().to_pfn(m2p)
    }

    /// Returns the virtual address of the referenced frame under the guest's identity-style
    /// mapping of pseudo-physical memory.
    ///
    /// This is only meaningful for frames the guest maps at `pfn << 12`, such as its own page
    /// tables. Translating an arbitrary address requires a walk from the top-level table.
    pub fn identity_virt(self, m2p: &MachineToPhys<'_>) -> VirtAddr {
        self.pfn(m2p).identity_virt()
    }
}

impl fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageTableEntry")
            .field("raw", &format_args!("{:#x}", self.0))
            .field("mfn", &self.mfn())
            .field("nx", &self.is_no_execute())
            .field("g", &self.is_global())
            .field("pat", &self.is_pat())
            .field("d", &self.is_dirty())
            .field("a", &self.is_accessed())
            .field("pcd", &self.is_cache_disabled())
            .field("pwt", &self.is_write_through())
            .field("u", &self.is_user())
            .field("w", &self.is_writable())
            .field("p", &self.is_present())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every individually decodable flag paired with its predicate.
    const PREDICATES: [(PageTableFlags, fn(PageTableEntry) -> bool); 10] = [
        (PageTableFlags::PRESENT, PageTableEntry::is_present),
        (PageTableFlags::WRITABLE, PageTableEntry::is_writable),
        (PageTableFlags::USER, PageTableEntry::is_user),
        (PageTableFlags::WRITE_THROUGH, PageTableEntry::is_write_through),
        (PageTableFlags::CACHE_DISABLED, PageTableEntry::is_cache_disabled),
        (PageTableFlags::ACCESSED, PageTableEntry::is_accessed),
        (PageTableFlags::DIRTY, PageTableEntry::is_dirty),
        (PageTableFlags::PAT, PageTableEntry::is_pat),
        (PageTableFlags::GLOBAL, PageTableEntry::is_global),
        (PageTableFlags::NO_EXECUTE, PageTableEntry::is_no_execute),
    ];

    #[test]
    fn page_flags_group_sets_exactly_four_bits() {
        let entry = PageTableEntry::new(Mfn::new(0xABCDE), PageTableFlags::PAGE_FLAGS);

        assert!(entry.is_present());
        assert!(entry.is_writable());
        assert!(entry.is_user());
        assert!(entry.is_accessed());
        assert!(!entry.is_dirty());
        assert!(!entry.is_write_through());
        assert!(!entry.is_cache_disabled());
        assert!(!entry.is_pat());
        assert!(!entry.is_global());
        assert!(!entry.is_no_execute());
        assert!(!entry.is_temporary());
        assert_eq!(entry.flags().bits(), 0b10_0111);
        assert_eq!(entry.mfn(), Mfn::new(0xABCDE));
    }

    #[test]
    fn page_table_flags_group() {
        let entry = PageTableEntry::new(Mfn::new(7), PageTableFlags::PAGE_TABLE_FLAGS);

        assert_eq!(entry.raw(), 0x7000 | 0b110_0101);
        assert!(!entry.is_writable());
        assert!(entry.is_dirty());
    }

    #[test]
    fn each_flag_decodes_in_isolation() {
        let mfn = Mfn::new((1 << 40) - 1);

        for (flag, predicate) in PREDICATES {
            let entry = PageTableEntry::new(mfn, flag);

            assert_eq!(entry.mfn(), mfn);
            for (other, other_predicate) in PREDICATES {
                assert_eq!(other_predicate(entry), other == flag, "{other:?} for {flag:?}");
            }
        }
    }

    #[test]
    fn flag_combinations_decode_exactly() {
        let mfn = Mfn::new(0x12_3456_789A);

        for combination in 0u32..(1u32 << PREDICATES.len()) {
            let mut flags = PageTableFlags::EMPTY;
            for (bit, (flag, _)) in PREDICATES.iter().enumerate() {
                if combination & (1u32 << bit) != 0 {
                    flags |= *flag;
                }
            }

            let entry = PageTableEntry::new(mfn, flags);
            assert_eq!(entry.mfn(), mfn);
            assert_eq!(entry.flags(), flags);
            for (bit, (_, predicate)) in PREDICATES.iter().enumerate() {
                assert_eq!(predicate(entry), combination & (1u32 << bit) != 0);
            }
        }
    }

    #[test]
    fn guest_bits_do_not_disturb_frame() {
        let flags = PageTableFlags::GUEST_1
            | PageTableFlags::GUEST_2
            | PageTableFlags::GUEST_3
            | PageTableFlags::GUEST_4;
        let entry = PageTableEntry::new(Mfn::new(0xFF_FFFF_FFFF), flags);

        assert_eq!(entry.mfn(), Mfn::new(0xFF_FFFF_FFFF));
        assert_eq!(entry.flags(), flags);
        assert!(entry.is_temporary());
        assert!(!entry.is_present());
    }

    #[test]
    fn frame_field_ignores_flag_bits() {
        let entry = PageTableEntry::from_raw(u64::MAX);

        assert_eq!(entry.mfn(), Mfn::new((1 << 40) - 1));
        assert_eq!(entry.flags(), PageTableFlags::ALL);
    }
}
