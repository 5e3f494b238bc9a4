//! Levels of the 4-level `x86_64` page table tree.

use core::fmt;

use xen_abi::PAGE_SHIFT;

/// Number of index bits contributed by each level.
const INDEX_BITS: u32 = 9;
/// Mask of a single level's index.
const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;

/// A level of the page table tree, [`Level::Level1`] being the one that maps pages.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Page table, whose entries map 4 KiB pages.
    Level1 = 0,
    /// Page directory.
    Level2 = 1,
    /// Page directory pointer table.
    Level3 = 2,
    /// Top-level table.
    Level4 = 3,
}

impl Level {
    /// The levels in the order a walk visits them.
    pub const WALK_ORDER: [Self; 4] = [Self::Level4, Self::Level3, Self::Level2, Self::Level1];

    /// Returns the position of this level's index within a virtual address.
    pub const fn shift(self) -> u32 {
        PAGE_SHIFT + self as u32 * INDEX_BITS
    }

    /// Returns the mask of the address bits translated by one entry at this level, which is the
    /// span of the table one level up minus one.
    pub const fn mask(self) -> u64 {
        (1 << (self.shift() + INDEX_BITS)) - 1
    }

    /// Returns the number of bytes mapped by a single entry at this level.
    pub const fn entry_span(self) -> u64 {
        1 << self.shift()
    }

    /// Returns the index selected by `address` in a table at this level.
    pub const fn index_of(self, address: u64) -> usize {
        ((address >> self.shift()) & INDEX_MASK) as usize
    }

    /// Returns the level below this one, or [`None`] for [`Level::Level1`].
    pub const fn lower(self) -> Option<Self> {
        match self {
            Self::Level4 => Some(Self::Level3),
            Self::Level3 => Some(Self::Level2),
            Self::Level2 => Some(Self::Level1),
            Self::Level1 => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", *self as u8 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifts_step_by_nine_bits() {
        assert_eq!(Level::Level1.shift(), 12);
        assert_eq!(Level::Level2.shift(), 21);
        assert_eq!(Level::Level3.shift(), 30);
        assert_eq!(Level::Level4.shift(), 39);
    }

    #[test]
    fn index_uses_nine_bits() {
        for level in Level::WALK_ORDER {
            assert_eq!(level.index_of(0xFFFF_FFFF_FFFF_FFFF), 0x1FF);
        }
        // The highest lower-half address sits in the last slot below the canonical hole.
        assert_eq!(Level::Level4.index_of(0x0000_7FFF_FFFF_FFFF), 0xFF);
        assert_eq!(Level::Level3.index_of(0x0000_7FFF_FFFF_FFFF), 0x1FF);
        assert_eq!(Level::Level2.index_of(3 << 21), 3);
        assert_eq!(Level::Level2.index_of((512 + 3) << 21), 3);
    }

    #[test]
    fn masks_cover_one_table() {
        assert_eq!(Level::Level1.mask(), (1 << 21) - 1);
        assert_eq!(Level::Level4.mask(), (1 << 48) - 1);
        assert_eq!(Level::Level2.entry_span(), 2 * 1024 * 1024);
    }

    #[test]
    fn walk_descends_through_every_level() {
        let mut level = Some(Level::Level4);
        let mut visited = 0;
        while let Some(current) = level {
            assert_eq!(current, Level::WALK_ORDER[visited]);
            visited += 1;
            level = current.lower();
        }

        assert_eq!(visited, 4);
    }
}
