//! Machine to pseudo-physical frame translation.

use core::{marker::PhantomData, ptr::NonNull};

use xen_abi::{MACH2PHYS_NR_ENTRIES, MACH2PHYS_VIRT_START};

use crate::memory::{Mfn, Pfn};

/// The hypervisor's machine-to-physical table.
///
/// The table is shared by every domain: an entry yields the pfn its owner recorded for the frame.
/// Entries of frames the guest does not own are unrelated to the guest's memory and must not be
/// used as guest frames; the hypervisor stores [`Pfn::INVALID`] for frames nobody owns.
///
/// Handles are only created at the point of the boot sequence where the table is known to be
/// mapped, and every frame conversion takes one by reference, so a conversion cannot run before
/// the table exists.
#[derive(Clone, Copy, Debug)]
pub struct MachineToPhys<'a> {
    base: NonNull<u64>,
    len: u64,
    _table: PhantomData<&'a [u64]>,
}

impl MachineToPhys<'static> {
    /// Returns the table the hypervisor maps at [`MACH2PHYS_VIRT_START`].
    ///
    /// # Safety
    ///
    /// Must only be called in a PV guest, where the hypervisor keeps the table mapped read-only
    /// for the lifetime of the domain.
    pub unsafe fn hypervisor() -> Self {
        // SAFETY:
        //
        // The invariants of this function require that the table is mapped at the fixed address.
        unsafe { Self::from_raw_parts(MACH2PHYS_VIRT_START as *const u64, MACH2PHYS_NR_ENTRIES) }
    }
}

impl<'a> MachineToPhys<'a> {
    /// Creates a [`MachineToPhys`] table over `entries`.
    pub fn from_slice(entries: &'a [u64]) -> Self {
        Self {
            base: NonNull::from(entries).cast(),
            len: entries.len() as u64,
            _table: PhantomData,
        }
    }

    /// Creates a [`MachineToPhys`] table over the `len` entries at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be non-null, aligned, and every entry below `len` must be readable for `'a`.
    pub unsafe fn from_raw_parts(base: *const u64, len: u64) -> Self {
        // SAFETY:
        //
        // The invariants of this function require that `base` is non-null.
        let base = unsafe { NonNull::new_unchecked(base.cast_mut()) };

        Self {
            base,
            len,
            _table: PhantomData,
        }
    }

    /// Returns the pfn recorded for `mfn`.
    ///
    /// # Panics
    ///
    /// Panics if `mfn` lies beyond the end of the table.
    pub fn get(&self, mfn: Mfn) -> Pfn {
        assert!(
            mfn.value() < self.len,
            "mfn {mfn} beyond the machine-to-physical table"
        );

        let entry = self.base.as_ptr().wrapping_add(mfn.value() as usize);

        // SAFETY:
        //
        // `entry` lies within the table, which is readable for `'a`. The hypervisor may rewrite
        // entries at any time, so the read is volatile.
        Pfn::new(unsafe { entry.read_volatile() })
    }

    /// Returns the number of entries in the table.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_reads_entry_at_mfn() {
        let mut entries = [Pfn::INVALID.value(); 16];
        entries[12] = 2;
        let m2p = MachineToPhys::from_slice(&entries);

        assert_eq!(m2p.get(Mfn::new(12)), Pfn::new(2));
        assert_eq!(Mfn::new(12).to_pfn(&m2p), Pfn::new(2));
    }

    #[test]
    fn unowned_frames_yield_sentinel() {
        let entries = [Pfn::INVALID.value(); 4];
        let m2p = MachineToPhys::from_slice(&entries);

        assert!(!m2p.get(Mfn::new(1)).is_valid());
    }

    #[test]
    #[should_panic(expected = "beyond the machine-to-physical table")]
    fn lookup_beyond_table_panics() {
        let entries = [0; 4];

        MachineToPhys::from_slice(&entries).get(Mfn::new(4));
    }
}
