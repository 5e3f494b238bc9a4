//! Pseudo-physical to machine frame translation.

use core::slice;

use crate::memory::{Mfn, Pfn};

/// The guest's pseudo-physical to machine frame table.
///
/// Entry `n` holds the machine frame backing pseudo-physical frame `n`. The domain builder
/// populates the list before entry and covers every frame the guest owns.
#[derive(Clone, Copy, Debug)]
pub struct PhysToMachine<'a> {
    frames: &'a [Mfn],
}

impl<'a> PhysToMachine<'a> {
    /// Creates a [`PhysToMachine`] table over `frames`.
    pub const fn new(frames: &'a [Mfn]) -> Self {
        Self { frames }
    }

    /// Creates a [`PhysToMachine`] table over the `nr_pages` frame numbers at `list`.
    ///
    /// # Safety
    ///
    /// `list` must be aligned and point to `nr_pages` machine frame numbers that remain readable
    /// and unmodified for `'a`.
    pub unsafe fn from_raw_parts(list: *const Mfn, nr_pages: usize) -> Self {
        // SAFETY:
        //
        // The invariants of this function require that `list` is valid for `nr_pages` reads for
        // the lifetime `'a`.
        let frames = unsafe { slice::from_raw_parts(list, nr_pages) };

        Self { frames }
    }

    /// Returns the machine frame backing `pfn`.
    ///
    /// # Panics
    ///
    /// Panics if `pfn` is not owned by the guest. Every frame the guest accounts for is covered by
    /// the table, so this is an invariant violation rather than a recoverable condition.
    pub fn get(&self, pfn: Pfn) -> Mfn {
        let index = usize::try_from(pfn.value()).ok();
        match index.and_then(|index| self.frames.get(index)) {
            Some(mfn) => *mfn,
            None => panic!(
                "pfn {pfn} outside of the guest's {} frames",
                self.frames.len()
            ),
        }
    }

    /// Returns `true` if `pfn` is owned by the guest.
    pub fn contains(&self, pfn: Pfn) -> bool {
        pfn.value() < self.frames.len() as u64
    }

    /// Returns the number of frames in the table.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if the table covers no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Returns an iterator over `(pfn, mfn)` pairs in ascending pfn order.
    pub fn iter(&self) -> impl Iterator<Item = (Pfn, Mfn)> + 'a {
        self.frames
            .iter()
            .enumerate()
            .map(|(index, mfn)| (Pfn::new(index as u64), *mfn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::m2p::MachineToPhys;

    const FRAMES: [Mfn; 4] = [Mfn::new(10), Mfn::new(11), Mfn::new(12), Mfn::new(13)];

    #[test]
    fn lookup_is_indexed_by_pfn() {
        let p2m = PhysToMachine::new(&FRAMES);

        assert_eq!(p2m.get(Pfn::new(2)), Mfn::new(12));
        assert_eq!(Pfn::new(0).to_mfn(&p2m), Mfn::new(10));
        assert_eq!(p2m.len(), 4);
    }

    #[test]
    fn m2p_inverts_p2m() {
        let p2m = PhysToMachine::new(&FRAMES);
        let mut entries = [Pfn::INVALID.value(); 16];
        for (pfn, mfn) in p2m.iter() {
            entries[mfn.value() as usize] = pfn.value();
        }
        let m2p = MachineToPhys::from_slice(&entries);

        for (pfn, _) in p2m.iter() {
            assert_eq!(pfn.to_mfn(&p2m).to_pfn(&m2p), pfn);
        }
        assert_eq!(m2p.get(Mfn::new(12)), Pfn::new(2));
    }

    #[test]
    fn contains_matches_page_count() {
        let p2m = PhysToMachine::new(&FRAMES);

        assert!(p2m.contains(Pfn::new(3)));
        assert!(!p2m.contains(Pfn::new(4)));
    }

    #[test]
    #[should_panic(expected = "outside of the guest's 4 frames")]
    fn out_of_range_lookup_panics() {
        PhysToMachine::new(&FRAMES).get(Pfn::new(4));
    }

    #[test]
    fn raw_parts_view_the_same_frames() {
        // SAFETY:
        //
        // `FRAMES` is a constant with four elements.
        let p2m = unsafe { PhysToMachine::from_raw_parts(FRAMES.as_ptr(), FRAMES.len()) };

        assert_eq!(p2m.get(Pfn::new(3)), Mfn::new(13));
    }
}
