//! Layout of the start info page handed to a PV guest at entry.

use core::mem::{offset_of, size_of};

/// Expected contents of [`StartInfo::magic`] up to the first NUL byte.
pub const START_INFO_MAGIC: &[u8] = b"xen-3.0-x86_64";

/// Length, in bytes, of the command line buffer in [`StartInfo`].
pub const MAX_GUEST_CMDLINE: usize = 1024;

/// Start-of-day information written by the hypervisor before the guest's first instruction.
///
/// The page is owned by the hypervisor's domain builder. It is written once before entry and never
/// modified afterwards, so shared references into it are sound for the lifetime of the domain.
#[repr(C)]
pub struct StartInfo {
    /// `"xen-<version>-<platform>"`, NUL padded.
    pub magic: [u8; 32],
    /// Total pages allocated to this domain.
    pub nr_pages: u64,
    /// Machine address of the shared info page.
    pub shared_info: u64,
    /// [`StartInfoFlags`] bits.
    pub flags: u32,
    /// Explicit padding.
    pub _pad0: [u8; 4],
    /// The xenstore ring.
    pub store: ChannelInfo,
    /// The console ring.
    pub console: ChannelInfo,
    /// Virtual address of the top-level page table.
    pub pt_base: u64,
    /// Number of bootstrap page table frames.
    pub nr_pt_frames: u64,
    /// Virtual address of the pseudo-physical to machine frame list.
    pub mfn_list: u64,
    /// Virtual address of the pre-loaded module, or its first pfn if
    /// [`StartInfoFlags::MOD_START_PFN`] is set.
    pub mod_start: u64,
    /// Size, in bytes, of the pre-loaded module.
    pub mod_len: u64,
    /// Guest command line, NUL terminated.
    pub cmd_line: [u8; MAX_GUEST_CMDLINE],
    /// First pfn forming the initial P->M table.
    pub first_p2m_pfn: u64,
    /// Number of pfns forming the initial P->M table.
    pub nr_p2m_frames: u64,
}

/// A machine frame and event channel pair describing a shared ring.
#[repr(C)]
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Machine frame number of the ring page.
    pub mfn: u64,
    /// Event channel bound to the ring.
    pub evtchn: u32,
    /// Explicit padding.
    pub _pad: [u8; 4],
}

/// Flags found in [`StartInfo::flags`].
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct StartInfoFlags(pub u32);

impl StartInfoFlags {
    /// The domain is privileged.
    pub const PRIVILEGED: Self = Self(1 << 0);
    /// The domain is the initial control domain.
    pub const INITDOMAIN: Self = Self(1 << 1);
    /// The pre-loaded module is a multiboot module list.
    pub const MULTIBOOT_MOD: Self = Self(1 << 2);
    /// [`StartInfo::mod_start`] is a pfn rather than a virtual address.
    pub const MOD_START_PFN: Self = Self(1 << 3);

    /// Returns `true` if every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for StartInfoFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitAnd for StartInfoFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

const _: () = {
    assert!(size_of::<ChannelInfo>() == 16);
    assert!(offset_of!(StartInfo, nr_pages) == 32);
    assert!(offset_of!(StartInfo, shared_info) == 40);
    assert!(offset_of!(StartInfo, flags) == 48);
    assert!(offset_of!(StartInfo, store) == 56);
    assert!(offset_of!(StartInfo, console) == 72);
    assert!(offset_of!(StartInfo, pt_base) == 88);
    assert!(offset_of!(StartInfo, nr_pt_frames) == 96);
    assert!(offset_of!(StartInfo, mfn_list) == 104);
    assert!(offset_of!(StartInfo, mod_start) == 112);
    assert!(offset_of!(StartInfo, mod_len) == 120);
    assert!(offset_of!(StartInfo, cmd_line) == 128);
    assert!(offset_of!(StartInfo, first_p2m_pfn) == 1152);
    assert!(offset_of!(StartInfo, nr_p2m_frames) == 1160);
    assert!(size_of::<StartInfo>() == 1168);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_contain_their_components() {
        let flags = StartInfoFlags::PRIVILEGED | StartInfoFlags::INITDOMAIN;

        assert!(flags.contains(StartInfoFlags::PRIVILEGED));
        assert!(flags.contains(StartInfoFlags::INITDOMAIN));
        assert!(!flags.contains(StartInfoFlags::MOD_START_PFN));
        assert_eq!(flags & StartInfoFlags::INITDOMAIN, StartInfoFlags::INITDOMAIN);
    }

    #[test]
    fn magic_fits_in_field() {
        assert!(START_INFO_MAGIC.len() < 32);
    }
}
