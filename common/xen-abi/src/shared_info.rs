//! Layout of the shared info page.
//!
//! The hypervisor updates this page asynchronously. Guests should only access it through raw
//! pointers and volatile loads; forming references to its fields is unsound.

use core::mem::{offset_of, size_of};

/// Number of [`VcpuInfo`] slots in the legacy shared info page.
pub const MAX_VIRT_CPUS: usize = 32;
/// Number of 64-bit words in each event channel bitmap.
pub const EVTCHN_WORDS: usize = 64;
/// Number of event channels described by the bitmaps.
pub const NR_EVENT_CHANNELS: usize = EVTCHN_WORDS * 64;

/// Hypervisor-owned page shared with the guest.
#[repr(C)]
pub struct SharedInfo {
    /// Per-vCPU state.
    pub vcpu_info: [VcpuInfo; MAX_VIRT_CPUS],
    /// Bitmap of event channels with a pending event.
    pub evtchn_pending: [u64; EVTCHN_WORDS],
    /// Bitmap of event channels that are masked.
    pub evtchn_mask: [u64; EVTCHN_WORDS],
    /// Incremented before and after every update of the wall clock. Odd while an update is in
    /// progress.
    pub wc_version: u32,
    /// Seconds of the wall clock at system time zero.
    pub wc_sec: u32,
    /// Nanoseconds of the wall clock at system time zero.
    pub wc_nsec: u32,
    /// Explicit padding.
    pub _pad0: [u8; 4],
    /// Architecture specific state.
    pub arch: ArchSharedInfo,
}

/// `x86_64` specific part of [`SharedInfo`].
#[repr(C)]
pub struct ArchSharedInfo {
    /// Highest pfn the P2M frame list covers.
    pub max_pfn: u64,
    /// Machine frame of the list of frames holding the list of P2M frames.
    pub pfn_to_mfn_frame_list_list: u64,
    /// Reason of the last NMI delivered to the domain.
    pub nmi_reason: u64,
    /// Reserved.
    pub _pad: [u64; 32],
}

/// Per-vCPU state in [`SharedInfo`].
#[repr(C)]
pub struct VcpuInfo {
    /// Non-zero when an upcall is pending for this vCPU.
    pub evtchn_upcall_pending: u8,
    /// Non-zero when upcalls are masked for this vCPU.
    pub evtchn_upcall_mask: u8,
    /// Explicit padding.
    pub _pad0: [u8; 6],
    /// Selector of the [`SharedInfo::evtchn_pending`] words that have pending events.
    pub evtchn_pending_sel: u64,
    /// Architecture specific state.
    pub arch: ArchVcpuInfo,
    /// Clock information.
    pub time: VcpuTimeInfo,
}

/// `x86_64` specific part of [`VcpuInfo`].
#[repr(C)]
pub struct ArchVcpuInfo {
    /// Faulting address of the last page fault.
    pub cr2: u64,
    /// Explicit padding.
    pub _pad: u64,
}

/// Parameters to extrapolate system time from the time stamp counter.
#[repr(C)]
pub struct VcpuTimeInfo {
    /// Incremented before and after every update. Odd while an update is in progress.
    pub version: u32,
    /// Explicit padding.
    pub _pad0: u32,
    /// TSC at the time of the last update.
    pub tsc_timestamp: u64,
    /// System time, in nanoseconds, at the time of the last update.
    pub system_time: u64,
    /// Multiplier converting TSC ticks to nanoseconds, as a 32.32 fixed point value.
    pub tsc_to_system_mul: u32,
    /// Shift applied to the TSC delta before multiplying.
    pub tsc_shift: i8,
    /// Explicit padding.
    pub _pad1: [u8; 3],
}

const _: () = {
    assert!(size_of::<VcpuTimeInfo>() == 32);
    assert!(size_of::<ArchVcpuInfo>() == 16);
    assert!(offset_of!(VcpuInfo, evtchn_pending_sel) == 8);
    assert!(offset_of!(VcpuInfo, arch) == 16);
    assert!(offset_of!(VcpuInfo, time) == 32);
    assert!(size_of::<VcpuInfo>() == 64);
    assert!(offset_of!(SharedInfo, evtchn_pending) == 2048);
    assert!(offset_of!(SharedInfo, evtchn_mask) == 2560);
    assert!(offset_of!(SharedInfo, wc_version) == 3072);
    assert!(offset_of!(SharedInfo, wc_sec) == 3076);
    assert!(offset_of!(SharedInfo, wc_nsec) == 3080);
    assert!(offset_of!(SharedInfo, arch) == 3088);
    assert!(size_of::<ArchSharedInfo>() == 280);
    assert!(size_of::<SharedInfo>() == 3368);
    assert!(size_of::<SharedInfo>() <= crate::PAGE_SIZE as usize);
};
