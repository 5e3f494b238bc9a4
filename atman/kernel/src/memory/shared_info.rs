//! Access to the hypervisor's shared info page.
//!
//! The page lives in a machine frame owned by the hypervisor. The guest maps it over a page of a
//! statically reserved [`LandingZone`] and afterwards only ever reads it through volatile loads,
//! since the hypervisor rewrites it at any time.

use core::{
    cell::UnsafeCell,
    error, fmt,
    marker::PhantomData,
    mem::{offset_of, size_of},
    ptr::NonNull,
    sync::atomic::{Ordering, fence},
};

use xen_abi::{
    PAGE_SIZE,
    shared_info::{EVTCHN_WORDS, MAX_VIRT_CPUS, NR_EVENT_CHANNELS, SharedInfo, VcpuInfo},
};

use crate::{
    hypercall::{HypercallError, Hypervisor, UpdateFlags, install_mapping},
    memory::{
        MachineAddr, VirtAddr,
        paging::{PageTableEntry, PageTableFlags},
    },
};

const ZONE_SIZE: usize = 2 * PAGE_SIZE as usize;

/// Reserved virtual memory that receives the shared info mapping.
///
/// The zone spans two pages so that it always contains one whole page, whatever alignment the
/// linker gives it.
pub struct LandingZone(UnsafeCell<[u8; ZONE_SIZE]>);

// SAFETY:
//
// The contents of the zone are only accessed through raw pointers by [`SharedInfoMapping`], which
// performs nothing but volatile reads.
unsafe impl Sync for LandingZone {}

impl LandingZone {
    /// Creates a new [`LandingZone`].
    pub const fn new() -> Self {
        Self(UnsafeCell::new([0; ZONE_SIZE]))
    }

    /// Returns the page-aligned address inside the zone at which the shared info page is mapped.
    pub fn page(&self) -> VirtAddr {
        VirtAddr::from_ptr(self.page_ptr().as_ptr())
    }

    fn page_ptr(&self) -> NonNull<u8> {
        let start = NonNull::from(&self.0).cast::<u8>();
        let address = start.addr().get();
        let offset = address.next_multiple_of(PAGE_SIZE as usize) - address;

        // SAFETY:
        //
        // `offset` is smaller than a page and the zone spans two, so the result stays inside the
        // zone.
        unsafe { start.add(offset) }
    }
}

impl Default for LandingZone {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps the shared info page located at `shared_info` into `zone`.
///
/// The hypervisor installs a present, writable, user-accessible translation and invalidates only
/// the remapped address.
///
/// # Errors
///
/// Returns [`MapSharedInfoError`] if the hypervisor rejects the mapping. Nothing is read from the
/// zone in that case.
pub fn map_shared_info<'a, H: Hypervisor + ?Sized>(
    hypervisor: &H,
    shared_info: MachineAddr,
    zone: &'a LandingZone,
) -> Result<SharedInfoMapping<'a>, MapSharedInfoError> {
    let address = zone.page();
    let entry = PageTableEntry::new(
        shared_info.mfn(),
        PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER,
    );

    // SAFETY:
    //
    // The zone is only accessed through raw pointers, so no reference into the remapped page
    // exists.
    unsafe { install_mapping(hypervisor, address, entry, UpdateFlags::INVLPG) }.map_err(
        |error| MapSharedInfoError {
            address: shared_info,
            error,
        },
    )?;

    crate::log_debug!("mapped shared info {shared_info} at {address}");

    Ok(SharedInfoMapping {
        base: zone.page_ptr().cast(),
        machine_addr: shared_info,
        _zone: PhantomData,
    })
}

/// The hypervisor refused to map the shared info page.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct MapSharedInfoError {
    /// Machine address of the page that could not be mapped.
    pub address: MachineAddr,
    /// The status returned by the hypervisor.
    pub error: HypercallError,
}

impl MapSharedInfoError {
    /// Returns the raw status returned by the hypervisor.
    pub fn status(&self) -> i64 {
        self.error.status()
    }
}

impl fmt::Display for MapSharedInfoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to map shared info page at {}: {}",
            self.address, self.error
        )
    }
}

impl error::Error for MapSharedInfoError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Read access to the mapped shared info page.
///
/// Only [`map_shared_info()`] creates a [`SharedInfoMapping`], and only after the hypervisor has
/// acknowledged the mapping.
#[derive(Debug)]
pub struct SharedInfoMapping<'a> {
    base: NonNull<SharedInfo>,
    machine_addr: MachineAddr,
    _zone: PhantomData<&'a LandingZone>,
}

impl SharedInfoMapping<'_> {
    /// Returns the virtual address the page is mapped at.
    pub fn address(&self) -> VirtAddr {
        VirtAddr::from_ptr(self.base.as_ptr())
    }

    /// Returns the machine address of the page.
    pub fn machine_addr(&self) -> MachineAddr {
        self.machine_addr
    }

    /// Returns `true` if an event upcall is pending for `vcpu`.
    pub fn upcall_pending(&self, vcpu: usize) -> bool {
        self.read::<u8>(vcpu_offset(vcpu) + offset_of!(VcpuInfo, evtchn_upcall_pending)) != 0
    }

    /// Returns `true` if event upcalls are masked for `vcpu`.
    pub fn upcall_masked(&self, vcpu: usize) -> bool {
        self.read::<u8>(vcpu_offset(vcpu) + offset_of!(VcpuInfo, evtchn_upcall_mask)) != 0
    }

    /// Returns the selector of pending event channel words for `vcpu`.
    pub fn pending_selector(&self, vcpu: usize) -> u64 {
        self.read(vcpu_offset(vcpu) + offset_of!(VcpuInfo, evtchn_pending_sel))
    }

    /// Returns the faulting address of the last page fault delivered to `vcpu`.
    pub fn cr2(&self, vcpu: usize) -> u64 {
        self.read(vcpu_offset(vcpu) + offset_of!(VcpuInfo, arch.cr2))
    }

    /// Returns a consistent snapshot of the time parameters of `vcpu`.
    pub fn vcpu_time(&self, vcpu: usize) -> VcpuTime {
        let base = vcpu_offset(vcpu);

        self.read_versioned(base + offset_of!(VcpuInfo, time.version), |mapping| {
            VcpuTime {
                tsc_timestamp: mapping.read(base + offset_of!(VcpuInfo, time.tsc_timestamp)),
                system_time: mapping.read(base + offset_of!(VcpuInfo, time.system_time)),
                tsc_to_system_mul: mapping
                    .read(base + offset_of!(VcpuInfo, time.tsc_to_system_mul)),
                tsc_shift: mapping.read(base + offset_of!(VcpuInfo, time.tsc_shift)),
            }
        })
    }

    /// Returns word `index` of the pending event channel bitmap.
    pub fn pending_word(&self, index: usize) -> u64 {
        assert!(index < EVTCHN_WORDS, "event channel word {index} out of range");

        self.read(offset_of!(SharedInfo, evtchn_pending) + index * size_of::<u64>())
    }

    /// Returns word `index` of the masked event channel bitmap.
    pub fn mask_word(&self, index: usize) -> u64 {
        assert!(index < EVTCHN_WORDS, "event channel word {index} out of range");

        self.read(offset_of!(SharedInfo, evtchn_mask) + index * size_of::<u64>())
    }

    /// Returns `true` if an event is pending on `port`.
    pub fn is_pending(&self, port: usize) -> bool {
        assert!(port < NR_EVENT_CHANNELS, "event channel {port} out of range");

        self.pending_word(port / 64) & (1 << (port % 64)) != 0
    }

    /// Returns `true` if `port` is masked.
    pub fn is_masked(&self, port: usize) -> bool {
        assert!(port < NR_EVENT_CHANNELS, "event channel {port} out of range");

        self.mask_word(port / 64) & (1 << (port % 64)) != 0
    }

    /// Returns a consistent snapshot of the wall clock at system time zero.
    pub fn wall_clock(&self) -> WallClock {
        self.read_versioned(offset_of!(SharedInfo, wc_version), |mapping| WallClock {
            seconds: mapping.read(offset_of!(SharedInfo, wc_sec)),
            nanoseconds: mapping.read(offset_of!(SharedInfo, wc_nsec)),
        })
    }

    /// Returns the highest pfn covered by the frame list published to the hypervisor.
    pub fn max_pfn(&self) -> u64 {
        self.read(offset_of!(SharedInfo, arch.max_pfn))
    }

    /// Returns the machine frame of the list of P2M frame lists.
    pub fn pfn_to_mfn_frame_list_list(&self) -> u64 {
        self.read(offset_of!(SharedInfo, arch.pfn_to_mfn_frame_list_list))
    }

    /// Returns the reason of the last NMI delivered to the domain.
    pub fn nmi_reason(&self) -> u64 {
        self.read(offset_of!(SharedInfo, arch.nmi_reason))
    }

    fn read<T: Copy>(&self, offset: usize) -> T {
        debug_assert!(offset + size_of::<T>() <= size_of::<SharedInfo>());

        let field = self.base.as_ptr().wrapping_byte_add(offset).cast::<T>();

        // SAFETY:
        //
        // `field` lies inside the shared info page, which stays mapped while the zone is
        // borrowed, and every offset is derived from the layout of a naturally aligned field.
        unsafe { field.read_volatile() }
    }

    /// Reads a value guarded by the version counter at `version_offset`.
    fn read_versioned<T>(&self, version_offset: usize, read: impl Fn(&Self) -> T) -> T {
        read_consistent(|| self.read::<u32>(version_offset), || read(self))
    }
}

/// Runs `read` until it completes while the counter returned by `version` is even and unchanged.
///
/// The hypervisor makes the counter odd while it updates the guarded fields and bumps it to the
/// next even value once they are consistent again.
fn read_consistent<T>(version: impl Fn() -> u32, read: impl Fn() -> T) -> T {
    loop {
        let before = version();
        fence(Ordering::Acquire);
        let value = read();
        fence(Ordering::Acquire);

        if before % 2 == 0 && version() == before {
            return value;
        }

        core::hint::spin_loop();
    }
}

fn vcpu_offset(vcpu: usize) -> usize {
    assert!(vcpu < MAX_VIRT_CPUS, "vcpu {vcpu} out of range");

    offset_of!(SharedInfo, vcpu_info) + vcpu * size_of::<VcpuInfo>()
}

/// Parameters to extrapolate system time from the time stamp counter.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub struct VcpuTime {
    /// TSC at the time of the last update.
    pub tsc_timestamp: u64,
    /// System time, in nanoseconds, at the time of the last update.
    pub system_time: u64,
    /// 32.32 fixed point multiplier converting TSC ticks to nanoseconds.
    pub tsc_to_system_mul: u32,
    /// Shift applied to the TSC delta before multiplying.
    pub tsc_shift: i8,
}

/// Wall clock time at system time zero.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct WallClock {
    /// Seconds since the Unix epoch.
    pub seconds: u32,
    /// Nanoseconds past `seconds`.
    pub nanoseconds: u32,
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanoseconds)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        boxed::Box,
        cell::{Cell, RefCell},
        format, thread,
        time::Duration,
        vec::Vec,
    };

    use super::*;
    use crate::memory::Mfn;

    /// Accepts or rejects every update with a fixed status and records what it was asked to do.
    struct FakeHypervisor {
        status: i64,
        updates: RefCell<Vec<(VirtAddr, PageTableEntry, UpdateFlags)>>,
    }

    impl FakeHypervisor {
        fn new(status: i64) -> Self {
            Self {
                status,
                updates: RefCell::new(Vec::new()),
            }
        }
    }

    impl Hypervisor for FakeHypervisor {
        unsafe fn update_va_mapping(
            &self,
            address: VirtAddr,
            entry: PageTableEntry,
            flags: UpdateFlags,
        ) -> i64 {
            self.updates.borrow_mut().push((address, entry, flags));
            self.status
        }
    }

    const SHARED_INFO: MachineAddr = MachineAddr::new(0x1234_5000);

    /// Hands out the page as the hypervisor would see it through the shared frame.
    fn publish(zone: &LandingZone, write: impl FnOnce(&mut SharedInfo)) {
        let page = zone.page_ptr().cast::<SharedInfo>();

        // SAFETY:
        //
        // The page lies inside the zone, is suitably aligned, zero is a valid bit pattern for
        // every field, and no mapping exists yet that could read it concurrently.
        write(unsafe { &mut *page.as_ptr() });
    }

    /// Writes `value` over the field at `offset` the way the hypervisor does while a guest may be
    /// reading the page.
    fn store<T>(zone: &LandingZone, offset: usize, value: T) {
        let field = zone.page_ptr().as_ptr().wrapping_add(offset).cast::<T>();

        // SAFETY:
        //
        // `offset` is the offset of a naturally aligned field of the page, which lies inside the
        // zone, and the zone's contents sit in an `UnsafeCell`.
        unsafe { field.write_volatile(value) }
    }

    /// Returns a version counter that yields `versions` one after the other.
    fn sequence(versions: &[u32]) -> impl Fn() -> u32 + '_ {
        let next = Cell::new(0);

        move || {
            let version = versions[next.get()];
            next.set(next.get() + 1);
            version
        }
    }

    /// Returns a read that yields how often it has run.
    fn counting_read(attempts: &Cell<u32>) -> impl Fn() -> u32 + '_ {
        move || {
            attempts.set(attempts.get() + 1);
            attempts.get()
        }
    }

    #[test]
    fn landing_page_is_aligned_inside_zone() {
        let zone = Box::new(LandingZone::new());
        let start = VirtAddr::from_ptr(zone.0.get()).value();
        let page = zone.page().value();

        assert_eq!(page % PAGE_SIZE, 0);
        assert!(page >= start);
        assert!(page + PAGE_SIZE <= start + ZONE_SIZE as u64);
    }

    #[test]
    fn successful_mapping_requests_rw_user_invlpg() {
        let zone = Box::new(LandingZone::new());
        let hypervisor = FakeHypervisor::new(0);

        let mapping = map_shared_info(&hypervisor, SHARED_INFO, &zone).unwrap();

        assert_eq!(mapping.address(), zone.page());
        assert_eq!(mapping.machine_addr(), SHARED_INFO);

        let updates = hypervisor.updates.borrow();
        let (address, entry, flags) = updates[0];
        assert_eq!(updates.len(), 1);
        assert_eq!(address, zone.page());
        assert_eq!(entry.mfn(), Mfn::new(0x12345));
        assert_eq!(entry.raw(), 0x1234_5000 | 0b111);
        assert_eq!(flags, UpdateFlags::INVLPG);
    }

    #[test]
    fn rejected_mapping_surfaces_status() {
        let zone = Box::new(LandingZone::new());
        let hypervisor = FakeHypervisor::new(-1);

        let error = map_shared_info(&hypervisor, SHARED_INFO, &zone).unwrap_err();

        assert_eq!(error.status(), -1);
        assert_eq!(error.address, SHARED_INFO);
        assert_eq!(
            format!("{error}"),
            "failed to map shared info page at 0x12345000: hypercall failed with EPERM (-1)"
        );
    }

    #[test]
    fn accessors_read_published_fields() {
        let zone = Box::new(LandingZone::new());
        publish(&zone, |shared| {
            shared.vcpu_info[1].evtchn_upcall_pending = 1;
            shared.vcpu_info[1].evtchn_pending_sel = 0b101;
            shared.vcpu_info[1].arch.cr2 = 0xDEAD_B000;
            shared.evtchn_pending[2] = 1 << 3;
            shared.evtchn_mask[0] = 1;
            shared.arch.max_pfn = 0x4000;
            shared.arch.pfn_to_mfn_frame_list_list = 0x99;
            shared.arch.nmi_reason = 2;
        });

        let mapping = map_shared_info(&FakeHypervisor::new(0), SHARED_INFO, &zone).unwrap();

        assert!(mapping.upcall_pending(1));
        assert!(!mapping.upcall_pending(0));
        assert!(!mapping.upcall_masked(1));
        assert_eq!(mapping.pending_selector(1), 0b101);
        assert_eq!(mapping.cr2(1), 0xDEAD_B000);
        assert!(mapping.is_pending(2 * 64 + 3));
        assert!(!mapping.is_pending(3));
        assert!(mapping.is_masked(0));
        assert_eq!(mapping.pending_word(2), 1 << 3);
        assert_eq!(mapping.max_pfn(), 0x4000);
        assert_eq!(mapping.pfn_to_mfn_frame_list_list(), 0x99);
        assert_eq!(mapping.nmi_reason(), 2);
    }

    #[test]
    fn versioned_reads_return_stable_snapshot() {
        let zone = Box::new(LandingZone::new());
        publish(&zone, |shared| {
            shared.wc_version = 4;
            shared.wc_sec = 1_700_000_000;
            shared.wc_nsec = 42;
            shared.vcpu_info[0].time.version = 2;
            shared.vcpu_info[0].time.tsc_timestamp = 1000;
            shared.vcpu_info[0].time.system_time = 2000;
            shared.vcpu_info[0].time.tsc_to_system_mul = 3;
            shared.vcpu_info[0].time.tsc_shift = -1;
        });

        let mapping = map_shared_info(&FakeHypervisor::new(0), SHARED_INFO, &zone).unwrap();

        let clock = mapping.wall_clock();
        assert_eq!(
            clock,
            WallClock {
                seconds: 1_700_000_000,
                nanoseconds: 42
            }
        );
        assert_eq!(format!("{clock}"), "1700000000.000000042");
        assert_eq!(
            mapping.vcpu_time(0),
            VcpuTime {
                tsc_timestamp: 1000,
                system_time: 2000,
                tsc_to_system_mul: 3,
                tsc_shift: -1,
            }
        );
    }

    #[test]
    #[should_panic(expected = "vcpu 32 out of range")]
    fn vcpu_beyond_legacy_slots_panics() {
        let zone = Box::new(LandingZone::new());
        let mapping = map_shared_info(&FakeHypervisor::new(0), SHARED_INFO, &zone).unwrap();

        mapping.upcall_pending(MAX_VIRT_CPUS);
    }

    #[test]
    fn stable_version_is_read_once() {
        let attempts = Cell::new(0);

        let value = read_consistent(sequence(&[6, 6]), counting_read(&attempts));

        assert_eq!(value, 1);
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn odd_version_is_retried() {
        let attempts = Cell::new(0);

        // An update is in progress across the first two attempts.
        let value = read_consistent(sequence(&[3, 3, 3, 4, 4, 4]), counting_read(&attempts));

        assert_eq!(value, 3);
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn changed_version_is_retried() {
        let attempts = Cell::new(0);

        // A whole update slips in between the two reads of the counter.
        let value = read_consistent(sequence(&[2, 4, 4, 4]), counting_read(&attempts));

        assert_eq!(value, 2);
        assert_eq!(attempts.get(), 2);
    }

    #[test]
    fn wall_clock_waits_out_update_in_progress() {
        let zone = Box::new(LandingZone::new());
        publish(&zone, |shared| {
            // The seconds are already updated, the nanoseconds are not.
            shared.wc_version = 5;
            shared.wc_sec = 1_700_000_001;
            shared.wc_nsec = 999_999_999;
        });
        let mapping = map_shared_info(&FakeHypervisor::new(0), SHARED_INFO, &zone).unwrap();

        let clock = thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(20));
                store(&zone, offset_of!(SharedInfo, wc_nsec), 5u32);
                fence(Ordering::Release);
                store(&zone, offset_of!(SharedInfo, wc_version), 6u32);
            });

            mapping.wall_clock()
        });

        assert_eq!(
            clock,
            WallClock {
                seconds: 1_700_000_001,
                nanoseconds: 5
            }
        );
    }

    #[test]
    fn vcpu_time_waits_out_update_in_progress() {
        let zone = Box::new(LandingZone::new());
        publish(&zone, |shared| {
            shared.vcpu_info[2].time.version = 7;
            shared.vcpu_info[2].time.tsc_timestamp = 5000;
            shared.vcpu_info[2].time.system_time = 1;
            shared.vcpu_info[2].time.tsc_to_system_mul = 1;
            shared.vcpu_info[2].time.tsc_shift = 0;
        });
        let mapping = map_shared_info(&FakeHypervisor::new(0), SHARED_INFO, &zone).unwrap();
        let base = vcpu_offset(2);

        let time = thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(20));
                store(&zone, base + offset_of!(VcpuInfo, time.system_time), 9000u64);
                store(&zone, base + offset_of!(VcpuInfo, time.tsc_to_system_mul), 0x8000_0000u32);
                store(&zone, base + offset_of!(VcpuInfo, time.tsc_shift), -2i8);
                fence(Ordering::Release);
                store(&zone, base + offset_of!(VcpuInfo, time.version), 8u32);
            });

            mapping.vcpu_time(2)
        });

        assert_eq!(
            time,
            VcpuTime {
                tsc_timestamp: 5000,
                system_time: 9000,
                tsc_to_system_mul: 0x8000_0000,
                tsc_shift: -2,
            }
        );
    }
}
