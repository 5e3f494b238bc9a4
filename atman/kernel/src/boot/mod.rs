//! Bring-up of the guest's memory subsystems.
//!
//! Each stage consumes what the previous one produced: the validated descriptor supplies the
//! shared info address and the frame list, and the frame tables are what make the page tables
//! readable.

pub mod start_info;

use core::{error, fmt};

use xen_abi::start_info::StartInfo;

use crate::{
    boot::start_info::{BootDescriptor, InvalidStartInfo},
    config::BootOptions,
    hypercall::Hypervisor,
    memory::{
        m2p::MachineToPhys,
        p2m::PhysToMachine,
        paging::{PageTableMemory, PageTableWalker},
        shared_info::{LandingZone, MapSharedInfoError, SharedInfoMapping, map_shared_info},
    },
};

/// Everything the boot sequence established about the guest's memory.
#[derive(Debug)]
pub struct Memory<'a> {
    descriptor: BootDescriptor<'a>,
    shared_info: SharedInfoMapping<'a>,
    p2m: PhysToMachine<'a>,
    m2p: MachineToPhys<'a>,
}

impl<'a> Memory<'a> {
    /// Returns the validated start info page.
    pub fn descriptor(&self) -> BootDescriptor<'a> {
        self.descriptor
    }

    /// Returns the mapped shared info page.
    pub fn shared_info(&self) -> &SharedInfoMapping<'a> {
        &self.shared_info
    }

    /// Returns the pseudo-physical to machine frame table.
    pub fn p2m(&self) -> PhysToMachine<'a> {
        self.p2m
    }

    /// Returns the machine to pseudo-physical frame table.
    pub fn m2p(&self) -> MachineToPhys<'a> {
        self.m2p
    }

    /// Returns a walker over the page tables the domain builder created, reading them through
    /// `memory`.
    pub fn page_tables<'m, M: PageTableMemory>(&self, memory: &'m M) -> PageTableWalker<'m, M>
    where
        'a: 'm,
    {
        PageTableWalker::new(self.descriptor.page_table_base(), self.m2p, memory)
    }
}

/// Validates the start info page at `start_info`, applies the boot options, maps the shared info
/// page into `landing_zone` and sets up the frame tables.
///
/// # Errors
///
/// Returns [`InitError`] if the start info page is not recognized or if the hypervisor refuses to
/// map the shared info page.
///
/// # Safety
///
/// `start_info` must point to the start info page handed over at entry, and the frame list it
/// describes must be mapped. `m2p` must describe the hypervisor's machine-to-physical table.
pub unsafe fn init<'a, H: Hypervisor + ?Sized>(
    start_info: *const StartInfo,
    hypervisor: &H,
    landing_zone: &'a LandingZone,
    m2p: MachineToPhys<'a>,
) -> Result<Memory<'a>, InitError> {
    // SAFETY:
    //
    // The invariants of this function guarantee that `start_info` is the start info page, which
    // is never modified after entry.
    let descriptor = unsafe { BootDescriptor::from_ptr(start_info)? };

    BootOptions::parse(descriptor.command_line()).apply();
    crate::log_info!(
        "booting with {} pages, shared info at {}",
        descriptor.nr_pages(),
        descriptor.shared_info()
    );
    descriptor.log_start_info();

    let shared_info = map_shared_info(hypervisor, descriptor.shared_info(), landing_zone)?;

    // SAFETY:
    //
    // The domain builder maps a frame list covering every page of the domain at `mfn_list` and
    // never modifies it behind the guest's back.
    let p2m = unsafe {
        PhysToMachine::from_raw_parts(
            descriptor.frame_list().as_ptr(),
            descriptor.nr_pages() as usize,
        )
    };
    crate::log_info!("frame tables ready: {} pages", p2m.len());

    Ok(Memory {
        descriptor,
        shared_info,
        p2m,
        m2p,
    })
}

/// Errors that abort the boot sequence.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum InitError {
    /// The start info page is not recognized.
    InvalidStartInfo(InvalidStartInfo),
    /// The shared info page could not be mapped.
    MapSharedInfo(MapSharedInfoError),
}

impl From<InvalidStartInfo> for InitError {
    fn from(value: InvalidStartInfo) -> Self {
        Self::InvalidStartInfo(value)
    }
}

impl From<MapSharedInfoError> for InitError {
    fn from(value: MapSharedInfoError) -> Self {
        Self::MapSharedInfo(value)
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidStartInfo(error) => write!(f, "boot failed: {error}"),
            Self::MapSharedInfo(error) => write!(f, "boot failed: {error}"),
        }
    }
}

impl error::Error for InitError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::InvalidStartInfo(error) => Some(error),
            Self::MapSharedInfo(error) => Some(error),
        }
    }
}
