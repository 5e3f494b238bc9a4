//! Validated view of the start info page.

use core::{error, fmt};

use xen_abi::start_info::{ChannelInfo, START_INFO_MAGIC, StartInfo, StartInfoFlags};

use crate::memory::{MachineAddr, Mfn, Pfn, VirtAddr};

/// Read-only view of the [`StartInfo`] page the hypervisor hands to the guest at entry.
///
/// The view aliases hypervisor-written memory instead of copying it. This is sound because the
/// domain builder writes the page once before the guest's first instruction and nobody modifies it
/// afterwards.
#[derive(Clone, Copy)]
pub struct BootDescriptor<'a> {
    raw: &'a StartInfo,
}

impl<'a> BootDescriptor<'a> {
    /// Validates `raw` and wraps it in a [`BootDescriptor`].
    ///
    /// # Errors
    ///
    /// Returns [`InvalidStartInfo`] if the magic does not identify an `x86_64` PV start info page.
    pub fn new(raw: &'a StartInfo) -> Result<Self, InvalidStartInfo> {
        if trim_nul(&raw.magic) != START_INFO_MAGIC {
            return Err(InvalidStartInfo { magic: raw.magic });
        }

        Ok(Self { raw })
    }

    /// Validates the [`StartInfo`] page at `ptr` and wraps it in a [`BootDescriptor`].
    ///
    /// # Errors
    ///
    /// Returns [`InvalidStartInfo`] if the magic does not identify an `x86_64` PV start info page.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a readable, aligned [`StartInfo`] that is not modified for `'a`.
    pub unsafe fn from_ptr(ptr: *const StartInfo) -> Result<Self, InvalidStartInfo> {
        // SAFETY:
        //
        // The invariants of this function guarantee that `ptr` is valid for shared access for
        // `'a`.
        let raw = unsafe { &*ptr };

        Self::new(raw)
    }

    /// Returns the magic string up to its first NUL byte.
    pub fn magic(&self) -> &'a [u8] {
        trim_nul(&self.raw.magic)
    }

    /// Returns the total number of pages allocated to the domain.
    pub fn nr_pages(&self) -> u64 {
        self.raw.nr_pages
    }

    /// Returns the machine address of the shared info page.
    pub fn shared_info(&self) -> MachineAddr {
        MachineAddr::new(self.raw.shared_info)
    }

    /// Returns the flags describing the domain.
    pub fn flags(&self) -> StartInfoFlags {
        StartInfoFlags(self.raw.flags)
    }

    /// Returns the xenstore ring.
    pub fn store(&self) -> Channel {
        Channel::from(self.raw.store)
    }

    /// Returns the console ring.
    pub fn console(&self) -> Channel {
        Channel::from(self.raw.console)
    }

    /// Returns the virtual address of the top-level page table.
    pub fn page_table_base(&self) -> VirtAddr {
        VirtAddr::new(self.raw.pt_base)
    }

    /// Returns the number of frames holding the bootstrap page tables.
    pub fn nr_page_table_frames(&self) -> u64 {
        self.raw.nr_pt_frames
    }

    /// Returns the virtual address of the pseudo-physical to machine frame list.
    pub fn frame_list(&self) -> VirtAddr {
        VirtAddr::new(self.raw.mfn_list)
    }

    /// Returns the pre-loaded module, if the domain builder loaded one.
    pub fn module(&self) -> Option<Module> {
        if self.raw.mod_len == 0 {
            return None;
        }

        let location = if self.flags().contains(StartInfoFlags::MOD_START_PFN) {
            ModuleLocation::Frame(Pfn::new(self.raw.mod_start))
        } else {
            ModuleLocation::Virtual(VirtAddr::new(self.raw.mod_start))
        };

        Some(Module {
            location,
            len: self.raw.mod_len,
        })
    }

    /// Returns the command line up to its first NUL byte.
    pub fn command_line(&self) -> &'a [u8] {
        trim_nul(&self.raw.cmd_line)
    }

    /// Returns the command line as a [`str`], if it is valid UTF-8.
    pub fn command_line_str(&self) -> Option<&'a str> {
        core::str::from_utf8(self.command_line()).ok()
    }

    /// Returns the first pfn of the initial P2M table.
    pub fn first_p2m_pfn(&self) -> Pfn {
        Pfn::new(self.raw.first_p2m_pfn)
    }

    /// Returns the number of frames forming the initial P2M table.
    pub fn nr_p2m_frames(&self) -> u64 {
        self.raw.nr_p2m_frames
    }

    /// Returns the raw [`StartInfo`].
    pub fn raw(&self) -> &'a StartInfo {
        self.raw
    }

    /// Logs every field of the descriptor.
    pub fn log_start_info(&self) {
        crate::log_debug!("magic: \"{}\"", self.magic().escape_ascii());
        crate::log_debug!("nr_pages: {}", self.nr_pages());
        crate::log_debug!("shared_info: {}", self.shared_info());
        crate::log_debug!("flags: {:#x}", self.flags().0);
        crate::log_debug!("store: {}", self.store());
        crate::log_debug!("console: {}", self.console());
        crate::log_debug!("pt_base: {}", self.page_table_base());
        crate::log_debug!("nr_pt_frames: {}", self.nr_page_table_frames());
        crate::log_debug!("mfn_list: {}", self.frame_list());
        match self.module() {
            Some(module) => crate::log_debug!("module: {module}"),
            None => crate::log_debug!("module: none"),
        }
        crate::log_debug!("cmd_line: \"{}\"", self.command_line().escape_ascii());
        crate::log_debug!("first_p2m_pfn: {}", self.first_p2m_pfn());
        crate::log_debug!("nr_p2m_frames: {}", self.nr_p2m_frames());
    }
}

impl fmt::Debug for BootDescriptor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootDescriptor")
            .field("nr_pages", &self.nr_pages())
            .field("shared_info", &self.shared_info())
            .field("flags", &self.flags())
            .field("store", &self.store())
            .field("console", &self.console())
            .field("page_table_base", &self.page_table_base())
            .field("nr_page_table_frames", &self.nr_page_table_frames())
            .field("frame_list", &self.frame_list())
            .field("module", &self.module())
            .field(
                "command_line",
                &format_args!("\"{}\"", self.command_line().escape_ascii()),
            )
            .field("first_p2m_pfn", &self.first_p2m_pfn())
            .field("nr_p2m_frames", &self.nr_p2m_frames())
            .finish()
    }
}

/// A shared ring and the event channel that signals it.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Channel {
    /// Machine frame of the ring page.
    pub mfn: Mfn,
    /// Event channel bound to the ring.
    pub event_channel: u32,
}

impl From<ChannelInfo> for Channel {
    fn from(info: ChannelInfo) -> Self {
        Self {
            mfn: Mfn::new(info.mfn),
            event_channel: info.evtchn,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mfn {} evtchn {}", self.mfn, self.event_channel)
    }
}

/// The module the domain builder loaded alongside the kernel.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Module {
    /// Where the module starts.
    pub location: ModuleLocation,
    /// Size of the module in bytes.
    pub len: u64,
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            ModuleLocation::Virtual(address) => write!(f, "{} bytes at {address}", self.len),
            ModuleLocation::Frame(pfn) => write!(f, "{} bytes at pfn {pfn}", self.len),
        }
    }
}

/// How [`Module`] is located.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ModuleLocation {
    /// The module is mapped at this virtual address.
    Virtual(VirtAddr),
    /// The module starts at this pseudo-physical frame and is not necessarily mapped.
    Frame(Pfn),
}

/// The start info page does not carry the `x86_64` PV magic.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct InvalidStartInfo {
    /// The magic found in the page.
    pub magic: [u8; 32],
}

impl fmt::Display for InvalidStartInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid start info magic \"{}\", expected \"{}\"",
            trim_nul(&self.magic).escape_ascii(),
            START_INFO_MAGIC.escape_ascii()
        )
    }
}

impl error::Error for InvalidStartInfo {}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&byte| byte == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}
