//! The boundary between the guest and the hypervisor.
//!
//! Page table updates go through [`Hypervisor`] so that the memory code can be driven by a test
//! double; the real implementation lives in the architecture crate and traps through the
//! hypercall page.

use core::{error, fmt, ops};

use xen_abi::hypercall::{UVMF_ALL, UVMF_INVLPG, UVMF_LOCAL, UVMF_NONE, UVMF_TLB_FLUSH};

use crate::memory::{VirtAddr, paging::PageTableEntry};

/// Operations the hypervisor performs on behalf of the guest.
pub trait Hypervisor {
    /// Asks the hypervisor to replace the leaf entry mapping `address` with `entry` and returns
    /// the raw hypercall status: `0` on success and a negated errno value on failure.
    ///
    /// # Safety
    ///
    /// No live reference may point into the page currently mapped at `address`, and the new
    /// mapping must not alias memory in a way that breaks the aliasing rules of existing
    /// references.
    unsafe fn update_va_mapping(
        &self,
        address: VirtAddr,
        entry: PageTableEntry,
        flags: UpdateFlags,
    ) -> i64;
}

/// Requests the hypervisor to install `entry` as the leaf entry mapping `address`.
///
/// # Errors
///
/// Returns [`HypercallError`] carrying the hypervisor's status if the update is rejected.
///
/// # Safety
///
/// See [`Hypervisor::update_va_mapping()`].
pub unsafe fn install_mapping<H: Hypervisor + ?Sized>(
    hypervisor: &H,
    address: VirtAddr,
    entry: PageTableEntry,
    flags: UpdateFlags,
) -> Result<(), HypercallError> {
    crate::log_trace!("installing {entry:?} at {address} ({flags:?})");

    // SAFETY:
    //
    // The invariants of this function are the invariants of `update_va_mapping()`.
    let status = unsafe { hypervisor.update_va_mapping(address, entry, flags) };
    if status != 0 {
        return Err(HypercallError(status));
    }

    Ok(())
}

/// TLB maintenance requested alongside a mapping update.
#[derive(Clone, Copy, Default, Hash, PartialEq, Eq)]
pub struct UpdateFlags(u64);

impl UpdateFlags {
    /// Perform no TLB maintenance.
    pub const NONE: Self = Self(UVMF_NONE);
    /// Flush the entire TLB.
    pub const TLB_FLUSH: Self = Self(UVMF_TLB_FLUSH);
    /// Invalidate only the updated address.
    pub const INVLPG: Self = Self(UVMF_INVLPG);
    /// Limit the maintenance to the current CPU.
    pub const LOCAL: Self = Self(UVMF_LOCAL);
    /// Perform the maintenance on every CPU of the domain.
    pub const ALL: Self = Self(UVMF_ALL);

    /// Returns the raw value passed to the hypervisor.
    pub const fn bits(self) -> u64 {
        self.0
    }
}

impl ops::BitOr for UpdateFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for UpdateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operation = match self.0 & 0b11 {
            UVMF_NONE => "NONE",
            UVMF_TLB_FLUSH => "TLB_FLUSH",
            UVMF_INVLPG => "INVLPG",
            _ => "INVALID",
        };
        let scope = if self.0 & UVMF_ALL != 0 { "ALL" } else { "LOCAL" };

        write!(f, "UpdateFlags({operation} | {scope})")
    }
}

/// The hypervisor rejected a hypercall.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct HypercallError(i64);

impl HypercallError {
    /// Creates a [`HypercallError`] from a nonzero hypercall status.
    pub const fn new(status: i64) -> Self {
        Self(status)
    }

    /// Returns the raw status the hypervisor returned.
    pub const fn status(self) -> i64 {
        self.0
    }

    /// Returns the symbolic name of the errno value, if it is one the guest knows about.
    pub const fn name(self) -> Option<&'static str> {
        let name = match self.0.unsigned_abs() {
            1 => "EPERM",
            2 => "ENOENT",
            3 => "ESRCH",
            4 => "EINTR",
            5 => "EIO",
            7 => "E2BIG",
            11 => "EAGAIN",
            12 => "ENOMEM",
            13 => "EACCES",
            14 => "EFAULT",
            16 => "EBUSY",
            17 => "EEXIST",
            19 => "ENODEV",
            22 => "EINVAL",
            28 => "ENOSPC",
            38 => "ENOSYS",
            _ => return None,
        };

        Some(name)
    }
}

impl fmt::Display for HypercallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "hypercall failed with {name} ({})", self.0),
            None => write!(f, "hypercall failed with status {}", self.0),
        }
    }
}

impl error::Error for HypercallError {}

#[cfg(test)]
mod tests {
    use std::format;

    use super::*;

    struct StatusHypervisor(i64);

    impl Hypervisor for StatusHypervisor {
        unsafe fn update_va_mapping(&self, _: VirtAddr, _: PageTableEntry, _: UpdateFlags) -> i64 {
            self.0
        }
    }

    fn install(status: i64) -> Result<(), HypercallError> {
        // SAFETY:
        //
        // `StatusHypervisor` does not touch memory.
        unsafe {
            install_mapping(
                &StatusHypervisor(status),
                VirtAddr::new(0x1000),
                PageTableEntry::EMPTY,
                UpdateFlags::INVLPG,
            )
        }
    }

    #[test]
    fn zero_status_is_success() {
        assert_eq!(install(0), Ok(()));
    }

    #[test]
    fn nonzero_status_is_preserved() {
        assert_eq!(install(-1).unwrap_err().status(), -1);
        assert_eq!(install(-22).unwrap_err(), HypercallError::new(-22));
    }

    #[test]
    fn error_names_known_errno() {
        assert_eq!(
            format!("{}", HypercallError::new(-22)),
            "hypercall failed with EINVAL (-22)"
        );
        assert_eq!(
            format!("{}", HypercallError::new(-9999)),
            "hypercall failed with status -9999"
        );
    }

    #[test]
    fn flags_combine_operation_and_scope() {
        assert_eq!((UpdateFlags::INVLPG | UpdateFlags::ALL).bits(), 6);
        assert_eq!(UpdateFlags::LOCAL.bits(), 0);
        assert_eq!(
            format!("{:?}", UpdateFlags::TLB_FLUSH | UpdateFlags::ALL),
            "UpdateFlags(TLB_FLUSH | ALL)"
        );
    }
}
