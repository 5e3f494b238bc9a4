//! Definitions of the supported `atman` system configurations.

use x86_64_xen::X86_64_XEN;

use crate::Arch;

pub mod x86_64_xen;

/// List of all of the `atman` system crates.
pub static SYSTEMS: &[&AtmanSystem] = &[X86_64_XEN];

/// Returns the [`AtmanSystem`] associated with the given [`Arch`].
pub fn lookup(arch: Arch) -> Option<&'static AtmanSystem> {
    SYSTEMS.iter().copied().find(|system| system.arch == arch)
}

/// The description of an `atman` system crate.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct AtmanSystem {
    /// The name of the `atman` system.
    pub name: &'static str,

    /// The architecture this `atman` system targets.
    pub arch: Arch,
    /// The target string to be passed to `cargo` when building.
    pub target: &'static str,
    /// The valid features for this `atman` system crate.
    pub features: &'static [&'static str],

    /// Additional arguments to pass to `cargo` when building.
    pub additional_build_arguments: &'static [&'static str],
}

impl AtmanSystem {
    /// Returns the name of the system crate's package and binary.
    pub fn package(&self) -> String {
        format!("atman-{}", self.name)
    }
}
