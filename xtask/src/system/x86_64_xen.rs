//! Definition of the `x86_64-xen` `atman` system.

use crate::{Arch, system::AtmanSystem};

/// [`AtmanSystem`] definition for `atman-x86_64-xen`.
pub static X86_64_XEN: &AtmanSystem = &AtmanSystem {
    name: "x86_64-xen",

    arch: Arch::X86_64,
    target: "x86_64-unknown-none",
    features: &[],

    additional_build_arguments: &[],
};
