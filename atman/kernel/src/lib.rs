//! Core of `atman`, a minimal paravirtualized guest for Xen on `x86_64`.
//!
//! This crate owns the guest's view of memory: it validates the start info page, maps the shared
//! info page through the hypervisor, translates between pseudo-physical and machine frames, and
//! walks the page tables the domain builder left behind. Everything that actually traps into the
//! hypervisor is reached through the [`hypercall::Hypervisor`] trait, implemented by an
//! architecture crate.

#![cfg_attr(not(test), no_std)]

pub mod boot;
pub mod config;
pub mod hypercall;
pub mod logging;
pub mod memory;

#[cfg(test)]
unsafe_global_logger!(tests::DiscardLogger);
