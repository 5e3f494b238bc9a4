//! Support code for `atman` crates for the `x86_64` architecture.

#![no_std]

mod hypercall;

pub use hypercall::{ShutdownReason, XenHypervisor};
