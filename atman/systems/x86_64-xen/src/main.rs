//! `atman` for `x86_64` paravirtualized Xen guests.

#![no_std]
#![no_main]

mod logging;

use core::arch::global_asm;

use atman::{
    boot::{self, InitError},
    log_error, log_info, log_warn,
    memory::{m2p::MachineToPhys, paging::DirectMemory, shared_info::LandingZone},
};
use atman_x86_64::{ShutdownReason, XenHypervisor};
use xen_abi::{hypercall::elfnote, start_info::StartInfo};

/// Receives the shared info page.
static LANDING_ZONE: LandingZone = LandingZone::new();

// Entry point. The domain builder enters with `rsi` pointing to the start info page and no usable
// stack.
global_asm!(
    ".pushsection .bss.stack, \"aw\", @nobits",
    ".balign 16",
    "stack_bottom:",
    ".skip 65536",
    "stack_top:",
    ".popsection",

    ".pushsection .text.entry, \"ax\"",
    ".global _start",
    "_start:",
    "cld",
    "lea rsp, [rip + stack_top]",
    "mov rdi, rsi",
    "call {main}",
    "ud2",
    ".popsection",
    main = sym atman_main,
);

// Notes telling the domain builder how to load the image.
global_asm!(
    ".pushsection .note.Xen, \"a\", @note",

    ".balign 4",
    ".4byte 4, 2f - 1f, {guest_os}",
    ".asciz \"Xen\"",
    ".balign 4",
    "1: .asciz \"Atman\"",
    "2: .balign 4",

    ".4byte 4, 2f - 1f, {guest_version}",
    ".asciz \"Xen\"",
    ".balign 4",
    "1: .asciz \"0.1.0\"",
    "2: .balign 4",

    ".4byte 4, 2f - 1f, {xen_version}",
    ".asciz \"Xen\"",
    ".balign 4",
    "1: .asciz \"xen-3.0\"",
    "2: .balign 4",

    ".4byte 4, 2f - 1f, {loader}",
    ".asciz \"Xen\"",
    ".balign 4",
    "1: .asciz \"generic\"",
    "2: .balign 4",

    ".4byte 4, 2f - 1f, {virt_base}",
    ".asciz \"Xen\"",
    ".balign 4",
    "1: .8byte 0",
    "2: .balign 4",

    ".4byte 4, 2f - 1f, {paddr_offset}",
    ".asciz \"Xen\"",
    ".balign 4",
    "1: .8byte 0",
    "2: .balign 4",

    ".4byte 4, 2f - 1f, {entry}",
    ".asciz \"Xen\"",
    ".balign 4",
    "1: .8byte _start",
    "2: .balign 4",

    ".4byte 4, 2f - 1f, {hypercall_page}",
    ".asciz \"Xen\"",
    ".balign 4",
    "1: .8byte hypercall_page",
    "2: .balign 4",

    ".popsection",
    guest_os = const elfnote::GUEST_OS,
    guest_version = const elfnote::GUEST_VERSION,
    xen_version = const elfnote::XEN_VERSION,
    loader = const elfnote::LOADER,
    virt_base = const elfnote::VIRT_BASE,
    paddr_offset = const elfnote::PADDR_OFFSET,
    entry = const elfnote::ENTRY,
    hypercall_page = const elfnote::HYPERCALL_PAGE,
);

extern "C" fn atman_main(start_info: *const StartInfo) -> ! {
    // SAFETY:
    //
    // The domain builder populates the hypercall page before entering the guest.
    let hypervisor = unsafe { XenHypervisor::new() };

    match run(&hypervisor, start_info) {
        Ok(()) => {
            log_info!("shutting down");
            hypervisor.shutdown(ShutdownReason::Poweroff)
        }
        Err(error) => {
            log_error!("{error}");
            hypervisor.shutdown(ShutdownReason::Crash)
        }
    }
}

fn run(hypervisor: &XenHypervisor, start_info: *const StartInfo) -> Result<(), InitError> {
    // SAFETY:
    //
    // Every PV guest has the machine-to-physical table mapped at its fixed address.
    let m2p = unsafe { MachineToPhys::hypervisor() };

    // SAFETY:
    //
    // `start_info` is the pointer handed over at entry, and the domain builder maps the frame
    // list it describes.
    let memory = unsafe { boot::init(start_info, hypervisor, &LANDING_ZONE, m2p)? };

    let shared_info = memory.shared_info();
    log_info!("wall clock at boot: {}", shared_info.wall_clock());
    log_info!("max_pfn: {:#x}", shared_info.max_pfn());

    // SAFETY:
    //
    // The image is linked at virtual address zero, so the domain builder maps every bootstrap
    // page table frame at `pfn << 12`.
    let tables = unsafe { DirectMemory::new() };
    let walker = memory.page_tables(&tables);
    match walker.translate(shared_info.address()) {
        Ok(machine_addr) if machine_addr == shared_info.machine_addr() => {
            log_info!("{} maps {machine_addr}", shared_info.address())
        }
        Ok(machine_addr) => log_warn!(
            "{} maps {machine_addr} instead of {}",
            shared_info.address(),
            shared_info.machine_addr()
        ),
        Err(miss) => log_warn!("{miss}"),
    }

    Ok(())
}

/// Handles all panics that occur.
#[panic_handler]
fn panic_handler(info: &core::panic::PanicInfo) -> ! {
    log_error!("{info}");

    // SAFETY:
    //
    // Panics can only happen after entry, when the hypercall page is populated.
    let hypervisor = unsafe { XenHypervisor::new() };
    hypervisor.shutdown(ShutdownReason::Crash)
}
