//! Build script for `atman-x86_64-xen`.

use std::{env, path::PathBuf};

fn main() {
    println!("cargo::rerun-if-changed=src");
    println!("cargo::rerun-if-changed=link.ld");
    println!("cargo::rerun-if-changed=Cargo.toml");

    let manifest_dir = PathBuf::from(env::var_os("CARGO_MANIFEST_DIR").unwrap_or_default());
    let linker_script = manifest_dir.join("link.ld");

    println!("cargo::rustc-link-arg-bins=-T{}", linker_script.display());
}
