//! Helpers for writing `xl` domain configurations that boot `atman`.

use std::{fmt::Write, fs, path::PathBuf};

use anyhow::{Context, Result};

use crate::{
    action::build::build,
    cli::{Either, XlConfiguration},
};

/// Writes the domain configuration described by `config`, building `atman` if necessary, and
/// returns the path of the configuration.
///
/// # Errors
///
/// Returns errors when [`build()`] fails or when the configuration cannot be written.
pub fn xl_config(config: XlConfiguration) -> Result<PathBuf> {
    let kernel = match &config.kernel {
        Either::A(path) => path.clone(),
        Either::B(build_config) => build(build_config)?,
    };
    let kernel = fs::canonicalize(&kernel)
        .with_context(|| format!("failed to locate kernel image {}", kernel.display()))?;

    if let Some(folder) = config.output.parent() {
        fs::create_dir_all(folder)?;
    }

    let contents = render(&config, &kernel.display().to_string());
    fs::write(&config.output, contents)
        .with_context(|| format!("failed to write {}", config.output.display()))?;

    Ok(config.output)
}

/// Renders the `xl` configuration for `config` booting the image at `kernel`.
fn render(config: &XlConfiguration, kernel: &str) -> String {
    let mut contents = String::new();

    let _ = writeln!(contents, "name = {:?}", config.name);
    let _ = writeln!(contents, "type = \"pv\"");
    let _ = writeln!(contents, "kernel = {kernel:?}");
    let _ = writeln!(contents, "memory = {}", config.memory);
    let _ = writeln!(contents, "vcpus = 1");
    let _ = writeln!(contents, "on_crash = \"preserve\"");
    if let Some(extra) = &config.extra {
        let _ = writeln!(contents, "extra = {extra:?}");
    }

    contents
}
