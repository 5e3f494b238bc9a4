//! Helper function to build `atman` given a [`BuildConfiguration`].

use std::path::PathBuf;

use anyhow::Result;

use crate::{action::run_cmd, cli::BuildConfiguration};

/// Builds `atman` as specified by `config`, returning the path to the final binary on success.
///
/// # Errors
///
/// Returns errors when the `cargo build` command fails.
pub fn build(config: &BuildConfiguration) -> Result<PathBuf> {
    let mut cmd = std::process::Command::new("cargo");
    cmd.arg("build");

    cmd.arg("--package").arg(config.system.package());

    cmd.args(["--target", config.system.target]);
    cmd.args(["--profile", config.profile.as_str()]);

    if !config.features.is_empty() {
        let features = config.features.join(",");
        cmd.args(["--features", features.as_str()]);
    }

    cmd.args(config.system.additional_build_arguments);

    run_cmd(cmd)?;

    Ok(config
        .profile
        .artifact_dir(config.system.target)
        .join(config.system.package()))
}
