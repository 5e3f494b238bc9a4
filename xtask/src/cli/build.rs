//! Command line parsing and [`Action::Build`][ab] construction.
//!
//! [ab]: crate::cli::Action::Build

use clap::{Arg, ArgAction, ArgMatches, Command, builder::EnumValueParser};

use crate::{
    Arch,
    action::Profile,
    cli::parse_features,
    system::{self, AtmanSystem},
};

/// Description of what `atman` system crate to build and the configuration with which to build it.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct BuildConfiguration {
    /// The [`AtmanSystem`] that should be built.
    pub system: &'static AtmanSystem,

    /// The [`Profile`] with which to build the [`AtmanSystem`].
    pub profile: Profile,
    /// The feature flags that should be enabled when building the [`AtmanSystem`].
    pub features: Vec<String>,
}

/// Parses the arguments required to produce a valid [`BuildConfiguration`].
#[expect(
    clippy::missing_panics_doc,
    reason = "xtask subcommand guarantees that these are present"
)]
pub fn parse_arguments(prefix: Option<&str>, matches: &ArgMatches) -> BuildConfiguration {
    let arch_arg_name = if let Some(prefix) = prefix {
        &format!("{prefix}-arch")
    } else {
        "arch"
    };

    let arch = matches
        .get_one::<Arch>(arch_arg_name)
        .copied()
        .unwrap_or_else(|| panic!("{arch_arg_name} is a required argument"));

    let Some(system) = system::lookup(arch) else {
        crate::cli::command_parser()
            .error(
                clap::error::ErrorKind::InvalidValue,
                format!("no atman system supports {}", arch.as_str()),
            )
            .exit();
    };

    let profile_arg_name = if let Some(prefix) = prefix {
        &format!("{prefix}-profile")
    } else {
        "profile"
    };

    let profile = matches
        .get_one::<Profile>(profile_arg_name)
        .copied()
        .unwrap_or_else(|| panic!("{profile_arg_name} is a required argument"));

    let features = parse_features(prefix, matches, system.features);

    BuildConfiguration {
        system,
        profile,
        features,
    }
}

/// Returns the arguments describing a build.
pub fn build_arguments() -> [Arg; 3] {
    let arch = Arg::new("arch")
        .long("arch")
        .value_parser(EnumValueParser::<Arch>::new())
        .default_value("x86_64");

    let profile = Arg::new("profile")
        .long("profile")
        .value_parser(EnumValueParser::<Profile>::new())
        .default_value("dev");

    let features = Arg::new("features")
        .long("features")
        .action(ArgAction::Append);

    [arch, profile, features]
}

/// Returns the command parser for an [`Action::Build`][ab].
///
/// [ab]: crate::cli::Action::Build
pub fn subcommand_parser() -> Command {
    Command::new("build")
        .about("Builds atman")
        .args(build_arguments())
}
