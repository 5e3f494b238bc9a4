//! Command line parsing and [`Action`] construction.

use clap::{ArgMatches, Command};

pub mod build;
pub mod xl_config;

pub use build::BuildConfiguration;
pub use xl_config::XlConfiguration;

/// Parses `xtask`'s arguments to construct an [`Action`].
#[expect(
    clippy::missing_panics_doc,
    reason = "xtask command parser requires a subcommand"
)]
pub fn get_action() -> Action {
    let matches = command_parser().get_matches();

    let (subcommand_name, subcommand_matches) =
        matches.subcommand().expect("subcommand is required");
    match subcommand_name {
        "build" => Action::Build(build::parse_arguments(None, subcommand_matches)),
        "xl-config" => Action::XlConfig(xl_config::parse_arguments(subcommand_matches)),
        _ => unreachable!("unexpected subcommand: {subcommand_name:?}"),
    }
}

/// Returns the command parser for all [`Action`]s.
fn command_parser() -> Command {
    Command::new("xtask")
        .about("Developer utility for running various tasks on atman")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(build::subcommand_parser())
        .subcommand(xl_config::subcommand_parser())
}

/// The action to carry out.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Action {
    /// Build an `atman` system crate.
    Build(BuildConfiguration),
    /// Write an `xl` domain configuration that boots `atman`.
    XlConfig(XlConfiguration),
}

/// One of two possible values.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Either<A, B> {
    /// The first possibility.
    A(A),
    /// The second possibility.
    B(B),
}

/// Collects the features requested under `{prefix}-features`, exiting with an error if any of them
/// is not in `valid_features`.
fn parse_features(
    prefix: Option<&str>,
    matches: &ArgMatches,
    valid_features: &[&str],
) -> Vec<String> {
    let features_arg_name = if let Some(prefix) = prefix {
        &format!("{prefix}-features")
    } else {
        "features"
    };

    let features = matches
        .get_many::<String>(features_arg_name)
        .into_iter()
        .flatten()
        .flat_map(|features| features.split(','))
        .filter(|feature| !feature.is_empty())
        .map(str::to_owned)
        .collect::<Vec<_>>();

    if let Some(feature) = features
        .iter()
        .find(|feature| !valid_features.contains(&feature.as_str()))
    {
        command_parser()
            .error(
                clap::error::ErrorKind::InvalidValue,
                format!("unknown feature {feature:?}"),
            )
            .exit();
    }

    features
}
