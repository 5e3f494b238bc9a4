//! Command line parsing and [`Action::XlConfig`][axc] construction.
//!
//! [axc]: crate::cli::Action::XlConfig

use std::path::PathBuf;

use clap::{Arg, ArgMatches, Command};

use crate::cli::{BuildConfiguration, Either, build};

/// Description of the `xl` domain configuration to write.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct XlConfiguration {
    /// Either the path to a pre-built `atman` image or a build configuration for one.
    pub kernel: Either<PathBuf, BuildConfiguration>,
    /// The name of the domain.
    pub name: String,
    /// The memory of the domain, in MiB.
    pub memory: u64,
    /// The command line passed to the guest.
    pub extra: Option<String>,
    /// The path at which to place the configuration.
    pub output: PathBuf,
}

/// Parses the arguments of the `xl-config` subcommand.
#[expect(
    clippy::missing_panics_doc,
    reason = "xtask subcommand guarantees that these are present"
)]
pub fn parse_arguments(matches: &ArgMatches) -> XlConfiguration {
    let kernel = match matches.get_one::<PathBuf>("kernel").cloned() {
        Some(path) => Either::A(path),
        None => Either::B(build::parse_arguments(None, matches)),
    };

    let name = matches
        .get_one::<String>("name")
        .cloned()
        .expect("name has a default value");

    let memory = matches
        .get_one::<u64>("memory")
        .copied()
        .expect("memory has a default value");

    let extra = matches.get_one::<String>("extra").cloned();

    let output = matches
        .get_one::<PathBuf>("output")
        .cloned()
        .expect("output has a default value");

    XlConfiguration {
        kernel,
        name,
        memory,
        extra,
        output,
    }
}

/// Returns the command parser for an [`Action::XlConfig`][axc].
///
/// [axc]: crate::cli::Action::XlConfig
pub fn subcommand_parser() -> Command {
    let kernel = Arg::new("kernel")
        .long("kernel")
        .value_parser(clap::value_parser!(PathBuf))
        .conflicts_with_all(["arch", "profile", "features"]);

    let name = Arg::new("name").long("name").default_value("atman");

    let memory = Arg::new("memory")
        .long("memory")
        .help("Memory of the domain, in MiB")
        .value_parser(clap::value_parser!(u64).range(1..))
        .default_value("32");

    let extra = Arg::new("extra")
        .long("extra")
        .help("Command line passed to atman, such as \"loglevel=debug\"");

    let output = Arg::new("output")
        .long("output")
        .value_parser(clap::value_parser!(PathBuf))
        .default_value("target/atman.cfg");

    Command::new("xl-config")
        .about("Writes an xl domain configuration that boots atman, building it if necessary")
        .arg(kernel)
        .args(build::build_arguments())
        .arg(name)
        .arg(memory)
        .arg(extra)
        .arg(output)
}
