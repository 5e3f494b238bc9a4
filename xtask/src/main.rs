//! Helper crate for building and running `atman`.

use anyhow::Result;
use cli::Action;

pub mod action;
pub mod cli;
pub mod system;

fn main() -> Result<()> {
    match cli::get_action() {
        Action::Build(config) => {
            let path = action::build::build(&config)?;
            println!("Built atman at {}", path.display());
        }
        Action::XlConfig(config) => {
            let path = action::xl_config::xl_config(config)?;
            println!("Wrote domain configuration to {}", path.display());
        }
    }

    Ok(())
}

/// The architectures supported by `atman`.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Arch {
    /// The `x86_64` architecture.
    X86_64,
}

impl Arch {
    /// Returns the textual representation of the [`Arch`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
        }
    }
}

impl clap::ValueEnum for Arch {
    fn value_variants<'a>() -> &'a [Self] {
        static ARCHITECTURES: &[Arch] = &[Arch::X86_64];

        ARCHITECTURES
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}
