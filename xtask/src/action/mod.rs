//! Implementations of the [`Action`][action]s.
//!
//! [action]: crate::cli::Action

pub mod build;
pub mod xl_config;

use std::{
    error, fmt, io,
    path::{Path, PathBuf},
    process::Command,
};

/// A `cargo` profile.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum Profile {
    /// The `dev` cargo profile.
    #[default]
    Dev,
    /// The `release` cargo profile.
    Release,
}

impl Profile {
    /// Returns the name `cargo --profile` expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Release => "release",
        }
    }

    /// Returns the directory `cargo` places the artifacts of `target` in when building with this
    /// profile.
    ///
    /// The `dev` profile is the one exception to artifacts landing in a directory named after the
    /// profile.
    pub fn artifact_dir(&self, target: &str) -> PathBuf {
        let profile_dir = match self {
            Self::Dev => "debug",
            Self::Release => self.as_str(),
        };

        Path::new("target").join(target).join(profile_dir)
    }
}

impl clap::ValueEnum for Profile {
    fn value_variants<'a>() -> &'a [Self] {
        static PROFILES: &[Profile] = &[Profile::Dev, Profile::Release];

        PROFILES
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}

/// Runs `cmd` to completion after echoing it.
///
/// # Errors
///
/// Returns [`RunCommandError`] if `cmd` cannot be started or exits unsuccessfully.
pub fn run_cmd(mut cmd: Command) -> Result<(), RunCommandError> {
    println!("Running command: {cmd:?}");

    let program = cmd.get_program().to_string_lossy().into_owned();
    let status = cmd.status().map_err(|error| RunCommandError::Launch {
        program: program.clone(),
        error,
    })?;
    if !status.success() {
        return Err(RunCommandError::Exit {
            program,
            code: status.code(),
        });
    }

    Ok(())
}

/// A command run by an [`Action`][action] did not succeed.
///
/// [action]: crate::cli::Action
#[derive(Debug)]
pub enum RunCommandError {
    /// The program could not be started.
    Launch {
        /// The program that was run.
        program: String,
        /// Why it could not be started.
        error: io::Error,
    },
    /// The program exited unsuccessfully.
    Exit {
        /// The program that was run.
        program: String,
        /// The exit code, absent if the program was killed by a signal.
        code: Option<i32>,
    },
}

impl fmt::Display for RunCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Launch { program, error } => write!(f, "failed to launch `{program}`: {error}"),
            Self::Exit {
                program,
                code: Some(code),
            } => write!(f, "`{program}` exited with status {code}"),
            Self::Exit {
                program,
                code: None,
            } => write!(f, "`{program}` was terminated by a signal"),
        }
    }
}

impl error::Error for RunCommandError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Launch { error, .. } => Some(error),
            Self::Exit { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_artifacts_land_in_debug() {
        assert_eq!(
            Profile::Dev.artifact_dir("x86_64-unknown-none"),
            Path::new("target/x86_64-unknown-none/debug")
        );
        assert_eq!(
            Profile::Release.artifact_dir("x86_64-unknown-none"),
            Path::new("target/x86_64-unknown-none/release")
        );
    }

    #[test]
    fn missing_program_fails_to_launch() {
        let error = run_cmd(Command::new("atman-xtask-missing-program")).unwrap_err();

        match &error {
            RunCommandError::Launch { program, error } => {
                assert_eq!(program, "atman-xtask-missing-program");
                assert_eq!(error.kind(), io::ErrorKind::NotFound);
            }
            RunCommandError::Exit { .. } => panic!("unexpected error: {error}"),
        }
        assert!(error::Error::source(&error).is_some());
    }

    #[test]
    fn exit_status_is_reported() {
        let error = RunCommandError::Exit {
            program: "cargo".into(),
            code: Some(101),
        };
        let killed = RunCommandError::Exit {
            program: "cargo".into(),
            code: None,
        };

        assert_eq!(error.to_string(), "`cargo` exited with status 101");
        assert_eq!(killed.to_string(), "`cargo` was terminated by a signal");
    }
}
