//! Options passed to the guest on its command line.

use crate::logging::LevelFilter;

/// Options recognized on the guest command line.
///
/// The command line is a whitespace-separated list of `key=value` words. Unknown keys are ignored
/// so that the same domain configuration can be shared with other guests.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct BootOptions {
    /// Level installed as the global log filter once the options are applied.
    pub log_level: LevelFilter,
}

impl BootOptions {
    /// Parses the options in `command_line`, falling back to the default of every option that is
    /// missing or malformed.
    pub fn parse(command_line: &[u8]) -> Self {
        let mut options = Self::default();

        for word in command_line
            .split(u8::is_ascii_whitespace)
            .filter(|word| !word.is_empty())
        {
            let (key, value) = match word.iter().position(|&byte| byte == b'=') {
                Some(index) => (&word[..index], &word[index + 1..]),
                None => (word, &[][..]),
            };

            match key {
                b"loglevel" => match LevelFilter::from_name(value) {
                    Some(level) => options.log_level = level,
                    None => crate::log_warn!(
                        "ignoring invalid log level \"{}\"",
                        value.escape_ascii()
                    ),
                },
                _ => crate::log_debug!("ignoring unknown option \"{}\"", word.escape_ascii()),
            }
        }

        options
    }

    /// Makes the options take effect.
    pub fn apply(&self) {
        crate::logging::set_level_filter(self.log_level);
    }
}

impl Default for BootOptions {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::Info,
        }
    }
}
