//! Logging interface for `atman`.
//!
//! The facade is usable before any other subsystem is initialized: the sink is resolved at link
//! time through the symbol defined by [`unsafe_global_logger!`], so logging needs neither an
//! allocator nor a mapped shared info page.

use core::sync::atomic::{AtomicU8, Ordering};

unsafe extern "Rust" {
    static LOGGER: &'static dyn Log;
}

/// Global control for filtering unnecessary log messages.
static GLOBAL_FILTER: AtomicLevelFilter = AtomicLevelFilter::new(LevelFilter::Info);

/// Defines the global [`Log`] implementation.
///
/// Exactly one crate in the final image must invoke this macro.
#[macro_export]
macro_rules! unsafe_global_logger {
    ($log:expr) => {
        #[unsafe(no_mangle)]
        static LOGGER: &'static dyn $crate::logging::Log = &$log;
    };
}

/// Returns the globally defined [`Log`] implementation.
pub fn logger() -> &'static dyn Log {
    // SAFETY:
    //
    // Every `atman` image is required to define this symbol with [`unsafe_global_logger!`].
    unsafe { LOGGER }
}

/// Returns the currently active global [`LevelFilter`].
pub fn level_filter() -> LevelFilter {
    GLOBAL_FILTER.load(Ordering::Relaxed)
}

/// Sets the currently active [`LevelFilter`] to `filter`.
pub fn set_level_filter(filter: LevelFilter) {
    GLOBAL_FILTER.store(filter, Ordering::Relaxed)
}

/// Sink for log [`Message`]s.
pub trait Log: Sync {
    /// Logs the provided [`Message`].
    fn log(&self, message: &Message);
}

/// A single log record.
pub struct Message<'a> {
    target: &'a str,
    level: Level,
    arguments: core::fmt::Arguments<'a>,
}

impl<'a> Message<'a> {
    /// The module path or explicit target that produced the message.
    pub const fn target(&self) -> &'a str {
        self.target
    }

    /// The [`Level`] of the [`Message`].
    pub const fn level(&self) -> Level {
        self.level
    }

    /// The message and its arguments, ready to be formatted.
    pub const fn args(&self) -> core::fmt::Arguments<'a> {
        self.arguments
    }
}

/// Verbosity of a [`Message`].
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Very low priority, high volume information.
    Trace = 0,
    /// Low priority information.
    Debug = 1,
    /// Boot progress.
    Info = 2,
    /// Potentially problematic occurrences.
    Warn = 3,
    /// Failures that stop the guest.
    Error = 4,
}

impl Level {
    /// Returns the [`LevelFilter`] that lets through this level and everything more severe.
    pub fn to_level_filter(&self) -> LevelFilter {
        AtomicLevelFilter::to_level_filter(*self as u8)
    }

    /// Returns the representation of [`Level`] as a [`str`].
    pub fn as_str(&self) -> &'static str {
        self.to_level_filter().as_str()
    }
}

impl core::fmt::Display for Level {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Minimum [`Level`] a [`Message`] needs to be logged.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum LevelFilter {
    /// Allows every [`Level`].
    Trace = 0,
    /// Allows [`Level::Debug`] and above.
    Debug = 1,
    /// Allows [`Level::Info`] and above.
    Info = 2,
    /// Allows [`Level::Warn`] and above.
    Warn = 3,
    /// Allows only [`Level::Error`].
    Error = 4,
    /// Filters all [`Level`]s.
    Off = 5,
}

impl LevelFilter {
    /// Returns the representation of [`LevelFilter`] as a [`str`].
    pub fn as_str(&self) -> &'static str {
        ["TRACE", "DEBUG", "INFO", "WARN", "ERROR", "OFF"][*self as usize]
    }

    /// Parses a [`LevelFilter`] from its name, ignoring ASCII case.
    pub fn from_name(name: &[u8]) -> Option<Self> {
        [
            Self::Trace,
            Self::Debug,
            Self::Info,
            Self::Warn,
            Self::Error,
            Self::Off,
        ]
        .into_iter()
        .find(|filter| filter.as_str().as_bytes().eq_ignore_ascii_case(name))
    }

    /// Returns whether the given [`Level`] should be logged if this [`LevelFilter`] is active.
    pub fn should_allow(&self, level: Level) -> bool {
        *self != LevelFilter::Off && level as u8 >= *self as u8
    }
}

impl core::fmt::Display for LevelFilter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A [`LevelFilter`] that can be shared and mutated across execution contexts.
pub struct AtomicLevelFilter(AtomicU8);

impl AtomicLevelFilter {
    /// Creates a new [`AtomicLevelFilter`].
    pub const fn new(level_filter: LevelFilter) -> Self {
        Self(AtomicU8::new(level_filter as u8))
    }

    /// Loads the stored [`LevelFilter`].
    pub fn load(&self, order: Ordering) -> LevelFilter {
        Self::to_level_filter(self.0.load(order))
    }

    /// Stores `val`.
    pub fn store(&self, val: LevelFilter, order: Ordering) {
        self.0.store(val as u8, order)
    }

    #[inline(always)]
    fn to_level_filter(val: u8) -> LevelFilter {
        match val {
            0 => LevelFilter::Trace,
            1 => LevelFilter::Debug,
            2 => LevelFilter::Info,
            3 => LevelFilter::Warn,
            4 => LevelFilter::Error,
            5 => LevelFilter::Off,
            _ => unreachable!(),
        }
    }
}

#[doc(hidden)]
pub fn __log_impl(arguments: core::fmt::Arguments, level: Level, target: &str) {
    logger().log(&Message {
        target,
        level,
        arguments,
    })
}

/// Generic logging macro.
#[macro_export]
macro_rules! log {
    (target: $target:expr, $lvl:expr, $($arg:tt)+) => ({
        let lvl = $lvl;
        if $crate::logging::level_filter().should_allow(lvl) {
            $crate::logging::__log_impl(::core::format_args!($($arg)+), lvl, $target)
        }
    });
    ($lvl:expr, $($arg:tt)+) => ($crate::log!(target: ::core::module_path!(), $lvl, $($arg)+));
}

/// Logs the provided message at [`Level::Trace`].
#[macro_export]
macro_rules! log_trace {
    (target: $target:expr, $($arg:tt)+) => ($crate::log!(target: $target, $crate::logging::Level::Trace, $($arg)+));
    ($($arg:tt)+) => ($crate::log!($crate::logging::Level::Trace, $($arg)+));
}

/// Logs the provided message at [`Level::Debug`].
#[macro_export]
macro_rules! log_debug {
    (target: $target:expr, $($arg:tt)+) => ($crate::log!(target: $target, $crate::logging::Level::Debug, $($arg)+));
    ($($arg:tt)+) => ($crate::log!($crate::logging::Level::Debug, $($arg)+));
}

/// Logs the provided message at [`Level::Info`].
#[macro_export]
macro_rules! log_info {
    (target: $target:expr, $($arg:tt)+) => ($crate::log!(target: $target, $crate::logging::Level::Info, $($arg)+));
    ($($arg:tt)+) => ($crate::log!($crate::logging::Level::Info, $($arg)+));
}

/// Logs the provided message at [`Level::Warn`].
#[macro_export]
macro_rules! log_warn {
    (target: $target:expr, $($arg:tt)+) => ($crate::log!(target: $target, $crate::logging::Level::Warn, $($arg)+));
    ($($arg:tt)+) => ($crate::log!($crate::logging::Level::Warn, $($arg)+));
}

/// Logs the provided message at [`Level::Error`].
#[macro_export]
macro_rules! log_error {
    (target: $target:expr, $($arg:tt)+) => ($crate::log!(target: $target, $crate::logging::Level::Error, $($arg)+));
    ($($arg:tt)+) => ($crate::log!($crate::logging::Level::Error, $($arg)+));
}
