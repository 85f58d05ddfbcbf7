//! The eight-tier severity scale and the logging threshold.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DiagError;

/// Diagnostic severity, most severe first.
///
/// The derived `Ord` follows declaration order, so `Emergency` compares
/// *less than* `Debug`. Use [`Severity::at_least`] instead of raw
/// comparisons when asking "is this at least as severe as X".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// System is unusable
    Emergency,
    /// Action must be taken immediately
    Alert,
    /// Critical conditions
    Critical,
    /// Runtime errors that do not require immediate action
    Error,
    /// Exceptional occurrences that are not errors
    Warning,
    /// Normal but significant events
    Notice,
    /// Interesting events
    Info,
    /// Detailed debug information
    Debug,
}

impl Severity {
    /// All severities, most severe first.
    pub const ALL: [Severity; 8] = [
        Severity::Emergency,
        Severity::Alert,
        Severity::Critical,
        Severity::Error,
        Severity::Warning,
        Severity::Notice,
        Severity::Info,
        Severity::Debug,
    ];

    /// Lowercase name as used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Emergency => "emergency",
            Severity::Alert => "alert",
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Notice => "notice",
            Severity::Info => "info",
            Severity::Debug => "debug",
        }
    }

    /// Uppercase token as written on disk (`ERROR`, `DEBUG`, ...).
    pub fn token(&self) -> &'static str {
        match self {
            Severity::Emergency => "EMERGENCY",
            Severity::Alert => "ALERT",
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Notice => "NOTICE",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        }
    }

    /// True when `self` is at least as severe as `other`.
    pub fn at_least(&self, other: Severity) -> bool {
        *self <= other
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = DiagError;

    /// Accepts either case, so both config tokens and on-disk tokens parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "emergency" => Ok(Severity::Emergency),
            "alert" => Ok(Severity::Alert),
            "critical" => Ok(Severity::Critical),
            "error" => Ok(Severity::Error),
            "warning" => Ok(Severity::Warning),
            "notice" => Ok(Severity::Notice),
            "info" => Ok(Severity::Info),
            "debug" => Ok(Severity::Debug),
            _ => Err(DiagError::InvalidSeverity(s.to_string())),
        }
    }
}

/// Configured minimum severity, or logging disabled altogether.
///
/// `None` means no event is delivered. Any other threshold delivers every
/// severity; its remaining role is the backtrace rule in the delivery
/// facade, where a `Debug` threshold forces backtraces onto all events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Threshold {
    None,
    Minimum(Severity),
}

impl Threshold {
    /// Logging is enabled at all.
    pub fn enabled(&self) -> bool {
        !matches!(self, Threshold::None)
    }

    /// The most verbose tier is configured, which turns backtrace capture
    /// on for every event.
    pub fn is_most_verbose(&self) -> bool {
        matches!(self, Threshold::Minimum(Severity::Debug))
    }
}

impl FromStr for Threshold {
    type Err = DiagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("none") {
            Ok(Threshold::None)
        } else {
            Ok(Threshold::Minimum(s.parse()?))
        }
    }
}
