//! Severity levels for log entries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The severity of a log entry.
///
/// Levels are spaced ten apart so that intermediate custom levels can be
/// expressed numerically without colliding with the named ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// No severity has been assigned.
    #[default]
    Default,
    /// Fine-grained debugging information.
    Trace,
    /// Debugging information.
    Debug,
    /// Routine information.
    Info,
    /// Normal but significant events.
    Notice,
    /// Something unexpected that does not impair operation.
    #[serde(alias = "warn")]
    Warning,
    /// An error occurred.
    #[serde(alias = "err")]
    Error,
    /// A critical error occurred.
    #[serde(alias = "crit")]
    Critical,
    /// Action must be taken immediately.
    Alert,
    /// The system is unusable.
    Emergency,
    /// Several systems are unusable.
    Catastrophe,
}

impl Severity {
    /// The numeric level of this severity.
    #[must_use]
    pub fn value(self) -> u8 {
        match self {
            Severity::Default => 0,
            Severity::Trace => 10,
            Severity::Debug => 20,
            Severity::Info => 30,
            Severity::Notice => 40,
            Severity::Warning => 50,
            Severity::Error => 60,
            Severity::Critical => 70,
            Severity::Alert => 80,
            Severity::Emergency => 90,
            Severity::Catastrophe => 100,
        }
    }

    /// The severity for an exact numeric level, if one is named.
    #[must_use]
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(Severity::Default),
            10 => Some(Severity::Trace),
            20 => Some(Severity::Debug),
            30 => Some(Severity::Info),
            40 => Some(Severity::Notice),
            50 => Some(Severity::Warning),
            60 => Some(Severity::Error),
            70 => Some(Severity::Critical),
            80 => Some(Severity::Alert),
            90 => Some(Severity::Emergency),
            100 => Some(Severity::Catastrophe),
            _ => None,
        }
    }

    /// The canonical lowercase name of this severity.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Default => "default",
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Notice => "notice",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
            Severity::Alert => "alert",
            Severity::Emergency => "emergency",
            Severity::Catastrophe => "catastrophe",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = UnknownSeverity;

    /// Parse a severity name, case-insensitively. Accepts the aliases
    /// `warn`, `err`, and `crit`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Severity::Default),
            "trace" => Ok(Severity::Trace),
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "notice" => Ok(Severity::Notice),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" | "err" => Ok(Severity::Error),
            "critical" | "crit" => Ok(Severity::Critical),
            "alert" => Ok(Severity::Alert),
            "emergency" => Ok(Severity::Emergency),
            "catastrophe" => Ok(Severity::Catastrophe),
            _ => Err(UnknownSeverity(s.to_string())),
        }
    }
}

/// The string did not name a severity.
#[derive(Debug, thiserror::Error)]
#[error("unknown severity: {0}")]
pub struct UnknownSeverity(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_levels() {
        assert!(Severity::Trace < Severity::Debug);
        assert!(Severity::Error < Severity::Catastrophe);
        assert_eq!(Severity::Warning.value(), 50);
    }

    #[test]
    fn parses_aliases() {
        assert_eq!("WARN".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!("err".parse::<Severity>().unwrap(), Severity::Error);
        assert_eq!("crit".parse::<Severity>().unwrap(), Severity::Critical);
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn serde_round_trip() {
        let json = serde_json::to_string(&Severity::Notice).unwrap();
        assert_eq!(json, "\"notice\"");
        let back: Severity = serde_json::from_str("\"warn\"").unwrap();
        assert_eq!(back, Severity::Warning);
    }
}
