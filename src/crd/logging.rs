//! # Logging Configuration
//!
//! Operator log levels as declared on the operator resource.
//!
//! The same level drives two things: the verbosity ordinal substituted into the
//! operand manifests and the operator's own tracing filter.

use crate::constants::MAX_VERBOSITY;
use serde::{Deserialize, Deserializer, Serialize};

/// Log level configuration
///
/// Levels are ordered from least to most verbose. An empty, null or
/// unrecognised value on the wire is treated as `Normal`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Serialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    schemars::JsonSchema,
)]
pub enum LogLevel {
    /// Default verbosity
    #[default]
    Normal,
    /// Debug verbosity
    Debug,
    /// Trace verbosity
    Trace,
    /// Everything, including request bodies
    TraceAll,
}

impl LogLevel {
    /// Every level, least verbose first
    pub const ALL: [LogLevel; 4] = [
        LogLevel::Normal,
        LogLevel::Debug,
        LogLevel::Trace,
        LogLevel::TraceAll,
    ];

    /// Level for a wire value; anything unrecognised is `Normal`
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "Debug" => LogLevel::Debug,
            "Trace" => LogLevel::Trace,
            "TraceAll" => LogLevel::TraceAll,
            _ => LogLevel::Normal,
        }
    }

    /// Verbosity ordinal handed to the operand (`--v=N`)
    ///
    /// Total over all levels, strictly increasing with the level and bounded by
    /// [`MAX_VERBOSITY`].
    #[must_use]
    pub fn to_verbosity(self) -> u8 {
        let verbosity = match self {
            LogLevel::Normal => 2,
            LogLevel::Debug => 4,
            LogLevel::Trace => 6,
            LogLevel::TraceAll => 8,
        };
        verbosity.min(MAX_VERBOSITY)
    }

    /// Get the tracing level equivalent
    #[must_use]
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Normal => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace | LogLevel::TraceAll => tracing::Level::TRACE,
        }
    }

    /// Directive string for an `EnvFilter`
    #[must_use]
    pub fn as_filter_directive(self) -> &'static str {
        match self {
            LogLevel::Normal => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace | LogLevel::TraceAll => "trace",
        }
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = Option::<String>::deserialize(deserializer)?;
        Ok(name.as_deref().map_or(LogLevel::Normal, LogLevel::from_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn level() -> impl Strategy<Value = LogLevel> {
        prop::sample::select(LogLevel::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_verbosity_is_monotonic(a in level(), b in level()) {
            prop_assert_eq!(a.cmp(&b), a.to_verbosity().cmp(&b.to_verbosity()));
        }

        #[test]
        fn prop_unknown_names_are_normal(name in "[A-Za-z]{0,12}") {
            prop_assume!(!["Normal", "Debug", "Trace", "TraceAll"].contains(&name.as_str()));
            prop_assert_eq!(LogLevel::from_name(&name), LogLevel::Normal);
        }
    }

    #[test]
    fn test_verbosity_is_bounded() {
        for level in LogLevel::ALL {
            assert!(level.to_verbosity() <= MAX_VERBOSITY);
        }
    }

    #[test]
    fn test_verbosity_values() {
        assert_eq!(LogLevel::Normal.to_verbosity(), 2);
        assert_eq!(LogLevel::Debug.to_verbosity(), 4);
        assert_eq!(LogLevel::Trace.to_verbosity(), 6);
        assert_eq!(LogLevel::TraceAll.to_verbosity(), 8);
    }

    #[test]
    fn test_empty_level_deserializes_as_normal() {
        let level: LogLevel = serde_json::from_str("\"\"").unwrap();
        assert_eq!(level, LogLevel::Normal);
        let level: LogLevel = serde_json::from_str("null").unwrap();
        assert_eq!(level, LogLevel::Normal);
        let level: LogLevel = serde_json::from_str("\"TraceAll\"").unwrap();
        assert_eq!(level, LogLevel::TraceAll);
    }

    #[test]
    fn test_unknown_level_deserializes_as_normal() {
        let level: LogLevel = serde_json::from_str("\"Verbose\"").unwrap();
        assert_eq!(level, LogLevel::Normal);
    }

    #[test]
    fn test_level_round_trips_through_wire_name() {
        for level in LogLevel::ALL {
            let wire = serde_json::to_string(&level).unwrap();
            assert_eq!(serde_json::from_str::<LogLevel>(&wire).unwrap(), level);
        }
    }

    #[test]
    fn test_tracing_level() {
        assert_eq!(LogLevel::Normal.to_tracing_level(), tracing::Level::INFO);
        assert_eq!(LogLevel::Debug.to_tracing_level(), tracing::Level::DEBUG);
        assert_eq!(LogLevel::TraceAll.to_tracing_level(), tracing::Level::TRACE);
    }
}
