//! Resolver configuration.

use std::env;

/// Environment variable enabling per-descriptor tracing.
pub const TRACE_TYPES_ENV: &str = "TYSCOPE_TRACE_TYPES";

/// Knobs for a [`crate::process::RemoteProcess`] session.
///
/// None of them change what a resolution returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolverConfig
{
    /// Log one indented line per decoded descriptor, with its nearest symbol.
    pub trace_descriptors: bool,
}

impl ResolverConfig
{
    /// Read the configuration from the environment.
    ///
    /// `TYSCOPE_TRACE_TYPES` accepts `1`, `true`, `yes` or `on`.
    #[must_use]
    pub fn from_env() -> Self
    {
        Self {
            trace_descriptors: env::var(TRACE_TYPES_ENV).is_ok_and(|value| parse_flag(&value)),
        }
    }

    #[must_use]
    pub const fn with_trace_descriptors(mut self, enabled: bool) -> Self
    {
        self.trace_descriptors = enabled;
        self
    }
}

fn parse_flag(value: &str) -> bool
{
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
