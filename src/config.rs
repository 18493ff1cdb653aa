//! Harness configuration.
//!
//! Values can be built programmatically or overlaid from environment variables,
//! which is handy for turning tracing on for a single failing test run.

use std::env;

use crate::{Error, Result};

const TRACE_VAR: &str = "FORM_HARNESS_TRACE";
const TIMER_STEP_LIMIT_VAR: &str = "FORM_HARNESS_TIMER_STEP_LIMIT";
const LATENCY_VAR: &str = "FORM_HARNESS_LATENCY_MS";

/// Runtime knobs for a [`Harness`](crate::Harness).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Maximum number of timers a single `advance` call may fire
    pub timer_step_limit: usize,
    /// Logical delay between issuing a fetch and delivering its response
    pub network_latency_ms: u64,
    /// Whether trace lines are recorded at all
    pub trace: bool,
    /// Record `[event]` lines when tracing
    pub trace_events: bool,
    /// Record `[timer]` lines when tracing
    pub trace_timers: bool,
    /// Ring buffer size for recorded trace lines
    pub trace_log_limit: usize,
    /// Echo trace lines to stderr as they are recorded
    pub trace_to_stderr: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            timer_step_limit: 10_000,
            network_latency_ms: 100,
            trace: false,
            trace_events: true,
            trace_timers: true,
            trace_log_limit: 10_000,
            trace_to_stderr: false,
        }
    }
}

impl HarnessConfig {
    /// Load defaults overlaid with environment variables.
    ///
    /// Reads the following environment variables:
    /// - `FORM_HARNESS_TRACE`: set to "1" to record trace lines
    /// - `FORM_HARNESS_TIMER_STEP_LIMIT`: per-advance timer budget (minimum 1)
    /// - `FORM_HARNESS_LATENCY_MS`: simulated network latency in milliseconds
    ///
    /// Unset or unparseable values keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same overlay as [`from_env`](Self::from_env), reading values through `lookup`.
    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let trace = lookup(TRACE_VAR).as_deref() == Some("1");
        let timer_step_limit = lookup(TIMER_STEP_LIMIT_VAR)
            .and_then(|val| val.trim().parse::<usize>().ok())
            .unwrap_or(defaults.timer_step_limit)
            .max(1);
        let network_latency_ms = lookup(LATENCY_VAR)
            .and_then(|val| val.trim().parse::<u64>().ok())
            .unwrap_or(defaults.network_latency_ms);
        Self {
            timer_step_limit,
            network_latency_ms,
            trace,
            ..defaults
        }
    }

    /// Rejects zero limits.
    pub fn validate(&self) -> Result<()> {
        if self.timer_step_limit == 0 {
            return Err(Error::InvalidConfig(
                "timer_step_limit requires at least 1 step".into(),
            ));
        }
        if self.trace_log_limit == 0 {
            return Err(Error::InvalidConfig(
                "trace_log_limit requires at least 1 entry".into(),
            ));
        }
        Ok(())
    }
}
