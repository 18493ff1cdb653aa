//! Scenario runner with non-fatal checks.
//!
//! A failing check is recorded and logged, and the scenario keeps going. A
//! scenario body that returns `Err` is recorded as aborted, and the runner
//! moves on to the next scenario, so one broken scenario never hides the rest.

use std::fmt::{self, Debug, Write as _};

use crate::Result;
use crate::core_dom_utils::normalize_text;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub passed: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    pub name: String,
    pub checks: Vec<CheckOutcome>,
    pub aborted: Option<String>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.aborted.is_none() && self.checks.iter().all(|check| check.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.checks.iter().filter(|check| !check.passed)
    }
}

/// Handed to each scenario body to record checks.
#[derive(Debug)]
pub struct ScenarioContext {
    scenario: String,
    checks: Vec<CheckOutcome>,
}

impl ScenarioContext {
    fn new(scenario: &str) -> Self {
        Self {
            scenario: scenario.to_string(),
            checks: Vec::new(),
        }
    }

    /// Records `condition`; returns it so callers can branch on the outcome.
    pub fn check(&mut self, condition: bool, message: &str) -> bool {
        self.record(condition, message.to_string())
    }

    pub fn check_eq<T: PartialEq + Debug>(&mut self, actual: T, expected: T, message: &str) -> bool {
        let passed = actual == expected;
        let message = if passed {
            message.to_string()
        } else {
            format!("{message}: expected {expected:?}, actual {actual:?}")
        };
        self.record(passed, message)
    }

    /// Equality after NFC normalization of both sides.
    pub fn check_text_eq(&mut self, actual: &str, expected: &str, message: &str) -> bool {
        let passed = normalize_text(actual) == normalize_text(expected);
        let message = if passed {
            message.to_string()
        } else {
            format!("{message}: expected {expected:?}, actual {actual:?}")
        };
        self.record(passed, message)
    }

    /// Regex check against the NFC form of `text`. A bad pattern counts as a
    /// failed check.
    pub fn check_matches(&mut self, text: &str, pattern: &str, message: &str) -> bool {
        let normalized = normalize_text(text);
        let outcome = fancy_regex::Regex::new(pattern)
            .map_err(|err| err.to_string())
            .and_then(|regex| regex.is_match(&normalized).map_err(|err| err.to_string()));
        match outcome {
            Ok(true) => self.record(true, message.to_string()),
            Ok(false) => self.record(
                false,
                format!("{message}: {text:?} does not match /{pattern}/"),
            ),
            Err(err) => self.record(false, format!("{message}: bad pattern /{pattern}/: {err}")),
        }
    }

    pub fn checks(&self) -> &[CheckOutcome] {
        &self.checks
    }

    fn record(&mut self, passed: bool, message: String) -> bool {
        if passed {
            log::info!(target: "form_harness::runner", "[{}] ok: {message}", self.scenario);
        } else {
            log::warn!(target: "form_harness::runner", "[{}] FAILED: {message}", self.scenario);
        }
        self.checks.push(CheckOutcome { passed, message });
        passed
    }
}

#[derive(Debug, Default)]
pub struct TestRunner {
    scenarios: Vec<ScenarioReport>,
}

impl TestRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `body` and records its checks under `name`.
    pub fn scenario<F>(&mut self, name: &str, body: F) -> &ScenarioReport
    where
        F: FnOnce(&mut ScenarioContext) -> Result<()>,
    {
        log::info!(target: "form_harness::runner", "scenario {name}");
        let mut ctx = ScenarioContext::new(name);
        let aborted = match body(&mut ctx) {
            Ok(()) => None,
            Err(err) => {
                log::warn!(target: "form_harness::runner", "scenario {name} aborted: {err}");
                Some(err.to_string())
            }
        };
        self.scenarios.push(ScenarioReport {
            name: name.to_string(),
            checks: ctx.checks,
            aborted,
        });
        &self.scenarios[self.scenarios.len() - 1]
    }

    pub fn scenarios(&self) -> &[ScenarioReport] {
        &self.scenarios
    }

    pub fn failed_checks(&self) -> usize {
        self.scenarios
            .iter()
            .map(|scenario| scenario.failures().count())
            .sum()
    }

    pub fn aborted_scenarios(&self) -> usize {
        self.scenarios
            .iter()
            .filter(|scenario| scenario.aborted.is_some())
            .count()
    }

    pub fn passed(&self) -> bool {
        self.scenarios.iter().all(ScenarioReport::passed)
    }

    /// 0 when every check passed and no scenario aborted, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.passed() { 0 } else { 1 }
    }

    pub fn report(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TestRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        let mut total_checks = 0usize;
        for scenario in &self.scenarios {
            total_checks += scenario.checks.len();
            let failed = scenario.failures().count();
            match (&scenario.aborted, failed) {
                (Some(err), _) => {
                    writeln!(out, "{} ... ABORTED: {err}", scenario.name)?;
                }
                (None, 0) => {
                    writeln!(out, "{} ... ok ({} checks)", scenario.name, scenario.checks.len())?;
                }
                (None, failed) => {
                    writeln!(
                        out,
                        "{} ... FAILED ({failed}/{} checks)",
                        scenario.name,
                        scenario.checks.len()
                    )?;
                }
            }
            for failure in scenario.failures() {
                writeln!(out, "  - {}", failure.message)?;
            }
        }
        write!(
            out,
            "{} scenarios, {total_checks} checks, {} failed, {} aborted",
            self.scenarios.len(),
            self.failed_checks(),
            self.aborted_scenarios()
        )?;
        f.write_str(&out)
    }
}
