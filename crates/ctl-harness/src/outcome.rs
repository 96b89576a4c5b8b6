//! ---
//! ctl_section: "06-test-driver"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Typed procedure outcomes."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::fmt;

use ctl_facade::AskError;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    Pass,
    Fail,
    /// The facade exchange failed; says nothing about the controller.
    Unclear,
    Disabled,
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TestOutcome::Pass => "Pass",
            TestOutcome::Fail => "Fail",
            TestOutcome::Unclear => "Unclear",
            TestOutcome::Disabled => "Disabled",
        })
    }
}

/// What a procedure concluded about the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass(String),
    Fail(String),
}

/// Why a procedure could not reach a verdict.
#[derive(Debug, thiserror::Error)]
pub enum ProcedureError {
    #[error(transparent)]
    Ask(#[from] AskError),
    /// Harness-side failure while preparing or inspecting state.
    #[error("{0}")]
    Harness(String),
}

impl ProcedureError {
    pub fn harness(message: impl fmt::Display) -> Self {
        ProcedureError::Harness(message.to_string())
    }
}

pub type ProcedureResult = Result<Verdict, ProcedureError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestResult {
    pub name: String,
    pub description: String,
    pub outcome: TestOutcome,
    pub detail: String,
}

impl TestResult {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        outcome: TestOutcome,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            outcome,
            detail: detail.into(),
        }
    }

    /// Classify a finished procedure. Facade exchange failures are Unclear,
    /// never Fail.
    pub fn from_procedure(name: &str, description: &str, result: ProcedureResult) -> Self {
        let (outcome, detail) = match result {
            Ok(Verdict::Pass(detail)) => (TestOutcome::Pass, detail),
            Ok(Verdict::Fail(detail)) => (TestOutcome::Fail, detail),
            Err(ProcedureError::Ask(err)) => (TestOutcome::Unclear, err.to_string()),
            Err(ProcedureError::Harness(detail)) => (TestOutcome::Fail, detail),
        };
        Self::new(name, description, outcome, detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn ask_failures_are_unclear() {
        for err in [
            AskError::Timeout {
                question_id: "test_01".into(),
                timeout: Duration::from_secs(5),
            },
            AskError::Integrity("bad answer".into()),
            AskError::Communication(ctl_common::CommunicationError::Timeout),
        ] {
            let result = TestResult::from_procedure("test_01", "", Err(err.into()));
            assert_eq!(result.outcome, TestOutcome::Unclear);
        }
    }

    #[test]
    fn verdicts_and_harness_errors_map_directly() {
        let pass = TestResult::from_procedure("t", "", Ok(Verdict::Pass("ok".into())));
        assert_eq!(pass.outcome, TestOutcome::Pass);
        assert_eq!(pass.detail, "ok");
        let harness = TestResult::from_procedure("t", "", Err(ProcedureError::harness("no fixtures")));
        assert_eq!(harness.outcome, TestOutcome::Fail);
    }
}
