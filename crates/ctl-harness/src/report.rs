//! ---
//! ctl_section: "06-test-driver"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Result rendering for the terminal and JSON consumers."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::fmt::Write;

use serde_json::{json, Value};

use crate::outcome::{TestOutcome, TestResult};

/// Fixed-width table, one row per procedure, followed by a tally line.
pub fn render_table(results: &[TestResult]) -> String {
    let name_width = results
        .iter()
        .map(|result| result.name.len())
        .max()
        .unwrap_or(0)
        .max("Test".len());
    let mut out = String::new();
    let _ = writeln!(out, "{:<name_width$}  {:<8}  Detail", "Test", "Result");
    for result in results {
        let _ = writeln!(
            out,
            "{:<name_width$}  {:<8}  {}",
            result.name,
            result.outcome.to_string(),
            result.detail
        );
    }
    let count = |outcome| results.iter().filter(|r| r.outcome == outcome).count();
    let _ = write!(
        out,
        "\n{} passed, {} failed, {} unclear, {} disabled",
        count(TestOutcome::Pass),
        count(TestOutcome::Fail),
        count(TestOutcome::Unclear),
        count(TestOutcome::Disabled)
    );
    out
}

pub fn render_json(suite: &str, results: &[TestResult]) -> Value {
    json!({
        "suite": suite,
        "timestamp": ctl_common::time::unix_seconds_now(),
        "results": results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lists_rows_and_tally() {
        let results = vec![
            TestResult::new("test_01", "", TestOutcome::Pass, "All devices correctly identified"),
            TestResult::new("test_05", "", TestOutcome::Unclear, "question test_05 timed out after 5s"),
        ];
        let table = render_table(&results);
        assert!(table.lines().next().unwrap().starts_with("Test"));
        assert!(table.contains("test_05  Unclear   question test_05 timed out"));
        assert!(table.ends_with("1 passed, 0 failed, 1 unclear, 0 disabled"));
    }

    #[test]
    fn json_carries_outcomes() {
        let results = vec![TestResult::new("test_02", "", TestOutcome::Disabled, "")];
        let body = render_json("controller", &results);
        assert_eq!(body["results"][0]["outcome"], "disabled");
        assert_eq!(body["suite"], "controller");
    }
}
