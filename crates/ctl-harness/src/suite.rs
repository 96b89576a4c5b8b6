//! ---
//! ctl_section: "06-test-driver"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Procedure registry and the sequential driver loop."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::convert::Infallible;
use std::str::FromStr;

use anyhow::Result;
use ctl_facade::{Question, QuestionType};
use futures::future::BoxFuture;
use indexmap::IndexMap;
use tracing::{info, warn};

use crate::context::SuiteContext;
use crate::outcome::{ProcedureResult, TestOutcome, TestResult};

pub type ProcedureFuture<'a> = BoxFuture<'a, ProcedureResult>;
pub type ProcedureFn = for<'a> fn(&'a SuiteContext) -> ProcedureFuture<'a>;

#[derive(Clone, Copy)]
pub struct Procedure {
    pub name: &'static str,
    pub description: &'static str,
    pub run: ProcedureFn,
}

impl std::fmt::Debug for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Procedure")
            .field("name", &self.name)
            .finish()
    }
}

/// Which procedures a run executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Named(Vec<String>),
}

impl FromStr for Selection {
    type Err = Infallible;

    /// `all`, or a comma-separated list of procedure names.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("all") {
            return Ok(Selection::All);
        }
        Ok(Selection::Named(
            value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .collect(),
        ))
    }
}

#[derive(Debug)]
pub struct Suite {
    name: String,
    procedures: IndexMap<&'static str, Procedure>,
    disabled: HashSet<String>,
    messages: bool,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            procedures: IndexMap::new(),
            disabled: HashSet::new(),
            messages: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register(mut self, procedure: Procedure) -> Self {
        self.procedures.insert(procedure.name, procedure);
        self
    }

    pub fn disable<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled.extend(names.into_iter().map(Into::into));
        self
    }

    /// Skip the introduction and closing questions.
    pub fn without_messages(mut self) -> Self {
        self.messages = false;
        self
    }

    pub fn procedure_names(&self) -> Vec<&'static str> {
        self.procedures.keys().copied().collect()
    }

    fn selected(&self, selection: &Selection) -> Vec<String> {
        match selection {
            Selection::All => self.procedures.keys().map(|name| (*name).to_owned()).collect(),
            Selection::Named(names) => names.clone(),
        }
    }

    /// Run the selected procedures in order. Only a failing suite set-up is
    /// returned as an error; every procedure failure becomes a result.
    pub async fn run(&self, ctx: &SuiteContext, selection: &Selection) -> Result<Vec<TestResult>> {
        ctx.set_up_tests().await?;
        if self.messages {
            self.pre_tests_message(ctx).await;
        }

        let mut results = Vec::new();
        for name in self.selected(selection) {
            let result = self.run_one(ctx, &name).await;
            info!(procedure = %result.name, outcome = %result.outcome, detail = %result.detail, "procedure finished");
            results.push(result);
        }

        if self.messages {
            self.post_tests_message(ctx).await;
        }
        ctx.tear_down_tests().await;
        Ok(results)
    }

    async fn run_one(&self, ctx: &SuiteContext, name: &str) -> TestResult {
        let Some(procedure) = self.procedures.get(name) else {
            return TestResult::new(
                name,
                "",
                TestOutcome::Fail,
                format!("no procedure named {name} in suite {}", self.name),
            );
        };
        if self.disabled.contains(name) {
            return TestResult::new(
                name,
                procedure.description,
                TestOutcome::Disabled,
                "disabled by configuration",
            );
        }
        if let Err(err) = ctx.set_up_test().await {
            return TestResult::new(
                name,
                procedure.description,
                TestOutcome::Fail,
                format!("set-up failed: {err:#}"),
            );
        }
        info!(procedure = name, "running");
        let outcome = (procedure.run)(ctx).await;
        TestResult::from_procedure(name, procedure.description, outcome)
    }

    async fn pre_tests_message(&self, ctx: &SuiteContext) {
        let question = Question::new(
            QuestionType::Action,
            "pre_tests_message",
            format!(
                "These tests validate a Controller's ability to query and control \
                 resources through the registry and connection APIs.\n\n\
                 The registry can be reached at:\n\n{}\n\nPlease click 'Next'",
                ctx.query_url()
            ),
        )
        .with_description("Introduction to the controller test suite");
        if let Err(err) = ctx
            .ask_with_timeout(question, ctx.settings().intro_timeout)
            .await
        {
            warn!(error = %err, "introduction not acknowledged");
        }
    }

    async fn post_tests_message(&self, ctx: &SuiteContext) {
        let question = Question::new(
            QuestionType::Action,
            "post_tests_message",
            "Controller testing complete!\n\nPlease press 'Next' to exit the tests",
        )
        .with_description("Controller test suite complete");
        if let Err(err) = ctx
            .ask_with_timeout(question, ctx.settings().outro_timeout)
            .await
        {
            warn!(error = %err, "closing message not acknowledged");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_parses_all_and_lists() {
        assert_eq!("all".parse::<Selection>().unwrap(), Selection::All);
        assert_eq!("".parse::<Selection>().unwrap(), Selection::All);
        assert_eq!(
            "test_01, test_03".parse::<Selection>().unwrap(),
            Selection::Named(vec!["test_01".into(), "test_03".into()])
        );
    }
}
