//! ---
//! ctl_section: "06-test-driver"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Controller test procedures shipped with the harness."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::collections::BTreeSet;
use std::time::Duration;

use ctl_connection::ResourceKind;
use ctl_facade::{Question, QuestionType};
use serde_json::json;
use tracing::debug;

use crate::context::SuiteContext;
use crate::fixtures::FixtureResource;
use crate::outcome::{ProcedureError, ProcedureResult, Verdict};
use crate::suite::{Procedure, ProcedureFuture, Suite};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const TEST_01: Procedure = Procedure {
    name: "test_01",
    description: "Identify which receivers are registered",
    run: test_01,
};

pub const TEST_02: Procedure = Procedure {
    name: "test_02",
    description: "Identify which senders are registered",
    run: test_02,
};

pub const TEST_03: Procedure = Procedure {
    name: "test_03",
    description: "Connect a receiver to a sender",
    run: test_03,
};

pub const TEST_04: Procedure = Procedure {
    name: "test_04",
    description: "Disconnect a connected receiver",
    run: test_04,
};

pub const TEST_05: Procedure = Procedure {
    name: "test_05",
    description: "Identify the sender a receiver is connected to",
    run: test_05,
};

/// The controller suite with every shipped procedure in order.
pub fn controller_suite<I, S>(disabled: I) -> Suite
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    [TEST_01, TEST_02, TEST_03, TEST_04, TEST_05]
        .into_iter()
        .fold(Suite::new("controller"), Suite::register)
        .disable(disabled)
}

fn test_01(ctx: &SuiteContext) -> ProcedureFuture<'_> {
    Box::pin(identify_registered(ctx, ResourceKind::Receiver, "test_01"))
}

fn test_02(ctx: &SuiteContext) -> ProcedureFuture<'_> {
    Box::pin(identify_registered(ctx, ResourceKind::Sender, "test_02"))
}

/// Offer the whole catalogue and expect exactly the registered subset back.
async fn identify_registered(ctx: &SuiteContext, kind: ResourceKind, name: &str) -> ProcedureResult {
    let fixtures = ctx.fixtures();
    let question = Question::new(
        QuestionType::Checkbox,
        name,
        format!("Use the controller to browse the registry.\n\nWhich {kind}s are available?"),
    )
    .with_description(format!("Identify the {kind}s registered with the mock registry"))
    .with_answers(fixtures.answer_options(kind));

    let answer = ctx.ask(question).await?;
    let expected: BTreeSet<String> = fixtures
        .registered(kind)
        .iter()
        .filter_map(|resource| fixtures.answer_id(kind, &resource.id))
        .collect();
    let actual: BTreeSet<String> = answer.selected().into_iter().map(str::to_owned).collect();

    debug!(queried = ctx.registry().query_api_called(), "registry query flag");
    if actual == expected {
        Ok(Verdict::Pass(format!("all {} registered {kind}s identified", expected.len())))
    } else {
        Ok(Verdict::Fail(format!(
            "incorrect {kind}s identified: expected {expected:?}, got {actual:?}"
        )))
    }
}

fn test_03(ctx: &SuiteContext) -> ProcedureFuture<'_> {
    Box::pin(async move {
        let sender = ctx.choose_registered(ResourceKind::Sender)?;
        let receiver = ctx.choose_registered(ResourceKind::Receiver)?;
        let question = Question::new(
            QuestionType::Action,
            "test_03",
            format!(
                "All flows that are available in the registry appear in the connection list.\n\n\
                 Use the controller to connect receiver:\n\n{}\n\nto sender:\n\n{}\n\n\
                 Click 'Next' once the connection has been made.",
                receiver.answer_str(),
                sender.answer_str()
            ),
        )
        .with_description("Connect a receiver to a sender")
        .with_metadata(json!({"sender": sender.id, "receiver": receiver.id}));

        let ask = ctx.ask(question);
        tokio::pin!(ask);
        let mut seen_while_waiting = false;
        loop {
            let signal = ctx.rendezvous().signal();
            tokio::select! {
                biased;
                answer = &mut ask => {
                    answer?;
                    break;
                }
                _ = signal.sleep_or_answered(POLL_INTERVAL) => {
                    if !seen_while_waiting && is_connected(ctx, &receiver, &sender)? {
                        debug!(receiver = %receiver.id, "connection observed while waiting");
                        seen_while_waiting = true;
                    }
                }
            }
        }

        if !patched(ctx, &receiver) {
            return Ok(Verdict::Fail(format!(
                "no PATCH request was made to the staged endpoint of receiver {}",
                receiver.label
            )));
        }
        if is_connected(ctx, &receiver, &sender)? {
            let when = if seen_while_waiting {
                " before the answer arrived"
            } else {
                ""
            };
            Ok(Verdict::Pass(format!(
                "receiver {} connected to sender {}{when}",
                receiver.label, sender.label
            )))
        } else {
            let active = ctx.active(ResourceKind::Receiver, &receiver.id)?;
            Ok(Verdict::Fail(format!(
                "receiver {} is not connected to sender {} (active sender: {})",
                receiver.label,
                sender.label,
                active.peer_id.as_deref().unwrap_or("none")
            )))
        }
    })
}

fn test_04(ctx: &SuiteContext) -> ProcedureFuture<'_> {
    Box::pin(async move {
        let sender = ctx.choose_registered(ResourceKind::Sender)?;
        let receiver = ctx.choose_registered(ResourceKind::Receiver)?;
        ctx.connect(&sender, &receiver).await?;
        ctx.emulator().clear_staged_requests();

        let question = Question::new(
            QuestionType::Action,
            "test_04",
            format!(
                "Receiver {} is currently connected to sender {}.\n\n\
                 Use the controller to disconnect the receiver, then click 'Next'.",
                receiver.answer_str(),
                sender.answer_str()
            ),
        )
        .with_description("Disconnect a receiver")
        .with_metadata(json!({"receiver": receiver.id}));
        ctx.ask(question).await?;

        if !patched(ctx, &receiver) {
            return Ok(Verdict::Fail(format!(
                "no PATCH request was made to the staged endpoint of receiver {}",
                receiver.label
            )));
        }
        let active = ctx.active(ResourceKind::Receiver, &receiver.id)?;
        if active.is_bound() {
            Ok(Verdict::Fail(format!(
                "receiver {} is still active (sender {})",
                receiver.label,
                active.peer_id.as_deref().unwrap_or("none")
            )))
        } else {
            Ok(Verdict::Pass(format!("receiver {} disconnected", receiver.label)))
        }
    })
}

fn test_05(ctx: &SuiteContext) -> ProcedureFuture<'_> {
    Box::pin(async move {
        let sender = ctx.choose_registered(ResourceKind::Sender)?;
        let receiver = ctx.choose_registered(ResourceKind::Receiver)?;
        ctx.connect(&sender, &receiver).await?;

        let fixtures = ctx.fixtures();
        let question = Question::new(
            QuestionType::Radio,
            "test_05",
            format!(
                "Use the controller to identify the sender currently connected to receiver:\n\n{}",
                receiver.answer_str()
            ),
        )
        .with_description("Identify the connected sender")
        .with_answers(fixtures.registered_options(ResourceKind::Sender))
        .with_metadata(json!({"receiver": receiver.id}));
        let answer = ctx.ask(question).await?;

        let expected = fixtures
            .answer_id(ResourceKind::Sender, &sender.id)
            .ok_or_else(|| ProcedureError::harness(format!("sender {} left the fixtures", sender.id)))?;
        match answer.selected().first() {
            Some(chosen) if *chosen == expected => Ok(Verdict::Pass(format!(
                "connected sender {} identified",
                sender.label
            ))),
            chosen => Ok(Verdict::Fail(format!(
                "incorrect sender identified: expected {expected}, got {}",
                chosen.copied().unwrap_or("nothing")
            ))),
        }
    })
}

fn is_connected(
    ctx: &SuiteContext,
    receiver: &FixtureResource,
    sender: &FixtureResource,
) -> Result<bool, ProcedureError> {
    let active = ctx.active(ResourceKind::Receiver, &receiver.id)?;
    Ok(active.is_bound() && active.peer_id.as_deref() == Some(sender.id.as_str()))
}

fn patched(ctx: &SuiteContext, receiver: &FixtureResource) -> bool {
    ctx.emulator().staged_requests().iter().any(|request| {
        request.method == "PATCH"
            && request.kind == ResourceKind::Receiver
            && request.resource_id == receiver.id
    })
}
