//! ---
//! ctl_section: "15-testing-qa-runbook"
//! ctl_subsection: "integration-tests"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "End-to-end harness runs against a misbehaving controller."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use ctl_common::{AppConfig, OutboundClient};
use ctl_facade::{spawn_stub, FacadeStub, Question};
use ctl_harness::{render_json, Harness, Selection, TestOutcome};
use serde_json::{json, Value};

const FACADE_PATH: &str = "/x-nmos/client-testing/";

#[test]
fn shipped_example_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../configs/example.toml");
    let raw = std::fs::read_to_string(path).expect("example config present");
    let config: AppConfig = raw.parse().expect("example config parses");
    assert_eq!(config.registry.api_version, "v1.3");
    assert_eq!(config.node.api_version, "v1.1");
    assert_eq!(config.harness.question_timeout, Duration::from_secs(600));
    assert_eq!(config.facade.path(), FACADE_PATH);
}

fn wrong_sender(question: &Question, connected: &str) -> Value {
    let option = question
        .answers
        .iter()
        .find(|option| option.resource_id.as_deref() != Some(connected))
        .expect("at least two registered senders");
    json!(option.answer_id)
}

/// Answers every question, but never the way a conformant controller would.
async fn misbehave(stub: Arc<FacadeStub>, registry: String, node: String) {
    let client = reqwest::Client::new();
    while let Some(question) = stub.next_question(Duration::from_secs(30)).await {
        let metadata = question.metadata.clone().unwrap_or_default();
        let receiver = metadata["receiver"].as_str().unwrap_or_default().to_owned();
        let response = match question.question_id.as_str() {
            // claims every catalogue entry is registered
            "test_01" => json!(question
                .answers
                .iter()
                .map(|option| option.answer_id.clone())
                .collect::<Vec<_>>()),
            // stages the release but never activates it
            "test_04" => {
                let response = client
                    .patch(format!(
                        "{node}/x-nmos/connection/v1.1/single/receivers/{receiver}/staged"
                    ))
                    .json(&json!({"sender_id": null, "master_enable": false}))
                    .send()
                    .await
                    .unwrap();
                assert_eq!(response.status(), reqwest::StatusCode::OK);
                json!("")
            }
            "test_05" => {
                let document: Value = client
                    .get(format!("{registry}x-nmos/query/v1.3/receivers/{receiver}"))
                    .send()
                    .await
                    .unwrap()
                    .json()
                    .await
                    .unwrap();
                let connected = document["subscription"]["sender_id"].as_str().unwrap();
                wrong_sender(&question, connected)
            }
            // test_03 and the intro/outro messages are acknowledged without acting
            _ => json!(""),
        };
        stub.answer(&question, response).await.unwrap();
        if question.question_id == "post_tests_message" {
            break;
        }
    }
}

#[tokio::test]
async fn misbehaving_controller_fails_rather_than_unclear() {
    let http = OutboundClient::new(Duration::from_secs(2), 5).unwrap();
    let stub = Arc::new(FacadeStub::new(http));
    let facade = spawn_stub("127.0.0.1:0".parse().unwrap(), FACADE_PATH, stub.clone())
        .await
        .unwrap();

    let mut config = AppConfig::default();
    config.registry.listen = "127.0.0.1:0".parse().unwrap();
    config.node.listen = "127.0.0.1:0".parse().unwrap();
    config.harness.callback_listen = "127.0.0.1:0".parse().unwrap();
    config.harness.question_timeout = Duration::from_secs(20);
    config.harness.random_seed = 3;
    config.facade.url = format!("{}{FACADE_PATH}", facade.base_url());

    let harness = Harness::start(&config).await.unwrap();
    let settings = harness.context().settings().clone();
    let operator = tokio::spawn(misbehave(
        stub.clone(),
        settings.registry_url.clone(),
        settings.node.base_url.clone(),
    ));

    let selection: Selection = "test_01,test_03,test_04,test_05".parse().unwrap();
    let results = harness.run(&selection).await.unwrap();
    operator.await.unwrap();

    for result in &results {
        assert_eq!(result.outcome, TestOutcome::Fail, "{result:?}");
    }
    assert!(results[1].detail.contains("no PATCH"), "{}", results[1].detail);
    assert!(results[2].detail.contains("still active"), "{}", results[2].detail);

    let report = render_json("controller", &results);
    assert_eq!(report["results"].as_array().unwrap().len(), 4);
    assert_eq!(report["results"][0]["outcome"], "fail");

    harness.shutdown().await.unwrap();
    facade.shutdown().await.unwrap();
}
