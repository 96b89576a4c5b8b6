//! ---
//! ctl_section: "05-rendezvous"
//! ctl_subsection: "integration-tests"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Question/answer exchange over HTTP against the stub facade."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use ctl_common::http::{CommunicationError, OutboundClient};
use ctl_facade::{
    spawn_callback, spawn_stub, AnswerOption, AnswerValue, AskError, FacadeClient, FacadeStub,
    FacadeTransport, Question, QuestionType, RendezvousEngine, CALLBACK_PATH,
};
use serde_json::json;

const FACADE_PATH: &str = "/x-nmos/client-testing/";

fn http() -> OutboundClient {
    OutboundClient::new(Duration::from_secs(2), 5).unwrap()
}

fn checkbox() -> Question {
    let options = ["palin", "cleese"]
        .iter()
        .enumerate()
        .map(|(i, name)| AnswerOption {
            answer_id: format!("answer_{i}"),
            label: format!("Test-node-2/receiver/{name}"),
            description: format!("Mock receiver {}", i + 1),
            resource_id: Some(format!("r{i}")),
            answer_str: None,
        })
        .collect();
    Question::new(QuestionType::Checkbox, "test_01", "Which receivers are registered?")
        .with_answers(options)
}

#[tokio::test]
async fn question_round_trip_through_stub_facade() {
    let stub = Arc::new(FacadeStub::new(http()));
    let facade = spawn_stub("127.0.0.1:0".parse().unwrap(), FACADE_PATH, stub.clone())
        .await
        .unwrap();
    let client = FacadeClient::new(http(), format!("{}{FACADE_PATH}", facade.base_url()));

    let engine = Arc::new(RendezvousEngine::new(Arc::new(client.clone()), ""));
    let callback = spawn_callback("127.0.0.1:0".parse().unwrap(), engine.clone())
        .await
        .unwrap();
    engine.set_callback_url(format!("{}{CALLBACK_PATH}", callback.base_url()));

    let asker = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.ask(checkbox(), Duration::from_secs(5)).await })
    };

    let posted = stub
        .next_question(Duration::from_secs(5))
        .await
        .expect("question reaches the facade");
    assert_eq!(posted.question_id, "test_01");
    assert_eq!(posted.answers.len(), 2);
    stub.answer(&posted, json!(["answer_1"])).await.unwrap();

    let answer = asker.await.unwrap().unwrap();
    assert_eq!(answer.value, AnswerValue::Multiple(vec!["answer_1".into()]));

    client.clear().await.unwrap();
    assert_eq!(stub.clear_count(), 1);
    assert!(stub.current_question().is_none());

    drop(engine);
    callback.shutdown().await.unwrap();
    facade.shutdown().await.unwrap();
}

#[tokio::test]
async fn callback_rejects_answers_without_name() {
    let engine = Arc::new(RendezvousEngine::new(
        Arc::new(FacadeClient::new(http(), "http://127.0.0.1:9/")),
        "http://unused",
    ));
    let callback = spawn_callback("127.0.0.1:0".parse().unwrap(), engine)
        .await
        .unwrap();
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}{CALLBACK_PATH}", callback.base_url()))
        .json(&json!({"answer_response": "answer_0"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let stray = client
        .post(format!("{}{CALLBACK_PATH}", callback.base_url()))
        .json(&json!({"name": "test_09", "answer_response": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(stray.status(), reqwest::StatusCode::OK);

    drop(client);
    callback.shutdown().await.unwrap();
}

#[tokio::test]
async fn unreachable_facade_is_communication_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let engine = RendezvousEngine::new(
        Arc::new(FacadeClient::new(http(), format!("http://{dead}{FACADE_PATH}"))),
        "http://unused",
    );
    let err = engine
        .ask(checkbox(), Duration::from_secs(30))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AskError::Communication(CommunicationError::Connect(_))
    ));
    assert!(engine.pending_question().is_none());
}
