//! ---
//! ctl_section: "05-rendezvous"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Question and answer payloads exchanged with the testing facade."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How the facade should present a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    /// Operator performs an action and confirms; no value expected.
    Action,
    /// Exactly one option.
    Radio,
    /// Any subset of the options.
    Checkbox,
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QuestionType::Action => "action",
            QuestionType::Radio => "radio",
            QuestionType::Checkbox => "checkbox",
        })
    }
}

/// One selectable answer. `answer_id` is the stable identifier answers echo back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub answer_id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_str: Option<String>,
}

/// Question as posted to the facade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub question_id: String,
    /// Identity the answer must echo; equal to `question_id`.
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub question: String,
    #[serde(default)]
    pub answers: Vec<AnswerOption>,
    #[serde(default)]
    pub time_sent: f64,
    /// Seconds the facade should allow before giving up.
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub callback_url: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl Question {
    pub fn new(kind: QuestionType, question_id: impl Into<String>, text: impl Into<String>) -> Self {
        let question_id = question_id.into();
        Self {
            kind,
            name: question_id.clone(),
            question_id,
            description: String::new(),
            question: text.into(),
            answers: Vec::new(),
            time_sent: 0.0,
            timeout: 0,
            callback_url: String::new(),
            metadata: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_answers(mut self, answers: Vec<AnswerOption>) -> Self {
        self.answers = answers;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    fn offers(&self, answer_id: &str) -> bool {
        self.answers.iter().any(|option| option.answer_id == answer_id)
    }

    /// Check a received answer against this question and decode its value.
    pub fn validate(&self, payload: &AnswerPayload) -> Result<Answer, String> {
        if payload.name != self.name {
            return Err(format!(
                "cannot compare result of {} with expected result for {}",
                self.name, payload.name
            ));
        }
        let value = match self.kind {
            QuestionType::Action => AnswerValue::None,
            QuestionType::Radio => {
                let id = payload.answer_response.as_str().ok_or_else(|| {
                    format!("radio answer for {} is not a single answer id", self.name)
                })?;
                if !self.offers(id) {
                    return Err(format!("answer {id} was not offered for {}", self.name));
                }
                AnswerValue::Single(id.to_owned())
            }
            QuestionType::Checkbox => {
                let ids = payload.answer_response.as_array().ok_or_else(|| {
                    format!("checkbox answer for {} is not a list of answer ids", self.name)
                })?;
                let mut seen = HashSet::new();
                let mut selected = Vec::with_capacity(ids.len());
                for id in ids {
                    let id = id.as_str().ok_or_else(|| {
                        format!("checkbox answer for {} contains a non-string id", self.name)
                    })?;
                    if !self.offers(id) {
                        return Err(format!("answer {id} was not offered for {}", self.name));
                    }
                    if seen.insert(id) {
                        selected.push(id.to_owned());
                    }
                }
                AnswerValue::Multiple(selected)
            }
        };
        Ok(Answer {
            question_id: self.question_id.clone(),
            value,
            answered_at: payload.answered_at(),
        })
    }
}

/// Answer body as POSTed by the facade to the callback endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub name: String,
    #[serde(default)]
    pub answer_response: Value,
    #[serde(default)]
    pub time_answered: Value,
}

impl AnswerPayload {
    pub fn new(name: impl Into<String>, answer_response: Value) -> Self {
        Self {
            name: name.into(),
            answer_response,
            time_answered: Value::from(ctl_common::time::unix_seconds_now()),
        }
    }

    /// `time_answered` as seconds, whether sent as a number or a numeric string.
    pub fn answered_at(&self) -> Option<f64> {
        match &self.time_answered {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerValue {
    None,
    Single(String),
    Multiple(Vec<String>),
}

/// Validated answer handed back to the asking procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub question_id: String,
    pub value: AnswerValue,
    pub answered_at: Option<f64>,
}

impl Answer {
    pub fn selected(&self) -> Vec<&str> {
        match &self.value {
            AnswerValue::None => Vec::new(),
            AnswerValue::Single(id) => vec![id.as_str()],
            AnswerValue::Multiple(ids) => ids.iter().map(String::as_str).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn option(answer_id: &str) -> AnswerOption {
        AnswerOption {
            answer_id: answer_id.into(),
            label: format!("label {answer_id}"),
            description: String::new(),
            resource_id: None,
            answer_str: None,
        }
    }

    fn radio() -> Question {
        Question::new(QuestionType::Radio, "test_05", "Which sender?")
            .with_answers(vec![option("answer_0"), option("answer_1")])
    }

    #[test]
    fn wire_shape_uses_type_and_id_field_names() {
        let mut answer = option("answer_0");
        answer.resource_id = Some("s1".into());
        let question = radio().with_answers(vec![answer]);
        let body = serde_json::to_value(&question).unwrap();
        assert_eq!(body["type"], "radio");
        assert_eq!(body["name"], "test_05");
        assert_eq!(body["question_id"], "test_05");
        assert_eq!(body["answers"][0]["id"], "s1");
        assert!(body["answers"][0].get("answer_str").is_none());
    }

    #[test]
    fn radio_requires_one_offered_id() {
        let question = radio();
        let answer = question
            .validate(&AnswerPayload::new("test_05", json!("answer_1")))
            .unwrap();
        assert_eq!(answer.value, AnswerValue::Single("answer_1".into()));
        assert!(answer.answered_at.is_some());

        assert!(question
            .validate(&AnswerPayload::new("test_05", json!(["answer_1"])))
            .is_err());
        assert!(question
            .validate(&AnswerPayload::new("test_05", json!("answer_9")))
            .is_err());
    }

    #[test]
    fn checkbox_accepts_subset_and_drops_duplicates() {
        let question = Question::new(QuestionType::Checkbox, "test_01", "Which receivers?")
            .with_answers(vec![option("answer_0"), option("answer_1"), option("answer_2")]);
        let answer = question
            .validate(&AnswerPayload::new(
                "test_01",
                json!(["answer_2", "answer_0", "answer_2"]),
            ))
            .unwrap();
        assert_eq!(answer.selected(), vec!["answer_2", "answer_0"]);

        let empty = question
            .validate(&AnswerPayload::new("test_01", json!([])))
            .unwrap();
        assert!(empty.selected().is_empty());
        assert!(question
            .validate(&AnswerPayload::new("test_01", json!("answer_0")))
            .is_err());
    }

    #[test]
    fn action_ignores_response_but_checks_name() {
        let question = Question::new(QuestionType::Action, "pre_tests_message", "Click Next");
        let answer = question
            .validate(&AnswerPayload::new("pre_tests_message", json!("")))
            .unwrap();
        assert_eq!(answer.value, AnswerValue::None);
        assert!(question
            .validate(&AnswerPayload::new("test_01", json!("")))
            .is_err());
    }

    #[test]
    fn answered_at_accepts_strings_and_numbers() {
        let mut payload = AnswerPayload::new("q", Value::Null);
        payload.time_answered = json!("1700000000.5");
        assert_eq!(payload.answered_at(), Some(1_700_000_000.5));
        payload.time_answered = json!("");
        assert_eq!(payload.answered_at(), None);
    }
}
