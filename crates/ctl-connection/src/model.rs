//! ---
//! ctl_section: "03-connection-emulator"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Connection resource model and staged PATCH parsing."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ConnectionError;

/// One transport leg: parameter name to value.
pub type TransportLeg = Map<String, Value>;

pub const ACTIVATE_IMMEDIATE: &str = "activate_immediate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Sender,
    Receiver,
}

impl ResourceKind {
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Sender => "senders",
            ResourceKind::Receiver => "receivers",
        }
    }

    pub fn from_plural(value: &str) -> Option<Self> {
        match value.trim_end_matches('/') {
            "senders" => Some(ResourceKind::Sender),
            "receivers" => Some(ResourceKind::Receiver),
            _ => None,
        }
    }

    /// Field naming the bound counterpart in parameter sets: receivers bind a
    /// sender, senders bind a receiver.
    pub fn peer_field(&self) -> &'static str {
        match self {
            ResourceKind::Sender => "receiver_id",
            ResourceKind::Receiver => "sender_id",
        }
    }

    /// Transport parameters a freshly registered resource starts with.
    pub fn default_transport_params(&self) -> TransportLeg {
        let value = match self {
            ResourceKind::Sender => json!({
                "destination_ip": "auto",
                "destination_port": "auto",
                "rtp_enabled": true,
                "source_ip": "auto",
                "source_port": "auto"
            }),
            ResourceKind::Receiver => json!({
                "destination_port": "auto",
                "interface_ip": "auto",
                "multicast_ip": null,
                "rtp_enabled": true,
                "source_ip": null
            }),
        };
        match value {
            Value::Object(map) => map,
            _ => TransportLeg::new(),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Sender => "sender",
            ResourceKind::Receiver => "receiver",
        })
    }
}

/// Activation modes understood on the wire. Only immediate activation drives a
/// transition; scheduled modes are parsed so they can be rejected by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    ActivateImmediate,
    ActivateScheduledAbsolute,
    ActivateScheduledRelative,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activation {
    pub mode: Option<ActivationMode>,
    pub requested_time: Option<String>,
    pub activation_time: Option<String>,
}

impl Activation {
    pub fn immediate(activation_time: String) -> Self {
        Self {
            mode: Some(ActivationMode::ActivateImmediate),
            requested_time: None,
            activation_time: Some(activation_time),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportFile {
    pub data: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// A staged or active parameter set.
///
/// `master_enable` is true exactly when `peer_id` is set; every constructor and
/// transition in this crate keeps the two in step.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    pub peer_id: Option<String>,
    pub master_enable: bool,
    pub activation: Activation,
    /// Receivers only.
    pub transport_file: Option<TransportFile>,
    pub transport_params: Vec<TransportLeg>,
}

impl ParameterSet {
    /// Placeholder for a resource with nothing bound.
    pub fn unbound(kind: ResourceKind, transport_params: Vec<TransportLeg>) -> Self {
        Self {
            peer_id: None,
            master_enable: false,
            activation: Activation::default(),
            transport_file: match kind {
                ResourceKind::Receiver => Some(TransportFile::default()),
                ResourceKind::Sender => None,
            },
            transport_params,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.master_enable && self.peer_id.is_some()
    }

    /// Wire representation for the `staged` and `active` endpoints.
    pub fn to_json(&self, kind: ResourceKind) -> Value {
        let mut body = Map::new();
        body.insert(
            "activation".into(),
            serde_json::to_value(&self.activation).unwrap_or(Value::Null),
        );
        body.insert("master_enable".into(), Value::Bool(self.master_enable));
        body.insert(
            kind.peer_field().into(),
            self.peer_id.clone().map(Value::String).unwrap_or(Value::Null),
        );
        if kind == ResourceKind::Receiver {
            let file = self.transport_file.clone().unwrap_or_default();
            body.insert(
                "transport_file".into(),
                serde_json::to_value(file).unwrap_or(Value::Null),
            );
        }
        body.insert(
            "transport_params".into(),
            Value::Array(
                self.transport_params
                    .iter()
                    .cloned()
                    .map(Value::Object)
                    .collect(),
            ),
        );
        Value::Object(body)
    }
}

/// Registry-facing identity of a connection resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescriptor {
    pub label: String,
    pub description: String,
    pub device_id: Option<String>,
    /// Resource document as registered; notifications re-post it with an
    /// updated subscription block.
    pub document: Value,
}

/// A sender or receiver owned by the emulator.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionResource {
    pub id: String,
    pub kind: ResourceKind,
    pub descriptor: ResourceDescriptor,
    pub staged: ParameterSet,
    pub active: ParameterSet,
    pub constraints: Vec<TransportLeg>,
    pub transport: String,
}

impl ConnectionResource {
    /// Build an unbound resource from its registry document. The document must
    /// carry a string `id`.
    pub fn from_document(
        kind: ResourceKind,
        document: Value,
        advertised_host: &str,
        default_transport: &str,
    ) -> Result<Self, ConnectionError> {
        let id = document
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ConnectionError::InvalidRequest("resource document has no id".into()))?
            .to_owned();
        let text = |field: &str| {
            document
                .get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned()
        };
        let descriptor = ResourceDescriptor {
            label: text("label"),
            description: text("description"),
            device_id: document
                .get("device_id")
                .and_then(Value::as_str)
                .map(str::to_owned),
            document: document.clone(),
        };
        let transport = document
            .get("transport")
            .and_then(Value::as_str)
            .unwrap_or(default_transport)
            .to_owned();

        let defaults = vec![kind.default_transport_params()];
        let constraints = defaults
            .iter()
            .map(|leg| constraints_for(kind, leg, advertised_host))
            .collect();

        Ok(Self {
            id,
            kind,
            descriptor,
            staged: ParameterSet::unbound(kind, defaults.clone()),
            active: ParameterSet::unbound(kind, defaults),
            constraints,
            transport,
        })
    }

    pub fn master_enable(&self) -> bool {
        self.active.master_enable
    }
}

fn constraints_for(kind: ResourceKind, leg: &TransportLeg, advertised_host: &str) -> TransportLeg {
    leg.keys()
        .map(|key| {
            let constraint = if kind == ResourceKind::Sender && key == "source_ip" {
                json!({ "enum": [advertised_host] })
            } else {
                json!({})
            };
            (key.clone(), constraint)
        })
        .collect()
}

/// Peer part of a staged PATCH; present when the body names the peer field.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub peer_id: Option<String>,
    pub master_enable: Option<bool>,
}

impl Binding {
    /// A binding to nobody, or an explicit `master_enable: false`, releases
    /// rather than binds.
    pub fn releases(&self) -> bool {
        self.peer_id.is_none() || self.master_enable == Some(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivationRequest {
    pub mode: Option<String>,
    pub requested_time: Option<String>,
}

impl ActivationRequest {
    pub fn is_immediate(&self) -> bool {
        self.mode.as_deref() == Some(ACTIVATE_IMMEDIATE)
    }
}

/// Decoded body of `PATCH .../staged`.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedPatch {
    pub binding: Option<Binding>,
    pub activation: Option<ActivationRequest>,
    pub transport_params: Option<Vec<TransportLeg>>,
    pub transport_file: Option<TransportFile>,
}

impl StagedPatch {
    /// Decode a PATCH body, keeping the distinction between an absent peer field
    /// and an explicit `null`.
    pub fn parse(kind: ResourceKind, body: &Value) -> Result<Self, ConnectionError> {
        let object = body
            .as_object()
            .ok_or_else(|| invalid("PATCH body must be a JSON object"))?;

        let master_enable = match object.get("master_enable") {
            None | Some(Value::Null) => None,
            Some(Value::Bool(flag)) => Some(*flag),
            Some(_) => return Err(invalid("master_enable must be a boolean")),
        };

        let binding = match object.get(kind.peer_field()) {
            None => None,
            Some(Value::Null) => Some(Binding {
                peer_id: None,
                master_enable,
            }),
            Some(Value::String(id)) => Some(Binding {
                peer_id: Some(id.clone()),
                master_enable,
            }),
            Some(_) => {
                return Err(invalid(&format!(
                    "{} must be a string or null",
                    kind.peer_field()
                )))
            }
        };

        let activation = match object.get("activation") {
            None | Some(Value::Null) => None,
            Some(Value::Object(block)) => {
                let mode = match block.get("mode") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(mode)) => Some(mode.clone()),
                    Some(_) => return Err(invalid("activation.mode must be a string or null")),
                };
                let requested_time = block
                    .get("requested_time")
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                Some(ActivationRequest {
                    mode,
                    requested_time,
                })
            }
            Some(_) => return Err(invalid("activation must be an object")),
        };

        let transport_params = match object.get("transport_params") {
            None | Some(Value::Null) => None,
            Some(Value::Array(legs)) => Some(
                legs.iter()
                    .map(|leg| {
                        leg.as_object()
                            .cloned()
                            .ok_or_else(|| invalid("transport_params entries must be objects"))
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Some(_) => return Err(invalid("transport_params must be an array")),
        };

        let transport_file = match object.get("transport_file") {
            None | Some(Value::Null) => None,
            Some(file) => Some(
                serde_json::from_value::<TransportFile>(file.clone())
                    .map_err(|err| invalid(&format!("transport_file: {err}")))?,
            ),
        };

        Ok(Self {
            binding,
            activation,
            transport_params,
            transport_file,
        })
    }
}

fn invalid(message: &str) -> ConnectionError {
    ConnectionError::InvalidRequest(message.to_owned())
}
