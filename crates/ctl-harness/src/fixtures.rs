//! ---
//! ctl_section: "06-test-driver"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Mock senders and receivers offered to the controller."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use ctl_connection::ResourceKind;
use ctl_facade::AnswerOption;
use rand::seq::index;
use rand::Rng;
use serde_json::{json, Value};

const SENDERS: [(&str, &str); 5] = [
    ("Test-node-1/sender/gilmour", "Mock sender 1"),
    ("Test-node-1/sender/waters", "Mock sender 2"),
    ("Test-node-1/sender/mason", "Mock sender 3"),
    ("Test-node-1/sender/wright", "Mock sender 4"),
    ("Test-node-1/sender/barrett", "Mock sender 5"),
];

const RECEIVERS: [(&str, &str); 6] = [
    ("Test-node-2/receiver/palin", "Mock receiver 1"),
    ("Test-node-2/receiver/cleese", "Mock receiver 2"),
    ("Test-node-2/receiver/jones", "Mock receiver 3"),
    ("Test-node-2/receiver/chapman", "Mock receiver 4"),
    ("Test-node-2/receiver/idle", "Mock receiver 5"),
    ("Test-node-2/receiver/gilliam", "Mock receiver 6"),
];

/// Smallest and largest number of resources of each kind registered per run.
const REGISTERED_RANGE: (usize, usize) = (2, 4);

const STREAMS: [&str; 3] = ["video", "audio", "data"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureResource {
    pub kind: ResourceKind,
    pub label: String,
    pub description: String,
    pub id: String,
    pub registered: bool,
}

impl FixtureResource {
    /// Operator-facing identification, `label (description, id)`.
    pub fn answer_str(&self) -> String {
        format!("{} ({}, {})", self.label, self.description, self.id)
    }
}

/// Where the mock node is reachable; baked into registered documents.
#[derive(Debug, Clone)]
pub struct NodeEndpoint {
    pub base_url: String,
    pub host: String,
    pub port: u16,
    pub connection_version: String,
    pub transport: String,
}

#[derive(Debug, Clone, Default)]
pub struct Fixtures {
    pub node_id: String,
    pub device_id: String,
    pub senders: Vec<FixtureResource>,
    pub receivers: Vec<FixtureResource>,
}

fn random_id(rng: &mut impl Rng) -> String {
    uuid::Builder::from_random_bytes(rng.gen())
        .into_uuid()
        .to_string()
}

fn pick(
    rng: &mut impl Rng,
    kind: ResourceKind,
    catalogue: &[(&str, &str)],
) -> Vec<FixtureResource> {
    let mut resources: Vec<FixtureResource> = catalogue
        .iter()
        .map(|(label, description)| FixtureResource {
            kind,
            label: (*label).to_owned(),
            description: (*description).to_owned(),
            id: random_id(rng),
            registered: false,
        })
        .collect();
    let (min, max) = REGISTERED_RANGE;
    let count = rng.gen_range(min..=max.min(resources.len()));
    for position in index::sample(rng, resources.len(), count) {
        resources[position].registered = true;
    }
    resources
}

impl Fixtures {
    /// Fresh ids for every catalogue entry and a random subset marked as
    /// registered.
    pub fn generate(rng: &mut impl Rng) -> Self {
        Self {
            node_id: random_id(rng),
            device_id: random_id(rng),
            senders: pick(rng, ResourceKind::Sender, &SENDERS),
            receivers: pick(rng, ResourceKind::Receiver, &RECEIVERS),
        }
    }

    pub fn all(&self, kind: ResourceKind) -> &[FixtureResource] {
        match kind {
            ResourceKind::Sender => &self.senders,
            ResourceKind::Receiver => &self.receivers,
        }
    }

    pub fn registered(&self, kind: ResourceKind) -> Vec<&FixtureResource> {
        self.all(kind).iter().filter(|r| r.registered).collect()
    }

    pub fn find(&self, kind: ResourceKind, id: &str) -> Option<&FixtureResource> {
        self.all(kind).iter().find(|r| r.id == id)
    }

    /// Every catalogue entry of `kind` as an answer option, `answer_<n>` in
    /// catalogue order.
    pub fn answer_options(&self, kind: ResourceKind) -> Vec<AnswerOption> {
        self.all(kind)
            .iter()
            .enumerate()
            .map(|(n, resource)| option(n, resource))
            .collect()
    }

    /// Answer options restricted to registered resources; ids keep their
    /// catalogue numbering.
    pub fn registered_options(&self, kind: ResourceKind) -> Vec<AnswerOption> {
        self.all(kind)
            .iter()
            .enumerate()
            .filter(|(_, resource)| resource.registered)
            .map(|(n, resource)| option(n, resource))
            .collect()
    }

    /// `answer_<n>` for the resource with `id`.
    pub fn answer_id(&self, kind: ResourceKind, id: &str) -> Option<String> {
        self.all(kind)
            .iter()
            .position(|r| r.id == id)
            .map(|n| format!("answer_{n}"))
    }

    pub fn node_document(&self, node: &NodeEndpoint) -> Value {
        json!({
            "id": self.node_id,
            "version": "0:0",
            "label": "Test-node",
            "description": "Mock node for controller testing",
            "tags": {},
            "href": node.base_url,
            "hostname": node.host,
            "api": {
                "versions": ["v1.3"],
                "endpoints": [{"host": node.host, "port": node.port, "protocol": "http"}]
            },
            "caps": {},
            "services": [],
            "clocks": [],
            "interfaces": []
        })
    }

    pub fn device_document(&self, node: &NodeEndpoint) -> Value {
        let ids = |kind| {
            self.registered(kind)
                .iter()
                .map(|r| r.id.clone())
                .collect::<Vec<_>>()
        };
        json!({
            "id": self.device_id,
            "version": "0:0",
            "label": "Test-device",
            "description": "Mock device for controller testing",
            "tags": {},
            "type": "urn:x-nmos:device:generic",
            "node_id": self.node_id,
            "senders": ids(ResourceKind::Sender),
            "receivers": ids(ResourceKind::Receiver),
            "controls": [{
                "type": format!("urn:x-nmos:control:sr-ctrl/{}", node.connection_version),
                "href": format!("{}/x-nmos/connection/{}/", node.base_url, node.connection_version)
            }]
        })
    }

    /// Registry document for a sender or receiver, subscription inactive.
    pub fn resource_document(&self, resource: &FixtureResource, node: &NodeEndpoint) -> Value {
        match resource.kind {
            ResourceKind::Sender => {
                let position = self
                    .senders
                    .iter()
                    .position(|s| s.id == resource.id)
                    .unwrap_or_default();
                let stream = STREAMS[position % STREAMS.len()];
                json!({
                    "id": resource.id,
                    "version": "0:0",
                    "label": resource.label,
                    "description": resource.description,
                    "tags": {},
                    "flow_id": null,
                    "transport": node.transport,
                    "device_id": self.device_id,
                    "manifest_href": format!("{}/{stream}.sdp", node.base_url),
                    "interface_bindings": [],
                    "subscription": {"receiver_id": null, "active": false}
                })
            }
            ResourceKind::Receiver => json!({
                "id": resource.id,
                "version": "0:0",
                "label": resource.label,
                "description": resource.description,
                "tags": {},
                "format": "urn:x-nmos:format:video",
                "caps": {"media_types": ["video/raw"]},
                "device_id": self.device_id,
                "transport": node.transport,
                "interface_bindings": [],
                "subscription": {"sender_id": null, "active": false}
            }),
        }
    }
}

fn option(n: usize, resource: &FixtureResource) -> AnswerOption {
    AnswerOption {
        answer_id: format!("answer_{n}"),
        label: resource.label.clone(),
        description: resource.description.clone(),
        resource_id: Some(resource.id.clone()),
        answer_str: Some(resource.answer_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    fn endpoint() -> NodeEndpoint {
        NodeEndpoint {
            base_url: "http://10.0.0.1:5201".into(),
            host: "10.0.0.1".into(),
            port: 5201,
            connection_version: "v1.1".into(),
            transport: "urn:x-nmos:transport:rtp.mcast".into(),
        }
    }

    #[test]
    fn same_seed_same_fixtures() {
        let a = Fixtures::generate(&mut StdRng::seed_from_u64(7));
        let b = Fixtures::generate(&mut StdRng::seed_from_u64(7));
        assert_eq!(a.receivers, b.receivers);
        assert_eq!(a.node_id, b.node_id);
        assert!(Uuid::parse_str(&a.device_id).is_ok());
    }

    #[test]
    fn registers_between_two_and_four_of_each_kind() {
        for seed in 0..32 {
            let fixtures = Fixtures::generate(&mut StdRng::seed_from_u64(seed));
            for kind in [ResourceKind::Sender, ResourceKind::Receiver] {
                let count = fixtures.registered(kind).len();
                assert!((2..=4).contains(&count), "seed {seed}: {count}");
            }
        }
    }

    #[test]
    fn answer_strings_and_options() {
        let fixtures = Fixtures::generate(&mut StdRng::seed_from_u64(1));
        let first = &fixtures.receivers[0];
        assert_eq!(
            first.answer_str(),
            format!("Test-node-2/receiver/palin (Mock receiver 1, {})", first.id)
        );
        let options = fixtures.answer_options(ResourceKind::Receiver);
        assert_eq!(options.len(), 6);
        assert_eq!(options[3].answer_id, "answer_3");
        assert_eq!(
            fixtures.answer_id(ResourceKind::Receiver, &fixtures.receivers[3].id),
            Some("answer_3".into())
        );
        assert_eq!(
            fixtures.registered_options(ResourceKind::Sender).len(),
            fixtures.registered(ResourceKind::Sender).len()
        );
    }

    #[test]
    fn documents_link_device_and_manifest() {
        let fixtures = Fixtures::generate(&mut StdRng::seed_from_u64(3));
        let node = endpoint();
        let sender = fixtures.resource_document(&fixtures.senders[1], &node);
        assert_eq!(sender["device_id"], fixtures.device_id.as_str());
        assert_eq!(sender["manifest_href"], "http://10.0.0.1:5201/audio.sdp");
        let receiver = fixtures.resource_document(&fixtures.receivers[0], &node);
        assert_eq!(receiver["subscription"]["active"], false);
        let device = fixtures.device_document(&node);
        assert_eq!(
            device["controls"][0]["href"],
            "http://10.0.0.1:5201/x-nmos/connection/v1.1/"
        );
    }
}
