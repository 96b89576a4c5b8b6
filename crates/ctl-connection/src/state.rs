//! ---
//! ctl_section: "03-connection-emulator"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Staging and activation state machine for a single resource."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use crate::error::{ConnectionError, Result};
use crate::model::{
    Activation, ActivationMode, ConnectionResource, ParameterSet, ResourceKind, StagedPatch,
    TransportFile, TransportLeg,
};

/// Transition performed by a staged PATCH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Binding copied into `staged`; `active` untouched.
    Staged { peer_id: String },
    /// Staged binding dropped without activation.
    StagedReleased,
    /// Binding written straight into `active`.
    BoundAndActivated { peer_id: String },
    /// Staged binding promoted to `active`; `staged` reset.
    ActivatedFromStaged { peer_id: String },
    /// Active binding cleared.
    Deactivated { previous_peer: Option<String> },
}

impl Transition {
    /// Whether the active parameter set changed, which is what the resource store
    /// must hear about.
    pub fn changes_active(&self) -> bool {
        !matches!(self, Transition::Staged { .. } | Transition::StagedReleased)
    }
}

impl ConnectionResource {
    fn unsupported(&self, reason: impl Into<String>) -> ConnectionError {
        ConnectionError::UnsupportedTransition {
            kind: self.kind,
            id: self.id.clone(),
            reason: reason.into(),
        }
    }

    fn default_legs(&self) -> Vec<TransportLeg> {
        vec![self.kind.default_transport_params(); self.constraints.len().max(1)]
    }

    /// Apply a staged PATCH. Nothing is modified when an error is returned.
    pub fn apply_patch(&mut self, patch: &StagedPatch, activation_time: &str) -> Result<Transition> {
        let activate = match &patch.activation {
            None => false,
            Some(request) if request.mode.is_none() => false,
            Some(request) if request.is_immediate() => true,
            Some(request) => {
                let mode = request.mode.as_deref().unwrap_or_default();
                let scheduled = serde_json::from_value::<ActivationMode>(mode.into()).is_ok();
                return Err(if scheduled {
                    self.unsupported(format!("scheduled activation '{mode}' is not emulated"))
                } else {
                    self.unsupported(format!("unrecognised activation mode '{mode}'"))
                });
            }
        };

        match (&patch.binding, activate) {
            (Some(binding), false) if binding.releases() => {
                let params = merge_legs(&self.staged.transport_params, patch)?;
                self.staged = ParameterSet::unbound(self.kind, params);
                Ok(Transition::StagedReleased)
            }
            (Some(binding), false) => {
                let peer_id = binding.peer_id.clone().unwrap_or_default();
                let params = merge_legs(&self.staged.transport_params, patch)?;
                let transport_file = self.merged_file(&self.staged, patch);
                self.staged = ParameterSet {
                    peer_id: Some(peer_id.clone()),
                    master_enable: true,
                    activation: Activation::default(),
                    transport_file,
                    transport_params: params,
                };
                Ok(Transition::Staged { peer_id })
            }
            (Some(binding), true) if binding.releases() && !self.active.is_bound() => Err(
                self.unsupported("deactivation requested but nothing is active"),
            ),
            (Some(binding), true) if binding.releases() => {
                let previous_peer = self.deactivate(activation_time);
                self.staged = ParameterSet::unbound(self.kind, self.default_legs());
                Ok(Transition::Deactivated { previous_peer })
            }
            (Some(binding), true) => {
                let peer_id = binding.peer_id.clone().unwrap_or_default();
                let params = merge_legs(&self.active.transport_params, patch)?;
                let transport_file = self.merged_file(&self.active, patch);
                self.active = ParameterSet {
                    peer_id: Some(peer_id.clone()),
                    master_enable: true,
                    activation: Activation::immediate(activation_time.to_owned()),
                    transport_file,
                    transport_params: params,
                };
                Ok(Transition::BoundAndActivated { peer_id })
            }
            (None, true) if self.staged.is_bound() => {
                let params = merge_legs(&self.staged.transport_params, patch)?;
                let mut promoted = self.staged.clone();
                promoted.transport_params = params;
                promoted.activation = Activation::immediate(activation_time.to_owned());
                let peer_id = promoted.peer_id.clone().unwrap_or_default();
                self.active = promoted;
                self.staged = ParameterSet::unbound(self.kind, self.default_legs());
                Ok(Transition::ActivatedFromStaged { peer_id })
            }
            (None, true) if self.active.is_bound() => {
                let previous_peer = self.deactivate(activation_time);
                Ok(Transition::Deactivated { previous_peer })
            }
            (None, true) => Err(self.unsupported(
                "activation requested but neither staged nor active is bound",
            )),
            (None, false) => Err(self.unsupported(
                "PATCH carries neither a binding nor an immediate activation",
            )),
        }
    }

    fn deactivate(&mut self, activation_time: &str) -> Option<String> {
        let previous = self.active.peer_id.take();
        self.active.master_enable = false;
        self.active.activation = Activation::immediate(activation_time.to_owned());
        previous
    }

    fn merged_file(&self, base: &ParameterSet, patch: &StagedPatch) -> Option<TransportFile> {
        match self.kind {
            ResourceKind::Sender => None,
            ResourceKind::Receiver => patch
                .transport_file
                .clone()
                .or_else(|| base.transport_file.clone()),
        }
    }
}

fn merge_legs(current: &[TransportLeg], patch: &StagedPatch) -> Result<Vec<TransportLeg>> {
    let Some(updates) = &patch.transport_params else {
        return Ok(current.to_vec());
    };
    if updates.len() > current.len() {
        return Err(ConnectionError::InvalidRequest(format!(
            "{} transport legs supplied but the resource has {}",
            updates.len(),
            current.len()
        )));
    }
    let mut merged = current.to_vec();
    for (leg, update) in merged.iter_mut().zip(updates) {
        for (key, value) in update {
            leg.insert(key.clone(), value.clone());
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResourceKind, StagedPatch};
    use serde_json::{json, Value};

    const NOW: &str = "1700000000:0";

    fn receiver() -> ConnectionResource {
        ConnectionResource::from_document(
            ResourceKind::Receiver,
            json!({"id": "r1", "label": "Test-node-2/receiver/palin", "description": "Mock receiver 1"}),
            "127.0.0.1",
            "urn:x-nmos:transport:rtp.mcast",
        )
        .unwrap()
    }

    fn patch(resource: &mut ConnectionResource, body: Value) -> Result<Transition> {
        let patch = StagedPatch::parse(resource.kind, &body)?;
        resource.apply_patch(&patch, NOW)
    }

    fn stage_body() -> Value {
        json!({
            "sender_id": "s1",
            "master_enable": true,
            "transport_params": [{"multicast_ip": "239.3.14.1", "source_ip": "10.0.0.9"}]
        })
    }

    #[test]
    fn staging_leaves_active_untouched() {
        let mut resource = receiver();
        let before = resource.active.clone();

        let transition = patch(&mut resource, stage_body()).unwrap();

        assert_eq!(transition, Transition::Staged { peer_id: "s1".into() });
        assert!(!transition.changes_active());
        assert!(resource.staged.master_enable);
        assert_eq!(resource.staged.peer_id.as_deref(), Some("s1"));
        assert_eq!(resource.staged.transport_params[0]["multicast_ip"], "239.3.14.1");
        assert_eq!(resource.staged.transport_params[0]["source_ip"], "10.0.0.9");
        assert_eq!(resource.active, before);
    }

    #[test]
    fn activation_promotes_staged_and_resets_it() {
        let mut resource = receiver();
        patch(&mut resource, stage_body()).unwrap();
        let staged = resource.staged.clone();

        let transition = patch(
            &mut resource,
            json!({"activation": {"mode": "activate_immediate"}}),
        )
        .unwrap();

        assert_eq!(
            transition,
            Transition::ActivatedFromStaged { peer_id: "s1".into() }
        );
        assert!(transition.changes_active());
        assert_eq!(resource.active.peer_id, staged.peer_id);
        assert_eq!(resource.active.transport_params, staged.transport_params);
        assert!(resource.active.master_enable);
        assert_eq!(resource.active.activation.activation_time.as_deref(), Some(NOW));
        assert_eq!(
            resource.staged,
            ParameterSet::unbound(ResourceKind::Receiver, resource.default_legs())
        );
    }

    #[test]
    fn binding_with_activation_skips_staging() {
        let mut resource = receiver();
        let mut body = stage_body();
        body["activation"] = json!({"mode": "activate_immediate", "requested_time": null});

        let transition = patch(&mut resource, body).unwrap();

        assert_eq!(
            transition,
            Transition::BoundAndActivated { peer_id: "s1".into() }
        );
        assert!(resource.active.is_bound());
        assert!(!resource.staged.master_enable);
    }

    #[test]
    fn null_mode_only_stages() {
        let mut resource = receiver();
        let mut body = stage_body();
        body["activation"] = json!({"mode": null, "requested_time": null});
        let transition = patch(&mut resource, body).unwrap();
        assert_eq!(transition, Transition::Staged { peer_id: "s1".into() });
        assert!(!resource.active.master_enable);
    }

    #[test]
    fn activation_deactivates_when_only_active_is_bound() {
        let mut resource = receiver();
        let mut body = stage_body();
        body["activation"] = json!({"mode": "activate_immediate"});
        patch(&mut resource, body).unwrap();

        let transition = patch(
            &mut resource,
            json!({"master_enable": false, "activation": {"mode": "activate_immediate"}}),
        )
        .unwrap();

        assert_eq!(
            transition,
            Transition::Deactivated {
                previous_peer: Some("s1".into())
            }
        );
        assert!(!resource.active.master_enable);
        assert!(resource.active.peer_id.is_none());
    }

    #[test]
    fn deactivating_unbound_resource_is_rejected() {
        let mut resource = receiver();
        let before = resource.clone();

        let err = patch(
            &mut resource,
            json!({"activation": {"mode": "activate_immediate"}}),
        )
        .unwrap_err();
        assert!(matches!(err, ConnectionError::UnsupportedTransition { .. }));

        let err = patch(
            &mut resource,
            json!({"sender_id": null, "activation": {"mode": "activate_immediate"}}),
        )
        .unwrap_err();
        assert!(matches!(err, ConnectionError::UnsupportedTransition { .. }));
        assert_eq!(resource, before);
    }

    #[test]
    fn unknown_and_scheduled_modes_are_rejected() {
        let mut resource = receiver();
        patch(&mut resource, stage_body()).unwrap();
        let before = resource.clone();

        for mode in ["activate_later", "activate_scheduled_absolute"] {
            let err = patch(
                &mut resource,
                json!({"activation": {"mode": mode, "requested_time": "1700000100:0"}}),
            )
            .unwrap_err();
            match err {
                ConnectionError::UnsupportedTransition { reason, .. } => {
                    assert!(reason.contains(mode), "{reason}")
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
        assert_eq!(resource, before);
    }

    #[test]
    fn empty_patch_is_rejected() {
        let mut resource = receiver();
        let err = patch(&mut resource, json!({})).unwrap_err();
        assert!(matches!(err, ConnectionError::UnsupportedTransition { .. }));
    }

    #[test]
    fn release_clears_staged_binding() {
        let mut resource = receiver();
        patch(&mut resource, stage_body()).unwrap();
        let transition = patch(&mut resource, json!({"sender_id": null})).unwrap();
        assert_eq!(transition, Transition::StagedReleased);
        assert!(!resource.staged.master_enable);
        assert!(resource.staged.peer_id.is_none());
    }

    #[test]
    fn extra_transport_legs_are_invalid() {
        let mut resource = receiver();
        let err = patch(
            &mut resource,
            json!({"sender_id": "s1", "transport_params": [{}, {}]}),
        )
        .unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidRequest(_)));
        assert!(!resource.staged.master_enable);
    }

    #[test]
    fn sender_binds_receiver_id() {
        let mut sender = ConnectionResource::from_document(
            ResourceKind::Sender,
            json!({"id": "s1"}),
            "127.0.0.1",
            "urn:x-nmos:transport:rtp.mcast",
        )
        .unwrap();
        let transition = patch(
            &mut sender,
            json!({"receiver_id": "r9", "activation": {"mode": "activate_immediate"}}),
        )
        .unwrap();
        assert_eq!(
            transition,
            Transition::BoundAndActivated { peer_id: "r9".into() }
        );
        assert!(sender.active.transport_file.is_none());
    }
}
