//! Domain-level observed/desired state the pipeline runner threads through
//! each function call, plus the result/requirement side channels (spec.md
//! §4.E, §6 "Function RPC"). These are the Rust-native shapes the reconciler
//! works with; [`crate::proto`] only comes into play at the RPC boundary.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::error::{FunctionError, Result};
use crate::proto::{self, generated};

/// A single observed composed resource: its manifest, any connection details
/// already known for it, and whether the engine considers it ready.
#[derive(Debug, Clone, Default)]
pub struct ObservedResource {
    pub resource: Json,
    pub connection_details: HashMap<String, Vec<u8>>,
    pub ready: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ObservedState {
    pub composite: ObservedResource,
    /// Keyed by `compositionResourceName`, insertion-ordered so repeated
    /// iterations of the same pipeline produce a stable request shape.
    pub resources: IndexMap<String, ObservedResource>,
}

/// A desired composed resource as built up across pipeline steps. Unlike
/// [`ObservedResource`] this also carries an explicit `ready` override a
/// function may set to report readiness out of band from the object itself.
#[derive(Debug, Clone, Default)]
pub struct DesiredResource {
    pub resource: Json,
    pub connection_details: HashMap<String, Vec<u8>>,
    pub ready: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DesiredState {
    pub composite: DesiredResource,
    pub resources: IndexMap<String, DesiredResource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Unspecified,
    Normal,
    Warning,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Unspecified,
    Composite,
    CompositeAndClaim,
}

#[derive(Debug, Clone)]
pub struct FunctionResult {
    pub severity: Severity,
    pub message: String,
    pub target: Target,
}

#[derive(Debug, Clone)]
pub enum ResourceMatch {
    Name(String),
    Labels(std::collections::BTreeMap<String, String>),
}

#[derive(Debug, Clone)]
pub struct ResourceSelector {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub matcher: ResourceMatch,
}

#[derive(Debug, Clone, Default)]
pub struct Requirements {
    pub resources: IndexMap<String, ResourceSelector>,
}

impl ObservedState {
    pub(crate) fn to_proto(&self) -> generated::State {
        generated::State {
            composite: Some(self.composite.to_proto()),
            resources: self
                .resources
                .iter()
                .map(|(name, r)| (name.clone(), r.to_proto()))
                .collect(),
        }
    }
}

impl ObservedResource {
    fn to_proto(&self) -> generated::Resource {
        generated::Resource {
            resource: proto::json_to_struct(&self.resource).ok(),
            connection_details: self.connection_details.clone(),
            ready: self.ready,
        }
    }
}

impl DesiredState {
    pub(crate) fn to_proto(&self) -> generated::State {
        generated::State {
            composite: Some(self.composite.to_proto()),
            resources: self
                .resources
                .iter()
                .map(|(name, r)| (name.clone(), r.to_proto()))
                .collect(),
        }
    }

    pub(crate) fn from_proto(state: &generated::State) -> Result<Self> {
        let composite = match &state.composite {
            Some(r) => DesiredResource::from_proto(r)?,
            None => DesiredResource::default(),
        };
        let mut resources = IndexMap::with_capacity(state.resources.len());
        for (name, r) in &state.resources {
            resources.insert(name.clone(), DesiredResource::from_proto(r)?);
        }
        Ok(Self { composite, resources })
    }
}

impl DesiredResource {
    fn to_proto(&self) -> generated::Resource {
        generated::Resource {
            resource: proto::json_to_struct(&self.resource).ok(),
            connection_details: self.connection_details.clone(),
            ready: self.ready,
        }
    }

    fn from_proto(r: &generated::Resource) -> Result<Self> {
        Ok(Self {
            resource: r.resource.as_ref().map(proto::struct_to_json).unwrap_or(Json::Null),
            connection_details: r.connection_details.clone(),
            ready: r.ready,
        })
    }
}

impl FunctionResult {
    fn from_proto(r: &generated::Result) -> Self {
        Self {
            severity: Severity::from_proto(r.severity),
            message: r.message.clone(),
            target: Target::from_proto(r.target),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl Severity {
    fn from_proto(raw: i32) -> Self {
        match generated::Severity::try_from(raw).unwrap_or(generated::Severity::Unspecified) {
            generated::Severity::Unspecified => Severity::Unspecified,
            generated::Severity::Normal => Severity::Normal,
            generated::Severity::Warning => Severity::Warning,
            generated::Severity::Fatal => Severity::Fatal,
        }
    }
}

impl Target {
    fn from_proto(raw: i32) -> Self {
        match generated::Target::try_from(raw).unwrap_or(generated::Target::Unspecified) {
            generated::Target::Unspecified => Target::Unspecified,
            generated::Target::Composite => Target::Composite,
            generated::Target::CompositeAndClaim => Target::CompositeAndClaim,
        }
    }
}

impl Requirements {
    pub(crate) fn from_proto(r: &generated::Requirements) -> Result<Self> {
        let mut resources = IndexMap::with_capacity(r.resources.len());
        for (name, selector) in &r.resources {
            resources.insert(name.clone(), ResourceSelector::from_proto(selector)?);
        }
        Ok(Self { resources })
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ResourceSelector {
    fn from_proto(s: &generated::ResourceSelector) -> Result<Self> {
        let matcher = match &s.r#match {
            Some(generated::resource_selector::Match::MatchName(name)) => ResourceMatch::Name(name.clone()),
            Some(generated::resource_selector::Match::MatchLabels(labels)) => {
                ResourceMatch::Labels(labels.labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            }
            None => {
                return Err(FunctionError::InvalidDocument(
                    "resource selector has neither matchName nor matchLabels".to_string(),
                ));
            }
        };
        Ok(Self {
            api_version: s.api_version.clone(),
            kind: s.kind.clone(),
            namespace: (!s.namespace.is_empty()).then(|| s.namespace.clone()),
            matcher,
        })
    }
}

/// The decoded pieces of a `RunFunctionResponse` the runner cares about.
pub(crate) struct DecodedResponse {
    pub desired: DesiredState,
    pub results: Vec<FunctionResult>,
    pub context: Json,
    pub requirements: Requirements,
}

pub(crate) fn decode_response(resp: generated::RunFunctionResponse) -> Result<DecodedResponse> {
    let desired = match &resp.desired {
        Some(s) => DesiredState::from_proto(s)?,
        None => DesiredState::default(),
    };
    let results = resp.results.iter().map(FunctionResult::from_proto).collect();
    let context = resp.context.as_ref().map(proto::struct_to_json).unwrap_or(Json::Null);
    let requirements = match &resp.requirements {
        Some(r) => Requirements::from_proto(r)?,
        None => Requirements::default(),
    };
    Ok(DecodedResponse { desired, results, context, requirements })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn observed_state_round_trips_through_proto() {
        let mut state = ObservedState::default();
        state.composite.resource = json!({"spec": {"size": 3}});
        state.resources.insert(
            "bucket".to_string(),
            ObservedResource { resource: json!({"status": {"ready": true}}), connection_details: HashMap::new(), ready: true },
        );
        let proto_state = state.to_proto();
        assert_eq!(proto_state.resources.len(), 1);
        assert!(proto_state.resources["bucket"].ready);
    }

    #[test]
    fn severity_maps_fatal_correctly() {
        assert_eq!(Severity::from_proto(3), Severity::Fatal);
        assert_eq!(Severity::from_proto(99), Severity::Unspecified);
    }
}
