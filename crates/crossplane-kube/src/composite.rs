//! Composite Reconciler (spec.md §4.F).
//!
//! The central control loop for one XR kind: selects a Composition
//! Revision, assembles the Environment, gathers observed composed
//! resources, renders desired state (Resources mode via the patch/transform
//! DSL, Pipeline mode via the function runner), applies it under
//! owner-conflict refusal, aggregates readiness, publishes connection
//! details, and garbage collects whatever fell out of the desired set.

use std::collections::{BTreeMap, HashMap};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use indexmap::IndexMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectReference;
use kube::core::DynamicObject;
use kube::ResourceExt;
use serde_json::{json, Value as Json};

use crossplane_core::composed::ComposedResource;
use crossplane_core::composition::{CompositionMode, ConnectionDetailSpec};
use crossplane_core::condition::{reasons, types, Condition, ConditionStatus};
use crossplane_core::connection::ConnectionDetailExtractor;
use crossplane_core::environment::Environment;
use crossplane_core::revision::CompositionRevisionSpec;
use crossplane_core::xr::{CompositeResource, EnvironmentConfigRef, EnvironmentConfigSelectorMode, LocalObjectReference, StandardXrSpec, LABEL_NAME_PREFIX};
use crossplane_core::xrd::{CompositeResourceDefinitionSpec, CompositionUpdatePolicy};

use crossplane_functions::metrics::MetricsRegistry;
use crossplane_functions::runner::NoRequirements;
use crossplane_functions::{ObservedResource, ObservedState, PipelineRunner, RuntimeHandler};
use tokio_util::sync::CancellationToken;

use crate::error::{KubeError, Result};
use crate::gc;
use crate::revision as revision_manager;
use crate::store::{GroupVersionKindOwned, ObjectStore};

fn composition_gvk() -> GroupVersionKindOwned {
    GroupVersionKindOwned::new("apiextensions.crossplane.io", "v1", "Composition")
}

fn environment_config_gvk() -> GroupVersionKindOwned {
    GroupVersionKindOwned::new("apiextensions.crossplane.io", "v1alpha1", "EnvironmentConfig")
}

fn secret_gvk() -> GroupVersionKindOwned {
    GroupVersionKindOwned::new("", "v1", "Secret")
}

fn label_selector_string(match_labels: &std::collections::BTreeMap<String, String>) -> String {
    match_labels.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",")
}

fn object_gvk(doc: &Json) -> Option<GroupVersionKindOwned> {
    let api_version = doc.get("apiVersion")?.as_str()?;
    let kind = doc.get("kind")?.as_str()?;
    Some(GroupVersionKindOwned::from_api_version(api_version, kind))
}

fn json_scalar_to_bytes(value: &Json) -> Vec<u8> {
    match value {
        Json::String(s) => s.clone().into_bytes(),
        other => other.to_string().into_bytes(),
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub composition_name: String,
    pub revision_name: String,
    pub ready: bool,
    pub garbage_collected: usize,
    /// Composed resources whose render was isolated as a per-resource
    /// failure (spec.md §7) rather than aborting the whole reconcile.
    pub render_errors: usize,
}

struct TemplateOutcome {
    reference: ObjectReference,
    ready: bool,
    connection_details: HashMap<String, Vec<u8>>,
}

struct RenderOutput {
    current_refs: Vec<ObjectReference>,
    connection_details: HashMap<String, Vec<u8>>,
    ready: bool,
    /// Per-composed-resource errors (spec.md §7: "errors from rendering a
    /// single composed resource are isolated — other resources continue").
    /// Empty for Pipeline mode, where a failure is terminal for the whole
    /// render instead.
    errors: Vec<(String, KubeError)>,
}

/// Reconciles one kind of Composite Resource, as determined by `xrd`.
pub struct CompositeReconciler<'a> {
    store: &'a ObjectStore,
    xrd: &'a CompositeResourceDefinitionSpec,
    runtime: Option<&'a dyn RuntimeHandler>,
    metrics: Option<&'a MetricsRegistry>,
    cancellation: Option<CancellationToken>,
}

impl<'a> CompositeReconciler<'a> {
    pub fn new(store: &'a ObjectStore, xrd: &'a CompositeResourceDefinitionSpec) -> Self {
        Self { store, xrd, runtime: None, metrics: None, cancellation: None }
    }

    /// Supplies the function runtime used to execute Pipeline-mode steps.
    /// Resources-mode compositions never need one.
    pub fn with_runtime(mut self, runtime: &'a dyn RuntimeHandler) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Supplies the process-wide function pipeline metrics registry
    /// (spec.md §4.E "Metrics: requests, responses, and duration are
    /// recorded per (function name, package, target, gRPC code, max
    /// severity)").
    pub fn with_metrics(mut self, metrics: &'a MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Supplies the per-reconcile cancellation token (spec.md §5: "every
    /// suspension respects a per-reconcile deadline... propagated via a
    /// cancellation token"). Cancelling it aborts an in-flight pipeline
    /// step without applying partial desired state.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    fn xr_gvk(&self) -> Result<GroupVersionKindOwned> {
        let version = self.xrd.referenceable_version()?;
        Ok(GroupVersionKindOwned::new(self.xrd.group.clone(), version.name.clone(), self.xrd.names.kind.clone()))
    }

    /// Runs one full reconcile of the named XR, per the eleven-step
    /// algorithm in spec.md §4.F.
    pub async fn reconcile(&self, name: &str, namespace: Option<&str>) -> Result<ReconcileOutcome> {
        let gvk = self.xr_gvk()?;
        let object = self
            .store
            .get(&gvk, namespace, name)
            .await?
            .ok_or_else(|| KubeError::not_found(self.xrd.names.kind.clone(), name))?;
        let mut xr = CompositeResource::new(object);

        let mut spec = xr.standard_spec();
        if spec.write_connection_secret_to_ref.is_none() {
            if let (Some(secret_name), Some(secret_namespace)) = (xr.default_connection_secret_name(), xr.namespace()) {
                spec.write_connection_secret_to_ref =
                    Some(crossplane_core::xr::SecretReference { name: secret_name, namespace: secret_namespace });
            }
        }

        let previous_refs = spec.resource_refs.clone();
        let observed = self.gather_observed(&previous_refs).await?;

        let (composition_name, revision) = self.select_revision(&mut spec).await?;
        let environment = self.assemble_environment(&spec, &revision).await?;

        let render = match revision.mode {
            CompositionMode::Resources => self.render_resources(&xr, &revision, &environment, &observed).await?,
            CompositionMode::Pipeline => self.render_pipeline(&xr, &revision, &observed).await?,
        };

        spec.resource_refs = render.current_refs.clone();
        spec.composition_update_policy = spec.composition_update_policy.or(Some(self.xrd.update_policy()));
        let revision_name = spec.composition_revision_ref.as_ref().map(|r| r.name.clone()).unwrap_or_default();
        xr.set_standard_spec(&spec);

        let secret_published = self.publish_connection_details(&xr, &spec, &render.connection_details).await?;

        let garbage_collected = gc::sweep(self.store, &previous_refs, &render.current_refs).await?;

        let mut status = xr.standard_status();
        status.conditions.set(if render.errors.is_empty() {
            Condition::new(types::SYNCED, ConditionStatus::True, reasons::REASON_SUCCESS)
        } else {
            Condition::new(types::SYNCED, ConditionStatus::False, reasons::REASON_ERROR).with_message(render_errors_message(&render.errors))
        });
        status.conditions.set(if render.ready {
            Condition::new(types::READY, ConditionStatus::True, reasons::REASON_SUCCESS)
        } else {
            Condition::new(types::READY, ConditionStatus::Unknown, reasons::COMPOSITE_RESOURCE_NOT_READY)
        });
        if secret_published {
            status.connection_details.last_published_time = Some(chrono::Utc::now());
        }
        xr.set_standard_status(&status);

        self.store.apply(&gvk, namespace, &xr.object).await?;

        let render_errors = render.errors.len();
        Ok(ReconcileOutcome { composition_name, revision_name, ready: render.ready, garbage_collected, render_errors })
    }

    /// Selects the Composition this XR uses (enforced > ref > selector >
    /// default), ensures its revision manager has run, then resolves the
    /// specific revision to render: the pinned one under `Manual`, falling
    /// back to `Automatic` selection if that revision has since been
    /// deleted (spec.md §9 Open Question 3), or the highest revision
    /// otherwise.
    async fn select_revision(&self, spec: &mut StandardXrSpec) -> Result<(String, CompositionRevisionSpec)> {
        let composition_name = self.resolve_composition_name(spec).await?;

        let composition_obj = self
            .store
            .get(&composition_gvk(), None, &composition_name)
            .await?
            .ok_or_else(|| KubeError::not_found("Composition", &composition_name))?;
        let composition_spec = serde_json::from_value(
            composition_obj.data.get("spec").cloned().unwrap_or(Json::Null),
        )?;
        let plan = revision_manager::reconcile(self.store, &composition_name, &composition_spec).await?;

        let update_policy = spec.composition_update_policy.unwrap_or_else(|| self.xrd.update_policy());
        let pinned_still_exists = match (update_policy, &spec.composition_revision_ref) {
            (CompositionUpdatePolicy::Manual, Some(pinned)) => {
                self.store.get(&crate::revision::revision_gvk(), None, &pinned.name).await?.is_some()
            }
            _ => false,
        };
        let revision_name = if pinned_still_exists {
            spec.composition_revision_ref.as_ref().unwrap().name.clone()
        } else {
            self.highest_revision_name(&composition_name).await.unwrap_or(plan.name)
        };

        spec.composition_revision_ref = Some(LocalObjectReference { name: revision_name.clone() });

        let revision_obj = self
            .store
            .get(&crate::revision::revision_gvk(), None, &revision_name)
            .await?
            .ok_or_else(|| KubeError::Transient {
                kind: "CompositionRevision".into(),
                name: revision_name.clone(),
                message: reasons::MISSING_REVISION.into(),
            })?;
        let revision_spec = serde_json::from_value(revision_obj.data.get("spec").cloned().unwrap_or(Json::Null))?;

        Ok((composition_name, revision_spec))
    }

    async fn highest_revision_name(&self, composition_name: &str) -> Result<String> {
        revision_manager::highest_revision(self.store, composition_name)
            .await?
            .map(|(name, _)| name)
            .ok_or_else(|| KubeError::Transient {
                kind: "CompositionRevision".into(),
                name: composition_name.to_string(),
                message: reasons::MISSING_REVISION.into(),
            })
    }

    async fn resolve_composition_name(&self, spec: &StandardXrSpec) -> Result<String> {
        if let Some(r) = &self.xrd.enforced_composition_ref {
            return Ok(r.name.clone());
        }
        if let Some(r) = &spec.composition_ref {
            return Ok(r.name.clone());
        }
        if let Some(selector) = &spec.composition_selector {
            let selector_str = label_selector_string(&selector.match_labels);
            let mut matches = self.store.list(&composition_gvk(), None, Some(&selector_str), None).await?;
            matches.sort_by_key(|o| o.name_any());
            let chosen = matches.into_iter().next().ok_or_else(|| KubeError::Invalid {
                kind: "Composition".into(),
                name: String::new(),
                message: "no Composition matches compositionSelector".into(),
            })?;
            return Ok(chosen.name_any());
        }
        if let Some(r) = &self.xrd.default_composition_ref {
            return Ok(r.name.clone());
        }
        Err(KubeError::Invalid {
            kind: "Composition".into(),
            name: String::new(),
            message: "no compositionRef, compositionSelector or defaultCompositionRef resolved a Composition".into(),
        })
    }

    async fn assemble_environment(&self, spec: &StandardXrSpec, revision: &CompositionRevisionSpec) -> Result<Environment> {
        let mut configs = Vec::new();
        for r in &spec.environment_config_refs {
            match r {
                EnvironmentConfigRef::Named { name } => {
                    if let Some(obj) = self.store.get(&environment_config_gvk(), None, name).await? {
                        configs.push(obj.data.pointer("/spec/data").cloned().unwrap_or(Json::Null));
                    }
                }
                EnvironmentConfigRef::Selector { mode, match_labels, sort_by_field_path, min_match, max_match } => {
                    let selector_str = label_selector_string(match_labels);
                    let mut matches = self.store.list(&environment_config_gvk(), None, Some(&selector_str), None).await?;
                    if let Some(path) = sort_by_field_path {
                        matches.sort_by(|a, b| sort_key(a, path).cmp(&sort_key(b, path)));
                    }
                    if let Some(min) = min_match {
                        if (matches.len() as u32) < *min {
                            return Err(KubeError::Invalid {
                                kind: "EnvironmentConfig".into(),
                                name: String::new(),
                                message: format!("selector matched {} configs, fewer than minMatch {min}", matches.len()),
                            });
                        }
                    }
                    if let Some(max) = max_match {
                        matches.truncate(*max as usize);
                    }
                    let take = match mode {
                        EnvironmentConfigSelectorMode::Single => 1,
                        EnvironmentConfigSelectorMode::Multiple => matches.len(),
                    };
                    for obj in matches.into_iter().take(take) {
                        configs.push(obj.data.pointer("/spec/data").cloned().unwrap_or(Json::Null));
                    }
                }
            }
        }
        let default_data = revision.environment.as_ref().map(|e| e.default_data.clone()).unwrap_or(Json::Null);
        Ok(Environment::assemble(&default_data, configs))
    }

    /// Fetches the composed resources an XR already references, keyed by
    /// their `compositionResourceName` so desired-state rendering can
    /// correlate by name rather than object identity.
    async fn gather_observed(&self, refs: &[ObjectReference]) -> Result<IndexMap<String, DynamicObject>> {
        let mut observed = IndexMap::new();
        for r in refs {
            let (Some(api_version), Some(kind), Some(name)) = (r.api_version.as_deref(), r.kind.as_deref(), r.name.as_deref()) else {
                continue;
            };
            let gvk = GroupVersionKindOwned::from_api_version(api_version, kind);
            if let Some(obj) = self.store.get(&gvk, r.namespace.as_deref(), name).await? {
                let key = ComposedResource::resource_name_of(&obj).unwrap_or_else(|| name.to_string());
                observed.insert(key, obj);
            }
        }
        Ok(observed)
    }

    /// Renders and applies every [`ComposedTemplate`] in a Resources-mode
    /// revision. A single template's failure (bad patch, apply conflict,
    /// failed readiness check) is isolated per spec.md §7: it is recorded in
    /// [`RenderOutput::errors`] and the loop continues with the rest. The
    /// failed template's previous reference (if it already existed) is
    /// carried forward unchanged so it is not mistaken for an orphan by the
    /// GC sweep that runs after this returns.
    async fn render_resources(
        &self,
        xr: &CompositeResource,
        revision: &CompositionRevisionSpec,
        environment: &Environment,
        observed: &IndexMap<String, DynamicObject>,
    ) -> Result<RenderOutput> {
        let xr_api_version = xr.object.types.as_ref().map(|t| t.api_version.clone()).unwrap_or_default();
        let xr_kind = xr.object.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default();
        let xr_name = xr.name();
        let xr_uid = xr.uid().unwrap_or_default();

        let mut composite_doc = xr.object.data.clone();
        let mut env = environment.clone();
        let mut current_refs = Vec::with_capacity(revision.resources.len());
        let mut connection_details = HashMap::new();
        let mut all_ready = true;
        let mut errors = Vec::new();

        for template in &revision.resources {
            match self
                .render_one_template(template, &mut composite_doc, &mut env, &revision.patch_sets, observed, &xr_api_version, &xr_kind, &xr_name, &xr_uid)
                .await
            {
                Ok(outcome) => {
                    current_refs.push(outcome.reference);
                    all_ready &= outcome.ready;
                    connection_details.extend(outcome.connection_details);
                }
                Err(e) => {
                    all_ready = false;
                    if let Some(existing) = observed.get(&template.name) {
                        current_refs.push(ComposedResource::new(template.name.clone(), existing.clone()).object_reference());
                    }
                    errors.push((template.name.clone(), e));
                }
            }
        }

        Ok(RenderOutput { current_refs, connection_details, ready: all_ready, errors })
    }

    #[allow(clippy::too_many_arguments)]
    async fn render_one_template(
        &self,
        template: &crossplane_core::composition::ComposedTemplate,
        composite_doc: &mut Json,
        env: &mut Environment,
        patch_sets: &[crossplane_core::patch_types::PatchSetDefinition],
        observed: &IndexMap<String, DynamicObject>,
        xr_api_version: &str,
        xr_kind: &str,
        xr_name: &str,
        xr_uid: &str,
    ) -> Result<TemplateOutcome> {
        let mut composed_doc = template.base.clone();
        {
            let mut ctx = crossplane_patch::PatchContext { composite: composite_doc, composed: &mut composed_doc, environment: env };
            for patch in &template.patches {
                crossplane_patch::apply(patch, &mut ctx, patch_sets)?;
            }
        }

        let gvk = object_gvk(&composed_doc).ok_or_else(|| KubeError::Invalid {
            kind: template.name.clone(),
            name: template.name.clone(),
            message: "rendered base has no apiVersion/kind".into(),
        })?;

        if let Some(existing) = observed.get(&template.name) {
            if !ComposedResource::is_controlled_by(existing, xr_uid) {
                return Err(KubeError::NotControllable { kind: gvk.kind.clone(), name: existing.name_any(), owner: "a different controller".into() });
            }
        }

        let name = observed
            .get(&template.name)
            .and_then(|o| o.metadata.name.clone())
            .unwrap_or_else(|| format!("{xr_name}-{}", template.name));

        let mut obj: DynamicObject = serde_json::from_value(composed_doc)?;
        obj.metadata.name = Some(name);
        obj.owner_references_mut().push(ComposedResource::controller_owner_reference(xr_api_version, xr_kind, xr_name, xr_uid));
        obj.labels_mut().insert(LABEL_NAME_PREFIX.to_string(), xr_name.to_string());
        ComposedResource::set_resource_name(&mut obj, &template.name);

        let applied = self.store.apply(&gvk, obj.namespace(), &obj).await?;

        let composed_resource = ComposedResource::new(template.name.clone(), applied.clone());
        let reference = composed_resource.object_reference();

        let ready = if template.readiness_checks.is_empty() {
            true
        } else {
            crossplane_patch::readiness::all_ready(&template.readiness_checks, &applied.data)?
        };

        let mut connection_details = HashMap::new();
        for detail in &template.connection_details {
            if let Some((key, value)) = self.extract_connection_detail(detail, &applied).await? {
                connection_details.insert(key, value);
            }
        }

        Ok(TemplateOutcome { reference, ready, connection_details })
    }

    async fn extract_connection_detail(&self, detail: &ConnectionDetailSpec, composed: &DynamicObject) -> Result<Option<(String, Vec<u8>)>> {
        match &detail.extractor {
            ConnectionDetailExtractor::FromValue { value } => Ok(Some((detail.name.clone(), value.clone().into_bytes()))),
            ConnectionDetailExtractor::FromFieldPath { from_field_path } => {
                let path = crossplane_patch::FieldPath::parse(from_field_path)
                    .map_err(|e| KubeError::Invalid { kind: "ConnectionDetail".into(), name: detail.name.clone(), message: e.to_string() })?;
                let value = crossplane_patch::fieldpath::get(&composed.data, &path)?;
                Ok(value.map(|v| (detail.name.clone(), json_scalar_to_bytes(v))))
            }
            ConnectionDetailExtractor::FromConnectionSecretKey { from_connection_secret_key } => {
                let Some(secret_ref) = composed.data.pointer("/spec/writeConnectionSecretToRef") else { return Ok(None) };
                let (Some(name), Some(namespace)) =
                    (secret_ref.get("name").and_then(Json::as_str), secret_ref.get("namespace").and_then(Json::as_str))
                else {
                    return Ok(None);
                };
                let Some(secret) = self.store.get(&secret_gvk(), Some(namespace), name).await? else { return Ok(None) };
                let Some(encoded) = secret.data.pointer("/data").and_then(|d| d.get(from_connection_secret_key)).and_then(Json::as_str) else {
                    return Ok(None);
                };
                let decoded = STANDARD
                    .decode(encoded)
                    .map_err(|e| KubeError::Invalid { kind: "Secret".into(), name: name.to_string(), message: e.to_string() })?;
                Ok(Some((detail.name.clone(), decoded)))
            }
        }
    }

    async fn render_pipeline(
        &self,
        xr: &CompositeResource,
        revision: &CompositionRevisionSpec,
        observed: &IndexMap<String, DynamicObject>,
    ) -> Result<RenderOutput> {
        if revision.pipeline.is_empty() {
            // Boundary case (spec.md §8): an empty pipeline leaves the XR
            // unchanged and reports Ready=Unknown rather than tearing down
            // whatever it previously composed.
            return Ok(RenderOutput { current_refs: xr.standard_spec().resource_refs, connection_details: HashMap::new(), ready: false, errors: Vec::new() });
        }
        let runtime = self
            .runtime
            .ok_or_else(|| KubeError::Fatal { kind: "Pipeline".into(), name: xr.name(), message: "no function runtime configured".into() })?;

        let mut observed_state = ObservedState { composite: ObservedResource { resource: xr.object.data.clone(), ..Default::default() }, ..Default::default() };
        for (name, obj) in observed {
            observed_state.resources.insert(name.clone(), ObservedResource { resource: obj.data.clone(), ..Default::default() });
        }

        let mut runner = PipelineRunner::new(runtime, &NoRequirements);
        if let Some(metrics) = self.metrics {
            runner = runner.with_metrics(metrics);
        }
        if let Some(token) = &self.cancellation {
            runner = runner.with_cancellation(token.clone());
        }
        let result = runner.run(&revision.pipeline, observed_state).await?;

        let xr_api_version = xr.object.types.as_ref().map(|t| t.api_version.clone()).unwrap_or_default();
        let xr_kind = xr.object.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default();
        let xr_name = xr.name();
        let xr_uid = xr.uid().unwrap_or_default();

        let mut current_refs = Vec::with_capacity(result.desired.resources.len());
        let mut connection_details = HashMap::new();
        let mut all_ready = true;

        for (name, desired) in &result.desired.resources {
            let gvk = object_gvk(&desired.resource).ok_or_else(|| KubeError::Invalid {
                kind: name.clone(),
                name: name.clone(),
                message: "function returned a resource with no apiVersion/kind".into(),
            })?;

            if let Some(existing) = observed.get(name) {
                if !ComposedResource::is_controlled_by(existing, &xr_uid) {
                    return Err(KubeError::NotControllable { kind: gvk.kind.clone(), name: existing.name_any(), owner: "a different controller".into() });
                }
            }

            let mut obj: DynamicObject = serde_json::from_value(desired.resource.clone())?;
            if obj.metadata.name.is_none() {
                obj.metadata.name = observed.get(name).and_then(|o| o.metadata.name.clone()).or_else(|| Some(format!("{xr_name}-{name}")));
            }
            obj.owner_references_mut()
                .push(ComposedResource::controller_owner_reference(&xr_api_version, &xr_kind, &xr_name, &xr_uid));
            obj.labels_mut().insert(LABEL_NAME_PREFIX.to_string(), xr.name_prefix_label_value());
            ComposedResource::set_resource_name(&mut obj, name);

            self.store.apply(&gvk, obj.namespace(), &obj).await?;

            let composed_resource = ComposedResource::new(name.clone(), obj);
            current_refs.push(composed_resource.object_reference());
            connection_details.extend(desired.connection_details.clone());
            all_ready &= desired.ready;
        }

        Ok(RenderOutput { current_refs, connection_details, ready: all_ready, errors: Vec::new() })
    }

    /// Writes the XR's connection secret, after intersecting with the
    /// XRD's allow-list (spec.md §8 invariant 5) and skipping the write
    /// entirely when the filtered details are byte-identical to what's
    /// already there.
    async fn publish_connection_details(&self, xr: &CompositeResource, spec: &StandardXrSpec, details: &HashMap<String, Vec<u8>>) -> Result<bool> {
        let Some(secret_ref) = &spec.write_connection_secret_to_ref else { return Ok(false) };
        if details.is_empty() {
            return Ok(false);
        }

        let filtered: BTreeMap<String, Vec<u8>> = match &self.xrd.connection_secret_keys {
            Some(allow) => details.iter().filter(|(k, _)| allow.contains(k)).map(|(k, v)| (k.clone(), v.clone())).collect(),
            None => details.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        if filtered.is_empty() {
            return Ok(false);
        }

        let gvk = secret_gvk();
        if let Some(existing) = self.store.get(&gvk, Some(&secret_ref.namespace), &secret_ref.name).await? {
            if secret_data_matches(&existing, &filtered) {
                return Ok(false);
            }
        }

        let data: BTreeMap<String, String> = filtered.iter().map(|(k, v)| (k.clone(), STANDARD.encode(v))).collect();
        let manifest = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {
                "name": secret_ref.name,
                "namespace": secret_ref.namespace,
                "labels": {LABEL_NAME_PREFIX: xr.name_prefix_label_value()},
            },
            "type": "connection.crossplane.io/v1alpha1",
            "data": data,
        });
        let obj: DynamicObject = serde_json::from_value(manifest)?;
        self.store.apply(&gvk, Some(&secret_ref.namespace), &obj).await?;
        Ok(true)
    }
}

fn sort_key(obj: &DynamicObject, path: &str) -> String {
    let Ok(parsed) = crossplane_patch::FieldPath::parse(path) else { return String::new() };
    crossplane_patch::fieldpath::get(&obj.data, &parsed)
        .ok()
        .flatten()
        .map(|v| v.to_string())
        .unwrap_or_default()
}

/// Joins per-template errors into the `Synced` condition message, one
/// `name: error` clause per isolated failure (spec.md §7).
fn render_errors_message(errors: &[(String, KubeError)]) -> String {
    errors.iter().map(|(name, e)| format!("{name}: {e}")).collect::<Vec<_>>().join("; ")
}

fn secret_data_matches(existing: &DynamicObject, filtered: &BTreeMap<String, Vec<u8>>) -> bool {
    let Some(data) = existing.data.get("data").and_then(Json::as_object) else { return false };
    if data.len() != filtered.len() {
        return false;
    }
    for (k, v) in filtered {
        let Some(encoded) = data.get(k).and_then(Json::as_str) else { return false };
        let Ok(decoded) = STANDARD.decode(encoded) else { return false };
        if &decoded != v {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_gvk_reads_api_version_and_kind() {
        let doc = json!({"apiVersion": "example.org/v1", "kind": "Bucket"});
        let gvk = object_gvk(&doc).unwrap();
        assert_eq!(gvk.kind, "Bucket");
        assert_eq!(gvk.api_version(), "example.org/v1");
    }

    #[test]
    fn object_gvk_is_none_without_both_fields() {
        assert!(object_gvk(&json!({"kind": "Bucket"})).is_none());
    }

    #[test]
    fn secret_data_matches_compares_decoded_bytes() {
        let existing: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": "s"},
            "data": {"password": STANDARD.encode(b"hunter2")},
        }))
        .unwrap();
        let mut filtered = BTreeMap::new();
        filtered.insert("password".to_string(), b"hunter2".to_vec());
        assert!(secret_data_matches(&existing, &filtered));

        filtered.insert("password".to_string(), b"other".to_vec());
        assert!(!secret_data_matches(&existing, &filtered));
    }

    #[test]
    fn render_errors_message_is_empty_for_no_errors() {
        assert_eq!(render_errors_message(&[]), "");
    }

    #[test]
    fn render_errors_message_joins_one_clause_per_isolated_failure() {
        let errors = vec![
            ("bucket".to_string(), KubeError::not_found("Bucket", "xr-bucket")),
            ("user".to_string(), KubeError::Invalid { kind: "User".into(), name: "xr-user".into(), message: "bad patch".into() }),
        ];
        let message = render_errors_message(&errors);
        assert!(message.contains("bucket: "));
        assert!(message.contains("user: "));
        assert_eq!(message.matches("; ").count(), 1);
    }
}
