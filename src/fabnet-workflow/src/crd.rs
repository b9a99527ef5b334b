//! The `Workflow` custom resource (`argoproj.io/v1alpha1`) modeled as a
//! [`kube::CustomResource`]. The teacher has no Argo dependency to ground
//! this on directly; the `#[derive(CustomResource)]` shape is grounded on
//! the pack's `examples/other_examples` ASoldo-rust_operator and
//! microscaler-secret-manager-controller samples instead (the "enrich from
//! the rest of the pack" case).
//!
//! `spec`/`status` beyond `phase` are left as opaque JSON: this crate never
//! interprets a workflow's step graph, only its terminal phase.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Workflow",
    group = "argoproj.io",
    version = "v1alpha1",
    namespaced,
    status = "ArgoWorkflowStatus",
    shortname = "wf"
)]
#[serde(rename_all = "camelCase")]
pub struct ArgoWorkflowSpec {
    #[serde(flatten)]
    pub raw: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArgoWorkflowStatus {
    pub phase: Option<String>,
}
