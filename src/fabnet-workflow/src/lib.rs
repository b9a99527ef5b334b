//! Workflow Dispatcher (spec §4.4): submits rendered Argo workflow
//! manifests, polls their terminal phase, and cleans them up by ownership
//! label. Grounded on the original's `argo_util.go` (`submitWorkflow`,
//! `getWorkflowStatus`, `deleteWorkflows`), adapted to `kube-rs`'s
//! `Api<T>` idiom the way the teacher's `orchestrator-kubernetes` crate
//! wraps `k8s-openapi` resources.

pub mod crd;
mod decode;

pub use crd::{ArgoWorkflow, ArgoWorkflowSpec, ArgoWorkflowStatus};
pub use decode::decode_single_workflow;

use anyhow::{bail, Context, Result};
use fabnet_types::CREATED_FOR_LABEL;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client, ResourceExt};
use tracing::instrument;

/// The three flow kinds the reconciler dispatches. Distinct from
/// [`fabnet_chart::FlowKind`]: this one only needs enough information to
/// build the submission label, rendering is the chart crate's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    ChannelFlow,
    ChaincodeFlow,
    PeerOrgFlow,
}

impl FlowKind {
    fn generate_name_prefix(self) -> &'static str {
        match self {
            FlowKind::ChannelFlow => "channel-flow-",
            FlowKind::ChaincodeFlow => "chaincode-flow-",
            FlowKind::PeerOrgFlow => "peer-org-flow-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Submitted,
    Completed,
    Failed,
}

pub struct Dispatcher {
    workflows: Api<ArgoWorkflow>,
}

impl Dispatcher {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            workflows: Api::namespaced(client, namespace),
        }
    }

    /// Submits a rendered manifest (as produced by `helm template`) for the
    /// given flow and network, stamping the ownership label. Returns the
    /// server-assigned name.
    #[instrument(skip(self, manifest))]
    pub async fn submit(&self, kind: FlowKind, network_name: &str, manifest: &str) -> Result<String> {
        let doc = decode_single_workflow(manifest).context("decoding rendered workflow manifest")?;

        let mut workflow: ArgoWorkflow = ArgoWorkflow::new(
            doc.name.as_deref().unwrap_or_default(),
            ArgoWorkflowSpec { raw: doc.spec },
        );
        workflow.metadata.name = doc.name;
        if workflow.metadata.name.is_none() {
            workflow.metadata.generate_name = Some(doc.generate_name.unwrap_or_else(|| kind.generate_name_prefix().to_string()));
        }
        let mut labels = doc.labels;
        labels.insert(CREATED_FOR_LABEL.to_string(), network_name.to_string());
        workflow.metadata.labels = Some(labels.into_iter().collect());

        let created = self
            .workflows
            .create(&PostParams::default(), &workflow)
            .await
            .context("submitting workflow")?;
        Ok(created.name_any())
    }

    /// Maps the workflow engine's phase to the three outcomes the
    /// reconciler cares about. An absent or unrecognized phase is treated
    /// as still running (`Submitted`) rather than an error: Argo leaves
    /// `status.phase` empty for a brief window right after creation.
    #[instrument(skip(self))]
    pub async fn status(&self, name: &str) -> Result<WorkflowStatus> {
        let workflow = self.workflows.get(name).await.context("polling workflow status")?;
        let phase = workflow.status.and_then(|s| s.phase).unwrap_or_default();
        Ok(map_phase(&phase))
    }

    /// Lists and deletes every workflow created for this network,
    /// identified by the ownership label. Used both by `New`'s
    /// clean-slate reinstall and by the deletion handler's best-effort
    /// teardown; individual delete failures are collected, not fatal,
    /// because the caller (deletion handling) must not propagate errors
    /// for an object that is already gone.
    #[instrument(skip(self))]
    pub async fn delete_all(&self, network_name: &str) -> Result<()> {
        let list_params = ListParams::default().labels(&format!("{CREATED_FOR_LABEL}={network_name}"));
        let workflows = self.workflows.list(&list_params).await.context("listing workflows to delete")?;

        let mut errors = Vec::new();
        for workflow in workflows.items {
            let name = workflow.name_any();
            if let Err(err) = self.workflows.delete(&name, &DeleteParams::default()).await {
                errors.push(format!("{name}: {err}"));
            }
        }
        if !errors.is_empty() {
            bail!("failed to delete {} workflow(s): {}", errors.len(), errors.join("; "));
        }
        Ok(())
    }
}

fn map_phase(phase: &str) -> WorkflowStatus {
    match phase {
        "Succeeded" => WorkflowStatus::Completed,
        "Failed" | "Error" => WorkflowStatus::Failed,
        _ => WorkflowStatus::Submitted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_mapping_covers_argo_terminal_phases() {
        assert_eq!(map_phase("Succeeded"), WorkflowStatus::Completed);
        assert_eq!(map_phase("Failed"), WorkflowStatus::Failed);
        assert_eq!(map_phase("Error"), WorkflowStatus::Failed);
        assert_eq!(map_phase("Running"), WorkflowStatus::Submitted);
        assert_eq!(map_phase(""), WorkflowStatus::Submitted);
    }

    #[test]
    fn flow_kind_prefixes_are_distinct() {
        assert_eq!(FlowKind::ChannelFlow.generate_name_prefix(), "channel-flow-");
        assert_eq!(FlowKind::ChaincodeFlow.generate_name_prefix(), "chaincode-flow-");
        assert_eq!(FlowKind::PeerOrgFlow.generate_name_prefix(), "peer-org-flow-");
    }
}
