//! The async orchestration layer: fetches the live `FabricNetwork`,
//! gathers just the observations the current state's row needs, calls the
//! pure [`decision::step`], executes the resulting actions against the
//! cluster, and persists `Status` before returning. A plain get-or-not-found
//! check stands in for a finalizer: deletion cleanup runs the moment a get
//! comes back 404 rather than waiting on a finalizer callback.

use crate::decision::{self, Action, Decision, Flow, Observations, Transition, WorkflowOutcome};
use crate::error::ReconcileError;
use fabnet_chart::{ChartRenderer, PrepareMode};
use fabnet_types::{FabricNetwork, FabricNetworkStatus, State};
use fabnet_workflow::Dispatcher;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::Action as ControllerAction;
use kube::{Client, ResourceExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

pub const FIELD_MANAGER: &str = "fabnet-operator";
const DEFAULT_REQUEUE: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct Context {
    pub client: Client,
}

#[instrument(skip(object, ctx), fields(name = %object.name_any(), namespace = %object.namespace().unwrap_or_default()))]
pub async fn reconcile(object: Arc<FabricNetwork>, ctx: Arc<Context>) -> Result<ControllerAction, ReconcileError> {
    let namespace = object.namespace().unwrap_or_else(|| "default".to_string());
    let name = object.name_any();
    let networks: Api<FabricNetwork> = Api::namespaced(ctx.client.clone(), &namespace);

    let network = match networks.get(&name).await {
        Ok(network) => network,
        Err(kube::Error::Api(err)) if err.code == 404 => {
            handle_deletion(&ctx, &namespace, &name).await;
            return Ok(ControllerAction::await_change());
        }
        Err(err) => return Err(err.into()),
    };

    if let Some(forced) = network.spec.force_state {
        info!(?forced, "applying ForceState override");
        apply_forced_state(&networks, &name, forced).await?;
        return Ok(ControllerAction::requeue(Duration::from_secs(1)));
    }

    let chart = ChartRenderer::new(ctx.client.clone(), &namespace);
    let dispatcher = Dispatcher::new(ctx.client.clone(), &namespace);

    let current_state = network.status.as_ref().and_then(|s| s.state);
    if needs_reconstruction(current_state) && !chart.scratch_dir_exists(&name).await {
        chart.prepare(&network, PrepareMode::Reconstruct).await?;
    }

    let status = network.status.clone().unwrap_or_default();
    let observations = gather_observations(&networks, &chart, &dispatcher, &network, current_state, &name).await?;
    let decision = decision::step(current_state, &network.spec, &status, &observations);

    let workflow_name = execute_actions(&decision.actions, &network, &chart, &dispatcher).await?;

    persist_status(&networks, &name, &status, &decision, workflow_name).await?;

    Ok(ControllerAction::requeue(decision.requeue_after.unwrap_or(DEFAULT_REQUEUE)))
}

pub fn error_policy(_object: Arc<FabricNetwork>, err: &ReconcileError, _ctx: Arc<Context>) -> ControllerAction {
    warn!(error = %err, "reconcile failed");
    ControllerAction::requeue(err.requeue_after())
}

/// Best-effort teardown once the resource is confirmed gone. Owner
/// references already cascade-delete the `hlf-crypto-config` secret
/// (invariant 3); this covers the two things that aren't owned objects:
/// the Helm release and any in-flight workflows.
async fn handle_deletion(ctx: &Context, namespace: &str, name: &str) {
    let chart = ChartRenderer::new(ctx.client.clone(), namespace);
    if let Err(err) = chart.uninstall(name).await {
        warn!(%err, "best-effort Helm uninstall failed during deletion handling");
    }
    let dispatcher = Dispatcher::new(ctx.client.clone(), namespace);
    if let Err(err) = dispatcher.delete_all(name).await {
        warn!(%err, "best-effort workflow cleanup failed during deletion handling");
    }
}

async fn apply_forced_state(networks: &Api<FabricNetwork>, name: &str, forced: State) -> Result<(), ReconcileError> {
    let status_patch = json!({ "status": { "state": forced } });
    networks
        .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch))
        .await?;
    let spec_patch = json!({ "spec": { "forceState": null } });
    networks.patch(name, &PatchParams::default(), &Patch::Merge(&spec_patch)).await?;
    Ok(())
}

fn needs_reconstruction(state: Option<State>) -> bool {
    !matches!(state, None | Some(State::New) | Some(State::Rejected) | Some(State::Invalid) | Some(State::Failed))
}

async fn gather_observations(
    networks: &Api<FabricNetwork>,
    chart: &ChartRenderer,
    dispatcher: &Dispatcher,
    network: &FabricNetwork,
    current_state: Option<State>,
    name: &str,
) -> Result<Observations, ReconcileError> {
    let mut obs = Observations::default();

    match current_state {
        None => {
            obs.validation = Some(fabnet_types::validate::validate(&network.spec));
            obs.namespace_conflict = Some(namespace_has_conflict(networks, name).await?);
        }
        Some(State::Invalid) => {
            obs.validation = Some(fabnet_types::validate::validate(&network.spec));
        }
        Some(State::HelmChartInstalled) => {
            obs.helm_ready = Some(chart.is_ready().await?);
        }
        Some(State::HelmChartReady) | Some(State::Ready) => {
            let status = network.status.clone().unwrap_or_default();
            obs.change = Some(fabnet_diff::diff(&network.spec, &status.snapshot));
        }
        Some(State::ChannelFlowSubmitted) | Some(State::ChaincodeFlowSubmitted) | Some(State::PeerOrgFlowSubmitted) => {
            let status = network.status.clone().unwrap_or_default();
            if let Some(workflow_name) = status.workflow {
                let outcome = match dispatcher.status(&workflow_name).await? {
                    fabnet_workflow::WorkflowStatus::Submitted => WorkflowOutcome::Submitted,
                    fabnet_workflow::WorkflowStatus::Completed => WorkflowOutcome::Completed,
                    fabnet_workflow::WorkflowStatus::Failed => WorkflowOutcome::Failed,
                };
                obs.workflow_status = Some(outcome);
            } else {
                return Err(ReconcileError::Precondition(format!(
                    "state {current_state:?} has no Status.Workflow to poll"
                )));
            }
        }
        _ => {}
    }

    Ok(obs)
}

async fn namespace_has_conflict(networks: &Api<FabricNetwork>, this_name: &str) -> Result<bool, ReconcileError> {
    let list = networks.list(&ListParams::default()).await?;
    Ok(list.items.iter().any(|other| {
        other.name_any() != this_name
            && !matches!(
                other.status.as_ref().and_then(|s| s.state),
                None | Some(State::New) | Some(State::Rejected)
            )
    }))
}

async fn execute_actions(
    actions: &[Action],
    network: &FabricNetwork,
    chart: &ChartRenderer,
    dispatcher: &Dispatcher,
) -> Result<Option<String>, ReconcileError> {
    let name = network.name_any();
    let mut submitted_workflow = None;

    for action in actions {
        match action {
            Action::UninstallPriorRelease => {
                chart.uninstall(&name).await.map_err(|e| ReconcileError::ToolFailure(e.to_string()))?;
                dispatcher.delete_all(&name).await?;
            }
            Action::PrepareFresh => {
                chart.prepare(network, PrepareMode::Fresh).await?;
            }
            Action::PrepareReconstruct => {
                chart.prepare(network, PrepareMode::Reconstruct).await?;
            }
            Action::Install => {
                chart.install(network).await.map_err(|e| ReconcileError::ToolFailure(e.to_string()))?;
            }
            Action::UpgradeOnce => {
                chart.upgrade(network).await.map_err(|e| ReconcileError::ToolFailure(e.to_string()))?;
            }
            Action::Extend => {
                chart.extend(network).await.map_err(|e| ReconcileError::ToolFailure(e.to_string()))?;
            }
            Action::PollHelmReady | Action::PollFlow | Action::RegenerateValueFiles => {
                // RegenerateValueFiles is realized by the next Prepare/Extend/
                // flow-render call, which always rewrites the value files from
                // the current spec; polling actions are pure observation, not
                // a side effect of their own.
            }
            Action::StartFlow { flow, include } => {
                let manifest = chart
                    .render_flow(chart_flow_kind(*flow), network, include)
                    .await
                    .map_err(|e| ReconcileError::ToolFailure(e.to_string()))?;
                let submitted = dispatcher.submit(workflow_flow_kind(*flow), &name, &manifest).await?;
                submitted_workflow = Some(submitted);
            }
        }
    }

    Ok(submitted_workflow)
}

fn chart_flow_kind(flow: Flow) -> fabnet_chart::FlowKind {
    match flow {
        Flow::Channel => fabnet_chart::FlowKind::Channel,
        Flow::Chaincode => fabnet_chart::FlowKind::Chaincode,
        Flow::PeerOrg => fabnet_chart::FlowKind::PeerOrg,
    }
}

fn workflow_flow_kind(flow: Flow) -> fabnet_workflow::FlowKind {
    match flow {
        Flow::Channel => fabnet_workflow::FlowKind::ChannelFlow,
        Flow::Chaincode => fabnet_workflow::FlowKind::ChaincodeFlow,
        Flow::PeerOrg => fabnet_workflow::FlowKind::PeerOrgFlow,
    }
}

async fn persist_status(
    networks: &Api<FabricNetwork>,
    name: &str,
    previous: &FabricNetworkStatus,
    decision: &Decision,
    workflow_name: Option<String>,
) -> Result<(), ReconcileError> {
    let mut next = previous.clone();

    match &decision.next_state {
        Transition::Stay => {}
        Transition::To(state) => next.state = Some(*state),
        Transition::ToEmpty => next.state = None,
    }
    if let Some(next_flow) = decision.next_flow {
        next.next_flow = Some(next_flow);
    }
    if let Some(snapshot) = &decision.snapshot {
        next.snapshot = snapshot.clone();
    }
    if decision.clear_workflow {
        next.workflow = None;
    }
    if let Some(workflow) = workflow_name {
        next.workflow = Some(workflow);
    }
    next.message = decision.message.clone().or(next.message);
    next.reason = decision.reason.clone().or(next.reason);

    if &next != previous {
        let patch = json!({ "status": next });
        networks.patch_status(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&patch)).await?;
    }
    Ok(())
}
