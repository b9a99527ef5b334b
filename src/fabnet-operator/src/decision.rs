//! The pure state-machine decision step (spec §4.5): a function of the
//! current state, spec, status, and a small bundle of already-observed
//! facts, returning which side effects to perform and where to transition.
//! No `kube` or subprocess I/O happens here, which is what lets the six
//! end-to-end scenarios be driven as plain `#[test]`s instead of needing a
//! live cluster.

use fabnet_diff::{snapshot_of, ChangeSet};
use fabnet_types::validate::ValidationError;
use fabnet_types::{FabricNetworkSpec, FabricNetworkStatus, NextFlow, State, StatusSnapshot};
use std::time::Duration;

/// The flow kinds the dispatch rules and poll states refer to. Mapped onto
/// `fabnet_chart::FlowKind` (for rendering) and `fabnet_workflow::FlowKind`
/// (for submission labeling) by the async reconciler, which is the only
/// layer that needs both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Channel,
    Chaincode,
    PeerOrg,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    UninstallPriorRelease,
    PrepareFresh,
    PrepareReconstruct,
    Install,
    UpgradeOnce,
    Extend,
    PollHelmReady,
    RegenerateValueFiles,
    StartFlow { flow: Flow, include: Vec<String> },
    PollFlow,
}

/// What phase a previously-submitted workflow has reached, as observed by
/// the async layer via `fabnet_workflow::Dispatcher::status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Submitted,
    Completed,
    Failed,
}

/// Where the decision sends the resource next. Distinct from
/// `Option<State>` because "stay" and "clear to the (empty) initial
/// position" are both meaningful and different from "move to a named
/// state".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Stay,
    To(State),
    ToEmpty,
}

impl Default for Transition {
    fn default() -> Self {
        Transition::Stay
    }
}

/// Facts the async reconciler gathers before calling [`step`]. Only the
/// field(s) relevant to the current state need be populated; `step` never
/// reads a field the current state's row doesn't need.
#[derive(Debug, Clone, Default)]
pub struct Observations {
    pub change: Option<ChangeSet>,
    pub helm_ready: Option<bool>,
    pub workflow_status: Option<WorkflowOutcome>,
    pub validation: Option<Vec<ValidationError>>,
    pub namespace_conflict: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct Decision {
    pub actions: Vec<Action>,
    pub next_state: Transition,
    /// `Some(_)` overrides `Status.NextFlow`; `None` leaves it untouched
    /// (spec §4.5's "no NextFlow" bullets).
    pub next_flow: Option<NextFlow>,
    pub snapshot: Option<StatusSnapshot>,
    pub message: Option<String>,
    pub reason: Option<String>,
    pub requeue_after: Option<Duration>,
    pub clear_workflow: bool,
}

pub fn step(current: Option<State>, spec: &FabricNetworkSpec, status: &FabricNetworkStatus, obs: &Observations) -> Decision {
    match current {
        None => step_empty(spec, obs),
        Some(State::New) => step_new(spec),
        Some(State::HelmChartNeedsUpdate) => Decision {
            actions: vec![Action::UpgradeOnce],
            next_state: Transition::To(State::HelmChartInstalled),
            ..Default::default()
        },
        Some(State::HelmChartNeedsDoubleUpdate) => step_needs_double_update(spec),
        Some(State::HelmChartInstalled) => step_helm_chart_installed(obs),
        Some(State::HelmChartReady) => step_helm_chart_ready(spec, status, obs),
        Some(State::ChannelFlowSubmitted) => step_poll_flow(obs, State::ChannelFlowCompleted),
        Some(State::ChannelFlowCompleted) => Decision {
            actions: vec![Action::StartFlow { flow: Flow::Chaincode, include: Vec::new() }],
            next_state: Transition::To(State::ChaincodeFlowSubmitted),
            ..Default::default()
        },
        Some(State::ChaincodeFlowSubmitted) => step_poll_flow(obs, State::ChaincodeFlowCompleted),
        Some(State::ChaincodeFlowCompleted) => Decision {
            next_state: Transition::To(State::Ready),
            ..Default::default()
        },
        Some(State::PeerOrgFlowSubmitted) => step_poll_flow(obs, State::PeerOrgFlowCompleted),
        Some(State::PeerOrgFlowCompleted) => Decision {
            actions: vec![Action::StartFlow { flow: Flow::Channel, include: Vec::new() }],
            next_state: Transition::To(State::ChannelFlowSubmitted),
            ..Default::default()
        },
        Some(State::Ready) => step_ready(spec, obs),
        Some(State::Rejected) | Some(State::Failed) => Decision::default(),
        Some(State::Invalid) => step_invalid(obs),
    }
}

fn step_empty(spec: &FabricNetworkSpec, obs: &Observations) -> Decision {
    let validation = obs.validation.clone().unwrap_or_default();
    if !validation.is_empty() {
        return Decision {
            next_state: Transition::To(State::Invalid),
            message: Some(format!("{} validation issue(s): {validation:?}", validation.len())),
            reason: Some("ValidationFailed".to_string()),
            ..Default::default()
        };
    }

    if obs.namespace_conflict.unwrap_or(false) {
        return Decision {
            next_state: Transition::To(State::Rejected),
            message: Some("another FabricNetwork already holds a non-initial state in this namespace".to_string()),
            reason: Some("MoreThanOneInNamespace".to_string()),
            ..Default::default()
        };
    }

    Decision {
        next_state: Transition::To(State::New),
        snapshot: Some(snapshot_of(spec)),
        ..Default::default()
    }
}

fn step_new(spec: &FabricNetworkSpec) -> Decision {
    Decision {
        actions: vec![Action::UninstallPriorRelease, Action::PrepareFresh, Action::Install],
        next_state: Transition::To(if spec.topology.use_actual_domains {
            State::HelmChartNeedsUpdate
        } else {
            State::HelmChartInstalled
        }),
        ..Default::default()
    }
}

fn step_needs_double_update(spec: &FabricNetworkSpec) -> Decision {
    let mut actions = vec![Action::UpgradeOnce];
    if spec.topology.use_actual_domains {
        actions.push(Action::UpgradeOnce);
    }
    Decision {
        actions,
        next_state: Transition::To(State::HelmChartInstalled),
        ..Default::default()
    }
}

fn step_helm_chart_installed(obs: &Observations) -> Decision {
    if obs.helm_ready.unwrap_or(false) {
        Decision {
            next_state: Transition::To(State::HelmChartReady),
            ..Default::default()
        }
    } else {
        Decision {
            actions: vec![Action::PollHelmReady],
            next_state: Transition::Stay,
            requeue_after: Some(Duration::from_secs(10)),
            ..Default::default()
        }
    }
}

fn step_helm_chart_ready(spec: &FabricNetworkSpec, status: &FabricNetworkStatus, obs: &Observations) -> Decision {
    let change = obs.change.clone().unwrap_or_default();
    if change.topology {
        return Decision {
            next_state: Transition::To(State::New),
            snapshot: Some(snapshot_of(spec)),
            message: Some("topology changed again before settling; restarting the install".to_string()),
            reason: Some("TopologyChangedMidRollout".to_string()),
            ..Default::default()
        };
    }

    match status.next_flow {
        None => Decision {
            actions: vec![Action::StartFlow { flow: Flow::Channel, include: Vec::new() }],
            next_state: Transition::To(State::ChannelFlowSubmitted),
            ..Default::default()
        },
        Some(NextFlow::None) => Decision {
            next_state: Transition::To(State::Ready),
            ..Default::default()
        },
        Some(NextFlow::PeerOrgFlow) => Decision {
            actions: vec![Action::StartFlow { flow: Flow::PeerOrg, include: Vec::new() }],
            next_state: Transition::To(State::PeerOrgFlowSubmitted),
            ..Default::default()
        },
    }
}

fn step_poll_flow(obs: &Observations, completed_state: State) -> Decision {
    match obs.workflow_status {
        Some(WorkflowOutcome::Completed) => Decision {
            next_state: Transition::To(completed_state),
            clear_workflow: true,
            ..Default::default()
        },
        Some(WorkflowOutcome::Failed) => Decision {
            next_state: Transition::To(State::Failed),
            clear_workflow: true,
            reason: Some("WorkflowFailed".to_string()),
            message: Some("the submitted workflow reached a terminal failed phase".to_string()),
            ..Default::default()
        },
        _ => Decision {
            actions: vec![Action::PollFlow],
            next_state: Transition::Stay,
            requeue_after: Some(Duration::from_secs(10)),
            ..Default::default()
        },
    }
}

/// The Ready-state dispatch rules, applied top to bottom, first match wins
/// (spec §4.5).
fn step_ready(spec: &FabricNetworkSpec, obs: &Observations) -> Decision {
    let change = obs.change.clone().unwrap_or_default();
    if change.is_empty() {
        return Decision::default();
    }

    let snapshot = Some(snapshot_of(spec));
    let mut actions = vec![Action::RegenerateValueFiles];

    if change.topology {
        if change.orderer_orgs || change.peer_orgs {
            actions.push(Action::Extend);
        }
        if change.orderer_orgs && !change.peer_orgs {
            return Decision {
                actions,
                next_state: Transition::To(State::HelmChartNeedsDoubleUpdate),
                next_flow: Some(NextFlow::None),
                snapshot,
                message: Some("new orderer organizations are not auto-functional; manual follow-up may be required".to_string()),
                reason: Some("OrdererOrgsChanged".to_string()),
                ..Default::default()
            };
        }
        if change.peer_orgs {
            return Decision {
                actions,
                next_state: Transition::To(State::HelmChartNeedsDoubleUpdate),
                next_flow: Some(NextFlow::PeerOrgFlow),
                snapshot,
                ..Default::default()
            };
        }
        if change.peer_count_increase && !change.peer_count_decrease {
            return Decision {
                actions,
                next_state: Transition::To(State::HelmChartNeedsUpdate),
                next_flow: Some(NextFlow::None),
                snapshot,
                ..Default::default()
            };
        }
        // PeerCountDecrease, a Version bump, or a bare topology flag flip
        // (TLS/UseActualDomains toggled with no org or count signal) all
        // settle for a single upgrade pass with nothing queued after it.
        return Decision {
            actions,
            next_state: Transition::To(State::HelmChartNeedsUpdate),
            next_flow: Some(NextFlow::None),
            snapshot,
            ..Default::default()
        };
    }

    if change.channel {
        actions.push(Action::StartFlow { flow: Flow::Channel, include: Vec::new() });
        return Decision {
            actions,
            next_state: Transition::To(State::ChannelFlowSubmitted),
            snapshot,
            ..Default::default()
        };
    }

    if change.chaincode {
        actions.push(Action::StartFlow { flow: Flow::Chaincode, include: change.chaincodes.clone() });
        return Decision {
            actions,
            next_state: Transition::To(State::ChaincodeFlowSubmitted),
            snapshot,
            ..Default::default()
        };
    }

    Decision {
        actions,
        next_state: Transition::Stay,
        snapshot,
        ..Default::default()
    }
}

fn step_invalid(obs: &Observations) -> Decision {
    let validation = obs.validation.clone().unwrap_or_default();
    if validation.is_empty() {
        Decision {
            next_state: Transition::ToEmpty,
            ..Default::default()
        }
    } else {
        Decision {
            next_state: Transition::Stay,
            message: Some(format!("{} validation issue(s) remain: {validation:?}", validation.len())),
            ..Default::default()
        }
    }
}
