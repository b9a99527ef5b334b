//! The `FabricNetwork` custom resource: the single entity the reconciler in
//! `fabnet-operator` drives toward a running Hyperledger Fabric deployment.
//!
//! Field shapes here follow the original controller's Go types
//! (`api/v1alpha1/fabricnetwork_types.go`) rather than inventing a new wire
//! format: `Configtx`/`Genesis`/`CryptoConfig` are `{file, secret}` structs,
//! `Network.channels`/`chaincodes` are non-optional lists, and `Status`
//! carries both a human `message` and a short machine `reason`.

pub mod validate;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A source of cluster configuration that is provided either as a local file
/// (meaningful only to the CLI that packages it into a secret) or as the name
/// of an already-existing secret in the namespace.
///
/// Exactly one of `file`/`secret` may be set; see [`validate`].
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    /// CLI-only: a path on the machine submitting the resource. The operator
    /// never reads this field; by the time a `FabricNetwork` reaches the
    /// cluster it is expected to have been rewritten to `secret`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// The name of a secret in the same namespace holding the material.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl SourceRef {
    pub fn is_provided(&self) -> bool {
        self.file.is_some() || self.secret.is_some()
    }
}

/// Global chaincode defaults, overridable per-entry in `Network.chaincodes`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChaincodeDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// CLI-only: a folder reference packaged into a `hlf-chaincode--<name>`
    /// config map before submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrdererOrg {
    pub name: String,
    pub domain: String,
    #[serde(default)]
    pub hostnames: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeerOrg {
    pub name: String,
    pub domain: String,
    pub peer_count: u32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    pub fabric_version: String,
    #[serde(default)]
    pub tls_enabled: bool,
    #[serde(default)]
    pub use_actual_domains: bool,
    #[serde(default)]
    pub orderer_orgs: Vec<OrdererOrg>,
    #[serde(default)]
    pub peer_orgs: Vec<PeerOrg>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub name: String,
    #[serde(default)]
    pub peer_orgs: Vec<String>,
}

/// A chaincode's per-channel endorsement configuration. `policy` is a
/// free-form endorsement expression (e.g. an AND/OR policy string) passed
/// through to the chaincode-flow workflow unexamined.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CcChannel {
    pub channel: String,
    #[serde(default)]
    pub policy: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chaincode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub peer_orgs: Vec<String>,
    #[serde(default)]
    pub channels: Vec<CcChannel>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub genesis_profile: String,
    pub system_channel_id: String,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub chaincodes: Vec<Chaincode>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostAlias {
    pub ip: String,
    pub hostnames: Vec<String>,
}

/// Administrative escape hatch: when non-empty, the reconciler snaps
/// `status.state` to this value and clears the field on the spec. Distinct
/// from [`State`] so an invalid string is a validation error at admission
/// time rather than a silent no-op.
pub type ForceState = Option<State>;

/// An opaque value-tree forwarded verbatim to Helm/a flow chart's values.
/// Kept as `serde_json::Value` since neither the operator nor the chart
/// renderer needs to interpret its contents — only merge it in at a known
/// position (see `fabnet-chart`'s value-merge order).
pub type OpaqueValues = serde_json::Map<String, serde_json::Value>;

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "FabricNetwork",
    group = "raft.io",
    version = "v1alpha1",
    namespaced,
    status = "FabricNetworkStatus",
    shortname = "fn",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Message", "type":"string", "jsonPath":".status.message"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FabricNetworkSpec {
    pub configtx: SourceRef,
    #[serde(default)]
    pub genesis: SourceRef,
    #[serde(default)]
    pub crypto_config: SourceRef,
    #[serde(default)]
    pub chaincode: ChaincodeDefaults,
    pub topology: Topology,
    pub network: Network,
    #[serde(default)]
    pub host_aliases: Vec<HostAlias>,
    #[serde(default)]
    pub hlf_kube: OpaqueValues,
    #[serde(default)]
    pub channel_flow: OpaqueValues,
    #[serde(default)]
    pub chaincode_flow: OpaqueValues,
    #[serde(default)]
    pub peer_org_flow: OpaqueValues,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_state: ForceState,
}

/// The reconciler's state machine positions, per spec §4.5. Serialized in
/// `PascalCase` to match the original controller's Go string constants
/// (`StateNew`, `StateHelmChartInstalled`, ...) so a resource authored
/// against either implementation round-trips identically.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum State {
    New,
    HelmChartNeedsUpdate,
    HelmChartNeedsDoubleUpdate,
    HelmChartInstalled,
    HelmChartReady,
    ChannelFlowSubmitted,
    ChannelFlowCompleted,
    ChaincodeFlowSubmitted,
    ChaincodeFlowCompleted,
    PeerOrgFlowSubmitted,
    PeerOrgFlowCompleted,
    Ready,
    Rejected,
    Failed,
    Invalid,
}

/// Post-`HelmChartReady` dispatch hint, set by the Ready-state dispatch
/// rules when a topology change requires a flow other than the default
/// channel-flow.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum NextFlow {
    None,
    PeerOrgFlow,
}

/// The last-reconciled snapshot the Change Detector diffs the spec against.
/// Populated at `New` entry and refreshed only at well-defined transitions
/// (see spec §9, "Snapshot-on-progress") so diffs never chase an
/// in-progress rollout.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<Topology>,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub chaincode: ChaincodeDefaults,
    #[serde(default)]
    pub chaincodes: Vec<Chaincode>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FabricNetworkStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<State>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_flow: Option<NextFlow>,
    #[serde(flatten)]
    pub snapshot: StatusSnapshot,
    /// Short machine-readable code (e.g. `"MoreThanOneInNamespace"`,
    /// `"ChannelFlowFailed"`), distinct from `message`: dashboards filter on
    /// this, humans read `message`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The ownership/discovery label the Chart Renderer and Workflow Dispatcher
/// stamp on everything they create for a given network.
pub const CREATED_FOR_LABEL: &str = "raft.io/fabric-operator-created-for";

/// The annotation `Chart Renderer::Uninstall` consults before tearing down a
/// Helm release, to guard against adopting an unrelated `hlf-kube` release.
pub const CREATED_FOR_ANNOTATION: &str = "raft.io/fabric-operator-created-for";

/// Helm release name: always this fixed value, never derived from the
/// network name (spec §6).
pub const HELM_RELEASE_NAME: &str = "hlf-kube";

pub const SECRET_CONFIGTX: &str = "hlf-configtx.yaml";
pub const SECRET_GENESIS: &str = "hlf-genesis.block";
pub const SECRET_CRYPTO_CONFIG: &str = "hlf-crypto-config";

/// The config-map name for a chaincode archive, lowercased per spec §4.1.
pub fn chaincode_configmap_name(chaincode_name: &str) -> String {
    format!("hlf-chaincode--{}", chaincode_name.to_lowercase())
}
