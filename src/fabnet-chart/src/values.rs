//! Value-file composition for the scratch directory: `network.yaml`,
//! `crypto-config.yaml`, `operator-values.yaml`, and the three opaque
//! blobs (`hlf-kube`, `channel-flow`, `chaincode-flow`, `peer-org-flow`
//! re-encoded from the spec extension fields), per spec §4.2.

use crate::crypto_config;
use anyhow::Result;
use fabnet_types::{FabricNetworkSpec, HostAlias, OpaqueValues};
use serde::Serialize;
use std::path::Path;
use tokio::fs;

pub const NETWORK_YAML: &str = "network.yaml";
pub const CRYPTO_CONFIG_YAML: &str = "crypto-config.yaml";
pub const OPERATOR_VALUES_YAML: &str = "operator-values.yaml";
pub const HLF_KUBE_YAML: &str = "hlf-kube.yaml";
pub const CHANNEL_FLOW_YAML: &str = "channel-flow.yaml";
pub const CHAINCODE_FLOW_YAML: &str = "chaincode-flow.yaml";
pub const PEER_ORG_FLOW_YAML: &str = "peer-org-flow.yaml";

#[derive(Serialize)]
struct NetworkDoc<'a> {
    network: &'a fabnet_types::Network,
}

#[derive(Serialize)]
struct OperatorValuesDoc {
    #[serde(rename = "hostAliases", skip_serializing_if = "Vec::is_empty")]
    host_aliases: Vec<HostAlias>,
}

async fn write_yaml<T: Serialize>(dir: &Path, filename: &str, doc: &T) -> Result<()> {
    let text = serde_yaml::to_string(doc)?;
    fs::write(dir.join(filename), text).await?;
    Ok(())
}

async fn write_opaque(dir: &Path, filename: &str, values: &OpaqueValues) -> Result<()> {
    let text = serde_yaml::to_string(values)?;
    fs::write(dir.join(filename), text).await?;
    Ok(())
}

/// Writes `network.yaml` and `crypto-config.yaml` (the two value documents
/// derived purely from the spec, with no cluster lookups).
pub async fn write_network_and_crypto_config(dir: &Path, spec: &FabricNetworkSpec) -> Result<()> {
    write_yaml(dir, NETWORK_YAML, &NetworkDoc { network: &spec.network }).await?;
    let crypto_config = crypto_config::build(&spec.topology);
    write_yaml(dir, CRYPTO_CONFIG_YAML, &crypto_config).await?;
    Ok(())
}

/// Writes `operator-values.yaml` with the resolved (user + auto-discovered)
/// host aliases.
pub async fn write_operator_values(dir: &Path, host_aliases: Vec<HostAlias>) -> Result<()> {
    write_yaml(dir, OPERATOR_VALUES_YAML, &OperatorValuesDoc { host_aliases }).await
}

/// Writes the three opaque extension blobs verbatim (re-encoded from JSON
/// to YAML; Helm accepts either, but YAML matches the rest of the scratch
/// directory's files).
pub async fn write_opaque_blobs(dir: &Path, spec: &FabricNetworkSpec) -> Result<()> {
    write_opaque(dir, HLF_KUBE_YAML, &spec.hlf_kube).await?;
    write_opaque(dir, CHANNEL_FLOW_YAML, &spec.channel_flow).await?;
    write_opaque(dir, CHAINCODE_FLOW_YAML, &spec.chaincode_flow).await?;
    write_opaque(dir, PEER_ORG_FLOW_YAML, &spec.peer_org_flow).await
}

/// The inline `--set` overrides applied on top of every value-file merge,
/// per spec §4.2's merge order: Fabric version, TLS flag, domains flag, plus
/// the three bypass flags (chaincode configmap / configtx secret / genesis
/// secret), the last true iff genesis was not user-supplied.
pub fn inline_overrides(spec: &FabricNetworkSpec) -> Vec<String> {
    vec![
        format!("hyperledgerVersion={}", spec.topology.fabric_version),
        format!("tlsEnabled={}", spec.topology.tls_enabled),
        format!("useActualDomains={}", spec.topology.use_actual_domains),
        format!("chaincodeConfigMapBypass={}", spec.chaincode.folder.is_none()),
        format!("configtxSecretBypass={}", spec.configtx.secret.is_some()),
        format!("genesisSecretBypass={}", !spec.genesis.is_provided()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabnet_types::{ChaincodeDefaults, Network, SourceRef, Topology};

    fn spec() -> FabricNetworkSpec {
        FabricNetworkSpec {
            configtx: SourceRef { file: None, secret: Some("hlf-configtx.yaml".into()) },
            genesis: SourceRef::default(),
            crypto_config: SourceRef::default(),
            chaincode: ChaincodeDefaults { version: Some("1.0".into()), language: Some("golang".into()), folder: None },
            topology: Topology {
                fabric_version: "2.5".into(),
                tls_enabled: false,
                use_actual_domains: false,
                orderer_orgs: vec![],
                peer_orgs: vec![],
            },
            network: Network {
                genesis_profile: "OneOrgGenesis".into(),
                system_channel_id: "system-channel".into(),
                channels: vec![],
                chaincodes: vec![],
            },
            host_aliases: vec![],
            hlf_kube: Default::default(),
            channel_flow: Default::default(),
            chaincode_flow: Default::default(),
            peer_org_flow: Default::default(),
            force_state: None,
        }
    }

    #[test]
    fn genesis_secret_bypass_is_true_when_genesis_is_not_user_supplied() {
        let overrides = inline_overrides(&spec());
        assert!(overrides.contains(&"genesisSecretBypass=true".to_string()));
    }

    #[test]
    fn genesis_secret_bypass_is_false_when_genesis_is_user_supplied() {
        let mut s = spec();
        s.genesis = SourceRef { file: None, secret: Some("hlf-genesis.block".into()) };
        s.crypto_config = SourceRef { file: None, secret: Some("hlf-crypto-config".into()) };
        let overrides = inline_overrides(&s);
        assert!(overrides.contains(&"genesisSecretBypass=false".to_string()));
    }

    #[tokio::test]
    async fn write_network_and_crypto_config_produces_both_files() {
        let dir = tempfile::tempdir().unwrap();
        write_network_and_crypto_config(dir.path(), &spec()).await.unwrap();
        assert!(dir.path().join(NETWORK_YAML).exists());
        assert!(dir.path().join(CRYPTO_CONFIG_YAML).exists());
    }

    #[tokio::test]
    async fn write_opaque_blobs_writes_all_four_files() {
        let dir = tempfile::tempdir().unwrap();
        write_opaque_blobs(dir.path(), &spec()).await.unwrap();
        assert!(dir.path().join(HLF_KUBE_YAML).exists());
        assert!(dir.path().join(CHANNEL_FLOW_YAML).exists());
        assert!(dir.path().join(CHAINCODE_FLOW_YAML).exists());
        assert!(dir.path().join(PEER_ORG_FLOW_YAML).exists());
    }

    #[tokio::test]
    async fn write_operator_values_omits_host_aliases_key_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        write_operator_values(dir.path(), vec![]).await.unwrap();
        let text = fs::read_to_string(dir.path().join(OPERATOR_VALUES_YAML)).await.unwrap();
        assert_eq!(text.trim(), "{}");
    }
}
