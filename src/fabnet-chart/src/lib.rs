//! Chart Renderer (spec §4.2): owns the per-network scratch directory,
//! composes Helm value files, and drives Helm/`cryptogen`/`configtxgen` as
//! subprocesses (no Helm Rust SDK exists in the corpus this crate is
//! grounded on — see DESIGN.md for why a subprocess boundary replaces the
//! original's embedded `action.*` calls).

mod crypto_config;
pub mod host_alias;
mod readiness;
pub mod settings;
mod subprocess;
mod values;

use anyhow::{Context, Result};
use fabnet_store::{archive, ArtifactStore};
use fabnet_types::{FabricNetwork, FabricNetworkSpec, SECRET_CRYPTO_CONFIG, SECRET_GENESIS};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Service;
use kube::api::Api;
use kube::{Client, ResourceExt};
use settings::Settings;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareMode {
    /// Generate or import fresh artifacts; used at `New` entry.
    Fresh,
    /// Fetch previously-stored artifacts; used after a restart wiped the
    /// scratch directory (spec §9, "Scratch directory as hidden state").
    Reconstruct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Channel,
    Chaincode,
    PeerOrg,
}

impl FlowKind {
    fn value_file(self) -> &'static str {
        match self {
            FlowKind::Channel => values::CHANNEL_FLOW_YAML,
            FlowKind::Chaincode => values::CHAINCODE_FLOW_YAML,
            FlowKind::PeerOrg => values::PEER_ORG_FLOW_YAML,
        }
    }
}

pub struct ChartRenderer {
    namespace: String,
    settings: Settings,
    store: ArtifactStore,
    stateful_sets: Api<StatefulSet>,
    deployments: Api<Deployment>,
    services: Api<Service>,
}

impl ChartRenderer {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            settings: Settings::default(),
            store: ArtifactStore::new(client.clone(), namespace),
            stateful_sets: Api::namespaced(client.clone(), namespace),
            deployments: Api::namespaced(client.clone(), namespace),
            services: Api::namespaced(client, namespace),
        }
    }

    fn scratch_dir(&self, network_name: &str) -> PathBuf {
        self.settings.network_scratch_dir(&self.namespace, network_name)
    }

    /// Whether the scratch directory for `network_name` currently exists.
    /// Consulted at the top of every reconcile (spec §4.5,
    /// "Reconstruction") to decide whether to re-run `Prepare`.
    pub async fn scratch_dir_exists(&self, network_name: &str) -> bool {
        fs::metadata(self.scratch_dir(network_name)).await.is_ok()
    }

    #[instrument(skip(self, network))]
    pub async fn prepare(&self, network: &FabricNetwork, mode: PrepareMode) -> Result<()> {
        let dir = self.scratch_dir(&network.name_any());
        fs::create_dir_all(&dir).await?;
        copy_dir_recursive(&self.settings.pivt_dir, &dir).await?;

        let spec = &network.spec;
        values::write_network_and_crypto_config(&dir, spec).await?;
        values::write_opaque_blobs(&dir, spec).await?;

        self.materialize_configtx(&dir, spec).await?;

        match mode {
            PrepareMode::Fresh => {
                self.materialize_crypto_config_fresh(network, &dir).await?;
                self.materialize_genesis_fresh(network, &dir).await?;
            }
            PrepareMode::Reconstruct => {
                self.materialize_crypto_config_stored(&dir).await?;
                self.materialize_genesis_stored(&dir).await?;
            }
        }

        let host_aliases = host_alias::resolve(&self.services, &spec.host_aliases, false).await?;
        values::write_operator_values(&dir, host_aliases).await?;
        Ok(())
    }

    async fn materialize_configtx(&self, dir: &Path, spec: &FabricNetworkSpec) -> Result<()> {
        let secret_name = spec
            .configtx
            .secret
            .as_deref()
            .context("configtx.secret must be set by the time the operator reconciles")?;
        let data = self
            .store
            .read_secret(secret_name)
            .await?
            .with_context(|| format!("configtx secret {secret_name:?} not found"))?;
        let bytes = data
            .get(fabnet_types::SECRET_CONFIGTX)
            .with_context(|| format!("configtx secret {secret_name:?} missing key {:?}", fabnet_types::SECRET_CONFIGTX))?;
        fs::write(dir.join("configtx.yaml"), bytes).await?;
        Ok(())
    }

    async fn materialize_crypto_config_fresh(&self, network: &FabricNetwork, dir: &Path) -> Result<()> {
        if let Some(secret_name) = network.spec.crypto_config.secret.as_deref() {
            let data = self
                .store
                .read_secret(secret_name)
                .await?
                .with_context(|| format!("cryptoConfig secret {secret_name:?} not found"))?;
            let archive_bytes = data
                .get(SECRET_CRYPTO_CONFIG)
                .with_context(|| format!("cryptoConfig secret {secret_name:?} missing key {SECRET_CRYPTO_CONFIG:?}"))?;
            archive::uncompress(archive_bytes, &dir.join("crypto-config"))?;
        } else {
            subprocess::cryptogen_generate(dir).await?;
            let archive_bytes = archive::compress(&dir.join("crypto-config"))?;
            let mut data = BTreeMap::new();
            data.insert(SECRET_CRYPTO_CONFIG.to_string(), archive_bytes);
            self.store.ensure_secret(SECRET_CRYPTO_CONFIG, network, data).await?;
        }
        Ok(())
    }

    async fn materialize_crypto_config_stored(&self, dir: &Path) -> Result<()> {
        let data = self
            .store
            .read_secret(SECRET_CRYPTO_CONFIG)
            .await?
            .context("hlf-crypto-config secret not found during reconstruction")?;
        let archive_bytes = data
            .get(SECRET_CRYPTO_CONFIG)
            .context("hlf-crypto-config secret missing its archive key")?;
        archive::uncompress(archive_bytes, &dir.join("crypto-config"))?;
        Ok(())
    }

    async fn materialize_genesis_fresh(&self, network: &FabricNetwork, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir.join("channel-artifacts")).await?;
        if let Some(secret_name) = network.spec.genesis.secret.as_deref() {
            let data = self
                .store
                .read_secret(secret_name)
                .await?
                .with_context(|| format!("genesis secret {secret_name:?} not found"))?;
            let block = data
                .get(SECRET_GENESIS)
                .with_context(|| format!("genesis secret {secret_name:?} missing key {SECRET_GENESIS:?}"))?;
            fs::write(dir.join("channel-artifacts/genesis.block"), block).await?;
        } else {
            subprocess::configtxgen(dir, &network.spec.network.genesis_profile, &network.spec.network.system_channel_id).await?;
            let block = fs::read(dir.join("channel-artifacts/genesis.block")).await?;
            let mut data = BTreeMap::new();
            data.insert(SECRET_GENESIS.to_string(), block);
            self.store.ensure_secret(SECRET_GENESIS, network, data).await?;
        }
        Ok(())
    }

    async fn materialize_genesis_stored(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir.join("channel-artifacts")).await?;
        let data = self
            .store
            .read_secret(SECRET_GENESIS)
            .await?
            .context("hlf-genesis.block secret not found during reconstruction")?;
        let block = data.get(SECRET_GENESIS).context("hlf-genesis.block secret missing its key")?;
        fs::write(dir.join("channel-artifacts/genesis.block"), block).await?;
        Ok(())
    }

    /// `cryptogen extend`: preserves existing identities while accommodating
    /// grown peer counts or new orgs, then re-stores the crypto secret.
    #[instrument(skip(self, network))]
    pub async fn extend(&self, network: &FabricNetwork) -> Result<()> {
        let dir = self.scratch_dir(&network.name_any());
        values::write_network_and_crypto_config(&dir, &network.spec).await?;
        subprocess::cryptogen_extend(&dir).await?;
        let archive_bytes = archive::compress(&dir.join("crypto-config"))?;
        let mut data = BTreeMap::new();
        data.insert(SECRET_CRYPTO_CONFIG.to_string(), archive_bytes);
        self.store.ensure_secret(SECRET_CRYPTO_CONFIG, network, data).await?;
        Ok(())
    }

    #[instrument(skip(self, network))]
    pub async fn install(&self, network: &FabricNetwork) -> Result<()> {
        let dir = self.scratch_dir(&network.name_any());
        let value_files = self.base_value_files(&dir);
        let refs: Vec<&Path> = value_files.iter().map(PathBuf::as_path).collect();
        let mut overrides = values::inline_overrides(&network.spec);
        if network.spec.topology.use_actual_domains {
            overrides.push("peer.launchPods=false".to_string());
            overrides.push("orderer.launchPods=false".to_string());
        }
        subprocess::helm_install(&self.namespace, &dir, &refs, &overrides).await
    }

    #[instrument(skip(self, network))]
    pub async fn upgrade(&self, network: &FabricNetwork) -> Result<()> {
        let dir = self.scratch_dir(&network.name_any());
        let host_aliases = host_alias::resolve(&self.services, &network.spec.host_aliases, network.spec.topology.use_actual_domains).await?;
        values::write_operator_values(&dir, host_aliases).await?;
        let value_files = self.base_value_files(&dir);
        let refs: Vec<&Path> = value_files.iter().map(PathBuf::as_path).collect();
        let overrides = values::inline_overrides(&network.spec);
        subprocess::helm_upgrade(&self.namespace, &dir, &refs, &overrides).await
    }

    /// Conditional uninstall: only tears down the `hlf-kube` release if it
    /// still belongs to this network, per spec §4.2.
    #[instrument(skip(self))]
    pub async fn uninstall(&self, network_name: &str) -> Result<()> {
        match subprocess::helm_get_metadata(&self.namespace).await {
            Ok(metadata) if metadata_belongs_to(&metadata, network_name) => {
                subprocess::helm_uninstall(&self.namespace).await
            }
            Ok(_) => Ok(()),
            // No release to uninstall; best-effort per spec §4.5 deletion handling.
            Err(_) => Ok(()),
        }
    }

    #[instrument(skip(self))]
    pub async fn is_ready(&self) -> Result<bool> {
        readiness::is_ready(&self.stateful_sets, &self.deployments).await
    }

    #[instrument(skip(self, network))]
    pub async fn render_flow(
        &self,
        kind: FlowKind,
        network: &FabricNetwork,
        include_chaincodes: &[String],
    ) -> Result<String> {
        let dir = self.scratch_dir(&network.name_any());
        let flow_file = dir.join(kind.value_file());
        let value_files = flow_value_files(&dir, flow_file);
        let refs: Vec<&Path> = value_files.iter().map(PathBuf::as_path).collect();

        let mut overrides = values::inline_overrides(&network.spec);
        if kind == FlowKind::Chaincode {
            if let Some(version) = &network.spec.chaincode.version {
                overrides.push(format!("flow.chaincode.version={version}"));
            }
            if let Some(language) = &network.spec.chaincode.language {
                overrides.push(format!("flow.chaincode.language={language}"));
            }
            if !include_chaincodes.is_empty() {
                overrides.push(format!("flow.chaincode.include={}", include_chaincodes.join(",")));
            }
        }
        subprocess::helm_template(&self.namespace, &dir, &refs, &overrides).await
    }

    fn base_value_files(&self, dir: &Path) -> Vec<PathBuf> {
        base_value_files(dir)
    }
}

fn base_value_files(dir: &Path) -> Vec<PathBuf> {
    vec![
        dir.join(values::NETWORK_YAML),
        dir.join(values::CRYPTO_CONFIG_YAML),
        dir.join(values::OPERATOR_VALUES_YAML),
        dir.join(values::HLF_KUBE_YAML),
    ]
}

/// `base_value_files` with the flow-specific file spliced in immediately
/// before `hlf-kube.yaml`, so the user's `HlfKube` extension is the last
/// `-f` and wins any key collision against the flow's defaults (spec §4.2's
/// merge order).
fn flow_value_files(dir: &Path, flow_file: PathBuf) -> Vec<PathBuf> {
    vec![
        dir.join(values::NETWORK_YAML),
        dir.join(values::CRYPTO_CONFIG_YAML),
        dir.join(values::OPERATOR_VALUES_YAML),
        flow_file,
        dir.join(values::HLF_KUBE_YAML),
    ]
}

fn metadata_belongs_to(metadata: &str, network_name: &str) -> bool {
    metadata
        .lines()
        .find(|line| line.trim_start().starts_with(fabnet_types::CREATED_FOR_ANNOTATION))
        .map(|line| line.trim_end().ends_with(network_name))
        .unwrap_or(false)
}

async fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    let mut stack = vec![(src.to_path_buf(), dst.to_path_buf())];
    while let Some((src_dir, dst_dir)) = stack.pop() {
        fs::create_dir_all(&dst_dir).await?;
        let mut entries = fs::read_dir(&src_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let dst_path = dst_dir.join(entry.file_name());
            if file_type.is_dir() {
                stack.push((entry.path(), dst_path));
            } else {
                fs::copy(entry.path(), dst_path).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_kind_maps_to_expected_value_file() {
        assert_eq!(FlowKind::Channel.value_file(), values::CHANNEL_FLOW_YAML);
        assert_eq!(FlowKind::Chaincode.value_file(), values::CHAINCODE_FLOW_YAML);
        assert_eq!(FlowKind::PeerOrg.value_file(), values::PEER_ORG_FLOW_YAML);
    }

    #[test]
    fn flow_value_files_places_flow_file_before_hlf_kube() {
        let dir = PathBuf::from("/scratch/my-ns/my-network");
        let flow_file = dir.join(FlowKind::Chaincode.value_file());
        let files = flow_value_files(&dir, flow_file.clone());
        let names: Vec<&Path> = files.iter().map(PathBuf::as_path).collect();
        assert_eq!(
            names,
            vec![
                dir.join(values::NETWORK_YAML).as_path(),
                dir.join(values::CRYPTO_CONFIG_YAML).as_path(),
                dir.join(values::OPERATOR_VALUES_YAML).as_path(),
                flow_file.as_path(),
                dir.join(values::HLF_KUBE_YAML).as_path(),
            ]
        );
    }

    #[test]
    fn metadata_annotation_match_requires_exact_network_name() {
        let metadata = "ANNOTATIONS: raft.io/fabric-operator-created-for: my-network\n";
        assert!(metadata_belongs_to(metadata, "my-network"));
        assert!(!metadata_belongs_to(metadata, "other-network"));
    }

    #[tokio::test]
    async fn copy_dir_recursive_preserves_nested_structure_and_contents() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("templates/orderer")).unwrap();
        std::fs::write(src.path().join("Chart.yaml"), b"name: hlf-kube").unwrap();
        std::fs::write(src.path().join("templates/orderer/statefulset.yaml"), b"kind: StatefulSet").unwrap();

        let dst = tempfile::tempdir().unwrap();
        copy_dir_recursive(src.path(), dst.path()).await.unwrap();

        assert_eq!(std::fs::read(dst.path().join("Chart.yaml")).unwrap(), b"name: hlf-kube");
        assert_eq!(
            std::fs::read(dst.path().join("templates/orderer/statefulset.yaml")).unwrap(),
            b"kind: StatefulSet"
        );
    }
}
