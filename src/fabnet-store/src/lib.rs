//! Artifact Store (spec §4.1): idempotent secret/config-map CRUD over a
//! namespace, plus the archive convention used to carry crypto material and
//! chaincode payloads as opaque blobs inside secrets/config-maps.

pub mod archive;

use anyhow::Result;
use fabnet_types::FabricNetwork;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::instrument;

/// Field manager name stamped on every server-side apply this crate issues,
/// so a human auditing `kubectl get -o yaml` can see who owns the field.
const FIELD_MANAGER: &str = "fabnet-operator";

/// Idempotent secret/config-map access for one namespace.
pub struct ArtifactStore {
    secrets: Api<Secret>,
    config_maps: Api<ConfigMap>,
}

impl ArtifactStore {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            secrets: Api::namespaced(client.clone(), namespace),
            config_maps: Api::namespaced(client, namespace),
        }
    }

    /// Creates `name` if absent, or updates it in place if present, with an
    /// owner reference to `owner` so cascade-delete tears it down with the
    /// `FabricNetwork` (invariant 3). `data` keys become secret data keys;
    /// values are raw bytes (already gzip-tar compressed where applicable).
    #[instrument(skip(self, owner, data))]
    pub async fn ensure_secret(
        &self,
        name: &str,
        owner: &FabricNetwork,
        data: BTreeMap<String, Vec<u8>>,
    ) -> Result<()> {
        let secret = Secret {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some(name.to_string()),
                owner_references: Some(vec![owner_reference(owner)]),
                ..Default::default()
            },
            data: Some(
                data.into_iter()
                    .map(|(k, v)| (k, k8s_openapi::ByteString(v)))
                    .collect(),
            ),
            ..Default::default()
        };
        self.secrets
            .patch(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(secret))
            .await?;
        Ok(())
    }

    /// Returns `Ok(None)` rather than an error when the secret does not
    /// exist, distinguishing not-found from a transient failure per spec
    /// §4.1.
    #[instrument(skip(self))]
    pub async fn read_secret(&self, name: &str) -> Result<Option<BTreeMap<String, Vec<u8>>>> {
        match self.secrets.get(name).await {
            Ok(secret) => Ok(Some(
                secret
                    .data
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(k, v)| (k, v.0))
                    .collect(),
            )),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn exists_secret(&self, name: &str) -> Result<bool> {
        match self.secrets.get(name).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn exists_config_map(&self, name: &str) -> Result<bool> {
        match self.config_maps.get(name).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn owner_reference(owner: &FabricNetwork) -> OwnerReference {
    OwnerReference {
        api_version: FabricNetwork::api_version(&()).to_string(),
        kind: FabricNetwork::kind(&()).to_string(),
        name: owner.name_any(),
        uid: owner.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}
