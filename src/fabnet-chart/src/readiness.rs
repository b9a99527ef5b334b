//! `IsReady` (spec §4.2): every StatefulSet/Deployment managed by the
//! `hlf-kube` Helm release must have `readyReplicas == spec.replicas`.
//! Grounded on the original controller's `isHelmChartReady` — same two
//! list calls, same `meta.helm.sh/release-name` annotation filter.

use anyhow::Result;
use fabnet_types::HELM_RELEASE_NAME;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::api::{Api, ListParams};

const MANAGED_BY_HELM: &str = "app.kubernetes.io/managed-by=Helm";
const RELEASE_NAME_ANNOTATION: &str = "meta.helm.sh/release-name";

pub async fn is_ready(stateful_sets: &Api<StatefulSet>, deployments: &Api<Deployment>) -> Result<bool> {
    let list_params = ListParams::default().labels(MANAGED_BY_HELM);

    let sts_list = stateful_sets.list(&list_params).await?;
    for sts in &sts_list.items {
        if !belongs_to_release(sts.metadata.annotations.as_ref()) {
            continue;
        }
        let spec = sts.spec.as_ref();
        let wanted = spec.and_then(|s| s.replicas).unwrap_or(0);
        let ready = sts.status.as_ref().map(|s| s.ready_replicas.unwrap_or(0)).unwrap_or(0);
        if wanted != ready {
            return Ok(false);
        }
    }

    let deploy_list = deployments.list(&list_params).await?;
    for deploy in &deploy_list.items {
        if !belongs_to_release(deploy.metadata.annotations.as_ref()) {
            continue;
        }
        let spec = deploy.spec.as_ref();
        let wanted = spec.and_then(|s| s.replicas).unwrap_or(0);
        let ready = deploy.status.as_ref().map(|s| s.ready_replicas.unwrap_or(0)).unwrap_or(0);
        if wanted != ready {
            return Ok(false);
        }
    }

    Ok(true)
}

fn belongs_to_release(annotations: Option<&std::collections::BTreeMap<String, String>>) -> bool {
    annotations
        .and_then(|a| a.get(RELEASE_NAME_ANNOTATION))
        .map(|name| name == HELM_RELEASE_NAME)
        .unwrap_or(false)
}
