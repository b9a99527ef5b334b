//! Host-alias discovery for the second install pass under "use actual
//! domains" mode: services labeled `addToHostAliases=true` contribute their
//! cluster IP, aliased to their `fqdn` label, matching the original
//! controller's `getHostAliases` (`helm_util.go`).

use anyhow::Result;
use fabnet_types::HostAlias;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, ListParams};

const ADD_TO_HOST_ALIASES_LABEL: &str = "addToHostAliases=true";
const FQDN_LABEL: &str = "fqdn";

/// Merges user-supplied host aliases with any auto-discovered from labeled
/// services. Auto-discovery only runs when `use_actual_domains` is set;
/// otherwise the user-supplied list passes through unchanged.
pub async fn resolve(
    services: &Api<Service>,
    user_supplied: &[HostAlias],
    use_actual_domains: bool,
) -> Result<Vec<HostAlias>> {
    let mut aliases = user_supplied.to_vec();
    if !use_actual_domains {
        return Ok(aliases);
    }

    let list = services
        .list(&ListParams::default().labels(ADD_TO_HOST_ALIASES_LABEL))
        .await?;
    for svc in list.items {
        let ip = svc.spec.as_ref().and_then(|s| s.cluster_ip.clone()).unwrap_or_default();
        let fqdn = svc
            .metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(FQDN_LABEL))
            .cloned()
            .unwrap_or_default();
        aliases.push(HostAlias { ip, hostnames: vec![fqdn] });
    }
    Ok(aliases)
}
