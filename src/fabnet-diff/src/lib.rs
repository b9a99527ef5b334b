//! The Change Detector (spec §4.3): a pure function from `(spec,
//! last-reconciled snapshot)` to a flag bundle the reconciler's Ready-state
//! dispatch rules interpret. No cluster access, no hidden state — every
//! test here is a plain `#[test]`.

use fabnet_types::{Chaincode, ChaincodeDefaults, Channel, FabricNetworkSpec, StatusSnapshot, Topology};
use std::collections::BTreeSet;

/// The full flag bundle spec §4.3 lists. `chaincodes` is empty to mean "run
/// for all"; a non-empty set is the narrowed list of changed chaincode
/// names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub topology: bool,
    pub channel: bool,
    pub chaincode: bool,
    pub chaincodes: Vec<String>,
    pub orderer_orgs: bool,
    pub peer_orgs: bool,
    pub peer_count_increase: bool,
    pub peer_count_decrease: bool,
    pub version: bool,
}

impl ChangeSet {
    /// True iff nothing in the spec differs from the snapshot.
    pub fn is_empty(&self) -> bool {
        !self.topology && !self.channel && !self.chaincode
    }
}

/// Builds the `Status` snapshot a successful transition out of `empty` or a
/// changed `Ready` pass writes, capturing exactly the fields this crate
/// diffs against on the next pass.
pub fn snapshot_of(spec: &FabricNetworkSpec) -> StatusSnapshot {
    StatusSnapshot {
        topology: Some(spec.topology.clone()),
        channels: spec.network.channels.clone(),
        chaincode: spec.chaincode.clone(),
        chaincodes: spec.network.chaincodes.clone(),
    }
}

pub fn diff(spec: &FabricNetworkSpec, snapshot: &StatusSnapshot) -> ChangeSet {
    let topology_changed = match &snapshot.topology {
        Some(prev) => prev != &spec.topology,
        None => true,
    };

    let (orderer_orgs, peer_orgs, peer_count_increase, peer_count_decrease) = match &snapshot.topology {
        Some(prev) => topology_org_diff(prev, &spec.topology),
        None => (true, true, false, false),
    };

    let version = match &snapshot.topology {
        Some(prev) => prev.fabric_version != spec.topology.fabric_version,
        None => true,
    };

    let channel = channel_lists_differ(&snapshot.channels, &spec.network.channels);

    let (chaincode, chaincodes) = chaincode_diff(&snapshot.chaincode, &snapshot.chaincodes, &spec.chaincode, &spec.network.chaincodes);

    ChangeSet {
        topology: topology_changed,
        channel,
        chaincode,
        chaincodes,
        orderer_orgs,
        peer_orgs,
        peer_count_increase,
        peer_count_decrease,
        version,
    }
}

fn topology_org_diff(prev: &Topology, next: &Topology) -> (bool, bool, bool, bool) {
    let prev_orderer_names: BTreeSet<&str> = prev.orderer_orgs.iter().map(|o| o.name.as_str()).collect();
    let next_orderer_names: BTreeSet<&str> = next.orderer_orgs.iter().map(|o| o.name.as_str()).collect();
    let orderer_orgs = prev_orderer_names != next_orderer_names;

    let prev_peer_names: BTreeSet<&str> = prev.peer_orgs.iter().map(|p| p.name.as_str()).collect();
    let next_peer_names: BTreeSet<&str> = next.peer_orgs.iter().map(|p| p.name.as_str()).collect();
    let peer_orgs = prev_peer_names != next_peer_names;

    let mut peer_count_increase = false;
    let mut peer_count_decrease = false;
    for next_org in &next.peer_orgs {
        if let Some(prev_org) = prev.peer_orgs.iter().find(|p| p.name == next_org.name) {
            if next_org.peer_count > prev_org.peer_count {
                peer_count_increase = true;
            } else if next_org.peer_count < prev_org.peer_count {
                peer_count_decrease = true;
            }
        }
    }

    (orderer_orgs, peer_orgs, peer_count_increase, peer_count_decrease)
}

fn channel_lists_differ(prev: &[Channel], next: &[Channel]) -> bool {
    prev != next
}

/// Returns `(chaincode_changed, narrowed_names)`. The narrowing applies only
/// when global defaults are unchanged, the list length is unchanged, and
/// entries line up by name in the same order — i.e. the change is limited to
/// modifying existing named entries, not adding/removing/reordering them.
/// Any other kind of change (including additions/removals) reports the full
/// `chaincode=true` with an empty `chaincodes`, meaning "run for all".
fn chaincode_diff(
    prev_defaults: &ChaincodeDefaults,
    prev_list: &[Chaincode],
    next_defaults: &ChaincodeDefaults,
    next_list: &[Chaincode],
) -> (bool, Vec<String>) {
    if prev_defaults == next_defaults && prev_list == next_list {
        return (false, Vec::new());
    }

    let defaults_unchanged = prev_defaults == next_defaults;
    let same_length = prev_list.len() == next_list.len();
    let same_order = same_length
        && prev_list
            .iter()
            .zip(next_list.iter())
            .all(|(p, n)| p.name == n.name);

    if defaults_unchanged && same_length && same_order {
        let changed: Vec<String> = prev_list
            .iter()
            .zip(next_list.iter())
            .filter(|(p, n)| p != n)
            .map(|(_, n)| n.name.clone())
            .collect();
        (true, changed)
    } else {
        (true, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabnet_types::{CcChannel, OrdererOrg, PeerOrg};

    fn topology(peer_orgs: Vec<(&str, u32)>) -> Topology {
        Topology {
            fabric_version: "2.5".into(),
            tls_enabled: false,
            use_actual_domains: false,
            orderer_orgs: vec![OrdererOrg { name: "OrdererOrg".into(), domain: "example.com".into(), hostnames: vec!["orderer0".into()] }],
            peer_orgs: peer_orgs
                .into_iter()
                .map(|(name, count)| PeerOrg { name: name.into(), domain: "example.com".into(), peer_count: count })
                .collect(),
        }
    }

    fn spec_with_topology(t: Topology) -> FabricNetworkSpec {
        let mut spec = base_spec();
        spec.topology = t;
        spec
    }

    fn base_spec() -> FabricNetworkSpec {
        FabricNetworkSpec {
            configtx: fabnet_types::SourceRef { file: None, secret: Some("hlf-configtx.yaml".into()) },
            genesis: Default::default(),
            crypto_config: Default::default(),
            chaincode: ChaincodeDefaults { version: Some("1.0".into()), language: Some("golang".into()), folder: None },
            topology: topology(vec![("Org1", 2)]),
            network: fabnet_types::Network {
                genesis_profile: "OneOrgGenesis".into(),
                system_channel_id: "system-channel".into(),
                channels: vec![Channel { name: "mychannel".into(), peer_orgs: vec!["Org1".into()] }],
                chaincodes: vec![Chaincode {
                    name: "asset-transfer".into(),
                    version: None,
                    language: None,
                    peer_orgs: vec!["Org1".into()],
                    channels: vec![CcChannel { channel: "mychannel".into(), policy: "OR('Org1MSP.member')".into() }],
                }],
            },
            host_aliases: vec![],
            hlf_kube: Default::default(),
            channel_flow: Default::default(),
            chaincode_flow: Default::default(),
            peer_org_flow: Default::default(),
            force_state: None,
        }
    }

    fn snapshot_from(spec: &FabricNetworkSpec) -> StatusSnapshot {
        snapshot_of(spec)
    }

    #[test]
    fn no_change_is_empty() {
        let spec = base_spec();
        let snapshot = snapshot_from(&spec);
        let cs = diff(&spec, &snapshot);
        assert!(cs.is_empty());
        assert!(!cs.peer_count_increase);
        assert!(!cs.peer_count_decrease);
    }

    #[test]
    fn peer_count_increase_by_one_triggers_increase_only() {
        let prev = base_spec();
        let snapshot = snapshot_from(&prev);
        let next = spec_with_topology(topology(vec![("Org1", 3)]));
        let cs = diff(&next, &snapshot);
        assert!(cs.topology);
        assert!(cs.peer_count_increase);
        assert!(!cs.peer_count_decrease);
        assert!(!cs.peer_orgs);
        assert!(!cs.orderer_orgs);
    }

    #[test]
    fn new_peer_org_triggers_peer_orgs_and_count_increase() {
        let prev = base_spec();
        let snapshot = snapshot_from(&prev);
        let next = spec_with_topology(topology(vec![("Org1", 2), ("Org2", 1)]));
        let cs = diff(&next, &snapshot);
        assert!(cs.topology);
        assert!(cs.peer_orgs);
        assert!(cs.peer_count_increase);
        assert!(!cs.orderer_orgs);
    }

    #[test]
    fn chaincode_version_change_narrows_to_that_name() {
        let prev = base_spec();
        let snapshot = snapshot_from(&prev);
        let mut next = prev.clone();
        next.network.chaincodes[0].version = Some("2.0".into());
        let cs = diff(&next, &snapshot);
        assert!(cs.chaincode);
        assert_eq!(cs.chaincodes, vec!["asset-transfer".to_string()]);
        assert!(!cs.topology);
        assert!(!cs.channel);
    }

    #[test]
    fn adding_a_chaincode_runs_for_all() {
        let prev = base_spec();
        let snapshot = snapshot_from(&prev);
        let mut next = prev.clone();
        next.network.chaincodes.push(Chaincode {
            name: "second-cc".into(),
            version: None,
            language: None,
            peer_orgs: vec!["Org1".into()],
            channels: vec![],
        });
        let cs = diff(&next, &snapshot);
        assert!(cs.chaincode);
        assert!(cs.chaincodes.is_empty());
    }

    #[test]
    fn global_chaincode_default_change_runs_for_all() {
        let prev = base_spec();
        let snapshot = snapshot_from(&prev);
        let mut next = prev.clone();
        next.chaincode.version = Some("3.0".into());
        let cs = diff(&next, &snapshot);
        assert!(cs.chaincode);
        assert!(cs.chaincodes.is_empty());
    }

    #[test]
    fn channel_member_change_sets_channel_flag() {
        let prev = base_spec();
        let snapshot = snapshot_from(&prev);
        let mut next = prev.clone();
        next.network.channels[0].peer_orgs.push("Org2".into());
        let cs = diff(&next, &snapshot);
        assert!(cs.channel);
        assert!(!cs.topology);
        assert!(!cs.chaincode);
    }

    #[test]
    fn fabric_version_bump_sets_version_flag() {
        let prev = base_spec();
        let snapshot = snapshot_from(&prev);
        let mut next = prev.clone();
        next.topology.fabric_version = "2.6".into();
        let cs = diff(&next, &snapshot);
        assert!(cs.version);
        assert!(cs.topology);
    }

    #[test]
    fn orderer_org_addition_sets_orderer_orgs_only() {
        let prev = base_spec();
        let snapshot = snapshot_from(&prev);
        let mut next = prev.clone();
        next.topology.orderer_orgs.push(OrdererOrg { name: "OrdererOrg2".into(), domain: "example.com".into(), hostnames: vec!["orderer1".into()] });
        let cs = diff(&next, &snapshot);
        assert!(cs.orderer_orgs);
        assert!(!cs.peer_orgs);
        assert!(cs.topology);
    }
}
