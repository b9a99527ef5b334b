//! The `crypto-config.yaml` descriptor `cryptogen` reads, built from
//! `Topology`. Field names and shape are kept byte-for-byte compatible with
//! the original controller's `newCryptoConfig` (`fabric_util.go`) so a
//! chart copied from an existing deployment parses the same way regardless
//! of which controller produced it.

use fabnet_types::Topology;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CryptoConfigDoc {
    #[serde(rename = "OrdererOrgs")]
    pub orderer_orgs: Vec<OrdererOrgEntry>,
    #[serde(rename = "PeerOrgs")]
    pub peer_orgs: Vec<PeerOrgEntry>,
}

#[derive(Debug, Serialize)]
pub struct OrdererOrgEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Domain")]
    pub domain: String,
    #[serde(rename = "EnableNodeOUs")]
    pub enable_node_ous: bool,
    #[serde(rename = "Specs")]
    pub specs: Vec<HostSpec>,
}

#[derive(Debug, Serialize)]
pub struct HostSpec {
    #[serde(rename = "Hostname")]
    pub hostname: String,
}

#[derive(Debug, Serialize)]
pub struct PeerOrgEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Domain")]
    pub domain: String,
    #[serde(rename = "EnableNodeOUs")]
    pub enable_node_ous: bool,
    #[serde(rename = "Template")]
    pub template: Count,
    #[serde(rename = "Users")]
    pub users: Count,
}

#[derive(Debug, Serialize)]
pub struct Count {
    #[serde(rename = "Count")]
    pub count: u32,
}

pub fn build(topology: &Topology) -> CryptoConfigDoc {
    CryptoConfigDoc {
        orderer_orgs: topology
            .orderer_orgs
            .iter()
            .map(|o| OrdererOrgEntry {
                name: o.name.clone(),
                domain: o.domain.clone(),
                enable_node_ous: true,
                specs: o.hostnames.iter().map(|h| HostSpec { hostname: h.clone() }).collect(),
            })
            .collect(),
        peer_orgs: topology
            .peer_orgs
            .iter()
            .map(|p| PeerOrgEntry {
                name: p.name.clone(),
                domain: p.domain.clone(),
                enable_node_ous: true,
                template: Count { count: p.peer_count },
                users: Count { count: 1 },
            })
            .collect(),
    }
}
