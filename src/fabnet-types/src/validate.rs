//! The seven invariants of spec §3, checked at the reconciler's empty→`New`
//! and `Invalid`→empty transitions. Kept here rather than in
//! `fabnet-operator` so the rules can be unit tested without any cluster
//! dependency.

use crate::FabricNetworkSpec;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invariant 4: `tlsEnabled` without `useActualDomains`.
    TlsRequiresActualDomains,
    /// Invariant 5: a source resolved to neither or both of file/secret.
    AmbiguousSource { field: &'static str },
    /// Invariant 6: genesis supplied without matching crypto material.
    GenesisWithoutCryptoConfig,
    /// Invariant 7: a chaincode entry has no version or no language
    /// available from either the entry or the global defaults.
    ChaincodeMissingField { chaincode: String, field: &'static str },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::TlsRequiresActualDomains => {
                write!(f, "topology.tlsEnabled requires topology.useActualDomains")
            }
            ValidationError::AmbiguousSource { field } => {
                write!(f, "{field} must resolve to exactly one of file or secret")
            }
            ValidationError::GenesisWithoutCryptoConfig => write!(
                f,
                "genesis is user-supplied but cryptoConfig is not; identities must match"
            ),
            ValidationError::ChaincodeMissingField { chaincode, field } => {
                write!(f, "chaincode {chaincode:?} has no {field} (neither entry nor global default)")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Runs every invariant, returning every violation found (not just the
/// first) so `Status.message` can report the complete set in one pass.
pub fn validate(spec: &FabricNetworkSpec) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if spec.topology.tls_enabled && !spec.topology.use_actual_domains {
        errors.push(ValidationError::TlsRequiresActualDomains);
    }

    if !exactly_one(&spec.configtx.file, &spec.configtx.secret) {
        errors.push(ValidationError::AmbiguousSource { field: "configtx" });
    }
    if spec.genesis.is_provided() && !exactly_one(&spec.genesis.file, &spec.genesis.secret) {
        errors.push(ValidationError::AmbiguousSource { field: "genesis" });
    }
    if spec.crypto_config.is_provided()
        && !exactly_one(&spec.crypto_config.file, &spec.crypto_config.secret)
    {
        errors.push(ValidationError::AmbiguousSource { field: "cryptoConfig" });
    }

    if spec.genesis.is_provided() && !spec.crypto_config.is_provided() {
        errors.push(ValidationError::GenesisWithoutCryptoConfig);
    }

    for cc in &spec.network.chaincodes {
        let version = cc.version.as_ref().or(spec.chaincode.version.as_ref());
        let language = cc.language.as_ref().or(spec.chaincode.language.as_ref());
        if version.is_none() {
            errors.push(ValidationError::ChaincodeMissingField {
                chaincode: cc.name.clone(),
                field: "version",
            });
        }
        if language.is_none() {
            errors.push(ValidationError::ChaincodeMissingField {
                chaincode: cc.name.clone(),
                field: "language",
            });
        }
    }

    errors
}

fn exactly_one(file: &Option<String>, secret: &Option<String>) -> bool {
    file.is_some() ^ secret.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Chaincode, ChaincodeDefaults, Network, SourceRef, Topology};

    fn base_spec() -> FabricNetworkSpec {
        FabricNetworkSpec {
            configtx: SourceRef { file: None, secret: Some("hlf-configtx.yaml".into()) },
            genesis: SourceRef::default(),
            crypto_config: SourceRef::default(),
            chaincode: ChaincodeDefaults {
                version: Some("1.0".into()),
                language: Some("golang".into()),
                folder: None,
            },
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
    fn valid_minimal_spec_has_no_errors() {
        assert!(validate(&base_spec()).is_empty());
    }

    #[test]
    fn tls_without_actual_domains_is_rejected() {
        let mut spec = base_spec();
        spec.topology.tls_enabled = true;
        spec.topology.use_actual_domains = false;
        assert_eq!(validate(&spec), vec![ValidationError::TlsRequiresActualDomains]);
    }

    #[test]
    fn tls_with_actual_domains_is_fine() {
        let mut spec = base_spec();
        spec.topology.tls_enabled = true;
        spec.topology.use_actual_domains = true;
        assert!(validate(&spec).is_empty());
    }

    #[test]
    fn configtx_with_neither_source_is_rejected() {
        let mut spec = base_spec();
        spec.configtx = SourceRef::default();
        assert_eq!(validate(&spec), vec![ValidationError::AmbiguousSource { field: "configtx" }]);
    }

    #[test]
    fn configtx_with_both_sources_is_rejected() {
        let mut spec = base_spec();
        spec.configtx = SourceRef { file: Some("a".into()), secret: Some("b".into()) };
        assert_eq!(validate(&spec), vec![ValidationError::AmbiguousSource { field: "configtx" }]);
    }

    #[test]
    fn genesis_optional_when_absent() {
        let spec = base_spec();
        assert!(!spec.genesis.is_provided());
        assert!(validate(&spec).is_empty());
    }

    #[test]
    fn genesis_without_crypto_config_is_rejected() {
        let mut spec = base_spec();
        spec.genesis = SourceRef { file: None, secret: Some("hlf-genesis.block".into()) };
        assert!(validate(&spec).contains(&ValidationError::GenesisWithoutCryptoConfig));
    }

    #[test]
    fn genesis_with_crypto_config_is_fine() {
        let mut spec = base_spec();
        spec.genesis = SourceRef { file: None, secret: Some("hlf-genesis.block".into()) };
        spec.crypto_config = SourceRef { file: None, secret: Some("hlf-crypto-config".into()) };
        assert!(validate(&spec).is_empty());
    }

    #[test]
    fn chaincode_inherits_global_defaults() {
        let mut spec = base_spec();
        spec.network.chaincodes.push(Chaincode {
            name: "asset-transfer".into(),
            version: None,
            language: None,
            peer_orgs: vec![],
            channels: vec![],
        });
        assert!(validate(&spec).is_empty());
    }

    #[test]
    fn chaincode_missing_both_global_and_entry_version_is_rejected() {
        let mut spec = base_spec();
        spec.chaincode.version = None;
        spec.network.chaincodes.push(Chaincode {
            name: "asset-transfer".into(),
            version: None,
            language: Some("golang".into()),
            peer_orgs: vec![],
            channels: vec![],
        });
        let errors = validate(&spec);
        assert_eq!(
            errors,
            vec![ValidationError::ChaincodeMissingField {
                chaincode: "asset-transfer".into(),
                field: "version",
            }]
        );
    }

    #[test]
    fn chaincode_entry_override_satisfies_missing_global() {
        let mut spec = base_spec();
        spec.chaincode.language = None;
        spec.network.chaincodes.push(Chaincode {
            name: "asset-transfer".into(),
            version: None,
            language: Some("java".into()),
            peer_orgs: vec![],
            channels: vec![],
        });
        assert!(validate(&spec).is_empty());
    }
}
