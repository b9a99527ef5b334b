//! Binary-level settings: the handful of CLI flags the operator binary
//! itself takes, layered with env vars the same way `fabnet_chart::settings`
//! does, so both agree across a restart with no configuration drift.

use clap::Parser;

#[derive(Debug, Parser)]
#[clap(name = "fabnet-operator", about = "Reconciles FabricNetwork resources against a Hyperledger Fabric deployment.")]
pub struct Args {
    /// kubeconfig context to use; defaults to the in-cluster config when unset.
    #[clap(long, env = "FBOP_KUBE_CONTEXT")]
    pub kube_context: Option<String>,

    /// tracing-subscriber env-filter directive, e.g. "info" or "fabnet_operator=debug".
    #[clap(long, env = "FBOP_LOG_FILTER", default_value = "info")]
    pub log_filter: String,
}
