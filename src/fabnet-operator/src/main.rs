//! Binary entrypoint: installs a `tracing` subscriber, builds a `kube`
//! client, and runs the `Controller` loop over `FabricNetwork`, the one
//! cluster-wide custom resource this operator watches.

mod config;
mod decision;
mod error;
mod reconciler;

use clap::Parser;
use config::Args;
use fabnet_types::FabricNetwork;
use futures::StreamExt;
use kube::api::Api;
use kube::runtime::{controller::Controller, watcher::Config as WatcherConfig};
use kube::Client;
use reconciler::Context;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(args.log_filter))
        .init();

    let client = build_client(args.kube_context.as_deref()).await?;
    let networks: Api<FabricNetwork> = Api::all(client.clone());

    info!("starting fabnet-operator reconcile loop");
    Controller::new(networks, WatcherConfig::default())
        .run(reconciler::reconcile, reconciler::error_policy, Arc::new(Context { client }))
        .for_each(|result| async move {
            match result {
                Ok((object_ref, _action)) => info!(name = %object_ref.name, "reconciled"),
                Err(err) => error!(%err, "reconcile failed"),
            }
        })
        .await;

    Ok(())
}

async fn build_client(context: Option<&str>) -> anyhow::Result<Client> {
    match context {
        Some(context) => {
            let options = kube::config::KubeConfigOptions {
                context: Some(context.to_string()),
                ..Default::default()
            };
            let config = kube::Config::from_kubeconfig(&options).await?;
            Ok(Client::try_from(config)?)
        }
        None => Ok(Client::try_default().await?),
    }
}
