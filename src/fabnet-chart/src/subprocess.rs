//! `cryptogen`/`configtxgen`/`helm` invocation. All three are external
//! tools; this module's job is just to run them with the right working
//! directory and arguments and turn a non-zero exit into an error carrying
//! combined stdout+stderr (spec §7, matching the original's
//! `cmd.CombinedOutput()` + log pattern).
//!
//! `tokio::process::Command` rather than `std::process::Command`: the
//! reconcile loop runs on the async executor and must not block it while a
//! subprocess runs (the same reasoning behind `mz-orchestrator-process`'s
//! choice of `tokio::process` for its own subprocess-adjacent work).

use anyhow::{bail, Result};
use fabnet_types::HELM_RELEASE_NAME;
use std::path::Path;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{instrument, warn};

/// Guards the single `HELM_NAMESPACE` environment variable against
/// concurrent reconciles of different networks racing each other's Helm
/// invocations. This is the less-preferred of the two options spec §9
/// discusses; the preferred option (thread the namespace through a
/// constructor) isn't available because there is no Helm Rust SDK to
/// construct — `helm` is a subprocess here. See DESIGN.md.
static HELM_NAMESPACE_MUTEX: Mutex<()> = Mutex::const_new(());

#[instrument(skip(working_dir))]
pub async fn cryptogen_generate(working_dir: &Path) -> Result<()> {
    run(
        Command::new("cryptogen")
            .args(["generate", "--config", "./crypto-config.yaml", "--output", "crypto-config"])
            .current_dir(working_dir),
    )
    .await
}

#[instrument(skip(working_dir))]
pub async fn cryptogen_extend(working_dir: &Path) -> Result<()> {
    run(
        Command::new("cryptogen")
            .args(["extend", "--config", "./crypto-config.yaml", "--input", "crypto-config"])
            .current_dir(working_dir),
    )
    .await
}

#[instrument(skip(working_dir))]
pub async fn configtxgen(working_dir: &Path, genesis_profile: &str, system_channel_id: &str) -> Result<()> {
    run(
        Command::new("configtxgen")
            .args([
                "-profile",
                genesis_profile,
                "-channelID",
                system_channel_id,
                "-outputBlock",
                "./channel-artifacts/genesis.block",
            ])
            .current_dir(working_dir),
    )
    .await
}

/// Runs `helm install`, serialized against other namespaces via
/// [`HELM_NAMESPACE_MUTEX`].
#[instrument(skip(working_dir, value_files))]
pub async fn helm_install(namespace: &str, working_dir: &Path, value_files: &[&Path], set_values: &[String]) -> Result<()> {
    let _guard = HELM_NAMESPACE_MUTEX.lock().await;
    std::env::set_var("HELM_NAMESPACE", namespace);
    let mut cmd = Command::new("helm");
    cmd.arg("install").arg(HELM_RELEASE_NAME).arg(".").current_dir(working_dir);
    apply_values(&mut cmd, value_files, set_values);
    run(&mut cmd).await
}

#[instrument(skip(working_dir, value_files))]
pub async fn helm_upgrade(namespace: &str, working_dir: &Path, value_files: &[&Path], set_values: &[String]) -> Result<()> {
    let _guard = HELM_NAMESPACE_MUTEX.lock().await;
    std::env::set_var("HELM_NAMESPACE", namespace);
    let mut cmd = Command::new("helm");
    cmd.arg("upgrade").arg(HELM_RELEASE_NAME).arg(".").current_dir(working_dir);
    apply_values(&mut cmd, value_files, set_values);
    run(&mut cmd).await
}

#[instrument]
pub async fn helm_uninstall(namespace: &str) -> Result<()> {
    let _guard = HELM_NAMESPACE_MUTEX.lock().await;
    std::env::set_var("HELM_NAMESPACE", namespace);
    run(Command::new("helm").arg("uninstall").arg(HELM_RELEASE_NAME)).await
}

/// Returns `helm get metadata`'s stdout, used by `Uninstall` to verify the
/// release it is about to tear down was created for this network (the
/// chart annotation, not a label, is the source of truth here — matching
/// the original's `raft.io/fabric-operator-created-for` annotation check).
#[instrument]
pub async fn helm_get_metadata(namespace: &str) -> Result<String> {
    let _guard = HELM_NAMESPACE_MUTEX.lock().await;
    std::env::set_var("HELM_NAMESPACE", namespace);
    let output = Command::new("helm")
        .args(["get", "metadata", HELM_RELEASE_NAME])
        .output()
        .await?;
    if !output.status.success() {
        bail!(
            "helm get metadata failed (exit {}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `helm template` dry-run render used by `RenderFlow`; output is returned
/// rather than discarded.
#[instrument(skip(working_dir, value_files))]
pub async fn helm_template(namespace: &str, working_dir: &Path, value_files: &[&Path], set_values: &[String]) -> Result<String> {
    let _guard = HELM_NAMESPACE_MUTEX.lock().await;
    std::env::set_var("HELM_NAMESPACE", namespace);
    let mut cmd = Command::new("helm");
    cmd.arg("template").arg(HELM_RELEASE_NAME).arg(".").current_dir(working_dir);
    apply_values(&mut cmd, value_files, set_values);
    let output = cmd.output().await?;
    if !output.status.success() {
        bail!(
            "helm template failed (exit {}): {}{}",
            output.status,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn apply_values(cmd: &mut Command, value_files: &[&Path], set_values: &[String]) {
    for file in value_files {
        cmd.arg("-f").arg(file);
    }
    for set in set_values {
        cmd.arg("--set").arg(set);
    }
}

async fn run(cmd: &mut Command) -> Result<()> {
    let output = cmd.output().await?;
    if !output.status.success() {
        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        warn!(status = %output.status, output = %combined, "subprocess failed");
        bail!("subprocess failed (exit {}): {combined}", output.status);
    }
    Ok(())
}
