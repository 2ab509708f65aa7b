use crate::metadata::InstanceMetadata;
use anyhow::{anyhow, Context, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{info, warn};

const PREREQUISITE_PACKAGES: &[&str] = &["tmux", "unzip", "jq", "curl"];

const PROVIDER_CLI_URL: &str =
    "https://github.com/digitalocean/doctl/releases/download/v1.104.0/doctl-1.104.0-linux-amd64.tar.gz";

/// Host preparation before any job work: wait out the platform's own
/// package manager, install prerequisites, set the hostname, and make sure
/// the companion provider CLI is available for operators who attach later.
pub async fn prepare(meta: &InstanceMetadata) -> Result<()> {
    wait_for_apt_lock().await?;
    install_packages().await?;
    set_hostname(&meta.hostname).await;
    ensure_provider_cli().await?;
    Ok(())
}

/// Ubuntu runs unattended-upgrades on first boot; apt is unusable until it
/// releases the dpkg lock.
async fn wait_for_apt_lock() -> Result<()> {
    for _ in 0..120 {
        let held = Command::new("fuser")
            .arg("/var/lib/dpkg/lock-frontend")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false);
        if !held {
            return Ok(());
        }
        info!("waiting for the package manager lock to be released");
        sleep(Duration::from_secs(5)).await;
    }
    Err(anyhow!("package manager lock was never released"))
}

async fn install_packages() -> Result<()> {
    info!("installing prerequisite packages: {:?}", PREREQUISITE_PACKAGES);
    let status = Command::new("apt-get")
        .arg("install")
        .arg("-y")
        .args(PREREQUISITE_PACKAGES)
        .env("DEBIAN_FRONTEND", "noninteractive")
        .status()
        .await
        .context("failed to run apt-get")?;
    if !status.success() {
        return Err(anyhow!("failed to install prerequisite packages"));
    }
    Ok(())
}

async fn set_hostname(hostname: &str) {
    let result = Command::new("hostnamectl")
        .args(["set-hostname", hostname])
        .status()
        .await;
    match result {
        Ok(status) if status.success() => {}
        _ => warn!("could not set hostname to {}", hostname),
    }
}

/// Install the provider CLI if the image does not already carry it.
async fn ensure_provider_cli() -> Result<()> {
    let present = Command::new("doctl")
        .arg("version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false);
    if present {
        return Ok(());
    }

    info!("installing the provider CLI");
    let script = format!("curl -fsSL {} | tar -xz -C /usr/local/bin doctl", PROVIDER_CLI_URL);
    let status = Command::new("bash")
        .args(["-c", &script])
        .status()
        .await
        .context("failed to run the provider CLI install")?;
    if !status.success() {
        return Err(anyhow!("failed to install the provider CLI"));
    }
    Ok(())
}
