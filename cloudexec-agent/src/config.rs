use anyhow::{anyhow, Result};

/// Credentials the boot script leaves in the agent's environment.
///
/// Checked before any job work begins: without the provider key the agent
/// could never delete its own instance, which is exactly the failure mode
/// that leaves a billable resource running forever.
#[derive(Debug, Clone)]
pub struct AgentCredentials {
    pub api_key: String,
    pub spaces_access_key: String,
    pub spaces_secret_key: String,
    pub spaces_region: String,
}

impl AgentCredentials {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: require_env("DIGITALOCEAN_API_KEY")?,
            spaces_access_key: require_env("DIGITALOCEAN_SPACES_ACCESS_KEY")?,
            spaces_secret_key: require_env("DIGITALOCEAN_SPACES_SECRET_ACCESS_KEY")?,
            spaces_region: require_env("DIGITALOCEAN_SPACES_REGION")?,
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    let value = std::env::var(name).unwrap_or_default().trim().to_string();
    if value.is_empty() {
        return Err(anyhow!(
            "environment variable {} is not set; refusing to run a job the agent cannot clean up after",
            name
        ));
    }
    Ok(value)
}
