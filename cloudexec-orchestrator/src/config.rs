use anyhow::{anyhow, Result};

/// Operator credentials and identity, loaded from the environment. A local
/// `.env` file is read first when present so credentials never need to live
/// in the shell profile.
#[derive(Debug, Clone)]
pub struct Config {
    pub username: String,
    pub api_key: String,
    pub spaces_access_key: String,
    pub spaces_secret_key: String,
    pub spaces_region: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Ok(Self {
            username: require_env("USERNAME")?,
            api_key: require_env("DIGITALOCEAN_API_KEY")?,
            spaces_access_key: require_env("DIGITALOCEAN_SPACES_ACCESS_KEY")?,
            spaces_secret_key: require_env("DIGITALOCEAN_SPACES_SECRET_ACCESS_KEY")?,
            spaces_region: require_env("DIGITALOCEAN_SPACES_REGION")?,
        })
    }

    /// Bucket that holds this operator's job artifacts and state document.
    pub fn bucket(&self) -> String {
        cloudexec_common::naming::bucket_name(&self.username)
    }
}

fn require_env(name: &str) -> Result<String> {
    let value = std::env::var(name).unwrap_or_default().trim().to_string();
    if value.is_empty() {
        return Err(anyhow!("missing required environment variable {}", name));
    }
    Ok(value)
}
