use crate::{CloudProvider, CreateInstanceRequest, CreatedInstance, ProvisioningTimedOut};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use cloudexec_common::{Instance, InstanceSize, Snapshot, SshKey};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;

const API_BASE: &str = "https://api.digitalocean.com/v2";
const ACTION_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct DigitalOceanProvider {
    client: Client,
    token: String,
}

impl DigitalOceanProvider {
    pub fn new(token: String) -> Self {
        // Default reqwest client has no overall timeout. If the API stalls,
        // a launch can hang forever.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap();
        Self {
            client,
            token: token.trim().to_string(),
        }
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", self.token)).unwrap(),
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        headers
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let resp = self.client.get(url).headers(self.headers()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            eprintln!(
                "[DigitalOcean API] GET {} failed: status={} body={}",
                url,
                status.as_u16(),
                text
            );
            return Err(anyhow!(
                "DigitalOcean GET {} failed: status={} body={}",
                url,
                status.as_u16(),
                text
            ));
        }
        Ok(resp.json().await?)
    }
}

fn parse_instance(value: &serde_json::Value) -> Result<Instance> {
    let id = value["id"]
        .as_u64()
        .ok_or_else(|| anyhow!("no droplet id in response"))?;

    // The public IPv4 lives in networks.v4 with type "public"; it is absent
    // until the provider finishes assigning an address.
    let ip = value["networks"]["v4"].as_array().and_then(|nets| {
        nets.iter()
            .find(|n| n["type"].as_str() == Some("public"))
            .and_then(|n| n["ip_address"].as_str())
            .map(|s| s.to_string())
    });

    let size = InstanceSize {
        vcpus: value["vcpus"].as_i64().unwrap_or(0),
        memory_mb: value["memory"].as_i64().unwrap_or(0),
        disk_gb: value["disk"].as_i64().unwrap_or(0),
        price_hourly: value["size"]["price_hourly"].as_f64().unwrap_or(0.0),
    };

    let tags = value["tags"]
        .as_array()
        .map(|tags| {
            tags.iter()
                .filter_map(|t| t.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    Ok(Instance {
        id,
        name: value["name"].as_str().unwrap_or_default().to_string(),
        ip,
        created_at: value["created_at"].as_str().unwrap_or_default().to_string(),
        size,
        tags,
    })
}

#[async_trait]
impl CloudProvider for DigitalOceanProvider {
    async fn check_auth(&self) -> Result<String> {
        let url = format!("{}/account", API_BASE);
        let json_resp = self.get_json(&url).await?;
        json_resp["account"]["email"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("no account identity in response"))
    }

    async fn create_instance(&self, req: &CreateInstanceRequest) -> Result<CreatedInstance> {
        let url = format!("{}/droplets", API_BASE);
        let body = json!({
            "name": req.name,
            "region": req.region,
            "size": req.size,
            "image": req.image_id,
            "ssh_keys": [req.ssh_key_fingerprint],
            "tags": req.tags,
            "user_data": req.user_data,
            // The provider's own in-guest agent is not wanted on job instances.
            "with_droplet_agent": false,
        });

        let resp = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            eprintln!(
                "[DigitalOcean API] POST {} failed: status={} body={}",
                url,
                status.as_u16(),
                text
            );
            return Err(anyhow!(
                "DigitalOcean create_instance failed: status={} body={}",
                status.as_u16(),
                text
            ));
        }

        let json_resp: serde_json::Value = resp.json().await?;
        let instance = parse_instance(&json_resp["droplet"])?;

        // The create response links an action with rel="create"; waiting on
        // it is how callers learn the instance reached the active state.
        let create_action_url = json_resp["links"]["actions"].as_array().and_then(|actions| {
            actions
                .iter()
                .find(|a| a["rel"].as_str() == Some("create"))
                .and_then(|a| a["href"].as_str())
                .map(String::from)
        });

        Ok(CreatedInstance {
            instance,
            create_action_url,
        })
    }

    async fn wait_for_action(&self, action_url: &str, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let json_resp = self.get_json(action_url).await?;
            match json_resp["action"]["status"].as_str() {
                Some("completed") => return Ok(()),
                Some("errored") => {
                    return Err(anyhow!("provider action {} reported failure", action_url))
                }
                _ => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ProvisioningTimedOut {
                    action_url: action_url.to_string(),
                    waited: timeout,
                }
                .into());
            }
            sleep(ACTION_POLL_INTERVAL).await;
        }
    }

    async fn get_instance(&self, id: u64) -> Result<Instance> {
        let url = format!("{}/droplets/{}", API_BASE, id);
        let json_resp = self.get_json(&url).await?;
        parse_instance(&json_resp["droplet"])
    }

    async fn list_instances_by_tag(&self, tag: &str) -> Result<Vec<Instance>> {
        let mut url = format!("{}/droplets?tag_name={}&per_page=50", API_BASE, tag);
        let mut instances = Vec::new();
        loop {
            let json_resp = self.get_json(&url).await?;
            let droplets = json_resp["droplets"]
                .as_array()
                .ok_or_else(|| anyhow!("no 'droplets' array in response"))?;
            for droplet in droplets {
                instances.push(parse_instance(droplet)?);
            }
            // Follow the next-page link until the provider stops returning one.
            match json_resp["links"]["pages"]["next"].as_str() {
                Some(next) => url = next.to_string(),
                None => break,
            }
        }
        Ok(instances)
    }

    async fn delete_instance(&self, id: u64) -> Result<()> {
        let url = format!("{}/droplets/{}", API_BASE, id);
        let resp = self
            .client
            .delete(&url)
            .headers(self.headers())
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            eprintln!(
                "[DigitalOcean API] DELETE {} failed: status={} body={}",
                url,
                status.as_u16(),
                text
            );
            return Err(anyhow!(
                "DigitalOcean delete_instance failed: status={} body={}",
                status.as_u16(),
                text
            ));
        }
        Ok(())
    }

    async fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        let mut url = format!("{}/snapshots?resource_type=droplet&per_page=50", API_BASE);
        let mut snapshots = Vec::new();
        loop {
            let json_resp = self.get_json(&url).await?;
            let items = json_resp["snapshots"]
                .as_array()
                .ok_or_else(|| anyhow!("no 'snapshots' array in response"))?;
            for item in items {
                snapshots.push(Snapshot {
                    id: match &item["id"] {
                        // Snapshot ids come back as strings or numbers
                        // depending on the resource they were taken from.
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    },
                    name: item["name"].as_str().unwrap_or_default().to_string(),
                    created_at: item["created_at"].as_str().unwrap_or_default().to_string(),
                });
            }
            match json_resp["links"]["pages"]["next"].as_str() {
                Some(next) => url = next.to_string(),
                None => break,
            }
        }
        Ok(snapshots)
    }

    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>> {
        // 200 per page is the provider maximum.
        let mut url = format!("{}/account/keys?per_page=200", API_BASE);
        let mut keys = Vec::new();
        loop {
            let json_resp = self.get_json(&url).await?;
            let items = json_resp["ssh_keys"]
                .as_array()
                .ok_or_else(|| anyhow!("no 'ssh_keys' array in response"))?;
            for item in items {
                keys.push(SshKey {
                    name: item["name"].as_str().unwrap_or_default().to_string(),
                    fingerprint: item["fingerprint"].as_str().unwrap_or_default().to_string(),
                    public_key: item["public_key"].as_str().unwrap_or_default().to_string(),
                });
            }
            match json_resp["links"]["pages"]["next"].as_str() {
                Some(next) => url = next.to_string(),
                None => break,
            }
        }
        Ok(keys)
    }

    async fn create_ssh_key(&self, name: &str, public_key: &str) -> Result<SshKey> {
        let url = format!("{}/account/keys", API_BASE);
        let body = json!({
            "name": name,
            "public_key": public_key,
        });

        let resp = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            eprintln!(
                "[DigitalOcean API] POST {} failed: status={} body={}",
                url,
                status.as_u16(),
                text
            );
            return Err(anyhow!(
                "DigitalOcean create_ssh_key failed: status={} body={}",
                status.as_u16(),
                text
            ));
        }

        let json_resp: serde_json::Value = resp.json().await?;
        let key = &json_resp["ssh_key"];
        Ok(SshKey {
            name: key["name"].as_str().unwrap_or_default().to_string(),
            fingerprint: key["fingerprint"].as_str().unwrap_or_default().to_string(),
            public_key: key["public_key"].as_str().unwrap_or_default().to_string(),
        })
    }
}
