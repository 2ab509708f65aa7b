//! Boot-script rendering. The script lands in the instance's user data and
//! runs under cloud-init: it writes the agent's environment file and hands
//! control to the agent binary baked into the boot image.

/// Values baked into the boot script at launch time.
#[derive(Debug, Clone)]
pub struct UserDataParams<'a> {
    pub api_token: &'a str,
    pub spaces_access_key: &'a str,
    pub spaces_secret_key: &'a str,
    pub spaces_region: &'a str,
    pub setup_commands: &'a str,
    pub run_command: &'a str,
    pub timeout_seconds: u64,
    pub input_dir: &'a str,
}

const TEMPLATE: &str = r#"#!/usr/bin/env bash
set -euo pipefail

mkdir -p /etc/cloudexec
cat > /etc/cloudexec/env <<'CLOUDEXEC_ENV'
DIGITALOCEAN_API_KEY=${API_TOKEN}
DIGITALOCEAN_SPACES_ACCESS_KEY=${SPACES_ACCESS_KEY}
DIGITALOCEAN_SPACES_SECRET_ACCESS_KEY=${SPACES_SECRET_KEY}
DIGITALOCEAN_SPACES_REGION=${SPACES_REGION}
CLOUDEXEC_SETUP_COMMANDS=${SETUP_COMMANDS}
CLOUDEXEC_RUN_COMMAND=${RUN_COMMAND}
CLOUDEXEC_TIMEOUT_SECONDS=${TIMEOUT_SECONDS}
CLOUDEXEC_INPUT_DIR=${INPUT_DIR}
CLOUDEXEC_ENV
chmod 0600 /etc/cloudexec/env

set -a
source /etc/cloudexec/env
set +a

# The boot image carries the agent; everything past this point is its job.
exec /usr/local/bin/cloudexec-agent
"#;

/// Render the boot script. The setup and run commands are shell-escaped so
/// arbitrary workload text survives the environment file and the shells
/// that source it.
pub fn render(params: &UserDataParams<'_>) -> String {
    TEMPLATE
        .replace("${API_TOKEN}", params.api_token)
        .replace("${SPACES_ACCESS_KEY}", params.spaces_access_key)
        .replace("${SPACES_SECRET_KEY}", params.spaces_secret_key)
        .replace("${SPACES_REGION}", params.spaces_region)
        .replace("${SETUP_COMMANDS}", &shell_escape(params.setup_commands))
        .replace("${RUN_COMMAND}", &shell_escape(params.run_command))
        .replace("${TIMEOUT_SECONDS}", &params.timeout_seconds.to_string())
        .replace("${INPUT_DIR}", params.input_dir)
}

/// Single-quote a string for POSIX shells.
pub fn shell_escape(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}
