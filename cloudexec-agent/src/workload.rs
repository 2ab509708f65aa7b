use anyhow::{anyhow, Context, Result};
use cloudexec_common::naming::input_key;
use cloudexec_storage::ObjectStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::info;

/// tmux session holding the user's run command, so an operator can attach
/// without killing the job.
pub const SESSION: &str = "cloudexec";

/// On-disk layout of a job's working area.
#[derive(Debug, Clone)]
pub struct WorkDirs {
    pub root: PathBuf,
}

impl WorkDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn corpus_dir(&self) -> PathBuf {
        self.root.join("corpus")
    }

    pub fn log_file(&self) -> PathBuf {
        self.root.join("cloudexec.log")
    }

    pub fn exit_code_file(&self) -> PathBuf {
        self.root.join("exit_code")
    }

    pub fn input_archive(&self) -> PathBuf {
        self.root.join("input.zip")
    }
}

impl Default for WorkDirs {
    fn default() -> Self {
        Self::new("/root/cloudexec")
    }
}

/// What the boot script left in the environment for this job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub setup_commands: String,
    pub run_command: String,
    pub timeout: Duration,
    pub input_dir: String,
}

impl JobSpec {
    pub fn from_env() -> Result<Self> {
        let timeout_seconds: u64 = std::env::var("CLOUDEXEC_TIMEOUT_SECONDS")
            .unwrap_or_default()
            .trim()
            .parse()
            .context("missing or malformed CLOUDEXEC_TIMEOUT_SECONDS")?;
        let run_command = std::env::var("CLOUDEXEC_RUN_COMMAND").unwrap_or_default();
        if run_command.trim().is_empty() {
            return Err(anyhow!("CLOUDEXEC_RUN_COMMAND is not set"));
        }
        Ok(Self {
            setup_commands: std::env::var("CLOUDEXEC_SETUP_COMMANDS").unwrap_or_default(),
            run_command,
            timeout: Duration::from_secs(timeout_seconds),
            input_dir: std::env::var("CLOUDEXEC_INPUT_DIR")
                .unwrap_or_else(|_| "input".to_string()),
        })
    }
}

/// Run the caller-supplied setup commands. A non-zero exit is fatal; the
/// workload cannot run on a half-prepared host.
pub async fn run_setup(spec: &JobSpec, dirs: &WorkDirs) -> Result<()> {
    fs::create_dir_all(&dirs.root)
        .with_context(|| format!("failed to create {:?}", dirs.root))?;
    fs::create_dir_all(dirs.output_dir())?;

    if spec.setup_commands.trim().is_empty() {
        return Ok(());
    }

    info!("running setup commands");
    let status = Command::new("bash")
        .args(["-c", &spec.setup_commands])
        .current_dir(&dirs.root)
        .status()
        .await
        .context("failed to start the setup shell")?;
    if !status.success() {
        return Err(anyhow!("setup commands exited with {}", status));
    }
    Ok(())
}

/// Download and unpack the job's input archive. Missing or empty input is
/// fatal, as is an archive that does not yield the expected directory.
pub async fn fetch_input(
    store: &dyn ObjectStore,
    job_id: i64,
    spec: &JobSpec,
    dirs: &WorkDirs,
) -> Result<()> {
    let key = input_key(job_id);
    let archive = store
        .get(&key)
        .await?
        .ok_or_else(|| anyhow!("input archive {} is missing", key))?;
    if archive.is_empty() {
        return Err(anyhow!("input archive {} is empty", key));
    }

    let archive_path = dirs.input_archive();
    fs::write(&archive_path, &archive)
        .with_context(|| format!("failed to write {:?}", archive_path))?;

    info!("unpacking {} ({} bytes)", key, archive.len());
    let status = Command::new("unzip")
        .arg("-o")
        .arg(&archive_path)
        .arg("-d")
        .arg(&dirs.root)
        .status()
        .await
        .context("failed to run unzip")?;
    if !status.success() {
        return Err(anyhow!("unpacking the input archive failed"));
    }

    let input_dir = dirs.root.join(&spec.input_dir);
    if !input_dir.is_dir() {
        return Err(anyhow!(
            "input archive did not contain the expected directory '{}'",
            spec.input_dir
        ));
    }
    Ok(())
}

/// Start the run command in a detached tmux session, mirror the pane into
/// the local log file, and arrange for the exit code to land in a file the
/// monitor can poll.
pub async fn start_run(spec: &JobSpec, dirs: &WorkDirs) -> Result<()> {
    let exit_file = dirs.exit_code_file();
    let script = format!(
        "{}; echo $? > {}",
        spec.run_command,
        exit_file.to_string_lossy()
    );

    let status = Command::new("tmux")
        .args(["new-session", "-d", "-s", SESSION, "-c"])
        .arg(&dirs.root)
        .arg(&script)
        .status()
        .await
        .context("failed to start tmux")?;
    if !status.success() {
        return Err(anyhow!("could not start the job session"));
    }

    let pipe = format!("cat >> {}", dirs.log_file().to_string_lossy());
    let status = Command::new("tmux")
        .args(["pipe-pane", "-t", SESSION, "-o", &pipe])
        .status()
        .await
        .context("failed to attach the log pipe")?;
    if !status.success() {
        return Err(anyhow!("could not mirror job output into the log file"));
    }

    info!("job running in tmux session '{}'", SESSION);
    Ok(())
}

/// The run command's recorded exit code, once its wrapper has written it.
pub fn read_exit_code(dirs: &WorkDirs) -> Option<i32> {
    read_exit_code_from(&dirs.exit_code_file())
}

fn read_exit_code_from(path: &Path) -> Option<i32> {
    let text = fs::read_to_string(path).ok()?;
    text.trim().parse().ok()
}
