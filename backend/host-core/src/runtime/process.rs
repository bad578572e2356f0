//! Production runtime: drives the Kolibri executables as child processes.

use crate::config::{HostConfig, ServerConfig, SetupConfig, WorkerConfig};
use crate::error::runtime::RuntimeError;
use crate::runtime::home::runtime_env;
use crate::runtime::terminate::terminate_child;
use crate::runtime::{ServerBus, ServerFactory, WorkerBus, WorkerFactory};
use crate::{LOCAL_BASE_URL, LOCAL_HOSTNAME};

use common::ErrorLocation;

use std::env::current_exe;
use std::ffi::OsString;
use std::io::Error as IoError;
use std::io::ErrorKind;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{ExponentialBackoff, backoff::Backoff};
use log::{debug, info, trace, warn};
use regex::Regex;
use reqwest::Client;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::Child as TokioChild;
use tokio::process::Command as TokioCommand;
use tokio::spawn as TokioSpawn;
use tokio::time::Instant;
use tokio::time::sleep as TokioSleep;
use tokio::time::timeout as TokioTimeout;
use url::Url;

const SPAWN_MAX_OUTPUT_LINES: usize = 100;
const CHECK_HEALTH_DURATION: Duration = Duration::from_secs(3);
const SERVER_URL_PATTERN: &str = r"http://(?P<host>[^\s:/]+):(?P<port>\d+)";
const URL_CAPTURE_HOST: &str = "host";
const URL_CAPTURE_PORT: &str = "port";

static URL_REGEX: OnceLock<Regex> = OnceLock::new();

pub(crate) fn get_url_regex() -> &'static Regex {
    URL_REGEX.get_or_init(|| Regex::new(SERVER_URL_PATTERN).expect("valid regex pattern"))
}

/// Extract the listening port from a line of server output.
///
/// Hosts other than the loopback address are accepted with a warning; the
/// server is always addressed through [`LOCAL_BASE_URL`].
pub fn parse_port_from_line(line: &str) -> Option<u16> {
    let cap = get_url_regex().captures(line)?;
    let host = cap.name(URL_CAPTURE_HOST)?.as_str();
    let port_str = cap.name(URL_CAPTURE_PORT)?.as_str();

    match port_str.parse::<u16>() {
        Ok(port) => {
            if host != LOCAL_HOSTNAME && host != "localhost" {
                warn!("Server reported unexpected hostname: {host}, expected {LOCAL_HOSTNAME}");
            }
            Some(port)
        }
        Err(e) => {
            warn!("Failed to parse port '{port_str}': {e}");
            None
        }
    }
}

/// Check if the server is healthy and responding.
///
/// Performs a GET against `health_url` with a 3 second timeout.
/// Returns `true` only for an HTTP 2xx response.
pub async fn check_health(health_url: &str) -> bool {
    let client = Client::new();

    match client
        .get(health_url)
        .timeout(CHECK_HEALTH_DURATION)
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            debug!("Health check succeeded for {health_url}");
            true
        }
        Ok(resp) => {
            debug!(
                "Health check failed for {health_url}: status={}",
                resp.status()
            );
            false
        }
        Err(e) => {
            debug!("Health check failed for {health_url}: {e}");
            false
        }
    }
}

/// Poll `health_url` with exponential backoff until it answers or `max_elapsed` passes.
pub async fn wait_for_health(health_url: &str, max_elapsed: Duration) -> Result<(), RuntimeError> {
    let mut backoff = ExponentialBackoff {
        max_elapsed_time: Some(max_elapsed),
        ..Default::default()
    };

    debug!("Waiting for server health at {health_url}");

    loop {
        if check_health(health_url).await {
            info!("Server is healthy at {health_url}");
            return Ok(());
        }

        match backoff.next_backoff() {
            Some(duration) => {
                trace!("Server not ready, retrying after {duration:?}");
                TokioSleep(duration).await;
            }
            None => {
                return Err(RuntimeError::Timeout {
                    message: format!(
                        "Server at {health_url} did not become healthy within {max_elapsed:?}"
                    ),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }
    }
}

/// Join the configured health path onto a base URL.
#[track_caller]
pub fn health_url(base_url: &str, health_path: &str) -> Result<String, RuntimeError> {
    Url::parse(base_url)
        .and_then(|base| base.join(health_path))
        .map(String::from)
        .map_err(|e| RuntimeError::Parse {
            message: format!("Invalid health URL {base_url}{health_path}: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
}

fn build_command(
    program: &str,
    args: &[String],
    home: &Path,
    env: &[(&'static str, OsString)],
) -> TokioCommand {
    let mut cmd = TokioCommand::new(program);
    cmd.args(args)
        .envs(env.iter().map(|(k, v)| (*k, v)))
        .current_dir(home)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Spawn `program` from PATH, falling back to a copy bundled beside the host executable.
fn spawn_process(
    program: &str,
    args: &[String],
    home: &Path,
    env: &[(&'static str, OsString)],
) -> Result<TokioChild, RuntimeError> {
    debug!("Attempting to spawn {program} from PATH");

    match build_command(program, args, home, env).spawn() {
        Ok(child) => {
            info!("Spawned {program} (PID: {:?})", child.id());
            Ok(child)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("{program} not in PATH, trying bundled binary");
            spawn_bundled_binary(program, args, home, env)
        }
        Err(err) => Err(RuntimeError::Spawn {
            message: format!("Failed to spawn {program}: {err}"),
            location: ErrorLocation::from(Location::caller()),
            source: Box::new(err),
        }),
    }
}

fn spawn_bundled_binary(
    program: &str,
    args: &[String],
    home: &Path,
    env: &[(&'static str, OsString)],
) -> Result<TokioChild, RuntimeError> {
    let exe = current_exe().map_err(|e| RuntimeError::Spawn {
        message: format!("Failed to get current executable path: {e}"),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(e),
    })?;

    let dir = exe.parent().ok_or_else(|| RuntimeError::Spawn {
        message: format!("Executable has no parent directory: {}", exe.display()),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(IoError::new(ErrorKind::NotFound, "no parent dir")),
    })?;

    let bundled = dir.join(program);
    debug!("Attempting to spawn {}", bundled.display());

    build_command(&bundled.to_string_lossy(), args, home, env)
        .spawn()
        .map_err(|e| RuntimeError::Spawn {
            message: format!("Failed to spawn {}: {e}", bundled.display()),
            location: ErrorLocation::from(Location::caller()),
            source: Box::new(e),
        })
}

fn forward_output<R>(mut lines: Lines<BufReader<R>>, name: &'static str, stream: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    TokioSpawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            trace!("{name} {stream}: {line}");
        }
    });
}

async fn parse_server_url(mut child: TokioChild) -> Result<(TokioChild, String), RuntimeError> {
    let stdout = child.stdout.take().ok_or_else(|| RuntimeError::Parse {
        message: "Child process has no stdout".to_string(),
        location: ErrorLocation::from(Location::caller()),
    })?;

    if let Some(stderr) = child.stderr.take() {
        forward_output(BufReader::new(stderr).lines(), "server", "stderr");
    }

    let mut lines = BufReader::new(stdout).lines();

    for _ in 0..SPAWN_MAX_OUTPUT_LINES {
        match lines.next_line().await {
            Ok(Some(line)) => {
                trace!("server stdout: {line}");

                if let Some(port) = parse_port_from_line(&line) {
                    let base_url = format!("{LOCAL_BASE_URL}:{port}");
                    info!("Parsed server URL: {base_url}");
                    // Keep draining so the server never blocks on a full pipe.
                    forward_output(lines, "server", "stdout");
                    return Ok((child, base_url));
                }
            }
            Ok(None) => {
                debug!("Server process ended before printing URL");
                break;
            }
            Err(e) => {
                return Err(RuntimeError::Parse {
                    message: format!("Failed to read server output: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }
    }

    Err(RuntimeError::Parse {
        message: format!("No server URL found in first {SPAWN_MAX_OUTPUT_LINES} lines of output"),
        location: ErrorLocation::from(Location::caller()),
    })
}

// ============================================
// FACTORY
// ============================================

/// Creates process-backed buses from [`HostConfig`].
#[derive(Debug, Clone)]
pub struct ProcessRuntime {
    server: ServerConfig,
    worker: WorkerConfig,
    setup: SetupConfig,
}

impl ProcessRuntime {
    pub fn new(config: &HostConfig) -> Self {
        Self {
            server: config.server.clone(),
            worker: config.worker.clone(),
            setup: config.setup.clone(),
        }
    }
}

impl ServerFactory for ProcessRuntime {
    fn create_server(&self, home: &Path) -> Box<dyn ServerBus> {
        Box::new(ProcessServerBus::new(
            self.server.clone(),
            home,
            runtime_env(home, &self.setup),
        ))
    }
}

impl WorkerFactory for ProcessRuntime {
    fn create_worker(&self, home: &Path) -> Box<dyn WorkerBus> {
        Box::new(ProcessWorkerBus::new(
            self.worker.clone(),
            home,
            runtime_env(home, &self.setup),
        ))
    }
}

// ============================================
// SERVER
// ============================================

pub struct ProcessServerBus {
    config: ServerConfig,
    home: PathBuf,
    env: Vec<(&'static str, OsString)>,
    child: Option<TokioChild>,
    url: Option<String>,
}

impl ProcessServerBus {
    pub fn new(config: ServerConfig, home: &Path, env: Vec<(&'static str, OsString)>) -> Self {
        Self {
            config,
            home: home.to_path_buf(),
            env,
            child: None,
            url: None,
        }
    }

    async fn launch(&self) -> Result<(TokioChild, String), RuntimeError> {
        let child = spawn_process(&self.config.program, &self.config.args, &self.home, &self.env)?;
        let startup_timeout = self.config.startup_timeout();
        // URL discovery and the health wait share one budget.
        let deadline = Instant::now() + startup_timeout;

        let (mut child, base_url) = TokioTimeout(startup_timeout, parse_server_url(child))
            .await
            .map_err(|_| RuntimeError::Timeout {
                message: format!("Server printed no URL within {startup_timeout:?}"),
                location: ErrorLocation::from(Location::caller()),
            })??;

        let health = health_url(&base_url, &self.config.health_path)?;
        let remaining = deadline.saturating_duration_since(Instant::now());

        let healthy = TokioTimeout(remaining, wait_for_health(&health, remaining))
            .await
            .unwrap_or_else(|_| {
                Err(RuntimeError::Timeout {
                    message: format!(
                        "Server at {health} did not become healthy within {startup_timeout:?}"
                    ),
                    location: ErrorLocation::from(Location::caller()),
                })
            });

        if let Err(e) = healthy {
            warn!(
                "Health check failed, killing spawned server (PID: {:?})",
                child.id()
            );
            if let Err(kill_err) = child.kill().await {
                warn!("Failed to kill spawned server: {kill_err}");
            }
            return Err(e);
        }

        Ok((child, format!("{base_url}/")))
    }
}

#[async_trait]
impl ServerBus for ProcessServerBus {
    async fn start(&mut self) -> Result<(), RuntimeError> {
        if self.child.is_some() {
            return Err(RuntimeError::Command {
                message: "Server process already running".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        info!("Starting {} in {}", self.config.program, self.home.display());

        let (child, url) = self.launch().await?;

        info!("Server ready at {url} (PID: {:?})", child.id());
        self.child = Some(child);
        self.url = Some(url);

        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RuntimeError> {
        self.url = None;

        match self.child.take() {
            Some(child) => terminate_child(child, "server").await,
            None => Ok(()),
        }
    }

    async fn get_url(&self) -> Result<String, RuntimeError> {
        self.url.clone().ok_or_else(|| RuntimeError::NotRunning {
            message: "Server is not running".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })
    }
}

// ============================================
// WORKER
// ============================================

pub struct ProcessWorkerBus {
    config: WorkerConfig,
    home: PathBuf,
    env: Vec<(&'static str, OsString)>,
    child: Option<TokioChild>,
}

impl ProcessWorkerBus {
    pub fn new(config: WorkerConfig, home: &Path, env: Vec<(&'static str, OsString)>) -> Self {
        Self {
            config,
            home: home.to_path_buf(),
            env,
            child: None,
        }
    }
}

#[async_trait]
impl WorkerBus for ProcessWorkerBus {
    async fn start(&mut self) -> Result<(), RuntimeError> {
        if self.child.is_some() {
            return Err(RuntimeError::Command {
                message: "Worker process already running".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let mut child =
            spawn_process(&self.config.program, &self.config.args, &self.home, &self.env)?;

        if let Some(stdout) = child.stdout.take() {
            forward_output(BufReader::new(stdout).lines(), "worker", "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(BufReader::new(stderr).lines(), "worker", "stderr");
        }

        if let Ok(Some(status)) = child.try_wait() {
            return Err(RuntimeError::Command {
                message: format!("Worker exited immediately with {status}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        info!("Worker running (PID: {:?})", child.id());
        self.child = Some(child);

        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RuntimeError> {
        match self.child.take() {
            Some(child) => terminate_child(child, "worker").await,
            None => Ok(()),
        }
    }
}
