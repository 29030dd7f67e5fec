//! Execution gateway: forwards student code to the sandboxed execution
//! service and, for the primary scripting language only, re-runs it as a
//! local subprocess when the sandbox itself breaks down.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Judge0 status id for a sandbox-side failure.
const SANDBOX_INTERNAL_ERROR_ID: i32 = 13;
const SANDBOX_INTERNAL_ERROR: &str = "Internal Error";

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Execution service unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("Execution service answered HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Execution service returned an unreadable response: {0}")]
    InvalidResponse(String),

    #[error("Execution service failed: {0}")]
    SandboxFailed(String),

    #[error("Invalid execution service URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Local execution failed: {0}")]
    Local(#[from] std::io::Error),
}

impl ExecutionError {
    /// Whether the sandbox could not serve the request at all, as opposed to
    /// answering with something we cannot use.
    fn is_unavailable(&self) -> bool {
        match self {
            ExecutionError::Unreachable(_) => true,
            ExecutionError::UpstreamStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Runner {
    Sandbox,
    LocalFallback,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub output: String,
    pub status: String,
    pub runner: Runner,
}

#[derive(Debug, Clone)]
pub struct FallbackConfig {
    pub language_id: i32,
    pub interpreter: String,
    pub file_suffix: String,
    pub timeout: Duration,
    /// Directory for temporary source files; the system temp dir when `None`.
    pub work_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub sandbox_url: Url,
    pub request_timeout: Duration,
    pub fallback: FallbackConfig,
}

#[derive(Serialize, Debug)]
struct SandboxRequest<'a> {
    source_code: &'a str,
    language_id: i32,
}

#[derive(Deserialize, Debug, Default)]
struct SandboxStatus {
    id: Option<i32>,
    description: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct SandboxResponse {
    stdout: Option<String>,
    stderr: Option<String>,
    compile_output: Option<String>,
    status: Option<SandboxStatus>,
}

impl SandboxResponse {
    fn status_description(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.description.as_deref())
            .unwrap_or("Unknown")
    }

    fn is_internal_error(&self) -> bool {
        let Some(status) = &self.status else {
            return false;
        };
        status.id == Some(SANDBOX_INTERNAL_ERROR_ID)
            || status
                .description
                .as_deref()
                .is_some_and(|d| d.eq_ignore_ascii_case(SANDBOX_INTERNAL_ERROR))
    }

    fn into_output(self) -> ExecutionOutput {
        let output = select_output(
            self.stdout.as_deref(),
            self.stderr.as_deref(),
            self.compile_output.as_deref(),
            self.status_description(),
        );
        ExecutionOutput {
            output,
            status: self.status_description().to_string(),
            runner: Runner::Sandbox,
        }
    }
}

/// stdout, then stderr, then compiler output, then a placeholder naming the status.
fn select_output(
    stdout: Option<&str>,
    stderr: Option<&str>,
    compile_output: Option<&str>,
    status_description: &str,
) -> String {
    [stdout, stderr, compile_output]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("No output. (Status: {})", status_description))
}

fn select_local_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    if !stdout.is_empty() {
        return stdout.into_owned();
    }
    let stderr = String::from_utf8_lossy(stderr);
    if !stderr.is_empty() {
        return stderr.into_owned();
    }
    "No output.".to_string()
}

pub struct ExecutionGateway {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl ExecutionGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, ExecutionError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ExecutionError::Client)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Runs `source_code` and returns its normalized output.
    ///
    /// When the sandbox is unreachable, answers with a 5xx, or reports an
    /// internal error, code in the fallback language is executed locally;
    /// any other language gets an [`ExecutionError`].
    #[instrument(skip(self, source_code), fields(code_len = source_code.len()))]
    pub async fn execute(
        &self,
        source_code: &str,
        language_id: i32,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let reason = match self.call_sandbox(source_code, language_id).await {
            Ok(response) if response.is_internal_error() => {
                format!("sandbox reported '{}'", response.status_description())
            }
            Ok(response) => {
                info!(
                    "Sandbox finished language {} with status '{}'",
                    language_id,
                    response.status_description()
                );
                return Ok(response.into_output());
            }
            Err(err) if err.is_unavailable() => err.to_string(),
            Err(err) => return Err(err),
        };

        if language_id != self.config.fallback.language_id {
            warn!(
                "Sandbox failed for language {} and no fallback exists: {}",
                language_id, reason
            );
            return Err(ExecutionError::SandboxFailed(reason));
        }

        warn!(
            "Sandbox failed for language {} ({}), executing locally",
            language_id, reason
        );
        self.run_locally(source_code).await
    }

    fn submissions_url(&self) -> Result<Url, ExecutionError> {
        let mut url = self.config.sandbox_url.clone();
        url.path_segments_mut()
            .map_err(|_| ExecutionError::InvalidUrl(self.config.sandbox_url.to_string()))?
            .pop_if_empty()
            .push("submissions");
        url.query_pairs_mut()
            .append_pair("base64_encoded", "false")
            .append_pair("wait", "true");
        Ok(url)
    }

    async fn call_sandbox(
        &self,
        source_code: &str,
        language_id: i32,
    ) -> Result<SandboxResponse, ExecutionError> {
        let url = self.submissions_url()?;
        debug!("Posting submission to sandbox at {}", url);

        let response = self
            .client
            .post(url)
            .json(&SandboxRequest {
                source_code,
                language_id,
            })
            .send()
            .await
            .map_err(ExecutionError::Unreachable)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutionError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<SandboxResponse>()
            .await
            .map_err(|e| ExecutionError::InvalidResponse(e.to_string()))
    }

    /// Writes the code to a temporary file and runs it with the fallback
    /// interpreter under a wall-clock limit. The file is removed when the
    /// guard drops, whichever way this function exits.
    pub async fn run_locally(&self, source_code: &str) -> Result<ExecutionOutput, ExecutionError> {
        let fallback = &self.config.fallback;

        let mut builder = tempfile::Builder::new();
        builder.prefix("campus-run-").suffix(&fallback.file_suffix);
        let mut script = match &fallback.work_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        script.write_all(source_code.as_bytes())?;
        script.flush()?;
        debug!("Wrote fallback source to {:?}", script.path());

        let mut command = Command::new(&fallback.interpreter);
        command
            .arg(script.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout also reaches anything the script forked.
        #[cfg(unix)]
        command.process_group(0);
        let child = command.spawn()?;
        let pid = child.id();

        let result = match timeout(fallback.timeout, child.wait_with_output()).await {
            Ok(finished) => {
                let finished = finished?;
                let status = if finished.status.success() {
                    "Accepted".to_string()
                } else {
                    format!("Exited with {}", finished.status)
                };
                ExecutionOutput {
                    output: select_local_output(&finished.stdout, &finished.stderr),
                    status,
                    runner: Runner::LocalFallback,
                }
            }
            Err(_) => {
                let limit = format_limit(fallback.timeout);
                if let Some(pid) = pid {
                    kill_process_group(pid).await;
                }
                warn!("Local execution exceeded {} and was killed", limit);
                ExecutionOutput {
                    output: format!("Execution timed out ({} limit).", limit),
                    status: "Time Limit Exceeded".to_string(),
                    runner: Runner::LocalFallback,
                }
            }
        };

        drop(script);
        Ok(result)
    }
}

/// Renders a limit as `5s` or `0.5s`.
fn format_limit(limit: Duration) -> String {
    if limit.subsec_nanos() == 0 {
        format!("{}s", limit.as_secs())
    } else {
        format!("{}s", limit.as_secs_f64())
    }
}

#[cfg(unix)]
async fn kill_process_group(pid: u32) {
    let result = Command::new("kill")
        .arg("-KILL")
        .arg("--")
        .arg(format!("-{}", pid))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        warn!("Failed to kill process group {}: {}", pid, e);
    }
}

#[cfg(not(unix))]
async fn kill_process_group(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(work_dir: PathBuf, limit: Duration) -> ExecutionGateway {
        ExecutionGateway::new(GatewayConfig {
            sandbox_url: Url::parse("http://127.0.0.1:9/").unwrap(),
            request_timeout: Duration::from_secs(1),
            fallback: FallbackConfig {
                language_id: 71,
                interpreter: "sh".to_string(),
                file_suffix: ".sh".to_string(),
                timeout: limit,
                work_dir: Some(work_dir),
            },
        })
        .unwrap()
    }

    fn dir_is_empty(dir: &std::path::Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn stdout_wins_over_everything_else() {
        let out = select_output(Some("hi\n"), Some("warn"), Some("cc"), "Accepted");
        assert_eq!(out, "hi\n");
    }

    #[test]
    fn empty_streams_fall_through_in_order() {
        assert_eq!(
            select_output(Some(""), Some("Traceback"), None, "Runtime Error"),
            "Traceback"
        );
        assert_eq!(
            select_output(None, Some(""), Some("syntax error"), "Compilation Error"),
            "syntax error"
        );
        assert_eq!(
            select_output(None, None, None, "Accepted"),
            "No output. (Status: Accepted)"
        );
    }

    #[test]
    fn internal_error_is_detected_by_id_or_description() {
        let by_id = SandboxResponse {
            status: Some(SandboxStatus {
                id: Some(13),
                description: None,
            }),
            ..Default::default()
        };
        let by_text = SandboxResponse {
            status: Some(SandboxStatus {
                id: None,
                description: Some("internal error".to_string()),
            }),
            ..Default::default()
        };
        let accepted = SandboxResponse {
            status: Some(SandboxStatus {
                id: Some(3),
                description: Some("Accepted".to_string()),
            }),
            ..Default::default()
        };
        assert!(by_id.is_internal_error());
        assert!(by_text.is_internal_error());
        assert!(!accepted.is_internal_error());
        assert!(!SandboxResponse::default().is_internal_error());
    }

    #[test]
    fn submissions_url_keeps_base_path() {
        let gw = ExecutionGateway::new(GatewayConfig {
            sandbox_url: Url::parse("http://judge.local:2358/api/").unwrap(),
            request_timeout: Duration::from_secs(1),
            fallback: FallbackConfig {
                language_id: 71,
                interpreter: "python3".to_string(),
                file_suffix: ".py".to_string(),
                timeout: Duration::from_secs(5),
                work_dir: None,
            },
        })
        .unwrap();
        assert_eq!(
            gw.submissions_url().unwrap().as_str(),
            "http://judge.local:2358/api/submissions?base64_encoded=false&wait=true"
        );
    }

    #[tokio::test]
    async fn local_run_captures_stdout_and_removes_source() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(dir.path().to_path_buf(), Duration::from_secs(5));

        let out = gw.run_locally("echo Hello").await.unwrap();

        assert_eq!(out.output, "Hello\n");
        assert_eq!(out.runner, Runner::LocalFallback);
        assert_eq!(out.status, "Accepted");
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn local_run_reports_stderr_when_stdout_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(dir.path().to_path_buf(), Duration::from_secs(5));

        let out = gw.run_locally("echo oops >&2; exit 3").await.unwrap();

        assert_eq!(out.output, "oops\n");
        assert!(out.status.starts_with("Exited with"));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn local_run_times_out_and_still_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(dir.path().to_path_buf(), Duration::from_secs(1));

        let out = gw.run_locally("sleep 10").await.unwrap();

        assert_eq!(out.output, "Execution timed out (1s limit).");
        assert!(dir_is_empty(dir.path()));
    }

    #[test]
    fn limits_keep_their_fraction() {
        assert_eq!(format_limit(Duration::from_secs(5)), "5s");
        assert_eq!(format_limit(Duration::from_millis(500)), "0.5s");
        assert_eq!(format_limit(Duration::from_millis(1500)), "1.5s");
    }

    #[tokio::test]
    async fn sub_second_limit_is_reported_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(dir.path().to_path_buf(), Duration::from_millis(500));

        let out = gw.run_locally("sleep 10").await.unwrap();

        assert_eq!(out.output, "Execution timed out (0.5s limit).");
        assert_eq!(out.status, "Time Limit Exceeded");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_also_kills_background_processes() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("survived");
        let gw = gateway(dir.path().to_path_buf(), Duration::from_secs(1));
        let script = format!("(sleep 2; touch {}) & wait", marker.display());

        let started = std::time::Instant::now();
        let out = gw.run_locally(&script).await.unwrap();

        assert_eq!(out.output, "Execution timed out (1s limit).");
        assert!(started.elapsed() < Duration::from_secs(2));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn missing_interpreter_is_an_error_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut gw = gateway(dir.path().to_path_buf(), Duration::from_secs(1));
        gw.config.fallback.interpreter = "/nonexistent/interpreter".to_string();

        let err = gw.run_locally("print('x')").await.unwrap_err();

        assert!(matches!(err, ExecutionError::Local(_)));
        assert!(dir_is_empty(dir.path()));
    }
}
