//! Bounded execution of input generator scripts.
//!
//! A generator is fed to the interpreter on stdin and must print exactly one
//! JSON object with `input` and `result` fields.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use derive_more::derive::Display;
use log::{debug, error, warn};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;

use super::api_util::APIError;

const STDERR_CAPTURE_BYTES: u64 = 4096;

/// Variables a generator may see; everything else in the server's
/// environment (credentials, API keys) is withheld.
const INHERITED_ENV: [&str; 3] = ["PATH", "LANG", "LC_ALL"];

#[derive(Debug, Display)]
pub enum ScriptError {
    #[display("failed to start interpreter: {_0}")]
    Spawn(String),

    #[display("pipe error while running script: {_0}")]
    Io(String),

    #[display("script did not finish within {_0:?}")]
    Timeout(Duration),

    #[display("script exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[display("script printed more than {_0} bytes")]
    OutputTooLarge(usize),

    #[display("script output is not valid JSON: {_0}")]
    InvalidJson(String),

    #[display("script output is not a JSON object")]
    NotAnObject,

    #[display("script output has no `{_0}` field")]
    MissingKey(&'static str),
}

impl std::error::Error for ScriptError {}

impl From<io::Error> for ScriptError {
    fn from(e: io::Error) -> Self {
        ScriptError::Io(e.to_string())
    }
}

impl From<ScriptError> for APIError {
    fn from(e: ScriptError) -> Self {
        let refnum = uuid::Uuid::new_v4();
        error!("Script execution failed, ref[{refnum}]: {e}");
        APIError::ScriptExecution { refnum }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedInput {
    pub input: String,
    pub result: String,
}

#[derive(Clone, Debug)]
pub struct ScriptLimits {
    pub timeout: Duration,
    pub max_output_bytes: usize,
    /// Address space ceiling, applied with `ulimit -v` in a wrapping shell.
    pub memory_limit_kb: Option<u64>,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_output_bytes: 1024 * 1024,
            memory_limit_kb: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ScriptRunner {
    interpreter: String,
    args: Vec<String>,
    limits: ScriptLimits,
}

impl ScriptRunner {
    pub fn new(interpreter: impl Into<String>, args: Vec<String>, limits: ScriptLimits) -> Self {
        Self {
            interpreter: interpreter.into(),
            args,
            limits,
        }
    }

    pub fn limits(&self) -> &ScriptLimits {
        &self.limits
    }

    pub async fn run(&self, script: &str) -> Result<GeneratedInput, ScriptError> {
        let stdout = self.execute(script).await?;
        parse_output(&stdout)
    }

    /// Generators start from an empty environment in a scratch directory.
    fn command(&self, workdir: &Path) -> Command {
        let mut command = match self.limits.memory_limit_kb {
            Some(limit_kb) => {
                let mut command = Command::new("sh");
                command
                    .arg("-c")
                    .arg(format!("ulimit -v {limit_kb} && exec \"$0\" \"$@\""))
                    .arg(&self.interpreter)
                    .args(&self.args);
                command
            }
            None => {
                let mut command = Command::new(&self.interpreter);
                command.args(&self.args);
                command
            }
        };
        command
            .env_clear()
            .envs(
                INHERITED_ENV
                    .iter()
                    .filter_map(|key| std::env::var_os(key).map(|value| (*key, value))),
            )
            .env("HOME", workdir)
            .current_dir(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn execute(&self, script: &str) -> Result<Vec<u8>, ScriptError> {
        // Removed on return, after the child has been reaped or killed.
        let workdir = tempfile::tempdir()?;
        let mut child = self
            .command(workdir.path())
            .spawn()
            .map_err(|e| ScriptError::Spawn(format!("{}: {e}", self.interpreter)))?;

        let stdin = child.stdin.take().ok_or(ScriptError::Io("stdin".into()))?;
        let stdout = child.stdout.take().ok_or(ScriptError::Io("stdout".into()))?;
        let mut stderr = child.stderr.take().ok_or(ScriptError::Io("stderr".into()))?;

        // Drained on its own task so a chatty stderr never stalls stdout.
        let stderr_reader = tokio::spawn(async move {
            let mut captured = Vec::new();
            (&mut stderr)
                .take(STDERR_CAPTURE_BYTES)
                .read_to_end(&mut captured)
                .await?;
            tokio::io::copy(&mut stderr, &mut tokio::io::sink()).await?;
            Ok::<_, io::Error>(captured)
        });

        let outcome = timeout(
            self.limits.timeout,
            communicate(
                &mut child,
                stdin,
                stdout,
                script.as_bytes(),
                self.limits.max_output_bytes,
            ),
        )
        .await;

        let (status, output) = match outcome {
            Ok(Ok(finished)) => finished,
            Ok(Err(e)) => {
                child.start_kill().ok();
                return Err(e);
            }
            Err(_) => {
                warn!("Generator script timed out, killing it");
                child.kill().await.ok();
                return Err(ScriptError::Timeout(self.limits.timeout));
            }
        };

        if !status.success() {
            let stderr = match stderr_reader.await {
                Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).trim().to_string(),
                _ => String::new(),
            };
            return Err(ScriptError::Failed {
                status: status.to_string(),
                stderr,
            });
        }

        debug!("Generator script printed {} bytes", output.len());
        Ok(output)
    }
}

async fn communicate(
    child: &mut Child,
    mut stdin: ChildStdin,
    stdout: ChildStdout,
    script: &[u8],
    max_output_bytes: usize,
) -> Result<(std::process::ExitStatus, Vec<u8>), ScriptError> {
    let write = async move {
        let written = stdin.write_all(script).await;
        drop(stdin);
        match written {
            // A script that stops reading early is not an error by itself.
            Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(e),
            _ => Ok(()),
        }
    };

    let read = async move {
        let mut output = Vec::new();
        stdout
            .take(max_output_bytes as u64 + 1)
            .read_to_end(&mut output)
            .await
            .map(|_| output)
    };

    let (written, output) = tokio::join!(write, read);
    written?;
    let output = output?;

    if output.len() > max_output_bytes {
        return Err(ScriptError::OutputTooLarge(max_output_bytes));
    }

    let status = child.wait().await?;
    Ok((status, output))
}

/// Applies the output contract to captured stdout.
pub fn parse_output(stdout: &[u8]) -> Result<GeneratedInput, ScriptError> {
    let text = String::from_utf8_lossy(stdout);
    let value: Value =
        serde_json::from_str(text.trim()).map_err(|e| ScriptError::InvalidJson(e.to_string()))?;

    let Value::Object(mut fields) = value else {
        return Err(ScriptError::NotAnObject);
    };

    let input = fields
        .remove("input")
        .map(render)
        .ok_or(ScriptError::MissingKey("input"))?;
    let result = fields
        .remove("result")
        .map(render)
        .ok_or(ScriptError::MissingKey("result"))?;

    Ok(GeneratedInput { input, result })
}

fn render(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
