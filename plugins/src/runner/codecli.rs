use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use weaver_core::config::AgentConfig;
use weaver_core::error::SupervisorError;
use weaver_core::runner::io_pump::pump_lines;
use weaver_core::runner::{
    spawn_control_writer, AgentEvent, AgentExit, AgentInvoker, AgentRequest, AgentSession,
};
use weaver_core::util::RingBytes;

use crate::stream::StreamJsonParser;

use super::process::GroupProcessHandle;

/// Environment variable carrying the invocation's access rules as JSON.
pub const ACCESS_RULES_ENV: &str = "WEAVER_ACCESS_RULES";

#[derive(Debug, Clone)]
pub struct CodeCliOptions {
    pub event_capacity: usize,
    pub capture_bytes: usize,
}

impl Default for CodeCliOptions {
    fn default() -> Self {
        Self {
            event_capacity: 256,
            capture_bytes: 64 * 1024,
        }
    }
}

/// Starts a coding-agent CLI (claude, codex, gemini, ...) per request. The
/// instructions go last on the command line; stdin stays open for control
/// messages and stdout is read as stream-json.
pub struct CodeCliInvoker {
    agent: AgentConfig,
    options: CodeCliOptions,
}

impl CodeCliInvoker {
    pub fn new(agent: AgentConfig, options: CodeCliOptions) -> Self {
        Self { agent, options }
    }

    fn command(&self, request: &AgentRequest) -> Result<Command, SupervisorError> {
        let program = resolve_program(&self.agent.command)?;
        let access = serde_json::to_string(&request.access)
            .map_err(|e| SupervisorError::Spawn(format!("encode access rules: {e}")))?;

        let mut cmd = Command::new(program);
        cmd.args(&self.agent.args);
        if let Some(extra) = self.agent.role_args.get(request.role.as_str()) {
            cmd.args(extra);
        }
        cmd.arg(&request.instructions)
            .current_dir(&request.workdir)
            .envs(&self.agent.env)
            .env("WEAVER_TASK_ID", &request.task_id)
            .env("WEAVER_ROLE", request.role.as_str())
            .env(ACCESS_RULES_ENV, access)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        Ok(cmd)
    }
}

#[async_trait]
impl AgentInvoker for CodeCliInvoker {
    fn name(&self) -> &str {
        "codecli"
    }

    async fn start(&self, request: &AgentRequest) -> Result<AgentSession, SupervisorError> {
        let mut child = self
            .command(request)?
            .spawn()
            .map_err(|e| SupervisorError::Spawn(format!("{}: {e}", self.agent.command)))?;
        let pid = child
            .id()
            .ok_or_else(|| SupervisorError::Spawn("agent exited before start".into()))?;
        debug!(pid, task_id = %request.task_id, "agent process spawned");

        let (stdin, stdout, stderr) = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(i), Some(o), Some(e)) => (i, o, e),
            _ => return Err(SupervisorError::Spawn("agent stdio not captured".into())),
        };

        let (control, _writer) = spawn_control_writer(Box::new(stdin), 16);

        let cap = self.options.capture_bytes;
        let out_ring = RingBytes::new(cap);
        let err_ring = RingBytes::new(cap);
        let text_ring = RingBytes::new(cap);

        let (line_tx, line_rx) = mpsc::channel::<String>(self.options.event_capacity.max(1));
        let (event_tx, events) = mpsc::channel::<AgentEvent>(self.options.event_capacity.max(1));
        let out_pump = pump_lines(stdout, out_ring.clone(), "stdout", Some(line_tx));
        let err_pump = pump_lines(stderr, err_ring.clone(), "stderr", None);
        let translator = tokio::spawn(translate(line_rx, event_tx, text_ring.clone()));

        let (exit_tx, exit) = oneshot::channel();
        tokio::spawn(async move {
            let status = child.wait().await;
            for (label, pump) in [("stdout", out_pump), ("stderr", err_pump)] {
                match pump.await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(stream = label, error = %e, "capture failed"),
                    Err(e) => warn!(stream = label, error = %e, "capture task panicked"),
                }
            }
            let _ = translator.await;

            let exit_code = match status {
                Ok(status) => normalize_exit(status),
                Err(e) => {
                    warn!(error = %e, "waiting for agent failed");
                    -1
                }
            };
            let text = text_ring.to_string_lossy();
            let _ = exit_tx.send(AgentExit {
                exit_code,
                stdout: if text.is_empty() {
                    out_ring.to_string_lossy()
                } else {
                    text
                },
                stderr: err_ring.to_string_lossy(),
            });
        });

        Ok(AgentSession {
            events,
            control,
            process: Arc::new(GroupProcessHandle::new(pid)),
            exit,
        })
    }
}

/// Turn stdout lines into events. Assistant text is also kept as the
/// human-readable output of the run.
async fn translate(
    mut lines: mpsc::Receiver<String>,
    events: mpsc::Sender<AgentEvent>,
    text: Arc<RingBytes>,
) {
    let mut parser = StreamJsonParser::new();
    let mut listening = true;
    while let Some(line) = lines.recv().await {
        for ev in parser.parse_line(&line) {
            if let AgentEvent::Output { text: t } = &ev {
                text.push(t.as_bytes());
                text.push(b"\n");
            }
            // keep draining stdout after the supervisor stopped listening
            if listening && events.send(ev).await.is_err() {
                listening = false;
            }
        }
    }
}

fn resolve_program(command: &str) -> Result<String, SupervisorError> {
    let expanded = shellexpand::full(command)
        .map_err(|e| SupervisorError::Spawn(format!("expand {command}: {e}")))?
        .into_owned();
    if std::path::Path::new(&expanded).is_absolute() {
        return Ok(expanded);
    }
    which::which(&expanded)
        .map(|p| p.to_string_lossy().into_owned())
        .map_err(|_| SupervisorError::Spawn(format!("agent command not found in PATH: {command}")))
}

fn normalize_exit(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(code) = status.code() {
            code
        } else if let Some(sig) = status.signal() {
            128 + sig
        } else {
            1
        }
    }
    #[cfg(not(unix))]
    {
        status.code().unwrap_or(1)
    }
}
