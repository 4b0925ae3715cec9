//! Supervision loop: consumes the agent event stream, applies stall and hang
//! interventions, enforces the backstop timeout, and normalizes exit codes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SupervisorConfig;
use crate::error::SupervisorError;

use super::events::{AgentEvent, ControlMessage};
use super::stall::{HangWatch, Intervention, StallMonitor, StallThresholds};
use super::traits::{AgentInvoker, ProcessHandle};
use super::types::{
    AgentExit, AgentRequest, AgentSession, HangReport, ProcessTarget, StallReport, SupervisedRun,
    EXIT_CANCELLED, EXIT_STALLED, EXIT_TIMEOUT,
};

#[derive(Debug, Clone, Copy)]
pub struct SupervisorSettings {
    pub thresholds: StallThresholds,
    pub hang_timeout: Duration,
    pub task_timeout: Duration,
    pub kill_grace: Duration,
    pub hang_check_interval: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::from(&SupervisorConfig::default())
    }
}

impl From<&SupervisorConfig> for SupervisorSettings {
    fn from(cfg: &SupervisorConfig) -> Self {
        Self {
            thresholds: StallThresholds {
                soft_identical_calls: cfg.soft_identical_calls,
                hard_identical_calls: cfg.hard_identical_calls,
                soft_consecutive_errors: cfg.soft_consecutive_errors,
                hard_consecutive_errors: cfg.hard_consecutive_errors,
            },
            hang_timeout: Duration::from_secs(cfg.hang_timeout_secs),
            task_timeout: Duration::from_secs(cfg.task_timeout_secs),
            kill_grace: Duration::from_millis(cfg.kill_grace_ms),
            hang_check_interval: Duration::from_millis(cfg.hang_check_interval_ms.max(1)),
        }
    }
}

/// Why the supervisor ended a run early.
#[derive(Debug)]
enum Stop {
    Timeout,
    Stall(StallReport),
    Cancelled,
}

impl Stop {
    fn reason(&self) -> String {
        match self {
            Stop::Timeout => "task timeout exceeded".to_string(),
            Stop::Stall(report) => report.reason.clone(),
            Stop::Cancelled => "run cancelled".to_string(),
        }
    }

    fn exit_code(&self) -> i32 {
        match self {
            Stop::Timeout => EXIT_TIMEOUT,
            Stop::Stall(_) => EXIT_STALLED,
            Stop::Cancelled => EXIT_CANCELLED,
        }
    }
}

enum Ending {
    Exited(AgentExit),
    Stopped(Stop),
}

/// Runs one agent process per call and watches it.
pub struct Supervisor {
    invoker: Arc<dyn AgentInvoker>,
    settings: SupervisorSettings,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(
        invoker: Arc<dyn AgentInvoker>,
        settings: SupervisorSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            invoker,
            settings,
            cancel,
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    #[tracing::instrument(name = "supervise", skip_all, fields(task_id = %request.task_id, role = %request.role))]
    pub async fn supervise(&self, request: &AgentRequest) -> Result<SupervisedRun, SupervisorError> {
        let started = Instant::now();
        if self.cancel.is_cancelled() {
            return Ok(SupervisedRun {
                exit_code: EXIT_CANCELLED,
                cancelled: true,
                ..Default::default()
            });
        }

        let AgentSession {
            mut events,
            control,
            process,
            mut exit,
        } = self.invoker.start(request).await?;
        debug!(invoker = self.invoker.name(), pid = ?process.id(), "agent started");

        let mut monitor = StallMonitor::new(self.settings.thresholds);
        let mut hang = HangWatch::new(started);
        let mut hangs = Vec::new();

        let backstop = tokio::time::sleep(self.settings.task_timeout);
        tokio::pin!(backstop);
        let mut tick = tokio::time::interval(self.settings.hang_check_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut events_open = true;

        let ending = loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break Ending::Stopped(Stop::Cancelled),

                _ = &mut backstop => break Ending::Stopped(Stop::Timeout),

                res = &mut exit => match res {
                    Ok(done) => break Ending::Exited(done),
                    Err(_) => {
                        return Err(SupervisorError::Spawn(
                            "agent session ended without an exit status".into(),
                        ))
                    }
                },

                ev = events.recv(), if events_open => {
                    let Some(ev) = ev else {
                        events_open = false;
                        continue;
                    };
                    hang.observe(&ev, Instant::now());
                    match monitor.observe(&ev) {
                        None => {}
                        Some(Intervention::Soft { kind, reason }) => {
                            info!(%kind, %reason, "soft stall, asking agent to change approach");
                            // advisory; the hard threshold is the only enforcement
                            let _ = control.send(ControlMessage::ChangeApproach { reason }).await;
                        }
                        Some(Intervention::Hard(report)) => {
                            warn!(kind = %report.kind, reason = %report.reason, "hard stall");
                            break Ending::Stopped(Stop::Stall(report));
                        }
                    }
                }

                _ = tick.tick() => {
                    if let Some((action, idle)) = hang.check(Instant::now(), self.settings.hang_timeout) {
                        let report = self
                            .interrupt_hang(process.as_ref(), &control, action, idle)
                            .await;
                        hangs.push(report);
                    }
                }
            }
        };

        let mut run = match ending {
            Ending::Exited(done) => SupervisedRun {
                exit_code: done.exit_code,
                stdout: done.stdout,
                stderr: done.stderr,
                ..Default::default()
            },
            Ending::Stopped(stop) => self.shutdown(stop, process.as_ref(), &control, &mut exit).await,
        };
        run.hangs = hangs;
        run.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            exit_code = run.exit_code,
            duration_ms = run.duration_ms,
            timed_out = run.timed_out,
            stalled = run.stall.is_some(),
            "agent finished"
        );
        Ok(run)
    }

    /// Kill the hanging sub-action's processes without touching the agent.
    async fn interrupt_hang(
        &self,
        process: &dyn ProcessHandle,
        control: &mpsc::Sender<ControlMessage>,
        action: String,
        idle: Duration,
    ) -> HangReport {
        let children = process.children();
        warn!(%action, idle_secs = idle.as_secs(), children = ?children, "action hanging");

        let mut interrupted = Vec::new();
        for pid in children {
            match process
                .terminate(ProcessTarget::Pid(pid), self.settings.kill_grace)
                .await
            {
                Ok(()) => interrupted.push(pid),
                Err(e) => warn!(pid, error = %e, "failed to interrupt sub-action"),
            }
        }

        let _ = control
            .send(ControlMessage::ActionInterrupted {
                action: action.clone(),
                idle_secs: idle.as_secs(),
            })
            .await;

        HangReport {
            action,
            idle_secs: idle.as_secs(),
            interrupted,
        }
    }

    async fn shutdown(
        &self,
        stop: Stop,
        process: &dyn ProcessHandle,
        control: &mpsc::Sender<ControlMessage>,
        exit: &mut oneshot::Receiver<AgentExit>,
    ) -> SupervisedRun {
        let reason = stop.reason();
        let _ = control.try_send(ControlMessage::Abort {
            reason: reason.clone(),
        });

        if let Err(e) = process
            .terminate(ProcessTarget::Root, self.settings.kill_grace)
            .await
        {
            warn!(error = %e, "failed to terminate agent");
        }

        // Give the invoker a bounded window to drain output after the kill.
        let drained = tokio::time::timeout(self.settings.kill_grace, exit)
            .await
            .ok()
            .and_then(Result::ok)
            .unwrap_or_default();

        let mut run = SupervisedRun {
            exit_code: stop.exit_code(),
            stdout: drained.stdout,
            stderr: drained.stderr,
            ..Default::default()
        };
        match stop {
            Stop::Timeout => run.timed_out = true,
            Stop::Stall(report) => run.stall = Some(report),
            Stop::Cancelled => run.cancelled = true,
        }
        debug!(%reason, exit_code = run.exit_code, "agent stopped by supervisor");
        run
    }
}
