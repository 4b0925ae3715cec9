use std::time::Duration;

use async_trait::async_trait;

use crate::error::SupervisorError;

use super::types::{AgentRequest, AgentSession, ProcessTarget, Signal};

/// Starts agent processes. The supervisor owns everything after `start`.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    fn name(&self) -> &str;
    async fn start(&self, request: &AgentRequest) -> Result<AgentSession, SupervisorError>;
}

/// Handle on a running agent process and its descendants.
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    fn id(&self) -> Option<u32>;

    /// Direct children of the agent, i.e. its in-flight sub-actions.
    fn children(&self) -> Vec<u32>;

    fn signal(&self, target: ProcessTarget, signal: Signal) -> anyhow::Result<()>;

    fn is_alive(&self, target: ProcessTarget) -> bool;

    /// Cooperative stop request.
    fn interrupt(&self, target: ProcessTarget) -> anyhow::Result<()> {
        self.signal(target, Signal::Term)
    }

    /// Interrupt, then kill if the target outlives `grace`.
    async fn terminate(&self, target: ProcessTarget, grace: Duration) -> anyhow::Result<()> {
        self.interrupt(target)?;

        let deadline = tokio::time::Instant::now() + grace;
        while tokio::time::Instant::now() < deadline {
            if !self.is_alive(target) {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        if self.is_alive(target) {
            tracing::warn!(?target, grace_ms = grace.as_millis() as u64, "grace expired, killing");
            self.signal(target, Signal::Kill)?;
        }
        Ok(())
    }
}
