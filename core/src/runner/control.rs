use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::SupervisorError;

use super::events::ControlMessage;

/// Forward control messages to an agent's stdin as JSON lines.
///
/// The writer stops at the first write failure; the supervisor treats a
/// closed control channel as "agent no longer listening" and keeps going.
pub fn spawn_control_writer(
    stdin: Box<dyn AsyncWrite + Unpin + Send>,
    capacity: usize,
) -> (
    mpsc::Sender<ControlMessage>,
    tokio::task::JoinHandle<Result<(), SupervisorError>>,
) {
    let (ctl_tx, mut ctl_rx) = mpsc::channel::<ControlMessage>(capacity.max(1));

    let mut ctl = ControlChannel::new(stdin);
    let task = tokio::spawn(async move {
        while let Some(msg) = ctl_rx.recv().await {
            if let Err(e) = ctl.send(&msg).await {
                tracing::warn!(error = %e, "control channel write failed");
                return Err(SupervisorError::StreamIo {
                    stream: "stdin",
                    source: e,
                });
            }
        }
        Ok(())
    });

    (ctl_tx, task)
}

struct ControlChannel {
    stdin: Box<dyn AsyncWrite + Unpin + Send>,
}

impl ControlChannel {
    fn new(stdin: Box<dyn AsyncWrite + Unpin + Send>) -> Self {
        Self { stdin }
    }

    async fn send(&mut self, msg: &ControlMessage) -> std::io::Result<()> {
        let line = serde_json::to_string(msg)?;
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await
    }
}
