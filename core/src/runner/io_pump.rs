use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::SupervisorError;
use crate::util::RingBytes;

/// Copy a child stream into a capture ring, optionally forwarding each
/// complete line. Returns the number of bytes read.
pub fn pump_lines<R>(
    mut rd: R,
    ring: Arc<RingBytes>,
    label: &'static str,
    line_tx: Option<mpsc::Sender<String>>,
) -> JoinHandle<Result<u64, SupervisorError>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; 16 * 1024];
        let mut total = 0u64;
        let mut line_buf: Vec<u8> = Vec::with_capacity(8 * 1024);

        loop {
            let n = rd
                .read(&mut buf)
                .await
                .map_err(|e| SupervisorError::StreamIo {
                    stream: label,
                    source: e,
                })?;
            if n == 0 {
                break;
            }

            ring.push(&buf[..n]);
            total += n as u64;

            let Some(tx) = line_tx.as_ref() else {
                continue;
            };
            line_buf.extend_from_slice(&buf[..n]);
            while let Some(pos) = line_buf.iter().position(|&b| b == b'\n') {
                let mut one = line_buf.drain(..=pos).collect::<Vec<u8>>();
                trim_newline(&mut one);
                let _ = tx.send(String::from_utf8_lossy(&one).into_owned()).await;
            }
        }

        // EOF flush: deliver the last partial line.
        if let Some(tx) = line_tx.as_ref() {
            trim_newline(&mut line_buf);
            if !line_buf.is_empty() {
                let _ = tx.send(String::from_utf8_lossy(&line_buf).into_owned()).await;
            }
        }

        Ok(total)
    })
}

fn trim_newline(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
}
