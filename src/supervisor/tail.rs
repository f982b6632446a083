//! Stderr pass-through with a bounded tail for diagnostics.
//!
//! Bytes are forwarded to our stderr exactly as read, partial lines
//! included. Only the diagnostic tail is decoded, lossily.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;

const CHUNK_SIZE: usize = 4096;

/// Forwards a child's stderr to ours and keeps the last `capacity` lines
#[derive(Debug)]
pub struct StderrTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    task: JoinHandle<()>,
    done: bool,
}

impl StderrTail {
    /// Start forwarding `stderr` on a background task
    pub fn capture<R>(stderr: R, capacity: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let lines = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
        let buffer = Arc::clone(&lines);

        let task = tokio::spawn(async move {
            let mut reader = stderr;
            let mut out = tokio::io::stderr();
            let mut chunk = vec![0u8; CHUNK_SIZE];
            let mut pending = Vec::new();

            loop {
                let n = match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!("Stderr forwarding ended: {}", e);
                        break;
                    }
                };

                // keep draining even if our own stderr is gone
                if out.write_all(&chunk[..n]).await.is_ok() {
                    let _ = out.flush().await;
                }

                if capacity == 0 {
                    continue;
                }
                pending.extend_from_slice(&chunk[..n]);
                while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=pos).collect();
                    push_line(&buffer, capacity, &line);
                }
            }

            if capacity > 0 && !pending.is_empty() {
                push_line(&buffer, capacity, &pending);
            }
        });

        Self {
            lines,
            task,
            done: false,
        }
    }

    /// Wait (bounded) for the stream to reach EOF
    pub async fn finish(&mut self, within: Duration) {
        if self.done {
            return;
        }
        if tokio::time::timeout(within, &mut self.task).await.is_ok() {
            self.done = true;
        }
    }

    /// Captured lines joined by newlines
    pub fn snapshot(&self) -> String {
        self.lines
            .lock()
            .map(|buf| buf.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default()
    }
}

impl Drop for StderrTail {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn push_line(buffer: &Mutex<VecDeque<String>>, capacity: usize, raw: &[u8]) {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim_end_matches(['\n', '\r']).to_string();
    if let Ok(mut buf) = buffer.lock() {
        if buf.len() == capacity {
            buf.pop_front();
        }
        buf.push_back(line);
    }
}
