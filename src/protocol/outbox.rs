//! Outbound line queue.
//!
//! Everything that wants to write to the uplink pushes a finished line
//! here; the session loop owns the receiving end and writes lines in queue
//! order. Sending never blocks, so handlers can emit while holding the
//! registry lock.

use tokio::sync::mpsc;
use tracing::{trace, warn};

#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<String>,
}

impl Outbox {
    /// A new queue and its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, line: impl Into<String>) {
        let line = line.into();
        trace!(line = %line, "queue");
        if self.tx.send(line).is_err() {
            warn!("outbound queue closed, line dropped");
        }
    }

    pub fn send_all(&self, lines: impl IntoIterator<Item = String>) {
        for line in lines {
            self.send(line);
        }
    }
}
