//! Domain event queues feeding the classifier dispatcher.
//!
//! The transport is an external concern; anything that can hand out one
//! domain token at a time with a bounded wait fits behind [`DomainQueue`].

use crate::error::QueueError;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dequeued {
    Job(String),
    /// Nothing arrived within the wait.
    Idle,
    /// The producer side is gone; no more jobs will arrive.
    Closed,
}

#[async_trait::async_trait]
pub trait DomainQueue: Send {
    /// Blocks for at most `wait`. Must be cancel safe.
    async fn pop(&mut self, wait: Duration) -> Result<Dequeued, QueueError>;
}

/// In-process queue backed by a tokio channel.
pub struct ChannelQueue {
    rx: mpsc::Receiver<String>,
}

pub fn channel(capacity: usize) -> (mpsc::Sender<String>, ChannelQueue) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, ChannelQueue { rx })
}

#[async_trait::async_trait]
impl DomainQueue for ChannelQueue {
    async fn pop(&mut self, wait: Duration) -> Result<Dequeued, QueueError> {
        match timeout(wait, self.rx.recv()).await {
            Ok(Some(job)) => Ok(Dequeued::Job(job)),
            Ok(None) => Ok(Dequeued::Closed),
            Err(_) => Ok(Dequeued::Idle),
        }
    }
}

/// One domain token per line from any async reader, e.g. the output of a
/// log extractor piped into stdin.
pub struct LineQueue<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin + Send> LineQueue<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

impl LineQueue<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait::async_trait]
impl<R: AsyncBufRead + Unpin + Send> DomainQueue for LineQueue<R> {
    async fn pop(&mut self, wait: Duration) -> Result<Dequeued, QueueError> {
        match timeout(wait, self.lines.next_line()).await {
            Ok(Ok(Some(line))) => Ok(Dequeued::Job(line)),
            Ok(Ok(None)) => Ok(Dequeued::Closed),
            Ok(Err(e)) => Err(QueueError::Io(e)),
            Err(_) => Ok(Dequeued::Idle),
        }
    }
}
