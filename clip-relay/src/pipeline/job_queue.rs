//! In-memory FIFO between a tenant's detection loop and its consumer.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;

use crate::domain::Job;
use crate::{Error, Result};

/// Create an unbounded job queue.
pub fn job_queue() -> (JobSender, JobReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        JobSender {
            tx,
            depth: depth.clone(),
        },
        JobReceiver { rx, depth },
    )
}

/// Producer half. Cloneable; any number of producers may enqueue.
#[derive(Debug, Clone)]
pub struct JobSender {
    tx: mpsc::UnboundedSender<Job>,
    depth: Arc<AtomicUsize>,
}

impl JobSender {
    /// Enqueue a job. Fails only when the consumer side is gone.
    pub fn send(&self, job: Job) -> Result<()> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.tx.send(job).map_err(|e| {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            Error::Other(format!("job queue closed, dropped item {}", e.0.item_id))
        })
    }

    /// Number of jobs enqueued but not yet received.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

/// Consumer half. Exactly one exists per queue.
#[derive(Debug)]
pub struct JobReceiver {
    rx: mpsc::UnboundedReceiver<Job>,
    depth: Arc<AtomicUsize>,
}

impl JobReceiver {
    /// Wait for the next job; `None` once every sender is dropped and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<Job> {
        let job = self.rx.recv().await?;
        self.depth.fetch_sub(1, Ordering::SeqCst);
        Some(job)
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(item: &str) -> Job {
        Job::new(item, item, format!("https://www.youtube.com/watch?v={item}"), "UC1")
    }

    #[tokio::test]
    async fn test_fifo_and_depth() {
        let (tx, mut rx) = job_queue();
        tx.send(job("a")).unwrap();
        tx.send(job("b")).unwrap();
        tx.clone().send(job("c")).unwrap();
        assert_eq!(tx.depth(), 3);

        assert_eq!(rx.recv().await.unwrap().item_id, "a");
        assert_eq!(rx.depth(), 2);
        assert_eq!(rx.recv().await.unwrap().item_id, "b");
        assert_eq!(rx.recv().await.unwrap().item_id, "c");
        assert_eq!(tx.depth(), 0);
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (tx, rx) = job_queue();
        drop(rx);
        assert!(tx.send(job("a")).is_err());
        assert_eq!(tx.depth(), 0);
    }

    #[tokio::test]
    async fn test_recv_ends_when_senders_dropped() {
        let (tx, mut rx) = job_queue();
        tx.send(job("a")).unwrap();
        drop(tx);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
