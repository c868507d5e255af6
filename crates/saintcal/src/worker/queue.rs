//! Hand-off channel between the job tracker and the worker pool.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};

use crate::error::WorkerError;
use crate::worker::job::QueuedJob;

/// Something jobs can be submitted to.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job: QueuedJob) -> Result<(), WorkerError>;
}

/// Bounded in-process queue backed by a crossbeam channel.
///
/// `enqueue` blocks for at most `enqueue_timeout` when the queue is full.
#[derive(Clone)]
pub struct ChannelQueue {
    sender: Sender<QueuedJob>,
    receiver: Receiver<QueuedJob>,
    enqueue_timeout: Duration,
}

impl ChannelQueue {
    pub fn new(capacity: usize, enqueue_timeout: Duration) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            sender,
            receiver,
            enqueue_timeout,
        }
    }

    /// Receiving half for workers. Every clone competes for the same messages.
    pub fn receiver(&self) -> Receiver<QueuedJob> {
        self.receiver.clone()
    }

    /// Number of jobs waiting to be picked up.
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }
}

impl JobQueue for ChannelQueue {
    fn enqueue(&self, job: QueuedJob) -> Result<(), WorkerError> {
        match self.sender.send_timeout(job, self.enqueue_timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(job)) => {
                log::warn!("Queue full, dropping delivery of job {}", job.job_id);
                Err(WorkerError::QueueFull(self.enqueue_timeout.as_millis() as u64))
            }
            Err(SendTimeoutError::Disconnected(_)) => Err(WorkerError::ChannelClosed),
        }
    }
}

/// Accepts every job without delivering it. The job stays `pending` in the
/// store until a worker process picks it up with
/// [`JobTracker::requeue_pending`](crate::jobs::JobTracker::requeue_pending).
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferredQueue;

impl JobQueue for DeferredQueue {
    fn enqueue(&self, job: QueuedJob) -> Result<(), WorkerError> {
        log::debug!("Job {} left pending for a worker process", job.job_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobType;

    fn queued(id: &str) -> QueuedJob {
        QueuedJob {
            job_id: id.to_string(),
            user_id: "alice".to_string(),
            job_type: JobType::Validation,
            spreadsheet_id: None,
            attempt: 1,
        }
    }

    #[test]
    fn test_enqueue_and_receive() {
        let queue = ChannelQueue::new(4, Duration::from_millis(10));
        queue.enqueue(queued("a")).unwrap();
        queue.enqueue(queued("b")).unwrap();
        assert_eq!(queue.len(), 2);

        let rx = queue.receiver();
        assert_eq!(rx.try_recv().unwrap().job_id, "a");
        assert_eq!(rx.try_recv().unwrap().job_id, "b");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_times_out() {
        let queue = ChannelQueue::new(1, Duration::from_millis(10));
        queue.enqueue(queued("a")).unwrap();
        let err = queue.enqueue(queued("b")).unwrap_err();
        assert!(matches!(err, WorkerError::QueueFull(10)));
    }

    #[test]
    fn test_deferred_queue_accepts_everything() {
        assert!(DeferredQueue.enqueue(queued("a")).is_ok());
    }
}
