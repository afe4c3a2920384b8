//! Queue consumer
//!
//! Pulls deliveries off the jobs queue and runs each one through the
//! [`JobWorker`] in its own task. A delivery is acknowledged when the worker
//! returns an [`Outcome`](crate::Outcome) and left to reappear after its
//! visibility timeout when it returns an error. Messages delivered more than
//! `max_dequeue_count` times go to the poison queue unprocessed.

use anyhow::{Context, Result};
use ferry_store::{Delivery, WorkQueue};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::worker::JobWorker;

/// Consumer tuning
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Sleep between polls when the queue is empty
    pub poll_interval: Duration,
    /// How long a received message stays hidden from other consumers
    pub visibility_timeout: Duration,
    /// Deliveries after which a message is considered poison
    pub max_dequeue_count: u32,
    /// Deliveries processed concurrently
    pub max_parallel_jobs: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            visibility_timeout: Duration::from_secs(300),
            max_dequeue_count: 5,
            max_parallel_jobs: 4,
        }
    }
}

/// What one poll cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub dispatched: usize,
    pub poisoned: usize,
}

impl PollSummary {
    pub fn is_idle(&self) -> bool {
        self.dispatched == 0 && self.poisoned == 0
    }
}

pub struct QueueConsumer {
    config: ConsumerConfig,
    queue: Arc<dyn WorkQueue>,
    worker: Arc<JobWorker>,
    semaphore: Arc<Semaphore>,
}

impl QueueConsumer {
    pub fn new(config: ConsumerConfig, queue: Arc<dyn WorkQueue>, worker: Arc<JobWorker>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_parallel_jobs.max(1)));
        Self {
            config,
            queue,
            worker,
            semaphore,
        }
    }

    /// Runs until `shutdown` resolves, then waits for in-flight deliveries
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            "Starting queue consumer (poll {:?}, visibility {:?}, max dequeue {}, parallel {})",
            self.config.poll_interval,
            self.config.visibility_timeout,
            self.config.max_dequeue_count,
            self.config.max_parallel_jobs
        );

        tokio::pin!(shutdown);

        loop {
            let idle = tokio::select! {
                _ = &mut shutdown => break,
                result = self.poll_once() => match result {
                    Ok(summary) => {
                        if !summary.is_idle() {
                            debug!(
                                "Poll cycle: {} dispatched, {} poisoned",
                                summary.dispatched, summary.poisoned
                            );
                        }
                        summary.is_idle()
                    }
                    Err(e) => {
                        error!("Error during poll cycle: {:#}", e);
                        true
                    }
                },
            };

            if idle {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        info!("Shutdown requested, waiting for in-flight jobs");
        self.wait_idle().await;
        info!("Queue consumer stopped");

        Ok(())
    }

    /// Receives and dispatches deliveries while worker slots are free
    pub async fn poll_once(&self) -> Result<PollSummary> {
        let mut summary = PollSummary::default();

        while let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
            let Some(delivery) = self
                .queue
                .receive(self.config.visibility_timeout)
                .await
                .context("Failed to receive from jobs queue")?
            else {
                break;
            };

            if delivery.dequeue_count > self.config.max_dequeue_count {
                warn!(
                    "Message {} delivered {} times, moving to poison queue",
                    delivery.id, delivery.dequeue_count
                );
                self.queue
                    .dead_letter(&delivery)
                    .await
                    .context("Failed to move message to poison queue")?;
                summary.poisoned += 1;
                continue;
            }

            self.spawn_delivery(delivery, permit);
            summary.dispatched += 1;
        }

        Ok(summary)
    }

    /// Waits until every dispatched delivery has finished
    pub async fn wait_idle(&self) {
        let slots = u32::try_from(self.config.max_parallel_jobs.max(1)).unwrap_or(u32::MAX);
        // Only fails once the semaphore is closed, which never happens here.
        let _ = self.semaphore.acquire_many(slots).await;
    }

    fn spawn_delivery(&self, delivery: Delivery, permit: OwnedSemaphorePermit) {
        let queue = Arc::clone(&self.queue);
        let worker = Arc::clone(&self.worker);

        tokio::spawn(async move {
            process_delivery(queue.as_ref(), worker.as_ref(), delivery).await;
            drop(permit);
        });
    }
}

async fn process_delivery(queue: &dyn WorkQueue, worker: &JobWorker, delivery: Delivery) {
    debug!(
        "Processing message {} (dequeue {})",
        delivery.id, delivery.dequeue_count
    );

    match worker.handle(&delivery.body).await {
        Ok(outcome) => {
            debug!("Message {} finished: {:?}", delivery.id, outcome);
            if let Err(e) = queue.delete(&delivery).await {
                warn!("Failed to acknowledge message {}: {}", delivery.id, e);
            }
        }
        Err(e) => {
            warn!(
                "Message {} left for redelivery (dequeue {}): {}",
                delivery.id, delivery.dequeue_count, e
            );
        }
    }
}
