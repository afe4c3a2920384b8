//! Ferry job lifecycle engine
//!
//! The asynchronous job pipeline in four parts:
//! - [`JobSubmitter`]: allocates a job, persists its input and record, then
//!   enqueues a work message
//! - [`JobWorker`]: the per-delivery state machine driving a job to a
//!   terminal state through the [`Backend`](ferry_forwarder::Backend)
//! - [`JobStatusReader`]: maps a record (and output) to what clients see
//! - [`QueueConsumer`]: pulls deliveries off the queue and feeds the worker

pub mod consumer;
pub mod status;
pub mod submitter;
pub mod worker;

pub use consumer::{ConsumerConfig, PollSummary, QueueConsumer};
pub use status::{JobStatusReader, JobView, StatusError, StatusQuery};
pub use submitter::{JobSubmitter, SubmitError, Submission};
pub use worker::{JobWorker, Outcome, WorkerError};

use ferry_store::{BlobStore, JobTable, StoreError, WorkQueue, names};
use std::sync::Arc;

/// Handles to the three durable store resources
#[derive(Clone)]
pub struct Stores {
    pub blobs: Arc<dyn BlobStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub jobs: Arc<dyn JobTable>,
}

impl Stores {
    /// Uses one backend for blobs, queue and table
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: BlobStore + WorkQueue + JobTable + 'static,
    {
        Self {
            blobs: store.clone(),
            queue: store.clone(),
            jobs: store,
        }
    }

    /// Creates the containers, queue and table if they do not exist yet
    pub async fn ensure(&self) -> Result<(), StoreError> {
        self.queue.ensure().await?;
        self.jobs.ensure().await?;
        self.blobs.ensure_container(names::INPUT_CONTAINER).await?;
        self.blobs.ensure_container(names::OUTPUT_CONTAINER).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use ferry_core::domain::operation::Operation;
    use ferry_forwarder::{Backend, ForwardError, ForwardResponse};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// What one forward recorded
    #[derive(Debug, Clone)]
    pub struct ForwardCall {
        pub operation: Operation,
        pub body: Vec<u8>,
        pub session_id: String,
    }

    /// Backend answering from a script; an empty script answers 200 `{}`
    #[derive(Default)]
    pub struct FakeBackend {
        script: Mutex<VecDeque<Result<ForwardResponse, ForwardError>>>,
        calls: Mutex<Vec<ForwardCall>>,
    }

    impl FakeBackend {
        pub fn answering(status: u16, content_type: &str, body: &str) -> Self {
            let backend = Self::default();
            backend.push(Ok(ForwardResponse {
                status,
                body: body.as_bytes().to_vec(),
                content_type: content_type.to_string(),
            }));
            backend
        }

        pub fn push(&self, result: Result<ForwardResponse, ForwardError>) {
            self.script.lock().unwrap().push_back(result);
        }

        pub fn calls(&self) -> Vec<ForwardCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn forward(
            &self,
            operation: Operation,
            body: &[u8],
            session_id: &str,
        ) -> Result<ForwardResponse, ForwardError> {
            self.calls.lock().unwrap().push(ForwardCall {
                operation,
                body: body.to_vec(),
                session_id: session_id.to_string(),
            });
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ForwardResponse::json(200, "{}")))
        }
    }
}
