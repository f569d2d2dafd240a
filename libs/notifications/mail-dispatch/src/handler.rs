//! Queue entry point with lazily initialized clients
//!
//! The processor is built on the first batch and reused for every later
//! batch in the same process. If building it fails, that batch fails as a
//! whole and the next batch tries again.

use crate::error::{DispatchError, DispatchResult};
use crate::models::QueueBatch;
use crate::processor::{BatchProcessor, BatchReport};
use crate::provider::RawEmailProvider;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{error, info};

type InitFuture<P> = Pin<Box<dyn Future<Output = DispatchResult<BatchProcessor<P>>> + Send>>;
type InitFn<P> = Box<dyn Fn() -> InitFuture<P> + Send + Sync>;

pub struct QueueHandler<P: RawEmailProvider> {
    processor: OnceCell<BatchProcessor<P>>,
    init: InitFn<P>,
}

impl<P: RawEmailProvider + 'static> QueueHandler<P> {
    /// `init` runs until it succeeds once.
    pub fn new<F, Fut>(init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DispatchResult<BatchProcessor<P>>> + Send + 'static,
    {
        Self {
            processor: OnceCell::new(),
            init: Box::new(move || Box::pin(init())),
        }
    }

    /// Wrap an already-built processor.
    pub fn with_processor(processor: BatchProcessor<P>) -> Self {
        Self {
            processor: OnceCell::new_with(Some(processor)),
            init: Box::new(|| {
                Box::pin(async {
                    Err(DispatchError::Initialization(
                        "processor was supplied up front".to_string(),
                    ))
                })
            }),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.processor.initialized()
    }

    /// Process a batch. Only initialization failures are returned as errors.
    pub async fn handle(
        &self,
        batch: &QueueBatch,
        deadline: Option<Instant>,
    ) -> DispatchResult<BatchReport> {
        let processor = self
            .processor
            .get_or_try_init(|| async {
                info!("Initializing mail dispatcher clients");
                (self.init)().await.map_err(|e| {
                    error!(error = %e, "Failed to initialize mail dispatcher");
                    if e.is_batch_level() {
                        e
                    } else {
                        DispatchError::Initialization(e.to_string())
                    }
                })
            })
            .await?;

        Ok(processor.process_batch_until(&batch.records, deadline).await)
    }
}
