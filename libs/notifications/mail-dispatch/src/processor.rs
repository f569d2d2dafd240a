//! BatchProcessor - sends every record of a queue batch independently
//!
//! Each record goes decode -> assemble -> send. A failure at any stage is
//! logged, handed to the `ErrorReporter`, and the next record is processed;
//! per-record failures never fail the batch.

use crate::assembler::EmailAssembler;
use crate::error::{DispatchError, DispatchResult};
use crate::models::{EmailRequest, QueueRecord};
use crate::provider::RawEmailProvider;
use crate::reporter::{ErrorReporter, NoopErrorReporter, RecordFailure};
use crate::sender::EmailSender;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, info_span, warn, Instrument};

/// Final state of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    Sent { message_id: String },
    Failed { stage: &'static str, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub record_id: String,
    pub status: RecordStatus,
}

impl RecordOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self.status, RecordStatus::Sent { .. })
    }
}

/// Outcomes of a processed batch, in record order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<RecordOutcome>,
}

impl BatchReport {
    pub fn sent_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_sent()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.sent_count()
    }

    /// Ids of records that were not sent
    pub fn failed_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_sent())
            .map(|o| o.record_id.as_str())
            .collect()
    }
}

/// Processes queue records through the assembler and sender
pub struct BatchProcessor<P: RawEmailProvider> {
    assembler: EmailAssembler,
    sender: EmailSender<P>,
    reporter: Arc<dyn ErrorReporter>,
}

impl<P: RawEmailProvider> BatchProcessor<P> {
    /// Create a processor that discards failure reports
    pub fn new(assembler: EmailAssembler, sender: EmailSender<P>) -> Self {
        Self {
            assembler,
            sender,
            reporter: Arc::new(NoopErrorReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Process every record with no deadline.
    pub async fn process_batch(&self, records: &[QueueRecord]) -> BatchReport {
        self.process_batch_until(records, None).await
    }

    /// Process every record, failing any work still running at `deadline`.
    pub async fn process_batch_until(
        &self,
        records: &[QueueRecord],
        deadline: Option<Instant>,
    ) -> BatchReport {
        let mut report = BatchReport::default();

        for record in records {
            let span = info_span!("mail_service", record_id = %record.message_id);
            let outcome = self
                .process_record(record, deadline)
                .instrument(span)
                .await;
            report.outcomes.push(outcome);
        }

        info!(
            records = records.len(),
            sent = report.sent_count(),
            failed = report.failed_count(),
            "Processed batch"
        );
        report
    }

    async fn process_record(&self, record: &QueueRecord, deadline: Option<Instant>) -> RecordOutcome {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return self
                .fail(record, None, DispatchError::DeadlineExceeded)
                .await;
        }

        let mut request = match EmailRequest::from_json(&record.body) {
            Ok(request) => request,
            Err(e) => return self.fail(record, None, e.into()).await,
        };
        request.apply_defaults();

        let result = match deadline {
            Some(deadline) => timeout_at(deadline, self.deliver(&request))
                .await
                .unwrap_or(Err(DispatchError::DeadlineExceeded)),
            None => self.deliver(&request).await,
        };

        match result {
            Ok(message_id) => {
                info!(
                    record_id = %record.message_id,
                    message_id = %message_id,
                    "Successfully sent email"
                );
                RecordOutcome {
                    record_id: record.message_id.clone(),
                    status: RecordStatus::Sent { message_id },
                }
            }
            Err(e) => self.fail(record, Some(&request), e).await,
        }
    }

    async fn deliver(&self, request: &EmailRequest) -> DispatchResult<String> {
        let message = self.assembler.assemble(request).await?;
        Ok(self.sender.send(&message).await?)
    }

    async fn fail(
        &self,
        record: &QueueRecord,
        request: Option<&EmailRequest>,
        err: DispatchError,
    ) -> RecordOutcome {
        match request {
            Some(request) => error!(
                record_id = %record.message_id,
                stage = err.stage(),
                error = %err,
                to = ?request.to,
                cc = ?request.cc,
                bcc = ?request.bcc,
                reply_to = ?request.reply_to,
                from = %request.from,
                subject = %request.subject,
                "Failed to send email"
            ),
            None => error!(
                record_id = %record.message_id,
                stage = err.stage(),
                error = %err,
                "Failed to send email"
            ),
        }

        let failure = RecordFailure {
            record_id: record.message_id.clone(),
            stage: err.stage(),
            error: err.to_string(),
            to: request.map(|r| r.to.clone()).unwrap_or_default(),
            subject: request.map(|r| r.subject.clone()),
        };
        if let Err(report_err) = self.reporter.report(&failure).await {
            warn!(
                record_id = %record.message_id,
                error = %report_err,
                "Failed to report error"
            );
        }

        RecordOutcome {
            record_id: failure.record_id,
            status: RecordStatus::Failed {
                stage: failure.stage,
                error: failure.error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::{AttachmentResolver, HttpFetcher, MockHttpFetcher, MockObjectStore};
    use crate::error::FetchError;
    use crate::provider::{RawSendRequest, RecordingProvider};
    use crate::reporter::MockErrorReporter;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const GOOD: &str = r#"{"to":["a@x.com"],"from":"b@x.com","subject":"hi","body":"hello"}"#;

    fn assembler() -> EmailAssembler {
        EmailAssembler::new(AttachmentResolver::new(
            Arc::new(MockObjectStore::new()),
            Arc::new(MockHttpFetcher::new()),
            std::env::temp_dir(),
        ))
    }

    fn processor(provider: RecordingProvider) -> BatchProcessor<RecordingProvider> {
        BatchProcessor::new(assembler(), EmailSender::new(provider))
    }

    /// Provider that never answers within a test's deadline
    struct SlowProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RawEmailProvider for SlowProvider {
        async fn send_raw(&self, _request: &RawSendRequest) -> eyre::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("late".to_string())
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    /// Fetcher whose downloads outlast any test deadline
    struct StalledFetcher;

    #[async_trait]
    impl HttpFetcher for StalledFetcher {
        async fn get(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(b"too late".to_vec())
        }
    }

    #[tokio::test]
    async fn test_malformed_record_is_isolated() {
        let provider = RecordingProvider::new();
        let mut reporter = MockErrorReporter::new();
        reporter
            .expect_report()
            .withf(|failure: &RecordFailure| failure.record_id == "2" && failure.stage == "decode")
            .times(1)
            .returning(|_| Ok(()));

        let processor = processor(provider.clone()).with_reporter(Arc::new(reporter));
        let records = vec![
            QueueRecord::new("1", GOOD),
            QueueRecord::new("2", "{not json"),
            QueueRecord::new("3", GOOD.replace("a@x.com", "c@x.com")),
        ];

        let report = processor.process_batch(&records).await;

        assert_eq!(report.sent_count(), 2);
        assert_eq!(report.failed_ids(), vec!["2"]);
        assert!(report.outcomes[0].is_sent());
        assert!(report.outcomes[2].is_sent());
        assert_eq!(provider.sent_count().await, 2);
        assert!(provider.was_sent_to("c@x.com").await);
    }

    #[tokio::test]
    async fn test_reporter_failure_is_not_escalated() {
        let mut reporter = MockErrorReporter::new();
        reporter
            .expect_report()
            .times(1)
            .returning(|_| Err(eyre::eyre!("endpoint down")));

        let processor = processor(RecordingProvider::new()).with_reporter(Arc::new(reporter));
        let report = processor
            .process_batch(&[QueueRecord::new("1", "[]"), QueueRecord::new("2", GOOD)])
            .await;

        assert_eq!(report.failed_ids(), vec!["1"]);
        assert_eq!(report.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_reports_request_metadata() {
        let mut reporter = MockErrorReporter::new();
        reporter
            .expect_report()
            .withf(|failure: &RecordFailure| {
                failure.stage == "send"
                    && failure.to == vec!["a@x.com".to_string()]
                    && failure.subject.as_deref() == Some("hi")
            })
            .times(1)
            .returning(|_| Ok(()));

        let processor =
            processor(RecordingProvider::failing("rejected")).with_reporter(Arc::new(reporter));
        let report = processor.process_batch(&[QueueRecord::new("1", GOOD)]).await;

        match &report.outcomes[0].status {
            RecordStatus::Failed { stage, error } => {
                assert_eq!(*stage, "send");
                assert!(error.contains("rejected"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_object_reference_never_reaches_sender() {
        let provider = RecordingProvider::new();
        let processor = processor(provider.clone());
        let body = r#"{"to":["a@x.com"],"from":"b@x.com","subject":"s","body":"b",
            "attachments":[{"path":"no-separator","type":"s3"}]}"#;

        let report = processor.process_batch(&[QueueRecord::new("1", body)]).await;

        assert!(matches!(
            report.outcomes[0].status,
            RecordStatus::Failed { stage: "assemble", .. }
        ));
        assert_eq!(provider.sent_count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let report = processor(RecordingProvider::new()).process_batch(&[]).await;
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fails_in_flight_and_remaining_records() {
        let provider = Arc::new(SlowProvider {
            calls: AtomicUsize::new(0),
        });
        let processor = BatchProcessor::new(assembler(), EmailSender::from_shared(provider.clone()));
        let deadline = Instant::now() + Duration::from_secs(1);

        let report = processor
            .process_batch_until(
                &[QueueRecord::new("1", GOOD), QueueRecord::new("2", GOOD)],
                Some(deadline),
            )
            .await;

        assert_eq!(report.failed_ids(), vec!["1", "2"]);
        for outcome in &report.outcomes {
            assert!(matches!(
                outcome.status,
                RecordStatus::Failed { stage: "deadline", .. }
            ));
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_releases_downloaded_attachments() {
        let dir = std::env::temp_dir().join(format!("mail-dispatch-deadline-{}", uuid::Uuid::new_v4()));
        let mut store = MockObjectStore::new();
        store
            .expect_get_object()
            .times(1)
            .returning(|_, _| Ok(b"first".to_vec()));

        let provider = RecordingProvider::new();
        let resolver = AttachmentResolver::new(Arc::new(store), Arc::new(StalledFetcher), &dir);
        let processor = BatchProcessor::new(
            EmailAssembler::new(resolver),
            EmailSender::new(provider.clone()),
        );
        let body = r#"{"to":["a@x.com"],"from":"b@x.com","subject":"s","body":"b",
            "attachments":[
                {"path":"b/first.txt","type":"s3"},
                {"path":"https://files.example.com/second.txt","type":"http"}
            ]}"#;

        let deadline = Instant::now() + Duration::from_secs(1);
        let report = processor
            .process_batch_until(&[QueueRecord::new("1", body)], Some(deadline))
            .await;

        assert!(matches!(
            report.outcomes[0].status,
            RecordStatus::Failed { stage: "deadline", .. }
        ));
        assert_eq!(provider.sent_count().await, 0);

        // The first attachment was written before the deadline and removed after
        let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
        tokio::fs::remove_dir(&dir).await.unwrap();
    }
}
