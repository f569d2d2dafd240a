//! Mail Dispatch Worker
//!
//! Runs one queue event through the mail dispatcher.
//!
//! ## Flow
//!
//! ```text
//! SQS event JSON (file or stdin)
//!   ↓
//! QueueHandler (clients built on first batch)
//!   ↓
//! BatchProcessor: decode → assemble → send, per record
//!   ↓
//! AWS SES
//! ```
//!
//! The process exits non-zero only when the batch as a whole fails
//! (configuration or client initialization). Individual record failures are
//! logged and reported, and leave the exit status untouched.

pub mod telemetry;

use clap::Parser;
use eyre::{Result, WrapErr};
use mail_dispatch::{initialize_from_env, Environment, QueueBatch, QueueHandler};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "mail-dispatch-worker")]
#[command(about = "Send the emails described by a queue event")]
pub struct Args {
    /// Path to the queue event JSON. Reads stdin when omitted.
    #[arg(short, long)]
    pub event: Option<PathBuf>,

    /// Invocation time limit in seconds; records still running are failed.
    #[arg(short, long)]
    pub timeout_secs: Option<u64>,
}

/// Read the raw event from a file, or stdin when no path is given.
pub async fn read_event(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .wrap_err_with(|| format!("Failed to read event file {}", path.display())),
        None => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .wrap_err("Failed to read event from stdin")?;
            Ok(raw)
        }
    }
}

pub fn parse_event(raw: &str) -> Result<QueueBatch> {
    serde_json::from_str(raw).wrap_err("Event is not a valid queue batch")
}

/// Run the worker
///
/// 1. Installs color-eyre and tracing (JSON in production, pretty otherwise)
/// 2. Reads and decodes the queue event
/// 3. Builds the AWS clients and processes every record
///
/// # Errors
///
/// Returns an error if the event cannot be read or decoded, or if the
/// dispatcher cannot be initialized.
pub async fn run() -> Result<()> {
    telemetry::install_color_eyre();
    let args = Args::parse();

    let environment = Environment::from_env();
    telemetry::init_tracing(&environment);

    let deadline = args
        .timeout_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    let raw = read_event(args.event.as_deref()).await?;
    let batch = parse_event(&raw)?;
    info!(records = batch.records.len(), "Received queue event");

    let handler = QueueHandler::new(initialize_from_env);
    let report = handler
        .handle(&batch, deadline)
        .await
        .wrap_err("Batch failed")?;

    if report.failed_count() > 0 {
        warn!(
            sent = report.sent_count(),
            failed = report.failed_count(),
            failed_ids = ?report.failed_ids(),
            "Batch finished with failed records"
        );
    } else {
        info!(sent = report.sent_count(), "Batch finished");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default_to_stdin() {
        let args = Args::try_parse_from(["mail-dispatch-worker"]).unwrap();
        assert!(args.event.is_none());
        assert!(args.timeout_secs.is_none());
    }

    #[test]
    fn test_args_event_and_timeout() {
        let args = Args::try_parse_from([
            "mail-dispatch-worker",
            "--event",
            "event.json",
            "--timeout-secs",
            "30",
        ])
        .unwrap();
        assert_eq!(args.event, Some(PathBuf::from("event.json")));
        assert_eq!(args.timeout_secs, Some(30));
    }

    #[test]
    fn test_parse_event() {
        let batch = parse_event(
            r#"{"Records":[{"messageId":"1","body":"{}","receiptHandle":"abc"}]}"#,
        )
        .unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].message_id, "1");

        assert!(parse_event("not json").is_err());
    }

    #[tokio::test]
    async fn test_read_event_from_file() {
        let path = std::env::temp_dir().join("mail-dispatch-worker-event.json");
        tokio::fs::write(&path, r#"{"Records":[]}"#).await.unwrap();

        let raw = read_event(Some(&path)).await.unwrap();
        assert!(parse_event(&raw).unwrap().records.is_empty());

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_event_missing_file() {
        let err = read_event(Some(Path::new("/nonexistent/event.json")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("event.json"));
    }
}
