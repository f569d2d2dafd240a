//! Mail Dispatch Library
//!
//! Turns queue messages describing an email into raw MIME messages and
//! submits them through AWS SES.
//!
//! # Pipeline
//!
//! ```text
//! QueueBatch -> BatchProcessor -> EmailAssembler -> EmailSender -> RawEmailProvider
//!                                      |
//!                              AttachmentResolver (local / s3 / http)
//! ```
//!
//! Each record is handled on its own: a record that cannot be decoded,
//! assembled, or sent is logged and reported, and the rest of the batch
//! carries on. Only client initialization failures fail a whole batch.
//!
//! # Example
//!
//! ```ignore
//! use mail_dispatch::{initialize_from_env, QueueHandler};
//!
//! let handler = QueueHandler::new(initialize_from_env);
//! let report = handler.handle(&batch, None).await?;
//! ```

pub mod assembler;
pub mod attachment;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod models;
pub mod processor;
pub mod provider;
pub mod reporter;
pub mod sender;

pub use assembler::{EmailAssembler, RawEmailMessage};
pub use attachment::{
    AttachmentOrigin, AttachmentResolver, HttpFetcher, ObjectStore, ResolvedAttachment,
};
pub use config::{CleanupScope, ConfigError, DispatchConfig, Environment, FromEnv};
pub use context::{initialize, initialize_from_env, load_sdk_config};
pub use error::{
    AssemblyError, DispatchError, DispatchResult, FetchError, ResolutionError, SendError,
};
pub use handler::QueueHandler;
pub use models::{AttachmentRef, ContentType, EmailRequest, QueueBatch, QueueRecord};
pub use processor::{BatchProcessor, BatchReport, RecordOutcome, RecordStatus};
pub use provider::{RawEmailProvider, RawSendRequest};
pub use reporter::{ErrorReporter, NoopErrorReporter, RecordFailure, WebhookErrorReporter};
pub use sender::EmailSender;
