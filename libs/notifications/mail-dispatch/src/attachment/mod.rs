//! Attachment resolution.
//!
//! Every reference resolves to a file on disk. Local references point at the
//! caller's file; object-store and HTTP references are downloaded into the
//! attachment directory under a collision-free name. Downloaded files are
//! removed when the `ResolvedAttachment` is dropped unless retention is on.

pub mod http;
pub mod s3;

pub use http::ReqwestFetcher;
pub use s3::S3ObjectStore;

use crate::config::{CleanupScope, DispatchConfig};
use crate::error::{FetchError, ResolutionError};
use crate::models::AttachmentRef;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

/// Length of generated names for references without a usable file name
const RANDOM_NAME_LEN: usize = 16;

/// Byte source keyed by bucket and key
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, FetchError>;
}

/// Unauthenticated HTTP GET
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Who owns the file behind a resolved attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentOrigin {
    /// Caller-supplied local file
    Borrowed,
    /// Written by the resolver
    Materialized,
}

/// Attachment content materialized on disk.
#[derive(Debug)]
pub struct ResolvedAttachment {
    path: PathBuf,
    name: String,
    origin: AttachmentOrigin,
    retain: bool,
}

impl ResolvedAttachment {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name shown to the recipient
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> AttachmentOrigin {
        self.origin
    }

    pub async fn read(&self) -> Result<Vec<u8>, ResolutionError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| ResolutionError::io(&self.path, e))
    }
}

impl Drop for ResolvedAttachment {
    fn drop(&mut self) {
        if self.origin != AttachmentOrigin::Materialized || self.retain {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed materialized attachment"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove materialized attachment"
            ),
        }
    }
}

/// Resolves attachment references into files on disk
#[derive(Clone)]
pub struct AttachmentResolver {
    store: Arc<dyn ObjectStore>,
    http: Arc<dyn HttpFetcher>,
    directory: PathBuf,
    retain: bool,
    cleanup: CleanupScope,
}

impl AttachmentResolver {
    /// Create a resolver writing downloads into `directory`
    pub fn new(
        store: Arc<dyn ObjectStore>,
        http: Arc<dyn HttpFetcher>,
        directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            http,
            directory: directory.into(),
            retain: false,
            cleanup: CleanupScope::default(),
        }
    }

    /// Create a resolver with directory, retention and cleanup scope from config
    pub fn from_config(
        store: Arc<dyn ObjectStore>,
        http: Arc<dyn HttpFetcher>,
        config: &DispatchConfig,
    ) -> Self {
        Self::new(store, http, &config.attachment_dir)
            .retain_files(config.retain_attachments())
            .with_cleanup(config.cleanup)
    }

    /// Keep every file on disk after sending (development mode)
    pub fn retain_files(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn with_cleanup(mut self, cleanup: CleanupScope) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Resolve one reference into a file on disk.
    #[instrument(skip(self), fields(kind = %attachment.kind()))]
    pub async fn resolve(
        &self,
        attachment: &AttachmentRef,
    ) -> Result<ResolvedAttachment, ResolutionError> {
        match attachment {
            AttachmentRef::Local { path } => {
                let metadata = tokio::fs::metadata(path)
                    .await
                    .map_err(|e| ResolutionError::io(path, e))?;
                if !metadata.is_file() {
                    return Err(ResolutionError::InvalidReference {
                        path: path.to_string_lossy().into_owned(),
                        reason: "local attachment is not a regular file".to_string(),
                    });
                }

                Ok(ResolvedAttachment {
                    path: path.clone(),
                    name: display_name(&path.to_string_lossy()),
                    origin: AttachmentOrigin::Borrowed,
                    retain: true,
                })
            }
            AttachmentRef::ObjectStore { path } => {
                let (bucket, key) = split_object_path(path)?;
                debug!(bucket, key, "Fetching attachment from object store");

                let bytes = self.store.get_object(bucket, key).await?;
                self.materialize(&display_name(key), &bytes).await
            }
            AttachmentRef::Http { url } => {
                let parsed =
                    reqwest::Url::parse(url).map_err(|e| ResolutionError::InvalidReference {
                        path: url.clone(),
                        reason: e.to_string(),
                    })?;
                debug!(url = %parsed, "Fetching attachment over HTTP");

                let bytes = self.http.get(url).await?;
                self.materialize(&url_file_name(&parsed), &bytes).await
            }
            AttachmentRef::Unsupported { kind, .. } => {
                Err(ResolutionError::UnsupportedType(kind.clone()))
            }
        }
    }

    /// Apply the cleanup scope to caller-supplied files once the message is
    /// serialized. Materialized files are released by dropping them.
    pub async fn release(&self, attachments: Vec<ResolvedAttachment>) {
        for attachment in attachments {
            if attachment.origin != AttachmentOrigin::Borrowed
                || self.retain
                || self.cleanup != CleanupScope::All
            {
                continue;
            }
            if let Err(e) = tokio::fs::remove_file(&attachment.path).await {
                warn!(
                    path = %attachment.path.display(),
                    error = %e,
                    "Failed to remove local attachment"
                );
            }
        }
    }

    async fn materialize(
        &self,
        name: &str,
        bytes: &[u8],
    ) -> Result<ResolvedAttachment, ResolutionError> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| ResolutionError::io(&self.directory, e))?;

        let (path, mut file) = create_unique(&self.directory, name)
            .await
            .map_err(|e| ResolutionError::io(self.directory.join(name), e))?;

        // Removed on drop until the write has completed
        let mut resolved = ResolvedAttachment {
            path,
            name: name.to_string(),
            origin: AttachmentOrigin::Materialized,
            retain: false,
        };

        file.write_all(bytes)
            .await
            .map_err(|e| ResolutionError::io(&resolved.path, e))?;
        file.flush()
            .await
            .map_err(|e| ResolutionError::io(&resolved.path, e))?;

        resolved.retain = self.retain;
        debug!(
            path = %resolved.path.display(),
            size = bytes.len(),
            "Materialized attachment"
        );
        Ok(resolved)
    }
}

/// Split `bucket/key` (optionally `s3://bucket/key`) at the first separator.
pub fn split_object_path(path: &str) -> Result<(&str, &str), ResolutionError> {
    let trimmed = path.strip_prefix("s3://").unwrap_or(path);
    match trimmed.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok((bucket, key)),
        _ => Err(ResolutionError::InvalidReference {
            path: path.to_string(),
            reason: "expected '<bucket>/<key>'".to_string(),
        }),
    }
}

/// Base file name of a reference, or a random name when there is none.
pub fn display_name(reference: &str) -> String {
    let base = reference
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();

    match base {
        "" | "." | ".." => random_name(),
        name => name.to_string(),
    }
}

/// Decoded last path segment of a URL, so `My%20Report.pdf` is named
/// `My Report.pdf`. Query and fragment never contribute.
fn url_file_name(url: &reqwest::Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");

    match urlencoding::decode(segment) {
        Ok(decoded) => display_name(&decoded),
        Err(_) => display_name(segment),
    }
}

fn random_name() -> String {
    let mut name = uuid::Uuid::new_v4().simple().to_string();
    name.truncate(RANDOM_NAME_LEN);
    name
}

/// `name` with `_<n>` inserted before the extension.
pub fn numbered_name(name: &str, n: u32) -> String {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());

    match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    }
}

/// Create a new file named `name` in `dir`, probing `_0`, `_1`, ... while
/// the candidate already exists. Never opens an existing file.
async fn create_unique(dir: &Path, name: &str) -> std::io::Result<(PathBuf, File)> {
    let mut candidate = dir.join(name);
    let mut n = 0;

    loop {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                candidate = dir.join(numbered_name(name, n));
                n += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
