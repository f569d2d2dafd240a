//! Raw MIME message assembly using lettre

use crate::attachment::{AttachmentResolver, ResolvedAttachment};
use crate::error::{AssemblyError, ResolutionError};
use crate::models::{ContentType, EmailRequest};
use lettre::message::header::ContentType as MimeType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use std::path::Path;
use tracing::{debug, instrument};

/// Serialized email ready for submission
#[derive(Debug, Clone)]
pub struct RawEmailMessage {
    /// Envelope recipients: to, cc, then bcc
    pub destinations: Vec<String>,
    pub from: String,
    pub content_type: ContentType,
    /// Display names of attached files, in order
    pub attachments: Vec<String>,
    /// RFC 5322 message bytes
    pub data: Vec<u8>,
}

/// Builds raw messages from email requests
#[derive(Clone)]
pub struct EmailAssembler {
    resolver: AttachmentResolver,
}

impl EmailAssembler {
    pub fn new(resolver: AttachmentResolver) -> Self {
        Self { resolver }
    }

    /// Resolve attachments and serialize the request into a raw message.
    ///
    /// The first attachment that fails to resolve aborts assembly; files
    /// already downloaded for the request are removed before returning.
    #[instrument(skip_all, fields(subject = %request.subject, attachments = request.attachments().len()))]
    pub async fn assemble(&self, request: &EmailRequest) -> Result<RawEmailMessage, AssemblyError> {
        if request.to.is_empty() {
            return Err(AssemblyError::MissingRecipients);
        }

        let mut builder = Message::builder()
            .from(parse_mailbox("from", &request.from)?)
            .subject(request.subject.as_str());

        // Cc recipients share the To header; bcc only travels in the envelope
        for address in &request.to {
            builder = builder.to(parse_mailbox("to", address)?);
        }
        for address in request.cc.iter().flatten() {
            builder = builder.to(parse_mailbox("cc", address)?);
        }
        for address in request.reply_to.iter().flatten() {
            builder = builder.reply_to(parse_mailbox("reply-to", address)?);
        }

        let content_type = request.content_type();
        let body = SinglePart::builder()
            .header(mime_type(content_type))
            .body(request.body.clone());

        let mut resolved = Vec::with_capacity(request.attachments().len());
        for (index, reference) in request.attachments().iter().enumerate() {
            let attachment = self
                .resolver
                .resolve(reference)
                .await
                .map_err(|source| AssemblyError::Attachment { index, source })?;
            resolved.push(attachment);
        }

        let message = if resolved.is_empty() {
            builder.singlepart(body)?
        } else {
            let mut mixed = MultiPart::mixed().singlepart(body);
            for (index, attachment) in resolved.iter().enumerate() {
                mixed = mixed.singlepart(attachment_part(attachment).await.map_err(|source| {
                    AssemblyError::Attachment { index, source }
                })?);
            }
            builder.multipart(mixed)?
        };

        let data = message.formatted();
        let names = resolved.iter().map(|a| a.name().to_string()).collect();
        self.resolver.release(resolved).await;

        debug!(size = data.len(), "Assembled raw email");

        Ok(RawEmailMessage {
            destinations: request.destinations(),
            from: request.from.clone(),
            content_type,
            attachments: names,
            data,
        })
    }
}

fn parse_mailbox(field: &'static str, address: &str) -> Result<Mailbox, AssemblyError> {
    address
        .trim()
        .parse()
        .map_err(|_| AssemblyError::InvalidAddress {
            field,
            address: address.to_string(),
        })
}

fn mime_type(content_type: ContentType) -> MimeType {
    match content_type {
        ContentType::PlainText => MimeType::TEXT_PLAIN,
        ContentType::Html => MimeType::TEXT_HTML,
    }
}

async fn attachment_part(
    attachment: &ResolvedAttachment,
) -> Result<SinglePart, ResolutionError> {
    let essence = guess_mime(attachment.path());
    let mime = MimeType::parse(essence).map_err(|e| ResolutionError::InvalidReference {
        path: attachment.path().to_string_lossy().into_owned(),
        reason: format!("bad content type {}: {}", essence, e),
    })?;

    let content = attachment.read().await?;
    Ok(Attachment::new(attachment.name().to_string()).body(content, mime))
}

/// Content type from the file extension, `application/octet-stream` otherwise.
fn guess_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}
