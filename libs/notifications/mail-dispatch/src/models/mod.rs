use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::PathBuf;

/// Body content type of an email
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    /// `text/plain`
    PlainText,
    /// `text/html`
    #[default]
    Html,
}

impl ContentType {
    pub fn as_mime(&self) -> &'static str {
        match self {
            ContentType::PlainText => "text/plain",
            ContentType::Html => "text/html",
        }
    }

    /// Parse a wire value; an empty string means "not set".
    fn from_wire(value: &str) -> Result<Option<Self>, String> {
        let essence = value.split(';').next().unwrap_or("").trim();
        if essence.is_empty() {
            return Ok(None);
        }
        if essence.eq_ignore_ascii_case("text/plain") {
            Ok(Some(ContentType::PlainText))
        } else if essence.eq_ignore_ascii_case("text/html") {
            Ok(Some(ContentType::Html))
        } else {
            Err(format!("unsupported content_type '{}'", value))
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_mime())
    }
}

impl Serialize for ContentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_mime())
    }
}

fn deserialize_content_type<'de, D>(deserializer: D) -> Result<Option<ContentType>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        Some(value) => ContentType::from_wire(&value).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Where an attachment's content comes from.
///
/// Decoded from `{"path": "...", "type": "local" | "s3" | "http"}`. Unknown
/// type tags decode into `Unsupported` so the failure surfaces when the
/// attachment is resolved rather than when the record is parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireAttachment", into = "WireAttachment")]
pub enum AttachmentRef {
    /// File already on the worker's disk
    Local { path: PathBuf },
    /// `bucket/key` in the object store, optionally prefixed with `s3://`
    ObjectStore { path: String },
    /// Public URL fetched with an unauthenticated GET
    Http { url: String },
    Unsupported { kind: String, path: String },
}

impl AttachmentRef {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local { path: path.into() }
    }

    pub fn object_store(path: impl Into<String>) -> Self {
        Self::ObjectStore { path: path.into() }
    }

    pub fn http(url: impl Into<String>) -> Self {
        Self::Http { url: url.into() }
    }

    /// Wire type tag of this reference
    pub fn kind(&self) -> &str {
        match self {
            Self::Local { .. } => "local",
            Self::ObjectStore { .. } => "s3",
            Self::Http { .. } => "http",
            Self::Unsupported { kind, .. } => kind,
        }
    }

    /// Wire path of this reference
    pub fn path(&self) -> String {
        match self {
            Self::Local { path } => path.to_string_lossy().into_owned(),
            Self::ObjectStore { path } | Self::Unsupported { path, .. } => path.clone(),
            Self::Http { url } => url.clone(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireAttachment {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

impl From<WireAttachment> for AttachmentRef {
    fn from(wire: WireAttachment) -> Self {
        match wire.kind.trim().to_ascii_lowercase().as_str() {
            "local" => Self::Local {
                path: PathBuf::from(wire.path),
            },
            "s3" | "object-store" => Self::ObjectStore { path: wire.path },
            "http" | "https" => Self::Http { url: wire.path },
            _ => Self::Unsupported {
                kind: wire.kind,
                path: wire.path,
            },
        }
    }
}

impl From<AttachmentRef> for WireAttachment {
    fn from(attachment: AttachmentRef) -> Self {
        Self {
            path: attachment.path(),
            kind: attachment.kind().to_string(),
        }
    }
}

/// Email request decoded from one queue record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRequest {
    /// Primary recipients, must not be empty
    pub to: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcc: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Vec<String>>,
    pub from: String,
    pub subject: String,
    pub body: String,
    /// `None` until defaults are applied
    #[serde(
        default,
        deserialize_with = "deserialize_content_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub content_type: Option<ContentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<AttachmentRef>>,
}

impl EmailRequest {
    /// Create a new request with required fields
    pub fn new(
        to: impl Into<String>,
        from: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            to: vec![to.into()],
            cc: None,
            bcc: None,
            reply_to: None,
            from: from.into(),
            subject: subject.into(),
            body: body.into(),
            content_type: None,
            attachments: None,
        }
    }

    /// Decode a queue record body
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn with_cc(mut self, cc: Vec<String>) -> Self {
        self.cc = Some(cc);
        self
    }

    pub fn with_bcc(mut self, bcc: Vec<String>) -> Self {
        self.bcc = Some(bcc);
        self
    }

    pub fn with_reply_to(mut self, reply_to: Vec<String>) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    pub fn with_attachment(mut self, attachment: AttachmentRef) -> Self {
        self.attachments.get_or_insert_with(Vec::new).push(attachment);
        self
    }

    /// Fill in defaults for fields the sender may omit.
    pub fn apply_defaults(&mut self) {
        if self.content_type.is_none() {
            self.content_type = Some(ContentType::default());
        }
    }

    /// Effective body content type
    pub fn content_type(&self) -> ContentType {
        self.content_type.unwrap_or_default()
    }

    /// Envelope destinations: `to`, then `cc`, then `bcc`
    pub fn destinations(&self) -> Vec<String> {
        let mut destinations = self.to.clone();
        if let Some(cc) = &self.cc {
            destinations.extend(cc.iter().cloned());
        }
        if let Some(bcc) = &self.bcc {
            destinations.extend(bcc.iter().cloned());
        }
        destinations
    }

    pub fn attachments(&self) -> &[AttachmentRef] {
        self.attachments.as_deref().unwrap_or(&[])
    }
}

/// One message of a delivered queue batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRecord {
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub body: String,
}

impl QueueRecord {
    pub fn new(message_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
        }
    }
}

/// SQS-style event envelope: `{"Records": [...]}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<QueueRecord>,
}
