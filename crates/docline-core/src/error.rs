//! Generation failures and their classification
//!
//! The predicates on [`GenerationError`] are the only place that decides
//! whether a failure is retried, degraded, or fatal. Retry and fallback
//! layers ask; they never inspect errors themselves.

use std::fmt;
use std::io;

/// Marker in a 400 response when attachments exceed the ingestion limit.
const OVERSIZED_PAYLOAD_MARKER: &str =
    "The request's total referenced files bytes are too large to be read";

/// Marker in a 503 response when the model is shedding load.
const OVERLOADED_MARKER: &str = "The model is overloaded";

/// Failure raised while producing a response for one request.
#[derive(Debug)]
pub enum GenerationError {
    /// Error reported by the remote endpoint, with its status code.
    Api { status: u16, message: String },
    /// Transport-level I/O failure.
    Io(io::Error),
    /// Uploading an attachment failed.
    Upload {
        attachment: String,
        source: Box<GenerationError>,
    },
    /// An attachment could not be read locally.
    Attachment { name: String, source: io::Error },
    Other(String),
}

/// Policy bucket a failure falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Rejected for size; answered with a degraded result.
    OversizedPayload,
    /// Temporary condition; worth another attempt after a delay.
    Retryable,
    /// Anything else.
    Fatal,
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api { status, message } => write!(f, "API {status}: {message}"),
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::Upload { attachment, source } => {
                write!(f, "failed to upload file {attachment}: {source}")
            }
            Self::Attachment { name, source } => {
                write!(f, "failed to read attachment {name}: {source}")
            }
            Self::Other(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for GenerationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Upload { source, .. } => Some(source.as_ref()),
            Self::Attachment { source, .. } => Some(source),
            Self::Api { .. } | Self::Other(_) => None,
        }
    }
}

impl From<io::Error> for GenerationError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl GenerationError {
    /// Wrap a failure with the attachment it happened on.
    pub fn upload(attachment: impl Into<String>, source: GenerationError) -> Self {
        Self::Upload {
            attachment: attachment.into(),
            source: Box::new(source),
        }
    }

    /// Failure underneath any upload wrapping.
    fn root(&self) -> &Self {
        match self {
            Self::Upload { source, .. } => source.root(),
            other => other,
        }
    }

    /// Endpoint refused the request because the attachments are too large.
    pub fn is_oversized_payload(&self) -> bool {
        matches!(
            self.root(),
            Self::Api { status: 400, message } if message.contains(OVERSIZED_PAYLOAD_MARKER)
        )
    }

    /// Endpoint is temporarily unavailable due to load.
    pub fn is_transient_overload(&self) -> bool {
        matches!(
            self.root(),
            Self::Api { status: 503, message } if message.contains(OVERLOADED_MARKER)
        )
    }

    /// Transport timed out waiting for I/O.
    pub fn is_io_timeout(&self) -> bool {
        matches!(self.root(), Self::Io(e) if e.kind() == io::ErrorKind::TimedOut)
    }

    pub fn is_retryable(&self) -> bool {
        self.is_transient_overload() || self.is_io_timeout()
    }

    pub fn classify(&self) -> FailureClass {
        if self.is_oversized_payload() {
            FailureClass::OversizedPayload
        } else if self.is_retryable() {
            FailureClass::Retryable
        } else {
            FailureClass::Fatal
        }
    }
}
