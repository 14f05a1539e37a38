//! Degraded result for requests the endpoint refuses to ingest

use crate::error::GenerationError;

/// Marker returned in place of a response when the attachments are too large.
pub const DEGRADED_RESPONSE: &str =
    "Observations/Remarks:\n\nFile too large to be processed.\n\n```markdown\n\n```";

/// Result of a generation that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Generated(String),
    /// Request was oversized; nothing was generated.
    Degraded,
}

impl Completion {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded)
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Generated(text) => text,
            Self::Degraded => DEGRADED_RESPONSE,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Generated(text) => text,
            Self::Degraded => DEGRADED_RESPONSE.to_string(),
        }
    }
}

/// Run `operation`, turning an oversized-payload failure into [`Completion::Degraded`].
///
/// Every other failure is returned unchanged.
pub fn with_fallback(
    operation: impl FnOnce() -> Result<String, GenerationError>,
) -> Result<Completion, GenerationError> {
    match operation() {
        Ok(text) => Ok(Completion::Generated(text)),
        Err(e) if e.is_oversized_payload() => {
            log::warn!("skipping oversized request: {e}");
            Ok(Completion::Degraded)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_becomes_degraded() {
        let result = with_fallback(|| {
            Err(GenerationError::Api {
                status: 400,
                message: "The request's total referenced files bytes are too large to be read"
                    .into(),
            })
        });
        let completion = result.unwrap();
        assert!(completion.is_degraded());
        assert_eq!(completion.text(), DEGRADED_RESPONSE);
    }

    #[test]
    fn success_passes_through() {
        let completion = with_fallback(|| Ok("OK".to_string())).unwrap();
        assert_eq!(completion, Completion::Generated("OK".into()));
        assert_eq!(completion.into_text(), "OK");
    }

    #[test]
    fn other_errors_propagate() {
        let result = with_fallback(|| {
            Err(GenerationError::Api {
                status: 503,
                message: "The model is overloaded".into(),
            })
        });
        assert!(result.unwrap_err().is_transient_overload());
    }

    #[test]
    fn degraded_marker_has_empty_markdown_block() {
        assert!(DEGRADED_RESPONSE.contains("File too large"));
        assert!(DEGRADED_RESPONSE.ends_with("```markdown\n\n```"));
    }
}
