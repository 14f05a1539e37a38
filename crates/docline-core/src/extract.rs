//! Turning model responses into markdown documents

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::batch::Job;

const MARKDOWN_FENCE: &str = "```markdown";
const FENCE: &str = "```";

/// Content of the first ```` ```markdown ```` block, trimmed.
///
/// Responses without a complete block are returned unchanged.
pub fn parse_response(response: &str) -> &str {
    let Some(start) = response.find(MARKDOWN_FENCE) else {
        return response;
    };
    let body_start = start + MARKDOWN_FENCE.len();
    match response[body_start..].find(FENCE) {
        Some(len) => response[body_start..body_start + len].trim(),
        None => response,
    }
}

/// Writes one `<job id>.md` per job into `dest_dir`.
#[derive(Debug, Clone)]
pub struct MarkdownSink {
    dest_dir: PathBuf,
    /// Keep the model's remarks around the markdown block.
    include_annotation: bool,
}

impl MarkdownSink {
    pub fn new(dest_dir: &Path, include_annotation: bool) -> Result<Self> {
        std::fs::create_dir_all(dest_dir)
            .with_context(|| format!("failed to create {}", dest_dir.display()))?;
        Ok(Self {
            dest_dir: dest_dir.to_path_buf(),
            include_annotation,
        })
    }

    /// Output path for `job`.
    ///
    /// Ids that could resolve outside `dest_dir` are rejected.
    pub fn path_for(&self, job: &Job) -> Result<PathBuf> {
        let id = job.id.as_str();
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
            anyhow::bail!("invalid job id for output file: {id:?}");
        }
        Ok(self.dest_dir.join(format!("{id}.md")))
    }

    /// Write the document for `job` (temp file + rename).
    pub fn write(&self, job: &Job, response: &str) -> Result<()> {
        let body = if self.include_annotation {
            response
        } else {
            parse_response(response)
        };
        let path = self.path_for(job)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(".tmp")
            .tempfile_in(&self.dest_dir)?;
        tmp.write_all(body.as_bytes())?;
        tmp.persist(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::DEGRADED_RESPONSE;
    use crate::request::Request;

    #[test]
    fn extracts_markdown_block() {
        let raw = "Observations/Remarks:\n\nFaded scan.\n\n```markdown\n# Memo\n\nBody\n```\ntrailer";
        assert_eq!(parse_response(raw), "# Memo\n\nBody");
    }

    #[test]
    fn no_block_returns_input() {
        assert_eq!(parse_response("plain answer"), "plain answer");
    }

    #[test]
    fn unterminated_block_returns_input() {
        let raw = "```markdown\n# cut off";
        assert_eq!(parse_response(raw), raw);
    }

    #[test]
    fn degraded_marker_parses_to_empty() {
        assert_eq!(parse_response(DEGRADED_RESPONSE), "");
    }

    #[test]
    fn sink_writes_parsed_or_annotated() {
        let dir = tempfile::tempdir().unwrap();
        let job = Job::new("104-10001-10004", Request::new("p"));
        let raw = "Remarks\n```markdown\n# Title\n```";

        let sink = MarkdownSink::new(&dir.path().join("out"), false).unwrap();
        sink.write(&job, raw).unwrap();
        let written = std::fs::read_to_string(sink.path_for(&job).unwrap()).unwrap();
        assert_eq!(written, "# Title");

        let sink = MarkdownSink::new(&dir.path().join("annotated"), true).unwrap();
        sink.write(&job, raw).unwrap();
        let written = std::fs::read_to_string(sink.path_for(&job).unwrap()).unwrap();
        assert_eq!(written, raw);
    }

    #[test]
    fn ids_escaping_dest_dir_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MarkdownSink::new(&dir.path().join("out"), false).unwrap();
        for id in ["../escape", "a/b", "..", ".", "", "a\\b"] {
            let job = Job::new(id, Request::new("p"));
            assert!(sink.path_for(&job).is_err(), "{id:?}");
            assert!(sink.write(&job, "x").is_err(), "{id:?}");
        }
        assert!(!dir.path().join("escape.md").exists());

        let dotted = Job::new("104-10001.v2", Request::new("p"));
        assert!(sink.path_for(&dotted).is_ok());
    }
}
