//! Generation requests and their attachments

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;

use docline_store::{Fingerprint, Fingerprinter};

use crate::error::GenerationError;

/// A binary attachment sent alongside the prompt.
///
/// Each consumer gets an independent reader from [`Attachment::open`], so
/// fingerprinting and uploading never share a read position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    File(PathBuf),
    Memory { name: String, data: Arc<[u8]> },
}

impl Attachment {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn bytes(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self::Memory {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Name used in diagnostics and upload errors.
    pub fn name(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Memory { name, .. } => name.clone(),
        }
    }

    /// Fresh reader positioned at the start of the attachment.
    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        match self {
            Self::File(path) => Ok(Box::new(File::open(path)?)),
            Self::Memory { data, .. } => Ok(Box::new(Cursor::new(data.clone()))),
        }
    }

    /// Read the whole attachment into memory.
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        match self {
            Self::File(path) => std::fs::read(path),
            Self::Memory { data, .. } => Ok(data.to_vec()),
        }
    }

    fn feed(&self, fp: &mut Fingerprinter) -> io::Result<()> {
        match self {
            Self::File(path) => {
                fp.attachment_file(path)?;
            }
            Self::Memory { data, .. } => {
                fp.attachment_bytes(data);
            }
        }
        Ok(())
    }
}

impl fmt::Display for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Immutable generation request.
///
/// Built with the `with_*` methods; attachment order is part of the
/// request's identity and of the payload sent upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    prompt: String,
    system_prompt: Option<String>,
    attachments: Vec<Attachment>,
    max_output_tokens: Option<u32>,
}

impl Request {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            attachments: Vec::new(),
            max_output_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// System instruction; an empty string counts as absent.
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref().filter(|s| !s.is_empty())
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn max_output_tokens(&self) -> Option<u32> {
        self.max_output_tokens
    }

    /// Content address of this request.
    ///
    /// Reads every attachment; a read failure names the attachment.
    pub fn fingerprint(&self) -> Result<Fingerprint, GenerationError> {
        let mut fp = Fingerprinter::new();
        fp.prompt(&self.prompt);
        if let Some(system_prompt) = self.system_prompt() {
            fp.system_prompt(system_prompt);
        }
        for attachment in &self.attachments {
            attachment
                .feed(&mut fp)
                .map_err(|source| GenerationError::Attachment {
                    name: attachment.name(),
                    source,
                })?;
        }
        if let Some(max_output_tokens) = self.max_output_tokens {
            fp.max_output_tokens(max_output_tokens);
        }
        Ok(fp.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ten_bytes() -> Attachment {
        Attachment::bytes("doc.pdf", b"0123456789".to_vec())
    }

    #[test]
    fn fingerprint_stable() {
        let r = Request::new("Summarize").with_attachment(ten_bytes());
        assert_eq!(r.fingerprint().unwrap(), r.fingerprint().unwrap());
    }

    #[test]
    fn fingerprint_ignores_attachment_name() {
        let a = Request::new("p").with_attachment(Attachment::bytes("a.pdf", b"same".to_vec()));
        let b = Request::new("p").with_attachment(Attachment::bytes("b.pdf", b"same".to_vec()));
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn file_and_memory_attachment_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"0123456789").unwrap();

        let from_file = Request::new("Summarize").with_attachment(Attachment::file(&path));
        let from_memory = Request::new("Summarize").with_attachment(ten_bytes());
        assert_eq!(
            from_file.fingerprint().unwrap(),
            from_memory.fingerprint().unwrap()
        );
    }

    #[test]
    fn each_field_changes_fingerprint() {
        let base = Request::new("p").with_attachment(ten_bytes());
        let variants = [
            Request::new("q").with_attachment(ten_bytes()),
            base.clone().with_system_prompt("sys"),
            base.clone().with_max_output_tokens(8192),
            base.clone().with_attachment(ten_bytes()),
        ];
        let base_fp = base.fingerprint().unwrap();
        for v in &variants {
            assert_ne!(v.fingerprint().unwrap(), base_fp);
        }
    }

    #[test]
    fn empty_system_prompt_is_absent() {
        let a = Request::new("p");
        let b = Request::new("p").with_system_prompt("");
        assert_eq!(b.system_prompt(), None);
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn fingerprint_leaves_attachment_readable() {
        let r = Request::new("p").with_attachment(ten_bytes());
        r.fingerprint().unwrap();

        let mut buf = Vec::new();
        r.attachments()[0].open().unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"0123456789");
    }

    #[test]
    fn missing_file_names_attachment() {
        let r = Request::new("p").with_attachment(Attachment::file("/nonexistent/x.pdf"));
        let err = r.fingerprint().unwrap_err();
        assert!(err.to_string().contains("/nonexistent/x.pdf"));
    }
}
