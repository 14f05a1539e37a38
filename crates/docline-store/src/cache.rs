//! Crash-safe on-disk response cache
//!
//! Directory layout:
//! ```text
//! {cache_dir}/
//! ├── {fingerprint-hex}     # response text (64 hex chars, no extension)
//! └── .{random}.tmp         # in-flight write, renamed into place when done
//! ```
//!
//! Writers never touch a final path directly: the body goes to a unique temp
//! file in the same directory and is renamed over the final name. Two writers
//! racing on one fingerprint both succeed and the last rename wins; the
//! content is a function of the request, so either copy is correct.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::fingerprint::Fingerprint;

/// Stored in place of an empty response so a cached empty answer is
/// distinguishable from a miss.
pub const EMPTY_RESPONSE_PLACEHOLDER: &str = "```markdown\n\n```";

/// Summary of a cache entry for listing.
#[derive(Debug)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub bytes: u64,
    pub modified: Option<DateTime<Local>>,
}

/// Fingerprint-addressed response cache.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    /// Open a cache rooted at `dir`, creating the directory if absent.
    pub fn open(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Open an existing cache without creating anything.
    ///
    /// A missing directory is a `NotFound` error.
    pub fn open_existing(dir: &Path) -> io::Result<Self> {
        if !dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("cache directory {} does not exist", dir.display()),
            ));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path for a fingerprint.
    pub fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(fingerprint.to_hex())
    }

    /// Look up a cached response. A miss is `Ok(None)`, never an error.
    pub fn get(&self, fingerprint: &Fingerprint) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(fingerprint)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Store a response: temp write in the cache dir, then atomic rename.
    ///
    /// On any failure the temp file is removed and the error returned.
    /// Empty responses are stored as [`EMPTY_RESPONSE_PLACEHOLDER`].
    pub fn put(&self, fingerprint: &Fingerprint, response: &str) -> io::Result<PathBuf> {
        let body = if response.is_empty() {
            EMPTY_RESPONSE_PLACEHOLDER
        } else {
            response
        };
        let final_path = self.path_for(fingerprint);

        // Dropping NamedTempFile on an error path deletes the temp file
        let mut tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(".tmp")
            .tempfile_in(&self.dir)?;
        tmp.write_all(body.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&final_path).map_err(|e| e.error)?;

        log::debug!("cache: stored {} ({} bytes)", fingerprint.short(), body.len());
        Ok(final_path)
    }

    /// Delete a cached response. Returns whether an entry existed.
    pub fn remove(&self, fingerprint: &Fingerprint) -> io::Result<bool> {
        match fs::remove_file(self.path_for(fingerprint)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// List cached entries, oldest first. Temp files and foreign files are skipped.
    pub fn entries(&self) -> io::Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(fingerprint) = name.to_str().and_then(parse_entry_name) else {
                continue;
            };
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            entries.push(CacheEntry {
                fingerprint,
                bytes: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Local>::from),
            });
        }
        entries.sort_by(|a, b| a.modified.cmp(&b.modified));
        Ok(entries)
    }

    /// Remove stray temp files left behind by interrupted writers.
    ///
    /// Only safe while no writer is active on this directory.
    pub fn sweep_tmp(&self) -> io::Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "tmp") {
                log::warn!("Removing stale tmp file: {}", path.display());
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Fingerprint for a file name, only if it is exactly the name `path_for` produces.
fn parse_entry_name(name: &str) -> Option<Fingerprint> {
    let fingerprint: Fingerprint = name.parse().ok()?;
    (fingerprint.to_hex() == name).then_some(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprinter;

    fn fp(prompt: &str) -> Fingerprint {
        Fingerprinter::new().prompt(prompt).finish()
    }

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path()).unwrap();
        cache.put(&fp("a"), "hello").unwrap();
        assert_eq!(cache.get(&fp("a")).unwrap().as_deref(), Some("hello"));
    }

    #[test]
    fn miss_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path()).unwrap();
        assert_eq!(cache.get(&fp("unused")).unwrap(), None);
    }

    #[test]
    fn open_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/cache");
        ResponseCache::open(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn open_existing_does_not_create() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("cache");
        let err = ResponseCache::open_existing(&missing).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!missing.exists());

        ResponseCache::open(&missing).unwrap();
        assert!(ResponseCache::open_existing(&missing).is_ok());
    }

    #[test]
    fn filename_is_full_hex_digest() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path()).unwrap();
        let path = cache.put(&fp("a"), "x").unwrap();
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), fp("a").to_hex());
    }

    #[test]
    fn empty_response_stored_as_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path()).unwrap();
        cache.put(&fp("empty"), "").unwrap();
        assert_eq!(
            cache.get(&fp("empty")).unwrap().as_deref(),
            Some(EMPTY_RESPONSE_PLACEHOLDER)
        );
    }

    #[test]
    fn interrupted_write_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path()).unwrap();
        // A crash after the temp write but before the rename
        let stray = dir.path().join(format!(".{}.tmp", fp("a").short()));
        std::fs::write(&stray, "trunc").unwrap();

        assert_eq!(cache.get(&fp("a")).unwrap(), None);
        assert!(cache.entries().unwrap().is_empty());
    }

    #[test]
    fn put_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path()).unwrap();
        cache.put(&fp("a"), "one").unwrap();
        cache.put(&fp("b"), "two").unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| !n.ends_with(".tmp")));
    }

    #[test]
    fn put_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path()).unwrap();
        cache.put(&fp("a"), "first").unwrap();
        cache.put(&fp("a"), "second").unwrap();
        assert_eq!(cache.get(&fp("a")).unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn failed_put_surfaces_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path()).unwrap();
        // A directory squatting on the final path makes the rename fail
        std::fs::create_dir(cache.path_for(&fp("a"))).unwrap();
        std::fs::write(cache.path_for(&fp("a")).join("blocker"), "x").unwrap();

        assert!(cache.put(&fp("a"), "hello").is_err());
        assert_eq!(cache.sweep_tmp().unwrap(), 0);
    }

    #[test]
    fn sweep_removes_only_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path()).unwrap();
        cache.put(&fp("a"), "kept").unwrap();
        std::fs::write(dir.path().join(".abc.tmp"), "partial").unwrap();

        assert_eq!(cache.sweep_tmp().unwrap(), 1);
        assert_eq!(cache.get(&fp("a")).unwrap().as_deref(), Some("kept"));
    }

    #[test]
    fn entries_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path()).unwrap();
        cache.put(&fp("a"), "12345").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "foreign").unwrap();

        let entries = cache.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].fingerprint, fp("a"));
        assert_eq!(entries[0].bytes, 5);

        assert!(cache.remove(&fp("a")).unwrap());
        assert!(!cache.remove(&fp("a")).unwrap());
        assert_eq!(cache.get(&fp("a")).unwrap(), None);
    }

    #[test]
    fn entries_skip_uppercase_names() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path()).unwrap();
        // Parses as a digest but is not a name `get` or `remove` would look up
        let upper = fp("a").to_hex().to_uppercase();
        std::fs::write(dir.path().join(&upper), "stale").unwrap();

        assert!(cache.entries().unwrap().is_empty());
    }
}
