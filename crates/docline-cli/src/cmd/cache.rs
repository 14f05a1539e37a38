//! `docline cache` - inspect and maintain the response cache

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use serde::Serialize;

use docline_core::{Attachment, ExtractionConfig};
use docline_store::{Fingerprint, ResponseCache};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct CacheArgs {
    /// Cache directory (default: [client].cache_dir from config)
    #[arg(short, long, global = true)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached responses
    List {
        /// Print entries as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Print a cached response
    Show {
        /// Full fingerprint (64 hex chars)
        fingerprint: String,
    },
    /// Delete a cached response
    Rm {
        /// Full fingerprint (64 hex chars)
        fingerprint: String,
    },
    /// Delete temp files left behind by interrupted writes
    Sweep,
    /// Compute request fingerprints and report cache hits
    Key {
        /// Prompt file (default: [extraction].prompt_file)
        #[arg(long)]
        prompt_file: Option<PathBuf>,

        /// System prompt file (default: [extraction].system_prompt_file)
        #[arg(long)]
        system_prompt_file: Option<PathBuf>,

        /// Output token limit (default: [extraction].max_output_tokens)
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Attachments, one request per file (default: PDFs in [extraction].src_dir)
        files: Vec<PathBuf>,
    },
}

#[derive(Serialize)]
struct EntryRow {
    fingerprint: String,
    bytes: u64,
    modified: Option<String>,
}

pub fn run(args: CacheArgs, config: &Config) -> Result<()> {
    let dir = args
        .dir
        .clone()
        .unwrap_or_else(|| config.client.cache_dir.clone());
    let cache = ResponseCache::open_existing(&dir)
        .with_context(|| format!("Failed to open cache: {}", dir.display()))?;

    match args.action {
        CacheAction::List { json } => list(&cache, json),
        CacheAction::Show { fingerprint } => show(&cache, &fingerprint),
        CacheAction::Rm { fingerprint } => rm(&cache, &fingerprint),
        CacheAction::Sweep => sweep(&cache),
        CacheAction::Key {
            prompt_file,
            system_prompt_file,
            max_tokens,
            files,
        } => {
            let mut extraction = config.extraction.clone();
            if let Some(prompt_file) = prompt_file {
                extraction.prompt_file = prompt_file;
            }
            if system_prompt_file.is_some() {
                extraction.system_prompt_file = system_prompt_file;
            }
            if max_tokens.is_some() {
                extraction.max_output_tokens = max_tokens;
            }
            key(&cache, &extraction, files)
        }
    }
}

fn parse_fingerprint(s: &str) -> Result<Fingerprint> {
    s.parse::<Fingerprint>()
        .with_context(|| format!("Invalid fingerprint: {s}"))
}

fn list(cache: &ResponseCache, json: bool) -> Result<()> {
    let entries = cache.entries()?;

    if json {
        for entry in &entries {
            let row = EntryRow {
                fingerprint: entry.fingerprint.to_hex(),
                bytes: entry.bytes,
                modified: entry.modified.map(|t| t.to_rfc3339()),
            };
            println!("{}", serde_json::to_string(&row)?);
        }
        return Ok(());
    }

    if entries.is_empty() {
        eprintln!("No cached responses in {}.", cache.dir().display());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Fingerprint").fg(Color::Cyan),
            Cell::new("Bytes").fg(Color::Cyan),
            Cell::new("Modified").fg(Color::Cyan),
        ]);

    let mut total_bytes = 0;
    for entry in &entries {
        total_bytes += entry.bytes;
        let modified = entry
            .modified
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(entry.fingerprint.short()),
            Cell::new(entry.bytes),
            Cell::new(modified),
        ]);
    }

    eprintln!("\n{table}");
    eprintln!("{} entries, {} bytes total", entries.len(), total_bytes);
    Ok(())
}

fn show(cache: &ResponseCache, fingerprint: &str) -> Result<()> {
    let fp = parse_fingerprint(fingerprint)?;
    match cache.get(&fp)? {
        Some(text) => {
            println!("{text}");
            Ok(())
        }
        None => anyhow::bail!("No cached response for {}", fp.short()),
    }
}

fn rm(cache: &ResponseCache, fingerprint: &str) -> Result<()> {
    let fp = parse_fingerprint(fingerprint)?;
    if cache.remove(&fp)? {
        eprintln!("Removed {}", fp.short());
    } else {
        eprintln!("No cached response for {}", fp.short());
    }
    Ok(())
}

fn sweep(cache: &ResponseCache) -> Result<()> {
    let removed = cache.sweep_tmp()?;
    if removed == 0 {
        eprintln!("Nothing to clean up.");
    } else {
        eprintln!("Removed {removed} temp files.");
    }
    Ok(())
}

fn key(cache: &ResponseCache, extraction: &ExtractionConfig, files: Vec<PathBuf>) -> Result<()> {
    let base = extraction.base_request()?;
    let files = if files.is_empty() {
        extraction.source_files()?
    } else {
        files
    };
    if files.is_empty() {
        anyhow::bail!("No PDFs found in {}", extraction.src_dir.display());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("File").fg(Color::Cyan),
            Cell::new("Fingerprint").fg(Color::Cyan),
            Cell::new("Cached").fg(Color::Cyan),
        ]);

    let mut hits = 0;
    for file in &files {
        let request = base.clone().with_attachment(Attachment::file(file));
        let fp = request.fingerprint()?;
        let cached_cell = if cache.get(&fp)?.is_some() {
            hits += 1;
            Cell::new("hit").fg(Color::Green)
        } else {
            Cell::new("miss").fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(file.display()),
            Cell::new(fp.to_hex()),
            cached_cell,
        ]);
    }

    eprintln!("\n{table}");
    eprintln!("{hits}/{} cached", files.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use docline_core::Request;

    use super::*;

    fn config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.client.cache_dir = dir.join("cache");
        config.extraction.prompt_file = dir.join("prompt.txt");
        config.extraction.src_dir = dir.join("pdfs");
        config
    }

    fn cache_args(dir: &Path, action: CacheAction) -> CacheArgs {
        CacheArgs {
            dir: Some(dir.join("cache")),
            action,
        }
    }

    #[test]
    fn missing_cache_dir_is_reported_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let err = run(cache_args(dir.path(), CacheAction::List { json: false }), &config)
            .unwrap_err();
        assert!(format!("{err:#}").contains("does not exist"));
        assert!(run(cache_args(dir.path(), CacheAction::Sweep), &config).is_err());
        assert!(!dir.path().join("cache").exists());
    }

    #[test]
    fn show_and_rm_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let cache = ResponseCache::open(&dir.path().join("cache")).unwrap();
        let fp = Request::new("p").fingerprint().unwrap();
        cache.put(&fp, "cached text").unwrap();

        let show = CacheAction::Show {
            fingerprint: fp.to_hex(),
        };
        run(cache_args(dir.path(), show), &config).unwrap();
        let rm = CacheAction::Rm {
            fingerprint: fp.to_hex(),
        };
        run(cache_args(dir.path(), rm), &config).unwrap();
        assert_eq!(cache.get(&fp).unwrap(), None);

        let missing = CacheAction::Show {
            fingerprint: fp.to_hex(),
        };
        assert!(run(cache_args(dir.path(), missing), &config).is_err());
    }

    #[test]
    fn key_defaults_to_source_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        std::fs::write(dir.path().join("prompt.txt"), "Transcribe").unwrap();
        std::fs::create_dir_all(dir.path().join("pdfs")).unwrap();
        std::fs::create_dir_all(dir.path().join("cache")).unwrap();

        let action = || CacheAction::Key {
            prompt_file: None,
            system_prompt_file: None,
            max_tokens: None,
            files: Vec::new(),
        };
        assert!(run(cache_args(dir.path(), action()), &config).is_err());

        std::fs::write(dir.path().join("pdfs/memo.pdf"), "%PDF").unwrap();
        run(cache_args(dir.path(), action()), &config).unwrap();
    }

    #[test]
    fn invalid_fingerprint_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        std::fs::create_dir_all(dir.path().join("cache")).unwrap();
        let show = CacheAction::Show {
            fingerprint: "abc".to_string(),
        };
        let err = run(cache_args(dir.path(), show), &config).unwrap_err();
        assert!(err.to_string().contains("Invalid fingerprint"));
    }
}
