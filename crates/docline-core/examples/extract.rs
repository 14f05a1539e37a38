//! Batch extraction with an offline stand-in provider
//!
//! Exercises the full pipeline (cache, breaker, batch pool, markdown output)
//! without network access. A real deployment implements `Provider` for its
//! model endpoint and keeps the rest of this file as is.
//!
//! Run with: cargo run -p docline-core --example extract -- --config docline.toml

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use docline_core::{
    Attachment, ClientConfig, ExtractionConfig, GenerationError, ProgressContext, Provider,
    Request, ResilientClient, init_logging, run_batch,
};

#[derive(Parser)]
#[command(name = "extract")]
#[command(about = "Extract markdown from every PDF in [extraction].src_dir")]
struct Cli {
    /// Config file with [client] and [extraction] sections
    #[arg(short, long, default_value = "docline.toml")]
    config: PathBuf,

    /// Parallel workers
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Only show warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RunConfig {
    client: ClientConfig,
    extraction: ExtractionConfig,
}

impl RunConfig {
    fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("{} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

/// Answers every request locally with a skeleton document.
#[derive(Clone, Copy)]
struct OfflineProvider;

impl Provider for OfflineProvider {
    /// Attachment name and size.
    type File = (String, u64);

    fn upload(&self, attachment: &Attachment) -> Result<(String, u64), GenerationError> {
        let bytes = attachment.read_all()?.len() as u64;
        Ok((attachment.name(), bytes))
    }

    fn invoke(
        &self,
        request: &Request,
        files: &[(String, u64)],
    ) -> Result<String, GenerationError> {
        let mut body = String::new();
        for (name, bytes) in files {
            body.push_str(&format!("# {name}\n\n{bytes} bytes\n\n"));
        }
        Ok(format!(
            "Observations/Remarks:\n\nOffline run, prompt of {} chars.\n\n```markdown\n{}\n```",
            request.prompt().len(),
            body.trim_end()
        ))
    }
}

fn run(cli: &Cli, progress: &ProgressContext) -> Result<()> {
    let config = RunConfig::load(&cli.config)?;
    let jobs = config.extraction.jobs()?;
    if jobs.is_empty() {
        log::warn!(
            "No PDFs found in {}",
            config.extraction.src_dir.display()
        );
        return Ok(());
    }
    let sink = config.extraction.sink()?;

    let summary = run_batch(
        jobs,
        cli.workers,
        || ResilientClient::new(OfflineProvider, &config.client),
        |job, text| sink.write(job, text),
        progress,
    )?;
    if summary.failed > 0 {
        anyhow::bail!("{} documents could not be written", summary.failed);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let progress = ProgressContext::new();
    let multi = if progress.is_tty() {
        Some(progress.multi())
    } else {
        None
    };
    init_logging(cli.quiet, cli.verbose, multi);

    match run(&cli, &progress) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Fatal error: {e:#}");
            ExitCode::from(2)
        }
    }
}
