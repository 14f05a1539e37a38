//! docline - batch document extraction through a resilient model client
//!
//! The provider binding is supplied by the embedding application; this
//! binary manages configuration and the on-disk response cache.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "docline")]
#[command(about = "Resilient, cached document extraction")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./docline.toml or ~/.config/docline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect and maintain the response cache
    Cache(cmd::cache::CacheArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = docline_core::ProgressContext::new();

    // Logging:
    //   TTY:     quiet (warn) unless --debug
    //   non-TTY: info unless --debug
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    docline_core::init_logging(quiet, cli.debug, multi);

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Cache(args) => cmd::cache::run(args, &config),
        Command::Config => {
            use comfy_table::{
                Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
            };

            let client = &config.client;
            let extraction = &config.extraction;
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            table.add_row(vec![
                "Cache",
                if client.cache_enabled {
                    "enabled"
                } else {
                    "disabled"
                },
            ]);
            table.add_row(vec![
                "Cache directory",
                &client.cache_dir.display().to_string(),
            ]);
            table.add_row(vec!["Backoff", &format!("{:?}s", client.backoff_secs)]);
            table.add_row(vec![
                "Error rate threshold",
                &format!("{:.1}%", client.error_rate_threshold * 100.0),
            ]);
            table.add_row(vec![
                "Breaker window",
                &format!("{} (min calls: {})", client.window, client.min_calls),
            ]);
            table.add_row(vec![
                "Exception log",
                &client.exception_log.display().to_string(),
            ]);
            table.add_row(vec![
                "Prompt file",
                &extraction.prompt_file.display().to_string(),
            ]);
            table.add_row(vec![
                "System prompt file",
                &extraction
                    .system_prompt_file
                    .as_ref()
                    .map_or_else(|| "not set".to_string(), |p| p.display().to_string()),
            ]);
            table.add_row(vec![
                "Max output tokens",
                &extraction
                    .max_output_tokens
                    .map_or_else(|| "provider default".to_string(), |n| n.to_string()),
            ]);
            table.add_row(vec![
                "Source directory",
                &extraction.src_dir.display().to_string(),
            ]);
            table.add_row(vec![
                "Output directory",
                &extraction.dest_dir.display().to_string(),
            ]);
            table.add_row(vec![
                "Include annotation",
                if extraction.include_annotation {
                    "yes"
                } else {
                    "no"
                },
            ]);

            eprintln!("\n{table}");
            Ok(())
        }
    }
}
