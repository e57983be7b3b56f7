//! CLI for the segdl download engine.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use segdl_core::config;
use std::path::PathBuf;

use commands::{run_get, run_list, run_remove, ListFilter};

/// Top-level CLI for segdl.
#[derive(Debug, Parser)]
#[command(name = "segdl")]
#[command(about = "segdl: resumable multi-segment downloader", long_about = None)]
pub struct Cli {
    /// Log engine internals at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download one or more URLs, printing progress until all of them end.
    Get {
        /// Direct HTTP/HTTPS URLs.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Directory to save into (default: current directory).
        #[arg(short = 'o', long = "dir", value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Byte-range segments per download (default from config).
        #[arg(short = 'n', long, value_name = "N")]
        segments: Option<usize>,

        /// Group the downloads under a tag.
        #[arg(long)]
        tag: Option<String>,
    },

    /// List known downloads, newest first.
    List {
        #[arg(long)]
        tag: Option<String>,

        /// Only finished downloads.
        #[arg(long, conflicts_with = "unfinished")]
        finished: bool,

        /// Only downloads that have not finished.
        #[arg(long)]
        unfinished: bool,
    },

    /// Remove a download (or every download with a tag) and its files.
    Remove {
        #[arg(required_unless_present = "tag", conflicts_with = "tag")]
        url: Option<String>,

        #[arg(long)]
        tag: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match self.command {
            CliCommand::Get {
                urls,
                dir,
                segments,
                tag,
            } => {
                let dir = match dir {
                    Some(d) => d,
                    None => std::env::current_dir()?,
                };
                run_get(cfg, &urls, &dir, segments, tag.as_deref()).await?;
            }
            CliCommand::List {
                tag,
                finished,
                unfinished,
            } => {
                let filter = ListFilter::from_flags(finished, unfinished);
                run_list(tag.as_deref(), filter).await?;
            }
            CliCommand::Remove { url, tag } => {
                run_remove(cfg, url.as_deref(), tag.as_deref()).await?;
            }
        }

        Ok(())
    }
}
