//! classroom_lens - analyze classroom photos and browse stored results
//!
//! Configuration comes from `CLASSROOM_LENS_CONFIG` (JSON or TOML) and the
//! `CLASSROOM_LENS_*` environment overrides.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use classroom_lens::{AnalysisRecord, AnalysisService, ServiceConfig};

#[derive(Parser, Debug)]
#[command(
    name = "classroom_lens",
    version,
    about = "Classroom photo analysis: people, expressions, engagement summary"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze an image and store the result
    Analyze {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
    },
    /// Show one stored analysis
    Show {
        #[arg(value_name = "ID")]
        id: i64,
    },
    /// List stored analyses, newest first
    History {
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = ServiceConfig::load()?;
    let mut service = AnalysisService::from_config(&cfg)?;

    match args.command {
        Command::Analyze { image } => {
            let bytes =
                std::fs::read(&image).with_context(|| format!("read {}", image.display()))?;
            let filename = image
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let record = service.submit(&filename, &bytes)?;
            print_record(&service, &record)?;
        }
        Command::Show { id } => {
            let record = service
                .result(id)?
                .ok_or_else(|| anyhow!("no analysis with id {}", id))?;
            print_record(&service, &record)?;
        }
        Command::History { page, limit } => {
            let page = service.history(page, limit)?;
            for record in &page.records {
                println!(
                    "{:>6}  {}  {} people  {}",
                    record.id, record.timestamp, record.person_count, record.image_filename
                );
            }
            println!(
                "page {} of {} ({} analyses)",
                page.page, page.total_pages, page.total
            );
        }
    }
    Ok(())
}

fn print_record(service: &AnalysisService, record: &AnalysisRecord) -> Result<()> {
    println!("analysis {} at {}", record.id, record.timestamp);
    println!("upload: {}", record.image_filename);
    println!(
        "annotated: {}",
        service.processed_image_path(record)?.display()
    );
    for (label, count) in record.label_counts.iter() {
        println!("  {}: {}", label, count);
    }
    println!("{}", record.summary);
    Ok(())
}
