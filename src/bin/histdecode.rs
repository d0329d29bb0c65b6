//! histdecode - Decode saved Geiger counter history memory
//!
//! Usage:
//!   histdecode decode <file> [--variant NAME | --model STRING] [--json]
//!   histdecode info <file> [--variant NAME | --model STRING]
//!   histdecode variants [--config FILE]

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use geiger_history::common::cli::{CommonArgs, DecodeArgs, InfoArgs};
use geiger_history::common::DecodeIssue;
use geiger_history::dump::{read_dump, HistoryStats};
use geiger_history::history::normalizer::ROW_HEADER;
use geiger_history::history::{decode_log, normalize, CommentRow, HistoryRow};

#[derive(Parser)]
#[command(name = "histdecode")]
#[command(about = "Decoder for GQ GMC and Gamma-Scout history dumps")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a dump into history rows
    Decode(DecodeArgs),

    /// Show buffer statistics of a dump
    Info(InfoArgs),

    /// List built-in and configured variants
    Variants(CommonArgs),
}

/// JSON form of a decoded dump
#[derive(Serialize)]
struct DecodeReport<'a> {
    origin: Option<&'a str>,
    warnings: &'a [String],
    variant: &'a str,
    anchor_offset: Option<u32>,
    truncated: bool,
    issues: &'a [DecodeIssue],
    rows: &'a [HistoryRow],
    comments: &'a [CommentRow],
}

fn main() {
    let filter = match "geiger_history=info".parse() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Decode(args) => decode_file(&args),
        Commands::Info(args) => show_info(&args),
        Commands::Variants(args) => list_variants(&args),
    };
    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn decode_file(args: &DecodeArgs) -> anyhow::Result<()> {
    let mut variant = args.select.resolve()?;
    variant.keep_fill |= args.keep_fill;

    let dump = read_dump(&args.file, variant.dump)
        .with_context(|| format!("Failed to load {}", args.file.display()))?;
    for warning in &dump.warnings {
        eprintln!("Warning: {}", warning);
    }

    let result = decode_log(&dump.log, &variant)?;
    let history = normalize(&result.records);

    if args.json {
        let report = DecodeReport {
            origin: dump.origin.as_deref(),
            warnings: &dump.warnings,
            variant: &variant.name,
            anchor_offset: result.anchor_offset,
            truncated: result.truncated,
            issues: &result.issues,
            rows: &history.rows,
            comments: &history.comments,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(origin) = &dump.origin {
        println!("# Origin: {}", origin);
    }
    println!("# Variant: {}", variant.name);
    println!("# {}", ROW_HEADER.join(", "));
    for row in &history.rows {
        println!("{}", row.to_csv());
    }
    if !history.comments.is_empty() {
        println!();
        println!("# Comments");
        for comment in &history.comments {
            let time = comment
                .time
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            println!("{}, {}, {}", comment.index, time, comment.text);
        }
    }

    for issue in &result.issues {
        eprintln!("Issue: {}", issue);
    }
    if result.truncated {
        eprintln!("Warning: history ends inside a record");
    }
    Ok(())
}

fn show_info(args: &InfoArgs) -> anyhow::Result<()> {
    let variant = args.select.resolve()?;
    let dump = read_dump(&args.file, variant.dump)
        .with_context(|| format!("Failed to load {}", args.file.display()))?;

    println!("File:     {}", args.file.display());
    println!("Variant:  {}", variant.name);
    println!(
        "Origin:   {}",
        dump.origin.as_deref().unwrap_or("unknown")
    );
    println!();
    println!("{}", HistoryStats::of(dump.log.as_bytes(), variant.fill));

    for warning in &dump.warnings {
        eprintln!("Warning: {}", warning);
    }
    Ok(())
}

fn list_variants(args: &CommonArgs) -> anyhow::Result<()> {
    let registry = args.registry()?;
    for variant in registry.all() {
        println!("{:<22} {}", variant.name, variant.models.join(", "));
    }
    Ok(())
}
