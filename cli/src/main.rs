//! docxmerge CLI - merge Word documents
//!
//! A command-line tool for splicing DOCX bodies into a base document.

use clap::{Parser, Subcommand};
use colored::*;
use docxmerge::{JsonFormat, LogLevel, MergeOptions};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::PathBuf;

/// Merge Word (DOCX) documents
#[derive(Parser)]
#[command(
    name = "docxmerge",
    author = "iyulab",
    version,
    about = "Merge Word documents into one",
    long_about = "docxmerge - Merge DOCX documents into a base document.\n\n\
                  Sources are inserted at the start, before a paragraph containing a pattern,\n\
                  or at the end, with numbering, styles, notes and media carried along."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge documents into the first one
    Merge {
        /// Base document
        base: PathBuf,

        /// Documents to insert, in order
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Insert before the first paragraph containing this text
        #[arg(short, long)]
        pattern: Option<String>,

        /// Insert at the start of the base document
        #[arg(long)]
        start: bool,

        /// Append at the end of the base document
        #[arg(long)]
        end: bool,

        /// Do not merge numbering definitions
        #[arg(long)]
        no_numbering: bool,

        /// Do not merge styles, fonts and settings
        #[arg(long)]
        no_styles: bool,

        /// Do not merge footnotes and endnotes
        #[arg(long)]
        no_footnotes: bool,

        /// Do not add a page break before appended documents
        #[arg(long)]
        no_page_breaks: bool,

        /// Load options from a JSON file (flags override it)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the merge report as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show what a document contains
    Inspect {
        /// Input file path
        input: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Merge {
            base,
            sources,
            output,
            pattern,
            start,
            end,
            no_numbering,
            no_styles,
            no_footnotes,
            no_page_breaks,
            config,
            report,
        } => {
            let mut options = match config {
                Some(path) => MergeOptions::from_json(&fs::read_to_string(path)?)?,
                None => MergeOptions::new(),
            };
            if let Some(pattern) = pattern {
                options = options.with_pattern(pattern);
            }
            if start {
                options = options.with_insert_at_start(true);
            }
            if end {
                options = options.with_insert_at_end(true);
            }
            if no_numbering {
                options = options.with_numbering(false);
            }
            if no_styles {
                options = options.with_styles(false);
            }
            if no_footnotes {
                options = options.with_footnotes(false);
            }
            if no_page_breaks {
                options = options.with_page_breaks(false);
            }

            let pb = create_spinner("Reading documents...");
            let printer = pb.clone();
            let options = options.with_log(move |message, level| {
                printer.println(format_log(message, level));
            });

            let mut paths = Vec::with_capacity(sources.len() + 1);
            paths.push(base);
            paths.extend(sources);
            options.validate(paths.len())?;
            let inputs = paths
                .iter()
                .map(fs::read)
                .collect::<Result<Vec<_>, _>>()?;

            pb.set_message("Merging...");
            let (merged, summary) = docxmerge::merge_with_report(&inputs, &options)?;
            fs::write(&output, merged)?;

            if let Some(path) = &report {
                fs::write(path, summary.to_json(JsonFormat::Pretty)?)?;
            }

            pb.finish_and_clear();
            println!(
                "{} Merged {} documents into {}",
                "✓".green().bold(),
                summary.documents,
                output.display()
            );
            if !summary.warnings.is_empty() {
                println!(
                    "{} {} warning(s)",
                    "!".yellow().bold(),
                    summary.warnings.len()
                );
            }
        }

        Commands::Inspect { input, json } => {
            let pb = create_spinner("Analyzing document...");
            let summary = docxmerge::inspect_file(&input)?;
            pb.finish_and_clear();

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }

            println!("{}", "Document Information".cyan().bold());
            println!("{}", "─".repeat(40));
            println!(
                "{}: {}",
                "File".bold(),
                input.file_name().unwrap_or_default().to_string_lossy()
            );
            println!("{}: {}", "Main part".bold(), summary.main_part);
            println!("{}: {}", "Parts".bold(), summary.parts.len());
            println!("{}: {}", "Relationships".bold(), summary.relationships);
            println!("{}: {}", "Media".bold(), summary.media);

            println!("\n{}", "Content Statistics".cyan().bold());
            println!("{}", "─".repeat(40));
            println!("{}: {}", "Paragraphs".bold(), summary.paragraphs);
            println!("{}: {}", "Tables".bold(), summary.tables);
            println!("{}: {}", "Styles".bold(), summary.styles);
            println!("{}: {}", "Fonts".bold(), summary.fonts);
            println!(
                "{}: {} definitions, {} instances",
                "Numbering".bold(),
                summary.abstract_numbering,
                summary.numbering_instances
            );
            println!("{}: {}", "Footnotes".bold(), summary.footnotes);
            println!("{}: {}", "Endnotes".bold(), summary.endnotes);
        }

        Commands::Version => {
            print_version();
        }
    }

    Ok(())
}

fn format_log(message: &str, level: LogLevel) -> String {
    let tag = match level {
        LogLevel::Info => "info".blue(),
        LogLevel::Ok => "ok".green(),
        LogLevel::Warn => "warn".yellow(),
        LogLevel::Err => "error".red(),
    };
    format!("{:>5} {}", tag.bold(), message)
}

fn print_version() {
    println!("{} {}", "docxmerge".green().bold(), env!("CARGO_PKG_VERSION"));
    println!("Merge Word documents with numbering, styles, notes and media");
    println!();
    println!("Insertion modes: start, pattern, end");
    println!("Repository: https://github.com/iyulab/docxmerge");
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template("{spinner:.blue} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
