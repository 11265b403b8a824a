use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

mod aggregate;
mod charts;
mod clean;
mod error;
mod loader;
mod models;
mod pipeline;
mod report;

use pipeline::PipelineOptions;
use report::{ChartSink, JsonReport, MarkdownReport};

#[derive(Parser)]
#[command(name = "blood-donor-report")]
#[command(about = "Deduplicate a blood donor registry and summarize it by blood type", long_about = None)]
struct Cli {
    /// Registry CSV with a header row
    csv: PathBuf,
    /// Where to write the rendered report
    #[arg(long, default_value = "blood_donation_report.md")]
    out: PathBuf,
    #[arg(long, value_enum, default_value_t = Format::Markdown)]
    format: Format,
    /// Column to group the summary by
    #[arg(long, default_value = models::BLOOD_TYPE)]
    group_by: String,
    /// Fail when no group can be formed
    #[arg(long)]
    require_groups: bool,
    /// Log sample rows and other debug detail
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Markdown,
    Json,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut sink: Box<dyn ChartSink> = match cli.format {
        Format::Markdown => Box::new(MarkdownReport {
            out: cli.out.clone(),
        }),
        Format::Json => Box::new(JsonReport {
            out: cli.out.clone(),
        }),
    };
    let options = PipelineOptions {
        group_key: cli.group_by,
        require_groups: cli.require_groups,
    };

    let output = pipeline::run(&cli.csv, &options, sink.as_mut())?;

    if output.summaries.is_empty() {
        println!("No groups found in {}.", cli.csv.display());
    } else {
        println!(
            "Summary of {} donors ({} duplicates removed):",
            output.table.len(),
            output.duplicates_removed
        );
        print!("{}", report::summary_table(&output.summaries));
    }
    println!("Report written to {}.", cli.out.display());

    Ok(())
}
