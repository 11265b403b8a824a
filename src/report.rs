use std::fmt::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use comfy_table::presets::{ASCII_MARKDOWN, NOTHING};
use comfy_table::{Cell, CellAlignment, Row, Table as TextTable};
use serde::Serialize;

use crate::charts::{Bar, ChartSet};
use crate::models::{DonorRecord, GroupSummary, NullReport, Table, BLOOD_TYPE};

const BAR_WIDTH: usize = 40;

/// Everything a sink may draw from a finished run.
pub struct Report<'a> {
    pub source: &'a Path,
    pub group_key: &'a str,
    pub generated_at: DateTime<Utc>,
    pub table: &'a Table,
    pub duplicates_removed: usize,
    pub nulls_before: &'a NullReport,
    pub nulls_after: &'a NullReport,
    pub summaries: &'a [GroupSummary],
    pub charts: &'a ChartSet,
}

pub trait ChartSink {
    fn render(&mut self, report: &Report<'_>) -> anyhow::Result<()>;
}

pub struct MarkdownReport {
    pub out: PathBuf,
}

impl ChartSink for MarkdownReport {
    fn render(&mut self, report: &Report<'_>) -> anyhow::Result<()> {
        std::fs::write(&self.out, build_markdown(report))
            .with_context(|| format!("failed to write report to {}", self.out.display()))
    }
}

pub struct JsonReport {
    pub out: PathBuf,
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    source: String,
    group_key: &'a str,
    generated_at: DateTime<Utc>,
    rows: usize,
    duplicates_removed: usize,
    nulls_before: &'a NullReport,
    nulls_after: &'a NullReport,
    summaries: &'a [GroupSummary],
    charts: &'a ChartSet,
}

impl ChartSink for JsonReport {
    fn render(&mut self, report: &Report<'_>) -> anyhow::Result<()> {
        let body = build_json(report)?;
        std::fs::write(&self.out, body)
            .with_context(|| format!("failed to write report to {}", self.out.display()))
    }
}

pub fn build_json(report: &Report<'_>) -> anyhow::Result<String> {
    let document = JsonDocument {
        source: report.source.display().to_string(),
        group_key: report.group_key,
        generated_at: report.generated_at,
        rows: report.table.len(),
        duplicates_removed: report.duplicates_removed,
        nulls_before: report.nulls_before,
        nulls_after: report.nulls_after,
        summaries: report.summaries,
        charts: report.charts,
    };
    serde_json::to_string_pretty(&document).context("failed to encode report as JSON")
}

pub fn build_markdown(report: &Report<'_>) -> String {
    let group = group_label(report.group_key);
    let charts = report.charts;
    let mut output = String::new();

    let _ = writeln!(output, "# Blood Donation Analysis");
    let _ = writeln!(
        output,
        "Generated {} from {}",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.source.display()
    );
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "{} donors after removing {} duplicate rows.",
        report.table.len(),
        report.duplicates_removed
    );
    let _ = writeln!(output);

    let _ = writeln!(output, "## Sample Rows");
    let sample: Vec<&DonorRecord> = report.table.rows.iter().skip(1).take(4).collect();
    if sample.is_empty() {
        let _ = writeln!(output, "Not enough rows to sample.");
    } else {
        let mut table = markdown_table(&[
            "donor_id",
            "blood_type",
            "bmi",
            "donations_12m",
            "regular",
            "eligible",
            "propensity",
            "donated_next_6m",
        ]);
        for row in sample {
            table.add_row(vec![
                text_cell(&row.donor_id),
                text_cell(&row.blood_type),
                display_cell(row.bmi),
                display_cell(row.donation_count_last_12m),
                flag_cell(row.is_regular_donor),
                flag_cell(row.eligible_to_donate),
                display_cell(row.donation_propensity_score),
                flag_cell(row.donated_next_6m),
            ]);
        }
        let _ = writeln!(output, "{table}");
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "## Missing Values");
    let mut table = markdown_table(&["column", "before", "after"]);
    for before in &report.nulls_before.columns {
        let after = report.nulls_after.get(&before.column).unwrap_or(0);
        table.add_row(vec![
            Cell::new(escape_markdown(&before.column)),
            number_cell(before.nulls),
            number_cell(after),
        ]);
    }
    let _ = writeln!(output, "{table}");
    let _ = writeln!(output);

    let _ = writeln!(output, "## {} Summary", group);
    if report.summaries.is_empty() {
        let _ = writeln!(output, "No groups to summarize.");
    } else {
        let _ = writeln!(output, "```");
        output.push_str(&summary_table(report.summaries));
        let _ = writeln!(output, "```");
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "## 1. Donor Distribution by {}", group);
    output.push_str(&bar_chart(&charts.donors_by_group, |v| format!("{v:.0}")));

    let _ = writeln!(output, "## 2. Future Donation Likelihood by {}", group);
    output.push_str(&bar_chart(&charts.future_donation_by_group, |v| format!("{v:.3}")));

    let _ = writeln!(output, "## 3. Regular vs Non-Regular Donors");
    output.push_str(&bar_chart(&charts.regular_vs_non_regular, |v| format!("{v:.0}")));

    let _ = writeln!(output, "## 4. BMI Distribution Across {}", group);
    if charts.bmi_by_group.is_empty() {
        let _ = writeln!(output, "No BMI values recorded.");
    } else {
        let mut table = markdown_table(&[group.as_str(), "n", "min", "q1", "median", "q3", "max"]);
        for spread in &charts.bmi_by_group {
            table.add_row(vec![
                Cell::new(escape_markdown(&spread.label)),
                number_cell(spread.count),
                number_cell(format!("{:.1}", spread.min)),
                number_cell(format!("{:.1}", spread.q1)),
                number_cell(format!("{:.1}", spread.median)),
                number_cell(format!("{:.1}", spread.q3)),
                number_cell(format!("{:.1}", spread.max)),
            ]);
        }
        let _ = writeln!(output, "{table}");
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "## 5. Donation Outcome in Next 6 Months");
    if charts.donation_outcome.is_empty() {
        let _ = writeln!(output, "No outcomes recorded.");
    } else {
        for slice in &charts.donation_outcome {
            let _ = writeln!(
                output,
                "- {}: {} ({:.1}%)",
                slice.label, slice.count, slice.percent
            );
        }
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "## 6. Eligibility Rate by {}", group);
    output.push_str(&bar_chart(&charts.eligibility_by_group, |v| format!("{v:.3}")));

    output
}

/// Borderless text table, one line per group.
pub fn summary_table(summaries: &[GroupSummary]) -> String {
    let mut table = TextTable::new();
    table.load_preset(NOTHING);
    table.set_header(vec![
        "group",
        "donors",
        "avg_bmi",
        "avg_don12",
        "regular",
        "eligible",
        "propensity",
        "future",
    ]);

    for s in summaries {
        let mut row = Row::new();
        row.add_cell(Cell::new(&s.key).set_alignment(CellAlignment::Left));
        row.add_cell(number_cell(s.donor_count));
        row.add_cell(number_cell(mean_cell(s.avg_bmi, 2)));
        row.add_cell(number_cell(mean_cell(s.avg_donations_12m, 2)));
        row.add_cell(number_cell(mean_cell(s.regular_donor_rate, 3)));
        row.add_cell(number_cell(mean_cell(s.eligibility_rate, 3)));
        row.add_cell(number_cell(mean_cell(s.avg_propensity, 3)));
        row.add_cell(number_cell(mean_cell(s.future_donation_rate, 3)));
        table.add_row(row);
    }

    format!("{table}\n")
}

fn markdown_table(header: &[&str]) -> TextTable {
    let mut table = TextTable::new();
    table.load_preset(ASCII_MARKDOWN);
    table.set_header(header.iter().map(|h| escape_markdown(h)).collect::<Vec<_>>());
    table
}

/// A bare `|` would end the cell early.
fn escape_markdown(text: &str) -> String {
    text.replace('|', "\\|")
}

fn number_cell(value: impl std::fmt::Display) -> Cell {
    Cell::new(value).set_alignment(CellAlignment::Right)
}

fn bar_chart(bars: &[Bar], format_value: impl Fn(f64) -> String) -> String {
    let mut output = String::new();
    if bars.is_empty() {
        let _ = writeln!(output, "No data.");
        let _ = writeln!(output);
        return output;
    }

    let label_width = bars.iter().map(|b| b.label.chars().count()).max().unwrap_or(0);
    let max = bars.iter().map(|b| b.value).fold(0.0_f64, f64::max);

    let _ = writeln!(output, "```");
    for bar in bars {
        let len = if max > 0.0 {
            (bar.value / max * BAR_WIDTH as f64).round() as usize
        } else {
            0
        };
        let _ = writeln!(
            output,
            "{:<label_width$} {:<bar_width$} {}",
            bar.label,
            "█".repeat(len),
            format_value(bar.value),
            bar_width = BAR_WIDTH
        );
    }
    let _ = writeln!(output, "```");
    let _ = writeln!(output);
    output
}

fn group_label(group_key: &str) -> String {
    if group_key == BLOOD_TYPE {
        "Blood Type".to_string()
    } else {
        format!("`{group_key}`")
    }
}

fn mean_cell(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.precision$}"))
}

fn text_cell(value: &Option<String>) -> String {
    value.as_deref().map(escape_markdown).unwrap_or_default()
}

fn display_cell<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn flag_cell(value: Option<bool>) -> String {
    match value {
        Some(true) => "1",
        Some(false) => "0",
        None => "",
    }
    .to_string()
}
