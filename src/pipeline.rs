use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::charts::ChartSet;
use crate::clean;
use crate::loader;
use crate::models::{GroupSummary, NullReport, Table, BLOOD_TYPE};
use crate::report::{self, ChartSink, Report};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub group_key: String,
    pub require_groups: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            group_key: BLOOD_TYPE.to_string(),
            require_groups: false,
        }
    }
}

#[derive(Debug)]
pub struct PipelineOutput {
    pub table: Table,
    pub duplicates_removed: usize,
    pub nulls_before: NullReport,
    pub nulls_after: NullReport,
    pub summaries: Vec<GroupSummary>,
    pub charts: ChartSet,
}

/// Load, clean, aggregate and hand the result to `sink`.
pub fn run(
    source: &Path,
    options: &PipelineOptions,
    sink: &mut dyn ChartSink,
) -> anyhow::Result<PipelineOutput> {
    let table = loader::load_path(source)
        .with_context(|| format!("failed to load {}", source.display()))?;
    info!(rows = table.len(), source = %source.display(), "loaded registry");
    if table.is_empty() {
        warn!("registry has no data rows");
    }

    let output = process(table, options)?;

    let report = Report {
        source,
        group_key: &options.group_key,
        generated_at: Utc::now(),
        table: &output.table,
        duplicates_removed: output.duplicates_removed,
        nulls_before: &output.nulls_before,
        nulls_after: &output.nulls_after,
        summaries: &output.summaries,
        charts: &output.charts,
    };
    sink.render(&report)?;

    Ok(output)
}

/// Everything after loading; no I/O.
pub fn process(table: Table, options: &PipelineOptions) -> anyhow::Result<PipelineOutput> {
    log_sample(&table);

    let nulls_before = loader::report_nulls(&table);
    log_nulls("before deduplication", &nulls_before);

    let loaded = table.len();
    let table = clean::deduplicate(table);
    let duplicates_removed = loaded - table.len();
    info!(
        rows = table.len(),
        removed = duplicates_removed,
        "removed duplicate rows"
    );

    let nulls_after = loader::report_nulls(&table);
    log_nulls("after deduplication", &nulls_after);

    let mut summaries = aggregate::summarize_by_group(&table, &options.group_key)?;
    if options.require_groups {
        summaries = aggregate::require_groups(summaries)?;
    }
    info!(
        groups = summaries.len(),
        key = %options.group_key,
        "summarized registry\n{}",
        report::summary_table(&summaries)
    );

    let charts = ChartSet::build(&table, &summaries, &options.group_key)?;

    Ok(PipelineOutput {
        table,
        duplicates_removed,
        nulls_before,
        nulls_after,
        summaries,
        charts,
    })
}

fn log_sample(table: &Table) {
    for (idx, row) in table.rows.iter().enumerate().skip(1).take(4) {
        debug!(row = idx, record = ?row, "sample row");
    }
}

fn log_nulls(stage: &str, report: &NullReport) {
    if report.total() == 0 {
        info!(stage, "no missing values");
        return;
    }
    for column in report.columns.iter().filter(|c| c.nulls > 0) {
        warn!(stage, column = %column.column, nulls = column.nulls, "missing values");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use std::io::Write;

    const HEADER: &str = "donor_id,blood_type,bmi,donation_count_last_12m,is_regular_donor,eligible_to_donate,donation_propensity_score,donated_next_6m";

    #[derive(Default)]
    struct Recorder {
        calls: usize,
        groups: Vec<String>,
        rows: usize,
    }

    impl ChartSink for Recorder {
        fn render(&mut self, report: &Report<'_>) -> anyhow::Result<()> {
            self.calls += 1;
            self.rows = report.table.len();
            self.groups = report.summaries.iter().map(|s| s.key.clone()).collect();
            Ok(())
        }
    }

    fn write_csv(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[test]
    fn runs_every_stage_once() {
        let file = write_csv(&[
            "1,A,22.0,3,1,1,0.5,0",
            "1,A,22.0,3,1,1,0.5,0",
            "2,B,30.0,1,0,0,0.2,1",
            "3,,25.0,2,1,1,0.4,1",
        ]);
        let mut sink = Recorder::default();

        let output = run(file.path(), &PipelineOptions::default(), &mut sink).unwrap();

        assert_eq!(sink.calls, 1);
        assert_eq!(sink.rows, 3);
        assert_eq!(sink.groups, vec!["A", "B"]);
        assert_eq!(output.duplicates_removed, 1);
        assert_eq!(output.nulls_before.get("blood_type"), Some(1));
        assert_eq!(output.nulls_after.get("blood_type"), Some(1));
        assert_eq!(output.summaries[0].avg_bmi, Some(22.0));
        assert_eq!(output.charts.donation_outcome[1].count, 2);
    }

    #[test]
    fn load_failure_skips_the_sink() {
        let file = write_csv(&["1,A,not-a-number,3,1,1,0.5,0"]);
        let mut sink = Recorder::default();

        let err = run(file.path(), &PipelineOptions::default(), &mut sink).unwrap_err();

        assert_eq!(sink.calls, 0);
        assert!(matches!(
            err.downcast_ref::<RegistryError>(),
            Some(RegistryError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn empty_registry_is_fine_unless_groups_are_required() {
        let output = process(Table::default(), &PipelineOptions::default()).unwrap();
        assert!(output.summaries.is_empty());

        let strict = PipelineOptions {
            require_groups: true,
            ..PipelineOptions::default()
        };
        let err = process(Table::default(), &strict).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RegistryError>(),
            Some(RegistryError::EmptyTable)
        ));
    }

    #[test]
    fn unknown_group_key_fails_fast() {
        let options = PipelineOptions {
            group_key: "rh".to_string(),
            ..PipelineOptions::default()
        };
        let err = process(Table::default(), &options).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RegistryError>(),
            Some(RegistryError::UnknownColumn(_))
        ));
    }

    #[test]
    fn runs_are_independent() {
        let file = write_csv(&["1,O+,21.0,1,1,1,0.3,1", "2,O+,23.0,1,1,1,0.3,0"]);
        let options = PipelineOptions::default();

        let first = run(file.path(), &options, &mut Recorder::default()).unwrap();
        let second = run(file.path(), &options, &mut Recorder::default()).unwrap();

        assert_eq!(first.summaries, second.summaries);
        assert_eq!(first.table, second.table);
    }
}
