use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use csv::StringRecord;

use crate::error::{RegistryError, Result};
use crate::models::{Column, ColumnNulls, DonorRecord, NullReport, Table, REQUIRED_COLUMNS};

/// Cells matching one of these (after trimming) are treated as missing.
const NULL_TOKENS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "<NA>",
    "#N/A", "#NA",
];

pub fn load_path(path: &Path) -> Result<Table> {
    let file = File::open(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => RegistryError::SourceNotFound {
            path: path.to_path_buf(),
        },
        _ => RegistryError::Io(err),
    })?;
    load_reader(file)
}

/// Reads a registry with a header row. Row order matches the source.
pub fn load_reader<R: Read>(reader: R) -> Result<Table> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|name| !headers.iter().any(|h| h == *name))
        .map(|name| name.to_string())
        .collect();
    let mut repeated: Vec<String> = Vec::new();
    for (idx, name) in headers.iter().enumerate() {
        if headers[..idx].contains(name) && !repeated.contains(name) {
            repeated.push(name.clone());
        }
    }
    if !missing.is_empty() || !repeated.is_empty() {
        return Err(RegistryError::SchemaMismatch { missing, repeated });
    }

    let layout: Vec<Column> = {
        let mut extra_idx = 0;
        headers
            .iter()
            .map(|h| {
                Column::required(h).unwrap_or_else(|| {
                    extra_idx += 1;
                    Column::Extra(extra_idx - 1)
                })
            })
            .collect()
    };
    let extra_columns: Vec<String> = headers
        .iter()
        .filter(|h| Column::required(h).is_none())
        .cloned()
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|err| malformed_from_csv(err, &headers))?;
        let line = record
            .position()
            .map(|p| p.line())
            .unwrap_or(idx as u64 + 2);
        rows.push(parse_record(&record, &layout, &headers, extra_columns.len(), line)?);
    }

    Ok(Table {
        extra_columns,
        rows,
    })
}

fn parse_record(
    record: &StringRecord,
    layout: &[Column],
    headers: &[String],
    extra_len: usize,
    line: u64,
) -> Result<DonorRecord> {
    let mut row = DonorRecord {
        extra: vec![None; extra_len],
        ..DonorRecord::default()
    };

    for ((raw, column), name) in record.iter().zip(layout).zip(headers) {
        let cell = Cell {
            raw,
            name: name.as_str(),
            line,
        };
        match *column {
            Column::DonorId => row.donor_id = cell.text(),
            Column::BloodType => row.blood_type = cell.text(),
            Column::Bmi => row.bmi = cell.float()?,
            Column::DonationCount => row.donation_count_last_12m = cell.count()?,
            Column::RegularDonor => row.is_regular_donor = cell.flag()?,
            Column::Eligible => row.eligible_to_donate = cell.flag()?,
            Column::Propensity => row.donation_propensity_score = cell.float()?,
            Column::DonatedNext6m => row.donated_next_6m = cell.flag()?,
            Column::Extra(idx) => row.extra[idx] = cell.text(),
        }
    }

    Ok(row)
}

struct Cell<'a> {
    raw: &'a str,
    name: &'a str,
    line: u64,
}

impl Cell<'_> {
    fn value(&self) -> Option<&str> {
        let trimmed = self.raw.trim();
        if NULL_TOKENS.contains(&trimmed) {
            None
        } else {
            Some(trimmed)
        }
    }

    fn malformed(&self, reason: &str) -> RegistryError {
        RegistryError::MalformedRecord {
            line: self.line,
            column: self.name.to_string(),
            value: self.raw.to_string(),
            reason: reason.to_string(),
        }
    }

    fn text(&self) -> Option<String> {
        self.value().map(str::to_string)
    }

    fn float(&self) -> Result<Option<f64>> {
        let Some(value) = self.value() else {
            return Ok(None);
        };
        match value.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(self.malformed("expected a finite number")),
        }
    }

    fn count(&self) -> Result<Option<u32>> {
        let Some(value) = self.value() else {
            return Ok(None);
        };
        if let Ok(v) = value.parse::<u32>() {
            return Ok(Some(v));
        }
        match value.parse::<f64>() {
            Ok(v) if v.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&v) => {
                Ok(Some(v as u32))
            }
            _ => Err(self.malformed("expected a non-negative whole number")),
        }
    }

    fn flag(&self) -> Result<Option<bool>> {
        let Some(value) = self.value() else {
            return Ok(None);
        };
        match value.to_ascii_lowercase().as_str() {
            "1" | "1.0" | "true" | "yes" => Ok(Some(true)),
            "0" | "0.0" | "false" | "no" => Ok(Some(false)),
            _ => Err(self.malformed("expected a 0/1 flag")),
        }
    }
}

fn malformed_from_csv(err: csv::Error, headers: &[String]) -> RegistryError {
    match err.kind() {
        csv::ErrorKind::UnequalLengths {
            pos,
            expected_len,
            len,
        } => RegistryError::MalformedRecord {
            line: pos.as_ref().map(|p| p.line()).unwrap_or(0),
            column: "*".to_string(),
            value: format!("{len} fields"),
            reason: format!("expected {expected_len} fields"),
        },
        csv::ErrorKind::Utf8 { pos, err: utf8 } => RegistryError::MalformedRecord {
            line: pos.as_ref().map(|p| p.line()).unwrap_or(0),
            column: headers
                .get(utf8.field())
                .cloned()
                .unwrap_or_else(|| format!("#{}", utf8.field())),
            value: String::new(),
            reason: format!("invalid UTF-8 after byte {}", utf8.valid_up_to()),
        },
        _ => RegistryError::Csv(err),
    }
}

/// Missing-value count for every column, zero where nothing is missing.
pub fn report_nulls(table: &Table) -> NullReport {
    let columns = table
        .column_names()
        .into_iter()
        .zip(table.columns())
        .map(|(name, column)| ColumnNulls {
            column: name.to_string(),
            nulls: table.rows.iter().filter(|row| row.is_null(column)).count(),
        })
        .collect();

    NullReport { columns }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "donor_id,blood_type,bmi,donation_count_last_12m,is_regular_donor,eligible_to_donate,donation_propensity_score,donated_next_6m";

    fn load_str(body: &str) -> Result<Table> {
        load_reader(body.as_bytes())
    }

    #[test]
    fn loads_rows_in_source_order() {
        let csv = format!(
            "{HEADER}\nD3,O+,24.1,2,1,1,0.71,1\nD1,A-,19.5,0,0,1,0.12,0\nD2,B+,31.0,5,1,0,0.90,1\n"
        );
        let table = load_str(&csv).unwrap();

        let ids: Vec<_> = table
            .rows
            .iter()
            .map(|r| r.donor_id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["D3", "D1", "D2"]);
        assert_eq!(table.rows[0].bmi, Some(24.1));
        assert_eq!(table.rows[2].donation_count_last_12m, Some(5));
        assert_eq!(table.rows[1].is_regular_donor, Some(false));
        assert_eq!(table.rows[1].donation_propensity_score, Some(0.12));
    }

    #[test]
    fn null_tokens_become_missing() {
        let csv = format!("{HEADER}\nD1,,NaN,NA,,null,None,<NA>\n");
        let table = load_str(&csv).unwrap();
        let row = &table.rows[0];

        assert_eq!(row.donor_id.as_deref(), Some("D1"));
        assert!(row.blood_type.is_none());
        assert!(row.bmi.is_none());
        assert!(row.donation_count_last_12m.is_none());
        assert!(row.is_regular_donor.is_none());
        assert!(row.eligible_to_donate.is_none());
        assert!(row.donation_propensity_score.is_none());
        assert!(row.donated_next_6m.is_none());
    }

    #[test]
    fn accepts_float_counts_and_word_flags() {
        let csv = format!("{HEADER}\nD1,AB+,22,3.0,True,no,0.5,1.0\n");
        let row = &load_str(&csv).unwrap().rows[0];

        assert_eq!(row.donation_count_last_12m, Some(3));
        assert_eq!(row.is_regular_donor, Some(true));
        assert_eq!(row.eligible_to_donate, Some(false));
        assert_eq!(row.donated_next_6m, Some(true));
    }

    #[test]
    fn keeps_extra_columns() {
        let csv = "age,donor_id,blood_type,bmi,donation_count_last_12m,is_regular_donor,eligible_to_donate,donation_propensity_score,donated_next_6m,city\n\
                   34,D1,O-,23.0,1,1,1,0.4,0,Lyon\n";
        let table = load_str(csv).unwrap();

        assert_eq!(table.extra_columns, vec!["age", "city"]);
        assert_eq!(
            table.rows[0].extra,
            vec![Some("34".to_string()), Some("Lyon".to_string())]
        );
        assert_eq!(table.rows[0].blood_type.as_deref(), Some("O-"));
    }

    #[test]
    fn missing_columns_are_a_schema_mismatch() {
        let err = load_str("donor_id,blood_type,bmi\nD1,A+,20\n").unwrap_err();

        match err {
            RegistryError::SchemaMismatch { missing, repeated } => {
                assert!(repeated.is_empty());
                assert_eq!(missing.len(), 5);
                assert!(missing.contains(&"donated_next_6m".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn repeated_headers_are_a_schema_mismatch() {
        let csv = format!("{HEADER},bmi,notes,notes\nD1,A+,22.0,1,1,1,0.5,0,23.0,x,y\n");

        match load_str(&csv).unwrap_err() {
            RegistryError::SchemaMismatch { missing, repeated } => {
                assert!(missing.is_empty());
                assert_eq!(repeated, vec!["bmi", "notes"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_utf8_cell_is_malformed() {
        let mut bytes = format!("{HEADER}\nD1,A+,22.0,1,1,1,0.5,0\nD2,").into_bytes();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(b",30.0,1,0,0,0.2,1\n");

        match load_reader(bytes.as_slice()).unwrap_err() {
            RegistryError::MalformedRecord { line, column, .. } => {
                assert_eq!(line, 3);
                assert_eq!(column, "blood_type");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unparsable_cell_reports_line_and_column() {
        let csv = format!("{HEADER}\nD1,A+,22.0,1,1,1,0.5,0\nD2,B+,heavy,1,1,1,0.5,0\n");
        let err = load_str(&csv).unwrap_err();

        match err {
            RegistryError::MalformedRecord {
                line, column, value, ..
            } => {
                assert_eq!(line, 3);
                assert_eq!(column, "bmi");
                assert_eq!(value, "heavy");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn bad_flag_and_negative_count_are_malformed() {
        let flag = format!("{HEADER}\nD1,A+,22.0,1,2,1,0.5,0\n");
        assert!(matches!(
            load_str(&flag),
            Err(RegistryError::MalformedRecord { .. })
        ));

        let count = format!("{HEADER}\nD1,A+,22.0,-1,1,1,0.5,0\n");
        assert!(matches!(
            load_str(&count),
            Err(RegistryError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn short_row_is_malformed() {
        let csv = format!("{HEADER}\nD1,A+,22.0\n");
        assert!(matches!(
            load_str(&csv),
            Err(RegistryError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn missing_file_is_source_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_path(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, RegistryError::SourceNotFound { .. }));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        writeln!(file, "D1,A+,22.0,1,1,1,0.5,0").unwrap();

        let table = load_path(file.path()).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn null_report_counts_every_column() {
        let csv = format!(
            "{HEADER},notes\nD1,,22.0,1,1,1,0.5,0,\nD2,A+,,1,,1,0.5,0,x\nD3,,,1,1,1,0.5,0,\n"
        );
        let table = load_str(&csv).unwrap();
        let report = report_nulls(&table);

        assert_eq!(report.columns.len(), 9);
        assert_eq!(report.get("blood_type"), Some(2));
        assert_eq!(report.get("bmi"), Some(2));
        assert_eq!(report.get("is_regular_donor"), Some(1));
        assert_eq!(report.get("donor_id"), Some(0));
        assert_eq!(report.get("notes"), Some(2));
        assert_eq!(report.total(), 7);
    }

    #[test]
    fn null_report_of_empty_table_is_all_zero() {
        let report = report_nulls(&Table::default());
        assert_eq!(report.columns.len(), REQUIRED_COLUMNS.len());
        assert_eq!(report.total(), 0);
    }
}
