use std::collections::HashSet;

use crate::models::{DonorRecord, Table};

/// Hashable view of a row; two rows are duplicates iff their keys are equal.
#[derive(Debug, PartialEq, Eq, Hash)]
struct RowKey<'a> {
    donor_id: Option<&'a str>,
    blood_type: Option<&'a str>,
    bmi: Option<u64>,
    donation_count_last_12m: Option<u32>,
    is_regular_donor: Option<bool>,
    eligible_to_donate: Option<bool>,
    donation_propensity_score: Option<u64>,
    donated_next_6m: Option<bool>,
    extra: Vec<Option<&'a str>>,
}

impl<'a> From<&'a DonorRecord> for RowKey<'a> {
    fn from(row: &'a DonorRecord) -> Self {
        Self {
            donor_id: row.donor_id.as_deref(),
            blood_type: row.blood_type.as_deref(),
            bmi: row.bmi.map(float_bits),
            donation_count_last_12m: row.donation_count_last_12m,
            is_regular_donor: row.is_regular_donor,
            eligible_to_donate: row.eligible_to_donate,
            donation_propensity_score: row.donation_propensity_score.map(float_bits),
            donated_next_6m: row.donated_next_6m,
            extra: row.extra.iter().map(|c| c.as_deref()).collect(),
        }
    }
}

// -0.0 and 0.0 compare equal, so they must hash the same.
fn float_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}

/// Drops rows equal on every column to an earlier row. The first occurrence
/// wins and retained rows keep their relative order.
pub fn deduplicate(table: Table) -> Table {
    let Table {
        extra_columns,
        rows,
    } = table;

    let mut seen = HashSet::with_capacity(rows.len());
    let keep: Vec<bool> = rows
        .iter()
        .map(|row| seen.insert(RowKey::from(row)))
        .collect();
    drop(seen);

    let rows = rows
        .into_iter()
        .zip(keep)
        .filter_map(|(row, keep)| keep.then_some(row))
        .collect();

    Table {
        extra_columns,
        rows,
    }
}
