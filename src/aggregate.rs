use std::collections::BTreeMap;

use crate::error::{RegistryError, Result};
use crate::models::{DonorRecord, GroupSummary, Table};

/// Running sum and count of the non-null values of one column.
#[derive(Debug, Default, Clone, Copy)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

#[derive(Debug, Default)]
struct GroupAccumulator {
    rows: usize,
    bmi: Mean,
    donations: Mean,
    regular: Mean,
    eligible: Mean,
    propensity: Mean,
    donated: Mean,
}

impl GroupAccumulator {
    fn add(&mut self, row: &DonorRecord) {
        self.rows += 1;
        self.bmi.push(row.bmi);
        self.donations.push(row.donation_count_last_12m.map(f64::from));
        self.regular.push(row.is_regular_donor.map(flag_value));
        self.eligible.push(row.eligible_to_donate.map(flag_value));
        self.propensity.push(row.donation_propensity_score);
        self.donated.push(row.donated_next_6m.map(flag_value));
    }

    fn finish(self, key: String) -> GroupSummary {
        GroupSummary {
            key,
            donor_count: self.rows,
            avg_bmi: self.bmi.value(),
            avg_donations_12m: self.donations.value(),
            regular_donor_rate: self.regular.value(),
            eligibility_rate: self.eligible.value(),
            avg_propensity: self.propensity.value(),
            future_donation_rate: self.donated.value(),
        }
    }
}

fn flag_value(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

/// Groups rows by `group_key` and averages each measure over its non-null
/// values. Rows with a null key belong to no group. Output is sorted by key.
pub fn summarize_by_group(table: &Table, group_key: &str) -> Result<Vec<GroupSummary>> {
    let column = table
        .column(group_key)
        .ok_or_else(|| RegistryError::UnknownColumn(group_key.to_string()))?;

    let mut groups: BTreeMap<String, GroupAccumulator> = BTreeMap::new();
    for row in &table.rows {
        if let Some(key) = row.text(column) {
            groups.entry(key).or_default().add(row);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, acc)| acc.finish(key))
        .collect())
}

/// For callers that need at least one group.
pub fn require_groups(summaries: Vec<GroupSummary>) -> Result<Vec<GroupSummary>> {
    if summaries.is_empty() {
        return Err(RegistryError::EmptyTable);
    }
    Ok(summaries)
}
