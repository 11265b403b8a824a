//! Data behind the six report charts.
//!
//! Everything here is computed from the cleaned table and the group
//! summaries; the sinks in `report` only decide how to draw it.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{RegistryError, Result};
use crate::models::{GroupSummary, Table};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub label: String,
    pub value: f64,
}

/// Five-number summary of one group's BMI values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spread {
    pub label: String,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slice {
    pub label: String,
    pub count: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSet {
    pub donors_by_group: Vec<Bar>,
    pub future_donation_by_group: Vec<Bar>,
    pub regular_vs_non_regular: Vec<Bar>,
    pub bmi_by_group: Vec<Spread>,
    pub donation_outcome: Vec<Slice>,
    pub eligibility_by_group: Vec<Bar>,
}

impl ChartSet {
    pub fn build(table: &Table, summaries: &[GroupSummary], group_key: &str) -> Result<Self> {
        Ok(Self {
            donors_by_group: summaries
                .iter()
                .map(|s| Bar {
                    label: s.key.clone(),
                    value: s.donor_count as f64,
                })
                .collect(),
            future_donation_by_group: rate_bars(summaries, |s| s.future_donation_rate),
            regular_vs_non_regular: regular_counts(table),
            bmi_by_group: bmi_spread(table, group_key)?,
            donation_outcome: donation_outcome(table),
            eligibility_by_group: rate_bars(summaries, |s| s.eligibility_rate),
        })
    }
}

/// Groups whose rate is undefined get no bar.
fn rate_bars(summaries: &[GroupSummary], rate: impl Fn(&GroupSummary) -> Option<f64>) -> Vec<Bar> {
    summaries
        .iter()
        .filter_map(|s| {
            rate(s).map(|value| Bar {
                label: s.key.clone(),
                value,
            })
        })
        .collect()
}

pub fn regular_counts(table: &Table) -> Vec<Bar> {
    let (regular, other): (Vec<bool>, Vec<bool>) = table
        .rows
        .iter()
        .filter_map(|r| r.is_regular_donor)
        .partition(|flag| *flag);

    vec![
        Bar {
            label: "Not Regular (0)".to_string(),
            value: other.len() as f64,
        },
        Bar {
            label: "Regular (1)".to_string(),
            value: regular.len() as f64,
        },
    ]
}

pub fn bmi_spread(table: &Table, group_key: &str) -> Result<Vec<Spread>> {
    let column = table
        .column(group_key)
        .ok_or_else(|| RegistryError::UnknownColumn(group_key.to_string()))?;

    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for row in &table.rows {
        if let (Some(key), Some(bmi)) = (row.text(column), row.bmi) {
            groups.entry(key).or_default().push(bmi);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(label, mut values)| {
            values.sort_by(f64::total_cmp);
            Spread {
                label,
                count: values.len(),
                min: values[0],
                q1: quantile(&values, 0.25),
                median: quantile(&values, 0.5),
                q3: quantile(&values, 0.75),
                max: values[values.len() - 1],
            }
        })
        .collect())
}

/// Linear interpolation between closest ranks. `sorted` must be non-empty.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

pub fn donation_outcome(table: &Table) -> Vec<Slice> {
    let donated = table
        .rows
        .iter()
        .filter(|r| r.donated_next_6m == Some(true))
        .count();
    let not_donated = table
        .rows
        .iter()
        .filter(|r| r.donated_next_6m == Some(false))
        .count();
    let total = donated + not_donated;
    if total == 0 {
        return Vec::new();
    }

    [("Did Not Donate", not_donated), ("Donated", donated)]
        .into_iter()
        .map(|(label, count)| Slice {
            label: label.to_string(),
            count,
            percent: count as f64 * 100.0 / total as f64,
        })
        .collect()
}
