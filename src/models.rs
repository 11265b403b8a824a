use serde::Serialize;

pub const DONOR_ID: &str = "donor_id";
pub const BLOOD_TYPE: &str = "blood_type";
pub const BMI: &str = "bmi";
pub const DONATION_COUNT_LAST_12M: &str = "donation_count_last_12m";
pub const IS_REGULAR_DONOR: &str = "is_regular_donor";
pub const ELIGIBLE_TO_DONATE: &str = "eligible_to_donate";
pub const DONATION_PROPENSITY_SCORE: &str = "donation_propensity_score";
pub const DONATED_NEXT_6M: &str = "donated_next_6m";

/// Columns every registry file must carry, in schema order.
pub const REQUIRED_COLUMNS: [&str; 8] = [
    DONOR_ID,
    BLOOD_TYPE,
    BMI,
    DONATION_COUNT_LAST_12M,
    IS_REGULAR_DONOR,
    ELIGIBLE_TO_DONATE,
    DONATION_PROPENSITY_SCORE,
    DONATED_NEXT_6M,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    DonorId,
    BloodType,
    Bmi,
    DonationCount,
    RegularDonor,
    Eligible,
    Propensity,
    DonatedNext6m,
    /// Index into `Table::extra_columns`.
    Extra(usize),
}

impl Column {
    pub fn required(name: &str) -> Option<Column> {
        match name {
            DONOR_ID => Some(Column::DonorId),
            BLOOD_TYPE => Some(Column::BloodType),
            BMI => Some(Column::Bmi),
            DONATION_COUNT_LAST_12M => Some(Column::DonationCount),
            IS_REGULAR_DONOR => Some(Column::RegularDonor),
            ELIGIBLE_TO_DONATE => Some(Column::Eligible),
            DONATION_PROPENSITY_SCORE => Some(Column::Propensity),
            DONATED_NEXT_6M => Some(Column::DonatedNext6m),
            _ => None,
        }
    }
}

/// One donor row. Every field is optional because the registry has gaps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DonorRecord {
    pub donor_id: Option<String>,
    pub blood_type: Option<String>,
    pub bmi: Option<f64>,
    pub donation_count_last_12m: Option<u32>,
    pub is_regular_donor: Option<bool>,
    pub eligible_to_donate: Option<bool>,
    pub donation_propensity_score: Option<f64>,
    pub donated_next_6m: Option<bool>,
    /// Cells of the non-required columns, aligned with `Table::extra_columns`.
    pub extra: Vec<Option<String>>,
}

impl DonorRecord {
    pub fn is_null(&self, column: Column) -> bool {
        match column {
            Column::DonorId => self.donor_id.is_none(),
            Column::BloodType => self.blood_type.is_none(),
            Column::Bmi => self.bmi.is_none(),
            Column::DonationCount => self.donation_count_last_12m.is_none(),
            Column::RegularDonor => self.is_regular_donor.is_none(),
            Column::Eligible => self.eligible_to_donate.is_none(),
            Column::Propensity => self.donation_propensity_score.is_none(),
            Column::DonatedNext6m => self.donated_next_6m.is_none(),
            Column::Extra(idx) => self.extra.get(idx).map_or(true, Option::is_none),
        }
    }

    /// Cell rendered as text, used as a grouping key.
    pub fn text(&self, column: Column) -> Option<String> {
        match column {
            Column::DonorId => self.donor_id.clone(),
            Column::BloodType => self.blood_type.clone(),
            Column::Bmi => self.bmi.map(|v| v.to_string()),
            Column::DonationCount => self.donation_count_last_12m.map(|v| v.to_string()),
            Column::RegularDonor => self.is_regular_donor.map(flag_text),
            Column::Eligible => self.eligible_to_donate.map(flag_text),
            Column::Propensity => self.donation_propensity_score.map(|v| v.to_string()),
            Column::DonatedNext6m => self.donated_next_6m.map(flag_text),
            Column::Extra(idx) => self.extra.get(idx).cloned().flatten(),
        }
    }
}

fn flag_text(flag: bool) -> String {
    let text = if flag { "1" } else { "0" };
    text.to_string()
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub extra_columns: Vec<String>,
    pub rows: Vec<DonorRecord>,
}

impl Table {
    #[cfg(test)]
    pub fn new(rows: Vec<DonorRecord>) -> Self {
        Self {
            extra_columns: Vec::new(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        REQUIRED_COLUMNS
            .iter()
            .copied()
            .chain(self.extra_columns.iter().map(String::as_str))
            .collect()
    }

    pub fn columns(&self) -> Vec<Column> {
        REQUIRED_COLUMNS
            .iter()
            .filter_map(|name| Column::required(name))
            .chain((0..self.extra_columns.len()).map(Column::Extra))
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<Column> {
        Column::required(name).or_else(|| {
            self.extra_columns
                .iter()
                .position(|c| c == name)
                .map(Column::Extra)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnNulls {
    pub column: String,
    pub nulls: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct NullReport {
    pub columns: Vec<ColumnNulls>,
}

impl NullReport {
    pub fn get(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .find(|c| c.column == column)
            .map(|c| c.nulls)
    }

    pub fn total(&self) -> usize {
        self.columns.iter().map(|c| c.nulls).sum()
    }
}

/// Per-group statistics. A mean is `None` when the group has no values for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    /// Value of the grouping column shared by the group's rows.
    pub key: String,
    pub donor_count: usize,
    pub avg_bmi: Option<f64>,
    pub avg_donations_12m: Option<f64>,
    pub regular_donor_rate: Option<f64>,
    pub eligibility_rate: Option<f64>,
    pub avg_propensity: Option<f64>,
    pub future_donation_rate: Option<f64>,
}
