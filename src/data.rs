use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

/// Columns the input header must carry; anything else is ignored.
pub const REQUIRED_COLUMNS: [&str; 4] = ["Network", "Product", "Date", "Amount"];

/// Header written on top of the output file.
pub const OUTPUT_HEADER: [&str; 5] = ["Network", "Product", "Month", "Amount", "Count"];

/// Number of decimal places the amount sums are written with.
pub const OUTPUT_DECIMALS: u32 = 2;

/// Raw input row, as read from the CSV file. Every field is kept as a string:
/// a bad amount is a per-row problem which must not stop the reader, so the
/// conversion happens later in `read::parse_record`. Rows too short to carry
/// a column are rejected before they get here, so an empty string always means
/// the field was present but blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub(crate) struct LoanRecord {
    #[serde(rename = "Network")]
    pub network: String,
    #[serde(rename = "Product")]
    pub product: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Amount")]
    pub amount: String,
}

/// Normalized grouping key of a loan row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct GroupKey {
    pub network: String,
    pub product: String,
    pub month: String,
}

/// Running total for one `GroupKey`. A freshly inserted aggregate already
/// holds its first amount, so `count` is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Aggregate {
    pub sum: Decimal,
    pub count: u64,
}

impl Aggregate {
    pub fn new(amount: Decimal) -> Self {
        Self {
            sum: amount,
            count: 1,
        }
    }

    /// Leaves the aggregate untouched when the sum would overflow.
    pub fn add(&mut self, amount: Decimal) -> Result<(), RowError> {
        self.sum = self
            .sum
            .checked_add(amount)
            .ok_or(RowError::AmountOverflow(amount))?;
        self.count += 1;
        Ok(())
    }
}

/// Why a single row was dropped. None of these stop the run.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RowError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("malformed date '{0}': no month after the first 4 characters")]
    MalformedDate(String),
    #[error("invalid amount '{0}'")]
    InvalidAmount(String),
    #[error("amount '{0}' is outside the supported range")]
    AmountOutOfRange(String),
    #[error("adding {0} would overflow the group total")]
    AmountOverflow(Decimal),
    #[error("unreadable record: {0}")]
    Unreadable(String),
}

/// Input header problems; these abort the run before anything is aggregated.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    #[error("file must contain column(s) named {}", quoted_list(.0))]
    MissingColumns(Vec<String>),
    #[error("file has no header row")]
    NoHeader,
}

fn quoted_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
