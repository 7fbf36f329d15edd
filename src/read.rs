use crate::data::{GroupKey, LoanRecord, RowError, SchemaError, REQUIRED_COLUMNS};
use anyhow::Context;
use csv::StringRecord;
use rust_decimal::{prelude::FromPrimitive, Decimal};
use std::str::FromStr;
use tracing::{debug, error};

/// Trait for doing something with a loan amount read from a CSV file. Used by
/// `AggregateTable` to accumulate the sums, but also used for mock tests to check we
/// get the correct keys out of a CSV stream.
pub(crate) trait LoanUser {
    fn use_loan(&mut self, key: GroupKey, amount: Decimal) -> Result<(), RowError>;
}

/// What happened while reading the data rows.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadSummary {
    pub rows: u64,
    pub skipped: u64,
}

/// Reads only the header of `reader` and checks every `required` column is
/// there. Data rows are never touched.
pub(crate) fn validate_header<R: std::io::Read>(
    reader: R,
    required: &[&str],
) -> Result<(), anyhow::Error> {
    debug!(?required, "checking required columns");
    let mut rdr = csv::ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers().context("cannot read CSV header")?;
    if headers.is_empty() {
        return Err(SchemaError::NoHeader.into());
    }
    let missing: Vec<String> = required
        .iter()
        .filter(|column| !headers.iter().any(|h| h == **column))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(SchemaError::MissingColumns(missing).into());
    }
    Ok(())
}

/// Turns a raw row into its grouping key and amount.
pub(crate) fn parse_record(record: LoanRecord) -> Result<(GroupKey, Decimal), RowError> {
    let month: String = record.date.chars().skip(4).collect();
    let month = month.trim_end_matches('\'');
    if month.is_empty() {
        return Err(RowError::MalformedDate(record.date));
    }
    let key = GroupKey {
        network: strip_quotes(&record.network).to_owned(),
        product: strip_quotes(&record.product).to_owned(),
        month: month.to_owned(),
    };
    let amount = parse_amount(&record.amount)?;
    Ok((key, amount))
}

fn strip_quotes(s: &str) -> &str {
    s.trim_matches('\'')
}

/// Amounts are decimals, optionally padded with blanks or written in
/// scientific notation. Quotes are not stripped here. Anything a float would
/// accept but which does not fit a `Decimal` (about 7.9e28) is refused on its
/// own; digits past the 28th decimal place are rounded away.
fn parse_amount(raw: &str) -> Result<Decimal, RowError> {
    let s = raw.trim();
    if let Ok(amount) = Decimal::from_str(s).or_else(|_| Decimal::from_scientific(s)) {
        return Ok(amount);
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => {
            Decimal::from_f64(v).ok_or_else(|| RowError::AmountOutOfRange(raw.to_owned()))
        }
        _ => Err(RowError::InvalidAmount(raw.to_owned())),
    }
}

/// Checks the row is long enough to hold every required column, then maps it
/// onto a `LoanRecord` by header name.
fn to_loan_record(
    record: &StringRecord,
    headers: &StringRecord,
    positions: &[(&'static str, Option<usize>)],
) -> Result<LoanRecord, RowError> {
    for &(name, pos) in positions {
        if !matches!(pos, Some(p) if p < record.len()) {
            return Err(RowError::MissingField(name));
        }
    }
    record
        .deserialize(Some(headers))
        .map_err(|e| RowError::Unreadable(e.to_string()))
}

/// Simple CSV importer for loan rows. Bad rows are logged with their 1-based
/// position and skipped; only an I/O failure of the underlying reader stops it.
pub(crate) fn read_loans<R: std::io::Read, U: LoanUser>(
    reader: R,
    user: &mut U,
) -> Result<ReadSummary, anyhow::Error> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers().context("cannot read CSV header")?.clone();
    let positions: Vec<(&'static str, Option<usize>)> = REQUIRED_COLUMNS
        .iter()
        .map(|&name| (name, headers.iter().position(|h| h == name)))
        .collect();
    let mut summary = ReadSummary::default();
    for (i, result) in rdr.records().enumerate() {
        let rownum = i + 1;
        let record = match result {
            Ok(record) => to_loan_record(&record, &headers, &positions),
            Err(e) if e.is_io_error() => return Err(e).context("cannot read CSV input"),
            Err(e) => Err(RowError::Unreadable(e.to_string())),
        };
        summary.rows += 1;
        let used = record
            .and_then(parse_record)
            .and_then(|(key, amount)| user.use_loan(key, amount));
        if let Err(e) = used {
            summary.skipped += 1;
            error!(row = rownum, "line {rownum} is invalid: {e}");
        }
    }
    Ok(summary)
}
