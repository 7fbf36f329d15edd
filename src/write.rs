use crate::{
    compute::AggregateTable,
    data::{Aggregate, GroupKey, OUTPUT_DECIMALS, OUTPUT_HEADER},
};
use rust_decimal::Decimal;

/// CSV exporter for an `AggregateTable`. String fields are wrapped in single
/// quotes (embedded ones doubled), numbers are written bare, and lines end
/// with a lone `\n`. Rows follow the table order.
pub(crate) fn write_aggregates<W: std::io::Write>(
    writer: W,
    table: &AggregateTable,
    include_header: bool,
) -> Result<(), anyhow::Error> {
    // Quoting depends on the field type rather than its content, so it is done
    // here and the csv writer is told to leave fields alone.
    let mut wtr = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Never)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);
    if include_header {
        wtr.write_record(OUTPUT_HEADER.iter().map(|name| quote(name)))?;
    }
    for (key, aggregate) in table.iter() {
        wtr.write_record(output_row(key, aggregate))?;
    }
    wtr.flush()?;
    Ok(())
}

fn output_row(key: &GroupKey, aggregate: &Aggregate) -> [String; 5] {
    [
        quote(&key.network),
        quote(&key.product),
        quote(&key.month),
        format_amount(aggregate.sum),
        aggregate.count.to_string(),
    ]
}

fn quote(field: &str) -> String {
    format!("'{}'", field.replace('\'', "''"))
}

/// Fixed number of decimals, rounded half to even.
fn format_amount(amount: Decimal) -> String {
    format!(
        "{:.prec$}",
        amount.round_dp(OUTPUT_DECIMALS),
        prec = OUTPUT_DECIMALS as usize
    )
}
