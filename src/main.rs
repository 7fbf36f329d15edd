use anyhow::Context;
use clap::Parser;
use compute::AggregateTable;
use data::REQUIRED_COLUMNS;
use logging::{default_log_file, LogConfig};
use read::{read_loans, validate_header};
use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    process::ExitCode,
};
use tracing::{debug, error, info};
use write::write_aggregates;

mod compute;
mod data;
mod logging;
mod read;
mod write;

/// Aggregate amount from input file and output to CSV file
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// CSV file to parse
    #[arg(long, default_value = "Loans.csv")]
    input: PathBuf,
    /// CSV file to store aggregates
    #[arg(long, default_value = "Output.csv")]
    output: PathBuf,
    /// No column header in output file
    #[arg(long = "no_output_header")]
    no_output_header: bool,
    /// Log all messages to log file
    #[arg(long, conflicts_with = "nolog")]
    verbose: bool,
    /// Do not create log file
    #[arg(long)]
    nolog: bool,
    /// Log file path [default: <program name>.log]
    #[arg(long = "log_file", conflicts_with = "nolog")]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        let file = if self.nolog {
            None
        } else {
            Some(self.log_file.clone().unwrap_or_else(default_log_file))
        };
        LogConfig::new(self.verbose, file)
    }
}

fn main() -> Result<ExitCode, anyhow::Error> {
    let cli = Cli::parse();
    cli.log_config().init()?;

    info!("--------------------------------------------------------------");
    info!(
        "Aggregating totals from {} into CSV file {}",
        cli.input.display(),
        cli.output.display()
    );
    Ok(ExitCode::from(report(run(&cli))))
}

/// Logs a failed run once, through the subscriber, and maps it to the process
/// exit status.
fn report(result: Result<(), anyhow::Error>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            error!("{e:#}");
            1
        }
    }
}

/// Validate, aggregate, write. Nothing is written unless the input header
/// carries every required column.
fn run(cli: &Cli) -> Result<(), anyhow::Error> {
    let table = load_totals(&cli.input)?;
    save_totals(&table, &cli.output, !cli.no_output_header)
}

fn open_input(path: &Path) -> Result<File, anyhow::Error> {
    File::open(path).with_context(|| format!("cannot open input file {}", path.display()))
}

fn load_totals(path: &Path) -> Result<AggregateTable, anyhow::Error> {
    debug!("Parsing input file {}", path.display());
    validate_header(open_input(path)?, &REQUIRED_COLUMNS)
        .with_context(|| format!("invalid input file {}", path.display()))?;

    let mut table = AggregateTable::new();
    let summary = read_loans(open_input(path)?, &mut table)
        .with_context(|| format!("cannot read {}", path.display()))?;
    info!(
        rows = summary.rows,
        skipped = summary.skipped,
        "Read {} records from {}",
        summary.rows,
        path.display()
    );
    debug!(
        groups = table.len(),
        count = table.total_count(),
        total = ?table.total_sum(),
        "aggregated"
    );
    Ok(table)
}

fn save_totals(
    table: &AggregateTable,
    path: &Path,
    include_header: bool,
) -> Result<(), anyhow::Error> {
    debug!("Writing to output file {}", path.display());
    let file = File::create(path)
        .with_context(|| format!("cannot create output file {}", path.display()))?;
    write_aggregates(BufWriter::new(file), table, include_header)
        .with_context(|| format!("cannot write {}", path.display()))?;
    info!("Created {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{report, run, Cli};
    use crate::data::SchemaError;
    use clap::Parser;
    use std::{fs, path::Path};
    use tempfile::tempdir;

    fn cli_for(input: &Path, output: &Path, extra: &[&str]) -> Cli {
        let mut args = vec![
            "loan-aggregate".to_string(),
            "--input".to_string(),
            input.display().to_string(),
            "--output".to_string(),
            output.display().to_string(),
            "--nolog".to_string(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        Cli::try_parse_from(args).unwrap()
    }

    const LOANS: &str = "\
MSISDN,Network,Date,Product,Amount
'27729554427','Network 1','12-Mar-2016','Loan Product 1',1000.00
'27722342551','Network 2','16-Mar-2016','Loan Product 1',1122.00
'27725544272','Network 3','17-Mar-2016','Loan Product 2',2084.00
'27725544272','Network 1','18-Mar-2016','Loan Product 1',3000.00
'27723456789','Network 1','01-Apr-2016','Loan Product 1',not-a-number
'27725544272','Network 1','02-Apr-2016','Loan Product 1',500.50
";

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["loan-aggregate"]).unwrap();
        assert_eq!(cli.input, Path::new("Loans.csv"));
        assert_eq!(cli.output, Path::new("Output.csv"));
        assert!(!cli.no_output_header);
        assert!(!cli.verbose);
        assert!(!cli.nolog);
        assert!(cli.log_config().file.is_some());
    }

    #[test]
    fn exit_status() {
        assert_eq!(report(Ok(())), 0);
        assert_eq!(report(Err(anyhow::anyhow!("cannot open input file"))), 1);
    }

    #[test]
    fn verbose_and_nolog_conflict() {
        assert!(Cli::try_parse_from(["loan-aggregate", "--verbose", "--nolog"]).is_err());
    }

    #[test]
    fn nolog_disables_file() {
        let cli = Cli::try_parse_from(["loan-aggregate", "--nolog"]).unwrap();
        assert_eq!(cli.log_config().file, None);
        let cli = Cli::try_parse_from(["loan-aggregate", "--log_file", "x.log"]).unwrap();
        assert_eq!(cli.log_config().file, Some("x.log".into()));
    }

    #[test]
    fn aggregates_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("Loans.csv");
        let output = dir.path().join("Output.csv");
        fs::write(&input, LOANS).unwrap();

        run(&cli_for(&input, &output, &[])).unwrap();
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "\
'Network','Product','Month','Amount','Count'
'Network 1','Loan Product 1','Mar-2016',4000.00,2
'Network 2','Loan Product 1','Mar-2016',1122.00,1
'Network 3','Loan Product 2','Mar-2016',2084.00,1
'Network 1','Loan Product 1','Apr-2016',500.50,1
"
        );
    }

    #[test]
    fn no_output_header() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("Loans.csv");
        let output = dir.path().join("Output.csv");
        fs::write(&input, "Network,Product,Date,Amount\nACME,Card,202401 15,10.00\n").unwrap();

        run(&cli_for(&input, &output, &["--no_output_header"])).unwrap();
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "'ACME','Card','01 15',10.00,1\n"
        );
    }

    #[test]
    fn runs_are_identical() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("Loans.csv");
        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.csv");
        fs::write(&input, LOANS).unwrap();

        run(&cli_for(&input, &first, &[])).unwrap();
        run(&cli_for(&input, &second, &[])).unwrap();
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn quoted_and_bare_network_match() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("Loans.csv");
        let output = dir.path().join("Output.csv");
        fs::write(
            &input,
            "Network,Product,Date,Amount\n'ACME',Card,202401 15,10.00\nACME,Card,202401 15,5.00\n",
        )
        .unwrap();

        run(&cli_for(&input, &output, &["--no_output_header"])).unwrap();
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "'ACME','Card','01 15',15.00,2\n"
        );
    }

    #[test]
    fn missing_column_writes_nothing() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("Loans.csv");
        let output = dir.path().join("Output.csv");
        fs::write(&input, "Network,Product,Date\nACME,Card,202401 15\n").unwrap();

        let err = run(&cli_for(&input, &output, &[])).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SchemaError>(),
            Some(&SchemaError::MissingColumns(vec!["Amount".into()]))
        );
        assert!(!output.exists());
    }

    #[test]
    fn overflowing_sum_keeps_running() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("Loans.csv");
        let output = dir.path().join("Output.csv");
        fs::write(
            &input,
            "Network,Product,Date,Amount\n\
             A,B,202401,50000000000000000000000000000\n\
             A,B,202401,50000000000000000000000000000\n\
             C,D,202401,1e30\n\
             C,D,202401,2.5\n",
        )
        .unwrap();

        run(&cli_for(&input, &output, &["--no_output_header"])).unwrap();
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "'A','B','01',50000000000000000000000000000.00,1\n'C','D','01',2.50,1\n"
        );
    }

    #[test]
    fn short_row_is_dropped() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("Loans.csv");
        let output = dir.path().join("Output.csv");
        fs::write(
            &input,
            "Date,Amount,Network,Product\n202401 15,10.00\n202401 15,4.00,ACME,Card\n",
        )
        .unwrap();

        run(&cli_for(&input, &output, &["--no_output_header"])).unwrap();
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "'ACME','Card','01 15',4.00,1\n"
        );
    }

    #[test]
    fn missing_input_fails() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("nope.csv");
        let output = dir.path().join("Output.csv");

        assert!(run(&cli_for(&input, &output, &[])).is_err());
        assert!(!output.exists());
    }
}
