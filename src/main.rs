use anyhow::{anyhow, Context, Result};
use chartseries::csv_reader;
use chartseries::data::Data;
use chartseries::{BindingSpec, ColumnOptions, DataSeries, FailurePolicy};
use clap::{Parser, ValueEnum};
use std::io::{self, Read, Write};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InputFormat {
    Json,
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "chartseries")]
#[command(about = "Define expression columns over records read from stdin and report their type, min and max", long_about = None)]
struct Args {
    /// Column definition as NAME=EXPRESSION (e.g. 'total=items.map{price}.sum()').
    /// A bare NAME reads the field of the same name.
    #[arg(short, long = "column", required = true)]
    columns: Vec<String>,

    /// Input format on stdin
    #[arg(short, long, value_enum, default_value_t = InputFormat::Json)]
    format: InputFormat,

    /// Record undefined for records that fail to evaluate instead of aborting
    #[arg(long)]
    skip_errors: bool,

    /// Include the per-record values in the output
    #[arg(long)]
    values: bool,
}

fn parse_column_arg(arg: &str) -> Result<(String, BindingSpec)> {
    let (name, expression) = match arg.split_once('=') {
        Some((name, expression)) => (name.trim(), Some(expression.trim())),
        None => (arg.trim(), None),
    };
    if name.is_empty() {
        return Err(anyhow!("Column definition '{}' has no name", arg));
    }
    let binding = match expression {
        Some(expression) => BindingSpec::forward(expression),
        None => BindingSpec::default(),
    };
    Ok((name.to_string(), binding))
}

fn read_data(format: InputFormat) -> Result<Data> {
    match format {
        InputFormat::Csv => {
            let csv = csv_reader::read_csv_from_stdin().context("Failed to read CSV from stdin")?;
            Ok(Data::from_csv(csv))
        }
        InputFormat::Json => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read JSON from stdin")?;
            let json: serde_json::Value =
                serde_json::from_str(&input).context("Failed to parse JSON input")?;
            Data::from_json(&json)
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let options = ColumnOptions {
        on_error: if args.skip_errors {
            FailurePolicy::Skip
        } else {
            FailurePolicy::Abort
        },
    };
    let mut series = DataSeries::with_options(options);

    for arg in &args.columns {
        let (name, binding) = parse_column_arg(arg)?;
        series
            .define_column(&name, &binding)
            .with_context(|| format!("Failed to define column '{}'", name))?;
    }

    let data = read_data(args.format)?;
    series.set_data(data).context("Failed to evaluate columns")?;

    let report = if args.values {
        let mut columns = serde_json::Map::new();
        for summary in series.summary() {
            let values = series
                .column(&summary.name)
                .map(|c| c.values())
                .unwrap_or_default();
            let mut entry = serde_json::to_value(&summary)?;
            entry["values"] = serde_json::to_value(values)?;
            columns.insert(summary.name.clone(), entry);
        }
        serde_json::Value::Object(columns)
    } else {
        serde_json::to_value(series.summary())?
    };

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, &report).context("Failed to write report")?;
    writeln!(handle).context("Failed to write report")?;
    handle.flush().context("Failed to flush stdout")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_column_arg() {
        let (name, binding) = parse_column_arg("total = a + b").unwrap();
        assert_eq!(name, "total");
        assert_eq!(binding.expression(), Some("a + b"));

        let (name, binding) = parse_column_arg("height").unwrap();
        assert_eq!(name, "height");
        assert_eq!(binding.expression(), None);

        assert!(parse_column_arg("=a").is_err());
    }

    #[test]
    fn test_parse_column_arg_keeps_later_equals() {
        let (name, binding) = parse_column_arg("flag=a == 1").unwrap();
        assert_eq!(name, "flag");
        assert_eq!(binding.expression(), Some("a == 1"));
    }
}
