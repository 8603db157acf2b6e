// CSV input for the command line tool

use anyhow::{Context, Result};
use std::io::{self, Read};

#[derive(Debug, Clone, PartialEq)]
pub struct CsvData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Read CSV with a header row from any reader
pub fn read_csv<R: Read>(reader: R) -> Result<CsvData> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for (line, record) in csv_reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read CSV row {}", line + 1))?;
        rows.push(record.iter().map(|field| field.to_string()).collect());
    }

    Ok(CsvData { headers, rows })
}

/// Read CSV data from stdin
pub fn read_csv_from_stdin() -> Result<CsvData> {
    read_csv(io::stdin().lock())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_csv() {
        let input = "x, y\n1, 2\n3, 4\n";
        let csv = read_csv(input.as_bytes()).unwrap();
        assert_eq!(csv.headers, vec!["x", "y"]);
        assert_eq!(csv.rows, vec![vec!["1", "2"], vec!["3", "4"]]);
    }

    #[test]
    fn test_read_csv_ragged_row_fails() {
        let input = "x,y\n1,2\n3\n";
        assert!(read_csv(input.as_bytes()).is_err());
    }

    #[test]
    fn test_read_csv_headers_only() {
        let csv = read_csv("a,b\n".as_bytes()).unwrap();
        assert_eq!(csv.headers, vec!["a", "b"]);
        assert!(csv.rows.is_empty());
    }
}
