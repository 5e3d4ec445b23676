use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Dated table read from a CSV file: header row is `date, TICKER, ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvHistory {
    pub assets: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<Vec<Option<f64>>>,
}

/// Read a JSON or YAML file (by extension) and deserialise into a typed struct.
pub fn read_structured<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let contents = fs::read_to_string(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    let value: T = match extension(&canonical).as_deref() {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?,
        _ => serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?,
    };
    Ok(value)
}

pub fn is_csv(path: &str) -> bool {
    extension(Path::new(path)).as_deref() == Some("csv")
}

/// Read a dated CSV table of prices or returns.
pub fn read_history_csv(path: &str) -> Result<CsvHistory, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let file = fs::File::open(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    parse_history_csv(file).map_err(|e| format!("{}: {}", canonical.display(), e).into())
}

/// First column is the date; the remaining header cells are asset
/// identifiers. Blank, `NaN`, `NA` and `null` cells are missing values.
pub fn parse_history_csv<R: Read>(reader: R) -> Result<CsvHistory, Box<dyn std::error::Error>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = rdr.headers()?.clone();
    if headers.len() < 2 {
        return Err("CSV needs a date column and at least one asset column".into());
    }
    let assets: Vec<String> = headers.iter().skip(1).map(String::from).collect();

    let mut dates = Vec::new();
    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let date_cell = record.get(0).unwrap_or_default();
        let date = parse_date(date_cell)
            .ok_or_else(|| format!("row {}: unrecognised date '{}'", line + 1, date_cell))?;
        let row = record
            .iter()
            .skip(1)
            .enumerate()
            .map(|(j, cell)| {
                parse_cell(cell).map_err(|e| format!("row {}, {}: {}", line + 1, assets[j], e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        dates.push(date);
        rows.push(row);
    }

    Ok(CsvHistory { assets, dates, rows })
}

fn parse_date(cell: &str) -> Option<NaiveDate> {
    // Timestamps such as "2024-01-02 00:00:00" or "2024-01-02T00:00:00Z"
    // are read by their date part; anything else must be a bare date.
    let day = cell
        .split_once(|c: char| c == 'T' || c.is_whitespace())
        .map_or(cell, |(day, _)| day);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(day, "%m/%d/%Y"))
        .ok()
}

fn parse_cell(cell: &str) -> Result<Option<f64>, String> {
    match cell {
        "" | "NaN" | "nan" | "NA" | "null" => Ok(None),
        _ => cell
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("'{}' is not a number", cell)),
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Resolve and validate the path, preventing directory traversal.
fn resolve_path(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let p = Path::new(path);
    let canonical = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };

    if !canonical.exists() {
        return Err(format!("File not found: {}", canonical.display()).into());
    }

    if !canonical.is_file() {
        return Err(format!("Not a file: {}", canonical.display()).into());
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price_table() {
        let data = "Date,AAPL,MSFT\n\
                    2024-01-02,185.6,370.9\n\
                    2024-01-03 00:00:00,184.2,\n\
                    01/04/2024,NaN,367.9\n";
        let h = parse_history_csv(data.as_bytes()).unwrap();
        assert_eq!(h.assets, vec!["AAPL", "MSFT"]);
        assert_eq!(h.dates.len(), 3);
        assert_eq!(h.dates[2], NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
        assert_eq!(h.rows[0], vec![Some(185.6), Some(370.9)]);
        assert_eq!(h.rows[1], vec![Some(184.2), None]);
        assert_eq!(h.rows[2], vec![None, Some(367.9)]);
    }

    #[test]
    fn test_bad_cell_reports_asset() {
        let data = "Date,AAPL,MSFT\n2024-01-02,185.6,abc\n";
        let err = parse_history_csv(data.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("MSFT"));
    }

    #[test]
    fn test_date_formats() {
        let jan2 = NaiveDate::from_ymd_opt(2024, 1, 2);
        assert_eq!(parse_date("2024-01-02"), jan2);
        assert_eq!(parse_date("2024-01-02 16:00:00"), jan2);
        assert_eq!(parse_date("2024-01-02T16:00:00Z"), jan2);
        assert_eq!(parse_date("01/02/2024"), jan2);
        assert_eq!(parse_date("2024-01-02xyz"), None);
        assert_eq!(parse_date("2024-01-0212"), None);
    }

    #[test]
    fn test_trailing_junk_in_date_rejected() {
        let data = "Date,AAPL\n2024-01-02xyz,185.6\n";
        let err = parse_history_csv(data.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("unrecognised date"));
    }

    #[test]
    fn test_header_only_date_rejected() {
        assert!(parse_history_csv("Date\n2024-01-02\n".as_bytes()).is_err());
    }
}
