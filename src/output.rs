//! Result persistence: tab-separated `.txt` and comma-separated `.csv`

use crate::proxy::models::TestResult;
use crate::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Column set shared by both formats
pub const RESULT_FIELDS: [&str; 7] =
    ["Index", "Type", "IP", "Location", "Latency", "Speed", "Status"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Txt,
    Csv,
}

/// Pick the format from the file extension. A missing extension gets
/// `.txt` appended; an unrecognized one keeps the name but uses the
/// txt layout.
fn resolve_format(path: &str) -> (PathBuf, OutputFormat) {
    let path = PathBuf::from(path);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => (path, OutputFormat::Csv),
        Some(_) => (path, OutputFormat::Txt),
        None => (path.with_extension("txt"), OutputFormat::Txt),
    }
}

/// One output row; `Index` is 1-based original input order
fn result_row(result: &TestResult) -> [String; 7] {
    [
        (result.original_index + 1).to_string(),
        result.transport.label().to_string(),
        result.ip_display(),
        result.location_display(),
        result.latency_display(),
        result.speed_display(),
        result.status.to_string(),
    ]
}

/// Write results to `path`, returning the path actually written
pub fn save_results(results: &[TestResult], path: &str) -> Result<PathBuf> {
    let (path, format) = resolve_format(path);
    match format {
        OutputFormat::Txt => save_txt(results, &path)?,
        OutputFormat::Csv => save_csv(results, &path)?,
    }
    Ok(path)
}

fn save_txt(results: &[TestResult], path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "{}", RESULT_FIELDS.join("\t"))?;
    for result in results {
        writeln!(writer, "{}", result_row(result).join("\t"))?;
    }
    writer.flush()?;
    Ok(())
}

fn save_csv(results: &[TestResult], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(RESULT_FIELDS)?;
    for result in results {
        writer.write_record(result_row(result))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::{BandwidthReading, TransportType};
    use std::time::Duration;

    fn sample_results() -> Vec<TestResult> {
        let mut working = TestResult::working(
            TransportType::Http,
            "203.0.113.7".to_string(),
            Duration::from_millis(256),
            0,
        );
        working.location = Some("Ashburn, Virginia, United States".to_string());
        working.speed = Some(BandwidthReading::Mbps(54.88));
        let failed = TestResult::failed(TransportType::Http, "connection refused".to_string(), 1);
        vec![working, failed]
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("proxy-vet-test-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_resolve_format() {
        let (path, format) = resolve_format("results.csv");
        assert_eq!(path, PathBuf::from("results.csv"));
        assert_eq!(format, OutputFormat::Csv);

        let (path, format) = resolve_format("results.txt");
        assert_eq!(path, PathBuf::from("results.txt"));
        assert_eq!(format, OutputFormat::Txt);

        let (path, format) = resolve_format("results");
        assert_eq!(path, PathBuf::from("results.txt"));
        assert_eq!(format, OutputFormat::Txt);

        let (path, format) = resolve_format("results.dat");
        assert_eq!(path, PathBuf::from("results.dat"));
        assert_eq!(format, OutputFormat::Txt);
    }

    #[test]
    fn test_result_row_values() {
        let results = sample_results();
        let row = result_row(&results[0]);
        assert_eq!(
            row,
            [
                "1",
                "HTTP",
                "203.0.113.7",
                "Ashburn, Virginia, United States",
                "256ms",
                "54.88 Mbps",
                "Working"
            ]
            .map(String::from)
        );

        let row = result_row(&results[1]);
        assert_eq!(row[0], "2");
        assert_eq!(row[2], "N/A");
        assert_eq!(row[5], "N/A");
        assert_eq!(row[6], "Failed");
    }

    #[test]
    fn test_txt_output_shape() {
        let path = temp_path("shape.txt");
        save_results(&sample_results(), path.to_str().unwrap()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Index\tType\tIP\tLocation\tLatency\tSpeed\tStatus");
        assert!(lines[1].starts_with("1\tHTTP\t203.0.113.7\t"));
        assert!(lines[2].starts_with("2\tHTTP\tN/A\t"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_csv_output_shape() {
        let path = temp_path("shape.csv");
        save_results(&sample_results(), path.to_str().unwrap()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Index,Type,IP,Location,Latency,Speed,Status");
        assert!(lines[1].starts_with("1,HTTP,203.0.113.7,"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_extension_appends_txt() {
        let path = temp_path("noext");
        let written = save_results(&sample_results(), path.to_str().unwrap()).unwrap();
        assert_eq!(written.extension().and_then(|e| e.to_str()), Some("txt"));
        assert!(written.exists());
        std::fs::remove_file(&written).ok();
    }
}
