//! Terminal output: severity-tagged printing, progress bars, the final
//! result table, and the small interactive prompts

use crate::proxy::models::{ProxyStatus, TestResult, TransportType};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use tabled::settings::location::ByColumnName;
use tabled::settings::{Remove, Style};
use tabled::{Table, Tabled};

const SEPARATOR: &str = "----------------------------------------------------------";

const PB_TEMPLATE: &str =
    "{spinner:.blue} {prefix:>16.cyan.bold} {wide_bar:.cyan/blue} {pos}/{len} ({elapsed_precise}, eta {eta}) {wide_msg}";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const PB_CHARS: &str = "█▓▒░  ";

static PB_STYLE: Lazy<Option<ProgressStyle>> = Lazy::new(|| {
    ProgressStyle::with_template(PB_TEMPLATE)
        .ok()
        .map(|s| s.tick_chars(TICK).progress_chars(PB_CHARS))
});

pub fn print_banner() {
    println!("{}", style(SEPARATOR).yellow());
    println!(
        "{} a batch proxy testing tool  {}",
        style("Proxy Vet:").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).green()
    );
    println!("{}", style(SEPARATOR).yellow());
}

pub fn print_separator() {
    println!("{}", style(SEPARATOR).yellow());
}

pub fn print_info(message: &str) {
    println!("{} {message}", style("[INFO]").cyan());
}

pub fn print_success(message: &str) {
    println!("{} {message}", style("[SUCCESS]").green());
}

pub fn print_warning(message: &str) {
    println!("{} {message}", style("[WARNING]").yellow());
}

pub fn print_error(message: &str) {
    eprintln!("{} {message}", style("[ERROR]").red());
}

/// Callers gate this on the run's verbose flag
pub fn print_debug(message: &str) {
    println!("{} {}", style("[DEBUG]").white(), style(message).dim());
}

/// Batch progress bar in the house style
pub fn progress_bar(len: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Some(pb_style) = PB_STYLE.as_ref() {
        pb.set_style(pb_style.clone());
    }
    pb.set_prefix(prefix.to_string());
    pb
}

/// One-line summary of a completed connectivity check
pub fn print_result(result: &TestResult, show_location: bool) {
    let status = match result.status {
        ProxyStatus::Working => style(format!("[{}]", result.status)).green(),
        ProxyStatus::Failed => style(format!("[{}]", result.status)).red(),
        ProxyStatus::Timeout => style(format!("[{}]", result.status)).yellow(),
    };
    println!("\n{} {} {}", style("[INFO]").cyan(), status, result.ip_display());
    if show_location {
        if let Some(location) = &result.location {
            println!("  Location: {}", style(location).green());
        }
    }
    println!("  Latency: {}", style(result.latency_display()).yellow());
    if let Some(error) = &result.error {
        println!("  Error: {}", style(error).dim());
    }
}

/// One-line summary of a completed speed test
pub fn print_speed_result(done: usize, total: usize, result: &TestResult) {
    print!(
        "{} [{done}/{total}] {} -> {}",
        style("[SPEED]").yellow(),
        result.ip_display(),
        style(result.speed_display()).green()
    );
    if let Some(location) = &result.location {
        print!("  ({location})");
    }
    println!();
}

pub fn print_summary_stats(total: usize, measured: usize, failed: usize, average_mbps: Option<f64>) {
    print_separator();
    println!("  Speed tests: {measured}/{total} measured, {failed} failed");
    if let Some(average) = average_mbps {
        println!("  Average speed: {}", style(format!("{average:.2} Mbps")).green());
    }
    print_separator();
}

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "#")]
    index: String,
    #[tabled(rename = "Type")]
    transport: String,
    #[tabled(rename = "IP Address")]
    ip: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Latency")]
    latency: String,
    #[tabled(rename = "Speed")]
    speed: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl ResultRow {
    fn from_result(result: &TestResult) -> Self {
        Self {
            index: (result.original_index + 1).to_string(),
            transport: result.transport.label().to_string(),
            ip: result.ip_display(),
            location: result.location_display(),
            latency: result.latency_display(),
            speed: result.speed_display(),
            status: result.status.to_string(),
        }
    }
}

/// Final result table in original input order; location and speed
/// columns appear only when those checks were requested
pub fn display_result_table(results: &[TestResult], show_location: bool, show_speed: bool) {
    if results.is_empty() {
        print_warning("No results to display.");
        return;
    }

    let rows: Vec<ResultRow> = results.iter().map(ResultRow::from_result).collect();
    let mut table = Table::new(rows);
    table.with(Style::modern());
    if !show_location {
        table.with(Remove::column(ByColumnName::new("Location")));
    }
    if !show_speed {
        table.with(Remove::column(ByColumnName::new("Speed")));
    }
    println!("{table}");
}

/// y/N prompt; anything but an explicit yes declines
pub fn confirm(prompt: &str) -> bool {
    let term = Term::stdout();
    if term.write_str(&format!("{prompt} [y/N]: ")).is_err() {
        return false;
    }
    match term.read_line() {
        Ok(answer) => answer.trim().eq_ignore_ascii_case("y"),
        Err(_) => false,
    }
}

/// Interactive transport choice when no flag was given
pub fn choose_transport() -> TransportType {
    let term = Term::stdout();
    let _ = term.write_str("Choose proxy type [http/socks]: ");
    match term.read_line() {
        Ok(answer) if answer.trim().to_lowercase().contains('s') => TransportType::Socks5,
        _ => TransportType::Http,
    }
}

/// Multi-line proxy entry, terminated by an empty line
pub fn read_proxy_lines() -> Vec<String> {
    println!("Enter proxies (one per line, then press Enter on an empty line to finish):");
    let term = Term::stdout();
    let mut lines = Vec::new();
    while let Ok(line) = term.read_line() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        lines.push(line.to_string());
    }
    if !lines.is_empty() {
        println!("Total proxies entered: {}", lines.len());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_result_row_is_one_based() {
        let result = TestResult::working(
            TransportType::Socks5,
            "203.0.113.7".to_string(),
            Duration::from_millis(142),
            0,
        );
        let row = ResultRow::from_result(&result);
        assert_eq!(row.index, "1");
        assert_eq!(row.transport, "SOCKS5");
        assert_eq!(row.ip, "203.0.113.7");
        assert_eq!(row.location, "N/A");
        assert_eq!(row.latency, "142ms");
        assert_eq!(row.speed, "N/A");
        assert_eq!(row.status, "Working");
    }

    #[test]
    fn test_result_row_failed() {
        let result = TestResult::failed(TransportType::Http, "connection refused".to_string(), 4);
        let row = ResultRow::from_result(&result);
        assert_eq!(row.index, "5");
        assert_eq!(row.ip, "N/A");
        assert_eq!(row.status, "Failed");
    }
}
