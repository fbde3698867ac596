use anyhow::{bail, Result};
use clap::Parser;
use proxy_vet::{
    output,
    proxy::{reorder_results, ProxyParser, TestRunner, TransportType},
    shutdown::Shutdown,
    ui, RunContext,
};
use std::path::Path;

/// A batch proxy tester with concurrent connectivity, geo and speed checks
#[derive(Parser)]
#[command(name = "proxy-vet")]
#[command(about = "A batch proxy tester with concurrent connectivity, geo and speed checks")]
struct Cli {
    /// Single proxy or path to a .txt proxy list file
    proxy: Option<String>,

    /// Use HTTP proxying for the whole batch
    #[arg(long, conflicts_with = "socks")]
    http: bool,

    /// Use SOCKS5 proxying for the whole batch
    #[arg(long)]
    socks: bool,

    /// Resolve the egress location of each working proxy
    #[arg(long)]
    geo: bool,

    /// Measure downstream bandwidth of each working proxy
    #[arg(long = "speed-test")]
    speed_test: bool,

    /// Output file path - the extension selects the format (.txt default, .csv available)
    #[arg(short, long)]
    output: Option<String>,

    /// Enable verbose debug output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    ui::print_banner();

    let transport = if cli.socks {
        TransportType::Socks5
    } else if cli.http {
        TransportType::Http
    } else {
        ui::choose_transport()
    };

    let shutdown = Shutdown::new();
    shutdown.install_ctrl_c_handler();

    let ctx = RunContext {
        transport,
        geo_lookup: cli.geo,
        speed_test: cli.speed_test,
        verbose: cli.verbose,
        output_path: cli.output.clone(),
        shutdown,
    };

    if ctx.verbose {
        ui::print_info("Verbose mode enabled - showing detailed debug information");
        ui::print_debug(&format!(
            "Configuration: type={transport}, geo={}, speed={}",
            ctx.geo_lookup, ctx.speed_test
        ));
        ui::print_debug(&format!(
            "Output file: {}",
            ctx.output_path.as_deref().unwrap_or("none specified")
        ));
    }

    let raw_lines: Vec<String> = match &cli.proxy {
        Some(input) if input.ends_with(".txt") => {
            if !Path::new(input).exists() {
                bail!("Proxy file not found: {input}");
            }
            let lines = ProxyParser::load_lines(input)?;
            ui::print_info(&format!("Loaded {} proxies from {input}", lines.len()));
            lines
        }
        Some(input) => vec![input.clone()],
        None => ui::read_proxy_lines(),
    };
    if raw_lines.is_empty() {
        bail!("No proxies found to test");
    }

    let mut endpoints = Vec::new();
    for (line_number, line) in raw_lines.iter().enumerate() {
        match ProxyParser::parse_line(line, transport) {
            Ok(endpoint) => endpoints.push(endpoint),
            Err(e) => ui::print_warning(&format!(
                "Skipping invalid proxy line {}: {line} - {e}",
                line_number + 1
            )),
        }
    }
    if endpoints.is_empty() {
        bail!("No valid proxies found after parsing");
    }
    ui::print_info(&format!("Successfully parsed {} valid proxies", endpoints.len()));

    let runner = TestRunner::new(ctx.clone())?;

    // Phase 1: connectivity
    let mut results = runner.connectivity_phase(&endpoints).await;
    if interrupted(&ctx) {
        return Ok(());
    }

    // Phase 2: optional geo / speed checks over working proxies
    if !results.iter().any(|r| r.is_working()) {
        ui::print_warning("No working proxies found - skipping additional checks");
    } else if ctx.geo_lookup || ctx.speed_test {
        for result in results.iter().filter(|r| r.is_working()) {
            let endpoint = &mut endpoints[result.original_index];
            endpoint.geo_requested = ctx.geo_lookup;
            endpoint.speed_requested = ctx.speed_test;
        }
        runner.additional_checks(&endpoints, &mut results).await;
        if interrupted(&ctx) {
            return Ok(());
        }
    }

    reorder_results(&mut results);
    ui::print_separator();
    ui::print_info("Displaying final results...");
    ui::display_result_table(&results, ctx.geo_lookup, ctx.speed_test);

    // Opt-in retry of the failed subset
    let failed_count = results.iter().filter(|r| r.needs_retry()).count();
    if failed_count > 0 {
        ui::print_separator();
        if ui::confirm(&format!(
            "Would you like to test {failed_count} failed proxies again?"
        )) {
            ui::print_separator();
            runner.retry_failed(&endpoints, &mut results).await;
            if interrupted(&ctx) {
                return Ok(());
            }
            reorder_results(&mut results);
            ui::print_separator();
            ui::print_info("Displaying updated results after retry...");
            ui::display_result_table(&results, ctx.geo_lookup, ctx.speed_test);
        }
    }

    if let Some(path) = &ctx.output_path {
        if results.is_empty() {
            ui::print_warning("No results to save to file");
        } else {
            match output::save_results(&results, path) {
                Ok(written) => {
                    ui::print_success(&format!("Results saved to: {}", written.display()))
                }
                Err(e) => ui::print_error(&format!("Failed to save results: {e}")),
            }
        }
    }
    ui::print_separator();

    Ok(())
}

/// On interruption the run stops where it is; partial results are
/// deliberately never persisted.
fn interrupted(ctx: &RunContext) -> bool {
    if ctx.shutdown.is_cancelled() {
        ui::print_separator();
        ui::print_info("Process interrupted by user");
        ui::print_info("No partial results were saved");
        ui::print_separator();
        return true;
    }
    false
}
