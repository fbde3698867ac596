//! Phase orchestration: connectivity, additional checks, retry
//!
//! Connectivity and geo lookups fan out over sized worker pools; speed
//! tests run strictly one proxy at a time so each measurement gets
//! uncontended bandwidth. Results are collected in completion order but
//! always land in their positional slot, keyed by original index.

use crate::proxy::checker::ConnectivityChecker;
use crate::proxy::geo::GeoResolver;
use crate::proxy::models::{BandwidthReading, ProxyEndpoint, TestResult, TransportType};
use crate::proxy::pool::{optimal_workers, BASE_WORKERS, MAX_CONNECTIVITY_WORKERS, MAX_GEO_WORKERS};
use crate::proxy::speed::SpeedTester;
use crate::ui;
use crate::{Result, RunContext};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::time::Duration;

/// Pause between consecutive speed tests, to stay under CDN rate limits
const SPEED_TEST_PAUSE: Duration = Duration::from_millis(500);

/// Drives the test phases over one batch of endpoints
pub struct TestRunner {
    checker: ConnectivityChecker,
    geo: GeoResolver,
    speed: SpeedTester,
    ctx: RunContext,
}

impl TestRunner {
    pub fn new(ctx: RunContext) -> Result<Self> {
        Ok(Self {
            checker: ConnectivityChecker::new(),
            geo: GeoResolver::new()?,
            speed: SpeedTester::new(),
            ctx,
        })
    }

    pub fn with_probes(
        ctx: RunContext,
        checker: ConnectivityChecker,
        geo: GeoResolver,
        speed: SpeedTester,
    ) -> Self {
        Self {
            checker,
            geo,
            speed,
            ctx,
        }
    }

    /// Phase 1: fast connectivity check over the whole batch.
    ///
    /// Returns one result per endpoint, in input order.
    pub async fn connectivity_phase(&self, endpoints: &[ProxyEndpoint]) -> Vec<TestResult> {
        ui::print_separator();
        ui::print_info(&format!(
            "Starting initial connectivity check for {} proxies...",
            endpoints.len()
        ));

        let batch: Vec<(usize, ProxyEndpoint)> =
            endpoints.iter().cloned().enumerate().collect();
        let results = self.check_batch(batch).await;

        let working = results.iter().filter(|r| r.is_working()).count();
        println!();
        ui::print_success(&format!(
            "Initial check complete! {}/{} proxies working",
            working,
            results.len()
        ));
        ui::print_separator();
        results
    }

    /// Dispatch connectivity checks for an index-tagged batch.
    ///
    /// Each entry keeps its original index; the returned vector has the
    /// same length and order as the batch regardless of completion order.
    /// A panicked worker, or cancellation mid-phase, fills the slot with
    /// a synthesized Failed result instead of losing it.
    async fn check_batch(&self, batch: Vec<(usize, ProxyEndpoint)>) -> Vec<TestResult> {
        let workers = optimal_workers(batch.len(), BASE_WORKERS, MAX_CONNECTIVITY_WORKERS);
        if self.ctx.verbose {
            ui::print_debug(&format!(
                "Thread calculation: {} proxies -> {} workers",
                batch.len(),
                workers
            ));
            ui::print_debug(&format!("Test function: {}", self.ctx.transport.label()));
        }

        // slot metadata survives the batch being consumed by the stream
        let slot_meta: Vec<(usize, TransportType)> =
            batch.iter().map(|(idx, ep)| (*idx, ep.transport)).collect();
        let positions: HashMap<usize, usize> = batch
            .iter()
            .enumerate()
            .map(|(pos, (idx, _))| (*idx, pos))
            .collect();

        let pb = ui::progress_bar(batch.len() as u64, "Testing proxies");
        let mut slots: Vec<Option<TestResult>> = (0..batch.len()).map(|_| None).collect();

        let mut completions = stream::iter(batch)
            .map(|(idx, endpoint)| {
                let checker = self.checker.clone();
                let transport = endpoint.transport;
                let raw = endpoint.raw.clone();
                async move {
                    let handle =
                        tokio::spawn(async move { checker.check(&endpoint, idx).await });
                    match handle.await {
                        Ok(result) => result,
                        Err(e) => TestResult::failed(
                            transport,
                            format!("worker task failed for {raw}: {e}"),
                            idx,
                        ),
                    }
                }
            })
            .buffer_unordered(workers);

        loop {
            tokio::select! {
                _ = self.ctx.shutdown.cancelled() => break,
                completed = completions.next() => {
                    let Some(result) = completed else { break };
                    pb.suspend(|| ui::print_result(&result, false));
                    if let Some(&pos) = positions.get(&result.original_index) {
                        slots[pos] = Some(result);
                    }
                    pb.inc(1);
                    if self.ctx.shutdown.is_cancelled() {
                        break;
                    }
                }
            }
        }
        drop(completions);
        pb.finish_and_clear();

        slots
            .into_iter()
            .enumerate()
            .map(|(pos, slot)| {
                slot.unwrap_or_else(|| {
                    let (idx, transport) = slot_meta[pos];
                    TestResult::failed(transport, "aborted before completion".to_string(), idx)
                })
            })
            .collect()
    }

    /// Phase 2: geo lookups (concurrent) and speed tests (sequential)
    /// over working endpoints whose request flags are set.
    pub async fn additional_checks(
        &self,
        endpoints: &[ProxyEndpoint],
        results: &mut [TestResult],
    ) {
        let working: Vec<usize> = results
            .iter()
            .filter(|r| r.is_working())
            .map(|r| r.original_index)
            .collect();
        if working.is_empty() {
            return;
        }

        self.geo_lookups(endpoints, results, &working).await;
        if self.ctx.shutdown.is_cancelled() {
            return;
        }
        self.speed_tests(endpoints, results, &working).await;
    }

    async fn geo_lookups(
        &self,
        endpoints: &[ProxyEndpoint],
        results: &mut [TestResult],
        working: &[usize],
    ) {
        let jobs: Vec<(usize, String)> = working
            .iter()
            .filter(|&&i| endpoints[i].geo_requested)
            .filter_map(|&i| results[i].ip.clone().map(|ip| (i, ip)))
            .collect();
        if jobs.is_empty() {
            return;
        }

        let workers = optimal_workers(jobs.len(), BASE_WORKERS, MAX_GEO_WORKERS);
        ui::print_separator();
        ui::print_info(&format!("Starting Geo-IP lookups for {} proxies...", jobs.len()));
        if self.ctx.verbose {
            ui::print_debug(&format!(
                "Geo-IP threads: {} proxies -> {} workers",
                jobs.len(),
                workers
            ));
        }

        let pb = ui::progress_bar(jobs.len() as u64, "Geo-IP lookups");
        let mut lookups = stream::iter(jobs)
            .map(|(idx, ip)| {
                let geo = self.geo.clone();
                async move { (idx, geo.resolve(&ip).await) }
            })
            .buffer_unordered(workers);

        loop {
            tokio::select! {
                _ = self.ctx.shutdown.cancelled() => break,
                completed = lookups.next() => {
                    let Some((idx, location)) = completed else { break };
                    if let Some(result) = results.iter_mut().find(|r| r.original_index == idx) {
                        result.location = Some(location);
                    }
                    pb.inc(1);
                    if self.ctx.shutdown.is_cancelled() {
                        break;
                    }
                }
            }
        }
        drop(lookups);
        pb.finish_and_clear();

        println!();
        ui::print_success("Geo-IP lookups completed");
        ui::print_separator();
    }

    /// Sequential by design: concurrent measurements would contend for
    /// bandwidth and trip CDN throttling, skewing comparative numbers.
    async fn speed_tests(
        &self,
        endpoints: &[ProxyEndpoint],
        results: &mut [TestResult],
        working: &[usize],
    ) {
        let targets: Vec<usize> = working
            .iter()
            .filter(|&&i| endpoints[i].speed_requested)
            .copied()
            .collect();
        if targets.is_empty() {
            return;
        }

        let total = targets.len();
        ui::print_separator();
        ui::print_info(&format!("Starting sequential speed tests for {total} proxies..."));

        let pb = ui::progress_bar(total as u64, "Speed testing");
        let mut speeds: Vec<f64> = Vec::new();

        for (done, &idx) in targets.iter().enumerate() {
            if self.ctx.shutdown.is_cancelled() {
                break;
            }

            let reading = self.speed.measure(&endpoints[idx]).await;
            if let BandwidthReading::Mbps(v) = reading {
                speeds.push(v);
            }
            if let Some(result) = results.iter_mut().find(|r| r.original_index == idx) {
                result.speed = Some(reading);
                pb.suspend(|| ui::print_speed_result(done + 1, total, result));
            }
            pb.inc(1);

            if done + 1 < total {
                tokio::time::sleep(SPEED_TEST_PAUSE).await;
            }
        }
        pb.finish_and_clear();

        let measured = speeds.len();
        let average = if speeds.is_empty() {
            None
        } else {
            Some(speeds.iter().sum::<f64>() / speeds.len() as f64)
        };
        println!();
        ui::print_summary_stats(total, measured, total - measured, average);
        ui::print_success("Speed tests completed");
        ui::print_separator();
    }

    /// Retry phase: re-run the connectivity check over the currently
    /// Failed/Timeout slots only. Each retried slot is wholesale-replaced;
    /// the result count never changes.
    pub async fn retry_failed(
        &self,
        endpoints: &[ProxyEndpoint],
        results: &mut [TestResult],
    ) {
        let batch: Vec<(usize, ProxyEndpoint)> = results
            .iter()
            .filter(|r| r.needs_retry())
            .map(|r| (r.original_index, endpoints[r.original_index].clone()))
            .collect();
        if batch.is_empty() {
            return;
        }

        ui::print_info(&format!("Retrying {} failed proxies...", batch.len()));
        let retried = self.check_batch(batch).await;
        apply_retry(results, retried);
    }
}

/// Replace each retried slot in the full result set, matched by
/// original index; untouched slots keep their previous result.
fn apply_retry(results: &mut [TestResult], retried: Vec<TestResult>) {
    for retry in retried {
        if let Some(slot) = results
            .iter_mut()
            .find(|r| r.original_index == retry.original_index)
        {
            *slot = retry;
        }
    }
}

/// Reindex results to original input order before display or persistence
pub fn reorder_results(results: &mut [TestResult]) {
    results.sort_unstable_by_key(|r| r.original_index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::{ProxyStatus, TransportType};
    use crate::shutdown::Shutdown;
    use std::time::Duration;

    fn endpoint(host: &str, index: usize) -> ProxyEndpoint {
        ProxyEndpoint::new(
            host.to_string(),
            8080,
            "user".to_string(),
            "pass".to_string(),
            TransportType::Http,
            format!("{host}:8080:user:pass#{index}"),
        )
    }

    fn working_result(index: usize) -> TestResult {
        TestResult::working(
            TransportType::Http,
            format!("203.0.113.{index}"),
            Duration::from_millis(100),
            index,
        )
    }

    fn test_ctx(shutdown: Shutdown) -> RunContext {
        RunContext {
            transport: TransportType::Http,
            geo_lookup: false,
            speed_test: false,
            verbose: false,
            output_path: None,
            shutdown,
        }
    }

    #[test]
    fn test_apply_retry_replaces_only_matching_slots() {
        let mut results = vec![
            working_result(0),
            TestResult::failed(TransportType::Http, "refused".to_string(), 1),
            TestResult::timeout(TransportType::Http, 2),
        ];
        let retried = vec![working_result(1), TestResult::timeout(TransportType::Http, 2)];

        apply_retry(&mut results, retried);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].status, ProxyStatus::Working);
        assert_eq!(results[1].status, ProxyStatus::Working);
        assert_eq!(results[1].original_index, 1);
        assert_eq!(results[2].status, ProxyStatus::Timeout);
    }

    #[test]
    fn test_apply_retry_keeps_new_failure() {
        let mut results = vec![
            working_result(0),
            TestResult::failed(TransportType::Http, "refused".to_string(), 1),
        ];
        let retried = vec![TestResult::failed(
            TransportType::Http,
            "still refused".to_string(),
            1,
        )];

        apply_retry(&mut results, retried);

        assert_eq!(results[1].status, ProxyStatus::Failed);
        assert_eq!(results[1].error.as_deref(), Some("still refused"));
    }

    #[test]
    fn test_reorder_results() {
        let mut results = vec![working_result(2), working_result(0), working_result(1)];
        reorder_results(&mut results);
        let indices: Vec<usize> = results.iter().map(|r| r.original_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_cancelled_batch_keeps_every_slot() {
        let shutdown = Shutdown::new();
        shutdown.cancel();
        let runner = TestRunner::new(test_ctx(shutdown)).unwrap();

        let endpoints: Vec<ProxyEndpoint> =
            (0..3).map(|i| endpoint("10.255.255.1", i)).collect();
        let results = runner.connectivity_phase(&endpoints).await;

        assert_eq!(results.len(), endpoints.len());
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.original_index, i);
            assert_eq!(result.status, ProxyStatus::Failed);
        }
    }

    #[tokio::test]
    async fn test_empty_batch_yields_no_results() {
        let runner = TestRunner::new(test_ctx(Shutdown::new())).unwrap();
        let results = runner.connectivity_phase(&[]).await;
        assert!(results.is_empty());
    }
}
