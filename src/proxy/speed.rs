//! Staged bandwidth measurement through the proxy under test
//!
//! Primary provider is a CDN byte-range endpoint, probed in two stages:
//! a fail-fast 1 MB pre-check, then a windowed full download. Slow or
//! dead proxies are cut off by the pre-check instead of burning the full
//! measurement budget. The fallback provider is the fast.com benchmark,
//! which does its own server selection before a timed transfer.

use crate::proxy::models::{BandwidthReading, ProxyEndpoint};
use crate::Result;
use reqwest::{Client, Proxy as ReqwestProxy, Response};
use serde::Deserialize;
use std::time::{Duration, Instant};

/// CDN byte-range endpoint; `?bytes=N` selects the sample size
const CLOUDFLARE_DOWN_URL: &str = "https://speed.cloudflare.com/__down";

/// fast.com bootstrap script carrying the API token
const FAST_JS_URL: &str = "https://fast.com/app-ed402d.js";

/// fast.com target-selection API
const FAST_API_URL: &str = "https://api.fast.com/netflix/speedtest/v2";

/// Browser-like UA; the CDN endpoints reject bare client strings
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// How many fast.com targets to sample
const FAST_TARGET_LIMIT: usize = 3;

/// Per-target transfer window for the fallback provider
const FAST_TARGET_WINDOW: Duration = Duration::from_secs(5);

/// Tunable measurement thresholds.
///
/// The sample sizes and windows are empirically chosen; they live here
/// as defaults rather than hard-coded constants so operators can adjust
/// them per deployment.
#[derive(Debug, Clone)]
pub struct SpeedConfig {
    /// Pre-check sample size in bytes
    pub precheck_bytes: u64,
    /// Minimum bytes the pre-check must deliver to unlock the full stage
    pub precheck_min_bytes: u64,
    /// Wall-clock cap for the pre-check
    pub precheck_window: Duration,
    /// Full-stage sample cap in bytes
    pub full_bytes: u64,
    /// Wall-clock window for the full stage
    pub full_window: Duration,
    /// Primary readings below this escalate to the fallback provider
    pub fallback_floor_mbps: f64,
    /// Readings at or below this are discarded as noise
    pub min_report_mbps: f64,
    /// Connect budget for measurement requests
    pub connect_timeout: Duration,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            precheck_bytes: 1_000_000,
            precheck_min_bytes: 500_000,
            precheck_window: Duration::from_secs(10),
            full_bytes: 100_000_000,
            full_window: Duration::from_secs(10),
            fallback_floor_mbps: 0.5,
            min_report_mbps: 0.1,
            connect_timeout: Duration::from_secs(15),
        }
    }
}

impl SpeedConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_precheck_bytes(mut self, bytes: u64) -> Self {
        self.precheck_bytes = bytes;
        self
    }

    pub fn with_precheck_min_bytes(mut self, bytes: u64) -> Self {
        self.precheck_min_bytes = bytes;
        self
    }

    pub fn with_precheck_window(mut self, window: Duration) -> Self {
        self.precheck_window = window;
        self
    }

    pub fn with_full_bytes(mut self, bytes: u64) -> Self {
        self.full_bytes = bytes;
        self
    }

    pub fn with_full_window(mut self, window: Duration) -> Self {
        self.full_window = window;
        self
    }

    pub fn with_fallback_floor(mut self, mbps: f64) -> Self {
        self.fallback_floor_mbps = mbps;
        self
    }
}

/// fast.com target list
#[derive(Debug, Deserialize)]
struct FastTargets {
    targets: Vec<FastTarget>,
}

#[derive(Debug, Deserialize)]
struct FastTarget {
    url: String,
}

/// Bandwidth tester running one proxy at a time.
///
/// Measurement is deliberately not concurrent; callers sequence proxies
/// so each one gets uncontended bandwidth.
#[derive(Clone)]
pub struct SpeedTester {
    config: SpeedConfig,
}

impl SpeedTester {
    pub fn new() -> Self {
        Self {
            config: SpeedConfig::default(),
        }
    }

    pub fn with_config(config: SpeedConfig) -> Self {
        Self { config }
    }

    /// Measure downstream bandwidth through the proxy.
    ///
    /// Escalates to the fallback provider when the primary yields nothing
    /// or a sub-floor value; both providers failing yields the `Error`
    /// sentinel.
    pub async fn measure(&self, endpoint: &ProxyEndpoint) -> BandwidthReading {
        let mut speed = self.cloudflare_speed(endpoint).await.ok().flatten();

        if speed.map_or(true, |s| s < self.config.fallback_floor_mbps) {
            speed = self.fastcom_speed(endpoint).await;
        }

        match speed {
            Some(s) if s > 0.0 => BandwidthReading::Mbps(round2(s)),
            _ => BandwidthReading::Error,
        }
    }

    /// Primary provider: staged CDN download
    async fn cloudflare_speed(
        &self,
        endpoint: &ProxyEndpoint,
    ) -> std::result::Result<Option<f64>, String> {
        let client = self
            .streaming_client(endpoint)
            .map_err(|e| format!("client setup failed: {e}"))?;

        // Stage A: fail-fast pre-check with a small sample
        let url = format!("{CLOUDFLARE_DOWN_URL}?bytes={}", self.config.precheck_bytes);
        let response = self
            .open_download(&client, &url)
            .await
            .map_err(|e| format!("pre-check request failed: {e}"))?;
        let (bytes, elapsed) = drain_for_window(response, self.config.precheck_window).await;

        if bytes < self.config.precheck_min_bytes || elapsed >= self.config.precheck_window {
            // Too slow to bother with the full stage; report the
            // provisional throughput if it is above the noise floor.
            let provisional = mbps(bytes, elapsed);
            if provisional > self.config.min_report_mbps {
                return Ok(Some(provisional));
            }
            return Ok(None);
        }

        // Stage B: full windowed measurement
        let url = format!("{CLOUDFLARE_DOWN_URL}?bytes={}", self.config.full_bytes);
        let response = self
            .open_download(&client, &url)
            .await
            .map_err(|e| format!("full measurement request failed: {e}"))?;
        let (bytes, elapsed) = drain_for_window(response, self.config.full_window).await;

        if bytes > 1024 * 1024 && elapsed > Duration::ZERO {
            Ok(Some(mbps(bytes, elapsed)))
        } else {
            Ok(None)
        }
    }

    /// Fallback provider: fast.com handshake plus timed transfer
    async fn fastcom_speed(&self, endpoint: &ProxyEndpoint) -> Option<f64> {
        let client = self.streaming_client(endpoint).ok()?;

        let script = client
            .get(FAST_JS_URL)
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?
            .text()
            .await
            .ok()?;
        let token = extract_fast_token(&script)?;

        let api_url = format!("{FAST_API_URL}?https=true&token={token}&urlCount=5");
        let targets: FastTargets = client
            .get(&api_url)
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?
            .json()
            .await
            .ok()?;

        let mut total_bytes = 0u64;
        let start = Instant::now();
        for target in targets.targets.iter().take(FAST_TARGET_LIMIT) {
            let Ok(response) = self.open_download(&client, &target.url).await else {
                continue;
            };
            let (bytes, _) = drain_for_window(response, FAST_TARGET_WINDOW).await;
            total_bytes += bytes;
        }

        let speed = mbps(total_bytes, start.elapsed());
        if speed > self.config.min_report_mbps {
            Some(speed)
        } else {
            None
        }
    }

    async fn open_download(&self, client: &Client, url: &str) -> Result<Response> {
        let response = client
            .get(url)
            .header("Accept", "*/*")
            .header("Accept-Encoding", "identity")
            .send()
            .await?
            .error_for_status()?;
        Ok(response)
    }

    /// Client for streamed downloads: connect budget only, the transfer
    /// itself is bounded by the measurement window
    fn streaming_client(&self, endpoint: &ProxyEndpoint) -> Result<Client> {
        let proxy = ReqwestProxy::all(endpoint.url())?;
        let client = Client::builder()
            .proxy(proxy)
            .connect_timeout(self.config.connect_timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(client)
    }
}

impl Default for SpeedTester {
    fn default() -> Self {
        Self::new()
    }
}

/// Read body chunks until the window closes or the body ends.
///
/// Returns bytes received and actual elapsed time. A chunk that stalls
/// past the remaining window is abandoned.
async fn drain_for_window(mut response: Response, window: Duration) -> (u64, Duration) {
    let start = Instant::now();
    let mut downloaded = 0u64;

    loop {
        let elapsed = start.elapsed();
        let Some(remaining) = window.checked_sub(elapsed) else {
            break;
        };
        match tokio::time::timeout(remaining, response.chunk()).await {
            Ok(Ok(Some(chunk))) => downloaded += chunk.len() as u64,
            // body complete, read error, or window closed mid-chunk
            _ => break,
        }
    }

    (downloaded, start.elapsed())
}

/// Throughput in megabits per second
fn mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / (secs * 1_000_000.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Pull the session token out of the fast.com bootstrap script
fn extract_fast_token(script: &str) -> Option<String> {
    let start = script.find("token:\"")? + "token:\"".len();
    let end = script[start..].find('"')? + start;
    let token = &script[start..end];
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_config_defaults() {
        let config = SpeedConfig::default();
        assert_eq!(config.precheck_bytes, 1_000_000);
        assert_eq!(config.precheck_min_bytes, 500_000);
        assert_eq!(config.precheck_window, Duration::from_secs(10));
        assert_eq!(config.full_bytes, 100_000_000);
        assert_eq!(config.full_window, Duration::from_secs(10));
        assert_eq!(config.fallback_floor_mbps, 0.5);
        assert_eq!(config.min_report_mbps, 0.1);
    }

    #[test]
    fn test_speed_config_builder() {
        let config = SpeedConfig::new()
            .with_precheck_bytes(2_000_000)
            .with_precheck_min_bytes(1_000_000)
            .with_precheck_window(Duration::from_secs(5))
            .with_full_bytes(50_000_000)
            .with_full_window(Duration::from_secs(20))
            .with_fallback_floor(1.0);

        assert_eq!(config.precheck_bytes, 2_000_000);
        assert_eq!(config.precheck_min_bytes, 1_000_000);
        assert_eq!(config.precheck_window, Duration::from_secs(5));
        assert_eq!(config.full_bytes, 50_000_000);
        assert_eq!(config.full_window, Duration::from_secs(20));
        assert_eq!(config.fallback_floor_mbps, 1.0);
    }

    #[test]
    fn test_mbps_math() {
        // 1 MB in 1 s = 8 Mbit/s
        assert_eq!(mbps(1_000_000, Duration::from_secs(1)), 8.0);
        // 500 KB in 10 s = 0.4 Mbit/s
        assert_eq!(mbps(500_000, Duration::from_secs(10)), 0.4);
        assert_eq!(mbps(1_000_000, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(54.8791), 54.88);
        assert_eq!(round2(0.444), 0.44);
        assert_eq!(round2(10.0), 10.0);
    }

    #[test]
    fn test_extract_fast_token() {
        let script = r#"var config={endpoint:"api.fast.com",token:"YXNkZmFzZGxmbnNkYWZoYXNkZmhrYWxm",urlCount:5}"#;
        assert_eq!(
            extract_fast_token(script),
            Some("YXNkZmFzZGxmbnNkYWZoYXNkZmhrYWxm".to_string())
        );
        assert_eq!(extract_fast_token("no token here"), None);
        assert_eq!(extract_fast_token(r#"token:"""#), None);
    }

    #[test]
    fn test_fast_targets_payload() {
        let body: FastTargets = serde_json::from_str(
            r#"{"client":{"ip":"203.0.113.7"},"targets":[{"url":"https://ipv4-c001.example.net/speedtest","location":{"city":"X","country":"Y"}},{"url":"https://ipv4-c002.example.net/speedtest","location":{"city":"X","country":"Y"}}]}"#,
        )
        .unwrap();
        assert_eq!(body.targets.len(), 2);
        assert!(body.targets[0].url.starts_with("https://ipv4-c001"));
    }
}
