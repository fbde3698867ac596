//! Connectivity checker with a primary client path and a curl fallback

use crate::proxy::models::{ProxyEndpoint, TestResult, TransportType};
use crate::Result;
use reqwest::{Client, Proxy as ReqwestProxy};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Default "what is my IP" endpoint returning `{"ip": "..."}`
const DEFAULT_TEST_URL: &str = "https://api.ipify.org?format=json";

/// Timeout for the primary HTTP-transport check
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

/// Timeout for the SOCKS5-transport check (primary path only)
const DEFAULT_SOCKS_TIMEOUT_SECS: u64 = 10;

/// Overall budget for the curl fallback
const DEFAULT_CURL_MAX_TIME_SECS: u64 = 20;

/// Connect budget for the curl fallback
const DEFAULT_CURL_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Body of the IP echo endpoint
#[derive(Debug, Deserialize)]
struct IpResponse {
    ip: String,
}

/// Configuration for connectivity checks
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// URL the proxy is tested against
    pub test_url: String,
    /// Timeout for the primary check over HTTP transport
    pub http_timeout: Duration,
    /// Timeout for the SOCKS5 check
    pub socks_timeout: Duration,
    /// Total wall-clock budget for the curl fallback
    pub curl_max_time: Duration,
    /// Connect budget for the curl fallback
    pub curl_connect_timeout: Duration,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            test_url: DEFAULT_TEST_URL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            socks_timeout: Duration::from_secs(DEFAULT_SOCKS_TIMEOUT_SECS),
            curl_max_time: Duration::from_secs(DEFAULT_CURL_MAX_TIME_SECS),
            curl_connect_timeout: Duration::from_secs(DEFAULT_CURL_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_test_url(mut self, url: String) -> Self {
        self.test_url = url;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_socks_timeout(mut self, timeout: Duration) -> Self {
        self.socks_timeout = timeout;
        self
    }

    pub fn with_curl_max_time(mut self, timeout: Duration) -> Self {
        self.curl_max_time = timeout;
        self
    }
}

/// Connectivity checker for validating proxies.
///
/// A failing proxy never escapes as an error; every outcome is folded
/// into a `TestResult`.
#[derive(Clone)]
pub struct ConnectivityChecker {
    config: CheckerConfig,
}

impl ConnectivityChecker {
    pub fn new() -> Self {
        Self {
            config: CheckerConfig::default(),
        }
    }

    pub fn with_config(config: CheckerConfig) -> Self {
        Self { config }
    }

    /// Check a single proxy, producing the result for slot `original_index`
    pub async fn check(&self, endpoint: &ProxyEndpoint, original_index: usize) -> TestResult {
        match endpoint.transport {
            TransportType::Http => self.check_http(endpoint, original_index).await,
            TransportType::Socks5 => self.check_socks(endpoint, original_index).await,
        }
    }

    /// HTTP transport: reqwest primary, curl fallback.
    ///
    /// curl tolerates some proxy-auth handshakes the client library does
    /// not, so any primary failure is retried through it with a longer
    /// budget before the proxy is marked Failed.
    async fn check_http(&self, endpoint: &ProxyEndpoint, original_index: usize) -> TestResult {
        let primary_err = match self.primary_check(endpoint, self.config.http_timeout).await {
            Ok((ip, latency)) => {
                return TestResult::working(endpoint.transport, ip, latency, original_index)
            }
            Err(e) => e,
        };

        match self.curl_check(endpoint).await {
            Ok((ip, latency)) => TestResult::working(endpoint.transport, ip, latency, original_index),
            Err(curl_err) => TestResult::failed(
                endpoint.transport,
                format!("{primary_err}; curl fallback: {curl_err}"),
                original_index,
            ),
        }
    }

    /// SOCKS5 transport: primary path only, no process fallback
    async fn check_socks(&self, endpoint: &ProxyEndpoint, original_index: usize) -> TestResult {
        let start = Instant::now();
        match tokio::time::timeout(
            self.config.socks_timeout,
            self.primary_check(endpoint, self.config.socks_timeout),
        )
        .await
        {
            Ok(Ok((ip, latency))) => {
                TestResult::working(endpoint.transport, ip, latency, original_index)
            }
            Ok(Err(e)) => {
                // reqwest reports its own elapsed timeout as an error
                if start.elapsed() >= self.config.socks_timeout {
                    TestResult::timeout(endpoint.transport, original_index)
                } else {
                    TestResult::failed(endpoint.transport, e, original_index)
                }
            }
            Err(_) => TestResult::timeout(endpoint.transport, original_index),
        }
    }

    /// Issue the IP echo request through the proxy with the client library
    async fn primary_check(
        &self,
        endpoint: &ProxyEndpoint,
        timeout: Duration,
    ) -> std::result::Result<(String, Duration), String> {
        let client = self
            .create_client(endpoint, timeout)
            .map_err(|e| format!("client setup failed: {e}"))?;

        let start = Instant::now();
        let response = client
            .get(&self.config.test_url)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        let latency = start.elapsed();

        if !response.status().is_success() {
            return Err(format!("HTTP status: {}", response.status()));
        }

        let body: IpResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid JSON response: {e}"))?;

        Ok((body.ip, latency))
    }

    /// Fallback: shell out to curl against the same endpoint
    async fn curl_check(
        &self,
        endpoint: &ProxyEndpoint,
    ) -> std::result::Result<(String, Duration), String> {
        let start = Instant::now();
        let output = Command::new("curl")
            .arg("-x")
            .arg(endpoint.url())
            .arg(&self.config.test_url)
            .arg("--max-time")
            .arg(self.config.curl_max_time.as_secs().to_string())
            .arg("--connect-timeout")
            .arg(self.config.curl_connect_timeout.as_secs().to_string())
            .arg("--silent")
            .arg("--show-error")
            .output()
            .await
            .map_err(|e| format!("failed to spawn curl: {e}"))?;
        let latency = start.elapsed();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("curl exited with {}: {}", output.status, stderr.trim()));
        }

        let body = String::from_utf8_lossy(&output.stdout);
        let parsed: IpResponse = serde_json::from_str(body.trim())
            .map_err(|_| format!("invalid JSON response: {}", body.trim()))?;

        Ok((parsed.ip, latency))
    }

    /// Build a reqwest client tunneling through the proxy
    fn create_client(&self, endpoint: &ProxyEndpoint, timeout: Duration) -> Result<Client> {
        let proxy = ReqwestProxy::all(endpoint.url())?;
        let client = Client::builder().proxy(proxy).timeout(timeout).build()?;
        Ok(client)
    }
}

impl Default for ConnectivityChecker {
    fn default() -> Self {
        Self::new()
    }
}
