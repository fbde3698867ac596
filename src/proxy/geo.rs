//! Geo lookup for proxy egress IPs via public lookup services

use crate::ui;
use crate::Result;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Primary lookup provider (free tier, 45 req/min)
const IP_API_URL: &str = "http://ip-api.com/json";

/// Fallback lookup provider
const IPWHO_URL: &str = "https://ipwho.is";

/// Per-request lookup timeout
const LOOKUP_TIMEOUT_SECS: u64 = 10;

/// Placeholder when no provider could resolve the IP
const UNKNOWN_LOCATION: &str = "N/A";

/// ip-api.com response body
#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    city: String,
    #[serde(rename = "regionName", default)]
    region_name: String,
    #[serde(default)]
    country: String,
}

/// ipwho.is response body
#[derive(Debug, Deserialize)]
struct IpWhoResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    country: String,
}

/// Resolver composing a "City, Region, Country" string for an IP.
///
/// Lookups go direct, not through the proxy under test; the egress IP is
/// already known at this point.
#[derive(Clone)]
pub struct GeoResolver {
    client: Client,
}

impl GeoResolver {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(LOOKUP_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    /// Resolve an IP to a location string, falling back across providers.
    ///
    /// Never fails past this boundary; both providers failing yields
    /// `"N/A"` and a printed warning.
    pub async fn resolve(&self, ip: &str) -> String {
        if ip.is_empty() {
            return UNKNOWN_LOCATION.to_string();
        }

        match self.lookup_ip_api(ip).await {
            Ok(Some(location)) => return location,
            Ok(None) => {}
            Err(e) => ui::print_warning(&format!("[GEO] ip-api.com lookup for {ip} failed: {e}")),
        }

        match self.lookup_ipwho(ip).await {
            Ok(Some(location)) => return location,
            Ok(None) => {}
            Err(e) => ui::print_warning(&format!("[GEO] ipwho.is lookup for {ip} failed: {e}")),
        }

        UNKNOWN_LOCATION.to_string()
    }

    async fn lookup_ip_api(&self, ip: &str) -> std::result::Result<Option<String>, String> {
        let url = format!("{IP_API_URL}/{ip}");
        let response = self.client.get(&url).send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP status: {}", response.status()));
        }
        let body: IpApiResponse = response.json().await.map_err(|e| e.to_string())?;
        if body.status != "success" {
            return Err(if body.message.is_empty() {
                "unknown error".to_string()
            } else {
                body.message
            });
        }
        Ok(compose_location(&body.city, &body.region_name, &body.country))
    }

    async fn lookup_ipwho(&self, ip: &str) -> std::result::Result<Option<String>, String> {
        let url = format!("{IPWHO_URL}/{ip}");
        let response = self.client.get(&url).send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP status: {}", response.status()));
        }
        let body: IpWhoResponse = response.json().await.map_err(|e| e.to_string())?;
        if !body.success {
            return Err(if body.message.is_empty() {
                "unknown error".to_string()
            } else {
                body.message
            });
        }
        Ok(compose_location(&body.city, &body.region, &body.country))
    }
}

/// Join the non-empty parts with ", "; all-empty composes to None
fn compose_location(city: &str, region: &str, country: &str) -> Option<String> {
    let parts: Vec<&str> = [city, region, country]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_location_full() {
        assert_eq!(
            compose_location("Ashburn", "Virginia", "United States"),
            Some("Ashburn, Virginia, United States".to_string())
        );
    }

    #[test]
    fn test_compose_location_partial() {
        assert_eq!(
            compose_location("", "Virginia", "United States"),
            Some("Virginia, United States".to_string())
        );
        assert_eq!(compose_location("", "", "Germany"), Some("Germany".to_string()));
    }

    #[test]
    fn test_compose_location_empty() {
        assert_eq!(compose_location("", "", ""), None);
    }

    #[test]
    fn test_ip_api_payload_success() {
        let body: IpApiResponse = serde_json::from_str(
            r#"{"status":"success","country":"United States","regionName":"Virginia","city":"Ashburn","query":"203.0.113.7"}"#,
        )
        .unwrap();
        assert_eq!(body.status, "success");
        assert_eq!(
            compose_location(&body.city, &body.region_name, &body.country),
            Some("Ashburn, Virginia, United States".to_string())
        );
    }

    #[test]
    fn test_ip_api_payload_failure() {
        let body: IpApiResponse = serde_json::from_str(
            r#"{"status":"fail","message":"private range","query":"192.168.0.1"}"#,
        )
        .unwrap();
        assert_eq!(body.status, "fail");
        assert_eq!(body.message, "private range");
        assert!(body.city.is_empty());
    }

    #[test]
    fn test_ipwho_payload_success() {
        let body: IpWhoResponse = serde_json::from_str(
            r#"{"success":true,"city":"Berlin","region":"Berlin","country":"Germany"}"#,
        )
        .unwrap();
        assert!(body.success);
        assert_eq!(
            compose_location(&body.city, &body.region, &body.country),
            Some("Berlin, Berlin, Germany".to_string())
        );
    }

    #[test]
    fn test_ipwho_payload_failure() {
        let body: IpWhoResponse =
            serde_json::from_str(r#"{"success":false,"message":"invalid IP address"}"#).unwrap();
        assert!(!body.success);
        assert_eq!(body.message, "invalid IP address");
    }
}
