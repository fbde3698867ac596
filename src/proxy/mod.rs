//! Proxy testing pipeline
//!
//! This module provides functionality for:
//! - Parsing authenticated proxy lines in both supported formats
//! - Concurrent connectivity checks with a curl fallback path
//! - Geo lookups and staged bandwidth measurement for working proxies
//! - Phase orchestration with retry and order-preserving aggregation

pub mod checker;
pub mod geo;
pub mod models;
pub mod parser;
pub mod pool;
pub mod runner;
pub mod speed;

pub use checker::{CheckerConfig, ConnectivityChecker};
pub use geo::GeoResolver;
pub use models::{BandwidthReading, ProxyEndpoint, ProxyStatus, TestResult, TransportType};
pub use parser::{ParseError, ProxyParser};
pub use pool::optimal_workers;
pub use runner::{reorder_results, TestRunner};
pub use speed::{SpeedConfig, SpeedTester};
