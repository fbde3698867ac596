//! Proxy Vet - batch proxy tester
//!
//! Validates a batch of authenticated proxies for reachability, then
//! optionally resolves the egress location and measures downstream
//! bandwidth for the working ones.

pub mod output;
pub mod proxy;
pub mod shutdown;
pub mod ui;

pub use proxy::*;

use crate::proxy::models::TransportType;
use crate::shutdown::Shutdown;

/// Application result type
pub type Result<T> = anyhow::Result<T>;

/// Configuration and cancellation handle for one run, threaded through
/// every component instead of living in module-level globals.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Transport for the whole batch
    pub transport: TransportType,
    /// Resolve egress locations for working proxies
    pub geo_lookup: bool,
    /// Measure downstream bandwidth for working proxies
    pub speed_test: bool,
    /// Emit [DEBUG] output
    pub verbose: bool,
    /// Result file to write, if any
    pub output_path: Option<String>,
    /// Cooperative cancellation handle
    pub shutdown: Shutdown,
}
