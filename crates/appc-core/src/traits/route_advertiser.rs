// # Route Advertiser Trait
//
// Defines the interface through which the engine publishes routes.
//
// ## Implementations
//
// - `appcd`: `LoggingRouteAdvertiser`, records and logs the advertised set
// - Future: netlink route programming, control-plane prefs updates
//
// ## Usage
//
// ```rust,ignore
// use appc_core::RouteAdvertiser;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let advertiser = /* RouteAdvertiser implementation */;
//
//     advertiser.advertise_route(&["192.0.2.0/24".parse()?]).await?;
//     advertiser.unadvertise_route(&["192.0.2.0/24".parse()?]).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use ipnet::IpNet;

/// Trait for route advertiser implementations
///
/// The advertiser owns the network side of the app connector: once the engine
/// decides a prefix must be reachable through this node, it asks the
/// advertiser to publish it.
///
/// # Idempotency
///
/// Both operations must be idempotent. Advertising a prefix that is already
/// advertised, or withdrawing one that is not, succeeds without effect. The
/// engine relies on this when it re-applies a full operator route set.
///
/// # Failure
///
/// A returned error means none of the requested changes can be assumed to
/// have happened. The engine logs the failure and keeps its cached state as
/// it was; it does not retry.
///
/// # Thread Safety
///
/// Calls are serialized by the engine's apply queue, but implementations
/// must still be `Send + Sync` so they can be shared with the worker task.
#[async_trait]
pub trait RouteAdvertiser: Send + Sync {
    /// Ensure each prefix is advertised, skipping any that already are
    async fn advertise_route(&self, routes: &[IpNet]) -> Result<(), crate::Error>;

    /// Remove the advertisement of each prefix, skipping any that are absent
    async fn unadvertise_route(&self, routes: &[IpNet]) -> Result<(), crate::Error>;
}
