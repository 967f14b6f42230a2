// # Route Info Store Trait
//
// Defines the interface for durable route bookkeeping.
//
// ## Purpose
//
// The store gives the engine crash-restart continuity by keeping:
// - The operator (control) route set that was last applied
// - For each domain, which discovered single-address routes exist and when
//   each was last seen in a DNS answer
//
// Every mutating engine operation reads the snapshot at its start and writes
// the full snapshot back at its end.
//
// ## Implementations
//
// - Memory: `MemoryRouteInfoStore`
// - File: `FileRouteInfoStore` (JSON, atomic writes, backup recovery)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Discovered routes for one domain, each stamped with when it was last seen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedRoutes {
    /// Single-address prefix -> last time it appeared in a DNS answer
    #[serde(default)]
    pub routes: BTreeMap<IpNet, DateTime<Utc>>,

    /// Last time stale routes were collected for this domain
    #[serde(default)]
    pub last_cleanup: Option<DateTime<Utc>>,
}

/// Durable snapshot of the engine's route bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    /// Operator route set last applied successfully
    #[serde(default)]
    pub control: Vec<IpNet>,

    /// Domain -> discovered-route record
    #[serde(default)]
    pub discovered: HashMap<String, DatedRoutes>,
}

impl RouteInfo {
    /// Stamp `routes` as seen at `now` for `domain`, creating the record if needed
    pub fn refresh_domain(&mut self, domain: &str, routes: &[IpNet], now: DateTime<Utc>) {
        let record = self.discovered.entry(domain.to_string()).or_default();
        for route in routes {
            record.routes.insert(*route, now);
        }
    }

    /// Remove and return the stale routes of `domain`
    ///
    /// A route is stale when it is not in `fresh`, belongs to an address
    /// family `fresh` carries, and was last seen at least `stale_after` ago.
    /// With a zero `stale_after` every such route missing from `fresh` is
    /// stale. Nothing is collected until `cleanup_interval` has passed since
    /// the record's last cleanup.
    pub fn take_stale_routes(
        &mut self,
        domain: &str,
        fresh: &[IpNet],
        now: DateTime<Utc>,
        stale_after: chrono::Duration,
        cleanup_interval: chrono::Duration,
    ) -> Vec<IpNet> {
        let Some(record) = self.discovered.get_mut(domain) else {
            return Vec::new();
        };

        if let Some(last) = record.last_cleanup {
            if now.signed_duration_since(last) < cleanup_interval {
                return Vec::new();
            }
        }

        // An A answer says nothing about a domain's IPv6 routes and vice versa.
        let has_v4 = fresh.iter().any(|route| matches!(route, IpNet::V4(_)));
        let has_v6 = fresh.iter().any(|route| matches!(route, IpNet::V6(_)));

        let stale: Vec<IpNet> = record
            .routes
            .iter()
            .filter(|(route, seen)| {
                let family_seen = match route {
                    IpNet::V4(_) => has_v4,
                    IpNet::V6(_) => has_v6,
                };
                family_seen
                    && !fresh.contains(*route)
                    && now.signed_duration_since(**seen) >= stale_after
            })
            .map(|(route, _)| *route)
            .collect();

        for route in &stale {
            record.routes.remove(route);
        }
        record.last_cleanup = Some(now);

        stale
    }

    /// Routes currently recorded for `domain`
    pub fn discovered_routes(&self, domain: &str) -> Vec<IpNet> {
        self.discovered
            .get(domain)
            .map(|record| record.routes.keys().copied().collect())
            .unwrap_or_default()
    }
}

/// Trait for route info store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks. The
/// engine only calls them while holding its own lock, so implementations do
/// not need to order concurrent writers against each other.
///
/// # Failure
///
/// A failed read makes the engine skip the part of an operation that depends
/// on the persisted snapshot; a failed write is logged and the in-memory
/// state stays authoritative until the next successful write.
#[async_trait]
pub trait RouteInfoStore: Send + Sync {
    /// Read the latest snapshot
    ///
    /// An empty store returns `RouteInfo::default()`, not an error.
    async fn read_route_info(&self) -> Result<RouteInfo, crate::Error>;

    /// Replace the stored snapshot with `info`
    async fn update_route_info(&self, info: &RouteInfo) -> Result<(), crate::Error>;

    /// Persist any pending changes
    ///
    /// Some implementations may buffer writes. This ensures
    /// all changes are flushed to persistent storage.
    async fn flush(&self) -> Result<(), crate::Error>;
}
