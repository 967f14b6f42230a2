//! App connector engine
//!
//! The [`AppConnector`] makes a set of configured domains reachable through
//! this node. It:
//! - Keeps the configured domains and operator routes
//! - Watches DNS responses for those domains and learns their addresses
//! - Advertises the learned addresses, and withdraws them when they go stale
//! - Keeps single-address routes out of the way of broader operator routes
//!
//! ## Architecture
//!
//! ```text
//!  replace_domains / replace_routes          observe_dns_response
//!               │                                     │
//!               ▼                                     │ parse, match,
//!      ┌────────────────┐   Advertise / Unadvertise   │ classify
//!      │  ApplyQueue    │◀────────────────────────────┤
//!      │ (one worker)   │                             │
//!      └───────┬────────┘                             │
//!              │ apply                                ▼
//!              │               ┌─────────────────────────────┐
//!              └──────────────▶│ Mutex<DomainTable>          │
//!                              └─────────────────────────────┘
//!              │                                      │
//!              ▼                                      ▼
//!     ┌─────────────────┐                   ┌──────────────────┐
//!     │ RouteAdvertiser │                   │ RouteInfoStore   │
//!     └─────────────────┘                   └──────────────────┘
//! ```
//!
//! Mutations are queued and applied one at a time by a single worker; callers
//! use [`AppConnector::wait`] to know they have landed. DNS observation runs
//! on the caller's task, taking the same lock as the worker, and only queues
//! the resulting advertisements.

mod queue;
mod reconcile;
pub(crate) mod table;

use ipnet::IpNet;
use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, trace, warn};

use crate::config::AppcConfig;
use crate::dns;
use crate::error::Result;
use crate::traits::{RouteAdvertiser, RouteInfoStore};
use queue::{ApplyQueue, Command};
use table::{DomainTable, single_route};

/// Events emitted by the AppConnector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Domain configuration replaced
    DomainsReplaced {
        domains: Vec<String>,
        wildcards: Vec<String>,
        /// Routes withdrawn because their domains are no longer routed
        withdrawn: Vec<IpNet>,
    },

    /// Operator routes applied and made the new baseline
    ControlRoutesApplied {
        routes: Vec<IpNet>,
        /// Previous operator routes no longer present
        withdrawn: Vec<IpNet>,
        /// Discovered single-address routes now covered by a broader route
        subsumed: Vec<IpNet>,
    },

    /// Operator routes could not be applied; the previous baseline stands
    ControlRoutesFailed { routes: Vec<IpNet>, error: String },

    /// Discovered routes advertised for a domain
    RoutesAdvertised { domain: String, routes: Vec<IpNet> },

    /// Stale routes withdrawn for a domain
    RoutesUnadvertised { domain: String, routes: Vec<IpNet> },

    /// Advertising discovered routes failed
    AdvertiseFailed {
        domain: String,
        routes: Vec<IpNet>,
        error: String,
    },

    /// Withdrawing stale routes failed
    UnadvertiseFailed {
        domain: String,
        routes: Vec<IpNet>,
        error: String,
    },

    /// Engine stopped
    Stopped,
}

/// State shared between the public handle and the apply queue worker
pub(crate) struct Shared {
    advertiser: Box<dyn RouteAdvertiser>,
    store: Box<dyn RouteInfoStore>,

    /// The one lock guarding all mutable routing state
    table: Mutex<DomainTable>,

    stale_after: chrono::Duration,
    cleanup_interval: chrono::Duration,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl Shared {
    /// Emit an engine event, dropping it if nobody keeps up
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening.
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// DNS-driven route advertisement engine
///
/// ## Lifecycle
///
/// 1. Create with [`AppConnector::new()`] inside a tokio runtime
/// 2. Feed configuration with the `replace_*` methods and DNS responses with
///    [`AppConnector::observe_dns_response()`]
/// 3. Stop with [`AppConnector::shutdown()`], which drains queued work and
///    flushes the route info store
///
/// Dropping the handle without `shutdown` also stops the worker once the
/// queue is drained, but skips the final flush.
pub struct AppConnector {
    shared: Arc<Shared>,
    queue: ApplyQueue,
}

impl AppConnector {
    /// Create a new app connector
    ///
    /// # Parameters
    ///
    /// - `advertiser`: Route advertiser implementation
    /// - `store`: Route info store implementation
    /// - `config`: App connector configuration. Its domains and routes, if
    ///   any, are queued as the first update.
    ///
    /// # Returns
    ///
    /// A tuple of (connector, event_receiver) where event_receiver yields engine events
    pub fn new(
        advertiser: Box<dyn RouteAdvertiser>,
        store: Box<dyn RouteInfoStore>,
        config: AppcConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let shared = Arc::new(Shared {
            advertiser,
            store,
            table: Mutex::new(DomainTable::default()),
            stale_after: config.engine.stale_after(),
            cleanup_interval: config.engine.cleanup_interval(),
            event_tx: tx,
        });
        let queue = ApplyQueue::spawn(Arc::clone(&shared));

        let connector = Self { shared, queue };
        if !config.domains.is_empty() || !config.routes.is_empty() {
            connector.replace_domains_and_routes(config.domains, config.routes);
        }

        Ok((connector, rx))
    }

    /// Asynchronously replace the configured domains
    ///
    /// Names are lowercased; a leading `*.` label makes the rest a suffix
    /// that matches every subdomain.
    pub fn replace_domains(&self, domains: Vec<String>) {
        self.queue.add(Command::ReplaceDomains(domains));
    }

    /// Asynchronously replace the operator routes, then the domains, as one step
    pub fn replace_domains_and_routes(&self, domains: Vec<String>, routes: Vec<IpNet>) {
        self.queue
            .add(Command::ReplaceDomainsAndRoutes { domains, routes });
    }

    /// Asynchronously replace the operator routes
    pub fn replace_routes(&self, routes: Vec<IpNet>) {
        self.queue.add(Command::ReplaceRoutes(routes));
    }

    /// Wait for all work queued before this call to be applied
    ///
    /// Cancel by dropping the returned future, e.g. under
    /// `tokio::time::timeout`.
    pub async fn wait(&self) {
        self.queue.wait().await;
    }

    /// Observe a DNS response on its way back to a client
    ///
    /// Addresses answered for a routed domain, directly or through a CNAME
    /// chain, are classified as new or already known. Both refresh the
    /// domain's discovered-route record; new ones are queued for
    /// advertisement, and routes that went stale are queued for withdrawal.
    ///
    /// Malformed messages are ignored. Nothing is reported to the caller.
    pub async fn observe_dns_response(&self, message: &[u8]) {
        let Some(answer) = dns::parse_answers(message) else {
            trace!("Ignoring malformed DNS response ({} bytes)", message.len());
            return;
        };
        if answer.addresses.is_empty() {
            return;
        }

        let mut table = self.shared.table.lock().await;

        for (owner, addrs) in &answer.addresses {
            let Some(domain) = table.resolve_routed_domain(owner, &answer) else {
                continue;
            };

            let mut to_advertise = Vec::new();
            let mut to_refresh = Vec::new();
            for addr in addrs {
                let route = single_route(*addr);
                if to_advertise.contains(&route) || to_refresh.contains(&route) {
                    continue;
                }
                if table.is_addr_known(&domain, *addr) {
                    to_refresh.push(route);
                } else {
                    to_advertise.push(route);
                }
            }

            debug!("Observed new routes for {}: {:?}", domain, to_advertise);

            let stale = self
                .shared
                .record_observation(&domain, &to_advertise, &to_refresh)
                .await;

            if !to_advertise.is_empty() {
                self.queue.add(Command::Advertise {
                    domain: domain.clone(),
                    routes: to_advertise,
                });
            }
            if !stale.is_empty() {
                self.queue.add(Command::Unadvertise {
                    domain,
                    routes: stale,
                });
            }
        }
    }

    /// The currently routed domains, including ones matched through a wildcard
    pub async fn domains(&self) -> BTreeSet<String> {
        self.shared.table.lock().await.domains()
    }

    /// A copy of each routed domain's known addresses, sorted
    pub async fn domain_routes(&self) -> HashMap<String, Vec<IpAddr>> {
        self.shared.table.lock().await.domain_routes()
    }

    /// Drain queued work, stop the worker and flush the route info store
    pub async fn shutdown(self) -> Result<()> {
        let Self { shared, queue } = self;

        queue.close().await;
        shared.store.flush().await?;

        shared.emit_event(EngineEvent::Stopped);
        info!("Route info flushed, app connector stopped");

        Ok(())
    }
}
