//! Route reconciliation
//!
//! Everything the apply queue worker runs lives here, plus the
//! discovered-route bookkeeping done during DNS observation. Each operation
//! takes the table lock for its whole duration, so collaborator calls made
//! from here never overlap with each other or with an observation.

use chrono::Utc;
use ipnet::IpNet;
use tracing::{debug, error, info, warn};

use super::queue::Command;
use super::table::{DomainTable, single_route_addr};
use super::{EngineEvent, Shared};
use crate::traits::RouteInfo;

impl Shared {
    /// Apply one queued command
    pub(super) async fn apply(&self, command: Command) {
        match command {
            Command::ReplaceDomains(domains) => {
                let mut table = self.table.lock().await;
                self.apply_domains(&mut table, domains).await;
            }
            Command::ReplaceRoutes(routes) => {
                let mut table = self.table.lock().await;
                self.apply_control_routes(&mut table, routes).await;
            }
            Command::ReplaceDomainsAndRoutes { domains, routes } => {
                let mut table = self.table.lock().await;
                self.apply_control_routes(&mut table, routes).await;
                self.apply_domains(&mut table, domains).await;
            }
            Command::Advertise { domain, routes } => self.apply_advertise(domain, routes).await,
            Command::Unadvertise { domain, routes } => {
                self.apply_unadvertise(domain, routes).await
            }
            Command::Barrier(done) => {
                // The waiter may have given up already.
                let _ = done.send(());
            }
        }
    }

    async fn apply_domains(&self, table: &mut DomainTable, domains: Vec<String>) {
        let (mut info, persist) = match self.store.read_route_info().await {
            Ok(info) => (info, true),
            Err(e) => {
                warn!("Failed to read route info, domain records will not be saved: {}", e);
                (RouteInfo::default(), false)
            }
        };

        let mut withdrawn = table.replace_domains(&domains, &mut info);

        if !withdrawn.is_empty() {
            match self.advertiser.unadvertise_route(&withdrawn).await {
                Ok(()) => info!("Withdrew {} routes of removed domains", withdrawn.len()),
                Err(e) => {
                    error!("Failed to withdraw routes of removed domains {:?}: {}", withdrawn, e);
                    withdrawn.clear();
                }
            }
        }

        if persist {
            self.save(&info).await;
        }

        let domains: Vec<String> = table.domains().into_iter().collect();
        let wildcards = table.wildcards().to_vec();
        info!(
            "Domains replaced: {} exact, {} wildcard",
            domains.len(),
            wildcards.len()
        );
        self.emit_event(EngineEvent::DomainsReplaced {
            domains,
            wildcards,
            withdrawn,
        });
    }

    async fn apply_control_routes(&self, table: &mut DomainTable, routes: Vec<IpNet>) {
        if table.control_routes() == routes.as_slice() {
            debug!("Operator routes unchanged, skipping reconciliation");
            return;
        }

        let mut info = match self.store.read_route_info().await {
            Ok(info) => info,
            Err(e) => {
                error!("Failed to read route info, operator routes not applied: {}", e);
                self.emit_event(EngineEvent::ControlRoutesFailed {
                    routes,
                    error: e.to_string(),
                });
                return;
            }
        };

        let mut removed: Vec<IpNet> = Vec::new();
        for prev in info.control.iter().chain(table.control_routes()) {
            if !routes.contains(prev) && !removed.contains(prev) {
                removed.push(*prev);
            }
        }

        // Prefixes that could not be withdrawn stay in the baseline and are
        // retried by the next update.
        let mut baseline = routes.clone();
        if !removed.is_empty() {
            if let Err(e) = self.advertiser.unadvertise_route(&removed).await {
                warn!(
                    "Failed to withdraw operator routes {:?}, keeping them for the next update: {}",
                    removed, e
                );
                baseline.append(&mut removed);
            }
        }

        if !routes.is_empty() {
            if let Err(e) = self.advertiser.advertise_route(&routes).await {
                error!("Failed to advertise operator routes {:?}: {}", routes, e);
                self.emit_event(EngineEvent::ControlRoutesFailed {
                    routes,
                    error: e.to_string(),
                });
                return;
            }
        }

        let mut subsumed = table.subsumed_by(&routes);
        if !subsumed.is_empty() {
            match self.advertiser.unadvertise_route(&subsumed).await {
                Ok(()) => debug!("Withdrew {} routes covered by operator routes", subsumed.len()),
                Err(e) => {
                    warn!("Failed to withdraw covered routes {:?}: {}", subsumed, e);
                    subsumed.clear();
                }
            }
        }

        let uncovered = table.uncovered_by(&removed, &routes);
        if !uncovered.is_empty() {
            if let Err(e) = self.advertiser.advertise_route(&uncovered).await {
                warn!("Failed to re-advertise uncovered routes {:?}: {}", uncovered, e);
            }
        }

        table.set_control_routes(baseline.clone());
        info.control = baseline;
        self.save(&info).await;

        info!(
            "Operator routes applied: {} routes, {} withdrawn, {} covered",
            routes.len(),
            removed.len(),
            subsumed.len()
        );
        self.emit_event(EngineEvent::ControlRoutesApplied {
            routes,
            withdrawn: removed,
            subsumed,
        });
    }

    async fn apply_advertise(&self, domain: String, routes: Vec<IpNet>) {
        let mut table = self.table.lock().await;
        if !table.is_routed(&domain) {
            debug!("Domain {} no longer routed, dropping advertisement", domain);
            return;
        }

        match self.advertiser.advertise_route(&routes).await {
            Ok(()) => {
                for addr in routes.iter().filter_map(single_route_addr) {
                    table.add_domain_addr(&domain, addr);
                }
                info!("Advertised {:?} for {}", routes, domain);
                self.emit_event(EngineEvent::RoutesAdvertised { domain, routes });
            }
            Err(e) => {
                error!("Failed to advertise {:?} for {}: {}", routes, domain, e);
                self.emit_event(EngineEvent::AdvertiseFailed {
                    domain,
                    routes,
                    error: e.to_string(),
                });
            }
        }
    }

    async fn apply_unadvertise(&self, domain: String, routes: Vec<IpNet>) {
        let mut table = self.table.lock().await;

        // An address another domain still resolves to, or that is itself an
        // operator route, stays advertised.
        let mut withdraw = Vec::with_capacity(routes.len());
        for route in routes {
            let Some(addr) = single_route_addr(&route) else {
                withdraw.push(route);
                continue;
            };
            if table.held_elsewhere(&domain, addr) || table.control_routes().contains(&route) {
                table.delete_domain_addr(&domain, addr);
            } else {
                withdraw.push(route);
            }
        }
        if withdraw.is_empty() {
            return;
        }

        match self.advertiser.unadvertise_route(&withdraw).await {
            Ok(()) => {
                for addr in withdraw.iter().filter_map(single_route_addr) {
                    table.delete_domain_addr(&domain, addr);
                }
                info!("Withdrew stale routes {:?} for {}", withdraw, domain);
                self.emit_event(EngineEvent::RoutesUnadvertised {
                    domain,
                    routes: withdraw,
                });
            }
            Err(e) => {
                error!("Failed to withdraw {:?} for {}: {}", withdraw, domain, e);
                self.emit_event(EngineEvent::UnadvertiseFailed {
                    domain,
                    routes: withdraw,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Refresh `domain`'s discovered-route record with an observation
    ///
    /// Returns the routes that went stale. Called with the table lock held.
    pub(super) async fn record_observation(
        &self,
        domain: &str,
        new: &[IpNet],
        known: &[IpNet],
    ) -> Vec<IpNet> {
        let mut info = match self.store.read_route_info().await {
            Ok(info) => info,
            Err(e) => {
                warn!("Failed to read route info for {}: {}", domain, e);
                return Vec::new();
            }
        };

        let now = Utc::now();
        let fresh: Vec<IpNet> = new.iter().chain(known).copied().collect();
        info.refresh_domain(domain, &fresh, now);
        let stale = info.take_stale_routes(
            domain,
            &fresh,
            now,
            self.stale_after,
            self.cleanup_interval,
        );

        self.save(&info).await;
        stale
    }

    async fn save(&self, info: &RouteInfo) {
        if let Err(e) = self.store.update_route_info(info).await {
            error!("Failed to save route info: {}", e);
        }
    }
}
