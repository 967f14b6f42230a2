//! Domain configuration store
//!
//! [`DomainTable`] holds every piece of mutable routing state the engine
//! shares between the apply queue and DNS observation: the exact-domain map,
//! the wildcard suffixes and the operator route baseline. It lives behind the
//! engine's single mutex and is only reachable through its guard, so any code
//! holding `&mut DomainTable` is holding the lock.
//!
//! Per-domain address vectors are kept sorted and duplicate free; membership
//! checks are binary searches.

use ipnet::IpNet;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::IpAddr;

use crate::dns::{ObservedAnswer, WILDCARD_PREFIX, has_suffix, normalize_domain};
use crate::traits::RouteInfo;

/// Single-address route for `addr` (/32 or /128)
pub fn single_route(addr: IpAddr) -> IpNet {
    IpNet::from(addr)
}

/// The address of `route` if it covers exactly one address
pub fn single_route_addr(route: &IpNet) -> Option<IpAddr> {
    (route.prefix_len() == route.max_prefix_len()).then(|| route.addr())
}

#[derive(Debug, Default)]
pub(crate) struct DomainTable {
    /// Lowercase domain without trailing dot -> sorted resolved addresses
    domains: HashMap<String, Vec<IpAddr>>,

    /// Wildcard suffixes, `*.` stripped
    wildcards: Vec<String>,

    /// Operator routes applied by the last successful reconciliation
    control_routes: Vec<IpNet>,
}

impl DomainTable {
    /// Replace the configured domains, carrying state forward where it still applies
    ///
    /// Exact names keep their addresses and discovered-route record. Domains
    /// that are no longer listed but fall under one of the new wildcards keep
    /// theirs too. Everything else is dropped from both the table and
    /// `info.discovered`; the single-address routes that only those dropped
    /// domains accounted for are returned so the caller can withdraw them.
    pub fn replace_domains(&mut self, names: &[String], info: &mut RouteInfo) -> Vec<IpNet> {
        let mut old_domains = std::mem::take(&mut self.domains);
        let mut old_discovered = std::mem::take(&mut info.discovered);
        self.wildcards.clear();

        for raw in names {
            let Some(name) = normalize_domain(raw) else {
                continue;
            };

            if let Some(suffix) = name.strip_prefix(WILDCARD_PREFIX) {
                if !suffix.is_empty() && !self.wildcards.iter().any(|w| w == suffix) {
                    self.wildcards.push(suffix.to_string());
                }
                continue;
            }

            if let Some(record) = old_discovered.remove(&name) {
                info.discovered.insert(name.clone(), record);
            }
            let addrs = old_domains.remove(&name).unwrap_or_default();
            self.domains.entry(name).or_insert(addrs);
        }

        let mut dropped_addrs = Vec::new();
        for (domain, addrs) in old_domains {
            if self.matches_wildcard(&domain) {
                self.domains.insert(domain, addrs);
            } else {
                dropped_addrs.extend(addrs);
            }
        }

        for (domain, record) in old_discovered {
            if self.matches_wildcard(&domain) {
                info.discovered.insert(domain, record);
            } else {
                dropped_addrs.extend(record.routes.keys().filter_map(single_route_addr));
            }
        }

        let retained: HashSet<IpAddr> = self
            .domains
            .values()
            .flatten()
            .copied()
            .chain(
                info.discovered
                    .values()
                    .flat_map(|record| record.routes.keys().filter_map(single_route_addr)),
            )
            .collect();

        dropped_addrs
            .into_iter()
            .filter(|addr| !retained.contains(addr) && !self.is_control_covered(*addr))
            .map(single_route)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Find the routed name for an address owner, walking the alias chain
    ///
    /// Starting at `owner`, each name is checked against the exact map and
    /// then the wildcard suffixes; on a miss the walk follows the CNAME edge
    /// toward the queried name. A wildcard hit upgrades the name to an exact
    /// entry (see [`Self::promote_wildcard_match`]), so this is a mutating
    /// lookup.
    pub fn resolve_routed_domain(&mut self, owner: &str, answer: &ObservedAnswer) -> Option<String> {
        let mut name = owner;
        // Bounded by the number of edges so a CNAME loop cannot spin forever.
        for _ in 0..=answer.aliases.len() {
            if self.domains.contains_key(name) {
                return Some(name.to_string());
            }
            if self.matches_wildcard(name) {
                self.promote_wildcard_match(name);
                return Some(name.to_string());
            }
            name = answer.alias_of(name)?;
        }
        None
    }

    /// Create an exact entry for a name matched through a wildcard suffix
    ///
    /// Later lookups of the same name then hit the exact map directly.
    pub fn promote_wildcard_match(&mut self, name: &str) {
        self.domains.entry(name.to_string()).or_default();
    }

    /// Whether `addr` is already accounted for under `domain`
    ///
    /// An address not yet recorded but covered by an operator route counts as
    /// known: it is recorded for the domain on the spot, since no individual
    /// advertisement is needed for it.
    pub fn is_addr_known(&mut self, domain: &str, addr: IpAddr) -> bool {
        if self.has_domain_addr(domain, addr) {
            return true;
        }
        if self.is_control_covered(addr) {
            self.add_domain_addr(domain, addr);
            return true;
        }
        false
    }

    /// Whether `addr` has been recorded for `domain`
    pub fn has_domain_addr(&self, domain: &str, addr: IpAddr) -> bool {
        self.domains
            .get(domain)
            .is_some_and(|addrs| addrs.binary_search(&addr).is_ok())
    }

    /// Record `addr` for `domain`, keeping the set sorted
    ///
    /// Returns `false` if the address was already present or the domain is
    /// not routed.
    pub fn add_domain_addr(&mut self, domain: &str, addr: IpAddr) -> bool {
        let Some(addrs) = self.domains.get_mut(domain) else {
            return false;
        };
        match addrs.binary_search(&addr) {
            Ok(_) => false,
            Err(idx) => {
                addrs.insert(idx, addr);
                true
            }
        }
    }

    /// Forget `addr` for `domain`
    pub fn delete_domain_addr(&mut self, domain: &str, addr: IpAddr) -> bool {
        let Some(addrs) = self.domains.get_mut(domain) else {
            return false;
        };
        match addrs.binary_search(&addr) {
            Ok(idx) => {
                addrs.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    /// Whether any domain other than `domain` still holds `addr`
    pub fn held_elsewhere(&self, domain: &str, addr: IpAddr) -> bool {
        self.domains
            .iter()
            .any(|(name, addrs)| name != domain && addrs.binary_search(&addr).is_ok())
    }

    pub fn is_routed(&self, domain: &str) -> bool {
        self.domains.contains_key(domain)
    }

    pub fn matches_wildcard(&self, name: &str) -> bool {
        self.wildcards.iter().any(|wc| has_suffix(name, wc))
    }

    fn is_control_covered(&self, addr: IpAddr) -> bool {
        self.control_routes.iter().any(|route| route.contains(&addr))
    }

    /// Single-address routes made redundant by a broader prefix in `prefixes`
    pub fn subsumed_by(&self, prefixes: &[IpNet]) -> Vec<IpNet> {
        self.collect_addrs(|addr| {
            let route = single_route(addr);
            prefixes.iter().any(|p| p.contains(&addr) && *p != route)
        })
    }

    /// Single-address routes left uncovered once `removed` is withdrawn
    /// and `current` is what remains advertised
    pub fn uncovered_by(&self, removed: &[IpNet], current: &[IpNet]) -> Vec<IpNet> {
        self.collect_addrs(|addr| {
            removed.iter().any(|p| p.contains(&addr))
                && !current.iter().any(|p| p.contains(&addr))
        })
    }

    fn collect_addrs(&self, mut keep: impl FnMut(IpAddr) -> bool) -> Vec<IpNet> {
        self.domains
            .values()
            .flatten()
            .copied()
            .filter(|addr| keep(*addr))
            .map(single_route)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn control_routes(&self) -> &[IpNet] {
        &self.control_routes
    }

    pub fn set_control_routes(&mut self, routes: Vec<IpNet>) {
        self.control_routes = routes;
    }

    pub fn wildcards(&self) -> &[String] {
        &self.wildcards
    }

    pub fn domains(&self) -> BTreeSet<String> {
        self.domains.keys().cloned().collect()
    }

    pub fn domain_routes(&self) -> HashMap<String, Vec<IpAddr>> {
        self.domains.clone()
    }
}
