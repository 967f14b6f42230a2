//! DNS answer parsing for route discovery
//!
//! The engine never resolves anything itself. The resolver hands it complete
//! response messages and this module extracts what matters for routing:
//! - CNAME edges, keyed by target so a resolved name can be walked back
//!   toward the name that was actually queried
//! - A/AAAA addresses, grouped by owner name
//!
//! Parsing stops after the answer section. Any decoding error discards the
//! whole message; DNS traffic is untrusted and high volume, so a bad message
//! is simply not observed.

use hickory_proto::op::{Header, Query};
use hickory_proto::rr::{DNSClass, Name, RData, Record};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder};
use std::collections::HashMap;
use std::net::IpAddr;

/// Prefix marking a configured domain as a wildcard suffix match
pub const WILDCARD_PREFIX: &str = "*.";

/// Routing-relevant content of one DNS response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedAnswer {
    /// CNAME target -> owner name. For `www.example.com CNAME example.com`
    /// this holds `"example.com" -> "www.example.com"`.
    pub aliases: HashMap<String, String>,

    /// Owner name -> addresses from its A/AAAA records, in answer order
    pub addresses: HashMap<String, Vec<IpAddr>>,
}

impl ObservedAnswer {
    /// Next hop from `name` toward the queried name, if `name` is a CNAME target
    pub fn alias_of(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }
}

/// Parse a raw DNS response, returning `None` if any section is malformed
pub fn parse_answers(message: &[u8]) -> Option<ObservedAnswer> {
    let mut decoder = BinDecoder::new(message);

    let header = Header::read(&mut decoder).ok()?;
    for _ in 0..header.query_count() {
        Query::read(&mut decoder).ok()?;
    }

    let mut observed = ObservedAnswer::default();
    for _ in 0..header.answer_count() {
        let record = Record::<RData>::read(&mut decoder).ok()?;

        if record.dns_class() != DNSClass::IN {
            continue;
        }

        let Some(owner) = name_to_domain(record.name()) else {
            continue;
        };

        match record.data() {
            RData::CNAME(cname) => {
                if let Some(target) = name_to_domain(&cname.0) {
                    observed.aliases.insert(target, owner);
                }
            }
            RData::A(a) => observed
                .addresses
                .entry(owner)
                .or_default()
                .push(IpAddr::V4(a.0)),
            RData::AAAA(aaaa) => observed
                .addresses
                .entry(owner)
                .or_default()
                .push(IpAddr::V6(aaaa.0)),
            _ => {}
        }
    }

    Some(observed)
}

/// Lowercase a configured or observed name and strip its trailing dot
///
/// Returns `None` for empty names (including the root).
pub fn normalize_domain(name: &str) -> Option<String> {
    let name = name.trim().trim_end_matches('.').to_ascii_lowercase();
    if name.is_empty() { None } else { Some(name) }
}

/// Whether `name` is a strict subdomain of `suffix`
///
/// `a.b.example.com` and `b.example.com` match `example.com`; `example.com`
/// itself does not. Both arguments are expected to be normalized.
pub fn has_suffix(name: &str, suffix: &str) -> bool {
    let name = name.trim_end_matches('.');
    let suffix = suffix.trim_end_matches('.').trim_start_matches('.');
    if suffix.is_empty() {
        return false;
    }
    match name.strip_suffix(suffix) {
        Some(base) => base.len() > 1 && base.ends_with('.'),
        None => false,
    }
}

fn name_to_domain(name: &Name) -> Option<String> {
    normalize_domain(&name.to_ascii())
}
