//! Contract Test: Operator Route Reconciliation
//!
//! Constraints verified:
//! - An unchanged route set is a no-op
//! - A broader operator prefix replaces the single-address routes it covers
//! - Dropping a prefix brings back single-address routes it was covering
//! - A failed advertise leaves the previous baseline in force for the retry
//! - A prefix that could not be withdrawn is withdrawn by the next update
//! - A stale discovered address never withdraws an identical operator route

mod common;

use appc_core::{AppcConfig, EngineEvent, MemoryRouteInfoStore};
use common::*;
use std::collections::BTreeSet;

#[tokio::test]
async fn superset_routes_subsume_discovered_address() {
    let advertiser = RecordingAdvertiser::new();
    let store = MemoryRouteInfoStore::new();
    let config = AppcConfig::new()
        .with_domains(["example.com"])
        .with_routes(vec![net("10.0.0.0/24")]);
    let (appc, _events) = connector(&advertiser, &store, config).await;

    appc.observe_dns_response(&dns_response(
        "example.com.",
        vec![a("example.com.", "192.0.2.5")],
    ))
    .await;
    appc.wait().await;
    assert!(advertiser.advertised().contains(&net("192.0.2.5/32")));
    advertiser.clear_calls();

    let wider = vec![net("10.0.0.0/24"), net("192.0.2.0/24")];
    appc.replace_routes(wider.clone());
    appc.wait().await;

    assert_eq!(
        advertiser.calls(),
        vec![
            Call::Advertise(wider.clone()),
            Call::Unadvertise(vec![net("192.0.2.5/32")]),
        ]
    );
    assert_eq!(advertiser.advertised(), wider.iter().copied().collect::<BTreeSet<_>>());
    assert_eq!(store.snapshot().await.control, wider);
}

#[tokio::test]
async fn subsumption_covers_every_address_in_a_prefix() {
    let advertiser = RecordingAdvertiser::new();
    let store = MemoryRouteInfoStore::new();
    let config = AppcConfig::new().with_domains(["a.example", "b.example"]);
    let (appc, mut events) = connector(&advertiser, &store, config).await;

    appc.observe_dns_response(&dns_response(
        "a.example.",
        vec![a("a.example.", "192.0.2.1"), a("a.example.", "192.0.2.2")],
    ))
    .await;
    appc.observe_dns_response(&dns_response(
        "b.example.",
        vec![a("b.example.", "192.0.2.3"), a("b.example.", "203.0.113.9")],
    ))
    .await;
    appc.wait().await;
    drain_events(&mut events);

    appc.replace_routes(vec![net("192.0.2.0/24")]);
    appc.wait().await;

    assert_eq!(
        advertiser.advertised(),
        BTreeSet::from([net("192.0.2.0/24"), net("203.0.113.9/32")])
    );
    let events = drain_events(&mut events);
    assert_eq!(
        events,
        vec![EngineEvent::ControlRoutesApplied {
            routes: vec![net("192.0.2.0/24")],
            withdrawn: vec![],
            subsumed: vec![net("192.0.2.1/32"), net("192.0.2.2/32"), net("192.0.2.3/32")],
        }]
    );
}

#[tokio::test]
async fn unchanged_routes_skip_reconciliation() {
    let advertiser = RecordingAdvertiser::new();
    let store = MemoryRouteInfoStore::new();
    let config = AppcConfig::new().with_routes(vec![net("10.0.0.0/8"), net("2001:db8::/32")]);
    let (appc, _events) = connector(&advertiser, &store, config).await;
    assert_eq!(advertiser.call_count(), 1);
    advertiser.clear_calls();

    appc.replace_routes(vec![net("10.0.0.0/8"), net("2001:db8::/32")]);
    appc.wait().await;

    assert_eq!(advertiser.call_count(), 0);
}

#[tokio::test]
async fn dropping_a_prefix_readvertises_covered_addresses() {
    let advertiser = RecordingAdvertiser::new();
    let store = MemoryRouteInfoStore::new();
    let config = AppcConfig::new()
        .with_domains(["example.com"])
        .with_routes(vec![net("192.0.2.0/24")]);
    let (appc, _events) = connector(&advertiser, &store, config).await;
    advertiser.clear_calls();

    appc.observe_dns_response(&dns_response(
        "example.com.",
        vec![a("example.com.", "192.0.2.5")],
    ))
    .await;
    appc.wait().await;

    // Already covered by the operator prefix: known without an advertisement.
    assert_eq!(advertiser.call_count(), 0);
    assert_eq!(appc.domain_routes().await["example.com"], vec![ip("192.0.2.5")]);

    appc.replace_routes(vec![]);
    appc.wait().await;

    assert_eq!(
        advertiser.calls(),
        vec![
            Call::Unadvertise(vec![net("192.0.2.0/24")]),
            Call::Advertise(vec![net("192.0.2.5/32")]),
        ]
    );
    assert_eq!(advertiser.advertised(), BTreeSet::from([net("192.0.2.5/32")]));
    assert!(store.snapshot().await.control.is_empty());
}

#[tokio::test]
async fn advertise_failure_keeps_previous_baseline() {
    let advertiser = RecordingAdvertiser::new();
    let store = MemoryRouteInfoStore::new();
    let config = AppcConfig::new().with_routes(vec![net("10.0.0.0/24")]);
    let (appc, mut events) = connector(&advertiser, &store, config).await;
    advertiser.clear_calls();
    drain_events(&mut events);

    advertiser.set_fail_advertise(true);
    appc.replace_routes(vec![net("10.1.0.0/16")]);
    appc.wait().await;

    assert_eq!(
        advertiser.calls(),
        vec![
            Call::Unadvertise(vec![net("10.0.0.0/24")]),
            Call::Advertise(vec![net("10.1.0.0/16")]),
        ]
    );
    assert_eq!(store.snapshot().await.control, vec![net("10.0.0.0/24")]);
    assert!(matches!(
        drain_events(&mut events).as_slice(),
        [EngineEvent::ControlRoutesFailed { routes, .. }] if routes == &vec![net("10.1.0.0/16")]
    ));

    // The next attempt diffs against the old baseline again.
    advertiser.set_fail_advertise(false);
    advertiser.clear_calls();
    appc.replace_routes(vec![net("10.1.0.0/16")]);
    appc.wait().await;

    assert_eq!(
        advertiser.calls(),
        vec![
            Call::Unadvertise(vec![net("10.0.0.0/24")]),
            Call::Advertise(vec![net("10.1.0.0/16")]),
        ]
    );
    assert_eq!(store.snapshot().await.control, vec![net("10.1.0.0/16")]);
    assert_eq!(advertiser.advertised(), BTreeSet::from([net("10.1.0.0/16")]));
}

#[tokio::test]
async fn failed_withdrawal_is_retried_on_next_update() {
    let advertiser = RecordingAdvertiser::new();
    let store = MemoryRouteInfoStore::new();
    let config = AppcConfig::new().with_routes(vec![net("10.0.0.0/24")]);
    let (appc, mut events) = connector(&advertiser, &store, config).await;
    advertiser.clear_calls();
    drain_events(&mut events);

    advertiser.set_fail_unadvertise(true);
    appc.replace_routes(vec![net("10.1.0.0/16")]);
    appc.wait().await;

    assert_eq!(
        store.snapshot().await.control,
        vec![net("10.1.0.0/16"), net("10.0.0.0/24")]
    );
    assert_eq!(
        advertiser.advertised(),
        BTreeSet::from([net("10.0.0.0/24"), net("10.1.0.0/16")])
    );
    assert_eq!(
        drain_events(&mut events),
        vec![EngineEvent::ControlRoutesApplied {
            routes: vec![net("10.1.0.0/16")],
            withdrawn: vec![],
            subsumed: vec![],
        }]
    );

    advertiser.set_fail_unadvertise(false);
    advertiser.clear_calls();
    appc.replace_routes(vec![net("10.1.0.0/16")]);
    appc.wait().await;

    assert_eq!(
        advertiser.calls(),
        vec![
            Call::Unadvertise(vec![net("10.0.0.0/24")]),
            Call::Advertise(vec![net("10.1.0.0/16")]),
        ]
    );
    assert_eq!(store.snapshot().await.control, vec![net("10.1.0.0/16")]);
    assert_eq!(advertiser.advertised(), BTreeSet::from([net("10.1.0.0/16")]));
}

#[tokio::test]
async fn stale_address_matching_operator_route_stays_advertised() {
    let advertiser = RecordingAdvertiser::new();
    let store = MemoryRouteInfoStore::new();
    let config = AppcConfig::new()
        .with_domains(["example.com"])
        .with_routes(vec![net("192.0.2.1/32")]);
    let (appc, _events) = connector(&advertiser, &store, config).await;

    appc.observe_dns_response(&dns_response(
        "example.com.",
        vec![a("example.com.", "192.0.2.1")],
    ))
    .await;
    appc.wait().await;
    advertiser.clear_calls();

    appc.observe_dns_response(&dns_response(
        "example.com.",
        vec![a("example.com.", "198.51.100.9")],
    ))
    .await;
    appc.wait().await;

    assert_eq!(advertiser.calls(), vec![Call::Advertise(vec![net("198.51.100.9/32")])]);
    assert_eq!(
        advertiser.advertised(),
        BTreeSet::from([net("192.0.2.1/32"), net("198.51.100.9/32")])
    );
    assert_eq!(appc.domain_routes().await["example.com"], vec![ip("198.51.100.9")]);
}
