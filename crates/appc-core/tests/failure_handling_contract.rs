//! Contract Test: Collaborator Failures
//!
//! Constraints verified:
//! - A failed advertise leaves the address unknown, so it is retried on the
//!   next observation
//! - A failed withdrawal leaves the address known
//! - Store read failures degrade each operation without corrupting state

mod common;

use appc_core::{AppConnector, AppcConfig, EngineEvent, MemoryRouteInfoStore};
use common::*;

async fn flaky_connector(
    advertiser: &RecordingAdvertiser,
    store: &FlakyStore,
    config: AppcConfig,
) -> (AppConnector, tokio::sync::mpsc::Receiver<EngineEvent>) {
    let (appc, events) =
        AppConnector::new(Box::new(advertiser.clone()), Box::new(store.clone()), config)
            .expect("connector construction succeeds");
    appc.wait().await;
    (appc, events)
}

#[tokio::test]
async fn failed_advertise_is_retried_on_next_observation() {
    let advertiser = RecordingAdvertiser::new();
    let store = MemoryRouteInfoStore::new();
    let config = AppcConfig::new().with_domains(["example.com"]);
    let (appc, mut events) = connector(&advertiser, &store, config).await;
    drain_events(&mut events);

    let response = dns_response("example.com.", vec![a("example.com.", "192.0.2.1")]);

    advertiser.set_fail_advertise(true);
    appc.observe_dns_response(&response).await;
    appc.wait().await;

    assert!(appc.domain_routes().await["example.com"].is_empty());
    // The record is stamped at observation time regardless of the outcome.
    assert_eq!(
        store.snapshot().await.discovered_routes("example.com"),
        vec![net("192.0.2.1/32")]
    );
    assert!(matches!(
        drain_events(&mut events).as_slice(),
        [EngineEvent::AdvertiseFailed { domain, .. }] if domain == "example.com"
    ));

    advertiser.set_fail_advertise(false);
    appc.observe_dns_response(&response).await;
    appc.wait().await;

    assert_eq!(
        advertiser.calls(),
        vec![
            Call::Advertise(vec![net("192.0.2.1/32")]),
            Call::Advertise(vec![net("192.0.2.1/32")]),
        ]
    );
    assert_eq!(appc.domain_routes().await["example.com"], vec![ip("192.0.2.1")]);
}

#[tokio::test]
async fn failed_withdrawal_keeps_address_known() {
    let advertiser = RecordingAdvertiser::new();
    let store = MemoryRouteInfoStore::new();
    let config = AppcConfig::new().with_domains(["example.com"]);
    let (appc, mut events) = connector(&advertiser, &store, config).await;

    appc.observe_dns_response(&dns_response(
        "example.com.",
        vec![a("example.com.", "192.0.2.1"), a("example.com.", "192.0.2.2")],
    ))
    .await;
    appc.wait().await;
    drain_events(&mut events);

    advertiser.set_fail_unadvertise(true);
    appc.observe_dns_response(&dns_response(
        "example.com.",
        vec![a("example.com.", "192.0.2.2")],
    ))
    .await;
    appc.wait().await;

    assert_eq!(
        appc.domain_routes().await["example.com"],
        vec![ip("192.0.2.1"), ip("192.0.2.2")]
    );
    assert!(advertiser.advertised().contains(&net("192.0.2.1/32")));
    assert!(matches!(
        drain_events(&mut events).as_slice(),
        [EngineEvent::UnadvertiseFailed { routes, .. }] if routes == &vec![net("192.0.2.1/32")]
    ));
}

#[tokio::test]
async fn store_read_failure_aborts_route_replacement() {
    let advertiser = RecordingAdvertiser::new();
    let store = FlakyStore::new();
    let (appc, mut events) = flaky_connector(&advertiser, &store, AppcConfig::new()).await;

    store.set_fail_reads(true);
    appc.replace_routes(vec![net("10.0.0.0/8")]);
    appc.wait().await;

    assert_eq!(advertiser.call_count(), 0);
    assert!(matches!(
        drain_events(&mut events).as_slice(),
        [EngineEvent::ControlRoutesFailed { .. }]
    ));

    store.set_fail_reads(false);
    appc.replace_routes(vec![net("10.0.0.0/8")]);
    appc.wait().await;

    assert_eq!(advertiser.calls(), vec![Call::Advertise(vec![net("10.0.0.0/8")])]);
    assert_eq!(store.snapshot().await.control, vec![net("10.0.0.0/8")]);
}

#[tokio::test]
async fn store_read_failure_still_updates_domains_without_saving() {
    let advertiser = RecordingAdvertiser::new();
    let store = FlakyStore::new();
    let (appc, _events) = flaky_connector(&advertiser, &store, AppcConfig::new()).await;

    store.set_fail_reads(true);
    appc.replace_domains(domains(&["example.com"]));
    appc.wait().await;

    assert!(appc.domains().await.contains("example.com"));
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn store_read_failure_still_advertises_observed_addresses() {
    let advertiser = RecordingAdvertiser::new();
    let store = FlakyStore::new();
    let config = AppcConfig::new().with_domains(["example.com"]);
    let (appc, _events) = flaky_connector(&advertiser, &store, config).await;
    let writes = store.write_count();

    store.set_fail_reads(true);
    appc.observe_dns_response(&dns_response(
        "example.com.",
        vec![a("example.com.", "192.0.2.1")],
    ))
    .await;
    appc.wait().await;

    assert_eq!(advertiser.calls(), vec![Call::Advertise(vec![net("192.0.2.1/32")])]);
    assert_eq!(store.write_count(), writes);
}
