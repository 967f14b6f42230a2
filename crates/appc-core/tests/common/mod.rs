//! Test doubles and common utilities for app connector contract tests
//!
//! The doubles record what the engine asked of its collaborators so tests
//! can assert on exact advertise/unadvertise calls.

#![allow(dead_code)]

use appc_core::error::{Error, Result};
use appc_core::traits::{RouteAdvertiser, RouteInfo, RouteInfoStore};
use appc_core::{AppConnector, AppcConfig, EngineEvent, MemoryRouteInfoStore};
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::rdata::{A, AAAA, CNAME};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use ipnet::IpNet;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// One call made to the route advertiser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Advertise(Vec<IpNet>),
    Unadvertise(Vec<IpNet>),
}

/// A RouteAdvertiser that records every call and keeps the resulting route set
///
/// Clones share their call log, route set and failure switches.
#[derive(Debug, Clone, Default)]
pub struct RecordingAdvertiser {
    calls: Arc<Mutex<Vec<Call>>>,
    advertised: Arc<Mutex<BTreeSet<IpNet>>>,
    fail_advertise: Arc<AtomicBool>,
    fail_unadvertise: Arc<AtomicBool>,
}

impl RecordingAdvertiser {
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Forget recorded calls (the route set is kept)
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Routes currently advertised, as the network layer would see them
    pub fn advertised(&self) -> BTreeSet<IpNet> {
        self.advertised.lock().unwrap().clone()
    }

    pub fn set_fail_advertise(&self, fail: bool) {
        self.fail_advertise.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_unadvertise(&self, fail: bool) {
        self.fail_unadvertise.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl RouteAdvertiser for RecordingAdvertiser {
    async fn advertise_route(&self, routes: &[IpNet]) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Advertise(routes.to_vec()));
        if self.fail_advertise.load(Ordering::SeqCst) {
            return Err(Error::route_advertiser("injected advertise failure"));
        }
        self.advertised.lock().unwrap().extend(routes.iter().copied());
        Ok(())
    }

    async fn unadvertise_route(&self, routes: &[IpNet]) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Unadvertise(routes.to_vec()));
        if self.fail_unadvertise.load(Ordering::SeqCst) {
            return Err(Error::route_advertiser("injected unadvertise failure"));
        }
        let mut advertised = self.advertised.lock().unwrap();
        for route in routes {
            advertised.remove(route);
        }
        Ok(())
    }
}

/// A RouteInfoStore wrapping a memory store whose reads can be made to fail
#[derive(Debug, Clone, Default)]
pub struct FlakyStore {
    inner: MemoryRouteInfoStore,
    fail_reads: Arc<AtomicBool>,
    write_count: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> RouteInfo {
        self.inner.snapshot().await
    }
}

#[async_trait::async_trait]
impl RouteInfoStore for FlakyStore {
    async fn read_route_info(&self) -> Result<RouteInfo> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::route_store("injected read failure"));
        }
        self.inner.read_route_info().await
    }

    async fn update_route_info(&self, info: &RouteInfo) -> Result<()> {
        self.write_count.fetch_add(1, Ordering::SeqCst);
        self.inner.update_route_info(info).await
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }
}

/// Build a connector over shared test doubles
///
/// Returns once the domains and routes from `config` have been applied.
pub async fn connector(
    advertiser: &RecordingAdvertiser,
    store: &MemoryRouteInfoStore,
    config: AppcConfig,
) -> (AppConnector, mpsc::Receiver<EngineEvent>) {
    let (appc, events) =
        AppConnector::new(Box::new(advertiser.clone()), Box::new(store.clone()), config)
            .expect("connector construction succeeds");
    appc.wait().await;
    (appc, events)
}

/// Drain every event currently buffered in the channel
pub fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn net(s: &str) -> IpNet {
    s.parse().expect("valid prefix")
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().expect("valid address")
}

pub fn domains(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn name(s: &str) -> Name {
    Name::from_ascii(s).expect("valid name")
}

pub fn a(owner: &str, addr: &str) -> Record {
    Record::from_rdata(name(owner), 300, RData::A(A(addr.parse().expect("v4"))))
}

pub fn aaaa(owner: &str, addr: &str) -> Record {
    Record::from_rdata(name(owner), 300, RData::AAAA(AAAA(addr.parse().expect("v6"))))
}

pub fn cname(owner: &str, target: &str) -> Record {
    Record::from_rdata(name(owner), 300, RData::CNAME(CNAME(name(target))))
}

/// Encode a response to an A query for `qname` carrying `answers`
pub fn dns_response(qname: &str, answers: Vec<Record>) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(4242);
    msg.set_message_type(MessageType::Response);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    msg.set_recursion_available(true);

    let mut query = Query::new();
    query.set_name(name(qname));
    query.set_query_type(RecordType::A);
    msg.add_query(query);

    for answer in answers {
        msg.add_answer(answer);
    }
    msg.to_vec().expect("response encodes")
}
