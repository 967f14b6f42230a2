//! Single-worker FIFO apply queue
//!
//! Every configuration change and every scheduled (un)advertisement is an
//! owned [`Command`] sent to one worker task. The worker applies them
//! strictly in submission order, one at a time, so no two mutations ever
//! interleave.

use ipnet::IpNet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Shared;

/// A unit of work for the apply queue
#[derive(Debug)]
pub(crate) enum Command {
    /// Replace the configured domain list
    ReplaceDomains(Vec<String>),

    /// Replace the operator route set
    ReplaceRoutes(Vec<IpNet>),

    /// Replace routes, then domains, as one step
    ReplaceDomainsAndRoutes {
        domains: Vec<String>,
        routes: Vec<IpNet>,
    },

    /// Advertise routes newly discovered for a domain
    Advertise { domain: String, routes: Vec<IpNet> },

    /// Withdraw routes that went stale for a domain
    Unadvertise { domain: String, routes: Vec<IpNet> },

    /// Signals once everything queued before it has been applied
    Barrier(oneshot::Sender<()>),
}

pub(crate) struct ApplyQueue {
    tx: mpsc::UnboundedSender<Command>,
    worker: JoinHandle<()>,
}

impl ApplyQueue {
    /// Start the worker task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(shared: Arc<Shared>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let worker = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                shared.apply(command).await;
            }
            debug!("Apply queue closed, worker exiting");
        });

        Self { tx, worker }
    }

    /// Enqueue a command; returns immediately
    pub fn add(&self, command: Command) {
        if let Err(e) = self.tx.send(command) {
            warn!("Apply queue worker is gone, dropping command: {:?}", e.0);
        }
    }

    /// Wait until every command queued before this call has been applied
    ///
    /// Cancel by dropping the future; the barrier left in the queue is then
    /// ignored by the worker.
    pub async fn wait(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.add(Command::Barrier(done_tx));
        // Err only if the worker exited before reaching the barrier.
        let _ = done_rx.await;
    }

    /// Stop accepting commands, drain the queue and join the worker
    pub async fn close(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            warn!("Apply queue worker terminated abnormally: {}", e);
        }
    }
}
