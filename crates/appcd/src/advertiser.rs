// # Logging Route Advertiser
//
// Route advertiser for the daemon. Programming routes into a routing
// protocol or the kernel belongs to the node's network layer, so this
// implementation keeps the advertised set and logs every change to it.

use appc_core::Error;
use appc_core::traits::RouteAdvertiser;
use async_trait::async_trait;
use ipnet::IpNet;
use std::collections::BTreeSet;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Default)]
pub struct LoggingRouteAdvertiser {
    advertised: Mutex<BTreeSet<IpNet>>,
}

impl LoggingRouteAdvertiser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes currently advertised
    pub async fn advertised(&self) -> BTreeSet<IpNet> {
        self.advertised.lock().await.clone()
    }
}

#[async_trait]
impl RouteAdvertiser for LoggingRouteAdvertiser {
    async fn advertise_route(&self, routes: &[IpNet]) -> Result<(), Error> {
        let mut advertised = self.advertised.lock().await;
        for route in routes {
            if advertised.insert(*route) {
                info!("+ route {}", route);
            }
        }
        Ok(())
    }

    async fn unadvertise_route(&self, routes: &[IpNet]) -> Result<(), Error> {
        let mut advertised = self.advertised.lock().await;
        for route in routes {
            if advertised.remove(route) {
                info!("- route {}", route);
            }
        }
        Ok(())
    }
}
