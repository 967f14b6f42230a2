// # Memory Route Info Store
//
// In-memory implementation of RouteInfoStore.
//
// ## Crash Behavior
//
// - All route bookkeeping is lost on restart/crash
// - After a restart every observed address is treated as new and is
//   advertised again, which the advertiser handles idempotently
// - Routes discovered before the restart are never found stale, since their
//   records are gone
//
// ## When to Use
//
// - Testing environments
// - Nodes where the advertiser itself forgets routes on restart

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::route_store::{RouteInfo, RouteInfoStore};

/// In-memory route info store
///
/// Clones share the same snapshot, so a test can keep a handle and inspect
/// what the engine wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryRouteInfoStore {
    inner: Arc<RwLock<RouteInfo>>,
}

impl MemoryRouteInfoStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `info`
    pub fn with_route_info(info: RouteInfo) -> Self {
        Self {
            inner: Arc::new(RwLock::new(info)),
        }
    }

    /// A copy of the current snapshot
    pub async fn snapshot(&self) -> RouteInfo {
        self.inner.read().await.clone()
    }
}

#[async_trait]
impl RouteInfoStore for MemoryRouteInfoStore {
    async fn read_route_info(&self) -> Result<RouteInfo, Error> {
        Ok(self.inner.read().await.clone())
    }

    async fn update_route_info(&self, info: &RouteInfo) -> Result<(), Error> {
        *self.inner.write().await = info.clone();
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}
