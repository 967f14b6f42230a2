//! Collaborator traits for the app connector
//!
//! The engine does not program routes or persist anything itself. It talks to
//! the outside world through these two seams:
//!
//! - [`RouteAdvertiser`]: advertise and withdraw route prefixes
//! - [`RouteInfoStore`]: durable snapshot of route bookkeeping

pub mod route_advertiser;
pub mod route_store;

pub use route_advertiser::RouteAdvertiser;
pub use route_store::{DatedRoutes, RouteInfo, RouteInfoStore};
