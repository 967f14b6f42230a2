// # appc-core
//
// Core library for the DNS-driven app connector.
//
// ## Architecture Overview
//
// This library makes configured domains reachable through the local node by
// learning their addresses from DNS traffic and advertising them as routes:
// - **RouteAdvertiser**: Trait for programming routes at the network layer
// - **RouteInfoStore**: Trait for durable route bookkeeping (staleness, restarts)
// - **AppConnector**: Engine that reconciles domains, operator routes and DNS answers
// - **dns**: Extraction of aliases and addresses from raw DNS responses
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Routing decisions are separate from route programming
// 2. **Serialized Mutation**: All changes go through one FIFO apply queue
// 3. **Minimal Route Set**: Single-address routes never duplicate a broader operator route
// 4. **Library-First**: All core functionality can be used as a library

pub mod config;
pub mod dns;
pub mod engine;
pub mod error;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{AppcConfig, EngineConfig, StateStoreConfig};
pub use engine::{AppConnector, EngineEvent};
pub use error::{Error, Result};
pub use state::{FileRouteInfoStore, MemoryRouteInfoStore};
pub use traits::{DatedRoutes, RouteAdvertiser, RouteInfo, RouteInfoStore};
