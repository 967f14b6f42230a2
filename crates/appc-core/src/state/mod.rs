// # Route Info Store Implementations
//
// This module provides implementations of the RouteInfoStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::FileRouteInfoStore;
pub use memory::MemoryRouteInfoStore;
