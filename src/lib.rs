//! Aggregates pollutant facilities onto census boundaries and keeps a map
//! session's dependent views in step with its selections.

pub mod aggregate;
pub mod cache;
pub mod classify;
pub mod click;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod server;
pub mod session;
pub mod stats;
pub mod store;
pub mod types;
pub mod views;

pub use error::{AtlasError, AtlasResult};
pub use session::{AtlasBackend, HoverTarget, LocalBackend, MapView, Session};
