//! Freight marketplace engine
//!
//! Clients post transport requests, transporters bid on them, the client
//! accepts exactly one bid and the platform records its commission. The two
//! parties then talk through a moderated chat and rate each other.
pub mod billing;
pub mod chat;
pub mod config;
pub mod directory;
pub mod error;
pub mod filter;
pub mod model;
pub mod negotiation;
pub mod notify;
pub mod rating;
pub mod resolution;
pub mod service;
pub mod stats;
pub mod store;
pub mod types;
pub mod utils;

pub use error::{MarketError, MarketResult};
pub use service::{Collaborators, Marketplace};
