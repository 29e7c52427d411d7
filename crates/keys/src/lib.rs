//! Leased key store for the token orchestrator
//!
//! This crate owns the lifecycle of issued access keys. It is independent of
//! any transport, so the HTTP layer (or anything else) only translates the
//! results of these operations into responses.
//!
//! ## Core Concepts
//!
//! - **KeyRecord**: An issued key with its secret, block flag and lease state
//! - **KeyStore**: Internally synchronized `id -> record` map shared by handle
//! - **Reaper**: Periodic task that evicts records whose lease has lapsed
//! - **Clock**: Source of "now" for every validity and lease decision
//!
//! A record starts without a lease and never expires. The first keep-alive
//! engages a lease of `lease_duration`, later keep-alives renew it to a fresh
//! full window. Once the lease lapses the key is invalid, and the next reaper
//! sweep removes it.

pub mod clock;
pub mod config;
pub mod error;
pub mod id;
pub mod reaper;
pub mod record;
pub mod store;


pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LeaseConfig, MAX_LEASE_SECS};
pub use error::{ConfigError, InvalidKeyId, Invalidity, KeyError};
pub use id::{KeyId, Secret};
pub use reaper::{Reaper, ReaperHandle};
pub use record::{KeyInfo, KeyRecord};
pub use store::{IssuedKey, KeyStore, StoreStats};
