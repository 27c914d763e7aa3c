//! Connections - namespace pools and load-balanced clients.
//!
//! A `Pool` maps namespace names to backend addresses. `acquire` hands out
//! a `Client` per (process, thread, namespace); the client spreads calls
//! over every address round-robin and reconnects lazily.
//!
//! Transports are produced by a `Connector`, so the crate never depends on
//! a particular wire protocol. `InMemoryConnector` wires addresses to
//! `InMemoryStore`s for tests and development.
//!
//! ## Example
//!
//! ```ignore
//! use rowkeeper::{InMemoryConnector, Pool};
//!
//! let pool = Pool::new(InMemoryConnector::new());
//! pool.register("blog", ["127.0.0.1:9160"])?;
//! let client = pool.acquire("blog")?;
//! ```

mod client;
mod in_memory;
mod pool;

use crate::error::StoreError;
use crate::store::Store;

pub use client::Client;
pub use in_memory::{InMemoryConnector, InMemoryTransport, TransportStats};
pub use pool::{acquire, global, register_pool, set_global, Pool};

/// A single connection to one backend address.
///
/// The store methods are only called while the transport is open.
pub trait Transport: Store {
    fn is_open(&self) -> bool;

    fn open(&mut self) -> Result<(), StoreError>;

    fn close(&mut self);
}

/// Builds transports for `host:port` addresses.
pub trait Connector: Send + Sync {
    /// Returns `None` when the address cannot be served; the client drops it.
    fn connect(&self, host: &str, port: u16) -> Option<Box<dyn Transport>>;
}
