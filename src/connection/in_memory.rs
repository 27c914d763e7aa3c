//! InMemoryConnector - transports backed by a shared `InMemoryStore`.
//!
//! Every address handed to the connector reaches the same store, the way
//! every node of a cluster serves the same data. Per-address counters and
//! fault switches let tests observe load balancing and transport failures.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use super::{Connector, Transport};
use crate::error::StoreError;
use crate::store::{
    Column, ColumnParent, ColumnPath, ConsistencyLevel, InMemoryStore, Mutation,
    SlicePredicate, Store,
};

/// Per-address transport counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub opens: usize,
    pub closes: usize,
    pub calls: usize,
}

#[derive(Default)]
struct AddressState {
    stats: TransportStats,
    fail_next: Option<String>,
    refuse_open: bool,
}

type SharedState = Arc<Mutex<HashMap<String, AddressState>>>;

/// Connector that routes every address to one `InMemoryStore`.
#[derive(Clone, Default)]
pub struct InMemoryConnector {
    store: InMemoryStore,
    state: SharedState,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing store, e.g. to share data between pools.
    pub fn with_store(store: InMemoryStore) -> Self {
        Self {
            store,
            state: SharedState::default(),
        }
    }

    /// The store behind every transport.
    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    /// Counters for one `host:port` address.
    pub fn transport_stats(&self, address: &str) -> TransportStats {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.get(address).map(|s| s.stats))
            .unwrap_or_default()
    }

    /// Make the next remote call on `address` fail with `message`.
    pub fn fail_next(&self, address: &str, message: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.entry(address.to_string()).or_default().fail_next = Some(message.to_string());
        }
    }

    /// Make opening `address` fail until switched back off.
    pub fn refuse_open(&self, address: &str, refuse: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.entry(address.to_string()).or_default().refuse_open = refuse;
        }
    }
}

impl Connector for InMemoryConnector {
    fn connect(&self, host: &str, port: u16) -> Option<Box<dyn Transport>> {
        Some(Box::new(InMemoryTransport {
            address: format!("{}:{}", host, port),
            store: self.store.clone(),
            state: self.state.clone(),
            open: false,
        }))
    }
}

/// One connection produced by `InMemoryConnector`.
pub struct InMemoryTransport {
    address: String,
    store: InMemoryStore,
    state: SharedState,
    open: bool,
}

impl InMemoryTransport {
    fn with_state<T>(&self, f: impl FnOnce(&mut AddressState) -> T) -> Result<T, StoreError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StoreError::LockPoisoned("transport state"))?;
        Ok(f(state.entry(self.address.clone()).or_default()))
    }

    fn begin_call(&self) -> Result<(), StoreError> {
        if !self.open {
            return Err(StoreError::Transport(format!(
                "transport to {} is closed",
                self.address
            )));
        }
        let failure = self.with_state(|s| {
            s.stats.calls += 1;
            s.fail_next.take()
        })?;
        match failure {
            Some(message) => Err(StoreError::Transport(message)),
            None => Ok(()),
        }
    }
}

impl Transport for InMemoryTransport {
    fn is_open(&self) -> bool {
        self.open
    }

    fn open(&mut self) -> Result<(), StoreError> {
        let refused = self.with_state(|s| {
            s.stats.opens += 1;
            s.refuse_open
        })?;
        if refused {
            return Err(StoreError::Transport(format!(
                "could not connect to {}",
                self.address
            )));
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        let _ = self.with_state(|s| s.stats.closes += 1);
    }
}

impl Store for InMemoryTransport {
    fn get_slice(
        &self,
        namespace: &str,
        row_id: &str,
        parent: &ColumnParent,
        predicate: &SlicePredicate,
        consistency: ConsistencyLevel,
    ) -> Result<Vec<Column>, StoreError> {
        self.begin_call()?;
        self.store
            .get_slice(namespace, row_id, parent, predicate, consistency)
    }

    fn multiget_slice(
        &self,
        namespace: &str,
        row_ids: &[String],
        parent: &ColumnParent,
        predicate: &SlicePredicate,
        consistency: ConsistencyLevel,
    ) -> Result<BTreeMap<String, Vec<Column>>, StoreError> {
        self.begin_call()?;
        self.store
            .multiget_slice(namespace, row_ids, parent, predicate, consistency)
    }

    fn batch_insert(
        &self,
        namespace: &str,
        row_id: &str,
        mutations: BTreeMap<String, Vec<Mutation>>,
        consistency: ConsistencyLevel,
    ) -> Result<(), StoreError> {
        self.begin_call()?;
        self.store
            .batch_insert(namespace, row_id, mutations, consistency)
    }

    fn insert(
        &self,
        namespace: &str,
        row_id: &str,
        path: &ColumnPath,
        value: &str,
        timestamp: i64,
        consistency: ConsistencyLevel,
    ) -> Result<(), StoreError> {
        self.begin_call()?;
        self.store
            .insert(namespace, row_id, path, value, timestamp, consistency)
    }

    fn remove(
        &self,
        namespace: &str,
        row_id: &str,
        path: &ColumnPath,
        timestamp: i64,
        consistency: ConsistencyLevel,
    ) -> Result<(), StoreError> {
        self.begin_call()?;
        self.store
            .remove(namespace, row_id, path, timestamp, consistency)
    }

    fn get_count(
        &self,
        namespace: &str,
        row_id: &str,
        parent: &ColumnParent,
        consistency: ConsistencyLevel,
    ) -> Result<usize, StoreError> {
        self.begin_call()?;
        self.store.get_count(namespace, row_id, parent, consistency)
    }

    fn get_key_range(
        &self,
        namespace: &str,
        collection: &str,
        start: &str,
        finish: &str,
        count: usize,
        consistency: ConsistencyLevel,
    ) -> Result<Vec<String>, StoreError> {
        self.begin_call()?;
        self.store
            .get_key_range(namespace, collection, start, finish, count, consistency)
    }
}
