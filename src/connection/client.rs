use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rand::Rng;

use super::{Connector, Transport};
use crate::error::StoreError;
use crate::store::{
    Column, ColumnParent, ColumnPath, ConsistencyLevel, Mutation, SlicePredicate, Store,
};

/// A load-balancing client over every address registered for a namespace.
///
/// Each call goes to the next connection in round-robin order, starting from
/// a random offset so that many clients created together do not all hit the
/// first server. A failed call closes its connection and is surfaced; the
/// client never retries on another server.
///
/// Clients are meant to be used by one thread. Acquire them through a `Pool`
/// rather than sharing a handle.
pub struct Client {
    servers: Vec<String>,
    connections: Vec<Mutex<Box<dyn Transport>>>,
    cursor: AtomicUsize,
}

impl Client {
    /// Build a client, dropping addresses that do not parse as `host:port`
    /// or that the connector refuses.
    pub fn new(servers: &[String], connector: &dyn Connector) -> Self {
        let connections: Vec<_> = servers
            .iter()
            .filter_map(|server| {
                let (host, port) = parse_address(server)?;
                let transport = connector.connect(host, port);
                if transport.is_none() {
                    tracing::warn!(server = %server, "connector refused address");
                }
                transport
            })
            .map(Mutex::new)
            .collect();

        let start = if connections.is_empty() {
            0
        } else {
            rand::thread_rng().gen_range(0..connections.len())
        };

        Client {
            servers: servers.to_vec(),
            connections,
            cursor: AtomicUsize::new(start),
        }
    }

    /// The addresses this client was built from.
    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    /// Number of usable connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn next_connection(&self) -> Result<(usize, &Mutex<Box<dyn Transport>>), StoreError> {
        if self.connections.is_empty() {
            return Err(StoreError::NoServersConfigured);
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        Ok((index, &self.connections[index]))
    }

    /// Pick the next connection, open it if needed and run `call` on it.
    fn invoke<T>(
        &self,
        operation: &'static str,
        call: impl FnOnce(&dyn Transport) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let (index, slot) = self.next_connection()?;
        let mut transport = slot
            .lock()
            .map_err(|_| StoreError::LockPoisoned("connection"))?;

        if !transport.is_open() {
            tracing::debug!(server = index, "opening transport");
            if let Err(err) = transport.open() {
                transport.close();
                tracing::warn!(server = index, error = %err, "connect failed");
                return Err(into_transport(err));
            }
        }

        call(&**transport).map_err(|err| {
            transport.close();
            tracing::warn!(server = index, operation, error = %err, "remote call failed");
            into_transport(err)
        })
    }
}

fn parse_address(server: &str) -> Option<(&str, u16)> {
    let (host, port) = server.rsplit_once(':')?;
    let port = port.parse().ok()?;
    if host.is_empty() {
        return None;
    }
    Some((host, port))
}

fn into_transport(err: StoreError) -> StoreError {
    match err {
        StoreError::Transport(_) => err,
        other => StoreError::Transport(other.to_string()),
    }
}

impl Store for Client {
    fn get_slice(
        &self,
        namespace: &str,
        row_id: &str,
        parent: &ColumnParent,
        predicate: &SlicePredicate,
        consistency: ConsistencyLevel,
    ) -> Result<Vec<Column>, StoreError> {
        self.invoke("get_slice", |t| {
            t.get_slice(namespace, row_id, parent, predicate, consistency)
        })
    }

    fn multiget_slice(
        &self,
        namespace: &str,
        row_ids: &[String],
        parent: &ColumnParent,
        predicate: &SlicePredicate,
        consistency: ConsistencyLevel,
    ) -> Result<BTreeMap<String, Vec<Column>>, StoreError> {
        self.invoke("multiget_slice", |t| {
            t.multiget_slice(namespace, row_ids, parent, predicate, consistency)
        })
    }

    fn batch_insert(
        &self,
        namespace: &str,
        row_id: &str,
        mutations: BTreeMap<String, Vec<Mutation>>,
        consistency: ConsistencyLevel,
    ) -> Result<(), StoreError> {
        self.invoke("batch_insert", |t| {
            t.batch_insert(namespace, row_id, mutations, consistency)
        })
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
        self.invoke("insert", |t| {
            t.insert(namespace, row_id, path, value, timestamp, consistency)
        })
    }

    fn remove(
        &self,
        namespace: &str,
        row_id: &str,
        path: &ColumnPath,
        timestamp: i64,
        consistency: ConsistencyLevel,
    ) -> Result<(), StoreError> {
        self.invoke("remove", |t| {
            t.remove(namespace, row_id, path, timestamp, consistency)
        })
    }

    fn get_count(
        &self,
        namespace: &str,
        row_id: &str,
        parent: &ColumnParent,
        consistency: ConsistencyLevel,
    ) -> Result<usize, StoreError> {
        self.invoke("get_count", |t| {
            t.get_count(namespace, row_id, parent, consistency)
        })
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
        self.invoke("get_key_range", |t| {
            t.get_key_range(namespace, collection, start, finish, count, consistency)
        })
    }
}
