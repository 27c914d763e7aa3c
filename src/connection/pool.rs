use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::thread::{self, ThreadId};

use super::{Client, Connector};
use crate::config::Config;
use crate::error::StoreError;
use crate::store::ConsistencyLevel;

/// Clients are cached per process, thread and namespace.
type ClientKey = (u32, ThreadId, String);

/// Namespace → server address registry that hands out per-thread clients.
pub struct Pool {
    connector: Arc<dyn Connector>,
    servers: RwLock<HashMap<String, Vec<String>>>,
    clients: Mutex<HashMap<ClientKey, Arc<Client>>>,
    consistency: ConsistencyLevel,
}

impl Pool {
    /// Create an empty pool whose clients connect through `connector`.
    pub fn new(connector: impl Connector + 'static) -> Self {
        Pool {
            connector: Arc::new(connector),
            servers: RwLock::new(HashMap::new()),
            clients: Mutex::new(HashMap::new()),
            consistency: ConsistencyLevel::default(),
        }
    }

    /// Create a pool with every namespace in `config` registered.
    pub fn from_config(config: &Config, connector: impl Connector + 'static) -> Result<Self, StoreError> {
        let pool = Pool::new(connector).with_consistency(config.consistency);
        for (namespace, servers) in &config.pools {
            pool.register(namespace, servers.iter().cloned())?;
        }
        Ok(pool)
    }

    /// Set the consistency level used when an operation is not given one.
    pub fn with_consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = consistency;
        self
    }

    /// The default consistency level for operations through this pool.
    pub fn consistency(&self) -> ConsistencyLevel {
        self.consistency
    }

    /// Store the server addresses for `namespace`, replacing any earlier
    /// registration. Clients already built for the namespace are dropped.
    pub fn register<I, S>(&self, namespace: &str, servers: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let servers: Vec<String> = servers.into_iter().map(Into::into).collect();
        tracing::info!(namespace, servers = ?servers, "registering pool");

        self.servers
            .write()
            .map_err(|_| StoreError::LockPoisoned("pool register"))?
            .insert(namespace.to_string(), servers);
        self.clients
            .lock()
            .map_err(|_| StoreError::LockPoisoned("pool register"))?
            .retain(|(_, _, ns), _| ns != namespace);
        Ok(())
    }

    /// Whether `namespace` has servers registered.
    pub fn is_registered(&self, namespace: &str) -> bool {
        self.servers
            .read()
            .map(|servers| servers.contains_key(namespace))
            .unwrap_or(false)
    }

    /// The client for `namespace` on the calling thread, built on first use.
    ///
    /// The client stays cached until `release` is called on the same thread
    /// or the namespace is registered again. Short-lived threads should
    /// release their clients before exiting.
    pub fn acquire(&self, namespace: &str) -> Result<Arc<Client>, StoreError> {
        let key = client_key(namespace);

        let mut clients = self
            .clients
            .lock()
            .map_err(|_| StoreError::LockPoisoned("pool acquire"))?;
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let servers = self
            .servers
            .read()
            .map_err(|_| StoreError::LockPoisoned("pool acquire"))?
            .get(namespace)
            .cloned()
            .ok_or_else(|| StoreError::PoolNotFound(namespace.to_string()))?;

        tracing::debug!(namespace, "building client");
        let client = Arc::new(Client::new(&servers, self.connector.as_ref()));
        clients.insert(key, client.clone());
        Ok(client)
    }

    /// Drop the calling thread's client for `namespace`. Returns whether one
    /// was cached. Handles already acquired keep working until dropped.
    pub fn release(&self, namespace: &str) -> Result<bool, StoreError> {
        let released = self
            .clients
            .lock()
            .map_err(|_| StoreError::LockPoisoned("pool release"))?
            .remove(&client_key(namespace))
            .is_some();
        if released {
            tracing::debug!(namespace, "released client");
        }
        Ok(released)
    }

    /// Number of cached clients across all threads.
    pub fn client_count(&self) -> usize {
        self.clients.lock().map(|clients| clients.len()).unwrap_or(0)
    }
}

fn client_key(namespace: &str) -> ClientKey {
    (std::process::id(), thread::current().id(), namespace.to_string())
}

static GLOBAL: OnceLock<Pool> = OnceLock::new();

/// Install the process-wide pool used by `register_pool` and `acquire`.
/// Fails if one is already installed.
pub fn set_global(pool: Pool) -> Result<(), StoreError> {
    GLOBAL
        .set(pool)
        .map_err(|_| StoreError::Config("global pool already installed".into()))
}

/// The process-wide pool.
pub fn global() -> Result<&'static Pool, StoreError> {
    GLOBAL
        .get()
        .ok_or_else(|| StoreError::Config("no global pool installed".into()))
}

/// Register servers for `namespace` on the process-wide pool.
pub fn register_pool<I, S>(namespace: &str, servers: I) -> Result<(), StoreError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    global()?.register(namespace, servers)
}

/// Acquire a client for `namespace` from the process-wide pool.
pub fn acquire(namespace: &str) -> Result<Arc<Client>, StoreError> {
    global()?.acquire(namespace)
}
