use std::collections::BTreeMap;
use std::fmt;

/// Every failure the data-access layer can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Key construction without a namespace or collection.
    IncompleteKey(String),
    /// Save or remove attempted with no key and no default-key policy.
    MissingKey,
    /// Save attempted while required fields are absent.
    MissingField(Vec<String>),
    /// Set-level form of `MissingField`: row id → missing fields.
    MissingFields(BTreeMap<String, Vec<String>>),
    /// Attempt to assign the absence marker to a field.
    InvalidValue(String),
    /// Load found an empty row.
    NoSuchRecord(String),
    /// Save attempted on a read-only record.
    Immutable,
    /// No servers registered for a namespace.
    PoolNotFound(String),
    /// A client has zero usable endpoints.
    NoServersConfigured,
    /// Remote call or connection failure.
    Transport(String),
    /// A partitioned view yielded no partitions to write into.
    NoPartitions,
    LockPoisoned(&'static str),
    Config(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::IncompleteKey(msg) => write!(f, "incomplete key: {}", msg),
            StoreError::MissingKey => write!(f, "no key has been set"),
            StoreError::MissingField(fields) => {
                write!(f, "missing required field(s): {}", fields.join(", "))
            }
            StoreError::MissingFields(by_row) => {
                write!(f, "missing required field(s):")?;
                for (row_id, fields) in by_row {
                    write!(f, " {} [{}]", row_id, fields.join(", "))?;
                }
                Ok(())
            }
            StoreError::InvalidValue(msg) => write!(f, "invalid value: {}", msg),
            StoreError::NoSuchRecord(key) => write!(f, "no record matching key {}", key),
            StoreError::Immutable => write!(f, "immutable object: save is not permitted"),
            StoreError::PoolNotFound(name) => write!(f, "pool `{}' is not defined", name),
            StoreError::NoServersConfigured => write!(f, "no servers configured"),
            StoreError::Transport(msg) => write!(f, "transport error: {}", msg),
            StoreError::NoPartitions => write!(f, "partitioned view has no partitions"),
            StoreError::LockPoisoned(operation) => {
                write!(f, "lock poisoned during {}", operation)
            }
            StoreError::Config(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl StoreError {
    /// Map this error to the HTTP status the record endpoints answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::NoSuchRecord(_) => 404,
            _ => 500,
        }
    }

    /// True for the record-level and set-level missing field errors.
    pub fn is_missing_field(&self) -> bool {
        matches!(
            self,
            StoreError::MissingField(_) | StoreError::MissingFields(_)
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::InvalidValue(err.to_string())
    }
}
