//! Key - how to reach a row.
//!
//! A key is a namespace, a collection and a row id, plus an optional
//! sub-collection for nested addressing. Keys are immutable. `clone_with`
//! derives a new key that overrides some attributes and resolves the rest
//! through its parent, so views can stamp row ids onto a template key
//! without copying it.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{ColumnParent, ColumnPath};

/// The attributes a key resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyField {
    Namespace,
    Collection,
    RowId,
    SubCollection,
}

/// Attributes overridden by a derived key.
///
/// Empty strings are ignored, so a derived key can never lose its namespace,
/// collection or row id. `flat()` is the only way to drop a sub-collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyOverrides {
    namespace: Option<String>,
    collection: Option<String>,
    row_id: Option<String>,
    sub_collection: Option<Option<String>>,
}

impl KeyOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = non_empty(namespace.into());
        self
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = non_empty(collection.into());
        self
    }

    pub fn row_id(mut self, row_id: impl Into<String>) -> Self {
        self.row_id = non_empty(row_id.into());
        self
    }

    pub fn sub_collection(mut self, sub_collection: impl Into<String>) -> Self {
        if let Some(sub_collection) = non_empty(sub_collection.into()) {
            self.sub_collection = Some(Some(sub_collection));
        }
        self
    }

    /// Override the sub-collection with "none", addressing the flat row.
    pub fn flat(mut self) -> Self {
        self.sub_collection = Some(None);
        self
    }

    /// `None` when not overridden; `Some(None)` when overridden to unset.
    fn get(&self, field: KeyField) -> Option<Option<&str>> {
        match field {
            KeyField::Namespace => self.namespace.as_deref().map(Some),
            KeyField::Collection => self.collection.as_deref().map(Some),
            KeyField::RowId => self.row_id.as_deref().map(Some),
            KeyField::SubCollection => self.sub_collection.as_ref().map(|s| s.as_deref()),
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

struct KeyParts {
    namespace: String,
    collection: String,
    row_id: String,
    sub_collection: Option<String>,
}

enum KeyNode {
    Base(KeyParts),
    /// `parent` is only `None` while the chain is being torn down.
    Derived { parent: Option<Key>, overrides: KeyOverrides },
}

/// An address of a row (or of a sub-collection inside a row).
#[derive(Clone)]
pub struct Key {
    node: Arc<KeyNode>,
}

impl Key {
    /// A key with a freshly generated row id.
    pub fn new(namespace: impl Into<String>, collection: impl Into<String>) -> Result<Self, StoreError> {
        Self::build(namespace, collection, None, None)
    }

    /// A key for an existing row id.
    pub fn with_row_id(
        namespace: impl Into<String>,
        collection: impl Into<String>,
        row_id: impl Into<String>,
    ) -> Result<Self, StoreError> {
        Self::build(namespace, collection, Some(row_id.into()), None)
    }

    /// Fully specified constructor. A missing or empty row id is replaced by
    /// a random 32 character hex id, fixed for the life of the key.
    pub fn build(
        namespace: impl Into<String>,
        collection: impl Into<String>,
        row_id: Option<String>,
        sub_collection: Option<String>,
    ) -> Result<Self, StoreError> {
        let namespace = namespace.into();
        let collection = collection.into();
        if namespace.is_empty() || collection.is_empty() {
            return Err(StoreError::IncompleteKey(
                "a namespace and a collection are required".into(),
            ));
        }

        let row_id = row_id
            .and_then(non_empty)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        Ok(Key {
            node: Arc::new(KeyNode::Base(KeyParts {
                namespace,
                collection,
                row_id,
                sub_collection: sub_collection.and_then(non_empty),
            })),
        })
    }

    /// Derive a key that overrides some attributes and delegates the rest to
    /// `self`. The parent is shared, not copied.
    pub fn clone_with(&self, overrides: KeyOverrides) -> Key {
        Key {
            node: Arc::new(KeyNode::Derived {
                parent: Some(self.clone()),
                overrides,
            }),
        }
    }

    /// Shorthand for deriving a key with a different row id.
    pub fn for_row(&self, row_id: impl Into<String>) -> Key {
        self.clone_with(KeyOverrides::new().row_id(row_id))
    }

    /// Look up an attribute, checking overrides before walking up the chain.
    pub fn resolve(&self, field: KeyField) -> Option<&str> {
        let mut key = self;
        loop {
            match key.node.as_ref() {
                KeyNode::Base(parts) => {
                    return match field {
                        KeyField::Namespace => Some(parts.namespace.as_str()),
                        KeyField::Collection => Some(parts.collection.as_str()),
                        KeyField::RowId => Some(parts.row_id.as_str()),
                        KeyField::SubCollection => parts.sub_collection.as_deref(),
                    };
                }
                KeyNode::Derived { parent, overrides } => {
                    if let Some(value) = overrides.get(field) {
                        return value;
                    }
                    key = parent.as_ref()?;
                }
            }
        }
    }

    pub fn namespace(&self) -> &str {
        self.resolve(KeyField::Namespace).unwrap_or_default()
    }

    pub fn collection(&self) -> &str {
        self.resolve(KeyField::Collection).unwrap_or_default()
    }

    pub fn row_id(&self) -> &str {
        self.resolve(KeyField::RowId).unwrap_or_default()
    }

    pub fn sub_collection(&self) -> Option<&str> {
        self.resolve(KeyField::SubCollection)
    }

    /// Whether this key addresses a sub-collection inside the row.
    pub fn is_nested(&self) -> bool {
        self.sub_collection().is_some()
    }

    /// The parent key, if this key was derived.
    pub fn parent_key(&self) -> Option<&Key> {
        match self.node.as_ref() {
            KeyNode::Base(_) => None,
            KeyNode::Derived { parent, .. } => parent.as_ref(),
        }
    }

    /// The container slices and counts read from.
    pub fn parent(&self) -> ColumnParent {
        ColumnParent {
            collection: self.collection().to_string(),
            sub_collection: self.sub_collection().map(str::to_string),
        }
    }

    /// Path to everything this key addresses.
    pub fn path(&self) -> ColumnPath {
        ColumnPath {
            collection: self.collection().to_string(),
            sub_collection: self.sub_collection().map(str::to_string),
            column: None,
        }
    }

    /// Path to a single column under this key.
    pub fn column_path(&self, column: impl Into<String>) -> ColumnPath {
        ColumnPath {
            column: Some(column.into()),
            ..self.path()
        }
    }
}

// Unlink uniquely owned ancestors one at a time so long chains drop without
// recursing.
impl Drop for Key {
    fn drop(&mut self) {
        let mut next = take_parent(&mut self.node);
        while let Some(mut key) = next {
            next = take_parent(&mut key.node);
        }
    }
}

fn take_parent(node: &mut Arc<KeyNode>) -> Option<Key> {
    match Arc::get_mut(node)? {
        KeyNode::Derived { parent, .. } => parent.take(),
        KeyNode::Base(_) => None,
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.namespace() == other.namespace()
            && self.collection() == other.collection()
            && self.row_id() == other.row_id()
            && self.sub_collection() == other.sub_collection()
    }
}

impl Eq for Key {}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("namespace", &self.namespace())
            .field("collection", &self.collection())
            .field("row_id", &self.row_id())
            .field("sub_collection", &self.sub_collection())
            .finish()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace(), self.collection(), self.row_id())?;
        if let Some(sub) = self.sub_collection() {
            write!(f, "/{}", sub)?;
        }
        Ok(())
    }
}
