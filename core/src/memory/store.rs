//! Store trait and StoreError for cross-thread memory.
//!
//! Aligns with BaseStore pattern (namespace, put, get, list, search).
//!
//! ## Core Types
//!
//! - [`Store`]: The main trait for persistent key-value stores.
//! - [`Item`]: Stored key-value pairs with metadata (namespace, key, value, timestamps).
//! - [`SearchItem`]: Search result with optional relevance score.
//! - [`StoreOp`]: Operations for batch execution (Get, Put, Search, Delete, ListNamespaces).
//!
//! ## Example
//!
//! ```rust,ignore
//! use crate::memory::{Store, Namespace};
//!
//! // Single operations
//! store.put(&namespace, "key1", &json!({"data": "value"})).await?;
//! let item = store.get(&namespace, "key1").await?;
//!
//! // Batch operations
//! let results = store.batch(vec![
//!     StoreOp::Get { namespace: ns.clone(), key: "k1".into() },
//!     StoreOp::Put { namespace: ns.clone(), key: "k2".into(), value: json!({}) },
//! ]).await?;
//! ```

use async_trait::async_trait;
use std::time::SystemTime;

/// Namespace for Store: e.g. (user_id, "memories") or (user_id, "preferences").
///
/// Namespace tuple for store keys. Each element in the vector represents
/// one level in the hierarchy, allowing for nested categorization.
///
/// ## Example
///
/// ```rust
/// use crate::memory::Namespace;
///
/// let ns: Namespace = vec!["users".into(), "user123".into(), "memories".into()];
/// ```
pub type Namespace = Vec<String>;

/// Error for store operations.
///
/// Callers do not depend on underlying backend errors (e.g. rusqlite, lancedb).
/// Use `?` with `serde_json::Error` via `From` impl for serialization failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// JSON or namespace serialization/deserialization failed.
    #[error("serialization: {0}")]
    Serialization(String),

    /// Backend storage error (e.g. DB I/O). Message is opaque to avoid leaking backend types.
    #[error("storage: {0}")]
    Storage(String),

    /// Key not found in given namespace (optional; get may use `Ok(None)` instead).
    #[error("not found")]
    NotFound,

    /// Embedding generation error (e.g. OpenAI API error).
    #[error("embedding: {0}")]
    EmbeddingError(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Represents a stored item with metadata.
///
/// Item with metadata for store operations. Contains the stored value along with
/// key, namespace, and timestamps for creation and last update.
///
/// ## Interaction
///
/// - Returned by [`Store::get`] and [`Store::batch`] (for GetOp).
/// - Stored via [`Store::put`] and [`Store::batch`] (for PutOp).
#[derive(Debug, Clone)]
pub struct Item {
    /// The stored data as a JSON value. Keys are filterable.
    pub value: serde_json::Value,
    /// Unique identifier within the namespace.
    pub key: String,
    /// Hierarchical path defining the collection in which this item resides.
    pub namespace: Namespace,
    /// Timestamp of item creation.
    pub created_at: SystemTime,
    /// Timestamp of last update.
    pub updated_at: SystemTime,
}

impl Item {
    /// Creates a new Item with the current timestamp for both created_at and updated_at.
    pub fn new(namespace: Namespace, key: String, value: serde_json::Value) -> Self {
        let now = SystemTime::now();
        Self {
            value,
            key,
            namespace,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates an Item with explicit timestamps (useful for restoration from storage).
    pub fn with_timestamps(
        namespace: Namespace,
        key: String,
        value: serde_json::Value,
        created_at: SystemTime,
        updated_at: SystemTime,
    ) -> Self {
        Self {
            value,
            key,
            namespace,
            created_at,
            updated_at,
        }
    }
}

/// Represents an item returned from a search operation with additional metadata.
///
/// Extends [`Item`] with an optional relevance/similarity score. For key-value
/// or string-filter search, `score` is `None`. For semantic/vector search,
/// `score` is the similarity (e.g., cosine or L2).
#[derive(Debug, Clone)]
pub struct SearchItem {
    /// The base item data.
    pub item: Item,
    /// Relevance/similarity score if from a ranked operation; `None` for non-ranked search.
    pub score: Option<f64>,
}

impl SearchItem {
    /// Creates a SearchItem from an Item without a score (non-ranked search).
    pub fn from_item(item: Item) -> Self {
        Self { item, score: None }
    }

    /// Creates a SearchItem from an Item with a relevance score.
    pub fn with_score(item: Item, score: f64) -> Self {
        Self {
            item,
            score: Some(score),
        }
    }
}

/// Filter operators for search operations.
///
/// Supports exact matches and comparison operators.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Equal to (same as direct value comparison).
    Eq(serde_json::Value),
    /// Not equal to.
    Ne(serde_json::Value),
    /// Greater than.
    Gt(serde_json::Value),
    /// Greater than or equal to.
    Gte(serde_json::Value),
    /// Less than.
    Lt(serde_json::Value),
    /// Less than or equal to.
    Lte(serde_json::Value),
}

/// Options for search operations.
///
/// Used to configure [`Store::search`] behavior.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Natural language search query for semantic search capabilities.
    pub query: Option<String>,
    /// Key-value pairs for filtering results based on exact matches or comparison operators.
    pub filter: Option<std::collections::HashMap<String, FilterOp>>,
    /// Maximum number of items to return in the search results. Default: 10.
    pub limit: usize,
    /// Number of matching items to skip for pagination. Default: 0.
    pub offset: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchOptions {
    /// Creates default search options with limit=10 and offset=0.
    pub fn new() -> Self {
        Self {
            query: None,
            filter: None,
            limit: 10,
            offset: 0,
        }
    }

    /// Sets the query for semantic search.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Sets the limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the offset for pagination.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Match type for namespace filtering in list operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceMatchType {
    /// Match from the start of the namespace.
    Prefix,
    /// Match from the end of the namespace.
    Suffix,
}

/// Condition for matching namespaces in list operations.
#[derive(Debug, Clone)]
pub struct MatchCondition {
    /// Type of namespace matching to perform.
    pub match_type: NamespaceMatchType,
    /// Namespace path pattern (supports "*" wildcard).
    pub path: Vec<String>,
}

impl MatchCondition {
    /// Creates a prefix match condition.
    pub fn prefix(path: Vec<String>) -> Self {
        Self {
            match_type: NamespaceMatchType::Prefix,
            path,
        }
    }

    /// Creates a suffix match condition.
    pub fn suffix(path: Vec<String>) -> Self {
        Self {
            match_type: NamespaceMatchType::Suffix,
            path,
        }
    }
}

/// Options for listing namespaces.
#[derive(Debug, Clone, Default)]
pub struct ListNamespacesOptions {
    /// Optional conditions for filtering namespaces.
    pub match_conditions: Vec<MatchCondition>,
    /// Maximum depth of namespace hierarchy to return.
    pub max_depth: Option<usize>,
    /// Maximum number of namespaces to return. Default: 100.
    pub limit: usize,
    /// Number of namespaces to skip for pagination. Default: 0.
    pub offset: usize,
}

impl ListNamespacesOptions {
    /// Creates default options with limit=100 and offset=0.
    pub fn new() -> Self {
        Self {
            match_conditions: Vec::new(),
            max_depth: None,
            limit: 100,
            offset: 0,
        }
    }

    /// Adds a prefix match condition.
    pub fn with_prefix(mut self, prefix: Vec<String>) -> Self {
        self.match_conditions.push(MatchCondition::prefix(prefix));
        self
    }

    /// Adds a suffix match condition.
    pub fn with_suffix(mut self, suffix: Vec<String>) -> Self {
        self.match_conditions.push(MatchCondition::suffix(suffix));
        self
    }

    /// Sets the maximum depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Sets the limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Operations for batch execution.
///
/// Op types for store operations (GetOp, PutOp, SearchOp, ListNamespacesOp).
/// Used with [`Store::batch`] for executing multiple operations efficiently.
#[derive(Debug, Clone)]
pub enum StoreOp {
    /// Retrieve a specific item by namespace and key.
    Get { namespace: Namespace, key: String },
    /// Store or update an item. Set `value` to `None` to delete.
    Put {
        namespace: Namespace,
        key: String,
        value: Option<serde_json::Value>,
    },
    /// Search for items within a namespace prefix.
    Search {
        namespace_prefix: Namespace,
        options: SearchOptions,
    },
    /// List namespaces matching the given conditions.
    ListNamespaces { options: ListNamespacesOptions },
}

/// Result from a batch operation.
///
/// Each variant corresponds to the result of a specific [`StoreOp`].
#[derive(Debug, Clone)]
pub enum StoreOpResult {
    /// Result of a Get operation: the item if found, or None.
    Get(Option<Item>),
    /// Result of a Put operation: success indicator.
    Put,
    /// Result of a Search operation: list of matching items with optional scores.
    Search(Vec<SearchItem>),
    /// Result of a ListNamespaces operation: list of matching namespaces.
    ListNamespaces(Vec<Namespace>),
}


/// A single hit returned by [`Store::search_simple`] (legacy API).
///
/// For key-value or string-filter search (e.g. [`crate::memory::InMemoryStore`], [`crate::memory::SqliteStore`]),
/// `score` is `None`. For semantic/vector search (e.g. LanceStore), `score` is the similarity (e.g. cosine or L2).
#[derive(Debug, Clone)]
pub struct StoreSearchHit {
    /// The key of the matched entry within the namespace.
    pub key: String,
    /// The stored value (JSON).
    pub value: serde_json::Value,
    /// Similarity score when using vector search; `None` for string-filter-only stores.
    pub score: Option<f64>,
}

/// Long-term cross-session store: namespace-isolated key-value with optional search.
///
/// Used for user preferences, long-term memories, and retrievable facts. Not tied to a single
/// thread; use [`Namespace`] (e.g. `[user_id, "memories"]`) for multi-tenant isolation. Differs
/// from [`crate::memory::Checkpointer`], which is per-thread checkpoint state.
///
/// Base trait for store backends.
///
/// ## Core Operations
///
/// - **put**: Store or update an item by `(namespace, key)`.
/// - **get**: Retrieve an item by `(namespace, key)`, returns `None` if not found.
/// - **delete**: Remove an item by `(namespace, key)`.
/// - **search**: Search for items within a namespace prefix with optional query and filters.
/// - **list_namespaces**: List namespaces matching given conditions.
/// - **batch**: Execute multiple operations efficiently in a single call.
///
/// ## Example
///
/// ```rust,ignore
/// use crate::memory::{Store, Namespace, SearchOptions};
///
/// let ns: Namespace = vec!["user123".into(), "memories".into()];
///
/// // Store an item
/// store.put(&ns, "mem1", &json!({"content": "User prefers dark mode"})).await?;
///
/// // Retrieve the item
/// if let Some(item) = store.get_item(&ns, "mem1").await? {
///     println!("Found: {:?}", item.value);
/// }
///
/// // Search within namespace
/// let results = store.search(&ns, SearchOptions::new().with_limit(5)).await?;
/// ```
#[async_trait]
pub trait Store: Send + Sync {
    /// Stores `value` under `namespace` and `key`. Replaces any existing value for that key.
    ///
    /// Creates a new [`Item`] with current timestamp or updates an existing one.
    async fn put(
        &self,
        namespace: &Namespace,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Returns the value for `(namespace, key)`, or `None` if not found.
    ///
    /// This is the simple API that returns only the value. Use [`get_item`] for full item metadata.
    async fn get(
        &self,
        namespace: &Namespace,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError>;

    /// Returns the full [`Item`] for `(namespace, key)`, or `None` if not found.
    ///
    /// Unlike [`get`], this returns the complete item with metadata (timestamps, namespace, key).
    async fn get_item(&self, namespace: &Namespace, key: &str) -> Result<Option<Item>, StoreError>;

    /// Deletes the item at `(namespace, key)`.
    ///
    /// Returns `Ok(())` even if the item does not exist (idempotent delete).
    async fn delete(&self, namespace: &Namespace, key: &str) -> Result<(), StoreError>;

    /// Returns all keys in the given namespace (order is implementation-defined).
    async fn list(&self, namespace: &Namespace) -> Result<Vec<String>, StoreError>;

    /// Searches within the namespace prefix with the given options.
    ///
    /// - If `options.query` is `None`, returns items up to `options.limit`.
    /// - If `options.query` is set, filters by string match or semantic similarity
    ///   (implementation-defined).
    /// - Results include optional relevance scores for ranked search.
    async fn search(
        &self,
        namespace_prefix: &Namespace,
        options: SearchOptions,
    ) -> Result<Vec<SearchItem>, StoreError>;

    /// Lists namespaces matching the given options.
    ///
    /// - Filter by prefix/suffix using `options.match_conditions`.
    /// - Limit depth using `options.max_depth`.
    /// - Paginate using `options.limit` and `options.offset`.
    async fn list_namespaces(
        &self,
        options: ListNamespacesOptions,
    ) -> Result<Vec<Namespace>, StoreError>;

    /// Executes multiple operations in a single batch.
    ///
    /// The order of results matches the order of input operations.
    /// More efficient than calling individual operations for bulk data manipulation.
    async fn batch(&self, ops: Vec<StoreOp>) -> Result<Vec<StoreOpResult>, StoreError>;

    // --- Legacy API for backward compatibility ---

    /// Searches within the namespace (legacy API).
    ///
    /// Use [`search`] for the full-featured API with [`SearchOptions`].
    async fn search_simple(
        &self,
        namespace: &Namespace,
        query: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<StoreSearchHit>, StoreError> {
        let options = SearchOptions {
            query: query.map(String::from),
            filter: None,
            limit: limit.unwrap_or(10),
            offset: 0,
        };
        let results = self.search(namespace, options).await?;
        Ok(results
            .into_iter()
            .map(|si| StoreSearchHit {
                key: si.item.key,
                value: si.item.value,
                score: si.score,
            })
            .collect())
    }
}
