//! Graph element store consumed by the mapping layer.
//!
//! The mapping layer never assumes a particular engine: everything it needs
//! from storage goes through [`GraphStore`]. [`MemoryGraph`] is the reference
//! implementation used by the inspector and the test-suite.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Direction, ElementRef, NodeId, PropertyValue, RelId, Relationship};

mod memory;
mod metrics;
mod snapshot;

pub use memory::{ContextGuard, MemoryGraph};
pub use metrics::{CounterMetrics, NoopMetrics, StoreMetrics, StoreMetricsSnapshot};
pub use snapshot::{
    GraphSnapshot, IndexEntrySnapshot, IndexSnapshot, NodeSnapshot, RelationshipSnapshot,
};

/// Which element family an index covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    Nodes,
    Relationships,
}

impl IndexKind {
    pub fn for_element(element: ElementRef) -> Self {
        match element {
            ElementRef::Node(_) => IndexKind::Nodes,
            ElementRef::Relationship(_) => IndexKind::Relationships,
        }
    }
}

/// Node/relationship CRUD, traversal and exact-match indexes.
///
/// Every operation may fail with `StoreUnavailable` or `ElementNotFound`;
/// callers in this crate propagate those failures unchanged.
pub trait GraphStore: Send + Sync {
    /// The fixed root element every database carries.
    fn reference_node(&self) -> Result<NodeId>;

    fn create_node(&self) -> Result<NodeId>;

    /// Deletes a node. Fails while relationships are still attached.
    fn delete_node(&self, node: NodeId) -> Result<()>;

    fn node_exists(&self, node: NodeId) -> Result<bool>;

    fn create_relationship(&self, start: NodeId, end: NodeId, rel_type: &str) -> Result<RelId>;

    fn delete_relationship(&self, rel: RelId) -> Result<()>;

    fn relationship(&self, rel: RelId) -> Result<Relationship>;

    /// Relationships incident to `node`, optionally restricted to one type.
    fn relationships(
        &self,
        node: NodeId,
        direction: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>>;

    fn property(&self, element: ElementRef, key: &str) -> Result<Option<PropertyValue>>;

    fn set_property(&self, element: ElementRef, key: &str, value: PropertyValue) -> Result<()>;

    fn remove_property(&self, element: ElementRef, key: &str) -> Result<Option<PropertyValue>>;

    fn index_exists(&self, kind: IndexKind, name: &str) -> Result<bool>;

    /// Creates the named index unless it exists. Returns `true` if this call
    /// created it. Must be atomic with respect to concurrent callers.
    fn create_index_if_absent(&self, kind: IndexKind, name: &str) -> Result<bool>;

    /// Adds `element` under `key = value`. Adding an existing entry is a no-op.
    fn index_add(
        &self,
        kind: IndexKind,
        name: &str,
        key: &str,
        value: &str,
        element: ElementRef,
    ) -> Result<()>;

    /// Adds `element` under `key = value` only when no entry exists there yet.
    /// Returns the element already present, if any. Atomic.
    fn index_put_if_absent(
        &self,
        kind: IndexKind,
        name: &str,
        key: &str,
        value: &str,
        element: ElementRef,
    ) -> Result<Option<ElementRef>>;

    /// Removes one entry. Returns whether anything was removed.
    fn index_remove(
        &self,
        kind: IndexKind,
        name: &str,
        key: &str,
        value: &str,
        element: ElementRef,
    ) -> Result<bool>;

    /// Exact-match lookup. A missing index yields no hits.
    fn index_get(
        &self,
        kind: IndexKind,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<ElementRef>>;

    /// Whether a transaction/session context is currently open against this
    /// store.
    fn has_active_context(&self) -> bool;
}
