use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use super::metrics::{default_metrics, StoreMetrics};
use super::{GraphStore, IndexKind};
use crate::error::{OgmError, Result};
use crate::model::{Direction, ElementRef, NodeId, PropertyValue, RelId, Relationship};

pub(crate) type Properties = BTreeMap<String, PropertyValue>;
pub(crate) type IndexEntries = BTreeMap<(String, String), BTreeSet<ElementRef>>;

#[derive(Clone, Debug)]
pub(crate) struct RelRecord {
    pub(crate) rel: Relationship,
    pub(crate) props: Properties,
}

#[derive(Default)]
pub(crate) struct GraphData {
    pub(crate) next_node: u64,
    pub(crate) next_rel: u64,
    pub(crate) reference: NodeId,
    pub(crate) nodes: BTreeMap<NodeId, Properties>,
    pub(crate) relationships: BTreeMap<RelId, RelRecord>,
    pub(crate) outgoing: FxHashMap<NodeId, BTreeSet<RelId>>,
    pub(crate) incoming: FxHashMap<NodeId, BTreeSet<RelId>>,
    pub(crate) indexes: BTreeMap<(IndexKind, String), IndexEntries>,
}

impl GraphData {
    pub(crate) fn with_reference_node() -> Self {
        let mut data = GraphData {
            next_node: 1,
            reference: NodeId(0),
            ..GraphData::default()
        };
        data.nodes.insert(NodeId(0), Properties::new());
        data
    }

    fn props(&self, element: ElementRef) -> Result<&Properties> {
        let props = match element {
            ElementRef::Node(id) => self.nodes.get(&id),
            ElementRef::Relationship(id) => self.relationships.get(&id).map(|r| &r.props),
        };
        props.ok_or(OgmError::ElementNotFound(element))
    }

    fn props_mut(&mut self, element: ElementRef) -> Result<&mut Properties> {
        let props = match element {
            ElementRef::Node(id) => self.nodes.get_mut(&id),
            ElementRef::Relationship(id) => self.relationships.get_mut(&id).map(|r| &mut r.props),
        };
        props.ok_or(OgmError::ElementNotFound(element))
    }

    fn index_mut(&mut self, kind: IndexKind, name: &str) -> Result<&mut IndexEntries> {
        self.indexes
            .get_mut(&(kind, name.to_string()))
            .ok_or_else(|| OgmError::InvalidArgument(format!("index `{name}` does not exist")))
    }

    pub(crate) fn link(&mut self, rel: &Relationship) {
        self.outgoing.entry(rel.start).or_default().insert(rel.id);
        self.incoming.entry(rel.end).or_default().insert(rel.id);
    }
}

/// In-memory [`GraphStore`] with a reference node, exact-match indexes and an
/// explicit session context counter.
///
/// All mutation happens under one `RwLock`, which is what makes the
/// `*_if_absent` operations atomic.
pub struct MemoryGraph {
    pub(crate) data: RwLock<GraphData>,
    online: AtomicBool,
    contexts: AtomicUsize,
    metrics: Arc<dyn StoreMetrics>,
}

impl std::fmt::Debug for MemoryGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.data.read();
        f.debug_struct("MemoryGraph")
            .field("nodes", &data.nodes.len())
            .field("relationships", &data.relationships.len())
            .field("indexes", &data.indexes.len())
            .field("online", &self.online.load(Ordering::Acquire))
            .field("contexts", &self.contexts.load(Ordering::Acquire))
            .finish()
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::from_data(GraphData::with_reference_node())
    }

    pub(crate) fn from_data(data: GraphData) -> Self {
        Self {
            data: RwLock::new(data),
            online: AtomicBool::new(true),
            contexts: AtomicUsize::new(0),
            metrics: default_metrics(),
        }
    }

    /// Replaces the metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn StoreMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Simulates losing (or regaining) the connection to the store. While
    /// offline every operation fails with `StoreUnavailable`.
    pub fn set_online(&self, online: bool) {
        debug!(online, "memory graph availability changed");
        self.online.store(online, Ordering::Release);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Opens a session context. The context ends when the guard is dropped.
    pub fn begin_context(&self) -> ContextGuard<'_> {
        let depth = self.contexts.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(depth, "store context opened");
        ContextGuard { graph: self }
    }

    pub fn node_count(&self) -> usize {
        self.data.read().nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.data.read().relationships.len()
    }

    /// Names of all indexes of the given kind.
    pub fn index_names(&self, kind: IndexKind) -> Vec<String> {
        self.data
            .read()
            .indexes
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, name)| name.clone())
            .collect()
    }

    fn check_online(&self) -> Result<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(OgmError::StoreUnavailable("memory graph is offline".into()))
        }
    }
}

/// Keeps a store context open for as long as it lives.
#[must_use = "the context closes as soon as the guard is dropped"]
pub struct ContextGuard<'a> {
    graph: &'a MemoryGraph,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let previous = self.graph.contexts.fetch_sub(1, Ordering::AcqRel);
        trace!(depth = previous - 1, "store context closed");
    }
}

impl GraphStore for MemoryGraph {
    fn reference_node(&self) -> Result<NodeId> {
        self.check_online()?;
        Ok(self.data.read().reference)
    }

    fn create_node(&self) -> Result<NodeId> {
        self.check_online()?;
        let mut data = self.data.write();
        let id = NodeId(data.next_node);
        data.next_node += 1;
        data.nodes.insert(id, Properties::new());
        self.metrics.element_created();
        Ok(id)
    }

    fn delete_node(&self, node: NodeId) -> Result<()> {
        self.check_online()?;
        let mut data = self.data.write();
        if node == data.reference {
            return Err(OgmError::InvalidArgument(
                "the reference node cannot be deleted".into(),
            ));
        }
        if !data.nodes.contains_key(&node) {
            return Err(OgmError::ElementNotFound(node.into()));
        }
        let attached = data.outgoing.get(&node).is_some_and(|s| !s.is_empty())
            || data.incoming.get(&node).is_some_and(|s| !s.is_empty());
        if attached {
            return Err(OgmError::InvalidArgument(format!(
                "node {} still has relationships",
                node.0
            )));
        }
        data.nodes.remove(&node);
        data.outgoing.remove(&node);
        data.incoming.remove(&node);
        self.metrics.element_deleted();
        Ok(())
    }

    fn node_exists(&self, node: NodeId) -> Result<bool> {
        self.check_online()?;
        Ok(self.data.read().nodes.contains_key(&node))
    }

    fn create_relationship(&self, start: NodeId, end: NodeId, rel_type: &str) -> Result<RelId> {
        self.check_online()?;
        let mut data = self.data.write();
        for node in [start, end] {
            if !data.nodes.contains_key(&node) {
                return Err(OgmError::ElementNotFound(node.into()));
            }
        }
        let id = RelId(data.next_rel);
        data.next_rel += 1;
        let rel = Relationship {
            id,
            start,
            end,
            rel_type: rel_type.to_string(),
        };
        data.link(&rel);
        data.relationships.insert(
            id,
            RelRecord {
                rel,
                props: Properties::new(),
            },
        );
        self.metrics.element_created();
        Ok(id)
    }

    fn delete_relationship(&self, rel: RelId) -> Result<()> {
        self.check_online()?;
        let mut data = self.data.write();
        let record = data
            .relationships
            .remove(&rel)
            .ok_or(OgmError::ElementNotFound(rel.into()))?;
        if let Some(out) = data.outgoing.get_mut(&record.rel.start) {
            out.remove(&rel);
        }
        if let Some(inc) = data.incoming.get_mut(&record.rel.end) {
            inc.remove(&rel);
        }
        self.metrics.element_deleted();
        Ok(())
    }

    fn relationship(&self, rel: RelId) -> Result<Relationship> {
        self.check_online()?;
        self.data
            .read()
            .relationships
            .get(&rel)
            .map(|r| r.rel.clone())
            .ok_or(OgmError::ElementNotFound(rel.into()))
    }

    fn relationships(
        &self,
        node: NodeId,
        direction: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>> {
        self.check_online()?;
        self.metrics.relationship_scan();
        let data = self.data.read();
        if !data.nodes.contains_key(&node) {
            return Err(OgmError::ElementNotFound(node.into()));
        }
        let empty = BTreeSet::new();
        let outgoing = data.outgoing.get(&node).unwrap_or(&empty);
        let incoming = data.incoming.get(&node).unwrap_or(&empty);
        let ids: BTreeSet<RelId> = match direction {
            Direction::Outgoing => outgoing.clone(),
            Direction::Incoming => incoming.clone(),
            Direction::Both => outgoing.union(incoming).copied().collect(),
        };
        Ok(ids
            .into_iter()
            .filter_map(|id| data.relationships.get(&id))
            .filter(|r| rel_type.map_or(true, |t| r.rel.rel_type == t))
            .map(|r| r.rel.clone())
            .collect())
    }

    fn property(&self, element: ElementRef, key: &str) -> Result<Option<PropertyValue>> {
        self.check_online()?;
        self.metrics.property_read();
        Ok(self.data.read().props(element)?.get(key).cloned())
    }

    fn set_property(&self, element: ElementRef, key: &str, value: PropertyValue) -> Result<()> {
        self.check_online()?;
        self.metrics.property_written();
        self.data
            .write()
            .props_mut(element)?
            .insert(key.to_string(), value);
        Ok(())
    }

    fn remove_property(&self, element: ElementRef, key: &str) -> Result<Option<PropertyValue>> {
        self.check_online()?;
        self.metrics.property_written();
        Ok(self.data.write().props_mut(element)?.remove(key))
    }

    fn index_exists(&self, kind: IndexKind, name: &str) -> Result<bool> {
        self.check_online()?;
        self.metrics.index_query();
        Ok(self
            .data
            .read()
            .indexes
            .contains_key(&(kind, name.to_string())))
    }

    fn create_index_if_absent(&self, kind: IndexKind, name: &str) -> Result<bool> {
        self.check_online()?;
        let mut data = self.data.write();
        let key = (kind, name.to_string());
        if data.indexes.contains_key(&key) {
            return Ok(false);
        }
        data.indexes.insert(key, IndexEntries::new());
        debug!(?kind, index = name, "index created");
        Ok(true)
    }

    fn index_add(
        &self,
        kind: IndexKind,
        name: &str,
        key: &str,
        value: &str,
        element: ElementRef,
    ) -> Result<()> {
        self.check_online()?;
        self.data
            .write()
            .index_mut(kind, name)?
            .entry((key.to_string(), value.to_string()))
            .or_default()
            .insert(element);
        Ok(())
    }

    fn index_put_if_absent(
        &self,
        kind: IndexKind,
        name: &str,
        key: &str,
        value: &str,
        element: ElementRef,
    ) -> Result<Option<ElementRef>> {
        self.check_online()?;
        let mut data = self.data.write();
        let entries = data
            .index_mut(kind, name)?
            .entry((key.to_string(), value.to_string()))
            .or_default();
        if let Some(existing) = entries.iter().next() {
            return Ok(Some(*existing));
        }
        entries.insert(element);
        Ok(None)
    }

    fn index_remove(
        &self,
        kind: IndexKind,
        name: &str,
        key: &str,
        value: &str,
        element: ElementRef,
    ) -> Result<bool> {
        self.check_online()?;
        let mut data = self.data.write();
        let Some(entries) = data.indexes.get_mut(&(kind, name.to_string())) else {
            return Ok(false);
        };
        let slot = (key.to_string(), value.to_string());
        let removed = entries
            .get_mut(&slot)
            .is_some_and(|set| set.remove(&element));
        if entries.get(&slot).is_some_and(BTreeSet::is_empty) {
            entries.remove(&slot);
        }
        Ok(removed)
    }

    fn index_get(
        &self,
        kind: IndexKind,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<ElementRef>> {
        self.check_online()?;
        self.metrics.index_query();
        let data = self.data.read();
        Ok(data
            .indexes
            .get(&(kind, name.to_string()))
            .and_then(|entries| entries.get(&(key.to_string(), value.to_string())))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    fn has_active_context(&self) -> bool {
        self.is_online() && self.contexts.load(Ordering::Acquire) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_graph_has_only_the_reference_node() -> Result<()> {
        let graph = MemoryGraph::new();
        let root = graph.reference_node()?;
        assert!(graph.node_exists(root)?);
        assert_eq!(graph.node_count(), 1);
        assert!(graph
            .relationships(root, Direction::Both, None)?
            .is_empty());
        assert!(graph.index_names(IndexKind::Nodes).is_empty());
        Ok(())
    }

    #[test]
    fn relationships_filter_by_direction_and_type() -> Result<()> {
        let graph = MemoryGraph::new();
        let a = graph.create_node()?;
        let b = graph.create_node()?;
        let knows = graph.create_relationship(a, b, "KNOWS")?;
        let likes = graph.create_relationship(b, a, "LIKES")?;

        let out: Vec<_> = graph
            .relationships(a, Direction::Outgoing, None)?
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(out, vec![knows]);
        let both = graph.relationships(a, Direction::Both, None)?;
        assert_eq!(both.len(), 2);
        let typed = graph.relationships(a, Direction::Both, Some("LIKES"))?;
        assert_eq!(typed.len(), 1);
        assert_eq!(typed[0].id, likes);
        Ok(())
    }

    #[test]
    fn delete_node_refuses_attached_and_reference_nodes() -> Result<()> {
        let graph = MemoryGraph::new();
        let a = graph.create_node()?;
        let b = graph.create_node()?;
        let rel = graph.create_relationship(a, b, "KNOWS")?;
        assert!(matches!(
            graph.delete_node(a),
            Err(OgmError::InvalidArgument(_))
        ));
        graph.delete_relationship(rel)?;
        graph.delete_node(a)?;
        assert!(!graph.node_exists(a)?);
        let root = graph.reference_node()?;
        assert!(graph.delete_node(root).is_err());
        Ok(())
    }

    #[test]
    fn index_entries_are_sets() -> Result<()> {
        let graph = MemoryGraph::new();
        let node = ElementRef::Node(graph.create_node()?);
        assert!(graph.create_index_if_absent(IndexKind::Nodes, "idx")?);
        assert!(!graph.create_index_if_absent(IndexKind::Nodes, "idx")?);
        graph.index_add(IndexKind::Nodes, "idx", "k", "v", node)?;
        graph.index_add(IndexKind::Nodes, "idx", "k", "v", node)?;
        assert_eq!(graph.index_get(IndexKind::Nodes, "idx", "k", "v")?, vec![node]);
        assert!(graph.index_remove(IndexKind::Nodes, "idx", "k", "v", node)?);
        assert!(graph.index_get(IndexKind::Nodes, "idx", "k", "v")?.is_empty());
        Ok(())
    }

    #[test]
    fn index_add_requires_existing_index() -> Result<()> {
        let graph = MemoryGraph::new();
        let node = ElementRef::Node(graph.create_node()?);
        assert!(graph
            .index_add(IndexKind::Nodes, "missing", "k", "v", node)
            .is_err());
        assert!(graph
            .index_get(IndexKind::Nodes, "missing", "k", "v")?
            .is_empty());
        Ok(())
    }

    #[test]
    fn put_if_absent_returns_the_winner() -> Result<()> {
        let graph = MemoryGraph::new();
        graph.create_index_if_absent(IndexKind::Nodes, "unique")?;
        let first = ElementRef::Node(graph.create_node()?);
        let second = ElementRef::Node(graph.create_node()?);
        assert_eq!(
            graph.index_put_if_absent(IndexKind::Nodes, "unique", "k", "v", first)?,
            None
        );
        assert_eq!(
            graph.index_put_if_absent(IndexKind::Nodes, "unique", "k", "v", second)?,
            Some(first)
        );
        Ok(())
    }

    #[test]
    fn offline_graph_rejects_everything() {
        let graph = MemoryGraph::new();
        graph.set_online(false);
        assert!(matches!(
            graph.reference_node(),
            Err(OgmError::StoreUnavailable(_))
        ));
        assert!(matches!(
            graph.index_exists(IndexKind::Nodes, "x"),
            Err(OgmError::StoreUnavailable(_))
        ));
        let _ctx = graph.begin_context();
        assert!(!graph.has_active_context());
    }

    #[test]
    fn context_guard_tracks_nesting() {
        let graph = MemoryGraph::new();
        assert!(!graph.has_active_context());
        {
            let _outer = graph.begin_context();
            {
                let _inner = graph.begin_context();
                assert!(graph.has_active_context());
            }
            assert!(graph.has_active_context());
        }
        assert!(!graph.has_active_context());
    }
}
