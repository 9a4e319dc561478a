use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sombra_ogm::{
    model::Relationship,
    store::{GraphStore, IndexKind, MemoryGraph},
    typerep::{Instantiators, ProbeReport, Strategy, SUBREF_PREFIX},
    Direction, ElementRef, NodeId, OgmError, PropertyValue, RelId, Result, TypeDescriptor,
};

/// Delegates to a [`MemoryGraph`] but fails the next reference-node link it is
/// asked to create.
struct FailingLinks {
    inner: Arc<MemoryGraph>,
    fail_next_subref: AtomicBool,
}

impl FailingLinks {
    fn new(inner: Arc<MemoryGraph>) -> Self {
        Self {
            inner,
            fail_next_subref: AtomicBool::new(true),
        }
    }
}

impl GraphStore for FailingLinks {
    fn reference_node(&self) -> Result<NodeId> {
        self.inner.reference_node()
    }

    fn create_node(&self) -> Result<NodeId> {
        self.inner.create_node()
    }

    fn delete_node(&self, node: NodeId) -> Result<()> {
        self.inner.delete_node(node)
    }

    fn node_exists(&self, node: NodeId) -> Result<bool> {
        self.inner.node_exists(node)
    }

    fn create_relationship(&self, start: NodeId, end: NodeId, rel_type: &str) -> Result<RelId> {
        if rel_type.starts_with(SUBREF_PREFIX) && self.fail_next_subref.swap(false, Ordering::AcqRel)
        {
            return Err(OgmError::StoreUnavailable("injected link failure".into()));
        }
        self.inner.create_relationship(start, end, rel_type)
    }

    fn delete_relationship(&self, rel: RelId) -> Result<()> {
        self.inner.delete_relationship(rel)
    }

    fn relationship(&self, rel: RelId) -> Result<Relationship> {
        self.inner.relationship(rel)
    }

    fn relationships(
        &self,
        node: NodeId,
        direction: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>> {
        self.inner.relationships(node, direction, rel_type)
    }

    fn property(&self, element: ElementRef, key: &str) -> Result<Option<PropertyValue>> {
        self.inner.property(element, key)
    }

    fn set_property(&self, element: ElementRef, key: &str, value: PropertyValue) -> Result<()> {
        self.inner.set_property(element, key, value)
    }

    fn remove_property(&self, element: ElementRef, key: &str) -> Result<Option<PropertyValue>> {
        self.inner.remove_property(element, key)
    }

    fn index_exists(&self, kind: IndexKind, name: &str) -> Result<bool> {
        self.inner.index_exists(kind, name)
    }

    fn create_index_if_absent(&self, kind: IndexKind, name: &str) -> Result<bool> {
        self.inner.create_index_if_absent(kind, name)
    }

    fn index_add(
        &self,
        kind: IndexKind,
        name: &str,
        key: &str,
        value: &str,
        element: ElementRef,
    ) -> Result<()> {
        self.inner.index_add(kind, name, key, value, element)
    }

    fn index_put_if_absent(
        &self,
        kind: IndexKind,
        name: &str,
        key: &str,
        value: &str,
        element: ElementRef,
    ) -> Result<Option<ElementRef>> {
        self.inner.index_put_if_absent(kind, name, key, value, element)
    }

    fn index_remove(
        &self,
        kind: IndexKind,
        name: &str,
        key: &str,
        value: &str,
        element: ElementRef,
    ) -> Result<bool> {
        self.inner.index_remove(kind, name, key, value, element)
    }

    fn index_get(
        &self,
        kind: IndexKind,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<ElementRef>> {
        self.inner.index_get(kind, name, key, value)
    }

    fn has_active_context(&self) -> bool {
        self.inner.has_active_context()
    }
}

#[test]
fn failed_marker_link_leaves_no_orphan_behind() -> Result<()> {
    let graph = Arc::new(MemoryGraph::new());
    let store: Arc<dyn GraphStore> = Arc::new(FailingLinks::new(Arc::clone(&graph)));
    let types = Strategy::SubReference.build(store, Instantiators::default());
    let person = TypeDescriptor::new("Person");

    let a = graph.create_node()?;
    assert!(matches!(
        types.tag(a.into(), &person),
        Err(OgmError::StoreUnavailable(_))
    ));
    assert!(matches!(
        types.resolve_type(a.into()),
        Err(OgmError::NotFound(_))
    ));
    // The candidate marker was removed again.
    assert_eq!(graph.node_count(), 2);

    let b = graph.create_node()?;
    types.tag(b.into(), &person)?;
    assert_eq!(types.resolve_type(b.into())?, person);
    assert_eq!(
        types.iterate_by_type(&person)?.to_vec()?,
        vec![ElementRef::Node(b)]
    );

    let root = graph.reference_node()?;
    let subrefs = graph.relationships(root, Direction::Outgoing, Some("SUBREF_Person"))?;
    assert_eq!(subrefs.len(), 1);
    assert_eq!(
        ProbeReport::probe(graph.as_ref())?.choose(),
        Strategy::SubReference
    );
    Ok(())
}

#[test]
fn every_instance_is_enumerated_after_a_failed_link() -> Result<()> {
    let graph = Arc::new(MemoryGraph::new());
    let store: Arc<dyn GraphStore> = Arc::new(FailingLinks::new(Arc::clone(&graph)));
    let types = Strategy::SubReference.build(store, Instantiators::default());
    let person = TypeDescriptor::new("Person");

    let first = graph.create_node()?;
    assert!(types.tag(first.into(), &person).is_err());
    let mut tagged = Vec::new();
    for _ in 0..3 {
        let node = graph.create_node()?;
        types.tag(node.into(), &person)?;
        tagged.push(ElementRef::Node(node));
    }
    types.tag(first.into(), &person)?;
    tagged.insert(0, ElementRef::Node(first));

    assert_eq!(types.iterate_by_type(&person)?.to_vec()?, tagged);
    assert_eq!(types.count_by_type(&person)?, 4);
    Ok(())
}
