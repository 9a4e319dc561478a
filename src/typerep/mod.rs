//! Recording "element E is an instance of domain type T" in a schema-less
//! graph.
//!
//! Two on-disk encodings exist and a database commits to one of them:
//!
//! * **indexed**: a `__types__` node index keyed by type name, plus a
//!   `__type__` property on every tagged element;
//! * **subreference**: one marker node per type hanging off the reference node
//!   through a `SUBREF_<type>` relationship, with instances linked to their
//!   marker through `INSTANCE_OF`.
//!
//! [`StrategySelector`] probes a store once and decides which encoding it uses.
//! Relationship entities are typed through the separate `__rel_types__` index
//! under both encodings; that index plays no part in the probe.

use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{OgmError, Result};
use crate::model::{Direction, ElementRef, TypeDescriptor};
use crate::store::{GraphStore, IndexKind};

mod indexed;
mod noop;
mod selector;
mod subref;

pub use indexed::IndexedTypeRepresentation;
pub use noop::NoopTypeRepresentation;
pub use selector::{ProbeReport, Strategy, StrategySelector};
pub use subref::{subref_label, SubReferenceTypeRepresentation};

/// Node index whose existence marks the indexed encoding.
pub const TYPES_INDEX_NAME: &str = "__types__";
/// Relationship index used by every encoding for relationship entities.
pub const REL_TYPES_INDEX_NAME: &str = "__rel_types__";
/// Index key under which type names are stored.
pub const TYPE_INDEX_KEY: &str = "className";
/// Property stamped on elements tagged through an index.
pub const TYPE_PROPERTY: &str = "__type__";
/// Label prefix of reference-node relationships leading to type markers.
pub const SUBREF_PREFIX: &str = "SUBREF_";
/// Relationship from an instance to its type marker.
pub const INSTANCE_OF: &str = "INSTANCE_OF";
/// Property holding the type name on a marker node.
pub const SUBREF_CLASS_KEY: &str = "class";
/// Node index guarding concurrent creation of marker nodes.
pub const SUBREF_MARKER_INDEX: &str = "__subref_markers__";

/// Builds domain objects from stored elements.
pub trait EntityInstantiator: Send + Sync {
    fn instantiate(&self, element: ElementRef, ty: &TypeDescriptor) -> Result<Box<dyn Any + Send>>;
}

impl<F> EntityInstantiator for F
where
    F: Fn(ElementRef, &TypeDescriptor) -> Result<Box<dyn Any + Send>> + Send + Sync,
{
    fn instantiate(&self, element: ElementRef, ty: &TypeDescriptor) -> Result<Box<dyn Any + Send>> {
        self(element, ty)
    }
}

/// The node and relationship instantiators handed to every registry.
#[derive(Clone, Default)]
pub struct Instantiators {
    pub node: Option<Arc<dyn EntityInstantiator>>,
    pub relationship: Option<Arc<dyn EntityInstantiator>>,
}

impl Instantiators {
    pub fn new(
        node: Arc<dyn EntityInstantiator>,
        relationship: Arc<dyn EntityInstantiator>,
    ) -> Self {
        Self {
            node: Some(node),
            relationship: Some(relationship),
        }
    }

    fn for_element(&self, element: ElementRef) -> Option<&Arc<dyn EntityInstantiator>> {
        match element {
            ElementRef::Node(_) => self.node.as_ref(),
            ElementRef::Relationship(_) => self.relationship.as_ref(),
        }
    }
}

/// Type registry contract shared by every encoding.
pub trait TypeRepresentationStrategy: Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Records that `element` is an instance of `ty`.
    ///
    /// Repeating the call with the same type is a no-op. Retagging with a
    /// different type fails with `TypeConflict` and leaves the first tag intact.
    fn tag(&self, element: ElementRef, ty: &TypeDescriptor) -> Result<()>;

    /// The type recorded for `element`, or `NotFound`.
    fn resolve_type(&self, element: ElementRef) -> Result<TypeDescriptor>;

    /// All elements tagged with exactly `ty`. Nothing is read until the
    /// returned sequence is iterated, and it may be iterated repeatedly.
    fn iterate_by_type(&self, ty: &TypeDescriptor) -> Result<TypedElements>;

    fn count_by_type(&self, ty: &TypeDescriptor) -> Result<u64> {
        self.iterate_by_type(ty)?.count()
    }

    /// Drops every record pointing at `element`. Called before the element is
    /// deleted. Untagging an untagged element is a no-op.
    fn untag(&self, element: ElementRef) -> Result<()>;

    fn instantiators(&self) -> &Instantiators;

    /// Resolves the element's type and builds the matching domain object.
    fn create_entity(&self, element: ElementRef) -> Result<Box<dyn Any + Send>> {
        let ty = self.resolve_type(element)?;
        let instantiator = self
            .instantiators()
            .for_element(element)
            .ok_or(OgmError::Unsupported("no instantiator for this element kind"))?;
        instantiator.instantiate(element, &ty)
    }

    /// Instantiates every element of `ty`.
    fn find_all(&self, ty: &TypeDescriptor) -> Result<Vec<Box<dyn Any + Send>>> {
        self.iterate_by_type(ty)?
            .iter()?
            .map(|element| self.create_entity(element))
            .collect()
    }
}

#[derive(Clone, Debug)]
pub(crate) enum ElementSource {
    /// Exact-match index lookup of the type name.
    Index { kind: IndexKind, name: &'static str },
    /// Incoming `INSTANCE_OF` relationships of the type's marker node.
    Marker,
}

/// Lazy, restartable view over the elements of one type.
///
/// Each call to [`TypedElements::iter`] reads the store afresh; results are
/// deduplicated and ordered by element id.
pub struct TypedElements {
    store: Arc<dyn GraphStore>,
    ty: TypeDescriptor,
    sources: Vec<ElementSource>,
}

impl std::fmt::Debug for TypedElements {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedElements")
            .field("ty", &self.ty)
            .field("sources", &self.sources)
            .finish()
    }
}

impl TypedElements {
    pub(crate) fn new(
        store: Arc<dyn GraphStore>,
        ty: TypeDescriptor,
        sources: Vec<ElementSource>,
    ) -> Self {
        Self { store, ty, sources }
    }

    pub fn type_descriptor(&self) -> &TypeDescriptor {
        &self.ty
    }

    pub fn iter(&self) -> Result<std::collections::btree_set::IntoIter<ElementRef>> {
        let mut found = BTreeSet::new();
        for source in &self.sources {
            match source {
                ElementSource::Index { kind, name } => {
                    found.extend(self.store.index_get(
                        *kind,
                        name,
                        TYPE_INDEX_KEY,
                        self.ty.name(),
                    )?);
                }
                ElementSource::Marker => {
                    let Some(marker) = subref::find_marker(self.store.as_ref(), &self.ty)? else {
                        continue;
                    };
                    let links =
                        self.store
                            .relationships(marker, Direction::Incoming, Some(INSTANCE_OF))?;
                    found.extend(links.into_iter().map(|rel| ElementRef::Node(rel.start)));
                }
            }
        }
        Ok(found.into_iter())
    }

    pub fn count(&self) -> Result<u64> {
        Ok(self.iter()?.len() as u64)
    }

    pub fn to_vec(&self) -> Result<Vec<ElementRef>> {
        Ok(self.iter()?.collect())
    }
}
