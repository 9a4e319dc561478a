use std::sync::Arc;

use tracing::{debug, trace};

use super::{
    ElementSource, Instantiators, Strategy, TypeRepresentationStrategy, TypedElements,
    REL_TYPES_INDEX_NAME, TYPES_INDEX_NAME, TYPE_INDEX_KEY, TYPE_PROPERTY,
};
use crate::error::{OgmError, Result};
use crate::model::{ElementRef, PropertyValue, TypeDescriptor};
use crate::store::{GraphStore, IndexKind};

/// Type property plus exact-match index for one element family.
///
/// Shared by both node encodings for relationship entities.
#[derive(Clone, Copy, Debug)]
pub(crate) struct IndexedEncoding {
    kind: IndexKind,
    index: &'static str,
}

impl IndexedEncoding {
    pub(crate) const NODES: IndexedEncoding = IndexedEncoding {
        kind: IndexKind::Nodes,
        index: TYPES_INDEX_NAME,
    };

    pub(crate) const RELATIONSHIPS: IndexedEncoding = IndexedEncoding {
        kind: IndexKind::Relationships,
        index: REL_TYPES_INDEX_NAME,
    };

    pub(crate) fn source(self) -> ElementSource {
        ElementSource::Index {
            kind: self.kind,
            name: self.index,
        }
    }

    fn ensure_index(self, store: &dyn GraphStore) -> Result<()> {
        if store.create_index_if_absent(self.kind, self.index)? {
            debug!(index = self.index, "type index created");
        }
        Ok(())
    }

    pub(crate) fn tag(
        self,
        store: &dyn GraphStore,
        element: ElementRef,
        ty: &TypeDescriptor,
    ) -> Result<()> {
        match read_type(store, element)? {
            Some(existing) if &existing == ty => {
                trace!(%element, %ty, "element already tagged");
            }
            Some(existing) => {
                return Err(OgmError::TypeConflict {
                    element,
                    existing,
                    requested: ty.clone(),
                });
            }
            None => {
                store.set_property(element, TYPE_PROPERTY, PropertyValue::from(ty.name()))?;
                debug!(%element, %ty, index = self.index, "element tagged");
            }
        }
        // Re-adding is a no-op and repairs an entry lost after a partial tag.
        self.ensure_index(store)?;
        store.index_add(self.kind, self.index, TYPE_INDEX_KEY, ty.name(), element)
    }

    pub(crate) fn resolve(self, store: &dyn GraphStore, element: ElementRef) -> Result<TypeDescriptor> {
        read_type(store, element)?.ok_or(OgmError::NotFound(element))
    }

    pub(crate) fn untag(self, store: &dyn GraphStore, element: ElementRef) -> Result<()> {
        let Some(ty) = read_type(store, element)? else {
            return Ok(());
        };
        store.index_remove(self.kind, self.index, TYPE_INDEX_KEY, ty.name(), element)?;
        store.remove_property(element, TYPE_PROPERTY)?;
        debug!(%element, %ty, "element untagged");
        Ok(())
    }
}

fn read_type(store: &dyn GraphStore, element: ElementRef) -> Result<Option<TypeDescriptor>> {
    match store.property(element, TYPE_PROPERTY)? {
        None => Ok(None),
        Some(PropertyValue::String(name)) => Ok(Some(TypeDescriptor::new(name))),
        Some(other) => Err(OgmError::Serialization(format!(
            "{element} carries a non-text {TYPE_PROPERTY} property: {other:?}"
        ))),
    }
}

/// The indexed encoding: `__types__` for nodes, `__rel_types__` for
/// relationships.
pub struct IndexedTypeRepresentation {
    store: Arc<dyn GraphStore>,
    instantiators: Instantiators,
}

impl IndexedTypeRepresentation {
    pub fn new(store: Arc<dyn GraphStore>, instantiators: Instantiators) -> Self {
        Self {
            store,
            instantiators,
        }
    }

    fn encoding(element: ElementRef) -> IndexedEncoding {
        if element.is_node() {
            IndexedEncoding::NODES
        } else {
            IndexedEncoding::RELATIONSHIPS
        }
    }
}

impl TypeRepresentationStrategy for IndexedTypeRepresentation {
    fn strategy(&self) -> Strategy {
        Strategy::Indexed
    }

    fn tag(&self, element: ElementRef, ty: &TypeDescriptor) -> Result<()> {
        Self::encoding(element).tag(self.store.as_ref(), element, ty)
    }

    fn resolve_type(&self, element: ElementRef) -> Result<TypeDescriptor> {
        Self::encoding(element).resolve(self.store.as_ref(), element)
    }

    fn iterate_by_type(&self, ty: &TypeDescriptor) -> Result<TypedElements> {
        Ok(TypedElements::new(
            Arc::clone(&self.store),
            ty.clone(),
            vec![
                IndexedEncoding::NODES.source(),
                IndexedEncoding::RELATIONSHIPS.source(),
            ],
        ))
    }

    fn untag(&self, element: ElementRef) -> Result<()> {
        Self::encoding(element).untag(self.store.as_ref(), element)
    }

    fn instantiators(&self) -> &Instantiators {
        &self.instantiators
    }
}
