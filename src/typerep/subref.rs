use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::indexed::IndexedEncoding;
use super::{
    ElementSource, Instantiators, Strategy, TypeRepresentationStrategy, TypedElements,
    INSTANCE_OF, SUBREF_CLASS_KEY, SUBREF_MARKER_INDEX, SUBREF_PREFIX,
};
use crate::error::{OgmError, Result};
use crate::model::{Direction, ElementRef, NodeId, PropertyValue, TypeDescriptor};
use crate::store::{GraphStore, IndexKind};

/// Label of the reference-node relationship leading to `ty`'s marker.
pub fn subref_label(ty: &TypeDescriptor) -> String {
    format!("{SUBREF_PREFIX}{}", ty.name())
}

/// Looks up the marker node of `ty` without creating it.
pub(crate) fn find_marker(store: &dyn GraphStore, ty: &TypeDescriptor) -> Result<Option<NodeId>> {
    let root = store.reference_node()?;
    let label = subref_label(ty);
    let rels = store.relationships(root, Direction::Outgoing, Some(&label))?;
    Ok(rels.first().map(|rel| rel.end))
}

fn marker_type(store: &dyn GraphStore, marker: NodeId) -> Result<TypeDescriptor> {
    match store.property(marker.into(), SUBREF_CLASS_KEY)? {
        Some(PropertyValue::String(name)) => Ok(TypeDescriptor::new(name)),
        _ => Err(OgmError::Serialization(format!(
            "type marker node {} has no `{SUBREF_CLASS_KEY}` property",
            marker.0
        ))),
    }
}

/// The subreference encoding: one marker node per node type, reachable from
/// the reference node, with `INSTANCE_OF` links from every instance.
///
/// Relationship entities are typed through the relationship type index.
pub struct SubReferenceTypeRepresentation {
    store: Arc<dyn GraphStore>,
    instantiators: Instantiators,
}

impl SubReferenceTypeRepresentation {
    pub fn new(store: Arc<dyn GraphStore>, instantiators: Instantiators) -> Self {
        Self {
            store,
            instantiators,
        }
    }

    /// Returns the marker node for `ty`, creating it on first use.
    ///
    /// Concurrent first use is settled by `index_put_if_absent` on the marker
    /// index: the loser deletes its candidate and adopts the winner's node. A
    /// claimed marker that never got its reference-node link is linked by
    /// whoever finds it next.
    fn obtain_marker(&self, ty: &TypeDescriptor) -> Result<NodeId> {
        let store = self.store.as_ref();
        if let Some(marker) = find_marker(store, ty)? {
            return Ok(marker);
        }
        store.create_index_if_absent(IndexKind::Nodes, SUBREF_MARKER_INDEX)?;
        let candidate = store.create_node()?;
        let claim = store
            .set_property(
                candidate.into(),
                SUBREF_CLASS_KEY,
                PropertyValue::from(ty.name()),
            )
            .and_then(|()| {
                store.index_put_if_absent(
                    IndexKind::Nodes,
                    SUBREF_MARKER_INDEX,
                    SUBREF_CLASS_KEY,
                    ty.name(),
                    candidate.into(),
                )
            });
        match claim {
            Err(err) => {
                self.discard_candidate(candidate, ty, false);
                Err(err)
            }
            Ok(Some(ElementRef::Node(winner))) => {
                trace!(%ty, marker = winner.0, "lost marker creation race");
                store.delete_node(candidate)?;
                self.ensure_linked(winner, ty)
            }
            Ok(Some(other)) => {
                self.discard_candidate(candidate, ty, false);
                Err(OgmError::Serialization(format!(
                    "marker index entry for {ty} points at {other}"
                )))
            }
            Ok(None) => match self.ensure_linked(candidate, ty) {
                Ok(marker) => {
                    debug!(%ty, marker = marker.0, "type marker created");
                    Ok(marker)
                }
                Err(err) => {
                    self.discard_candidate(candidate, ty, true);
                    Err(err)
                }
            },
        }
    }

    /// Makes `marker` reachable from the reference node unless a marker of
    /// `ty` already is. Returns the marker enumeration will see.
    fn ensure_linked(&self, marker: NodeId, ty: &TypeDescriptor) -> Result<NodeId> {
        let store = self.store.as_ref();
        if let Some(linked) = find_marker(store, ty)? {
            return Ok(linked);
        }
        let root = store.reference_node()?;
        let label = subref_label(ty);
        let link = store.create_relationship(root, marker, &label)?;
        // Racing callers may each add a link; only the oldest one survives.
        let links = store.relationships(root, Direction::Outgoing, Some(&label))?;
        if links.iter().any(|rel| rel.id < link) {
            trace!(%ty, marker = marker.0, "duplicate marker link dropped");
            store.delete_relationship(link)?;
        }
        Ok(links.first().map_or(marker, |rel| rel.end))
    }

    /// Best-effort removal of a candidate marker this call could not finish.
    /// A claimed candidate that cannot be removed keeps its claim, so the next
    /// tag of `ty` links it instead of creating another.
    fn discard_candidate(&self, candidate: NodeId, ty: &TypeDescriptor, claimed: bool) {
        let store = self.store.as_ref();
        let removed = store.delete_node(candidate).and_then(|()| {
            if claimed {
                store.index_remove(
                    IndexKind::Nodes,
                    SUBREF_MARKER_INDEX,
                    SUBREF_CLASS_KEY,
                    ty.name(),
                    candidate.into(),
                )?;
            }
            Ok(())
        });
        if let Err(err) = removed {
            warn!(%ty, marker = candidate.0, error = %err, "unfinished type marker left in place");
        }
    }

    fn instance_link(&self, node: NodeId) -> Result<Option<NodeId>> {
        let links = self
            .store
            .relationships(node, Direction::Outgoing, Some(INSTANCE_OF))?;
        Ok(links.first().map(|rel| rel.end))
    }

    fn tag_node(&self, node: NodeId, ty: &TypeDescriptor) -> Result<()> {
        if let Some(marker) = self.instance_link(node)? {
            let existing = marker_type(self.store.as_ref(), marker)?;
            if &existing == ty {
                trace!(node = node.0, %ty, "node already linked to its marker");
                return Ok(());
            }
            return Err(OgmError::TypeConflict {
                element: node.into(),
                existing,
                requested: ty.clone(),
            });
        }
        let marker = self.obtain_marker(ty)?;
        self.store.create_relationship(node, marker, INSTANCE_OF)?;
        debug!(node = node.0, %ty, marker = marker.0, "node linked to type marker");
        Ok(())
    }
}

impl TypeRepresentationStrategy for SubReferenceTypeRepresentation {
    fn strategy(&self) -> Strategy {
        Strategy::SubReference
    }

    fn tag(&self, element: ElementRef, ty: &TypeDescriptor) -> Result<()> {
        match element {
            ElementRef::Node(node) => self.tag_node(node, ty),
            ElementRef::Relationship(_) => {
                IndexedEncoding::RELATIONSHIPS.tag(self.store.as_ref(), element, ty)
            }
        }
    }

    fn resolve_type(&self, element: ElementRef) -> Result<TypeDescriptor> {
        match element {
            ElementRef::Node(node) => match self.instance_link(node)? {
                Some(marker) => marker_type(self.store.as_ref(), marker),
                None => Err(OgmError::NotFound(element)),
            },
            ElementRef::Relationship(_) => {
                IndexedEncoding::RELATIONSHIPS.resolve(self.store.as_ref(), element)
            }
        }
    }

    fn iterate_by_type(&self, ty: &TypeDescriptor) -> Result<TypedElements> {
        Ok(TypedElements::new(
            Arc::clone(&self.store),
            ty.clone(),
            vec![ElementSource::Marker, IndexedEncoding::RELATIONSHIPS.source()],
        ))
    }

    fn untag(&self, element: ElementRef) -> Result<()> {
        match element {
            ElementRef::Node(node) => {
                let links = self
                    .store
                    .relationships(node, Direction::Outgoing, Some(INSTANCE_OF))?;
                for link in links {
                    self.store.delete_relationship(link.id)?;
                }
                Ok(())
            }
            ElementRef::Relationship(_) => {
                IndexedEncoding::RELATIONSHIPS.untag(self.store.as_ref(), element)
            }
        }
    }

    fn instantiators(&self) -> &Instantiators {
        &self.instantiators
    }
}
