use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::trace;

use super::{FieldAccessor, FieldAccessorFactory, FieldValue};
use crate::error::{OgmError, Result};
use crate::mapping::{FieldRole, PersistentProperty};
use crate::model::{Direction, ElementRef, NodeId, PropertyValue, RelId};
use crate::store::GraphStore;
use crate::template::GraphTemplate;
use crate::typerep::TypeRepresentationStrategy;

fn require_node(element: ElementRef) -> Result<NodeId> {
    element.as_node().ok_or_else(|| {
        OgmError::InvalidArgument(format!("{element} is not a node"))
    })
}

fn require_relationship(element: ElementRef) -> Result<RelId> {
    element.as_relationship().ok_or_else(|| {
        OgmError::InvalidArgument(format!("{element} is not a relationship"))
    })
}

/// Exposes the backing element's id as an integer.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdFieldAccessor;

impl FieldAccessor for IdFieldAccessor {
    fn get_value(&self, element: ElementRef) -> Result<FieldValue> {
        let id = match element {
            ElementRef::Node(node) => node.0,
            ElementRef::Relationship(rel) => rel.0,
        };
        let id = i64::try_from(id)
            .map_err(|_| OgmError::InvalidArgument(format!("{element} id overflows i64")))?;
        Ok(FieldValue::Value(PropertyValue::Int(id)))
    }

    fn set_value(&self, element: ElementRef, _value: &FieldValue) -> Result<()> {
        Err(OgmError::InvalidArgument(format!(
            "the id of {element} is assigned by the store"
        )))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IdFieldAccessorFactory;

impl FieldAccessorFactory for IdFieldAccessorFactory {
    fn accessor_for(
        &self,
        _template: &GraphTemplate,
        property: &PersistentProperty,
    ) -> Option<Arc<dyn FieldAccessor>> {
        match property.role() {
            FieldRole::Id => Some(Arc::new(IdFieldAccessor)),
            _ => None,
        }
    }
}

/// Stores the field as a property of the same name.
pub struct PropertyFieldAccessor {
    store: Arc<dyn GraphStore>,
    key: String,
}

impl PropertyFieldAccessor {
    pub fn new(store: Arc<dyn GraphStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

impl FieldAccessor for PropertyFieldAccessor {
    fn get_value(&self, element: ElementRef) -> Result<FieldValue> {
        Ok(self.store.property(element, &self.key)?.into())
    }

    fn set_value(&self, element: ElementRef, value: &FieldValue) -> Result<()> {
        match value {
            FieldValue::Null => {
                self.store.remove_property(element, &self.key)?;
                Ok(())
            }
            FieldValue::Value(value) => self.store.set_property(element, &self.key, value.clone()),
            other => Err(OgmError::InvalidArgument(format!(
                "property `{}` cannot hold {other:?}",
                self.key
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PropertyFieldAccessorFactory;

impl FieldAccessorFactory for PropertyFieldAccessorFactory {
    fn accessor_for(
        &self,
        template: &GraphTemplate,
        property: &PersistentProperty,
    ) -> Option<Arc<dyn FieldAccessor>> {
        match property.role() {
            FieldRole::Property => Some(Arc::new(PropertyFieldAccessor::new(
                Arc::clone(template.store()),
                property.name(),
            ))),
            _ => None,
        }
    }
}

/// Follows relationships of one type to the nodes at their far end.
///
/// Writing replaces every relationship of that type and direction. Replaced
/// relationships are untagged before they are deleted, since a relationship
/// entity may share the type.
pub struct RelatedToFieldAccessor {
    store: Arc<dyn GraphStore>,
    types: Arc<dyn TypeRepresentationStrategy>,
    rel_type: String,
    direction: Direction,
    collection: bool,
}

impl RelatedToFieldAccessor {
    pub fn new(
        template: &GraphTemplate,
        rel_type: impl Into<String>,
        direction: Direction,
        collection: bool,
    ) -> Self {
        Self {
            store: Arc::clone(template.store()),
            types: Arc::clone(template.type_representation()),
            rel_type: rel_type.into(),
            direction,
            collection,
        }
    }

    fn targets(&self, value: &FieldValue) -> Result<Vec<NodeId>> {
        match (value, self.collection) {
            (FieldValue::Null, _) => Ok(Vec::new()),
            (FieldValue::Node(node), false) => Ok(vec![*node]),
            (FieldValue::Nodes(nodes), true) => Ok(nodes.clone()),
            (other, _) => Err(OgmError::InvalidArgument(format!(
                "`{}` relationship field cannot hold {other:?}",
                self.rel_type
            ))),
        }
    }
}

impl FieldAccessor for RelatedToFieldAccessor {
    fn get_value(&self, element: ElementRef) -> Result<FieldValue> {
        let node = require_node(element)?;
        let mut targets: Vec<NodeId> = self
            .store
            .relationships(node, self.direction, Some(&self.rel_type))?
            .iter()
            .map(|rel| rel.other_node(node))
            .collect();
        if self.collection {
            return Ok(FieldValue::Nodes(targets));
        }
        if targets.len() > 1 {
            return Err(OgmError::IllegalState(format!(
                "{element} has {} `{}` relationships for a single-valued field",
                targets.len(),
                self.rel_type
            )));
        }
        Ok(targets.pop().map_or(FieldValue::Null, FieldValue::Node))
    }

    fn set_value(&self, element: ElementRef, value: &FieldValue) -> Result<()> {
        let node = require_node(element)?;
        let targets = self.targets(value)?;
        let existing: BTreeSet<RelId> = self
            .store
            .relationships(node, self.direction, Some(&self.rel_type))?
            .into_iter()
            .map(|rel| rel.id)
            .collect();
        for rel in existing {
            self.types.untag(ElementRef::Relationship(rel))?;
            self.store.delete_relationship(rel)?;
        }
        for target in targets {
            let (start, end) = match self.direction {
                Direction::Incoming => (target, node),
                Direction::Outgoing | Direction::Both => (node, target),
            };
            self.store.create_relationship(start, end, &self.rel_type)?;
        }
        trace!(%element, rel_type = %self.rel_type, "relationship field rewritten");
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RelatedToFieldAccessorFactory;

impl FieldAccessorFactory for RelatedToFieldAccessorFactory {
    fn accessor_for(
        &self,
        template: &GraphTemplate,
        property: &PersistentProperty,
    ) -> Option<Arc<dyn FieldAccessor>> {
        match property.role() {
            FieldRole::RelatedTo {
                rel_type,
                direction,
                collection,
            } => Some(Arc::new(RelatedToFieldAccessor::new(
                template,
                rel_type.as_str(),
                *direction,
                *collection,
            ))),
            _ => None,
        }
    }
}

/// Reads the start or end node of a relationship entity.
///
/// Endpoints are fixed once the relationship exists.
pub struct EndpointFieldAccessor {
    store: Arc<dyn GraphStore>,
    end: bool,
}

impl EndpointFieldAccessor {
    pub fn start(store: Arc<dyn GraphStore>) -> Self {
        Self { store, end: false }
    }

    pub fn end(store: Arc<dyn GraphStore>) -> Self {
        Self { store, end: true }
    }
}

impl FieldAccessor for EndpointFieldAccessor {
    fn get_value(&self, element: ElementRef) -> Result<FieldValue> {
        let rel = self.store.relationship(require_relationship(element)?)?;
        Ok(FieldValue::Node(if self.end { rel.end } else { rel.start }))
    }

    fn set_value(&self, element: ElementRef, value: &FieldValue) -> Result<()> {
        let rel = self.store.relationship(require_relationship(element)?)?;
        let current = if self.end { rel.end } else { rel.start };
        if value.as_node() == Some(current) {
            return Ok(());
        }
        Err(OgmError::InvalidArgument(format!(
            "{element} already connects node {} to node {}",
            rel.start.0, rel.end.0
        )))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EndpointFieldAccessorFactory;

impl FieldAccessorFactory for EndpointFieldAccessorFactory {
    fn accessor_for(
        &self,
        template: &GraphTemplate,
        property: &PersistentProperty,
    ) -> Option<Arc<dyn FieldAccessor>> {
        let store = Arc::clone(template.store());
        match property.role() {
            FieldRole::StartNode => Some(Arc::new(EndpointFieldAccessor::start(store))),
            FieldRole::EndNode => Some(Arc::new(EndpointFieldAccessor::end(store))),
            _ => None,
        }
    }
}
