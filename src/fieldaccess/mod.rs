//! Per-field read/write routing between entity states and the graph store.
//!
//! A [`FieldAccessorChain`] holds one accessor per mapped field of an entity.
//! Chains are produced by a [`DelegatingFieldAccessorFactory`] bound to one
//! template, which asks each registered [`FieldAccessorFactory`] in turn for
//! an accessor until one accepts the field.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::{OgmError, Result};
use crate::mapping::{PersistentEntity, PersistentProperty};
use crate::model::{ElementRef, NodeId, PropertyValue};
use crate::template::GraphTemplate;

mod accessors;

pub use accessors::{
    EndpointFieldAccessor, EndpointFieldAccessorFactory, IdFieldAccessor, IdFieldAccessorFactory,
    PropertyFieldAccessor, PropertyFieldAccessorFactory, RelatedToFieldAccessor,
    RelatedToFieldAccessorFactory,
};

/// Value of one mapped field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Value(PropertyValue),
    Node(NodeId),
    Nodes(Vec<NodeId>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_value(&self) -> Option<&PropertyValue> {
        match self {
            FieldValue::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            FieldValue::Node(node) => Some(*node),
            _ => None,
        }
    }
}

impl From<PropertyValue> for FieldValue {
    fn from(value: PropertyValue) -> Self {
        FieldValue::Value(value)
    }
}

impl From<Option<PropertyValue>> for FieldValue {
    fn from(value: Option<PropertyValue>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Value)
    }
}

impl From<NodeId> for FieldValue {
    fn from(node: NodeId) -> Self {
        FieldValue::Node(node)
    }
}

impl From<Vec<NodeId>> for FieldValue {
    fn from(nodes: Vec<NodeId>) -> Self {
        FieldValue::Nodes(nodes)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Value(PropertyValue::from(value))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Value(PropertyValue::from(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Value(PropertyValue::Int(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Value(PropertyValue::Bool(value))
    }
}

/// Reads and writes one field against a backing element.
pub trait FieldAccessor: Send + Sync {
    fn get_value(&self, element: ElementRef) -> Result<FieldValue>;

    fn set_value(&self, element: ElementRef, value: &FieldValue) -> Result<()>;
}

/// Offers accessors for the fields it knows how to handle.
pub trait FieldAccessorFactory: Send + Sync {
    /// An accessor for `property` bound to `template`, or `None` when this
    /// factory does not handle the field's role.
    fn accessor_for(
        &self,
        template: &GraphTemplate,
        property: &PersistentProperty,
    ) -> Option<Arc<dyn FieldAccessor>>;
}

/// The accessors of every field of one entity.
pub struct FieldAccessorChain {
    entity: Arc<PersistentEntity>,
    accessors: FxHashMap<String, Arc<dyn FieldAccessor>>,
}

impl fmt::Debug for FieldAccessorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields: Vec<&str> = self.accessors.keys().map(String::as_str).collect();
        fields.sort_unstable();
        f.debug_struct("FieldAccessorChain")
            .field("entity", self.entity.type_descriptor())
            .field("fields", &fields)
            .finish()
    }
}

impl FieldAccessorChain {
    pub fn entity(&self) -> &Arc<PersistentEntity> {
        &self.entity
    }

    pub fn accessor(&self, field: &str) -> Result<&Arc<dyn FieldAccessor>> {
        self.accessors.get(field).ok_or_else(|| {
            OgmError::Mapping(format!(
                "{} has no mapped field `{field}`",
                self.entity.type_descriptor()
            ))
        })
    }

    pub fn get_value(&self, element: ElementRef, field: &str) -> Result<FieldValue> {
        self.accessor(field)?.get_value(element)
    }

    pub fn set_value(&self, element: ElementRef, field: &str, value: &FieldValue) -> Result<()> {
        let property = self.entity.require_property(field)?;
        if !property.is_writeable() {
            return Err(OgmError::InvalidArgument(format!(
                "field `{field}` of {} is read-only",
                self.entity.type_descriptor()
            )));
        }
        self.accessor(field)?.set_value(element, value)
    }
}

/// Builds accessor chains against one template by consulting its delegates
/// in order.
#[derive(Clone)]
pub struct DelegatingFieldAccessorFactory {
    template: GraphTemplate,
    delegates: Vec<Arc<dyn FieldAccessorFactory>>,
}

impl DelegatingFieldAccessorFactory {
    pub fn new(template: GraphTemplate, delegates: Vec<Arc<dyn FieldAccessorFactory>>) -> Self {
        Self {
            template,
            delegates,
        }
    }

    /// The id, property, relationship and endpoint accessors.
    pub fn with_defaults(template: GraphTemplate) -> Self {
        Self::new(template, default_delegates())
    }

    pub fn for_entity(&self, entity: Arc<PersistentEntity>) -> Result<FieldAccessorChain> {
        entity.validate()?;
        let mut accessors = FxHashMap::default();
        for property in entity.properties() {
            let accessor = self
                .delegates
                .iter()
                .find_map(|factory| factory.accessor_for(&self.template, property))
                .ok_or_else(|| {
                    OgmError::Mapping(format!(
                        "no accessor handles field `{}` of {}",
                        property.name(),
                        entity.type_descriptor()
                    ))
                })?;
            accessors.insert(property.name().to_string(), accessor);
        }
        Ok(FieldAccessorChain { entity, accessors })
    }
}

fn default_delegates() -> Vec<Arc<dyn FieldAccessorFactory>> {
    vec![
        Arc::new(IdFieldAccessorFactory),
        Arc::new(PropertyFieldAccessorFactory),
        Arc::new(RelatedToFieldAccessorFactory),
        Arc::new(EndpointFieldAccessorFactory),
    ]
}

/// Hands out accessor factories bound to a particular template.
pub trait FieldAccessorFactoryFactory: Send + Sync {
    fn provide_factory_for(&self, template: &GraphTemplate) -> DelegatingFieldAccessorFactory;
}

/// Provides [`DelegatingFieldAccessorFactory::with_defaults`] for every
/// template.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultFieldAccessorFactoryFactory;

impl FieldAccessorFactoryFactory for DefaultFieldAccessorFactoryFactory {
    fn provide_factory_for(&self, template: &GraphTemplate) -> DelegatingFieldAccessorFactory {
        DelegatingFieldAccessorFactory::with_defaults(template.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{FieldRole, PersistentEntity};
    use crate::model::Direction;
    use crate::store::{GraphStore, MemoryGraph};
    use crate::typerep::{Instantiators, NoopTypeRepresentation};

    struct Person;

    fn template(graph: &Arc<MemoryGraph>) -> GraphTemplate {
        let store: Arc<dyn GraphStore> = graph.clone();
        GraphTemplate::new(
            store,
            Arc::new(NoopTypeRepresentation::new(Instantiators::default())),
        )
    }

    fn chain(graph: &Arc<MemoryGraph>) -> Result<FieldAccessorChain> {
        let entity = PersistentEntity::node::<Person>()
            .id("id")
            .property("name")
            .related_to_many("friends", "KNOWS", Direction::Outgoing);
        DelegatingFieldAccessorFactory::with_defaults(template(graph)).for_entity(Arc::new(entity))
    }

    #[test]
    fn property_fields_round_trip_through_the_store() -> Result<()> {
        let graph = Arc::new(MemoryGraph::new());
        let chain = chain(&graph)?;
        let node = ElementRef::Node(graph.create_node()?);
        assert_eq!(chain.get_value(node, "name")?, FieldValue::Null);
        chain.set_value(node, "name", &FieldValue::from("Ada"))?;
        assert_eq!(
            graph.property(node, "name")?,
            Some(PropertyValue::from("Ada"))
        );
        chain.set_value(node, "name", &FieldValue::Null)?;
        assert_eq!(graph.property(node, "name")?, None);
        Ok(())
    }

    #[test]
    fn id_field_is_read_only() -> Result<()> {
        let graph = Arc::new(MemoryGraph::new());
        let chain = chain(&graph)?;
        let node = graph.create_node()?;
        assert_eq!(
            chain.get_value(node.into(), "id")?,
            FieldValue::from(node.0 as i64)
        );
        assert!(matches!(
            chain.set_value(node.into(), "id", &FieldValue::from(7i64)),
            Err(OgmError::InvalidArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn unknown_field_is_a_mapping_error() -> Result<()> {
        let graph = Arc::new(MemoryGraph::new());
        let chain = chain(&graph)?;
        let node = graph.create_node()?;
        assert!(matches!(
            chain.get_value(node.into(), "age"),
            Err(OgmError::Mapping(_))
        ));
        Ok(())
    }

    #[test]
    fn unregistered_metadata_is_still_validated() {
        let graph = Arc::new(MemoryGraph::new());
        let entity = PersistentEntity::node::<Person>().property(crate::typerep::TYPE_PROPERTY);
        assert!(matches!(
            DelegatingFieldAccessorFactory::with_defaults(template(&graph))
                .for_entity(Arc::new(entity)),
            Err(OgmError::Mapping(_))
        ));
    }

    #[test]
    fn unhandled_role_fails_chain_construction() {
        let graph = Arc::new(MemoryGraph::new());
        let factory = DelegatingFieldAccessorFactory::new(
            template(&graph),
            vec![Arc::new(PropertyFieldAccessorFactory)],
        );
        let entity = PersistentEntity::node::<Person>()
            .with_property(PersistentProperty::new("id", FieldRole::Id));
        assert!(matches!(
            factory.for_entity(Arc::new(entity)),
            Err(OgmError::Mapping(_))
        ));
    }
}
