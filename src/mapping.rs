//! Reflective description of mapped domain types.
//!
//! Every type that should be persisted is registered once with a
//! [`MappingContext`]; entity-state factories look the description up by the
//! runtime type of the object they are handed.

use std::any::{Any, TypeId};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{OgmError, Result};
use crate::model::{Direction, TypeDescriptor};
use crate::typerep::{INSTANCE_OF, SUBREF_PREFIX, TYPE_PROPERTY};

/// Relationship types the type registries write themselves.
fn is_reserved_rel_type(rel_type: &str) -> bool {
    rel_type == INSTANCE_OF || rel_type.starts_with(SUBREF_PREFIX)
}

/// How a field is stored in the graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldRole {
    /// Read-only view of the backing element's id.
    Id,
    /// A property on the backing element.
    Property,
    /// Nodes reachable over relationships of `rel_type`.
    RelatedTo {
        rel_type: String,
        direction: Direction,
        collection: bool,
    },
    /// Start node of a relationship entity.
    StartNode,
    /// End node of a relationship entity.
    EndNode,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistentProperty {
    name: String,
    role: FieldRole,
}

impl PersistentProperty {
    pub fn new(name: impl Into<String>, role: FieldRole) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> &FieldRole {
        &self.role
    }

    /// Whether values can be written through this field.
    pub fn is_writeable(&self) -> bool {
        !matches!(self.role, FieldRole::Id)
    }

    /// Whether this field names an endpoint of a relationship entity.
    pub fn is_endpoint(&self) -> bool {
        matches!(self.role, FieldRole::StartNode | FieldRole::EndNode)
    }
}

/// What kind of graph element backs instances of an entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Relationship { rel_type: String },
}

/// Mapping metadata for one domain type.
#[derive(Clone, Debug)]
pub struct PersistentEntity {
    type_id: TypeId,
    ty: TypeDescriptor,
    kind: EntityKind,
    properties: Vec<PersistentProperty>,
}

impl PersistentEntity {
    /// Starts describing a node entity backed by `T`.
    pub fn node<T: Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            ty: TypeDescriptor::of::<T>(),
            kind: EntityKind::Node,
            properties: Vec::new(),
        }
    }

    /// Starts describing a relationship entity stored as `rel_type`
    /// relationships.
    pub fn relationship<T: Any>(rel_type: impl Into<String>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            ty: TypeDescriptor::of::<T>(),
            kind: EntityKind::Relationship {
                rel_type: rel_type.into(),
            },
            properties: Vec::new(),
        }
    }

    /// Overrides the stored type name, which defaults to the Rust type path.
    pub fn named(mut self, ty: impl Into<TypeDescriptor>) -> Self {
        self.ty = ty.into();
        self
    }

    pub fn with_property(mut self, property: PersistentProperty) -> Self {
        self.properties.retain(|p| p.name != property.name);
        self.properties.push(property);
        self
    }

    pub fn id(self, name: &str) -> Self {
        self.with_property(PersistentProperty::new(name, FieldRole::Id))
    }

    pub fn property(self, name: &str) -> Self {
        self.with_property(PersistentProperty::new(name, FieldRole::Property))
    }

    pub fn related_to(self, name: &str, rel_type: &str, direction: Direction) -> Self {
        self.with_property(PersistentProperty::new(
            name,
            FieldRole::RelatedTo {
                rel_type: rel_type.to_string(),
                direction,
                collection: false,
            },
        ))
    }

    pub fn related_to_many(self, name: &str, rel_type: &str, direction: Direction) -> Self {
        self.with_property(PersistentProperty::new(
            name,
            FieldRole::RelatedTo {
                rel_type: rel_type.to_string(),
                direction,
                collection: true,
            },
        ))
    }

    pub fn start_node(self, name: &str) -> Self {
        self.with_property(PersistentProperty::new(name, FieldRole::StartNode))
    }

    pub fn end_node(self, name: &str) -> Self {
        self.with_property(PersistentProperty::new(name, FieldRole::EndNode))
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_descriptor(&self) -> &TypeDescriptor {
        &self.ty
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn is_node_entity(&self) -> bool {
        self.kind == EntityKind::Node
    }

    pub fn properties(&self) -> &[PersistentProperty] {
        &self.properties
    }

    pub fn persistent_property(&self, name: &str) -> Option<&PersistentProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Like [`PersistentEntity::persistent_property`], but an unknown field is a
    /// mapping error.
    pub fn require_property(&self, name: &str) -> Result<&PersistentProperty> {
        self.persistent_property(name).ok_or_else(|| {
            OgmError::Mapping(format!("{} has no mapped field `{name}`", self.ty))
        })
    }

    pub fn endpoint_property(&self, role: &FieldRole) -> Option<&PersistentProperty> {
        self.properties.iter().find(|p| &p.role == role)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for p in &self.properties {
            let reserved = match &p.role {
                FieldRole::Property => p.name == TYPE_PROPERTY,
                FieldRole::RelatedTo { rel_type, .. } => is_reserved_rel_type(rel_type),
                _ => false,
            };
            if reserved {
                return Err(OgmError::Mapping(format!(
                    "field `{}` of {} would overwrite type bookkeeping",
                    p.name, self.ty
                )));
            }
        }
        match &self.kind {
            EntityKind::Node => {
                if let Some(p) = self.properties.iter().find(|p| p.is_endpoint()) {
                    return Err(OgmError::Mapping(format!(
                        "node entity {} cannot declare endpoint field `{}`",
                        self.ty, p.name
                    )));
                }
            }
            EntityKind::Relationship { rel_type } => {
                if is_reserved_rel_type(rel_type) {
                    return Err(OgmError::Mapping(format!(
                        "relationship entity {} cannot use the reserved type `{rel_type}`",
                        self.ty
                    )));
                }
                for role in [FieldRole::StartNode, FieldRole::EndNode] {
                    if self.endpoint_property(&role).is_none() {
                        return Err(OgmError::Mapping(format!(
                            "relationship entity {} lacks a {role:?} field",
                            self.ty
                        )));
                    }
                }
                if let Some(p) = self
                    .properties
                    .iter()
                    .find(|p| matches!(p.role, FieldRole::RelatedTo { .. }))
                {
                    return Err(OgmError::Mapping(format!(
                        "relationship entity {} cannot declare related field `{}`",
                        self.ty, p.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Registry of every mapped domain type, keyed by runtime type.
#[derive(Debug, Default)]
pub struct MappingContext {
    entities: RwLock<FxHashMap<TypeId, Arc<PersistentEntity>>>,
}

impl MappingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `entity`, replacing any earlier description of the same type.
    pub fn register(&self, entity: PersistentEntity) -> Result<Arc<PersistentEntity>> {
        entity.validate()?;
        let entity = Arc::new(entity);
        self.entities
            .write()
            .insert(entity.type_id, Arc::clone(&entity));
        Ok(entity)
    }

    pub fn persistent_entity(&self, type_id: TypeId) -> Result<Arc<PersistentEntity>> {
        self.entities
            .read()
            .get(&type_id)
            .cloned()
            .ok_or_else(|| OgmError::Mapping(format!("{type_id:?} is not a mapped entity type")))
    }

    /// Metadata for the runtime type of `entity`.
    pub fn persistent_entity_of(&self, entity: &dyn Any) -> Result<Arc<PersistentEntity>> {
        self.persistent_entity(entity.type_id())
    }

    pub fn persistent_entity_for<T: Any>(&self) -> Result<Arc<PersistentEntity>> {
        self.persistent_entity(TypeId::of::<T>()).map_err(|_| {
            OgmError::Mapping(format!(
                "{} is not a mapped entity type",
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn by_descriptor(&self, ty: &TypeDescriptor) -> Option<Arc<PersistentEntity>> {
        self.entities
            .read()
            .values()
            .find(|entity| &entity.ty == ty)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }
}
