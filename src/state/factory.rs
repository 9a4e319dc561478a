use std::any::Any;
use std::sync::Arc;

use tracing::trace;

use super::{DetachedEntityState, EntityState, NodeEntityState, RelationshipEntityState};
use crate::error::{OgmError, Result};
use crate::fieldaccess::{DefaultFieldAccessorFactoryFactory, FieldAccessorFactoryFactory};
use crate::mapping::{MappingContext, PersistentEntity};
use crate::template::GraphTemplate;

/// Produces the entity state for a domain object entering persistence.
pub trait EntityStateFactory: Send + Sync {
    /// Resolves the metadata of `entity`'s runtime type and builds its state.
    ///
    /// `entity` must be the domain object itself, not a box or reference to
    /// it, since its runtime type is what gets looked up. With `detachable`
    /// the attached state is wrapped in a [`DetachedEntityState`].
    fn get_entity_state(
        &self,
        entity: &dyn Any,
        detachable: bool,
        template: &GraphTemplate,
    ) -> Result<Box<dyn EntityState>>;

    /// Like [`EntityStateFactory::get_entity_state`] with the template's
    /// configured detachability.
    fn get_default_entity_state(
        &self,
        entity: &dyn Any,
        template: &GraphTemplate,
    ) -> Result<Box<dyn EntityState>> {
        self.get_entity_state(entity, template.detachable_by_default(), template)
    }
}

fn wrap<S: EntityState + 'static>(
    state: S,
    detachable: bool,
    template: &GraphTemplate,
) -> Box<dyn EntityState> {
    if detachable {
        Box::new(DetachedEntityState::new(state, template.clone()))
    } else {
        Box::new(state)
    }
}

/// Builds states for node entities.
#[derive(Clone)]
pub struct NodeEntityStateFactory {
    mapping: Arc<MappingContext>,
    accessors: Arc<dyn FieldAccessorFactoryFactory>,
}

impl NodeEntityStateFactory {
    pub fn new(
        mapping: Arc<MappingContext>,
        accessors: Arc<dyn FieldAccessorFactoryFactory>,
    ) -> Self {
        Self { mapping, accessors }
    }

    pub fn with_default_accessors(mapping: Arc<MappingContext>) -> Self {
        Self::new(mapping, Arc::new(DefaultFieldAccessorFactoryFactory))
    }

    pub fn mapping_context(&self) -> &Arc<MappingContext> {
        &self.mapping
    }
}

impl EntityStateFactory for NodeEntityStateFactory {
    fn get_entity_state(
        &self,
        entity: &dyn Any,
        detachable: bool,
        template: &GraphTemplate,
    ) -> Result<Box<dyn EntityState>> {
        let persistent = self.mapping.persistent_entity_of(entity)?;
        let chain = self
            .accessors
            .provide_factory_for(template)
            .for_entity(Arc::clone(&persistent))?;
        let state = NodeEntityState::new(template.clone(), chain)?;
        trace!(ty = %persistent.type_descriptor(), detachable, "node entity state created");
        Ok(wrap(state, detachable, template))
    }
}

/// Builds states for relationship entities.
#[derive(Clone)]
pub struct RelationshipEntityStateFactory {
    mapping: Arc<MappingContext>,
    accessors: Arc<dyn FieldAccessorFactoryFactory>,
}

impl RelationshipEntityStateFactory {
    pub fn new(
        mapping: Arc<MappingContext>,
        accessors: Arc<dyn FieldAccessorFactoryFactory>,
    ) -> Self {
        Self { mapping, accessors }
    }

    pub fn with_default_accessors(mapping: Arc<MappingContext>) -> Self {
        Self::new(mapping, Arc::new(DefaultFieldAccessorFactoryFactory))
    }

    fn relationship_entity(&self, entity: &dyn Any) -> Result<Arc<PersistentEntity>> {
        let persistent = self.mapping.persistent_entity_of(entity)?;
        if persistent.is_node_entity() {
            return Err(OgmError::Mapping(format!(
                "{} is not a relationship entity",
                persistent.type_descriptor()
            )));
        }
        Ok(persistent)
    }
}

impl EntityStateFactory for RelationshipEntityStateFactory {
    fn get_entity_state(
        &self,
        entity: &dyn Any,
        detachable: bool,
        template: &GraphTemplate,
    ) -> Result<Box<dyn EntityState>> {
        let persistent = self.relationship_entity(entity)?;
        let chain = self
            .accessors
            .provide_factory_for(template)
            .for_entity(Arc::clone(&persistent))?;
        let state = RelationshipEntityState::new(template.clone(), chain)?;
        trace!(ty = %persistent.type_descriptor(), detachable, "relationship entity state created");
        Ok(wrap(state, detachable, template))
    }
}
