use std::sync::Arc;

use super::{AttachedCore, EntityState, Lifecycle};
use crate::error::{OgmError, Result};
use crate::fieldaccess::{FieldAccessorChain, FieldValue};
use crate::mapping::{EntityKind, FieldRole, PersistentEntity};
use crate::model::{ElementRef, NodeId, RelId};
use crate::template::GraphTemplate;

/// Attached state of a relationship entity.
///
/// Until the relationship exists its endpoint fields are held locally; every
/// other field needs the backing relationship.
pub struct RelationshipEntityState {
    core: AttachedCore,
    rel_type: String,
    start: Option<NodeId>,
    end: Option<NodeId>,
}

impl RelationshipEntityState {
    pub fn new(template: GraphTemplate, accessors: FieldAccessorChain) -> Result<Self> {
        let EntityKind::Relationship { rel_type } = accessors.entity().kind().clone() else {
            return Err(OgmError::Mapping(format!(
                "{} is not a relationship entity",
                accessors.entity().type_descriptor()
            )));
        };
        Ok(Self {
            core: AttachedCore::new(template, accessors),
            rel_type,
            start: None,
            end: None,
        })
    }

    pub fn relationship(&self) -> Option<RelId> {
        self.core.element().and_then(ElementRef::as_relationship)
    }

    pub fn rel_type(&self) -> &str {
        &self.rel_type
    }

    /// The endpoint slot `field` maps to, when the state is still unbound.
    fn pending_endpoint(&mut self, field: &str) -> Result<Option<&mut Option<NodeId>>> {
        self.core.ensure_live()?;
        if self.core.element().is_some() {
            return Ok(None);
        }
        let role = self.core.entity().require_property(field)?.role().clone();
        Ok(match role {
            FieldRole::StartNode => Some(&mut self.start),
            FieldRole::EndNode => Some(&mut self.end),
            _ => None,
        })
    }
}

impl EntityState for RelationshipEntityState {
    fn persistent_entity(&self) -> &Arc<PersistentEntity> {
        self.core.entity()
    }

    fn element(&self) -> Option<ElementRef> {
        self.core.element()
    }

    fn lifecycle(&self) -> Lifecycle {
        self.core.lifecycle()
    }

    fn bind(&mut self, element: ElementRef) -> Result<()> {
        self.core.bind(element)
    }

    fn get_value(&mut self, field: &str) -> Result<FieldValue> {
        if let Some(slot) = self.pending_endpoint(field)? {
            return Ok(slot.map_or(FieldValue::Null, FieldValue::Node));
        }
        self.core.get(field)
    }

    fn set_value(&mut self, field: &str, value: FieldValue) -> Result<()> {
        if let Some(slot) = self.pending_endpoint(field)? {
            *slot = match value {
                FieldValue::Null => None,
                FieldValue::Node(node) => Some(node),
                other => {
                    return Err(OgmError::InvalidArgument(format!(
                        "endpoint `{field}` must be a node, got {other:?}"
                    )))
                }
            };
            return Ok(());
        }
        self.core.set(field, &value)
    }

    fn persist(&mut self) -> Result<ElementRef> {
        self.core.ensure_live()?;
        if let Some(element) = self.core.element() {
            return Ok(element);
        }
        let (Some(start), Some(end)) = (self.start, self.end) else {
            return Err(OgmError::IllegalState(format!(
                "{} needs both endpoints before it can be persisted",
                self.core.entity().type_descriptor()
            )));
        };
        let rel = self
            .core
            .template()
            .store()
            .create_relationship(start, end, &self.rel_type)?;
        self.core.adopt_new(rel.into())?;
        Ok(rel.into())
    }

    fn delete(&mut self) -> Result<()> {
        self.core.ensure_live()?;
        if let Some(rel) = self.relationship() {
            let template = self.core.template();
            template.type_representation().untag(rel.into())?;
            template.store().delete_relationship(rel)?;
        }
        self.core.mark_deleted();
        Ok(())
    }
}
