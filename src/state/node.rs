use std::collections::BTreeSet;
use std::sync::Arc;

use super::{AttachedCore, EntityState, Lifecycle};
use crate::error::{OgmError, Result};
use crate::fieldaccess::{FieldAccessorChain, FieldValue};
use crate::mapping::PersistentEntity;
use crate::model::{Direction, ElementRef, NodeId, RelId};
use crate::template::GraphTemplate;

/// Attached state of a node entity. Every field access hits the store.
pub struct NodeEntityState {
    core: AttachedCore,
}

impl NodeEntityState {
    pub fn new(template: GraphTemplate, accessors: FieldAccessorChain) -> Result<Self> {
        if !accessors.entity().is_node_entity() {
            return Err(OgmError::Mapping(format!(
                "{} is not a node entity",
                accessors.entity().type_descriptor()
            )));
        }
        Ok(Self {
            core: AttachedCore::new(template, accessors),
        })
    }

    pub fn node(&self) -> Option<NodeId> {
        self.core.element().and_then(ElementRef::as_node)
    }
}

impl EntityState for NodeEntityState {
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
        self.core.get(field)
    }

    fn set_value(&mut self, field: &str, value: FieldValue) -> Result<()> {
        self.core.set(field, &value)
    }

    fn persist(&mut self) -> Result<ElementRef> {
        self.core.ensure_live()?;
        if let Some(element) = self.core.element() {
            return Ok(element);
        }
        let node = self.core.template().store().create_node()?;
        self.core.adopt_new(node.into())?;
        Ok(node.into())
    }

    fn delete(&mut self) -> Result<()> {
        self.core.ensure_live()?;
        if let Some(node) = self.node() {
            let template = self.core.template();
            let store = template.store();
            let types = template.type_representation();
            types.untag(node.into())?;
            let rels: BTreeSet<RelId> = store
                .relationships(node, Direction::Both, None)?
                .into_iter()
                .map(|rel| rel.id)
                .collect();
            for rel in rels {
                types.untag(rel.into())?;
                store.delete_relationship(rel)?;
            }
            store.delete_node(node)?;
        }
        self.core.mark_deleted();
        Ok(())
    }
}
