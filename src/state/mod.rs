//! Per-object binding between a mapped domain instance and its graph element.
//!
//! An entity state starts unbound, gets its backing element on the first
//! [`EntityState::persist`] and ends terminally on [`EntityState::delete`]:
//!
//! ```text
//! Unbound -> Attached <-> Detached -> Deleted
//! ```
//!
//! Attached states ([`NodeEntityState`], [`RelationshipEntityState`]) route
//! every field access straight to the store. [`DetachedEntityState`] wraps one
//! of them with a field cache and a write buffer so the object stays usable
//! without a live store context.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{OgmError, Result};
use crate::fieldaccess::{FieldAccessorChain, FieldValue};
use crate::mapping::PersistentEntity;
use crate::model::{ElementRef, TypeDescriptor};
use crate::template::GraphTemplate;

mod detached;
mod factory;
mod node;
mod relationship;

pub use detached::DetachedEntityState;
pub use factory::{EntityStateFactory, NodeEntityStateFactory, RelationshipEntityStateFactory};
pub use node::NodeEntityState;
pub use relationship::RelationshipEntityState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// No backing element yet.
    Unbound,
    /// Bound, and field access reaches the store directly.
    Attached,
    /// Bound, but access is served from the cache and writes are buffered.
    Detached,
    /// The backing element was deleted. Terminal.
    Deleted,
}

pub trait EntityState: Send {
    fn persistent_entity(&self) -> &Arc<PersistentEntity>;

    fn entity_type(&self) -> &TypeDescriptor {
        self.persistent_entity().type_descriptor()
    }

    /// The backing element, once there is one.
    fn element(&self) -> Option<ElementRef>;

    fn lifecycle(&self) -> Lifecycle;

    /// Binds an unbound state to an element that already exists in the store.
    fn bind(&mut self, element: ElementRef) -> Result<()>;

    fn get_value(&mut self, field: &str) -> Result<FieldValue>;

    fn set_value(&mut self, field: &str, value: FieldValue) -> Result<()>;

    /// Creates and tags the backing element if there is none yet.
    fn persist(&mut self) -> Result<ElementRef>;

    /// Untags and removes the backing element. Every later field access fails
    /// with `IllegalState`.
    fn delete(&mut self) -> Result<()>;

    fn is_detachable(&self) -> bool {
        false
    }

    fn detach(&mut self) -> Result<()> {
        Err(OgmError::Unsupported("entity state is not detachable"))
    }

    fn reattach(&mut self) -> Result<()> {
        Err(OgmError::Unsupported("entity state is not detachable"))
    }
}

/// Bookkeeping shared by the attached node and relationship states.
pub(crate) struct AttachedCore {
    template: GraphTemplate,
    accessors: FieldAccessorChain,
    element: Option<ElementRef>,
    deleted: bool,
}

impl AttachedCore {
    pub(crate) fn new(template: GraphTemplate, accessors: FieldAccessorChain) -> Self {
        Self {
            template,
            accessors,
            element: None,
            deleted: false,
        }
    }

    pub(crate) fn entity(&self) -> &Arc<PersistentEntity> {
        self.accessors.entity()
    }

    pub(crate) fn template(&self) -> &GraphTemplate {
        &self.template
    }

    pub(crate) fn element(&self) -> Option<ElementRef> {
        self.element
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        match (self.deleted, self.element) {
            (true, _) => Lifecycle::Deleted,
            (false, None) => Lifecycle::Unbound,
            (false, Some(_)) => Lifecycle::Attached,
        }
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.deleted {
            return Err(OgmError::IllegalState(format!(
                "{} has been deleted",
                self.entity().type_descriptor()
            )));
        }
        Ok(())
    }

    fn bound(&self, field: &str) -> Result<ElementRef> {
        self.ensure_live()?;
        self.entity().require_property(field)?;
        self.element.ok_or_else(|| {
            OgmError::IllegalState(format!(
                "{} has no backing element; persist it before accessing `{field}`",
                self.entity().type_descriptor()
            ))
        })
    }

    pub(crate) fn get(&self, field: &str) -> Result<FieldValue> {
        let element = self.bound(field)?;
        self.accessors.get_value(element, field)
    }

    pub(crate) fn set(&self, field: &str, value: &FieldValue) -> Result<()> {
        let element = self.bound(field)?;
        self.accessors.set_value(element, field, value)
    }

    pub(crate) fn bind(&mut self, element: ElementRef) -> Result<()> {
        self.ensure_live()?;
        match self.element {
            Some(current) if current == element => return Ok(()),
            Some(current) => {
                return Err(OgmError::IllegalState(format!(
                    "{} is already bound to {current}",
                    self.entity().type_descriptor()
                )))
            }
            None => {}
        }
        if element.is_node() != self.entity().is_node_entity() {
            return Err(OgmError::InvalidArgument(format!(
                "{element} cannot back {}",
                self.entity().type_descriptor()
            )));
        }
        let store = self.template.store();
        match element {
            ElementRef::Node(node) => {
                if !store.node_exists(node)? {
                    return Err(OgmError::ElementNotFound(element));
                }
            }
            ElementRef::Relationship(rel) => {
                store.relationship(rel)?;
            }
        }
        self.element = Some(element);
        Ok(())
    }

    /// Tags a freshly created element and binds to it. A failed tag removes
    /// the element again.
    pub(crate) fn adopt_new(&mut self, element: ElementRef) -> Result<()> {
        let ty = self.entity().type_descriptor().clone();
        if let Err(err) = self.template.type_representation().tag(element, &ty) {
            let store = self.template.store();
            let cleanup = match element {
                ElementRef::Node(node) => store.delete_node(node),
                ElementRef::Relationship(rel) => store.delete_relationship(rel),
            };
            if let Err(cleanup) = cleanup {
                warn!(%element, error = %cleanup, "failed to remove untaggable element");
            }
            return Err(err);
        }
        debug!(%element, %ty, "entity persisted");
        self.element = Some(element);
        Ok(())
    }

    pub(crate) fn mark_deleted(&mut self) {
        if let Some(element) = self.element.take() {
            debug!(%element, ty = %self.entity().type_descriptor(), "entity deleted");
        }
        self.deleted = true;
    }
}
