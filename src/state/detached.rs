use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use super::{EntityState, Lifecycle};
use crate::error::{OgmError, Result};
use crate::fieldaccess::FieldValue;
use crate::mapping::PersistentEntity;
use crate::model::ElementRef;
use crate::template::GraphTemplate;

/// Placeholder field name reported when a whole-entity operation needs a
/// live store context.
const WHOLE_ENTITY: &str = "*";

/// Decorates an attached state with a field cache and a write buffer.
///
/// Reads are served from the cache; a miss is delegated to the wrapped state
/// only while the store has a live context, and the result is cached. Writes
/// always land in the cache. They reach the store immediately, together with
/// anything still buffered, when the state is bound and a context is live;
/// otherwise they are buffered until the next such write,
/// [`EntityState::reattach`] or [`EntityState::persist`]. An explicit
/// [`EntityState::detach`] only changes the reported lifecycle.
///
/// The buffer is owned by this value and is not synchronized.
pub struct DetachedEntityState<S> {
    inner: S,
    template: GraphTemplate,
    cache: FxHashMap<String, FieldValue>,
    dirty: BTreeMap<String, FieldValue>,
    detached: bool,
}

impl<S: EntityState> DetachedEntityState<S> {
    pub fn new(inner: S, template: GraphTemplate) -> Self {
        Self {
            inner,
            template,
            cache: FxHashMap::default(),
            dirty: BTreeMap::new(),
            detached: false,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of writes waiting to be flushed.
    pub fn pending_writes(&self) -> usize {
        self.dirty.len()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn cached(&self, field: &str) -> Option<&FieldValue> {
        self.cache.get(field)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.inner.lifecycle() == Lifecycle::Deleted {
            return Err(OgmError::IllegalState(format!(
                "{} has been deleted",
                self.inner.entity_type()
            )));
        }
        Ok(())
    }

    fn require_context(&self, field: &str) -> Result<()> {
        if self.template.has_active_context() {
            Ok(())
        } else {
            Err(OgmError::detached(self.inner.entity_type(), field))
        }
    }

    fn writes_through(&self) -> bool {
        self.inner.element().is_some() && self.template.has_active_context()
    }

    /// Pushes buffered writes in field order. On failure the failing write and
    /// everything after it stay buffered.
    fn flush(&mut self) -> Result<()> {
        let pending = self.dirty.len();
        while let Some((field, value)) = self.dirty.pop_first() {
            if let Err(err) = self.inner.set_value(&field, value.clone()) {
                self.dirty.insert(field, value);
                return Err(err);
            }
        }
        if pending > 0 {
            debug!(ty = %self.inner.entity_type(), writes = pending, "buffered writes flushed");
        }
        Ok(())
    }

    /// Hands buffered endpoint writes to an unbound relationship state so it
    /// can create its relationship.
    fn flush_endpoints(&mut self) -> Result<()> {
        let entity = Arc::clone(self.inner.persistent_entity());
        let endpoints: Vec<String> = self
            .dirty
            .keys()
            .filter(|field| {
                entity
                    .persistent_property(field)
                    .is_some_and(|p| p.is_endpoint())
            })
            .cloned()
            .collect();
        for field in endpoints {
            if let Some(value) = self.dirty.remove(&field) {
                self.inner.set_value(&field, value)?;
            }
        }
        Ok(())
    }
}

impl<S: EntityState> EntityState for DetachedEntityState<S> {
    fn persistent_entity(&self) -> &Arc<PersistentEntity> {
        self.inner.persistent_entity()
    }

    fn element(&self) -> Option<ElementRef> {
        self.inner.element()
    }

    fn lifecycle(&self) -> Lifecycle {
        match self.inner.lifecycle() {
            Lifecycle::Deleted => Lifecycle::Deleted,
            Lifecycle::Unbound => Lifecycle::Unbound,
            Lifecycle::Attached | Lifecycle::Detached => {
                if self.detached || self.is_dirty() || !self.template.has_active_context() {
                    Lifecycle::Detached
                } else {
                    Lifecycle::Attached
                }
            }
        }
    }

    fn bind(&mut self, element: ElementRef) -> Result<()> {
        self.ensure_live()?;
        self.inner.bind(element)
    }

    fn get_value(&mut self, field: &str) -> Result<FieldValue> {
        self.ensure_live()?;
        self.inner.persistent_entity().require_property(field)?;
        if let Some(value) = self.cache.get(field) {
            return Ok(value.clone());
        }
        if self.inner.element().is_none() {
            // Nothing stored yet, so there is nothing to fetch.
            return Ok(FieldValue::Null);
        }
        self.require_context(field)?;
        let value = self.inner.get_value(field)?;
        self.cache.insert(field.to_string(), value.clone());
        Ok(value)
    }

    fn set_value(&mut self, field: &str, value: FieldValue) -> Result<()> {
        self.ensure_live()?;
        let entity = Arc::clone(self.inner.persistent_entity());
        if !entity.require_property(field)?.is_writeable() {
            return Err(OgmError::InvalidArgument(format!(
                "field `{field}` of {} is read-only",
                entity.type_descriptor()
            )));
        }
        if self.writes_through() {
            self.flush()?;
            self.cache.remove(field);
            self.inner.set_value(field, value.clone())?;
        } else {
            trace!(ty = %entity.type_descriptor(), field, "write buffered");
            self.dirty.insert(field.to_string(), value.clone());
        }
        self.cache.insert(field.to_string(), value);
        Ok(())
    }

    fn persist(&mut self) -> Result<ElementRef> {
        self.ensure_live()?;
        self.require_context(WHOLE_ENTITY)?;
        if self.inner.element().is_none() {
            self.flush_endpoints()?;
        }
        let element = self.inner.persist()?;
        self.flush()?;
        self.detached = false;
        Ok(element)
    }

    fn delete(&mut self) -> Result<()> {
        self.ensure_live()?;
        if self.inner.element().is_some() {
            self.require_context(WHOLE_ENTITY)?;
        }
        self.inner.delete()?;
        self.cache.clear();
        self.dirty.clear();
        Ok(())
    }

    fn is_detachable(&self) -> bool {
        true
    }

    fn detach(&mut self) -> Result<()> {
        self.ensure_live()?;
        if !self.detached {
            debug!(ty = %self.inner.entity_type(), "entity detached");
        }
        self.detached = true;
        Ok(())
    }

    fn reattach(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.require_context(WHOLE_ENTITY)?;
        if self.inner.element().is_none() {
            self.persist()?;
        } else {
            self.flush()?;
        }
        self.detached = false;
        debug!(ty = %self.inner.entity_type(), "entity reattached");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fieldaccess::DelegatingFieldAccessorFactory;
    use crate::model::{Direction, PropertyValue};
    use crate::state::NodeEntityState;
    use crate::store::{CounterMetrics, GraphStore, MemoryGraph};
    use crate::typerep::{IndexedTypeRepresentation, Instantiators};

    struct Person;

    fn detached() -> Result<(
        Arc<MemoryGraph>,
        Arc<CounterMetrics>,
        DetachedEntityState<NodeEntityState>,
    )> {
        let metrics = Arc::new(CounterMetrics::default());
        let graph = Arc::new(MemoryGraph::new().with_metrics(metrics.clone()));
        let store: Arc<dyn GraphStore> = graph.clone();
        let types = Arc::new(IndexedTypeRepresentation::new(
            Arc::clone(&store),
            Instantiators::default(),
        ));
        let template = GraphTemplate::new(Arc::clone(&store), types);
        let entity = Arc::new(
            PersistentEntity::node::<Person>()
                .named("Person")
                .id("id")
                .property("name")
                .property("age")
                .related_to("friend", "KNOWS", Direction::Outgoing),
        );
        let chain = DelegatingFieldAccessorFactory::with_defaults(template.clone()).for_entity(entity)?;
        let inner = NodeEntityState::new(template.clone(), chain)?;
        Ok((graph, metrics, DetachedEntityState::new(inner, template)))
    }

    #[test]
    fn unbound_writes_are_buffered_and_readable() -> Result<()> {
        let (_graph, metrics, mut state) = detached()?;
        let before = metrics.snapshot();
        state.set_value("name", FieldValue::from("Ada"))?;
        assert_eq!(state.get_value("name")?, FieldValue::from("Ada"));
        assert_eq!(state.get_value("age")?, FieldValue::Null);
        assert_eq!(metrics.snapshot(), before);
        assert_eq!(state.lifecycle(), Lifecycle::Unbound);
        assert_eq!(state.pending_writes(), 1);
        Ok(())
    }

    #[test]
    fn persist_requires_a_context_and_flushes() -> Result<()> {
        let (graph, _metrics, mut state) = detached()?;
        state.set_value("name", FieldValue::from("Ada"))?;
        assert!(matches!(
            state.persist(),
            Err(OgmError::DetachedAccess { .. })
        ));

        let _ctx = graph.begin_context();
        let element = state.persist()?;
        assert_eq!(
            graph.property(element, "name")?,
            Some(PropertyValue::from("Ada"))
        );
        assert!(!state.is_dirty());
        assert_eq!(state.lifecycle(), Lifecycle::Attached);
        Ok(())
    }

    #[test]
    fn writes_go_through_while_attached() -> Result<()> {
        let (graph, _metrics, mut state) = detached()?;
        let _ctx = graph.begin_context();
        let element = state.persist()?;
        state.set_value("age", FieldValue::from(36i64))?;
        assert!(!state.is_dirty());
        assert_eq!(graph.property(element, "age")?, Some(PropertyValue::Int(36)));
        Ok(())
    }

    #[test]
    fn read_miss_without_context_is_a_detached_access() -> Result<()> {
        let (graph, _metrics, mut state) = detached()?;
        let element = {
            let _ctx = graph.begin_context();
            state.persist()?
        };
        graph.set_property(element, "age", PropertyValue::Int(36))?;
        let err = state.get_value("age").unwrap_err();
        assert!(matches!(
            &err,
            OgmError::DetachedAccess { field, .. } if field == "age"
        ));
        assert!(err.is_recoverable());

        let _ctx = graph.begin_context();
        assert_eq!(state.get_value("age")?, FieldValue::from(36i64));
        assert_eq!(state.cached("age"), Some(&FieldValue::from(36i64)));
        Ok(())
    }

    #[test]
    fn detached_writes_wait_for_a_context() -> Result<()> {
        let (graph, metrics, mut state) = detached()?;
        let element = {
            let _ctx = graph.begin_context();
            state.persist()?
        };
        state.detach()?;
        assert_eq!(state.lifecycle(), Lifecycle::Detached);

        let before = metrics.snapshot();
        state.set_value("name", FieldValue::from("Grace"))?;
        assert_eq!(state.get_value("name")?, FieldValue::from("Grace"));
        assert_eq!(metrics.snapshot(), before);
        assert_eq!(state.pending_writes(), 1);

        // The next write under a live context pushes the buffer along with it.
        let _ctx = graph.begin_context();
        state.set_value("age", FieldValue::from(85i64))?;
        assert!(!state.is_dirty());
        assert_eq!(
            graph.property(element, "name")?,
            Some(PropertyValue::from("Grace"))
        );
        assert_eq!(graph.property(element, "age")?, Some(PropertyValue::Int(85)));
        assert_eq!(state.lifecycle(), Lifecycle::Detached);

        state.reattach()?;
        assert_eq!(state.lifecycle(), Lifecycle::Attached);
        Ok(())
    }

    #[test]
    fn failed_flush_keeps_the_remaining_writes() -> Result<()> {
        let (graph, _metrics, mut state) = detached()?;
        let ctx = graph.begin_context();
        state.persist()?;
        drop(ctx);
        state.set_value("friend", FieldValue::Node(crate::model::NodeId(999)))?;
        state.set_value("name", FieldValue::from("Ada"))?;

        let _ctx = graph.begin_context();
        assert!(matches!(
            state.reattach(),
            Err(OgmError::ElementNotFound(_))
        ));
        assert_eq!(state.pending_writes(), 2);
        Ok(())
    }

    #[test]
    fn id_field_cannot_be_written() -> Result<()> {
        let (_graph, _metrics, mut state) = detached()?;
        assert!(matches!(
            state.set_value("id", FieldValue::from(1i64)),
            Err(OgmError::InvalidArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn deleted_state_rejects_everything() -> Result<()> {
        let (graph, _metrics, mut state) = detached()?;
        let _ctx = graph.begin_context();
        state.set_value("name", FieldValue::from("Ada"))?;
        state.persist()?;
        state.delete()?;
        assert_eq!(state.lifecycle(), Lifecycle::Deleted);
        for result in [
            state.get_value("name").map(|_| ()),
            state.set_value("name", FieldValue::Null),
            state.detach(),
            state.reattach(),
            state.persist().map(|_| ()),
        ] {
            assert!(matches!(result, Err(OgmError::IllegalState(_))));
        }
        Ok(())
    }
}
