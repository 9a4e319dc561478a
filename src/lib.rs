//! Object-graph mapping core for schema-less graph stores.
//!
//! Two concerns live here:
//!
//! * [`typerep`] decides once per database how "element E is of domain type T"
//!   is recorded, and records, resolves and enumerates those associations;
//! * [`state`] binds individual domain objects to their graph elements and
//!   routes field access to the store, directly or through a detached cache.
//!
//! [`store::MemoryGraph`] is the in-process [`store::GraphStore`] used by the
//! inspector binary and the tests.

pub mod config;
pub mod error;
pub mod fieldaccess;
pub mod mapping;
pub mod model;
pub mod state;
pub mod store;
pub mod template;
pub mod typerep;

pub use config::{OgmConfig, StrategyOverride};
pub use error::{OgmError, Result};
pub use fieldaccess::FieldValue;
pub use mapping::{MappingContext, PersistentEntity};
pub use model::{Direction, ElementRef, NodeId, PropertyValue, RelId, TypeDescriptor};
pub use state::{
    DetachedEntityState, EntityState, EntityStateFactory, Lifecycle, NodeEntityStateFactory,
    RelationshipEntityStateFactory,
};
pub use store::{GraphStore, MemoryGraph};
pub use template::GraphTemplate;
pub use typerep::{Strategy, StrategySelector, TypeRepresentationStrategy};
