use std::io;

use thiserror::Error;

use crate::model::{ElementRef, TypeDescriptor};

pub type Result<T> = std::result::Result<T, OgmError>;

#[derive(Debug, Error)]
pub enum OgmError {
    /// The one-time strategy probe failed; the mapping layer cannot start.
    #[error("type representation initialization failed: {source}")]
    Initialization {
        #[source]
        source: Box<OgmError>,
    },
    #[error("mapping error: {0}")]
    Mapping(String),
    #[error("graph store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("{0} not found in graph store")]
    ElementNotFound(ElementRef),
    #[error("{0} has no recorded entity type")]
    NotFound(ElementRef),
    #[error("cannot access field `{field}` of detached {entity}: no live store context")]
    DetachedAccess { entity: String, field: String },
    #[error("illegal entity state: {0}")]
    IllegalState(String),
    #[error("{element} is already tagged as {existing}, refusing to retag as {requested}")]
    TypeConflict {
        element: ElementRef,
        existing: TypeDescriptor,
        requested: TypeDescriptor,
    },
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl OgmError {
    pub(crate) fn initialization(source: OgmError) -> Self {
        OgmError::Initialization {
            source: Box::new(source),
        }
    }

    pub(crate) fn detached(entity: &TypeDescriptor, field: &str) -> Self {
        OgmError::DetachedAccess {
            entity: entity.to_string(),
            field: field.to_string(),
        }
    }

    /// Whether the caller can reasonably continue after this error.
    ///
    /// Nothing in this crate retries; this only classifies failures for callers.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            OgmError::NotFound(_)
                | OgmError::DetachedAccess { .. }
                | OgmError::TypeConflict { .. }
                | OgmError::ElementNotFound(_)
        )
    }
}

impl From<serde_json::Error> for OgmError {
    fn from(err: serde_json::Error) -> Self {
        OgmError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeId;

    #[test]
    fn initialization_wraps_the_probe_failure() {
        let err = OgmError::initialization(OgmError::StoreUnavailable("offline".into()));
        assert!(!err.is_recoverable());
        assert_eq!(
            err.to_string(),
            "type representation initialization failed: graph store unavailable: offline"
        );
    }

    #[test]
    fn detached_access_names_entity_and_field() {
        let err = OgmError::detached(&TypeDescriptor::new("app::Person"), "name");
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("`name`"));
        assert!(err.to_string().contains("app::Person"));
    }

    #[test]
    fn not_found_is_recoverable() {
        let err = OgmError::NotFound(ElementRef::Node(NodeId(7)));
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "node 7 has no recorded entity type");
    }
}
