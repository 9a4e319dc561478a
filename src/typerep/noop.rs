use super::{Instantiators, Strategy, TypeRepresentationStrategy, TypedElements};
use crate::error::{OgmError, Result};
use crate::model::{ElementRef, TypeDescriptor};

/// Records nothing. Used when type tracking is switched off.
#[derive(Default)]
pub struct NoopTypeRepresentation {
    instantiators: Instantiators,
}

impl NoopTypeRepresentation {
    pub fn new(instantiators: Instantiators) -> Self {
        Self { instantiators }
    }
}

impl TypeRepresentationStrategy for NoopTypeRepresentation {
    fn strategy(&self) -> Strategy {
        Strategy::Noop
    }

    fn tag(&self, _element: ElementRef, _ty: &TypeDescriptor) -> Result<()> {
        Ok(())
    }

    fn resolve_type(&self, element: ElementRef) -> Result<TypeDescriptor> {
        Err(OgmError::NotFound(element))
    }

    fn iterate_by_type(&self, _ty: &TypeDescriptor) -> Result<TypedElements> {
        Err(OgmError::Unsupported("type enumeration is disabled"))
    }

    fn count_by_type(&self, _ty: &TypeDescriptor) -> Result<u64> {
        Err(OgmError::Unsupported("type counting is disabled"))
    }

    fn untag(&self, _element: ElementRef) -> Result<()> {
        Ok(())
    }

    fn instantiators(&self) -> &Instantiators {
        &self.instantiators
    }
}
