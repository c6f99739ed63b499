//! Creation of new pool entries

use std::sync::Arc;

use crate::entry::{Entry, ObjectValidator, PoolEntry};
use crate::errors::BoxError;

/// Produces the objects managed by a pool
///
/// Implemented for any `Fn() -> Result<T, BoxError>` closure.
pub trait ObjectFactory<T>: Send + Sync {
    /// Create a fresh object; a failed attempt must clean up after itself
    fn create_instance(&self) -> Result<T, BoxError>;
}

impl<T, F> ObjectFactory<T> for F
where
    F: Fn() -> Result<T, BoxError> + Send + Sync,
{
    fn create_instance(&self) -> Result<T, BoxError> {
        self()
    }
}

/// Wraps freshly created objects into valid entries sharing one validator
pub struct EntryFactory<T> {
    object_factory: Arc<dyn ObjectFactory<T>>,
    validator: Arc<dyn ObjectValidator<T>>,
}

impl<T> EntryFactory<T> {
    pub fn new(
        object_factory: Arc<dyn ObjectFactory<T>>,
        validator: Arc<dyn ObjectValidator<T>>,
    ) -> Self {
        Self {
            object_factory,
            validator,
        }
    }

    /// Create a new entry
    ///
    /// # Errors
    ///
    /// The object factory's error is returned verbatim.
    pub fn create(&self) -> Result<Entry<T>, BoxError> {
        let object = self.object_factory.create_instance()?;
        Ok(Arc::new(PoolEntry::new(object, Arc::clone(&self.validator))))
    }
}
