//! Common test utilities for esox_resourcepool
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use esox_resourcepool::{BoxError, CorePool, ObjectFactory, ObjectValidator, Pool, PoolConfig};

/// Pooled object recording whether it was disposed
#[derive(Debug, Default)]
pub struct SpyObject {
    pub serial: usize,
    pub disposed: AtomicBool,
}

/// Factory counting the objects it creates, optionally failing every call
#[derive(Default)]
pub struct SpyFactory {
    pub fail: AtomicBool,
    pub created: AtomicUsize,
}

impl SpyFactory {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ObjectFactory<SpyObject> for SpyFactory {
    fn create_instance(&self) -> Result<SpyObject, BoxError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("factory switched off".into());
        }
        let serial = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(SpyObject {
            serial,
            ..SpyObject::default()
        })
    }
}

/// Validator counting its calls, optionally rejecting every object
#[derive(Default)]
pub struct SpyValidator {
    pub force_invalid: AtomicBool,
    pub validated: AtomicUsize,
    pub invalidated: AtomicUsize,
}

impl SpyValidator {
    pub fn rejecting() -> Self {
        let validator = Self::default();
        validator.force_invalid.store(true, Ordering::SeqCst);
        validator
    }

    pub fn validated(&self) -> usize {
        self.validated.load(Ordering::SeqCst)
    }

    pub fn invalidated(&self) -> usize {
        self.invalidated.load(Ordering::SeqCst)
    }
}

impl ObjectValidator<SpyObject> for SpyValidator {
    fn validate(&self, _object: &SpyObject) -> Result<bool, BoxError> {
        self.validated.fetch_add(1, Ordering::SeqCst);
        Ok(!self.force_invalid.load(Ordering::SeqCst))
    }

    fn invalidate(&self, object: &SpyObject) -> Result<(), BoxError> {
        self.invalidated.fetch_add(1, Ordering::SeqCst);
        object.disposed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Core pool wired to the given spies
pub fn spy_pool(
    config: PoolConfig,
    factory: &Arc<SpyFactory>,
    validator: &Arc<SpyValidator>,
) -> Arc<CorePool<SpyObject>> {
    let object_factory: Arc<dyn ObjectFactory<SpyObject>> = factory.clone();
    let object_validator: Arc<dyn ObjectValidator<SpyObject>> = validator.clone();
    Arc::new(CorePool::new(config, object_factory, object_validator).unwrap())
}

/// Borrow `count` new entries and return them, leaving them idle
pub fn warm_up<P: Pool<SpyObject> + ?Sized>(pool: &P, count: usize) {
    let entries: Vec<_> = (0..count)
        .map(|_| pool.borrow().unwrap().unwrap())
        .collect();
    for entry in entries {
        pool.return_entry(Some(entry)).unwrap();
    }
}
