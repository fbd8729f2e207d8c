//! # Engine Instance Manager Module
//!
//! Sharing policy for stateful recognition engines. An engine instance is either
//! owned by one worker or wrapped in a [`SharedEngine`], which serializes calls
//! through a lock. [`EngineRegistry`] keeps one shared instance per configuration
//! key so expensive engines are built once and reused.

use std::collections::HashMap;
use std::sync::Arc;

use image::GrayImage;
use parking_lot::Mutex;
use tracing::info;

use crate::ocr::{RecognitionEngine, RecognitionResult};
use crate::ocr_errors::OcrError;

/// A recognition engine behind a lock, cheap to clone and safe to share.
pub struct SharedEngine<E> {
    inner: Arc<Mutex<E>>,
}

impl<E> SharedEngine<E> {
    pub fn new(engine: E) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Runs `f` with exclusive access to the engine.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        let mut engine = self.inner.lock();
        f(&mut engine)
    }

    /// Number of handles sharing this engine.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl<E: RecognitionEngine> SharedEngine<E> {
    /// Recognizes one region while holding the lock.
    pub fn recognize(&self, region: &GrayImage) -> Result<RecognitionResult, OcrError> {
        self.with_engine(|engine| engine.recognize(region))
    }
}

impl<E> Clone for SharedEngine<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> std::fmt::Debug for SharedEngine<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedEngine")
            .field("handles", &self.handle_count())
            .finish()
    }
}

/// Keyed pool of shared engines.
///
/// Instances are created on first request for a key and persist until removed
/// or the registry is dropped.
pub struct EngineRegistry<E> {
    instances: Mutex<HashMap<String, SharedEngine<E>>>,
}

impl<E> EngineRegistry<E> {
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the engine stored under `key`, building it with `factory` if absent.
    ///
    /// # Errors
    ///
    /// Returns the factory's error; nothing is stored in that case.
    pub fn get_or_create(
        &self,
        key: &str,
        factory: impl FnOnce() -> Result<E, OcrError>,
    ) -> Result<SharedEngine<E>, OcrError> {
        if let Some(instance) = self.instances.lock().get(key) {
            return Ok(instance.clone());
        }

        info!("Creating new recognition engine instance for key: {}", key);
        let instance = SharedEngine::new(factory()?);

        // Another caller may have raced us; keep whichever landed first
        let mut instances = self.instances.lock();
        Ok(instances
            .entry(key.to_string())
            .or_insert(instance)
            .clone())
    }

    /// Drops the instance stored under `key`. Returns true if one existed.
    pub fn remove(&self, key: &str) -> bool {
        self.instances.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.instances.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.lock().is_empty()
    }
}

impl<E> Default for EngineRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    struct CountingEngine {
        calls: usize,
    }

    impl RecognitionEngine for CountingEngine {
        fn recognize(&mut self, _region: &GrayImage) -> Result<RecognitionResult, OcrError> {
            self.calls += 1;
            Ok(RecognitionResult::new(self.calls.to_string(), 0.9))
        }
    }

    #[test]
    fn test_shared_engine_clones_share_state() {
        let engine = SharedEngine::new(CountingEngine { calls: 0 });
        let other = engine.clone();
        let region = GrayImage::from_pixel(2, 2, Luma([0]));

        engine.recognize(&region).expect("recognizes");
        let second = other.recognize(&region).expect("recognizes");
        assert_eq!(second.text, "2");
        assert_eq!(engine.handle_count(), 2);
        assert_eq!(engine.with_engine(|e| e.calls), 2);
    }

    #[test]
    fn test_registry_reuses_instances() {
        let registry: EngineRegistry<CountingEngine> = EngineRegistry::new();
        let first = registry
            .get_or_create("eng", || Ok(CountingEngine { calls: 0 }))
            .expect("factory succeeds");
        let second = registry
            .get_or_create("eng", || {
                Err(OcrError::Initialization("should not be called".to_string()))
            })
            .expect("cached instance");

        first.with_engine(|e| e.calls = 5);
        assert_eq!(second.with_engine(|e| e.calls), 5);
        assert_eq!(registry.len(), 1);
        assert!(registry.remove("eng"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_does_not_store_failed_instances() {
        let registry: EngineRegistry<CountingEngine> = EngineRegistry::default();
        let result = registry.get_or_create("fra", || {
            Err(OcrError::Initialization("missing data".to_string()))
        });
        assert!(result.is_err());
        assert!(registry.is_empty());
    }
}
