//! Named engine instances.
//!
//! Hosts that juggle several engines (one per input device, one per call)
//! register them here under a name instead of reaching for a global
//! singleton.  The registry hands out clones of the engine handle; all
//! clones share the same underlying engine.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::EngineConfig;
use crate::error::EngineError;

use super::NoiseEngine;

/// Name → engine map.
#[derive(Default)]
pub struct EngineRegistry {
    engines: Mutex<HashMap<String, NoiseEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register an engine under `name`.  The engine is returned
    /// un-initialized; call [`NoiseEngine::initialize`] on it.  Registering
    /// an existing name fails rather than silently replacing the engine.
    pub fn create(&self, name: &str, config: EngineConfig) -> Result<NoiseEngine, EngineError> {
        let mut engines = self.engines.lock().unwrap();
        if engines.contains_key(name) {
            return Err(EngineError::AlreadyInitialized {
                state: format!("engine {name:?} already registered"),
            });
        }
        let engine = NoiseEngine::new(config);
        engines.insert(name.to_string(), engine.clone());
        Ok(engine)
    }

    /// Handle to a registered engine.
    pub fn get(&self, name: &str) -> Option<NoiseEngine> {
        self.engines.lock().unwrap().get(name).cloned()
    }

    /// Remove an engine from the registry and return its handle so the
    /// caller can `destroy` it.  Removal alone does not tear it down.
    pub fn remove(&self, name: &str) -> Option<NoiseEngine> {
        self.engines.lock().unwrap().remove(name)
    }

    /// Registered names, unordered.
    pub fn names(&self) -> Vec<String> {
        self.engines.lock().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.engines.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
