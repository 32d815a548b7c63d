// ABOUTME: Registry pattern for runtime platform backend selection.
// ABOUTME: Backends register factories, relaybot creates one by name from config.

use crate::traits::Platform;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory function that creates a platform backend from its settings
pub type PlatformFactory = Box<dyn Fn(&Value) -> Result<Arc<dyn Platform>> + Send + Sync>;

/// Registry for runtime platform selection
pub struct PlatformRegistry {
    factories: HashMap<String, PlatformFactory>,
}

impl PlatformRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory by name
    pub fn register<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&Value) -> Result<Arc<dyn Platform>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
        self
    }

    /// Create a backend by name with the given settings
    pub fn create(&self, name: &str, settings: &Value) -> Result<Arc<dyn Platform>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| anyhow!("Unknown platform backend: {}", name))?;
        factory(settings)
    }

    /// List available backend names, sorted
    pub fn available(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        use crate::backends::mock::MockPlatform;

        Self::new().register("mock", MockPlatform::factory())
    }
}
