use std::sync::Arc;

use ctfe_core::error::{Error, Result};
use ctfe_core::host::{PluginLoader, SourceGenerator};
use dashmap::DashMap;

/// Generators registered in memory, looked up by name.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    generators: Arc<DashMap<String, Arc<dyn SourceGenerator>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a generator under its own name, replacing any previous one.
    pub fn register(&self, generator: Arc<dyn SourceGenerator>) {
        let name = generator.name().to_string();
        tracing::debug!("Registering generator `{}`", name);
        self.generators.insert(name, generator);
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .generators
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

impl PluginLoader for PluginRegistry {
    fn load(&self, name: &str) -> Result<Arc<dyn SourceGenerator>> {
        self.generators
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::Generic(format!("no generator named `{}` is registered", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctfe_core::host::{Compilation, SourceUnit};

    struct Constants;

    impl SourceGenerator for Constants {
        fn name(&self) -> &str {
            "constants"
        }

        fn generate(&self, _compilation: &Compilation) -> Result<Vec<SourceUnit>> {
            Ok(vec![SourceUnit::new(
                "generated/constants.rs",
                vec!["constants".to_string()],
                "pub const SEED: u64 = 7;",
            )])
        }
    }

    #[test]
    fn loads_registered_generators() {
        let registry = PluginRegistry::new();
        registry.register(Arc::new(Constants));
        assert_eq!(registry.names(), vec!["constants".to_string()]);
        let generator = registry.load("constants").unwrap();
        let units = generator.generate(&Compilation::new("demo")).unwrap();
        assert_eq!(units.len(), 1);
        assert!(registry.load("missing").is_err());
    }
}
