//! Registry of data source factories

use super::SharedDataSource;
use anyhow::{anyhow, Result};
use pulsedeck_types::PanelSettings;
use std::collections::BTreeMap;

/// Function that creates a data source from a panel's settings
pub type SourceFactory = fn(&PanelSettings) -> Result<SharedDataSource>;

/// Registration info for a data source
#[derive(Clone)]
pub struct SourceInfo {
    /// Unique identifier for this source
    pub id: String,
    /// Human-readable display name
    pub display_name: String,
    /// Factory function to create instances
    pub factory: SourceFactory,
}

/// Registry for data sources
///
/// Built-in sources are registered once at startup by
/// `pulsedeck_sources::register_all`; the table is then handed to whatever
/// creates panels. There is no runtime discovery.
#[derive(Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, SourceInfo>,
}

impl SourceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a data source with display info
    pub fn register_source(&mut self, id: &str, display_name: &str, factory: SourceFactory) {
        if self.sources.contains_key(id) {
            log::warn!("Source '{}' registered twice, replacing previous factory", id);
        }
        self.sources.insert(
            id.to_string(),
            SourceInfo {
                id: id.to_string(),
                display_name: display_name.to_string(),
                factory,
            },
        );
    }

    /// Create a data source by ID
    pub fn create_source(&self, id: &str, settings: &PanelSettings) -> Result<SharedDataSource> {
        let info = self
            .sources
            .get(id)
            .ok_or_else(|| anyhow!("Unknown source: {}", id))?;
        (info.factory)(settings)
    }

    /// List all registered sources in ID order
    pub fn list_sources(&self) -> Vec<&SourceInfo> {
        self.sources.values().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataSource, FetchContext, SourceMetadata};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    struct ConstSource {
        metadata: SourceMetadata,
        settings: PanelSettings,
    }

    impl DataSource for ConstSource {
        fn metadata(&self) -> &SourceMetadata {
            &self.metadata
        }

        fn fetch(&self, _ctx: &FetchContext) -> Result<Option<Value>> {
            Ok(Some(Value::from(42)))
        }

        fn settings(&self) -> &PanelSettings {
            &self.settings
        }
    }

    fn make_const(settings: &PanelSettings) -> Result<SharedDataSource> {
        Ok(Arc::new(ConstSource {
            metadata: SourceMetadata {
                id: "const".to_string(),
                name: "Constant".to_string(),
                description: "Always 42".to_string(),
                default_interval: Duration::from_secs(1),
            },
            settings: settings.clone(),
        }))
    }

    #[test]
    fn test_create_registered_source() {
        let mut registry = SourceRegistry::new();
        registry.register_source("const", "Constant", make_const);

        let settings = PanelSettings::new().with("update_interval_seconds", "0.5");
        let source = registry.create_source("const", &settings).unwrap();
        assert_eq!(source.metadata().id, "const");
        assert_eq!(source.get_config("update_interval_seconds", "2.0"), "0.5");
    }

    #[test]
    fn test_unknown_source_is_error() {
        let registry = SourceRegistry::new();
        assert!(registry.create_source("nope", &PanelSettings::new()).is_err());
    }
}
